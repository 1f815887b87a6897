use log::{debug, info, warn};
use std::fs::{self, Metadata};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{
    Receiver, RecvTimeoutError, SyncSender, TryRecvError, TrySendError, sync_channel,
};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Longest line forwarded from the child; the rest of an oversized line is dropped.
pub const MAX_LINE_BYTES: usize = 10 * 1024 * 1024;

const LINE_QUEUE_CAPACITY: usize = 4096;
const EXIT_POLL: Duration = Duration::from_millis(50);
const TERMINATE_GRACE: Duration = Duration::from_secs(2);
const READER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);
const SPAWN_BUSY_RETRIES: u32 = 10;

#[derive(Debug, Error)]
pub enum StartError {
    #[error("script path is empty")]
    EmptyPath,

    #[error("script not found at {}: {source}", .path.display())]
    NotFound { path: PathBuf, source: io::Error },

    #[error("{} is a directory", .0.display())]
    IsDirectory(PathBuf),

    #[error("failed to make {} executable: {source}", .path.display())]
    SetPermissions { path: PathBuf, source: io::Error },

    #[error("failed to start {}: {source}", .path.display())]
    Spawn { path: PathBuf, source: io::Error },

    #[error("failed to open child {0}")]
    OpenPipe(&'static str),
}

impl StartError {
    /// True when the executable was rejected before anything was spawned.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::EmptyPath | Self::NotFound { .. } | Self::IsDirectory(_) | Self::SetPermissions { .. }
        )
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RunOutcome {
    Succeeded,
    Cancelled,
    Failed(String),
}

#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Debug)]
pub struct RunInput {
    pub email: String,
    pub api_key: String,
    pub domains_raw: String,
}

/// Live handle to one invocation of the backup executable.
///
/// Output lines arrive on a bounded queue fed by one reader thread per pipe. A supervisor thread
/// owns the child, waits for it (or for cancellation) and publishes exactly one [`RunOutcome`].
/// Dropping a handle before its outcome was observed cancels the run.
#[derive(Debug)]
pub struct RunHandle {
    pid: u32,
    cancel: CancelToken,
    lines: Receiver<String>,
    completion: Receiver<RunOutcome>,
    finished: bool,
}

impl RunHandle {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn cancel(&self) {
        if !self.cancel.is_cancelled() {
            info!("cancelling run (pid {})", self.pid);
        }
        self.cancel.cancel();
    }

    #[cfg(test)]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Takes up to `max` queued lines without blocking.
    pub fn drain_lines(&self, max: usize) -> Vec<String> {
        let mut out = Vec::new();
        while out.len() < max {
            match self.lines.try_recv() {
                Ok(line) => out.push(line),
                Err(_) => break,
            }
        }
        out
    }

    /// Returns the outcome once, the first time it is available.
    pub fn try_completion(&mut self) -> Option<RunOutcome> {
        if self.finished {
            return None;
        }
        let outcome = match self.completion.try_recv() {
            Ok(outcome) => outcome,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => {
                RunOutcome::Failed("runner stopped without reporting an exit status".to_string())
            }
        };
        self.finished = true;
        Some(outcome)
    }

    /// Blocks up to `timeout` for the outcome. Used on shutdown so a cancelled child is reaped.
    pub fn wait_for_completion(&mut self, timeout: Duration) -> Option<RunOutcome> {
        if self.finished {
            return None;
        }
        let outcome = match self.completion.recv_timeout(timeout) {
            Ok(outcome) => outcome,
            Err(RecvTimeoutError::Timeout) => return None,
            Err(RecvTimeoutError::Disconnected) => {
                RunOutcome::Failed("runner stopped without reporting an exit status".to_string())
            }
        };
        self.finished = true;
        Some(outcome)
    }
}

impl Drop for RunHandle {
    fn drop(&mut self) {
        if !self.finished {
            self.cancel();
        }
    }
}

/// Checks that `path` names a file and sets its executable bits when they are missing.
pub fn prepare_executable(path: &Path) -> Result<(), StartError> {
    if path.as_os_str().is_empty() {
        return Err(StartError::EmptyPath);
    }
    let metadata = fs::metadata(path).map_err(|source| StartError::NotFound {
        path: path.to_path_buf(),
        source,
    })?;
    if metadata.is_dir() {
        return Err(StartError::IsDirectory(path.to_path_buf()));
    }
    ensure_executable(path, &metadata)
}

#[cfg(unix)]
fn ensure_executable(path: &Path, metadata: &Metadata) -> Result<(), StartError> {
    use std::os::unix::fs::PermissionsExt;

    let mode = metadata.permissions().mode() & 0o7777;
    if mode & 0o111 != 0 {
        return Ok(());
    }
    fs::set_permissions(path, fs::Permissions::from_mode(mode | 0o755)).map_err(|source| {
        StartError::SetPermissions {
            path: path.to_path_buf(),
            source,
        }
    })?;
    info!("set executable permission on {}", path.display());
    Ok(())
}

#[cfg(not(unix))]
fn ensure_executable(_path: &Path, _metadata: &Metadata) -> Result<(), StartError> {
    Ok(())
}

pub fn start(path: &Path, input: &RunInput) -> Result<RunHandle, StartError> {
    prepare_executable(path)?;

    let mut command = Command::new(path);
    command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    let mut child = spawn_with_retry(&mut command).map_err(|source| StartError::Spawn {
        path: path.to_path_buf(),
        source,
    })?;
    let pid = child.id();

    let pipes = (child.stdin.take(), child.stdout.take(), child.stderr.take());
    let (Some(stdin), Some(stdout), Some(stderr)) = pipes else {
        let _ = child.kill();
        let _ = child.wait();
        return Err(StartError::OpenPipe("stdio"));
    };
    info!("started {} (pid {pid})", path.display());

    let (lines_tx, lines_rx) = sync_channel::<String>(LINE_QUEUE_CAPACITY);
    let (readers_tx, readers_rx) = sync_channel::<()>(2);
    let readers = ReaderState {
        done_tx: readers_tx,
        blocked: Arc::new(AtomicUsize::new(0)),
    };
    let blocked = readers.blocked.clone();
    spawn_reader("stdout", stdout, lines_tx.clone(), readers.clone());
    spawn_reader("stderr", stderr, lines_tx, readers);

    let payload = stdin_payload(input);
    thread::spawn(move || write_stdin(stdin, &payload));

    let cancel = CancelToken::new();
    let (done_tx, done_rx) = sync_channel::<RunOutcome>(1);
    let supervisor_cancel = cancel.clone();
    thread::spawn(move || supervise(child, readers_rx, blocked, supervisor_cancel, done_tx));

    Ok(RunHandle {
        pid,
        cancel,
        lines: lines_rx,
        completion: done_rx,
        finished: false,
    })
}

fn spawn_with_retry(command: &mut Command) -> io::Result<Child> {
    let mut attempts = 0;
    loop {
        match command.spawn() {
            // A freshly written script can still be open for writing in a forked sibling.
            #[cfg(unix)]
            Err(error)
                if error.raw_os_error() == Some(libc::ETXTBSY) && attempts < SPAWN_BUSY_RETRIES =>
            {
                attempts += 1;
                thread::sleep(Duration::from_millis(20));
            }
            other => return other,
        }
    }
}

/// Email and key are trimmed; the domain text is sent raw, terminated by exactly one newline.
fn stdin_payload(input: &RunInput) -> String {
    let mut payload = format!("{}\n{}\n", input.email.trim(), input.api_key.trim());
    payload.push_str(input.domains_raw.trim_end_matches(['\n', '\r']));
    payload.push('\n');
    payload
}

fn write_stdin(mut stdin: ChildStdin, payload: &str) {
    if let Err(error) = stdin.write_all(payload.as_bytes()) {
        debug!("writing child stdin failed: {error}");
    }
}

/// Shared between the two readers and the supervisor.
#[derive(Clone)]
struct ReaderState {
    done_tx: SyncSender<()>,
    /// Readers currently waiting for room in the line queue.
    blocked: Arc<AtomicUsize>,
}

fn spawn_reader(
    stream: &'static str,
    pipe: impl Read + Send + 'static,
    lines_tx: SyncSender<String>,
    state: ReaderState,
) {
    thread::spawn(move || {
        read_lines(stream, pipe, &lines_tx, &state.blocked);
        let _ = state.done_tx.send(());
    });
}

/// Queues one line, blocking while the queue is full. Returns false once the handle is gone.
fn send_line(lines_tx: &SyncSender<String>, line: String, blocked: &AtomicUsize) -> bool {
    match lines_tx.try_send(line) {
        Ok(()) => true,
        Err(TrySendError::Disconnected(_)) => false,
        Err(TrySendError::Full(line)) => {
            blocked.fetch_add(1, Ordering::SeqCst);
            let sent = lines_tx.send(line).is_ok();
            blocked.fetch_sub(1, Ordering::SeqCst);
            sent
        }
    }
}

fn read_lines(
    stream: &str,
    pipe: impl Read,
    lines_tx: &SyncSender<String>,
    blocked: &AtomicUsize,
) {
    let mut reader = BufReader::new(pipe);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match read_capped_line(&mut reader, &mut buf, MAX_LINE_BYTES) {
            Ok(0) => break,
            Ok(consumed) => {
                if consumed > MAX_LINE_BYTES + 1 {
                    warn!("{stream}: truncated a {consumed} byte line");
                }
                if !send_line(lines_tx, decode_line(&buf), blocked) {
                    break;
                }
            }
            Err(error) => {
                debug!("{stream}: read failed: {error}");
                break;
            }
        }
    }
}

/// Reads through the next `\n`, keeping at most `max` bytes in `buf`.
/// Returns the number of bytes consumed from the reader (0 at end of stream).
fn read_capped_line(
    reader: &mut impl BufRead,
    buf: &mut Vec<u8>,
    max: usize,
) -> io::Result<usize> {
    let mut consumed = 0;
    loop {
        let available = match reader.fill_buf() {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => return Err(error),
        };
        if available.is_empty() {
            return Ok(consumed);
        }

        let (take, found_newline) = match available.iter().position(|byte| *byte == b'\n') {
            Some(index) => (index + 1, true),
            None => (available.len(), false),
        };
        let room = max.saturating_sub(buf.len());
        buf.extend_from_slice(&available[..take.min(room)]);
        reader.consume(take);
        consumed += take;

        if found_newline {
            return Ok(consumed);
        }
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let text = text.strip_suffix('\n').unwrap_or(&text);
    let text = text.strip_suffix('\r').unwrap_or(text);
    text.to_string()
}

fn supervise(
    mut child: Child,
    readers_rx: Receiver<()>,
    blocked: Arc<AtomicUsize>,
    cancel: CancelToken,
    done_tx: SyncSender<RunOutcome>,
) {
    let outcome = loop {
        if cancel.is_cancelled() {
            terminate(&mut child);
            break RunOutcome::Cancelled;
        }
        match child.try_wait() {
            Ok(Some(status)) => break outcome_from_status(status, &cancel),
            Ok(None) => thread::sleep(EXIT_POLL),
            Err(error) => {
                let _ = child.kill();
                break RunOutcome::Failed(format!("waiting for process failed: {error}"));
            }
        }
    };

    if outcome != RunOutcome::Cancelled {
        wait_for_readers(&readers_rx, &blocked, &cancel);
    }
    info!("run finished: {outcome:?}");
    let _ = done_tx.send(outcome);
}

/// Lets both readers reach EOF before the outcome is published.
///
/// A reader waiting on a full line queue is never timed out: that output is already ours and
/// drains as the handle is polled. The timeout only covers readers idle on a pipe that a
/// background grandchild keeps open.
fn wait_for_readers(readers_rx: &Receiver<()>, blocked: &AtomicUsize, cancel: &CancelToken) {
    let mut idle_deadline = Instant::now() + READER_DRAIN_TIMEOUT;
    let mut remaining = 2;
    while remaining > 0 && !cancel.is_cancelled() {
        match readers_rx.recv_timeout(EXIT_POLL) {
            Ok(()) => remaining -= 1,
            Err(RecvTimeoutError::Timeout) => {
                if blocked.load(Ordering::SeqCst) > 0 {
                    idle_deadline = Instant::now() + READER_DRAIN_TIMEOUT;
                } else if Instant::now() >= idle_deadline {
                    debug!("output pipes still open after exit; not waiting further");
                    return;
                }
            }
            Err(RecvTimeoutError::Disconnected) => return,
        }
    }
}

fn outcome_from_status(status: ExitStatus, cancel: &CancelToken) -> RunOutcome {
    if status.success() {
        return RunOutcome::Succeeded;
    }
    match status.code() {
        Some(_) if cancel.is_cancelled() => RunOutcome::Cancelled,
        Some(code) => RunOutcome::Failed(format!("exit status {code}")),
        // Terminated by a signal from outside.
        None => RunOutcome::Cancelled,
    }
}

#[cfg(unix)]
fn terminate(child: &mut Child) {
    signal_group(child.id(), libc::SIGTERM);
    let deadline = Instant::now() + TERMINATE_GRACE;
    while Instant::now() < deadline {
        if let Ok(Some(_)) = child.try_wait() {
            return;
        }
        thread::sleep(EXIT_POLL);
    }
    warn!("pid {} ignored SIGTERM; killing", child.id());
    signal_group(child.id(), libc::SIGKILL);
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(unix)]
fn signal_group(pid: u32, signal: libc::c_int) {
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // SAFETY: kill(2) has no memory-safety preconditions; the child leads its own group.
    let rc = unsafe { libc::kill(-pgid, signal) };
    if rc != 0 {
        debug!(
            "signal {signal} to process group {pgid} failed: {}",
            io::Error::last_os_error()
        );
    }
}
