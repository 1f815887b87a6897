mod line_editor;
mod text_editor;

use crate::config::Prefill;
use crate::domain::parse_domains;
use crate::infra::{RunHandle, RunInput, RunOutcome};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use log::{debug, info, warn};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use thiserror::Error;

pub use line_editor::LineEditor;
pub use text_editor::TextEditor;

/// Lines moved from the run's queue into the log per tick.
pub const DRAIN_BATCH: usize = 200;

pub const SUCCESS_LINE: &str = "Done.";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("terminal I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Stage {
    Email,
    Api,
    Domains,
    Confirm,
    Running,
    Done,
}

impl Stage {
    pub fn label(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Api => "api key",
            Self::Domains => "domains",
            Self::Confirm => "confirm",
            Self::Running => "running",
            Self::Done => "done",
        }
    }

    /// Stages whose focused widget takes printable characters.
    pub fn is_text_entry(self) -> bool {
        matches!(self, Self::Email | Self::Api | Self::Domains)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LogKind {
    Output,
    Success,
    Error,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LogLine {
    pub kind: LogKind,
    pub text: String,
}

/// Log viewport position. `None` follows the newest line.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct LogScroll {
    pub top: Option<usize>,
}

impl LogScroll {
    pub fn top_line(self, total: usize, height: usize) -> usize {
        let max_top = total.saturating_sub(height);
        self.top.map_or(max_top, |top| top.min(max_top))
    }

    fn scroll_up(&mut self, lines: usize, total: usize, height: usize) {
        self.top = Some(self.top_line(total, height).saturating_sub(lines));
    }

    fn scroll_down(&mut self, lines: usize, total: usize, height: usize) {
        let max_top = total.saturating_sub(height);
        let next = self.top_line(total, height).saturating_add(lines);
        self.top = if next >= max_top { None } else { Some(next) };
    }
}

#[derive(Debug)]
pub struct AppModel {
    pub stage: Stage,
    pub script_path: PathBuf,
    pub email: LineEditor,
    pub api_key: LineEditor,
    pub domains: TextEditor,
    pub normalized_domains: Vec<String>,
    pub ignored_tokens: usize,
    pub log: Vec<LogLine>,
    pub log_scroll: LogScroll,
    pub cancel_requested: bool,
    pub run: Option<RunHandle>,
    pub runs_started: usize,
    pub run_started_at: Option<Instant>,
    pub run_elapsed: Option<Duration>,
    pub spinner_frame: usize,
    pub terminal_size: (u16, u16),
}

impl AppModel {
    pub fn new(script_path: PathBuf, prefill: &Prefill) -> Self {
        let text = |value: &Option<String>| value.as_deref().unwrap_or_default().to_string();
        Self {
            stage: Stage::Email,
            script_path,
            email: LineEditor::from_text(&text(&prefill.email)),
            api_key: LineEditor::from_text(&text(&prefill.api_key)),
            domains: TextEditor::from_text(&text(&prefill.domains)),
            normalized_domains: Vec::new(),
            ignored_tokens: 0,
            log: Vec::new(),
            log_scroll: LogScroll::default(),
            cancel_requested: false,
            run: None,
            runs_started: 0,
            run_started_at: None,
            run_elapsed: None,
            spinner_frame: 0,
            terminal_size: (0, 0),
        }
    }

    pub fn with_terminal_size(mut self, width: u16, height: u16) -> Self {
        self.terminal_size = (width, height);
        self
    }

    fn set_stage(&mut self, stage: Stage) {
        if self.stage != stage {
            debug!("stage {} -> {}", self.stage.label(), stage.label());
            self.stage = stage;
        }
    }

    fn append_log(&mut self, kind: LogKind, text: String) {
        push_log_line(&mut self.log, kind, text);
    }
}

fn push_log_line(log: &mut Vec<LogLine>, kind: LogKind, text: String) {
    if text.is_empty() {
        return;
    }
    log.push(LogLine { kind, text });
}

#[derive(Clone, Debug)]
pub enum AppEvent {
    Key(KeyEvent),
    Paste(String),
    Tick,
    Resize(u16, u16),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AppCommand {
    None,
    Quit,
    StartRun,
}

pub fn update(model: AppModel, event: AppEvent) -> (AppModel, AppCommand) {
    match event {
        AppEvent::Key(key) => update_on_key(model, key),
        AppEvent::Paste(text) => (update_on_paste(model, &text), AppCommand::None),
        AppEvent::Tick => (update_on_tick(model), AppCommand::None),
        AppEvent::Resize(width, height) => (model.with_terminal_size(width, height), AppCommand::None),
    }
}

fn update_on_key(mut model: AppModel, key: KeyEvent) -> (AppModel, AppCommand) {
    let control = key.modifiers.contains(KeyModifiers::CONTROL);
    let quit_chord = control && matches!(key.code, KeyCode::Char('c') | KeyCode::Char('q'));
    let bare_q = !control && key.code == KeyCode::Char('q');
    if quit_chord || (bare_q && !model.stage.is_text_entry()) {
        if let Some(run) = &model.run {
            model.cancel_requested = true;
            run.cancel();
        }
        info!("quit requested at stage {}", model.stage.label());
        return (model, AppCommand::Quit);
    }

    match model.stage {
        Stage::Email => update_email(model, key),
        Stage::Api => update_api(model, key),
        Stage::Domains => update_domains(model, key),
        Stage::Confirm => update_confirm(model, key),
        Stage::Running => (update_log_view(model, key), AppCommand::None),
        Stage::Done => match key.code {
            KeyCode::Esc => (model, AppCommand::Quit),
            _ => (update_log_view(model, key), AppCommand::None),
        },
    }
}

fn update_email(mut model: AppModel, key: KeyEvent) -> (AppModel, AppCommand) {
    match key.code {
        KeyCode::Enter => {
            if !model.email.is_blank() {
                model.set_stage(Stage::Api);
            }
        }
        _ => {
            model.email.handle_key(key);
        }
    }
    (model, AppCommand::None)
}

fn update_api(mut model: AppModel, key: KeyEvent) -> (AppModel, AppCommand) {
    match key.code {
        KeyCode::Esc => model.set_stage(Stage::Email),
        KeyCode::Enter => {
            if !model.api_key.is_blank() {
                model.set_stage(Stage::Domains);
            }
        }
        _ => {
            model.api_key.handle_key(key);
        }
    }
    (model, AppCommand::None)
}

fn update_domains(mut model: AppModel, key: KeyEvent) -> (AppModel, AppCommand) {
    let control = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Esc => model.set_stage(Stage::Api),
        KeyCode::Char('d') if control => {
            let parsed = parse_domains(&model.domains.text());
            debug!(
                "parsed {} domain(s), ignored {} token(s)",
                parsed.domains.len(),
                parsed.ignored_tokens
            );
            model.normalized_domains = parsed.domains;
            model.ignored_tokens = parsed.ignored_tokens;
            model.set_stage(Stage::Confirm);
        }
        _ => {
            model.domains.handle_key(key);
        }
    }
    (model, AppCommand::None)
}

fn update_confirm(mut model: AppModel, key: KeyEvent) -> (AppModel, AppCommand) {
    match key.code {
        KeyCode::Char('y') | KeyCode::Char('Y') => return (model, AppCommand::StartRun),
        KeyCode::Char('n') | KeyCode::Char('N') => model.set_stage(Stage::Domains),
        KeyCode::Char('b') | KeyCode::Char('B') | KeyCode::Esc => model.set_stage(Stage::Api),
        _ => {}
    }
    (model, AppCommand::None)
}

fn update_log_view(mut model: AppModel, key: KeyEvent) -> AppModel {
    let total = model.log.len();
    let height = log_viewport_height(model.terminal_size);
    let page = height.max(1);
    let scroll = &mut model.log_scroll;
    match key.code {
        KeyCode::Up | KeyCode::Char('k') => scroll.scroll_up(1, total, height),
        KeyCode::Down | KeyCode::Char('j') => scroll.scroll_down(1, total, height),
        KeyCode::PageUp => scroll.scroll_up(page, total, height),
        KeyCode::PageDown | KeyCode::Char(' ') => scroll.scroll_down(page, total, height),
        KeyCode::Home | KeyCode::Char('g') => scroll.top = Some(0),
        KeyCode::End | KeyCode::Char('G') => scroll.top = None,
        _ => {}
    }
    model
}

fn update_on_paste(mut model: AppModel, text: &str) -> AppModel {
    match model.stage {
        Stage::Email => model.email.insert_str(text),
        Stage::Api => model.api_key.insert_str(text),
        Stage::Domains => model.domains.insert_str(text),
        Stage::Confirm | Stage::Running | Stage::Done => {}
    }
    model
}

fn update_on_tick(mut model: AppModel) -> AppModel {
    if model.stage != Stage::Running {
        return model;
    }
    model.spinner_frame = model.spinner_frame.wrapping_add(1);

    let Some(run) = model.run.as_mut() else {
        return model;
    };
    for line in run.drain_lines(DRAIN_BATCH) {
        push_log_line(&mut model.log, LogKind::Output, line);
    }
    let Some(outcome) = run.try_completion() else {
        return model;
    };
    for line in run.drain_lines(usize::MAX) {
        push_log_line(&mut model.log, LogKind::Output, line);
    }

    match outcome {
        RunOutcome::Succeeded | RunOutcome::Cancelled => {
            model.append_log(LogKind::Success, SUCCESS_LINE.to_string());
        }
        RunOutcome::Failed(message) => {
            warn!("backup script failed: {message}");
            model.append_log(LogKind::Error, format!("Process error: {message}"));
        }
    }
    model.run = None;
    model.run_elapsed = model.run_started_at.map(|started| started.elapsed());
    model.set_stage(Stage::Done);
    model
}

/// Validates the script and starts it. Only acts from `Confirm` with no run in flight.
pub fn start_run(mut model: AppModel) -> AppModel {
    if model.stage != Stage::Confirm || model.run.is_some() {
        warn!("ignoring run request at stage {}", model.stage.label());
        return model;
    }

    let input = RunInput {
        email: model.email.value().to_string(),
        api_key: model.api_key.value().to_string(),
        domains_raw: model.domains.text(),
    };
    info!(
        "starting {} for {} domain(s), api key {} chars",
        model.script_path.display(),
        model.normalized_domains.len(),
        input.api_key.trim().chars().count()
    );
    let started = crate::infra::start(&model.script_path, &input);

    model.log.clear();
    model.log_scroll = LogScroll::default();
    model.run_started_at = Some(Instant::now());
    match started {
        Ok(handle) => {
            model.run = Some(handle);
            model.runs_started += 1;
            model.set_stage(Stage::Running);
        }
        Err(error) if error.is_validation() => {
            warn!("cannot run {}: {error}", model.script_path.display());
            model.append_log(LogKind::Error, error.to_string());
            model.run_elapsed = Some(Duration::ZERO);
            model.set_stage(Stage::Done);
        }
        Err(error) => {
            warn!("failed to start backup script: {error}");
            model.append_log(LogKind::Error, format!("Process error: {error}"));
            model.run_elapsed = Some(Duration::ZERO);
            model.set_stage(Stage::Done);
        }
    }
    model
}

/// Rows available to the log body for a terminal of the given size.
pub fn log_viewport_height(terminal_size: (u16, u16)) -> usize {
    let (_, height) = inner_terminal_size(terminal_size);
    // header 3 + footer 1 + log borders 2
    usize::from(height.saturating_sub(6))
}

pub fn inner_terminal_size((width, height): (u16, u16)) -> (u16, u16) {
    if width < 40 || height < 12 {
        return (width, height);
    }
    (width.saturating_sub(4), height.saturating_sub(2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    const ALL_STAGES: [Stage; 6] = [
        Stage::Email,
        Stage::Api,
        Stage::Domains,
        Stage::Confirm,
        Stage::Running,
        Stage::Done,
    ];

    fn key(code: KeyCode) -> AppEvent {
        AppEvent::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn ctrl(ch: char) -> AppEvent {
        AppEvent::Key(KeyEvent::new(KeyCode::Char(ch), KeyModifiers::CONTROL))
    }

    fn model_at(stage: Stage, script_path: &Path) -> AppModel {
        let prefill = Prefill {
            email: Some("me@example.com".to_string()),
            api_key: Some("k3y".to_string()),
            domains: Some("B.com, a.com www.a.com".to_string()),
        };
        let mut model = AppModel::new(script_path.to_path_buf(), &prefill)
            .with_terminal_size(100, 30);
        model.stage = stage;
        model
    }

    fn apply(model: AppModel, events: Vec<AppEvent>) -> (AppModel, AppCommand) {
        let mut model = model;
        let mut last = AppCommand::None;
        for event in events {
            let (next, command) = update(model, event);
            model = next;
            last = command;
        }
        (model, last)
    }

    #[test]
    fn walks_from_email_to_confirm() {
        let model = AppModel::new(PathBuf::from("/nonexistent"), &Prefill::default());
        let mut events = "me@x.io".chars().map(|ch| key(KeyCode::Char(ch))).collect::<Vec<_>>();
        events.push(key(KeyCode::Enter));
        events.extend("qkey".chars().map(|ch| key(KeyCode::Char(ch))));
        events.push(key(KeyCode::Enter));
        events.push(AppEvent::Paste("https://Shop.example.com/x\nblog.example.com".to_string()));
        events.push(ctrl('d'));

        let (model, command) = apply(model, events);
        assert_eq!(command, AppCommand::None);
        assert_eq!(model.stage, Stage::Confirm);
        assert_eq!(model.email.value(), "me@x.io");
        assert_eq!(model.api_key.value(), "qkey");
        assert_eq!(
            model.normalized_domains,
            vec!["shop.example.com".to_string(), "blog.example.com".to_string()]
        );
    }

    #[test]
    fn blank_fields_block_enter() {
        let model = AppModel::new(PathBuf::from("/nonexistent"), &Prefill::default());
        let (model, _) = apply(model, vec![key(KeyCode::Char(' ')), key(KeyCode::Enter)]);
        assert_eq!(model.stage, Stage::Email);

        let mut model = model;
        model.email = LineEditor::from_text("me@x.io");
        let (model, _) = apply(model, vec![key(KeyCode::Enter), key(KeyCode::Enter)]);
        assert_eq!(model.stage, Stage::Api);
    }

    #[test]
    fn enter_in_domains_adds_a_line_instead_of_finishing() {
        let model = model_at(Stage::Domains, Path::new("/nonexistent"));
        let (model, _) = apply(model, vec![key(KeyCode::Enter)]);
        assert_eq!(model.stage, Stage::Domains);
        assert_eq!(model.domains.lines.len(), 2);
    }

    #[test]
    fn bare_q_is_text_in_entry_stages_and_quits_elsewhere() {
        for stage in [Stage::Email, Stage::Api, Stage::Domains] {
            let (model, command) = update(model_at(stage, Path::new("/x")), key(KeyCode::Char('q')));
            assert_eq!(command, AppCommand::None);
            assert_eq!(model.stage, stage);
        }
        for stage in [Stage::Confirm, Stage::Done] {
            let (_, command) = update(model_at(stage, Path::new("/x")), key(KeyCode::Char('q')));
            assert_eq!(command, AppCommand::Quit);
        }
    }

    #[test]
    fn ctrl_c_quits_from_every_stage() {
        for stage in ALL_STAGES {
            let (_, command) = update(model_at(stage, Path::new("/x")), ctrl('c'));
            assert_eq!(command, AppCommand::Quit, "stage {stage:?}");
        }
    }

    fn expected_transition(stage: Stage, event: &AppEvent) -> (Stage, AppCommand) {
        let AppEvent::Key(key) = event else {
            return (stage, AppCommand::None);
        };
        let control = key.modifiers.contains(KeyModifiers::CONTROL);
        if control && matches!(key.code, KeyCode::Char('c') | KeyCode::Char('q')) {
            return (stage, AppCommand::Quit);
        }
        match (stage, key.code) {
            (Stage::Email, KeyCode::Enter) => (Stage::Api, AppCommand::None),
            (Stage::Api, KeyCode::Enter) => (Stage::Domains, AppCommand::None),
            (Stage::Api, KeyCode::Esc) => (Stage::Email, AppCommand::None),
            (Stage::Domains, KeyCode::Esc) => (Stage::Api, AppCommand::None),
            (Stage::Domains, KeyCode::Char('d')) if control => (Stage::Confirm, AppCommand::None),
            (Stage::Confirm, KeyCode::Char('y')) => (Stage::Confirm, AppCommand::StartRun),
            (Stage::Confirm, KeyCode::Char('n')) => (Stage::Domains, AppCommand::None),
            (Stage::Confirm, KeyCode::Char('b') | KeyCode::Esc) => (Stage::Api, AppCommand::None),
            (Stage::Confirm | Stage::Running | Stage::Done, KeyCode::Char('q')) => {
                (stage, AppCommand::Quit)
            }
            (Stage::Done, KeyCode::Esc) => (stage, AppCommand::Quit),
            _ => (stage, AppCommand::None),
        }
    }

    #[test]
    fn every_input_maps_to_a_defined_transition() {
        let inputs = vec![
            key(KeyCode::Enter),
            key(KeyCode::Esc),
            key(KeyCode::Char('y')),
            key(KeyCode::Char('n')),
            key(KeyCode::Char('b')),
            key(KeyCode::Char('q')),
            key(KeyCode::Char('x')),
            key(KeyCode::Up),
            key(KeyCode::PageDown),
            key(KeyCode::Tab),
            key(KeyCode::F(5)),
            ctrl('d'),
            ctrl('c'),
            ctrl('q'),
            AppEvent::Paste("z.com".to_string()),
            AppEvent::Tick,
            AppEvent::Resize(80, 24),
        ];
        for stage in ALL_STAGES {
            for input in &inputs {
                let (expected_stage, expected_command) = expected_transition(stage, input);
                let (model, command) = update(model_at(stage, Path::new("/x")), input.clone());
                assert_eq!(model.stage, expected_stage, "{stage:?} on {input:?}");
                assert_eq!(command, expected_command, "{stage:?} on {input:?}");
            }
        }
    }

    #[test]
    fn missing_script_fails_fast_into_done() {
        let dir = tempfile::tempdir().expect("tempdir");
        let model = model_at(Stage::Confirm, &dir.path().join("missing.sh"));
        let model = start_run(model);
        assert_eq!(model.stage, Stage::Done);
        assert!(model.run.is_none());
        assert_eq!(model.runs_started, 0);
        assert_eq!(model.log.len(), 1);
        assert_eq!(model.log[0].kind, LogKind::Error);
        assert!(model.log[0].text.contains("missing.sh"));
    }

    #[test]
    fn directory_script_fails_fast_into_done() {
        let dir = tempfile::tempdir().expect("tempdir");
        let model = start_run(model_at(Stage::Confirm, dir.path()));
        assert_eq!(model.stage, Stage::Done);
        assert!(model.log[0].text.contains("is a directory"));
    }

    #[test]
    fn start_run_is_ignored_outside_confirm() {
        let model = start_run(model_at(Stage::Domains, Path::new("/x")));
        assert_eq!(model.stage, Stage::Domains);
        assert!(model.log.is_empty());
    }

    #[test]
    fn scrolling_pins_and_resumes_follow() {
        let mut model = model_at(Stage::Done, Path::new("/x"));
        for index in 0..100 {
            model.append_log(LogKind::Output, format!("line {index}"));
        }
        let height = log_viewport_height(model.terminal_size);
        assert_eq!(model.log_scroll.top_line(100, height), 100 - height);

        let (model, _) = apply(model, vec![key(KeyCode::Up), key(KeyCode::Up)]);
        assert_eq!(model.log_scroll.top, Some(100 - height - 2));
        assert_eq!(model.stage, Stage::Done);

        let (model, _) = apply(model, vec![key(KeyCode::Down), key(KeyCode::Down)]);
        assert_eq!(model.log_scroll.top, None);
    }

    #[test]
    fn empty_lines_are_not_logged() {
        let mut model = model_at(Stage::Done, Path::new("/x"));
        model.append_log(LogKind::Output, String::new());
        assert!(model.log.is_empty());
    }

    #[cfg(unix)]
    mod runs {
        use super::*;
        use std::fs;
        use std::os::unix::fs::PermissionsExt;
        use std::thread;

        fn write_stub(dir: &Path, body: &str) -> PathBuf {
            let path = dir.join("backup.sh");
            fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write stub");
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod");
            path
        }

        fn tick_until_done(mut model: AppModel) -> AppModel {
            let started = Instant::now();
            while model.stage == Stage::Running {
                assert!(started.elapsed() < Duration::from_secs(15), "run did not finish");
                thread::sleep(Duration::from_millis(20));
                model = update(model, AppEvent::Tick).0;
            }
            model
        }

        fn texts(model: &AppModel) -> Vec<&str> {
            model.log.iter().map(|line| line.text.as_str()).collect()
        }

        #[test]
        fn successful_run_streams_lines_then_done() {
            let dir = tempfile::tempdir().expect("tempdir");
            let script = write_stub(
                dir.path(),
                "read -r email\nread -r key\nread -r domains\necho \"$email\"\necho \"$key\"\necho \"$domains\"",
            );
            let model = start_run(model_at(Stage::Confirm, &script));
            assert_eq!(model.stage, Stage::Running);
            assert!(model.run.is_some());

            let model = tick_until_done(model);
            assert_eq!(
                texts(&model),
                vec!["me@example.com", "k3y", "B.com, a.com www.a.com", SUCCESS_LINE]
            );
            assert_eq!(model.log.last().map(|line| line.kind), Some(LogKind::Success));
            assert!(model.run.is_none());
            assert!(model.run_elapsed.is_some());
        }

        #[test]
        fn failing_run_shows_error_as_last_line() {
            let dir = tempfile::tempdir().expect("tempdir");
            let script = write_stub(dir.path(), "echo 'API rejected credentials' >&2\nexit 7");
            let model = tick_until_done(start_run(model_at(Stage::Confirm, &script)));

            assert_eq!(
                texts(&model),
                vec!["API rejected credentials", "Process error: exit status 7"]
            );
            assert_eq!(model.log.last().map(|line| line.kind), Some(LogKind::Error));
        }

        #[test]
        fn more_lines_than_one_batch_are_all_kept() {
            let dir = tempfile::tempdir().expect("tempdir");
            let script = write_stub(dir.path(), "i=0\nwhile [ $i -lt 450 ]; do echo \"l$i\"; i=$((i+1)); done");
            let model = tick_until_done(start_run(model_at(Stage::Confirm, &script)));

            assert_eq!(model.log.len(), 451);
            assert_eq!(model.log[0].text, "l0");
            assert_eq!(model.log[449].text, "l449");
        }

        #[test]
        fn second_run_request_while_running_is_ignored() {
            let dir = tempfile::tempdir().expect("tempdir");
            let script = write_stub(dir.path(), "sleep 30");
            let model = start_run(model_at(Stage::Confirm, &script));
            assert_eq!(model.runs_started, 1);

            let (model, command) = update(model, key(KeyCode::Char('y')));
            assert_eq!(command, AppCommand::None);
            let model = start_run(model);
            assert_eq!(model.runs_started, 1);
            assert_eq!(model.stage, Stage::Running);

            let token = model.run.as_ref().map(|run| run.cancel_token()).expect("run");
            let (model, command) = update(model, key(KeyCode::Char('q')));
            assert_eq!(command, AppCommand::Quit);
            assert!(model.cancel_requested);
            assert!(token.is_cancelled());
        }

        #[test]
        fn chatty_script_keeps_every_line_when_ticks_lag() {
            let total = 12_000;
            let dir = tempfile::tempdir().expect("tempdir");
            let script = write_stub(dir.path(), &format!("seq 1 {total}"));
            let model = start_run(model_at(Stage::Confirm, &script));

            // Let the queue fill and the child exit before the first tick.
            thread::sleep(Duration::from_millis(3500));
            let model = tick_until_done(model);

            assert_eq!(model.log.len(), total + 1);
            assert_eq!(model.log[total - 1].text, "12000");
            assert_eq!(model.log[total].text, SUCCESS_LINE);
        }

        #[test]
        fn unlaunchable_script_is_a_process_error() {
            let dir = tempfile::tempdir().expect("tempdir");
            let script = dir.path().join("backup.sh");
            fs::write(&script, "#!/nonexistent/interpreter\n").expect("write stub");
            fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).expect("chmod");

            let model = start_run(model_at(Stage::Confirm, &script));
            assert_eq!(model.stage, Stage::Done);
            assert_eq!(model.runs_started, 0);
            assert_eq!(model.log.len(), 1);
            assert_eq!(model.log[0].kind, LogKind::Error);
            assert!(model.log[0].text.starts_with("Process error: failed to start"));
        }

        #[test]
        fn non_executable_script_gets_its_mode_fixed_and_runs() {
            let dir = tempfile::tempdir().expect("tempdir");
            let script = write_stub(dir.path(), "echo ok");
            fs::set_permissions(&script, fs::Permissions::from_mode(0o644)).expect("chmod");

            let model = tick_until_done(start_run(model_at(Stage::Confirm, &script)));
            assert_eq!(texts(&model), vec!["ok", SUCCESS_LINE]);
            let mode = fs::metadata(&script).expect("metadata").permissions().mode();
            assert_eq!(mode & 0o111, 0o111);
        }

        #[test]
        fn log_is_cleared_when_the_run_starts() {
            let dir = tempfile::tempdir().expect("tempdir");
            let script = write_stub(dir.path(), "echo fresh");
            let mut model = model_at(Stage::Confirm, &script);
            model.append_log(LogKind::Output, "stale".to_string());

            let model = tick_until_done(start_run(model));
            assert_eq!(texts(&model), vec!["fresh", SUCCESS_LINE]);
        }
    }
}
