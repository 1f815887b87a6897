mod app;
mod cli;
mod config;
mod domain;
mod infra;
mod ui;

use crate::app::{AppCommand, AppEvent, AppModel};
use crate::cli::CliInvocation;
use crate::config::Config;
use crate::domain::normalize_domains;
use crossterm::event::{self, DisableBracketedPaste, EnableBracketedPaste, Event, KeyEventKind};
use crossterm::terminal::size as terminal_size;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use crossterm::{ExecutableCommand, execute};
use log::{info, warn};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use std::io::{self, Stdout, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use thiserror::Error;

const TICK: Duration = Duration::from_millis(100);
const SHUTDOWN_WAIT: Duration = Duration::from_secs(3);

#[derive(Debug, Error)]
enum MainError {
    #[error(transparent)]
    App(#[from] crate::app::AppError),
}

fn main() {
    if let Err(error) = run_main() {
        let mut err = io::stderr().lock();
        let _ = writeln!(err, "{error}");
        std::process::exit(1);
    }
}

fn run_main() -> Result<(), MainError> {
    let args = std::env::args().collect::<Vec<_>>();
    let invocation = match crate::cli::parse_invocation(&args) {
        Ok(invocation) => invocation,
        Err(error) => {
            let mut err = io::stderr().lock();
            let _ = writeln!(err, "{error}");
            let _ = writeln!(err);
            print_help();
            std::process::exit(2);
        }
    };

    match invocation {
        CliInvocation::PrintHelp => {
            print_help();
            Ok(())
        }
        CliInvocation::PrintVersion => {
            let mut out = io::stdout().lock();
            let _ = writeln!(out, "{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        CliInvocation::Tui { script } => Ok(run_tui(script)?),
    }
}

fn print_help() {
    let mut out = io::stdout().lock();
    let _ = write!(out, "{}", crate::cli::help_text());
}

fn run_tui(script: Option<PathBuf>) -> Result<(), crate::app::AppError> {
    let config = Config::from_env(script);
    if let Err(error) = crate::infra::initialize(&config.log_path, config.log_level) {
        let mut err = io::stderr().lock();
        let _ = writeln!(err, "warning: logging disabled: {error}");
    }
    for warning in &config.warnings {
        warn!("{warning}");
    }
    info!(
        "{} {} starting; script {}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        config.script_path.display()
    );
    let prefill = &config.prefill;
    info!(
        "pre-filled: email {}, api key {}, domains {}",
        prefill.email.is_some(),
        prefill.api_key.is_some(),
        prefill
            .domains
            .as_deref()
            .map_or(0, |raw| normalize_domains(raw).len())
    );

    let mut model = AppModel::new(config.script_path, &config.prefill);
    let mut terminal = setup_terminal()?;
    if let Ok((width, height)) = terminal_size() {
        model = model.with_terminal_size(width, height);
    }
    let (model, result) = run(&mut terminal, model);
    let restored = restore_terminal(&mut terminal);
    shutdown(model);
    result?;
    restored
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>, app::AppError> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    if let Err(error) = stdout.execute(EnterAlternateScreen) {
        let _ = disable_raw_mode();
        return Err(error.into());
    }
    let _ = stdout.execute(EnableBracketedPaste);
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend).map_err(|error| {
        let mut stdout = io::stdout();
        let _ = execute!(stdout, DisableBracketedPaste, LeaveAlternateScreen);
        let _ = disable_raw_mode();
        error.into()
    })
}

fn restore_terminal(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
) -> Result<(), app::AppError> {
    disable_raw_mode()?;
    let _ = execute!(terminal.backend_mut(), DisableBracketedPaste);
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

/// Runs until the user quits or the terminal fails. The model comes back either way so a run in
/// flight can be shut down.
fn run(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    mut model: AppModel,
) -> (AppModel, Result<(), app::AppError>) {
    let mut next_tick = Instant::now() + TICK;
    loop {
        if let Err(error) = terminal.draw(|frame| ui::render(frame, &model)) {
            return (model, Err(error.into()));
        }

        let app_event = match next_event(next_tick) {
            Ok(app_event) => app_event,
            Err(error) => return (model, Err(error)),
        };
        if let Some(app_event) = app_event {
            let (next, command) = app::update(model, app_event);
            model = next;
            match command {
                AppCommand::None => {}
                AppCommand::Quit => return (model, Ok(())),
                AppCommand::StartRun => model = app::start_run(model),
            }
        }

        if Instant::now() >= next_tick {
            next_tick = Instant::now() + TICK;
            let (next, _command) = app::update(model, AppEvent::Tick);
            model = next;
        }
    }
}

/// Waits for terminal input until `deadline`.
fn next_event(deadline: Instant) -> Result<Option<AppEvent>, app::AppError> {
    let timeout = deadline.saturating_duration_since(Instant::now());
    if !event::poll(timeout)? {
        return Ok(None);
    }
    let app_event = match event::read()? {
        Event::Key(key) if key.kind != KeyEventKind::Release => Some(AppEvent::Key(key)),
        Event::Paste(text) => Some(AppEvent::Paste(text)),
        Event::Resize(width, height) => Some(AppEvent::Resize(width, height)),
        _ => None,
    };
    Ok(app_event)
}

/// Gives a cancelled run time to terminate before the process exits.
fn shutdown(mut model: AppModel) {
    let Some(mut run) = model.run.take() else {
        return;
    };
    run.cancel();
    match run.wait_for_completion(SHUTDOWN_WAIT) {
        Some(outcome) => info!("run ended on shutdown: {outcome:?}"),
        None => warn!("run (pid {}) still terminating at exit", run.pid()),
    }
}
