use std::path::PathBuf;
use thiserror::Error;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CliInvocation {
    PrintHelp,
    PrintVersion,
    Tui { script: Option<PathBuf> },
}

#[derive(Debug, Error)]
pub enum CliParseError {
    #[error("unknown flag: {0}")]
    UnknownFlag(String),

    #[error("unexpected argument: {0}")]
    UnexpectedArgument(String),
}

pub fn parse_invocation(args: &[String]) -> Result<CliInvocation, CliParseError> {
    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        return Ok(CliInvocation::PrintHelp);
    }
    if args.iter().any(|arg| arg == "--version" || arg == "-V") {
        return Ok(CliInvocation::PrintVersion);
    }

    let mut script: Option<PathBuf> = None;
    let mut positional_only = false;
    for arg in args.iter().skip(1) {
        if !positional_only {
            if arg == "--" {
                positional_only = true;
                continue;
            }
            if arg.starts_with('-') && arg != "-" {
                return Err(CliParseError::UnknownFlag(arg.to_string()));
            }
        }
        if script.is_some() {
            return Err(CliParseError::UnexpectedArgument(arg.to_string()));
        }
        script = Some(PathBuf::from(arg));
    }

    Ok(CliInvocation::Tui { script })
}

pub fn help_text() -> String {
    format!(
        "{name}: collect Cloudways credentials and domains, then run the backup script\n\nUSAGE:\n  {name} [SCRIPT]        Start the TUI (SCRIPT defaults to ./domain-based-backup.sh)\n  {name} --help | --version\n\nKEYS:\n  Enter          confirm email / API key\n  Ctrl+D         finish domain entry\n  y / n / b      run / edit domains / back (confirm screen)\n  Esc            previous step\n  Ctrl+C/Ctrl+Q  quit (cancels a running backup)\n\nENV:\n  CW_EMAIL             Pre-fill the email field\n  CW_API_KEY           Pre-fill the API key field\n  CW_DOMAINS           Pre-fill the domain list\n  CW_BACKUP_SCRIPT     Script to run (overrides SCRIPT)\n  CW_BACKUP_LOG        Log file (default: <cache dir>/cwbackup/cwbackup.log)\n  CW_BACKUP_LOG_LEVEL  off|error|warn|info|debug|trace (default: info)\n",
        name = env!("CARGO_PKG_NAME")
    )
}
