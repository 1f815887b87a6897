use crate::infra::parse_level;
use log::LevelFilter;
use std::path::{Path, PathBuf};

pub const DEFAULT_SCRIPT: &str = "./domain-based-backup.sh";

const ENV_EMAIL: &str = "CW_EMAIL";
const ENV_API_KEY: &str = "CW_API_KEY";
const ENV_DOMAINS: &str = "CW_DOMAINS";
const ENV_SCRIPT: &str = "CW_BACKUP_SCRIPT";
const ENV_LOG: &str = "CW_BACKUP_LOG";
const ENV_LOG_LEVEL: &str = "CW_BACKUP_LOG_LEVEL";

/// Initial values for the three input fields. Held for one session only.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Prefill {
    pub email: Option<String>,
    pub api_key: Option<String>,
    pub domains: Option<String>,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub script_path: PathBuf,
    pub prefill: Prefill,
    pub log_path: PathBuf,
    pub log_level: LevelFilter,
    /// Problems found while resolving, reported once logging is up.
    pub warnings: Vec<String>,
}

impl Config {
    pub fn from_env(script_arg: Option<PathBuf>) -> Self {
        let cwd = std::env::current_dir().ok();
        Self::resolve(|key| std::env::var(key).ok(), script_arg, cwd.as_deref())
    }

    /// Script path priority: `CW_BACKUP_SCRIPT`, then the CLI argument, then [`DEFAULT_SCRIPT`].
    pub fn resolve(
        env: impl Fn(&str) -> Option<String>,
        script_arg: Option<PathBuf>,
        cwd: Option<&Path>,
    ) -> Self {
        let non_empty = |key: &str| env(key).filter(|value| !value.is_empty());
        let mut warnings = Vec::new();

        let script = non_empty(ENV_SCRIPT)
            .map(PathBuf::from)
            .or(script_arg)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SCRIPT));
        let script_path = absolutize(script, cwd);

        let log_path = non_empty(ENV_LOG)
            .map(|value| absolutize(PathBuf::from(value), cwd))
            .unwrap_or_else(default_log_path);

        let log_level = match non_empty(ENV_LOG_LEVEL) {
            None => LevelFilter::Info,
            Some(value) => parse_level(&value).unwrap_or_else(|| {
                warnings.push(format!("unknown {ENV_LOG_LEVEL} value {value:?}; using info"));
                LevelFilter::Info
            }),
        };

        Self {
            script_path,
            prefill: Prefill {
                email: non_empty(ENV_EMAIL),
                api_key: non_empty(ENV_API_KEY),
                domains: non_empty(ENV_DOMAINS),
            },
            log_path,
            log_level,
            warnings,
        }
    }
}

fn absolutize(path: PathBuf, cwd: Option<&Path>) -> PathBuf {
    if path.as_os_str().is_empty() || path.is_absolute() {
        return path;
    }
    match cwd {
        Some(cwd) => cwd.join(path),
        None => path,
    }
}

fn default_log_path() -> PathBuf {
    match dirs::cache_dir() {
        Some(dir) => dir.join("cwbackup").join("cwbackup.log"),
        None => std::env::temp_dir().join("cwbackup.log"),
    }
}
