//! Rolling file logs for settings events.
//!
//! # Responsibility
//! - Describe where and how verbosely events are written (`LogConfig`).
//! - Start the process-wide file logger once.
//!
//! # Invariants
//! - Events are metadata-only `key=value` lines; setting values never reach logs.
//! - A second `init_logging` must carry the active configuration.

use flexi_logger::{
    Cleanup, Criterion, Duplicate, FileSpec, LogSpecification, Logger, LoggerHandle, Naming,
    WriteMode,
};
use log::{info, LevelFilter};
use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};
use std::str::FromStr;

const ENV_LOG_DIR: &str = "SETTINGS_LOG_DIR";
const ENV_LOG_LEVEL: &str = "SETTINGS_LOG_LEVEL";
const LOG_FILE_BASENAME: &str = "settings";
const MAX_LOG_FILE_SIZE_BYTES: u64 = 10 * 1024 * 1024;
const DEFAULT_MAX_FILES: usize = 5;

static ACTIVE_LOGGER: OnceCell<(LogConfig, LoggerHandle)> = OnceCell::new();

/// File logger settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    dir: PathBuf,
    level: LevelFilter,
    max_files: usize,
    /// Warnings and errors are also echoed to stderr.
    echo_warnings: bool,
}

impl LogConfig {
    /// Info-level logs under `dir`, which must be absolute.
    ///
    /// # Errors
    /// - Returns an error when `dir` is empty or relative.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, String> {
        let dir = dir.as_ref();
        if dir.as_os_str().is_empty() {
            return Err("log directory cannot be empty".to_string());
        }
        if !dir.is_absolute() {
            return Err(format!(
                "log directory must be absolute, got `{}`",
                dir.display()
            ));
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            level: LevelFilter::Info,
            max_files: DEFAULT_MAX_FILES,
            echo_warnings: false,
        })
    }

    pub fn with_level(mut self, level: LevelFilter) -> Self {
        self.level = level;
        self
    }

    pub fn with_max_files(mut self, max_files: usize) -> Self {
        self.max_files = max_files.max(1);
        self
    }

    pub fn echo_warnings(mut self) -> Self {
        self.echo_warnings = true;
        self
    }

    /// Reads `SETTINGS_LOG_DIR` and the optional `SETTINGS_LOG_LEVEL`.
    ///
    /// Returns `Ok(None)` when no directory is configured.
    pub fn from_env() -> Result<Option<Self>, String> {
        Self::from_values(
            std::env::var(ENV_LOG_DIR).ok().as_deref(),
            std::env::var(ENV_LOG_LEVEL).ok().as_deref(),
        )
    }

    fn from_values(dir: Option<&str>, level: Option<&str>) -> Result<Option<Self>, String> {
        let Some(dir) = dir.map(str::trim).filter(|dir| !dir.is_empty()) else {
            return Ok(None);
        };
        let config = Self::new(dir)?;

        match level.map(str::trim).filter(|level| !level.is_empty()) {
            Some(level) => {
                let level = LevelFilter::from_str(level)
                    .map_err(|_| format!("unsupported log level `{level}`"))?;
                Ok(Some(config.with_level(level)))
            }
            None => Ok(Some(config)),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn level(&self) -> LevelFilter {
        self.level
    }
}

/// Starts the rolling file logger described by `config`.
///
/// # Errors
/// - Returns an error when the directory cannot be created or the logger
///   backend fails to start.
/// - Returns an error when a logger with a different configuration is
///   already running.
pub fn init_logging(config: &LogConfig) -> Result<(), String> {
    let (active, _) = ACTIVE_LOGGER.get_or_try_init(|| start(config))?;
    if active != config {
        return Err(format!(
            "logging already initialized at `{}` with level {}; refusing to switch",
            active.dir.display(),
            active.level
        ));
    }
    Ok(())
}

/// Configuration of the running logger, `None` before `init_logging`.
pub fn logging_status() -> Option<&'static LogConfig> {
    ACTIVE_LOGGER.get().map(|(config, _)| config)
}

fn start(config: &LogConfig) -> Result<(LogConfig, LoggerHandle), String> {
    std::fs::create_dir_all(&config.dir).map_err(|err| {
        format!(
            "failed to create log directory `{}`: {err}",
            config.dir.display()
        )
    })?;

    let duplicate = if config.echo_warnings {
        Duplicate::Warn
    } else {
        Duplicate::None
    };
    let handle = Logger::with(LogSpecification::builder().default(config.level).build())
        .log_to_file(
            FileSpec::default()
                .directory(config.dir.as_path())
                .basename(LOG_FILE_BASENAME),
        )
        .rotate(
            Criterion::Size(MAX_LOG_FILE_SIZE_BYTES),
            Naming::Numbers,
            Cleanup::KeepLogFiles(config.max_files),
        )
        .duplicate_to_stderr(duplicate)
        .write_mode(WriteMode::BufferAndFlush)
        .append()
        .format_for_files(flexi_logger::detailed_format)
        .start()
        .map_err(|err| format!("failed to start logger: {err}"))?;

    info!(
        "event=logging_init module=logging status=ok version={} level={} log_dir={}",
        env!("CARGO_PKG_VERSION"),
        config.level,
        config.dir.display()
    );
    Ok((config.clone(), handle))
}
