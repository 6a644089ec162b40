//! Logging System
//!
//! Structured logging through `tracing`. Level, format, and destination come
//! from the `[logging]` config table, overridden by `MUSTER_LOG*` environment
//! variables and CLI flags.

use crate::error::ApiError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Resolve the log file path with precedence: CLI, MUSTER_LOG_FILE env, config file, default.
pub fn resolve_log_file_path(
    cli_file: Option<PathBuf>,
    config_file: Option<PathBuf>,
) -> Result<PathBuf, ApiError> {
    if let Some(p) = cli_file.filter(|p| !p.as_os_str().is_empty()) {
        return Ok(p);
    }
    if let Ok(env_path) = std::env::var("MUSTER_LOG_FILE") {
        if !env_path.is_empty() {
            return Ok(PathBuf::from(env_path));
        }
    }
    if let Some(p) = config_file.filter(|p| !p.as_os_str().is_empty()) {
        return Ok(p);
    }
    default_log_file_path()
}

fn default_log_file_path() -> Result<PathBuf, ApiError> {
    let project_dirs = crate::config::paths::project_dirs()?;
    let dir = project_dirs
        .state_dir()
        .unwrap_or_else(|| project_dirs.data_local_dir())
        .to_path_buf();
    Ok(dir.join("muster.log"))
}

/// The `[logging]` config table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `false` installs a subscriber that drops everything.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Base level directive, e.g. `info` or `off`.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// `text` or `json`.
    #[serde(default = "default_format")]
    pub format: String,

    /// `stdout`, `stderr`, `both`, `file` or `file+stderr`.
    #[serde(default = "default_output")]
    pub output: String,

    /// Log file for file targets; unset means `<state dir>/muster.log`.
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// ANSI colors for text written to a terminal stream.
    #[serde(default = "default_true")]
    pub color: bool,

    /// Per-module levels, e.g. `diskmuster::sync = "debug"`.
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "text".to_string()
}

fn default_output() -> String {
    "file".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            level: default_log_level(),
            format: default_format(),
            output: default_output(),
            file: None,
            color: default_true(),
            modules: HashMap::new(),
        }
    }
}

/// Line format of emitted events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "text" => Some(LogFormat::Text),
            "json" => Some(LogFormat::Json),
            _ => None,
        }
    }
}

/// Where events are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogTarget {
    Stdout,
    Stderr,
    Both,
    File,
    FileAndStderr,
}

impl LogTarget {
    fn parse(raw: &str) -> Result<Self, ApiError> {
        Ok(match raw {
            "stdout" => LogTarget::Stdout,
            "stderr" => LogTarget::Stderr,
            "both" => LogTarget::Both,
            "file" => LogTarget::File,
            "file+stderr" => LogTarget::FileAndStderr,
            other => {
                return Err(ApiError::ConfigError(format!(
                    "Invalid log output: {} (expected stdout, stderr, both, file or file+stderr)",
                    other
                )))
            }
        })
    }

    fn writes_file(self) -> bool {
        matches!(self, LogTarget::File | LogTarget::FileAndStderr)
    }
}

/// Install the global subscriber.
///
/// `MUSTER_LOG`, `MUSTER_LOG_FORMAT`, `MUSTER_LOG_OUTPUT` and `MUSTER_LOG_FILE`
/// override the config table. CLI flags are folded into the table before
/// this is called, so they win over both.
pub fn init_logging(config: Option<&LoggingConfig>) -> Result<(), ApiError> {
    let install_failed = |e: tracing_subscriber::util::TryInitError| {
        ApiError::ConfigError(format!("Failed to install logger: {}", e))
    };

    if config.map(|c| !c.enabled).unwrap_or(false) {
        return Registry::default()
            .with(EnvFilter::new("off"))
            .try_init()
            .map_err(install_failed);
    }

    let filter = level_filter(config)?;
    let format = log_format(config)?;
    let target = log_target(config)?;
    let ansi = config.map(|c| c.color).unwrap_or(true) && !target.writes_file();
    let writer = open_writer(target, config)?;

    let layer = fmt::layer()
        .with_target(true)
        .with_timer(ChronoUtc::rfc_3339())
        .with_writer(writer);
    match format {
        LogFormat::Json => Registry::default()
            .with(filter)
            .with(layer.json())
            .try_init()
            .map_err(install_failed),
        LogFormat::Text => Registry::default()
            .with(filter)
            .with(layer.with_ansi(ansi))
            .try_init()
            .map_err(install_failed),
    }
}

fn open_writer(target: LogTarget, config: Option<&LoggingConfig>) -> Result<BoxMakeWriter, ApiError> {
    match target {
        LogTarget::Stdout => return Ok(BoxMakeWriter::new(std::io::stdout)),
        LogTarget::Stderr => return Ok(BoxMakeWriter::new(std::io::stderr)),
        LogTarget::Both => return Ok(BoxMakeWriter::new(std::io::stdout.and(std::io::stderr))),
        LogTarget::File | LogTarget::FileAndStderr => {}
    }

    let path = resolve_log_file_path(None, config.and_then(|c| c.file.clone()))?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            ApiError::ConfigError(format!("Cannot create log directory {:?}: {}", parent, e))
        })?;
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map(Arc::new)
        .map_err(|e| ApiError::ConfigError(format!("Cannot open log file {:?}: {}", path, e)))?;

    Ok(match target {
        LogTarget::FileAndStderr => BoxMakeWriter::new(file.and(std::io::stderr)),
        _ => BoxMakeWriter::new(file),
    })
}

/// `MUSTER_LOG` replaces the whole filter; otherwise the configured level
/// plus per-module directives from the table and `MUSTER_LOG_MODULES`.
fn level_filter(config: Option<&LoggingConfig>) -> Result<EnvFilter, ApiError> {
    if let Ok(filter) = EnvFilter::try_from_env("MUSTER_LOG") {
        return Ok(filter);
    }

    let level = config.map(|c| c.level.as_str()).unwrap_or("info");
    let mut filter = EnvFilter::new(level);
    if level == "off" {
        return Ok(filter);
    }

    let mut directives: Vec<(String, String)> = config
        .map(|c| {
            c.modules
                .iter()
                .map(|(m, l)| (m.clone(), l.clone()))
                .collect()
        })
        .unwrap_or_default();
    if let Ok(raw) = std::env::var("MUSTER_LOG_MODULES") {
        directives.extend(
            raw.split(',')
                .filter_map(|spec| spec.split_once('='))
                .map(|(m, l)| (m.trim().to_string(), l.trim().to_string())),
        );
    }

    for (module, module_level) in directives {
        let directive = format!("{}={}", module, module_level)
            .parse()
            .map_err(|e| ApiError::ConfigError(format!("Invalid log directive {}: {}", module, e)))?;
        filter = filter.add_directive(directive);
    }
    Ok(filter)
}

/// An unrecognized `MUSTER_LOG_FORMAT` is ignored; an unrecognized config
/// value is an error.
fn log_format(config: Option<&LoggingConfig>) -> Result<LogFormat, ApiError> {
    if let Some(format) = std::env::var("MUSTER_LOG_FORMAT")
        .ok()
        .and_then(|raw| LogFormat::parse(&raw))
    {
        return Ok(format);
    }
    let raw = config.map(|c| c.format.as_str()).unwrap_or("text");
    LogFormat::parse(raw).ok_or_else(|| {
        ApiError::ConfigError(format!("Invalid log format: {} (expected text or json)", raw))
    })
}

fn log_target(config: Option<&LoggingConfig>) -> Result<LogTarget, ApiError> {
    match std::env::var("MUSTER_LOG_OUTPUT") {
        Ok(raw) => LogTarget::parse(&raw),
        Err(_) => LogTarget::parse(config.map(|c| c.output.as_str()).unwrap_or("file")),
    }
}
