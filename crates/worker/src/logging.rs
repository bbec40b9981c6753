//! Tracing subscriber setup.
//!
//! Logs always go to stdout. When `WORKER_LOG_PATH` is set they are also
//! appended, without colors, to that file; job processes inherit the
//! variable and append to the same file.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

pub const ENV_LOG_PATH: &str = "WORKER_LOG_PATH";
pub const ENV_LOG_FORMAT: &str = "LOG_FORMAT";

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "eplus_worker=info,eplus_core=info";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("expected text|json, got '{other}'")),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Invalid LOG_FORMAT: {0}")]
    Format(String),

    #[error("Failed to open log file {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to install tracing subscriber: {0}")]
    Init(#[from] TryInitError),
}

/// Logging settings taken from the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogSettings {
    pub path: Option<PathBuf>,
    pub format: LogFormat,
}

impl LogSettings {
    pub fn from_env() -> Result<Self, LoggingError> {
        let path = std::env::var_os(ENV_LOG_PATH)
            .filter(|p| !p.is_empty())
            .map(PathBuf::from);
        let format = match std::env::var(ENV_LOG_FORMAT) {
            Ok(v) => v.parse().map_err(LoggingError::Format)?,
            Err(_) => LogFormat::default(),
        };
        Ok(Self { path, format })
    }
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn stdout_layer(format: LogFormat) -> BoxedLayer {
    match format {
        LogFormat::Text => fmt::layer().boxed(),
        LogFormat::Json => fmt::layer().json().boxed(),
    }
}

fn file_layer(path: &Path, format: LogFormat) -> Result<BoxedLayer, LoggingError> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| LoggingError::Open {
            path: path.to_path_buf(),
            source,
        })?;
    let writer = Mutex::new(file);
    Ok(match format {
        LogFormat::Text => fmt::layer().with_ansi(false).with_writer(writer).boxed(),
        LogFormat::Json => fmt::layer().json().with_writer(writer).boxed(),
    })
}

/// Install the global subscriber. Call once, before anything logs.
pub fn init(settings: &LogSettings) -> Result<(), LoggingError> {
    let mut layers = vec![stdout_layer(settings.format)];
    if let Some(path) = &settings.path {
        layers.push(file_layer(path, settings.format)?);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into()))
        .try_init()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_parses() {
        assert_eq!("json".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!("Text".parse::<LogFormat>(), Ok(LogFormat::Text));
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn unopenable_log_file_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("missing").join("worker.log");

        let result = file_layer(&path, LogFormat::Text);

        assert!(matches!(result, Err(LoggingError::Open { .. })));
    }

    #[test]
    fn file_layer_appends_to_existing_log() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("worker.log");
        std::fs::write(&path, b"earlier run\n").unwrap();

        let _layer = file_layer(&path, LogFormat::Text).unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"earlier run\n");
    }
}
