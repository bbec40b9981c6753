//! Worker configuration.
//!
//! [`WorkerConfig`] is built once at startup from environment variables
//! and handed to every component. [`WorkerConfig::to_env`] renders it
//! back into the same variables so a job process launched by the
//! dispatcher sees exactly the parent's settings.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Environment variables
// ---------------------------------------------------------------------------

pub const ENV_WORKER_HOME: &str = "WORKER_HOME";
pub const ENV_JOBS_DIR: &str = "JOBS_DIR";
pub const ENV_RESULTS_DIR: &str = "RESULTS_DIR";
pub const ENV_READY_PATH: &str = "READY_PATH";
pub const ENV_POLL_INTERVAL_SECS: &str = "POLL_INTERVAL_SECS";
pub const ENV_RETRY_BACKOFF_SECS: &str = "RETRY_BACKOFF_SECS";
pub const ENV_REMOVE_PACKAGES: &str = "REMOVE_PACKAGES";
pub const ENV_SIM_VERBOSITY: &str = "SIM_VERBOSITY";
pub const ENV_COMPLETION_MARKER: &str = "COMPLETION_MARKER";
pub const ENV_JOB_ISOLATION: &str = "JOB_ISOLATION";
pub const ENV_ENERGYPLUS_EXE: &str = "ENERGYPLUS_EXE";
pub const ENV_ENERGYPLUS_INSTALL_VERSION: &str = "ENERGYPLUS_INSTALL_VERSION";

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// Seconds slept by each of the two waits in a dispatch cycle.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Seconds to wait before the single extraction retry.
pub const DEFAULT_RETRY_BACKOFF_SECS: u64 = 5;

/// File EnergyPlus writes into its output directory on normal termination.
pub const DEFAULT_COMPLETION_MARKER: &str = "eplusout.end";

pub const DEFAULT_READINESS_FILE: &str = "ready.txt";

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// How chatty the simulation process is allowed to be on stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    #[default]
    Verbose,
    Quiet,
}

impl Verbosity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Verbose => "verbose",
            Self::Quiet => "quiet",
        }
    }
}

impl FromStr for Verbosity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "verbose" | "v" => Ok(Self::Verbose),
            "quiet" | "q" => Ok(Self::Quiet),
            other => Err(format!("expected verbose|v|quiet|q, got '{other}'")),
        }
    }
}

/// Where a launched job executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Isolation {
    /// A separate OS process per job (the worker binary re-executed).
    #[default]
    Process,
    /// A tokio task inside the dispatcher process.
    Task,
}

impl Isolation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Process => "process",
            Self::Task => "task",
        }
    }
}

impl FromStr for Isolation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "process" => Ok(Self::Process),
            "task" => Ok(Self::Task),
            other => Err(format!("expected process|task, got '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Config structs
// ---------------------------------------------------------------------------

/// How to find the EnergyPlus executable. Both unset means "search PATH".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnergyPlusConfig {
    /// Explicit path to the executable; wins over everything else.
    pub executable: Option<PathBuf>,
    /// Installed version such as `8-5-0`, mapped to the platform install home.
    pub install_version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Watched directory holding pending job packages.
    pub jobs_dir: PathBuf,
    /// One subdirectory per job is created here.
    pub results_dir: PathBuf,
    /// Zero-byte file touched when in-flight load is within capacity.
    pub readiness_path: PathBuf,
    pub poll_interval: Duration,
    pub retry_backoff: Duration,
    /// Delete the package once it has been extracted.
    pub remove_packages: bool,
    pub verbosity: Verbosity,
    pub completion_marker: String,
    pub isolation: Isolation,
    pub energyplus: EnergyPlusConfig,
}

impl WorkerConfig {
    /// Default layout rooted at `home`: `jobs/`, `results/` and a
    /// readiness file one level above `home`.
    pub fn new(home: impl AsRef<Path>) -> Self {
        let home = home.as_ref();
        Self {
            jobs_dir: home.join("jobs"),
            results_dir: home.join("results"),
            readiness_path: home.join("..").join(DEFAULT_READINESS_FILE),
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            retry_backoff: Duration::from_secs(DEFAULT_RETRY_BACKOFF_SECS),
            remove_packages: true,
            verbosity: Verbosity::default(),
            completion_marker: DEFAULT_COMPLETION_MARKER.to_string(),
            isolation: Isolation::default(),
            energyplus: EnergyPlusConfig::default(),
        }
    }

    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    ///
    /// Unset or empty variables fall back to their defaults. Relative
    /// paths are resolved against the current directory.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let home = match get(ENV_WORKER_HOME) {
            Some(home) => absolute(PathBuf::from(home))?,
            None => std::env::current_dir().map_err(ConfigError::CurrentDir)?,
        };
        let mut config = Self::new(&home);

        if let Some(dir) = get(ENV_JOBS_DIR) {
            config.jobs_dir = absolute(PathBuf::from(dir))?;
        }
        if let Some(dir) = get(ENV_RESULTS_DIR) {
            config.results_dir = absolute(PathBuf::from(dir))?;
        }
        if let Some(path) = get(ENV_READY_PATH) {
            config.readiness_path = absolute(PathBuf::from(path))?;
        }
        if let Some(secs) = get(ENV_POLL_INTERVAL_SECS) {
            config.poll_interval = parse_secs(ENV_POLL_INTERVAL_SECS, &secs)?;
        }
        if let Some(secs) = get(ENV_RETRY_BACKOFF_SECS) {
            config.retry_backoff = parse_secs(ENV_RETRY_BACKOFF_SECS, &secs)?;
        }
        if let Some(flag) = get(ENV_REMOVE_PACKAGES) {
            config.remove_packages = parse_bool(ENV_REMOVE_PACKAGES, &flag)?;
        }
        if let Some(v) = get(ENV_SIM_VERBOSITY) {
            config.verbosity = parse_with(ENV_SIM_VERBOSITY, &v)?;
        }
        if let Some(marker) = get(ENV_COMPLETION_MARKER) {
            config.completion_marker = marker;
        }
        if let Some(v) = get(ENV_JOB_ISOLATION) {
            config.isolation = parse_with(ENV_JOB_ISOLATION, &v)?;
        }
        config.energyplus.executable = get(ENV_ENERGYPLUS_EXE).map(PathBuf::from);
        config.energyplus.install_version = get(ENV_ENERGYPLUS_INSTALL_VERSION);

        Ok(config)
    }

    /// Render the configuration as environment variables understood by
    /// [`from_lookup`](Self::from_lookup).
    ///
    /// Intervals are whole seconds, so sub-second durations are rounded
    /// down.
    pub fn to_env(&self) -> Vec<(&'static str, OsString)> {
        let mut vars = vec![
            (ENV_JOBS_DIR, self.jobs_dir.clone().into_os_string()),
            (ENV_RESULTS_DIR, self.results_dir.clone().into_os_string()),
            (ENV_READY_PATH, self.readiness_path.clone().into_os_string()),
            (
                ENV_POLL_INTERVAL_SECS,
                self.poll_interval.as_secs().to_string().into(),
            ),
            (
                ENV_RETRY_BACKOFF_SECS,
                self.retry_backoff.as_secs().to_string().into(),
            ),
            (ENV_REMOVE_PACKAGES, self.remove_packages.to_string().into()),
            (ENV_SIM_VERBOSITY, self.verbosity.as_str().into()),
            (ENV_COMPLETION_MARKER, self.completion_marker.clone().into()),
            (ENV_JOB_ISOLATION, self.isolation.as_str().into()),
        ];
        if let Some(exe) = &self.energyplus.executable {
            vars.push((ENV_ENERGYPLUS_EXE, exe.clone().into_os_string()));
        }
        if let Some(version) = &self.energyplus.install_version {
            vars.push((ENV_ENERGYPLUS_INSTALL_VERSION, version.clone().into()));
        }
        vars
    }
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

fn absolute(path: PathBuf) -> Result<PathBuf, ConfigError> {
    std::path::absolute(path).map_err(ConfigError::CurrentDir)
}

fn parse_secs(var: &'static str, value: &str) -> Result<Duration, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|e| ConfigError::Invalid {
            var,
            value: value.to_string(),
            reason: e.to_string(),
        })
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            var,
            value: value.to_string(),
            reason: "expected true or false".to_string(),
        }),
    }
}

fn parse_with<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr<Err = String>,
{
    value.parse().map_err(|reason| ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason,
    })
}
