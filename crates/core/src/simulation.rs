//! EnergyPlus command-line contract.
//!
//! Resolves the installed executable, translates [`SimulationOptions`]
//! into its arguments and runs it to completion. The simulation itself is
//! opaque: success means exit status zero, nothing more.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use crate::config::{EnergyPlusConfig, Verbosity};
use crate::error::SimulationError;

#[cfg(windows)]
pub const EXECUTABLE_NAME: &str = "energyplus.exe";
#[cfg(not(windows))]
pub const EXECUTABLE_NAME: &str = "energyplus";

/// Directory under the install home holding the bundled weather files.
pub const WEATHER_DIR: &str = "WeatherData";

/// Upper bound on captured stderr; the tail is kept for error messages.
const MAX_STDERR_BYTES: usize = 64 * 1024;

/// Naming style for output files (`--output-suffix`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputSuffix {
    /// `eplustbl.csv`
    Legacy,
    /// `eplusTable.csv`
    Capital,
    /// `eplus-table.csv`
    Dash,
}

impl OutputSuffix {
    pub fn as_flag(&self) -> &'static str {
        match self {
            Self::Legacy => "L",
            Self::Capital => "C",
            Self::Dash => "D",
        }
    }
}

/// Everything EnergyPlus accepts besides the input file itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulationOptions {
    /// Weather file. A path that is not an existing file is looked up in
    /// the install's `WeatherData` directory.
    pub weather: Option<PathBuf>,
    pub output_directory: Option<PathBuf>,
    /// Force an annual simulation.
    pub annual: bool,
    /// Force a design-day-only simulation.
    pub design_day: bool,
    /// Input data dictionary; EnergyPlus uses its bundled one when unset.
    pub idd: Option<PathBuf>,
    pub epmacro: bool,
    /// Run ExpandObjects before the simulation.
    pub expand_objects: bool,
    /// Run ReadVarsESO after the simulation.
    pub readvars: bool,
    pub output_prefix: Option<String>,
    pub output_suffix: Option<OutputSuffix>,
    pub verbosity: Verbosity,
}

/// A resolved EnergyPlus installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnergyPlus {
    executable: PathBuf,
}

impl EnergyPlus {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    /// Resolve the executable: explicit path first, then the platform
    /// install home for a configured version, then `PATH`.
    pub async fn locate(config: &EnergyPlusConfig) -> Result<Self, SimulationError> {
        if let Some(exe) = &config.executable {
            return Ok(Self::new(exe.clone()));
        }
        if let Some(version) = &config.install_version {
            return Ok(Self::new(install_home(version).join(EXECUTABLE_NAME)));
        }
        let found = find_on_path(EXECUTABLE_NAME).await.ok_or_else(|| {
            SimulationError::ExecutableNotFound(format!("{EXECUTABLE_NAME} is not on PATH"))
        })?;
        // Distribution packages link /usr/bin/energyplus into the install
        // home; the weather data lives next to the real binary.
        let resolved = tokio::fs::canonicalize(&found).await.unwrap_or(found);
        Ok(Self::new(resolved))
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Install home, i.e. the directory containing the executable.
    pub fn home(&self) -> &Path {
        self.executable.parent().unwrap_or_else(|| Path::new("."))
    }

    pub fn weather_dir(&self) -> PathBuf {
        self.home().join(WEATHER_DIR)
    }

    /// Version encoded in the install directory name, e.g. `8-5-0`.
    pub fn version(&self) -> Option<String> {
        install_version_from_path(&self.executable)
    }

    /// Build the argument list for running `idf` with `options`.
    ///
    /// Flags follow the order EnergyPlus documents them in; unset
    /// options are omitted and the absolute input path comes last.
    pub fn command_args(
        &self,
        idf: &Path,
        options: &SimulationOptions,
    ) -> std::io::Result<Vec<OsString>> {
        let mut args: Vec<OsString> = Vec::new();

        if let Some(weather) = &options.weather {
            let weather = if weather.is_file() {
                std::path::absolute(weather)?
            } else {
                self.weather_dir().join(weather)
            };
            args.push("--weather".into());
            args.push(weather.into_os_string());
        }
        if let Some(dir) = &options.output_directory {
            args.push("--output-directory".into());
            args.push(std::path::absolute(dir)?.into_os_string());
        }
        if options.annual {
            args.push("--annual".into());
        }
        if options.design_day {
            args.push("--design-day".into());
        }
        if let Some(idd) = &options.idd {
            args.push("--idd".into());
            args.push(std::path::absolute(idd)?.into_os_string());
        }
        if options.epmacro {
            args.push("--epmacro".into());
        }
        if options.expand_objects {
            args.push("--expandobjects".into());
        }
        if options.readvars {
            args.push("--readvars".into());
        }
        if let Some(prefix) = &options.output_prefix {
            args.push("--output-prefix".into());
            args.push(prefix.into());
        }
        if let Some(suffix) = options.output_suffix {
            args.push("--output-suffix".into());
            args.push(suffix.as_flag().into());
        }
        args.push(std::path::absolute(idf)?.into_os_string());

        Ok(args)
    }

    /// Run a simulation and wait for it to exit.
    ///
    /// The process runs in a scratch working directory that is removed
    /// afterwards, so only `--output-directory` receives files. Stdout is
    /// inherited when verbose and discarded when quiet; stderr is captured
    /// for the error report.
    pub async fn run(&self, idf: &Path, options: &SimulationOptions) -> Result<(), SimulationError> {
        let args = self.command_args(idf, options)?;
        let run_dir = tempfile::tempdir()?;

        tracing::info!(
            executable = %self.executable.display(),
            idf = %idf.display(),
            verbosity = options.verbosity.as_str(),
            "Starting EnergyPlus",
        );

        let stdout = match options.verbosity {
            Verbosity::Verbose => Stdio::inherit(),
            Verbosity::Quiet => Stdio::null(),
        };
        let mut child = Command::new(&self.executable)
            .args(&args)
            .current_dir(run_dir.path())
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| SimulationError::Spawn {
                program: self.executable.clone(),
                source,
            })?;

        let stderr = match child.stderr.take() {
            Some(handle) => read_tail(handle, MAX_STDERR_BYTES).await?,
            None => Vec::new(),
        };
        let status = child.wait().await?;

        if status.success() {
            return Ok(());
        }
        Err(SimulationError::ExitStatus {
            exit_code: status.code().unwrap_or(-1),
            stderr: stderr_tail(&stderr),
        })
    }

    /// Ask the executable for its version banner.
    pub async fn query_version(&self) -> Result<String, SimulationError> {
        let output = Command::new(&self.executable)
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| SimulationError::Spawn {
                program: self.executable.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(SimulationError::ExitStatus {
                exit_code: output.status.code().unwrap_or(-1),
                stderr: stderr_tail(&output.stderr),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Platform install location for an EnergyPlus version such as `8-5-0`.
pub fn install_home(version: &str) -> PathBuf {
    if cfg!(windows) {
        PathBuf::from(format!("C:/EnergyPlusV{version}"))
    } else if cfg!(target_os = "macos") {
        PathBuf::from(format!("/Applications/EnergyPlus-{version}"))
    } else {
        PathBuf::from(format!("/usr/local/EnergyPlus-{version}"))
    }
}

/// Version suffix of the executable's directory, e.g.
/// `/usr/local/EnergyPlus-8-5-0/energyplus` gives `8-5-0`.
pub fn install_version_from_path(executable: &Path) -> Option<String> {
    let dir = executable.parent()?.file_name()?.to_str()?;
    let start = dir.char_indices().rev().nth(4)?.0;
    Some(dir[start..].to_string())
}

async fn find_on_path(name: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    find_in_dirs(&path, name).await
}

/// First regular file called `name` in a `PATH`-style directory list.
async fn find_in_dirs(dirs: &std::ffi::OsStr, name: &str) -> Option<PathBuf> {
    for dir in std::env::split_paths(dirs) {
        let candidate = dir.join(name);
        if tokio::fs::metadata(&candidate)
            .await
            .is_ok_and(|meta| meta.is_file())
        {
            return Some(candidate);
        }
    }
    None
}

/// Drain `reader` to EOF, keeping at most the last `limit` bytes.
async fn read_tail<R: AsyncRead + Unpin>(mut reader: R, limit: usize) -> std::io::Result<Vec<u8>> {
    let mut tail = Vec::with_capacity(limit.min(8 * 1024));
    let mut chunk = [0u8; 8 * 1024];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Ok(tail);
        }
        tail.extend_from_slice(&chunk[..n]);
        if tail.len() > limit {
            tail.drain(..tail.len() - limit);
        }
    }
}

fn stderr_tail(bytes: &[u8]) -> String {
    let start = bytes.len().saturating_sub(MAX_STDERR_BYTES);
    String::from_utf8_lossy(&bytes[start..]).trim().to_string()
}
