//! Fire-and-forget job launching.
//!
//! The dispatcher hands each discovered package to a [`JobLauncher`] and
//! drops the returned [`JobHandle`] without waiting on it. Completion is
//! observed through the results directory, never through the handle.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use eplus_core::config::WorkerConfig;
use eplus_core::error::JobError;
use tokio::process::Child;
use tokio::task::JoinHandle;

use crate::runner::JobRunner;

/// First argument that switches the worker binary into single-job mode.
pub const RUN_JOB_COMMAND: &str = "run-job";

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("Cannot locate the worker executable: {0}")]
    CurrentExe(#[source] std::io::Error),

    #[error("Failed to spawn job process for {}: {source}", .package.display())]
    Spawn {
        package: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to wait for job: {0}")]
    Wait(#[source] std::io::Error),

    #[error("Job task did not complete: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// A launched job. Dropping it leaves the job running.
#[derive(Debug)]
pub enum JobHandle {
    Process(Child),
    Task(JoinHandle<Result<(), JobError>>),
}

impl JobHandle {
    /// OS process id, for process-isolated jobs that are still running.
    pub fn pid(&self) -> Option<u32> {
        match self {
            Self::Process(child) => child.id(),
            Self::Task(_) => None,
        }
    }

    /// Wait for the job and report whether it succeeded.
    ///
    /// The dispatch loop never calls this.
    pub async fn wait(self) -> Result<bool, LaunchError> {
        match self {
            Self::Process(mut child) => {
                let status = child.wait().await.map_err(LaunchError::Wait)?;
                Ok(status.success())
            }
            Self::Task(handle) => Ok(handle.await?.is_ok()),
        }
    }
}

pub trait JobLauncher: Send + Sync {
    /// Start running `package` and return immediately.
    fn launch(&self, package: &Path) -> Result<JobHandle, LaunchError>;
}

/// Runs every job in its own OS process by re-executing a worker binary
/// as `<program> run-job <package>`.
///
/// The configuration travels in the child's environment, so the child
/// behaves exactly as the parent was configured.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
    env: Vec<(&'static str, OsString)>,
}

impl ProcessLauncher {
    pub fn new(program: impl Into<PathBuf>, config: &WorkerConfig) -> Self {
        Self {
            program: program.into(),
            env: config.to_env(),
        }
    }

    /// Launch jobs with the currently running binary.
    pub fn current_exe(config: &WorkerConfig) -> Result<Self, LaunchError> {
        let program = std::env::current_exe().map_err(LaunchError::CurrentExe)?;
        Ok(Self::new(program, config))
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl JobLauncher for ProcessLauncher {
    fn launch(&self, package: &Path) -> Result<JobHandle, LaunchError> {
        let child = tokio::process::Command::new(&self.program)
            .arg(RUN_JOB_COMMAND)
            .arg(package)
            .envs(self.env.iter().map(|(k, v)| (*k, v)))
            .stdin(Stdio::null())
            .kill_on_drop(false)
            .spawn()
            .map_err(|source| LaunchError::Spawn {
                package: package.to_path_buf(),
                source,
            })?;
        Ok(JobHandle::Process(child))
    }
}

/// Runs every job as a tokio task inside the current process.
#[derive(Debug, Clone)]
pub struct TaskLauncher {
    runner: Arc<JobRunner>,
}

impl TaskLauncher {
    pub fn new(config: Arc<WorkerConfig>) -> Self {
        Self {
            runner: Arc::new(JobRunner::new(config)),
        }
    }
}

impl JobLauncher for TaskLauncher {
    fn launch(&self, package: &Path) -> Result<JobHandle, LaunchError> {
        let runner = Arc::clone(&self.runner);
        let package = package.to_path_buf();
        let handle = tokio::spawn(async move { runner.run(&package).await });
        Ok(JobHandle::Task(handle))
    }
}
