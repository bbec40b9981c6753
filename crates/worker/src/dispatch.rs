//! The dispatch loop.
//!
//! One cycle: list pending packages, launch a job for each one, give the
//! launches a moment to create their job directories, count what is
//! still in flight and touch the readiness file if that count is within
//! capacity, then sleep again.
//!
//! Capacity only gates the readiness signal. Every discovered package is
//! launched straight away, however many there are; throttling is left to
//! whoever consumes the readiness file.

use std::collections::HashSet;
use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::time::Duration;

use eplus_core::config::WorkerConfig;
use eplus_core::intake;
use eplus_core::liveness::LivenessTracker;

use crate::launcher::{JobLauncher, LaunchError};

/// Errors that stop the loop. Individual job failures never get here.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Failed to prepare {}: {source}", .path.display())]
    Prepare {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to list jobs in {}: {source}", .path.display())]
    Intake {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Launch(#[from] LaunchError),

    #[error("Failed to count in-flight jobs: {0}")]
    Liveness(#[source] std::io::Error),

    #[error("Failed to write readiness file {}: {source}", .path.display())]
    Readiness {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Idle,
    Dispatching,
    Waiting,
    Signaling,
}

/// What one cycle saw and did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Packages listed in the jobs directory, including ones launched
    /// in an earlier cycle that are still being extracted.
    pub discovered: usize,
    /// Packages handed to the launcher this cycle.
    pub launched: usize,
    pub in_flight: usize,
    /// Whether the readiness file was touched.
    pub signaled: bool,
}

/// Number of processing units on this host.
pub fn sample_capacity() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Append-open and close the readiness file. Its content is irrelevant;
/// clearing it is the consumer's business.
pub async fn signal_ready(path: &Path) -> std::io::Result<()> {
    tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map(drop)
}

pub struct Dispatcher<L, T> {
    jobs_dir: PathBuf,
    results_dir: PathBuf,
    readiness_path: PathBuf,
    poll_interval: Duration,
    launcher: L,
    tracker: T,
    capacity: usize,
    state: DispatchState,
    /// Packages launched earlier that were still listed last cycle.
    launched: HashSet<PathBuf>,
}

impl<L: JobLauncher, T: LivenessTracker> Dispatcher<L, T> {
    /// Build a dispatcher, sampling host capacity once.
    pub fn new(config: &WorkerConfig, launcher: L, tracker: T) -> Self {
        let capacity = sample_capacity();
        tracing::info!(capacity, "This system has {capacity} CPUs available");
        Self::with_capacity(config, launcher, tracker, capacity)
    }

    pub fn with_capacity(config: &WorkerConfig, launcher: L, tracker: T, capacity: usize) -> Self {
        Self {
            jobs_dir: config.jobs_dir.clone(),
            results_dir: config.results_dir.clone(),
            readiness_path: config.readiness_path.clone(),
            poll_interval: config.poll_interval,
            launcher,
            tracker,
            capacity,
            state: DispatchState::Idle,
            launched: HashSet::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn state(&self) -> DispatchState {
        self.state
    }

    /// Create the jobs and results directories if they are missing.
    pub async fn prepare(&self) -> Result<(), DispatchError> {
        for dir in [&self.jobs_dir, &self.results_dir] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|source| DispatchError::Prepare {
                    path: dir.clone(),
                    source,
                })?;
        }
        Ok(())
    }

    /// Cycle forever. Only returns on an error the loop cannot survive,
    /// after logging it.
    pub async fn run(mut self) -> Result<Infallible, DispatchError> {
        tracing::info!(
            jobs_dir = %self.jobs_dir.display(),
            results_dir = %self.results_dir.display(),
            readiness_path = %self.readiness_path.display(),
            poll_interval_secs = self.poll_interval.as_secs(),
            capacity = self.capacity,
            "Dispatch loop started",
        );
        loop {
            if let Err(e) = self.run_cycle().await {
                tracing::error!(error = %e, details = ?e, "Dispatch loop failed");
                return Err(e);
            }
        }
    }

    /// Run one full cycle, including both sleeps.
    pub async fn run_cycle(&mut self) -> Result<CycleReport, DispatchError> {
        self.state = DispatchState::Dispatching;
        let (discovered, launched) = self.dispatch().await?;

        self.state = DispatchState::Waiting;
        tokio::time::sleep(self.poll_interval).await;

        self.state = DispatchState::Signaling;
        let in_flight = self
            .tracker
            .count_in_flight()
            .await
            .map_err(DispatchError::Liveness)?;
        let signaled = in_flight <= self.capacity;
        if signaled {
            signal_ready(&self.readiness_path)
                .await
                .map_err(|source| DispatchError::Readiness {
                    path: self.readiness_path.clone(),
                    source,
                })?;
            tracing::debug!(in_flight, capacity = self.capacity, "Ready for more jobs");
        } else {
            tracing::debug!(in_flight, capacity = self.capacity, "At capacity");
        }

        self.state = DispatchState::Idle;
        tokio::time::sleep(self.poll_interval).await;

        Ok(CycleReport {
            discovered,
            launched,
            in_flight,
            signaled,
        })
    }

    /// Launch every listed package not already launched.
    ///
    /// A package stays listed until its runner has extracted it (or for
    /// good, if extraction failed). Launching it again would put a second
    /// runner on the same job directory, so launched packages are skipped
    /// until they drop out of the listing.
    async fn dispatch(&mut self) -> Result<(usize, usize), DispatchError> {
        let jobs = intake::list_jobs(&self.jobs_dir)
            .await
            .map_err(|source| DispatchError::Intake {
                path: self.jobs_dir.clone(),
                source,
            })?;
        let listed: HashSet<&PathBuf> = jobs.iter().collect();
        self.launched.retain(|package| listed.contains(package));

        let mut launched = 0;
        for package in &jobs {
            if self.launched.contains(package) {
                tracing::debug!(package = %package.display(), "Job already launched");
                continue;
            }
            let handle = self.launcher.launch(package)?;
            tracing::info!(package = %package.display(), pid = ?handle.pid(), "Launched job");
            self.launched.insert(package.clone());
            launched += 1;
        }
        if !jobs.is_empty() {
            tracing::info!(
                count = jobs.len(),
                launched,
                "Found {} jobs, launched {launched}",
                jobs.len()
            );
        }
        Ok((jobs.len(), launched))
    }
}
