//! `eplus-worker` -- EnergyPlus job dispatch daemon.
//!
//! Watches a jobs directory for zipped simulation packages, runs each one
//! as its own process and touches a readiness file whenever the number of
//! unfinished jobs is within the host's CPU count.
//!
//! # Usage
//!
//! | Invocation                        | Behavior                                  |
//! |-----------------------------------|-------------------------------------------|
//! | `eplus-worker`                    | run the dispatch loop until killed        |
//! | `eplus-worker run-job <package>`  | run one job, exit 0 on success, 1 on failure |
//!
//! # Environment variables
//!
//! | Variable                     | Default                    | Description                           |
//! |------------------------------|----------------------------|---------------------------------------|
//! | `WORKER_HOME`                | current directory          | Base for the default paths below      |
//! | `JOBS_DIR`                   | `$WORKER_HOME/jobs`        | Watched directory of job packages     |
//! | `RESULTS_DIR`                | `$WORKER_HOME/results`     | One output directory per job          |
//! | `READY_PATH`                 | `$WORKER_HOME/../ready.txt`| Readiness signal file                 |
//! | `POLL_INTERVAL_SECS`         | `5`                        | Each of the two sleeps per cycle      |
//! | `RETRY_BACKOFF_SECS`         | `5`                        | Wait before re-reading a corrupt zip  |
//! | `REMOVE_PACKAGES`            | `true`                     | Delete packages once extracted        |
//! | `SIM_VERBOSITY`              | `verbose`                  | `verbose` or `quiet`                  |
//! | `COMPLETION_MARKER`          | `eplusout.end`             | File marking a finished job           |
//! | `JOB_ISOLATION`              | `process`                  | `process` or `task`                   |
//! | `ENERGYPLUS_EXE`             | --                         | Explicit EnergyPlus executable        |
//! | `ENERGYPLUS_INSTALL_VERSION` | --                         | e.g. `8-5-0`                          |
//! | `WORKER_LOG_PATH`            | --                         | Also append logs to this file         |
//! | `LOG_FORMAT`                 | `text`                     | `text` or `json`                      |

use std::ffi::OsString;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use eplus_core::config::{Isolation, WorkerConfig};
use eplus_core::liveness::MarkerFileTracker;
use eplus_worker::dispatch::Dispatcher;
use eplus_worker::launcher::{JobLauncher, ProcessLauncher, TaskLauncher, RUN_JOB_COMMAND};
use eplus_worker::logging::{self, LogSettings};
use eplus_worker::runner::JobRunner;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let settings = match LogSettings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = logging::init(&settings) {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    let config = match WorkerConfig::from_env() {
        Ok(config) => Arc::new(config),
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let args: Vec<OsString> = std::env::args_os().skip(1).collect();
    match args.as_slice() {
        [] => run_dispatcher(config).await,
        [command, package] if command == RUN_JOB_COMMAND => {
            run_single_job(config, Path::new(package)).await
        }
        _ => {
            tracing::error!("Usage: eplus-worker [{RUN_JOB_COMMAND} <package>]");
            ExitCode::from(2)
        }
    }
}

async fn run_dispatcher(config: Arc<WorkerConfig>) -> ExitCode {
    tracing::info!(isolation = config.isolation.as_str(), "Starting worker");

    match config.isolation {
        Isolation::Process => match ProcessLauncher::current_exe(&config) {
            Ok(launcher) => drive(&config, launcher).await,
            Err(e) => {
                tracing::error!(error = %e, "Cannot launch job processes");
                ExitCode::FAILURE
            }
        },
        Isolation::Task => drive(&config, TaskLauncher::new(Arc::clone(&config))).await,
    }
}

async fn drive<L: JobLauncher>(config: &WorkerConfig, launcher: L) -> ExitCode {
    let dispatcher = Dispatcher::new(config, launcher, MarkerFileTracker::from_config(config));
    if let Err(e) = dispatcher.prepare().await {
        tracing::error!(error = %e, "Cannot prepare worker directories");
        return ExitCode::FAILURE;
    }
    match dispatcher.run().await {
        Ok(never) => match never {},
        // Already logged by the loop.
        Err(_) => ExitCode::FAILURE,
    }
}

async fn run_single_job(config: Arc<WorkerConfig>, package: &Path) -> ExitCode {
    match JobRunner::new(config).run(package).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(_) => ExitCode::FAILURE,
    }
}
