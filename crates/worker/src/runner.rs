//! Single-job execution.
//!
//! Takes one package from the jobs directory to a finished (or failed)
//! EnergyPlus run in `results/<job>/`. Failures are logged here and
//! returned; nobody retries them. The dispatcher never sees the result:
//! a failed job is simply a job directory that never gets its
//! completion marker.

use std::path::Path;
use std::sync::Arc;

use eplus_core::archive::{self, ExtractOptions};
use eplus_core::config::WorkerConfig;
use eplus_core::error::JobError;
use eplus_core::job::{self, Job};
use eplus_core::simulation::{EnergyPlus, SimulationOptions};

#[derive(Debug, Clone)]
pub struct JobRunner {
    config: Arc<WorkerConfig>,
}

impl JobRunner {
    pub fn new(config: Arc<WorkerConfig>) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Run the job packaged at `package`.
    pub async fn run(&self, package: &Path) -> Result<(), JobError> {
        let result = self.execute(package).await;
        if let Err(e) = &result {
            tracing::error!(package = %package.display(), error = %e, "Job failed");
        }
        result
    }

    async fn execute(&self, package: &Path) -> Result<(), JobError> {
        let job = Job::from_package(package, &self.config.results_dir)?;

        job::ensure_job_dir(&job.dir)
            .await
            .map_err(|source| JobError::CreateDir {
                path: job.dir.clone(),
                source,
            })?;
        tracing::info!(job_id = %job.id, dir = %job.dir.display(), "Starting job");

        let options = ExtractOptions {
            remove_on_success: self.config.remove_packages,
            retry_backoff: self.config.retry_backoff,
        };
        archive::extract(&job.package, Some(&job.dir), &options).await?;

        let inputs = job::locate_inputs(&job.dir).await?;
        let energyplus = EnergyPlus::locate(&self.config.energyplus).await?;
        let options = SimulationOptions {
            weather: Some(inputs.epw),
            output_directory: Some(job.dir.clone()),
            expand_objects: true,
            verbosity: self.config.verbosity,
            ..Default::default()
        };
        energyplus.run(&inputs.idf, &options).await?;

        tracing::info!(job_id = %job.id, "Simulation finished");
        Ok(())
    }
}
