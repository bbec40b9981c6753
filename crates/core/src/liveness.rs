//! In-flight job accounting.
//!
//! EnergyPlus signals normal termination by writing a marker file into
//! its output directory. A job directory without that marker is still
//! running (or died without finishing). The dispatcher only talks to
//! [`LivenessTracker`], so the marker convention can be swapped for
//! another completion signal without touching the loop.

use std::ffi::OsStr;
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::config::WorkerConfig;

/// Source of the in-flight job count.
pub trait LivenessTracker: Send + Sync {
    fn count_in_flight(&self) -> impl Future<Output = std::io::Result<usize>> + Send;
}

/// Counts result directories that lack the completion marker.
#[derive(Debug, Clone)]
pub struct MarkerFileTracker {
    results_dir: PathBuf,
    marker: String,
}

impl MarkerFileTracker {
    pub fn new(results_dir: impl Into<PathBuf>, marker: impl Into<String>) -> Self {
        Self {
            results_dir: results_dir.into(),
            marker: marker.into(),
        }
    }

    pub fn from_config(config: &WorkerConfig) -> Self {
        Self::new(&config.results_dir, &config.completion_marker)
    }
}

impl LivenessTracker for MarkerFileTracker {
    async fn count_in_flight(&self) -> std::io::Result<usize> {
        count_in_flight(&self.results_dir, &self.marker).await
    }
}

/// Number of directories under `results_dir` without `marker` inside.
///
/// Plain files under `results_dir` are ignored, as are directories that
/// vanish while being inspected.
pub async fn count_in_flight(results_dir: &Path, marker: &str) -> std::io::Result<usize> {
    let mut entries = tokio::fs::read_dir(results_dir).await?;
    let mut in_flight = 0;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_dir() {
            continue;
        }
        match has_marker(&entry.path(), marker).await {
            Ok(true) => {}
            Ok(false) => in_flight += 1,
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    Ok(in_flight)
}

async fn has_marker(dir: &Path, marker: &str) -> std::io::Result<bool> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_name() == OsStr::new(marker) {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MARKER: &str = "eplusout.end";

    #[tokio::test]
    async fn empty_results_directory_has_nothing_in_flight() {
        let tmp = tempfile::tempdir().unwrap();
        assert_eq!(count_in_flight(tmp.path(), MARKER).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn directory_without_marker_is_in_flight() {
        let tmp = tempfile::tempdir().unwrap();
        let job = tmp.path().join("test");
        std::fs::create_dir(&job).unwrap();
        std::fs::write(job.join("in.idf"), b"").unwrap();

        assert_eq!(count_in_flight(tmp.path(), MARKER).await.unwrap(), 1);

        std::fs::write(job.join(MARKER), b"EnergyPlus Completed Successfully").unwrap();

        assert_eq!(count_in_flight(tmp.path(), MARKER).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn plain_files_are_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("stray.log"), b"").unwrap();
        std::fs::create_dir(tmp.path().join("running")).unwrap();

        assert_eq!(count_in_flight(tmp.path(), MARKER).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn marker_must_match_exactly() {
        let tmp = tempfile::tempdir().unwrap();
        let job = tmp.path().join("test");
        std::fs::create_dir(&job).unwrap();
        std::fs::write(job.join("eplusout.end.bak"), b"").unwrap();

        assert_eq!(count_in_flight(tmp.path(), MARKER).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn tracker_counts_mixed_jobs() {
        let tmp = tempfile::tempdir().unwrap();
        for (name, done) in [("a", true), ("b", false), ("c", false), ("d", true)] {
            let dir = tmp.path().join(name);
            std::fs::create_dir(&dir).unwrap();
            if done {
                std::fs::write(dir.join(MARKER), b"").unwrap();
            }
        }

        let tracker = MarkerFileTracker::new(tmp.path(), MARKER);

        assert_eq!(tracker.count_in_flight().await.unwrap(), 2);
    }
}
