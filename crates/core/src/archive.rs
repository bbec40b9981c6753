//! Job package extraction.
//!
//! Packages are zip archives dropped into the jobs directory by an
//! external upload mechanism. An upload that is still being written
//! looks like a corrupt archive, so [`extract`] gives such a package one
//! more chance after a fixed backoff before declaring it broken.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use zip::ZipArchive;

use crate::config::DEFAULT_RETRY_BACKOFF_SECS;
use crate::error::ExtractError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractOptions {
    /// Delete the archive after a successful extraction.
    pub remove_on_success: bool,
    /// Wait before the single retry of a corrupt-looking archive.
    pub retry_backoff: Duration,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            remove_on_success: false,
            retry_backoff: Duration::from_secs(DEFAULT_RETRY_BACKOFF_SECS),
        }
    }
}

/// Outcome of a successful extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extraction {
    /// Number of archive entries written (directories included).
    pub entries: usize,
    /// 1 on a clean first pass, 2 if the retry was needed.
    pub attempts: u32,
}

/// Extract every entry of `archive` into `dest` (the working directory
/// when `None`).
///
/// A transient failure (see [`ExtractError::is_transient`]) is retried
/// exactly once after `options.retry_backoff`; a second failure is
/// returned as is. Files already written by a failed attempt are left in
/// place and overwritten by the retry.
pub async fn extract(
    archive: &Path,
    dest: Option<&Path>,
    options: &ExtractOptions,
) -> Result<Extraction, ExtractError> {
    let dest = destination(dest);

    let extraction = match extract_blocking(archive, &dest).await {
        Ok(entries) => Extraction {
            entries,
            attempts: 1,
        },
        Err(e) if e.is_transient() => {
            tracing::warn!(
                archive = %archive.display(),
                error = %e,
                backoff_ms = options.retry_backoff.as_millis() as u64,
                "Archive unreadable, retrying once after backoff",
            );
            tokio::time::sleep(options.retry_backoff).await;
            let entries = extract_blocking(archive, &dest).await?;
            Extraction {
                entries,
                attempts: 2,
            }
        }
        Err(e) => return Err(e),
    };

    if options.remove_on_success {
        tokio::fs::remove_file(archive)
            .await
            .map_err(|source| ExtractError::Remove {
                path: archive.to_path_buf(),
                source,
            })?;
    }

    tracing::debug!(
        archive = %archive.display(),
        dest = %dest.display(),
        entries = extraction.entries,
        attempts = extraction.attempts,
        "Archive extracted",
    );

    Ok(extraction)
}

/// Extraction target; the process working directory when unspecified.
fn destination(dest: Option<&Path>) -> PathBuf {
    dest.map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

/// Run one extraction attempt on the blocking pool; the zip reader is
/// synchronous.
async fn extract_blocking(archive: &Path, dest: &Path) -> Result<usize, ExtractError> {
    let archive = archive.to_path_buf();
    let dest = dest.to_path_buf();
    tokio::task::spawn_blocking(move || extract_once(&archive, &dest)).await?
}

fn extract_once(archive: &Path, dest: &Path) -> Result<usize, ExtractError> {
    let file = File::open(archive).map_err(|source| ExtractError::Open {
        path: archive.to_path_buf(),
        source,
    })?;
    let zip_error = |source| ExtractError::Archive {
        path: archive.to_path_buf(),
        source,
    };
    let mut zip = ZipArchive::new(file).map_err(zip_error)?;
    zip.extract(dest).map_err(zip_error)?;
    Ok(zip.len())
}
