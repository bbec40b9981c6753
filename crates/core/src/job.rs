//! Job identity and the per-job directory.
//!
//! A job is named after its package: `results/<stem>/` holds the
//! extracted inputs and, once the simulation has run, its outputs.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::JobError;

/// Suffix stripped from a package name to obtain the job id.
pub const PACKAGE_EXTENSION: &str = ".zip";

/// Simulation definition (EnergyPlus input data file).
pub const IDF_EXTENSION: &str = "idf";

/// Weather data file.
pub const EPW_EXTENSION: &str = "epw";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: String,
    pub package: PathBuf,
    /// `results_dir/<id>`.
    pub dir: PathBuf,
}

impl Job {
    pub fn from_package(package: &Path, results_dir: &Path) -> Result<Self, JobError> {
        let id = job_id(package).ok_or_else(|| JobError::InvalidPackage(package.to_path_buf()))?;
        Ok(Self {
            dir: results_dir.join(&id),
            id,
            package: package.to_path_buf(),
        })
    }
}

/// Derive the job id from the package's file name by dropping `.zip`.
///
/// Names without the extension are used unchanged. Returns `None` for
/// paths with no usable file name.
pub fn job_id(package: &Path) -> Option<String> {
    let name = package.file_name()?.to_str()?;
    let id = name.strip_suffix(PACKAGE_EXTENSION).unwrap_or(name);
    (!id.is_empty()).then(|| id.to_string())
}

/// Create the job directory, tolerating one that already exists.
///
/// Re-entry leaves any files already inside untouched. A non-directory
/// occupying the path is still an error.
pub async fn ensure_job_dir(dir: &Path) -> std::io::Result<()> {
    match tokio::fs::create_dir(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            if tokio::fs::metadata(dir).await?.is_dir() {
                Ok(())
            } else {
                Err(e)
            }
        }
        Err(e) => Err(e),
    }
}

/// The two files a simulation cannot run without.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobInputs {
    pub idf: PathBuf,
    pub epw: PathBuf,
}

/// Find the definition and weather files directly inside `dir`.
///
/// Extensions match case-insensitively. When several candidates exist the
/// lexicographically first one is used.
pub async fn locate_inputs(dir: &Path) -> Result<JobInputs, JobError> {
    let scan_error = |source| JobError::ScanDir {
        path: dir.to_path_buf(),
        source,
    };

    let mut idfs = Vec::new();
    let mut epws = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await.map_err(scan_error)?;
    while let Some(entry) = entries.next_entry().await.map_err(scan_error)? {
        let path = entry.path();
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        if ext.eq_ignore_ascii_case(IDF_EXTENSION) {
            idfs.push(path);
        } else if ext.eq_ignore_ascii_case(EPW_EXTENSION) {
            epws.push(path);
        }
    }
    idfs.sort();
    epws.sort();

    let missing = |extension| JobError::MissingInput {
        extension,
        dir: dir.to_path_buf(),
    };
    Ok(JobInputs {
        idf: idfs.into_iter().next().ok_or_else(|| missing(IDF_EXTENSION))?,
        epw: epws.into_iter().next().ok_or_else(|| missing(EPW_EXTENSION))?,
    })
}
