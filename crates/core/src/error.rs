use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: '{value}' ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("Cannot determine the working directory: {0}")]
    CurrentDir(#[source] std::io::Error),
}

/// Failures while unpacking a job package.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("Failed to open archive {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Archive {} could not be extracted: {source}", .path.display())]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("Failed to remove archive {}: {source}", .path.display())]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Extraction task did not complete: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl ExtractError {
    /// Whether the failure looks like a partially written upload.
    ///
    /// Only these are worth a second attempt; a missing file or a
    /// permission problem will not fix itself during the backoff.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Archive { source, .. } => match source {
                zip::result::ZipError::InvalidArchive(_) => true,
                zip::result::ZipError::Io(e) => e.kind() == std::io::ErrorKind::UnexpectedEof,
                _ => false,
            },
            _ => false,
        }
    }
}

/// Failures of the external simulation process.
#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error("EnergyPlus executable not found: {0}")]
    ExecutableNotFound(String),

    #[error("Failed to spawn {}: {source}", .program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// `exit_code` is `-1` when the process was killed by a signal.
    #[error("EnergyPlus exited with code {exit_code}: {stderr}")]
    ExitStatus { exit_code: i32, stderr: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Everything that can sink a single job. None of these are retried.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Cannot derive a job id from package {}", .0.display())]
    InvalidPackage(PathBuf),

    #[error("Failed to create job directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error("Failed to scan job directory {}: {source}", .path.display())]
    ScanDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No *.{extension} file found in {}", .dir.display())]
    MissingInput {
        extension: &'static str,
        dir: PathBuf,
    },

    #[error(transparent)]
    Simulation(#[from] SimulationError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_archive_is_transient() {
        let err = ExtractError::Archive {
            path: PathBuf::from("/jobs/a.zip"),
            source: zip::result::ZipError::InvalidArchive("Could not find EOCD".into()),
        };
        assert!(err.is_transient());
    }

    #[test]
    fn truncated_read_is_transient() {
        let err = ExtractError::Archive {
            path: PathBuf::from("/jobs/a.zip"),
            source: zip::result::ZipError::Io(std::io::Error::from(
                std::io::ErrorKind::UnexpectedEof,
            )),
        };
        assert!(err.is_transient());
    }

    #[test]
    fn missing_archive_is_not_transient() {
        let err = ExtractError::Open {
            path: PathBuf::from("/jobs/a.zip"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert!(!err.is_transient());
    }

    #[test]
    fn display_missing_input() {
        let err = JobError::MissingInput {
            extension: "epw",
            dir: PathBuf::from("/results/test"),
        };
        assert_eq!(err.to_string(), "No *.epw file found in /results/test");
    }

    #[test]
    fn display_exit_status() {
        let err = SimulationError::ExitStatus {
            exit_code: 1,
            stderr: "Program terminated: EnergyPlus Terminated--Error(s) Detected.".into(),
        };
        assert_eq!(
            err.to_string(),
            "EnergyPlus exited with code 1: Program terminated: EnergyPlus Terminated--Error(s) Detected."
        );
    }

    #[test]
    fn remove_error_keeps_io_source() {
        let err = ExtractError::Remove {
            path: PathBuf::from("/jobs/a.zip"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        assert!(std::error::Error::source(&err).is_some());
    }
}
