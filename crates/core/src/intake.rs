//! Pending job discovery.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// Housekeeping entries that live in the jobs directory but are not jobs.
pub const IGNORED_ENTRIES: &[&str] = &[".gitignore"];

fn is_ignored(name: &OsStr) -> bool {
    IGNORED_ENTRIES.iter().any(|ignored| name == OsStr::new(ignored))
}

/// List every pending job package in `jobs_dir`.
///
/// Entries come back in directory-listing order, joined onto `jobs_dir`.
/// Nothing is filtered except [`IGNORED_ENTRIES`].
pub async fn list_jobs(jobs_dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(jobs_dir).await?;
    let mut jobs = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if is_ignored(&entry.file_name()) {
            continue;
        }
        jobs.push(entry.path());
    }
    Ok(jobs)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[tokio::test]
    async fn empty_directory_has_no_jobs() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(list_jobs(tmp.path()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn returns_every_package_except_sentinel() {
        let tmp = tempfile::tempdir().unwrap();
        for name in ["a.zip", "b.zip", "c.zip", ".gitignore"] {
            std::fs::write(tmp.path().join(name), b"").unwrap();
        }

        let jobs: HashSet<PathBuf> = list_jobs(tmp.path()).await.unwrap().into_iter().collect();

        let expected: HashSet<PathBuf> = ["a.zip", "b.zip", "c.zip"]
            .iter()
            .map(|n| tmp.path().join(n))
            .collect();
        assert_eq!(jobs, expected);
    }

    #[tokio::test]
    async fn order_is_stable_for_unchanged_directory() {
        let tmp = tempfile::tempdir().unwrap();
        for i in 0..10 {
            std::fs::write(tmp.path().join(format!("job{i}.zip")), b"").unwrap();
        }

        let first = list_jobs(tmp.path()).await.unwrap();
        let second = list_jobs(tmp.path()).await.unwrap();

        assert_eq!(first.len(), 10);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn listing_does_not_touch_packages() {
        let tmp = tempfile::tempdir().unwrap();
        let package = tmp.path().join("test.zip");
        std::fs::write(&package, b"payload").unwrap();

        list_jobs(tmp.path()).await.unwrap();

        assert_eq!(std::fs::read(&package).unwrap(), b"payload");
    }

    #[tokio::test]
    async fn missing_directory_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(list_jobs(&tmp.path().join("nope")).await.is_err());
    }
}
