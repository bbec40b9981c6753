#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use eplus_core::config::{Verbosity, WorkerConfig};
use zip::write::SimpleFileOptions;

pub const MARKER: &str = "eplusout.end";

/// Fake EnergyPlus that records its arguments (one per line) next to
/// itself and writes the completion marker into `--output-directory`.
pub const RECORD_AND_FINISH: &str = r#"
log="$(dirname "$0")/args.txt"
: > "$log"
out=""
prev=""
for a in "$@"; do
  echo "$a" >> "$log"
  if [ "$prev" = "--output-directory" ]; then out="$a"; fi
  prev="$a"
done
echo "EnergyPlus Completed Successfully" > "$out/eplusout.end"
"#;

/// Fake EnergyPlus that exits cleanly without ever finishing the job.
pub const NEVER_FINISH: &str = "exit 0";

/// Fake EnergyPlus that fails like a severe input error.
pub const FAIL: &str = "echo '**  Fatal  ** Errors occurred on processing input file' >&2\nexit 1";

/// Scratch worker layout: `jobs/`, `results/`, `bin/energyplus`.
pub struct Workspace {
    pub root: tempfile::TempDir,
    pub config: WorkerConfig,
}

impl Workspace {
    pub fn new(script: &str) -> Self {
        let root = tempfile::tempdir().expect("create temp dir");
        let bin = root.path().join("bin");
        std::fs::create_dir(&bin).expect("create bin dir");
        let exe = write_script(&bin.join("energyplus"), script);

        let mut config = WorkerConfig::new(root.path().join("worker"));
        config.readiness_path = root.path().join("ready.txt");
        config.poll_interval = Duration::from_millis(200);
        config.retry_backoff = Duration::from_millis(50);
        config.verbosity = Verbosity::Quiet;
        config.energyplus.executable = Some(exe);
        std::fs::create_dir_all(&config.jobs_dir).expect("create jobs dir");
        std::fs::create_dir_all(&config.results_dir).expect("create results dir");

        Self { root, config }
    }

    /// Drop the standard three-file job package into the jobs directory.
    pub fn add_job(&self, name: &str) -> PathBuf {
        let package = self.config.jobs_dir.join(format!("{name}.zip"));
        write_zip(
            &package,
            &[
                ("in.idf", b"Version,8.5;".as_slice()),
                ("in.epw", b"LOCATION,Chicago Ohare Intl Ap,IL,USA".as_slice()),
                ("dummy.csv", b"a,b\n1,2\n".as_slice()),
            ],
        );
        package
    }

    pub fn job_dir(&self, name: &str) -> PathBuf {
        self.config.results_dir.join(name)
    }

    /// Arguments the fake executable was last called with.
    pub fn recorded_args(&self) -> Vec<String> {
        let log = self.root.path().join("bin").join("args.txt");
        std::fs::read_to_string(log)
            .expect("fake energyplus was not invoked")
            .lines()
            .map(str::to_string)
            .collect()
    }
}

pub fn write_script(path: &Path, body: &str) -> PathBuf {
    std::fs::write(path, format!("#!/bin/sh\n{body}\n")).expect("write script");
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).expect("chmod");
    path.to_path_buf()
}

pub fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
    let file = File::create(path).expect("create zip");
    let mut writer = zip::ZipWriter::new(file);
    for (name, data) in entries {
        writer
            .start_file(*name, SimpleFileOptions::default())
            .expect("start entry");
        writer.write_all(data).expect("write entry");
    }
    writer.finish().expect("finish zip");
}

/// Poll `cond` every 20ms until it holds or `timeout` passes.
pub async fn wait_for(timeout: Duration, cond: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    cond()
}
