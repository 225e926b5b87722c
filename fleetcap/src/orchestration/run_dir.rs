use std::path::{Path, PathBuf};
use chrono::NaiveDateTime;
use serde::Serialize;
use crate::format_path_component;

/// Second resolution, minute resolution made two quick runs share a folder
pub const RUN_TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H-%M-%S";

/// The folder one run writes its captures into, `{base}/{service}/{environment}/{timestamp}/`.
/// Only the path is decided here, the folder is created by the collector right before the first
/// download so an aborted run leaves nothing behind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunDirectory {
    path: PathBuf,
    service: String,
}

impl RunDirectory {
    pub fn new(base: &Path, service: &str, environment: &str, timestamp: NaiveDateTime) -> Self {
        let service = format_path_component(service);
        let parent = base.join(&service).join(format_path_component(environment));
        let stamp = timestamp.format(RUN_TIMESTAMP_FORMAT).to_string();

        // never reuse a folder from an earlier run
        let mut path = parent.join(&stamp);
        let mut n = 1;
        while path.exists() {
            path = parent.join(format!("{stamp}-{n}"));
            n += 1;
        }
        tracing::debug!("run directory is {}", path.display());
        Self { path, service }
    }

    pub fn for_now(base: &Path, service: &str, environment: &str) -> Self {
        Self::new(base, service, environment, chrono::Local::now().naive_local())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Where the merged capture of all targets goes
    pub fn merged_file(&self) -> PathBuf {
        self.path.join(format!("{}.pcap", self.service))
    }

    pub fn report_file(&self) -> PathBuf {
        self.path.join("report.json")
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use super::*;

    fn stamp() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 9).unwrap().and_hms_opt(14, 5, 7).unwrap()
    }

    #[test]
    fn test_run_directory_layout() {
        let dir = RunDirectory::new(Path::new("./Pcaps"), "sbc", "prod", stamp());
        assert_eq!(dir.path(), Path::new("./Pcaps/sbc/prod/2024-03-09-14-05-07"));
        assert_eq!(dir.merged_file(), PathBuf::from("./Pcaps/sbc/prod/2024-03-09-14-05-07/sbc.pcap"));
        assert_eq!(dir.report_file(), PathBuf::from("./Pcaps/sbc/prod/2024-03-09-14-05-07/report.json"));
    }

    #[test]
    fn test_run_directory_is_not_created() {
        let base = tempfile::tempdir().unwrap();
        let dir = RunDirectory::new(base.path(), "sbc", "lab", stamp());
        assert!(!dir.path().exists());
        assert!(!base.path().join("sbc").exists());
    }

    #[test]
    fn test_run_directory_avoids_existing() {
        let base = tempfile::tempdir().unwrap();
        let first = RunDirectory::new(base.path(), "sbc", "lab", stamp());
        std::fs::create_dir_all(first.path()).unwrap();

        let second = RunDirectory::new(base.path(), "sbc", "lab", stamp());
        assert_ne!(first, second);
        assert!(second.path().ends_with("2024-03-09-14-05-07-1"));
    }

    #[test]
    fn test_run_directory_sanitises_names() {
        let dir = RunDirectory::new(Path::new("base"), "voice/sbc", "lab env", stamp());
        assert_eq!(dir.path(), Path::new("base/voice-sbc/lab-env/2024-03-09-14-05-07"));
    }
}
