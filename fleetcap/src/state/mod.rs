use std::collections::BTreeMap;
use std::path::PathBuf;
use serde::{Deserialize, Serialize};
use fleetcap_schemas::capture_config::ServiceSelector;
use crate::orchestration::run_dir::RunDirectory;
use crate::target::Target;

// the data structures in this file are the in-memory state of one capture run, nothing here is
// persisted or carried over between runs

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LaunchStatus {
    Pending,
    Running,
    LaunchFailed {
        reason: String,
    },
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StopStatus {
    NotStopped,
    Stopped,
    StopFailed {
        reason: String,
    },
}

/// Binds a discovered target to its remote capture. The target is borrowed from the discovered
/// set, sessions never outlive it.
#[derive(Serialize, Debug, Clone)]
pub struct CaptureSession<'a> {
    pub target: &'a Target,
    pub launch_status: LaunchStatus,
    pub stop_status: StopStatus,
    /// set once stop and stage succeeds
    pub staged_remote_path: Option<String>,
    /// set once the capture has been downloaded
    pub local_path: Option<PathBuf>,
    /// set if the download was attempted and failed
    pub download_failure: Option<String>,
}

impl<'a> CaptureSession<'a> {
    pub fn new(target: &'a Target) -> Self {
        Self {
            target,
            launch_status: LaunchStatus::Pending,
            stop_status: StopStatus::NotStopped,
            staged_remote_path: None,
            local_path: None,
            download_failure: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.launch_status == LaunchStatus::Running
    }

    pub fn is_stopped(&self) -> bool {
        self.stop_status == StopStatus::Stopped
    }

    pub fn is_collected(&self) -> bool {
        self.local_path.is_some()
    }
}

/// Target id to session, ordered so reports come out the same way every time
pub type SessionMap<'a> = BTreeMap<String, CaptureSession<'a>>;

/// Everything one invocation has decided on, plus its sessions. The run directory is fixed when
/// the context is created, before any remote command is issued.
#[derive(Debug)]
pub struct RunContext<'a> {
    pub profile: String,
    pub environment: String,
    pub service: ServiceSelector,
    pub run_dir: RunDirectory,
    pub sessions: SessionMap<'a>,
}

impl<'a> RunContext<'a> {
    pub fn new(profile: &str, environment: &str, service: ServiceSelector, run_dir: RunDirectory) -> Self {
        Self {
            profile: profile.to_string(),
            environment: environment.to_string(),
            service,
            run_dir,
            sessions: SessionMap::new(),
        }
    }

    /// Sessions that were launched but have not been stopped yet. These are the captures that
    /// would be left running on the targets if the process went away now.
    pub fn unstopped(&self) -> Vec<&CaptureSession<'a>> {
        self.sessions.values()
            .filter(|s| s.is_running() && s.stop_status == StopStatus::NotStopped)
            .collect()
    }
}
