//! In-memory fleet for the end to end capture tests.
//!
//! ```ignore
//! mod common;
//! use common::Fleet;
//! ```
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use anyhow::bail;
use async_trait::async_trait;
use fleetcap_lib::analysis_tools::{MergeTool, Viewer};
use fleetcap_lib::discovery::{FleetControlPlane, InstanceInfo};
use fleetcap_lib::orchestration::controller::{StopReason, StopSignal};
use fleetcap_lib::remote::commands::RemoteCommand;
use fleetcap_lib::remote::{RemoteCommandResult, RemoteExecutor};
use fleetcap_lib::storage::ObjectStore;
use fleetcap_lib::target::NetworkAddresses;

/// Shared state behind every fake, so a test can keep a handle after the fakes are boxed up
#[derive(Default)]
pub struct FleetState {
    /// cluster name to task ids, all in one region
    pub clusters: Vec<(String, Vec<String>)>,
    /// targets whose start capture command exits non-zero
    pub failing_launches: HashSet<String>,
    /// object key to contents, filled in when a stop and stage succeeds
    pub bucket: HashMap<String, Vec<u8>>,
    pub remote_calls: Vec<(String, String)>,
    pub downloads: Vec<String>,
    pub merge_inputs: Vec<PathBuf>,
    pub viewer_calls: Vec<(PathBuf, Option<String>)>,
}

#[derive(Clone, Default)]
pub struct Fleet {
    pub state: Arc<Mutex<FleetState>>,
}

impl Fleet {
    pub fn with_cluster(cluster: &str, tasks: &[&str]) -> Self {
        let fleet = Fleet::default();
        fleet.state.lock().unwrap().clusters
            .push((cluster.to_string(), tasks.iter().map(|t| t.to_string()).collect()));
        fleet
    }

    pub fn fail_launch(&self, id: &str) {
        self.state.lock().unwrap().failing_launches.insert(id.to_string());
    }

    pub fn remote_calls_named(&self, name: &str) -> Vec<String> {
        self.state.lock().unwrap().remote_calls.iter()
            .filter(|(_, n)| n == name)
            .map(|(id, _)| id.clone())
            .collect()
    }
}

#[async_trait]
impl FleetControlPlane for Fleet {
    async fn list_groups(&self, _region: &str) -> anyhow::Result<Vec<String>> {
        Ok(self.state.lock().unwrap().clusters.iter().map(|(c, _)| c.clone()).collect())
    }

    async fn list_members(&self, _region: &str, group: &str) -> anyhow::Result<Vec<String>> {
        Ok(self.state.lock().unwrap().clusters.iter()
            .find(|(c, _)| c == group)
            .map(|(_, tasks)| tasks.clone())
            .unwrap_or_default())
    }

    async fn describe_member(&self, _region: &str, _group: &str, member: &str) -> anyhow::Result<NetworkAddresses> {
        let n = member.len();
        Ok(NetworkAddresses { ipv4: Some(format!("10.0.0.{n}")), ipv6: None })
    }

    async fn list_instances(&self, _region: &str) -> anyhow::Result<Vec<InstanceInfo>> {
        Ok(Vec::new())
    }
}

#[async_trait]
impl RemoteExecutor for Fleet {
    async fn execute(&self, target: &fleetcap_lib::target::Target, command: &RemoteCommand) -> anyhow::Result<RemoteCommandResult> {
        let mut state = self.state.lock().unwrap();
        state.remote_calls.push((target.id.clone(), command.name().to_string()));
        let exit = match command {
            RemoteCommand::StartCapture { .. } if state.failing_launches.contains(&target.id) => 1,
            RemoteCommand::StartCapture { .. } => 0,
            RemoteCommand::StopAndStage { .. } => {
                state.bucket.insert(format!("tcpdump_{}.pcap", target.id), format!("<{}>", target.id).into_bytes());
                0
            }
        };
        Ok(RemoteCommandResult { target_id: target.id.clone(), exit_status: Some(exit), ..Default::default() })
    }
}

#[async_trait]
impl ObjectStore for Fleet {
    async fn download(&self, _bucket: &str, key: &str, _region: &str, destination: &Path) -> anyhow::Result<()> {
        let contents = {
            let mut state = self.state.lock().unwrap();
            state.downloads.push(key.to_string());
            state.bucket.get(key).cloned()
        };
        match contents {
            Some(bytes) => Ok(tokio::fs::write(destination, bytes).await?),
            None => bail!("NoSuchKey: {key}"),
        }
    }
}

#[async_trait]
impl MergeTool for Fleet {
    async fn merge(&self, inputs: &[PathBuf], output: &Path) -> anyhow::Result<()> {
        self.state.lock().unwrap().merge_inputs.extend(inputs.iter().cloned());
        let mut merged = Vec::new();
        for input in inputs {
            merged.extend(tokio::fs::read(input).await?);
        }
        tokio::fs::write(output, merged).await?;
        Ok(())
    }
}

#[async_trait]
impl Viewer for Fleet {
    async fn open(&self, artifact: &Path, filter: Option<&str>) -> anyhow::Result<()> {
        self.state.lock().unwrap().viewer_calls.push((artifact.to_path_buf(), filter.map(String::from)));
        Ok(())
    }
}

/// The operator types stop as soon as they are asked
pub struct StopAtOnce;

#[async_trait]
impl StopSignal for StopAtOnce {
    async fn wait(&mut self) -> anyhow::Result<StopReason> {
        Ok(StopReason::Operator)
    }
}
