//! In-memory stand-ins for the cloud and the local tools, used by the unit tests.
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use anyhow::bail;
use async_trait::async_trait;
use fleetcap_schemas::capture_config::{BucketConfig, CaptureSettings, ServiceSelector};
use crate::analysis_tools::{MergeTool, Viewer};
use crate::discovery::{FleetControlPlane, InstanceInfo};
use crate::remote::commands::{CaptureCommands, RemoteCommand};
use crate::remote::{RemoteCommandResult, RemoteExecutor};
use crate::storage::ObjectStore;
use crate::target::{NetworkAddresses, Target, TargetKind};

pub fn selector(kind: TargetKind, id: &str) -> ServiceSelector {
    ServiceSelector {
        path: vec!["voice".into(), id.into()],
        kind,
        selector: id.into(),
        uploader: None,
    }
}

pub fn task(id: &str) -> Target {
    Target::task(id, "sbc", "us-east-1", NetworkAddresses::not_available())
}

pub fn bucket() -> BucketConfig {
    BucketConfig { name: "pcaps-lab".into(), region: "us-east-1".into() }
}

pub fn capture_commands() -> CaptureCommands {
    CaptureCommands::new(&CaptureSettings::default(), &selector(TargetKind::Task, "sbc"), &bucket())
}

#[derive(Default)]
pub struct FakeControlPlane {
    clusters: HashMap<String, Vec<(String, Vec<String>)>>,
    instances: HashMap<String, Vec<InstanceInfo>>,
    /// task id to its addresses, describing a task with no entry fails
    pub addresses: HashMap<String, NetworkAddresses>,
    /// region to the error every listing in it fails with
    pub failing_regions: HashMap<String, String>,
}

impl FakeControlPlane {
    pub fn add_cluster(&mut self, region: &str, name: &str, tasks: &[&str]) {
        self.clusters.entry(region.to_string()).or_default()
            .push((name.to_string(), tasks.iter().map(|t| t.to_string()).collect()));
    }

    pub fn add_instance(&mut self, region: &str, id: &str, name: Option<&str>, state: &str, ip: Option<&str>) {
        self.instances.entry(region.to_string()).or_default().push(InstanceInfo {
            id: id.to_string(),
            name: name.map(String::from),
            state: Some(state.to_string()),
            private_ip: ip.map(String::from),
        });
    }

    fn check_region(&self, region: &str) -> anyhow::Result<()> {
        match self.failing_regions.get(region) {
            Some(err) => bail!("{err}"),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl FleetControlPlane for FakeControlPlane {
    async fn list_groups(&self, region: &str) -> anyhow::Result<Vec<String>> {
        self.check_region(region)?;
        Ok(self.clusters.get(region)
            .map(|c| c.iter().map(|(name, _)| name.clone()).collect())
            .unwrap_or_default())
    }

    async fn list_members(&self, region: &str, group: &str) -> anyhow::Result<Vec<String>> {
        self.check_region(region)?;
        Ok(self.clusters.get(region)
            .and_then(|c| c.iter().find(|(name, _)| name == group))
            .map(|(_, tasks)| tasks.clone())
            .unwrap_or_default())
    }

    async fn describe_member(&self, _region: &str, _group: &str, member: &str) -> anyhow::Result<NetworkAddresses> {
        match self.addresses.get(member) {
            Some(addresses) => Ok(addresses.clone()),
            None => bail!("task {member} not found"),
        }
    }

    async fn list_instances(&self, region: &str) -> anyhow::Result<Vec<InstanceInfo>> {
        self.check_region(region)?;
        Ok(self.instances.get(region).cloned().unwrap_or_default())
    }
}

#[derive(Debug, Clone, Copy)]
enum Behaviour {
    Exit(i32),
    ChannelError,
    Hang,
}

/// Succeeds on every target unless told otherwise. Rules are per target, or per target and
/// command name, the latter winning.
#[derive(Default)]
pub struct FakeExecutor {
    targets: Mutex<HashMap<String, Behaviour>>,
    commands: Mutex<HashMap<(String, String), Behaviour>>,
    delay: Mutex<Option<Duration>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl FakeExecutor {
    pub fn exit_with(&self, id: &str, code: i32) {
        self.set(id, Behaviour::Exit(code));
    }

    pub fn channel_error(&self, id: &str) {
        self.set(id, Behaviour::ChannelError);
    }

    pub fn hang(&self, id: &str) {
        self.set(id, Behaviour::Hang);
    }

    /// Make only `command` fail on `id`
    pub fn fail_command(&self, id: &str, command: &str, code: i32) {
        self.commands.lock().unwrap().insert((id.to_string(), command.to_string()), Behaviour::Exit(code));
    }

    pub fn hang_command(&self, id: &str, command: &str) {
        self.commands.lock().unwrap().insert((id.to_string(), command.to_string()), Behaviour::Hang);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// (target id, command name) in the order they were issued
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, id: &str) -> Vec<&'static str> {
        self.calls().into_iter()
            .filter(|(target, _)| target == id)
            .map(|(_, name)| match name.as_str() {
                "start capture" => "start capture",
                "stop and stage" => "stop and stage",
                _ => "unknown",
            })
            .collect()
    }

    fn set(&self, id: &str, behaviour: Behaviour) {
        self.targets.lock().unwrap().insert(id.to_string(), behaviour);
    }

    fn behaviour(&self, id: &str, command: &str) -> Behaviour {
        let by_command = self.commands.lock().unwrap().get(&(id.to_string(), command.to_string())).copied();
        by_command
            .or_else(|| self.targets.lock().unwrap().get(id).copied())
            .unwrap_or(Behaviour::Exit(0))
    }
}

#[async_trait]
impl RemoteExecutor for FakeExecutor {
    async fn execute(&self, target: &Target, command: &RemoteCommand) -> anyhow::Result<RemoteCommandResult> {
        self.calls.lock().unwrap().push((target.id.clone(), command.name().to_string()));
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.behaviour(&target.id, command.name()) {
            Behaviour::Exit(code) => Ok(RemoteCommandResult {
                target_id: target.id.clone(),
                exit_status: Some(code),
                stdout: String::new(),
                stderr: if code == 0 { String::new() } else { format!("{} failed", command.name()) },
            }),
            Behaviour::ChannelError => bail!("TargetNotConnectedException: agent not running on {}", target.id),
            Behaviour::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                bail!("unreachable")
            }
        }
    }
}

#[derive(Debug, Clone)]
enum StoredObject {
    Complete(Vec<u8>),
    /// writes these bytes, then fails
    Truncated(Vec<u8>),
    Hang,
}

/// Bucket contents keyed by object key. Downloading a key that isn't there fails.
#[derive(Default)]
pub struct FakeStore {
    objects: Mutex<HashMap<String, StoredObject>>,
    pub downloads: Mutex<Vec<String>>,
}

impl FakeStore {
    pub fn put(&self, key: &str, contents: &[u8]) {
        self.objects.lock().unwrap().insert(key.to_string(), StoredObject::Complete(contents.to_vec()));
    }

    pub fn put_truncated(&self, key: &str, partial: &[u8]) {
        self.objects.lock().unwrap().insert(key.to_string(), StoredObject::Truncated(partial.to_vec()));
    }

    pub fn put_hanging(&self, key: &str) {
        self.objects.lock().unwrap().insert(key.to_string(), StoredObject::Hang);
    }
}

#[async_trait]
impl ObjectStore for FakeStore {
    async fn download(&self, bucket: &str, key: &str, _region: &str, destination: &Path) -> anyhow::Result<()> {
        self.downloads.lock().unwrap().push(key.to_string());
        let object = self.objects.lock().unwrap().get(key).cloned();
        match object {
            Some(StoredObject::Complete(bytes)) => {
                tokio::fs::write(destination, bytes).await?;
                Ok(())
            }
            Some(StoredObject::Truncated(bytes)) => {
                tokio::fs::write(destination, bytes).await?;
                bail!("connection reset while downloading s3://{bucket}/{key}")
            }
            Some(StoredObject::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                bail!("unreachable")
            }
            None => bail!("An error occurred (404) when calling the HeadObject operation: Key \"{key}\" does not exist"),
        }
    }
}

/// Concatenates its inputs into the output, or pretends to
#[derive(Default)]
pub struct FakeMergeTool {
    pub fail: bool,
    /// exit cleanly without writing the output
    pub skip_output: bool,
    pub inputs: Mutex<Vec<PathBuf>>,
}

#[async_trait]
impl MergeTool for FakeMergeTool {
    async fn merge(&self, inputs: &[PathBuf], output: &Path) -> anyhow::Result<()> {
        self.inputs.lock().unwrap().extend(inputs.iter().cloned());
        if self.fail {
            bail!("mergecap exited with code Some(2): bad file format");
        }
        if !self.skip_output {
            let mut merged = Vec::new();
            for input in inputs {
                merged.extend(tokio::fs::read(input).await?);
            }
            tokio::fs::write(output, merged).await?;
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeViewer {
    pub fail: bool,
    pub opened: Mutex<Vec<(PathBuf, Option<String>)>>,
}

#[async_trait]
impl Viewer for FakeViewer {
    async fn open(&self, artifact: &Path, filter: Option<&str>) -> anyhow::Result<()> {
        if self.fail {
            bail!("could not start wireshark: No such file or directory");
        }
        self.opened.lock().unwrap().push((artifact.to_path_buf(), filter.map(String::from)));
        Ok(())
    }
}
