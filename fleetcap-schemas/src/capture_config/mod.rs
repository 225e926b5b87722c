use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Formatter;
use std::path::Path;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The capture config file. Environments (e.g. lab, prod) are whatever keys appear under
/// `regions`, and every other per-environment table is keyed the same way.
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CaptureConfig {
    pub regions: BTreeMap<String, Vec<String>>,
    pub buckets: BTreeMap<String, BucketConfig>,
    pub capture_services: BTreeMap<String, ServiceNode>,
    #[serde(default)]
    pub capture: CaptureSettings,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no capture services are configured")]
    NoServices,
    #[error("environment {env} has a bucket but no regions")]
    BucketWithoutRegions {
        env: String,
    },
    #[error("environment {env} has no regions configured")]
    NoRegions {
        env: String,
    },
    #[error("environment {env} has no bucket configured")]
    NoBucket {
        env: String,
    },
    #[error("service {service} has an empty selector id")]
    EmptySelector {
        service: String,
    },
    #[error("unknown environment {env}, expected one of {known:?}")]
    UnknownEnvironment {
        env: String,
        known: Vec<String>,
    },
    #[error("unknown service {service}")]
    UnknownService {
        service: String,
    },
}

/// Where capture files are staged for an environment
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct BucketConfig {
    pub name: String,
    pub region: String,
}

/// The kind of workload a service runs as. The config file spells these as the AWS service
/// names, `ecs` for containerised tasks and `ec2` for virtual machine instances.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TargetKind {
    #[serde(rename = "ecs", alias = "ECS", alias = "task")]
    Task,
    #[serde(rename = "ec2", alias = "EC2", alias = "instance")]
    Instance,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            TargetKind::Task => f.write_str("ECS"),
            TargetKind::Instance => f.write_str("EC2"),
        }
    }
}

/// How a target copies its finished capture into the bucket
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Uploader {
    /// `aws s3 cp` on the target itself
    AwsCli {
        #[serde(default)]
        sudo: bool,
    },
    /// A node script taking the file path and bucket name, for images without the aws cli
    NodeScript {
        node: String,
        script: String,
    },
}

/// A node of the `captureServices` tree: either a service or a named group of nodes.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum ServiceNode {
    Leaf(ServiceLeaf),
    Group(BTreeMap<String, ServiceNode>),
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ServiceLeaf {
    #[serde(rename = "type")]
    pub kind: TargetKind,
    /// matched against cluster names for tasks and the `Name` tag for instances
    pub id: String,
    #[serde(default)]
    pub uploader: Option<Uploader>,
}

/// A service from the config, flattened out of the tree
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ServiceSelector {
    /// group names down to the service name
    pub path: Vec<String>,
    pub kind: TargetKind,
    pub selector: String,
    pub uploader: Option<Uploader>,
}

impl ServiceSelector {
    /// Slash separated path, used to pick the service from the command line
    pub fn name(&self) -> String {
        self.path.join("/")
    }

    /// The innermost name, used when naming capture folders and files
    pub fn service_name(&self) -> &str {
        self.path.last().map(|s| s.as_str()).unwrap_or(self.selector.as_str())
    }
}

/// Tunables for the capture itself. Everything has a default so the section can be omitted.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CaptureSettings {
    #[serde(default = "default_pcap_dir")]
    pub pcap_dir: String,
    #[serde(default = "default_viewer_filter")]
    pub viewer_filter: String,
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,
    #[serde(default = "default_merge_tool")]
    pub merge_tool: String,
    #[serde(default = "default_viewer")]
    pub viewer: String,
    #[serde(default = "default_task_capture_dir")]
    pub task_capture_dir: String,
    #[serde(default = "default_instance_capture_dir")]
    pub instance_capture_dir: String,
    #[serde(default = "default_node_binary")]
    pub node_binary: String,
    #[serde(default = "default_stage_script")]
    pub stage_script: String,
    #[serde(default = "default_interface")]
    pub interface: String,
    #[serde(default = "default_capture_filter")]
    pub capture_filter: String,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            pcap_dir: default_pcap_dir(),
            viewer_filter: default_viewer_filter(),
            command_timeout_secs: default_command_timeout_secs(),
            download_timeout_secs: default_download_timeout_secs(),
            merge_tool: default_merge_tool(),
            viewer: default_viewer(),
            task_capture_dir: default_task_capture_dir(),
            instance_capture_dir: default_instance_capture_dir(),
            node_binary: default_node_binary(),
            stage_script: default_stage_script(),
            interface: default_interface(),
            capture_filter: default_capture_filter(),
        }
    }
}

impl CaptureSettings {
    /// The uploader used when a service does not name one
    pub fn default_uploader(&self, kind: TargetKind) -> Uploader {
        match kind {
            TargetKind::Task => Uploader::NodeScript {
                node: self.node_binary.clone(),
                script: self.stage_script.clone(),
            },
            TargetKind::Instance => Uploader::AwsCli { sudo: true },
        }
    }
}

fn default_pcap_dir() -> String {"./Pcaps/".to_string()}
fn default_viewer_filter() -> String {"sip || esp || rtcp || rtp".to_string()}
fn default_command_timeout_secs() -> u64 {120}
fn default_download_timeout_secs() -> u64 {300}
fn default_merge_tool() -> String {"mergecap".to_string()}
fn default_viewer() -> String {"wireshark".to_string()}
fn default_task_capture_dir() -> String {"./pcapScript".to_string()}
fn default_instance_capture_dir() -> String {"/home/ec2-user".to_string()}
fn default_node_binary() -> String {"/root/.nvm/versions/node/v16.19.0/bin/node".to_string()}
fn default_stage_script() -> String {"./pcapScript/savePcap.js".to_string()}
fn default_interface() -> String {"any".to_string()}
fn default_capture_filter() -> String {"not port 22".to_string()}

impl fmt::Display for CaptureConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match serde_json::to_string_pretty(&self) {
            Ok(text) => f.write_str(&text),
            Err(_) => Err(fmt::Error),
        }
    }
}

impl CaptureConfig {
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        tracing::trace!("expected capture config json location: {:?}", path);
        let text = tokio::fs::read_to_string(path).await
            .with_context(|| format!("Reading config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&text).with_context(|| "Parsing config JSON")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capture_services.is_empty() {
            return Err(ConfigError::NoServices);
        }
        for env in self.buckets.keys() {
            if !self.regions.contains_key(env) {
                return Err(ConfigError::BucketWithoutRegions { env: env.clone() });
            }
        }
        for selector in self.resolve_selectors() {
            if selector.selector.trim().is_empty() {
                return Err(ConfigError::EmptySelector { service: selector.name() });
            }
        }
        Ok(())
    }

    /// Flatten the service tree into selectors, depth first in name order
    pub fn resolve_selectors(&self) -> Vec<ServiceSelector> {
        let mut selectors = Vec::new();
        for (name, node) in &self.capture_services {
            flatten_node(vec![name.clone()], node, &mut selectors);
        }
        selectors
    }

    pub fn find_selector(&self, name: &str) -> Result<ServiceSelector, ConfigError> {
        let wanted = name.trim_matches('/');
        self.resolve_selectors()
            .into_iter()
            .find(|s| s.name() == wanted)
            .ok_or_else(|| ConfigError::UnknownService { service: name.to_string() })
    }

    pub fn environments(&self) -> Vec<String> {
        self.regions.keys().cloned().collect()
    }

    pub fn check_environment(&self, env: &str) -> Result<(), ConfigError> {
        if self.regions.contains_key(env) {
            Ok(())
        } else {
            Err(ConfigError::UnknownEnvironment { env: env.to_string(), known: self.environments() })
        }
    }

    pub fn regions_for(&self, env: &str) -> Result<&[String], ConfigError> {
        self.check_environment(env)?;
        match self.regions.get(env) {
            Some(regions) if !regions.is_empty() => Ok(regions.as_slice()),
            _ => Err(ConfigError::NoRegions { env: env.to_string() }),
        }
    }

    pub fn bucket_for(&self, env: &str) -> Result<&BucketConfig, ConfigError> {
        self.buckets.get(env).ok_or_else(|| ConfigError::NoBucket { env: env.to_string() })
    }

    /// Profiles are usually named after the account they log into, so if a profile name mentions
    /// an environment we take that one. The longest match wins, so `preprod` beats `prod`.
    pub fn infer_environment(&self, profile: &str) -> Option<String> {
        let profile = profile.to_lowercase();
        self.regions.keys()
            .filter(|env| profile.contains(&env.to_lowercase()))
            .max_by_key(|env| env.len())
            .cloned()
    }
}

fn flatten_node(path: Vec<String>, node: &ServiceNode, out: &mut Vec<ServiceSelector>) {
    match node {
        ServiceNode::Leaf(leaf) => out.push(ServiceSelector {
            path,
            kind: leaf.kind,
            selector: leaf.id.clone(),
            uploader: leaf.uploader.clone(),
        }),
        ServiceNode::Group(children) => {
            for (name, child) in children {
                let mut child_path = path.clone();
                child_path.push(name.clone());
                flatten_node(child_path, child, out);
            }
        }
    }
}
