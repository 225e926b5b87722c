use std::collections::HashSet;
use async_trait::async_trait;
use futures_util::future::join_all;
use thiserror::Error;
use fleetcap_schemas::capture_config::ServiceSelector;
use crate::target::{NetworkAddresses, Target, TargetKind};

/// Error text from the control plane that means the credentials are the problem, not the query
const AUTH_FAILURE_MARKERS: &[&str] = &[
    "ExpiredToken",
    "UnrecognizedClientException",
    "InvalidClientTokenId",
    "Unable to locate credentials",
    "Token has expired",
    "Error loading SSO Token",
    "AccessDenied",
];

/// An EC2 instance as listed by the control plane
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceInfo {
    pub id: String,
    /// value of the `Name` tag
    pub name: Option<String>,
    pub state: Option<String>,
    pub private_ip: Option<String>,
}

/// Read-only view of the fleet. Clusters are groups and tasks are their members.
#[async_trait]
pub trait FleetControlPlane: Send + Sync {
    async fn list_groups(&self, region: &str) -> anyhow::Result<Vec<String>>;
    async fn list_members(&self, region: &str, group: &str) -> anyhow::Result<Vec<String>>;
    async fn describe_member(&self, region: &str, group: &str, member: &str) -> anyhow::Result<NetworkAddresses>;
    async fn list_instances(&self, region: &str) -> anyhow::Result<Vec<InstanceInfo>>;
}

/// Any of these means we don't have a trustworthy inventory, so nothing is safe to act on.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("not authenticated in {region}, log in again ({reason})")]
    Authentication {
        region: String,
        reason: String,
    },
    #[error("could not list {what} in {region}: {reason}")]
    Unreachable {
        region: String,
        what: String,
        reason: String,
    },
}

impl DiscoveryError {
    fn from_query(region: &str, what: &str, err: anyhow::Error) -> Self {
        let reason = format!("{err:#}");
        if AUTH_FAILURE_MARKERS.iter().any(|m| reason.contains(m)) {
            DiscoveryError::Authentication { region: region.to_string(), reason }
        } else {
            DiscoveryError::Unreachable { region: region.to_string(), what: what.to_string(), reason }
        }
    }
}

/// Find every running target of a service across the given regions. A region or cluster with no
/// matches contributes nothing, it is not an error.
pub async fn discover(
    control_plane: &dyn FleetControlPlane,
    regions: &[String],
    selector: &ServiceSelector,
) -> Result<Vec<Target>, DiscoveryError> {
    tracing::info!("Stage: discovering {} targets for {} in {:?}", selector.kind, selector.name(), regions);
    let mut targets = Vec::new();
    for region in regions {
        let found = match selector.kind {
            TargetKind::Task => discover_tasks(control_plane, region, &selector.selector).await?,
            TargetKind::Instance => discover_instances(control_plane, region, &selector.selector).await?,
        };
        tracing::info!("found {} targets in {region}", found.len());
        targets.extend(found);
    }

    // ids key the session map, keep the first sighting of each
    let mut seen = HashSet::new();
    targets.retain(|t| {
        let first = seen.insert(t.id.clone());
        if !first {
            tracing::warn!("target {} was listed more than once, ignoring the duplicate in {}", t.id, t.group);
        }
        first
    });
    Ok(targets)
}

async fn discover_tasks(
    control_plane: &dyn FleetControlPlane,
    region: &str,
    selector: &str,
) -> Result<Vec<Target>, DiscoveryError> {
    let selector = selector.to_lowercase();
    let clusters = control_plane.list_groups(region).await
        .map_err(|e| DiscoveryError::from_query(region, "clusters", e))?;

    let mut targets = Vec::new();
    for cluster in clusters.iter().filter(|c| c.to_lowercase().contains(&selector)) {
        let tasks = control_plane.list_members(region, cluster).await
            .map_err(|e| DiscoveryError::from_query(region, &format!("tasks of {cluster}"), e))?;
        tracing::debug!("cluster {cluster} has {} running tasks", tasks.len());

        // a task without network details is still capturable
        let described = join_all(tasks.iter().map(|task| async move {
            match control_plane.describe_member(region, cluster, task).await {
                Ok(addresses) => addresses,
                Err(err) => {
                    tracing::warn!("could not describe task {task} in {cluster}: {err:#}");
                    NetworkAddresses::not_available()
                }
            }
        })).await;

        for (task, addresses) in tasks.iter().zip(described) {
            targets.push(Target::task(task, cluster, region, addresses));
        }
    }
    Ok(targets)
}

async fn discover_instances(
    control_plane: &dyn FleetControlPlane,
    region: &str,
    selector: &str,
) -> Result<Vec<Target>, DiscoveryError> {
    let instances = control_plane.list_instances(region).await
        .map_err(|e| DiscoveryError::from_query(region, "instances", e))?;

    let mut targets = Vec::new();
    for instance in instances {
        let name = match &instance.name {
            Some(name) if name.contains(selector) => name.clone(),
            _ => continue,
        };
        if let Some(state) = &instance.state {
            if state != "running" {
                tracing::debug!("skipping instance {} ({name}) in state {state}", instance.id);
                continue;
            }
        }
        let addresses = NetworkAddresses { ipv4: instance.private_ip.clone(), ipv6: None };
        targets.push(Target::instance(&instance.id, &name, region, addresses, instance.state.clone()));
    }
    Ok(targets)
}
