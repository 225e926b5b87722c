use std::fmt;
use std::fmt::Formatter;
use serde::{Deserialize, Serialize};
pub use fleetcap_schemas::capture_config::TargetKind;

/// Shown in place of an address the control plane did not report
pub const ADDRESS_NOT_AVAILABLE: &str = "N/A";

/// A remote unit we can capture on, built from a live discovery query.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct Target {
    /// task id or instance id, unique across one run's discovered set
    pub id: String,
    /// cluster name for tasks, `Name` tag for instances
    pub group: String,
    pub region: String,
    pub kind: TargetKind,
    #[serde(default)]
    pub addresses: NetworkAddresses,
    /// lifecycle state as reported by the control plane, instances only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

impl Target {
    pub fn task(id: &str, cluster: &str, region: &str, addresses: NetworkAddresses) -> Self {
        Self {
            id: id.to_string(),
            group: cluster.to_string(),
            region: region.to_string(),
            kind: TargetKind::Task,
            addresses,
            state: None,
        }
    }

    pub fn instance(id: &str, name: &str, region: &str, addresses: NetworkAddresses, state: Option<String>) -> Self {
        Self {
            id: id.to_string(),
            group: name.to_string(),
            region: region.to_string(),
            kind: TargetKind::Instance,
            addresses,
            state,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({}/{}, {})", self.kind, self.id, self.region, self.group, self.addresses)
    }
}

/// Private addresses of a target, either of which may be missing
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct NetworkAddresses {
    pub ipv4: Option<String>,
    pub ipv6: Option<String>,
}

impl NetworkAddresses {
    pub fn not_available() -> Self {
        Self::default()
    }
}

impl fmt::Display for NetworkAddresses {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "IPv4 {}, IPv6 {}",
            self.ipv4.as_deref().unwrap_or(ADDRESS_NOT_AVAILABLE),
            self.ipv6.as_deref().unwrap_or(ADDRESS_NOT_AVAILABLE),
        )
    }
}
