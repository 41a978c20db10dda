//! Deployment manifest types.
//!
//! These structs map one-to-one onto the YAML manifest. They describe the
//! desired deployment and are converted into runtime objects by
//! [`Deployment::from_manifest`](super::Deployment::from_manifest).

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

use crate::network::{CloudProperties, NetworkType};
use crate::planner::{InstanceState, Stemcell, VmType};

/// The root of a deployment manifest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeploymentManifest {
    /// Deployment name.
    pub name: String,
    /// Recreate every instance on the next deploy.
    #[serde(default)]
    pub recreate: bool,
    /// DNS settings.
    #[serde(default)]
    pub dns: DnsConfig,
    /// Declared availability zones.
    #[serde(default)]
    pub availability_zones: Vec<AvailabilityZoneConfig>,
    /// Declared networks.
    #[serde(default)]
    pub networks: Vec<NetworkConfig>,
    /// Jobs to deploy.
    #[serde(default)]
    pub jobs: Vec<JobConfig>,
}

/// DNS settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DnsConfig {
    /// Domain appended to every record name.
    #[serde(default = "default_root_domain")]
    pub root_domain: String,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            root_domain: default_root_domain(),
        }
    }
}

fn default_root_domain() -> String {
    String::from("fleet")
}

/// A declared availability zone.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AvailabilityZoneConfig {
    /// Zone name.
    pub name: String,
    /// Cloud placement properties.
    #[serde(default)]
    pub cloud_properties: CloudProperties,
}

/// A declared network.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkConfig {
    /// Network name.
    pub name: String,
    /// Network kind.
    #[serde(rename = "type", default)]
    pub network_type: NetworkType,
    /// Subnets (manual networks).
    #[serde(default)]
    pub subnets: Vec<SubnetConfig>,
    /// DNS servers (dynamic networks).
    #[serde(default)]
    pub dns: Vec<Ipv4Addr>,
    /// Cloud properties (dynamic and vip networks).
    #[serde(default)]
    pub cloud_properties: CloudProperties,
}

/// A subnet of a manual network.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubnetConfig {
    /// CIDR range.
    pub range: String,
    /// Gateway address.
    #[serde(default)]
    pub gateway: Option<Ipv4Addr>,
    /// DNS servers.
    #[serde(default)]
    pub dns: Vec<Ipv4Addr>,
    /// Addresses never handed out, as single IPs or `a - b` ranges.
    #[serde(default)]
    pub reserved: Vec<String>,
    /// Addresses only handed out on explicit request.
    #[serde(rename = "static", default)]
    pub static_ips: Vec<String>,
    /// Cloud properties.
    #[serde(default)]
    pub cloud_properties: CloudProperties,
    /// Zone the subnet lives in.
    #[serde(default)]
    pub az: Option<String>,
}

/// A job to deploy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobConfig {
    /// Job name.
    pub name: String,
    /// Desired instance count.
    pub instances: usize,
    /// Zones to spread instances over.
    #[serde(default)]
    pub azs: Vec<String>,
    /// Networks to attach.
    #[serde(default)]
    pub networks: Vec<JobNetworkConfig>,
    /// VM type.
    #[serde(default)]
    pub vm_type: VmType,
    /// Stemcell.
    #[serde(default)]
    pub stemcell: Stemcell,
    /// Agent environment.
    #[serde(default)]
    pub env: serde_json::Map<String, serde_json::Value>,
    /// Persistent disk size in MB; 0 means none.
    #[serde(default)]
    pub persistent_disk: u64,
    /// Persistent disk cloud properties.
    #[serde(default)]
    pub persistent_disk_cloud_properties: CloudProperties,
    /// Lifecycle state.
    #[serde(default)]
    pub state: InstanceState,
}

/// A job's attachment to a network.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobNetworkConfig {
    /// Network name.
    pub name: String,
    /// Static addresses, as single IPs or `a - b` ranges.
    #[serde(default)]
    pub static_ips: Vec<String>,
    /// Defaults this network provides (`dns`, `gateway`).
    #[serde(default)]
    pub default: Vec<String>,
}

impl DeploymentManifest {
    /// Looks up a declared network.
    #[must_use]
    pub fn network(&self, name: &str) -> Option<&NetworkConfig> {
        self.networks.iter().find(|n| n.name == name)
    }

    /// Returns true if a zone with this name is declared.
    #[must_use]
    pub fn has_zone(&self, name: &str) -> bool {
        self.availability_zones.iter().any(|z| z.name == name)
    }
}
