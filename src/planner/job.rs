//! Job definitions consumed by the planner.

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

use crate::network::{CloudProperties, NetworkType};
use crate::placement::AvailabilityZone;

use super::desired::InstanceState;

/// VM sizing for a job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmType {
    /// VM type name.
    pub name: String,
    /// Cloud properties; the only part that affects the VM.
    #[serde(default)]
    pub cloud_properties: CloudProperties,
}

/// OS image for a job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stemcell {
    /// Stemcell name.
    pub name: String,
    /// Stemcell version.
    pub version: String,
}

impl std::fmt::Display for Stemcell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} version: {}", self.name, self.version)
    }
}

/// Requested persistent disk; a size of 0 means no disk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskSpec {
    /// Size in MB.
    pub size: u64,
    /// Disk cloud properties.
    #[serde(default)]
    pub cloud_properties: CloudProperties,
}

/// A network a job attaches to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobNetwork {
    /// Network name.
    pub name: String,
    /// Kind of the referenced network.
    pub network_type: NetworkType,
    /// Static addresses handed to the job's instances, in order.
    pub static_ips: Vec<Ipv4Addr>,
    /// Defaults (`dns`, `gateway`) this network provides.
    pub default: Vec<String>,
}

/// A group of identical instances.
#[derive(Debug, Clone)]
pub struct Job {
    /// Job name.
    pub name: String,
    /// Deployment the job belongs to.
    pub deployment: String,
    /// Desired instance count.
    pub instances: usize,
    /// Zones to spread instances over.
    pub availability_zones: Vec<AvailabilityZone>,
    /// Attached networks.
    pub networks: Vec<JobNetwork>,
    /// VM type.
    pub vm_type: VmType,
    /// Stemcell.
    pub stemcell: Stemcell,
    /// Agent environment.
    pub env: serde_json::Map<String, serde_json::Value>,
    /// Persistent disk.
    pub persistent_disk: DiskSpec,
    /// Desired lifecycle state.
    pub state: InstanceState,
}

impl Job {
    /// Creates a job with defaults for everything but name and count.
    #[must_use]
    pub fn new(name: impl Into<String>, deployment: impl Into<String>, instances: usize) -> Self {
        Self {
            name: name.into(),
            deployment: deployment.into(),
            instances,
            availability_zones: Vec::new(),
            networks: Vec::new(),
            vm_type: VmType::default(),
            stemcell: Stemcell::default(),
            env: serde_json::Map::new(),
            persistent_disk: DiskSpec::default(),
            state: InstanceState::Started,
        }
    }

    /// Returns the job name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the zones instances are spread over.
    #[must_use]
    pub fn availability_zones(&self) -> &[AvailabilityZone] {
        &self.availability_zones
    }

    /// Looks up an attached network.
    #[must_use]
    pub fn network(&self, name: &str) -> Option<&JobNetwork> {
        self.networks.iter().find(|n| n.name == name)
    }

    /// Default list for an attached network; empty if not attached.
    #[must_use]
    pub fn network_defaults(&self, name: &str) -> &[String] {
        self.network(name).map_or(&[], |n| n.default.as_slice())
    }
}
