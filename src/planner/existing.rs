//! Snapshots of deployed instances.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::network::{CloudProperties, NetworkSettings};
use crate::placement::PlacedInstance;

use super::desired::InstanceState;
use super::job::{Stemcell, VmType};

/// A persistent disk attached to an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistentDisk {
    /// Cloud identifier of the disk.
    pub disk_cid: String,
    /// Size in MB.
    pub size: u64,
    /// Disk cloud properties.
    #[serde(default)]
    pub cloud_properties: CloudProperties,
    /// Whether the disk is mounted and in use.
    #[serde(default = "default_active")]
    pub active: bool,
}

const fn default_active() -> bool {
    true
}

/// Spec last applied to an instance's VM.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedSpec {
    /// VM type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vm_type: Option<VmType>,
    /// Stemcell.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stemcell: Option<Stemcell>,
    /// Agent environment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<serde_json::Map<String, serde_json::Value>>,
    /// Network settings, by network name.
    #[serde(default)]
    pub networks: BTreeMap<String, NetworkSettings>,
}

/// Last state reported by an instance's agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentState {
    /// Aggregate job state (`running`, `failing`, ...).
    pub job_state: String,
    /// VM the agent runs on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vm_cid: Option<String>,
}

impl AgentState {
    /// Returns true if the agent reports its jobs running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.job_state == "running"
    }
}

/// A deployed instance as recorded in state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistingInstance {
    /// Stable identifier.
    pub uuid: Uuid,
    /// Job the instance was created for.
    pub job: String,
    /// Index within the job.
    pub index: u32,
    /// Zone the instance lives in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability_zone: Option<String>,
    /// Attached persistent disks.
    #[serde(default)]
    pub persistent_disks: Vec<PersistentDisk>,
    /// Bootstrap flag.
    #[serde(default)]
    pub bootstrap: bool,
    /// Recorded lifecycle state.
    #[serde(default)]
    pub state: InstanceState,
    /// Spec last applied to the VM; absent before the first deploy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied_spec: Option<AppliedSpec>,
}

impl ExistingInstance {
    /// Creates a bare snapshot.
    #[must_use]
    pub fn new(job: impl Into<String>, index: u32, availability_zone: Option<&str>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            job: job.into(),
            index,
            availability_zone: availability_zone.map(String::from),
            persistent_disks: Vec::new(),
            bootstrap: false,
            state: InstanceState::Started,
            applied_spec: None,
        }
    }

    /// Returns the first active persistent disk.
    #[must_use]
    pub fn active_persistent_disk(&self) -> Option<&PersistentDisk> {
        self.persistent_disks.iter().find(|d| d.active)
    }

    /// Network settings last applied, empty before the first deploy.
    #[must_use]
    pub fn applied_networks(&self) -> BTreeMap<String, NetworkSettings> {
        self.applied_spec
            .as_ref()
            .map(|spec| spec.networks.clone())
            .unwrap_or_default()
    }

    /// Returns `job/index`.
    #[must_use]
    pub fn name(&self) -> String {
        format!("{}/{}", self.job, self.index)
    }
}

impl PlacedInstance for ExistingInstance {
    fn job_name(&self) -> &str {
        &self.job
    }

    fn index(&self) -> u32 {
        self.index
    }

    fn availability_zone(&self) -> Option<&str> {
        self.availability_zone.as_deref()
    }

    fn has_active_persistent_disk(&self) -> bool {
        self.active_persistent_disk().is_some()
    }
}
