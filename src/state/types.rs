//! Persisted deployment state.
//!
//! The state file is the planner's view of the world: which instances
//! exist, what was last applied to them, what their agents reported and
//! which addresses are held.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::network::{InMemoryIpRepo, IpAddressRecord};
use crate::planner::{AgentState, DnsRecord, ExistingInstance, InMemoryDnsRecords};

/// Current version of the state format.
pub const STATE_VERSION: &str = "1.0";

/// The complete deployment state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentState {
    /// State format version.
    pub version: String,
    /// Deployment name.
    pub deployment: String,
    /// Hash of the manifest the state was last written for.
    #[serde(default)]
    pub spec_hash: Option<String>,
    /// Instances created by earlier deploys.
    #[serde(default)]
    pub instances: Vec<ExistingInstance>,
    /// Last agent report per instance.
    #[serde(default)]
    pub agent_states: BTreeMap<Uuid, AgentState>,
    /// Held addresses.
    #[serde(default)]
    pub ip_addresses: Vec<IpAddressRecord>,
    /// Published DNS records.
    #[serde(default)]
    pub dns_records: Vec<DnsRecord>,
    /// When the state was last updated.
    pub last_updated: DateTime<Utc>,
    /// Recent operations.
    #[serde(default)]
    pub history: Vec<StateHistoryEntry>,
}

/// A single entry in the state history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateHistoryEntry {
    /// When the operation happened.
    pub timestamp: DateTime<Utc>,
    /// Type of operation.
    pub operation: StateOperation,
    /// Manifest hash at the time.
    pub spec_hash: String,
    /// Instances or addresses affected.
    pub resources: Vec<String>,
}

/// Operations recorded in the history.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StateOperation {
    /// Addresses were reserved for a plan.
    Reserve,
    /// Obsolete addresses were released.
    Release,
}

impl DeploymentState {
    /// Maximum number of history entries kept.
    pub const MAX_HISTORY: usize = 100;

    /// Creates an empty state.
    #[must_use]
    pub fn new(deployment: &str) -> Self {
        Self {
            version: STATE_VERSION.to_string(),
            deployment: deployment.to_string(),
            spec_hash: None,
            instances: Vec::new(),
            agent_states: BTreeMap::new(),
            ip_addresses: Vec::new(),
            dns_records: Vec::new(),
            last_updated: Utc::now(),
            history: Vec::new(),
        }
    }

    /// Returns the instances of one job.
    #[must_use]
    pub fn job_instances(&self, job: &str) -> Vec<&ExistingInstance> {
        self.instances.iter().filter(|i| i.job == job).collect()
    }

    /// Finds an instance by uuid.
    #[must_use]
    pub fn instance(&self, uuid: Uuid) -> Option<&ExistingInstance> {
        self.instances.iter().find(|i| i.uuid == uuid)
    }

    /// Builds an address repository seeded with the held addresses.
    #[must_use]
    pub fn ip_repo(&self) -> InMemoryIpRepo {
        InMemoryIpRepo::from_records(self.ip_addresses.iter().cloned())
    }

    /// Builds a record store over the published DNS records.
    #[must_use]
    pub fn dns_store(&self) -> InMemoryDnsRecords {
        InMemoryDnsRecords::new(self.dns_records.iter().cloned())
    }

    /// Replaces the held addresses.
    pub fn set_ip_addresses(&mut self, records: Vec<IpAddressRecord>) {
        self.ip_addresses = records;
        self.last_updated = Utc::now();
    }

    /// Adds a history entry, dropping the oldest past the limit.
    pub fn add_history(&mut self, entry: StateHistoryEntry) {
        if self.history.len() >= Self::MAX_HISTORY {
            self.history.remove(0);
        }
        self.history.push(entry);
    }
}

impl StateHistoryEntry {
    /// Creates a history entry stamped with the current time.
    #[must_use]
    pub fn new(operation: StateOperation, spec_hash: &str, resources: Vec<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            operation,
            spec_hash: spec_hash.to_string(),
            resources,
        }
    }
}

impl std::fmt::Display for StateOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let op = match self {
            Self::Reserve => "reserve",
            Self::Release => "release",
        };
        write!(f, "{op}")
    }
}
