//! Desired instance slots.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::job::Job;

/// Lifecycle state requested for an instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceState {
    /// VM running with jobs started.
    #[default]
    Started,
    /// VM running with jobs stopped.
    Stopped,
    /// VM deleted, disks kept.
    Detached,
    /// VM rebuilt, then started.
    Recreate,
}

impl InstanceState {
    /// State the instance settles in; `Recreate` settles in `Started`.
    #[must_use]
    pub const fn virtual_state(self) -> Self {
        match self {
            Self::Recreate => Self::Started,
            other => other,
        }
    }

    /// Parses a lifecycle string.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "started" => Some(Self::Started),
            "stopped" => Some(Self::Stopped),
            "detached" => Some(Self::Detached),
            "recreate" => Some(Self::Recreate),
            _ => None,
        }
    }
}

impl std::fmt::Display for InstanceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Started => "started",
            Self::Stopped => "stopped",
            Self::Detached => "detached",
            Self::Recreate => "recreate",
        };
        write!(f, "{s}")
    }
}

/// One instance the deployment wants for a job.
///
/// Zone, index and matched instance are filled in during planning.
#[derive(Debug, Clone)]
pub struct DesiredInstance {
    /// Owning job.
    pub job: Arc<Job>,
    /// Requested lifecycle state.
    pub state: InstanceState,
    /// Deployment name.
    pub deployment: String,
    /// Assigned zone.
    pub availability_zone: Option<String>,
    /// Matched existing instance.
    pub existing_instance: Option<Uuid>,
    /// Assigned index.
    pub index: Option<u32>,
    /// Whether this slot was elected bootstrap.
    pub bootstrap: bool,
}

impl DesiredInstance {
    /// Creates an unplaced slot for `job`.
    #[must_use]
    pub fn new(job: &Arc<Job>) -> Self {
        Self {
            job: Arc::clone(job),
            state: job.state,
            deployment: job.deployment.clone(),
            availability_zone: None,
            existing_instance: None,
            index: None,
            bootstrap: false,
        }
    }

    /// Creates one slot per desired instance of `job`.
    #[must_use]
    pub fn slots(job: &Arc<Job>) -> Vec<Self> {
        (0..job.instances).map(|_| Self::new(job)).collect()
    }

    /// Marks this slot as the job's bootstrap instance.
    pub const fn mark_as_bootstrap(&mut self) {
        self.bootstrap = true;
    }

    /// Drops the bootstrap role.
    pub const fn clear_bootstrap(&mut self) {
        self.bootstrap = false;
    }

    /// Returns true if this slot was elected bootstrap.
    #[must_use]
    pub const fn is_bootstrap(&self) -> bool {
        self.bootstrap
    }
}
