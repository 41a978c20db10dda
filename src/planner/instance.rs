//! Domain instances and the repository that materializes them.

use uuid::Uuid;

use super::desired::{DesiredInstance, InstanceState};
use super::existing::{AgentState, AppliedSpec, ExistingInstance, PersistentDisk};
use super::job::{DiskSpec, Job, Stemcell, VmType};

/// Spec an instance should run with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceSpec {
    /// VM type.
    pub vm_type: VmType,
    /// Stemcell.
    pub stemcell: Stemcell,
    /// Agent environment.
    pub env: serde_json::Map<String, serde_json::Value>,
    /// Requested persistent disk.
    pub persistent_disk: DiskSpec,
}

impl InstanceSpec {
    /// Takes the desired spec from a job.
    #[must_use]
    pub fn from_job(job: &Job) -> Self {
        Self {
            vm_type: job.vm_type.clone(),
            stemcell: job.stemcell.clone(),
            env: job.env.clone(),
            persistent_disk: job.persistent_disk.clone(),
        }
    }
}

/// An instance being planned, carrying desired and last-known state.
#[derive(Debug, Clone)]
pub struct Instance {
    /// Stable identifier.
    pub uuid: Uuid,
    /// Job name.
    pub job: String,
    /// Deployment name.
    pub deployment: String,
    /// Index within the job.
    pub index: u32,
    /// Zone.
    pub availability_zone: Option<String>,
    /// Bootstrap flag as planned.
    pub bootstrap: bool,
    /// Lifecycle state as planned.
    pub state: InstanceState,
    /// Last agent report.
    pub current_state: Option<AgentState>,
    /// Active persistent disk.
    pub persistent_disk: Option<PersistentDisk>,
    /// Spec last applied to the VM.
    pub applied_spec: Option<AppliedSpec>,
    /// Spec the instance should run with; absent for obsolete instances.
    pub desired_spec: Option<InstanceSpec>,
}

impl Instance {
    /// Returns `job/index`.
    #[must_use]
    pub fn name(&self) -> String {
        format!("{}/{}", self.job, self.index)
    }

    /// Returns the agent's job state, if known.
    #[must_use]
    pub fn current_job_state(&self) -> Option<&str> {
        self.current_state.as_ref().map(|s| s.job_state.as_str())
    }

    /// Returns true if the agent reports the instance's jobs running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.current_state.as_ref().is_some_and(AgentState::is_running)
    }
}

impl std::fmt::Display for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{} ({})", self.job, self.index, self.uuid)
    }
}

/// Materializes domain instances for planning.
pub trait InstanceRepository {
    /// Builds the instance for an existing snapshot matched to a slot.
    fn fetch_existing(
        &self,
        existing: &ExistingInstance,
        agent_state: Option<&AgentState>,
        desired: &DesiredInstance,
    ) -> Instance;

    /// Builds the instance for a snapshot that is going away.
    fn fetch_obsolete(&self, existing: &ExistingInstance) -> Instance;

    /// Builds a brand-new instance for a slot.
    fn create(&self, desired: &DesiredInstance, index: u32) -> Instance;
}

/// Builds instances from in-memory snapshots.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultInstanceRepository;

impl DefaultInstanceRepository {
    /// Creates a repository.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl InstanceRepository for DefaultInstanceRepository {
    fn fetch_existing(
        &self,
        existing: &ExistingInstance,
        agent_state: Option<&AgentState>,
        desired: &DesiredInstance,
    ) -> Instance {
        Instance {
            uuid: existing.uuid,
            job: desired.job.name.clone(),
            deployment: desired.deployment.clone(),
            index: desired.index.unwrap_or(existing.index),
            availability_zone: desired.availability_zone.clone(),
            bootstrap: desired.bootstrap,
            state: desired.state,
            current_state: agent_state.cloned(),
            persistent_disk: existing.active_persistent_disk().cloned(),
            applied_spec: existing.applied_spec.clone(),
            desired_spec: Some(InstanceSpec::from_job(&desired.job)),
        }
    }

    fn fetch_obsolete(&self, existing: &ExistingInstance) -> Instance {
        Instance {
            uuid: existing.uuid,
            job: existing.job.clone(),
            deployment: String::new(),
            index: existing.index,
            availability_zone: existing.availability_zone.clone(),
            bootstrap: existing.bootstrap,
            state: existing.state,
            current_state: None,
            persistent_disk: existing.active_persistent_disk().cloned(),
            applied_spec: existing.applied_spec.clone(),
            desired_spec: None,
        }
    }

    fn create(&self, desired: &DesiredInstance, index: u32) -> Instance {
        Instance {
            uuid: Uuid::new_v4(),
            job: desired.job.name.clone(),
            deployment: desired.deployment.clone(),
            index,
            availability_zone: desired.availability_zone.clone(),
            bootstrap: desired.bootstrap,
            state: desired.state,
            current_state: None,
            persistent_disk: None,
            applied_spec: None,
            desired_spec: Some(InstanceSpec::from_job(&desired.job)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_fetch_existing_keeps_identity() {
        let job = Arc::new(Job::new("web", "prod", 1));
        let existing = ExistingInstance::new("web", 4, Some("z1"));
        let mut desired = DesiredInstance::new(&job);
        desired.index = Some(4);
        desired.availability_zone = Some(String::from("z1"));

        let agent = AgentState {
            job_state: String::from("running"),
            vm_cid: None,
        };
        let instance = DefaultInstanceRepository::new().fetch_existing(&existing, Some(&agent), &desired);
        assert_eq!(instance.uuid, existing.uuid);
        assert_eq!(instance.name(), "web/4");
        assert_eq!(instance.current_job_state(), Some("running"));
        assert!(instance.desired_spec.is_some());
    }

    #[test]
    fn test_create_assigns_fresh_uuid() {
        let job = Arc::new(Job::new("web", "prod", 1));
        let desired = DesiredInstance::new(&job);
        let repo = DefaultInstanceRepository::new();

        let a = repo.create(&desired, 0);
        let b = repo.create(&desired, 1);
        assert_ne!(a.uuid, b.uuid);
        assert_eq!(b.index, 1);
        assert!(a.applied_spec.is_none());
    }

    #[test]
    fn test_fetch_obsolete_has_no_desired_spec() {
        let existing = ExistingInstance::new("old", 0, None);
        let instance = DefaultInstanceRepository::new().fetch_obsolete(&existing);
        assert!(instance.desired_spec.is_none());
        assert_eq!(instance.job, "old");
    }
}
