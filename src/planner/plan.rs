//! Deployment plan summary.
//!
//! Condenses the instance plans of a run into one action per instance,
//! in the order they were planned.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;

use super::diff::{ChangeDetail, ChangeReason};
use super::dns::DnsRecordStore;
use super::instance_plan::InstancePlan;

/// A complete deployment plan.
#[derive(Debug, Serialize)]
pub struct DeploymentPlan {
    /// When the plan was created.
    pub created_at: DateTime<Utc>,
    /// Deployment name.
    pub deployment: String,
    /// Hash of the manifest this plan is based on.
    pub manifest_hash: String,
    /// One entry per instance.
    pub entries: Vec<PlanEntry>,
    /// The underlying instance plans.
    #[serde(skip)]
    pub instance_plans: Vec<InstancePlan>,
}

/// What happens to one instance.
#[derive(Debug, Clone, Serialize)]
pub struct PlanEntry {
    /// Action to take.
    pub action: PlanAction,
    /// Instance name (`job/index`).
    pub instance: String,
    /// Instance identifier.
    pub uuid: String,
    /// Zone.
    pub availability_zone: Option<String>,
    /// Bootstrap flag as planned.
    pub bootstrap: bool,
    /// Reasons the instance needs work.
    pub changes: BTreeSet<ChangeReason>,
    /// Field-level differences.
    pub details: Vec<ChangeDetail>,
    /// Addresses per network, as `network: ip`.
    pub networks: Vec<String>,
}

/// Action for one instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanAction {
    /// Create a new instance.
    Create,
    /// Tear the VM down and build it again.
    Recreate,
    /// Reconfigure in place.
    Update,
    /// Delete the instance.
    Delete,
    /// Nothing to do.
    Noop,
}

impl PlanAction {
    /// Chooses the action for a plan.
    #[must_use]
    pub fn for_plan(plan: &InstancePlan, changes: &BTreeSet<ChangeReason>) -> Self {
        if plan.is_new() {
            Self::Create
        } else if plan.is_obsolete() {
            Self::Delete
        } else if plan.needs_shutting_down() {
            Self::Recreate
        } else if !changes.is_empty() {
            Self::Update
        } else {
            Self::Noop
        }
    }
}

impl PlanEntry {
    /// Summarizes one instance plan.
    #[must_use]
    pub fn from_plan(plan: &InstancePlan, dns: &dyn DnsRecordStore) -> Self {
        let changes = plan.changes(dns);
        let instance = plan.instance();
        let networks = plan
            .network_plans()
            .iter()
            .filter(|p| !p.is_obsolete())
            .map(|p| match p.reservation.ip() {
                Some(ip) => format!("{}: {ip}", p.reservation.network()),
                None => format!("{}: {}", p.reservation.network(), p.reservation.reservation_type()),
            })
            .collect();

        Self {
            action: PlanAction::for_plan(plan, &changes),
            instance: plan.name(),
            uuid: instance.uuid.to_string(),
            availability_zone: instance.availability_zone.clone(),
            bootstrap: plan.is_bootstrap(),
            changes,
            details: plan.change_details(),
            networks,
        }
    }
}

impl DeploymentPlan {
    /// Builds the summary of `instance_plans`.
    #[must_use]
    pub fn new(
        deployment: impl Into<String>,
        manifest_hash: impl Into<String>,
        instance_plans: Vec<InstancePlan>,
        dns: &dyn DnsRecordStore,
    ) -> Self {
        let entries = instance_plans
            .iter()
            .map(|plan| PlanEntry::from_plan(plan, dns))
            .collect();

        Self {
            created_at: Utc::now(),
            deployment: deployment.into(),
            manifest_hash: manifest_hash.into(),
            entries,
            instance_plans,
        }
    }

    /// Returns true if no instance needs work.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(|e| e.action == PlanAction::Noop)
    }

    /// Number of entries with `action`.
    #[must_use]
    pub fn count(&self, action: PlanAction) -> usize {
        self.entries.iter().filter(|e| e.action == action).count()
    }

    /// Number of instances whose VM must be torn down.
    #[must_use]
    pub fn shutdown_count(&self) -> usize {
        self.instance_plans
            .iter()
            .filter(|p| p.needs_shutting_down())
            .count()
    }

    /// Number of entries that require action.
    #[must_use]
    pub fn action_count(&self) -> usize {
        self.entries.iter().filter(|e| e.action != PlanAction::Noop).count()
    }

    /// Entries that require action.
    #[must_use]
    pub fn actionable(&self) -> Vec<&PlanEntry> {
        self.entries
            .iter()
            .filter(|e| e.action != PlanAction::Noop)
            .collect()
    }
}

impl std::fmt::Display for PlanAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Recreate => "recreate",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Noop => "noop",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for PlanEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.action, self.instance)?;
        if !self.changes.is_empty() {
            let reasons: Vec<String> = self.changes.iter().map(ToString::to_string).collect();
            write!(f, " ({})", reasons.join(", "))?;
        }
        Ok(())
    }
}

impl std::fmt::Display for DeploymentPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return write!(f, "No changes required");
        }

        writeln!(f, "Deployment Plan for '{}' ({} actions):", self.deployment, self.action_count())?;
        for (i, entry) in self.actionable().into_iter().enumerate() {
            writeln!(f, "  {i}. {entry}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use crate::planner::desired::DesiredInstance;
    use crate::planner::dns::InMemoryDnsRecords;
    use crate::planner::existing::ExistingInstance;
    use crate::planner::instance::DefaultInstanceRepository;
    use crate::planner::instance_plan::PlanContext;
    use crate::planner::instance_planner::InstancePlanner;
    use crate::planner::job::Job;

    fn plans() -> Vec<InstancePlan> {
        let job = Arc::new(Job::new("web", "prod", 2));
        let repository = DefaultInstanceRepository::new();
        let planner = InstancePlanner::new(&repository, PlanContext::default());
        let existing = vec![ExistingInstance::new("web", 0, Some("gone"))];
        planner
            .plan_job_instances(&job, DesiredInstance::slots(&job), existing, &BTreeMap::new())
            .unwrap()
    }

    #[test]
    fn test_actions_for_new_and_obsolete() {
        let plan = DeploymentPlan::new("prod", "abc", plans(), &InMemoryDnsRecords::default());

        assert_eq!(plan.entries.len(), 3);
        assert_eq!(plan.count(PlanAction::Create), 2);
        assert_eq!(plan.count(PlanAction::Delete), 1);
        assert_eq!(plan.shutdown_count(), 1);
        assert!(!plan.is_empty());
    }

    #[test]
    fn test_new_indexes_skip_obsolete() {
        let plan = DeploymentPlan::new("prod", "abc", plans(), &InMemoryDnsRecords::default());
        let names: Vec<&str> = plan.entries.iter().map(|e| e.instance.as_str()).collect();
        assert_eq!(names, vec!["web/1", "web/2", "web/0"]);
        assert!(plan.entries[0].bootstrap);
    }

    #[test]
    fn test_display_lists_actions() {
        let plan = DeploymentPlan::new("prod", "abc", plans(), &InMemoryDnsRecords::default());
        let rendered = plan.to_string();
        assert!(rendered.starts_with("Deployment Plan for 'prod' (3 actions):"));
        assert!(rendered.contains("delete web/0"));
    }

    #[test]
    fn test_empty_plan() {
        let plan = DeploymentPlan::new("prod", "abc", Vec::new(), &InMemoryDnsRecords::default());
        assert!(plan.is_empty());
        assert_eq!(plan.to_string(), "No changes required");
    }
}
