//! Instance planning.
//!
//! This module turns desired slots and deployed instances into instance
//! plans, each carrying its network plans and change predicates.

mod desired;
mod diff;
mod dns;
mod existing;
mod instance;
mod instance_plan;
mod instance_planner;
mod job;
mod network_plan;
mod plan;

pub use desired::{DesiredInstance, InstanceState};
pub use diff::{ChangeDetail, ChangeReason};
pub use dns::{DnsRecord, DnsRecordStore, InMemoryDnsRecords, canonical, record_name};
pub use existing::{AgentState, AppliedSpec, ExistingInstance, PersistentDisk};
pub use instance::{DefaultInstanceRepository, Instance, InstanceRepository, InstanceSpec};
pub use instance_plan::{InstancePlan, PlanContext};
pub use instance_planner::InstancePlanner;
pub use job::{DiskSpec, Job, JobNetwork, Stemcell, VmType};
pub use network_plan::{NetworkPlan, NetworkPlanStatus, NetworkPlanner};
pub use plan::{DeploymentPlan, PlanAction, PlanEntry};
