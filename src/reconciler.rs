//! Deployment-wide reconciliation.
//!
//! Runs the instance planner for every job of a deployment, plans the
//! removal of jobs that are gone, and settles every network plan against
//! the address pools: held reservations are confirmed, obsolete ones are
//! released and missing ones are allocated.

use std::collections::BTreeMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Deployment;
use crate::error::Result;
use crate::network::{NetworkReservation, NetworkType};
use crate::planner::{
    AgentState, DeploymentPlan, DesiredInstance, DnsRecordStore, ExistingInstance, InstancePlan, InstancePlanner,
    InstanceRepository, NetworkPlan, NetworkPlanStatus,
};

/// Reconciler for one deployment.
#[derive(Debug)]
pub struct Reconciler<'a, R: InstanceRepository + ?Sized> {
    /// Deployment to plan.
    deployment: &'a Deployment,
    /// Materializes domain instances.
    repository: &'a R,
}

/// Counts of a reconciliation run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct ReconcileSummary {
    /// Instances to create.
    pub new: usize,
    /// Instances kept.
    pub existing: usize,
    /// Instances to delete.
    pub obsolete: usize,
    /// Kept instances that must be rebuilt.
    pub recreate: usize,
    /// Instances whose VM must be stopped.
    pub shutdown: usize,
}

impl<'a, R: InstanceRepository + ?Sized> Reconciler<'a, R> {
    /// Creates a reconciler.
    #[must_use]
    pub const fn new(deployment: &'a Deployment, repository: &'a R) -> Self {
        Self { deployment, repository }
    }

    /// Plans the whole deployment against recorded instances.
    ///
    /// Address reservations are made against the deployment's pools as a
    /// side effect, so the pools reflect the plan once this returns.
    ///
    /// # Errors
    ///
    /// Returns an error if a job runs out of static addresses, a pool runs
    /// out of capacity, or a held address conflicts with another holder.
    pub fn plan(
        &self,
        existing: Vec<ExistingInstance>,
        states: &BTreeMap<Uuid, AgentState>,
        dns: &dyn DnsRecordStore,
        manifest_hash: &str,
    ) -> Result<DeploymentPlan> {
        info!("Reconciling deployment '{}'", self.deployment.name);

        let planner = InstancePlanner::new(self.repository, self.deployment.context.clone());

        let mut by_job: BTreeMap<String, Vec<ExistingInstance>> = BTreeMap::new();
        for instance in existing {
            by_job.entry(instance.job.clone()).or_default().push(instance);
        }

        let mut plans = Vec::new();
        for job in &self.deployment.jobs {
            let existing = by_job.remove(&job.name).unwrap_or_default();
            plans.extend(planner.plan_job_instances(job, DesiredInstance::slots(job), existing, states)?);
        }

        let leftovers: Vec<ExistingInstance> = by_job.into_values().flatten().collect();
        plans.extend(planner.plan_obsolete_jobs(&self.deployment.jobs, leftovers));

        for plan in &mut plans {
            self.reserve_existing(plan)?;
        }
        for plan in &mut plans {
            plan.release_obsolete_network_plans(&self.deployment.networks)?;
        }
        for plan in &mut plans {
            self.reserve_desired(plan)?;
        }

        let plan = DeploymentPlan::new(&self.deployment.name, manifest_hash, plans, dns);
        info!(
            "Planned {} instances for '{}', {} need action",
            plan.entries.len(),
            plan.deployment,
            plan.action_count()
        );
        Ok(plan)
    }

    /// Confirms the reservations an instance already holds.
    ///
    /// Held reservations on a network whose kind changed are left alone;
    /// they become obsolete and the instance gets a fresh desired one. Held
    /// addresses the network's subnets no longer admit are dropped from the
    /// pool and replaced the same way. Obsolete reservations that cannot be
    /// confirmed are dropped from the pool too.
    fn reserve_existing(&self, plan: &mut InstancePlan) -> Result<()> {
        let zone = plan.instance().availability_zone.clone();
        let job = plan.instance().job.clone();
        let owner = plan.name();
        let mut replacements = Vec::new();

        for network_plan in plan.network_plans_mut().iter_mut().filter(|p| !p.is_desired()) {
            let obsolete = network_plan.is_obsolete();
            let reservation = &mut network_plan.reservation;
            let Ok(network) = self.deployment.networks.get(reservation.network()) else {
                continue;
            };
            let kind = held_kind(reservation);
            if network.network_type() != kind || (kind == NetworkType::Manual && reservation.ip().is_none()) {
                continue;
            }

            if !network.admits(reservation) {
                info!("{owner} holds {reservation} outside the subnets of '{}'", network.name());
                network.forget(reservation)?;
                if !obsolete {
                    replacements.push(self.replacement(&job, reservation));
                    network_plan.status = NetworkPlanStatus::Obsolete;
                }
                continue;
            }

            let default = self.defaults(&job, reservation.network());
            match network.reserve(reservation, zone.as_deref(), &default) {
                Ok(()) => {}
                Err(e) if obsolete => {
                    warn!("Could not confirm obsolete reservation of {owner}: {e}");
                    network.forget(reservation)?;
                }
                Err(e) => return Err(e),
            }
        }

        for reservation in replacements {
            plan.add_network_plan(NetworkPlan::desired(reservation));
        }
        Ok(())
    }

    /// Desired reservation standing in for a held one that no longer fits.
    ///
    /// A held manual address only survives planning if it matches the
    /// instance's static address, so static networks ask for it again.
    fn replacement(&self, job: &str, held: &NetworkReservation) -> NetworkReservation {
        let is_static = self
            .deployment
            .job(job)
            .and_then(|job| job.network(held.network()))
            .is_some_and(|network| !network.static_ips.is_empty());

        match held.ip() {
            Some(ip) if is_static => NetworkReservation::with_static_ip(held.network(), held.owner(), ip),
            _ => NetworkReservation::dynamic(held.network(), held.owner()),
        }
    }

    fn reserve_desired(&self, plan: &mut InstancePlan) -> Result<()> {
        let zone = plan.instance().availability_zone.clone();
        let job = plan.instance().job.clone();

        for network_plan in plan.network_plans_mut().iter_mut().filter(|p| p.is_desired()) {
            let reservation = &mut network_plan.reservation;
            let network = self.deployment.networks.get(reservation.network())?;
            let default = self.defaults(&job, reservation.network());
            network.reserve(reservation, zone.as_deref(), &default)?;
            debug!("Reserved {reservation}");
        }
        Ok(())
    }

    fn defaults(&self, job: &str, network: &str) -> Vec<String> {
        self.deployment
            .job(job)
            .map(|job| job.network_defaults(network).to_vec())
            .unwrap_or_default()
    }
}

/// Kind of network a held reservation was made on.
fn held_kind(reservation: &NetworkReservation) -> NetworkType {
    match reservation.settings().and_then(|s| s.network_type.as_deref()) {
        Some("dynamic") => NetworkType::Dynamic,
        Some("vip") => NetworkType::Vip,
        _ => NetworkType::Manual,
    }
}

impl ReconcileSummary {
    /// Counts the plans of a deployment plan.
    #[must_use]
    pub fn new(plans: &[InstancePlan]) -> Self {
        plans.iter().fold(Self::default(), |mut summary, plan| {
            if plan.is_new() {
                summary.new += 1;
            } else if plan.is_obsolete() {
                summary.obsolete += 1;
            } else {
                summary.existing += 1;
            }
            if plan.needs_recreate() {
                summary.recreate += 1;
            }
            if plan.needs_shutting_down() {
                summary.shutdown += 1;
            }
            summary
        })
    }
}

impl std::fmt::Display for ReconcileSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Reconciliation summary:")?;
        writeln!(f, "  New: {}", self.new)?;
        writeln!(f, "  Existing: {}", self.existing)?;
        writeln!(f, "  Obsolete: {}", self.obsolete)?;
        writeln!(f, "  Needs recreate: {}", self.recreate)?;
        write!(f, "  Needs shutdown: {}", self.shutdown)
    }
}
