//! Instance plans and their change predicates.
//!
//! A plan pairs what is deployed with what is wanted. The predicates never
//! mutate anything; the caller applying plans uses them to decide between
//! creating, recreating, updating in place or deleting an instance.

use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::error::Result;
use crate::network::{NetworkRegistry, NetworkSettings};

use super::desired::{DesiredInstance, InstanceState};
use super::diff::{ChangeDetail, ChangeReason, render_map};
use super::dns::{DnsRecordStore, record_name};
use super::existing::ExistingInstance;
use super::instance::Instance;
use super::network_plan::NetworkPlan;

/// Deployment-wide inputs to planning.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanContext {
    /// Deployment name.
    pub deployment: String,
    /// Recreate every instance.
    pub recreate: bool,
    /// Root domain for DNS record names.
    pub root_domain: String,
}

/// The reconciliation record for one instance.
///
/// A plan is exactly one of new, existing or obsolete; the constructors
/// enforce this.
#[derive(Debug, Clone)]
pub struct InstancePlan {
    existing_instance: Option<ExistingInstance>,
    desired_instance: Option<DesiredInstance>,
    instance: Instance,
    network_plans: Vec<NetworkPlan>,
    context: PlanContext,
}

impl InstancePlan {
    /// Plan for an instance that does not exist yet.
    #[must_use]
    pub fn new_instance(
        desired: DesiredInstance,
        instance: Instance,
        network_plans: Vec<NetworkPlan>,
        context: &PlanContext,
    ) -> Self {
        Self {
            existing_instance: None,
            desired_instance: Some(desired),
            instance,
            network_plans,
            context: context.clone(),
        }
    }

    /// Plan for a deployed instance that is kept.
    #[must_use]
    pub fn existing(
        existing: ExistingInstance,
        desired: DesiredInstance,
        instance: Instance,
        network_plans: Vec<NetworkPlan>,
        context: &PlanContext,
    ) -> Self {
        Self {
            existing_instance: Some(existing),
            desired_instance: Some(desired),
            instance,
            network_plans,
            context: context.clone(),
        }
    }

    /// Plan for a deployed instance that goes away.
    #[must_use]
    pub fn obsolete(
        existing: ExistingInstance,
        instance: Instance,
        network_plans: Vec<NetworkPlan>,
        context: &PlanContext,
    ) -> Self {
        Self {
            existing_instance: Some(existing),
            desired_instance: None,
            instance,
            network_plans,
            context: context.clone(),
        }
    }

    /// Returns the deployed snapshot.
    #[must_use]
    pub const fn existing_instance(&self) -> Option<&ExistingInstance> {
        self.existing_instance.as_ref()
    }

    /// Returns the desired slot.
    #[must_use]
    pub const fn desired_instance(&self) -> Option<&DesiredInstance> {
        self.desired_instance.as_ref()
    }

    /// Returns the planned instance.
    #[must_use]
    pub const fn instance(&self) -> &Instance {
        &self.instance
    }

    /// Returns the network plans.
    #[must_use]
    pub fn network_plans(&self) -> &[NetworkPlan] {
        &self.network_plans
    }

    /// Returns the network plans for reservation.
    pub fn network_plans_mut(&mut self) -> &mut [NetworkPlan] {
        &mut self.network_plans
    }

    /// Appends a network plan.
    pub fn add_network_plan(&mut self, plan: NetworkPlan) {
        self.network_plans.push(plan);
    }

    /// Returns `job/index`.
    #[must_use]
    pub fn name(&self) -> String {
        self.instance.name()
    }

    /// Returns true if nothing is deployed for this plan yet.
    #[must_use]
    pub const fn is_new(&self) -> bool {
        self.existing_instance.is_none()
    }

    /// Returns true if the instance is going away.
    #[must_use]
    pub const fn is_obsolete(&self) -> bool {
        self.desired_instance.is_none()
    }

    /// Returns true if a deployed instance is kept.
    #[must_use]
    pub const fn is_existing(&self) -> bool {
        !self.is_new() && !self.is_obsolete()
    }

    /// Returns true if this instance is its job's bootstrap instance.
    #[must_use]
    pub fn is_bootstrap(&self) -> bool {
        self.desired_instance.as_ref().is_some_and(DesiredInstance::is_bootstrap)
    }

    fn vm_type_change(&self) -> Option<ChangeDetail> {
        let desired = self.instance.desired_spec.as_ref()?;
        let applied = self
            .existing_instance
            .as_ref()
            .and_then(|e| e.applied_spec.as_ref())
            .and_then(|s| s.vm_type.as_ref());

        match applied {
            Some(vm_type) if vm_type.cloud_properties == desired.vm_type.cloud_properties => None,
            _ => Some(ChangeDetail::new(
                "vm_type",
                applied.map(|v| render_map(&v.cloud_properties)),
                render_map(&desired.vm_type.cloud_properties),
            )),
        }
    }

    fn stemcell_change(&self) -> Option<ChangeDetail> {
        let desired = self.instance.desired_spec.as_ref()?;
        let applied = self.existing_instance.as_ref()?.applied_spec.as_ref()?.stemcell.as_ref()?;
        (applied != &desired.stemcell)
            .then(|| ChangeDetail::new("stemcell", Some(applied.to_string()), desired.stemcell.to_string()))
    }

    fn env_change(&self) -> Option<ChangeDetail> {
        let desired = self.instance.desired_spec.as_ref()?;
        let applied = self.existing_instance.as_ref()?.applied_spec.as_ref()?.env.as_ref()?;
        (applied != &desired.env).then(|| ChangeDetail::new("env", Some(render_map(applied)), render_map(&desired.env)))
    }

    fn persistent_disk_change(&self) -> Option<ChangeDetail> {
        let current = self.instance.persistent_disk.as_ref();
        let Some(desired) = self.instance.desired_spec.as_ref() else {
            return current.map(|disk| ChangeDetail::new("persistent_disk", Some(disk.size.to_string()), "0"));
        };

        let old_size = current.map_or(0, |d| d.size);
        let desired = &desired.persistent_disk;
        if old_size == 0 && desired.size == 0 {
            return None;
        }

        let cloud_changed = current.is_some_and(|d| d.cloud_properties != desired.cloud_properties);
        (old_size != desired.size || cloud_changed).then(|| {
            ChangeDetail::new(
                "persistent_disk",
                Some(format!(
                    "size: {old_size} cloud_properties: {}",
                    current.map_or_else(|| String::from("{}"), |d| render_map(&d.cloud_properties))
                )),
                format!("size: {} cloud_properties: {}", desired.size, render_map(&desired.cloud_properties)),
            )
        })
    }

    fn state_change(&self) -> Option<ChangeDetail> {
        let desired = self.desired_instance.as_ref()?.state.virtual_state();
        let job_state = self.instance.current_job_state();

        if let Some(existing) = &self.existing_instance
            && desired == InstanceState::Detached
            && existing.state != InstanceState::Detached
        {
            return Some(ChangeDetail::new("state", Some(existing.state.to_string()), desired.to_string()));
        }

        let running = self.instance.is_running();
        let changed = match desired {
            InstanceState::Stopped => running,
            InstanceState::Started | InstanceState::Recreate => !running,
            InstanceState::Detached => false,
        };
        changed.then(|| ChangeDetail::new("state", job_state.map(String::from), desired.to_string()))
    }

    /// Returns true if the VM type's cloud properties differ.
    #[must_use]
    pub fn vm_type_changed(&self) -> bool {
        self.logged("vm_type_changed?", self.vm_type_change())
    }

    /// Returns true if the applied stemcell differs.
    #[must_use]
    pub fn stemcell_changed(&self) -> bool {
        self.logged("stemcell_changed?", self.stemcell_change())
    }

    /// Returns true if the applied agent environment differs.
    #[must_use]
    pub fn env_changed(&self) -> bool {
        self.logged("env_changed?", self.env_change())
    }

    /// Returns true if the persistent disk must change.
    ///
    /// An obsolete instance changes if it holds an active disk. No disk on
    /// either side is never a change.
    #[must_use]
    pub fn persistent_disk_changed(&self) -> bool {
        self.logged("persistent_disk_changed?", self.persistent_disk_change())
    }

    /// Returns true if the lifecycle state must change.
    #[must_use]
    pub fn state_changed(&self) -> bool {
        self.logged("state_changed?", self.state_change())
    }

    /// Returns true if the bootstrap election moved.
    #[must_use]
    pub fn bootstrap_changed(&self) -> bool {
        match (&self.existing_instance, &self.desired_instance) {
            (Some(existing), Some(desired)) if existing.bootstrap != desired.bootstrap => {
                debug!(
                    "bootstrap_changed? changed FROM: {} TO: {} on instance {}",
                    existing.bootstrap,
                    desired.bootstrap,
                    self.name()
                );
                true
            }
            _ => false,
        }
    }

    /// Returns true if network reservations or settings differ.
    #[must_use]
    pub fn networks_changed(&self) -> bool {
        if self.is_obsolete() {
            return false;
        }

        let applied = self.existing_instance.as_ref().map(ExistingInstance::applied_networks);
        let Some(applied) = applied.filter(|a| !a.is_empty()) else {
            debug!("networks_changed? first deploy of instance {}", self.name());
            return true;
        };

        let obsolete = self.describe_plans(NetworkPlan::is_obsolete);
        if !obsolete.is_empty() {
            debug!("networks_changed? obsolete reservations: [{obsolete}]");
        }
        let desired = self.describe_plans(NetworkPlan::is_desired);
        if !desired.is_empty() {
            debug!("networks_changed? desired reservations: [{desired}]");
        }
        if !obsolete.is_empty() || !desired.is_empty() {
            return true;
        }

        let settings = self.network_settings();
        if settings != applied {
            debug!(
                "networks_changed? network settings changed FROM: {} TO: {} on instance {}",
                render_settings(&applied),
                render_settings(&settings),
                self.name()
            );
            return true;
        }
        false
    }

    /// Returns true if recreation was requested for this instance.
    #[must_use]
    pub fn needs_recreate(&self) -> bool {
        let Some(desired) = &self.desired_instance else {
            return false;
        };
        if self.context.recreate {
            debug!("needs_recreate? job deployment is configured with \"recreate\" state");
            return true;
        }
        desired.state == InstanceState::Recreate
    }

    /// Returns true if the VM must be torn down before reconfiguration.
    #[must_use]
    pub fn needs_shutting_down(&self) -> bool {
        self.is_obsolete()
            || self.needs_recreate()
            || self.vm_type_changed()
            || self.stemcell_changed()
            || self.env_changed()
    }

    /// Resolved settings per network, from non-obsolete plans.
    #[must_use]
    pub fn network_settings(&self) -> BTreeMap<String, NetworkSettings> {
        self.network_plans
            .iter()
            .filter(|plan| !plan.is_obsolete())
            .filter_map(|plan| {
                plan.reservation
                    .settings()
                    .map(|s| (plan.reservation.network().to_string(), s.clone()))
            })
            .collect()
    }

    /// Expected DNS records as `(name, ip)` pairs, index- and uuid-based.
    #[must_use]
    pub fn dns_record_info(&self) -> Vec<(String, String)> {
        if self.is_obsolete() {
            return Vec::new();
        }

        let job = &self.instance.job;
        let deployment = &self.context.deployment;
        let root = &self.context.root_domain;
        let index = self.instance.index.to_string();
        let uuid = self.instance.uuid.to_string();

        let mut records = Vec::new();
        for plan in self.network_plans.iter().filter(|p| !p.is_obsolete()) {
            let Some(ip) = plan.reservation.ip() else {
                continue;
            };
            let network = plan.reservation.network();
            records.push((record_name(&index, job, network, deployment, root), ip.to_string()));
            records.push((record_name(&uuid, job, network, deployment, root), ip.to_string()));
        }
        records
    }

    /// Returns true if any expected DNS record is missing from `dns`.
    #[must_use]
    pub fn dns_changed(&self, dns: &dyn DnsRecordStore) -> bool {
        let mut changed = false;
        for (name, ip) in self.dns_record_info() {
            if !dns.has_record(&name, &ip) {
                debug!("dns_changed? The requested dns record with name '{name}' and ip '{ip}' was not found in the db.");
                changed = true;
            }
        }
        changed
    }

    /// Every reason this instance needs work.
    #[must_use]
    pub fn changes(&self, dns: &dyn DnsRecordStore) -> BTreeSet<ChangeReason> {
        let checks = [
            (ChangeReason::Recreate, self.needs_recreate()),
            (ChangeReason::VmType, self.vm_type_changed()),
            (ChangeReason::Stemcell, self.stemcell_changed()),
            (ChangeReason::Env, self.env_changed()),
            (ChangeReason::Network, self.networks_changed()),
            (ChangeReason::PersistentDisk, self.persistent_disk_changed()),
            (ChangeReason::Dns, self.dns_changed(dns)),
            (ChangeReason::Bootstrap, self.bootstrap_changed()),
            (ChangeReason::State, self.state_changed()),
        ];
        checks.into_iter().filter(|(_, hit)| *hit).map(|(reason, _)| reason).collect()
    }

    /// Returns true if the instance needs any work.
    #[must_use]
    pub fn changed(&self, dns: &dyn DnsRecordStore) -> bool {
        !self.changes(dns).is_empty()
    }

    /// Field-level differences, for display.
    #[must_use]
    pub fn change_details(&self) -> Vec<ChangeDetail> {
        [
            self.vm_type_change(),
            self.stemcell_change(),
            self.env_change(),
            self.persistent_disk_change(),
            self.state_change(),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    /// Returns obsolete reservations to their pools and drops those plans.
    ///
    /// Reservations on networks that no longer exist are dropped without
    /// touching any pool.
    ///
    /// # Errors
    ///
    /// Returns `IpNotOwned` if a pool never held a released address.
    pub fn release_obsolete_network_plans(&mut self, registry: &NetworkRegistry) -> Result<()> {
        for plan in self.network_plans.iter_mut().filter(|p| p.is_obsolete()) {
            let reservation = &mut plan.reservation;
            if registry.contains(reservation.network()) {
                registry.get(reservation.network())?.release(reservation)?;
            } else {
                debug!("Dropping {reservation} on removed network");
                reservation.mark_released();
            }
        }
        self.network_plans.retain(|plan| !plan.is_obsolete());
        Ok(())
    }

    fn logged(&self, predicate: &str, change: Option<ChangeDetail>) -> bool {
        change.is_some_and(|detail| {
            detail.log(predicate, &self.name());
            true
        })
    }

    fn describe_plans(&self, filter: fn(&NetworkPlan) -> bool) -> String {
        self.network_plans
            .iter()
            .filter(|p| filter(p))
            .map(|p| p.reservation.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn render_settings(settings: &BTreeMap<String, NetworkSettings>) -> String {
    serde_json::to_string(settings).unwrap_or_default()
}
