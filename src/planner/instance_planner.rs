//! Builds instance plans for a job.

use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{PlanError, Result};
use crate::placement::AvailabilityZonePicker;

use super::desired::DesiredInstance;
use super::existing::{AgentState, ExistingInstance};
use super::instance::InstanceRepository;
use super::instance_plan::{InstancePlan, PlanContext};
use super::job::Job;
use super::network_plan::NetworkPlanner;

/// A placed slot, with the instance it reuses if any.
struct Slot {
    existing: Option<ExistingInstance>,
    desired: DesiredInstance,
    index: u32,
}

/// Plans the instances of jobs against deployed state.
#[derive(Debug)]
pub struct InstancePlanner<'a, R: InstanceRepository + ?Sized> {
    /// Materializes domain instances.
    repository: &'a R,
    /// Deployment-wide inputs.
    context: PlanContext,
}

impl<'a, R: InstanceRepository + ?Sized> InstancePlanner<'a, R> {
    /// Creates a planner.
    #[must_use]
    pub const fn new(repository: &'a R, context: PlanContext) -> Self {
        Self { repository, context }
    }

    /// Returns the planning context.
    #[must_use]
    pub const fn context(&self) -> &PlanContext {
        &self.context
    }

    /// Plans new, kept and obsolete instances of `job`.
    ///
    /// Plans come back ordered by index, followed by obsolete plans.
    ///
    /// # Errors
    ///
    /// Returns `StaticIpsExhausted` if a network declares fewer static
    /// addresses than the job has instances.
    pub fn plan_job_instances(
        &self,
        job: &Arc<Job>,
        desired: Vec<DesiredInstance>,
        existing: Vec<ExistingInstance>,
        states: &BTreeMap<Uuid, AgentState>,
    ) -> Result<Vec<InstancePlan>> {
        info!(
            "Planning job '{}': {} desired, {} existing",
            job.name(),
            desired.len(),
            existing.len()
        );

        let placement = AvailabilityZonePicker::new(job.name()).place_and_match(
            job.availability_zones(),
            desired.len(),
            existing,
        );

        let mut desired = desired.into_iter();
        let mut slots = Vec::with_capacity(placement.desired_count());
        for matched in placement.desired_existing {
            let Some(mut slot) = desired.next() else { break };
            slot.availability_zone = matched.availability_zone;
            slot.index = Some(matched.index);
            slot.existing_instance = Some(matched.instance.uuid);
            slots.push(Slot {
                existing: Some(matched.instance),
                desired: slot,
                index: matched.index,
            });
        }
        for new in placement.desired_new {
            let Some(mut slot) = desired.next() else { break };
            slot.availability_zone = new.availability_zone;
            slot.index = Some(new.index);
            slots.push(Slot {
                existing: None,
                desired: slot,
                index: new.index,
            });
        }
        slots.sort_by_key(|slot| slot.index);

        elect_bootstrap(&mut slots);
        let static_ips = assign_static_ips(job, &slots)?;

        let mut plans = Vec::with_capacity(slots.len() + placement.obsolete.len());
        for (slot, statics) in slots.into_iter().zip(static_ips) {
            let plan = match slot.existing {
                Some(existing) => {
                    let instance =
                        self.repository
                            .fetch_existing(&existing, states.get(&existing.uuid), &slot.desired);
                    let network_plans = NetworkPlanner::plan(
                        job,
                        &instance.uuid.to_string(),
                        &existing.applied_networks(),
                        &statics,
                    )?;
                    InstancePlan::existing(existing, slot.desired, instance, network_plans, &self.context)
                }
                None => {
                    let instance = self.repository.create(&slot.desired, slot.index);
                    let network_plans =
                        NetworkPlanner::plan(job, &instance.uuid.to_string(), &BTreeMap::new(), &statics)?;
                    InstancePlan::new_instance(slot.desired, instance, network_plans, &self.context)
                }
            };
            plans.push(plan);
        }

        plans.extend(placement.obsolete.into_iter().map(|existing| self.obsolete_plan(existing)));
        Ok(plans)
    }

    /// Plans the removal of instances whose job is no longer deployed.
    #[must_use]
    pub fn plan_obsolete_jobs(&self, jobs: &[Arc<Job>], existing: Vec<ExistingInstance>) -> Vec<InstancePlan> {
        let names: BTreeSet<&str> = jobs.iter().map(|job| job.name()).collect();
        existing
            .into_iter()
            .filter(|instance| !names.contains(instance.job.as_str()))
            .map(|instance| {
                debug!("Job '{}' is no longer deployed, removing {}", instance.job, instance.name());
                self.obsolete_plan(instance)
            })
            .collect()
    }

    fn obsolete_plan(&self, existing: ExistingInstance) -> InstancePlan {
        let instance = self.repository.fetch_obsolete(&existing);
        let network_plans = NetworkPlanner::obsolete(&instance.uuid.to_string(), &existing.applied_networks());
        InstancePlan::obsolete(existing, instance, network_plans, &self.context)
    }
}

/// Marks exactly one slot bootstrap.
///
/// Flags set on incoming slots are discarded. A kept instance that already
/// is bootstrap keeps the role; otherwise the lowest index wins. `slots` is
/// sorted by index.
fn elect_bootstrap(slots: &mut [Slot]) {
    for slot in slots.iter_mut() {
        slot.desired.clear_bootstrap();
    }

    let current = slots
        .iter()
        .position(|slot| slot.existing.as_ref().is_some_and(|e| e.bootstrap));
    let Some(elected) = current.or_else(|| (!slots.is_empty()).then_some(0)) else {
        return;
    };

    let slot = &mut slots[elected];
    slot.desired.mark_as_bootstrap();
    debug!("Elected {}/{} as bootstrap", slot.desired.job.name(), slot.index);
}

/// Picks a static address per slot for every network with static IPs.
///
/// Kept instances hold on to a static address they already use; the rest
/// take the first unclaimed one in declaration order.
fn assign_static_ips(job: &Job, slots: &[Slot]) -> Result<Vec<BTreeMap<String, Ipv4Addr>>> {
    let mut assigned = vec![BTreeMap::new(); slots.len()];

    for network in job.networks.iter().filter(|n| !n.static_ips.is_empty()) {
        let pool: BTreeSet<Ipv4Addr> = network.static_ips.iter().copied().collect();
        let mut claimed = BTreeSet::new();

        for (pos, slot) in slots.iter().enumerate() {
            let current = slot
                .existing
                .as_ref()
                .and_then(|e| e.applied_networks().get(&network.name).and_then(|s| s.ip));
            if let Some(ip) = current
                && pool.contains(&ip)
                && claimed.insert(ip)
            {
                assigned[pos].insert(network.name.clone(), ip);
            }
        }

        let mut free = network.static_ips.iter().filter(|ip| !claimed.contains(ip));
        for (pos, statics) in assigned.iter_mut().enumerate() {
            if statics.contains_key(&network.name) {
                continue;
            }
            let ip = free.next().ok_or_else(|| PlanError::StaticIpsExhausted {
                job: job.name.clone(),
                network: network.name.clone(),
            })?;
            debug!("Assigned static IP {ip} on '{}' to {}/{}", network.name, job.name, slots[pos].index);
            statics.insert(network.name.clone(), *ip);
        }
    }

    Ok(assigned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{NetworkSettings, NetworkType};
    use crate::placement::AvailabilityZone;
    use crate::planner::existing::{AppliedSpec, PersistentDisk};
    use crate::planner::instance::DefaultInstanceRepository;
    use crate::planner::job::JobNetwork;
    use proptest::prelude::*;

    fn job(instances: usize, zones: &[&str]) -> Arc<Job> {
        let mut job = Job::new("web", "prod", instances);
        job.availability_zones = zones.iter().map(|z| AvailabilityZone::new(*z)).collect();
        Arc::new(job)
    }

    fn plan(job: &Arc<Job>, existing: Vec<ExistingInstance>) -> Vec<InstancePlan> {
        let repository = DefaultInstanceRepository::new();
        let planner = InstancePlanner::new(&repository, PlanContext::default());
        planner
            .plan_job_instances(job, DesiredInstance::slots(job), existing, &BTreeMap::new())
            .unwrap()
    }

    fn bootstraps(plans: &[InstancePlan]) -> Vec<u32> {
        plans
            .iter()
            .filter(|p| p.is_bootstrap())
            .map(|p| p.instance().index)
            .collect()
    }

    #[test]
    fn test_fresh_job_creates_all_instances() {
        let job = job(3, &["z1", "z2"]);
        let plans = plan(&job, Vec::new());

        assert_eq!(plans.len(), 3);
        assert!(plans.iter().all(InstancePlan::is_new));
        let indexes: Vec<u32> = plans.iter().map(|p| p.instance().index).collect();
        assert_eq!(indexes, vec![0, 1, 2]);
        assert_eq!(bootstraps(&plans), vec![0]);
    }

    #[test]
    fn test_scale_down_prefers_low_index() {
        let job = job(1, &[]);
        let plans = plan(
            &job,
            vec![ExistingInstance::new("web", 1, None), ExistingInstance::new("web", 0, None)],
        );

        assert_eq!(plans.len(), 2);
        assert!(plans[0].is_existing());
        assert_eq!(plans[0].instance().index, 0);
        assert!(plans[1].is_obsolete());
        assert_eq!(plans[1].instance().index, 1);
    }

    #[test]
    fn test_existing_bootstrap_is_retained() {
        let job = job(3, &[]);
        let mut bootstrap = ExistingInstance::new("web", 2, None);
        bootstrap.bootstrap = true;
        let plans = plan(&job, vec![ExistingInstance::new("web", 0, None), bootstrap]);

        assert_eq!(bootstraps(&plans), vec![2]);
    }

    #[test]
    fn test_obsolete_bootstrap_moves_to_lowest_index() {
        let job = job(1, &["z1"]);
        let mut bootstrap = ExistingInstance::new("web", 0, Some("z2"));
        bootstrap.bootstrap = true;
        let plans = plan(&job, vec![bootstrap, ExistingInstance::new("web", 3, Some("z1"))]);

        assert_eq!(bootstraps(&plans), vec![3]);
        assert!(plans.iter().any(InstancePlan::is_obsolete));
    }

    #[test]
    fn test_incoming_bootstrap_flags_are_reset() {
        let job = job(3, &[]);
        let mut slots = DesiredInstance::slots(&job);
        slots[1].mark_as_bootstrap();
        slots[2].mark_as_bootstrap();

        let repository = DefaultInstanceRepository::new();
        let plans = InstancePlanner::new(&repository, PlanContext::default())
            .plan_job_instances(&job, slots, Vec::new(), &BTreeMap::new())
            .unwrap();

        assert_eq!(bootstraps(&plans), vec![0]);
    }

    #[test]
    fn test_zero_instances_elects_nobody() {
        let job = job(0, &["z1"]);
        let plans = plan(&job, vec![ExistingInstance::new("web", 0, Some("z1"))]);

        assert_eq!(plans.len(), 1);
        assert!(plans[0].is_obsolete());
        assert!(bootstraps(&plans).is_empty());
    }

    #[test]
    fn test_disk_instance_survives_scale_down() {
        let job = job(1, &["z1"]);
        let mut with_disk = ExistingInstance::new("web", 1, Some("z1"));
        with_disk.persistent_disks.push(PersistentDisk {
            disk_cid: String::from("d1"),
            size: 10,
            cloud_properties: crate::network::CloudProperties::new(),
            active: true,
        });
        let plans = plan(&job, vec![ExistingInstance::new("web", 0, Some("z1")), with_disk]);

        assert!(plans[0].is_existing());
        assert_eq!(plans[0].instance().index, 1);
        assert_eq!(plans[1].instance().index, 0);
        assert!(plans[1].is_obsolete());
    }

    fn static_job(instances: usize, ips: &[[u8; 4]]) -> Arc<Job> {
        let mut job = Job::new("db", "prod", instances);
        job.networks.push(JobNetwork {
            name: String::from("default"),
            network_type: NetworkType::Manual,
            static_ips: ips.iter().map(|ip| Ipv4Addr::from(*ip)).collect(),
            default: Vec::new(),
        });
        Arc::new(job)
    }

    fn deployed_with_ip(index: u32, ip: Ipv4Addr) -> ExistingInstance {
        let mut instance = ExistingInstance::new("db", index, None);
        instance.applied_spec = Some(AppliedSpec {
            networks: BTreeMap::from([(
                String::from("default"),
                NetworkSettings {
                    ip: Some(ip),
                    ..NetworkSettings::default()
                },
            )]),
            ..AppliedSpec::default()
        });
        instance
    }

    #[test]
    fn test_kept_instance_keeps_its_static_ip() {
        let job = static_job(2, &[[10, 0, 0, 10], [10, 0, 0, 11]]);
        let plans = plan(&job, vec![deployed_with_ip(0, Ipv4Addr::new(10, 0, 0, 11))]);

        let ips: Vec<Option<Ipv4Addr>> = plans
            .iter()
            .map(|p| p.network_plans()[0].reservation.ip())
            .collect();
        assert_eq!(
            ips,
            vec![Some(Ipv4Addr::new(10, 0, 0, 11)), Some(Ipv4Addr::new(10, 0, 0, 10))]
        );
        assert!(plans[0].network_plans()[0].is_existing());
        assert!(plans[1].network_plans()[0].is_desired());
    }

    #[test]
    fn test_static_ips_exhausted() {
        let job = static_job(2, &[[10, 0, 0, 10]]);
        let repository = DefaultInstanceRepository::new();
        let planner = InstancePlanner::new(&repository, PlanContext::default());

        let result = planner.plan_job_instances(&job, DesiredInstance::slots(&job), Vec::new(), &BTreeMap::new());
        assert!(result.is_err());
    }

    #[test]
    fn test_obsolete_jobs() {
        let repository = DefaultInstanceRepository::new();
        let planner = InstancePlanner::new(&repository, PlanContext::default());
        let jobs = vec![job(1, &[])];

        let plans = planner.plan_obsolete_jobs(
            &jobs,
            vec![ExistingInstance::new("web", 0, None), ExistingInstance::new("worker", 0, None)],
        );
        assert_eq!(plans.len(), 1);
        assert!(plans[0].is_obsolete());
        assert_eq!(plans[0].instance().job, "worker");
    }

    fn arb_existing() -> impl Strategy<Value = Vec<ExistingInstance>> {
        prop::collection::vec(
            (0u32..12, 0usize..4, any::<bool>()).prop_map(|(index, zone, bootstrap)| {
                let zone = (zone < 3).then(|| format!("z{zone}"));
                let mut instance = ExistingInstance::new("web", index, zone.as_deref());
                instance.bootstrap = bootstrap;
                instance
            }),
            0..8,
        )
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(128))]

        #[test]
        fn prop_one_bootstrap_per_job(
            existing in arb_existing(),
            flags in prop::collection::vec(any::<bool>(), 0..8),
        ) {
            let job = job(flags.len(), &["z0", "z1", "z2"]);
            let slots: Vec<DesiredInstance> = flags
                .iter()
                .map(|flag| {
                    let mut slot = DesiredInstance::new(&job);
                    slot.bootstrap = *flag;
                    slot
                })
                .collect();

            let repository = DefaultInstanceRepository::new();
            let plans = InstancePlanner::new(&repository, PlanContext::default())
                .plan_job_instances(&job, slots, existing, &BTreeMap::new())
                .unwrap();

            let expected = usize::from(!flags.is_empty());
            prop_assert_eq!(bootstraps(&plans).len(), expected);
            prop_assert!(plans.iter().filter(|p| p.is_obsolete()).all(|p| !p.is_bootstrap()));
        }
    }
}
