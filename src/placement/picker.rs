//! Balanced, churn-minimizing zone placement.

use std::cmp::Reverse;
use std::collections::BTreeMap;
use tracing::debug;

use super::index::IndexAssigner;
use super::zone::AvailabilityZone;
use super::PlacedInstance;

/// An existing instance kept for a desired slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingMatch<T> {
    /// The reused instance.
    pub instance: T,
    /// Zone of the slot.
    pub availability_zone: Option<String>,
    /// Index of the slot.
    pub index: u32,
}

/// A desired slot with no existing instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSlot {
    /// Zone of the slot.
    pub availability_zone: Option<String>,
    /// Index of the slot.
    pub index: u32,
}

/// Outcome of placement; the three lists are disjoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement<T> {
    /// Existing instances matched to desired slots.
    pub desired_existing: Vec<ExistingMatch<T>>,
    /// Desired slots that need a new instance.
    pub desired_new: Vec<NewSlot>,
    /// Existing instances that are not reused.
    pub obsolete: Vec<T>,
}

impl<T> Placement<T> {
    /// Number of desired slots, matched or new.
    #[must_use]
    pub fn desired_count(&self) -> usize {
        self.desired_existing.len() + self.desired_new.len()
    }

    /// Desired slots per zone.
    #[must_use]
    pub fn zone_counts(&self) -> BTreeMap<Option<String>, usize> {
        let mut counts = BTreeMap::new();
        let zones = self
            .desired_existing
            .iter()
            .map(|m| &m.availability_zone)
            .chain(self.desired_new.iter().map(|n| &n.availability_zone));
        for zone in zones {
            *counts.entry(zone.clone()).or_insert(0) += 1;
        }
        counts
    }
}

/// Places the desired slots of one job across its zones.
#[derive(Debug, Clone)]
pub struct AvailabilityZonePicker {
    /// Index assignment policy.
    index_assigner: IndexAssigner,
}

impl AvailabilityZonePicker {
    /// Creates a picker for `job_name`.
    #[must_use]
    pub fn new(job_name: impl Into<String>) -> Self {
        Self {
            index_assigner: IndexAssigner::new(job_name),
        }
    }

    /// Matches `desired` slots over `zones` against `existing` instances.
    ///
    /// Total over every input: an empty zone list places all slots in a
    /// single zone-less bucket, and instances whose zone is not desired end
    /// up obsolete.
    #[must_use]
    pub fn place_and_match<T: PlacedInstance>(
        &self,
        zones: &[AvailabilityZone],
        desired: usize,
        existing: Vec<T>,
    ) -> Placement<T> {
        let bucket_zones: Vec<Option<&str>> = if zones.is_empty() {
            vec![None]
        } else {
            zones.iter().map(|z| Some(z.name.as_str())).collect()
        };

        let mut obsolete = Vec::new();
        let mut buckets: Vec<Vec<T>> = bucket_zones.iter().map(|_| Vec::new()).collect();
        for instance in existing {
            match bucket_zones.iter().position(|z| *z == instance.availability_zone()) {
                Some(pos) => buckets[pos].push(instance),
                None => {
                    debug!(
                        "Instance {}/{} in zone {:?} is outside the desired zones",
                        instance.job_name(),
                        instance.index(),
                        instance.availability_zone()
                    );
                    obsolete.push(instance);
                }
            }
        }

        let existing_counts: Vec<usize> = buckets.iter().map(Vec::len).collect();
        let quotas = balanced_quotas(desired, &existing_counts);

        let mut kept: Vec<(T, usize)> = Vec::new();
        let mut shortfall = vec![0usize; buckets.len()];
        for (pos, mut bucket) in buckets.into_iter().enumerate() {
            bucket.sort_by_key(|i| (Reverse(i.has_active_persistent_disk()), i.index()));
            let keep = quotas[pos].min(bucket.len());
            obsolete.extend(bucket.split_off(keep));
            kept.extend(bucket.into_iter().map(|instance| (instance, pos)));
            shortfall[pos] = quotas[pos] - keep;
        }

        let new_zones = round_robin(&mut shortfall);

        let assignment = {
            let kept_refs: Vec<&T> = kept.iter().map(|(instance, _)| instance).collect();
            let obsolete_refs: Vec<&T> = obsolete.iter().collect();
            self.index_assigner
                .assign(&kept_refs, &obsolete_refs, new_zones.len())
        };

        let zone_name = |pos: usize| bucket_zones[pos].map(String::from);

        let desired_existing: Vec<ExistingMatch<T>> = kept
            .into_iter()
            .zip(assignment.existing)
            .map(|((instance, pos), index)| ExistingMatch {
                instance,
                availability_zone: zone_name(pos),
                index,
            })
            .collect();

        let desired_new: Vec<NewSlot> = new_zones
            .into_iter()
            .zip(assignment.new)
            .map(|(pos, index)| NewSlot {
                availability_zone: zone_name(pos),
                index,
            })
            .collect();

        debug!(
            "Placed {desired} slots over {} zones: {} existing, {} new, {} obsolete",
            zones.len(),
            desired_existing.len(),
            desired_new.len(),
            obsolete.len()
        );

        Placement {
            desired_existing,
            desired_new,
            obsolete,
        }
    }
}

/// Splits `desired` over zones so counts differ by at most one.
///
/// The larger share goes to the zones holding the most existing instances;
/// ties keep declaration order.
fn balanced_quotas(desired: usize, existing_counts: &[usize]) -> Vec<usize> {
    let zones = existing_counts.len().max(1);
    let base = desired / zones;
    let extra = desired % zones;

    let mut order: Vec<usize> = (0..existing_counts.len()).collect();
    order.sort_by_key(|&pos| Reverse(existing_counts[pos]));

    let mut quotas = vec![base; existing_counts.len()];
    for &pos in order.iter().take(extra) {
        quotas[pos] += 1;
    }
    quotas
}

/// Hands out one new slot per zone per round, in declaration order.
fn round_robin(shortfall: &mut [usize]) -> Vec<usize> {
    let mut zones = Vec::with_capacity(shortfall.iter().sum());
    while shortfall.iter().any(|&n| n > 0) {
        for (pos, remaining) in shortfall.iter_mut().enumerate() {
            if *remaining > 0 {
                *remaining -= 1;
                zones.push(pos);
            }
        }
    }
    zones
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Existing {
        index: u32,
        zone: Option<String>,
        disk: bool,
    }

    impl PlacedInstance for Existing {
        fn job_name(&self) -> &str {
            "web"
        }

        fn index(&self) -> u32 {
            self.index
        }

        fn availability_zone(&self) -> Option<&str> {
            self.zone.as_deref()
        }

        fn has_active_persistent_disk(&self) -> bool {
            self.disk
        }
    }

    fn existing(index: u32, zone: Option<&str>) -> Existing {
        Existing {
            index,
            zone: zone.map(String::from),
            disk: false,
        }
    }

    fn zones(names: &[&str]) -> Vec<AvailabilityZone> {
        names.iter().map(|n| AvailabilityZone::new(*n)).collect()
    }

    fn picker() -> AvailabilityZonePicker {
        AvailabilityZonePicker::new("web")
    }

    fn matched(placement: &Placement<Existing>) -> Vec<(u32, Option<&str>)> {
        placement
            .desired_existing
            .iter()
            .map(|m| (m.index, m.availability_zone.as_deref()))
            .collect()
    }

    fn new_slots(placement: &Placement<Existing>) -> Vec<(u32, Option<&str>)> {
        placement
            .desired_new
            .iter()
            .map(|n| (n.index, n.availability_zone.as_deref()))
            .collect()
    }

    fn obsolete_indexes(placement: &Placement<Existing>) -> Vec<u32> {
        placement.obsolete.iter().map(|o| o.index).collect()
    }

    #[test]
    fn test_without_zones_matches_by_index() {
        let placement = picker().place_and_match(
            &[],
            3,
            vec![existing(0, None), existing(1, None)],
        );

        assert_eq!(matched(&placement), vec![(0, None), (1, None)]);
        assert_eq!(new_slots(&placement), vec![(2, None)]);
        assert!(placement.obsolete.is_empty());
    }

    #[test]
    fn test_scale_down_keeps_lowest_index() {
        let placement = picker().place_and_match(
            &[],
            1,
            vec![existing(1, None), existing(0, None)],
        );

        assert_eq!(matched(&placement), vec![(0, None)]);
        assert!(placement.desired_new.is_empty());
        assert_eq!(obsolete_indexes(&placement), vec![1]);
    }

    #[test]
    fn test_new_instances_round_robin_over_zones() {
        let placement = picker().place_and_match(&zones(&["z1", "z2"]), 3, Vec::new());

        assert_eq!(
            new_slots(&placement),
            vec![(0, Some("z1")), (1, Some("z2")), (2, Some("z1"))]
        );
    }

    #[test]
    fn test_shrink_to_one_zone() {
        let placement = picker().place_and_match(
            &zones(&["z1"]),
            3,
            vec![
                existing(0, Some("z1")),
                existing(2, Some("z1")),
                existing(1, Some("z2")),
            ],
        );

        assert_eq!(matched(&placement), vec![(0, Some("z1")), (2, Some("z1"))]);
        assert_eq!(new_slots(&placement), vec![(3, Some("z1"))]);
        assert_eq!(obsolete_indexes(&placement), vec![1]);
    }

    #[test]
    fn test_spreading_to_a_new_zone() {
        let placement = picker().place_and_match(
            &zones(&["z1", "z2", "z3"]),
            5,
            vec![
                existing(0, Some("z1")),
                existing(1, Some("z1")),
                existing(2, Some("z1")),
                existing(3, Some("z2")),
                existing(4, Some("z2")),
            ],
        );

        assert_eq!(
            matched(&placement),
            vec![(0, Some("z1")), (1, Some("z1")), (3, Some("z2")), (4, Some("z2"))]
        );
        assert_eq!(new_slots(&placement), vec![(5, Some("z3"))]);
        assert_eq!(obsolete_indexes(&placement), vec![2]);
    }

    #[test]
    fn test_extra_slot_goes_to_fullest_zone() {
        let placement = picker().place_and_match(
            &zones(&["z1", "z2", "z3"]),
            4,
            vec![
                existing(0, Some("z1")),
                existing(1, Some("z2")),
                existing(2, Some("z2")),
            ],
        );

        let counts = placement.zone_counts();
        assert_eq!(counts[&Some(String::from("z1"))], 1);
        assert_eq!(counts[&Some(String::from("z2"))], 2);
        assert_eq!(counts[&Some(String::from("z3"))], 1);
        assert_eq!(new_slots(&placement), vec![(3, Some("z3"))]);
        assert!(placement.obsolete.is_empty());
    }

    #[test]
    fn test_instance_in_unknown_zone_is_obsolete() {
        let placement = picker().place_and_match(
            &zones(&["z1", "z2"]),
            2,
            vec![existing(0, Some("z1")), existing(1, Some("z66"))],
        );

        assert_eq!(matched(&placement), vec![(0, Some("z1"))]);
        assert_eq!(new_slots(&placement), vec![(2, Some("z2"))]);
        assert_eq!(obsolete_indexes(&placement), vec![1]);
    }

    #[test]
    fn test_removing_a_zone() {
        let placement = picker().place_and_match(
            &zones(&["z1", "z2"]),
            6,
            vec![
                existing(0, Some("z1")),
                existing(1, Some("z2")),
                existing(2, Some("z3")),
                existing(3, Some("z1")),
                existing(4, Some("z2")),
                existing(5, Some("z3")),
            ],
        );

        assert_eq!(new_slots(&placement), vec![(6, Some("z1")), (7, Some("z2"))]);
        assert_eq!(obsolete_indexes(&placement), vec![2, 5]);
    }

    #[test]
    fn test_zoned_instances_are_obsolete_without_zones() {
        let placement = picker().place_and_match(&[], 1, vec![existing(0, Some("z1"))]);

        assert_eq!(new_slots(&placement), vec![(1, None)]);
        assert_eq!(obsolete_indexes(&placement), vec![0]);
    }

    #[test]
    fn test_disk_bearing_instance_survives_scale_down() {
        let mut with_disk = existing(3, Some("z1"));
        with_disk.disk = true;

        let placement = picker().place_and_match(
            &zones(&["z1"]),
            1,
            vec![existing(0, Some("z1")), with_disk],
        );

        assert_eq!(matched(&placement), vec![(3, Some("z1"))]);
        assert_eq!(obsolete_indexes(&placement), vec![0]);
    }

    #[test]
    fn test_empty_inputs() {
        let placement = picker().place_and_match::<Existing>(&zones(&["z1"]), 0, Vec::new());
        assert_eq!(placement.desired_count(), 0);
        assert!(placement.obsolete.is_empty());
    }

    #[test]
    fn test_balanced_quotas_tie_break_is_declaration_order() {
        assert_eq!(balanced_quotas(4, &[0, 0, 0]), vec![2, 1, 1]);
        assert_eq!(balanced_quotas(4, &[0, 1, 1]), vec![1, 2, 1]);
        assert_eq!(balanced_quotas(0, &[3, 3]), vec![0, 0]);
    }

    fn arb_existing(zone_count: usize) -> impl Strategy<Value = Vec<Existing>> {
        prop::collection::vec(
            (0u32..24, 0..=zone_count, any::<bool>()).prop_map(move |(index, zone, disk)| {
                Existing {
                    index,
                    zone: (zone < zone_count).then(|| format!("z{zone}")),
                    disk,
                }
            }),
            0..16,
        )
    }

    fn arb_case() -> impl Strategy<Value = (usize, usize, Vec<Existing>)> {
        (1usize..5).prop_flat_map(|zone_count| (Just(zone_count), 0usize..16, arb_existing(zone_count)))
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn prop_placement_is_balanced_partition((zone_count, desired, existing) in arb_case()) {
            let names: Vec<String> = (0..zone_count).map(|z| format!("z{z}")).collect();
            let zones: Vec<AvailabilityZone> = names.iter().map(AvailabilityZone::new).collect();
            let total_existing = existing.len();

            let placement = picker().place_and_match(&zones, desired, existing);

            prop_assert_eq!(placement.desired_count(), desired);
            prop_assert_eq!(placement.desired_existing.len() + placement.obsolete.len(), total_existing);

            let counts = placement.zone_counts();
            let per_zone: Vec<usize> = names
                .iter()
                .map(|n| counts.get(&Some(n.clone())).copied().unwrap_or(0))
                .collect();
            let min = per_zone.iter().min().copied().unwrap_or(0);
            let max = per_zone.iter().max().copied().unwrap_or(0);
            prop_assert!(max - min <= 1);
            prop_assert_eq!(per_zone.iter().sum::<usize>(), desired);
        }

        #[test]
        fn prop_disk_bearing_instances_are_evicted_last((zone_count, desired, existing) in arb_case()) {
            let zones: Vec<AvailabilityZone> =
                (0..zone_count).map(|z| AvailabilityZone::new(format!("z{z}"))).collect();

            let placement = picker().place_and_match(&zones, desired, existing);

            for evicted in placement.obsolete.iter().filter(|o| o.disk && o.zone.is_some()) {
                let diskless_kept = placement
                    .desired_existing
                    .iter()
                    .any(|m| m.instance.zone == evicted.zone && !m.instance.disk);
                prop_assert!(!diskless_kept);
            }
        }

        #[test]
        fn prop_desired_indexes_are_unique((zone_count, desired, existing) in arb_case()) {
            let zones: Vec<AvailabilityZone> =
                (0..zone_count).map(|z| AvailabilityZone::new(format!("z{z}"))).collect();

            let placement = picker().place_and_match(&zones, desired, existing);

            let mut indexes: Vec<u32> = placement
                .desired_existing
                .iter()
                .map(|m| m.index)
                .chain(placement.desired_new.iter().map(|n| n.index))
                .collect();
            indexes.sort_unstable();
            indexes.dedup();
            prop_assert_eq!(indexes.len(), desired);

            for slot in &placement.desired_new {
                prop_assert!(placement.obsolete.iter().all(|o| o.index != slot.index));
            }
        }
    }
}
