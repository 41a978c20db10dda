//! Index assignment for placed instances.

use std::collections::BTreeSet;

use super::PlacedInstance;

/// Assigns indexes to kept and new instances of one job.
///
/// Kept instances retain their index. When two kept instances share an
/// index, the one created for this job wins and the other moves to the
/// lowest free index. Indexes of discarded instances are never reused.
#[derive(Debug, Clone)]
pub struct IndexAssigner {
    /// Job being planned.
    job_name: String,
}

/// Result of an index assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexAssignment {
    /// Final index of each kept instance, in input order.
    pub existing: Vec<u32>,
    /// Indexes for new slots, in slot order.
    pub new: Vec<u32>,
}

/// Lowest-free-index cursor over a growing used set.
struct FreeIndexes {
    used: BTreeSet<u32>,
    cursor: u32,
}

impl FreeIndexes {
    const fn new(used: BTreeSet<u32>) -> Self {
        Self { used, cursor: 0 }
    }

    fn take(&mut self) -> u32 {
        while self.used.contains(&self.cursor) {
            self.cursor += 1;
        }
        let index = self.cursor;
        self.used.insert(index);
        index
    }
}

impl IndexAssigner {
    /// Creates an assigner for `job_name`.
    #[must_use]
    pub fn new(job_name: impl Into<String>) -> Self {
        Self {
            job_name: job_name.into(),
        }
    }

    /// Assigns indexes to `kept` instances and `new_count` new slots.
    #[must_use]
    pub fn assign<T: PlacedInstance + ?Sized>(
        &self,
        kept: &[&T],
        obsolete: &[&T],
        new_count: usize,
    ) -> IndexAssignment {
        let mut order: Vec<usize> = (0..kept.len()).collect();
        order.sort_by_key(|&i| kept[i].job_name() != self.job_name);

        let mut claimed = BTreeSet::new();
        let mut existing: Vec<Option<u32>> = vec![None; kept.len()];
        for i in order {
            let index = kept[i].index();
            if claimed.insert(index) {
                existing[i] = Some(index);
            }
        }

        let mut used: BTreeSet<u32> = obsolete.iter().map(|instance| instance.index()).collect();
        used.extend(claimed);
        let mut free = FreeIndexes::new(used);

        let existing = existing
            .into_iter()
            .map(|index| index.unwrap_or_else(|| free.take()))
            .collect();
        let new = (0..new_count).map(|_| free.take()).collect();

        IndexAssignment { existing, new }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Indexed {
        job: &'static str,
        index: u32,
    }

    impl PlacedInstance for Indexed {
        fn job_name(&self) -> &str {
            self.job
        }

        fn index(&self) -> u32 {
            self.index
        }

        fn availability_zone(&self) -> Option<&str> {
            None
        }

        fn has_active_persistent_disk(&self) -> bool {
            false
        }
    }

    fn instances(indexes: &[u32]) -> Vec<Indexed> {
        indexes.iter().map(|&index| Indexed { job: "web", index }).collect()
    }

    fn assign(kept: &[Indexed], obsolete: &[Indexed], new_count: usize) -> IndexAssignment {
        let kept: Vec<&Indexed> = kept.iter().collect();
        let obsolete: Vec<&Indexed> = obsolete.iter().collect();
        IndexAssigner::new("web").assign(&kept, &obsolete, new_count)
    }

    #[test]
    fn test_new_slots_skip_obsolete_indexes() {
        let result = assign(&[], &instances(&[0, 1]), 2);
        assert_eq!(result.new, vec![2, 3]);
    }

    #[test]
    fn test_new_slots_fill_gaps_between_obsolete() {
        let result = assign(&[], &instances(&[1, 3]), 3);
        assert_eq!(result.new, vec![0, 2, 4]);
    }

    #[test]
    fn test_duplicate_existing_indexes_are_reassigned() {
        let result = assign(&instances(&[1, 1, 1, 2]), &[], 2);
        assert_eq!(result.existing, vec![1, 0, 3, 2]);
        assert_eq!(result.new, vec![4, 5]);
    }

    #[test]
    fn test_duplicates_avoid_obsolete_indexes() {
        let result = assign(&instances(&[2, 2]), &instances(&[0, 4]), 3);
        assert_eq!(result.existing, vec![2, 1]);
        assert_eq!(result.new, vec![3, 5, 6]);
    }

    #[test]
    fn test_kept_index_is_preserved_even_if_high() {
        let result = assign(&instances(&[9]), &[], 2);
        assert_eq!(result.existing, vec![9]);
        assert_eq!(result.new, vec![0, 1]);
    }

    #[test]
    fn test_instance_of_same_job_wins_index_conflict() {
        let kept = vec![
            Indexed { job: "old-web", index: 0 },
            Indexed { job: "web", index: 0 },
        ];
        let result = assign(&kept, &[], 0);
        assert_eq!(result.existing, vec![1, 0]);
    }
}
