//! Availability-zone placement.
//!
//! Given the zones of a job, a number of desired slots and the instances
//! that already exist, placement decides which instances are reused, which
//! are discarded and where brand-new instances go:
//! - Slot counts are balanced across zones, favouring zones that already
//!   hold instances
//! - Within a zone, instances with an active persistent disk are kept first
//! - New slots receive the lowest indexes not used by kept or discarded
//!   instances

mod index;
mod picker;
mod zone;

pub use index::{IndexAssigner, IndexAssignment};
pub use picker::{AvailabilityZonePicker, ExistingMatch, NewSlot, Placement};
pub use zone::AvailabilityZone;

/// What placement needs to know about an existing instance.
pub trait PlacedInstance {
    /// Job the instance was created for.
    fn job_name(&self) -> &str;

    /// Index within its job.
    fn index(&self) -> u32;

    /// Zone the instance lives in.
    fn availability_zone(&self) -> Option<&str>;

    /// Whether the instance carries an active persistent disk.
    fn has_active_persistent_disk(&self) -> bool;
}
