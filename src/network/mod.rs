//! Address pools and network reservations.
//!
//! This module owns everything that hands out IP addresses:
//! - Subnet definitions with static and restricted sub-ranges
//! - Per-network `IpProvider` with race-free dynamic allocation
//! - The `IpRepo` persistence seam keyed by `(network, ip)`
//! - Typed `NetworkReservation`s and the settings they resolve to

mod provider;
mod range;
mod registry;
mod repo;
mod reservation;
mod settings;
mod subnet;

pub use provider::IpProvider;
pub use range::{parse_ip_list, parse_ip_range};
pub use registry::{DynamicNetwork, Network, NetworkRegistry, NetworkType, VipNetwork};
pub use repo::{InMemoryIpRepo, InsertOutcome, IpAddressRecord, IpRepo};
pub use reservation::{NetworkReservation, ReservationState, ReservationType};
pub use settings::{CloudProperties, NetworkSettings};
pub use subnet::Subnet;
