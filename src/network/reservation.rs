//! Network reservations owned by instances.

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

use super::settings::NetworkSettings;

/// Kind of address a reservation asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationType {
    /// Any free address from the dynamic pool.
    Dynamic,
    /// A specific address from the static sub-range.
    Static,
    /// A virtual IP not managed by a pool.
    Vip,
}

/// Lifecycle of a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationState {
    /// Requested, nothing claimed yet.
    Unresolved,
    /// A claim is in progress.
    Resolving,
    /// The address is held.
    Reserved,
    /// The address was returned to the pool.
    Released,
}

/// A claim on an address of one network by one instance.
///
/// Identity is `(network, owner)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkReservation {
    network: String,
    owner: String,
    reservation_type: ReservationType,
    ip: Option<Ipv4Addr>,
    state: ReservationState,
    existing: bool,
    settings: Option<NetworkSettings>,
}

impl NetworkReservation {
    fn unresolved(
        network: impl Into<String>,
        owner: impl Into<String>,
        reservation_type: ReservationType,
        ip: Option<Ipv4Addr>,
    ) -> Self {
        Self {
            network: network.into(),
            owner: owner.into(),
            reservation_type,
            ip,
            state: ReservationState::Unresolved,
            existing: false,
            settings: None,
        }
    }

    /// Requests any free address.
    #[must_use]
    pub fn dynamic(network: impl Into<String>, owner: impl Into<String>) -> Self {
        Self::unresolved(network, owner, ReservationType::Dynamic, None)
    }

    /// Requests a specific static address.
    #[must_use]
    pub fn with_static_ip(network: impl Into<String>, owner: impl Into<String>, ip: Ipv4Addr) -> Self {
        Self::unresolved(network, owner, ReservationType::Static, Some(ip))
    }

    /// Requests a virtual IP.
    #[must_use]
    pub fn vip(network: impl Into<String>, owner: impl Into<String>, ip: Ipv4Addr) -> Self {
        Self::unresolved(network, owner, ReservationType::Vip, Some(ip))
    }

    /// Rebuilds a reservation an instance already holds.
    ///
    /// Its type is settled again when it is re-reserved: static if the
    /// address lies in the static sub-range, dynamic otherwise.
    #[must_use]
    pub fn existing(
        network: impl Into<String>,
        owner: impl Into<String>,
        reservation_type: ReservationType,
        ip: Option<Ipv4Addr>,
        settings: Option<NetworkSettings>,
    ) -> Self {
        Self {
            network: network.into(),
            owner: owner.into(),
            reservation_type,
            ip,
            state: ReservationState::Reserved,
            existing: true,
            settings,
        }
    }

    /// Returns the network name.
    #[must_use]
    pub fn network(&self) -> &str {
        &self.network
    }

    /// Returns the owner identifier.
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Returns the reservation type.
    #[must_use]
    pub const fn reservation_type(&self) -> ReservationType {
        self.reservation_type
    }

    /// Returns the address, once known.
    #[must_use]
    pub const fn ip(&self) -> Option<Ipv4Addr> {
        self.ip
    }

    /// Returns the lifecycle state.
    #[must_use]
    pub const fn state(&self) -> ReservationState {
        self.state
    }

    /// Returns true if this reservation was rebuilt from a deployed instance.
    #[must_use]
    pub const fn is_existing(&self) -> bool {
        self.existing
    }

    /// Returns true if the address is held.
    #[must_use]
    pub const fn is_reserved(&self) -> bool {
        matches!(self.state, ReservationState::Reserved)
    }

    /// Returns true if this is a static reservation.
    #[must_use]
    pub const fn is_static(&self) -> bool {
        matches!(self.reservation_type, ReservationType::Static)
    }

    /// Returns the resolved network settings.
    #[must_use]
    pub const fn settings(&self) -> Option<&NetworkSettings> {
        self.settings.as_ref()
    }

    /// Marks a claim as in progress.
    pub const fn begin_resolving(&mut self) {
        self.state = ReservationState::Resolving;
    }

    /// Records the claimed address and final type.
    pub const fn resolve(&mut self, ip: Option<Ipv4Addr>, reservation_type: ReservationType) {
        self.ip = ip;
        self.reservation_type = reservation_type;
        self.state = ReservationState::Reserved;
    }

    /// Attaches resolved settings.
    pub fn set_settings(&mut self, settings: NetworkSettings) {
        self.settings = Some(settings);
    }

    /// Marks the reservation as returned to the pool.
    pub const fn mark_released(&mut self) {
        self.state = ReservationState::Released;
    }
}

impl std::fmt::Display for ReservationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Dynamic => "dynamic",
            Self::Static => "static",
            Self::Vip => "vip",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for NetworkReservation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} reservation on '{}' for {}", self.reservation_type, self.network, self.owner)?;
        if let Some(ip) = self.ip {
            write!(f, " ({ip})")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle() {
        let mut reservation = NetworkReservation::dynamic("default", "web/0");
        assert_eq!(reservation.state(), ReservationState::Unresolved);
        assert!(reservation.ip().is_none());

        reservation.begin_resolving();
        assert_eq!(reservation.state(), ReservationState::Resolving);

        reservation.resolve(Some(Ipv4Addr::new(10, 0, 0, 2)), ReservationType::Dynamic);
        assert!(reservation.is_reserved());

        reservation.mark_released();
        assert_eq!(reservation.state(), ReservationState::Released);
    }

    #[test]
    fn test_display() {
        let reservation = NetworkReservation::with_static_ip("default", "web/0", Ipv4Addr::new(10, 0, 0, 9));
        assert_eq!(
            reservation.to_string(),
            "static reservation on 'default' for web/0 (10.0.0.9)"
        );
    }
}
