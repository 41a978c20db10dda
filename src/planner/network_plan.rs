//! Per-instance network plans.
//!
//! An instance's current network settings are reconciled against the
//! networks of its job. Reservations that still fit are kept as `Existing`,
//! ones that no longer fit become `Obsolete`, and anything missing is
//! requested as `Desired`.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use tracing::debug;

use crate::error::{PlanError, Result};
use crate::network::{NetworkReservation, NetworkSettings, NetworkType, ReservationType};

use super::job::{Job, JobNetwork};

/// Role of a reservation in an instance's plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkPlanStatus {
    /// Needs to be reserved.
    Desired,
    /// Already held and still wanted.
    Existing,
    /// Held but no longer wanted.
    Obsolete,
}

/// A reservation together with what should happen to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkPlan {
    /// The reservation.
    pub reservation: NetworkReservation,
    /// What should happen to it.
    pub status: NetworkPlanStatus,
}

impl NetworkPlan {
    /// Plan for a reservation to acquire.
    #[must_use]
    pub const fn desired(reservation: NetworkReservation) -> Self {
        Self {
            reservation,
            status: NetworkPlanStatus::Desired,
        }
    }

    /// Plan for a held reservation that stays.
    #[must_use]
    pub const fn existing(reservation: NetworkReservation) -> Self {
        Self {
            reservation,
            status: NetworkPlanStatus::Existing,
        }
    }

    /// Plan for a held reservation to release.
    #[must_use]
    pub const fn obsolete(reservation: NetworkReservation) -> Self {
        Self {
            reservation,
            status: NetworkPlanStatus::Obsolete,
        }
    }

    /// Returns true if the reservation must be acquired.
    #[must_use]
    pub const fn is_desired(&self) -> bool {
        matches!(self.status, NetworkPlanStatus::Desired)
    }

    /// Returns true if the reservation is kept.
    #[must_use]
    pub const fn is_existing(&self) -> bool {
        matches!(self.status, NetworkPlanStatus::Existing)
    }

    /// Returns true if the reservation must be released.
    #[must_use]
    pub const fn is_obsolete(&self) -> bool {
        matches!(self.status, NetworkPlanStatus::Obsolete)
    }
}

/// Reconciles current network settings with a job's networks.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetworkPlanner;

impl NetworkPlanner {
    /// Plans the reservations of one instance.
    ///
    /// `static_ips` holds the static address picked for this instance on
    /// each network that has static addresses.
    ///
    /// # Errors
    ///
    /// Returns `StaticIpsExhausted` if a vip network has no address for
    /// this instance.
    pub fn plan(
        job: &Job,
        owner: &str,
        current: &BTreeMap<String, NetworkSettings>,
        static_ips: &BTreeMap<String, Ipv4Addr>,
    ) -> Result<Vec<NetworkPlan>> {
        let mut plans = Vec::new();

        for network in &job.networks {
            let static_ip = static_ips.get(&network.name).copied();

            if let Some(settings) = current.get(&network.name) {
                let reservation = existing_reservation(&network.name, owner, settings);
                if fits(network, &reservation, static_ip) {
                    plans.push(NetworkPlan::existing(reservation));
                    continue;
                }
                debug!("Reservation {reservation} no longer fits network '{}'", network.name);
                plans.push(NetworkPlan::obsolete(reservation));
            }

            plans.push(NetworkPlan::desired(desired_reservation(job, network, owner, static_ip)?));
        }

        for (name, settings) in current {
            if job.network(name).is_none() {
                plans.push(NetworkPlan::obsolete(existing_reservation(name, owner, settings)));
            }
        }

        Ok(plans)
    }

    /// Plans the release of every reservation an instance holds.
    #[must_use]
    pub fn obsolete(owner: &str, current: &BTreeMap<String, NetworkSettings>) -> Vec<NetworkPlan> {
        current
            .iter()
            .map(|(name, settings)| NetworkPlan::obsolete(existing_reservation(name, owner, settings)))
            .collect()
    }
}

/// Rebuilds the reservation behind applied network settings.
fn existing_reservation(network: &str, owner: &str, settings: &NetworkSettings) -> NetworkReservation {
    let reservation_type = match settings.network_type.as_deref() {
        Some("vip") => ReservationType::Vip,
        _ => ReservationType::Dynamic,
    };
    let ip = match settings.network_type.as_deref() {
        Some("dynamic") => None,
        _ => settings.ip,
    };
    NetworkReservation::existing(network, owner, reservation_type, ip, Some(settings.clone()))
}

/// Returns true if a held reservation still satisfies the job network.
fn fits(network: &JobNetwork, reservation: &NetworkReservation, static_ip: Option<Ipv4Addr>) -> bool {
    let kind = reservation.settings().and_then(|s| s.network_type.as_deref());
    match network.network_type {
        NetworkType::Dynamic => kind == Some("dynamic"),
        NetworkType::Vip => kind == Some("vip") && reservation.ip() == static_ip,
        NetworkType::Manual => {
            kind.is_none() && reservation.ip().is_some() && static_ip.is_none_or(|ip| reservation.ip() == Some(ip))
        }
    }
}

fn desired_reservation(
    job: &Job,
    network: &JobNetwork,
    owner: &str,
    static_ip: Option<Ipv4Addr>,
) -> Result<NetworkReservation> {
    let reservation = match (network.network_type, static_ip) {
        (NetworkType::Vip, Some(ip)) => NetworkReservation::vip(&network.name, owner, ip),
        (NetworkType::Vip, None) => {
            return Err(PlanError::StaticIpsExhausted {
                job: job.name.clone(),
                network: network.name.clone(),
            }
            .into());
        }
        (NetworkType::Manual, Some(ip)) => NetworkReservation::with_static_ip(&network.name, owner, ip),
        (NetworkType::Manual | NetworkType::Dynamic, _) => NetworkReservation::dynamic(&network.name, owner),
    };
    Ok(reservation)
}
