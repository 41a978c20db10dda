//! Address pool for one manual network.
//!
//! Allocation is serialized per provider: the scan over free addresses and
//! the insert into the repository happen under one lock, so two concurrent
//! callers never receive the same address. The repository insert is still
//! checked, because another process sharing the store may have taken the
//! address first.

use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

use crate::error::{NetworkError, Result};

use super::repo::{InsertOutcome, IpAddressRecord, IpRepo};
use super::reservation::{NetworkReservation, ReservationType};
use super::settings::NetworkSettings;
use super::subnet::Subnet;

/// Address pool over the subnets of one network.
#[derive(Debug)]
pub struct IpProvider {
    /// Network name; the persistence key prefix.
    network: String,
    /// Subnets in declaration order.
    subnets: Vec<Subnet>,
    /// Reservation store.
    repo: Arc<dyn IpRepo>,
    /// Serializes scan-and-commit.
    allocation: Mutex<()>,
}

impl IpProvider {
    /// Creates a provider for `network`.
    #[must_use]
    pub fn new(network: impl Into<String>, subnets: Vec<Subnet>, repo: Arc<dyn IpRepo>) -> Self {
        Self {
            network: network.into(),
            subnets,
            repo,
            allocation: Mutex::new(()),
        }
    }

    /// Returns the network name.
    #[must_use]
    pub fn network(&self) -> &str {
        &self.network
    }

    /// Returns the subnets.
    #[must_use]
    pub fn subnets(&self) -> &[Subnet] {
        &self.subnets
    }

    fn subnet_for(&self, ip: Ipv4Addr) -> Option<&Subnet> {
        self.subnets.iter().find(|s| s.contains(ip))
    }

    /// Returns true if `ip` lies in a subnet and is not restricted there.
    #[must_use]
    pub fn admits(&self, ip: Ipv4Addr) -> bool {
        self.subnet_for(ip).is_some_and(|subnet| !subnet.is_restricted(ip))
    }

    /// Reserves the lowest free dynamic address.
    ///
    /// Only subnets serving `zone` are scanned, in declaration order.
    /// Returns `None` when every eligible subnet is exhausted.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository fails.
    pub fn allocate_dynamic_ip(&self, owner: &str, zone: Option<&str>) -> Result<Option<Ipv4Addr>> {
        let _guard = self.allocation.lock().unwrap_or_else(PoisonError::into_inner);
        let taken = self.repo.reserved_ips(&self.network)?;

        for subnet in self.subnets.iter().filter(|s| s.serves(zone)) {
            for ip in subnet.dynamic_ips().filter(|ip| !taken.contains(ip)) {
                let record = IpAddressRecord::new(&self.network, ip, owner, false);
                match self.repo.insert_if_absent(record)? {
                    InsertOutcome::Inserted => {
                        debug!("Allocated {ip} on '{}' for {owner}", self.network);
                        return Ok(Some(ip));
                    }
                    InsertOutcome::Taken(holder) => {
                        debug!(
                            "{ip} on '{}' was taken by {} meanwhile, trying next",
                            self.network, holder.owner
                        );
                    }
                }
            }
        }

        warn!("Network '{}' has no free dynamic addresses", self.network);
        Ok(None)
    }

    /// Reserves a specific address.
    ///
    /// Returns the pool the address was drawn from, or `None` if it is
    /// restricted or already held.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is outside every subnet or the
    /// repository fails.
    pub fn reserve_ip(&self, ip: Ipv4Addr, owner: &str) -> Result<Option<ReservationType>> {
        let subnet = self.subnet_for(ip).ok_or_else(|| NetworkError::IpOutsideSubnet {
            network: self.network.clone(),
            ip,
        })?;

        if subnet.is_restricted(ip) {
            debug!("Refusing restricted {ip} on '{}'", self.network);
            return Ok(None);
        }

        let is_static = subnet.is_static(ip);
        let _guard = self.allocation.lock().unwrap_or_else(PoisonError::into_inner);
        match self.repo.insert_if_absent(IpAddressRecord::new(&self.network, ip, owner, is_static))? {
            InsertOutcome::Inserted => {
                let kind = if is_static {
                    ReservationType::Static
                } else {
                    ReservationType::Dynamic
                };
                debug!("Reserved {kind} {ip} on '{}' for {owner}", self.network);
                Ok(Some(kind))
            }
            InsertOutcome::Taken(holder) => {
                debug!("{ip} on '{}' already held by {}", self.network, holder.owner);
                Ok(None)
            }
        }
    }

    /// Returns an address to the pool.
    ///
    /// # Errors
    ///
    /// Returns `IpNotOwned` if the address is not currently reserved.
    pub fn release_ip(&self, ip: Ipv4Addr) -> Result<()> {
        let _guard = self.allocation.lock().unwrap_or_else(PoisonError::into_inner);
        match self.repo.remove(&self.network, ip)? {
            Some(record) => {
                debug!("Released {ip} on '{}' from {}", self.network, record.owner);
                Ok(())
            }
            None => Err(NetworkError::IpNotOwned {
                network: self.network.clone(),
                ip,
            }
            .into()),
        }
    }

    /// Drops the record for `ip` if `owner` holds it.
    ///
    /// Unlike [`Self::release_ip`] this does not consult the subnets, so it
    /// also clears addresses the network no longer covers. Returns true if
    /// a record was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository fails.
    pub fn discard(&self, ip: Ipv4Addr, owner: &str) -> Result<bool> {
        let _guard = self.allocation.lock().unwrap_or_else(PoisonError::into_inner);
        match self.repo.find(&self.network, ip)? {
            Some(record) if record.owner == owner => {
                self.repo.remove(&self.network, ip)?;
                debug!("Discarded stale {ip} on '{}' held by {owner}", self.network);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Resolves a reservation against this pool.
    ///
    /// Dynamic reservations without an address get the lowest free one.
    /// Reservations with an address claim it; claiming an address already
    /// held by the same owner succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error when the pool is exhausted, the address is
    /// restricted, outside the network, held by someone else, or drawn from
    /// the wrong sub-range.
    pub fn reserve(&self, reservation: &mut NetworkReservation, zone: Option<&str>) -> Result<()> {
        reservation.begin_resolving();

        match (reservation.reservation_type(), reservation.ip()) {
            (ReservationType::Dynamic, None) => {
                let ip = self
                    .allocate_dynamic_ip(reservation.owner(), zone)?
                    .ok_or_else(|| NetworkError::NotEnoughCapacity {
                        network: self.network.clone(),
                    })?;
                reservation.resolve(Some(ip), ReservationType::Dynamic);
                Ok(())
            }
            (_, None) => Err(NetworkError::ReservationIpMissing {
                network: self.network.clone(),
                owner: reservation.owner().to_string(),
            }
            .into()),
            (requested, Some(ip)) => self.claim(reservation, ip, requested),
        }
    }

    fn claim(
        &self,
        reservation: &mut NetworkReservation,
        ip: Ipv4Addr,
        requested: ReservationType,
    ) -> Result<()> {
        let subnet = self.subnet_for(ip).ok_or_else(|| NetworkError::IpOutsideSubnet {
            network: self.network.clone(),
            ip,
        })?;

        if subnet.is_restricted(ip) {
            return Err(NetworkError::IpRestricted {
                network: self.network.clone(),
                ip,
            }
            .into());
        }

        let is_static = subnet.is_static(ip);
        let resolved = if reservation.is_existing() {
            if is_static {
                ReservationType::Static
            } else {
                ReservationType::Dynamic
            }
        } else {
            match (requested, is_static) {
                (ReservationType::Static, false) | (ReservationType::Dynamic, true) => {
                    return Err(NetworkError::StaticIpMismatch {
                        network: self.network.clone(),
                        ip,
                        requested: requested.to_string(),
                    }
                    .into());
                }
                _ => requested,
            }
        };

        let _guard = self.allocation.lock().unwrap_or_else(PoisonError::into_inner);
        let record = IpAddressRecord::new(&self.network, ip, reservation.owner(), is_static);
        if let InsertOutcome::Taken(holder) = self.repo.insert_if_absent(record)?
            && holder.owner != reservation.owner()
        {
            return Err(NetworkError::IpAlreadyInUse {
                network: self.network.clone(),
                ip,
                owner: holder.owner,
            }
            .into());
        }

        debug!("Reserved {resolved} {ip} on '{}' for {}", self.network, reservation.owner());
        reservation.resolve(Some(ip), resolved);
        Ok(())
    }

    /// Releases a reservation back to the pool.
    ///
    /// Reservations that never got an address are just marked released.
    ///
    /// # Errors
    ///
    /// Returns `IpNotOwned` if the address is not currently reserved.
    pub fn release(&self, reservation: &mut NetworkReservation) -> Result<()> {
        if let (true, Some(ip)) = (reservation.is_reserved(), reservation.ip()) {
            self.release_ip(ip)?;
        }
        reservation.mark_released();
        Ok(())
    }

    /// Builds the settings an instance receives for `ip`.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is outside every subnet.
    pub fn network_settings(&self, ip: Ipv4Addr, default: &[String]) -> Result<NetworkSettings> {
        let subnet = self.subnet_for(ip).ok_or_else(|| NetworkError::IpOutsideSubnet {
            network: self.network.clone(),
            ip,
        })?;

        Ok(NetworkSettings {
            network_type: None,
            ip: Some(ip),
            netmask: Some(subnet.netmask()),
            gateway: subnet.gateway(),
            dns: subnet.dns().to_vec(),
            cloud_properties: subnet.cloud_properties().clone(),
            default: default.to_vec(),
        })
    }
}
