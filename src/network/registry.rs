//! Deployment networks and the registry that looks them up by name.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::debug;

use crate::error::{NetworkError, Result};

use super::provider::IpProvider;
use super::reservation::{NetworkReservation, ReservationType};
use super::settings::{CloudProperties, NetworkSettings};

/// Kind of network.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkType {
    /// Addresses allocated from declared subnets.
    #[default]
    Manual,
    /// Addresses assigned by the cloud provider.
    Dynamic,
    /// Virtual IPs bound explicitly per instance.
    Vip,
}

impl std::fmt::Display for NetworkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Manual => "manual",
            Self::Dynamic => "dynamic",
            Self::Vip => "vip",
        };
        write!(f, "{s}")
    }
}

/// A network whose addresses the cloud provider assigns.
#[derive(Debug, Clone, Default)]
pub struct DynamicNetwork {
    /// Network name.
    pub name: String,
    /// DNS servers.
    pub dns: Vec<Ipv4Addr>,
    /// Cloud properties.
    pub cloud_properties: CloudProperties,
}

/// A network of virtual IPs.
#[derive(Debug, Clone, Default)]
pub struct VipNetwork {
    /// Network name.
    pub name: String,
    /// Cloud properties.
    pub cloud_properties: CloudProperties,
}

/// A deployment network.
#[derive(Debug, Clone)]
pub enum Network {
    /// Pool-backed network.
    Manual(Arc<IpProvider>),
    /// Cloud-assigned addresses.
    Dynamic(DynamicNetwork),
    /// Virtual IPs.
    Vip(VipNetwork),
}

impl Network {
    /// Returns the network name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Manual(provider) => provider.network(),
            Self::Dynamic(network) => &network.name,
            Self::Vip(network) => &network.name,
        }
    }

    /// Returns the network kind.
    #[must_use]
    pub const fn network_type(&self) -> NetworkType {
        match self {
            Self::Manual(_) => NetworkType::Manual,
            Self::Dynamic(_) => NetworkType::Dynamic,
            Self::Vip(_) => NetworkType::Vip,
        }
    }

    /// Resolves a reservation and attaches its settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool cannot satisfy the reservation, or a VIP
    /// reservation has no address.
    pub fn reserve(
        &self,
        reservation: &mut NetworkReservation,
        zone: Option<&str>,
        default: &[String],
    ) -> Result<()> {
        match self {
            Self::Manual(provider) => provider.reserve(reservation, zone)?,
            Self::Dynamic(_) => {
                reservation.begin_resolving();
                reservation.resolve(None, ReservationType::Dynamic);
            }
            Self::Vip(_) => {
                let ip = reservation.ip().ok_or_else(|| NetworkError::ReservationIpMissing {
                    network: self.name().to_string(),
                    owner: reservation.owner().to_string(),
                })?;
                reservation.begin_resolving();
                reservation.resolve(Some(ip), ReservationType::Vip);
            }
        }

        let settings = self.network_settings(reservation, default)?;
        reservation.set_settings(settings);
        debug!("Resolved {reservation}");
        Ok(())
    }

    /// Releases a reservation.
    ///
    /// Only manual networks hold pool state; other kinds are just marked.
    ///
    /// # Errors
    ///
    /// Returns `IpNotOwned` if a manual address is not currently reserved.
    pub fn release(&self, reservation: &mut NetworkReservation) -> Result<()> {
        match self {
            Self::Manual(provider) => provider.release(reservation),
            Self::Dynamic(_) | Self::Vip(_) => {
                reservation.mark_released();
                Ok(())
            }
        }
    }

    /// Returns true if the network can still hold the reservation's address.
    ///
    /// Only manual networks constrain addresses; the address must lie in a
    /// subnet and not be restricted.
    #[must_use]
    pub fn admits(&self, reservation: &NetworkReservation) -> bool {
        match self {
            Self::Manual(provider) => reservation.ip().is_some_and(|ip| provider.admits(ip)),
            Self::Dynamic(_) | Self::Vip(_) => true,
        }
    }

    /// Gives up a held reservation that can no longer be confirmed.
    ///
    /// Any pool record the reservation's owner still holds for the address
    /// is removed, then the reservation is marked released.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository fails.
    pub fn forget(&self, reservation: &mut NetworkReservation) -> Result<()> {
        if let (Self::Manual(provider), Some(ip)) = (self, reservation.ip()) {
            provider.discard(ip, reservation.owner())?;
        }
        reservation.mark_released();
        Ok(())
    }

    /// Builds the settings an instance receives for a resolved reservation.
    ///
    /// # Errors
    ///
    /// Returns an error if a manual or VIP reservation has no address, or a
    /// manual address is outside every subnet.
    pub fn network_settings(
        &self,
        reservation: &NetworkReservation,
        default: &[String],
    ) -> Result<NetworkSettings> {
        let missing_ip = || NetworkError::ReservationIpMissing {
            network: self.name().to_string(),
            owner: reservation.owner().to_string(),
        };

        match self {
            Self::Manual(provider) => {
                let ip = reservation.ip().ok_or_else(missing_ip)?;
                provider.network_settings(ip, default)
            }
            Self::Dynamic(network) => Ok(NetworkSettings {
                network_type: Some(String::from("dynamic")),
                dns: network.dns.clone(),
                cloud_properties: network.cloud_properties.clone(),
                default: default.to_vec(),
                ..NetworkSettings::default()
            }),
            Self::Vip(network) => Ok(NetworkSettings {
                network_type: Some(String::from("vip")),
                ip: Some(reservation.ip().ok_or_else(missing_ip)?),
                cloud_properties: network.cloud_properties.clone(),
                ..NetworkSettings::default()
            }),
        }
    }
}

/// Networks of a deployment, by name.
#[derive(Debug, Clone, Default)]
pub struct NetworkRegistry {
    networks: BTreeMap<String, Network>,
}

impl NetworkRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a network, replacing any previous one with the same name.
    pub fn insert(&mut self, network: Network) {
        self.networks.insert(network.name().to_string(), network);
    }

    /// Looks up a network.
    ///
    /// # Errors
    ///
    /// Returns `UnknownNetwork` if no network has this name.
    pub fn get(&self, name: &str) -> Result<&Network> {
        self.networks.get(name).ok_or_else(|| {
            NetworkError::UnknownNetwork {
                network: name.to_string(),
            }
            .into()
        })
    }

    /// Returns true if the registry holds a network with this name.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.networks.contains_key(name)
    }

    /// Returns the number of networks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.networks.len()
    }

    /// Returns true if there are no networks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{InMemoryIpRepo, Subnet};

    fn registry() -> NetworkRegistry {
        let subnet = Subnet::new("10.0.0.0/24".parse().unwrap(), Some(Ipv4Addr::new(10, 0, 0, 1))).unwrap();
        let provider = IpProvider::new("private", vec![subnet], Arc::new(InMemoryIpRepo::new()));

        let mut registry = NetworkRegistry::new();
        registry.insert(Network::Manual(Arc::new(provider)));
        registry.insert(Network::Dynamic(DynamicNetwork {
            name: String::from("cloud"),
            dns: vec![Ipv4Addr::new(1, 1, 1, 1)],
            cloud_properties: CloudProperties::new(),
        }));
        registry.insert(Network::Vip(VipNetwork {
            name: String::from("public"),
            cloud_properties: CloudProperties::new(),
        }));
        registry
    }

    #[test]
    fn test_manual_reserve_attaches_settings() {
        let registry = registry();
        let network = registry.get("private").unwrap();
        let mut reservation = NetworkReservation::dynamic("private", "web/0");

        network.reserve(&mut reservation, None, &[]).unwrap();
        let settings = reservation.settings().unwrap();
        assert_eq!(settings.ip, Some(Ipv4Addr::new(10, 0, 0, 2)));
        assert!(settings.network_type.is_none());
    }

    #[test]
    fn test_dynamic_network_settings() {
        let registry = registry();
        let network = registry.get("cloud").unwrap();
        let mut reservation = NetworkReservation::dynamic("cloud", "web/0");

        network.reserve(&mut reservation, None, &[String::from("dns")]).unwrap();
        let settings = reservation.settings().unwrap();
        assert_eq!(settings.network_type.as_deref(), Some("dynamic"));
        assert!(settings.ip.is_none());
        assert_eq!(settings.default, vec![String::from("dns")]);
    }

    #[test]
    fn test_vip_requires_address() {
        let registry = registry();
        let network = registry.get("public").unwrap();

        let mut reservation = NetworkReservation::vip("public", "web/0", Ipv4Addr::new(52, 0, 0, 1));
        network.reserve(&mut reservation, None, &[]).unwrap();
        assert_eq!(reservation.settings().unwrap().network_type.as_deref(), Some("vip"));

        let mut missing = NetworkReservation::dynamic("public", "web/1");
        assert!(network.reserve(&mut missing, None, &[]).is_err());
    }

    #[test]
    fn test_unknown_network() {
        assert!(registry().get("nope").is_err());
        assert_eq!(registry().len(), 3);
    }
}
