//! A single CIDR subnet of a manual network.

use ipnetwork::Ipv4Network;
use std::collections::BTreeSet;
use std::net::Ipv4Addr;

use crate::error::NetworkError;

use super::settings::CloudProperties;

/// One subnet of a manual network.
///
/// The network address, broadcast address and gateway are always treated as
/// restricted. Static addresses are never handed out by dynamic allocation but
/// can be reserved explicitly.
#[derive(Debug, Clone)]
pub struct Subnet {
    /// CIDR range.
    range: Ipv4Network,
    /// Gateway address.
    gateway: Option<Ipv4Addr>,
    /// DNS servers.
    dns: Vec<Ipv4Addr>,
    /// Addresses reserved for explicit static requests.
    static_ips: BTreeSet<Ipv4Addr>,
    /// Addresses that are never allocated nor reservable.
    restricted: BTreeSet<Ipv4Addr>,
    /// Cloud properties.
    cloud_properties: CloudProperties,
    /// Zone the subnet lives in, if pinned.
    availability_zone: Option<String>,
}

impl Subnet {
    /// Creates a subnet over `range`.
    ///
    /// # Errors
    ///
    /// Returns an error if the gateway lies outside the range.
    pub fn new(range: Ipv4Network, gateway: Option<Ipv4Addr>) -> Result<Self, NetworkError> {
        let mut restricted = BTreeSet::new();
        restricted.insert(range.network());
        restricted.insert(range.broadcast());

        if let Some(gw) = gateway {
            if !range.contains(gw) {
                return Err(NetworkError::invalid_range(
                    range.to_string(),
                    format!("gateway {gw} is outside the subnet"),
                ));
            }
            restricted.insert(gw);
        }

        Ok(Self {
            range,
            gateway,
            dns: Vec::new(),
            static_ips: BTreeSet::new(),
            restricted,
            cloud_properties: CloudProperties::new(),
            availability_zone: None,
        })
    }

    /// Sets the DNS servers.
    #[must_use]
    pub fn with_dns(mut self, dns: Vec<Ipv4Addr>) -> Self {
        self.dns = dns;
        self
    }

    /// Sets the cloud properties.
    #[must_use]
    pub fn with_cloud_properties(mut self, cloud_properties: CloudProperties) -> Self {
        self.cloud_properties = cloud_properties;
        self
    }

    /// Pins the subnet to an availability zone.
    #[must_use]
    pub fn with_availability_zone(mut self, zone: impl Into<String>) -> Self {
        self.availability_zone = Some(zone.into());
        self
    }

    /// Adds administratively restricted addresses.
    ///
    /// # Errors
    ///
    /// Returns an error if an address is outside the range or already static.
    pub fn with_reserved(
        mut self,
        ips: impl IntoIterator<Item = Ipv4Addr>,
    ) -> Result<Self, NetworkError> {
        for ip in ips {
            self.check_in_range(ip, "reserved")?;
            if self.static_ips.contains(&ip) {
                return Err(NetworkError::invalid_range(
                    ip.to_string(),
                    "address is both static and reserved",
                ));
            }
            self.restricted.insert(ip);
        }
        Ok(self)
    }

    /// Adds static addresses.
    ///
    /// # Errors
    ///
    /// Returns an error if an address is outside the range or restricted.
    pub fn with_static(
        mut self,
        ips: impl IntoIterator<Item = Ipv4Addr>,
    ) -> Result<Self, NetworkError> {
        for ip in ips {
            self.check_in_range(ip, "static")?;
            if self.restricted.contains(&ip) {
                return Err(NetworkError::invalid_range(
                    ip.to_string(),
                    "static address is restricted",
                ));
            }
            self.static_ips.insert(ip);
        }
        Ok(self)
    }

    fn check_in_range(&self, ip: Ipv4Addr, what: &str) -> Result<(), NetworkError> {
        if self.range.contains(ip) {
            Ok(())
        } else {
            Err(NetworkError::invalid_range(
                ip.to_string(),
                format!("{what} address is outside subnet {}", self.range),
            ))
        }
    }

    /// Returns the CIDR range.
    #[must_use]
    pub const fn range(&self) -> Ipv4Network {
        self.range
    }

    /// Returns the gateway.
    #[must_use]
    pub const fn gateway(&self) -> Option<Ipv4Addr> {
        self.gateway
    }

    /// Returns the DNS servers.
    #[must_use]
    pub fn dns(&self) -> &[Ipv4Addr] {
        &self.dns
    }

    /// Returns the netmask.
    #[must_use]
    pub fn netmask(&self) -> Ipv4Addr {
        self.range.mask()
    }

    /// Returns the cloud properties.
    #[must_use]
    pub const fn cloud_properties(&self) -> &CloudProperties {
        &self.cloud_properties
    }

    /// Returns the zone the subnet is pinned to.
    #[must_use]
    pub fn availability_zone(&self) -> Option<&str> {
        self.availability_zone.as_deref()
    }

    /// Returns the static addresses.
    #[must_use]
    pub const fn static_ips(&self) -> &BTreeSet<Ipv4Addr> {
        &self.static_ips
    }

    /// Returns true if the address lies within the range.
    #[must_use]
    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        self.range.contains(ip)
    }

    /// Returns true if the address can never be handed out.
    #[must_use]
    pub fn is_restricted(&self, ip: Ipv4Addr) -> bool {
        self.restricted.contains(&ip)
    }

    /// Returns true if the address belongs to the static sub-range.
    #[must_use]
    pub fn is_static(&self, ip: Ipv4Addr) -> bool {
        self.static_ips.contains(&ip)
    }

    /// Returns true if this subnet may serve an instance in `zone`.
    ///
    /// Subnets without a zone serve every instance.
    #[must_use]
    pub fn serves(&self, zone: Option<&str>) -> bool {
        match (zone, self.availability_zone.as_deref()) {
            (Some(wanted), Some(own)) => wanted == own,
            _ => true,
        }
    }

    /// Addresses eligible for dynamic allocation, in ascending order.
    pub fn dynamic_ips(&self) -> impl Iterator<Item = Ipv4Addr> + '_ {
        let first = u32::from(self.range.network());
        let last = u32::from(self.range.broadcast());
        (first..=last)
            .map(Ipv4Addr::from)
            .filter(|ip| !self.is_restricted(*ip) && !self.is_static(*ip))
    }

    /// Returns true if the two subnets share any address.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.range.contains(other.range.network()) || other.range.contains(self.range.network())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subnet() -> Subnet {
        Subnet::new("10.0.0.0/29".parse().unwrap(), Some(Ipv4Addr::new(10, 0, 0, 1))).unwrap()
    }

    #[test]
    fn test_network_broadcast_and_gateway_are_restricted() {
        let subnet = subnet();
        assert!(subnet.is_restricted(Ipv4Addr::new(10, 0, 0, 0)));
        assert!(subnet.is_restricted(Ipv4Addr::new(10, 0, 0, 1)));
        assert!(subnet.is_restricted(Ipv4Addr::new(10, 0, 0, 7)));
        assert!(!subnet.is_restricted(Ipv4Addr::new(10, 0, 0, 2)));
    }

    #[test]
    fn test_dynamic_ips_skip_static_and_reserved() {
        let subnet = subnet()
            .with_static([Ipv4Addr::new(10, 0, 0, 3)])
            .unwrap()
            .with_reserved([Ipv4Addr::new(10, 0, 0, 5)])
            .unwrap();

        let ips: Vec<_> = subnet.dynamic_ips().collect();
        assert_eq!(
            ips,
            vec![
                Ipv4Addr::new(10, 0, 0, 2),
                Ipv4Addr::new(10, 0, 0, 4),
                Ipv4Addr::new(10, 0, 0, 6),
            ]
        );
    }

    #[test]
    fn test_static_outside_range_rejected() {
        let result = subnet().with_static([Ipv4Addr::new(10, 0, 1, 3)]);
        assert!(result.is_err());
    }

    #[test]
    fn test_static_and_reserved_must_be_disjoint() {
        let result = subnet()
            .with_reserved([Ipv4Addr::new(10, 0, 0, 3)])
            .unwrap()
            .with_static([Ipv4Addr::new(10, 0, 0, 3)]);
        assert!(result.is_err());
    }

    #[test]
    fn test_gateway_outside_range_rejected() {
        let result = Subnet::new("10.0.0.0/29".parse().unwrap(), Some(Ipv4Addr::new(10, 0, 1, 1)));
        assert!(result.is_err());
    }

    #[test]
    fn test_serves_zone() {
        let pinned = subnet().with_availability_zone("z1");
        assert!(pinned.serves(Some("z1")));
        assert!(!pinned.serves(Some("z2")));
        assert!(pinned.serves(None));
        assert!(subnet().serves(Some("z2")));
    }

    #[test]
    fn test_overlap() {
        let a = subnet();
        let b = Subnet::new("10.0.0.4/30".parse().unwrap(), None).unwrap();
        let c = Subnet::new("10.0.1.0/30".parse().unwrap(), None).unwrap();
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
    }
}
