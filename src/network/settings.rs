//! Network settings handed to an instance for one attached network.

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// Opaque cloud-provider properties attached to zones, subnets and VM types.
pub type CloudProperties = serde_json::Map<String, serde_json::Value>;

/// Resolved settings for one network attachment.
///
/// Manual networks carry address, netmask and gateway. Dynamic networks only
/// carry their type, DNS and cloud properties. VIP networks carry the address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSettings {
    /// `dynamic` or `vip`; absent for manual networks.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub network_type: Option<String>,
    /// Assigned address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<Ipv4Addr>,
    /// Subnet mask.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub netmask: Option<Ipv4Addr>,
    /// Subnet gateway.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<Ipv4Addr>,
    /// DNS servers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dns: Vec<Ipv4Addr>,
    /// Subnet cloud properties.
    #[serde(default)]
    pub cloud_properties: CloudProperties,
    /// Which defaults (`dns`, `gateway`) this network provides.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub default: Vec<String>,
}

impl std::fmt::Display for NetworkSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = self.network_type.as_deref().unwrap_or("manual");
        match self.ip {
            Some(ip) => write!(f, "{kind} {ip}"),
            None => write!(f, "{kind}"),
        }
    }
}
