//! Availability zones.

use serde::{Deserialize, Serialize};

use crate::network::CloudProperties;

/// A named placement domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityZone {
    /// Zone name; the identity.
    pub name: String,
    /// Cloud-provider placement properties.
    #[serde(default)]
    pub cloud_properties: CloudProperties,
}

impl AvailabilityZone {
    /// Creates a zone without cloud properties.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cloud_properties: CloudProperties::new(),
        }
    }

    /// Sets the cloud properties.
    #[must_use]
    pub fn with_cloud_properties(mut self, cloud_properties: CloudProperties) -> Self {
        self.cloud_properties = cloud_properties;
        self
    }
}

impl std::fmt::Display for AvailabilityZone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}
