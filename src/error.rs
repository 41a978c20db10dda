//! Error types for the fleet planner.
//!
//! This module provides the error hierarchy for every stage of a planning
//! run: manifest loading, address pool operations, state persistence and
//! plan construction.

use std::net::Ipv4Addr;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the fleet planner.
#[derive(Debug, Error)]
pub enum FleetError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Address pool and reservation errors.
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    /// State management errors.
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Planning errors.
    #[error("Planning error: {0}")]
    Plan(#[from] PlanError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The manifest file was not found.
    #[error("Manifest file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The manifest could not be parsed.
    #[error("Failed to parse manifest: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Manifest validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// A job references a network that is not declared.
    #[error("Job '{job}' references unknown network '{network}'")]
    UnknownNetwork {
        /// Job name.
        job: String,
        /// Network name.
        network: String,
    },

    /// A job or subnet references an availability zone that is not declared.
    #[error("Unknown availability zone '{zone}' referenced by {referrer}")]
    UnknownAvailabilityZone {
        /// Zone name.
        zone: String,
        /// Who referenced the zone.
        referrer: String,
    },
}

/// Address pool and reservation errors.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// Release of an address the pool never handed out.
    #[error("IP {ip} is not owned by network '{network}'")]
    IpNotOwned {
        /// Network name.
        network: String,
        /// Address being released.
        ip: Ipv4Addr,
    },

    /// Every subnet of the network is exhausted.
    #[error("Network '{network}' has no more available addresses")]
    NotEnoughCapacity {
        /// Network name.
        network: String,
    },

    /// Address does not belong to any subnet of the network.
    #[error("IP {ip} does not belong to any subnet of network '{network}'")]
    IpOutsideSubnet {
        /// Network name.
        network: String,
        /// Requested address.
        ip: Ipv4Addr,
    },

    /// Address is administratively restricted.
    #[error("IP {ip} is restricted in network '{network}'")]
    IpRestricted {
        /// Network name.
        network: String,
        /// Requested address.
        ip: Ipv4Addr,
    },

    /// Address is held by another owner.
    #[error("IP {ip} in network '{network}' is already in use by {owner}")]
    IpAlreadyInUse {
        /// Network name.
        network: String,
        /// Requested address.
        ip: Ipv4Addr,
        /// Current owner of the address.
        owner: String,
    },

    /// Static reservation for a dynamic address, or the reverse.
    #[error("IP {ip} in network '{network}' was requested as {requested} but belongs to the other pool")]
    StaticIpMismatch {
        /// Network name.
        network: String,
        /// Requested address.
        ip: Ipv4Addr,
        /// Requested reservation type.
        requested: String,
    },

    /// A reservation that needs an explicit address has none.
    #[error("Reservation on network '{network}' for {owner} has no IP")]
    ReservationIpMissing {
        /// Network name.
        network: String,
        /// Reservation owner.
        owner: String,
    },

    /// Network name not known to the registry.
    #[error("Unknown network '{network}'")]
    UnknownNetwork {
        /// Network name.
        network: String,
    },

    /// IP range or list entry that cannot be parsed or is inconsistent.
    #[error("Invalid IP range '{value}': {reason}")]
    InvalidRange {
        /// Offending value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// State management errors.
#[derive(Debug, Error)]
pub enum StateError {
    /// State is corrupted.
    #[error("State is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// State could not be written.
    #[error("Failed to write state: {message}")]
    WriteFailed {
        /// Description of the failure.
        message: String,
    },

    /// Serialization error.
    #[error("State serialization error: {message}")]
    SerializationError {
        /// Description of the serialization error.
        message: String,
    },

    /// State version mismatch.
    #[error("State version mismatch: expected {expected}, found {found}")]
    VersionMismatch {
        /// Expected state version.
        expected: String,
        /// Found state version.
        found: String,
    },
}

/// Planning errors.
#[derive(Debug, Error)]
pub enum PlanError {
    /// A job ran out of static IPs for its instances.
    #[error("Job '{job}' needs more static IPs on network '{network}' than declared")]
    StaticIpsExhausted {
        /// Job name.
        job: String,
        /// Network name.
        network: String,
    },
}

/// Result type alias for fleet planner operations.
pub type Result<T> = std::result::Result<T, FleetError>;

impl FleetError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if this error is a recoverable outcome the caller may retry.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Network(e) => e.is_capacity_exhausted(),
            _ => false,
        }
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Creates a parse error without a source location.
    #[must_use]
    pub fn parse(message: impl Into<String>) -> Self {
        Self::ParseError {
            message: message.into(),
            location: None,
        }
    }
}

impl NetworkError {
    /// Returns true if the pool simply ran out of addresses.
    #[must_use]
    pub const fn is_capacity_exhausted(&self) -> bool {
        matches!(self, Self::NotEnoughCapacity { .. })
    }

    /// Creates an invalid range error.
    #[must_use]
    pub fn invalid_range(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRange {
            value: value.into(),
            reason: reason.into(),
        }
    }
}

impl StateError {
    /// Creates a serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }

    /// Creates a write error with the given message.
    #[must_use]
    pub fn write_failed(message: impl Into<String>) -> Self {
        Self::WriteFailed {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_exhaustion_is_retryable() {
        let err = FleetError::from(NetworkError::NotEnoughCapacity {
            network: String::from("default"),
        });
        assert!(err.is_retryable());
    }

    #[test]
    fn test_double_release_is_not_retryable() {
        let err = FleetError::from(NetworkError::IpNotOwned {
            network: String::from("default"),
            ip: Ipv4Addr::new(10, 0, 0, 5),
        });
        assert!(!err.is_retryable());
        assert_eq!(
            err.to_string(),
            "Network error: IP 10.0.0.5 is not owned by network 'default'"
        );
    }
}
