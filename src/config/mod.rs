//! Deployment manifest handling.
//!
//! - Parsing the YAML manifest and applying environment overrides
//! - Validating references and address declarations
//! - Hashing the manifest for change detection
//! - Building the runtime [`Deployment`] the planner works on

mod deployment;
mod hash;
mod parser;
mod spec;
mod validator;

pub use deployment::{Deployment, build_subnet};
pub use hash::SpecHasher;
pub use parser::{ConfigParser, DEFAULT_CONFIG_FILES, find_config_file};
pub use spec::{
    AvailabilityZoneConfig, DeploymentManifest, DnsConfig, JobConfig, JobNetworkConfig, NetworkConfig, SubnetConfig,
};
pub use validator::{ConfigValidator, ValidationError, ValidationResult};
