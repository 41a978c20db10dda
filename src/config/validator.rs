//! Manifest validation.
//!
//! Collects every problem in one pass so the operator sees them all at
//! once. Errors block planning, warnings do not.

use crate::error::{ConfigError, FleetError, Result};
use crate::network::{NetworkType, Subnet, parse_ip_list};
use std::collections::{BTreeMap, HashSet};
use std::net::Ipv4Addr;
use tracing::debug;

use super::deployment::build_subnet;
use super::spec::{DeploymentManifest, JobConfig, NetworkConfig};

/// Validator for deployment manifests.
#[derive(Debug, Default)]
pub struct ConfigValidator;

/// Validation result containing all problems found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ValidationResult {
    fn error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationError {
            field: field.into(),
            message: message.into(),
        });
    }
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates a manifest.
    ///
    /// # Errors
    ///
    /// Returns the first validation error if any were found.
    pub fn validate(&self, manifest: &DeploymentManifest) -> Result<ValidationResult> {
        let result = self.check(manifest);

        if result.errors.is_empty() {
            debug!("Manifest validation passed");
            Ok(result)
        } else {
            let first_error = &result.errors[0];
            Err(FleetError::Config(ConfigError::ValidationError {
                message: first_error.message.clone(),
                field: Some(first_error.field.clone()),
            }))
        }
    }

    /// Runs every check and returns all findings.
    #[must_use]
    pub fn check(&self, manifest: &DeploymentManifest) -> ValidationResult {
        let mut result = ValidationResult::default();

        if !is_valid_name(&manifest.name) {
            result.error(
                "name",
                format!(
                    "Deployment name '{}' is invalid. Must be lowercase alphanumeric with hyphens.",
                    manifest.name
                ),
            );
        }

        Self::validate_zones(manifest, &mut result);
        let static_pools = Self::validate_networks(manifest, &mut result);
        Self::validate_jobs(manifest, &static_pools, &mut result);

        result
    }

    fn validate_zones(manifest: &DeploymentManifest, result: &mut ValidationResult) {
        let mut seen = HashSet::new();
        for (i, zone) in manifest.availability_zones.iter().enumerate() {
            if zone.name.is_empty() {
                result.error(format!("availability_zones[{i}].name"), "Zone name cannot be empty");
            } else if !seen.insert(zone.name.as_str()) {
                result.error(
                    format!("availability_zones[{i}].name"),
                    format!("Duplicate zone name '{}'", zone.name),
                );
            }
        }
    }

    /// Validates networks and returns the built subnets of each manual network.
    fn validate_networks(manifest: &DeploymentManifest, result: &mut ValidationResult) -> BTreeMap<String, Vec<Subnet>> {
        let mut seen = HashSet::new();
        let mut pools = BTreeMap::new();

        for (i, network) in manifest.networks.iter().enumerate() {
            let field = format!("networks[{i}]");
            if !seen.insert(network.name.as_str()) {
                result.error(format!("{field}.name"), format!("Duplicate network name '{}'", network.name));
                continue;
            }

            match network.network_type {
                NetworkType::Manual => {
                    let subnets = Self::validate_subnets(manifest, network, &field, result);
                    pools.insert(network.name.clone(), subnets);
                }
                NetworkType::Dynamic | NetworkType::Vip => {
                    if !network.subnets.is_empty() {
                        result.warnings.push(format!(
                            "{field}: subnets are ignored on {} network '{}'",
                            network.network_type, network.name
                        ));
                    }
                }
            }
        }

        pools
    }

    fn validate_subnets(
        manifest: &DeploymentManifest,
        network: &NetworkConfig,
        field: &str,
        result: &mut ValidationResult,
    ) -> Vec<Subnet> {
        if network.subnets.is_empty() {
            result.error(
                format!("{field}.subnets"),
                format!("Manual network '{}' needs at least one subnet", network.name),
            );
        }

        let mut subnets: Vec<Subnet> = Vec::new();
        for (j, config) in network.subnets.iter().enumerate() {
            let field = format!("{field}.subnets[{j}]");

            if let Some(zone) = &config.az
                && !manifest.has_zone(zone)
            {
                result.error(format!("{field}.az"), format!("Unknown availability zone '{zone}'"));
            }

            match build_subnet(config) {
                Ok(subnet) => {
                    if let Some(other) = subnets.iter().find(|s| s.overlaps(&subnet)) {
                        result.error(
                            format!("{field}.range"),
                            format!("Subnet {} overlaps subnet {}", subnet.range(), other.range()),
                        );
                    }
                    if subnet.gateway().is_none() {
                        result.warnings.push(format!("{field}: subnet {} has no gateway", subnet.range()));
                    }
                    subnets.push(subnet);
                }
                Err(e) => result.error(field, e.to_string()),
            }
        }
        subnets
    }

    fn validate_jobs(
        manifest: &DeploymentManifest,
        static_pools: &BTreeMap<String, Vec<Subnet>>,
        result: &mut ValidationResult,
    ) {
        let mut seen = HashSet::new();
        let mut claimed: BTreeMap<(String, Ipv4Addr), String> = BTreeMap::new();

        for (i, job) in manifest.jobs.iter().enumerate() {
            let field = format!("jobs[{i}]");

            if job.name.is_empty() {
                result.error(format!("{field}.name"), "Job name cannot be empty");
            } else if !seen.insert(job.name.as_str()) {
                result.error(format!("{field}.name"), format!("Duplicate job name '{}'", job.name));
            } else if job.name.contains('/') {
                result.error(format!("{field}.name"), format!("Job name '{}' cannot contain '/'", job.name));
            } else if !is_valid_name(&job.name) {
                result
                    .warnings
                    .push(format!("{field}: job name '{}' is canonicalized in DNS records", job.name));
            }

            if job.instances == 0 {
                result.warnings.push(format!("{field}: job '{}' has no instances", job.name));
            }
            if job.persistent_disk == 0 && !job.persistent_disk_cloud_properties.is_empty() {
                result.warnings.push(format!(
                    "{field}: persistent_disk_cloud_properties are ignored without a persistent_disk"
                ));
            }

            let mut zones = HashSet::new();
            for zone in &job.azs {
                if !manifest.has_zone(zone) {
                    result.error(format!("{field}.azs"), format!("Unknown availability zone '{zone}'"));
                } else if !zones.insert(zone.as_str()) {
                    result.error(format!("{field}.azs"), format!("Zone '{zone}' listed twice"));
                }
            }

            Self::validate_job_networks(manifest, job, &field, static_pools, &mut claimed, result);
        }
    }

    fn validate_job_networks(
        manifest: &DeploymentManifest,
        job: &JobConfig,
        field: &str,
        static_pools: &BTreeMap<String, Vec<Subnet>>,
        claimed: &mut BTreeMap<(String, Ipv4Addr), String>,
        result: &mut ValidationResult,
    ) {
        if job.networks.is_empty() {
            result.warnings.push(format!("{field}: job '{}' has no networks", job.name));
        }

        for (k, attachment) in job.networks.iter().enumerate() {
            let field = format!("{field}.networks[{k}]");
            let Some(network) = manifest.network(&attachment.name) else {
                result.error(format!("{field}.name"), format!("Unknown network '{}'", attachment.name));
                continue;
            };

            let ips = match parse_ip_list(&attachment.static_ips) {
                Ok(ips) => ips,
                Err(e) => {
                    result.error(format!("{field}.static_ips"), e.to_string());
                    continue;
                }
            };

            if network.network_type == NetworkType::Vip && ips.len() != job.instances {
                result.error(
                    format!("{field}.static_ips"),
                    format!(
                        "Vip network '{}' needs {} static IPs, found {}",
                        network.name,
                        job.instances,
                        ips.len()
                    ),
                );
            } else if !ips.is_empty() && ips.len() != job.instances {
                result.error(
                    format!("{field}.static_ips"),
                    format!(
                        "Job '{}' has {} instances but {} static IPs on network '{}'",
                        job.name,
                        job.instances,
                        ips.len(),
                        network.name
                    ),
                );
            }

            if network.network_type == NetworkType::Dynamic && !ips.is_empty() {
                result.error(
                    format!("{field}.static_ips"),
                    format!("Dynamic network '{}' cannot have static IPs", network.name),
                );
            }

            for ip in ips {
                if let Some(subnets) = static_pools.get(&network.name)
                    && !subnets.iter().any(|s| s.is_static(ip))
                {
                    result.error(
                        format!("{field}.static_ips"),
                        format!("IP {ip} is not in a static range of network '{}'", network.name),
                    );
                }
                if let Some(owner) = claimed.insert((network.name.clone(), ip), job.name.clone()) {
                    result.error(
                        format!("{field}.static_ips"),
                        format!("IP {ip} on network '{}' is also claimed by job '{owner}'", network.name),
                    );
                }
            }
        }
    }
}

/// Names are lowercase alphanumeric with hyphens, starting with a letter.
fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();

    let Some(first) = chars.next() else {
        return false;
    };
    if !first.is_ascii_lowercase() {
        return false;
    }

    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !name.ends_with('-')
        && !name.contains("--")
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of errors.
    #[must_use]
    pub const fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Returns the number of warnings.
    #[must_use]
    pub const fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigParser;

    fn check(yaml: &str) -> ValidationResult {
        let manifest = ConfigParser::new().parse_yaml(yaml, None).unwrap();
        ConfigValidator::new().check(&manifest)
    }

    fn fields(result: &ValidationResult) -> Vec<&str> {
        result.errors.iter().map(|e| e.field.as_str()).collect()
    }

    const VALID: &str = r"
name: prod
availability_zones:
  - name: z1
networks:
  - name: default
    subnets:
      - range: 10.0.0.0/24
        gateway: 10.0.0.1
        static: [10.0.0.10 - 10.0.0.12]
        az: z1
jobs:
  - name: db
    instances: 2
    azs: [z1]
    networks:
      - name: default
        static_ips: [10.0.0.10, 10.0.0.11]
";

    #[test]
    fn test_valid_manifest() {
        let result = check(VALID);
        assert!(result.is_valid(), "{:?}", result.errors);
        assert_eq!(result.warning_count(), 0);
    }

    #[test]
    fn test_validate_returns_first_error() {
        let manifest = ConfigParser::new().parse_yaml("name: Prod\n", None).unwrap();
        let err = ConfigValidator::new().validate(&manifest).unwrap_err();
        assert!(matches!(err, FleetError::Config(ConfigError::ValidationError { .. })));
    }

    #[test]
    fn test_static_ip_count_must_match_instances() {
        let result = check(&VALID.replace("instances: 2", "instances: 3"));
        assert_eq!(fields(&result), vec!["jobs[0].networks[0].static_ips"]);
    }

    #[test]
    fn test_static_ip_outside_static_range() {
        let result = check(&VALID.replace("10.0.0.10, 10.0.0.11", "10.0.0.10, 10.0.0.50"));
        assert_eq!(result.error_count(), 1);
        assert!(result.errors[0].message.contains("10.0.0.50"));
    }

    #[test]
    fn test_unknown_zone_and_network() {
        let yaml = "name: prod\njobs:\n  - name: web\n    instances: 1\n    azs: [z9]\n    networks:\n      - name: nope\n";
        let result = check(yaml);
        assert_eq!(fields(&result), vec!["jobs[0].azs", "jobs[0].networks[0].name"]);
    }

    #[test]
    fn test_overlapping_subnets() {
        let yaml = r"
name: prod
networks:
  - name: default
    subnets:
      - range: 10.0.0.0/24
      - range: 10.0.0.128/25
";
        let result = check(yaml);
        assert_eq!(fields(&result), vec!["networks[0].subnets[1].range"]);
        assert_eq!(result.warning_count(), 2);
    }

    #[test]
    fn test_static_and_reserved_overlap() {
        let yaml = r"
name: prod
networks:
  - name: default
    subnets:
      - range: 10.0.0.0/24
        gateway: 10.0.0.1
        reserved: [10.0.0.5]
        static: [10.0.0.5]
";
        let result = check(yaml);
        assert_eq!(fields(&result), vec!["networks[0].subnets[0]"]);
    }

    #[test]
    fn test_duplicate_static_ip_across_jobs() {
        let yaml = format!(
            "{VALID}  - name: cache\n    instances: 1\n    networks:\n      - name: default\n        static_ips: [10.0.0.10]\n"
        );
        let result = check(&yaml);
        assert_eq!(result.error_count(), 1);
        assert!(result.errors[0].message.contains("also claimed by job 'db'"));
    }

    #[test]
    fn test_vip_needs_address_per_instance() {
        let yaml = r"
name: prod
networks:
  - name: public
    type: vip
jobs:
  - name: web
    instances: 1
    networks:
      - name: public
";
        let result = check(yaml);
        assert_eq!(fields(&result), vec!["jobs[0].networks[0].static_ips"]);
    }

    #[test]
    fn test_valid_name() {
        assert!(is_valid_name("prod"));
        assert!(is_valid_name("my-deploy-123"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("Prod"));
        assert!(!is_valid_name("123-prod"));
        assert!(!is_valid_name("prod_a"));
        assert!(!is_valid_name("prod-"));
        assert!(!is_valid_name("prod--a"));
    }
}
