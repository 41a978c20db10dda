//! Manifest parser.
//!
//! Loads the manifest from YAML and applies `FLEET_*` environment
//! overrides on top of it.

use crate::error::{ConfigError, FleetError, Result};
use std::path::Path;
use tracing::{debug, info};

use super::spec::DeploymentManifest;

/// Parser for deployment manifests.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for resolving `.env`.
    base_path: Option<std::path::PathBuf>,
}

impl ConfigParser {
    /// Creates a new parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the directory `.env` is loaded from.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads a manifest from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<DeploymentManifest> {
        let path = path.as_ref();
        info!("Loading manifest from: {}", path.display());

        if !path.exists() {
            return Err(FleetError::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            FleetError::Config(ConfigError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        self.parse_yaml(&content, Some(path))
    }

    /// Parses a manifest from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<DeploymentManifest> {
        debug!("Parsing YAML manifest");

        let manifest: DeploymentManifest = serde_yaml::from_str(content).map_err(|e| {
            FleetError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location: source.map(|p| p.display().to_string()),
            })
        })?;

        debug!(
            "Parsed deployment '{}': {} jobs, {} networks",
            manifest.name,
            manifest.jobs.len(),
            manifest.networks.len()
        );
        Ok(manifest)
    }

    /// Loads a manifest and applies environment overrides.
    ///
    /// Recognized variables are `FLEET_DEPLOYMENT_NAME`, `FLEET_RECREATE`
    /// and `FLEET_ROOT_DOMAIN`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or
    /// `FLEET_RECREATE` is not a boolean.
    pub fn load_with_env(&self, path: impl AsRef<Path>) -> Result<DeploymentManifest> {
        let mut manifest = self.load_file(path)?;
        Self::apply_env_overrides(&mut manifest)?;
        Ok(manifest)
    }

    fn apply_env_overrides(manifest: &mut DeploymentManifest) -> Result<()> {
        if let Ok(name) = std::env::var("FLEET_DEPLOYMENT_NAME") {
            debug!("Overriding name from environment");
            manifest.name = name;
        }

        if let Ok(recreate) = std::env::var("FLEET_RECREATE") {
            debug!("Overriding recreate from environment");
            manifest.recreate = parse_bool(&recreate).ok_or_else(|| {
                ConfigError::validation(format!("'{recreate}' is not a boolean"), "FLEET_RECREATE")
            })?;
        }

        if let Ok(domain) = std::env::var("FLEET_ROOT_DOMAIN") {
            debug!("Overriding dns.root_domain from environment");
            manifest.dns.root_domain = domain;
        }

        Ok(())
    }

    /// Loads the `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the `.env` file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| std::path::PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                FleetError::Config(ConfigError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

/// Default manifest file names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &["fleet.yaml", "fleet.yml", "deployment.yaml", "deployment.yml"];

/// Finds the manifest in `start_dir` or one of its parents.
///
/// # Errors
///
/// Returns an error if no manifest is found.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<std::path::PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        for filename in DEFAULT_CONFIG_FILES {
            let config_path = current.join(filename);
            if config_path.exists() {
                info!("Found manifest: {}", config_path.display());
                return Ok(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    Err(FleetError::Config(ConfigError::FileNotFound {
        path: start.join(DEFAULT_CONFIG_FILES[0]),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::NetworkType;
    use crate::planner::InstanceState;

    #[test]
    fn test_parse_minimal_manifest() {
        let yaml = r"
name: prod
jobs:
  - name: web
    instances: 2
";
        let manifest = ConfigParser::new().parse_yaml(yaml, None).unwrap();
        assert_eq!(manifest.name, "prod");
        assert!(!manifest.recreate);
        assert_eq!(manifest.dns.root_domain, "fleet");
        assert_eq!(manifest.jobs[0].state, InstanceState::Started);
        assert_eq!(manifest.jobs[0].persistent_disk, 0);
    }

    #[test]
    fn test_parse_full_manifest() {
        let yaml = r#"
name: prod
recreate: true
dns:
  root_domain: internal
availability_zones:
  - name: z1
    cloud_properties:
      zone: us-east-1a
  - name: z2
networks:
  - name: default
    subnets:
      - range: 10.0.0.0/24
        gateway: 10.0.0.1
        dns: [10.0.0.2]
        reserved: ["10.0.0.2 - 10.0.0.9"]
        static: ["10.0.0.10 - 10.0.0.20"]
        az: z1
  - name: public
    type: vip
jobs:
  - name: db
    instances: 1
    azs: [z1]
    networks:
      - name: default
        static_ips: [10.0.0.10]
        default: [dns, gateway]
      - name: public
        static_ips: [52.0.0.1]
    vm_type:
      name: large
      cloud_properties:
        instance_type: m5.large
    stemcell:
      name: ubuntu-jammy
      version: "1.200"
    persistent_disk: 10240
    state: stopped
"#;
        let manifest = ConfigParser::new().parse_yaml(yaml, None).unwrap();
        assert!(manifest.recreate);
        assert_eq!(manifest.availability_zones.len(), 2);
        assert_eq!(manifest.networks[0].network_type, NetworkType::Manual);
        assert_eq!(manifest.networks[1].network_type, NetworkType::Vip);
        assert_eq!(manifest.networks[0].subnets[0].static_ips, vec!["10.0.0.10 - 10.0.0.20"]);

        let job = &manifest.jobs[0];
        assert_eq!(job.state, InstanceState::Stopped);
        assert_eq!(job.stemcell.version, "1.200");
        assert_eq!(job.networks[0].default, vec!["dns", "gateway"]);
    }

    #[test]
    fn test_invalid_yaml_is_parse_error() {
        let err = ConfigParser::new().parse_yaml("name: [", None).unwrap_err();
        assert!(matches!(err, FleetError::Config(ConfigError::ParseError { .. })));
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("no"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn test_find_config_file_in_parent() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join("fleet.yml"), "name: prod\n").unwrap();

        let found = find_config_file(&nested).unwrap();
        assert_eq!(found, dir.path().join("fleet.yml"));
    }
}
