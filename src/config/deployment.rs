//! Conversion of a manifest into runtime planning objects.

use ipnetwork::Ipv4Network;
use std::sync::Arc;
use tracing::debug;

use crate::error::{ConfigError, NetworkError, Result};
use crate::network::{
    DynamicNetwork, IpProvider, IpRepo, Network, NetworkRegistry, NetworkType, Subnet, VipNetwork, parse_ip_list,
};
use crate::placement::AvailabilityZone;
use crate::planner::{DiskSpec, Job, JobNetwork, PlanContext};

use super::spec::{DeploymentManifest, JobConfig, NetworkConfig, SubnetConfig};

/// A deployment ready for planning.
#[derive(Debug)]
pub struct Deployment {
    /// Deployment name.
    pub name: String,
    /// Declared zones.
    pub availability_zones: Vec<AvailabilityZone>,
    /// Networks by name.
    pub networks: NetworkRegistry,
    /// Jobs in manifest order.
    pub jobs: Vec<Arc<Job>>,
    /// Deployment-wide planning inputs.
    pub context: PlanContext,
}

impl Deployment {
    /// Builds runtime objects from a manifest.
    ///
    /// Every manual network gets its own pool backed by `repo`.
    ///
    /// # Errors
    ///
    /// Returns an error if a job or subnet references an undeclared zone or
    /// network, or an address declaration is malformed.
    pub fn from_manifest(manifest: &DeploymentManifest, repo: Arc<dyn IpRepo>) -> Result<Self> {
        let availability_zones: Vec<AvailabilityZone> = manifest
            .availability_zones
            .iter()
            .map(|z| AvailabilityZone::new(&z.name).with_cloud_properties(z.cloud_properties.clone()))
            .collect();

        let mut networks = NetworkRegistry::new();
        for network in &manifest.networks {
            networks.insert(build_network(manifest, network, Arc::clone(&repo))?);
        }

        let jobs = manifest
            .jobs
            .iter()
            .map(|job| build_job(manifest, &availability_zones, job).map(Arc::new))
            .collect::<Result<Vec<_>>>()?;

        debug!(
            "Built deployment '{}': {} zones, {} networks, {} jobs",
            manifest.name,
            availability_zones.len(),
            networks.len(),
            jobs.len()
        );

        Ok(Self {
            name: manifest.name.clone(),
            availability_zones,
            networks,
            jobs,
            context: PlanContext {
                deployment: manifest.name.clone(),
                recreate: manifest.recreate,
                root_domain: manifest.dns.root_domain.clone(),
            },
        })
    }

    /// Looks up a job.
    #[must_use]
    pub fn job(&self, name: &str) -> Option<&Arc<Job>> {
        self.jobs.iter().find(|job| job.name == name)
    }
}

/// Builds one subnet of a manual network.
///
/// # Errors
///
/// Returns an error if the range, gateway or address lists are invalid.
pub fn build_subnet(config: &SubnetConfig) -> Result<Subnet> {
    let range: Ipv4Network = config
        .range
        .parse()
        .map_err(|e| NetworkError::invalid_range(&config.range, format!("{e}")))?;

    let mut subnet = Subnet::new(range, config.gateway)?
        .with_dns(config.dns.clone())
        .with_cloud_properties(config.cloud_properties.clone())
        .with_reserved(parse_ip_list(&config.reserved)?)?
        .with_static(parse_ip_list(&config.static_ips)?)?;
    if let Some(zone) = &config.az {
        subnet = subnet.with_availability_zone(zone);
    }
    Ok(subnet)
}

fn build_network(manifest: &DeploymentManifest, config: &NetworkConfig, repo: Arc<dyn IpRepo>) -> Result<Network> {
    let network = match config.network_type {
        NetworkType::Manual => {
            let mut subnets = Vec::with_capacity(config.subnets.len());
            for subnet in &config.subnets {
                if let Some(zone) = &subnet.az
                    && !manifest.has_zone(zone)
                {
                    return Err(ConfigError::UnknownAvailabilityZone {
                        zone: zone.clone(),
                        referrer: format!("network '{}'", config.name),
                    }
                    .into());
                }
                subnets.push(build_subnet(subnet)?);
            }
            Network::Manual(Arc::new(IpProvider::new(&config.name, subnets, repo)))
        }
        NetworkType::Dynamic => Network::Dynamic(DynamicNetwork {
            name: config.name.clone(),
            dns: config.dns.clone(),
            cloud_properties: config.cloud_properties.clone(),
        }),
        NetworkType::Vip => Network::Vip(VipNetwork {
            name: config.name.clone(),
            cloud_properties: config.cloud_properties.clone(),
        }),
    };
    Ok(network)
}

fn build_job(manifest: &DeploymentManifest, zones: &[AvailabilityZone], config: &JobConfig) -> Result<Job> {
    let availability_zones = config
        .azs
        .iter()
        .map(|name| {
            zones.iter().find(|z| &z.name == name).cloned().ok_or_else(|| {
                ConfigError::UnknownAvailabilityZone {
                    zone: name.clone(),
                    referrer: format!("job '{}'", config.name),
                }
                .into()
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let single_network = config.networks.len() == 1;
    let mut networks = Vec::with_capacity(config.networks.len());
    for attachment in &config.networks {
        let network = manifest
            .network(&attachment.name)
            .ok_or_else(|| ConfigError::UnknownNetwork {
                job: config.name.clone(),
                network: attachment.name.clone(),
            })?;

        let default = if single_network && attachment.default.is_empty() {
            vec![String::from("dns"), String::from("gateway")]
        } else {
            attachment.default.clone()
        };

        networks.push(JobNetwork {
            name: attachment.name.clone(),
            network_type: network.network_type,
            static_ips: parse_ip_list(&attachment.static_ips)?,
            default,
        });
    }

    Ok(Job {
        name: config.name.clone(),
        deployment: manifest.name.clone(),
        instances: config.instances,
        availability_zones,
        networks,
        vm_type: config.vm_type.clone(),
        stemcell: config.stemcell.clone(),
        env: config.env.clone(),
        persistent_disk: DiskSpec {
            size: config.persistent_disk,
            cloud_properties: config.persistent_disk_cloud_properties.clone(),
        },
        state: config.state,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigParser;
    use crate::network::InMemoryIpRepo;
    use std::net::Ipv4Addr;

    const MANIFEST: &str = r"
name: prod
availability_zones:
  - name: z1
  - name: z2
networks:
  - name: default
    subnets:
      - range: 10.0.0.0/24
        gateway: 10.0.0.1
        reserved: [10.0.0.2 - 10.0.0.9]
        static: [10.0.0.10 - 10.0.0.19]
        az: z1
  - name: cloud
    type: dynamic
jobs:
  - name: web
    instances: 2
    azs: [z1, z2]
    networks:
      - name: default
  - name: db
    instances: 1
    azs: [z1]
    networks:
      - name: default
        static_ips: [10.0.0.10]
        default: [dns]
      - name: cloud
    persistent_disk: 1024
";

    fn deployment(yaml: &str) -> Result<Deployment> {
        let manifest = ConfigParser::new().parse_yaml(yaml, None)?;
        Deployment::from_manifest(&manifest, Arc::new(InMemoryIpRepo::new()))
    }

    #[test]
    fn test_builds_runtime_objects() {
        let deployment = deployment(MANIFEST).unwrap();
        assert_eq!(deployment.availability_zones.len(), 2);
        assert_eq!(deployment.networks.len(), 2);
        assert_eq!(deployment.context.deployment, "prod");

        let web = deployment.job("web").unwrap();
        assert_eq!(web.availability_zones().len(), 2);
        assert_eq!(web.network_defaults("default"), ["dns", "gateway"]);

        let db = deployment.job("db").unwrap();
        assert_eq!(db.persistent_disk.size, 1024);
        assert_eq!(db.network("default").unwrap().static_ips, vec![Ipv4Addr::new(10, 0, 0, 10)]);
        assert_eq!(db.network("cloud").unwrap().network_type, NetworkType::Dynamic);
        assert!(db.network_defaults("cloud").is_empty());
    }

    #[test]
    fn test_unknown_zone_is_rejected() {
        let yaml = "name: prod\njobs:\n  - name: web\n    instances: 1\n    azs: [z9]\n";
        let err = deployment(yaml).unwrap_err();
        assert!(err.to_string().contains("z9"));
    }

    #[test]
    fn test_unknown_network_is_rejected() {
        let yaml = "name: prod\njobs:\n  - name: web\n    instances: 1\n    networks:\n      - name: nope\n";
        assert!(deployment(yaml).is_err());
    }

    #[test]
    fn test_bad_subnet_range() {
        let yaml = "name: prod\nnetworks:\n  - name: n\n    subnets:\n      - range: 10.0.0.0/33\n";
        assert!(deployment(yaml).is_err());
    }
}
