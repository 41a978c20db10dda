//! DNS record naming and the record store seam.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Lookup of published DNS records.
#[cfg_attr(test, mockall::automock)]
pub trait DnsRecordStore {
    /// Returns true if a record `name` pointing at `content` exists.
    fn has_record(&self, name: &str, content: &str) -> bool;
}

/// A published A record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DnsRecord {
    /// Fully qualified name.
    pub name: String,
    /// Address the name points at.
    pub content: String,
}

/// Record store backed by a set of records.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDnsRecords {
    records: BTreeSet<DnsRecord>,
}

impl InMemoryDnsRecords {
    /// Creates a store holding `records`.
    #[must_use]
    pub fn new(records: impl IntoIterator<Item = DnsRecord>) -> Self {
        Self {
            records: records.into_iter().collect(),
        }
    }

    /// Number of records held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl DnsRecordStore for InMemoryDnsRecords {
    fn has_record(&self, name: &str, content: &str) -> bool {
        self.records.contains(&DnsRecord {
            name: name.to_string(),
            content: content.to_string(),
        })
    }
}

/// Lowercases a name component and replaces underscores with dashes.
#[must_use]
pub fn canonical(name: &str) -> String {
    name.to_lowercase().replace('_', "-")
}

/// Builds `<host>.<job>.<network>.<deployment>.<root_domain>`.
#[must_use]
pub fn record_name(host: &str, job: &str, network: &str, deployment: &str, root_domain: &str) -> String {
    format!(
        "{}.{}.{}.{}.{}",
        canonical(host),
        canonical(job),
        canonical(network),
        canonical(deployment),
        root_domain
    )
}
