//! Persistence seam for IP reservations.
//!
//! Reservations are keyed by `(network, ip)`, so two networks never collide
//! even when they hand out the same numeric address.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;
use std::sync::{Mutex, PoisonError};

use crate::error::Result;

/// A persisted address reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpAddressRecord {
    /// Network name.
    pub network: String,
    /// Reserved address.
    pub ip: Ipv4Addr,
    /// Identifier of the holder.
    pub owner: String,
    /// Whether the address came from the static sub-range.
    #[serde(rename = "static")]
    pub is_static: bool,
    /// When the reservation was made.
    pub created_at: DateTime<Utc>,
}

impl IpAddressRecord {
    /// Creates a record stamped with the current time.
    #[must_use]
    pub fn new(network: impl Into<String>, ip: Ipv4Addr, owner: impl Into<String>, is_static: bool) -> Self {
        Self {
            network: network.into(),
            ip,
            owner: owner.into(),
            is_static,
            created_at: Utc::now(),
        }
    }
}

/// Outcome of an insert-if-absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The record was stored.
    Inserted,
    /// The key was already held; carries the current holder.
    Taken(IpAddressRecord),
}

/// Key-value store of reservations with atomic insert-if-absent.
pub trait IpRepo: Send + Sync + std::fmt::Debug {
    /// Stores the record unless its `(network, ip)` key is already held.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    fn insert_if_absent(&self, record: IpAddressRecord) -> Result<InsertOutcome>;

    /// Removes the record for `(network, ip)`, returning it if it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    fn remove(&self, network: &str, ip: Ipv4Addr) -> Result<Option<IpAddressRecord>>;

    /// Looks up the record for `(network, ip)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    fn find(&self, network: &str, ip: Ipv4Addr) -> Result<Option<IpAddressRecord>>;

    /// Returns every reserved address of `network`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    fn reserved_ips(&self, network: &str) -> Result<BTreeSet<Ipv4Addr>>;
}

/// In-process repository, seeded from and exported to the state file.
#[derive(Debug, Default)]
pub struct InMemoryIpRepo {
    records: Mutex<BTreeMap<(String, Ipv4Addr), IpAddressRecord>>,
}

impl InMemoryIpRepo {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a repository holding the given records.
    ///
    /// Later duplicates of the same key are ignored.
    #[must_use]
    pub fn from_records(records: impl IntoIterator<Item = IpAddressRecord>) -> Self {
        let mut map = BTreeMap::new();
        for record in records {
            map.entry((record.network.clone(), record.ip)).or_insert(record);
        }
        Self {
            records: Mutex::new(map),
        }
    }

    /// Returns every record, ordered by network then address.
    #[must_use]
    pub fn records(&self) -> Vec<IpAddressRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }
}

impl IpRepo for InMemoryIpRepo {
    fn insert_if_absent(&self, record: IpAddressRecord) -> Result<InsertOutcome> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let key = (record.network.clone(), record.ip);
        if let Some(existing) = records.get(&key) {
            return Ok(InsertOutcome::Taken(existing.clone()));
        }
        records.insert(key, record);
        Ok(InsertOutcome::Inserted)
    }

    fn remove(&self, network: &str, ip: Ipv4Addr) -> Result<Option<IpAddressRecord>> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(records.remove(&(network.to_string(), ip)))
    }

    fn find(&self, network: &str, ip: Ipv4Addr) -> Result<Option<IpAddressRecord>> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(records.get(&(network.to_string(), ip)).cloned())
    }

    fn reserved_ips(&self, network: &str) -> Result<BTreeSet<Ipv4Addr>> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(records
            .keys()
            .filter(|(net, _)| net == network)
            .map(|(_, ip)| *ip)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_ip_on_different_networks_does_not_collide() {
        let repo = InMemoryIpRepo::new();
        let ip = Ipv4Addr::new(10, 0, 0, 2);

        let first = repo.insert_if_absent(IpAddressRecord::new("a", ip, "web/0", false)).unwrap();
        let second = repo.insert_if_absent(IpAddressRecord::new("b", ip, "web/1", false)).unwrap();

        assert_eq!(first, InsertOutcome::Inserted);
        assert_eq!(second, InsertOutcome::Inserted);
        assert_eq!(repo.records().len(), 2);
    }

    #[test]
    fn test_insert_reports_holder_when_taken() {
        let repo = InMemoryIpRepo::new();
        let ip = Ipv4Addr::new(10, 0, 0, 2);
        repo.insert_if_absent(IpAddressRecord::new("a", ip, "web/0", false)).unwrap();

        match repo.insert_if_absent(IpAddressRecord::new("a", ip, "web/1", false)).unwrap() {
            InsertOutcome::Taken(holder) => assert_eq!(holder.owner, "web/0"),
            InsertOutcome::Inserted => panic!("duplicate insert must not succeed"),
        }
    }

    #[test]
    fn test_remove_and_reserved_ips() {
        let repo = InMemoryIpRepo::from_records([
            IpAddressRecord::new("a", Ipv4Addr::new(10, 0, 0, 2), "web/0", false),
            IpAddressRecord::new("a", Ipv4Addr::new(10, 0, 0, 3), "web/1", true),
            IpAddressRecord::new("b", Ipv4Addr::new(10, 0, 0, 4), "db/0", false),
        ]);

        assert_eq!(repo.reserved_ips("a").unwrap().len(), 2);
        assert!(repo.remove("a", Ipv4Addr::new(10, 0, 0, 2)).unwrap().is_some());
        assert!(repo.remove("a", Ipv4Addr::new(10, 0, 0, 2)).unwrap().is_none());
        assert!(repo.find("b", Ipv4Addr::new(10, 0, 0, 4)).unwrap().is_some());
    }
}
