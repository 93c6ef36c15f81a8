//! Persistent device registry keyed by hardware address
//!
//! The registry is loaded from a JSON snapshot at startup, mutated only by
//! [`DeviceRegistry::merge`] during a scan, and written back with an explicit
//! [`DeviceRegistry::save`]. Records are never evicted: a device keeps its
//! hostname (and last known address) even after it stops answering.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::device::{DeviceRecord, HardwareAddress, RawObservation};
use crate::hostname;
use crate::hosts;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Whether a merge created a record or refreshed an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Created,
    Updated,
}

/// In-memory mapping hardware address -> device record
#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    devices: BTreeMap<HardwareAddress, DeviceRecord>,
}

impl DeviceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from snapshot records; later duplicates win
    pub fn from_records(records: impl IntoIterator<Item = DeviceRecord>) -> Self {
        let devices = records
            .into_iter()
            .map(|record| (record.mac.clone(), record))
            .collect();
        Self { devices }
    }

    /// Load a snapshot file
    pub fn from_file(path: &Path) -> Result<Self, RegistryError> {
        let content = std::fs::read_to_string(path)?;
        let records: Vec<DeviceRecord> = serde_json::from_str(&content)?;
        Ok(Self::from_records(records))
    }

    /// Load a snapshot, starting empty when it is absent or unreadable
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            debug!(path = %path.display(), "No device cache, starting empty");
            return Self::new();
        }
        match Self::from_file(path) {
            Ok(registry) => {
                info!(path = %path.display(), devices = registry.len(), "Loaded cached devices");
                registry
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Could not load device cache");
                Self::new()
            }
        }
    }

    /// Write the snapshot as a pretty-printed JSON array
    pub fn save(&self, path: &Path) -> Result<(), RegistryError> {
        let records: Vec<&DeviceRecord> = self.devices.values().collect();
        let content = serde_json::to_string_pretty(&records)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        hosts::write_atomically(path, &content)?;
        Ok(())
    }

    /// Fold one observation into the registry.
    ///
    /// Unknown addresses get a new record with a derived hostname; known
    /// addresses keep their hostname and only refresh address and timestamp.
    pub fn merge(
        &mut self,
        observation: &RawObservation,
        now: DateTime<Utc>,
    ) -> (MergeOutcome, &DeviceRecord) {
        use std::collections::btree_map::Entry;

        match self.devices.entry(observation.mac.clone()) {
            Entry::Occupied(entry) => {
                let record = entry.into_mut();
                record.touch(observation.ip, now);
                (MergeOutcome::Updated, record)
            }
            Entry::Vacant(entry) => {
                let name = hostname::derive(&observation.hostname, &observation.mac);
                let record = entry.insert(DeviceRecord::new(
                    name,
                    observation.mac.clone(),
                    observation.ip,
                    now,
                ));
                (MergeOutcome::Created, record)
            }
        }
    }

    pub fn get(&self, mac: &HardwareAddress) -> Option<&DeviceRecord> {
        self.devices.get(mac)
    }

    /// Records ordered by hardware address
    pub fn records(&self) -> impl Iterator<Item = &DeviceRecord> {
        self.devices.values()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};
    use tempfile::TempDir;

    fn observation(hostname: &str, ip: [u8; 4], mac: &str) -> RawObservation {
        RawObservation {
            hostname: hostname.to_string(),
            ip: Ipv4Addr::from(ip),
            mac: HardwareAddress::parse(mac).unwrap(),
        }
    }

    #[test]
    fn test_merge_creates_record() {
        let mut registry = DeviceRegistry::new();
        let now = Utc::now();
        let obs = observation("imac-kevin.local", [192, 168, 1, 42], "a4:83:e7:11:22:33");

        let (outcome, record) = registry.merge(&obs, now);
        assert_eq!(outcome, MergeOutcome::Created);
        assert_eq!(record.hostname, "imac-kevin");
        assert_eq!(record.ip, Some(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 42))));
        assert_eq!(record.last_seen, Some(now));
    }

    #[test]
    fn test_merge_is_idempotent_per_address() {
        let mut registry = DeviceRegistry::new();
        let now = Utc::now();
        let obs = observation("imac-kevin.local", [192, 168, 1, 42], "a4:83:e7:11:22:33");

        registry.merge(&obs, now);
        let (outcome, _) = registry.merge(&obs, now);
        assert_eq!(outcome, MergeOutcome::Updated);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_hostname_is_never_regenerated() {
        let mut registry = DeviceRegistry::new();
        let first = Utc::now();
        let later = first + chrono::Duration::minutes(2);

        registry.merge(
            &observation("imac-kevin.local", [192, 168, 1, 42], "a4:83:e7:11:22:33"),
            first,
        );
        let (_, record) = registry.merge(
            &observation("renamed-host", [192, 168, 1, 77], "A4:83:E7:11:22:33"),
            later,
        );

        assert_eq!(record.hostname, "imac-kevin");
        assert_eq!(record.ip, Some(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 77))));
        assert_eq!(record.last_seen, Some(later));
    }

    #[test]
    fn test_snapshot_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cache").join("known-devices.json");

        let mut registry = DeviceRegistry::new();
        let now = Utc::now();
        registry.merge(&observation("imac-kevin.local", [192, 168, 1, 42], "a4:83:e7:11:22:33"), now);
        registry.merge(&observation("?", [192, 168, 1, 43], "00:1b:63:00:00:01"), now);
        registry.save(&path).unwrap();

        let reloaded = DeviceRegistry::load_or_default(&path);
        assert_eq!(reloaded.len(), registry.len());
        for record in registry.records() {
            let other = reloaded.get(&record.mac).unwrap();
            assert_eq!(other.hostname, record.hostname);
        }
    }

    #[test]
    fn test_save_replaces_snapshot_whole() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("known-devices.json");
        std::fs::write(&path, "[ truncated").unwrap();
        std::fs::write(temp_dir.path().join("known-devices.json.lanhosts-new"), "stale").unwrap();

        let mut registry = DeviceRegistry::new();
        registry.merge(
            &observation("imac-kevin.local", [192, 168, 1, 42], "a4:83:e7:11:22:33"),
            Utc::now(),
        );
        registry.save(&path).unwrap();

        assert_eq!(DeviceRegistry::from_file(&path).unwrap().len(), 1);
        let names: Vec<_> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("known-devices.json")]);
    }

    #[test]
    fn test_missing_snapshot_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let registry = DeviceRegistry::load_or_default(&temp_dir.path().join("absent.json"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_corrupt_snapshot_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("known-devices.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(DeviceRegistry::from_file(&path).is_err());
        assert!(DeviceRegistry::load_or_default(&path).is_empty());
    }

    #[test]
    fn test_snapshot_accepts_legacy_shape() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("known-devices.json");
        std::fs::write(
            &path,
            r#"[
              {"hostname": "macbook-air", "mac": "A4:83:E7:00:00:01", "ip": "192.168.1.20", "lastSeen": "2026-01-10T12:00:00.000Z"},
              {"hostname": "mac-1a2b3c", "mac": "00:1b:63:00:00:02"}
            ]"#,
        )
        .unwrap();

        let registry = DeviceRegistry::from_file(&path).unwrap();
        assert_eq!(registry.len(), 2);
        let mac = HardwareAddress::parse("a4:83:e7:00:00:01").unwrap();
        assert_eq!(registry.get(&mac).unwrap().hostname, "macbook-air");
    }
}
