//! Device types for tracking discovered hardware

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

/// Canonical hardware address: six lower-case hex octets separated by colons
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HardwareAddress(String);

impl HardwareAddress {
    /// Parse a colon-separated hardware address, normalizing it to lower case.
    ///
    /// Exactly six groups of two hex digits are accepted.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let groups: Vec<&str> = s.split(':').collect();
        if groups.len() != 6 {
            return None;
        }
        if !groups
            .iter()
            .all(|g| g.len() == 2 && g.chars().all(|c| c.is_ascii_hexdigit()))
        {
            return None;
        }
        Some(Self(s.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First three octets, e.g. `a4:83:e7`
    pub fn prefix(&self) -> &str {
        &self.0[..8]
    }

    pub fn first_octet(&self) -> u8 {
        u8::from_str_radix(&self.0[..2], 16).unwrap_or_default()
    }

    /// Whether the locally administered bit (0x02 of the first octet) is set.
    ///
    /// Randomized/private addresses set this bit.
    pub fn is_locally_administered(&self) -> bool {
        self.first_octet() & 0x02 != 0
    }
}

impl std::fmt::Display for HardwareAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for HardwareAddress {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("invalid hardware address: {s:?}"))
    }
}

impl TryFrom<String> for HardwareAddress {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<HardwareAddress> for String {
    fn from(value: HardwareAddress) -> Self {
        value.0
    }
}

/// A single neighbor-table entry as observed during one scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawObservation {
    /// Reported hostname; empty when the table format carries none, `?` when unresolved
    pub hostname: String,
    pub ip: Ipv4Addr,
    pub mac: HardwareAddress,
}

/// A known device in the registry, keyed by hardware address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    /// Sanitized label, assigned once at first discovery
    pub hostname: String,
    pub mac: HardwareAddress,
    /// Last observed address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<IpAddr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
}

impl DeviceRecord {
    /// Create a record for a device first seen at `now`
    pub fn new(hostname: String, mac: HardwareAddress, ip: Ipv4Addr, now: DateTime<Utc>) -> Self {
        Self {
            hostname,
            mac,
            ip: Some(IpAddr::V4(ip)),
            last_seen: Some(now),
        }
    }

    /// Record a fresh sighting
    pub fn touch(&mut self, ip: Ipv4Addr, now: DateTime<Utc>) {
        self.ip = Some(IpAddr::V4(ip));
        self.last_seen = Some(now);
    }

    /// Fully qualified name under `domain`
    pub fn fqdn(&self, domain: &str) -> String {
        format!("{}.{}", self.hostname, domain)
    }
}
