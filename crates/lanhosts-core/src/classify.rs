//! Vendor classification of neighbor-table entries
//!
//! A device is accepted when either signal fires:
//! - its hardware-address prefix is in [`VENDOR_PREFIXES`], or
//! - its hostname matches one of [`HOSTNAME_PATTERNS`] *and* its hardware
//!   address has the locally administered bit set.
//!
//! The locally administered bit only corroborates a hostname match. It is
//! set by any device using a randomized address, so a non-vendor device with
//! a matching hostname will also be accepted.

use crate::device::HardwareAddress;

/// Vendor-assigned hardware-address prefixes (first three octets, lower case)
pub const VENDOR_PREFIXES: &[&str] = &[
    "00:1b:63", "00:1f:f3", "00:23:df", "00:25:00", "00:26:08",
    "04:0c:ce", "04:15:52", "04:69:f2", "0c:74:c2", "10:9a:dd",
    "14:10:9f", "18:af:61", "1c:ab:a7", "20:ab:37", "24:a0:74",
    "28:37:37", "2c:b4:3a", "30:90:ab", "34:15:9e", "38:ca:da",
    "3c:15:c2", "40:b3:95", "44:d8:84", "48:74:6e", "4c:32:75",
    "50:ea:d6", "54:26:96", "58:55:ca", "5c:95:ae", "60:f4:45",
    "64:b9:e8", "68:96:7b", "6c:70:9f", "70:11:24", "74:e2:f5",
    "78:31:c1", "7c:c3:a1", "80:92:9f", "84:78:ac", "88:1d:fc",
    "8c:58:77", "90:27:e4", "94:f6:d6", "98:f0:ab", "9c:04:eb",
    "a0:99:9b", "a4:83:e7", "a8:86:dd", "ac:87:a3", "b0:9f:ba",
    "b4:f0:ab", "b8:8d:12", "bc:92:6b", "c0:84:7a", "c4:b3:01",
    "c8:2a:14", "cc:08:8d", "d0:23:db", "d4:9a:20", "d8:30:62",
    "dc:2b:2a", "e0:ac:cb", "e4:b2:fb", "e8:80:2e", "ec:35:86",
    "f0:18:98", "f4:1b:a1", "f8:1e:df", "fc:25:3f",
    "7c:57:58", "58:d5:6e", "ac:de:48",
];

/// How a hostname pattern is matched against a lower-cased hostname
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostnamePattern {
    Contains(&'static str),
    EndsWith(&'static str),
}

impl HostnamePattern {
    /// `hostname` must already be lower case
    pub fn matches(&self, hostname: &str) -> bool {
        match self {
            Self::Contains(needle) => hostname.contains(needle),
            Self::EndsWith(suffix) => hostname.ends_with(suffix),
        }
    }
}

/// Product-line names and the local discovery domain
pub const HOSTNAME_PATTERNS: &[HostnamePattern] = &[
    HostnamePattern::Contains("macbook"),
    HostnamePattern::Contains("imac"),
    HostnamePattern::Contains("macmini"),
    HostnamePattern::Contains("mac-mini"),
    HostnamePattern::Contains("macpro"),
    HostnamePattern::Contains("mac-pro"),
    HostnamePattern::Contains("macstudio"),
    HostnamePattern::Contains("mac-studio"),
    HostnamePattern::Contains("iphone"),
    HostnamePattern::Contains("ipad"),
    HostnamePattern::Contains("appletv"),
    HostnamePattern::Contains("apple-tv"),
    HostnamePattern::EndsWith(".local"),
];

/// Result of evaluating both classification signals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Classification {
    pub prefix_match: bool,
    pub heuristic_match: bool,
}

impl Classification {
    pub fn is_target(&self) -> bool {
        self.prefix_match || self.heuristic_match
    }
}

/// Stateless classifier over the static tables above
#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceClassifier;

impl DeviceClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, hostname: &str, mac: &HardwareAddress) -> Classification {
        Classification {
            prefix_match: is_vendor_prefix(mac),
            heuristic_match: hostname_matches(hostname) && mac.is_locally_administered(),
        }
    }

    pub fn is_target_vendor(&self, hostname: &str, mac: &HardwareAddress) -> bool {
        self.classify(hostname, mac).is_target()
    }
}

/// Byte-for-byte prefix lookup
pub fn is_vendor_prefix(mac: &HardwareAddress) -> bool {
    VENDOR_PREFIXES.contains(&mac.prefix())
}

/// Case-insensitive match against [`HOSTNAME_PATTERNS`]; empty never matches
pub fn hostname_matches(hostname: &str) -> bool {
    if hostname.is_empty() {
        return false;
    }
    let lowered = hostname.to_lowercase();
    HOSTNAME_PATTERNS.iter().any(|p| p.matches(&lowered))
}
