//! Neighbor-table parsing across the formats emitted by common tools
//!
//! Recognized line shapes:
//! - `name (ip) at mac ...` (BSD/macOS `arp -a`, net-tools `arp -a`)
//! - `ip hwtype flags mac ...` (`/proc/net/arp`)
//! - `ip hwtype mac ...` (net-tools `arp -n`)
//! - `ip dev iface lladdr mac ...` (`ip neighbor show`)
//!
//! Anything else (headers, incomplete entries, IPv6 rows) is skipped.

use lanhosts_core::{HardwareAddress, RawObservation};
use regex::Regex;
use std::net::Ipv4Addr;
use std::sync::LazyLock;
use tracing::debug;

const IPV4: &str = r"(\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3})";
const MAC: &str = r"((?:[0-9A-Fa-f]{2}:){5}[0-9A-Fa-f]{2})";

static NAMED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"([^\s(]+)\s*\({IPV4}\)\s+at\s+{MAC}\b")).expect("valid pattern")
});

static PROC_ROW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^\s*{IPV4}\s+\w+\s+\w+\s+{MAC}\b")).expect("valid pattern")
});

static ARP_ROW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^\s*{IPV4}\s+\w+\s+{MAC}\b")).expect("valid pattern")
});

static IP_NEIGH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^\s*{IPV4}\s+dev\s+\S+\s+lladdr\s+{MAC}\b")).expect("valid pattern")
});

/// Parse concatenated neighbor-table output, one observation per matching line.
///
/// Duplicate hardware addresses are kept; merging decides which one wins.
pub fn parse(text: &str) -> Vec<RawObservation> {
    let observations: Vec<RawObservation> = text.lines().filter_map(parse_line).collect();
    debug!(entries = observations.len(), "Parsed neighbor table");
    observations
}

/// Parse a single line, returning `None` when no known shape matches
pub fn parse_line(line: &str) -> Option<RawObservation> {
    if line.trim().is_empty() {
        return None;
    }

    if let Some(caps) = NAMED.captures(line) {
        return observation(&caps[1], &caps[2], &caps[3]);
    }

    for shape in [&*PROC_ROW, &*ARP_ROW, &*IP_NEIGH] {
        if let Some(caps) = shape.captures(line) {
            return observation("", &caps[1], &caps[2]);
        }
    }

    None
}

fn observation(hostname: &str, ip: &str, mac: &str) -> Option<RawObservation> {
    Some(RawObservation {
        hostname: hostname.to_string(),
        ip: ip.parse::<Ipv4Addr>().ok()?,
        mac: HardwareAddress::parse(mac)?,
    })
}
