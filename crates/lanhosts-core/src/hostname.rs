//! Hostname derivation for newly discovered devices

use sha2::{Digest, Sha256};

use crate::device::HardwareAddress;

/// Label prefix used when a device reports no usable name
pub const FALLBACK_PREFIX: &str = "mac";

/// Suffix appended by multicast DNS responders
pub const MDNS_SUFFIX: &str = ".local";

/// Restrict a label to `[a-z0-9-]`, collapsing hyphen runs and trimming
/// leading/trailing hyphens. Applying it twice yields the same string.
pub fn sanitize(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    for c in label.chars().flat_map(char::to_lowercase) {
        let c = if c.is_ascii_lowercase() || c.is_ascii_digit() { c } else { '-' };
        if c == '-' && (out.is_empty() || out.ends_with('-')) {
            continue;
        }
        out.push(c);
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

/// Derive the stable hostname for a device seen for the first time
pub fn derive(reported: &str, mac: &HardwareAddress) -> String {
    let lowered = reported.trim().to_lowercase();
    let name = lowered.strip_suffix(MDNS_SUFFIX).unwrap_or(&lowered);

    if is_placeholder(name) {
        return fallback(mac);
    }

    let sanitized = sanitize(name);
    if sanitized.is_empty() {
        fallback(mac)
    } else {
        sanitized
    }
}

/// `mac-<first 6 hex chars of sha256(mac)>`
pub fn fallback(mac: &HardwareAddress) -> String {
    let digest = Sha256::digest(mac.as_str().as_bytes());
    let hex = hex::encode(digest);
    format!("{}-{}", FALLBACK_PREFIX, &hex[..6])
}

/// Empty, a single `?`, or a dotted IPv4 literal carry no naming information
fn is_placeholder(name: &str) -> bool {
    name.is_empty() || name == "?" || looks_like_ipv4(name)
}

fn looks_like_ipv4(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() == 4
        && parts
            .iter()
            .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
}
