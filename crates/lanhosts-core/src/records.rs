//! Cluster DNS record rendering

use crate::device::DeviceRecord;

/// TTL applied to every generated record
pub const RECORD_TTL: u32 = 300;

/// Render zone-file style A records for each addressed device.
///
/// Each device gets its own name plus an `api.` alias and a `*.apps.`
/// wildcard for application ingress, all pointing at its current address.
/// Output follows input order; node numbers are 1-based input positions.
pub fn render(devices: &[DeviceRecord], domain: &str) -> String {
    let mut records = vec![
        "# OKD Cluster DNS Records".to_string(),
        "# Use these in your cluster configuration".to_string(),
        String::new(),
        "# Mac devices in cluster:".to_string(),
    ];

    for (index, device) in devices.iter().enumerate() {
        let Some(ip) = device.ip else {
            continue;
        };
        let fqdn = device.fqdn(domain);
        records.push(format!("# Node {}: {} -> {}", index + 1, fqdn, ip));
        records.push(format!("{fqdn}. {RECORD_TTL} IN A {ip}"));
        records.push(format!("api.{fqdn}. {RECORD_TTL} IN A {ip}"));
        records.push(format!("*.apps.{fqdn}. {RECORD_TTL} IN A {ip}"));
    }

    records.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::HardwareAddress;
    use std::net::{IpAddr, Ipv4Addr};

    fn device(hostname: &str, ip: Option<[u8; 4]>) -> DeviceRecord {
        DeviceRecord {
            hostname: hostname.to_string(),
            mac: HardwareAddress::parse("a4:83:e7:11:22:33").unwrap(),
            ip: ip.map(|o| IpAddr::V4(Ipv4Addr::from(o))),
            last_seen: None,
        }
    }

    #[test]
    fn test_render_addressed_device() {
        let out = render(&[device("imac-kevin", Some([192, 168, 1, 42]))], "home.local");
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(&lines[4..], &[
            "# Node 1: imac-kevin.home.local -> 192.168.1.42",
            "imac-kevin.home.local. 300 IN A 192.168.1.42",
            "api.imac-kevin.home.local. 300 IN A 192.168.1.42",
            "*.apps.imac-kevin.home.local. 300 IN A 192.168.1.42",
        ]);
    }

    #[test]
    fn test_render_skips_device_without_address() {
        let out = render(&[device("ghost", None)], "home.local");
        assert!(!out.contains("ghost"));
        assert!(!out.contains(" IN A "));
    }

    #[test]
    fn test_render_keeps_input_order() {
        let out = render(
            &[
                device("zeta", Some([10, 0, 0, 2])),
                device("ghost", None),
                device("alpha", Some([10, 0, 0, 1])),
            ],
            "lan",
        );
        let zeta = out.find("zeta.lan.").unwrap();
        let alpha = out.find("alpha.lan.").unwrap();
        assert!(zeta < alpha);
        assert!(out.contains("# Node 3: alpha.lan -> 10.0.0.1"));
    }
}
