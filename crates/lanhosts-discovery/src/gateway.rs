//! Local /24 address-space resolution from the default gateway

use lanhosts_core::{CommandExecutor, SystemCommand};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use tracing::{debug, warn};

/// First three octets of the local /24
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkPrefix(pub [u8; 3]);

impl NetworkPrefix {
    /// Prefix used when the gateway cannot be determined
    pub const FALLBACK: NetworkPrefix = NetworkPrefix([192, 168, 1]);

    pub fn of(ip: Ipv4Addr) -> Self {
        let [a, b, c, _] = ip.octets();
        Self([a, b, c])
    }

    /// The address `host` within this prefix
    pub fn host(&self, host: u8) -> Ipv4Addr {
        let [a, b, c] = self.0;
        Ipv4Addr::new(a, b, c, host)
    }

    /// Every usable host address, `.1` through `.254`
    pub fn hosts(&self) -> impl Iterator<Item = Ipv4Addr> + '_ {
        (1..=254).map(move |h| self.host(h))
    }
}

impl std::fmt::Display for NetworkPrefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let [a, b, c] = self.0;
        write!(f, "{a}.{b}.{c}")
    }
}

/// Determine the local prefix via the default gateway.
///
/// Never fails: any query or parse problem yields [`NetworkPrefix::FALLBACK`].
pub async fn resolve_prefix(executor: &dyn CommandExecutor) -> NetworkPrefix {
    match executor.run(&SystemCommand::DefaultGateway).await {
        Ok(output) => match parse_gateway(&output) {
            Some(gateway) => {
                debug!(gateway = %gateway, "Resolved default gateway");
                NetworkPrefix::of(gateway)
            }
            None => {
                warn!("No gateway in route output, using default prefix");
                NetworkPrefix::FALLBACK
            }
        },
        Err(e) => {
            warn!(error = %e, "Default gateway query failed, using default prefix");
            NetworkPrefix::FALLBACK
        }
    }
}

/// First IPv4 literal in route output
///
/// Handles `default via 192.168.1.1 dev eth0` and `gateway: 192.168.1.1`.
pub fn parse_gateway(output: &str) -> Option<Ipv4Addr> {
    output
        .split_whitespace()
        .find_map(|token| token.parse::<Ipv4Addr>().ok())
        .filter(|ip| !ip.is_unspecified())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use lanhosts_core::CommandError;

    struct Canned(Result<&'static str, ()>);

    #[async_trait]
    impl CommandExecutor for Canned {
        async fn run(&self, command: &SystemCommand) -> Result<String, CommandError> {
            assert_eq!(command, &SystemCommand::DefaultGateway);
            self.0
                .map(str::to_string)
                .map_err(|_| CommandError::Unsupported(command.to_string()))
        }
    }

    #[test]
    fn test_parse_linux_route() {
        let out = "default via 10.0.4.1 dev wlan0 proto dhcp metric 600\n";
        assert_eq!(parse_gateway(out), Some(Ipv4Addr::new(10, 0, 4, 1)));
    }

    #[test]
    fn test_parse_macos_route() {
        let out = "   route to: default\ndestination: default\n       mask: default\n    gateway: 192.168.2.1\n  interface: en0\n";
        assert_eq!(parse_gateway(out), Some(Ipv4Addr::new(192, 168, 2, 1)));
    }

    #[test]
    fn test_parse_no_gateway() {
        assert_eq!(parse_gateway(""), None);
        assert_eq!(parse_gateway("default dev wg0 scope link"), None);
    }

    #[test]
    fn test_prefix_hosts() {
        let prefix = NetworkPrefix([192, 168, 1]);
        let hosts: Vec<Ipv4Addr> = prefix.hosts().collect();
        assert_eq!(hosts.len(), 254);
        assert_eq!(hosts[0], Ipv4Addr::new(192, 168, 1, 1));
        assert_eq!(hosts[253], Ipv4Addr::new(192, 168, 1, 254));
        assert_eq!(prefix.to_string(), "192.168.1");
    }

    #[tokio::test]
    async fn test_resolve_prefix_from_gateway() {
        let prefix = resolve_prefix(&Canned(Ok("default via 10.0.4.1 dev eth0"))).await;
        assert_eq!(prefix, NetworkPrefix([10, 0, 4]));
    }

    #[tokio::test]
    async fn test_resolve_prefix_falls_back() {
        assert_eq!(resolve_prefix(&Canned(Err(()))).await, NetworkPrefix::FALLBACK);
        assert_eq!(resolve_prefix(&Canned(Ok("garbage"))).await, NetworkPrefix::FALLBACK);
    }
}
