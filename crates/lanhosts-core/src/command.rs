//! Command-execution capability
//!
//! Everything that touches the operating system (probes, neighbor-table
//! dumps, multicast browsing, privileged installs, cache flushes) is expressed
//! as a [`SystemCommand`] and run through a [`CommandExecutor`]. Production
//! code uses a process-spawning executor; tests substitute canned output.

use async_trait::async_trait;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command}` exited with status {status}: {stderr}")]
    Failed {
        command: String,
        status: i32,
        stderr: String,
    },
    #[error("`{0}` is not supported on this host")]
    Unsupported(String),
}

/// Neighbor-table dump variants; hosts differ in which ones work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NeighborSource {
    /// `arp -a`
    ArpAll,
    /// `/proc/net/arp`
    ProcNetArp,
    /// `ip neighbor show`
    IpNeighbor,
}

impl NeighborSource {
    /// Every source, in the order they are queried
    pub const ALL: [NeighborSource; 3] = [Self::ArpAll, Self::ProcNetArp, Self::IpNeighbor];
}

/// An OS-level operation requested by the core
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SystemCommand {
    /// Report the default route / gateway
    DefaultGateway,
    /// Drop all neighbor-cache entries
    FlushNeighborCache,
    /// ICMP echo liveness probe
    Ping {
        ip: Ipv4Addr,
        count: u8,
        timeout: Duration,
    },
    /// Dump the neighbor table
    NeighborTable(NeighborSource),
    /// Browse a multicast-DNS service type for `window`, then stop
    MdnsBrowse {
        service: String,
        window: Duration,
    },
    /// Copy `from` to `to` with elevated privileges and permission bits `mode`
    InstallFile { from: PathBuf, to: PathBuf, mode: u32 },
    /// Rename `from` over `to` with elevated privileges; both on one filesystem
    ReplaceFile { from: PathBuf, to: PathBuf },
    /// Flush the OS name-resolution cache
    FlushResolverCache,
}

impl std::fmt::Display for SystemCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DefaultGateway => write!(f, "default-gateway"),
            Self::FlushNeighborCache => write!(f, "flush-neighbor-cache"),
            Self::Ping { ip, count, timeout } => {
                write!(f, "ping {ip} (count {count}, timeout {}ms)", timeout.as_millis())
            }
            Self::NeighborTable(source) => write!(f, "neighbor-table {source:?}"),
            Self::MdnsBrowse { service, window } => {
                write!(f, "mdns-browse {service} for {}s", window.as_secs())
            }
            Self::InstallFile { from, to, mode } => {
                write!(f, "install {} -> {} (mode {mode:o})", from.display(), to.display())
            }
            Self::ReplaceFile { from, to } => {
                write!(f, "replace {} -> {}", from.display(), to.display())
            }
            Self::FlushResolverCache => write!(f, "flush-resolver-cache"),
        }
    }
}

/// Runs [`SystemCommand`]s and returns their textual output
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn run(&self, command: &SystemCommand) -> Result<String, CommandError>;
}
