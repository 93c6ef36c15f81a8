//! lanhosts discovery - local network sweep and neighbor-table harvesting
//!
//! This crate provides the discovery half of a scan cycle:
//! - Default-gateway based /24 resolution
//! - Concurrent liveness probing to populate the neighbor table
//! - Parsing of `arp -a`, `/proc/net/arp` and `ip neighbor` output
//! - A scanner that classifies entries and merges them into the registry

pub mod cancel;
pub mod gateway;
pub mod neighbor;
pub mod probe;
pub mod scanner;
pub mod system;

pub use cancel::{CancelHandle, CancelSignal, Cancelled};
pub use gateway::NetworkPrefix;
pub use scanner::{NetworkScanner, ScanError, ScannerConfig};
pub use system::SystemExecutor;
