//! lanhosts core - device records, classification, registry and reconciliation
//!
//! This crate provides the domain logic shared by discovery and the daemon:
//! - Hardware-address and device-record types
//! - Vendor classification over static prefix and hostname tables
//! - A persistent device registry with stable hostname assignment
//! - Managed-block synchronization of a hosts file
//! - Cluster DNS record rendering
//! - The command-execution capability used for all OS interaction

pub mod classify;
pub mod command;
pub mod device;
pub mod hostname;
pub mod hosts;
pub mod records;
pub mod registry;

pub use classify::{Classification, DeviceClassifier};
pub use command::{CommandError, CommandExecutor, NeighborSource, SystemCommand};
pub use device::{DeviceRecord, HardwareAddress, RawObservation};
pub use hosts::{HostsFileSynchronizer, HostsPaths, InstallMode, SyncError, SyncOutcome};
pub use registry::{DeviceRegistry, MergeOutcome, RegistryError};
