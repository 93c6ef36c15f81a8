//! Discovery scanner that combines all discovery methods

use chrono::Utc;
use lanhosts_core::{
    CommandExecutor, DeviceClassifier, DeviceRecord, DeviceRegistry, HardwareAddress,
    MergeOutcome, NeighborSource, SystemCommand,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::cancel::{CancelSignal, Cancelled};
use crate::gateway::resolve_prefix;
use crate::neighbor;
use crate::probe::{sweep, ProbeSettings};

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("scan cancelled")]
    Cancelled(#[from] Cancelled),
}

/// Scanner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Flush the neighbor cache, probe twice and browse mDNS
    pub aggressive: bool,
    /// Log every parsed neighbor entry with its classification
    pub verbose: bool,
    /// Upper bound on in-flight probes; `None` probes the whole /24 at once
    pub max_concurrent_probes: Option<usize>,
    /// Service type browsed in aggressive mode
    pub mdns_service: String,
    /// How long the browse runs before it is stopped
    pub mdns_window_secs: u64,
    /// Registry snapshot written after every scan
    pub cache_path: PathBuf,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            aggressive: false,
            verbose: false,
            max_concurrent_probes: None,
            mdns_service: "_device-info._tcp".to_string(),
            mdns_window_secs: 3,
            cache_path: PathBuf::from("cache/known-devices.json"),
        }
    }
}

/// Sweeps the local /24 and folds target devices into a registry
pub struct NetworkScanner {
    config: ScannerConfig,
    executor: Arc<dyn CommandExecutor>,
    classifier: DeviceClassifier,
    cancel: CancelSignal,
}

impl NetworkScanner {
    pub fn new(
        config: ScannerConfig,
        executor: Arc<dyn CommandExecutor>,
        cancel: CancelSignal,
    ) -> Self {
        Self {
            config,
            executor,
            classifier: DeviceClassifier::new(),
            cancel,
        }
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    /// Run one discovery scan.
    ///
    /// Never fails: an aborted scan yields no devices. Records merged before
    /// the abort stay in the registry but the snapshot is not rewritten.
    pub async fn scan(&self, registry: &mut DeviceRegistry) -> Vec<DeviceRecord> {
        match self.try_scan(registry).await {
            Ok(devices) => devices,
            Err(e) => {
                warn!(error = %e, "Network scan aborted");
                Vec::new()
            }
        }
    }

    /// Run one discovery scan, reporting why it stopped early
    pub async fn try_scan(
        &self,
        registry: &mut DeviceRegistry,
    ) -> Result<Vec<DeviceRecord>, ScanError> {
        let prefix = self.cancel.guard(resolve_prefix(self.executor.as_ref())).await?;
        info!(network = %format!("{prefix}.0/24"), "Starting discovery scan");

        if self.config.aggressive {
            debug!("Aggressive mode: flushing neighbor cache");
            self.run_quietly(&SystemCommand::FlushNeighborCache).await?;
        }

        let settings = if self.config.aggressive {
            ProbeSettings::AGGRESSIVE
        } else {
            ProbeSettings::NORMAL
        };
        self.cancel
            .guard(sweep(
                self.executor.clone(),
                prefix.hosts(),
                settings,
                self.config.max_concurrent_probes,
            ))
            .await?;

        if self.config.aggressive {
            debug!(service = %self.config.mdns_service, "Browsing mDNS");
            self.run_quietly(&SystemCommand::MdnsBrowse {
                service: self.config.mdns_service.clone(),
                window: Duration::from_secs(self.config.mdns_window_secs),
            })
            .await?;
        }

        let table = self.collect_neighbor_tables().await?;
        let observations = neighbor::parse(&table);

        let now = Utc::now();
        let mut found: Vec<DeviceRecord> = Vec::new();
        let mut positions: HashMap<HardwareAddress, usize> = HashMap::new();

        for obs in &observations {
            let class = self.classifier.classify(&obs.hostname, &obs.mac);
            if self.config.verbose {
                info!(
                    hostname = %display_name(&obs.hostname),
                    ip = %obs.ip,
                    mac = %obs.mac,
                    prefix_match = class.prefix_match,
                    heuristic_match = class.heuristic_match,
                    "Found device"
                );
            } else {
                trace!(ip = %obs.ip, mac = %obs.mac, target = class.is_target(), "Found device");
            }

            if !class.is_target() {
                continue;
            }

            let (outcome, record) = registry.merge(obs, now);
            if outcome == MergeOutcome::Created {
                info!(
                    hostname = %record.hostname,
                    ip = %obs.ip,
                    mac = %obs.mac,
                    "New device discovered"
                );
            }

            match positions.get(&record.mac) {
                Some(&index) => found[index] = record.clone(),
                None => {
                    positions.insert(record.mac.clone(), found.len());
                    found.push(record.clone());
                }
            }
        }

        info!(
            total = observations.len(),
            targets = found.len(),
            known = registry.len(),
            "Scan complete"
        );

        if let Err(e) = registry.save(&self.config.cache_path) {
            warn!(path = %self.config.cache_path.display(), error = %e, "Could not save device cache");
        }

        Ok(found)
    }

    /// Query every neighbor-table source, skipping the ones that fail
    async fn collect_neighbor_tables(&self) -> Result<String, Cancelled> {
        let mut combined = String::new();
        for source in NeighborSource::ALL {
            let command = SystemCommand::NeighborTable(source);
            match self.cancel.guard(self.executor.run(&command)).await? {
                Ok(out) if !out.trim().is_empty() => {
                    combined.push_str(&out);
                    combined.push('\n');
                }
                Ok(_) => trace!(command = %command, "Empty neighbor table"),
                Err(e) => debug!(command = %command, error = %e, "Neighbor table unavailable"),
            }
        }
        Ok(combined)
    }

    /// Best-effort command whose failure does not matter
    async fn run_quietly(&self, command: &SystemCommand) -> Result<(), Cancelled> {
        if let Err(e) = self.cancel.guard(self.executor.run(command)).await? {
            debug!(command = %command, error = %e, "Supplementary command failed");
        }
        Ok(())
    }
}

fn display_name(hostname: &str) -> &str {
    if hostname.is_empty() {
        "unknown"
    } else {
        hostname
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel;
    use async_trait::async_trait;
    use lanhosts_core::CommandError;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Canned neighbor tables; every other command succeeds with no output
    #[derive(Default)]
    struct FakeExecutor {
        tables: HashMap<NeighborSource, String>,
        calls: Mutex<Vec<SystemCommand>>,
    }

    impl FakeExecutor {
        fn with_table(mut self, source: NeighborSource, text: &str) -> Self {
            self.tables.insert(source, text.to_string());
            self
        }

        fn calls(&self) -> Vec<SystemCommand> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CommandExecutor for FakeExecutor {
        async fn run(&self, command: &SystemCommand) -> Result<String, CommandError> {
            self.calls.lock().unwrap().push(command.clone());
            match command {
                SystemCommand::DefaultGateway => Ok("default via 192.168.1.1 dev eth0\n".to_string()),
                SystemCommand::NeighborTable(source) => self
                    .tables
                    .get(source)
                    .cloned()
                    .ok_or_else(|| CommandError::Unsupported(command.to_string())),
                _ => Ok(String::new()),
            }
        }
    }

    fn config(dir: &TempDir) -> ScannerConfig {
        ScannerConfig {
            cache_path: dir.path().join("known-devices.json"),
            ..Default::default()
        }
    }

    fn scanner(config: ScannerConfig, executor: Arc<FakeExecutor>) -> NetworkScanner {
        NetworkScanner::new(config, executor, CancelSignal::never())
    }

    #[tokio::test]
    async fn test_scan_discovers_vendor_device() {
        let dir = TempDir::new().unwrap();
        let executor = Arc::new(FakeExecutor::default().with_table(
            NeighborSource::ArpAll,
            "imac-kevin.local (192.168.1.42) at a4:83:e7:11:22:33 on en0 ifscope [ethernet]\n",
        ));
        let mut registry = DeviceRegistry::new();

        let devices = scanner(config(&dir), executor).scan(&mut registry).await;

        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].hostname, "imac-kevin");
        assert_eq!(devices[0].ip, Some(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 42))));
        assert_eq!(registry.len(), 1);
        assert!(dir.path().join("known-devices.json").exists());
    }

    #[tokio::test]
    async fn test_scan_excludes_randomized_address_without_hostname() {
        let dir = TempDir::new().unwrap();
        let executor = Arc::new(FakeExecutor::default().with_table(
            NeighborSource::IpNeighbor,
            "192.168.1.99 dev eth0 lladdr 5a:13:72:aa:bb:cc REACHABLE\n",
        ));
        let mut registry = DeviceRegistry::new();

        let devices = scanner(config(&dir), executor).scan(&mut registry).await;

        assert!(devices.is_empty());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_scan_probes_whole_prefix_and_every_table() {
        let dir = TempDir::new().unwrap();
        let executor = Arc::new(FakeExecutor::default());
        let mut registry = DeviceRegistry::new();

        scanner(config(&dir), executor.clone()).scan(&mut registry).await;

        let calls = executor.calls();
        let pings: Vec<&SystemCommand> = calls
            .iter()
            .filter(|c| matches!(c, SystemCommand::Ping { .. }))
            .collect();
        assert_eq!(pings.len(), 254);
        assert!(pings.iter().all(|c| matches!(c, SystemCommand::Ping { count: 1, .. })));
        for source in NeighborSource::ALL {
            assert!(calls.contains(&SystemCommand::NeighborTable(source)));
        }
        assert!(!calls.contains(&SystemCommand::FlushNeighborCache));
        assert!(!calls.iter().any(|c| matches!(c, SystemCommand::MdnsBrowse { .. })));
    }

    #[tokio::test]
    async fn test_aggressive_scan_adds_supplementary_steps() {
        let dir = TempDir::new().unwrap();
        let executor = Arc::new(FakeExecutor::default());
        let mut registry = DeviceRegistry::new();
        let config = ScannerConfig {
            aggressive: true,
            max_concurrent_probes: Some(16),
            ..config(&dir)
        };

        scanner(config, executor.clone()).scan(&mut registry).await;

        let calls = executor.calls();
        assert_eq!(calls[1], SystemCommand::FlushNeighborCache);
        assert!(calls.iter().any(|c| matches!(c, SystemCommand::Ping { count: 2, .. })));
        assert!(calls.contains(&SystemCommand::MdnsBrowse {
            service: "_device-info._tcp".to_string(),
            window: Duration::from_secs(3),
        }));
    }

    #[tokio::test]
    async fn test_scan_dedupes_across_tables() {
        let dir = TempDir::new().unwrap();
        let executor = Arc::new(
            FakeExecutor::default()
                .with_table(
                    NeighborSource::ArpAll,
                    "macbook-air.local (192.168.1.20) at a4:83:e7:00:00:01 on en0\n",
                )
                .with_table(
                    NeighborSource::IpNeighbor,
                    "192.168.1.21 dev eth0 lladdr a4:83:e7:00:00:01 REACHABLE\n\
                     192.168.1.30 dev eth0 lladdr 00:11:22:33:44:55 REACHABLE\n",
                ),
        );
        let mut registry = DeviceRegistry::new();

        let devices = scanner(config(&dir), executor).scan(&mut registry).await;

        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].hostname, "macbook-air");
        assert_eq!(devices[0].ip, Some(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 21))));
    }

    #[tokio::test]
    async fn test_known_device_keeps_hostname() {
        let dir = TempDir::new().unwrap();
        let mut registry = DeviceRegistry::new();

        let first = Arc::new(FakeExecutor::default().with_table(
            NeighborSource::ArpAll,
            "imac-kevin.local (192.168.1.42) at a4:83:e7:11:22:33 on en0\n",
        ));
        scanner(config(&dir), first).scan(&mut registry).await;

        let second = Arc::new(FakeExecutor::default().with_table(
            NeighborSource::ProcNetArp,
            "192.168.1.50     0x1         0x2         a4:83:e7:11:22:33     *        eth0\n",
        ));
        let devices = scanner(config(&dir), second).scan(&mut registry).await;

        assert_eq!(devices[0].hostname, "imac-kevin");
        assert_eq!(devices[0].ip, Some(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 50))));

        let reloaded = DeviceRegistry::load_or_default(&dir.path().join("known-devices.json"));
        assert_eq!(reloaded.len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_scan_yields_nothing() {
        let dir = TempDir::new().unwrap();
        let executor = Arc::new(FakeExecutor::default().with_table(
            NeighborSource::ArpAll,
            "imac-kevin.local (192.168.1.42) at a4:83:e7:11:22:33 on en0\n",
        ));
        let (handle, signal) = cancel::channel();
        handle.cancel();

        let scanner = NetworkScanner::new(config(&dir), executor.clone(), signal);
        let mut registry = DeviceRegistry::new();

        assert!(matches!(
            scanner.try_scan(&mut registry).await,
            Err(ScanError::Cancelled(_))
        ));
        assert!(scanner.scan(&mut registry).await.is_empty());
        assert!(registry.is_empty());
        assert!(executor.calls().is_empty());
    }
}
