//! Periodic scan and sync loop

use lanhosts_core::{records, DeviceRecord, DeviceRegistry, HostsFileSynchronizer, SyncOutcome};
use lanhosts_discovery::{CancelSignal, NetworkScanner};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, warn};

/// What one cycle did
#[derive(Debug, Default)]
pub struct CycleReport {
    pub devices: Vec<DeviceRecord>,
    /// `None` when no sync was attempted
    pub hosts: Option<SyncOutcome>,
    pub records_written: bool,
}

/// Owns the registry and drives scan, hosts sync and record export
pub struct Monitor {
    scanner: NetworkScanner,
    registry: DeviceRegistry,
    hosts: HostsFileSynchronizer,
    records_path: PathBuf,
    domain: String,
    interval: Duration,
    cancel: CancelSignal,
}

impl Monitor {
    pub fn new(
        scanner: NetworkScanner,
        registry: DeviceRegistry,
        hosts: HostsFileSynchronizer,
        records_path: PathBuf,
        domain: impl Into<String>,
        interval: Duration,
        cancel: CancelSignal,
    ) -> Self {
        Self {
            scanner,
            registry,
            hosts,
            records_path,
            domain: domain.into(),
            interval,
            cancel,
        }
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// Run cycles until cancelled. The interval is measured from the end of
    /// one cycle to the start of the next, so cycles never overlap.
    pub async fn run(&mut self) {
        info!(
            interval_secs = self.interval.as_secs(),
            domain = %self.domain,
            aggressive = self.scanner.config().aggressive,
            "Starting continuous monitoring"
        );

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            self.cycle().await;

            if self.cancel.guard(tokio::time::sleep(self.interval)).await.is_err() {
                break;
            }
        }

        info!("Monitoring stopped");
    }

    /// One scan followed, when anything was found, by hosts sync and record export
    pub async fn cycle(&mut self) -> CycleReport {
        let devices = self.scanner.scan(&mut self.registry).await;
        let mut report = CycleReport::default();

        if devices.is_empty() {
            info!("No target devices found");
            return report;
        }

        for device in &devices {
            info!(
                hostname = %device.hostname,
                fqdn = %device.fqdn(&self.domain),
                ip = ?device.ip,
                mac = %device.mac,
                "Target device"
            );
        }

        if self.cancel.is_cancelled() {
            info!("Cancelled before sync");
            report.devices = devices;
            return report;
        }

        match self.hosts.apply(&devices).await {
            Ok(outcome @ SyncOutcome::Written { entries }) => {
                info!(
                    path = %self.hosts.paths().hosts.display(),
                    entries,
                    "Hosts file updated"
                );
                report.hosts = Some(outcome);
            }
            Ok(SyncOutcome::Unchanged) => {
                info!("Hosts file already up to date");
                report.hosts = Some(SyncOutcome::Unchanged);
            }
            Err(e) => error!(error = %e, "Hosts file update failed"),
        }

        let body = records::render(&devices, &self.domain);
        match write_records(&self.records_path, &body) {
            Ok(()) => {
                info!(path = %self.records_path.display(), "DNS records written");
                report.records_written = true;
            }
            Err(e) => warn!(path = %self.records_path.display(), error = %e, "Could not write DNS records"),
        }

        report.devices = devices;
        report
    }
}

fn write_records(path: &Path, body: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, body)
}
