//! lanhosts daemon - Main entry point
//!
//! Periodically discovers target devices on the local network and keeps the
//! hosts file and the cluster DNS record file in step with them.

mod config;
mod monitor;

use anyhow::{Context, Result};
use clap::Parser;
use config::ConfigSource;
use lanhosts_core::{DeviceRegistry, HostsFileSynchronizer};
use lanhosts_discovery::{cancel, CancelHandle, NetworkScanner, SystemExecutor};
use monitor::Monitor;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "lanhosts")]
#[command(about = "LAN device discovery and hosts-file reconciliation daemon")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/ddns-config.json")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    /// Run a single cycle and exit
    #[arg(long)]
    scan_once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration before logging so the file can pick the level
    let (config, source) = config::load_config(&args.config)
        .with_context(|| format!("invalid configuration ({})", args.config.display()))?;

    let level_name = args.log_level.as_deref().unwrap_or(config.log_level());
    let level = match level_name.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("lanhosts v{}", env!("CARGO_PKG_VERSION"));

    match &source {
        ConfigSource::File(path) => info!(path = %path.display(), "Configuration loaded"),
        ConfigSource::Invalid { path, error } => warn!(
            path = %path.display(),
            error = %error,
            "Configuration unreadable, using environment defaults"
        ),
        ConfigSource::Defaults => info!(
            path = %args.config.display(),
            "No configuration file, using environment defaults"
        ),
    }

    info!(
        local_domain = %config.local_domain,
        hub_ip = %config.hub_ip,
        external_domain = config.external_domain.as_deref().unwrap_or("none"),
        aggressive = config.aggressive_scan,
        install_mode = ?config.install_mode,
        "Configuration"
    );

    let (handle, signal) = cancel::channel();
    tokio::spawn(shutdown_on_signal(handle));

    let executor = Arc::new(SystemExecutor::new());
    let scanner_config = config.to_scanner_config();
    let registry = DeviceRegistry::load_or_default(&scanner_config.cache_path);
    info!(known = registry.len(), "Device cache loaded");

    let scanner = NetworkScanner::new(scanner_config, executor.clone(), signal.clone());
    let hosts = HostsFileSynchronizer::new(
        config.hosts_paths(),
        config.local_domain.clone(),
        config.install_mode,
        executor,
    );

    let mut monitor = Monitor::new(
        scanner,
        registry,
        hosts,
        config.paths.dns_records.clone(),
        config.local_domain.clone(),
        config.scan_interval(),
        signal,
    );

    if args.scan_once {
        info!("Running single cycle");
        let report = monitor.cycle().await;
        println!("Found {} target devices:", report.devices.len());
        for device in &report.devices {
            let ip = device
                .ip
                .map(|ip| ip.to_string())
                .unwrap_or_else(|| "-".to_string());
            println!(
                "  - {} ({}) at {}",
                device.fqdn(&config.local_domain),
                device.mac,
                ip
            );
        }
        match report.hosts {
            Some(outcome) => println!("Hosts file: {:?}", outcome),
            None => println!("Hosts file: not updated"),
        }
        if report.records_written {
            println!("DNS records: {}", config.paths.dns_records.display());
        }
        println!("Known devices: {}", monitor.registry().len());
    } else {
        monitor.run().await;
    }

    Ok(())
}

/// Cancel on SIGINT or SIGTERM
async fn shutdown_on_signal(handle: CancelHandle) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "Could not install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("Shutdown requested");
    handle.cancel();
}
