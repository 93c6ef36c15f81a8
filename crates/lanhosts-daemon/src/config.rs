//! Configuration loading and validation

use anyhow::{bail, Result};
use lanhosts_core::{HostsPaths, InstallMode};
use lanhosts_discovery::ScannerConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Domain suffix for hosts-file entries
    #[serde(default = "default_local_domain")]
    pub local_domain: String,
    /// Router address (informational)
    #[serde(rename = "hubIP", default = "default_hub_ip")]
    pub hub_ip: String,
    /// Externally reachable domain, if the router provides one (informational)
    #[serde(default)]
    pub external_domain: Option<String>,
    /// Log every neighbor entry with its classification
    #[serde(default)]
    pub debug: bool,
    /// Neighbor-cache flush, dual probes and mDNS browse
    #[serde(default)]
    pub aggressive_scan: bool,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    /// Bound on in-flight probes (unbounded when absent)
    #[serde(default)]
    pub max_concurrent_probes: Option<usize>,
    #[serde(default)]
    pub install_mode: InstallMode,
    #[serde(default)]
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringConfig {
    /// Seconds between the end of one cycle and the start of the next
    #[serde(default = "default_scan_interval")]
    pub scan_interval: u64,
    /// trace, debug, info, warn or error
    #[serde(default)]
    pub log_level: Option<String>,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            scan_interval: default_scan_interval(),
            log_level: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathsConfig {
    #[serde(default = "default_hosts_file")]
    pub hosts_file: PathBuf,
    #[serde(default = "default_hosts_backup")]
    pub hosts_backup: PathBuf,
    /// Where privileged installs create their private staging directory
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,
    #[serde(default = "default_device_cache")]
    pub device_cache: PathBuf,
    #[serde(default = "default_dns_records")]
    pub dns_records: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            hosts_file: default_hosts_file(),
            hosts_backup: default_hosts_backup(),
            staging_dir: default_staging_dir(),
            device_cache: default_device_cache(),
            dns_records: default_dns_records(),
        }
    }
}

fn default_local_domain() -> String {
    "home.local".to_string()
}

fn default_hub_ip() -> String {
    "192.168.2.1".to_string()
}

fn default_scan_interval() -> u64 {
    120
}

fn default_hosts_file() -> PathBuf {
    PathBuf::from("/etc/hosts")
}

fn default_hosts_backup() -> PathBuf {
    PathBuf::from("/tmp/hosts.backup")
}

fn default_staging_dir() -> PathBuf {
    std::env::temp_dir()
}

fn default_device_cache() -> PathBuf {
    PathBuf::from("cache/known-devices.json")
}

fn default_dns_records() -> PathBuf {
    PathBuf::from("config/okd-dns-records.txt")
}

/// Where the effective configuration came from
#[derive(Debug)]
pub enum ConfigSource {
    File(PathBuf),
    /// File present but unusable; defaults were used
    Invalid { path: PathBuf, error: String },
    /// No file; defaults were used
    Defaults,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            local_domain: default_local_domain(),
            hub_ip: default_hub_ip(),
            external_domain: None,
            debug: false,
            aggressive_scan: false,
            monitoring: MonitoringConfig::default(),
            max_concurrent_probes: None,
            install_mode: InstallMode::default(),
            paths: PathsConfig::default(),
        }
    }
}

impl Config {
    /// Hard-coded defaults overlaid with `ROUTER_IP`, `EXTERNAL_DOMAIN`,
    /// `DEBUG` and `AGGRESSIVE_SCAN`
    pub fn from_env(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let flag = |key: &str| lookup(key).is_some_and(|v| v == "true");
        Self {
            hub_ip: lookup("ROUTER_IP").unwrap_or_else(default_hub_ip),
            external_domain: lookup("EXTERNAL_DOMAIN").filter(|v| !v.is_empty()),
            debug: flag("DEBUG"),
            aggressive_scan: flag("AGGRESSIVE_SCAN"),
            ..Self::default()
        }
    }

    /// Reject settings the daemon cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.local_domain.trim().is_empty() {
            bail!("localDomain must not be empty");
        }
        if self.local_domain.starts_with('.') || self.local_domain.ends_with('.') {
            bail!("localDomain must not start or end with '.': {}", self.local_domain);
        }
        if self.monitoring.scan_interval == 0 {
            bail!("monitoring.scanInterval must be at least 1 second");
        }
        if self.max_concurrent_probes == Some(0) {
            bail!("maxConcurrentProbes must be at least 1");
        }
        Ok(())
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.monitoring.scan_interval)
    }

    /// Convert to ScannerConfig
    pub fn to_scanner_config(&self) -> ScannerConfig {
        ScannerConfig {
            aggressive: self.aggressive_scan,
            verbose: self.debug,
            max_concurrent_probes: self.max_concurrent_probes,
            cache_path: self.paths.device_cache.clone(),
            ..ScannerConfig::default()
        }
    }

    pub fn hosts_paths(&self) -> HostsPaths {
        HostsPaths {
            hosts: self.paths.hosts_file.clone(),
            backup: self.paths.hosts_backup.clone(),
            staging_dir: self.paths.staging_dir.clone(),
        }
    }

    /// Explicit level from the file, else `debug` when verbose, else `info`
    pub fn log_level(&self) -> &str {
        match &self.monitoring.log_level {
            Some(level) => level,
            None if self.debug => "debug",
            None => "info",
        }
    }
}

/// Load configuration from file, falling back to environment-derived defaults
pub fn load_config(path: &Path) -> Result<(Config, ConfigSource)> {
    load_config_with(path, |key| std::env::var(key).ok())
}

pub fn load_config_with(
    path: &Path,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(Config, ConfigSource)> {
    let (config, source) = if path.exists() {
        let parsed = std::fs::read_to_string(path)
            .map_err(anyhow::Error::from)
            .and_then(|content| serde_json::from_str::<Config>(&content).map_err(Into::into));
        match parsed {
            Ok(config) => (config, ConfigSource::File(path.to_path_buf())),
            Err(e) => (
                Config::from_env(&lookup),
                ConfigSource::Invalid {
                    path: path.to_path_buf(),
                    error: e.to_string(),
                },
            ),
        }
    } else {
        (Config::from_env(&lookup), ConfigSource::Defaults)
    };

    config.validate()?;
    Ok((config, source))
}
