//! Managed-block reconciliation of a hosts-style resolution file
//!
//! Lines owned by lanhosts carry [`MANAGED_MARKER`] as a trailing comment and
//! are regenerated wholesale on each apply. Everything else in the file is
//! left untouched, except entries naming a host under the managed domain,
//! which are assumed to be stale entries from earlier runs.
//!
//! Apply order: read, backup, render, stage, replace, flush. The new content
//! is always staged next to the live file and renamed over it, so readers see
//! either the old or the new file. A failed replace is undone by installing
//! the content read at the start the same way; the backup file is a copy for
//! operators and is never read back.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{Metadata, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::command::{CommandError, CommandExecutor, SystemCommand};
use crate::device::DeviceRecord;

/// Marker carried by every managed line
pub const MANAGED_MARKER: &str = "# LANHOSTS-MANAGED";

const HEADER_LINE: &str = "# LANHOSTS-MANAGED - Auto-generated entries";
const TIMESTAMP_PREFIX: &str = "# LANHOSTS-MANAGED - Generated: ";
const STAGING_SUFFIX: &str = ".lanhosts-new";

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("failed to back up to {path}: {source}")]
    Backup {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to stage {path}: {source}")]
    Stage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to move staged file into place: {0}")]
    Rename(#[source] io::Error),
    #[error("privileged install failed: {0}")]
    Install(#[source] CommandError),
    #[error("{cause}; restoring the previous content also failed: {restore}")]
    RestoreFailed {
        cause: Box<SyncError>,
        restore: String,
    },
}

/// How the staged file replaces the live one
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallMode {
    /// Write the sibling staging file and `rename(2)` it; needs write access to the directory
    Direct,
    /// Stage privately, then [`SystemCommand::InstallFile`] to the sibling path
    /// and [`SystemCommand::ReplaceFile`] over the live file
    #[default]
    Privileged,
}

/// Filesystem locations used by the synchronizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostsPaths {
    pub hosts: PathBuf,
    pub backup: PathBuf,
    /// Parent of the private per-apply directory used by privileged installs
    pub staging_dir: PathBuf,
}

impl Default for HostsPaths {
    fn default() -> Self {
        Self {
            hosts: PathBuf::from("/etc/hosts"),
            backup: PathBuf::from("/tmp/hosts.backup"),
            staging_dir: std::env::temp_dir(),
        }
    }
}

/// Result of a successful apply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// File rewritten with this many device lines
    Written { entries: usize },
    /// Content already matched apart from the timestamp
    Unchanged,
}

/// Rewrites the managed block of a hosts file to match a device set
pub struct HostsFileSynchronizer {
    paths: HostsPaths,
    domain: String,
    mode: InstallMode,
    executor: Arc<dyn CommandExecutor>,
}

impl HostsFileSynchronizer {
    pub fn new(
        paths: HostsPaths,
        domain: impl Into<String>,
        mode: InstallMode,
        executor: Arc<dyn CommandExecutor>,
    ) -> Self {
        Self {
            paths,
            domain: domain.into(),
            mode,
            executor,
        }
    }

    pub fn paths(&self) -> &HostsPaths {
        &self.paths
    }

    pub async fn apply(&self, devices: &[DeviceRecord]) -> Result<SyncOutcome, SyncError> {
        self.apply_at(devices, Utc::now()).await
    }

    /// Apply with an explicit generation timestamp
    pub async fn apply_at(
        &self,
        devices: &[DeviceRecord],
        generated: DateTime<Utc>,
    ) -> Result<SyncOutcome, SyncError> {
        let hosts = &self.paths.hosts;
        let read_error = |source: io::Error| SyncError::Read {
            path: hosts.clone(),
            source,
        };
        let existing = std::fs::read_to_string(hosts).map_err(read_error)?;
        let metadata = std::fs::metadata(hosts).map_err(read_error)?;

        // Nothing has been mutated yet, so a failed backup needs no restore
        let backup = &self.paths.backup;
        stage(backup, &existing).map_err(|source| SyncError::Backup {
            path: backup.clone(),
            source,
        })?;

        let updated = render(&existing, devices, &self.domain, generated);
        if same_ignoring_timestamp(&existing, &updated) {
            debug!(path = %hosts.display(), "Hosts file already up to date");
            return Ok(SyncOutcome::Unchanged);
        }

        if let Err(cause) = self.replace(&updated, &metadata).await {
            warn!(error = %cause, "Hosts update failed, restoring previous content");
            return match self.replace(&existing, &metadata).await {
                Ok(()) => Err(cause),
                Err(restore) => Err(SyncError::RestoreFailed {
                    cause: Box::new(cause),
                    restore: restore.to_string(),
                }),
            };
        }

        let entries = managed_entries(devices).count();
        info!(path = %hosts.display(), entries, "Updated hosts file");
        self.flush_resolver_cache().await;
        Ok(SyncOutcome::Written { entries })
    }

    /// Atomically swap `content` in for the live file, keeping its attributes
    async fn replace(&self, content: &str, original: &Metadata) -> Result<(), SyncError> {
        let hosts = &self.paths.hosts;
        let sibling = sibling_staging(hosts);

        match self.mode {
            InstallMode::Direct => {
                let result = stage(&sibling, content)
                    .and_then(|()| carry_attributes(&sibling, original))
                    .map_err(|source| SyncError::Stage {
                        path: sibling.clone(),
                        source,
                    })
                    .and_then(|()| std::fs::rename(&sibling, hosts).map_err(SyncError::Rename));
                if result.is_err() {
                    let _ = std::fs::remove_file(&sibling);
                }
                result
            }
            InstallMode::Privileged => {
                // 0700 directory owned by us; removed when dropped
                let private = tempfile::Builder::new()
                    .prefix("lanhosts-")
                    .tempdir_in(&self.paths.staging_dir)
                    .map_err(|source| SyncError::Stage {
                        path: self.paths.staging_dir.clone(),
                        source,
                    })?;
                let local = private.path().join("hosts");
                stage(&local, content).map_err(|source| SyncError::Stage {
                    path: local.clone(),
                    source,
                })?;

                let install = SystemCommand::InstallFile {
                    from: local,
                    to: sibling.clone(),
                    mode: file_mode(original),
                };
                self.executor.run(&install).await.map_err(SyncError::Install)?;

                let swap = SystemCommand::ReplaceFile {
                    from: sibling,
                    to: hosts.clone(),
                };
                self.executor.run(&swap).await.map_err(SyncError::Install)?;
                Ok(())
            }
        }
    }

    async fn flush_resolver_cache(&self) {
        if let Err(e) = self.executor.run(&SystemCommand::FlushResolverCache).await {
            debug!(error = %e, "Resolver cache flush unavailable");
        }
    }
}

/// Staging path beside the target so the final rename stays on one filesystem
fn sibling_staging(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "hosts".into());
    name.push(STAGING_SUFFIX);
    target.with_file_name(name)
}

/// Create `path` exclusively, replacing a stale file, and flush `content` to disk
fn stage(path: &Path, content: &str) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e),
        _ => {}
    }
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    file.write_all(content.as_bytes())?;
    file.sync_all()
}

/// Stage `content` beside `path` and rename it into place
pub(crate) fn write_atomically(path: &Path, content: &str) -> io::Result<()> {
    let staged = sibling_staging(path);
    let result = stage(&staged, content).and_then(|()| std::fs::rename(&staged, path));
    if result.is_err() {
        let _ = std::fs::remove_file(&staged);
    }
    result
}

fn carry_attributes(path: &Path, original: &Metadata) -> io::Result<()> {
    std::fs::set_permissions(path, original.permissions())?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;

        let staged = std::fs::metadata(path)?;
        if (staged.uid(), staged.gid()) != (original.uid(), original.gid()) {
            if let Err(e) = std::os::unix::fs::chown(path, Some(original.uid()), Some(original.gid())) {
                debug!(path = %path.display(), error = %e, "Could not carry ownership to staged file");
            }
        }
    }

    Ok(())
}

#[cfg(unix)]
fn file_mode(metadata: &Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn file_mode(_metadata: &Metadata) -> u32 {
    0o644
}

fn managed_entries(devices: &[DeviceRecord]) -> impl Iterator<Item = &DeviceRecord> {
    devices.iter().filter(|d| d.ip.is_some())
}

/// Whether a line belongs to lanhosts: it carries the marker, or one of its
/// host names is `domain` or lies under it. Comments never count as names.
pub fn is_managed_line(line: &str, domain: &str) -> bool {
    if line.contains(MANAGED_MARKER) {
        return true;
    }
    if domain.is_empty() {
        return false;
    }

    let domain = domain.to_ascii_lowercase();
    let suffix = format!(".{domain}");
    let entry = line.split('#').next().unwrap_or_default();
    entry.split_whitespace().skip(1).any(|name| {
        let name = name.to_ascii_lowercase();
        name == domain || name.ends_with(&suffix)
    })
}

/// Produce the full file content: foreign lines followed by a fresh managed block
pub fn render(
    existing: &str,
    devices: &[DeviceRecord],
    domain: &str,
    generated: DateTime<Utc>,
) -> String {
    let mut retained: Vec<&str> = existing
        .lines()
        .filter(|line| !is_managed_line(line, domain))
        .collect();
    while retained.last().is_some_and(|line| line.trim().is_empty()) {
        retained.pop();
    }

    let mut out = String::new();
    if !retained.is_empty() {
        out.push_str(&retained.join("\n"));
        out.push_str("\n\n");
    }
    for line in managed_block(devices, domain, generated) {
        out.push_str(&line);
        out.push('\n');
    }
    out
}

/// Marker header, timestamp, then one line per addressed device
pub fn managed_block(
    devices: &[DeviceRecord],
    domain: &str,
    generated: DateTime<Utc>,
) -> Vec<String> {
    let mut lines = vec![
        HEADER_LINE.to_string(),
        format!(
            "{}{}",
            TIMESTAMP_PREFIX,
            generated.to_rfc3339_opts(SecondsFormat::Millis, true)
        ),
    ];
    for device in managed_entries(devices) {
        if let Some(ip) = device.ip {
            lines.push(format!(
                "{} {} {} {}",
                ip,
                device.fqdn(domain),
                device.hostname,
                MANAGED_MARKER
            ));
        }
    }
    lines
}

fn same_ignoring_timestamp(a: &str, b: &str) -> bool {
    let strip = |s: &str| -> Vec<String> {
        s.lines()
            .filter(|line| !line.starts_with(TIMESTAMP_PREFIX))
            .map(str::to_string)
            .collect()
    };
    a.ends_with('\n') == b.ends_with('\n') && strip(a) == strip(b)
}
