//! Process-backed [`CommandExecutor`]
//!
//! Maps each [`SystemCommand`] to the platform's tool. Commands that depend on
//! elevated privileges go through `sudo`; the daemon is expected to run with
//! passwordless sudo or as root.

use async_trait::async_trait;
use lanhosts_core::{CommandError, CommandExecutor, NeighborSource, SystemCommand};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, trace};

/// Runs commands as OS processes
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemExecutor;

impl SystemExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandExecutor for SystemExecutor {
    async fn run(&self, command: &SystemCommand) -> Result<String, CommandError> {
        trace!(command = %command, "Running system command");
        match command {
            SystemCommand::DefaultGateway => {
                if cfg!(target_os = "macos") {
                    output(command, "route", &["-n", "get", "default"]).await
                } else {
                    output(command, "ip", &["route", "show", "default"]).await
                }
            }
            SystemCommand::FlushNeighborCache => {
                if cfg!(target_os = "macos") {
                    output(command, "sudo", &["arp", "-d", "-a"]).await
                } else {
                    output(command, "sudo", &["ip", "neigh", "flush", "all"]).await
                }
            }
            SystemCommand::Ping { ip, count, timeout } => {
                let count = count.to_string();
                // macOS takes milliseconds for -W, Linux takes whole seconds
                let wait = if cfg!(target_os = "macos") {
                    timeout.as_millis().to_string()
                } else {
                    timeout.as_secs().max(1).to_string()
                };
                let ip = ip.to_string();
                output(command, "ping", &["-c", count.as_str(), "-W", wait.as_str(), ip.as_str()]).await
            }
            SystemCommand::NeighborTable(NeighborSource::ArpAll) => {
                output(command, "arp", &["-a"]).await
            }
            SystemCommand::NeighborTable(NeighborSource::ProcNetArp) => {
                tokio::fs::read_to_string("/proc/net/arp")
                    .await
                    .map_err(|source| CommandError::Spawn {
                        command: command.to_string(),
                        source,
                    })
            }
            SystemCommand::NeighborTable(NeighborSource::IpNeighbor) => {
                output(command, "ip", &["neighbor", "show"]).await
            }
            SystemCommand::MdnsBrowse { service, window } => {
                browse(command, service, *window).await
            }
            SystemCommand::InstallFile { from, to, mode } => {
                let mode = format!("{mode:o}");
                let from = from.to_string_lossy().into_owned();
                let to = to.to_string_lossy().into_owned();
                output(
                    command,
                    "sudo",
                    &["install", "-m", mode.as_str(), from.as_str(), to.as_str()],
                )
                .await
            }
            SystemCommand::ReplaceFile { from, to } => {
                let from = from.to_string_lossy().into_owned();
                let to = to.to_string_lossy().into_owned();
                output(command, "sudo", &["mv", "-f", from.as_str(), to.as_str()]).await
            }
            SystemCommand::FlushResolverCache => {
                let candidates = if cfg!(target_os = "macos") {
                    MACOS_RESOLVER_FLUSHES
                } else {
                    LINUX_RESOLVER_FLUSHES
                };
                first_success(command, candidates).await
            }
        }
    }
}

/// Run to completion and return stdout, failing on a non-zero exit
async fn output(command: &SystemCommand, program: &str, args: &[&str]) -> Result<String, CommandError> {
    let out = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|source| CommandError::Spawn {
            command: command.to_string(),
            source,
        })?;

    if !out.status.success() {
        return Err(CommandError::Failed {
            command: command.to_string(),
            status: out.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&out.stdout).into_owned())
}

/// Resolver-cache flushes, most specific first; hosts differ in which exist
const MACOS_RESOLVER_FLUSHES: &[&[&str]] = &[
    &["sudo", "dscacheutil", "-flushcache"],
    &["sudo", "killall", "-HUP", "mDNSResponder"],
];

const LINUX_RESOLVER_FLUSHES: &[&[&str]] = &[
    &["sudo", "resolvectl", "flush-caches"],
    &["sudo", "systemctl", "restart", "systemd-resolved"],
    &["sudo", "systemctl", "restart", "nscd"],
    &["sudo", "systemctl", "restart", "dnsmasq"],
];

/// Run each argv in turn and return the output of the first that succeeds
async fn first_success(
    command: &SystemCommand,
    candidates: &[&[&str]],
) -> Result<String, CommandError> {
    let mut last = CommandError::Unsupported(command.to_string());
    for argv in candidates {
        let Some((program, args)) = argv.split_first() else {
            continue;
        };
        match output(command, program, args).await {
            Ok(out) => {
                debug!(candidate = %argv.join(" "), "Command succeeded");
                return Ok(out);
            }
            Err(e) => {
                trace!(candidate = %argv.join(" "), error = %e, "Candidate failed");
                last = e;
            }
        }
    }
    Err(last)
}

/// Run a browse for `window`, then kill it and return whatever it printed
async fn browse(command: &SystemCommand, service: &str, window: Duration) -> Result<String, CommandError> {
    let mut cmd = if cfg!(target_os = "macos") {
        let mut c = Command::new("dns-sd");
        c.args(["-B", service, "local."]);
        c
    } else {
        let mut c = Command::new("avahi-browse");
        c.args(["--parsable", "--resolve", service]);
        c
    };

    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| CommandError::Spawn {
            command: command.to_string(),
            source,
        })?;

    let mut stdout = child.stdout.take();
    let mut collected = Vec::new();

    if let Some(ref mut pipe) = stdout {
        use tokio::io::AsyncReadExt;
        let _ = tokio::time::timeout(window, pipe.read_to_end(&mut collected)).await;
    } else {
        tokio::time::sleep(window).await;
    }

    if let Err(e) = child.kill().await {
        debug!(error = %e, "Browse process already exited");
    }

    Ok(String::from_utf8_lossy(&collected).into_owned())
}
