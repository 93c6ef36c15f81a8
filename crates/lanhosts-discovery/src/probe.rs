//! Liveness-probe fan-out
//!
//! Probes exist only to populate the neighbor table; individual results are
//! not consumed. All probes are dispatched and awaited as one barrier.

use lanhosts_core::{CommandExecutor, SystemCommand};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, trace};

/// Echo count and timeout for one probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeSettings {
    pub count: u8,
    pub timeout: Duration,
}

impl ProbeSettings {
    /// Single echo, 1 s timeout
    pub const NORMAL: ProbeSettings = ProbeSettings {
        count: 1,
        timeout: Duration::from_millis(1000),
    };

    /// Two echoes, 2 s timeout
    pub const AGGRESSIVE: ProbeSettings = ProbeSettings {
        count: 2,
        timeout: Duration::from_millis(2000),
    };

    pub fn command(&self, ip: Ipv4Addr) -> SystemCommand {
        SystemCommand::Ping {
            ip,
            count: self.count,
            timeout: self.timeout,
        }
    }
}

/// Counts from one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub dispatched: usize,
    pub answered: usize,
}

/// Probe every host and wait for all of them to settle.
///
/// `max_in_flight` of `None` launches every probe at once (254 for a /24).
pub async fn sweep(
    executor: Arc<dyn CommandExecutor>,
    hosts: impl IntoIterator<Item = Ipv4Addr>,
    settings: ProbeSettings,
    max_in_flight: Option<usize>,
) -> SweepSummary {
    let limiter = max_in_flight.map(|n| Arc::new(Semaphore::new(n.max(1))));
    let mut tasks = JoinSet::new();

    for host in hosts {
        let executor = executor.clone();
        let limiter = limiter.clone();
        tasks.spawn(async move {
            let _permit = match limiter {
                Some(ref sem) => sem.clone().acquire_owned().await.ok(),
                None => None,
            };
            let result = executor.run(&settings.command(host)).await;
            if let Err(ref e) = result {
                trace!(ip = %host, error = %e, "Probe failed");
            }
            result.is_ok()
        });
    }

    let mut summary = SweepSummary::default();
    while let Some(result) = tasks.join_next().await {
        summary.dispatched += 1;
        if let Ok(true) = result {
            summary.answered += 1;
        }
    }

    debug!(
        dispatched = summary.dispatched,
        answered = summary.answered,
        "Probe sweep complete"
    );
    summary
}
