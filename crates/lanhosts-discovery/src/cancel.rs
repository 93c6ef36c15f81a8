//! Cooperative cancellation built on a `watch` channel

use std::future::Future;
use thiserror::Error;
use tokio::sync::watch;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("operation cancelled")]
pub struct Cancelled;

/// Sending half; flips every associated [`CancelSignal`]
#[derive(Debug)]
pub struct CancelHandle(watch::Sender<bool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }
}

/// Receiving half, cheap to clone
#[derive(Debug, Clone)]
pub struct CancelSignal(watch::Receiver<bool>);

/// Create a linked handle/signal pair
pub fn channel() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle(tx), CancelSignal(rx))
}

impl CancelSignal {
    /// A signal that never fires
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self(rx)
    }

    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once cancellation is requested; pends forever if the handle is gone
    pub async fn cancelled(&self) {
        let mut rx = self.0.clone();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    /// Run `fut` unless cancellation arrives first
    pub async fn guard<F: Future>(&self, fut: F) -> Result<F::Output, Cancelled> {
        if self.is_cancelled() {
            return Err(Cancelled);
        }
        tokio::select! {
            out = fut => Ok(out),
            _ = self.cancelled() => Err(Cancelled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_guard_passes_through() {
        let signal = CancelSignal::never();
        assert_eq!(signal.guard(async { 7 }).await, Ok(7));
    }

    #[tokio::test]
    async fn test_guard_interrupts_pending_work() {
        let (handle, signal) = channel();
        let work = signal.guard(tokio::time::sleep(Duration::from_secs(3600)));
        handle.cancel();
        assert_eq!(work.await, Err(Cancelled));
        assert!(signal.is_cancelled());
    }

    #[tokio::test]
    async fn test_guard_refuses_after_cancel() {
        let (handle, signal) = channel();
        handle.cancel();
        assert_eq!(signal.guard(async { 1 }).await, Err(Cancelled));
    }
}
