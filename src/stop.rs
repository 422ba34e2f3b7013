//! Shared cancellation flag for a watch session.
//!
//! One [`StopSignal`] is cloned into every part of a session. Synchronous code
//! polls [`StopSignal::is_stopped`] between units of work; async code can
//! await [`StopSignal::stopped`] alongside other futures.
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone)]
pub struct StopSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Requests a stop. Idempotent; completed work is never rolled back.
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once [`stop`](Self::stop) has been called, immediately if it
    /// already was.
    pub async fn stopped(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in self, so the channel cannot close while we wait.
        let _ = rx.wait_for(|stopped| *stopped).await;
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}
