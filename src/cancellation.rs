//! Cooperative cancellation (§5 ambient addition): a thin wrapper over
//! `tokio::sync::watch<bool>`, checked at the suspension points the spec
//! names (`rate_limiter.acquire`, embedder/analyzer HTTP calls, database
//! I/O). No dedicated crate needed — `tokio::sync` is already a teacher
//! dependency.

use tokio::sync::watch;

/// Shared flag a caller can flip to request cancellation; cheap to clone
/// and pass down through ingestion/search call chains.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    rx: watch::Receiver<bool>,
}

/// The owning half; dropping it leaves outstanding tokens permanently
/// un-cancellable (they just see the last value forever), which is fine
/// for this crate's single-process model.
#[derive(Debug, Clone)]
pub struct CancellationSource {
    tx: watch::Sender<bool>,
}

impl CancellationSource {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    pub fn token(&self) -> CancellationToken {
        CancellationToken { rx: self.tx.subscribe() }
    }

    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

impl Default for CancellationSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationToken {
    /// A token that never cancels, for call sites that don't thread one
    /// through yet (e.g. standalone library use outside `Engine`).
    pub fn none() -> Self {
        CancellationSource::new().token()
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the token is cancelled. Callers at a suspension point
    /// race this against the real work and bail out with `Cancelled`.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if *rx.borrow() {
            return;
        }
        let _ = rx.changed().await;
    }
}
