use tokio::sync::watch;

/// Owns the shared donation total and the backend-readiness signal.
///
/// The total is mutated from three places: the remote change stream, the
/// local-cache fallback path, and the flow controller after a successful
/// remote save. All of them go through `set_total` and the last write wins;
/// the remote store is the authority whenever it is reachable.
pub struct SyncCore {
    goal: f64,
    total_tx: watch::Sender<f64>,
    ready_tx: watch::Sender<bool>,
}

impl SyncCore {
    pub fn new(goal: f64, initial_total: f64) -> Self {
        let (total_tx, _) = watch::channel(initial_total);
        let (ready_tx, _) = watch::channel(false);
        Self {
            goal,
            total_tx,
            ready_tx,
        }
    }

    pub fn goal(&self) -> f64 {
        self.goal
    }

    pub fn total(&self) -> f64 {
        *self.total_tx.borrow()
    }

    pub fn set_total(&self, value: f64) {
        self.total_tx.send_replace(value);
    }

    /// Receiver for progress watchers (the SSE endpoint).
    pub fn watch_total(&self) -> watch::Receiver<f64> {
        self.total_tx.subscribe()
    }

    pub fn is_ready(&self) -> bool {
        *self.ready_tx.borrow()
    }

    /// Resolves the readiness signal. Only the first call flips it; the
    /// signal never goes back to false.
    pub fn mark_ready(&self) {
        if !self.is_ready() {
            self.ready_tx.send_replace(true);
        }
    }

    /// Completes once the remote backend has answered its first read.
    pub async fn ready(&self) {
        let mut rx = self.ready_tx.subscribe();
        // Error means the core itself was dropped; nothing left to wait for.
        let _ = rx.wait_for(|ready| *ready).await;
    }
}
