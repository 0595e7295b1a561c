use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::{timeout, Duration};

/// Marker shared between a bounded wait and the operation it races. Once the
/// wait gives up, the operation keeps running in the background but must
/// treat the token as abandoned and leave the shared total alone.
#[derive(Clone, Debug, Default)]
pub struct AbandonToken(Arc<AtomicBool>);

impl AbandonToken {
    pub fn abandon(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_abandoned(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Races `op` against `limit`. The operation is spawned, not cancelled: on
/// timeout it is marked abandoned via `token` and left to finish on its own.
/// Returns `None` when the timer won.
pub async fn run_abandonable<T>(
    limit: Duration,
    token: AbandonToken,
    op: impl Future<Output = T> + Send + 'static,
) -> Option<T>
where
    T: Send + 'static,
{
    let handle = tokio::spawn(op);
    match timeout(limit, handle).await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(join_err)) => {
            tracing::error!("abandonable operation panicked: {}", join_err);
            None
        }
        Err(_) => {
            token.abandon();
            None
        }
    }
}
