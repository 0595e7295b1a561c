use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::time::{sleep, Duration};

use crate::api::emailjs::{ThankYouEmailer, ThankYouParams};
use crate::donation_flow::ThankYouNotifier;
use crate::error::Result;
use crate::models::donation_models::PendingNotification;
use crate::progress::format_usd;
use crate::sync_core::SyncCore;

/// Spool slot for the one pending thank-you message. Singular on purpose: a
/// second pending write overwrites the first.
const SPOOL_FILE: &str = "pendingNotification.json";

/// Seconds still to wait until `send_at`, clamped at zero when already due.
fn remaining_delay(send_at: i64, now: i64) -> Duration {
    Duration::from_secs((send_at - now).max(0) as u64)
}

/// Queues thank-you emails for deferred or immediate delivery. Pending work
/// is persisted in a spool file so a restart picks it up again. A failed
/// send is logged and its record left behind; there is no retry policy.
#[derive(Clone)]
pub struct NotificationScheduler {
    spool_path: Arc<PathBuf>,
    emailer: Arc<dyn ThankYouEmailer>,
    core: Arc<SyncCore>,
}

impl NotificationScheduler {
    pub fn new(data_dir: &Path, emailer: Arc<dyn ThankYouEmailer>, core: Arc<SyncCore>) -> Self {
        Self {
            spool_path: Arc::new(data_dir.join(SPOOL_FILE)),
            emailer,
            core,
        }
    }

    /// Called once at startup. Re-arms a pending notification for whatever
    /// time remains, firing immediately when it is already due. Exactly one
    /// trigger per resume.
    pub fn resume_if_pending(&self) {
        let Some(pending) = self.load_pending() else {
            return;
        };
        let delay = remaining_delay(pending.send_at, Utc::now().timestamp());
        tracing::info!(
            "resuming pending thank-you for {}, due in {}s",
            pending.email,
            delay.as_secs()
        );
        self.arm(pending, delay);
    }

    /// Delivers the thank-you message and clears the spool slot on success.
    /// On failure the pending record stays where it is.
    pub async fn send(&self, pending: &PendingNotification) -> Result<()> {
        let params = self.build_params(pending);
        self.emailer.send(&params).await?;
        if let Err(e) = self.clear_pending() {
            tracing::warn!("sent thank-you but could not clear spool slot: {}", e);
        }
        Ok(())
    }

    fn arm(&self, pending: PendingNotification, delay: Duration) {
        let scheduler = self.clone();
        tokio::spawn(async move {
            sleep(delay).await;
            if let Err(e) = scheduler.send(&pending).await {
                tracing::error!("thank-you delivery failed, record left in spool: {}", e);
            }
        });
    }

    fn build_params(&self, pending: &PendingNotification) -> ThankYouParams {
        let goal = self.core.goal();
        // The message total counts this donation on top of the shared figure.
        let total = self.core.total() + pending.amount;
        ThankYouParams {
            to_name: pending.name.clone(),
            to_email: pending.email.clone(),
            amount: format_usd(pending.amount),
            total_donated: format_usd(total),
            goal: format_usd(goal),
            message: format!(
                "Thank you {} for your {} donation! Together we have raised {} of our {} goal.",
                pending.name,
                format_usd(pending.amount),
                format_usd(total),
                format_usd(goal)
            ),
        }
    }

    fn store_pending(&self, pending: &PendingNotification) -> Result<()> {
        if let Some(parent) = self.spool_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(self.spool_path.as_path(), serde_json::to_string(pending)?)?;
        Ok(())
    }

    fn load_pending(&self) -> Option<PendingNotification> {
        let raw = fs::read_to_string(self.spool_path.as_path()).ok()?;
        match serde_json::from_str(&raw) {
            Ok(pending) => Some(pending),
            Err(e) => {
                tracing::warn!("ignoring unreadable pending notification: {}", e);
                None
            }
        }
    }

    fn clear_pending(&self) -> Result<()> {
        if self.spool_path.exists() {
            fs::remove_file(self.spool_path.as_path())?;
        }
        Ok(())
    }
}

#[async_trait]
impl ThankYouNotifier for NotificationScheduler {
    /// Persists the pending notification and arms a deferred trigger.
    /// Returns as soon as the spool write is done.
    async fn schedule(&self, amount: f64, name: &str, email: &str, delay: Duration) -> Result<()> {
        let pending = PendingNotification::new(amount, name, email, delay.as_secs() as i64);
        self.store_pending(&pending)?;
        self.arm(pending, delay);
        Ok(())
    }

    /// Immediate delivery. The record still passes through the spool so a
    /// crash between persist and send is resumed like a deferred one.
    async fn send_now(&self, amount: f64, name: &str, email: &str) -> Result<()> {
        let pending = PendingNotification::new(amount, name, email, 0);
        self.store_pending(&pending)?;
        self.send(&pending).await
    }
}
