use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::Duration;

use crate::api::firebase::PersistOutcome;
use crate::error::{DonationError, Result};
use crate::utils::abandon::{run_abandonable, AbandonToken};

/// Bounded wait for the remote persist step.
pub const PERSIST_TIMEOUT: Duration = Duration::from_secs(2);
/// Bounded wait for the immediate thank-you send.
pub const NOTIFY_TIMEOUT: Duration = Duration::from_secs(3);

/// Persistence seam of the flow. Implemented by the remote counter client;
/// mocked in tests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DonationPersistence: Send + Sync {
    async fn record_donation(
        &self,
        amount: f64,
        name: &str,
        email: &str,
        token: AbandonToken,
    ) -> PersistOutcome;
}

/// Notification seam of the flow. Implemented by the scheduler.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ThankYouNotifier: Send + Sync {
    /// Deferred delivery; persists the pending message and returns.
    async fn schedule(&self, amount: f64, name: &str, email: &str, delay: Duration) -> Result<()>;
    /// Immediate delivery.
    async fn send_now(&self, amount: f64, name: &str, email: &str) -> Result<()>;
}

#[derive(Debug, Clone)]
struct ValidDonation {
    amount: f64,
    name: String,
    email: String,
}

/// Orchestrates a submitted donation:
/// `Idle → Validating → Persisting(2s) → Notifying(3s) → Redirecting`.
///
/// Only validation can refuse. Persisting and notifying run under bounded
/// waits whose losers are abandoned, never rolled back, and the payment
/// redirect is produced no matter how they fared.
pub struct DonationFlow {
    store: Arc<dyn DonationPersistence>,
    notifier: Arc<dyn ThankYouNotifier>,
    redirect_url: String,
    thank_you_delay: Duration,
}

fn validate(amount: Option<f64>, name: &str, email: &str) -> Result<ValidDonation> {
    let amount =
        amount.ok_or_else(|| DonationError::Validation("amount must be a number".into()))?;
    if !amount.is_finite() || amount <= 0.0 {
        return Err(DonationError::Validation("amount must be positive".into()));
    }
    if name.trim().is_empty() {
        return Err(DonationError::Validation("name must not be empty".into()));
    }
    if email.trim().is_empty() {
        return Err(DonationError::Validation("email must not be empty".into()));
    }
    Ok(ValidDonation {
        amount,
        name: name.to_string(),
        email: email.to_string(),
    })
}

impl DonationFlow {
    pub fn new(
        store: Arc<dyn DonationPersistence>,
        notifier: Arc<dyn ThankYouNotifier>,
        redirect_url: &str,
        thank_you_delay: Duration,
    ) -> Self {
        Self {
            store,
            notifier,
            redirect_url: redirect_url.to_string(),
            thank_you_delay,
        }
    }

    /// Runs the flow for one submission. Returns the payment redirect URL,
    /// or a validation error, the only error a donor ever sees.
    pub async fn submit(&self, amount: Option<f64>, name: &str, email: &str) -> Result<String> {
        let donation = validate(amount, name, email)?;

        // Persisting. The loser of the race keeps running in the background;
        // the token stops it from touching the shared total afterwards.
        let token = AbandonToken::default();
        let store = self.store.clone();
        let d = donation.clone();
        let persist_token = token.clone();
        let outcome = run_abandonable(PERSIST_TIMEOUT, token, async move {
            store
                .record_donation(d.amount, &d.name, &d.email, persist_token)
                .await
        })
        .await;
        match outcome {
            Some(result) => tracing::info!("donation of {} persisted: {:?}", donation.amount, result),
            None => tracing::warn!(
                "persisting timed out after {}s, continuing",
                PERSIST_TIMEOUT.as_secs()
            ),
        }

        // Notifying: hand off to the spool when a delay is configured,
        // otherwise send right away under its own bounded wait.
        if self.thank_you_delay > Duration::ZERO {
            if let Err(e) = self
                .notifier
                .schedule(
                    donation.amount,
                    &donation.name,
                    &donation.email,
                    self.thank_you_delay,
                )
                .await
            {
                tracing::error!("could not queue thank-you email: {}", e);
            }
        } else {
            let notifier = self.notifier.clone();
            let d = donation.clone();
            match run_abandonable(NOTIFY_TIMEOUT, AbandonToken::default(), async move {
                notifier.send_now(d.amount, &d.name, &d.email).await
            })
            .await
            {
                Some(Ok(())) => {}
                Some(Err(e)) => tracing::error!("thank-you email failed: {}", e),
                None => tracing::warn!(
                    "thank-you email timed out after {}s, continuing",
                    NOTIFY_TIMEOUT.as_secs()
                ),
            }
        }

        // Redirecting: unconditional once validation has passed.
        Ok(self.redirect_url.clone())
    }
}
