use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::json;

use crate::error::{DonationError, Result};

const SEND_URL: &str = "https://api.emailjs.com/api/v1.0/email/send";

/// Template parameters for the thank-you email, as the mail template
/// expects them: recipient, formatted amounts and a free-text message.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ThankYouParams {
    pub to_name: String,
    pub to_email: String,
    pub amount: String,
    pub total_donated: String,
    pub goal: String,
    pub message: String,
}

/// Outbound email seam. The scheduler talks to this instead of the concrete
/// client so delivery can be faked in tests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ThankYouEmailer: Send + Sync {
    async fn send(&self, params: &ThankYouParams) -> Result<()>;
}

/// Transactional-email client: one template, one service, addressed by the
/// identifiers the provider hands out.
pub struct EmailJsClient {
    http: Client,
    service_id: String,
    template_id: String,
    public_key: String,
}

impl EmailJsClient {
    pub fn from_env() -> Self {
        Self {
            http: Client::new(),
            service_id: std::env::var("EMAILJS_SERVICE_ID").expect("EMAILJS_SERVICE_ID must be set"),
            template_id: std::env::var("EMAILJS_TEMPLATE_ID")
                .expect("EMAILJS_TEMPLATE_ID must be set"),
            public_key: std::env::var("EMAILJS_PUBLIC_KEY").expect("EMAILJS_PUBLIC_KEY must be set"),
        }
    }
}

#[async_trait]
impl ThankYouEmailer for EmailJsClient {
    async fn send(&self, params: &ThankYouParams) -> Result<()> {
        let body = json!({
            "service_id": self.service_id,
            "template_id": self.template_id,
            "user_id": self.public_key,
            "template_params": params,
        });

        let response = self
            .http
            .post(SEND_URL)
            .json(&body)
            .send()
            .await
            .map_err(|e| DonationError::NotificationSend(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(DonationError::NotificationSend(format!(
                "email service returned {}: {}",
                status, detail
            )));
        }
        tracing::info!("thank-you email sent to {}", params.to_email);
        Ok(())
    }
}
