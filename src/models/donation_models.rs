use chrono::Utc;
use serde::{Deserialize, Serialize};

/// One persisted donation. Appended to the remote list under a generated
/// key; never updated or deleted. There is no uniqueness constraint, so a
/// duplicate submission produces a duplicate record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DonationRecord {
    pub amount: f64,
    pub name: String,
    pub email: String,
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

impl DonationRecord {
    pub fn new(amount: f64, name: &str, email: &str) -> Self {
        let now = Utc::now();
        Self {
            amount,
            name: name.to_string(),
            email: email.to_string(),
            timestamp: now.timestamp(),
            date: Some(now.to_rfc3339()),
        }
    }
}

/// A thank-you message queued for deferred or immediate delivery. Stored in
/// a single spool slot, so a second pending write overwrites the first.
/// Deleted on successful send; left in place on failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingNotification {
    pub amount: f64,
    pub name: String,
    pub email: String,
    pub timestamp: i64,
    pub send_at: i64,
}

impl PendingNotification {
    pub fn new(amount: f64, name: &str, email: &str, delay_secs: i64) -> Self {
        let now = Utc::now().timestamp();
        Self {
            amount,
            name: name.to_string(),
            email: email.to_string(),
            timestamp: now,
            send_at: now + delay_secs,
        }
    }
}
