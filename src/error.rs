use thiserror::Error;

pub type Result<T> = std::result::Result<T, DonationError>;

/// Failure taxonomy for the donation flow. Only `Validation` ever reaches
/// the donor; everything else is logged and the flow continues.
#[derive(Debug, Error)]
pub enum DonationError {
    #[error("remote backend unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("remote write failed: {0}")]
    RemoteWrite(String),

    #[error("invalid donation: {0}")]
    Validation(String),

    #[error("thank-you email failed: {0}")]
    NotificationSend(String),

    #[error("local cache io: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}
