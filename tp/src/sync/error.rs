//! Sync error types

use thiserror::Error;

/// Errors from the remote sync collaborator
///
/// Never fatal: they are reported to the sync observer and local state stays
/// usable.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Remote rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Subscription failed: {0}")]
    Subscribe(String),

    #[error("Subscription cancelled by remote: {0}")]
    Cancelled(String),

    #[error("Malformed snapshot: {0}")]
    Malformed(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Sync backend disabled")]
    Disabled,
}
