pub mod webhook;

pub use webhook::{WebhookNotifier, WebhookPayload};

use crate::pipeline::RunSummary;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),

    #[error("notification request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("notification endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to read notification response: {0}")]
    Body(#[source] reqwest::Error),

    #[error("failed to encode notification payload: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Signals that a run finished. Delivery is best effort.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, summary: &RunSummary) -> Result<(), NotificationError>;
}
