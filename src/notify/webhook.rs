use super::{NotificationError, Notifier};
use crate::config::NotifyConfig;
use crate::pipeline::RunSummary;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Incoming-webhook message body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub text: String,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_emoji: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
    pub channel: String,
}

/// Posts the completion message as a `payload=<json>` form to a webhook URL.
pub struct WebhookNotifier {
    url: String,
    username: String,
    channel: String,
    icon_emoji: Option<String>,
    icon_url: Option<String>,
    text: Option<String>,
    client: Client,
}

impl WebhookNotifier {
    pub fn new(config: &NotifyConfig) -> Result<Self, NotificationError> {
        let client = Client::builder().build().map_err(NotificationError::Build)?;
        Ok(Self {
            url: config.webhook_url.clone(),
            username: config.username.clone(),
            channel: config.channel.clone(),
            icon_emoji: config.icon_emoji.clone(),
            icon_url: config.icon_url.clone(),
            text: config.text.clone(),
            client,
        })
    }

    pub fn payload(&self, summary: &RunSummary) -> WebhookPayload {
        let text = self.text.clone().unwrap_or_else(|| {
            format!(
                "Log download finished: {} tags, {} events ({} to {})",
                summary.tags,
                summary.events,
                summary.window.from_param(),
                summary.window.until_param()
            )
        });
        WebhookPayload {
            text,
            username: self.username.clone(),
            icon_emoji: self.icon_emoji.clone(),
            icon_url: self.icon_url.clone(),
            channel: self.channel.clone(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, summary: &RunSummary) -> Result<(), NotificationError> {
        let payload = serde_json::to_string(&self.payload(summary))?;

        let response = self
            .client
            .post(&self.url)
            .form(&[("payload", payload)])
            .send()
            .await
            .map_err(|e| NotificationError::Transport(e.without_url()))?;

        let status = response.status();
        // Drain the body either way so the connection can be reused.
        let body = response
            .text()
            .await
            .map_err(|e| NotificationError::Body(e.without_url()))?;
        if !status.is_success() {
            return Err(NotificationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(status = status.as_u16(), "Webhook accepted notification");
        Ok(())
    }
}
