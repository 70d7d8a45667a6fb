use async_trait::async_trait;
use serde_json::json;
use tracing::warn;

use leadintel_common::{Alert, AlertSeverity, ChannelKind};

use crate::traits::DeliveryChannel;

/// Slack incoming-webhook delivery for the chat channel.
pub struct SlackWebhookChannel {
    webhook_url: String,
    http: reqwest::Client,
}

impl SlackWebhookChannel {
    pub fn new(webhook_url: String) -> Self {
        Self {
            webhook_url,
            http: reqwest::Client::new(),
        }
    }

    fn severity_emoji(severity: AlertSeverity) -> &'static str {
        match severity {
            AlertSeverity::Info => ":information_source:",
            AlertSeverity::Warning => ":warning:",
            AlertSeverity::Critical => ":rotating_light:",
        }
    }

    pub fn render(alert: &Alert) -> String {
        format!(
            "{} *{}*\n*Severity:* {}\n*Type:* {}\n*Competitor:* `{}`\n\n{}",
            Self::severity_emoji(alert.severity),
            alert.title,
            alert.severity,
            alert.alert_type,
            alert.competitor_id(),
            alert.message,
        )
    }
}

#[async_trait]
impl DeliveryChannel for SlackWebhookChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Chat
    }

    async fn deliver(&self, alert: &Alert) -> anyhow::Result<()> {
        let payload = json!({
            "text": Self::render(alert),
            "unfurl_links": false,
        });

        let resp = self
            .http
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "Slack webhook returned non-success");
            anyhow::bail!("Slack webhook returned {status}");
        }

        Ok(())
    }
}
