pub mod log;
pub mod slack;

use std::sync::Arc;

use tracing::info;

use leadintel_common::{ChannelKind, Config};

pub use log::LogChannel;
pub use slack::SlackWebhookChannel;

use crate::traits::DeliveryChannel;

/// Delivery channels from configuration: Slack for chat when a webhook is
/// set, the log for every other kind.
pub fn channels_from_config(config: &Config) -> Vec<Arc<dyn DeliveryChannel>> {
    let chat: Arc<dyn DeliveryChannel> = match &config.slack_webhook_url_alerts {
        Some(url) => {
            info!("Slack alert delivery enabled");
            Arc::new(SlackWebhookChannel::new(url.clone()))
        }
        None => {
            info!("No SLACK_WEBHOOK_URL set, chat alerts go to the log");
            Arc::new(LogChannel::new(ChannelKind::Chat))
        }
    };

    vec![
        chat,
        Arc::new(LogChannel::new(ChannelKind::Email)),
        Arc::new(LogChannel::new(ChannelKind::Sms)),
        Arc::new(LogChannel::new(ChannelKind::Webhook)),
    ]
}
