use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{info, warn};

use leadintel_common::{Alert, ChannelKind, DeliveryOutcome, PipelineError};

use crate::traits::DeliveryChannel;

/// Fans an alert out to the delivery channels it names.
///
/// Every attempt is awaited. A failing channel yields a failed outcome and
/// never affects the others.
#[derive(Clone, Default)]
pub struct AlertDispatcher {
    channels: HashMap<ChannelKind, Arc<dyn DeliveryChannel>>,
}

impl AlertDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a channel implementation, replacing any previous one of its kind.
    pub fn with_channel(mut self, channel: Arc<dyn DeliveryChannel>) -> Self {
        self.channels.insert(channel.kind(), channel);
        self
    }

    pub fn registered(&self) -> impl Iterator<Item = ChannelKind> + '_ {
        self.channels.keys().copied()
    }

    pub async fn dispatch(&self, alert: &Alert) -> Vec<DeliveryOutcome> {
        let attempts = alert.channels.iter().map(|&kind| async move {
            let Some(channel) = self.channels.get(&kind) else {
                warn!(alert_id = %alert.id, channel = %kind, "No delivery channel registered");
                return DeliveryOutcome::failed(kind, format!("no {kind} channel registered"));
            };
            match channel.deliver(alert).await {
                Ok(()) => DeliveryOutcome::delivered(kind),
                Err(e) => {
                    let err = PipelineError::Delivery {
                        channel: kind.to_string(),
                        message: format!("{e:#}"),
                    };
                    warn!(alert_id = %alert.id, error = %err, "Alert delivery failed");
                    DeliveryOutcome::failed(kind, err.to_string())
                }
            }
        });

        let outcomes = join_all(attempts).await;
        let delivered = outcomes.iter().filter(|o| o.delivered).count();
        info!(
            alert_id = %alert.id,
            delivered,
            failed = outcomes.len() - delivered,
            "Alert fan-out settled"
        );
        outcomes
    }
}
