use async_trait::async_trait;
use tracing::info;

use leadintel_common::{Alert, ChannelKind};

use crate::traits::DeliveryChannel;

/// Writes alerts to the tracing log. Stands in for channels with no
/// configured integration.
pub struct LogChannel {
    kind: ChannelKind,
}

impl LogChannel {
    pub fn new(kind: ChannelKind) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl DeliveryChannel for LogChannel {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    async fn deliver(&self, alert: &Alert) -> anyhow::Result<()> {
        info!(
            channel = %self.kind,
            alert_id = %alert.id,
            severity = %alert.severity,
            competitor_id = alert.competitor_id(),
            title = alert.title.as_str(),
            "Alert"
        );
        Ok(())
    }
}
