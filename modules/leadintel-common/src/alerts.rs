use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{PipelineError, PipelineResult};

pub const MAX_IMPACT_SCORE: f64 = 10.0;
/// Impact at or above which an alert is critical.
pub const CRITICAL_IMPACT: f64 = 8.5;
/// Impact at or above which an alert is a warning.
pub const WARNING_IMPACT: f64 = 6.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

impl AlertSeverity {
    pub fn from_impact(impact_score: f64) -> Self {
        if impact_score >= CRITICAL_IMPACT {
            Self::Critical
        } else if impact_score >= WARNING_IMPACT {
            Self::Warning
        } else {
            Self::Info
        }
    }
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Which diff produced a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionKind {
    Website,
    AdCampaign,
    BusinessProfile,
}

impl fmt::Display for DetectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Website => write!(f, "website"),
            Self::AdCampaign => write!(f, "ad_campaign"),
            Self::BusinessProfile => write!(f, "business_profile"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    PricingChange,
    WebsiteContent,
    NewAdCampaign,
    AdSpendShift,
    RatingShift,
    ProfileUpdate,
    ProductLaunch,
}

impl ChangeType {
    pub fn kind(&self) -> DetectionKind {
        match self {
            Self::PricingChange | Self::WebsiteContent | Self::ProductLaunch => {
                DetectionKind::Website
            }
            Self::NewAdCampaign | Self::AdSpendShift => DetectionKind::AdCampaign,
            Self::RatingShift | Self::ProfileUpdate => DetectionKind::BusinessProfile,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::PricingChange => "pricing change",
            Self::WebsiteContent => "website content change",
            Self::NewAdCampaign => "new ad campaign",
            Self::AdSpendShift => "ad spend shift",
            Self::RatingShift => "rating shift",
            Self::ProfileUpdate => "business profile update",
            Self::ProductLaunch => "product launch",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PricingChange => write!(f, "pricing_change"),
            Self::WebsiteContent => write!(f, "website_content"),
            Self::NewAdCampaign => write!(f, "new_ad_campaign"),
            Self::AdSpendShift => write!(f, "ad_spend_shift"),
            Self::RatingShift => write!(f, "rating_shift"),
            Self::ProfileUpdate => write!(f, "profile_update"),
            Self::ProductLaunch => write!(f, "product_launch"),
        }
    }
}

/// What a detector observed, one variant per detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "detector", rename_all = "snake_case")]
pub enum ChangeDetails {
    Website {
        changed_pages: Vec<String>,
        added_pages: Vec<String>,
        removed_pages: Vec<String>,
        pricing_changed: bool,
        headline_changed: bool,
    },
    AdCampaign {
        new_ads: Vec<String>,
        retired_ads: Vec<String>,
        spend_change_pct: f64,
    },
    BusinessProfile {
        rating_delta: f64,
        new_reviews: u32,
        fields_changed: Vec<String>,
    },
    Simulated {
        note: String,
    },
}

/// A detected competitor change. Not necessarily persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetitorChange {
    pub competitor_id: String,
    pub competitor_name: String,
    pub change_type: ChangeType,
    /// Continuous severity measure in [0, 10].
    pub impact_score: f64,
    pub details: ChangeDetails,
    pub detected_at: DateTime<Utc>,
}

impl CompetitorChange {
    pub fn validate(&self) -> PipelineResult<()> {
        if !self.impact_score.is_finite()
            || !(0.0..=MAX_IMPACT_SCORE).contains(&self.impact_score)
        {
            return Err(PipelineError::validation(format!(
                "impact score {} outside 0..=10",
                self.impact_score
            )));
        }
        if self.competitor_id.trim().is_empty() {
            return Err(PipelineError::validation("competitor id must not be empty"));
        }
        Ok(())
    }

    pub fn severity(&self) -> AlertSeverity {
        AlertSeverity::from_impact(self.impact_score)
    }
}

/// Delivery channel an alert fans out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Email,
    Chat,
    Sms,
    Webhook,
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Email => write!(f, "email"),
            Self::Chat => write!(f, "chat"),
            Self::Sms => write!(f, "sms"),
            Self::Webhook => write!(f, "webhook"),
        }
    }
}

/// Per-competitor monitoring configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub competitor_id: String,
    pub competitor_name: String,
    #[serde(default = "all_detection_kinds")]
    pub monitor_types: Vec<DetectionKind>,
    #[serde(default)]
    pub channels: Vec<ChannelKind>,
    #[serde(default)]
    pub auto_create_tasks: bool,
    #[serde(default)]
    pub auto_create_playbooks: bool,
}

fn all_detection_kinds() -> Vec<DetectionKind> {
    vec![
        DetectionKind::Website,
        DetectionKind::AdCampaign,
        DetectionKind::BusinessProfile,
    ]
}

impl MonitorConfig {
    pub fn new(competitor_id: &str, competitor_name: &str) -> Self {
        Self {
            competitor_id: competitor_id.to_string(),
            competitor_name: competitor_name.to_string(),
            monitor_types: all_detection_kinds(),
            channels: Vec::new(),
            auto_create_tasks: false,
            auto_create_playbooks: false,
        }
    }

    pub fn watches(&self, kind: DetectionKind) -> bool {
        self.monitor_types.contains(&kind)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlertData {
    CompetitorChange { change: CompetitorChange },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub alert_type: ChangeType,
    pub title: String,
    pub message: String,
    pub severity: AlertSeverity,
    pub read: bool,
    pub channels: Vec<ChannelKind>,
    pub data: AlertData,
    pub created_at: DateTime<Utc>,
}

impl Alert {
    pub fn for_change(change: &CompetitorChange, config: &MonitorConfig, now: DateTime<Utc>) -> Self {
        let severity = change.severity();
        Self {
            id: Uuid::new_v4(),
            alert_type: change.change_type,
            title: format!("{}: {}", change.competitor_name, change.change_type.label()),
            message: format!(
                "Detected {} for {} with impact {:.1}/10 ({severity})",
                change.change_type.label(),
                change.competitor_name,
                change.impact_score,
            ),
            severity,
            read: false,
            channels: config.channels.clone(),
            data: AlertData::CompetitorChange {
                change: change.clone(),
            },
            created_at: now,
        }
    }

    pub fn competitor_id(&self) -> &str {
        match &self.data {
            AlertData::CompetitorChange { change } => &change.competitor_id,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertFilter {
    pub unread_only: bool,
    pub severity: Option<AlertSeverity>,
    pub competitor_id: Option<String>,
}

impl AlertFilter {
    pub fn matches(&self, alert: &Alert) -> bool {
        (!self.unread_only || !alert.read)
            && self.severity.is_none_or(|s| alert.severity == s)
            && self
                .competitor_id
                .as_deref()
                .is_none_or(|id| alert.competitor_id() == id)
    }
}

/// Result of one delivery attempt on one channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryOutcome {
    pub channel: ChannelKind,
    pub delivered: bool,
    pub error: Option<String>,
}

impl DeliveryOutcome {
    pub fn delivered(channel: ChannelKind) -> Self {
        Self {
            channel,
            delivered: true,
            error: None,
        }
    }

    pub fn failed(channel: ChannelKind, error: impl Into<String>) -> Self {
        Self {
            channel,
            delivered: false,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(impact: f64) -> CompetitorChange {
        CompetitorChange {
            competitor_id: "acme".to_string(),
            competitor_name: "Acme Dental".to_string(),
            change_type: ChangeType::PricingChange,
            impact_score: impact,
            details: ChangeDetails::Simulated {
                note: "test".to_string(),
            },
            detected_at: Utc::now(),
        }
    }

    #[test]
    fn severity_boundaries_are_exact() {
        assert_eq!(AlertSeverity::from_impact(8.5), AlertSeverity::Critical);
        assert_eq!(AlertSeverity::from_impact(8.499), AlertSeverity::Warning);
        assert_eq!(AlertSeverity::from_impact(6.5), AlertSeverity::Warning);
        assert_eq!(AlertSeverity::from_impact(6.499), AlertSeverity::Info);
        assert_eq!(AlertSeverity::from_impact(0.0), AlertSeverity::Info);
        assert_eq!(AlertSeverity::from_impact(10.0), AlertSeverity::Critical);
    }

    #[test]
    fn impact_outside_range_fails_validation() {
        assert!(change(10.5).validate().is_err());
        assert!(change(-0.1).validate().is_err());
        assert!(change(f64::NAN).validate().is_err());
        assert!(change(10.0).validate().is_ok());
    }

    #[test]
    fn alert_copies_channels_and_severity() {
        let mut config = MonitorConfig::new("acme", "Acme Dental");
        config.channels = vec![ChannelKind::Email, ChannelKind::Chat];
        let alert = Alert::for_change(&change(9.2), &config, Utc::now());
        assert_eq!(alert.severity, AlertSeverity::Critical);
        assert_eq!(alert.channels, config.channels);
        assert!(!alert.read);
        assert_eq!(alert.competitor_id(), "acme");
    }

    #[test]
    fn filter_respects_unread_and_competitor() {
        let config = MonitorConfig::new("acme", "Acme Dental");
        let mut alert = Alert::for_change(&change(7.0), &config, Utc::now());
        let unread = AlertFilter {
            unread_only: true,
            ..Default::default()
        };
        assert!(unread.matches(&alert));
        alert.read = true;
        assert!(!unread.matches(&alert));

        let other = AlertFilter {
            competitor_id: Some("globex".to_string()),
            ..Default::default()
        };
        assert!(!other.matches(&alert));
    }

    #[test]
    fn change_type_maps_to_detector() {
        assert_eq!(ChangeType::PricingChange.kind(), DetectionKind::Website);
        assert_eq!(ChangeType::AdSpendShift.kind(), DetectionKind::AdCampaign);
        assert_eq!(ChangeType::RatingShift.kind(), DetectionKind::BusinessProfile);
    }
}
