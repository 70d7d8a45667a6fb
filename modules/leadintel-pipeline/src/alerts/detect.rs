//! Diff-based competitor change detection.
//!
//! Each detector compares two snapshots of one observable surface (website,
//! ads, business profile) and reports at most one change with an impact score
//! in [0, 10]. `SnapshotChangeSource` keeps the last snapshot per competitor and
//! runs the detectors the monitor enables.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use leadintel_common::{
    ChangeDetails, ChangeType, CompetitorChange, DetectionKind, MonitorConfig, MAX_IMPACT_SCORE,
};

use crate::traits::{ChangeSource, SnapshotProvider};

/// Rating moves smaller than this are noise.
const RATING_SHIFT_MIN: f64 = 0.3;
/// Spend moves smaller than this percentage are noise.
const SPEND_SHIFT_MIN_PCT: f64 = 25.0;
const REVIEW_BURST_MIN: u32 = 10;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WebsiteSnapshot {
    /// Page path to content fingerprint.
    pub pages: BTreeMap<String, String>,
    pub pricing: Option<String>,
    pub headline: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdSnapshot {
    pub active_ads: BTreeSet<String>,
    pub monthly_spend: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileSnapshot {
    pub rating: f64,
    pub review_count: u32,
    pub fields: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompetitorSnapshot {
    pub website: Option<WebsiteSnapshot>,
    pub ads: Option<AdSnapshot>,
    pub profile: Option<ProfileSnapshot>,
}

/// A detector hit before it is attached to a competitor.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub change_type: ChangeType,
    pub impact_score: f64,
    pub details: ChangeDetails,
}

impl Detection {
    fn new(change_type: ChangeType, impact: f64, details: ChangeDetails) -> Self {
        Self {
            change_type,
            impact_score: round_impact(impact),
            details,
        }
    }

    pub fn into_change(self, monitor: &MonitorConfig, detected_at: DateTime<Utc>) -> CompetitorChange {
        CompetitorChange {
            competitor_id: monitor.competitor_id.clone(),
            competitor_name: monitor.competitor_name.clone(),
            change_type: self.change_type,
            impact_score: self.impact_score,
            details: self.details,
            detected_at,
        }
    }
}

fn round_impact(impact: f64) -> f64 {
    ((impact * 10.0).round() / 10.0).clamp(0.0, MAX_IMPACT_SCORE)
}

pub fn diff_website(prev: &WebsiteSnapshot, curr: &WebsiteSnapshot) -> Option<Detection> {
    let added: Vec<String> = curr
        .pages
        .keys()
        .filter(|p| !prev.pages.contains_key(*p))
        .cloned()
        .collect();
    let removed: Vec<String> = prev
        .pages
        .keys()
        .filter(|p| !curr.pages.contains_key(*p))
        .cloned()
        .collect();
    let changed: Vec<String> = curr
        .pages
        .iter()
        .filter(|(path, print)| prev.pages.get(*path).is_some_and(|old| old != *print))
        .map(|(path, _)| path.clone())
        .collect();
    let pricing_changed = prev.pricing != curr.pricing;
    let headline_changed = prev.headline != curr.headline;

    let touched = added.len() + removed.len() + changed.len();
    if touched == 0 && !pricing_changed && !headline_changed {
        return None;
    }

    let (change_type, impact) = if pricing_changed {
        (ChangeType::PricingChange, 7.5 + 0.3 * touched.min(5) as f64)
    } else if headline_changed && !added.is_empty() {
        (ChangeType::ProductLaunch, 8.0 + 0.2 * added.len().min(5) as f64)
    } else {
        let breadth = touched + usize::from(headline_changed);
        (ChangeType::WebsiteContent, (3.0 + 0.5 * breadth as f64).min(6.0))
    };

    Some(Detection::new(
        change_type,
        impact,
        ChangeDetails::Website {
            changed_pages: changed,
            added_pages: added,
            removed_pages: removed,
            pricing_changed,
            headline_changed,
        },
    ))
}

pub fn diff_ads(prev: &AdSnapshot, curr: &AdSnapshot) -> Option<Detection> {
    let new_ads: Vec<String> = curr.active_ads.difference(&prev.active_ads).cloned().collect();
    let retired_ads: Vec<String> = prev.active_ads.difference(&curr.active_ads).cloned().collect();
    let spend_change_pct = if prev.monthly_spend > 0.0 {
        (curr.monthly_spend - prev.monthly_spend) / prev.monthly_spend * 100.0
    } else if curr.monthly_spend > 0.0 {
        100.0
    } else {
        0.0
    };

    let (change_type, impact) = if !new_ads.is_empty() {
        (ChangeType::NewAdCampaign, (5.0 + new_ads.len() as f64).min(9.5))
    } else if spend_change_pct.abs() >= SPEND_SHIFT_MIN_PCT {
        (
            ChangeType::AdSpendShift,
            (4.0 + spend_change_pct.abs() / SPEND_SHIFT_MIN_PCT).min(9.0),
        )
    } else {
        return None;
    };

    Some(Detection::new(
        change_type,
        impact,
        ChangeDetails::AdCampaign {
            new_ads,
            retired_ads,
            spend_change_pct,
        },
    ))
}

pub fn diff_profile(prev: &ProfileSnapshot, curr: &ProfileSnapshot) -> Option<Detection> {
    let rating_delta = curr.rating - prev.rating;
    let new_reviews = curr.review_count.saturating_sub(prev.review_count);
    let fields_changed: Vec<String> = curr
        .fields
        .iter()
        .filter(|(k, v)| prev.fields.get(*k) != Some(*v))
        .map(|(k, _)| k.clone())
        .chain(
            prev.fields
                .keys()
                .filter(|k| !curr.fields.contains_key(*k))
                .cloned(),
        )
        .collect();

    let (change_type, impact) = if rating_delta.abs() >= RATING_SHIFT_MIN {
        (ChangeType::RatingShift, (5.0 + rating_delta.abs() * 5.0).min(9.0))
    } else if !fields_changed.is_empty() || new_reviews >= REVIEW_BURST_MIN {
        (
            ChangeType::ProfileUpdate,
            (3.0 + 0.5 * fields_changed.len() as f64 + 0.1 * new_reviews.min(20) as f64).min(6.0),
        )
    } else {
        return None;
    };

    Some(Detection::new(
        change_type,
        impact,
        ChangeDetails::BusinessProfile {
            rating_delta,
            new_reviews,
            fields_changed,
        },
    ))
}

/// Run the detectors a monitor enables over two snapshots.
pub fn diff_snapshots(
    monitor: &MonitorConfig,
    prev: &CompetitorSnapshot,
    curr: &CompetitorSnapshot,
) -> Vec<Detection> {
    let mut found = Vec::new();
    if monitor.watches(DetectionKind::Website) {
        if let (Some(a), Some(b)) = (&prev.website, &curr.website) {
            found.extend(diff_website(a, b));
        }
    }
    if monitor.watches(DetectionKind::AdCampaign) {
        if let (Some(a), Some(b)) = (&prev.ads, &curr.ads) {
            found.extend(diff_ads(a, b));
        }
    }
    if monitor.watches(DetectionKind::BusinessProfile) {
        if let (Some(a), Some(b)) = (&prev.profile, &curr.profile) {
            found.extend(diff_profile(a, b));
        }
    }
    found
}

/// Change source that diffs successive provider snapshots.
///
/// The first snapshot of a competitor is a baseline and yields nothing.
pub struct SnapshotChangeSource {
    provider: Arc<dyn SnapshotProvider>,
    previous: Mutex<HashMap<String, CompetitorSnapshot>>,
}

impl SnapshotChangeSource {
    pub fn new(provider: Arc<dyn SnapshotProvider>) -> Self {
        Self {
            provider,
            previous: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl ChangeSource for SnapshotChangeSource {
    async fn detect(&self, monitor: &MonitorConfig) -> Result<Vec<CompetitorChange>> {
        let current = self.provider.snapshot(monitor).await?;
        let previous = self
            .previous
            .lock()
            .await
            .insert(monitor.competitor_id.clone(), current.clone());

        let Some(previous) = previous else {
            debug!(competitor_id = %monitor.competitor_id, "Stored baseline snapshot");
            return Ok(Vec::new());
        };

        let now = Utc::now();
        Ok(diff_snapshots(monitor, &previous, &current)
            .into_iter()
            .map(|d| d.into_change(monitor, now))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site(pages: &[(&str, &str)], pricing: &str, headline: &str) -> WebsiteSnapshot {
        WebsiteSnapshot {
            pages: pages
                .iter()
                .map(|(p, h)| (p.to_string(), h.to_string()))
                .collect(),
            pricing: Some(pricing.to_string()),
            headline: Some(headline.to_string()),
        }
    }

    #[test]
    fn identical_site_has_no_change() {
        let a = site(&[("/", "h1")], "$99", "Fast plumbing");
        assert!(diff_website(&a, &a.clone()).is_none());
    }

    #[test]
    fn pricing_change_is_high_impact() {
        let a = site(&[("/", "h1"), ("/pricing", "p1")], "$99", "Fast plumbing");
        let b = site(&[("/", "h1"), ("/pricing", "p2")], "$79", "Fast plumbing");
        let d = diff_website(&a, &b).unwrap();
        assert_eq!(d.change_type, ChangeType::PricingChange);
        assert_eq!(d.impact_score, 7.8);
        match d.details {
            ChangeDetails::Website {
                changed_pages,
                pricing_changed,
                ..
            } => {
                assert_eq!(changed_pages, vec!["/pricing".to_string()]);
                assert!(pricing_changed);
            }
            other => panic!("unexpected details {other:?}"),
        }
    }

    #[test]
    fn new_pages_with_new_headline_look_like_a_launch() {
        let a = site(&[("/", "h1")], "$99", "Fast plumbing");
        let b = site(&[("/", "h2"), ("/smart-leak-detector", "x")], "$99", "Introducing LeakGuard");
        let d = diff_website(&a, &b).unwrap();
        assert_eq!(d.change_type, ChangeType::ProductLaunch);
        assert_eq!(d.impact_score, 8.2);
    }

    #[test]
    fn copy_edits_are_low_impact() {
        let a = site(&[("/", "h1"), ("/about", "a1")], "$99", "Fast plumbing");
        let b = site(&[("/", "h1"), ("/about", "a2")], "$99", "Fast plumbing");
        let d = diff_website(&a, &b).unwrap();
        assert_eq!(d.change_type, ChangeType::WebsiteContent);
        assert!(d.impact_score < 6.5);
    }

    #[test]
    fn ad_diff_prefers_new_campaigns_over_spend() {
        let prev = AdSnapshot {
            active_ads: ["a1".to_string()].into(),
            monthly_spend: 1000.0,
        };
        let curr = AdSnapshot {
            active_ads: ["a1".to_string(), "a2".to_string(), "a3".to_string()].into(),
            monthly_spend: 3000.0,
        };
        let d = diff_ads(&prev, &curr).unwrap();
        assert_eq!(d.change_type, ChangeType::NewAdCampaign);
        assert_eq!(d.impact_score, 7.0);

        let spend_only = AdSnapshot {
            active_ads: prev.active_ads.clone(),
            monthly_spend: 1500.0,
        };
        let d = diff_ads(&prev, &spend_only).unwrap();
        assert_eq!(d.change_type, ChangeType::AdSpendShift);
        assert_eq!(d.impact_score, 6.0);

        let noise = AdSnapshot {
            active_ads: prev.active_ads.clone(),
            monthly_spend: 1100.0,
        };
        assert!(diff_ads(&prev, &noise).is_none());
    }

    #[test]
    fn profile_diff_detects_rating_shift() {
        let prev = ProfileSnapshot {
            rating: 4.1,
            review_count: 120,
            fields: BTreeMap::new(),
        };
        let curr = ProfileSnapshot {
            rating: 4.6,
            review_count: 131,
            fields: BTreeMap::new(),
        };
        let d = diff_profile(&prev, &curr).unwrap();
        assert_eq!(d.change_type, ChangeType::RatingShift);
        assert_eq!(d.impact_score, 7.5);
    }

    #[test]
    fn disabled_detectors_are_skipped() {
        let prev = CompetitorSnapshot {
            website: Some(site(&[("/", "h1")], "$99", "A")),
            ads: Some(AdSnapshot::default()),
            profile: None,
        };
        let curr = CompetitorSnapshot {
            website: Some(site(&[("/", "h1")], "$49", "A")),
            ads: Some(AdSnapshot {
                active_ads: ["n1".to_string()].into(),
                monthly_spend: 0.0,
            }),
            profile: None,
        };
        let monitor = MonitorConfig {
            monitor_types: vec![DetectionKind::AdCampaign],
            ..MonitorConfig::new("acme", "Acme")
        };
        let found = diff_snapshots(&monitor, &prev, &curr);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].change_type, ChangeType::NewAdCampaign);
    }
}
