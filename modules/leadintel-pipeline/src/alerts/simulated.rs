use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use leadintel_common::{ChangeDetails, ChangeType, CompetitorChange, MonitorConfig};

use crate::traits::ChangeSource;

/// Random stand-in for real competitor scraping.
///
/// Each tick, each watched competitor has `probability` chance of one
/// synthetic change of a type its monitor watches.
pub struct SimulatedChangeSource {
    rng: Mutex<StdRng>,
    probability: f64,
}

impl SimulatedChangeSource {
    pub fn new(probability: f64) -> Self {
        Self {
            rng: Mutex::new(StdRng::from_os_rng()),
            probability: sanitize_probability(probability),
        }
    }

    /// Deterministic sequence for tests and demos.
    pub fn seeded(probability: f64, seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            probability: sanitize_probability(probability),
        }
    }
}

/// Clamp to [0, 1]; NaN and infinities disable the source.
fn sanitize_probability(probability: f64) -> f64 {
    if probability.is_finite() {
        probability.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

const ALL_TYPES: [ChangeType; 7] = [
    ChangeType::PricingChange,
    ChangeType::WebsiteContent,
    ChangeType::ProductLaunch,
    ChangeType::NewAdCampaign,
    ChangeType::AdSpendShift,
    ChangeType::RatingShift,
    ChangeType::ProfileUpdate,
];

#[async_trait]
impl ChangeSource for SimulatedChangeSource {
    async fn detect(&self, monitor: &MonitorConfig) -> Result<Vec<CompetitorChange>> {
        let candidates: Vec<ChangeType> = ALL_TYPES
            .into_iter()
            .filter(|t| monitor.watches(t.kind()))
            .collect();
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if !rng.random_bool(self.probability) {
            return Ok(Vec::new());
        }

        let change_type = candidates[rng.random_range(0..candidates.len())];
        let impact_score = (rng.random_range(30..=100) as f64) / 10.0;
        Ok(vec![CompetitorChange {
            competitor_id: monitor.competitor_id.clone(),
            competitor_name: monitor.competitor_name.clone(),
            change_type,
            impact_score,
            details: ChangeDetails::Simulated {
                note: format!("simulated {}", change_type.label()),
            },
            detected_at: Utc::now(),
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadintel_common::DetectionKind;

    #[tokio::test]
    async fn never_and_always() {
        let monitor = MonitorConfig::new("acme", "Acme");
        assert!(SimulatedChangeSource::seeded(0.0, 7)
            .detect(&monitor)
            .await
            .unwrap()
            .is_empty());

        let source = SimulatedChangeSource::seeded(1.0, 7);
        for _ in 0..20 {
            let changes = source.detect(&monitor).await.unwrap();
            assert_eq!(changes.len(), 1);
            let change = &changes[0];
            assert!(change.validate().is_ok());
            assert_eq!(change.competitor_id, "acme");
        }
    }

    #[tokio::test]
    async fn non_finite_probability_is_quiet() {
        let monitor = MonitorConfig::new("acme", "Acme");
        for probability in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let source = SimulatedChangeSource::seeded(probability, 7);
            assert!(source.detect(&monitor).await.unwrap().is_empty());
        }
        assert!(!SimulatedChangeSource::seeded(3.0, 7)
            .detect(&monitor)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn respects_monitor_types() {
        let monitor = MonitorConfig {
            monitor_types: vec![DetectionKind::BusinessProfile],
            ..MonitorConfig::new("acme", "Acme")
        };
        let source = SimulatedChangeSource::seeded(1.0, 42);
        for _ in 0..20 {
            let changes = source.detect(&monitor).await.unwrap();
            assert_eq!(changes[0].change_type.kind(), DetectionKind::BusinessProfile);
        }

        let nothing = MonitorConfig {
            monitor_types: vec![],
            ..MonitorConfig::new("acme", "Acme")
        };
        assert!(source.detect(&nothing).await.unwrap().is_empty());
    }
}
