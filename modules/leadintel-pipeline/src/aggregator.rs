use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use leadintel_common::{
    Enrichment, Identity, LeadCandidate, LeadProfile, PipelineResult, Provenance,
};

use crate::traits::LeadSourceChannel;

/// A lead as one origin channel reported it, before normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSighting {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    /// Channel-reported score; absent means 0.
    #[serde(default)]
    pub intent_score: Option<i64>,
    #[serde(default)]
    pub company_size: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub source_id: Option<String>,
    #[serde(default)]
    pub extra: BTreeMap<String, serde_json::Value>,
    pub provenance: Provenance,
}

impl RawSighting {
    pub fn new(provenance: Provenance) -> Self {
        Self {
            email: None,
            phone: None,
            name: None,
            company: None,
            title: None,
            location: None,
            intent_score: None,
            company_size: None,
            industry: None,
            website: None,
            tags: Vec::new(),
            source_id: None,
            extra: BTreeMap::new(),
            provenance,
        }
    }

    /// Canonical candidate: normalized identity, blank strings dropped, score range-checked.
    pub fn normalize(self) -> PipelineResult<LeadCandidate> {
        let identity = Identity::new(self.email.as_deref(), self.phone.as_deref());
        let profile = LeadProfile {
            name: non_blank(self.name),
            company: non_blank(self.company),
            title: non_blank(self.title),
            location: non_blank(self.location),
        };
        let enrichment = Enrichment {
            company_size: non_blank(self.company_size),
            industry: non_blank(self.industry),
            website: non_blank(self.website),
            extra: self.extra,
            ..Default::default()
        };

        let mut candidate = LeadCandidate::new(identity, self.provenance)
            .with_score(self.intent_score.unwrap_or(0))?
            .with_profile(profile)
            .with_enrichment(enrichment);
        if let Some(source_id) = non_blank(self.source_id) {
            candidate = candidate.with_source_id(source_id);
        }
        for tag in self.tags {
            let tag = tag.trim();
            if !tag.is_empty() {
                candidate = candidate.with_tag(tag.to_lowercase());
            }
        }

        candidate.validate()?;
        Ok(candidate)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Pulls sightings from every registered channel and normalizes them.
///
/// A channel that fails to fetch, or a sighting that fails validation, is
/// logged and skipped; the remaining channels still contribute.
#[derive(Clone, Default)]
pub struct SourceAggregator {
    channels: Vec<Arc<dyn LeadSourceChannel>>,
}

impl SourceAggregator {
    pub fn new(channels: Vec<Arc<dyn LeadSourceChannel>>) -> Self {
        Self { channels }
    }

    pub fn with_channel(mut self, channel: Arc<dyn LeadSourceChannel>) -> Self {
        self.channels.push(channel);
        self
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub async fn collect(&self) -> Vec<LeadCandidate> {
        let fetches = self.channels.iter().map(|c| async move {
            let channel = c.channel();
            (channel, c.fetch().await)
        });

        let mut candidates = Vec::new();
        for (channel, fetched) in join_all(fetches).await {
            let sightings = match fetched {
                Ok(sightings) => sightings,
                Err(e) => {
                    warn!(channel = %channel, error = %e, "Lead source fetch failed, skipping");
                    continue;
                }
            };

            let total = sightings.len();
            for sighting in sightings {
                match sighting.normalize() {
                    Ok(candidate) => candidates.push(candidate),
                    Err(e) => warn!(channel = %channel, error = %e, "Dropping invalid sighting"),
                }
            }
            info!(channel = %channel, sightings = total, "Collected lead sightings");
        }
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadintel_common::{PipelineError, SourceChannel};

    fn locator() -> Provenance {
        Provenance::LocatorSearch {
            query: "emergency plumber".to_string(),
            location: Some("Austin, TX".to_string()),
            rank: Some(2),
        }
    }

    #[test]
    fn normalization_cleans_identity_and_blank_fields() {
        let mut raw = RawSighting::new(locator());
        raw.email = Some("  Jo@Plumbing.COM ".to_string());
        raw.phone = Some("(512) 555-0101".to_string());
        raw.company = Some("   ".to_string());
        raw.company_size = Some("11-50".to_string());
        raw.tags = vec![" Urgent ".to_string(), "".to_string()];
        raw.intent_score = Some(64);

        let candidate = raw.normalize().unwrap();
        assert_eq!(candidate.identity.email.as_deref(), Some("jo@plumbing.com"));
        assert_eq!(candidate.identity.phone.as_deref(), Some("5125550101"));
        assert!(candidate.profile.company.is_none());
        assert!(candidate.enrichment.has_company_size());
        assert_eq!(candidate.intent_score, 64);
        assert_eq!(candidate.tags.len(), 1);
        assert!(candidate.tags.contains("urgent"));
        assert_eq!(candidate.channel(), SourceChannel::LocatorSearch);
    }

    #[test]
    fn sighting_without_identity_is_invalid() {
        let mut raw = RawSighting::new(locator());
        raw.email = Some(" ".to_string());
        assert!(matches!(raw.normalize(), Err(PipelineError::Validation(_))));
    }

    #[test]
    fn out_of_range_score_is_invalid() {
        let mut raw = RawSighting::new(locator());
        raw.email = Some("a@x.com".to_string());
        raw.intent_score = Some(140);
        assert!(matches!(raw.normalize(), Err(PipelineError::Validation(_))));
    }

    #[test]
    fn explicit_source_id_is_kept() {
        let mut raw = RawSighting::new(locator());
        raw.phone = Some("+44 20 7946 0000".to_string());
        raw.source_id = Some("loc-991".to_string());
        let candidate = raw.normalize().unwrap();
        assert_eq!(candidate.source_id, "loc-991");
        assert_eq!(candidate.identity.phone.as_deref(), Some("+442079460000"));
    }

    #[test]
    fn sighting_deserializes_with_defaults() {
        let raw: RawSighting = serde_json::from_value(serde_json::json!({
            "email": "b@y.com",
            "provenance": {"channel": "referral", "referrer": "partner-co"}
        }))
        .unwrap();
        assert!(raw.tags.is_empty());
        assert_eq!(raw.normalize().unwrap().intent_score, 0);
    }
}
