use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};

use uuid::Uuid;

use leadintel_common::{
    Identity, Lead, LeadCandidate, LeadSource, PipelineError, PipelineResult, RepoResultExt, StagePayload,
};

use crate::traits::{LeadRepository, WriteOutcome};

/// Outcome of matching one candidate against stored leads.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DedupResult {
    pub is_duplicate: bool,
    /// The stored lead after the insert or merge.
    pub matched_lead: Lead,
}

/// Identity-keyed dedup and merge.
///
/// A new identity becomes a lead with its first sighting and an initial keyword
/// stage. A known identity is merged in memory and written with one
/// conditional update; lost races are retried against the fresh row.
#[derive(Clone)]
pub struct MergeEngine {
    repo: Arc<dyn LeadRepository>,
    max_attempts: u32,
}

impl MergeEngine {
    pub fn new(repo: Arc<dyn LeadRepository>, max_attempts: u32) -> Self {
        Self { repo, max_attempts }
    }

    pub async fn match_and_merge(&self, candidate: &LeadCandidate) -> PipelineResult<DedupResult> {
        candidate.validate()?;

        for attempt in 1..=self.max_attempts {
            let now = Utc::now();
            let existing = self
                .repo
                .find_lead_by_identity(&candidate.identity)
                .await
                .repo()?;

            let Some(existing) = existing else {
                let lead = Lead::from_candidate(candidate, now);
                match self.repo.insert_lead(&lead).await.repo()? {
                    WriteOutcome::Applied => {
                        self.record_sighting(&lead, candidate).await?;
                        self.repo
                            .append_journey_stage(lead.id, &StagePayload::discovered(candidate), now)
                            .await
                            .repo()?;
                        info!(
                            lead_id = %lead.id,
                            identity = %lead.identity,
                            channel = %candidate.channel(),
                            score = lead.intent_score,
                            "Lead created"
                        );
                        return Ok(DedupResult {
                            is_duplicate: false,
                            matched_lead: lead,
                        });
                    }
                    WriteOutcome::Conflict => {
                        debug!(identity = %candidate.identity, attempt, "Identity claimed concurrently, retrying as merge");
                        continue;
                    }
                }
            };

            let mut merged = existing.merged_with(candidate, now);
            self.drop_foreign_identity(&mut merged, &existing).await?;
            merged.version = existing.version + 1;
            match self.repo.update_lead(&merged, existing.version).await.repo()? {
                WriteOutcome::Applied => {
                    self.record_sighting(&merged, candidate).await?;
                    debug!(
                        lead_id = %merged.id,
                        channel = %candidate.channel(),
                        old_score = existing.intent_score,
                        score = merged.intent_score,
                        sources = merged.enrichment.sources.len(),
                        "Merged duplicate sighting"
                    );
                    return Ok(DedupResult {
                        is_duplicate: true,
                        matched_lead: merged,
                    });
                }
                WriteOutcome::Conflict => {
                    debug!(lead_id = %existing.id, attempt, "Lead version moved during merge, retrying");
                }
            }
        }

        Err(PipelineError::Conflict {
            entity: "lead",
            attempts: self.max_attempts,
        })
    }

    /// Clear absorbed email/phone values that already identify another lead.
    async fn drop_foreign_identity(&self, merged: &mut Lead, existing: &Lead) -> PipelineResult<()> {
        if existing.identity.email.is_none() {
            if let Some(email) = merged.identity.email.clone() {
                if self.owned_elsewhere(&Identity::email(&email), merged.id).await? {
                    debug!(lead_id = %merged.id, email = %email, "Email belongs to another lead, not absorbing");
                    merged.identity.email = None;
                }
            }
        }
        if existing.identity.phone.is_none() {
            if let Some(phone) = merged.identity.phone.clone() {
                if self.owned_elsewhere(&Identity::phone(&phone), merged.id).await? {
                    debug!(lead_id = %merged.id, phone = %phone, "Phone belongs to another lead, not absorbing");
                    merged.identity.phone = None;
                }
            }
        }
        Ok(())
    }

    async fn owned_elsewhere(&self, identity: &Identity, lead_id: Uuid) -> PipelineResult<bool> {
        let owner = self.repo.find_lead_by_identity(identity).await.repo()?;
        Ok(owner.is_some_and(|other| other.id != lead_id))
    }

    async fn record_sighting(&self, lead: &Lead, candidate: &LeadCandidate) -> PipelineResult<()> {
        let source = LeadSource::from_candidate(lead.id, candidate, Utc::now());
        self.repo.insert_lead_source(&source).await.repo()
    }
}
