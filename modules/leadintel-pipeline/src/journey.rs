use std::sync::Arc;

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use leadintel_common::{
    journey_completion, JourneyStage, PipelineError, PipelineResult, RepoResultExt, StagePayload,
};

use crate::traits::LeadRepository;

/// Append-only journey log. Sequence numbers come from the repository.
#[derive(Clone)]
pub struct JourneyTracker {
    repo: Arc<dyn LeadRepository>,
}

impl JourneyTracker {
    pub fn new(repo: Arc<dyn LeadRepository>) -> Self {
        Self { repo }
    }

    pub async fn add_stage(
        &self,
        lead_id: Uuid,
        payload: StagePayload,
    ) -> PipelineResult<JourneyStage> {
        if self.repo.lead(lead_id).await.repo()?.is_none() {
            return Err(PipelineError::not_found("lead", lead_id));
        }
        let stage = self
            .repo
            .append_journey_stage(lead_id, &payload, Utc::now())
            .await
            .repo()?;
        debug!(
            lead_id = %lead_id,
            stage = %stage.stage_type(),
            sequence = stage.sequence_order,
            "Journey stage recorded"
        );
        Ok(stage)
    }

    pub async fn stages(&self, lead_id: Uuid) -> PipelineResult<Vec<JourneyStage>> {
        self.repo.journey_stages(lead_id).await.repo()
    }

    /// 0, 33, 66, 67 or 100 depending on which stage types are present.
    pub async fn completion(&self, lead_id: Uuid) -> PipelineResult<u8> {
        let stages = self.stages(lead_id).await?;
        Ok(journey_completion(stages.iter().map(JourneyStage::stage_type)))
    }
}
