use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use leadintel_common::{
    ActivityEvent, Lead, PipelineResult, RepoResultExt, StagePayload, MAX_INTENT_SCORE,
    MIN_INTENT_SCORE,
};

use crate::store::modify_lead;
use crate::traits::LeadRepository;

/// Score delta contributed by one activity.
pub fn activity_delta(activity: &ActivityEvent) -> i32 {
    match activity {
        ActivityEvent::WebsiteVisit { pages_visited } if *pages_visited > 3 => 5,
        ActivityEvent::WebsiteVisit { .. } => 2,
        ActivityEvent::EmailEngagement { clicked: true } => 8,
        ActivityEvent::EmailEngagement { clicked: false } => 3,
        ActivityEvent::ContentDownload { .. } => 10,
        ActivityEvent::DemoRequest => 15,
        ActivityEvent::ManualAdjustment { delta, .. } => *delta,
    }
}

pub fn apply_delta(score: u8, delta: i32) -> u8 {
    (i32::from(score) + delta).clamp(i32::from(MIN_INTENT_SCORE), i32::from(MAX_INTENT_SCORE)) as u8
}

/// True only when the score moves from below `threshold` to at or above it.
pub fn crosses_upward(old: u8, new: u8, threshold: u8) -> bool {
    old < threshold && new >= threshold
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreUpdate {
    pub lead: Lead,
    pub old_score: u8,
    pub new_score: u8,
    pub delta: i32,
    /// The update carried the score up through the high-intent threshold.
    pub crossed_high_intent: bool,
}

#[derive(Clone)]
pub struct ScoringEngine {
    repo: Arc<dyn LeadRepository>,
    high_intent_threshold: u8,
    max_attempts: u32,
}

impl ScoringEngine {
    pub fn new(repo: Arc<dyn LeadRepository>, high_intent_threshold: u8, max_attempts: u32) -> Self {
        Self {
            repo,
            high_intent_threshold,
            max_attempts,
        }
    }

    /// Apply an activity to a lead and record it as a touchpoint stage.
    pub async fn update_score(
        &self,
        lead_id: Uuid,
        activity: &ActivityEvent,
    ) -> PipelineResult<ScoreUpdate> {
        let delta = activity_delta(activity);
        let (before, after) =
            modify_lead(self.repo.as_ref(), lead_id, self.max_attempts, |current| {
                let mut next = current.clone();
                next.intent_score = apply_delta(current.intent_score, delta);
                Ok(next)
            })
            .await?;

        let (old_score, new_score) = (before.intent_score, after.intent_score);
        self.repo
            .append_journey_stage(
                lead_id,
                &StagePayload::Touchpoint {
                    activity: activity.clone(),
                    delta,
                    new_score,
                },
                Utc::now(),
            )
            .await
            .repo()?;

        let crossed_high_intent = crosses_upward(old_score, new_score, self.high_intent_threshold);
        info!(
            lead_id = %lead_id,
            activity = activity.activity_type(),
            old_score,
            new_score,
            crossed_high_intent,
            "Intent score updated"
        );

        Ok(ScoreUpdate {
            lead: after,
            old_score,
            new_score,
            delta,
            crossed_high_intent,
        })
    }
}
