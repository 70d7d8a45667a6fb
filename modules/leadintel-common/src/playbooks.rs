use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{PipelineError, PipelineResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybookStatus {
    #[default]
    Draft,
    Approved,
    InProgress,
    Completed,
}

impl PlaybookStatus {
    /// The only status this one may advance to.
    pub fn next(&self) -> Option<PlaybookStatus> {
        match self {
            Self::Draft => Some(Self::Approved),
            Self::Approved => Some(Self::InProgress),
            Self::InProgress => Some(Self::Completed),
            Self::Completed => None,
        }
    }
}

impl fmt::Display for PlaybookStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Approved => write!(f, "approved"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    AdCampaign,
    ContentCreation,
    Seo,
    Pricing,
    Product,
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AdCampaign => write!(f, "ad_campaign"),
            Self::ContentCreation => write!(f, "content_creation"),
            Self::Seo => write!(f, "seo"),
            Self::Pricing => write!(f, "pricing"),
            Self::Product => write!(f, "product"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimatedImpact {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybookAction {
    pub action_type: ActionType,
    pub title: String,
    pub description: String,
    pub estimated_hours: f32,
    pub resources_needed: Vec<String>,
    pub success_metrics: Vec<String>,
    pub assignee: Option<String>,
}

impl PlaybookAction {
    pub fn is_assigned(&self) -> bool {
        self.assignee.as_deref().is_some_and(|a| !a.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playbook {
    pub id: Uuid,
    pub title: String,
    pub competitor_id: String,
    pub competitor_name: String,
    pub priority: u8,
    pub status: PlaybookStatus,
    pub estimated_hours: f32,
    pub estimated_impact: EstimatedImpact,
    pub actions: Vec<PlaybookAction>,
    /// Alert whose change produced this playbook.
    pub alert_id: Option<Uuid>,
    /// Optimistic-lock version, bumped on every successful update.
    #[serde(default = "initial_version")]
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn initial_version() -> u64 {
    1
}

impl Playbook {
    /// Fraction of actions with an assignee, in [0, 1].
    pub fn progress(&self) -> f64 {
        if self.actions.is_empty() {
            return 0.0;
        }
        let assigned = self.actions.iter().filter(|a| a.is_assigned()).count();
        assigned as f64 / self.actions.len() as f64
    }

    /// Move forward exactly one step to `target`.
    pub fn advance(&mut self, target: PlaybookStatus, now: DateTime<Utc>) -> PipelineResult<()> {
        if self.status.next() != Some(target) {
            return Err(PipelineError::InvalidTransition {
                from: self.status.to_string(),
                to: target.to_string(),
            });
        }
        self.status = target;
        self.updated_at = now;
        Ok(())
    }

    pub fn assign(
        &mut self,
        action_index: usize,
        assignee: &str,
        now: DateTime<Utc>,
    ) -> PipelineResult<()> {
        let (id, count) = (self.id, self.actions.len());
        let action = self.actions.get_mut(action_index).ok_or_else(|| {
            PipelineError::validation(format!(
                "playbook {id} has {count} actions, no index {action_index}"
            ))
        })?;
        let assignee = assignee.trim();
        action.assignee = if assignee.is_empty() {
            None
        } else {
            Some(assignee.to_string())
        };
        self.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(assignee: Option<&str>) -> PlaybookAction {
        PlaybookAction {
            action_type: ActionType::Pricing,
            title: "Review pricing".to_string(),
            description: String::new(),
            estimated_hours: 2.0,
            resources_needed: vec![],
            success_metrics: vec![],
            assignee: assignee.map(str::to_string),
        }
    }

    fn playbook(actions: Vec<PlaybookAction>) -> Playbook {
        let now = Utc::now();
        Playbook {
            id: Uuid::new_v4(),
            title: "Respond".to_string(),
            competitor_id: "acme".to_string(),
            competitor_name: "Acme".to_string(),
            priority: 5,
            status: PlaybookStatus::Draft,
            estimated_hours: 2.0,
            estimated_impact: EstimatedImpact::High,
            actions,
            alert_id: None,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn progress_counts_only_non_blank_assignees() {
        let pb = playbook(vec![
            action(Some("jo")),
            action(Some("   ")),
            action(None),
            action(Some("kim")),
        ]);
        assert!((pb.progress() - 0.5).abs() < f64::EPSILON);
        assert_eq!(playbook(vec![]).progress(), 0.0);
    }

    #[test]
    fn status_advances_one_step_at_a_time() {
        let mut pb = playbook(vec![action(None)]);
        let now = Utc::now();
        assert!(pb.advance(PlaybookStatus::InProgress, now).is_err());
        pb.advance(PlaybookStatus::Approved, now).unwrap();
        pb.advance(PlaybookStatus::InProgress, now).unwrap();
        pb.advance(PlaybookStatus::Completed, now).unwrap();
        assert!(matches!(
            pb.advance(PlaybookStatus::Completed, now),
            Err(PipelineError::InvalidTransition { .. })
        ));
        assert!(pb.advance(PlaybookStatus::Draft, now).is_err());
    }

    #[test]
    fn assigning_out_of_range_action_fails() {
        let mut pb = playbook(vec![action(None)]);
        assert!(pb.assign(3, "jo", Utc::now()).is_err());
        pb.assign(0, "jo", Utc::now()).unwrap();
        assert_eq!(pb.progress(), 1.0);
    }
}
