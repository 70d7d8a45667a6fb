use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::alerts::ChangeType;
use crate::error::{PipelineError, PipelineResult};

pub const MIN_PRIORITY: u8 = 1;
pub const MAX_PRIORITY: u8 = 5;

pub fn checked_priority(priority: u8) -> PipelineResult<u8> {
    if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&priority) {
        return Err(PipelineError::validation(format!(
            "priority {priority} outside {MIN_PRIORITY}..={MAX_PRIORITY}"
        )));
    }
    Ok(priority)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Done,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Done => write!(f, "done"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskCategory {
    ImmediateOutreach,
    CompanyResearch,
    Nurture,
    HighIntent,
    CompetitorResponse,
    Manual,
}

impl fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ImmediateOutreach => write!(f, "immediate_outreach"),
            Self::CompanyResearch => write!(f, "company_research"),
            Self::Nurture => write!(f, "nurture"),
            Self::HighIntent => write!(f, "high_intent"),
            Self::CompetitorResponse => write!(f, "competitor_response"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

/// Back-reference to whatever spawned a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RelatedEntities {
    Lead {
        lead_id: Uuid,
    },
    CompetitorChange {
        competitor_id: String,
        change_type: ChangeType,
        impact_score: f64,
        alert_id: Uuid,
    },
    Unlinked,
}

impl RelatedEntities {
    pub fn lead_id(&self) -> Option<Uuid> {
        match self {
            Self::Lead { lead_id } => Some(*lead_id),
            _ => None,
        }
    }
}

/// Everything needed to create a task. Ids and timestamps are assigned on insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub priority: u8,
    pub category: TaskCategory,
    pub execution_steps: Vec<String>,
    pub due_at: DateTime<Utc>,
    pub related: RelatedEntities,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub priority: u8,
    pub category: TaskCategory,
    pub status: TaskStatus,
    /// Ordered checklist of execution steps.
    pub execution_steps: Vec<String>,
    pub due_at: DateTime<Utc>,
    pub related: RelatedEntities,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn create(new: NewTask, now: DateTime<Utc>) -> PipelineResult<Self> {
        if new.title.trim().is_empty() {
            return Err(PipelineError::validation("task title must not be empty"));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            title: new.title,
            description: new.description,
            priority: checked_priority(new.priority)?,
            category: new.category,
            status: TaskStatus::Pending,
            execution_steps: new.execution_steps,
            due_at: new.due_at,
            related: new.related,
            created_at: now,
            updated_at: now,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerCondition {
    StatusChange,
    TimeBased,
    ScoreChange,
    Manual,
}

impl fmt::Display for TriggerCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StatusChange => write!(f, "status_change"),
            Self::TimeBased => write!(f, "time_based"),
            Self::ScoreChange => write!(f, "score_change"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

/// Links a lead to a task it spawned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowUpTask {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub task_id: Uuid,
    pub auto_generated: bool,
    pub trigger: TriggerCondition,
    pub created_at: DateTime<Utc>,
}

impl FollowUpTask {
    pub fn link(lead_id: Uuid, task: &Task, trigger: TriggerCondition) -> Self {
        Self {
            id: Uuid::new_v4(),
            lead_id,
            task_id: task.id,
            auto_generated: trigger != TriggerCondition::Manual,
            trigger,
            created_at: task.created_at,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub category: Option<TaskCategory>,
    pub min_priority: Option<u8>,
    pub lead_id: Option<Uuid>,
}

impl TaskFilter {
    pub fn matches(&self, task: &Task) -> bool {
        self.status.is_none_or(|s| task.status == s)
            && self.category.is_none_or(|c| task.category == c)
            && self.min_priority.is_none_or(|p| task.priority >= p)
            && self
                .lead_id
                .is_none_or(|id| task.related.lead_id() == Some(id))
    }
}
