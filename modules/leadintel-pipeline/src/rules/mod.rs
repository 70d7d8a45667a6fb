//! Task and playbook generation.
//!
//! Everything here is pure: rules look at a lead or a competitor change and
//! return the records to create. Persistence happens in the pipeline.

pub mod competitor_rules;
pub mod lead_rules;
pub mod playbook;

use chrono::{DateTime, Utc};

use leadintel_common::{
    CompetitorChange, Lead, MonitorConfig, NewTask, Playbook, RulesConfig, TriggerCondition,
};
use uuid::Uuid;

pub use competitor_rules::{response_priority, RESPONSE_CHECKLIST};

/// A task a rule wants created, plus how the lead link should be recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedTask {
    pub task: NewTask,
    pub trigger: TriggerCondition,
}

#[derive(Debug, Clone, Default)]
pub struct RuleEngine {
    rules: RulesConfig,
}

impl RuleEngine {
    pub fn new(rules: RulesConfig) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &RulesConfig {
        &self.rules
    }

    /// Ingestion rules, evaluated independently in order. Yields 0 to 3 tasks.
    pub fn lead_tasks(&self, lead: &Lead, now: DateTime<Utc>) -> Vec<PlannedTask> {
        lead_rules::ingestion_tasks(lead, &self.rules, now)
    }

    pub fn high_intent_task(&self, lead: &Lead, now: DateTime<Utc>) -> PlannedTask {
        lead_rules::high_intent_task(lead, &self.rules.tasks, now)
    }

    pub fn competitor_task(
        &self,
        change: &CompetitorChange,
        monitor: &MonitorConfig,
        alert_id: Uuid,
        now: DateTime<Utc>,
    ) -> Option<NewTask> {
        competitor_rules::response_task(change, monitor, &self.rules.competitor, alert_id, now)
    }

    pub fn draft_playbook(
        &self,
        change: &CompetitorChange,
        monitor: &MonitorConfig,
        alert_id: Uuid,
        now: DateTime<Utc>,
    ) -> Option<Playbook> {
        playbook::draft(change, monitor, &self.rules.competitor, alert_id, now)
    }
}
