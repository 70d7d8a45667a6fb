// Trait abstractions for the pipeline's collaborators.
//
// LeadRepository: all persistence behind one port, record types from leadintel-common.
// LeadSourceChannel: one origin channel yielding raw sightings.
// ChangeSource: zero-or-more competitor changes per monitoring tick.
// SnapshotProvider: current observable state of a competitor, for diff-based detection.
// DeliveryChannel: one alert delivery integration (email, chat, SMS, ...).
// CrmConnector: pushes a lead into an external CRM, returns its external id.
//
// MemoryLeadRepository and the fixtures in `testing` implement these so every
// pipeline operation runs without a database or network.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use leadintel_common::{
    Alert, AlertFilter, ChannelKind, CompetitorChange, CrmSystem, ExternalCrmSync, FollowUpTask,
    Identity, JourneyStage, Lead, LeadSource, MonitorConfig, Playbook, SourceChannel,
    StagePayload, SyncResolution, Task, TaskFilter, TaskStatus,
};

use crate::aggregator::RawSighting;
use crate::alerts::detect::CompetitorSnapshot;

/// Result of a conditional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Applied,
    /// The identity is already claimed (insert) or the version moved (update).
    Conflict,
}

// ---------------------------------------------------------------------------
// LeadRepository
// ---------------------------------------------------------------------------

#[async_trait]
pub trait LeadRepository: Send + Sync {
    // --- Leads ---

    /// Insert a new lead. `Conflict` if its email or phone already belongs to a lead.
    async fn insert_lead(&self, lead: &Lead) -> Result<WriteOutcome>;

    async fn lead(&self, id: Uuid) -> Result<Option<Lead>>;

    /// Exact match on email, then on phone.
    async fn find_lead_by_identity(&self, identity: &Identity) -> Result<Option<Lead>>;

    /// Replace a lead if the stored version still equals `expected_version`.
    /// Returns `Conflict` when the version moved or when the lead's email or
    /// phone already belongs to another lead.
    async fn update_lead(&self, lead: &Lead, expected_version: u64) -> Result<WriteOutcome>;

    // --- Sources ---

    async fn insert_lead_source(&self, source: &LeadSource) -> Result<()>;

    async fn lead_sources(&self, lead_id: Uuid) -> Result<Vec<LeadSource>>;

    // --- Journey ---

    /// Append a stage, assigning the lead's next sequence number (1-based).
    async fn append_journey_stage(
        &self,
        lead_id: Uuid,
        payload: &StagePayload,
        recorded_at: DateTime<Utc>,
    ) -> Result<JourneyStage>;

    /// Stages of a lead in ascending sequence order.
    async fn journey_stages(&self, lead_id: Uuid) -> Result<Vec<JourneyStage>>;

    // --- Tasks ---

    async fn insert_task(&self, task: &Task) -> Result<()>;

    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>>;

    /// Returns the updated task, or `None` if no task has this id.
    async fn update_task_status(
        &self,
        id: Uuid,
        status: TaskStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Task>>;

    async fn insert_follow_up(&self, link: &FollowUpTask) -> Result<()>;

    /// Follow-up links of a lead joined with their tasks, oldest first.
    async fn follow_ups(&self, lead_id: Uuid) -> Result<Vec<(FollowUpTask, Task)>>;

    // --- Playbooks ---

    async fn insert_playbook(&self, playbook: &Playbook) -> Result<()>;

    async fn playbook(&self, id: Uuid) -> Result<Option<Playbook>>;

    async fn list_playbooks(&self) -> Result<Vec<Playbook>>;

    /// Replace a playbook if the stored version still equals `expected_version`.
    async fn update_playbook(
        &self,
        playbook: &Playbook,
        expected_version: u64,
    ) -> Result<WriteOutcome>;

    // --- Alerts ---

    async fn insert_alert(&self, alert: &Alert) -> Result<()>;

    async fn list_alerts(&self, filter: &AlertFilter) -> Result<Vec<Alert>>;

    /// Returns the updated alert, or `None` if no alert has this id.
    async fn mark_alert_read(&self, id: Uuid) -> Result<Option<Alert>>;

    // --- External CRM sync ---

    async fn insert_crm_sync(&self, sync: &ExternalCrmSync) -> Result<()>;

    async fn crm_syncs(&self, lead_id: Uuid) -> Result<Vec<ExternalCrmSync>>;

    /// Move a sync row to its terminal state. `None` if the row is gone.
    async fn resolve_crm_sync(
        &self,
        id: Uuid,
        resolution: &SyncResolution,
    ) -> Result<Option<ExternalCrmSync>>;
}

// ---------------------------------------------------------------------------
// LeadSourceChannel
// ---------------------------------------------------------------------------

#[async_trait]
pub trait LeadSourceChannel: Send + Sync {
    fn channel(&self) -> SourceChannel;

    /// Pull the sightings currently available from this channel.
    async fn fetch(&self) -> Result<Vec<RawSighting>>;
}

// ---------------------------------------------------------------------------
// ChangeSource
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ChangeSource: Send + Sync {
    /// Changes detected for one monitored competitor on this tick.
    async fn detect(&self, monitor: &MonitorConfig) -> Result<Vec<CompetitorChange>>;
}

// ---------------------------------------------------------------------------
// SnapshotProvider
// ---------------------------------------------------------------------------

#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    /// Fetch what is currently observable for a competitor. Sections the
    /// provider cannot observe are left `None`.
    async fn snapshot(&self, monitor: &MonitorConfig) -> Result<CompetitorSnapshot>;
}

// ---------------------------------------------------------------------------
// DeliveryChannel
// ---------------------------------------------------------------------------

#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    fn kind(&self) -> ChannelKind;

    async fn deliver(&self, alert: &Alert) -> Result<()>;
}

// ---------------------------------------------------------------------------
// CrmConnector
// ---------------------------------------------------------------------------

#[async_trait]
pub trait CrmConnector: Send + Sync {
    /// Mirror a lead into `system`. Returns the id the external system assigned.
    async fn push_lead(&self, system: CrmSystem, lead: &Lead) -> Result<String>;
}
