//! In-memory `LeadRepository`. Backs the `lead-monitor` demo and every test.

use std::collections::HashMap;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use leadintel_common::{
    Alert, AlertFilter, ExternalCrmSync, FollowUpTask, Identity, JourneyStage, Lead, LeadSource,
    Playbook, StagePayload, SyncResolution, Task, TaskFilter, TaskStatus,
};

use crate::traits::{LeadRepository, WriteOutcome};

#[derive(Default)]
struct Inner {
    leads: HashMap<Uuid, Lead>,
    by_email: HashMap<String, Uuid>,
    by_phone: HashMap<String, Uuid>,
    sources: Vec<LeadSource>,
    stages: HashMap<Uuid, Vec<JourneyStage>>,
    tasks: Vec<Task>,
    follow_ups: Vec<FollowUpTask>,
    playbooks: Vec<Playbook>,
    alerts: Vec<Alert>,
    syncs: Vec<ExternalCrmSync>,
    fail_writes: bool,
}

impl Inner {
    fn check_writable(&self) -> Result<()> {
        if self.fail_writes {
            bail!("memory repository: writes disabled");
        }
        Ok(())
    }

    /// True if another lead already owns the email or phone on `identity`.
    fn claimed_by_other(&self, id: Uuid, identity: &Identity) -> bool {
        let email_owner = identity.email.as_ref().and_then(|e| self.by_email.get(e));
        let phone_owner = identity.phone.as_ref().and_then(|p| self.by_phone.get(p));
        email_owner.into_iter().chain(phone_owner).any(|owner| *owner != id)
    }

    fn index_identity(&mut self, id: Uuid, identity: &Identity) {
        if let Some(email) = &identity.email {
            self.by_email.entry(email.clone()).or_insert(id);
        }
        if let Some(phone) = &identity.phone {
            self.by_phone.entry(phone.clone()).or_insert(id);
        }
    }
}

/// Stateful in-memory store. All records live behind one async mutex.
#[derive(Default)]
pub struct MemoryLeadRepository {
    inner: Mutex<Inner>,
}

impl MemoryLeadRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write fail with a repository error.
    #[cfg(any(test, feature = "test-support"))]
    pub fn failing_writes(mut self) -> Self {
        self.inner.get_mut().fail_writes = true;
        self
    }

    /// Toggle write failures on a shared instance.
    #[cfg(any(test, feature = "test-support"))]
    pub async fn set_failing_writes(&self, fail: bool) {
        self.inner.lock().await.fail_writes = fail;
    }

    /// Number of stored leads (for test assertions).
    pub async fn lead_count(&self) -> usize {
        self.inner.lock().await.leads.len()
    }
}

#[async_trait]
impl LeadRepository for MemoryLeadRepository {
    async fn insert_lead(&self, lead: &Lead) -> Result<WriteOutcome> {
        let mut inner = self.inner.lock().await;
        inner.check_writable()?;

        let email_taken = lead
            .identity
            .email
            .as_ref()
            .is_some_and(|e| inner.by_email.contains_key(e));
        let phone_taken = lead
            .identity
            .phone
            .as_ref()
            .is_some_and(|p| inner.by_phone.contains_key(p));
        if email_taken || phone_taken {
            return Ok(WriteOutcome::Conflict);
        }

        inner.index_identity(lead.id, &lead.identity);
        inner.leads.insert(lead.id, lead.clone());
        Ok(WriteOutcome::Applied)
    }

    async fn lead(&self, id: Uuid) -> Result<Option<Lead>> {
        Ok(self.inner.lock().await.leads.get(&id).cloned())
    }

    async fn find_lead_by_identity(&self, identity: &Identity) -> Result<Option<Lead>> {
        let inner = self.inner.lock().await;
        let by_email = identity
            .email
            .as_ref()
            .and_then(|e| inner.by_email.get(e));
        let by_phone = identity
            .phone
            .as_ref()
            .and_then(|p| inner.by_phone.get(p));
        Ok(by_email
            .or(by_phone)
            .and_then(|id| inner.leads.get(id))
            .cloned())
    }

    async fn update_lead(&self, lead: &Lead, expected_version: u64) -> Result<WriteOutcome> {
        let mut inner = self.inner.lock().await;
        inner.check_writable()?;

        match inner.leads.get(&lead.id) {
            Some(stored) if stored.version == expected_version => {}
            Some(_) => return Ok(WriteOutcome::Conflict),
            None => bail!("lead {} does not exist", lead.id),
        }
        if inner.claimed_by_other(lead.id, &lead.identity) {
            return Ok(WriteOutcome::Conflict);
        }

        inner.index_identity(lead.id, &lead.identity);
        inner.leads.insert(lead.id, lead.clone());
        Ok(WriteOutcome::Applied)
    }

    async fn insert_lead_source(&self, source: &LeadSource) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.check_writable()?;
        inner.sources.push(source.clone());
        Ok(())
    }

    async fn lead_sources(&self, lead_id: Uuid) -> Result<Vec<LeadSource>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .sources
            .iter()
            .filter(|s| s.lead_id == lead_id)
            .cloned()
            .collect())
    }

    async fn append_journey_stage(
        &self,
        lead_id: Uuid,
        payload: &StagePayload,
        recorded_at: DateTime<Utc>,
    ) -> Result<JourneyStage> {
        let mut inner = self.inner.lock().await;
        inner.check_writable()?;

        let stages = inner.stages.entry(lead_id).or_default();
        let sequence_order = stages.last().map(|s| s.sequence_order + 1).unwrap_or(1);
        let stage = JourneyStage {
            id: Uuid::new_v4(),
            lead_id,
            sequence_order,
            payload: payload.clone(),
            recorded_at,
        };
        stages.push(stage.clone());
        Ok(stage)
    }

    async fn journey_stages(&self, lead_id: Uuid) -> Result<Vec<JourneyStage>> {
        let inner = self.inner.lock().await;
        Ok(inner.stages.get(&lead_id).cloned().unwrap_or_default())
    }

    async fn insert_task(&self, task: &Task) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.check_writable()?;
        inner.tasks.push(task.clone());
        Ok(())
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .tasks
            .iter()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect())
    }

    async fn update_task_status(
        &self,
        id: Uuid,
        status: TaskStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Task>> {
        let mut inner = self.inner.lock().await;
        inner.check_writable()?;
        Ok(inner.tasks.iter_mut().find(|t| t.id == id).map(|task| {
            task.status = status;
            task.updated_at = at;
            task.clone()
        }))
    }

    async fn insert_follow_up(&self, link: &FollowUpTask) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.check_writable()?;
        inner.follow_ups.push(link.clone());
        Ok(())
    }

    async fn follow_ups(&self, lead_id: Uuid) -> Result<Vec<(FollowUpTask, Task)>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .follow_ups
            .iter()
            .filter(|f| f.lead_id == lead_id)
            .filter_map(|f| {
                inner
                    .tasks
                    .iter()
                    .find(|t| t.id == f.task_id)
                    .map(|t| (f.clone(), t.clone()))
            })
            .collect())
    }

    async fn insert_playbook(&self, playbook: &Playbook) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.check_writable()?;
        inner.playbooks.push(playbook.clone());
        Ok(())
    }

    async fn playbook(&self, id: Uuid) -> Result<Option<Playbook>> {
        let inner = self.inner.lock().await;
        Ok(inner.playbooks.iter().find(|p| p.id == id).cloned())
    }

    async fn list_playbooks(&self) -> Result<Vec<Playbook>> {
        Ok(self.inner.lock().await.playbooks.clone())
    }

    async fn update_playbook(
        &self,
        playbook: &Playbook,
        expected_version: u64,
    ) -> Result<WriteOutcome> {
        let mut inner = self.inner.lock().await;
        inner.check_writable()?;
        match inner.playbooks.iter_mut().find(|p| p.id == playbook.id) {
            Some(stored) if stored.version == expected_version => {
                *stored = playbook.clone();
                Ok(WriteOutcome::Applied)
            }
            Some(_) => Ok(WriteOutcome::Conflict),
            None => bail!("playbook {} does not exist", playbook.id),
        }
    }

    async fn insert_alert(&self, alert: &Alert) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.check_writable()?;
        inner.alerts.push(alert.clone());
        Ok(())
    }

    async fn list_alerts(&self, filter: &AlertFilter) -> Result<Vec<Alert>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .alerts
            .iter()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect())
    }

    async fn mark_alert_read(&self, id: Uuid) -> Result<Option<Alert>> {
        let mut inner = self.inner.lock().await;
        inner.check_writable()?;
        Ok(inner.alerts.iter_mut().find(|a| a.id == id).map(|alert| {
            alert.read = true;
            alert.clone()
        }))
    }

    async fn insert_crm_sync(&self, sync: &ExternalCrmSync) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.check_writable()?;
        inner.syncs.push(sync.clone());
        Ok(())
    }

    async fn crm_syncs(&self, lead_id: Uuid) -> Result<Vec<ExternalCrmSync>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .syncs
            .iter()
            .filter(|s| s.lead_id == lead_id)
            .cloned()
            .collect())
    }

    async fn resolve_crm_sync(
        &self,
        id: Uuid,
        resolution: &SyncResolution,
    ) -> Result<Option<ExternalCrmSync>> {
        let mut inner = self.inner.lock().await;
        inner.check_writable()?;
        Ok(inner.syncs.iter_mut().find(|s| s.id == id).map(|row| {
            resolution.apply(row);
            row.clone()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadintel_common::{LeadCandidate, Provenance};

    fn lead(email: Option<&str>, phone: Option<&str>) -> Lead {
        let candidate = LeadCandidate::new(
            Identity::new(email, phone),
            Provenance::Manual { entered_by: None },
        );
        Lead::from_candidate(&candidate, Utc::now())
    }

    #[tokio::test]
    async fn second_insert_of_claimed_identity_conflicts() {
        let repo = MemoryLeadRepository::new();
        let first = lead(Some("a@x.com"), None);
        assert_eq!(repo.insert_lead(&first).await.unwrap(), WriteOutcome::Applied);

        let dup = lead(Some("a@x.com"), Some("5550100"));
        assert_eq!(repo.insert_lead(&dup).await.unwrap(), WriteOutcome::Conflict);
        assert_eq!(repo.lead_count().await, 1);
    }

    #[tokio::test]
    async fn identity_lookup_matches_email_or_phone() {
        let repo = MemoryLeadRepository::new();
        let stored = lead(Some("a@x.com"), Some("5550100"));
        repo.insert_lead(&stored).await.unwrap();

        let by_phone = repo
            .find_lead_by_identity(&Identity::phone("555-0100"))
            .await
            .unwrap();
        assert_eq!(by_phone.map(|l| l.id), Some(stored.id));

        let miss = repo
            .find_lead_by_identity(&Identity::email("b@x.com"))
            .await
            .unwrap();
        assert!(miss.is_none());
    }

    #[tokio::test]
    async fn stale_version_update_conflicts() {
        let repo = MemoryLeadRepository::new();
        let mut stored = lead(Some("a@x.com"), None);
        repo.insert_lead(&stored).await.unwrap();

        stored.intent_score = 40;
        stored.version = 2;
        assert_eq!(repo.update_lead(&stored, 1).await.unwrap(), WriteOutcome::Applied);
        assert_eq!(repo.update_lead(&stored, 1).await.unwrap(), WriteOutcome::Conflict);
    }

    #[tokio::test]
    async fn stage_sequence_is_per_lead_and_starts_at_one() {
        let repo = MemoryLeadRepository::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let payload = StagePayload::Conversion {
            from_status: leadintel_common::LeadStatus::New,
            to_status: leadintel_common::LeadStatus::Qualified,
        };
        let now = Utc::now();
        assert_eq!(repo.append_journey_stage(a, &payload, now).await.unwrap().sequence_order, 1);
        assert_eq!(repo.append_journey_stage(a, &payload, now).await.unwrap().sequence_order, 2);
        assert_eq!(repo.append_journey_stage(b, &payload, now).await.unwrap().sequence_order, 1);
    }

    #[tokio::test]
    async fn failing_writes_surface_as_errors() {
        let repo = MemoryLeadRepository::new().failing_writes();
        assert!(repo.insert_lead(&lead(Some("a@x.com"), None)).await.is_err());
    }
}
