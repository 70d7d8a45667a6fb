use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use leadintel_common::{
    CrmSystem, ExternalCrmSync, Lead, PipelineError, PipelineResult, RepoResultExt,
    SyncResolution,
};

use crate::traits::{CrmConnector, LeadRepository};

/// A sync row that has been written as pending, with the background push
/// that will resolve it.
pub struct PendingSync {
    pub record: ExternalCrmSync,
    pub handle: JoinHandle<()>,
}

/// Records CRM sync attempts and resolves them off the caller's path.
///
/// Each call writes a new row; attempts are never collapsed. Push failures
/// end up on the row as `error`, never as a returned error.
#[derive(Clone)]
pub struct SyncTracker {
    repo: Arc<dyn LeadRepository>,
    connector: Arc<dyn CrmConnector>,
}

impl SyncTracker {
    pub fn new(repo: Arc<dyn LeadRepository>, connector: Arc<dyn CrmConnector>) -> Self {
        Self { repo, connector }
    }

    pub async fn begin(&self, lead_id: Uuid, system: CrmSystem) -> PipelineResult<PendingSync> {
        let lead = self
            .repo
            .lead(lead_id)
            .await
            .repo()?
            .ok_or_else(|| PipelineError::not_found("lead", lead_id))?;

        let record = ExternalCrmSync::pending(lead_id, system, Utc::now());
        self.repo.insert_crm_sync(&record).await.repo()?;
        info!(lead_id = %lead_id, system = %system, sync_id = %record.id, "CRM sync queued");

        let repo = self.repo.clone();
        let connector = self.connector.clone();
        let sync_id = record.id;
        let handle = tokio::spawn(async move {
            let resolution = push(connector.as_ref(), system, &lead).await;
            match repo.resolve_crm_sync(sync_id, &resolution).await {
                Ok(Some(_)) => {}
                Ok(None) => warn!(sync_id = %sync_id, "CRM sync row vanished before resolution"),
                Err(e) => warn!(sync_id = %sync_id, error = %e, "Failed to record CRM sync result"),
            }
        });

        Ok(PendingSync { record, handle })
    }

    pub async fn history(&self, lead_id: Uuid) -> PipelineResult<Vec<ExternalCrmSync>> {
        self.repo.crm_syncs(lead_id).await.repo()
    }
}

async fn push(connector: &dyn CrmConnector, system: CrmSystem, lead: &Lead) -> SyncResolution {
    match connector.push_lead(system, lead).await {
        Ok(external_id) => {
            info!(lead_id = %lead.id, system = %system, external_id = %external_id, "Lead synced to CRM");
            SyncResolution::Synced {
                external_id,
                at: Utc::now(),
            }
        }
        Err(e) => {
            let err = PipelineError::Sync {
                system: system.to_string(),
                message: format!("{e:#}"),
            };
            warn!(lead_id = %lead.id, error = %err, "CRM sync failed");
            SyncResolution::Error {
                message: format!("{e:#}"),
            }
        }
    }
}

/// Connector that pretends every push succeeds after `latency`.
#[derive(Debug, Clone, Default)]
pub struct SimulatedCrmConnector {
    latency: Duration,
}

impl SimulatedCrmConnector {
    pub fn with_latency(latency: Duration) -> Self {
        Self { latency }
    }
}

#[async_trait]
impl CrmConnector for SimulatedCrmConnector {
    async fn push_lead(&self, system: CrmSystem, _lead: &Lead) -> Result<String> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        Ok(format!("{system}-{}", Uuid::new_v4().simple()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryLeadRepository;
    use crate::testing::{lead_fixture, ScriptedCrmConnector};
    use leadintel_common::{SyncStatus, PLACEHOLDER_ID_PREFIX};

    async fn seeded_repo() -> (Arc<MemoryLeadRepository>, Uuid) {
        let repo = Arc::new(MemoryLeadRepository::new());
        let lead = lead_fixture("crm@x.com", 50);
        repo.insert_lead(&lead).await.unwrap();
        (repo, lead.id)
    }

    #[tokio::test]
    async fn pending_row_resolves_to_synced() {
        let (repo, lead_id) = seeded_repo().await;
        let tracker = SyncTracker::new(repo.clone(), Arc::new(SimulatedCrmConnector::default()));

        let pending = tracker.begin(lead_id, CrmSystem::Hubspot).await.unwrap();
        assert_eq!(pending.record.status, SyncStatus::Pending);
        assert!(pending.record.external_id.starts_with(PLACEHOLDER_ID_PREFIX));
        pending.handle.await.unwrap();

        let rows = tracker.history(lead_id).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, SyncStatus::Synced);
        assert!(rows[0].external_id.starts_with("hubspot-"));
        assert!(rows[0].last_synced.is_some());
    }

    #[tokio::test]
    async fn connector_failure_is_recorded_on_the_row() {
        let (repo, lead_id) = seeded_repo().await;
        let connector = Arc::new(ScriptedCrmConnector::failing("rate limited"));
        let tracker = SyncTracker::new(repo, connector);

        let pending = tracker.begin(lead_id, CrmSystem::Salesforce).await.unwrap();
        pending.handle.await.unwrap();

        let rows = tracker.history(lead_id).await.unwrap();
        assert_eq!(rows[0].status, SyncStatus::Error);
        assert_eq!(rows[0].error_message.as_deref(), Some("rate limited"));
        assert!(rows[0].has_placeholder_id());
    }

    #[tokio::test]
    async fn repeated_attempts_accumulate() {
        let (repo, lead_id) = seeded_repo().await;
        let tracker = SyncTracker::new(repo, Arc::new(SimulatedCrmConnector::default()));
        for system in [CrmSystem::Pipedrive, CrmSystem::Pipedrive, CrmSystem::Zoho] {
            tracker.begin(lead_id, system).await.unwrap().handle.await.unwrap();
        }
        assert_eq!(tracker.history(lead_id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn unknown_lead_writes_no_row() {
        let repo = Arc::new(MemoryLeadRepository::new());
        let tracker = SyncTracker::new(repo.clone(), Arc::new(SimulatedCrmConnector::default()));
        let lead_id = Uuid::new_v4();
        let err = tracker.begin(lead_id, CrmSystem::Zoho).await.err().unwrap();
        assert!(matches!(err, PipelineError::NotFound { .. }));
        assert!(repo.crm_syncs(lead_id).await.unwrap().is_empty());
    }
}
