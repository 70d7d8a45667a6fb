//! Integration tests for PgLeadRepository.
//! Requires a Postgres instance. Set DATABASE_TEST_URL or these tests are skipped.
//!
//! Tests share one database, so every test works on its own random identities.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use leadintel_common::{ActivityEvent, CrmSystem, Identity, Lead, StagePayload, SyncStatus};
use leadintel_pipeline::testing::*;
use leadintel_pipeline::{
    CrmConnector, LeadPipeline, LeadRepository, PgLeadRepository, PipelineDeps, WriteOutcome,
};

/// Get a migrated repository, or skip if no test DB is available.
async fn test_repo() -> Option<PgLeadRepository> {
    let url = std::env::var("DATABASE_TEST_URL").ok()?;
    let repo = PgLeadRepository::connect(&url).await.ok()?;
    repo.migrate().await.ok()?;
    Some(repo)
}

fn unique_email() -> String {
    format!("{}@pg.test", Uuid::new_v4().simple())
}

// =========================================================================
// Repository contract
// =========================================================================

#[tokio::test]
async fn second_lead_with_same_email_conflicts() {
    let Some(repo) = test_repo().await else {
        return;
    };
    let email = unique_email();

    let first = lead_fixture(&email, 40);
    assert_eq!(repo.insert_lead(&first).await.unwrap(), WriteOutcome::Applied);

    let second = lead_fixture(&email, 90);
    assert_eq!(repo.insert_lead(&second).await.unwrap(), WriteOutcome::Conflict);

    let found = repo
        .find_lead_by_identity(&Identity::email(&email))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, first.id);
}

#[tokio::test]
async fn stale_version_update_conflicts() {
    let Some(repo) = test_repo().await else {
        return;
    };
    let lead = lead_fixture(&unique_email(), 40);
    repo.insert_lead(&lead).await.unwrap();

    let bumped = Lead {
        intent_score: 55,
        version: lead.version + 1,
        ..lead.clone()
    };
    assert_eq!(
        repo.update_lead(&bumped, lead.version).await.unwrap(),
        WriteOutcome::Applied
    );

    let stale = Lead {
        intent_score: 10,
        version: lead.version + 1,
        ..lead.clone()
    };
    assert_eq!(
        repo.update_lead(&stale, lead.version).await.unwrap(),
        WriteOutcome::Conflict
    );

    let stored = repo.lead(lead.id).await.unwrap().unwrap();
    assert_eq!(stored.intent_score, 55);
    assert_eq!(stored.version, lead.version + 1);
}

#[tokio::test]
async fn update_cannot_take_another_leads_phone() {
    let Some(repo) = test_repo().await else {
        return;
    };
    let phone = format!("555{}", Uuid::new_v4().as_u128() % 10_000_000);
    let owner = Lead {
        identity: Identity::phone(&phone),
        ..lead_fixture(&unique_email(), 30)
    };
    repo.insert_lead(&owner).await.unwrap();

    let other = lead_fixture(&unique_email(), 30);
    repo.insert_lead(&other).await.unwrap();
    let claim = Lead {
        identity: Identity::new(other.identity.email.as_deref(), Some(&phone)),
        version: other.version + 1,
        ..other.clone()
    };
    assert_eq!(
        repo.update_lead(&claim, other.version).await.unwrap(),
        WriteOutcome::Conflict
    );

    let found = repo
        .find_lead_by_identity(&Identity::phone(&phone))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, owner.id);
    let stored = repo.lead(other.id).await.unwrap().unwrap();
    assert_eq!(stored.identity.phone, None);
}

#[tokio::test]
async fn concurrent_stage_appends_get_distinct_sequence_numbers() {
    let Some(repo) = test_repo().await else {
        return;
    };
    let repo = Arc::new(repo);
    let lead = lead_fixture(&unique_email(), 40);
    repo.insert_lead(&lead).await.unwrap();
    let lead_id = lead.id;

    let mut handles = Vec::new();
    for i in 0..8 {
        let repo = repo.clone();
        handles.push(tokio::spawn(async move {
            let payload = StagePayload::Touchpoint {
                activity: ActivityEvent::WebsiteVisit { pages_visited: i },
                delta: 2,
                new_score: 42,
            };
            repo.append_journey_stage(lead_id, &payload, Utc::now()).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let orders: Vec<u32> = repo
        .journey_stages(lead_id)
        .await
        .unwrap()
        .iter()
        .map(|s| s.sequence_order)
        .collect();
    assert_eq!(orders, (1..=8).collect::<Vec<u32>>());
}

// =========================================================================
// Pipeline on Postgres
// =========================================================================

#[tokio::test]
async fn pipeline_dedups_and_syncs_on_postgres() {
    let Some(repo) = test_repo().await else {
        return;
    };
    let pipeline = LeadPipeline::new(
        PipelineDeps::builder()
            .repo(Arc::new(repo))
            .crm(Arc::new(ScriptedCrmConnector::succeeding("hs-42")) as Arc<dyn CrmConnector>)
            .build(),
    );
    let email = unique_email();

    let first = pipeline
        .process_lead_through_pipeline(&locator_candidate(&email, 60))
        .await
        .unwrap();
    let second = pipeline
        .process_lead_through_pipeline(&campaign_candidate(&email, 86))
        .await
        .unwrap();
    assert!(second.is_duplicate);
    assert_eq!(second.lead.id, first.lead.id);
    assert_eq!(second.lead.intent_score, 86);
    assert_eq!(pipeline.lead_sources(first.lead.id).await.unwrap().len(), 2);

    let pending = pipeline
        .begin_crm_sync(first.lead.id, CrmSystem::Hubspot)
        .await
        .unwrap();
    pending.handle.await.unwrap();

    let history = pipeline.crm_syncs(first.lead.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, SyncStatus::Synced);
    assert_eq!(history[0].external_id, "hs-42");
}
