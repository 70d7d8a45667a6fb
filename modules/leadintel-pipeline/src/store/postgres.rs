//! Postgres `LeadRepository`.
//!
//! Records are stored as JSONB documents next to the columns needed for
//! identity uniqueness, ordering and conditional updates. Identity claims rely
//! on the `UNIQUE` email/phone columns; lead updates are guarded by `version`.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use leadintel_common::{
    Alert, AlertFilter, ExternalCrmSync, FollowUpTask, Identity, JourneyStage, Lead, LeadSource,
    Playbook, StagePayload, SyncResolution, Task, TaskFilter, TaskStatus,
};

use crate::traits::{LeadRepository, WriteOutcome};

const MIGRATION: &str = include_str!("../../migrations/0001_lead_intel.sql");

/// Concurrent appends for one lead may race for the same sequence number.
const STAGE_INSERT_ATTEMPTS: u32 = 3;

#[derive(Clone)]
pub struct PgLeadRepository {
    pool: PgPool,
}

impl PgLeadRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self::new(pool))
    }

    /// Create the pipeline tables if they do not exist (idempotent).
    pub async fn migrate(&self) -> Result<()> {
        sqlx::raw_sql(MIGRATION).execute(&self.pool).await?;
        info!("Lead intelligence schema is up to date");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn lead_by_column(&self, sql: &str, value: &str) -> Result<Option<Lead>> {
        let row = sqlx::query_scalar::<_, Json<Lead>>(sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|Json(lead)| lead))
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait]
impl LeadRepository for PgLeadRepository {
    async fn insert_lead(&self, lead: &Lead) -> Result<WriteOutcome> {
        let result = sqlx::query(
            "INSERT INTO leads (id, email, phone, version, body, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT DO NOTHING",
        )
        .bind(lead.id)
        .bind(&lead.identity.email)
        .bind(&lead.identity.phone)
        .bind(lead.version as i64)
        .bind(Json(lead))
        .bind(lead.created_at)
        .bind(lead.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(if result.rows_affected() == 1 {
            WriteOutcome::Applied
        } else {
            WriteOutcome::Conflict
        })
    }

    async fn lead(&self, id: Uuid) -> Result<Option<Lead>> {
        let row = sqlx::query_scalar::<_, Json<Lead>>("SELECT body FROM leads WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|Json(lead)| lead))
    }

    async fn find_lead_by_identity(&self, identity: &Identity) -> Result<Option<Lead>> {
        if let Some(email) = &identity.email {
            if let Some(lead) = self
                .lead_by_column("SELECT body FROM leads WHERE email = $1", email)
                .await?
            {
                return Ok(Some(lead));
            }
        }
        if let Some(phone) = &identity.phone {
            return self
                .lead_by_column("SELECT body FROM leads WHERE phone = $1", phone)
                .await;
        }
        Ok(None)
    }

    async fn update_lead(&self, lead: &Lead, expected_version: u64) -> Result<WriteOutcome> {
        // Identity values owned by another lead fail the write like a stale version.
        let result = sqlx::query(
            "UPDATE leads SET
                email = COALESCE($2, email),
                phone = COALESCE($3, phone),
                version = $4,
                body = $5,
                updated_at = $6
             WHERE id = $1 AND version = $7
               AND NOT EXISTS (
                   SELECT 1 FROM leads o
                   WHERE o.id <> $1 AND (o.email = $2 OR o.phone = $3)
               )",
        )
        .bind(lead.id)
        .bind(&lead.identity.email)
        .bind(&lead.identity.phone)
        .bind(lead.version as i64)
        .bind(Json(lead))
        .bind(lead.updated_at)
        .bind(expected_version as i64)
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) if done.rows_affected() == 1 => Ok(WriteOutcome::Applied),
            Ok(_) => Ok(WriteOutcome::Conflict),
            Err(e) if is_unique_violation(&e) => Ok(WriteOutcome::Conflict),
            Err(e) => Err(e.into()),
        }
    }

    async fn insert_lead_source(&self, source: &LeadSource) -> Result<()> {
        sqlx::query(
            "INSERT INTO lead_sources (id, lead_id, body, recorded_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(source.id)
        .bind(source.lead_id)
        .bind(Json(source))
        .bind(source.recorded_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn lead_sources(&self, lead_id: Uuid) -> Result<Vec<LeadSource>> {
        let rows = sqlx::query_scalar::<_, Json<LeadSource>>(
            "SELECT body FROM lead_sources WHERE lead_id = $1 ORDER BY recorded_at",
        )
        .bind(lead_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|Json(s)| s).collect())
    }

    async fn append_journey_stage(
        &self,
        lead_id: Uuid,
        payload: &StagePayload,
        recorded_at: DateTime<Utc>,
    ) -> Result<JourneyStage> {
        let id = Uuid::new_v4();
        let mut attempt = 0;
        loop {
            attempt += 1;
            let inserted = sqlx::query_scalar::<_, i32>(
                "INSERT INTO journey_stages (id, lead_id, sequence_order, payload, recorded_at)
                 SELECT $1, $2, COALESCE(MAX(sequence_order), 0) + 1, $3, $4
                 FROM journey_stages WHERE lead_id = $2
                 RETURNING sequence_order",
            )
            .bind(id)
            .bind(lead_id)
            .bind(Json(payload))
            .bind(recorded_at)
            .fetch_one(&self.pool)
            .await;

            match inserted {
                Ok(sequence_order) => {
                    return Ok(JourneyStage {
                        id,
                        lead_id,
                        sequence_order: sequence_order as u32,
                        payload: payload.clone(),
                        recorded_at,
                    })
                }
                Err(e) if is_unique_violation(&e) && attempt < STAGE_INSERT_ATTEMPTS => {
                    warn!(lead_id = %lead_id, attempt, "Journey sequence collision, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn journey_stages(&self, lead_id: Uuid) -> Result<Vec<JourneyStage>> {
        let rows = sqlx::query_as::<_, (Uuid, Uuid, i32, Json<StagePayload>, DateTime<Utc>)>(
            "SELECT id, lead_id, sequence_order, payload, recorded_at
             FROM journey_stages WHERE lead_id = $1 ORDER BY sequence_order",
        )
        .bind(lead_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(
                |(id, lead_id, sequence_order, Json(payload), recorded_at)| JourneyStage {
                    id,
                    lead_id,
                    sequence_order: sequence_order as u32,
                    payload,
                    recorded_at,
                },
            )
            .collect())
    }

    async fn insert_task(&self, task: &Task) -> Result<()> {
        sqlx::query(
            "INSERT INTO tasks (id, lead_id, status, priority, body, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(task.id)
        .bind(task.related.lead_id())
        .bind(task.status.to_string())
        .bind(i16::from(task.priority))
        .bind(Json(task))
        .bind(task.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        let rows = sqlx::query_scalar::<_, Json<Task>>(
            "SELECT body FROM tasks
             WHERE ($1::uuid IS NULL OR lead_id = $1)
             ORDER BY created_at",
        )
        .bind(filter.lead_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|Json(t)| t)
            .filter(|t| filter.matches(t))
            .collect())
    }

    async fn update_task_status(
        &self,
        id: Uuid,
        status: TaskStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Task>> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query_scalar::<_, Json<Task>>(
            "SELECT body FROM tasks WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(Json(mut task)) = row else {
            return Ok(None);
        };
        task.status = status;
        task.updated_at = at;

        sqlx::query("UPDATE tasks SET status = $2, body = $3 WHERE id = $1")
            .bind(id)
            .bind(status.to_string())
            .bind(Json(&task))
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(Some(task))
    }

    async fn insert_follow_up(&self, link: &FollowUpTask) -> Result<()> {
        sqlx::query(
            "INSERT INTO follow_up_tasks (id, lead_id, task_id, body, created_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(link.id)
        .bind(link.lead_id)
        .bind(link.task_id)
        .bind(Json(link))
        .bind(link.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn follow_ups(&self, lead_id: Uuid) -> Result<Vec<(FollowUpTask, Task)>> {
        let rows = sqlx::query_as::<_, (Json<FollowUpTask>, Json<Task>)>(
            "SELECT f.body, t.body FROM follow_up_tasks f
             JOIN tasks t ON t.id = f.task_id
             WHERE f.lead_id = $1
             ORDER BY f.created_at",
        )
        .bind(lead_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(Json(link), Json(task))| (link, task))
            .collect())
    }

    async fn insert_playbook(&self, playbook: &Playbook) -> Result<()> {
        sqlx::query("INSERT INTO playbooks (id, version, body, created_at) VALUES ($1, $2, $3, $4)")
            .bind(playbook.id)
            .bind(playbook.version as i64)
            .bind(Json(playbook))
            .bind(playbook.created_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn playbook(&self, id: Uuid) -> Result<Option<Playbook>> {
        let row = sqlx::query_scalar::<_, Json<Playbook>>("SELECT body FROM playbooks WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|Json(p)| p))
    }

    async fn list_playbooks(&self) -> Result<Vec<Playbook>> {
        let rows =
            sqlx::query_scalar::<_, Json<Playbook>>("SELECT body FROM playbooks ORDER BY created_at")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|Json(p)| p).collect())
    }

    async fn update_playbook(
        &self,
        playbook: &Playbook,
        expected_version: u64,
    ) -> Result<WriteOutcome> {
        let result = sqlx::query(
            "UPDATE playbooks SET version = $2, body = $3 WHERE id = $1 AND version = $4",
        )
        .bind(playbook.id)
        .bind(playbook.version as i64)
        .bind(Json(playbook))
        .bind(expected_version as i64)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 1 {
            return Ok(WriteOutcome::Applied);
        }

        let exists = sqlx::query_scalar::<_, i64>("SELECT version FROM playbooks WHERE id = $1")
            .bind(playbook.id)
            .fetch_optional(&self.pool)
            .await?;
        match exists {
            Some(_) => Ok(WriteOutcome::Conflict),
            None => anyhow::bail!("playbook {} does not exist", playbook.id),
        }
    }

    async fn insert_alert(&self, alert: &Alert) -> Result<()> {
        sqlx::query(
            "INSERT INTO alerts (id, competitor_id, read, body, created_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(alert.id)
        .bind(alert.competitor_id())
        .bind(alert.read)
        .bind(Json(alert))
        .bind(alert.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_alerts(&self, filter: &AlertFilter) -> Result<Vec<Alert>> {
        let rows = sqlx::query_scalar::<_, Json<Alert>>(
            "SELECT body FROM alerts
             WHERE ($1::text IS NULL OR competitor_id = $1)
               AND (NOT $2 OR NOT read)
             ORDER BY created_at",
        )
        .bind(&filter.competitor_id)
        .bind(filter.unread_only)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|Json(a)| a)
            .filter(|a| filter.matches(a))
            .collect())
    }

    async fn mark_alert_read(&self, id: Uuid) -> Result<Option<Alert>> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query_scalar::<_, Json<Alert>>(
            "SELECT body FROM alerts WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(Json(mut alert)) = row else {
            return Ok(None);
        };
        alert.read = true;

        sqlx::query("UPDATE alerts SET read = TRUE, body = $2 WHERE id = $1")
            .bind(id)
            .bind(Json(&alert))
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(Some(alert))
    }

    async fn insert_crm_sync(&self, sync: &ExternalCrmSync) -> Result<()> {
        sqlx::query("INSERT INTO crm_syncs (id, lead_id, body, created_at) VALUES ($1, $2, $3, $4)")
            .bind(sync.id)
            .bind(sync.lead_id)
            .bind(Json(sync))
            .bind(sync.created_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn crm_syncs(&self, lead_id: Uuid) -> Result<Vec<ExternalCrmSync>> {
        let rows = sqlx::query_scalar::<_, Json<ExternalCrmSync>>(
            "SELECT body FROM crm_syncs WHERE lead_id = $1 ORDER BY created_at",
        )
        .bind(lead_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|Json(s)| s).collect())
    }

    async fn resolve_crm_sync(
        &self,
        id: Uuid,
        resolution: &SyncResolution,
    ) -> Result<Option<ExternalCrmSync>> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query_scalar::<_, Json<ExternalCrmSync>>(
            "SELECT body FROM crm_syncs WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(Json(mut sync)) = row else {
            return Ok(None);
        };
        resolution.apply(&mut sync);

        sqlx::query("UPDATE crm_syncs SET body = $2 WHERE id = $1")
            .bind(id)
            .bind(Json(&sync))
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(Some(sync))
    }
}
