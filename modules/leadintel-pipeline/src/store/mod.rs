pub mod memory;
pub mod postgres;

pub use memory::MemoryLeadRepository;
pub use postgres::PgLeadRepository;

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use leadintel_common::{Lead, PipelineError, PipelineResult, Playbook, RepoResultExt};

use crate::traits::{LeadRepository, WriteOutcome};

/// Read-modify-write one lead under optimistic locking.
///
/// `change` receives the current stored lead and returns its replacement; the
/// version is bumped here. On a version conflict the lead is re-read and
/// `change` runs again, up to `max_attempts` times. Returns `(before, after)`.
pub async fn modify_lead<F>(
    repo: &dyn LeadRepository,
    lead_id: Uuid,
    max_attempts: u32,
    mut change: F,
) -> PipelineResult<(Lead, Lead)>
where
    F: FnMut(&Lead) -> PipelineResult<Lead> + Send,
{
    for attempt in 1..=max_attempts {
        let current = repo
            .lead(lead_id)
            .await
            .repo()?
            .ok_or_else(|| PipelineError::not_found("lead", lead_id))?;

        let mut next = change(&current)?;
        next.version = current.version + 1;
        next.updated_at = Utc::now();

        match repo.update_lead(&next, current.version).await.repo()? {
            WriteOutcome::Applied => return Ok((current, next)),
            WriteOutcome::Conflict => {
                debug!(lead_id = %lead_id, attempt, "Lead version moved, retrying update");
            }
        }
    }
    Err(PipelineError::Conflict {
        entity: "lead",
        attempts: max_attempts,
    })
}

/// Read-modify-write one playbook under optimistic locking, like `modify_lead`.
pub async fn modify_playbook<F>(
    repo: &dyn LeadRepository,
    playbook_id: Uuid,
    max_attempts: u32,
    mut change: F,
) -> PipelineResult<(Playbook, Playbook)>
where
    F: FnMut(&mut Playbook) -> PipelineResult<()> + Send,
{
    for attempt in 1..=max_attempts {
        let current = repo
            .playbook(playbook_id)
            .await
            .repo()?
            .ok_or_else(|| PipelineError::not_found("playbook", playbook_id))?;

        let mut next = current.clone();
        change(&mut next)?;
        next.version = current.version + 1;

        match repo.update_playbook(&next, current.version).await.repo()? {
            WriteOutcome::Applied => return Ok((current, next)),
            WriteOutcome::Conflict => {
                debug!(playbook_id = %playbook_id, attempt, "Playbook version moved, retrying update");
            }
        }
    }
    Err(PipelineError::Conflict {
        entity: "playbook",
        attempts: max_attempts,
    })
}
