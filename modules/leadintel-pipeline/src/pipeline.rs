//! `LeadPipeline`: the entry points of the lead intelligence pipeline.
//!
//! Built from an injected `LeadRepository` plus optional lead sources,
//! delivery channels and CRM connector. Cheap to clone; every clone shares the
//! same collaborators.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::info;
use typed_builder::TypedBuilder;
use uuid::Uuid;

use leadintel_common::{
    ActivityEvent, Alert, AlertFilter, CompetitorChange, CrmSystem, DeliveryOutcome,
    ExternalCrmSync, FollowUpTask, JourneyStage, Lead, LeadCandidate, LeadSource, LeadStatus,
    MonitorConfig, NewTask, PipelineError, PipelineResult, Playbook, PlaybookStatus,
    RelatedEntities, RepoResultExt, RulesConfig, StagePayload, Task, TaskFilter, TaskStatus,
    TriggerCondition,
};

use crate::aggregator::SourceAggregator;
use crate::alerts::dispatcher::AlertDispatcher;
use crate::alerts::monitor::{spawn_monitor, MonitorHandle};
use crate::crm_sync::{PendingSync, SimulatedCrmConnector, SyncTracker};
use crate::dedup::{DedupResult, MergeEngine};
use crate::journey::JourneyTracker;
use crate::rules::{PlannedTask, RuleEngine};
use crate::scoring::{ScoreUpdate, ScoringEngine};
use crate::store::{modify_lead, modify_playbook};
use crate::traits::{ChangeSource, CrmConnector, DeliveryChannel, LeadRepository, LeadSourceChannel};

/// Collaborators for a `LeadPipeline`.
#[derive(Clone, TypedBuilder)]
pub struct PipelineDeps {
    pub repo: Arc<dyn LeadRepository>,
    #[builder(default)]
    pub rules: RulesConfig,
    #[builder(default)]
    pub sources: Vec<Arc<dyn LeadSourceChannel>>,
    #[builder(default)]
    pub channels: Vec<Arc<dyn DeliveryChannel>>,
    #[builder(default = Arc::new(SimulatedCrmConnector::default()) as Arc<dyn CrmConnector>)]
    pub crm: Arc<dyn CrmConnector>,
}

/// A processed candidate and the follow-up tasks its ingestion produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedLead {
    pub lead: Lead,
    pub is_duplicate: bool,
    pub tasks: Vec<Task>,
}

/// Result of a score update, with the high-intent task if it fired.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredActivity {
    pub update: ScoreUpdate,
    pub high_intent_task: Option<Task>,
}

impl ScoredActivity {
    pub fn new_score(&self) -> u8 {
        self.update.new_score
    }
}

/// Everything produced by one competitor change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompetitorResponse {
    pub alert: Alert,
    pub task: Option<Task>,
    pub playbook: Option<Playbook>,
    pub deliveries: Vec<DeliveryOutcome>,
}

#[derive(Clone)]
pub struct LeadPipeline {
    repo: Arc<dyn LeadRepository>,
    rules: RuleEngine,
    merge: MergeEngine,
    scoring: ScoringEngine,
    journey: JourneyTracker,
    aggregator: SourceAggregator,
    dispatcher: AlertDispatcher,
    sync: SyncTracker,
}

impl LeadPipeline {
    pub fn new(deps: PipelineDeps) -> Self {
        let PipelineDeps {
            repo,
            rules,
            sources,
            channels,
            crm,
        } = deps;

        let max_attempts = rules.merge.max_attempts;
        let dispatcher = channels
            .into_iter()
            .fold(AlertDispatcher::new(), AlertDispatcher::with_channel);

        Self {
            merge: MergeEngine::new(repo.clone(), max_attempts),
            scoring: ScoringEngine::new(
                repo.clone(),
                rules.scoring.high_intent_threshold,
                max_attempts,
            ),
            journey: JourneyTracker::new(repo.clone()),
            aggregator: SourceAggregator::new(sources),
            sync: SyncTracker::new(repo.clone(), crm),
            dispatcher,
            rules: RuleEngine::new(rules),
            repo,
        }
    }

    pub fn repository(&self) -> &Arc<dyn LeadRepository> {
        &self.repo
    }

    pub fn rules(&self) -> &RulesConfig {
        self.rules.rules()
    }

    // --- Leads ---

    /// Pull every source, dedup each sighting, and return the leads that
    /// did not exist before.
    pub async fn aggregate_leads_from_sources(&self) -> PipelineResult<Vec<Lead>> {
        let candidates = self.aggregator.collect().await;
        let total = candidates.len();

        let mut created = Vec::new();
        for candidate in &candidates {
            let result = self.merge.match_and_merge(candidate).await?;
            if !result.is_duplicate {
                created.push(result.matched_lead);
            }
        }

        info!(sightings = total, new_leads = created.len(), "Lead aggregation complete");
        Ok(created)
    }

    pub async fn match_and_deduplicate_leads(
        &self,
        candidate: &LeadCandidate,
    ) -> PipelineResult<DedupResult> {
        self.merge.match_and_merge(candidate).await
    }

    /// Dedup a candidate, then run the ingestion task rules on the stored lead.
    pub async fn process_lead_through_pipeline(
        &self,
        candidate: &LeadCandidate,
    ) -> PipelineResult<ProcessedLead> {
        let DedupResult {
            is_duplicate,
            matched_lead: lead,
        } = self.merge.match_and_merge(candidate).await?;

        let planned = self.rules.lead_tasks(&lead, Utc::now());
        let tasks = self.create_lead_tasks(lead.id, planned).await?;

        info!(
            lead_id = %lead.id,
            is_duplicate,
            score = lead.intent_score,
            tasks = tasks.len(),
            "Lead processed"
        );
        Ok(ProcessedLead {
            lead,
            is_duplicate,
            tasks,
        })
    }

    pub async fn update_lead_score(
        &self,
        lead_id: Uuid,
        activity: &ActivityEvent,
    ) -> PipelineResult<ScoredActivity> {
        let update = self.scoring.update_score(lead_id, activity).await?;

        let high_intent_task = if update.crossed_high_intent {
            let planned = self.rules.high_intent_task(&update.lead, Utc::now());
            self.create_lead_tasks(lead_id, vec![planned]).await?.pop()
        } else {
            None
        };

        Ok(ScoredActivity {
            update,
            high_intent_task,
        })
    }

    /// Manual pipeline-stage change. Entering a conversion status appends a
    /// conversion stage. Setting the current status is a no-op.
    pub async fn update_lead_status(
        &self,
        lead_id: Uuid,
        status: LeadStatus,
    ) -> PipelineResult<Lead> {
        let current = self.lead(lead_id).await?;
        if current.status == status {
            return Ok(current);
        }

        let (before, after) = modify_lead(
            self.repo.as_ref(),
            lead_id,
            self.rules().merge.max_attempts,
            |lead| {
                let mut next = lead.clone();
                next.status = status;
                Ok(next)
            },
        )
        .await?;

        if status.is_conversion() && before.status != status {
            self.journey
                .add_stage(
                    lead_id,
                    StagePayload::Conversion {
                        from_status: before.status,
                        to_status: status,
                    },
                )
                .await?;
        }

        info!(lead_id = %lead_id, from = %before.status, to = %status, "Lead status changed");
        Ok(after)
    }

    pub async fn lead(&self, lead_id: Uuid) -> PipelineResult<Lead> {
        self.repo
            .lead(lead_id)
            .await
            .repo()?
            .ok_or_else(|| PipelineError::not_found("lead", lead_id))
    }

    pub async fn lead_sources(&self, lead_id: Uuid) -> PipelineResult<Vec<LeadSource>> {
        self.repo.lead_sources(lead_id).await.repo()
    }

    // --- Journey ---

    pub async fn journey(&self, lead_id: Uuid) -> PipelineResult<Vec<JourneyStage>> {
        self.journey.stages(lead_id).await
    }

    pub async fn journey_completion(&self, lead_id: Uuid) -> PipelineResult<u8> {
        self.journey.completion(lead_id).await
    }

    // --- Tasks ---

    /// Validate every planned task, then persist each with its follow-up link.
    async fn create_lead_tasks(
        &self,
        lead_id: Uuid,
        planned: Vec<PlannedTask>,
    ) -> PipelineResult<Vec<Task>> {
        let now = Utc::now();
        let built = planned
            .into_iter()
            .map(|p| Task::create(p.task, now).map(|task| (task, p.trigger)))
            .collect::<PipelineResult<Vec<_>>>()?;

        let mut tasks = Vec::with_capacity(built.len());
        for (task, trigger) in built {
            self.repo.insert_task(&task).await.repo()?;
            self.repo
                .insert_follow_up(&FollowUpTask::link(lead_id, &task, trigger))
                .await
                .repo()?;
            info!(
                lead_id = %lead_id,
                task_id = %task.id,
                category = %task.category,
                priority = task.priority,
                trigger = %trigger,
                "Task created"
            );
            tasks.push(task);
        }
        Ok(tasks)
    }

    pub async fn create_manual_task(&self, lead_id: Uuid, new: NewTask) -> PipelineResult<Task> {
        self.lead(lead_id).await?;
        let new = NewTask {
            related: RelatedEntities::Lead { lead_id },
            ..new
        };
        let planned = PlannedTask {
            task: new,
            trigger: TriggerCondition::Manual,
        };
        self.create_lead_tasks(lead_id, vec![planned])
            .await?
            .pop()
            .ok_or_else(|| PipelineError::validation("manual task was not created"))
    }

    pub async fn update_task_status(
        &self,
        task_id: Uuid,
        status: TaskStatus,
    ) -> PipelineResult<Task> {
        let task = self
            .repo
            .update_task_status(task_id, status, Utc::now())
            .await
            .repo()?
            .ok_or_else(|| PipelineError::not_found("task", task_id))?;
        info!(task_id = %task_id, status = %status, "Task status updated");
        Ok(task)
    }

    pub async fn list_tasks(&self, filter: &TaskFilter) -> PipelineResult<Vec<Task>> {
        self.repo.list_tasks(filter).await.repo()
    }

    pub async fn follow_ups(&self, lead_id: Uuid) -> PipelineResult<Vec<(FollowUpTask, Task)>> {
        self.repo.follow_ups(lead_id).await.repo()
    }

    // --- Competitor changes ---

    /// Persist an alert for the change, apply the task and playbook rules,
    /// then fan the alert out. Delivery failures only show up in `deliveries`.
    pub async fn create_competitor_alert(
        &self,
        change: &CompetitorChange,
        monitor: &MonitorConfig,
    ) -> PipelineResult<CompetitorResponse> {
        change.validate()?;
        let now = Utc::now();

        let alert = Alert::for_change(change, monitor, now);
        let task = self
            .rules
            .competitor_task(change, monitor, alert.id, now)
            .map(|new| Task::create(new, now))
            .transpose()?;
        let playbook = self.rules.draft_playbook(change, monitor, alert.id, now);

        self.repo.insert_alert(&alert).await.repo()?;
        info!(
            alert_id = %alert.id,
            competitor_id = %change.competitor_id,
            change_type = %change.change_type,
            impact = change.impact_score,
            severity = %alert.severity,
            "Competitor alert created"
        );

        if let Some(task) = &task {
            self.repo.insert_task(task).await.repo()?;
            info!(task_id = %task.id, priority = task.priority, "Competitor response task created");
        }
        if let Some(playbook) = &playbook {
            self.repo.insert_playbook(playbook).await.repo()?;
            info!(
                playbook_id = %playbook.id,
                actions = playbook.actions.len(),
                "Playbook drafted"
            );
        }

        let deliveries = self.dispatcher.dispatch(&alert).await;
        Ok(CompetitorResponse {
            alert,
            task,
            playbook,
            deliveries,
        })
    }

    /// Poll `source` for every monitor on `interval` until the handle is stopped.
    pub fn start_monitoring(
        &self,
        monitors: Vec<MonitorConfig>,
        source: Arc<dyn ChangeSource>,
        interval: Duration,
    ) -> MonitorHandle {
        spawn_monitor(self.clone(), monitors, source, interval)
    }

    pub async fn list_alerts(&self, filter: &AlertFilter) -> PipelineResult<Vec<Alert>> {
        self.repo.list_alerts(filter).await.repo()
    }

    pub async fn mark_alert_read(&self, alert_id: Uuid) -> PipelineResult<Alert> {
        self.repo
            .mark_alert_read(alert_id)
            .await
            .repo()?
            .ok_or_else(|| PipelineError::not_found("alert", alert_id))
    }

    // --- Playbooks ---

    pub async fn list_playbooks(&self) -> PipelineResult<Vec<Playbook>> {
        self.repo.list_playbooks().await.repo()
    }

    pub async fn playbook(&self, playbook_id: Uuid) -> PipelineResult<Playbook> {
        self.repo
            .playbook(playbook_id)
            .await
            .repo()?
            .ok_or_else(|| PipelineError::not_found("playbook", playbook_id))
    }

    /// Move a playbook one step forward. Any other target is rejected.
    pub async fn advance_playbook(
        &self,
        playbook_id: Uuid,
        target: PlaybookStatus,
    ) -> PipelineResult<Playbook> {
        let (before, after) = modify_playbook(
            self.repo.as_ref(),
            playbook_id,
            self.rules().merge.max_attempts,
            |playbook| playbook.advance(target, Utc::now()),
        )
        .await?;
        info!(playbook_id = %playbook_id, from = %before.status, to = %target, "Playbook advanced");
        Ok(after)
    }

    pub async fn assign_playbook_action(
        &self,
        playbook_id: Uuid,
        action_index: usize,
        assignee: &str,
    ) -> PipelineResult<Playbook> {
        let (_, after) = modify_playbook(
            self.repo.as_ref(),
            playbook_id,
            self.rules().merge.max_attempts,
            |playbook| playbook.assign(action_index, assignee, Utc::now()),
        )
        .await?;
        Ok(after)
    }

    /// Fraction of actions with an assignee.
    pub async fn playbook_progress(&self, playbook_id: Uuid) -> PipelineResult<f64> {
        Ok(self.playbook(playbook_id).await?.progress())
    }

    // --- External CRM ---

    /// Write a pending sync row and resolve it in the background.
    pub async fn sync_lead_to_external_crm(
        &self,
        lead_id: Uuid,
        system: CrmSystem,
    ) -> PipelineResult<ExternalCrmSync> {
        let PendingSync { record, handle } = self.sync.begin(lead_id, system).await?;
        drop(handle);
        Ok(record)
    }

    /// Like `sync_lead_to_external_crm`, but hands back the background task.
    pub async fn begin_crm_sync(
        &self,
        lead_id: Uuid,
        system: CrmSystem,
    ) -> PipelineResult<PendingSync> {
        self.sync.begin(lead_id, system).await
    }

    pub async fn crm_syncs(&self, lead_id: Uuid) -> PipelineResult<Vec<ExternalCrmSync>> {
        self.sync.history(lead_id).await
    }
}
