// Test fixtures for the lead pipeline.
//
// Mocks for the collaborator traits:
// - StaticLeadSource / FailingLeadSource (LeadSourceChannel)
// - RecordingChannel / FailingChannel (DeliveryChannel)
// - ScriptedChangeSource (ChangeSource): one scripted batch per tick
// - ScriptedCrmConnector (CrmConnector): scripted external ids or failures
// - StaticSnapshotProvider (SnapshotProvider): scripted snapshot sequence
//
// Plus builders for candidates, sightings, leads and competitor changes.
// MemoryLeadRepository (in `store`) is the repository fixture.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use leadintel_common::{
    Alert, ChangeDetails, ChangeType, ChannelKind, CompetitorChange, CrmSystem, Enrichment,
    Identity, Lead, LeadCandidate, MonitorConfig, Provenance, SourceChannel,
};

use crate::aggregator::RawSighting;
use crate::alerts::detect::CompetitorSnapshot;
use crate::traits::{
    ChangeSource, CrmConnector, DeliveryChannel, LeadSourceChannel, SnapshotProvider,
};

// ---------------------------------------------------------------------------
// Lead sources
// ---------------------------------------------------------------------------

/// Returns the same sightings on every fetch.
pub struct StaticLeadSource {
    channel: SourceChannel,
    sightings: Vec<RawSighting>,
}

impl StaticLeadSource {
    pub fn new(channel: SourceChannel, sightings: Vec<RawSighting>) -> Self {
        Self { channel, sightings }
    }
}

#[async_trait]
impl LeadSourceChannel for StaticLeadSource {
    fn channel(&self) -> SourceChannel {
        self.channel
    }

    async fn fetch(&self) -> Result<Vec<RawSighting>> {
        Ok(self.sightings.clone())
    }
}

pub struct FailingLeadSource {
    channel: SourceChannel,
}

impl FailingLeadSource {
    pub fn new(channel: SourceChannel) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl LeadSourceChannel for FailingLeadSource {
    fn channel(&self) -> SourceChannel {
        self.channel
    }

    async fn fetch(&self) -> Result<Vec<RawSighting>> {
        bail!("{} source unavailable", self.channel)
    }
}

// ---------------------------------------------------------------------------
// Delivery channels
// ---------------------------------------------------------------------------

/// Records every alert it is asked to deliver.
pub struct RecordingChannel {
    kind: ChannelKind,
    delivered: Mutex<Vec<Alert>>,
}

impl RecordingChannel {
    pub fn new(kind: ChannelKind) -> Self {
        Self {
            kind,
            delivered: Mutex::new(Vec::new()),
        }
    }

    pub fn delivered(&self) -> Vec<Alert> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn delivered_ids(&self) -> Vec<Uuid> {
        self.delivered.lock().unwrap().iter().map(|a| a.id).collect()
    }
}

#[async_trait]
impl DeliveryChannel for RecordingChannel {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    async fn deliver(&self, alert: &Alert) -> Result<()> {
        self.delivered.lock().unwrap().push(alert.clone());
        Ok(())
    }
}

pub struct FailingChannel {
    kind: ChannelKind,
}

impl FailingChannel {
    pub fn new(kind: ChannelKind) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl DeliveryChannel for FailingChannel {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    async fn deliver(&self, _alert: &Alert) -> Result<()> {
        bail!("{} gateway timed out", self.kind)
    }
}

// ---------------------------------------------------------------------------
// ScriptedChangeSource
// ---------------------------------------------------------------------------

/// Pops one scripted batch per `detect` call; empty once the script runs out.
/// A scripted `Err` makes that tick fail.
pub struct ScriptedChangeSource {
    script: Mutex<VecDeque<Result<Vec<CompetitorChange>, String>>>,
    calls: AtomicUsize,
}

impl ScriptedChangeSource {
    pub fn new(batches: Vec<Vec<CompetitorChange>>) -> Self {
        Self {
            script: Mutex::new(batches.into_iter().map(Ok).collect()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Append a failing tick to the script.
    pub fn then_fail(self, message: &str) -> Self {
        self.script
            .lock()
            .unwrap()
            .push_back(Err(message.to_string()));
        self
    }

    pub fn then(self, batch: Vec<CompetitorChange>) -> Self {
        self.script.lock().unwrap().push_back(Ok(batch));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().unwrap().len()
    }
}

#[async_trait]
impl ChangeSource for ScriptedChangeSource {
    async fn detect(&self, _monitor: &MonitorConfig) -> Result<Vec<CompetitorChange>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.script.lock().unwrap().pop_front() {
            Some(Ok(batch)) => Ok(batch),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Ok(Vec::new()),
        }
    }
}

// ---------------------------------------------------------------------------
// ScriptedCrmConnector
// ---------------------------------------------------------------------------

/// Scripted CRM responses in call order, then a fixed fallback.
pub struct ScriptedCrmConnector {
    script: Mutex<VecDeque<Result<String, String>>>,
    fallback: Result<String, String>,
    pushed: Mutex<Vec<(CrmSystem, Uuid)>>,
}

impl ScriptedCrmConnector {
    pub fn new(responses: Vec<Result<String, String>>) -> Self {
        Self {
            script: Mutex::new(responses.into()),
            fallback: Err("script exhausted".to_string()),
            pushed: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            fallback: Err(message.to_string()),
            ..Self::new(Vec::new())
        }
    }

    pub fn succeeding(external_id: &str) -> Self {
        Self {
            fallback: Ok(external_id.to_string()),
            ..Self::new(Vec::new())
        }
    }

    pub fn pushed(&self) -> Vec<(CrmSystem, Uuid)> {
        self.pushed.lock().unwrap().clone()
    }
}

#[async_trait]
impl CrmConnector for ScriptedCrmConnector {
    async fn push_lead(&self, system: CrmSystem, lead: &Lead) -> Result<String> {
        self.pushed.lock().unwrap().push((system, lead.id));
        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        next.map_err(|message| anyhow!(message))
    }
}

// ---------------------------------------------------------------------------
// StaticSnapshotProvider
// ---------------------------------------------------------------------------

/// Serves scripted snapshots per competitor; repeats the last one when exhausted.
#[derive(Default)]
pub struct StaticSnapshotProvider {
    snapshots: Mutex<HashMap<String, VecDeque<CompetitorSnapshot>>>,
}

impl StaticSnapshotProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, competitor_id: &str, snapshots: Vec<CompetitorSnapshot>) -> Self {
        self.snapshots
            .lock()
            .unwrap()
            .insert(competitor_id.to_string(), snapshots.into());
        self
    }
}

#[async_trait]
impl SnapshotProvider for StaticSnapshotProvider {
    async fn snapshot(&self, monitor: &MonitorConfig) -> Result<CompetitorSnapshot> {
        let mut all = self.snapshots.lock().unwrap();
        let queue = all
            .get_mut(&monitor.competitor_id)
            .ok_or_else(|| anyhow!("no snapshots for {}", monitor.competitor_id))?;
        match queue.len() {
            0 => bail!("no snapshots for {}", monitor.competitor_id),
            1 => Ok(queue[0].clone()),
            _ => Ok(queue.pop_front().unwrap_or_default()),
        }
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

pub fn locator(query: &str) -> Provenance {
    Provenance::LocatorSearch {
        query: query.to_string(),
        location: None,
        rank: Some(1),
    }
}

pub fn campaign(campaign_id: &str) -> Provenance {
    Provenance::CampaignClick {
        campaign_id: campaign_id.to_string(),
        ad_id: None,
        landing_page: None,
    }
}

pub fn candidate(email: &str, score: i64, provenance: Provenance) -> LeadCandidate {
    LeadCandidate::new(Identity::email(email), provenance)
        .with_score(score)
        .expect("fixture score in range")
}

/// Candidate from a locator search.
pub fn locator_candidate(email: &str, score: i64) -> LeadCandidate {
    candidate(email, score, locator("dentist near me"))
}

/// Candidate from a campaign click.
pub fn campaign_candidate(email: &str, score: i64) -> LeadCandidate {
    candidate(email, score, campaign("spring-promo"))
}

pub fn with_company_size(candidate: LeadCandidate, size: &str) -> LeadCandidate {
    candidate.with_enrichment(Enrichment {
        company_size: Some(size.to_string()),
        ..Default::default()
    })
}

pub fn sighting(email: &str, score: i64, provenance: Provenance) -> RawSighting {
    RawSighting {
        email: Some(email.to_string()),
        intent_score: Some(score),
        ..RawSighting::new(provenance)
    }
}

/// An unsaved lead built from a locator candidate.
pub fn lead_fixture(email: &str, score: i64) -> Lead {
    Lead::from_candidate(&locator_candidate(email, score), Utc::now())
}

pub fn monitor(competitor_id: &str, channels: Vec<ChannelKind>) -> MonitorConfig {
    MonitorConfig {
        channels,
        auto_create_tasks: true,
        auto_create_playbooks: true,
        ..MonitorConfig::new(competitor_id, &competitor_name(competitor_id))
    }
}

fn competitor_name(competitor_id: &str) -> String {
    let mut chars = competitor_id.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub fn change_fixture(
    competitor_id: &str,
    change_type: ChangeType,
    impact_score: f64,
) -> CompetitorChange {
    CompetitorChange {
        competitor_id: competitor_id.to_string(),
        competitor_name: competitor_name(competitor_id),
        change_type,
        impact_score,
        details: ChangeDetails::Simulated {
            note: "fixture".to_string(),
        },
        detected_at: Utc::now(),
    }
}
