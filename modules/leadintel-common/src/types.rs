use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{PipelineError, PipelineResult};

pub const MIN_INTENT_SCORE: u8 = 0;
pub const MAX_INTENT_SCORE: u8 = 100;

// --- Identity ---

/// The dedup key of a lead. Values are stored normalized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub email: Option<String>,
    pub phone: Option<String>,
}

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern is a valid regex")
});

impl Identity {
    pub fn new(email: Option<&str>, phone: Option<&str>) -> Self {
        Self {
            email: email.and_then(normalize_email),
            phone: phone.and_then(normalize_phone),
        }
    }

    pub fn email(email: &str) -> Self {
        Self::new(Some(email), None)
    }

    pub fn phone(phone: &str) -> Self {
        Self::new(None, Some(phone))
    }

    pub fn is_empty(&self) -> bool {
        self.email.is_none() && self.phone.is_none()
    }

    /// At least one field must be present and the email, if any, well-formed.
    pub fn validate(&self) -> PipelineResult<()> {
        if self.is_empty() {
            return Err(PipelineError::validation(
                "lead candidate requires an email or a phone number",
            ));
        }
        if let Some(email) = &self.email {
            if !EMAIL_RE.is_match(email) {
                return Err(PipelineError::validation(format!(
                    "malformed email address: {email}"
                )));
            }
        }
        Ok(())
    }

    /// Fill fields this identity lacks from `other`. Existing values win.
    pub fn absorb(&mut self, other: &Identity) {
        if self.email.is_none() {
            self.email = other.email.clone();
        }
        if self.phone.is_none() {
            self.phone = other.phone.clone();
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.email, &self.phone) {
            (Some(e), Some(p)) => write!(f, "{e} / {p}"),
            (Some(e), None) => write!(f, "{e}"),
            (None, Some(p)) => write!(f, "{p}"),
            (None, None) => write!(f, "<no identity>"),
        }
    }
}

/// Trim and lowercase. Empty input is treated as absent.
pub fn normalize_email(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

/// Keep digits and a single leading `+`. Input without digits is absent.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    if trimmed.starts_with('+') {
        Some(format!("+{digits}"))
    } else {
        Some(digits)
    }
}

// --- Enums ---

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    #[default]
    New,
    Contacted,
    Qualified,
    Proposal,
    Negotiation,
    ClosedWon,
    ClosedLost,
}

impl LeadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Contacted => "contacted",
            Self::Qualified => "qualified",
            Self::Proposal => "proposal",
            Self::Negotiation => "negotiation",
            Self::ClosedWon => "closed_won",
            Self::ClosedLost => "closed_lost",
        }
    }

    /// Entering one of these statuses is recorded as a conversion stage.
    pub fn is_conversion(&self) -> bool {
        matches!(self, Self::Qualified | Self::ClosedWon)
    }
}

impl fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Origin channel a sighting came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceChannel {
    LocatorSearch,
    CampaignClick,
    AdIntelEngagement,
    Referral,
    Manual,
}

impl SourceChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LocatorSearch => "locator_search",
            Self::CampaignClick => "campaign_click",
            Self::AdIntelEngagement => "ad_intel_engagement",
            Self::Referral => "referral",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for SourceChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// --- Provenance ---

/// Raw provenance of one sighting, one variant per producing channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "channel", rename_all = "snake_case")]
pub enum Provenance {
    LocatorSearch {
        query: String,
        location: Option<String>,
        rank: Option<u32>,
    },
    CampaignClick {
        campaign_id: String,
        ad_id: Option<String>,
        landing_page: Option<String>,
    },
    AdIntelEngagement {
        competitor: String,
        ad_id: String,
        engagement: String,
    },
    Referral {
        referrer: String,
    },
    Manual {
        entered_by: Option<String>,
    },
}

impl Provenance {
    pub fn channel(&self) -> SourceChannel {
        match self {
            Self::LocatorSearch { .. } => SourceChannel::LocatorSearch,
            Self::CampaignClick { .. } => SourceChannel::CampaignClick,
            Self::AdIntelEngagement { .. } => SourceChannel::AdIntelEngagement,
            Self::Referral { .. } => SourceChannel::Referral,
            Self::Manual { .. } => SourceChannel::Manual,
        }
    }

    /// The discovery term recorded on the initial keyword stage, if any.
    pub fn search_term(&self) -> Option<String> {
        match self {
            Self::LocatorSearch { query, .. } => Some(query.clone()),
            Self::CampaignClick { campaign_id, .. } => Some(campaign_id.clone()),
            Self::AdIntelEngagement { competitor, .. } => Some(competitor.clone()),
            Self::Referral { .. } | Self::Manual { .. } => None,
        }
    }
}

// --- Lead ---

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeadProfile {
    pub name: Option<String>,
    pub company: Option<String>,
    pub title: Option<String>,
    pub location: Option<String>,
}

impl LeadProfile {
    /// Incoming non-empty fields replace existing ones.
    pub fn merge_from(&mut self, incoming: &LeadProfile) {
        overlay(&mut self.name, &incoming.name);
        overlay(&mut self.company, &incoming.company);
        overlay(&mut self.title, &incoming.title);
        overlay(&mut self.location, &incoming.location);
    }
}

/// Enrichment gathered about a lead across sightings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Enrichment {
    pub company_size: Option<String>,
    pub industry: Option<String>,
    pub website: Option<String>,
    pub linkedin_url: Option<String>,
    pub annual_revenue: Option<String>,
    /// Fields from producers without a typed slot.
    #[serde(default)]
    pub extra: BTreeMap<String, serde_json::Value>,
    /// Every origin channel that ever matched this identity.
    #[serde(default)]
    pub sources: BTreeSet<SourceChannel>,
}

impl Enrichment {
    /// Shallow merge: incoming values win on conflict, `sources` is a union.
    pub fn merge_from(&mut self, incoming: &Enrichment) {
        overlay(&mut self.company_size, &incoming.company_size);
        overlay(&mut self.industry, &incoming.industry);
        overlay(&mut self.website, &incoming.website);
        overlay(&mut self.linkedin_url, &incoming.linkedin_url);
        overlay(&mut self.annual_revenue, &incoming.annual_revenue);
        for (key, value) in &incoming.extra {
            self.extra.insert(key.clone(), value.clone());
        }
        self.sources.extend(incoming.sources.iter().copied());
    }

    pub fn has_company_size(&self) -> bool {
        self.company_size
            .as_deref()
            .is_some_and(|s| !s.trim().is_empty())
    }
}

fn overlay(target: &mut Option<String>, incoming: &Option<String>) {
    if let Some(value) = incoming {
        if !value.trim().is_empty() {
            *target = Some(value.clone());
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: Uuid,
    pub identity: Identity,
    pub profile: LeadProfile,
    pub intent_score: u8,
    pub status: LeadStatus,
    pub tags: BTreeSet<String>,
    pub enrichment: Enrichment,
    /// Optimistic-lock version, bumped on every successful update.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    pub fn from_candidate(candidate: &LeadCandidate, now: DateTime<Utc>) -> Self {
        let mut enrichment = candidate.enrichment.clone();
        enrichment.sources.insert(candidate.channel());
        Self {
            id: Uuid::new_v4(),
            identity: candidate.identity.clone(),
            profile: candidate.profile.clone(),
            intent_score: candidate.intent_score,
            status: LeadStatus::New,
            tags: candidate.tags.clone(),
            enrichment,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// The lead after absorbing another sighting of the same identity.
    /// The score never decreases.
    pub fn merged_with(&self, candidate: &LeadCandidate, now: DateTime<Utc>) -> Lead {
        let mut merged = self.clone();
        merged.identity.absorb(&candidate.identity);
        merged.profile.merge_from(&candidate.profile);
        merged.enrichment.merge_from(&candidate.enrichment);
        merged.enrichment.sources.insert(candidate.channel());
        merged.intent_score = self.intent_score.max(candidate.intent_score);
        merged.tags.extend(candidate.tags.iter().cloned());
        merged.updated_at = now;
        merged
    }
}

/// Canonical shape every origin channel normalizes into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadCandidate {
    pub identity: Identity,
    pub profile: LeadProfile,
    pub intent_score: u8,
    pub tags: BTreeSet<String>,
    pub enrichment: Enrichment,
    /// Opaque per-sighting id assigned by the channel.
    pub source_id: String,
    pub provenance: Provenance,
}

impl LeadCandidate {
    pub fn new(identity: Identity, provenance: Provenance) -> Self {
        Self {
            identity,
            profile: LeadProfile::default(),
            intent_score: 0,
            tags: BTreeSet::new(),
            enrichment: Enrichment::default(),
            source_id: Uuid::new_v4().to_string(),
            provenance,
        }
    }

    /// Set the score reported by the channel. Out-of-range input is rejected.
    pub fn with_score(mut self, score: i64) -> PipelineResult<Self> {
        self.intent_score = checked_score(score)?;
        Ok(self)
    }

    pub fn with_profile(mut self, profile: LeadProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_enrichment(mut self, enrichment: Enrichment) -> Self {
        self.enrichment = enrichment;
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_source_id(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = source_id.into();
        self
    }

    pub fn channel(&self) -> SourceChannel {
        self.provenance.channel()
    }

    pub fn validate(&self) -> PipelineResult<()> {
        self.identity.validate()?;
        if self.intent_score > MAX_INTENT_SCORE {
            return Err(PipelineError::validation(format!(
                "intent score {} outside 0..=100",
                self.intent_score
            )));
        }
        Ok(())
    }
}

/// Validate a raw score against the declared range.
pub fn checked_score(score: i64) -> PipelineResult<u8> {
    if !(i64::from(MIN_INTENT_SCORE)..=i64::from(MAX_INTENT_SCORE)).contains(&score) {
        return Err(PipelineError::validation(format!(
            "intent score {score} outside 0..=100"
        )));
    }
    Ok(score as u8)
}

/// One origin-channel sighting of a lead. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadSource {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub channel: SourceChannel,
    pub source_id: String,
    pub provenance: Provenance,
    pub recorded_at: DateTime<Utc>,
}

impl LeadSource {
    pub fn from_candidate(lead_id: Uuid, candidate: &LeadCandidate, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            lead_id,
            channel: candidate.channel(),
            source_id: candidate.source_id.clone(),
            provenance: candidate.provenance.clone(),
            recorded_at: now,
        }
    }
}

// --- Activity ---

/// A discrete engagement event that moves the intent score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "activity_type", rename_all = "snake_case")]
pub enum ActivityEvent {
    WebsiteVisit { pages_visited: u32 },
    EmailEngagement { clicked: bool },
    ContentDownload { asset: Option<String> },
    DemoRequest,
    /// Operator correction. May be negative.
    ManualAdjustment { delta: i32, reason: String },
}

impl ActivityEvent {
    pub fn activity_type(&self) -> &'static str {
        match self {
            Self::WebsiteVisit { .. } => "website_visit",
            Self::EmailEngagement { .. } => "email_engagement",
            Self::ContentDownload { .. } => "content_download",
            Self::DemoRequest => "demo_request",
            Self::ManualAdjustment { .. } => "manual_adjustment",
        }
    }
}

// --- Journey ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageType {
    Keyword,
    Touchpoint,
    Conversion,
}

impl StageType {
    /// Contribution of this stage type to journey completion.
    pub fn weight(&self) -> u8 {
        match self {
            Self::Keyword => 33,
            Self::Touchpoint => 33,
            Self::Conversion => 34,
        }
    }
}

impl fmt::Display for StageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Keyword => write!(f, "keyword"),
            Self::Touchpoint => write!(f, "touchpoint"),
            Self::Conversion => write!(f, "conversion"),
        }
    }
}

/// What happened at a journey stage. The variant determines the stage type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum StagePayload {
    Keyword {
        channel: SourceChannel,
        source_id: String,
        search_term: Option<String>,
    },
    Touchpoint {
        activity: ActivityEvent,
        delta: i32,
        new_score: u8,
    },
    Conversion {
        from_status: LeadStatus,
        to_status: LeadStatus,
    },
}

impl StagePayload {
    pub fn stage_type(&self) -> StageType {
        match self {
            Self::Keyword { .. } => StageType::Keyword,
            Self::Touchpoint { .. } => StageType::Touchpoint,
            Self::Conversion { .. } => StageType::Conversion,
        }
    }

    pub fn discovered(candidate: &LeadCandidate) -> Self {
        Self::Keyword {
            channel: candidate.channel(),
            source_id: candidate.source_id.clone(),
            search_term: candidate.provenance.search_term(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JourneyStage {
    pub id: Uuid,
    pub lead_id: Uuid,
    /// Strictly increasing per lead, starting at 1.
    pub sequence_order: u32,
    pub payload: StagePayload,
    pub recorded_at: DateTime<Utc>,
}

impl JourneyStage {
    pub fn stage_type(&self) -> StageType {
        self.payload.stage_type()
    }
}

/// Percentage of the journey covered by the distinct stage types present.
pub fn journey_completion<I>(stages: I) -> u8
where
    I: IntoIterator<Item = StageType>,
{
    let present: BTreeSet<StageType> = stages.into_iter().collect();
    present.iter().map(StageType::weight).sum::<u8>().min(100)
}
