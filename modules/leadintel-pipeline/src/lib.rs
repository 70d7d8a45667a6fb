pub mod aggregator;
pub mod alerts;
pub mod crm_sync;
pub mod dedup;
pub mod journey;
pub mod notify;
pub mod pipeline;
pub mod rules;
pub mod scoring;
pub mod store;
pub mod traits;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use aggregator::{RawSighting, SourceAggregator};
pub use alerts::{
    AlertDispatcher, CompetitorSnapshot, MonitorHandle, SimulatedChangeSource,
    SnapshotChangeSource, TickStats,
};
pub use crm_sync::{PendingSync, SimulatedCrmConnector, SyncTracker};
pub use dedup::{DedupResult, MergeEngine};
pub use pipeline::{CompetitorResponse, LeadPipeline, PipelineDeps, ProcessedLead, ScoredActivity};
pub use scoring::{ScoreUpdate, ScoringEngine};
pub use store::{MemoryLeadRepository, PgLeadRepository};
pub use traits::{
    ChangeSource, CrmConnector, DeliveryChannel, LeadRepository, LeadSourceChannel,
    SnapshotProvider, WriteOutcome,
};
