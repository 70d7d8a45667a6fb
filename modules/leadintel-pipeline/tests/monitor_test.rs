//! Competitor monitor tests: single ticks, the background loop, and
//! snapshot-diff detection feeding the alert path.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use leadintel_common::{
    AlertFilter, ChangeType, ChannelKind, DetectionKind, MonitorConfig, TaskCategory, TaskFilter,
};
use leadintel_pipeline::alerts::detect::WebsiteSnapshot;
use leadintel_pipeline::alerts::monitor::{run_tick, TickStats};
use leadintel_pipeline::testing::*;
use leadintel_pipeline::{
    ChangeSource, CompetitorSnapshot, LeadPipeline, MemoryLeadRepository, PipelineDeps,
    SimulatedChangeSource, SnapshotChangeSource,
};

fn pipeline() -> LeadPipeline {
    LeadPipeline::new(
        PipelineDeps::builder()
            .repo(Arc::new(MemoryLeadRepository::new()))
            .build(),
    )
}

/// Poll `check` until it holds or two seconds pass.
async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

async fn alert_count(pipeline: &LeadPipeline) -> usize {
    pipeline
        .list_alerts(&AlertFilter::default())
        .await
        .unwrap()
        .len()
}

fn site(pricing: &str, pages: &[(&str, &str)]) -> CompetitorSnapshot {
    CompetitorSnapshot {
        website: Some(WebsiteSnapshot {
            pages: pages
                .iter()
                .map(|(path, print)| (path.to_string(), print.to_string()))
                .collect::<BTreeMap<_, _>>(),
            pricing: Some(pricing.to_string()),
            headline: Some("Same-day plumbing".to_string()),
        }),
        ..Default::default()
    }
}

// =========================================================================
// run_tick
// =========================================================================

#[tokio::test]
async fn tick_records_every_detected_change() {
    let pipeline = pipeline();
    let source = ScriptedChangeSource::new(vec![vec![
        change_fixture("acme", ChangeType::PricingChange, 9.0),
        change_fixture("acme", ChangeType::RatingShift, 5.0),
    ]]);
    let monitors = vec![monitor("acme", vec![ChannelKind::Email])];

    let stats = run_tick(&pipeline, &monitors, &source).await;
    assert_eq!(
        stats,
        TickStats {
            changes: 2,
            alerts: 2,
            failures: 0
        }
    );
    assert_eq!(alert_count(&pipeline).await, 2);
    assert_eq!(pipeline.list_playbooks().await.unwrap().len(), 1);
}

#[tokio::test]
async fn failing_monitor_does_not_block_the_others() {
    let pipeline = pipeline();
    let source = ScriptedChangeSource::new(Vec::new())
        .then_fail("scraper blocked")
        .then(vec![change_fixture("globex", ChangeType::NewAdCampaign, 6.0)]);
    let monitors = vec![
        monitor("acme", Vec::new()),
        monitor("globex", Vec::new()),
    ];

    let stats = run_tick(&pipeline, &monitors, &source).await;
    assert_eq!(stats.failures, 1);
    assert_eq!(stats.alerts, 1);
    assert_eq!(source.calls(), 2);

    let alerts = pipeline.list_alerts(&AlertFilter::default()).await.unwrap();
    assert_eq!(alerts[0].competitor_id(), "globex");
}

#[tokio::test]
async fn invalid_change_counts_as_failure() {
    let pipeline = pipeline();
    let source = ScriptedChangeSource::new(vec![vec![
        change_fixture("acme", ChangeType::PricingChange, 12.0),
        change_fixture("acme", ChangeType::ProfileUpdate, 3.0),
    ]]);
    let monitors = vec![monitor("acme", Vec::new())];

    let stats = run_tick(&pipeline, &monitors, &source).await;
    assert_eq!(stats.changes, 2);
    assert_eq!(stats.alerts, 1);
    assert_eq!(stats.failures, 1);
}

// =========================================================================
// Background loop
// =========================================================================

#[tokio::test]
async fn monitor_loop_keeps_running_after_a_failed_tick() {
    let pipeline = pipeline();
    let source = Arc::new(
        ScriptedChangeSource::new(Vec::new())
            .then_fail("timeout")
            .then(vec![change_fixture("acme", ChangeType::PricingChange, 8.0)])
            .then(vec![change_fixture("acme", ChangeType::AdSpendShift, 6.0)]),
    );

    let handle = pipeline.start_monitoring(
        vec![monitor("acme", Vec::new())],
        source.clone() as Arc<dyn ChangeSource>,
        Duration::from_millis(10),
    );

    let reached = eventually(|| {
        let pipeline = pipeline.clone();
        async move { alert_count(&pipeline).await == 2 }
    })
    .await;
    assert!(reached, "monitor did not record both changes");
    assert!(!handle.is_finished());

    handle.stop().await;
    assert_eq!(source.remaining(), 0);
}

#[tokio::test]
async fn stop_ends_the_loop_between_ticks() {
    let pipeline = pipeline();
    let source = Arc::new(ScriptedChangeSource::new(Vec::new()));

    let handle = pipeline.start_monitoring(
        vec![monitor("acme", Vec::new())],
        source.clone() as Arc<dyn ChangeSource>,
        Duration::from_secs(3600),
    );

    // The first tick fires immediately.
    let ticked = eventually(|| {
        let source = source.clone();
        async move { source.calls() >= 1 }
    })
    .await;
    assert!(ticked);

    tokio::time::timeout(Duration::from_secs(1), handle.stop())
        .await
        .expect("monitor did not stop");
    assert_eq!(source.calls(), 1);
}

#[tokio::test]
async fn dropped_handle_leaves_the_loop_running() {
    let pipeline = pipeline();
    let source = Arc::new(
        ScriptedChangeSource::new(vec![vec![change_fixture(
            "acme",
            ChangeType::PricingChange,
            8.0,
        )]])
        .then(vec![change_fixture("acme", ChangeType::AdSpendShift, 6.0)]),
    );

    drop(pipeline.start_monitoring(
        vec![monitor("acme", Vec::new())],
        source.clone() as Arc<dyn ChangeSource>,
        Duration::from_millis(10),
    ));

    let reached = eventually(|| {
        let pipeline = pipeline.clone();
        async move { alert_count(&pipeline).await == 2 }
    })
    .await;
    assert!(reached, "detached monitor stopped ticking");
    assert!(source.calls() >= 2);
}

// =========================================================================
// Snapshot detection
// =========================================================================

#[tokio::test]
async fn first_snapshot_is_a_baseline() {
    let provider = StaticSnapshotProvider::new().on(
        "acme",
        vec![
            site("$99", &[("/", "a"), ("/pricing", "p1")]),
            site("$79", &[("/", "a"), ("/pricing", "p2")]),
        ],
    );
    let source = SnapshotChangeSource::new(Arc::new(provider));
    let acme = monitor("acme", Vec::new());

    assert!(source.detect(&acme).await.unwrap().is_empty());

    let changes = source.detect(&acme).await.unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].change_type, ChangeType::PricingChange);
    assert_eq!(changes[0].competitor_id, "acme");
    assert!(changes[0].impact_score > 7.5);

    // Provider repeats its last snapshot: nothing new.
    assert!(source.detect(&acme).await.unwrap().is_empty());
}

#[tokio::test]
async fn unwatched_surfaces_are_ignored() {
    let provider = StaticSnapshotProvider::new().on(
        "acme",
        vec![site("$99", &[("/", "a")]), site("$49", &[("/", "b")])],
    );
    let source = SnapshotChangeSource::new(Arc::new(provider));
    let ads_only = MonitorConfig {
        monitor_types: vec![DetectionKind::AdCampaign],
        ..monitor("acme", Vec::new())
    };

    assert!(source.detect(&ads_only).await.unwrap().is_empty());
    assert!(source.detect(&ads_only).await.unwrap().is_empty());
}

#[tokio::test]
async fn snapshot_change_flows_into_alert_and_task() {
    let pipeline = pipeline();
    let provider = StaticSnapshotProvider::new().on(
        "acme",
        vec![
            site("$99", &[("/", "a"), ("/pricing", "p1")]),
            site("$79", &[("/", "a"), ("/pricing", "p2")]),
        ],
    );
    let source = SnapshotChangeSource::new(Arc::new(provider));
    let monitors = vec![monitor("acme", Vec::new())];

    let baseline = run_tick(&pipeline, &monitors, &source).await;
    assert_eq!(baseline.changes, 0);

    let stats = run_tick(&pipeline, &monitors, &source).await;
    assert_eq!(stats.alerts, 1);

    let tasks = pipeline
        .list_tasks(&TaskFilter {
            category: Some(TaskCategory::CompetitorResponse),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(tasks.len(), 1);
}

#[tokio::test]
async fn missing_snapshots_fail_detection() {
    let source = SnapshotChangeSource::new(Arc::new(StaticSnapshotProvider::new()));
    assert!(source.detect(&monitor("nobody", Vec::new())).await.is_err());
}

// =========================================================================
// Simulated source
// =========================================================================

#[tokio::test]
async fn simulated_source_only_reports_watched_types() {
    let source = SimulatedChangeSource::seeded(1.0, 7);
    let profile_only = MonitorConfig {
        monitor_types: vec![DetectionKind::BusinessProfile],
        ..monitor("acme", Vec::new())
    };

    for _ in 0..20 {
        let changes = source.detect(&profile_only).await.unwrap();
        assert_eq!(changes.len(), 1);
        let change = &changes[0];
        assert_eq!(change.change_type.kind(), DetectionKind::BusinessProfile);
        assert!((3.0..=10.0).contains(&change.impact_score));
        change.validate().unwrap();
    }
}

#[tokio::test]
async fn simulated_source_with_zero_probability_is_quiet() {
    let source = SimulatedChangeSource::seeded(0.0, 7);
    let acme = monitor("acme", Vec::new());
    for _ in 0..20 {
        assert!(source.detect(&acme).await.unwrap().is_empty());
    }
}
