use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use leadintel_common::MonitorConfig;

use crate::pipeline::LeadPipeline;
use crate::traits::ChangeSource;

/// Running competitor monitor. Dropping the handle leaves the loop running
/// until the runtime shuts down; call `stop` to end it.
#[must_use = "dropping the handle detaches the monitor; keep it to call `stop`"]
pub struct MonitorHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    /// Signal the loop and wait for it to exit. A tick in progress finishes first.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Competitor monitor ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickStats {
    pub changes: usize,
    pub alerts: usize,
    pub failures: usize,
}

/// One pass over every monitor. Detection and alert failures are logged and
/// counted; they never end the loop.
pub async fn run_tick(
    pipeline: &LeadPipeline,
    monitors: &[MonitorConfig],
    source: &dyn ChangeSource,
) -> TickStats {
    let mut stats = TickStats::default();
    for monitor in monitors {
        let changes = match source.detect(monitor).await {
            Ok(changes) => changes,
            Err(e) => {
                warn!(competitor_id = %monitor.competitor_id, error = %e, "Change detection failed");
                stats.failures += 1;
                continue;
            }
        };

        stats.changes += changes.len();
        for change in &changes {
            match pipeline.create_competitor_alert(change, monitor).await {
                Ok(_) => stats.alerts += 1,
                Err(e) => {
                    warn!(
                        competitor_id = %monitor.competitor_id,
                        change_type = %change.change_type,
                        error = %e,
                        "Failed to record competitor change"
                    );
                    stats.failures += 1;
                }
            }
        }
    }
    stats
}

pub fn spawn_monitor(
    pipeline: LeadPipeline,
    monitors: Vec<MonitorConfig>,
    source: Arc<dyn ChangeSource>,
    interval: Duration,
) -> MonitorHandle {
    let (shutdown, mut shutdown_rx) = watch::channel(false);
    let competitors = monitors.len();

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // Set once the handle is dropped without `stop`; the loop then runs detached.
        let mut detached = false;
        loop {
            tokio::select! {
                biased;
                signal = shutdown_rx.changed(), if !detached => match signal {
                    Ok(()) => break,
                    Err(_) => {
                        debug!("Monitor handle dropped, continuing detached");
                        detached = true;
                    }
                },
                _ = ticker.tick() => {
                    let stats = run_tick(&pipeline, &monitors, source.as_ref()).await;
                    debug!(
                        changes = stats.changes,
                        alerts = stats.alerts,
                        failures = stats.failures,
                        "Monitor tick complete"
                    );
                }
            }
        }
        info!("Competitor monitor stopped");
    });

    info!(competitors, interval_secs = interval.as_secs(), "Competitor monitor started");
    MonitorHandle { shutdown, task }
}
