use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use leadintel_common::{load_rules, Config, MonitorConfig, RulesConfig};
use leadintel_pipeline::{
    notify::channels_from_config, ChangeSource, LeadPipeline, LeadRepository,
    MemoryLeadRepository, PgLeadRepository, PipelineDeps, SimulatedChangeSource,
};

/// Chance per monitor per tick that the simulated source reports a change.
const SIMULATED_CHANGE_PROBABILITY: f64 = 0.2;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("leadintel=info".parse()?))
        .init();

    info!("Lead monitor starting...");

    // Load config
    let config = Config::from_env();
    config.log_redacted();

    let rules = match &config.rules_path {
        Some(path) => load_rules(path)?,
        None => RulesConfig::default(),
    };

    let monitors = match &config.monitors_path {
        Some(path) => load_monitors(path)?,
        None => Vec::new(),
    };
    if monitors.is_empty() {
        warn!("No monitors configured (set LEADINTEL_MONITORS), nothing to do");
        return Ok(());
    }

    // Postgres if configured, otherwise in-memory
    let repo: Arc<dyn LeadRepository> = match &config.database_url {
        Some(url) => {
            let pg = PgLeadRepository::connect(url).await?;
            pg.migrate().await?;
            info!("Using Postgres repository");
            Arc::new(pg)
        }
        None => {
            info!("No DATABASE_URL set, using in-memory repository");
            Arc::new(MemoryLeadRepository::new())
        }
    };

    let pipeline = LeadPipeline::new(
        PipelineDeps::builder()
            .repo(repo)
            .rules(rules)
            .channels(channels_from_config(&config))
            .build(),
    );

    let source: Arc<dyn ChangeSource> =
        Arc::new(SimulatedChangeSource::new(SIMULATED_CHANGE_PROBABILITY));
    let handle = pipeline.start_monitoring(monitors, source, config.monitor_interval);

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received");
    handle.stop().await;

    info!("Lead monitor stopped");
    Ok(())
}

fn load_monitors(path: &Path) -> Result<Vec<MonitorConfig>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read monitors file: {}", path.display()))?;
    let monitors: Vec<MonitorConfig> = serde_json::from_str(&content)
        .with_context(|| format!("Invalid monitors file: {}", path.display()))?;
    info!(count = monitors.len(), "Loaded monitors");
    Ok(monitors)
}
