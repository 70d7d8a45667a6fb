use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration loaded from environment variables.
/// Rule thresholds live in the TOML `RulesConfig`.
#[derive(Debug, Clone)]
pub struct Config {
    // Postgres; in-memory repository when unset
    pub database_url: Option<String>,

    // Delivery
    pub slack_webhook_url: Option<String>,
    pub slack_webhook_url_alerts: Option<String>,

    // Rules file
    pub rules_path: Option<PathBuf>,

    // JSON array of monitor configurations
    pub monitors_path: Option<PathBuf>,

    // Competitor monitor
    pub monitor_interval: Duration,
}

const DEFAULT_MONITOR_INTERVAL_SECS: u64 = 300;

impl Config {
    pub fn from_env() -> Self {
        let slack_webhook_url = optional_env("SLACK_WEBHOOK_URL");
        Self {
            database_url: optional_env("DATABASE_URL"),
            slack_webhook_url_alerts: optional_env("SLACK_WEBHOOK_URL_ALERTS")
                .or_else(|| slack_webhook_url.clone()),
            slack_webhook_url,
            rules_path: optional_env("LEADINTEL_CONFIG").map(PathBuf::from),
            monitors_path: optional_env("LEADINTEL_MONITORS").map(PathBuf::from),
            monitor_interval: Duration::from_secs(
                optional_env("MONITOR_INTERVAL_SECS")
                    .and_then(|v| v.parse().ok())
                    .filter(|secs| *secs > 0)
                    .unwrap_or(DEFAULT_MONITOR_INTERVAL_SECS),
            ),
        }
    }

    /// Log the loaded configuration with secrets shortened.
    pub fn log_redacted(&self) {
        fn preview(val: &Option<String>) -> String {
            match val {
                Some(v) if !v.is_empty() => {
                    let n = v.char_indices().nth(12).map(|(i, _)| i).unwrap_or(v.len());
                    format!("{}...({} chars)", &v[..n], v.len())
                }
                _ => "<not set>".to_string(),
            }
        }

        tracing::info!("Config loaded:");
        tracing::info!("  DATABASE_URL: {}", preview(&self.database_url));
        tracing::info!("  SLACK_WEBHOOK_URL: {}", preview(&self.slack_webhook_url));
        tracing::info!(
            "  SLACK_WEBHOOK_URL_ALERTS: {}",
            preview(&self.slack_webhook_url_alerts)
        );
        tracing::info!(
            "  LEADINTEL_CONFIG: {}",
            self.rules_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "<defaults>".to_string())
        );
        tracing::info!(
            "  LEADINTEL_MONITORS: {}",
            self.monitors_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "<not set>".to_string())
        );
        tracing::info!(
            "  MONITOR_INTERVAL_SECS: {}",
            self.monitor_interval.as_secs()
        );
    }
}

fn optional_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}
