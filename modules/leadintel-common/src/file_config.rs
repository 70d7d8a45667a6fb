use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Rule thresholds, loaded from TOML. Every field has a default.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RulesConfig {
    pub scoring: ScoringRules,
    pub tasks: TaskRules,
    pub competitor: CompetitorRules,
    pub merge: MergeRules,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScoringRules {
    /// Crossing upward through this score fires the high-intent task.
    pub high_intent_threshold: u8,
    /// Lower bound of the nurture band (upper bound is the high-intent threshold).
    pub nurture_floor: u8,
}

impl Default for ScoringRules {
    fn default() -> Self {
        Self {
            high_intent_threshold: 85,
            nurture_floor: 70,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TaskRules {
    pub outreach_due_hours: i64,
    pub research_due_days: i64,
    pub nurture_due_days: i64,
    pub high_intent_due_hours: i64,
}

impl Default for TaskRules {
    fn default() -> Self {
        Self {
            outreach_due_hours: 24,
            research_due_days: 3,
            nurture_due_days: 2,
            high_intent_due_hours: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompetitorRules {
    /// Minimum impact for the single response task.
    pub auto_task_threshold: f64,
    /// Minimum impact for a drafted playbook.
    pub playbook_threshold: f64,
}

impl Default for CompetitorRules {
    fn default() -> Self {
        Self {
            auto_task_threshold: 7.0,
            playbook_threshold: 8.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MergeRules {
    /// Optimistic-write attempts before giving up with a conflict.
    pub max_attempts: u32,
}

impl Default for MergeRules {
    fn default() -> Self {
        Self { max_attempts: 5 }
    }
}

impl RulesConfig {
    pub fn from_toml(content: &str) -> Result<Self> {
        let rules: RulesConfig = toml::from_str(content).context("Failed to parse rules TOML")?;
        rules.check()?;
        Ok(rules)
    }

    fn check(&self) -> Result<()> {
        if self.scoring.high_intent_threshold > 100 {
            anyhow::bail!(
                "scoring.high_intent_threshold must be <= 100, got {}",
                self.scoring.high_intent_threshold
            );
        }
        if self.scoring.nurture_floor > self.scoring.high_intent_threshold {
            anyhow::bail!(
                "scoring.nurture_floor ({}) must not exceed high_intent_threshold ({})",
                self.scoring.nurture_floor,
                self.scoring.high_intent_threshold
            );
        }
        if self.merge.max_attempts == 0 {
            anyhow::bail!("merge.max_attempts must be at least 1");
        }
        Ok(())
    }
}

/// Load and parse a rules file.
pub fn load_rules(path: &Path) -> Result<RulesConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read rules file: {}", path.display()))?;
    RulesConfig::from_toml(&content)
        .with_context(|| format!("Invalid rules file: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let rules = RulesConfig::from_toml("").unwrap();
        assert_eq!(rules, RulesConfig::default());
        assert_eq!(rules.scoring.high_intent_threshold, 85);
        assert_eq!(rules.competitor.auto_task_threshold, 7.0);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let rules = RulesConfig::from_toml(
            r#"
            [competitor]
            playbook_threshold = 9.0

            [tasks]
            nurture_due_days = 5
            "#,
        )
        .unwrap();
        assert_eq!(rules.competitor.playbook_threshold, 9.0);
        assert_eq!(rules.competitor.auto_task_threshold, 7.0);
        assert_eq!(rules.tasks.nurture_due_days, 5);
        assert_eq!(rules.tasks.outreach_due_hours, 24);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(RulesConfig::from_toml("[scoring]\nhigh_intent = 80\n").is_err());
    }

    #[test]
    fn inverted_score_band_is_rejected() {
        let err = RulesConfig::from_toml(
            "[scoring]\nhigh_intent_threshold = 60\nnurture_floor = 70\n",
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("nurture_floor"));
    }
}
