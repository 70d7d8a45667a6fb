use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use leadintel_common::{
    file_config::CompetitorRules, CompetitorChange, MonitorConfig, NewTask, RelatedEntities,
    TaskCategory, CRITICAL_IMPACT, WARNING_IMPACT,
};

pub const RESPONSE_CHECKLIST: [&str; 6] = [
    "Deep-dive analysis of the change",
    "Assess impact on our pipeline and positioning",
    "Draft a counter-strategy",
    "Implement the response",
    "Monitor the competitor's reaction",
    "Update the competitive intelligence store",
];

/// Same bands as alert severity: critical 5, warning 4, otherwise 3.
pub fn response_priority(impact_score: f64) -> u8 {
    if impact_score >= CRITICAL_IMPACT {
        5
    } else if impact_score >= WARNING_IMPACT {
        4
    } else {
        3
    }
}

fn response_window(priority: u8) -> Duration {
    match priority {
        5 => Duration::hours(24),
        4 => Duration::days(3),
        _ => Duration::days(7),
    }
}

/// The single response task for a change, when the monitor allows it and the
/// impact clears the auto-task threshold.
pub fn response_task(
    change: &CompetitorChange,
    monitor: &MonitorConfig,
    rules: &CompetitorRules,
    alert_id: Uuid,
    now: DateTime<Utc>,
) -> Option<NewTask> {
    if !monitor.auto_create_tasks || change.impact_score < rules.auto_task_threshold {
        return None;
    }

    let priority = response_priority(change.impact_score);
    Some(NewTask {
        title: format!(
            "Respond to {} {}",
            change.competitor_name,
            change.change_type.label()
        ),
        description: format!(
            "{} shows a {} with impact {:.1}/10.",
            change.competitor_name,
            change.change_type.label(),
            change.impact_score
        ),
        priority,
        category: TaskCategory::CompetitorResponse,
        execution_steps: RESPONSE_CHECKLIST.iter().map(|s| s.to_string()).collect(),
        due_at: now + response_window(priority),
        related: RelatedEntities::CompetitorChange {
            competitor_id: change.competitor_id.clone(),
            change_type: change.change_type,
            impact_score: change.impact_score,
            alert_id,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadintel_common::{ChangeDetails, ChangeType};

    fn change(impact: f64) -> CompetitorChange {
        CompetitorChange {
            competitor_id: "acme".to_string(),
            competitor_name: "Acme".to_string(),
            change_type: ChangeType::PricingChange,
            impact_score: impact,
            details: ChangeDetails::Simulated {
                note: "test".to_string(),
            },
            detected_at: Utc::now(),
        }
    }

    fn monitor(auto_tasks: bool) -> MonitorConfig {
        MonitorConfig {
            auto_create_tasks: auto_tasks,
            ..MonitorConfig::new("acme", "Acme")
        }
    }

    #[test]
    fn priority_bands() {
        assert_eq!(response_priority(9.2), 5);
        assert_eq!(response_priority(8.5), 5);
        assert_eq!(response_priority(8.499), 4);
        assert_eq!(response_priority(6.5), 4);
        assert_eq!(response_priority(6.499), 3);
    }

    #[test]
    fn high_impact_change_gets_six_step_task() {
        let task = response_task(
            &change(9.2),
            &monitor(true),
            &CompetitorRules::default(),
            Uuid::new_v4(),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(task.priority, 5);
        assert_eq!(task.execution_steps.len(), 6);
        assert_eq!(task.execution_steps[0], RESPONSE_CHECKLIST[0]);
        assert!(matches!(task.related, RelatedEntities::CompetitorChange { .. }));
    }

    #[test]
    fn below_threshold_or_disabled_creates_nothing() {
        let rules = CompetitorRules::default();
        let id = Uuid::new_v4();
        assert!(response_task(&change(6.9), &monitor(true), &rules, id, Utc::now()).is_none());
        assert!(response_task(&change(9.9), &monitor(false), &rules, id, Utc::now()).is_none());
        assert_eq!(
            response_task(&change(7.0), &monitor(true), &rules, id, Utc::now())
                .unwrap()
                .priority,
            4
        );
    }
}
