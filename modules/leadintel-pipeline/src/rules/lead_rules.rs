use chrono::{DateTime, Duration, Utc};

use leadintel_common::{
    file_config::TaskRules, Lead, NewTask, RelatedEntities, RulesConfig, TaskCategory,
    TriggerCondition,
};

use super::PlannedTask;

/// Human label for a lead in task titles.
fn lead_label(lead: &Lead) -> String {
    lead.profile
        .name
        .clone()
        .or_else(|| lead.profile.company.clone())
        .unwrap_or_else(|| lead.identity.to_string())
}

fn steps(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

pub fn ingestion_tasks(lead: &Lead, rules: &RulesConfig, now: DateTime<Utc>) -> Vec<PlannedTask> {
    let score = lead.intent_score;
    let threshold = rules.scoring.high_intent_threshold;
    let mut planned = Vec::new();

    if score >= threshold {
        planned.push(PlannedTask {
            task: NewTask {
                title: format!("Reach out to {}", lead_label(lead)),
                description: format!(
                    "Intent score {score} is at or above {threshold}. Contact within {} hours.",
                    rules.tasks.outreach_due_hours
                ),
                priority: 5,
                category: TaskCategory::ImmediateOutreach,
                execution_steps: steps(&[
                    "Review lead sources and journey",
                    "Prepare personalized opener",
                    "Call or email the lead",
                    "Log the outcome and next step",
                ]),
                due_at: now + Duration::hours(rules.tasks.outreach_due_hours),
                related: RelatedEntities::Lead { lead_id: lead.id },
            },
            trigger: TriggerCondition::ScoreChange,
        });
    }

    if lead.enrichment.has_company_size() {
        let company = lead
            .profile
            .company
            .clone()
            .unwrap_or_else(|| lead_label(lead));
        planned.push(PlannedTask {
            task: NewTask {
                title: format!("Research {company}"),
                description: format!(
                    "Company size reported as {}. Build an account profile.",
                    lead.enrichment.company_size.as_deref().unwrap_or_default()
                ),
                priority: 3,
                category: TaskCategory::CompanyResearch,
                execution_steps: steps(&[
                    "Review company website and recent news",
                    "Identify decision makers",
                    "Note likely budget and buying timeline",
                    "Attach findings to the lead",
                ]),
                due_at: now + Duration::days(rules.tasks.research_due_days),
                related: RelatedEntities::Lead { lead_id: lead.id },
            },
            trigger: TriggerCondition::StatusChange,
        });
    }

    if score >= rules.scoring.nurture_floor && score < threshold {
        planned.push(PlannedTask {
            task: NewTask {
                title: format!("Nurture {}", lead_label(lead)),
                description: format!("Intent score {score} is warm. Keep the lead engaged."),
                priority: 2,
                category: TaskCategory::Nurture,
                execution_steps: steps(&[
                    "Send relevant case study or guide",
                    "Invite to upcoming webinar or demo",
                    "Schedule a check-in",
                ]),
                due_at: now + Duration::days(rules.tasks.nurture_due_days),
                related: RelatedEntities::Lead { lead_id: lead.id },
            },
            trigger: TriggerCondition::ScoreChange,
        });
    }

    planned
}

/// Fired when a score update crosses the high-intent threshold upward.
pub fn high_intent_task(lead: &Lead, rules: &TaskRules, now: DateTime<Utc>) -> PlannedTask {
    PlannedTask {
        task: NewTask {
            title: format!("High intent: {}", lead_label(lead)),
            description: format!(
                "Intent score rose to {}. Follow up within {} hours.",
                lead.intent_score, rules.high_intent_due_hours
            ),
            priority: 5,
            category: TaskCategory::HighIntent,
            execution_steps: steps(&[
                "Review the latest touchpoints",
                "Contact the lead directly",
                "Offer a demo or proposal",
            ]),
            due_at: now + Duration::hours(rules.high_intent_due_hours),
            related: RelatedEntities::Lead { lead_id: lead.id },
        },
        trigger: TriggerCondition::ScoreChange,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadintel_common::{Enrichment, Identity, LeadCandidate, Provenance};

    fn lead(score: i64, company_size: Option<&str>) -> Lead {
        let candidate = LeadCandidate::new(
            Identity::email("r@x.com"),
            Provenance::Manual { entered_by: None },
        )
        .with_score(score)
        .unwrap()
        .with_enrichment(Enrichment {
            company_size: company_size.map(str::to_string),
            ..Default::default()
        });
        Lead::from_candidate(&candidate, Utc::now())
    }

    fn categories(lead: &Lead) -> Vec<TaskCategory> {
        ingestion_tasks(lead, &RulesConfig::default(), Utc::now())
            .into_iter()
            .map(|p| p.task.category)
            .collect()
    }

    #[test]
    fn outreach_threshold_is_exact() {
        assert_eq!(categories(&lead(85, None)), vec![TaskCategory::ImmediateOutreach]);
        assert_eq!(categories(&lead(84, None)), vec![TaskCategory::Nurture]);
    }

    #[test]
    fn nurture_band_is_half_open() {
        assert_eq!(categories(&lead(70, None)), vec![TaskCategory::Nurture]);
        assert!(categories(&lead(69, None)).is_empty());
    }

    #[test]
    fn rules_are_independent() {
        assert_eq!(
            categories(&lead(90, Some("51-200"))),
            vec![TaskCategory::ImmediateOutreach, TaskCategory::CompanyResearch]
        );
        assert_eq!(
            categories(&lead(72, Some("1-10"))),
            vec![TaskCategory::CompanyResearch, TaskCategory::Nurture]
        );
        assert_eq!(categories(&lead(10, Some("  "))), Vec::<TaskCategory>::new());
    }

    #[test]
    fn priorities_and_due_dates_follow_rules() {
        let now = Utc::now();
        let planned = ingestion_tasks(&lead(95, Some("11-50")), &RulesConfig::default(), now);
        assert_eq!(planned[0].task.priority, 5);
        assert_eq!(planned[0].task.due_at, now + Duration::hours(24));
        assert_eq!(planned[1].task.priority, 3);
        assert_eq!(planned[1].task.due_at, now + Duration::days(3));

        let nurture = ingestion_tasks(&lead(75, None), &RulesConfig::default(), now);
        assert_eq!(nurture[0].task.priority, 2);
        assert_eq!(nurture[0].task.due_at, now + Duration::days(2));
    }

    #[test]
    fn high_intent_task_is_due_in_two_hours() {
        let now = Utc::now();
        let planned = high_intent_task(&lead(90, None), &TaskRules::default(), now);
        assert_eq!(planned.task.priority, 5);
        assert_eq!(planned.task.category, TaskCategory::HighIntent);
        assert_eq!(planned.task.due_at, now + Duration::hours(2));
        assert_eq!(planned.trigger, TriggerCondition::ScoreChange);
    }
}
