use chrono::{DateTime, Utc};
use uuid::Uuid;

use leadintel_common::{
    file_config::CompetitorRules, ActionType, ChangeType, CompetitorChange, EstimatedImpact,
    MonitorConfig, Playbook, PlaybookAction, PlaybookStatus, CRITICAL_IMPACT, WARNING_IMPACT,
};

use super::competitor_rules::response_priority;

fn action(
    action_type: ActionType,
    title: &str,
    description: &str,
    estimated_hours: f32,
    resources: &[&str],
    metrics: &[&str],
) -> PlaybookAction {
    PlaybookAction {
        action_type,
        title: title.to_string(),
        description: description.to_string(),
        estimated_hours,
        resources_needed: resources.iter().map(|s| s.to_string()).collect(),
        success_metrics: metrics.iter().map(|s| s.to_string()).collect(),
        assignee: None,
    }
}

/// Canned actions per change type.
pub fn actions_for(change: &CompetitorChange) -> Vec<PlaybookAction> {
    let name = change.competitor_name.as_str();
    match change.change_type {
        ChangeType::PricingChange => vec![
            action(
                ActionType::Pricing,
                "Review our pricing position",
                &format!("Compare our tiers against {name}'s new pricing."),
                6.0,
                &["pricing sheet", "win/loss notes"],
                &["price objections per week"],
            ),
            action(
                ActionType::ContentCreation,
                "Publish a comparison page",
                &format!("Explain total value versus {name}."),
                8.0,
                &["copywriter", "designer"],
                &["comparison page conversions"],
            ),
            action(
                ActionType::AdCampaign,
                "Run value-messaging ads",
                "Target prospects searching for price comparisons.",
                4.0,
                &["ad budget"],
                &["cost per lead", "click-through rate"],
            ),
        ],
        ChangeType::ProductLaunch => vec![
            action(
                ActionType::Product,
                "Feature gap analysis",
                &format!("Map {name}'s launch against our roadmap."),
                10.0,
                &["product manager"],
                &["gaps closed this quarter"],
            ),
            action(
                ActionType::ContentCreation,
                "Positioning update",
                "Refresh sales collateral and battlecards.",
                6.0,
                &["product marketer"],
                &["battlecard usage"],
            ),
            action(
                ActionType::Seo,
                "Capture launch keywords",
                "Target search terms around the launched capability.",
                4.0,
                &["SEO specialist"],
                &["ranking for launch keywords"],
            ),
        ],
        ChangeType::NewAdCampaign | ChangeType::AdSpendShift => vec![
            action(
                ActionType::AdCampaign,
                "Counter campaign",
                &format!("Bid on the placements {name} is contesting."),
                8.0,
                &["ad budget", "creative"],
                &["impression share", "cost per lead"],
            ),
            action(
                ActionType::Seo,
                "Defend organic keywords",
                "Shore up pages for the terms the campaign targets.",
                4.0,
                &["SEO specialist"],
                &["organic traffic on contested terms"],
            ),
        ],
        ChangeType::WebsiteContent => vec![
            action(
                ActionType::ContentCreation,
                "Respond to messaging change",
                &format!("Address claims in {name}'s updated site copy."),
                6.0,
                &["copywriter"],
                &["landing page conversion rate"],
            ),
            action(
                ActionType::Seo,
                "Review keyword overlap",
                "Check rankings on pages the competitor rewrote.",
                3.0,
                &["SEO specialist"],
                &["ranking changes"],
            ),
        ],
        ChangeType::RatingShift | ChangeType::ProfileUpdate => vec![
            action(
                ActionType::ContentCreation,
                "Collect fresh testimonials",
                "Ask recent happy customers for reviews.",
                4.0,
                &["customer success"],
                &["new reviews per month", "average rating"],
            ),
            action(
                ActionType::Seo,
                "Refresh local business profile",
                "Update photos, hours and categories.",
                3.0,
                &["marketing coordinator"],
                &["profile views", "direction requests"],
            ),
        ],
    }
}

pub fn estimated_impact(impact_score: f64) -> EstimatedImpact {
    if impact_score >= CRITICAL_IMPACT {
        EstimatedImpact::High
    } else if impact_score >= WARNING_IMPACT {
        EstimatedImpact::Medium
    } else {
        EstimatedImpact::Low
    }
}

/// A draft playbook for a change that clears the playbook threshold on a
/// monitor with playbooks enabled.
pub fn draft(
    change: &CompetitorChange,
    monitor: &MonitorConfig,
    rules: &CompetitorRules,
    alert_id: Uuid,
    now: DateTime<Utc>,
) -> Option<Playbook> {
    if !monitor.auto_create_playbooks || change.impact_score < rules.playbook_threshold {
        return None;
    }

    let actions = actions_for(change);
    Some(Playbook {
        id: Uuid::new_v4(),
        title: format!(
            "Counter {} {}",
            change.competitor_name,
            change.change_type.label()
        ),
        competitor_id: change.competitor_id.clone(),
        competitor_name: change.competitor_name.clone(),
        priority: response_priority(change.impact_score),
        status: PlaybookStatus::Draft,
        estimated_hours: actions.iter().map(|a| a.estimated_hours).sum(),
        estimated_impact: estimated_impact(change.impact_score),
        actions,
        alert_id: Some(alert_id),
        version: 1,
        created_at: now,
        updated_at: now,
    })
}
