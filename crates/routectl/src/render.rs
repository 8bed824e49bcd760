//! Output rendering for routectl.

use std::collections::BTreeMap;

use route_core::routing::format_percent;
use route_core::semantic::SemanticMatch;
use route_core::{DecisionRecord, RoutingDecision, Skill};

/// Print a routing decision and its candidates.
pub fn print_decision(decision: &RoutingDecision) {
    match decision.selected {
        Some(ref selected) => {
            let kind = if decision.is_sequence_match {
                "sequence"
            } else {
                "skill"
            };
            println!(
                "Selected {}: {} ({})",
                kind,
                selected.skill_key,
                format_percent(selected.confidence)
            );
        }
        None => println!("No skill selected"),
    }
    println!("  Outcome: {}", decision.outcome.as_str());
    println!("  Reason:  {}", decision.reason);

    if decision.candidates.is_empty() {
        return;
    }

    println!();
    println!(
        "  {:<32}  {:<16}  {:<6}  {:<8}  {:<24}",
        "CANDIDATE", "CATEGORY", "CONF", "SOURCE", "MATCHED"
    );
    println!("  {}", "-".repeat(92));
    for c in &decision.candidates {
        println!(
            "  {:<32}  {:<16}  {:<6}  {:<8}  {:<24}",
            truncate(&c.skill_key, 32),
            truncate(&c.category, 16),
            format_percent(c.confidence),
            c.source.as_str(),
            truncate(c.matched_trigger.as_deref().unwrap_or("-"), 24),
        );
    }
}

pub fn print_semantic_matches(matches: &[SemanticMatch]) {
    if matches.is_empty() {
        println!("No semantic matches.");
        return;
    }

    println!("{:<32}  {:<16}  {:<10}", "SKILL", "CATEGORY", "SIMILARITY");
    println!("{}", "-".repeat(62));
    for m in matches {
        println!(
            "{:<32}  {:<16}  {:<10.3}",
            truncate(&m.skill_key, 32),
            truncate(&m.category, 16),
            m.similarity
        );
    }
}

/// Print a list of skills in tabular format.
pub fn print_skill_list(skills: &[Skill]) {
    if skills.is_empty() {
        println!("No skills found.");
        return;
    }

    println!(
        "{:<32}  {:<16}  {:<6}  {:<8}  {:<8}",
        "KEY", "CATEGORY", "ACTIVE", "TRIGGERS", "LINKED"
    );
    println!("{}", "-".repeat(78));

    for skill in skills {
        println!(
            "{:<32}  {:<16}  {:<6}  {:<8}  {:<8}",
            truncate(&skill.key, 32),
            truncate(&skill.category, 16),
            if skill.is_active { "yes" } else { "no" },
            skill.triggers.len(),
            skill
                .linked_skill_count
                .map(|n| n.to_string())
                .unwrap_or_else(|| "-".to_string()),
        );
    }

    println!();
    println!("{} skill(s)", skills.len());
}

/// Print detailed information about a skill.
pub fn print_skill_details(skill: &Skill, linked_skills: &[String]) {
    println!("Skill: {}", skill.key);
    println!();
    println!("  Name:      {}", skill.display_name());
    println!("  Category:  {}", skill.category);
    println!("  Active:    {}", skill.is_active);
    if let Some(ref description) = skill.description {
        println!("  About:     {}", description);
    }
    if !skill.keywords.is_empty() {
        println!("  Keywords:  {}", skill.keywords.join(", "));
    }

    if !skill.triggers.is_empty() {
        println!();
        println!("  Triggers:");
        for trigger in &skill.triggers {
            println!(
                "    {} ({})",
                trigger.pattern,
                format_percent(trigger.confidence)
            );
            for example in &trigger.examples {
                println!("      e.g. {}", example);
            }
        }
    }

    if !linked_skills.is_empty() {
        println!();
        println!("  Linked skills:");
        for (i, key) in linked_skills.iter().enumerate() {
            println!("    {}. {}", i + 1, key);
        }
    }

    println!();
    println!("  Created:   {}", format_time(&skill.created_at));
    println!("  Updated:   {}", format_time(&skill.updated_at));
}

pub fn print_decision_list(decisions: &[DecisionRecord]) {
    if decisions.is_empty() {
        println!("No decisions logged.");
        return;
    }

    println!(
        "{:<20}  {:<24}  {:<24}  {:<6}  {:<32}",
        "TIME", "OUTCOME", "SELECTED", "CONF", "MESSAGE"
    );
    println!("{}", "-".repeat(114));
    for d in decisions {
        println!(
            "{:<20}  {:<24}  {:<24}  {:<6}  {:<32}",
            format_time(&d.created_at),
            d.outcome.as_str(),
            truncate(d.selected_skill_key.as_deref().unwrap_or("-"), 24),
            d.confidence
                .map(format_percent)
                .unwrap_or_else(|| "-".to_string()),
            truncate(&d.message_snippet, 32),
        );
    }
}

pub fn print_metrics(metrics: &BTreeMap<String, u64>) {
    for (name, value) in metrics {
        println!("{:<32}  {}", name, value);
    }
}

fn format_time(dt: &chrono::DateTime<chrono::Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Truncate to `max_chars` characters, marking the cut with "...".
fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}
