//! Trigger matching and candidate collection.
//!
//! Scores a message against a skill's triggers, example phrasings and
//! keywords. Everything here is a pure function of its inputs; iteration
//! order decides ties.

use std::collections::HashSet;

use crate::types::{MatchCandidate, MatchSource, Skill, TriggerSpec};

/// Multiplier applied to a trigger's confidence when an example phrasing hits.
pub const EXAMPLE_WEIGHT: f64 = 0.9;

/// Keyword fallback only runs while the trigger-based best is below this.
pub const KEYWORD_FALLBACK_BELOW: f64 = 0.5;

/// Confidence contributed by each whole-token keyword hit.
pub const KEYWORD_WEIGHT: f64 = 0.2;

/// Upper bound for keyword-derived confidence.
pub const KEYWORD_CAP: f64 = 0.6;

/// Best match found for a single skill.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerMatch {
    /// In `[0, 1]`; `0` means nothing matched.
    pub confidence: f64,
    pub matched_trigger: Option<String>,
    pub source: Option<MatchSource>,
}

impl TriggerMatch {
    fn none() -> Self {
        Self {
            confidence: 0.0,
            matched_trigger: None,
            source: None,
        }
    }

    pub fn is_match(&self) -> bool {
        self.confidence > 0.0
    }

    /// Replaces the current best only on a strictly higher score, so the
    /// first of several equal scores is kept.
    fn offer(&mut self, confidence: f64, text: &str, source: MatchSource) {
        if confidence > self.confidence {
            self.confidence = confidence;
            self.matched_trigger = Some(text.to_string());
            self.source = Some(source);
        }
    }
}

/// Scores a message against one skill's triggers and keywords.
///
/// 1. Pattern substring hits score the trigger's confidence.
/// 2. Example substring hits score `confidence * 0.9`.
/// 3. If the best so far is below 0.5, whole-token keyword hits score
///    `min(0.6, hits * 0.2)`.
///
/// Patterns, examples and keywords are compared as written, only
/// lower-cased, so surrounding spaces are significant. Blank ones never match.
pub fn match_skill(message: &str, triggers: &[TriggerSpec], keywords: &[String]) -> TriggerMatch {
    let normalized = message.to_lowercase();
    let mut best = TriggerMatch::none();

    for trigger in triggers {
        if trigger.pattern.trim().is_empty() {
            continue;
        }
        if normalized.contains(&trigger.pattern.to_lowercase()) {
            best.offer(
                clamp_confidence(trigger.confidence),
                &trigger.pattern,
                MatchSource::Pattern,
            );
        }
    }

    for trigger in triggers {
        let example_confidence = clamp_confidence(trigger.confidence) * EXAMPLE_WEIGHT;
        for example in &trigger.examples {
            if !example.trim().is_empty() && normalized.contains(&example.to_lowercase()) {
                best.offer(example_confidence, example, MatchSource::Example);
            }
        }
    }

    if best.confidence < KEYWORD_FALLBACK_BELOW {
        let tokens: HashSet<&str> = normalized.split_whitespace().collect();
        let hits: Vec<&str> = keywords
            .iter()
            .filter(|k| !k.trim().is_empty() && tokens.contains(k.to_lowercase().as_str()))
            .map(String::as_str)
            .collect();

        if !hits.is_empty() {
            let confidence = (hits.len() as f64 * KEYWORD_WEIGHT).min(KEYWORD_CAP);
            best.offer(confidence, &hits.join(", "), MatchSource::Keyword);
        }
    }

    best
}

/// Runs the matcher across a skill set and keeps non-zero candidates.
///
/// Output preserves catalog order; sorting happens at decision time.
pub fn collect_candidates(message: &str, skills: &[Skill], is_sequence: bool) -> Vec<MatchCandidate> {
    skills
        .iter()
        .filter_map(|skill| {
            let found = match_skill(message, &skill.triggers, &skill.keywords);
            if !found.is_match() {
                return None;
            }
            Some(MatchCandidate {
                skill_id: skill.id.clone(),
                skill_key: skill.key.clone(),
                skill_name: skill.display_name().to_string(),
                category: skill.category.clone(),
                confidence: found.confidence,
                matched_trigger: found.matched_trigger,
                source: found.source.unwrap_or(MatchSource::Pattern),
                is_sequence,
                linked_skill_count: if is_sequence {
                    skill.linked_skill_count
                } else {
                    None
                },
            })
        })
        .collect()
}

/// Clamps a configured confidence into `[0, 1]`; NaN becomes 0.
pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Id;
    use chrono::Utc;

    fn keywords(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| (*w).to_string()).collect()
    }

    fn make_skill(key: &str, triggers: Vec<TriggerSpec>, kws: &[&str]) -> Skill {
        let now = Utc::now();
        Skill {
            id: Id::new(),
            key: key.to_string(),
            name: None,
            description: None,
            category: "email".to_string(),
            is_active: true,
            triggers,
            keywords: keywords(kws),
            linked_skill_count: Some(3),
            created_at: now,
            updated_at: now,
        }
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn pattern_match_is_case_insensitive() {
        let triggers = vec![TriggerSpec::new("Follow-Up Email").with_confidence(0.9)];
        let found = match_skill("Please send a FOLLOW-UP email today", &triggers, &[]);
        assert!(approx(found.confidence, 0.9));
        assert_eq!(found.matched_trigger.as_deref(), Some("Follow-Up Email"));
        assert_eq!(found.source, Some(MatchSource::Pattern));
    }

    #[test]
    fn missing_confidence_defaults_to_point_eight() {
        let triggers = vec![TriggerSpec::new("meeting prep")];
        let found = match_skill("help with meeting prep", &triggers, &[]);
        assert!(approx(found.confidence, 0.8));
    }

    #[test]
    fn first_trigger_wins_ties() {
        let triggers = vec![
            TriggerSpec::new("send").with_confidence(0.7),
            TriggerSpec::new("email").with_confidence(0.7),
        ];
        let found = match_skill("send an email", &triggers, &[]);
        assert_eq!(found.matched_trigger.as_deref(), Some("send"));
    }

    #[test]
    fn higher_later_trigger_replaces_earlier() {
        let triggers = vec![
            TriggerSpec::new("send").with_confidence(0.6),
            TriggerSpec::new("email").with_confidence(0.95),
        ];
        let found = match_skill("send an email", &triggers, &[]);
        assert!(approx(found.confidence, 0.95));
        assert_eq!(found.matched_trigger.as_deref(), Some("email"));
    }

    #[test]
    fn example_scores_below_pattern_of_same_trigger() {
        let trigger = TriggerSpec::new("draft a reply")
            .with_confidence(0.9)
            .with_examples(["write back to"]);
        let via_pattern = match_skill("draft a reply to Sam", &[trigger.clone()], &[]);
        let via_example = match_skill("write back to Sam", &[trigger], &[]);
        assert!(approx(via_example.confidence, 0.81));
        assert!(via_example.confidence < via_pattern.confidence);
        assert_eq!(via_example.source, Some(MatchSource::Example));
        assert_eq!(via_example.matched_trigger.as_deref(), Some("write back to"));
    }

    #[test]
    fn example_does_not_replace_equal_or_higher_pattern() {
        let triggers = vec![
            TriggerSpec::new("pipeline").with_confidence(0.6),
            TriggerSpec::new("forecast")
                .with_confidence(0.5)
                .with_examples(["pipeline review"]),
        ];
        let found = match_skill("run a pipeline review", &triggers, &[]);
        assert!(approx(found.confidence, 0.6));
        assert_eq!(found.source, Some(MatchSource::Pattern));
    }

    #[test]
    fn keyword_fallback_counts_whole_tokens() {
        let found = match_skill(
            "please send a follow-up email to the client",
            &[],
            &keywords(&["follow-up", "client", "invoice"]),
        );
        assert!(approx(found.confidence, 0.4));
        assert_eq!(found.source, Some(MatchSource::Keyword));
        assert_eq!(found.matched_trigger.as_deref(), Some("follow-up, client"));
    }

    #[test]
    fn keyword_fallback_is_capped() {
        let found = match_skill(
            "deal stage pipeline forecast quota",
            &[],
            &keywords(&["deal", "stage", "pipeline", "forecast", "quota"]),
        );
        assert!(approx(found.confidence, KEYWORD_CAP));
    }

    #[test]
    fn keyword_requires_whole_token() {
        let found = match_skill("emails everywhere", &[], &keywords(&["email"]));
        assert!(!found.is_match());
    }

    #[test]
    fn keyword_fallback_skipped_once_trigger_clears_threshold() {
        let triggers = vec![TriggerSpec::new("summarize").with_confidence(0.5)];
        let found = match_skill(
            "summarize the call notes",
            &triggers,
            &keywords(&["call", "notes", "summarize"]),
        );
        assert!(approx(found.confidence, 0.5));
        assert_eq!(found.source, Some(MatchSource::Pattern));
    }

    #[test]
    fn keyword_fallback_can_beat_weak_trigger() {
        let triggers = vec![TriggerSpec::new("call").with_confidence(0.3)];
        let found = match_skill(
            "log the call with notes",
            &triggers,
            &keywords(&["call", "notes"]),
        );
        assert!(approx(found.confidence, 0.4));
        assert_eq!(found.source, Some(MatchSource::Keyword));
    }

    #[test]
    fn keyword_fallback_never_lowers_confidence() {
        let triggers = vec![TriggerSpec::new("call").with_confidence(0.45)];
        let found = match_skill("log the call", &triggers, &keywords(&["call"]));
        assert!(approx(found.confidence, 0.45));
        assert_eq!(found.source, Some(MatchSource::Pattern));
    }

    #[test]
    fn blank_patterns_never_match() {
        let triggers = vec![
            TriggerSpec::new("   ").with_confidence(1.0).with_examples([""]),
        ];
        let found = match_skill("anything at all", &triggers, &keywords(&[" "]));
        assert!(!found.is_match());
        assert!(found.matched_trigger.is_none());
    }

    #[test]
    fn surrounding_spaces_in_pattern_are_significant() {
        let triggers = vec![TriggerSpec::new(" call ").with_examples([" log it "])];
        let found = match_skill("schedule a callback", &triggers, &[]);
        assert!(!found.is_match());

        let found = match_skill("please log it now", &triggers, &[]);
        assert_eq!(found.source, Some(MatchSource::Example));

        let found = match_skill("schedule a call today", &triggers, &[]);
        assert!(approx(found.confidence, 0.8));
        assert_eq!(found.matched_trigger.as_deref(), Some(" call "));
    }

    #[test]
    fn out_of_range_confidence_is_clamped() {
        let triggers = vec![TriggerSpec::new("quote").with_confidence(1.7)];
        let found = match_skill("send a quote", &triggers, &[]);
        assert!(approx(found.confidence, 1.0));
        assert!(approx(clamp_confidence(-0.2), 0.0));
        assert!(approx(clamp_confidence(f64::NAN), 0.0));
    }

    #[test]
    fn no_triggers_or_keywords_yields_zero() {
        let found = match_skill("hello", &[], &[]);
        assert!(approx(found.confidence, 0.0));
        assert!(found.source.is_none());
    }

    #[test]
    fn collector_drops_zero_confidence_skills() {
        let skills = vec![
            make_skill("follow-up", vec![TriggerSpec::new("follow-up")], &[]),
            make_skill("invoice", vec![TriggerSpec::new("invoice")], &[]),
        ];
        let candidates = collect_candidates("send a follow-up", &skills, false);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].skill_key, "follow-up");
        assert_eq!(candidates[0].skill_name, "follow-up");
        assert!(!candidates[0].is_sequence);
        assert!(candidates[0].linked_skill_count.is_none());
    }

    #[test]
    fn collector_tags_sequences_with_linked_count() {
        let skills = vec![make_skill(
            "deal-review",
            vec![TriggerSpec::new("deal review")],
            &[],
        )];
        let candidates = collect_candidates("start a deal review", &skills, true);
        assert_eq!(candidates.len(), 1);
        assert!(candidates[0].is_sequence);
        assert_eq!(candidates[0].linked_skill_count, Some(3));
    }

    #[test]
    fn collector_preserves_catalog_order() {
        let skills = vec![
            make_skill("b-skill", vec![TriggerSpec::new("report").with_confidence(0.6)], &[]),
            make_skill("a-skill", vec![TriggerSpec::new("report").with_confidence(0.9)], &[]),
        ];
        let keys: Vec<_> = collect_candidates("weekly report", &skills, false)
            .into_iter()
            .map(|c| c.skill_key)
            .collect();
        assert_eq!(keys, vec!["b-skill", "a-skill"]);
    }
}
