//! Core types for the copilot router.
//!
//! Skills are long-lived catalog records; candidates and decisions are
//! created fresh for every routing call.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default confidence for a trigger that does not configure one.
pub const DEFAULT_TRIGGER_CONFIDENCE: f64 = 0.8;

/// Unique identifier for skills and logged decisions.
/// Uses `UUIDv7` for time-ordered lexicographic sorting.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id(pub String);

impl Id {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }
}

impl Default for Id {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Id {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn default_trigger_confidence() -> f64 {
    DEFAULT_TRIGGER_CONFIDENCE
}

fn default_true() -> bool {
    true
}

/// A trigger pattern plus optional alternate phrasings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerSpec {
    /// Substring that signals the skill is relevant (matched case-insensitively).
    pub pattern: String,
    /// Confidence assigned on a pattern hit (default: 0.8).
    #[serde(default = "default_trigger_confidence")]
    pub confidence: f64,
    /// Alternate phrasings; a hit scores `confidence * 0.9`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<String>,
}

impl TriggerSpec {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            confidence: DEFAULT_TRIGGER_CONFIDENCE,
            examples: Vec::new(),
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_examples<I, S>(mut self, examples: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.examples = examples.into_iter().map(Into::into).collect();
        self
    }
}

/// A routable capability or orchestration stored in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Skill {
    pub id: Id,
    /// Stable human-readable identifier (kebab-case).
    pub key: String,
    /// Display name; falls back to `key` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub category: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub triggers: Vec<TriggerSpec>,
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Number of sub-skills a sequence orchestrates. Informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_skill_count: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Skill {
    /// Name shown to operators: the configured display name, else the key.
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(&self.key)
    }
}

/// Which part of a skill's trigger metadata produced a candidate score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchSource {
    Pattern,
    Example,
    Keyword,
    Semantic,
}

impl MatchSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pattern => "pattern",
            Self::Example => "example",
            Self::Keyword => "keyword",
            Self::Semantic => "semantic",
        }
    }
}

/// A scored association between a message and a skill for one routing call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub skill_id: Id,
    pub skill_key: String,
    pub skill_name: String,
    pub category: String,
    /// Always in `(0, 1]`.
    pub confidence: f64,
    /// Literal text that produced the score, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_trigger: Option<String>,
    pub source: MatchSource,
    pub is_sequence: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_skill_count: Option<u32>,
}

/// Terminal state reached by a routing call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingOutcome {
    /// A sequence cleared the sequence threshold in the first phase.
    Sequence,
    /// A sequence won the second phase without clearing the sequence threshold.
    SequenceBelowThreshold,
    /// An individual skill cleared the individual threshold.
    Individual,
    /// Nothing reached the individual threshold.
    NoMatch,
}

impl RoutingOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sequence => "sequence",
            Self::SequenceBelowThreshold => "sequence_below_threshold",
            Self::Individual => "individual",
            Self::NoMatch => "no_match",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "sequence" => Some(Self::Sequence),
            "sequence_below_threshold" => Some(Self::SequenceBelowThreshold),
            "individual" => Some(Self::Individual),
            "no_match" => Some(Self::NoMatch),
            _ => None,
        }
    }
}

/// Output of one routing call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected: Option<MatchCandidate>,
    /// Top candidates considered, sorted by non-increasing confidence.
    pub candidates: Vec<MatchCandidate>,
    pub is_sequence_match: bool,
    pub outcome: RoutingOutcome,
    pub reason: String,
}

/// A persisted routing decision for analytics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub id: Id,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub message_snippet: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_skill_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    pub is_sequence_match: bool,
    pub outcome: RoutingOutcome,
    pub reason: String,
    pub candidate_count: u32,
    pub created_at: DateTime<Utc>,
}

/// Truncates a message to at most `max_chars` characters on a char boundary.
pub fn message_snippet(message: &str, max_chars: usize) -> String {
    message.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_skill(key: &str, name: Option<&str>) -> Skill {
        let now = Utc::now();
        Skill {
            id: Id::new(),
            key: key.to_string(),
            name: name.map(String::from),
            description: None,
            category: "email".to_string(),
            is_active: true,
            triggers: Vec::new(),
            keywords: Vec::new(),
            linked_skill_count: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn display_name_falls_back_to_key() {
        assert_eq!(make_skill("draft-email", None).display_name(), "draft-email");
        assert_eq!(make_skill("draft-email", Some("  ")).display_name(), "draft-email");
        assert_eq!(
            make_skill("draft-email", Some("Draft Email")).display_name(),
            "Draft Email"
        );
    }

    #[test]
    fn trigger_confidence_defaults_when_absent() {
        let trigger: TriggerSpec = serde_json::from_str(r#"{"pattern":"follow-up"}"#).unwrap();
        assert!((trigger.confidence - DEFAULT_TRIGGER_CONFIDENCE).abs() < f64::EPSILON);
        assert!(trigger.examples.is_empty());
    }

    #[test]
    fn outcome_round_trips_through_str() {
        for outcome in [
            RoutingOutcome::Sequence,
            RoutingOutcome::SequenceBelowThreshold,
            RoutingOutcome::Individual,
            RoutingOutcome::NoMatch,
        ] {
            assert_eq!(RoutingOutcome::parse(outcome.as_str()), Some(outcome));
        }
        assert_eq!(RoutingOutcome::parse("bogus"), None);
    }

    #[test]
    fn snippet_respects_char_boundaries() {
        let message = "héllo wörld";
        assert_eq!(message_snippet(message, 4), "héll");
        assert_eq!(message_snippet("short", 200), "short");
    }

    #[test]
    fn match_source_serializes() {
        assert_eq!(
            serde_json::to_string(&MatchSource::Keyword).unwrap(),
            "\"keyword\""
        );
    }
}
