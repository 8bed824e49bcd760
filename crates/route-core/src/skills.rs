//! Skill definitions and validation.
//!
//! A `SkillDefinition` is the authored form of a skill: what operators write
//! in catalog YAML files or POST to the daemon. Storage turns a validated
//! definition into a `Skill` record.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::types::TriggerSpec;

/// Category value that marks a skill as an orchestration ("sequence").
pub const SEQUENCE_CATEGORY: &str = "agent-sequence";

/// Reserved human-in-the-loop category; never directly matchable.
pub const HITL_CATEGORY: &str = "hitl";

/// Words that may not appear in a skill key.
const RESERVED_WORDS: &[&str] = &["claude", "anthropic"];

fn default_true() -> bool {
    true
}

/// Authored skill definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillDefinition {
    pub key: String,
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
    /// Keys of the skills a sequence orchestrates.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub linked_skills: Vec<String>,
}

impl SkillDefinition {
    /// SHA-256 of the canonical JSON form, used to skip unchanged imports.
    pub fn content_hash(&self) -> String {
        let json = serde_json::to_vec(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(&json);
        format!("{:x}", hasher.finalize())
    }
}

/// Error type for skill definition validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SkillError {
    #[error("invalid key: {0}")]
    InvalidKey(String),
    #[error("invalid category: {0}")]
    InvalidCategory(String),
    #[error("invalid description: {0}")]
    InvalidDescription(String),
    #[error("invalid trigger #{index}: {reason}")]
    InvalidTrigger { index: usize, reason: String },
    #[error("invalid keyword '{0}': keywords must be single words")]
    InvalidKeyword(String),
    #[error("invalid linked skill: {0}")]
    InvalidLink(String),
    #[error("invalid catalog file: {0}")]
    InvalidYaml(String),
}

/// One YAML catalog file: a single definition or a list of them.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CatalogDocument {
    Many(Vec<SkillDefinition>),
    One(Box<SkillDefinition>),
}

/// Parses the contents of a catalog YAML file.
pub fn parse_catalog_yaml(content: &str) -> Result<Vec<SkillDefinition>, SkillError> {
    let doc: CatalogDocument =
        serde_yaml::from_str(content).map_err(|e| SkillError::InvalidYaml(e.to_string()))?;
    Ok(match doc {
        CatalogDocument::Many(defs) => defs,
        CatalogDocument::One(def) => vec![*def],
    })
}

/// Validates a kebab-case identifier (skill key or category).
///
/// Rules:
/// - 1-64 characters
/// - Lowercase letters, numbers, and hyphens only
/// - Must not start or end with hyphen
/// - Must not contain consecutive hyphens
fn validate_kebab(value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err("cannot be empty".to_string());
    }
    if value.len() > 64 {
        return Err(format!("exceeds 64 characters (got {})", value.len()));
    }
    if value.starts_with('-') {
        return Err("cannot start with hyphen".to_string());
    }
    if value.ends_with('-') {
        return Err("cannot end with hyphen".to_string());
    }
    if value.contains("--") {
        return Err("cannot contain consecutive hyphens".to_string());
    }
    for c in value.chars() {
        if !c.is_ascii_lowercase() && !c.is_ascii_digit() && c != '-' {
            return Err(format!(
                "invalid character '{c}': only lowercase letters, numbers, and hyphens allowed"
            ));
        }
    }
    Ok(())
}

/// Validates a skill key.
pub fn validate_key(key: &str) -> Result<(), SkillError> {
    validate_kebab(key).map_err(|reason| SkillError::InvalidKey(format!("'{key}' {reason}")))?;
    if let Some(word) = RESERVED_WORDS.iter().find(|w| key.contains(*w)) {
        return Err(SkillError::InvalidKey(format!(
            "'{key}' contains reserved word '{word}'"
        )));
    }
    Ok(())
}

/// Validates a full skill definition. Only skills in `sequence_category`
/// may carry linked skills.
pub fn validate_definition(def: &SkillDefinition, sequence_category: &str) -> Result<(), SkillError> {
    validate_key(&def.key)?;
    validate_kebab(&def.category)
        .map_err(|reason| SkillError::InvalidCategory(format!("'{}' {reason}", def.category)))?;

    if let Some(ref description) = def.description {
        if description.len() > 1024 {
            return Err(SkillError::InvalidDescription(format!(
                "description exceeds 1024 characters (got {})",
                description.len()
            )));
        }
    }

    for (index, trigger) in def.triggers.iter().enumerate() {
        if trigger.pattern.trim().is_empty() {
            return Err(SkillError::InvalidTrigger {
                index,
                reason: "pattern cannot be empty".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&trigger.confidence) {
            return Err(SkillError::InvalidTrigger {
                index,
                reason: format!("confidence must be within [0, 1], got {}", trigger.confidence),
            });
        }
        if trigger.examples.iter().any(|e| e.trim().is_empty()) {
            return Err(SkillError::InvalidTrigger {
                index,
                reason: "examples cannot be empty".to_string(),
            });
        }
    }

    for keyword in &def.keywords {
        if keyword.trim().is_empty() || keyword.trim().contains(char::is_whitespace) {
            return Err(SkillError::InvalidKeyword(keyword.clone()));
        }
    }

    if !def.linked_skills.is_empty() && def.category != sequence_category {
        return Err(SkillError::InvalidLink(format!(
            "only '{sequence_category}' skills may link other skills"
        )));
    }
    for linked in &def.linked_skills {
        if linked == &def.key {
            return Err(SkillError::InvalidLink(format!(
                "sequence '{}' cannot link itself",
                def.key
            )));
        }
        validate_key(linked).map_err(|e| SkillError::InvalidLink(e.to_string()))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_def(key: &str, category: &str) -> SkillDefinition {
        SkillDefinition {
            key: key.to_string(),
            name: None,
            description: None,
            category: category.to_string(),
            is_active: true,
            triggers: vec![TriggerSpec::new("follow-up email")],
            keywords: vec!["follow-up".to_string()],
            linked_skills: Vec::new(),
        }
    }

    #[test]
    fn validate_key_accepts_kebab_case() {
        assert!(validate_key("follow-up-email").is_ok());
        assert!(validate_key("a1b2").is_ok());
        assert!(validate_key(&"a".repeat(64)).is_ok());
    }

    #[test]
    fn validate_key_rejects_bad_shapes() {
        for key in ["", "-lead", "lead-", "lead--score", "Lead", "lead_score", "lead score"] {
            let err = validate_key(key).unwrap_err();
            assert!(matches!(err, SkillError::InvalidKey(_)), "{key}");
        }
        assert!(validate_key(&"a".repeat(65)).is_err());
    }

    #[test]
    fn validate_key_rejects_reserved_words() {
        let err = validate_key("claude-helper").unwrap_err();
        assert!(err.to_string().contains("reserved"));
    }

    #[test]
    fn validate_definition_accepts_valid() {
        assert!(validate_definition(&make_def("draft-email", "email"), SEQUENCE_CATEGORY).is_ok());
    }

    #[test]
    fn validate_definition_rejects_blank_pattern() {
        let mut def = make_def("draft-email", "email");
        def.triggers.push(TriggerSpec::new("  "));
        let err = validate_definition(&def, SEQUENCE_CATEGORY).unwrap_err();
        assert!(matches!(err, SkillError::InvalidTrigger { index: 1, .. }));
    }

    #[test]
    fn validate_definition_rejects_out_of_range_confidence() {
        let mut def = make_def("draft-email", "email");
        def.triggers[0].confidence = 1.2;
        assert!(matches!(
            validate_definition(&def, SEQUENCE_CATEGORY).unwrap_err(),
            SkillError::InvalidTrigger { index: 0, .. }
        ));
    }

    #[test]
    fn validate_definition_rejects_multi_word_keyword() {
        let mut def = make_def("draft-email", "email");
        def.keywords.push("follow up".to_string());
        assert!(matches!(
            validate_definition(&def, SEQUENCE_CATEGORY).unwrap_err(),
            SkillError::InvalidKeyword(_)
        ));
    }

    #[test]
    fn validate_definition_rejects_links_on_individual_skill() {
        let mut def = make_def("draft-email", "email");
        def.linked_skills.push("send-email".to_string());
        assert!(matches!(
            validate_definition(&def, SEQUENCE_CATEGORY).unwrap_err(),
            SkillError::InvalidLink(_)
        ));
    }

    #[test]
    fn validate_definition_rejects_self_link() {
        let mut def = make_def("deal-review", SEQUENCE_CATEGORY);
        def.linked_skills.push("deal-review".to_string());
        assert!(validate_definition(&def, SEQUENCE_CATEGORY).is_err());
    }

    #[test]
    fn parse_catalog_yaml_single_definition() {
        let content = r#"
key: follow-up-sequence
name: Follow-up Sequence
category: agent-sequence
triggers:
  - pattern: follow-up email
    confidence: 0.9
    examples:
      - check in with the client
keywords: [follow-up]
linked_skills: [draft-email, send-email]
"#;
        let defs = parse_catalog_yaml(content).unwrap();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].key, "follow-up-sequence");
        assert!(defs[0].is_active);
        assert_eq!(defs[0].triggers[0].examples, vec!["check in with the client"]);
        assert_eq!(defs[0].linked_skills.len(), 2);
    }

    #[test]
    fn parse_catalog_yaml_list_with_default_confidence() {
        let content = r#"
- key: draft-email
  category: email
  triggers:
    - pattern: draft an email
- key: log-call
  category: activity
  is_active: false
"#;
        let defs = parse_catalog_yaml(content).unwrap();
        assert_eq!(defs.len(), 2);
        assert!((defs[0].triggers[0].confidence - 0.8).abs() < f64::EPSILON);
        assert!(!defs[1].is_active);
        assert!(defs[1].triggers.is_empty());
    }

    #[test]
    fn parse_catalog_yaml_rejects_garbage() {
        let err = parse_catalog_yaml("just a string").unwrap_err();
        assert!(matches!(err, SkillError::InvalidYaml(_)));
    }

    #[test]
    fn content_hash_changes_with_definition() {
        let a = make_def("draft-email", "email");
        let mut b = a.clone();
        assert_eq!(a.content_hash(), b.content_hash());
        b.keywords.push("reply".to_string());
        assert_ne!(a.content_hash(), b.content_hash());
        assert_eq!(a.content_hash().len(), 64);
    }
}
