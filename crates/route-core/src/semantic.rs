//! Semantic match source.
//!
//! Generates candidates by vector similarity instead of substring matching.
//! The embedder and similarity index are external collaborators; any failure
//! on this path degrades to "no semantic matches".

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::matcher::clamp_confidence;
use crate::types::{Id, MatchCandidate, MatchSource, TriggerSpec};

/// Default minimum similarity for a semantic match.
pub const DEFAULT_SEMANTIC_THRESHOLD: f64 = 0.5;

/// Default cap on semantic matches per query.
pub const DEFAULT_SEMANTIC_LIMIT: usize = 5;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EmbeddingError {
    #[error("cannot embed empty text")]
    EmptyInput,
    #[error("embedding backend failed: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IndexError {
    #[error("similarity index failed: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SemanticError {
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Turns text into a vector embedding.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

/// Ranks catalog skills by similarity to an embedding.
#[async_trait]
pub trait SimilarityIndex: Send + Sync {
    /// Returns rows with `similarity >= threshold`, best first, at most `limit`.
    async fn query(
        &self,
        embedding: &[f32],
        threshold: f64,
        limit: usize,
    ) -> Result<Vec<SimilarityRow>, IndexError>;
}

/// Raw row returned by a similarity index.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityRow {
    pub skill_id: Id,
    pub skill_key: String,
    pub skill_name: Option<String>,
    pub category: String,
    pub similarity: f64,
}

/// A similarity-ranked match in candidate shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticMatch {
    pub skill_id: Id,
    pub skill_key: String,
    pub skill_name: String,
    pub category: String,
    /// Similarity clamped into `[0, 1]`.
    pub similarity: f64,
}

impl From<SimilarityRow> for SemanticMatch {
    fn from(row: SimilarityRow) -> Self {
        let skill_name = row
            .skill_name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| row.skill_key.clone());
        Self {
            skill_id: row.skill_id,
            skill_key: row.skill_key,
            skill_name,
            category: row.category,
            similarity: clamp_confidence(row.similarity),
        }
    }
}

impl SemanticMatch {
    pub fn into_candidate(self) -> MatchCandidate {
        MatchCandidate {
            skill_id: self.skill_id,
            skill_key: self.skill_key,
            skill_name: self.skill_name,
            category: self.category,
            confidence: self.similarity,
            matched_trigger: None,
            source: MatchSource::Semantic,
            is_sequence: false,
            linked_skill_count: None,
        }
    }
}

/// Embeds a query and looks it up in a similarity index.
#[derive(Clone)]
pub struct SemanticMatcher {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn SimilarityIndex>,
}

impl std::fmt::Debug for SemanticMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SemanticMatcher").finish_non_exhaustive()
    }
}

impl SemanticMatcher {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn SimilarityIndex>) -> Self {
        Self { embedder, index }
    }

    /// Like [`find_matches`](Self::find_matches) but surfaces the failure.
    pub async fn try_find_matches(
        &self,
        query: &str,
        threshold: f64,
        limit: usize,
    ) -> Result<Vec<SemanticMatch>, SemanticError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let embedding = self.embedder.embed(query).await?;
        let rows = self.index.query(&embedding, threshold, limit).await?;
        Ok(rows
            .into_iter()
            .map(SemanticMatch::from)
            .filter(|m| m.similarity > 0.0)
            .take(limit)
            .collect())
    }

    /// Similarity-ranked matches for a query. Never fails: errors are logged
    /// and yield an empty list.
    pub async fn find_matches(&self, query: &str, threshold: f64, limit: usize) -> Vec<SemanticMatch> {
        match self.try_find_matches(query, threshold, limit).await {
            Ok(matches) => matches,
            Err(e) => {
                warn!(error = %e, "semantic matching unavailable, continuing without it");
                Vec::new()
            }
        }
    }
}

/// Merges semantic matches into a candidate pool as individual-skill candidates.
///
/// Matches in `excluded_categories` are dropped. When a skill already has a
/// candidate, the higher confidence wins and ties keep the existing one.
pub fn merge_semantic_candidates(
    pool: &mut Vec<MatchCandidate>,
    matches: Vec<SemanticMatch>,
    excluded_categories: &[&str],
) {
    for found in matches {
        if excluded_categories.contains(&found.category.as_str()) || found.similarity <= 0.0 {
            continue;
        }
        match pool.iter_mut().find(|c| c.skill_id == found.skill_id) {
            Some(existing) => {
                if found.similarity > existing.confidence {
                    existing.confidence = found.similarity;
                    existing.matched_trigger = None;
                    existing.source = MatchSource::Semantic;
                }
            }
            None => pool.push(found.into_candidate()),
        }
    }
}

/// Text used to embed a skill: display name, trigger patterns, examples and keywords.
pub fn skill_embedding_text(name: &str, triggers: &[TriggerSpec], keywords: &[String]) -> String {
    let mut parts: Vec<&str> = vec![name];
    for trigger in triggers {
        parts.push(&trigger.pattern);
        parts.extend(trigger.examples.iter().map(String::as_str));
    }
    parts.extend(keywords.iter().map(String::as_str));
    parts
        .into_iter()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Cosine similarity; 0 for mismatched lengths or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        f64::from(dot / (norm_a * norm_b))
    }
}
