//! Two-phase routing decisions.
//!
//! Phase 1 considers only sequences and stops when the best one clears the
//! sequence threshold. Phase 2 adds individual skills to the same pool and
//! selects the overall best if it clears the individual threshold. Otherwise
//! the decision carries no selection.
//!
//! The router never fails: catalog errors are logged and the affected source
//! is treated as empty.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::Config;
use crate::matcher::collect_candidates;
use crate::semantic::{merge_semantic_candidates, SemanticMatcher};
use crate::types::{MatchCandidate, MatchSource, RoutingDecision, RoutingOutcome, Skill};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("skill catalog unavailable: {0}")]
    Backend(String),
}

/// Source of active skills, partitioned into sequences and individual skills.
///
/// Implementations should return skills in a stable order; ties between
/// equal confidences are broken by that order.
#[async_trait]
pub trait SkillCatalog: Send + Sync {
    /// Active skills in the sequence category, with linked-skill counts.
    async fn list_active_sequences(&self) -> Result<Vec<Skill>, CatalogError>;

    /// Active skills excluding the sequence and human-in-the-loop categories.
    async fn list_active_individual_skills(&self) -> Result<Vec<Skill>, CatalogError>;
}

/// What happened while producing a decision, for metrics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteDiagnostics {
    pub sequence_fetch_failed: bool,
    pub individual_fetch_failed: bool,
    pub semantic_failed: bool,
    pub sequences_considered: usize,
    pub individuals_considered: usize,
    pub semantic_matches: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouteOutput {
    pub decision: RoutingDecision,
    pub diagnostics: RouteDiagnostics,
}

/// Routes messages against a skill catalog.
#[derive(Clone)]
pub struct Router {
    catalog: Arc<dyn SkillCatalog>,
    semantic: Option<SemanticMatcher>,
    config: Config,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("semantic", &self.semantic.is_some())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Router {
    pub fn new(catalog: Arc<dyn SkillCatalog>, config: Config) -> Self {
        Self {
            catalog,
            semantic: None,
            config,
        }
    }

    /// Attach a semantic source. Only consulted when `semantic_enabled` is set.
    pub fn with_semantic(mut self, semantic: SemanticMatcher) -> Self {
        self.semantic = Some(semantic);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Produce a routing decision for a message.
    pub async fn route(&self, message: &str) -> RoutingDecision {
        self.route_with_diagnostics(message).await.decision
    }

    /// Produce a routing decision plus diagnostics about degraded sources.
    pub async fn route_with_diagnostics(&self, message: &str) -> RouteOutput {
        let mut diagnostics = RouteDiagnostics::default();

        // Phase 1: sequences only.
        let sequences = match self.catalog.list_active_sequences().await {
            Ok(skills) => skills,
            Err(e) => {
                warn!(error = %e, "failed to fetch sequences, treating as empty");
                diagnostics.sequence_fetch_failed = true;
                Vec::new()
            }
        };
        let sequences: Vec<Skill> = sequences
            .into_iter()
            .filter(|s| s.is_active && s.category == self.config.sequence_category)
            .collect();
        diagnostics.sequences_considered = sequences.len();

        let mut pool = collect_candidates(message, &sequences, true);
        sort_candidates(&mut pool);

        if let Some(decision) = decide_sequence_phase(&pool, &self.config) {
            debug!(reason = %decision.reason, "sequence phase selected");
            return RouteOutput {
                decision,
                diagnostics,
            };
        }

        // Phase 2: individual skills join the sequence candidates.
        let individuals = match self.catalog.list_active_individual_skills().await {
            Ok(skills) => skills,
            Err(e) => {
                warn!(error = %e, "failed to fetch individual skills, treating as empty");
                diagnostics.individual_fetch_failed = true;
                Vec::new()
            }
        };
        // Sequence and hitl skills are only reachable through phase 1 or orchestration.
        let individuals: Vec<Skill> = individuals
            .into_iter()
            .filter(|s| {
                s.is_active
                    && s.category != self.config.sequence_category
                    && s.category != self.config.hitl_category
            })
            .collect();
        diagnostics.individuals_considered = individuals.len();

        pool.extend(collect_candidates(message, &individuals, false));

        if self.config.semantic_enabled {
            if let Some(ref semantic) = self.semantic {
                match semantic
                    .try_find_matches(
                        message,
                        self.config.semantic_threshold,
                        self.config.semantic_limit,
                    )
                    .await
                {
                    Ok(matches) => {
                        diagnostics.semantic_matches = matches.len();
                        merge_semantic_candidates(
                            &mut pool,
                            matches,
                            &[
                                self.config.sequence_category.as_str(),
                                self.config.hitl_category.as_str(),
                            ],
                        );
                    }
                    Err(e) => {
                        warn!(error = %e, "semantic matching unavailable, continuing without it");
                        diagnostics.semantic_failed = true;
                    }
                }
            }
        }

        sort_candidates(&mut pool);
        let decision = decide_final(pool, &self.config);
        debug!(reason = %decision.reason, "routing decision");

        RouteOutput {
            decision,
            diagnostics,
        }
    }
}

/// Stable sort by descending confidence; equal scores keep catalog order.
pub fn sort_candidates(candidates: &mut [MatchCandidate]) {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
}

/// Decide the sequence phase over sorted sequence candidates.
///
/// Returns `None` when no sequence clears the sequence threshold.
pub fn decide_sequence_phase(sorted: &[MatchCandidate], config: &Config) -> Option<RoutingDecision> {
    let top = sorted.first()?;
    if top.confidence < config.sequence_threshold {
        return None;
    }

    Some(RoutingDecision {
        selected: Some(top.clone()),
        candidates: sorted.iter().take(config.candidate_cap()).cloned().collect(),
        is_sequence_match: true,
        outcome: RoutingOutcome::Sequence,
        reason: format!(
            "Sequence \"{}\" matched with {} confidence{}",
            top.skill_name,
            format_percent(top.confidence),
            match_detail(top)
        ),
    })
}

/// Decide the individual phase (or no match) over the sorted full pool.
pub fn decide_final(mut sorted: Vec<MatchCandidate>, config: &Config) -> RoutingDecision {
    let top = sorted.first().cloned();
    sorted.truncate(config.candidate_cap());

    let Some(top) = top else {
        return RoutingDecision {
            selected: None,
            candidates: sorted,
            is_sequence_match: false,
            outcome: RoutingOutcome::NoMatch,
            reason: "No skills matched the message".to_string(),
        };
    };

    if top.confidence < config.individual_threshold {
        let reason = format!(
            "No skill reached the {} threshold; best candidate \"{}\" scored {}",
            format_percent(config.individual_threshold),
            top.skill_name,
            format_percent(top.confidence)
        );
        return RoutingDecision {
            selected: None,
            candidates: sorted,
            is_sequence_match: false,
            outcome: RoutingOutcome::NoMatch,
            reason,
        };
    }

    let (outcome, reason) = if top.is_sequence {
        (
            RoutingOutcome::SequenceBelowThreshold,
            format!(
                "Sequence \"{}\" matched below sequence threshold ({}) with {} confidence{}",
                top.skill_name,
                format_percent(config.sequence_threshold),
                format_percent(top.confidence),
                match_detail(&top)
            ),
        )
    } else {
        (
            RoutingOutcome::Individual,
            format!(
                "Individual skill \"{}\" matched with {} confidence{}",
                top.skill_name,
                format_percent(top.confidence),
                match_detail(&top)
            ),
        )
    };

    RoutingDecision {
        is_sequence_match: top.is_sequence,
        selected: Some(top),
        candidates: sorted,
        outcome,
        reason,
    }
}

/// Confidence as a whole percentage, rounded to nearest (0.875 -> "88%").
pub fn format_percent(confidence: f64) -> String {
    format!("{}%", (confidence * 100.0).round() as i64)
}

fn match_detail(candidate: &MatchCandidate) -> String {
    match (candidate.source, candidate.matched_trigger.as_deref()) {
        (MatchSource::Semantic, _) => " (semantic similarity)".to_string(),
        (MatchSource::Keyword, Some(words)) => format!(" (keywords: {words})"),
        (MatchSource::Example, Some(text)) => format!(" (example: \"{text}\")"),
        (_, Some(text)) => format!(" (trigger: \"{text}\")"),
        (_, None) => String::new(),
    }
}
