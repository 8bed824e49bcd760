//! Fire-and-forget decision logging.
//!
//! Routing never waits on the log write; failures are counted and logged.

use crate::metrics::RoutingMetrics;
use crate::storage::Storage;
use chrono::Utc;
use route_core::types::message_snippet;
use route_core::{DecisionRecord, Id, RoutingDecision};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct DecisionLogger {
    storage: Arc<Storage>,
    metrics: Arc<RoutingMetrics>,
    snippet_chars: usize,
}

impl DecisionLogger {
    pub fn new(storage: Arc<Storage>, metrics: Arc<RoutingMetrics>, snippet_chars: usize) -> Self {
        Self {
            storage,
            metrics,
            snippet_chars,
        }
    }

    /// Build the persisted form of a decision.
    pub fn build_record(
        &self,
        user_id: Option<String>,
        message: &str,
        decision: &RoutingDecision,
    ) -> DecisionRecord {
        DecisionRecord {
            id: Id::new(),
            user_id,
            message_snippet: message_snippet(message, self.snippet_chars),
            selected_skill_key: decision.selected.as_ref().map(|c| c.skill_key.clone()),
            confidence: decision.selected.as_ref().map(|c| c.confidence),
            is_sequence_match: decision.is_sequence_match,
            outcome: decision.outcome,
            reason: decision.reason.clone(),
            candidate_count: decision.candidates.len() as u32,
            created_at: Utc::now(),
        }
    }

    /// Persist a decision in the background. The returned handle may be dropped.
    pub fn record(
        &self,
        user_id: Option<String>,
        message: &str,
        decision: &RoutingDecision,
    ) -> JoinHandle<()> {
        let record = self.build_record(user_id, message, decision);
        let candidates = decision.candidates.clone();
        let storage = Arc::clone(&self.storage);
        let metrics = Arc::clone(&self.metrics);

        tokio::spawn(async move {
            match storage.insert_decision(&record, &candidates).await {
                Ok(()) => debug!(id = %record.id, outcome = record.outcome.as_str(), "decision logged"),
                Err(e) => {
                    warn!(id = %record.id, error = %e, "failed to log routing decision");
                    metrics.inc_decision_log_failed();
                }
            }
        })
    }
}
