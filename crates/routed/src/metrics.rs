//! Routing metrics collection.
//!
//! Atomic counters, cheap to bump from request handlers and background tasks.

use route_core::{RoutingDecision, RoutingOutcome};
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Counters for routing operations.
#[derive(Debug, Default)]
pub struct RoutingMetrics {
    /// Total number of routing decisions made.
    pub decisions_total: AtomicUsize,
    /// Decisions won by a sequence in the first phase.
    pub sequence_matches_total: AtomicUsize,
    /// Decisions won by an individual skill (or a below-threshold sequence).
    pub individual_matches_total: AtomicUsize,
    pub no_match_total: AtomicUsize,
    /// Catalog reads that failed and were treated as empty.
    pub catalog_fetch_failed_total: AtomicUsize,
    pub semantic_failed_total: AtomicUsize,
    pub decision_log_failed_total: AtomicUsize,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, serde::Deserialize)]
pub struct MetricsSnapshot {
    pub decisions_total: usize,
    pub sequence_matches_total: usize,
    pub individual_matches_total: usize,
    pub no_match_total: usize,
    pub catalog_fetch_failed_total: usize,
    pub semantic_failed_total: usize,
    pub decision_log_failed_total: usize,
}

impl RoutingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a decision under its outcome.
    pub fn record_decision(&self, decision: &RoutingDecision) {
        self.decisions_total.fetch_add(1, Ordering::Relaxed);
        let counter = match decision.outcome {
            RoutingOutcome::Sequence => &self.sequence_matches_total,
            RoutingOutcome::SequenceBelowThreshold | RoutingOutcome::Individual => {
                &self.individual_matches_total
            }
            RoutingOutcome::NoMatch => &self.no_match_total,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_catalog_fetch_failed(&self, count: usize) {
        self.catalog_fetch_failed_total
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn inc_semantic_failed(&self) {
        self.semantic_failed_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_decision_log_failed(&self) {
        self.decision_log_failed_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_decisions(&self) -> usize {
        self.decisions_total.load(Ordering::Relaxed)
    }

    pub fn get_decision_log_failed(&self) -> usize {
        self.decision_log_failed_total.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            decisions_total: self.decisions_total.load(Ordering::Relaxed),
            sequence_matches_total: self.sequence_matches_total.load(Ordering::Relaxed),
            individual_matches_total: self.individual_matches_total.load(Ordering::Relaxed),
            no_match_total: self.no_match_total.load(Ordering::Relaxed),
            catalog_fetch_failed_total: self.catalog_fetch_failed_total.load(Ordering::Relaxed),
            semantic_failed_total: self.semantic_failed_total.load(Ordering::Relaxed),
            decision_log_failed_total: self.decision_log_failed_total.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decision(outcome: RoutingOutcome) -> RoutingDecision {
        RoutingDecision {
            selected: None,
            candidates: Vec::new(),
            is_sequence_match: outcome == RoutingOutcome::Sequence,
            outcome,
            reason: String::new(),
        }
    }

    #[test]
    fn records_decisions_by_outcome() {
        let metrics = RoutingMetrics::new();
        metrics.record_decision(&decision(RoutingOutcome::Sequence));
        metrics.record_decision(&decision(RoutingOutcome::Individual));
        metrics.record_decision(&decision(RoutingOutcome::SequenceBelowThreshold));
        metrics.record_decision(&decision(RoutingOutcome::NoMatch));

        let snap = metrics.snapshot();
        assert_eq!(snap.decisions_total, 4);
        assert_eq!(snap.sequence_matches_total, 1);
        assert_eq!(snap.individual_matches_total, 2);
        assert_eq!(snap.no_match_total, 1);
        assert_eq!(metrics.get_decisions(), 4);
    }

    #[test]
    fn increments_failure_counters() {
        let metrics = RoutingMetrics::new();
        metrics.inc_catalog_fetch_failed(2);
        metrics.inc_semantic_failed();
        metrics.inc_decision_log_failed();
        metrics.inc_decision_log_failed();

        let snap = metrics.snapshot();
        assert_eq!(snap.catalog_fetch_failed_total, 2);
        assert_eq!(snap.semantic_failed_total, 1);
        assert_eq!(metrics.get_decision_log_failed(), 2);
    }
}
