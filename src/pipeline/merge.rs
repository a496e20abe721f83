//! Competitive merge of run outcomes into a stored document.
//!
//! Each facet merges independently. A computed slot is adopted when the stored slot is empty
//! or when its confidence is at least the stored one; ties favour the newer value. Failed
//! outcomes never touch the document, so stored confidence per facet never decreases.

use super::context::{FacetOutcome, OutcomeResult};
use crate::document::{Document, Facet};
use serde::Serialize;

/// What merge did with one outcome.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum MergeDecision {
    /// Outcome replaced an empty or weaker slot.
    Adopted {
        /// Confidence of the adopted value.
        confidence: f32,
    },
    /// Stored slot was more confident and was kept.
    Preserved {
        /// Confidence of the kept value.
        stored: f32,
        /// Confidence of the rejected value.
        offered: f32,
    },
    /// Stage failed; the stored slot was left untouched.
    Failed,
}

/// Decision for one facet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FacetDecision {
    /// Facet merged.
    pub facet: Facet,
    /// Result of the comparison.
    #[serde(flatten)]
    pub decision: MergeDecision,
}

/// Merged document plus the per-facet decisions behind it.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeResult {
    /// Document after merge.
    pub document: Document,
    /// One decision per outcome, in outcome order.
    pub decisions: Vec<FacetDecision>,
}

impl MergeResult {
    /// Count of adopted and preserved decisions.
    pub fn tally(&self) -> (u64, u64) {
        tally(&self.decisions)
    }
}

/// Count adopted and preserved entries in `decisions`.
pub fn tally(decisions: &[FacetDecision]) -> (u64, u64) {
    decisions
        .iter()
        .fold((0, 0), |(adopted, preserved), decision| match decision.decision {
            MergeDecision::Adopted { .. } => (adopted + 1, preserved),
            MergeDecision::Preserved { .. } => (adopted, preserved + 1),
            MergeDecision::Failed => (adopted, preserved),
        })
}

/// Merge `outcomes` into a copy of `stored`.
pub fn merge(stored: &Document, outcomes: &[FacetOutcome]) -> MergeResult {
    let mut document = stored.clone();
    let mut decisions = Vec::with_capacity(outcomes.len());

    for outcome in outcomes {
        let decision = match &outcome.result {
            OutcomeResult::Failed { .. } => MergeDecision::Failed,
            OutcomeResult::Succeeded(slot) => match document.confidence(outcome.facet) {
                Some(existing) if slot.confidence < existing => MergeDecision::Preserved {
                    stored: existing,
                    offered: slot.confidence,
                },
                _ => {
                    document.install(slot.clone());
                    MergeDecision::Adopted {
                        confidence: slot.confidence,
                    }
                }
            },
        };
        decisions.push(FacetDecision {
            facet: outcome.facet,
            decision,
        });
    }

    document.refresh_state();
    MergeResult {
        document,
        decisions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::AdapterError;
    use crate::document::{AnalysisState, FacetSlot, FacetValue};

    fn category(label: &str, confidence: f32, method: &str) -> FacetSlot {
        FacetSlot {
            value: FacetValue::Category(label.into()),
            confidence,
            method: method.into(),
            computed_at: "2025-01-01T00:00:00Z".into(),
        }
    }

    fn stored_with(slot: FacetSlot) -> Document {
        let mut document = Document::new("doc", "text");
        document.install(slot);
        document
    }

    #[test]
    fn adopts_into_empty_slot() {
        let stored = Document::new("doc", "text");
        let result = merge(
            &stored,
            &[FacetOutcome::succeeded(category("sports", 0.2, "rules"), vec![])],
        );
        assert_eq!(result.document.confidence(Facet::Category), Some(0.2));
        assert_eq!(result.document.analysis_state, AnalysisState::Partial);
        assert_eq!(result.tally(), (1, 0));
    }

    #[test]
    fn preserves_more_confident_stored_value() {
        let stored = stored_with(category("politics", 0.9, "model"));
        let result = merge(
            &stored,
            &[FacetOutcome::succeeded(category("sports", 0.4, "rules"), vec![])],
        );
        assert_eq!(result.document, stored);
        assert_eq!(
            result.decisions[0].decision,
            MergeDecision::Preserved {
                stored: 0.9,
                offered: 0.4
            }
        );
    }

    #[test]
    fn equal_confidence_favours_new_value() {
        let stored = stored_with(category("politics", 0.7, "old"));
        let result = merge(
            &stored,
            &[FacetOutcome::succeeded(category("sports", 0.7, "new"), vec![])],
        );
        let slot = result.document.slot(Facet::Category).expect("slot");
        assert_eq!(slot.method, "new");
        assert_eq!(slot.value, FacetValue::Category("sports".into()));
    }

    #[test]
    fn failed_outcome_leaves_slot_alone() {
        let stored = stored_with(category("politics", 0.3, "old"));
        let result = merge(
            &stored,
            &[FacetOutcome::failed(
                Facet::Category,
                AdapterError::Failed("boom".into()),
                vec![],
            )],
        );
        assert_eq!(result.document, stored);
        assert_eq!(result.decisions[0].decision, MergeDecision::Failed);
    }

    #[test]
    fn merge_is_deterministic() {
        let stored = stored_with(category("politics", 0.3, "old"));
        let outcomes = [FacetOutcome::succeeded(
            FacetSlot {
                value: FacetValue::Keywords(vec!["vote".into()]),
                confidence: 0.6,
                method: "tf".into(),
                computed_at: "2025-01-01T00:00:00Z".into(),
            },
            vec![],
        )];
        let first = serde_json::to_string(&merge(&stored, &outcomes).document).expect("json");
        let second = serde_json::to_string(&merge(&stored, &outcomes).document).expect("json");
        assert_eq!(first, second);
    }
}
