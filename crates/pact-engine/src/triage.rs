use serde_json::json;

use pact_contracts::events::EventWriter;
use pact_contracts::promise::{Certainty, CommitmentRow, PromiseCandidate, SaveDisposition};

use crate::intel::PromiseIntel;
use crate::record;

/// Candidates below this certainty never reach the dedup engine.
pub const SAVE_THRESHOLD: Certainty = Certainty::ProbablyAPromise;

/// Drop candidates the inference service itself judged unlikely to be real
/// commitments. Order preserved; every drop is recorded.
pub fn filter_candidates(
    candidates: Vec<PromiseCandidate>,
    events: &EventWriter,
) -> Vec<PromiseCandidate> {
    let mut kept = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if candidate.certainty >= SAVE_THRESHOLD {
            kept.push(candidate);
            continue;
        }
        record(
            events,
            "candidate_dropped",
            json!({
                "content": candidate.content,
                "certainty": candidate.certainty,
            }),
        );
    }
    kept
}

#[derive(Debug, Default)]
pub struct TriageOutcome {
    pub to_save: Vec<PromiseCandidate>,
    pub rejected: Vec<PromiseCandidate>,
}

/// Classify each filtered candidate against the owner's existing open set.
///
/// One comparison call per candidate, fanned out on scoped threads and
/// reassembled in input order. A per-candidate failure excludes that
/// candidate (default-safe) without touching its siblings. A wholesale
/// comparison outage (the pre-flight probe failing) saves everything
/// instead: duplicate risk is accepted over data loss, and the event stream
/// says so explicitly.
pub fn decide_candidates(
    intel: &dyn PromiseIntel,
    existing: &[CommitmentRow],
    candidates: Vec<PromiseCandidate>,
    events: &EventWriter,
) -> TriageOutcome {
    if candidates.is_empty() {
        return TriageOutcome::default();
    }

    if let Err(err) = intel.probe_comparison() {
        record(
            events,
            "dedup_fallback_save_all",
            json!({
                "error": err.to_string(),
                "candidates": candidates.len(),
                "tradeoff": "duplicate risk accepted over data loss",
            }),
        );
        return TriageOutcome {
            to_save: candidates,
            rejected: Vec::new(),
        };
    }

    let decisions: Vec<Result<SaveDisposition, String>> = std::thread::scope(|scope| {
        let handles: Vec<_> = candidates
            .iter()
            .map(|candidate| scope.spawn(move || intel.should_save(existing, candidate)))
            .collect();
        handles
            .into_iter()
            .map(|handle| match handle.join() {
                Ok(Ok(disposition)) => Ok(disposition),
                Ok(Err(err)) => Err(err.to_string()),
                Err(_) => Err("comparison call panicked".to_string()),
            })
            .collect()
    });

    let mut outcome = TriageOutcome::default();
    for (candidate, decision) in candidates.into_iter().zip(decisions) {
        match decision {
            Ok(disposition) => {
                record(
                    events,
                    "dedup_decision",
                    json!({
                        "content": candidate.content,
                        "disposition": disposition,
                    }),
                );
                if disposition.keeps() {
                    outcome.to_save.push(candidate);
                } else {
                    outcome.rejected.push(candidate);
                }
            }
            Err(error) => {
                record(
                    events,
                    "dedup_error",
                    json!({
                        "content": candidate.content,
                        "error": error,
                    }),
                );
            }
        }
    }
    outcome
}
