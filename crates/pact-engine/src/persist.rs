use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};

use pact_contracts::events::EventWriter;
use pact_contracts::promise::{
    CaptureRef, CommitmentRow, NewCommitment, PromiseCandidate, ResolutionEvidence,
    ResolutionPatch,
};
use pact_contracts::store::CommitmentStore;

use crate::record;

/// A candidate that made it into the store, paired with its inserted row.
#[derive(Debug, Clone)]
pub struct SavedCandidate {
    pub candidate: PromiseCandidate,
    pub row: CommitmentRow,
}

/// Insert each accepted candidate as a new owner-scoped row. Best-effort:
/// a failing insert is recorded and skipped, never aborting its siblings.
pub fn save_candidates(
    store: &dyn CommitmentStore,
    owner_id: &str,
    to_save: Vec<PromiseCandidate>,
    capture: &CaptureRef,
    events: &EventWriter,
) -> Vec<SavedCandidate> {
    let mut saved = Vec::with_capacity(to_save.len());
    for candidate in to_save {
        let row = NewCommitment {
            content: candidate.content.clone(),
            to_whom: candidate.to_whom.clone(),
            deadline: candidate.deadline.clone(),
            platform: candidate.platform.clone(),
            action: candidate.action.clone(),
            extraction_data: extraction_snapshot(&candidate, capture),
            metadata: indexmap::IndexMap::new(),
        };
        match store.insert(owner_id, row) {
            Ok(inserted) => saved.push(SavedCandidate {
                candidate,
                row: inserted,
            }),
            Err(err) => record(
                events,
                "row_insert_failed",
                json!({
                    "content": candidate.content,
                    "error": err.to_string(),
                }),
            ),
        }
    }
    saved
}

/// Apply resolution evidence to the owner's rows. The target is located by
/// exact content equality among unresolved rows of the fetched snapshot;
/// evidence matching nothing is a recorded no-op. Returns the total rows
/// actually affected plus the evidence items that landed.
pub fn apply_resolutions(
    store: &dyn CommitmentStore,
    owner_id: &str,
    evidence: &[ResolutionEvidence],
    snapshot: &[CommitmentRow],
    capture: &CaptureRef,
    events: &EventWriter,
) -> (u64, Vec<ResolutionEvidence>) {
    let mut affected_total = 0u64;
    let mut applied = Vec::new();

    for item in evidence {
        let Some(target) = snapshot
            .iter()
            .find(|row| row.is_open() && row.content == item.content)
        else {
            record(
                events,
                "resolution_noop",
                json!({
                    "content": item.content,
                    "reason": "no unresolved row matches the evidence content",
                }),
            );
            continue;
        };

        let mut metadata = target.metadata.clone();
        metadata.insert(
            "resolution_reasoning".to_string(),
            Value::String(item.resolution_reasoning.clone()),
        );
        if let Some(evidence_text) = &item.resolution_evidence {
            metadata.insert(
                "resolution_evidence".to_string(),
                Value::String(evidence_text.clone()),
            );
        }

        let patch = ResolutionPatch {
            resolved_reason: item.resolution_reasoning.clone(),
            resolved_at: now_utc_iso(),
            resolved_screenshot_id: capture.screenshot_id.clone(),
            resolved_screenshot_time: capture.screenshot_timestamp.clone(),
            metadata,
        };

        match store.update_resolution(owner_id, &item.content, patch) {
            Ok(0) => record(
                events,
                "resolution_noop",
                json!({
                    "content": item.content,
                    "reason": "row disappeared or was already resolved",
                }),
            ),
            Ok(affected) => {
                affected_total += affected;
                applied.push(item.clone());
            }
            Err(err) => record(
                events,
                "row_update_failed",
                json!({
                    "content": item.content,
                    "error": err.to_string(),
                }),
            ),
        }
    }

    (affected_total, applied)
}

/// Serialized snapshot of what extraction saw, stored alongside the row.
fn extraction_snapshot(candidate: &PromiseCandidate, capture: &CaptureRef) -> Value {
    json!({
        "raw_content": candidate.content,
        "to_whom": candidate.to_whom,
        "deadline": candidate.deadline,
        "platform": candidate.platform,
        "action": candidate.action,
        "reasoning": candidate.reasoning,
        "potential_actions": candidate.potential_actions,
        "screenshot_id": capture.screenshot_id,
        "screenshot_timestamp": capture.screenshot_timestamp,
    })
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}
