use serde_json::json;

use pact_contracts::events::EventWriter;
use pact_contracts::image::NormalizedImage;
use pact_contracts::promise::{CommitmentRow, ResolutionEvidence, ResolutionOutcome};

use crate::intel::PromiseIntel;
use crate::record;

/// Ask the inference boundary whether the screenshot evidences any existing
/// open commitment as fulfilled.
///
/// A failure here aborts only this phase; the save path still runs. An
/// empty existing set skips the call entirely. The engine does not
/// re-verify the model's judgment; locating the row to update happens later
/// in the persistence orchestrator.
pub fn detect_resolutions(
    intel: &dyn PromiseIntel,
    image: &NormalizedImage,
    existing: &[CommitmentRow],
    events: &EventWriter,
) -> Vec<ResolutionEvidence> {
    if existing.is_empty() {
        record(
            events,
            "resolution_skipped",
            json!({ "reason": "no open commitments to check" }),
        );
        return Vec::new();
    }

    match intel.check_resolved(image, existing) {
        Ok(ResolutionOutcome::Resolved { items }) => items,
        Ok(ResolutionOutcome::NoneResolved { reason }) => {
            record(events, "resolution_none", json!({ "reason": reason }));
            Vec::new()
        }
        Err(err) => {
            record(
                events,
                "resolution_skipped",
                json!({ "reason": "resolution check failed", "error": err.to_string() }),
            );
            Vec::new()
        }
    }
}
