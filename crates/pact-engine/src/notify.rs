use serde_json::json;

use pact_contracts::events::EventWriter;
use pact_contracts::promise::{NotificationCard, PromiseCandidate};

use crate::intel::PromiseIntel;
use crate::record;

pub const TITLE_MAX_CHARS: usize = 50;
pub const BODY_MAX_CHARS: usize = 150;

/// Render the notification for one saved promise. The inference service
/// gets first shot; any failure falls back to the deterministic local
/// rendering, recorded on the event stream.
pub fn format_card(
    intel: &dyn PromiseIntel,
    candidate: &PromiseCandidate,
    events: &EventWriter,
) -> NotificationCard {
    match intel.format_notification(candidate) {
        Ok(card) => card,
        Err(err) => {
            record(
                events,
                "format_fallback",
                json!({
                    "content": candidate.content,
                    "error": err.to_string(),
                }),
            );
            fallback_card(candidate)
        }
    }
}

/// Deterministic rendering derived from the candidate's own fields. The
/// exact output shape is a contract: tests and downstream notification
/// plumbing depend on it byte for byte.
pub fn fallback_card(candidate: &PromiseCandidate) -> NotificationCard {
    NotificationCard {
        title: clip_chars(&candidate.content, TITLE_MAX_CHARS),
        body: clip_chars(&candidate.content, BODY_MAX_CHARS),
        details: format!(
            "To: {} • Due: {} • Via: {}",
            candidate.to_whom.as_deref().unwrap_or("myself"),
            candidate.deadline.as_deref().unwrap_or("No deadline"),
            candidate.platform.as_deref().unwrap_or("Unknown"),
        ),
    }
}

fn clip_chars(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}
