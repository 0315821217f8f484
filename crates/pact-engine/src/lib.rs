pub mod config;
pub mod intel;
pub mod notify;
pub mod persist;
pub mod pipeline;
pub mod resolution;
pub mod store_mem;
pub mod store_rest;
pub mod triage;

#[cfg(test)]
pub(crate) mod testing;

pub use config::EngineConfig;
pub use intel::{DryrunIntel, ExtractTransport, HttpIntel, PromiseIntel};
pub use pipeline::{ImageInput, Pipeline, SavedPromise, ScanReport, ScanRequest};
pub use store_mem::MemoryStore;
pub use store_rest::RestStore;

use pact_contracts::events::EventWriter;
use reqwest::blocking::Response as HttpResponse;
use serde_json::{Map, Value};

pub(crate) fn response_json_or_error(service: &str, response: HttpResponse) -> anyhow::Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .map_err(|err| anyhow::anyhow!("{service} response body read failed: {err}"))?;
    if !status.is_success() {
        anyhow::bail!(
            "{service} request failed ({code}): {}",
            truncate_text(&body, 512)
        );
    }
    let parsed: Value = serde_json::from_str(&body)
        .map_err(|err| anyhow::anyhow!("{service} returned invalid JSON payload: {err}"))?;
    Ok(parsed)
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

pub(crate) fn map_object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

/// Record an observability event, never letting a failed write disturb the
/// pipeline itself.
pub(crate) fn record(events: &EventWriter, event_type: &str, payload: Value) {
    if let Err(err) = events.emit(event_type, map_object(payload)) {
        eprintln!("[pact] failed to record {event_type}: {err:#}");
    }
}
