use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use pact_contracts::error::PipelineError;
use pact_contracts::events::EventWriter;
use pact_contracts::image::NormalizedImage;
use pact_contracts::promise::{
    CaptureRef, ExtractionOutcome, NotificationCard, PromiseAction, ResolutionEvidence,
};
use pact_contracts::store::CommitmentStore;

use crate::intel::PromiseIntel;
use crate::{notify, persist, record, resolution, triage};

/// The image as the caller handed it over: raw bytes from a file upload,
/// or an encoded string (bare base64 or data URL).
#[derive(Debug, Clone)]
pub enum ImageInput {
    Bytes {
        bytes: Vec<u8>,
        content_type: Option<String>,
    },
    Encoded(String),
}

#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub owner_id: String,
    pub image: ImageInput,
    pub screenshot_id: Option<String>,
    pub screenshot_timestamp: Option<String>,
}

/// One saved promise as it appears in the response: semantic fields plus
/// the rendered notification.
#[derive(Debug, Clone, Serialize)]
pub struct SavedPromise {
    pub id: u64,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_whom: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<PromiseAction>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub potential_actions: Vec<Value>,
    pub notification: NotificationCard,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub promises: Vec<SavedPromise>,
    pub resolved_promises: Vec<ResolutionEvidence>,
    pub resolved_count: u64,
}

impl ScanReport {
    fn empty() -> Self {
        Self {
            promises: Vec::new(),
            resolved_promises: Vec::new(),
            resolved_count: 0,
        }
    }
}

/// Runs one pass per screenshot. Dedup decisions and the resolution check
/// consume the same fetched snapshot and both finish before any write.
pub struct Pipeline {
    intel: Arc<dyn PromiseIntel>,
    store: Arc<dyn CommitmentStore>,
    events: EventWriter,
}

impl Pipeline {
    pub fn new(
        intel: Arc<dyn PromiseIntel>,
        store: Arc<dyn CommitmentStore>,
        events: EventWriter,
    ) -> Self {
        Self {
            intel,
            store,
            events,
        }
    }

    pub fn scan(&self, request: ScanRequest) -> Result<ScanReport, PipelineError> {
        let image = match &request.image {
            ImageInput::Bytes {
                bytes,
                content_type,
            } => NormalizedImage::from_bytes(bytes, content_type.as_deref())?,
            ImageInput::Encoded(text) => NormalizedImage::from_string(text)?,
        };
        let capture = capture_ref(&request, &image)?;

        record(
            &self.events,
            "scan_started",
            json!({
                "owner_id": request.owner_id,
                "screenshot_id": capture.screenshot_id,
                "media_type": image.media_type,
                "intel": self.intel.name(),
            }),
        );

        // Extraction failure is the one inference failure that aborts the
        // whole request.
        let candidates = match self.intel.extract_promises(&image, &capture)? {
            ExtractionOutcome::Found { candidates } => {
                record(
                    &self.events,
                    "extraction_completed",
                    json!({ "candidates": candidates.len() }),
                );
                candidates
            }
            ExtractionOutcome::NoneFound { reason } => {
                record(&self.events, "extraction_empty", json!({ "reason": reason }));
                record(
                    &self.events,
                    "scan_completed",
                    json!({ "saved": 0, "rejected": 0, "resolved_count": 0 }),
                );
                return Ok(ScanReport::empty());
            }
        };

        let filtered = triage::filter_candidates(candidates, &self.events);

        // One point-in-time snapshot feeds both branches. A failing fetch
        // degrades to an empty set rather than failing the request.
        let existing = match self.store.fetch_open(&request.owner_id) {
            Ok(rows) => rows,
            Err(err) => {
                record(
                    &self.events,
                    "store_fetch_degraded",
                    json!({ "error": err.to_string() }),
                );
                Vec::new()
            }
        };

        // Dedup decisions and the resolution check are independent of each
        // other; both must finish before anything is written.
        let (triaged, evidence) = std::thread::scope(|scope| {
            let resolution_handle = scope.spawn(|| {
                resolution::detect_resolutions(
                    self.intel.as_ref(),
                    &image,
                    &existing,
                    &self.events,
                )
            });
            let triaged =
                triage::decide_candidates(self.intel.as_ref(), &existing, filtered, &self.events);
            let evidence = resolution_handle.join().unwrap_or_default();
            (triaged, evidence)
        });

        let saved = persist::save_candidates(
            self.store.as_ref(),
            &request.owner_id,
            triaged.to_save,
            &capture,
            &self.events,
        );
        let (resolved_count, resolved_promises) = persist::apply_resolutions(
            self.store.as_ref(),
            &request.owner_id,
            &evidence,
            &existing,
            &capture,
            &self.events,
        );

        let promises: Vec<SavedPromise> = saved
            .into_iter()
            .map(|entry| {
                let notification =
                    notify::format_card(self.intel.as_ref(), &entry.candidate, &self.events);
                SavedPromise {
                    id: entry.row.id,
                    content: entry.candidate.content,
                    to_whom: entry.candidate.to_whom,
                    deadline: entry.candidate.deadline,
                    platform: entry.candidate.platform,
                    action: entry.candidate.action,
                    potential_actions: entry.candidate.potential_actions,
                    notification,
                }
            })
            .collect();

        record(
            &self.events,
            "scan_completed",
            json!({
                "saved": promises.len(),
                "rejected": triaged.rejected.len(),
                "resolved_count": resolved_count,
            }),
        );

        Ok(ScanReport {
            promises,
            resolved_promises,
            resolved_count,
        })
    }
}

/// Screenshot correlation for this request. Identifiers the caller did not
/// supply are derived: the id from a digest of the image bytes, the
/// timestamp from the clock.
fn capture_ref(request: &ScanRequest, image: &NormalizedImage) -> Result<CaptureRef, PipelineError> {
    let screenshot_id = match &request.screenshot_id {
        Some(id) => id.clone(),
        None => {
            let bytes = image.decode_bytes()?;
            let digest = Sha256::digest(&bytes);
            hex::encode(digest)[..32].to_string()
        }
    };
    let screenshot_timestamp = request
        .screenshot_timestamp
        .clone()
        .unwrap_or_else(now_utc_iso);
    Ok(CaptureRef {
        screenshot_id,
        screenshot_timestamp,
    })
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

#[cfg(test)]
mod tests {
    use pact_contracts::promise::{
        Certainty, NewCommitment, ResolutionOutcome, SaveDisposition,
    };

    use crate::store_mem::MemoryStore;
    use crate::testing::{
        candidate, event_types, read_events, ScriptedIntel, UnreachableFetchStore,
    };

    use super::*;

    const IMAGE: &str = "data:image/png;base64,QUJDREVGRw==";

    fn scan_request(owner: &str) -> ScanRequest {
        ScanRequest {
            owner_id: owner.to_string(),
            image: ImageInput::Encoded(IMAGE.to_string()),
            screenshot_id: Some("shot-1".to_string()),
            screenshot_timestamp: Some("2026-08-06T12:00:00+00:00".to_string()),
        }
    }

    fn seed(store: &MemoryStore, owner: &str, content: &str) {
        store
            .insert(
                owner,
                NewCommitment {
                    content: content.to_string(),
                    to_whom: None,
                    deadline: None,
                    platform: None,
                    action: None,
                    extraction_data: Value::Null,
                    metadata: indexmap::IndexMap::new(),
                },
            )
            .unwrap();
    }

    fn pipeline(
        intel: ScriptedIntel,
        store: Arc<MemoryStore>,
        temp: &tempfile::TempDir,
    ) -> (Pipeline, std::path::PathBuf) {
        let events_path = temp.path().join("events.jsonl");
        let events = EventWriter::new(&events_path, "req-1");
        (
            Pipeline::new(Arc::new(intel), store, events),
            events_path,
        )
    }

    #[test]
    fn scenario_a_none_found_yields_empty_report() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = Arc::new(MemoryStore::default());
        let intel = ScriptedIntel {
            extraction: ExtractionOutcome::NoneFound {
                reason: "no conversation visible".to_string(),
            },
            ..ScriptedIntel::default()
        };
        let (pipeline, events_path) = pipeline(intel, store.clone(), &temp);

        let report = pipeline.scan(scan_request("owner-1"))?;
        assert!(report.promises.is_empty());
        assert!(report.resolved_promises.is_empty());
        assert_eq!(report.resolved_count, 0);
        assert!(store.fetch_all("owner-1").is_empty());

        let recorded = read_events(&events_path)?;
        assert_eq!(
            event_types(&recorded),
            vec!["scan_started", "extraction_empty", "scan_completed"]
        );
        assert_eq!(recorded[1]["reason"], "no conversation visible");
        Ok(())
    }

    #[test]
    fn scenario_b_sure_candidate_with_empty_store_is_saved_and_formatted() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = Arc::new(MemoryStore::default());
        let mut c = candidate("Send the report to Alice by Friday", Certainty::CompletelySure);
        c.to_whom = Some("Alice".to_string());
        c.deadline = Some("Friday".to_string());
        c.platform = Some("Slack".to_string());
        let mut intel = ScriptedIntel::extracting(vec![c]);
        intel.dispositions.insert(
            "Send the report to Alice by Friday".to_string(),
            SaveDisposition::DefinitelySave,
        );
        let (pipeline, _) = pipeline(intel, store.clone(), &temp);

        let report = pipeline.scan(scan_request("owner-1"))?;
        assert_eq!(report.promises.len(), 1);
        let saved = &report.promises[0];
        assert_eq!(saved.content, "Send the report to Alice by Friday");
        assert_eq!(
            saved.notification.details,
            "To: Alice • Due: Friday • Via: Slack"
        );

        let rows = store.fetch_open("owner-1")?;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].content, "Send the report to Alice by Friday");
        Ok(())
    }

    #[test]
    fn scenario_c_duplicate_candidate_is_rejected_without_insert() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = Arc::new(MemoryStore::default());
        seed(&store, "owner-1", "Walk the dog tonight");
        let mut intel =
            ScriptedIntel::extracting(vec![candidate("Walk the dog tonight", Certainty::CompletelySure)]);
        intel.dispositions.insert(
            "Walk the dog tonight".to_string(),
            SaveDisposition::DefinitelyNotSave,
        );
        let (pipeline, _) = pipeline(intel, store.clone(), &temp);

        let report = pipeline.scan(scan_request("owner-1"))?;
        assert!(report.promises.is_empty());
        assert_eq!(store.fetch_all("owner-1").len(), 1);
        Ok(())
    }

    #[test]
    fn scenario_d_unmatched_evidence_is_noop_and_request_succeeds() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = Arc::new(MemoryStore::default());
        seed(&store, "owner-1", "Fix the login bug");
        let intel = ScriptedIntel {
            extraction: ExtractionOutcome::Found { candidates: vec![] },
            resolution: ResolutionOutcome::Resolved {
                items: vec![ResolutionEvidence {
                    content: "A promise that was never stored".to_string(),
                    to_whom: None,
                    deadline: None,
                    resolution_reasoning: "looks done".to_string(),
                    resolution_evidence: None,
                }],
            },
            ..ScriptedIntel::default()
        };
        let (pipeline, events_path) = pipeline(intel, store.clone(), &temp);

        let report = pipeline.scan(scan_request("owner-1"))?;
        assert_eq!(report.resolved_count, 0);
        assert!(report.resolved_promises.is_empty());
        assert!(store.fetch_open("owner-1")?[0].is_open());

        let recorded = read_events(&events_path)?;
        assert!(event_types(&recorded).contains(&"resolution_noop".to_string()));
        Ok(())
    }

    #[test]
    fn resolution_applies_to_matching_open_row() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = Arc::new(MemoryStore::default());
        seed(&store, "owner-1", "Send the invoice");
        let intel = ScriptedIntel {
            extraction: ExtractionOutcome::Found { candidates: vec![] },
            resolution: ResolutionOutcome::Resolved {
                items: vec![ResolutionEvidence {
                    content: "Send the invoice".to_string(),
                    to_whom: None,
                    deadline: None,
                    resolution_reasoning: "invoice visible in sent mail".to_string(),
                    resolution_evidence: Some("screenshot of sent folder".to_string()),
                }],
            },
            ..ScriptedIntel::default()
        };
        let (pipeline, _) = pipeline(intel, store.clone(), &temp);

        let report = pipeline.scan(scan_request("owner-1"))?;
        assert_eq!(report.resolved_count, 1);
        assert_eq!(report.resolved_promises.len(), 1);
        assert!(store.fetch_open("owner-1")?.is_empty());

        let all = store.fetch_all("owner-1");
        assert!(all[0].resolved);
        assert_eq!(all[0].resolved_screenshot_id.as_deref(), Some("shot-1"));
        Ok(())
    }

    #[test]
    fn resolution_failure_does_not_stop_the_save_path() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = Arc::new(MemoryStore::default());
        seed(&store, "owner-1", "An old open promise");
        let intel = ScriptedIntel {
            extraction: ExtractionOutcome::Found {
                candidates: vec![candidate("A brand new promise", Certainty::CompletelySure)],
            },
            resolution_fails: true,
            ..ScriptedIntel::default()
        };
        let (pipeline, events_path) = pipeline(intel, store.clone(), &temp);

        let report = pipeline.scan(scan_request("owner-1"))?;
        assert_eq!(report.promises.len(), 1);
        assert_eq!(report.resolved_count, 0);
        assert_eq!(store.fetch_open("owner-1")?.len(), 2);

        let recorded = read_events(&events_path)?;
        assert!(event_types(&recorded).contains(&"resolution_skipped".to_string()));
        Ok(())
    }

    #[test]
    fn degraded_fetch_saves_filtered_candidates_against_empty_set() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = Arc::new(UnreachableFetchStore::default());
        let intel = ScriptedIntel::extracting(vec![candidate(
            "Promise through the outage",
            Certainty::CompletelySure,
        )]);
        let events_path = temp.path().join("events.jsonl");
        let events = EventWriter::new(&events_path, "req-1");
        let pipeline = Pipeline::new(Arc::new(intel), store, events);

        let report = pipeline.scan(scan_request("owner-1"))?;
        assert_eq!(report.promises.len(), 1);

        let recorded = read_events(&events_path)?;
        assert!(event_types(&recorded).contains(&"store_fetch_degraded".to_string()));
        Ok(())
    }

    #[test]
    fn low_certainty_candidates_never_reach_the_dedup_engine() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = Arc::new(MemoryStore::default());
        let intel = ScriptedIntel::extracting(vec![
            candidate("maybe a promise", Certainty::PossiblyAPromise),
            candidate("definitely a promise", Certainty::CompletelySure),
        ]);
        let (pipeline, _) = pipeline(intel, store.clone(), &temp);

        let report = pipeline.scan(scan_request("owner-1"))?;
        assert_eq!(report.promises.len(), 1);
        assert_eq!(report.promises[0].content, "definitely a promise");
        assert_eq!(store.fetch_all("owner-1").len(), 1);
        Ok(())
    }

    #[test]
    fn invalid_image_aborts_before_any_inference_call() {
        let temp = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::default());
        let (pipeline, _) = pipeline(ScriptedIntel::default(), store, &temp);

        let err = pipeline
            .scan(ScanRequest {
                owner_id: "owner-1".to_string(),
                image: ImageInput::Encoded("not base64!!!".to_string()),
                screenshot_id: None,
                screenshot_timestamp: None,
            })
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_image_input");
    }

    #[test]
    fn derived_screenshot_id_is_a_stable_digest_prefix() -> anyhow::Result<()> {
        let request = ScanRequest {
            owner_id: "owner-1".to_string(),
            image: ImageInput::Encoded(IMAGE.to_string()),
            screenshot_id: None,
            screenshot_timestamp: Some("2026-08-06T12:00:00+00:00".to_string()),
        };
        let image = NormalizedImage::from_string(IMAGE)?;
        let first = capture_ref(&request, &image)?;
        let second = capture_ref(&request, &image)?;
        assert_eq!(first.screenshot_id, second.screenshot_id);
        assert_eq!(first.screenshot_id.len(), 32);
        assert!(first.screenshot_id.chars().all(|c| c.is_ascii_hexdigit()));
        Ok(())
    }

    #[test]
    fn report_serializes_with_wire_field_names() -> anyhow::Result<()> {
        let report = ScanReport::empty();
        let value = serde_json::to_value(&report)?;
        assert_eq!(value["promises"], json!([]));
        assert_eq!(value["resolved_promises"], json!([]));
        assert_eq!(value["resolved_count"], json!(0));
        Ok(())
    }
}
