use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Mutex;

use serde_json::Value;

use pact_contracts::error::PipelineError;
use pact_contracts::image::NormalizedImage;
use pact_contracts::promise::{
    CaptureRef, Certainty, CommitmentRow, ExtractionOutcome, NotificationCard, PromiseCandidate,
    ResolutionOutcome, SaveDisposition,
};

use crate::intel::PromiseIntel;
use crate::notify::fallback_card;

pub(crate) fn candidate(content: &str, certainty: Certainty) -> PromiseCandidate {
    PromiseCandidate {
        content: content.to_string(),
        to_whom: None,
        deadline: None,
        reasoning: None,
        certainty,
        platform: None,
        action: None,
        potential_actions: Vec::new(),
    }
}

pub(crate) fn open_row(owner_id: &str, content: &str) -> CommitmentRow {
    CommitmentRow {
        id: 1,
        owner_id: owner_id.to_string(),
        content: content.to_string(),
        to_whom: None,
        deadline: None,
        platform: None,
        action: None,
        resolved: false,
        resolved_reason: None,
        resolved_at: None,
        resolved_screenshot_id: None,
        resolved_screenshot_time: None,
        created_at: "2026-08-01T00:00:00+00:00".to_string(),
        extraction_data: None,
        metadata: indexmap::IndexMap::new(),
    }
}

pub(crate) fn test_image() -> NormalizedImage {
    NormalizedImage::from_string("data:image/png;base64,QUJD").unwrap()
}

pub(crate) fn test_capture() -> CaptureRef {
    CaptureRef {
        screenshot_id: "shot-1".to_string(),
        screenshot_timestamp: "2026-08-06T12:00:00+00:00".to_string(),
    }
}

pub(crate) fn read_events(path: &Path) -> anyhow::Result<Vec<Value>> {
    let raw = std::fs::read_to_string(path)?;
    raw.lines()
        .map(|line| Ok(serde_json::from_str(line)?))
        .collect()
}

pub(crate) fn event_types(events: &[Value]) -> Vec<String> {
    events
        .iter()
        .map(|event| {
            event["type"]
                .as_str()
                .unwrap_or_default()
                .to_string()
        })
        .collect()
}

/// Fully scripted inference double: canned outcomes, per-content
/// dispositions and failures, and a call log for fan-out assertions.
pub(crate) struct ScriptedIntel {
    pub extraction: ExtractionOutcome,
    pub resolution: ResolutionOutcome,
    pub dispositions: BTreeMap<String, SaveDisposition>,
    pub failing_contents: BTreeSet<String>,
    pub probe_down: bool,
    pub resolution_fails: bool,
    pub format_fails: bool,
    pub should_save_calls: Mutex<Vec<String>>,
}

impl Default for ScriptedIntel {
    fn default() -> Self {
        Self {
            extraction: ExtractionOutcome::NoneFound {
                reason: "scripted default".to_string(),
            },
            resolution: ResolutionOutcome::NoneResolved {
                reason: "scripted default".to_string(),
            },
            dispositions: BTreeMap::new(),
            failing_contents: BTreeSet::new(),
            probe_down: false,
            resolution_fails: false,
            format_fails: false,
            should_save_calls: Mutex::new(Vec::new()),
        }
    }
}

impl ScriptedIntel {
    pub fn extracting(candidates: Vec<PromiseCandidate>) -> Self {
        Self {
            extraction: ExtractionOutcome::Found { candidates },
            ..Self::default()
        }
    }
}

impl PromiseIntel for ScriptedIntel {
    fn name(&self) -> &str {
        "scripted"
    }

    fn extract_promises(
        &self,
        _image: &NormalizedImage,
        _capture: &CaptureRef,
    ) -> Result<ExtractionOutcome, PipelineError> {
        Ok(self.extraction.clone())
    }

    fn should_save(
        &self,
        _existing: &[CommitmentRow],
        candidate: &PromiseCandidate,
    ) -> Result<SaveDisposition, PipelineError> {
        self.should_save_calls
            .lock()
            .expect("call log lock")
            .push(candidate.content.clone());
        if self.failing_contents.contains(&candidate.content) {
            return Err(PipelineError::InferenceUnavailable(
                "scripted per-item failure".to_string(),
            ));
        }
        Ok(self
            .dispositions
            .get(&candidate.content)
            .copied()
            .unwrap_or(SaveDisposition::DefinitelySave))
    }

    fn check_resolved(
        &self,
        _image: &NormalizedImage,
        _existing: &[CommitmentRow],
    ) -> Result<ResolutionOutcome, PipelineError> {
        if self.resolution_fails {
            return Err(PipelineError::InferenceUnavailable(
                "scripted resolution failure".to_string(),
            ));
        }
        Ok(self.resolution.clone())
    }

    fn format_notification(
        &self,
        candidate: &PromiseCandidate,
    ) -> Result<NotificationCard, PipelineError> {
        if self.format_fails {
            return Err(PipelineError::InferenceUnavailable(
                "scripted format failure".to_string(),
            ));
        }
        Ok(fallback_card(candidate))
    }

    fn probe_comparison(&self) -> Result<(), PipelineError> {
        if self.probe_down {
            return Err(PipelineError::InferenceUnavailable(
                "scripted comparison outage".to_string(),
            ));
        }
        Ok(())
    }
}

/// Store double that refuses inserts for specific contents, delegating
/// everything else to an inner `MemoryStore`.
pub(crate) struct FailingInsertStore {
    inner: crate::store_mem::MemoryStore,
    failing_contents: BTreeSet<String>,
}

impl FailingInsertStore {
    pub fn failing_on(content: &str) -> Self {
        let mut failing_contents = BTreeSet::new();
        failing_contents.insert(content.to_string());
        Self {
            inner: crate::store_mem::MemoryStore::default(),
            failing_contents,
        }
    }
}

impl pact_contracts::store::CommitmentStore for FailingInsertStore {
    fn fetch_open(&self, owner_id: &str) -> Result<Vec<CommitmentRow>, PipelineError> {
        self.inner.fetch_open(owner_id)
    }

    fn insert(
        &self,
        owner_id: &str,
        row: pact_contracts::promise::NewCommitment,
    ) -> Result<CommitmentRow, PipelineError> {
        if self.failing_contents.contains(&row.content) {
            return Err(PipelineError::StoreUnavailable(
                "scripted insert failure".to_string(),
            ));
        }
        self.inner.insert(owner_id, row)
    }

    fn update_resolution(
        &self,
        owner_id: &str,
        content: &str,
        patch: pact_contracts::promise::ResolutionPatch,
    ) -> Result<u64, PipelineError> {
        self.inner.update_resolution(owner_id, content, patch)
    }
}

/// Store double that cannot even be reached for the snapshot fetch.
#[derive(Default)]
pub(crate) struct UnreachableFetchStore {
    inner: crate::store_mem::MemoryStore,
}

impl pact_contracts::store::CommitmentStore for UnreachableFetchStore {
    fn fetch_open(&self, _owner_id: &str) -> Result<Vec<CommitmentRow>, PipelineError> {
        Err(PipelineError::StoreUnavailable(
            "scripted fetch outage".to_string(),
        ))
    }

    fn insert(
        &self,
        owner_id: &str,
        row: pact_contracts::promise::NewCommitment,
    ) -> Result<CommitmentRow, PipelineError> {
        self.inner.insert(owner_id, row)
    }

    fn update_resolution(
        &self,
        owner_id: &str,
        content: &str,
        patch: pact_contracts::promise::ResolutionPatch,
    ) -> Result<u64, PipelineError> {
        self.inner.update_resolution(owner_id, content, patch)
    }
}

/// Intel double whose only job is to fail the formatting capability.
pub(crate) struct FailingFormatIntel;

impl PromiseIntel for FailingFormatIntel {
    fn name(&self) -> &str {
        "failing-format"
    }

    fn extract_promises(
        &self,
        _image: &NormalizedImage,
        _capture: &CaptureRef,
    ) -> Result<ExtractionOutcome, PipelineError> {
        Ok(ExtractionOutcome::NoneFound {
            reason: "unused".to_string(),
        })
    }

    fn should_save(
        &self,
        _existing: &[CommitmentRow],
        _candidate: &PromiseCandidate,
    ) -> Result<SaveDisposition, PipelineError> {
        Ok(SaveDisposition::DefinitelySave)
    }

    fn check_resolved(
        &self,
        _image: &NormalizedImage,
        _existing: &[CommitmentRow],
    ) -> Result<ResolutionOutcome, PipelineError> {
        Ok(ResolutionOutcome::NoneResolved {
            reason: "unused".to_string(),
        })
    }

    fn format_notification(
        &self,
        _candidate: &PromiseCandidate,
    ) -> Result<NotificationCard, PipelineError> {
        Err(PipelineError::InferenceUnavailable(
            "format endpoint down".to_string(),
        ))
    }

    fn probe_comparison(&self) -> Result<(), PipelineError> {
        Ok(())
    }
}
