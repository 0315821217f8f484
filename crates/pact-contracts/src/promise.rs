use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The inference service's own confidence in a candidate, ordered from
/// least to most certain. The filter threshold compares on this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Certainty {
    NotAPromise,
    PossiblyAPromise,
    ProbablyAPromise,
    CompletelySure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    SystemLaunchApp,
    CalendarAdd,
    NoAction,
}

/// Structured follow-up action attached to a candidate. Opaque to the
/// pipeline: carried through extraction, persistence, and the response
/// without interpretation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromiseAction {
    pub action_type: ActionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whom_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,
}

/// One extracted promise statement, as returned by the inference service.
/// Immutable once extracted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromiseCandidate {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_whom: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    pub certainty: Certainty,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<PromiseAction>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub potential_actions: Vec<Value>,
}

/// Result of the extraction capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExtractionOutcome {
    Found { candidates: Vec<PromiseCandidate> },
    NoneFound { reason: String },
}

/// Per-candidate classification against the owner's existing commitments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveDisposition {
    DefinitelySave,
    PossiblySave,
    DefinitelyNotSave,
}

impl SaveDisposition {
    /// `PossiblySave` folds into save at the orchestration boundary.
    pub fn keeps(self) -> bool {
        !matches!(self, SaveDisposition::DefinitelyNotSave)
    }
}

/// Evidence that an existing open commitment has been fulfilled. Links to
/// a stored row by exact content equality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionEvidence {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_whom: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<String>,
    pub resolution_reasoning: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_evidence: Option<String>,
}

/// Result of the resolution-check capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ResolutionOutcome {
    Resolved { items: Vec<ResolutionEvidence> },
    NoneResolved { reason: String },
}

/// Rendered notification for one saved promise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationCard {
    pub title: String,
    pub body: String,
    pub details: String,
}

/// Correlation identifiers for the screenshot a request originated from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureRef {
    pub screenshot_id: String,
    pub screenshot_timestamp: String,
}

/// A persisted commitment, owner-scoped. Created by the save path, mutated
/// only by the resolve path, never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitmentRow {
    pub id: u64,
    pub owner_id: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_whom: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<PromiseAction>,
    #[serde(default)]
    pub resolved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_screenshot_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_screenshot_time: Option<String>,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extraction_data: Option<Value>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub metadata: IndexMap<String, Value>,
}

impl CommitmentRow {
    pub fn is_open(&self) -> bool {
        !self.resolved
    }
}

/// Insert payload for the save path. The owner is passed alongside, never
/// embedded by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCommitment {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_whom: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<PromiseAction>,
    pub extraction_data: Value,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub metadata: IndexMap<String, Value>,
}

/// Update payload for the resolve path. `metadata` carries the already
/// merged map (snapshot keys preserved, evidence keys added) so a column
/// overwrite on the store side cannot drop prior entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionPatch {
    pub resolved_reason: String,
    pub resolved_at: String,
    pub resolved_screenshot_id: String,
    pub resolved_screenshot_time: String,
    pub metadata: IndexMap<String, Value>,
}
