use std::time::Duration;

use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Value};

use pact_contracts::error::PipelineError;
use pact_contracts::promise::{CommitmentRow, NewCommitment, ResolutionPatch};
use pact_contracts::store::CommitmentStore;

use crate::response_json_or_error;

const TABLE: &str = "commitments";

/// Commitment store backed by a PostgREST-style row API. Owner scoping is
/// a query filter on every call; `Prefer: return=representation` makes the
/// service echo touched rows so affected counts are real, not assumed.
pub struct RestStore {
    base_url: String,
    api_key: Option<String>,
    http: HttpClient,
}

impl RestStore {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, PipelineError> {
        let http = HttpClient::builder().timeout(timeout).build().map_err(|err| {
            PipelineError::StoreUnavailable(format!("http client build failed: {err}"))
        })?;
        Ok(Self {
            base_url: base_url.into(),
            api_key,
            http,
        })
    }

    fn table_url(&self) -> String {
        format!("{}/{TABLE}", self.base_url.trim_end_matches('/'))
    }

    fn authorize(
        &self,
        request: reqwest::blocking::RequestBuilder,
    ) -> reqwest::blocking::RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("apikey", key).bearer_auth(key),
            None => request,
        }
    }
}

impl CommitmentStore for RestStore {
    fn fetch_open(&self, owner_id: &str) -> Result<Vec<CommitmentRow>, PipelineError> {
        let request = self.authorize(self.http.get(self.table_url()).query(&[
            ("owner_id", format!("eq.{owner_id}")),
            ("resolved", "eq.false".to_string()),
        ]));
        let response = request.send().map_err(|err| {
            PipelineError::StoreUnavailable(format!("fetch request failed: {err}"))
        })?;
        let payload = response_json_or_error("store", response)
            .map_err(|err| PipelineError::StoreUnavailable(format!("{err:#}")))?;
        parse_rows(payload)
    }

    fn insert(&self, owner_id: &str, row: NewCommitment) -> Result<CommitmentRow, PipelineError> {
        let body = insert_body(owner_id, &row)
            .map_err(|err| PipelineError::StoreUnavailable(format!("{err:#}")))?;
        let request = self.authorize(
            self.http
                .post(self.table_url())
                .header("Prefer", "return=representation")
                .json(&body),
        );
        let response = request.send().map_err(|err| {
            PipelineError::StoreUnavailable(format!("insert request failed: {err}"))
        })?;
        let payload = response_json_or_error("store", response)
            .map_err(|err| PipelineError::StoreUnavailable(format!("{err:#}")))?;
        let mut rows = parse_rows(payload)?;
        rows.pop().ok_or_else(|| {
            PipelineError::StoreUnavailable("insert returned no representation".to_string())
        })
    }

    fn update_resolution(
        &self,
        owner_id: &str,
        content: &str,
        patch: ResolutionPatch,
    ) -> Result<u64, PipelineError> {
        let body = patch_body(&patch)
            .map_err(|err| PipelineError::StoreUnavailable(format!("{err:#}")))?;
        let request = self.authorize(
            self.http
                .patch(self.table_url())
                .query(&[
                    ("owner_id", format!("eq.{owner_id}")),
                    ("content", format!("eq.{content}")),
                    ("resolved", "eq.false".to_string()),
                ])
                .header("Prefer", "return=representation")
                .json(&body),
        );
        let response = request.send().map_err(|err| {
            PipelineError::StoreUnavailable(format!("update request failed: {err}"))
        })?;
        let payload = response_json_or_error("store", response)
            .map_err(|err| PipelineError::StoreUnavailable(format!("{err:#}")))?;
        let rows = payload.as_array().ok_or_else(|| {
            PipelineError::StoreUnavailable("update returned a non-array payload".to_string())
        })?;
        Ok(rows.len() as u64)
    }
}

fn insert_body(owner_id: &str, row: &NewCommitment) -> anyhow::Result<Value> {
    let mut body = serde_json::to_value(row)?;
    let object = body
        .as_object_mut()
        .ok_or_else(|| anyhow::anyhow!("insert body is not an object"))?;
    object.insert("owner_id".to_string(), Value::String(owner_id.to_string()));
    object.insert("resolved".to_string(), Value::Bool(false));
    Ok(body)
}

fn patch_body(patch: &ResolutionPatch) -> anyhow::Result<Value> {
    Ok(json!({
        "resolved": true,
        "resolved_reason": patch.resolved_reason,
        "resolved_at": patch.resolved_at,
        "resolved_screenshot_id": patch.resolved_screenshot_id,
        "resolved_screenshot_time": patch.resolved_screenshot_time,
        "metadata": patch.metadata,
    }))
}

fn parse_rows(payload: Value) -> Result<Vec<CommitmentRow>, PipelineError> {
    serde_json::from_value(payload).map_err(|err| {
        PipelineError::StoreUnavailable(format!("store returned unexpected rows: {err}"))
    })
}
