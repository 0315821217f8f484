use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::{SecondsFormat, Utc};

use pact_contracts::error::PipelineError;
use pact_contracts::promise::{CommitmentRow, NewCommitment, ResolutionPatch};
use pact_contracts::store::CommitmentStore;

/// In-memory commitment store: one row list per owner behind a mutex.
/// Backs the test suites and the CLI's offline mode.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    next_id: u64,
    rows: BTreeMap<String, Vec<CommitmentRow>>,
}

impl MemoryStore {
    /// Every row for an owner, resolved ones included. Test and inspection
    /// helper; the pipeline itself only sees `fetch_open`.
    pub fn fetch_all(&self, owner_id: &str) -> Vec<CommitmentRow> {
        self.inner
            .lock()
            .map(|inner| inner.rows.get(owner_id).cloned().unwrap_or_default())
            .unwrap_or_default()
    }
}

impl CommitmentStore for MemoryStore {
    fn fetch_open(&self, owner_id: &str) -> Result<Vec<CommitmentRow>, PipelineError> {
        let inner = lock(&self.inner)?;
        Ok(inner
            .rows
            .get(owner_id)
            .map(|rows| rows.iter().filter(|row| row.is_open()).cloned().collect())
            .unwrap_or_default())
    }

    fn insert(&self, owner_id: &str, row: NewCommitment) -> Result<CommitmentRow, PipelineError> {
        let mut inner = lock(&self.inner)?;
        inner.next_id += 1;
        let stored = CommitmentRow {
            id: inner.next_id,
            owner_id: owner_id.to_string(),
            content: row.content,
            to_whom: row.to_whom,
            deadline: row.deadline,
            platform: row.platform,
            action: row.action,
            resolved: false,
            resolved_reason: None,
            resolved_at: None,
            resolved_screenshot_id: None,
            resolved_screenshot_time: None,
            created_at: now_utc_iso(),
            extraction_data: Some(row.extraction_data),
            metadata: row.metadata,
        };
        inner
            .rows
            .entry(owner_id.to_string())
            .or_default()
            .push(stored.clone());
        Ok(stored)
    }

    fn update_resolution(
        &self,
        owner_id: &str,
        content: &str,
        patch: ResolutionPatch,
    ) -> Result<u64, PipelineError> {
        let mut inner = lock(&self.inner)?;
        let Some(rows) = inner.rows.get_mut(owner_id) else {
            return Ok(0);
        };
        let mut affected = 0u64;
        for row in rows.iter_mut() {
            if !row.is_open() || row.content != content {
                continue;
            }
            row.resolved = true;
            row.resolved_reason = Some(patch.resolved_reason.clone());
            row.resolved_at = Some(patch.resolved_at.clone());
            row.resolved_screenshot_id = Some(patch.resolved_screenshot_id.clone());
            row.resolved_screenshot_time = Some(patch.resolved_screenshot_time.clone());
            for (key, value) in &patch.metadata {
                row.metadata.insert(key.clone(), value.clone());
            }
            affected += 1;
        }
        Ok(affected)
    }
}

fn lock(inner: &Mutex<MemoryInner>) -> Result<std::sync::MutexGuard<'_, MemoryInner>, PipelineError> {
    inner
        .lock()
        .map_err(|_| PipelineError::StoreUnavailable("memory store lock poisoned".to_string()))
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}
