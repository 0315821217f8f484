use crate::error::PipelineError;
use crate::promise::{CommitmentRow, NewCommitment, ResolutionPatch};

/// Owner-scoped access to the durable commitment store. Every call names
/// its owner explicitly; no method exists to read or write across owners.
pub trait CommitmentStore: Send + Sync {
    /// All unresolved rows for the owner, a point-in-time snapshot.
    fn fetch_open(&self, owner_id: &str) -> Result<Vec<CommitmentRow>, PipelineError>;

    /// Insert one accepted candidate as a new row.
    fn insert(&self, owner_id: &str, row: NewCommitment) -> Result<CommitmentRow, PipelineError>;

    /// Mark the unresolved row with exactly this content as resolved.
    /// Returns the number of rows actually affected; 0 is a valid outcome
    /// (no match, or the row was already resolved).
    fn update_resolution(
        &self,
        owner_id: &str,
        content: &str,
        patch: ResolutionPatch,
    ) -> Result<u64, PipelineError>;
}
