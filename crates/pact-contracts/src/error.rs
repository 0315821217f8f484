/// Failure kinds the pipeline distinguishes at its boundaries.
///
/// Only `InvalidImageInput` and an extraction-call `InferenceUnavailable`
/// abort a whole request; every other occurrence is absorbed by the owning
/// component with its documented fallback.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("invalid image input: {0}")]
    InvalidImageInput(String),
    #[error("inference service unavailable: {0}")]
    InferenceUnavailable(String),
    #[error("commitment store unavailable: {0}")]
    StoreUnavailable(String),
}

impl PipelineError {
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::InvalidImageInput(_) => "invalid_image_input",
            PipelineError::InferenceUnavailable(_) => "inference_unavailable",
            PipelineError::StoreUnavailable(_) => "store_unavailable",
        }
    }
}
