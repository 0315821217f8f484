pub mod error;
pub mod events;
pub mod image;
pub mod promise;
pub mod store;

pub use error::PipelineError;
pub use events::{EventPayload, EventWriter};
pub use image::NormalizedImage;
pub use store::CommitmentStore;
