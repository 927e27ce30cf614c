// Job-description extraction.
// Implements: moderation gate, role prompts, completion, output classification,
// cost accounting and optional persistence of successful extractions.
// All provider calls go through llm_client; nothing here builds HTTP requests.

use thiserror::Error;

use crate::llm_client::LlmError;
use crate::storage::StorageError;

pub mod completion;
pub mod cost;
pub mod handlers;
pub mod models;
pub mod moderation;
pub mod pipeline;
pub mod prompts;
pub mod validation;

/// Failures the pipeline does not recover from. Classification outcomes
/// (flagged, not a job, malformed) are values, never errors.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("job description text is empty")]
    EmptyInput,

    #[error("provider call failed: {0}")]
    Provider(#[from] LlmError),

    #[error("persisting extraction failed: {0}")]
    Storage(#[from] StorageError),
}
