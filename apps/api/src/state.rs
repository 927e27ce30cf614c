use std::sync::Arc;

use crate::extraction::pipeline::ExtractionPipeline;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Owns the provider seams and, unless running in deployed mode, the storage sink.
    pub pipeline: Arc<ExtractionPipeline>,
}
