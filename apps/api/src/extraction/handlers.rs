//! Axum route handlers for the Extraction API.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::AppError;
use crate::extraction::models::{ExtractionTag, ModelKind, RoleKind};
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ExtractRequest {
    pub model: String,
    pub role: String,
    pub jd_text: String,
}

#[derive(Debug, Serialize)]
pub struct ExtractResponse {
    pub result: Map<String, Value>,
    pub info: Option<ExtractionTag>,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct OptionsResponse {
    pub models: Vec<&'static str>,
    pub roles: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct ResultsResponse {
    pub model: &'static str,
    pub count: usize,
    pub results: Vec<Value>,
}

/// Human-readable text for a classification tag.
pub fn message_for(info: Option<ExtractionTag>) -> &'static str {
    match info {
        None => "Extraction succeeded.",
        Some(ExtractionTag::Flagged) => "The input is not appropriate!",
        Some(ExtractionTag::NotJob) => "The input is not a job description.",
        Some(ExtractionTag::NotJson) => "Something went wrong with the LLM output.",
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// GET /api/v1/options
///
/// The model and role names the extract endpoint accepts.
pub async fn handle_options() -> Json<OptionsResponse> {
    Json(OptionsResponse {
        models: ModelKind::ALL.iter().map(|m| m.display_name()).collect(),
        roles: RoleKind::ALL.iter().map(|r| r.display_name()).collect(),
    })
}

/// POST /api/v1/extract
///
/// Runs the full pipeline on one job description. Flagged, non-job and
/// malformed outcomes are 200 responses with `info` set.
pub async fn handle_extract(
    State(state): State<AppState>,
    Json(request): Json<ExtractRequest>,
) -> Result<Json<ExtractResponse>, AppError> {
    let outcome = state
        .pipeline
        .run_named(&request.model, &request.role, &request.jd_text)
        .await?
        .into_outcome();

    Ok(Json(ExtractResponse {
        message: message_for(outcome.info),
        result: outcome.result,
        info: outcome.info,
    }))
}

/// GET /api/v1/results/:model
///
/// Every successful extraction accumulated for a model tier.
pub async fn handle_results(
    State(state): State<AppState>,
    Path(model): Path<String>,
) -> Result<Json<ResultsResponse>, AppError> {
    let model: ModelKind = model.parse()?;
    let storage = state
        .pipeline
        .storage()
        .ok_or_else(|| AppError::NotFound("Result persistence is disabled".to_string()))?;

    let results = storage.load_results(model).await?;

    Ok(Json(ResultsResponse {
        model: model.display_name(),
        count: results.len(),
        results,
    }))
}
