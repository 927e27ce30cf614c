pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::extraction::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Extraction API
        .route("/api/v1/options", get(handlers::handle_options))
        .route("/api/v1/extract", post(handlers::handle_extract))
        .route("/api/v1/results/:model", get(handlers::handle_results))
        .with_state(state)
}
