use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::service::{LiveScoreQuery, ScoreService};

/// Response header reporting how the cache served the request.
pub const CACHE_HEADER: &str = "x-cache";

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ScoreService>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/health", get(health))
        .route("/live-scores", get(live_scores))
        .route("/api/live-scores", get(live_scores))
        .fallback(not_found)
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// Router over an already-built service.
pub fn router(service: Arc<ScoreService>) -> Router {
    create_router(AppState { service })
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn live_scores(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let query = match LiveScoreQuery::from_params(&params) {
        Ok(q) => q,
        Err(e) => {
            return (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() })))
                .into_response();
        }
    };

    let (snapshot, cache) = state.service.live_scores(&query).await;
    tracing::info!(
        target: "api",
        cache = cache.as_str(),
        count = snapshot.count,
        generated_at = %snapshot.generated_at,
        "live-scores served"
    );
    ([(CACHE_HEADER, cache.as_str())], Json(snapshot.as_ref())).into_response()
}

async fn not_found() -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "not found" })))
}
