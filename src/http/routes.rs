//! HTTP route definitions

use std::time::Duration;

use axum::{
    extract::{rejection::PathRejection, Path, Query, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::score::{EndOfRoundAwards, ScoreboardEntry};
use crate::game::snapshot::MatchSnapshot;
use crate::game::MatchHandle;
use crate::util::time::uptime_secs;
use crate::ws::handler::ws_handler;
use crate::ws::protocol::{MatchEndReason, MatchPhase};

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let cors = if state.config.allows_any_origin() {
        CorsLayer::new().allow_origin(Any)
    } else {
        let allowed_origins: Vec<header::HeaderValue> = state
            .config
            .client_origins
            .iter()
            .filter_map(|s| s.parse::<header::HeaderValue>().ok())
            .collect();
        CorsLayer::new().allow_origin(allowed_origins)
    }
    .allow_methods([Method::GET, Method::OPTIONS])
    .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .route("/matches", get(list_matches_handler))
        .route("/matches/:id", get(match_handler))
        .route("/matches/:id/scoreboard", get(scoreboard_handler))
        .route("/matches/:id/awards", get(awards_handler))
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(Duration::from_secs(10)))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize, Deserialize)]
struct HealthResponse {
    status: String,
    uptime_secs: u64,
    active_matches: usize,
    active_players: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs: uptime_secs(),
        active_matches: state.match_registry.active_matches(),
        active_players: state.match_registry.total_players(),
    })
}

// ============================================================================
// Match queries
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct MatchSummary {
    match_id: Uuid,
    seed: u64,
    players: usize,
    phase: MatchPhase,
    time_remaining: f32,
    destruction_percent: f32,
    kaiju_health_percent: f32,
    end_reason: MatchEndReason,
}

impl MatchSummary {
    fn from_handle(handle: &MatchHandle) -> Self {
        let snapshot = handle.latest_snapshot();
        Self {
            match_id: handle.id,
            seed: handle.seed,
            players: handle.player_count(),
            phase: snapshot.as_ref().map_or(MatchPhase::None, |s| s.phase),
            time_remaining: snapshot.as_ref().map_or(0.0, |s| s.time_remaining),
            destruction_percent: snapshot.as_ref().map_or(0.0, |s| s.destruction_percent),
            kaiju_health_percent: snapshot.as_ref().map_or(1.0, |s| s.kaiju_health_percent),
            end_reason: snapshot.as_ref().map_or(MatchEndReason::None, |s| s.end_reason),
        }
    }
}

#[derive(Serialize)]
struct MatchDetail {
    #[serde(flatten)]
    summary: MatchSummary,
    snapshot: Option<MatchSnapshot>,
}

fn find_match(state: &AppState, path: Result<Path<Uuid>, PathRejection>) -> Result<MatchHandle, AppError> {
    let Path(id) = path.map_err(|e| AppError::BadRequest(e.body_text()))?;
    state
        .match_registry
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("Match {} not found", id)))
}

async fn list_matches_handler(State(state): State<AppState>) -> Json<Vec<MatchSummary>> {
    Json(
        state
            .match_registry
            .handles()
            .iter()
            .map(MatchSummary::from_handle)
            .collect(),
    )
}

async fn match_handler(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<MatchDetail>, AppError> {
    let handle = find_match(&state, path)?;
    Ok(Json(MatchDetail {
        summary: MatchSummary::from_handle(&handle),
        snapshot: handle.latest_snapshot(),
    }))
}

#[derive(Debug, Deserialize)]
struct ScoreboardQuery {
    /// 0 means no cutoff
    #[serde(default)]
    max_entries: usize,
    #[serde(default)]
    include_locals: bool,
}

async fn scoreboard_handler(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
    Query(query): Query<ScoreboardQuery>,
) -> Result<Json<Vec<ScoreboardEntry>>, AppError> {
    let handle = find_match(&state, path)?;
    let board = handle
        .latest_snapshot()
        .map(|s| s.scoreboard(query.max_entries, query.include_locals))
        .unwrap_or_default();
    Ok(Json(board))
}

async fn awards_handler(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<EndOfRoundAwards>, AppError> {
    let handle = find_match(&state, path)?;
    handle
        .latest_snapshot()
        .and_then(|s| s.awards)
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Awards are computed when the round ends".to_string()))
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn app_state() -> AppState {
        AppState::new(Config::from_lookup(|_| None).unwrap())
    }

    async fn get_json(router: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = get_json(build_router(app_state()), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["active_matches"], 0);
    }

    #[tokio::test]
    async fn test_unknown_match_is_404() {
        let uri = format!("/matches/{}/scoreboard", Uuid::new_v4());
        let (status, body) = get_json(build_router(app_state()), &uri).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn test_malformed_match_id_is_400() {
        let (status, body) = get_json(build_router(app_state()), "/matches/not-a-uuid").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_listed_match_without_snapshot() {
        let state = app_state();
        let handle = state
            .match_registry
            .spawn_match(state.match_config.clone(), 4, Some(11));
        let router = build_router(state);

        let (status, body) = get_json(router.clone(), "/matches").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["seed"], 11);

        let uri = format!("/matches/{}/awards", handle.id);
        let (status, _) = get_json(router, &uri).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
