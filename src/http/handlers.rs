use super::state::AppState;
use crate::session::{MatchRecord, SessionStats};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};

/// GET /session/status
/// Current session statistics
pub async fn get_session_status(State(state): State<AppState>) -> Json<SessionStats> {
    let stats = state.stats.borrow().clone();
    Json(stats)
}

/// GET /session/matches
/// Most recent command matches, newest last
pub async fn get_recent_matches(State(state): State<AppState>) -> Json<Vec<MatchRecord>> {
    let matches = state.stats.borrow().recent_matches.clone();
    Json(matches)
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
