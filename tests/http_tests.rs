// Integration tests for the status API
//
// Requests are driven through the router directly with `tower::ServiceExt`.

use anyhow::Result;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use chrono::Utc;
use speech_assistant::session::{MatchRecord, SessionMode, SessionStats};
use speech_assistant::{create_router, AppState, MatchResult};
use tokio::sync::watch;
use tower::ServiceExt;

async fn get(state: AppState, uri: &str) -> Result<(StatusCode, Vec<u8>)> {
    let response = create_router(state)
        .oneshot(Request::builder().uri(uri).body(Body::empty())?)
        .await?;
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await?;
    Ok((status, body.to_vec()))
}

fn record(text: &str) -> MatchRecord {
    MatchRecord {
        text: text.to_string(),
        assistant: Some("小新小新".to_string()),
        result: MatchResult {
            best_match: text.to_string(),
            score: 0.9,
        },
        matched_at: Utc::now(),
    }
}

#[tokio::test]
async fn test_health_check() -> Result<()> {
    let (_tx, rx) = watch::channel(SessionStats::new("s".to_string(), SessionMode::ListeningForKeyword));

    let (status, body) = get(AppState::new(rx), "/health").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"OK");
    Ok(())
}

#[tokio::test]
async fn test_session_status_reflects_latest_stats() -> Result<()> {
    let (tx, rx) = watch::channel(SessionStats::new(
        "assistant-1".to_string(),
        SessionMode::ListeningForKeyword,
    ));
    let state = AppState::new(rx);

    tx.send_modify(|stats| {
        stats.is_running = true;
        stats.mode = SessionMode::Transcribing;
        stats.assistant = Some("小新小新".to_string());
        stats.transcript = "打开".to_string();
        stats.kws.connected = true;
        stats.frames_captured = 42;
    });

    let (status, body) = get(state, "/session/status").await?;
    assert_eq!(status, StatusCode::OK);

    let json: serde_json::Value = serde_json::from_slice(&body)?;
    assert_eq!(json["session_id"], "assistant-1");
    assert_eq!(json["is_running"], true);
    assert_eq!(json["mode"], "TRANSCRIBING");
    assert_eq!(json["assistant"], "小新小新");
    assert_eq!(json["transcript"], "打开");
    assert_eq!(json["kws"]["connected"], true);
    assert_eq!(json["frames_captured"], 42);
    Ok(())
}

#[tokio::test]
async fn test_recent_matches() -> Result<()> {
    let (tx, rx) = watch::channel(SessionStats::new("s".to_string(), SessionMode::ListeningForKeyword));
    tx.send_modify(|stats| {
        stats.record_match(record("开启wps软件"), 20);
        stats.record_match(record("打开浏览器"), 20);
    });

    let (status, body) = get(AppState::new(rx), "/session/matches").await?;
    assert_eq!(status, StatusCode::OK);

    let matches: Vec<MatchRecord> = serde_json::from_slice(&body)?;
    let texts: Vec<&str> = matches.iter().map(|m| m.text.as_str()).collect();
    assert_eq!(texts, vec!["开启wps软件", "打开浏览器"]);
    assert_eq!(matches[1].result.best_match, "打开浏览器");
    Ok(())
}

#[tokio::test]
async fn test_unknown_route() -> Result<()> {
    let (_tx, rx) = watch::channel(SessionStats::new("s".to_string(), SessionMode::ListeningForKeyword));

    let (status, _) = get(AppState::new(rx), "/session/unknown").await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}
