// Mock recognition services shared by the integration tests
//
// Each mock binds an ephemeral local port and records what it receives so
// tests can assert on the wire traffic.

#![allow(dead_code)]

use anyhow::Result;
use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use futures::{SinkExt, StreamExt};
use serde_json::json;
use speech_assistant::channel::messages::{AsrInitMessage, KwsInitMessage, KwsListenMessage};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, accept_hdr_async};

/// How the mock KWS service behaves
#[derive(Debug, Clone, Default)]
pub struct KwsBehavior {
    /// Connections closed right after the init ack
    pub drop_connections: usize,
    /// Phrase reported once, after the first listen batch
    pub detect: Option<String>,
    /// Raw text frames sent just before the detection
    pub noise: Vec<String>,
}

pub struct MockKws {
    pub url: String,
    pub connections: Arc<AtomicUsize>,
    pub inits: mpsc::UnboundedReceiver<KwsInitMessage>,
    pub listens: mpsc::UnboundedReceiver<KwsListenMessage>,
}

pub async fn spawn_kws(behavior: KwsBehavior) -> Result<MockKws> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let url = format!("ws://{}", listener.local_addr()?);

    let connections = Arc::new(AtomicUsize::new(0));
    let detected = Arc::new(AtomicBool::new(false));
    let (init_tx, inits) = mpsc::unbounded_channel();
    let (listen_tx, listens) = mpsc::unbounded_channel();

    let counter = Arc::clone(&connections);
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let index = counter.fetch_add(1, Ordering::SeqCst);
            let behavior = behavior.clone();
            let detected = Arc::clone(&detected);
            let init_tx = init_tx.clone();
            let listen_tx = listen_tx.clone();

            tokio::spawn(async move {
                let Ok(mut ws) = accept_async(stream).await else {
                    return;
                };

                let Some(Ok(Message::Text(text))) = ws.next().await else {
                    return;
                };
                if let Ok(init) = serde_json::from_str::<KwsInitMessage>(&text) {
                    let _ = init_tx.send(init);
                }
                let ack = json!({"code": 0, "message": "init success"}).to_string();
                if ws.send(Message::Text(ack)).await.is_err() {
                    return;
                }

                if index < behavior.drop_connections {
                    let _ = ws.close(None).await;
                    return;
                }

                while let Some(Ok(message)) = ws.next().await {
                    let Message::Text(text) = message else {
                        continue;
                    };
                    let Ok(listen) = serde_json::from_str::<KwsListenMessage>(&text) else {
                        continue;
                    };
                    let _ = listen_tx.send(listen);

                    if let Some(phrase) = &behavior.detect {
                        if !detected.swap(true, Ordering::SeqCst) {
                            for frame in &behavior.noise {
                                let _ = ws.send(Message::Text(frame.clone())).await;
                            }
                            let reply = json!({"code": 0, "message": phrase}).to_string();
                            let _ = ws.send(Message::Text(reply)).await;
                        }
                    }
                }
            });
        }
    });

    Ok(MockKws {
        url,
        connections,
        inits,
        listens,
    })
}

pub struct MockAsr {
    pub url: String,
    pub inits: mpsc::UnboundedReceiver<AsrInitMessage>,
    /// Byte length of each binary audio message
    pub batches: mpsc::UnboundedReceiver<usize>,
}

/// Mock ASR service: echoes the `binary` subprotocol and replays `script`
/// once, after the first audio batch
pub async fn spawn_asr(script: Vec<serde_json::Value>) -> Result<MockAsr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let url = format!("ws://{}", listener.local_addr()?);

    let replayed = Arc::new(AtomicBool::new(false));
    let script = Arc::new(script);
    let (init_tx, inits) = mpsc::unbounded_channel();
    let (batch_tx, batches) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let replayed = Arc::clone(&replayed);
            let script = Arc::clone(&script);
            let init_tx = init_tx.clone();
            let batch_tx = batch_tx.clone();

            tokio::spawn(async move {
                let callback = |_request: &Request, mut response: Response| -> Result<Response, ErrorResponse> {
                    response
                        .headers_mut()
                        .insert("Sec-WebSocket-Protocol", HeaderValue::from_static("binary"));
                    Ok(response)
                };
                let Ok(mut ws) = accept_hdr_async(stream, callback).await else {
                    return;
                };

                while let Some(Ok(message)) = ws.next().await {
                    match message {
                        Message::Text(text) => {
                            if let Ok(init) = serde_json::from_str::<AsrInitMessage>(&text) {
                                let _ = init_tx.send(init);
                            }
                        }
                        Message::Binary(data) => {
                            let _ = batch_tx.send(data.len());
                            if !replayed.swap(true, Ordering::SeqCst) {
                                for reply in script.iter() {
                                    let _ = ws.send(Message::Text(reply.to_string())).await;
                                }
                            }
                        }
                        _ => {}
                    }
                }
            });
        }
    });

    Ok(MockAsr {
        url,
        inits,
        batches,
    })
}

#[derive(Clone)]
struct NluState {
    uploads: Arc<Mutex<Vec<Vec<String>>>>,
    queries: Arc<Mutex<Vec<String>>>,
    match_status: StatusCode,
}

pub struct MockNlu {
    pub url: String,
    pub uploads: Arc<Mutex<Vec<Vec<String>>>>,
    pub queries: Arc<Mutex<Vec<String>>>,
}

/// Mock NLU service: accepts uploads and answers every match with the query
/// itself as the best match, or with `match_status` if it is an error
pub async fn spawn_nlu(match_status: StatusCode) -> Result<MockNlu> {
    let state = NluState {
        uploads: Arc::new(Mutex::new(Vec::new())),
        queries: Arc::new(Mutex::new(Vec::new())),
        match_status,
    };

    let router = Router::new()
        .route("/upload_words", post(upload_words))
        .route("/match_sentence", post(match_sentence))
        .with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let url = format!("http://{}", listener.local_addr()?);
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });

    Ok(MockNlu {
        url,
        uploads: state.uploads,
        queries: state.queries,
    })
}

async fn upload_words(
    State(state): State<NluState>,
    Json(body): Json<serde_json::Value>,
) -> Json<serde_json::Value> {
    let sentences = body["sentences_to_compare"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|s| s.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    state.uploads.lock().unwrap().push(sentences);
    Json(json!({"status": "ok"}))
}

async fn match_sentence(
    State(state): State<NluState>,
    Json(body): Json<serde_json::Value>,
) -> (StatusCode, Json<serde_json::Value>) {
    let sentence = body["source_sentence"].as_str().unwrap_or_default().to_string();
    state.queries.lock().unwrap().push(sentence.clone());

    if !state.match_status.is_success() {
        return (state.match_status, Json(json!({"error": "model unavailable"})));
    }
    (
        StatusCode::OK,
        Json(json!({"best_match": sentence, "score": 0.97})),
    )
}

/// An address nothing listens on
pub async fn unused_addr() -> Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?.to_string();
    drop(listener);
    Ok(addr)
}
