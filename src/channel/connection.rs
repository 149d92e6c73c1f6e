use anyhow::{bail, Context, Result};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async_tls_with_config, Connector, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use super::{ChannelEvent, ChannelKind, ChannelProtocol, LinkState};
use crate::audio::AudioBatch;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Where and how to reach a recognition service
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub url: String,
    /// Value for the `Sec-WebSocket-Protocol` header
    pub subprotocol: Option<String>,
    /// Skip certificate and hostname verification for `wss://` URLs
    pub accept_invalid_certs: bool,
}

impl Endpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            subprotocol: None,
            accept_invalid_certs: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Reconnect after a lost link; otherwise report `LinkState::Failed` and stop
    pub enabled: bool,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Bound on connect and on waiting for the init ack
    pub handshake_timeout: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(5),
        }
    }
}

/// Owner side of a running channel
///
/// Dropping or closing the handle ends the supervisor task.
pub struct ChannelHandle {
    kind: ChannelKind,
    audio_tx: mpsc::Sender<AudioBatch>,
    task: JoinHandle<()>,
}

impl ChannelHandle {
    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    /// Queue a batch without waiting; returns false if it was dropped
    pub fn try_send(&self, batch: AudioBatch) -> bool {
        match self.audio_tx.try_send(batch) {
            Ok(()) => true,
            Err(TrySendError::Full(batch)) => {
                warn!(
                    "{} channel backlog full, dropping batch at frame {}",
                    self.kind, batch.first_sequence
                );
                false
            }
            Err(TrySendError::Closed(_)) => {
                warn!("{} channel is closed, dropping batch", self.kind);
                false
            }
        }
    }

    /// Stop the supervisor, closing the connection
    pub async fn close(self) {
        let ChannelHandle {
            kind,
            audio_tx,
            mut task,
        } = self;
        drop(audio_tx);

        match timeout(CLOSE_TIMEOUT, &mut task).await {
            Ok(Ok(())) => info!("Closed {} channel", kind),
            Ok(Err(e)) => error!("{} channel task failed: {}", kind, e),
            Err(_) => {
                warn!("{} channel did not close within {:?}, aborting", kind, CLOSE_TIMEOUT);
                task.abort();
            }
        }
    }
}

/// Start a supervisor that keeps a channel connected for the life of the handle
pub fn spawn_channel(
    protocol: Arc<dyn ChannelProtocol>,
    endpoint: Endpoint,
    policy: ReconnectPolicy,
    events: mpsc::Sender<ChannelEvent>,
    capacity: usize,
) -> ChannelHandle {
    let kind = protocol.kind();
    let (audio_tx, audio_rx) = mpsc::channel(capacity.max(1));

    let task = tokio::spawn(supervise(protocol, endpoint, policy, audio_rx, events));

    ChannelHandle {
        kind,
        audio_tx,
        task,
    }
}

enum SessionEnd {
    /// The handle was dropped; stop for good
    Closed,
    /// Transport failure; eligible for reconnect
    Lost(String),
}

async fn supervise(
    protocol: Arc<dyn ChannelProtocol>,
    endpoint: Endpoint,
    policy: ReconnectPolicy,
    mut audio_rx: mpsc::Receiver<AudioBatch>,
    events: mpsc::Sender<ChannelEvent>,
) {
    let kind = protocol.kind();
    let mut backoff = policy.initial_backoff;
    let mut was_up = false;

    loop {
        match open_session(protocol.as_ref(), &endpoint, &policy).await {
            Ok(ws) => {
                backoff = policy.initial_backoff;

                // Audio queued while the link was down is stale
                let stale = discard_pending(&mut audio_rx);
                if stale > 0 {
                    debug!("Discarded {} stale {} batches", stale, kind);
                }

                was_up = true;
                if events.send(ChannelEvent::Link(kind, LinkState::Up)).await.is_err() {
                    return;
                }

                match stream_session(protocol.as_ref(), ws, &mut audio_rx, &events).await {
                    SessionEnd::Closed => return,
                    SessionEnd::Lost(reason) => {
                        warn!("Lost {} channel at {}: {}", kind, endpoint.url, reason)
                    }
                }
            }
            Err(e) => warn!(
                "Failed to open {} channel at {}: {:#}",
                kind, endpoint.url, e
            ),
        }

        if !policy.enabled {
            let _ = events.send(ChannelEvent::Link(kind, LinkState::Failed)).await;
            return;
        }

        if was_up {
            was_up = false;
            if events.send(ChannelEvent::Link(kind, LinkState::Down)).await.is_err() {
                return;
            }
        }

        info!("Reconnecting {} channel in {:?}", kind, backoff);
        if !discard_for(&mut audio_rx, backoff).await {
            return;
        }
        backoff = (backoff * 2).min(policy.max_backoff);
    }
}

/// Connect and complete the init handshake
async fn open_session(
    protocol: &dyn ChannelProtocol,
    endpoint: &Endpoint,
    policy: &ReconnectPolicy,
) -> Result<WsStream> {
    let kind = protocol.kind();

    let mut request = endpoint
        .url
        .as_str()
        .into_client_request()
        .with_context(|| format!("Invalid {} URL: {}", kind, endpoint.url))?;

    if let Some(subprotocol) = &endpoint.subprotocol {
        request.headers_mut().insert(
            "Sec-WebSocket-Protocol",
            HeaderValue::from_str(subprotocol).context("Invalid subprotocol")?,
        );
    }

    let connector = if endpoint.accept_invalid_certs && endpoint.url.starts_with("wss://") {
        let tls = native_tls::TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true)
            .build()
            .context("Failed to build TLS connector")?;
        Some(Connector::NativeTls(tls))
    } else {
        None
    };

    let (mut ws, _response) = timeout(
        policy.handshake_timeout,
        connect_async_tls_with_config(request, None, false, connector),
    )
    .await
    .context("Timed out connecting")?
    .context("Failed to connect")?;

    info!("Connected to {} channel at {}", kind, endpoint.url);

    ws.send(protocol.init_message()?)
        .await
        .context("Failed to send init message")?;

    if protocol.awaits_ack() {
        let ack = timeout(policy.handshake_timeout, next_text(&mut ws))
            .await
            .context("Timed out waiting for init acknowledgment")??;
        protocol.check_ack(&ack)?;
    }

    Ok(ws)
}

async fn next_text(ws: &mut WsStream) -> Result<String> {
    while let Some(message) = ws.next().await {
        match message.context("Failed to read from socket")? {
            Message::Text(text) => return Ok(text),
            Message::Close(frame) => bail!("Closed during handshake: {:?}", frame),
            _ => continue,
        }
    }
    bail!("Connection ended during handshake")
}

/// Run the write and read halves concurrently until either ends
async fn stream_session(
    protocol: &dyn ChannelProtocol,
    ws: WsStream,
    audio_rx: &mut mpsc::Receiver<AudioBatch>,
    events: &mpsc::Sender<ChannelEvent>,
) -> SessionEnd {
    let kind = protocol.kind();
    let (mut sink, mut stream) = ws.split();

    let writer = async {
        while let Some(batch) = audio_rx.recv().await {
            let message = match protocol.encode_batch(&batch) {
                Ok(message) => message,
                Err(e) => {
                    error!("Failed to encode {} batch: {:#}", kind, e);
                    continue;
                }
            };
            if let Err(e) = sink.send(message).await {
                return SessionEnd::Lost(format!("send failed: {}", e));
            }
        }

        if let Err(e) = sink.close().await {
            debug!("Error closing {} channel: {}", kind, e);
        }
        SessionEnd::Closed
    };

    let reader = async {
        while let Some(message) = stream.next().await {
            match message {
                Ok(Message::Text(text)) => match protocol.decode(&text) {
                    Ok(event) => {
                        if events.send(event).await.is_err() {
                            return SessionEnd::Closed;
                        }
                    }
                    Err(e) => warn!("Dropping {} message: {:#}", kind, e),
                },
                Ok(Message::Binary(data)) => {
                    warn!("Ignoring {}-byte binary message on {} channel", data.len(), kind)
                }
                Ok(Message::Close(frame)) => {
                    return SessionEnd::Lost(format!("closed by peer ({:?})", frame))
                }
                Ok(_) => {}
                Err(e) => return SessionEnd::Lost(e.to_string()),
            }
        }
        SessionEnd::Lost("stream ended".to_string())
    };

    tokio::select! {
        end = writer => end,
        end = reader => end,
    }
}

fn discard_pending(audio_rx: &mut mpsc::Receiver<AudioBatch>) -> usize {
    let mut discarded = 0;
    while audio_rx.try_recv().is_ok() {
        discarded += 1;
    }
    discarded
}

/// Drop batches for `duration`; returns false once the handle is gone
async fn discard_for(audio_rx: &mut mpsc::Receiver<AudioBatch>, duration: Duration) -> bool {
    let deadline = sleep(duration);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => return true,
            batch = audio_rx.recv() => {
                if batch.is_none() {
                    return false;
                }
            }
        }
    }
}
