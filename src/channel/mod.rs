//! Persistent duplex sessions with the recognition services
//!
//! Each channel follows the same lifecycle:
//! - Handshake: connect, send the init message, wait for the ack if the service sends one
//! - Streaming: audio batches are written in FIFO order
//! - Reception: inbound messages are decoded into events, independently of sending
//!
//! `ChannelProtocol` captures what differs between KWS and ASR; the connection
//! supervisor in `connection` is shared.

mod asr;
mod connection;
mod kws;
pub mod messages;

use anyhow::Result;
use std::fmt;
use tokio_tungstenite::tungstenite::Message;

use crate::audio::AudioBatch;

pub use asr::AsrProtocol;
pub use connection::{spawn_channel, ChannelHandle, Endpoint, ReconnectPolicy};
pub use kws::KwsProtocol;
pub use messages::{AsrEvent, AsrPhase, KwsEvent, KwsStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Kws,
    Asr,
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelKind::Kws => write!(f, "kws"),
            ChannelKind::Asr => write!(f, "asr"),
        }
    }
}

/// Connection state reported by a channel supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Handshake completed, audio is flowing
    Up,
    /// Connection lost, reconnecting
    Down,
    /// Connection lost and reconnecting is disabled
    Failed,
}

/// Everything a channel reports to the session
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Link(ChannelKind, LinkState),
    Kws(KwsEvent),
    Asr(AsrEvent),
}

/// Wire-level behavior of one recognition service
pub trait ChannelProtocol: Send + Sync + 'static {
    fn kind(&self) -> ChannelKind;

    /// One-time init message carrying the recognition configuration
    fn init_message(&self) -> Result<Message>;

    /// Whether the service answers the init message before accepting audio
    fn awaits_ack(&self) -> bool;

    /// Validate the init acknowledgment
    fn check_ack(&self, _payload: &str) -> Result<()> {
        Ok(())
    }

    /// Serialize one audio batch for transmission
    fn encode_batch(&self, batch: &AudioBatch) -> Result<Message>;

    /// Decode one inbound text message
    fn decode(&self, payload: &str) -> Result<ChannelEvent>;
}
