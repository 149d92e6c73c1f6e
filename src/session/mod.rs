//! Assistant session management
//!
//! This module provides the `AssistantSession` abstraction that manages:
//! - Audio capture and per-service batching
//! - Routing batches to the KWS or ASR channel by session mode
//! - Mode transitions driven by detection and transcript events
//! - Command matching for finalized transcripts
//! - Session statistics

mod config;
mod machine;
mod session;
mod stats;

pub use config::{AsrSettings, KwsSettings, NluSettings, SessionConfig};
pub use machine::{Action, SessionMachine, SessionMode};
pub use session::AssistantSession;
pub use stats::{ChannelStats, MatchRecord, SessionStats};
