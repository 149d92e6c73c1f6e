pub mod audio;
pub mod channel;
pub mod config;
pub mod http;
pub mod nlu;
pub mod session;
pub mod vocabulary;

pub use audio::{
    AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioBatch, AudioFile, AudioFrame,
    AudioSource, BatchWindow, ChunkBatcher, FileBackend, FrameAssembler,
};
pub use channel::{AsrEvent, AsrPhase, ChannelEvent, ChannelKind, KwsEvent, KwsStatus, LinkState};
pub use config::Config;
pub use http::{create_router, AppState};
pub use nlu::{MatchResult, NluClient};
pub use session::{AssistantSession, MatchRecord, SessionConfig, SessionMode, SessionStats};
pub use vocabulary::CommandVocabulary;
