pub mod backend;
pub mod batch;
pub mod file;

#[cfg(feature = "microphone")]
pub mod microphone;

pub use backend::{
    AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFrame, AudioSource, FrameAssembler,
    FRAME_SIZE, SAMPLE_RATE,
};
pub use batch::{AudioBatch, BatchWindow, ChunkBatcher};
pub use file::{AudioFile, FileBackend};

#[cfg(feature = "microphone")]
pub use microphone::MicrophoneBackend;
