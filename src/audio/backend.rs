use anyhow::Result;
use tokio::sync::mpsc;

/// Sample rate every recognition service expects
pub const SAMPLE_RATE: u32 = 16000;

/// Base capture frame: 320 samples = 20ms at 16kHz
pub const FRAME_SIZE: usize = 320;

/// A fixed-size block of mono 16-bit PCM produced by a capture backend
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, mono)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Position of this frame in the capture stream (0-indexed)
    pub sequence: u64,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

impl AudioFrame {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Configuration shared by capture backends
#[derive(Debug, Clone)]
pub struct AudioBackendConfig {
    /// Target sample rate
    pub sample_rate: u32,
    /// Samples per emitted frame
    pub frame_size: usize,
    /// Capacity of the frame channel handed to the consumer
    pub channel_capacity: usize,
}

impl Default for AudioBackendConfig {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            frame_size: FRAME_SIZE,
            channel_capacity: 256, // ~5s of 20ms frames
        }
    }
}

impl AudioBackendConfig {
    /// Duration of one frame in milliseconds
    pub fn frame_duration_ms(&self) -> u64 {
        (self.frame_size as u64 * 1000) / self.sample_rate as u64
    }
}

/// Audio capture backend trait
///
/// Implementations:
/// - Microphone: cpal default input device (feature `microphone`)
/// - File: replay a WAV file or in-memory samples (testing, offline runs)
///
/// Frames are delivered in capture order, each exactly `frame_size` samples long.
/// The channel closes when the source is exhausted or stopped.
#[async_trait::async_trait]
pub trait AudioBackend: Send + Sync {
    /// Start capturing audio
    ///
    /// Returns a channel receiver that will receive audio frames
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>>;

    /// Stop capturing audio
    async fn stop(&mut self) -> Result<()>;

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Audio source type
#[derive(Debug, Clone)]
pub enum AudioSource {
    /// Default input device (requires the `microphone` feature)
    Microphone,
    /// 16kHz mono WAV file, optionally paced in real time
    File { path: String, realtime: bool },
}

/// Audio backend factory
pub struct AudioBackendFactory;

impl AudioBackendFactory {
    /// Create the backend for a source
    pub fn create(source: AudioSource, config: AudioBackendConfig) -> Result<Box<dyn AudioBackend>> {
        match source {
            AudioSource::File { path, realtime } => {
                let backend = super::file::FileBackend::open(&path, config, realtime)?;
                Ok(Box::new(backend))
            }

            AudioSource::Microphone => {
                #[cfg(feature = "microphone")]
                {
                    Ok(Box::new(super::microphone::MicrophoneBackend::new(config)))
                }

                #[cfg(not(feature = "microphone"))]
                {
                    let _ = config;
                    anyhow::bail!(
                        "Built without microphone support; pass --input <file.wav> or enable the `microphone` feature"
                    )
                }
            }
        }
    }
}

/// Re-slices arbitrarily sized capture buffers into exact, sequenced frames
///
/// Samples that do not yet fill a frame stay pending until the next push.
#[derive(Debug)]
pub struct FrameAssembler {
    frame_size: usize,
    sample_rate: u32,
    pending: Vec<i16>,
    next_sequence: u64,
}

impl FrameAssembler {
    pub fn new(frame_size: usize, sample_rate: u32) -> Self {
        Self {
            frame_size,
            sample_rate,
            pending: Vec::with_capacity(frame_size * 2),
            next_sequence: 0,
        }
    }

    /// Append captured samples and return every frame that is now complete
    pub fn push_samples(&mut self, samples: &[i16]) -> Vec<AudioFrame> {
        self.pending.extend_from_slice(samples);

        let ready = self.pending.len() / self.frame_size;
        let mut frames = Vec::with_capacity(ready);

        for chunk in self.pending.chunks_exact(self.frame_size) {
            let sequence = self.next_sequence;
            self.next_sequence += 1;
            frames.push(AudioFrame {
                samples: chunk.to_vec(),
                sample_rate: self.sample_rate,
                sequence,
                timestamp_ms: sequence * self.frame_size as u64 * 1000 / self.sample_rate as u64,
            });
        }

        self.pending.drain(..ready * self.frame_size);
        frames
    }

    /// Samples waiting for the next frame
    pub fn pending_samples(&self) -> usize {
        self.pending.len()
    }
}
