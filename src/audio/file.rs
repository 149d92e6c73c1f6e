use anyhow::{bail, Context, Result};
use hound::WavReader;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use super::backend::{AudioBackend, AudioBackendConfig, AudioFrame, FrameAssembler};

pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path)
            .with_context(|| format!("Failed to open WAV file: {}", path.display()))?;

        let spec = reader.spec();
        if spec.bits_per_sample != 16 || spec.sample_format != hound::SampleFormat::Int {
            bail!(
                "Unsupported WAV format in {}: expected 16-bit PCM, got {}-bit {:?}",
                path.display(),
                spec.bits_per_sample,
                spec.sample_format
            );
        }

        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read audio samples")?;

        let duration_seconds =
            samples.len() as f64 / (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }

    /// Samples in the pipeline format, or an error if the file needs resampling
    pub fn into_pipeline_samples(self, sample_rate: u32) -> Result<Vec<i16>> {
        if self.sample_rate == sample_rate && self.channels == 1 {
            Ok(self.samples)
        } else {
            bail!(
                "Expected {}Hz mono audio in {}, got {}Hz {}ch",
                sample_rate,
                self.path,
                self.sample_rate,
                self.channels
            )
        }
    }
}

/// Replays prerecorded samples as a capture stream
///
/// With `realtime` set, frames are paced at the capture frame rate so the
/// downstream services see the same cadence as a live microphone.
pub struct FileBackend {
    name: String,
    config: AudioBackendConfig,
    samples: Arc<Vec<i16>>,
    realtime: bool,
    capturing: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl FileBackend {
    /// Open a 16-bit mono WAV file at the configured sample rate
    pub fn open(path: impl AsRef<Path>, config: AudioBackendConfig, realtime: bool) -> Result<Self> {
        let path = path.as_ref();
        let samples = AudioFile::open(path)?.into_pipeline_samples(config.sample_rate)?;
        Ok(Self::from_samples(
            path.display().to_string(),
            samples,
            config,
            realtime,
        ))
    }

    /// Replay in-memory samples
    pub fn from_samples(
        name: impl Into<String>,
        samples: Vec<i16>,
        config: AudioBackendConfig,
        realtime: bool,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            samples: Arc::new(samples),
            realtime,
            capturing: Arc::new(AtomicBool::new(false)),
            task: None,
        }
    }
}

#[async_trait::async_trait]
impl AudioBackend for FileBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.capturing.load(Ordering::SeqCst) {
            bail!("File backend {} already started", self.name);
        }

        let (tx, rx) = mpsc::channel(self.config.channel_capacity);
        let samples = Arc::clone(&self.samples);
        let capturing = Arc::clone(&self.capturing);
        let config = self.config.clone();
        let realtime = self.realtime;
        let name = self.name.clone();

        capturing.store(true, Ordering::SeqCst);

        let task = tokio::spawn(async move {
            let mut assembler = FrameAssembler::new(config.frame_size, config.sample_rate);
            let frames = assembler.push_samples(&samples);
            if assembler.pending_samples() > 0 {
                warn!(
                    "Dropping {} trailing samples from {} (less than one frame)",
                    assembler.pending_samples(),
                    name
                );
            }

            let mut ticker = interval(Duration::from_millis(config.frame_duration_ms().max(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            for frame in frames {
                if !capturing.load(Ordering::SeqCst) {
                    break;
                }
                if realtime {
                    ticker.tick().await;
                }
                if tx.send(frame).await.is_err() {
                    break;
                }
            }

            capturing.store(false, Ordering::SeqCst);
            info!("File playback finished: {}", name);
        });

        self.task = Some(task);
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        self.capturing.store(false, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
            // Aborted tasks report a cancellation error; nothing to surface
            let _ = task.await;
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
