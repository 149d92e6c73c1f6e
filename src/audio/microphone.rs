//! Live capture from the default input device
//!
//! The cpal stream is not `Send` on every platform, so it is created, played
//! and dropped on a dedicated thread. Raw buffers cross into tokio through a
//! bounded channel and are re-sliced into fixed frames there.

use anyhow::{anyhow, bail, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, StreamConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc as std_mpsc, Arc};
use std::thread::JoinHandle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use super::backend::{AudioBackend, AudioBackendConfig, AudioFrame, FrameAssembler};

pub struct MicrophoneBackend {
    config: AudioBackendConfig,
    capturing: Arc<AtomicBool>,
    stop_tx: Option<std_mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl MicrophoneBackend {
    pub fn new(config: AudioBackendConfig) -> Self {
        Self {
            config,
            capturing: Arc::new(AtomicBool::new(false)),
            stop_tx: None,
            thread: None,
        }
    }
}

fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

/// Open the default device and keep its stream alive until `stop_rx` fires
fn run_stream(
    sample_rate: u32,
    raw_tx: mpsc::Sender<Vec<i16>>,
    ready_tx: oneshot::Sender<Result<String>>,
    stop_rx: std_mpsc::Receiver<()>,
) {
    let opened = (|| -> Result<(cpal::Stream, String)> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| anyhow!("No input device available"))?;
        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());

        let supported = device
            .supported_input_configs()
            .context("Failed to query input configs")?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(sample_rate)
                    && c.max_sample_rate() >= SampleRate(sample_rate)
                    && matches!(c.sample_format(), SampleFormat::I16 | SampleFormat::F32)
            })
            .ok_or_else(|| anyhow!("{} has no mono {}Hz input config", device_name, sample_rate))?
            .with_sample_rate(SampleRate(sample_rate));

        let format = supported.sample_format();
        let config: StreamConfig = supported.config();
        let on_error = |err: cpal::StreamError| error!("Audio capture error: {}", err);

        let stream = match format {
            SampleFormat::I16 => {
                let tx = raw_tx.clone();
                device.build_input_stream(
                    &config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        if tx.try_send(data.to_vec()).is_err() {
                            warn!("Capture buffer full, dropping {} samples", data.len());
                        }
                    },
                    on_error,
                    None,
                )
            }
            _ => {
                let tx = raw_tx.clone();
                device.build_input_stream(
                    &config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        let samples: Vec<i16> = data.iter().map(|&s| to_i16(s)).collect();
                        if tx.try_send(samples).is_err() {
                            warn!("Capture buffer full, dropping {} samples", data.len());
                        }
                    },
                    on_error,
                    None,
                )
            }
        }
        .context("Failed to build input stream")?;

        stream.play().context("Failed to start input stream")?;
        Ok((stream, device_name))
    })();

    match opened {
        Ok((stream, device_name)) => {
            let _ = ready_tx.send(Ok(device_name));
            // Blocks until stop() or the backend is dropped
            let _ = stop_rx.recv();
            drop(stream);
            debug!("Microphone stream closed");
        }
        Err(e) => {
            let _ = ready_tx.send(Err(e));
        }
    }
}

#[async_trait::async_trait]
impl AudioBackend for MicrophoneBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.capturing.load(Ordering::SeqCst) {
            bail!("Microphone already capturing");
        }

        let (raw_tx, mut raw_rx) = mpsc::channel::<Vec<i16>>(self.config.channel_capacity);
        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = std_mpsc::channel();
        let sample_rate = self.config.sample_rate;

        let thread = std::thread::Builder::new()
            .name("microphone".to_string())
            .spawn(move || run_stream(sample_rate, raw_tx, ready_tx, stop_rx))
            .context("Failed to spawn capture thread")?;

        let device_name = ready_rx
            .await
            .context("Capture thread exited before reporting")??;

        info!("Capturing from {} at {}Hz mono", device_name, sample_rate);

        let (frame_tx, frame_rx) = mpsc::channel(self.config.channel_capacity);
        let mut assembler = FrameAssembler::new(self.config.frame_size, sample_rate);
        let capturing = Arc::clone(&self.capturing);
        capturing.store(true, Ordering::SeqCst);

        tokio::spawn(async move {
            'capture: while let Some(buffer) = raw_rx.recv().await {
                for frame in assembler.push_samples(&buffer) {
                    if frame_tx.send(frame).await.is_err() {
                        break 'capture;
                    }
                }
            }
            capturing.store(false, Ordering::SeqCst);
        });

        self.stop_tx = Some(stop_tx);
        self.thread = Some(thread);
        Ok(frame_rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            tokio::task::spawn_blocking(move || thread.join())
                .await
                .context("Failed to join capture thread")?
                .map_err(|_| anyhow!("Capture thread panicked"))?;
        }
        self.capturing.store(false, Ordering::SeqCst);
        info!("Microphone capture stopped");
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "microphone"
    }
}
