use anyhow::{bail, Context, Result};
use std::time::Duration;
use tracing::{info, warn};

use crate::audio::BatchWindow;
use crate::channel::messages::AsrInitMessage;
use crate::channel::{Endpoint, ReconnectPolicy};
use crate::config::Config;
use crate::vocabulary::{self, CommandVocabulary};

/// Keyword spotting stage
#[derive(Debug, Clone)]
pub struct KwsSettings {
    pub endpoint: Endpoint,
    pub window: BatchWindow,
    pub keywords: Vec<String>,
}

/// Transcription stage
#[derive(Debug, Clone)]
pub struct AsrSettings {
    pub endpoint: Endpoint,
    pub window: BatchWindow,
    pub init: AsrInitMessage,
}

/// Command matching stage
#[derive(Debug, Clone)]
pub struct NluSettings {
    pub url: String,
    pub timeout: Duration,
    pub vocabulary: CommandVocabulary,
}

/// Resolved configuration for one assistant session
///
/// A stage set to `None` is disabled; the same pipeline then runs as a
/// KWS-only or ASR-only client.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Unique session identifier (e.g., "assistant-<uuid>")
    pub session_id: String,

    /// Sample rate for captured audio (16kHz for every service)
    pub sample_rate: u32,

    /// Samples per capture frame
    pub frame_size: usize,

    pub kws: Option<KwsSettings>,
    pub asr: Option<AsrSettings>,
    pub nlu: Option<NluSettings>,

    pub reconnect: ReconnectPolicy,

    /// Batches queued per channel before new ones are dropped
    pub channel_capacity: usize,

    /// Frames the inactive batcher keeps between transitions
    pub idle_retention_frames: usize,

    /// Match results kept in session stats
    pub recent_matches: usize,
}

impl SessionConfig {
    /// Resolve file configuration, loading vocabulary files for enabled stages
    pub fn from_config(cfg: &Config) -> Result<Self> {
        if !cfg.kws.enabled && !cfg.asr.enabled {
            bail!("At least one of the KWS and ASR stages must be enabled");
        }

        let frame_size = cfg.audio.frame_size;

        let kws = if cfg.kws.enabled {
            let keywords = vocabulary::load_keywords(&cfg.kws.keywords_path)?;
            if keywords.is_empty() {
                bail!("No keywords in {}", cfg.kws.keywords_path);
            }
            info!("Loaded {} keywords from {}", keywords.len(), cfg.kws.keywords_path);

            Some(KwsSettings {
                endpoint: Endpoint::new(&cfg.kws.url),
                window: BatchWindow::new(cfg.kws.window_samples, frame_size)
                    .context("Invalid KWS window")?,
                keywords,
            })
        } else {
            None
        };

        let asr = if cfg.asr.enabled {
            let hotwords = match &cfg.asr.hotwords_path {
                Some(path) => {
                    let hotwords = vocabulary::load_hotwords(path)?;
                    info!("Loaded {} hotwords from {}", hotwords.len(), path);
                    hotwords
                }
                None => Default::default(),
            };

            Some(AsrSettings {
                endpoint: Endpoint {
                    url: cfg.asr.url.clone(),
                    subprotocol: Some("binary".to_string()),
                    accept_invalid_certs: cfg.asr.accept_invalid_certs,
                },
                window: BatchWindow::new(cfg.asr.window_samples, frame_size)
                    .context("Invalid ASR window")?,
                init: AsrInitMessage {
                    mode: cfg.asr.mode.clone(),
                    chunk_size: cfg.asr.chunk_size,
                    chunk_interval: cfg.asr.chunk_interval,
                    encoder_chunk_look_back: cfg.asr.encoder_chunk_look_back,
                    decoder_chunk_look_back: cfg.asr.decoder_chunk_look_back,
                    wav_name: cfg.asr.wav_name.clone(),
                    hotwords: serde_json::to_string(&hotwords)?,
                    itn: cfg.asr.itn,
                    is_speaking: true,
                },
            })
        } else {
            None
        };

        let nlu = if cfg.nlu.enabled && asr.is_none() {
            warn!("NLU stage needs ASR transcripts; disabling it");
            None
        } else if cfg.nlu.enabled {
            let vocabulary = vocabulary::load_commands(&cfg.nlu.commands_path)?;
            if vocabulary.is_empty() {
                bail!("No commands in {}", cfg.nlu.commands_path);
            }
            info!(
                "Loaded {} commands from {}",
                vocabulary.len(),
                cfg.nlu.commands_path
            );

            Some(NluSettings {
                url: cfg.nlu.url.clone(),
                timeout: Duration::from_millis(cfg.nlu.timeout_ms),
                vocabulary,
            })
        } else {
            None
        };

        Ok(Self {
            session_id: format!("assistant-{}", uuid::Uuid::new_v4()),
            sample_rate: cfg.audio.sample_rate,
            frame_size,
            kws,
            asr,
            nlu,
            reconnect: ReconnectPolicy {
                enabled: cfg.reconnect.enabled,
                initial_backoff: Duration::from_millis(cfg.reconnect.initial_backoff_ms),
                max_backoff: Duration::from_millis(cfg.reconnect.max_backoff_ms),
                handshake_timeout: Duration::from_millis(cfg.reconnect.handshake_timeout_ms),
            },
            channel_capacity: cfg.pipeline.channel_capacity,
            idle_retention_frames: cfg.pipeline.idle_retention_frames,
            recent_matches: cfg.pipeline.recent_matches,
        })
    }
}
