use anyhow::Result;
use serde::Deserialize;

/// Environment overrides: `SPEECH_ASSISTANT__KWS__URL=ws://...`
pub const ENV_PREFIX: &str = "SPEECH_ASSISTANT";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub audio: AudioConfig,
    pub kws: KwsConfig,
    pub asr: AsrConfig,
    pub nlu: NluConfig,
    pub reconnect: ReconnectConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "speech-assistant".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub enabled: bool,
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: "127.0.0.1".to_string(),
            port: 10097,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    /// Samples per capture frame
    pub frame_size: usize,
    /// Replay this WAV file instead of capturing from the microphone
    pub input: Option<String>,
    /// Pace file playback at the capture rate
    pub realtime: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            frame_size: 320, // 20ms
            input: None,
            realtime: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KwsConfig {
    pub enabled: bool,
    pub url: String,
    pub window_samples: usize,
    pub keywords_path: String,
}

impl Default for KwsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: "ws://127.0.0.1:10094".to_string(),
            window_samples: 1600, // 100ms
            keywords_path: "config/words_kws.txt".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AsrConfig {
    pub enabled: bool,
    pub url: String,
    pub window_samples: usize,
    /// Optional `word weight` file
    pub hotwords_path: Option<String>,
    /// The reference deployment serves a self-signed certificate
    pub accept_invalid_certs: bool,
    pub mode: String,
    pub chunk_size: [u32; 3],
    pub chunk_interval: u32,
    pub encoder_chunk_look_back: u32,
    pub decoder_chunk_look_back: u32,
    pub wav_name: String,
    pub itn: bool,
}

impl Default for AsrConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: "wss://127.0.0.1:10095".to_string(),
            window_samples: 960, // 60ms
            hotwords_path: None,
            accept_invalid_certs: false,
            mode: "2pass".to_string(),
            chunk_size: [5, 10, 5],
            chunk_interval: 10,
            encoder_chunk_look_back: 4,
            decoder_chunk_look_back: 0,
            wav_name: "microphone".to_string(),
            itn: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NluConfig {
    pub enabled: bool,
    pub url: String,
    pub commands_path: String,
    pub timeout_ms: u64,
}

impl Default for NluConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: "http://127.0.0.1:10096".to_string(),
            commands_path: "config/words_nlu.txt".to_string(),
            timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub enabled: bool,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub handshake_timeout_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_backoff_ms: 500,
            max_backoff_ms: 10_000,
            handshake_timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Batches queued per channel before new ones are dropped
    pub channel_capacity: usize,
    /// Frames the inactive batcher keeps between transitions
    pub idle_retention_frames: usize,
    /// Match results kept for the status API
    pub recent_matches: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 32,
            idle_retention_frames: 250, // 5s
            recent_matches: 20,
        }
    }
}

impl Config {
    /// Load `path` (any format the `config` crate knows, extension optional)
    /// overlaid with environment variables
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
