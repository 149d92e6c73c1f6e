use anyhow::{bail, Context, Result};
use tokio_tungstenite::tungstenite::Message;

use super::messages::{AsrEvent, AsrInitMessage, AsrPhase, AsrResponse};
use super::{ChannelEvent, ChannelKind, ChannelProtocol};
use crate::audio::AudioBatch;

const MODE_ONLINE: &str = "2pass-online";
const MODE_OFFLINE: &str = "2pass-offline";

/// Two-pass streaming transcription: JSON init, raw PCM audio, JSON results
pub struct AsrProtocol {
    init: AsrInitMessage,
}

impl AsrProtocol {
    pub fn new(init: AsrInitMessage) -> Self {
        Self { init }
    }
}

impl ChannelProtocol for AsrProtocol {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Asr
    }

    fn init_message(&self) -> Result<Message> {
        Ok(Message::Text(serde_json::to_string(&self.init)?))
    }

    // The service starts decoding as soon as the init arrives; it never replies.
    fn awaits_ack(&self) -> bool {
        false
    }

    fn encode_batch(&self, batch: &AudioBatch) -> Result<Message> {
        Ok(Message::Binary(batch.to_le_bytes()))
    }

    fn decode(&self, payload: &str) -> Result<ChannelEvent> {
        let response: AsrResponse =
            serde_json::from_str(payload).context("Malformed ASR message")?;

        let phase = match response.mode.as_str() {
            MODE_ONLINE => AsrPhase::Partial,
            MODE_OFFLINE => AsrPhase::Final,
            other => bail!("Unexpected ASR mode: {}", other),
        };

        Ok(ChannelEvent::Asr(AsrEvent {
            phase,
            text: response.text,
            segment_count: response.stamp_sents.len(),
        }))
    }
}
