use anyhow::{Context, Result};
use tokio_tungstenite::tungstenite::Message;
use tracing::info;

use super::messages::{KwsEvent, KwsInitMessage, KwsListenMessage, KwsResponse, KwsStatus};
use super::{ChannelEvent, ChannelKind, ChannelProtocol};
use crate::audio::AudioBatch;

/// Keyword spotting over a text-framed JSON session
pub struct KwsProtocol {
    keywords: Vec<String>,
    sample_rate: u32,
}

impl KwsProtocol {
    pub fn new(keywords: Vec<String>, sample_rate: u32) -> Self {
        Self {
            keywords,
            sample_rate,
        }
    }
}

impl ChannelProtocol for KwsProtocol {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Kws
    }

    fn init_message(&self) -> Result<Message> {
        let init = KwsInitMessage {
            remote: "init".to_string(),
            words: self.keywords.clone(),
        };
        Ok(Message::Text(serde_json::to_string(&init)?))
    }

    fn awaits_ack(&self) -> bool {
        true
    }

    fn check_ack(&self, payload: &str) -> Result<()> {
        let ack: KwsResponse =
            serde_json::from_str(payload).context("Malformed KWS init acknowledgment")?;
        info!(
            "KWS model initialized with {} keywords (code={}, message={})",
            self.keywords.len(),
            ack.code,
            ack.message
        );
        Ok(())
    }

    fn encode_batch(&self, batch: &AudioBatch) -> Result<Message> {
        let listen = KwsListenMessage {
            remote: "listen".to_string(),
            samples: batch.samples.clone(),
            sample_rate: self.sample_rate,
        };
        Ok(Message::Text(serde_json::to_string(&listen)?))
    }

    fn decode(&self, payload: &str) -> Result<ChannelEvent> {
        let response: KwsResponse =
            serde_json::from_str(payload).context("Malformed KWS message")?;

        let status = match response.code {
            0 => KwsStatus::Detected,
            code => KwsStatus::Other(code),
        };

        Ok(ChannelEvent::Kws(KwsEvent {
            status,
            phrase: response.message,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn protocol() -> KwsProtocol {
        KwsProtocol::new(vec!["小新小新".to_string(), "小爱同学".to_string()], 16000)
    }

    #[test]
    fn test_init_message_shape() {
        let Message::Text(text) = protocol().init_message().unwrap() else {
            panic!("init must be a text frame");
        };
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["remote"], "init");
        assert_eq!(value["words"][1], "小爱同学");
    }

    #[test]
    fn test_listen_message_shape() {
        let batch = AudioBatch {
            samples: vec![1, -1, 300],
            first_sequence: 0,
            frame_count: 1,
        };
        let Message::Text(text) = protocol().encode_batch(&batch).unwrap() else {
            panic!("listen must be a text frame");
        };
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["remote"], "listen");
        assert_eq!(value["samples"], serde_json::json!([1, -1, 300]));
        assert_eq!(value["sample_rate"], 16000);
    }

    #[test]
    fn test_decode_detection() {
        let event = protocol()
            .decode(r#"{"code": 0, "message": "小新小新"}"#)
            .unwrap();
        assert_eq!(
            event,
            ChannelEvent::Kws(KwsEvent {
                status: KwsStatus::Detected,
                phrase: "小新小新".to_string(),
            })
        );
    }

    #[test]
    fn test_decode_non_detection() {
        let event = protocol().decode(r#"{"code": 2, "message": "none"}"#).unwrap();
        match event {
            ChannelEvent::Kws(kws) => assert_eq!(kws.status, KwsStatus::Other(2)),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_decode_malformed() {
        assert!(protocol().decode("not json").is_err());
        assert!(protocol().decode(r#"{"message": "no code"}"#).is_err());
    }
}
