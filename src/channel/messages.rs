use serde::{Deserialize, Serialize};

/// KWS handshake: `{"remote": "init", "words": [...]}`
#[derive(Debug, Serialize, Deserialize)]
pub struct KwsInitMessage {
    pub remote: String,
    pub words: Vec<String>,
}

/// KWS audio batch: `{"remote": "listen", "samples": [...], "sample_rate": 16000}`
#[derive(Debug, Serialize, Deserialize)]
pub struct KwsListenMessage {
    pub remote: String,
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

/// KWS reply, used both for the init ack and for detection events
#[derive(Debug, Serialize, Deserialize)]
pub struct KwsResponse {
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

/// ASR handshake sent once before any binary audio
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsrInitMessage {
    pub mode: String,
    pub chunk_size: [u32; 3],
    pub chunk_interval: u32,
    pub encoder_chunk_look_back: u32,
    pub decoder_chunk_look_back: u32,
    pub wav_name: String,
    /// JSON-encoded `{word: weight}` map, sent as a string
    pub hotwords: String,
    pub itn: bool,
    pub is_speaking: bool,
}

/// ASR transcript message
#[derive(Debug, Serialize, Deserialize)]
pub struct AsrResponse {
    pub mode: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub stamp_sents: Vec<serde_json::Value>,
}

/// Outcome of a KWS detection message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KwsStatus {
    Detected,
    Other(i64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KwsEvent {
    pub status: KwsStatus,
    /// Detected wake phrase; identifies the assistant being addressed
    pub phrase: String,
}

impl KwsEvent {
    pub fn is_detection(&self) -> bool {
        self.status == KwsStatus::Detected
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsrPhase {
    /// Low-latency online pass
    Partial,
    /// Corrected offline pass, ends the utterance
    Final,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsrEvent {
    pub phase: AsrPhase,
    pub text: String,
    /// Number of sentence stamps the service attached
    pub segment_count: usize,
}

impl AsrEvent {
    /// Text to match against the command vocabulary
    ///
    /// Multi-segment finals carry a leading punctuation character from the
    /// previous segment, which is dropped; spaces are stripped entirely.
    pub fn command_text(&self) -> String {
        let text: &str = if self.segment_count > 1 {
            let mut chars = self.text.chars();
            chars.next();
            chars.as_str()
        } else {
            &self.text
        };
        text.chars().filter(|c| *c != ' ').collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn final_event(text: &str, segment_count: usize) -> AsrEvent {
        AsrEvent {
            phase: AsrPhase::Final,
            text: text.to_string(),
            segment_count,
        }
    }

    #[test]
    fn test_command_text_single_segment() {
        assert_eq!(final_event("打开 浏览器", 1).command_text(), "打开浏览器");
        assert_eq!(final_event("open the door", 0).command_text(), "openthedoor");
    }

    #[test]
    fn test_command_text_multi_segment_drops_first_char() {
        assert_eq!(final_event("，打开 wps 软件", 2).command_text(), "打开wps软件");
    }

    #[test]
    fn test_command_text_empty() {
        assert_eq!(final_event("", 3).command_text(), "");
    }

    #[test]
    fn test_kws_response_without_message() {
        let response: KwsResponse = serde_json::from_str(r#"{"code": 1}"#).unwrap();
        assert_eq!(response.code, 1);
        assert!(response.message.is_empty());
    }
}
