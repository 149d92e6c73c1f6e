use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::machine::SessionMode;
use crate::nlu::MatchResult;

/// Snapshot of a running assistant session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub session_id: String,

    /// Whether the capture loop is running
    pub is_running: bool,

    pub mode: SessionMode,

    /// Wake phrase of the last detection
    pub assistant: Option<String>,

    pub started_at: DateTime<Utc>,

    pub frames_captured: u64,

    pub kws: ChannelStats,
    pub asr: ChannelStats,

    /// Wake phrase detections
    pub wake_count: u64,

    /// Finalized transcripts
    pub command_count: u64,

    /// Finalized transcripts the NLU service matched
    pub matched_count: u64,

    /// Match requests that failed
    pub failed_matches: u64,

    /// Partial transcript of the utterance in progress
    pub transcript: String,

    /// Most recent match results, newest last
    pub recent_matches: Vec<MatchRecord>,
}

impl SessionStats {
    pub fn new(session_id: String, mode: SessionMode) -> Self {
        Self {
            session_id,
            is_running: false,
            mode,
            assistant: None,
            started_at: Utc::now(),
            frames_captured: 0,
            kws: ChannelStats::default(),
            asr: ChannelStats::default(),
            wake_count: 0,
            command_count: 0,
            matched_count: 0,
            failed_matches: 0,
            transcript: String::new(),
            recent_matches: Vec::new(),
        }
    }

    /// Count a match and append it, keeping at most `limit` records
    pub fn record_match(&mut self, record: MatchRecord, limit: usize) {
        self.matched_count += 1;
        self.recent_matches.push(record);
        let excess = self.recent_matches.len().saturating_sub(limit);
        self.recent_matches.drain(..excess);
    }
}

/// Per-channel counters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelStats {
    pub enabled: bool,
    pub connected: bool,
    pub batches_sent: u64,
    pub batches_dropped: u64,
    /// Frames waiting in this channel's batcher
    pub queued_frames: usize,
    /// Times an established link was lost
    pub disconnects: u64,
}

/// A finalized command and its NLU match
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRecord {
    /// Normalized transcript sent to the NLU service
    pub text: String,

    pub assistant: Option<String>,

    pub result: MatchResult,

    pub matched_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(text: &str) -> MatchRecord {
        MatchRecord {
            text: text.to_string(),
            assistant: None,
            result: MatchResult {
                best_match: text.to_string(),
                score: 1.0,
            },
            matched_at: Utc::now(),
        }
    }

    #[test]
    fn test_recent_matches_bounded() {
        let mut stats = SessionStats::new("s".to_string(), SessionMode::ListeningForKeyword);
        for text in ["a", "b", "c"] {
            stats.record_match(record(text), 2);
        }
        let texts: Vec<&str> = stats.recent_matches.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["b", "c"]);
        assert_eq!(stats.matched_count, 3);
    }

    #[test]
    fn test_mode_serializes_screaming_case() {
        let stats = SessionStats::new("s".to_string(), SessionMode::ListeningForKeyword);
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["mode"], "LISTENING_FOR_KEYWORD");
    }
}
