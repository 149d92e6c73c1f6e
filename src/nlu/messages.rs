use serde::{Deserialize, Serialize};

/// `POST /upload_words` body
#[derive(Debug, Serialize, Deserialize)]
pub struct UploadWordsRequest {
    pub sentences_to_compare: Vec<String>,
}

/// `POST /match_sentence` body
#[derive(Debug, Serialize, Deserialize)]
pub struct MatchSentenceRequest {
    pub source_sentence: String,
}

/// Best command for a transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub best_match: String,
    pub score: f64,
}
