//! Command matching against the uploaded vocabulary
//!
//! Two one-shot HTTP calls, outside the streaming loop:
//! - POST /upload_words once at startup
//! - POST /match_sentence per finalized transcript

mod client;
pub mod messages;

pub use client::NluClient;
pub use messages::{MatchResult, MatchSentenceRequest, UploadWordsRequest};
