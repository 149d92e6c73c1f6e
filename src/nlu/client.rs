use anyhow::{bail, Context, Result};
use std::time::Duration;
use tracing::{debug, info};

use super::messages::{MatchResult, MatchSentenceRequest, UploadWordsRequest};
use crate::vocabulary::CommandVocabulary;

pub struct NluClient {
    client: reqwest::Client,
    base_url: String,
}

impl NluClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build NLU HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Upload the command vocabulary; safe to repeat
    pub async fn upload_vocabulary(&self, vocabulary: &CommandVocabulary) -> Result<()> {
        let url = format!("{}/upload_words", self.base_url);
        info!(
            "Uploading {} commands to NLU service at {}",
            vocabulary.len(),
            url
        );

        let payload = UploadWordsRequest {
            sentences_to_compare: vocabulary.sentences().to_vec(),
        };

        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .with_context(|| format!("Failed to reach NLU service at {}", url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("NLU vocabulary upload failed ({}): {}", status, body);
        }

        info!("NLU vocabulary uploaded");
        Ok(())
    }

    /// Find the closest command for a transcript
    pub async fn match_sentence(&self, sentence: &str) -> Result<MatchResult> {
        let url = format!("{}/match_sentence", self.base_url);
        debug!("Matching sentence: {}", sentence);

        let payload = MatchSentenceRequest {
            source_sentence: sentence.to_string(),
        };

        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .with_context(|| format!("Failed to reach NLU service at {}", url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("NLU match failed ({}): {}", status, body);
        }

        response
            .json::<MatchResult>()
            .await
            .context("Malformed NLU match response")
    }
}
