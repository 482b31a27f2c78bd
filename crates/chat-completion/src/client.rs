//! HTTP completion client.

use async_trait::async_trait;
use chat_core::{CheckStatus, CompletionClient, CompletionConfig, NetworkError};
use rand::Rng;
use reqwest::{Client as HttpClient, StatusCode};

use crate::protocol::ResponseApi;

/// Completion client backed by a text generator endpoint.
///
/// The generator ignores the prompt; it stands in for a real language-model
/// backend with the same single-prompt-in, single-text-out shape.
pub struct HttpCompletionClient {
    http: HttpClient,
    config: CompletionConfig,
}

impl HttpCompletionClient {
    /// Create a client from configuration.
    #[must_use]
    pub fn new(config: CompletionConfig) -> Self {
        Self::with_client(HttpClient::new(), config)
    }

    /// Create a client sharing an existing HTTP client.
    #[must_use]
    pub const fn with_client(http: HttpClient, config: CompletionConfig) -> Self {
        Self { http, config }
    }

    fn sentence_count(&self) -> u32 {
        rand::thread_rng().gen_range(1..=self.config.max_sentences.max(1))
    }

    async fn fetch_reply(&self) -> Result<String, NetworkError> {
        let sentences = self.sentence_count();

        let resp = self
            .http
            .get(&self.config.reply_url)
            .query(&[("format", "json")])
            .query(&[("number", sentences)])
            .send()
            .await
            .map_err(|e| NetworkError::Other(e.to_string()))?;

        let status = resp.status();
        if status != StatusCode::OK {
            return Err(NetworkError::Other(format!("HTTP status is not 200: {status}")));
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| NetworkError::Other(e.to_string()))?;
        if body.is_empty() {
            return Err(NetworkError::NoData);
        }

        let response: ResponseApi =
            serde_json::from_slice(&body).map_err(|e| NetworkError::Other(e.to_string()))?;

        Ok(response.text)
    }
}

#[async_trait]
impl CompletionClient for HttpCompletionClient {
    async fn check_credential(&self, key: &str) -> CheckStatus {
        match self
            .http
            .get(&self.config.models_url)
            .bearer_auth(key)
            .send()
            .await
        {
            Ok(resp) if resp.status() == StatusCode::OK => CheckStatus::Valid,
            Ok(resp) => {
                tracing::debug!(status = %resp.status(), "Credential rejected");
                CheckStatus::Invalid
            }
            Err(e) => {
                tracing::warn!("Credential check failed: {e}");
                CheckStatus::Error
            }
        }
    }

    async fn generate_reply(&self, prompt: &str) -> Result<String, NetworkError> {
        tracing::debug!(prompt_len = prompt.len(), "Requesting reply");

        let (result, ()) = tokio::join!(
            self.fetch_reply(),
            tokio::time::sleep(self.config.min_reply_delay())
        );

        if let Err(e) = &result {
            tracing::warn!("Reply generation failed: {e}");
        }
        result
    }
}
