//! Summarization collaborator.
//!
//! Generation parameters are fixed and deterministic so repeated closure
//! runs over the same transcript produce the same summary. The HTTP engine
//! behind `SummarizerHandle` is initialized at most once per process, on
//! first use, and injected into the orchestrator rather than reached for
//! as ambient state.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, error, info};

use crate::config::SummarizerConfig;

/// Summarization collaborator seam.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// One transcript blob in, one summary out.
    async fn summarize(&self, text: &str) -> Result<String>;
}

/// Fixed decoding parameters: bounded length, beam search, no sampling.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationParams {
    pub max_length: u32,
    pub min_length: u32,
    pub length_penalty: f32,
    pub num_beams: u32,
    pub early_stopping: bool,
    pub do_sample: bool,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_length: 250,
            min_length: 50,
            length_penalty: 2.0,
            num_beams: 4,
            early_stopping: true,
            do_sample: false,
        }
    }
}

#[derive(Debug, Serialize)]
struct SummaryPayload<'a> {
    text: &'a str,
    #[serde(flatten)]
    params: &'a GenerationParams,
}

#[derive(Debug, Deserialize)]
struct SummaryResponse {
    summary: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

/// Engine client talking to the summarization service.
pub struct HttpSummarizer {
    client: reqwest::Client,
    endpoint: String,
    params: GenerationParams,
}

impl HttpSummarizer {
    pub fn new(config: &SummarizerConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to build summarizer HTTP client")?;

        info!("Summarizer engine ready (endpoint: {})", config.endpoint);

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            params: GenerationParams::default(),
        })
    }
}

#[async_trait]
impl Summarizer for HttpSummarizer {
    async fn summarize(&self, text: &str) -> Result<String> {
        debug!("Requesting summary for {} chars", text.len());

        let body = SummaryPayload {
            text,
            params: &self.params,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .context("Failed to send request to summarization API")?;

        let status = response.status();
        let response_text = response
            .text()
            .await
            .context("Failed to read summarization response body")?;

        if !status.is_success() {
            error!(
                "Summarization request failed with status {}: {}",
                status, response_text
            );

            if let Ok(error_response) = serde_json::from_str::<ErrorResponse>(&response_text) {
                anyhow::bail!("Summarization API error: {}", error_response.error);
            }
            anyhow::bail!("Summarization request failed with status {}", status);
        }

        let parsed: SummaryResponse = serde_json::from_str(&response_text)
            .context("Failed to parse summarization response")?;

        if parsed.summary.trim().is_empty() {
            anyhow::bail!("Summarizer returned an empty summary");
        }

        info!("Summary generated: {} chars", parsed.summary.len());
        Ok(parsed.summary)
    }
}

/// Process-wide summarizer with a guarded initialize-once lifecycle.
pub struct SummarizerHandle {
    config: SummarizerConfig,
    engine: OnceCell<HttpSummarizer>,
}

impl SummarizerHandle {
    pub fn new(config: SummarizerConfig) -> Self {
        Self {
            config,
            engine: OnceCell::new(),
        }
    }

    async fn engine(&self) -> Result<&HttpSummarizer> {
        self.engine
            .get_or_try_init(|| async { HttpSummarizer::new(&self.config) })
            .await
    }
}

#[async_trait]
impl Summarizer for SummarizerHandle {
    async fn summarize(&self, text: &str) -> Result<String> {
        self.engine().await?.summarize(text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_params_are_deterministic() {
        let params = GenerationParams::default();
        assert_eq!(params.max_length, 250);
        assert_eq!(params.min_length, 50);
        assert_eq!(params.num_beams, 4);
        assert!(params.early_stopping);
        assert!(!params.do_sample);
    }

    #[test]
    fn test_payload_flattens_params() {
        let params = GenerationParams::default();
        let json = serde_json::to_string(&SummaryPayload {
            text: "a meeting happened",
            params: &params,
        })
        .unwrap();

        assert!(json.contains("\"text\":\"a meeting happened\""));
        assert!(json.contains("\"num_beams\":4"));
        assert!(json.contains("\"do_sample\":false"));
    }

    #[tokio::test]
    async fn test_handle_initializes_engine_once() {
        let handle = SummarizerHandle::new(SummarizerConfig::default());
        assert!(handle.engine.get().is_none());

        handle.engine().await.unwrap();
        assert!(handle.engine.get().is_some());

        // Second call reuses the initialized engine.
        let first = handle.engine().await.unwrap() as *const HttpSummarizer;
        let second = handle.engine().await.unwrap() as *const HttpSummarizer;
        assert_eq!(first, second);
    }
}
