use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

use super::Translator;
use crate::config::TranslationConfig;

#[derive(Debug, Serialize)]
struct TranslationPayload<'a> {
    text: &'a str,
    to: &'a str,
}

#[derive(Debug, Deserialize)]
struct TranslationResponse {
    text: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

pub struct HttpTranslator {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTranslator {
    pub fn new(config: &TranslationConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to build translation HTTP client")?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
        })
    }
}

#[async_trait]
impl Translator for HttpTranslator {
    async fn translate(&self, text: &str, target_lang: &str) -> Result<String> {
        debug!("Translating {} chars to '{}'", text.len(), target_lang);

        let body = TranslationPayload {
            text,
            to: target_lang,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .context("Failed to send request to translation API")?;

        let status = response.status();
        let response_text = response
            .text()
            .await
            .context("Failed to read translation response body")?;

        if !status.is_success() {
            error!(
                "Translation request failed with status {}: {}",
                status, response_text
            );

            if let Ok(error_response) = serde_json::from_str::<ErrorResponse>(&response_text) {
                return Err(anyhow::anyhow!(
                    "Translation API error: {}",
                    error_response.error.message
                ));
            }

            return Err(anyhow::anyhow!(
                "Translation request failed with status {}: {}",
                status,
                response_text
            ));
        }

        let translation: TranslationResponse = serde_json::from_str(&response_text)
            .context("Failed to parse translation response")?;

        Ok(translation.text)
    }
}
