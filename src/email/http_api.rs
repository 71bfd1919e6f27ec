use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

use super::SummaryMailer;
use crate::config::EmailConfig;

#[derive(Debug, Serialize)]
struct EmailPayload<'a> {
    from: &'a str,
    to: Vec<&'a str>,
    subject: String,
    html: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    message: String,
}

pub struct HttpMailer {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    from: String,
}

impl HttpMailer {
    pub fn new(config: &EmailConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to build email HTTP client")?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            from: config.from.clone(),
        })
    }

    fn render_body(room: &str, summary_url: &str) -> String {
        format!(
            "<h2>Your VoxBridge Summary is Ready!</h2>\
             <p>The summary for your meeting \"{}\" has been generated and is now available.</p>\
             <p><a href=\"{}\">View Summary</a></p>\
             <p>This link will expire in 7 days.</p>\
             <p>Best regards,<br/>The VoxBridge Team</p>",
            room, summary_url
        )
    }
}

#[async_trait]
impl SummaryMailer for HttpMailer {
    async fn send(&self, address: &str, room: &str, summary_url: &str) -> Result<()> {
        debug!("Sending summary email to {}", address);

        let body = EmailPayload {
            from: &self.from,
            to: vec![address],
            subject: format!("Your VoxBridge Summary for {} is Ready", room),
            html: Self::render_body(room, summary_url),
        };

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .context("Failed to send request to email API")?;

        let status = response.status();
        if !status.is_success() {
            let response_text = response.text().await.unwrap_or_default();
            error!(
                "Email API request failed with status {}: {}",
                status, response_text
            );

            if let Ok(error_response) = serde_json::from_str::<ErrorResponse>(&response_text) {
                anyhow::bail!("Email API error: {}", error_response.message);
            }
            anyhow::bail!("Email API request failed with status {}", status);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_names_room_and_expiry() {
        let body = HttpMailer::render_body("team-sync", "https://example.com/s");
        assert!(body.contains("team-sync"));
        assert!(body.contains("https://example.com/s"));
        assert!(body.contains("expire in 7 days"));
    }
}
