//! HTTP client for the object storage gateway.
//!
//! Containers map to buckets on the provider side; the gateway issues
//! pre-signed retrieval links with the requested TTL.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use super::{ArtifactStore, StorageError};
use crate::config::StorageConfig;

#[derive(Debug, Serialize)]
struct CreateContainerRequest<'a> {
    name: &'a str,
}

#[derive(Debug, Serialize)]
struct SignRequest {
    ttl_seconds: u64,
}

#[derive(Debug, Deserialize)]
struct SignResponse {
    url: String,
}

pub struct ObjectStoreClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl ObjectStoreClient {
    pub fn new(config: &StorageConfig) -> Result<Self, StorageError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            base_url: config.endpoint.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        let mut builder = self.client.request(method, url);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        builder
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, StorageError> {
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(StorageError::NotFound);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(StorageError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl ArtifactStore for ObjectStoreClient {
    async fn head_container(&self, name: &str) -> Result<(), StorageError> {
        debug!("Checking container: {}", name);
        let url = format!("{}/containers/{}", self.base_url, name);
        let response = self.request(reqwest::Method::HEAD, url).send().await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn create_container(&self, name: &str) -> Result<(), StorageError> {
        info!("Creating container: {}", name);
        let url = format!("{}/containers", self.base_url);
        let response = self
            .request(reqwest::Method::POST, url)
            .json(&CreateContainerRequest { name })
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn put_object(
        &self,
        container: &str,
        key: &str,
        content: &str,
    ) -> Result<(), StorageError> {
        debug!("Writing object {}/{} ({} bytes)", container, key, content.len());
        let url = format!("{}/containers/{}/objects/{}", self.base_url, container, key);
        let response = self
            .request(reqwest::Method::PUT, url)
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .body(content.to_string())
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn signed_url(
        &self,
        container: &str,
        key: &str,
        ttl_seconds: u64,
    ) -> Result<String, StorageError> {
        let url = format!(
            "{}/containers/{}/objects/{}/links",
            self.base_url, container, key
        );
        let response = self
            .request(reqwest::Method::POST, url)
            .json(&SignRequest { ttl_seconds })
            .send()
            .await?;
        let response = Self::check(response).await?;

        let signed: SignResponse = response.json().await?;
        info!(
            "Issued retrieval link for {}/{} (ttl {}s)",
            container, key, ttl_seconds
        );
        Ok(signed.url)
    }
}
