//! Summary artifact storage.
//!
//! Containers are provisioned idempotently per room; objects are written
//! under collision-resistant keys so concurrent closure runs for the same
//! room never overwrite each other. Retrieval links always carry a finite
//! expiry enforced by the provider.

mod object_client;

pub use object_client::ObjectStoreClient;

use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

/// Fixed prefix of every summary container.
pub const CONTAINER_PREFIX: &str = "voxbridge-meeting";

#[derive(Debug, Error)]
pub enum StorageError {
    /// The container or object does not exist. The only error class that
    /// triggers creation instead of propagating.
    #[error("not found")]
    NotFound,
    #[error("storage API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("storage transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Object storage collaborator seam.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Existence check; `StorageError::NotFound` when the container is absent.
    async fn head_container(&self, name: &str) -> Result<(), StorageError>;

    async fn create_container(&self, name: &str) -> Result<(), StorageError>;

    /// Write text content under `key` with a text/plain content type.
    async fn put_object(
        &self,
        container: &str,
        key: &str,
        content: &str,
    ) -> Result<(), StorageError>;

    /// Issue a retrieval link valid for `ttl_seconds`. Expiry is enforced
    /// entirely by the provider; there is no server-side revocation.
    async fn signed_url(
        &self,
        container: &str,
        key: &str,
        ttl_seconds: u64,
    ) -> Result<String, StorageError>;

    /// Idempotent provisioning: re-invocation never fails solely because
    /// the container already exists.
    async fn ensure_container(&self, name: &str) -> Result<(), StorageError> {
        match self.head_container(name).await {
            Ok(()) => Ok(()),
            Err(StorageError::NotFound) => self.create_container(name).await,
            Err(e) => Err(e),
        }
    }
}

fn invalid_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-z0-9-]").expect("invalid container charset pattern"))
}

/// Deterministic container name for a room:
/// lower-cased, anything outside `[a-z0-9-]` replaced with `-`, prefixed.
pub fn container_name(room: &str) -> String {
    let lowered = room.to_lowercase();
    let sanitized = invalid_chars().replace_all(&lowered, "-");
    format!("{}-{}", CONTAINER_PREFIX, sanitized)
}

/// Collision-resistant object key. Epoch millis keep keys sortable by run;
/// the random suffix keeps concurrent runs for one room from colliding.
pub fn object_key() -> String {
    let epoch_ms = chrono::Utc::now().timestamp_millis();
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("summary-{}-{}.txt", epoch_ms, &suffix[..8])
}
