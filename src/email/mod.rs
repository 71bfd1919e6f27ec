//! Summary notification emails.
//!
//! Dispatches are issued concurrently, one per recipient, and every outcome
//! is recorded. A failed recipient never aborts the batch.

mod http_api;

pub use http_api::HttpMailer;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{info, warn};

/// Email collaborator seam.
#[async_trait]
pub trait SummaryMailer: Send + Sync {
    /// Send one summary notification with the retrieval link.
    async fn send(&self, address: &str, room: &str, summary_url: &str) -> Result<()>;
}

/// Per-recipient outcome of one closure run's fan-out.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EmailDispatchResult {
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
}

/// Fan-out/fan-in over all recipients: every dispatch runs concurrently and
/// the aggregate waits for each outcome rather than short-circuiting.
pub async fn fan_out(
    mailer: Arc<dyn SummaryMailer>,
    room: &str,
    summary_url: &str,
    recipients: Vec<String>,
) -> EmailDispatchResult {
    let mut tasks = JoinSet::new();

    for address in recipients {
        let mailer = mailer.clone();
        let room = room.to_string();
        let url = summary_url.to_string();
        tasks.spawn(async move {
            let outcome = mailer.send(&address, &room, &url).await;
            (address, outcome)
        });
    }

    let mut result = EmailDispatchResult::default();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((address, Ok(()))) => result.succeeded.push(address),
            Ok((address, Err(e))) => {
                warn!("Summary email to {} failed: {}", address, e);
                result.failed.push(address);
            }
            Err(e) => warn!("Email dispatch task panicked: {}", e),
        }
    }

    info!(
        "Summary email fan-out complete: {} sent, {} failed",
        result.succeeded.len(),
        result.failed.len()
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FlakyMailer;

    #[async_trait]
    impl SummaryMailer for FlakyMailer {
        async fn send(&self, address: &str, _room: &str, _url: &str) -> Result<()> {
            if address.starts_with("bad") {
                anyhow::bail!("mailbox unavailable");
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_fan_out_records_every_outcome() {
        let recipients = vec![
            "a@example.com".to_string(),
            "bad@example.com".to_string(),
            "b@example.com".to_string(),
            "bad2@example.com".to_string(),
        ];

        let mut result = fan_out(
            Arc::new(FlakyMailer),
            "team-sync",
            "https://example.com/s",
            recipients,
        )
        .await;

        result.succeeded.sort();
        result.failed.sort();
        assert_eq!(result.succeeded, vec!["a@example.com", "b@example.com"]);
        assert_eq!(result.failed, vec!["bad2@example.com", "bad@example.com"]);
    }

    #[tokio::test]
    async fn test_fan_out_with_no_recipients() {
        let result = fan_out(
            Arc::new(FlakyMailer),
            "team-sync",
            "https://example.com/s",
            Vec::new(),
        )
        .await;

        assert!(result.succeeded.is_empty());
        assert!(result.failed.is_empty());
    }
}
