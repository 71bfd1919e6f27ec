//! Per-room caption state and translation queue.
//!
//! Each room owns one `CaptionHandle` and one queue worker. The worker is
//! the only writer of caption state; every other component (relay receive
//! path, capture session) may only enqueue.

pub mod queue;

pub use queue::{CaptionQueue, QueueEntry};

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;

/// The caption currently on screen for one room. Empty when nothing is
/// displayed.
#[derive(Debug, Clone, Default)]
pub struct CaptionState {
    pub sender: String,
    pub text: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl CaptionState {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Shared read handle over a room's caption state. Mutation is restricted
/// to the queue worker.
#[derive(Clone, Default)]
pub struct CaptionHandle {
    inner: Arc<Mutex<CaptionState>>,
}

impl CaptionHandle {
    pub async fn get(&self) -> CaptionState {
        self.inner.lock().await.clone()
    }

    pub(crate) async fn set(&self, sender: String, text: String, expires_at: DateTime<Utc>) {
        let mut state = self.inner.lock().await;
        state.sender = sender;
        state.text = text;
        state.expires_at = Some(expires_at);
    }

    pub(crate) async fn clear(&self) {
        let mut state = self.inner.lock().await;
        *state = CaptionState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_caption_handle_set_and_clear() {
        let handle = CaptionHandle::default();
        assert!(handle.get().await.is_empty());

        handle
            .set("A".to_string(), "hello".to_string(), Utc::now())
            .await;
        let state = handle.get().await;
        assert_eq!(state.sender, "A");
        assert_eq!(state.text, "hello");
        assert!(state.expires_at.is_some());

        handle.clear().await;
        assert!(handle.get().await.is_empty());
    }
}
