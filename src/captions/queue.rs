//! Room-scoped FIFO of inbound transcripts and its serialized worker.
//!
//! Enqueue is safe from any task; exactly one worker per room pops, calls
//! the translator, and updates caption state. A failed translation drops
//! that entry only. Captions clear after the display window unless the
//! next processed entry supersedes them first.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::CaptionHandle;
use crate::events::TranscriptEvent;
use crate::translation::Translator;

/// A transcript awaiting display, in arrival order.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub event: TranscriptEvent,
    /// Recognition language, when known locally. The wire payload does not
    /// carry it, so relayed entries leave this unset and are translated.
    pub source_lang: Option<String>,
}

struct QueueInner {
    entries: std::sync::Mutex<VecDeque<QueueEntry>>,
    notify: Notify,
}

/// Append-only handle to a room's translation queue.
#[derive(Clone)]
pub struct CaptionQueue {
    inner: Arc<QueueInner>,
}

impl Default for CaptionQueue {
    fn default() -> Self {
        Self {
            inner: Arc::new(QueueInner {
                entries: std::sync::Mutex::new(VecDeque::new()),
                notify: Notify::new(),
            }),
        }
    }
}

impl CaptionQueue {
    /// Append to the tail. Safe to call concurrently from the relay receive
    /// path and the local capture session.
    pub fn enqueue(&self, entry: QueueEntry) {
        {
            let mut entries = self.inner.entries.lock().unwrap();
            entries.push_back(entry);
        }
        self.inner.notify.notify_one();
    }

    fn pop(&self) -> Option<QueueEntry> {
        self.inner.entries.lock().unwrap().pop_front()
    }

    pub fn len(&self) -> usize {
        self.inner.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Spawn the single worker that owns this room's caption state.
    pub fn spawn_worker(
        &self,
        caption: CaptionHandle,
        translator: Arc<dyn Translator>,
        display_lang: String,
        display_window: Duration,
    ) -> JoinHandle<()> {
        let queue = self.clone();
        tokio::spawn(async move {
            worker_loop(queue, caption, translator, display_lang, display_window).await;
        })
    }
}

async fn worker_loop(
    queue: CaptionQueue,
    caption: CaptionHandle,
    translator: Arc<dyn Translator>,
    display_lang: String,
    display_window: Duration,
) {
    // Expiry deadline for the caption currently displayed, if any.
    let mut deadline: Option<tokio::time::Instant> = None;

    loop {
        if let Some(entry) = queue.pop() {
            let event = entry.event;

            let text = if entry.source_lang.as_deref() == Some(display_lang.as_str()) {
                event.message
            } else {
                match translator.translate(&event.message, &display_lang).await {
                    Ok(translated) => translated,
                    Err(e) => {
                        // Drop this entry only; the queue must never stall.
                        warn!("Dropping caption from '{}': translation failed: {}", event.sender, e);
                        continue;
                    }
                }
            };

            let expires_at = chrono::Utc::now()
                + chrono::Duration::milliseconds(display_window.as_millis() as i64);
            caption.set(event.sender, text, expires_at).await;
            deadline = Some(tokio::time::Instant::now() + display_window);
            debug!("Caption displayed, window {:?}", display_window);
            continue;
        }

        match deadline {
            Some(at) => {
                tokio::select! {
                    _ = queue.inner.notify.notified() => {}
                    _ = tokio::time::sleep_until(at) => {
                        caption.clear().await;
                        deadline = None;
                        debug!("Caption window elapsed, display cleared");
                    }
                }
            }
            None => queue.inner.notify.notified().await,
        }
    }
}
