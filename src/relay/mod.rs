//! Per-room pub/sub relay.
//!
//! One subscription per joined room, torn down on leave. The receive path
//! filters interim results, routes summary announcements to the notice
//! state, and forwards other participants' captions to the translation
//! queue. It never touches caption state itself.

pub mod broker;

pub use broker::{EventBroker, LocalBroker, SocketBroker, Subscription};

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::captions::queue::{CaptionQueue, QueueEntry};
use crate::events::{RoomEvent, SummaryNotice, TranscriptEvent};

/// "Summary ready" state surfaced to the local UI layer instead of being
/// queued as a caption.
#[derive(Clone, Default)]
pub struct SummaryNoticeHandle {
    inner: Arc<Mutex<Option<SummaryNotice>>>,
}

impl SummaryNoticeHandle {
    pub async fn get(&self) -> Option<SummaryNotice> {
        self.inner.lock().await.clone()
    }

    pub async fn set(&self, notice: SummaryNotice) {
        *self.inner.lock().await = Some(notice);
    }

    pub async fn dismiss(&self) {
        *self.inner.lock().await = None;
    }
}

/// A joined room channel: publishes local events, dispatches received ones.
pub struct RoomRelay {
    room: String,
    local_participant: String,
    sender_label: String,
    broker: Arc<dyn EventBroker>,
    receive_task: JoinHandle<()>,
}

impl RoomRelay {
    /// Subscribe to the room channel and start dispatching received events.
    pub async fn join(
        room: &str,
        local_participant: &str,
        sender_label: &str,
        broker: Arc<dyn EventBroker>,
        queue: CaptionQueue,
        notice: SummaryNoticeHandle,
    ) -> Result<Self> {
        let subscription = broker.subscribe(room).await?;
        info!("Joined room channel '{}'", room);

        let local = local_participant.to_string();
        let receive_task = tokio::spawn(async move {
            receive_loop(subscription, local, queue, notice).await;
        });

        Ok(Self {
            room: room.to_string(),
            local_participant: local_participant.to_string(),
            sender_label: sender_label.to_string(),
            broker,
            receive_task,
        })
    }

    pub fn room(&self) -> &str {
        &self.room
    }

    /// Publish a locally recognized final transcript to the room channel.
    pub async fn publish_transcript(&self, message: &str) -> Result<()> {
        let event = RoomEvent::Caption(TranscriptEvent {
            room: self.room.clone(),
            sender: self.sender_label.clone(),
            sender_id: self.local_participant.clone(),
            message: message.to_string(),
            is_final: true,
        });
        self.broker.publish(&self.room, &event).await
    }

    /// Tear down the subscription. Aborting the receive task drops the
    /// subscription, which unsubscribes from the broker.
    pub fn leave(&self) {
        info!("Leaving room channel '{}'", self.room);
        self.receive_task.abort();
    }
}

impl Drop for RoomRelay {
    fn drop(&mut self) {
        self.receive_task.abort();
    }
}

async fn receive_loop(
    mut subscription: Subscription,
    local_participant: String,
    queue: CaptionQueue,
    notice: SummaryNoticeHandle,
) {
    while let Some(event) = subscription.recv().await {
        if !event.is_final() {
            debug!("Discarding interim event");
            continue;
        }

        match event {
            RoomEvent::SummaryReady(summary) => {
                info!("Summary ready for room '{}'", summary.room);
                notice.set(summary).await;
            }
            RoomEvent::Caption(transcript) => {
                if transcript.sender_id == local_participant {
                    // Our own event came back around the broker.
                    continue;
                }
                queue.enqueue(QueueEntry {
                    event: transcript,
                    source_lang: None,
                });
            }
        }
    }
    debug!("Room receive loop ended");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn caption(message: &str, sender_id: &str) -> RoomEvent {
        RoomEvent::Caption(TranscriptEvent {
            room: "team-sync".to_string(),
            sender: "A".to_string(),
            sender_id: sender_id.to_string(),
            message: message.to_string(),
            is_final: true,
        })
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn test_remote_final_caption_is_enqueued_once() {
        let broker: Arc<dyn EventBroker> = Arc::new(LocalBroker::new());
        let queue = CaptionQueue::default();
        let relay = RoomRelay::join(
            "team-sync",
            "u2",
            "Bea",
            broker.clone(),
            queue.clone(),
            SummaryNoticeHandle::default(),
        )
        .await
        .unwrap();

        broker.publish("team-sync", &caption("hello", "u1")).await.unwrap();
        settle().await;

        assert_eq!(queue.len(), 1);
        relay.leave();
    }

    #[tokio::test]
    async fn test_own_caption_is_discarded() {
        let broker: Arc<dyn EventBroker> = Arc::new(LocalBroker::new());
        let queue = CaptionQueue::default();
        let relay = RoomRelay::join(
            "team-sync",
            "u2",
            "Bea",
            broker.clone(),
            queue.clone(),
            SummaryNoticeHandle::default(),
        )
        .await
        .unwrap();

        broker.publish("team-sync", &caption("echo", "u2")).await.unwrap();
        settle().await;

        assert!(queue.is_empty());
        relay.leave();
    }

    #[tokio::test]
    async fn test_interim_results_are_discarded() {
        let broker: Arc<dyn EventBroker> = Arc::new(LocalBroker::new());
        let queue = CaptionQueue::default();
        let relay = RoomRelay::join(
            "team-sync",
            "u2",
            "Bea",
            broker.clone(),
            queue.clone(),
            SummaryNoticeHandle::default(),
        )
        .await
        .unwrap();

        let mut interim = TranscriptEvent {
            room: "team-sync".to_string(),
            sender: "A".to_string(),
            sender_id: "u1".to_string(),
            message: "partial".to_string(),
            is_final: false,
        };
        broker
            .publish("team-sync", &RoomEvent::Caption(interim.clone()))
            .await
            .unwrap();
        interim.is_final = true;
        broker
            .publish("team-sync", &RoomEvent::Caption(interim))
            .await
            .unwrap();
        settle().await;

        assert_eq!(queue.len(), 1);
        relay.leave();
    }

    #[tokio::test]
    async fn test_summary_ready_routes_to_notice_not_queue() {
        let broker: Arc<dyn EventBroker> = Arc::new(LocalBroker::new());
        let queue = CaptionQueue::default();
        let notice = SummaryNoticeHandle::default();
        let relay = RoomRelay::join(
            "team-sync",
            "u2",
            "Bea",
            broker.clone(),
            queue.clone(),
            notice.clone(),
        )
        .await
        .unwrap();

        broker
            .publish(
                "team-sync",
                &RoomEvent::SummaryReady(SummaryNotice {
                    room: "team-sync".to_string(),
                    url: "https://example.com/s".to_string(),
                }),
            )
            .await
            .unwrap();
        settle().await;

        assert!(queue.is_empty());
        let notice = notice.get().await.unwrap();
        assert_eq!(notice.url, "https://example.com/s");
        relay.leave();
    }

    #[tokio::test]
    async fn test_publish_transcript_carries_local_identity() {
        let broker: Arc<dyn EventBroker> = Arc::new(LocalBroker::new());
        let mut observer = broker.subscribe("team-sync").await.unwrap();
        let relay = RoomRelay::join(
            "team-sync",
            "u2",
            "Bea",
            broker.clone(),
            CaptionQueue::default(),
            SummaryNoticeHandle::default(),
        )
        .await
        .unwrap();

        relay.publish_transcript("hello").await.unwrap();

        let received = observer.recv().await.unwrap();
        match received {
            RoomEvent::Caption(event) => {
                assert_eq!(event.sender, "Bea");
                assert_eq!(event.sender_id, "u2");
                assert!(event.is_final);
            }
            other => panic!("expected caption, got {:?}", other),
        }
        relay.leave();
    }
}
