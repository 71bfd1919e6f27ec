//! Speech capture session.
//!
//! Feeds local audio chunks to the recognition stream and turns accepted
//! final transcripts into room events: relayed to other participants,
//! appended to the session transcript log, and displayed locally through
//! the caption queue (label "You"). The session never writes caption state
//! directly.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::asr::SpeechStream;
use crate::captions::queue::{CaptionQueue, QueueEntry};
use crate::events::TranscriptEvent;
use crate::relay::RoomRelay;
use crate::translation::primary_subtag;

/// Chronological log of this session's accepted transcripts, consumed by
/// the closure pipeline at meeting end.
#[derive(Clone, Default)]
pub struct TranscriptLog {
    inner: Arc<Mutex<Vec<String>>>,
}

impl TranscriptLog {
    pub fn append(&self, line: &str) {
        self.inner.lock().unwrap().push(line.to_string());
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.inner.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Session parameters for one room's capture.
#[derive(Debug, Clone)]
pub struct CaptureOptions {
    pub room: String,
    pub local_participant: String,
    /// Language selector the stream was opened with ("en-US").
    pub language: String,
    /// Isolated utterances suppressed from local display only.
    pub filler_words: Vec<String>,
}

/// A running capture session. Stopping it ends the recognition stream.
pub struct CaptureSession {
    feeder_task: JoinHandle<()>,
    result_task: JoinHandle<()>,
}

impl CaptureSession {
    /// Wire the chunk channel into the recognition stream and start
    /// processing results.
    pub fn start(
        mut stream: Box<dyn SpeechStream>,
        mut chunks: mpsc::Receiver<Vec<f32>>,
        relay: Arc<RoomRelay>,
        queue: CaptionQueue,
        log: TranscriptLog,
        options: CaptureOptions,
    ) -> Self {
        let sink = stream.sink();
        let feeder_task = tokio::spawn(async move {
            while let Some(samples) = chunks.recv().await {
                if let Err(e) = sink.push_chunk(samples) {
                    // Transport-side hiccup; the stream reconnects on
                    // its own.
                    warn!("Audio chunk not delivered: {}", e);
                }
            }
            info!("Audio source closed, ending capture feed");
        });

        let result_task = tokio::spawn(async move {
            let mut relayed: HashSet<String> = HashSet::new();

            while let Some(result) = stream.next_result().await {
                if !result.is_final {
                    debug!("Skipping interim recognition result");
                    continue;
                }
                let Some(transcript) = result.top_transcript() else {
                    continue;
                };
                handle_transcript(transcript, &mut relayed, &relay, &queue, &log, &options)
                    .await;
            }
            info!("Recognition stream ended, ending capture session");
        });

        Self {
            feeder_task,
            result_task,
        }
    }

    pub fn stop(&self) {
        self.feeder_task.abort();
        self.result_task.abort();
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn handle_transcript(
    transcript: &str,
    relayed: &mut HashSet<String>,
    relay: &RoomRelay,
    queue: &CaptionQueue,
    log: &TranscriptLog,
    options: &CaptureOptions,
) {
    // The provider re-delivers finals now and then; exact repeats are
    // already on the wire and must not go out twice.
    if relayed.contains(transcript) {
        debug!("Duplicate final transcript suppressed: {}", transcript);
        return;
    }

    if let Err(e) = relay.publish_transcript(transcript).await {
        warn!("Failed to relay transcript: {}", e);
    }
    relayed.insert(transcript.to_string());
    log.append(transcript);

    // Filler suppression affects local display only; the transcript has
    // already been relayed and logged above.
    if is_filler(transcript, &options.filler_words) {
        debug!("Filler utterance not displayed locally: {}", transcript);
        return;
    }

    queue.enqueue(QueueEntry {
        event: TranscriptEvent {
            room: options.room.clone(),
            sender: "You".to_string(),
            sender_id: options.local_participant.clone(),
            message: transcript.to_string(),
            is_final: true,
        },
        // Own speech is already in the viewer's language; the queue
        // worker skips translation for it.
        source_lang: Some(primary_subtag(&options.language).to_string()),
    });
}

/// Whether `transcript` is an isolated filler utterance.
fn is_filler(transcript: &str, filler_words: &[String]) -> bool {
    let trimmed = transcript.trim();
    filler_words
        .iter()
        .any(|filler| filler.eq_ignore_ascii_case(trimmed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asr::{Alternative, RecognitionResult, SpeechStream};
    use crate::relay::broker::{EventBroker, LocalBroker};
    use crate::relay::SummaryNoticeHandle;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::time::Duration;

    struct NullSink;

    impl crate::asr::SpeechSink for NullSink {
        fn push_chunk(&self, _samples: Vec<f32>) -> Result<()> {
            Ok(())
        }
    }

    struct ScriptedStream {
        results: VecDeque<RecognitionResult>,
    }

    impl ScriptedStream {
        fn new(results: Vec<RecognitionResult>) -> Self {
            Self {
                results: results.into(),
            }
        }
    }

    #[async_trait]
    impl SpeechStream for ScriptedStream {
        fn sink(&self) -> Arc<dyn crate::asr::SpeechSink> {
            Arc::new(NullSink)
        }

        async fn next_result(&mut self) -> Option<RecognitionResult> {
            match self.results.pop_front() {
                Some(result) => Some(result),
                None => {
                    // Keep the session alive once the script runs out.
                    std::future::pending().await
                }
            }
        }
    }

    fn final_result(transcript: &str) -> RecognitionResult {
        RecognitionResult {
            alternatives: vec![Alternative {
                transcript: transcript.to_string(),
            }],
            is_final: true,
        }
    }

    fn options() -> CaptureOptions {
        CaptureOptions {
            room: "team-sync".to_string(),
            local_participant: "u1".to_string(),
            language: "en-US".to_string(),
            filler_words: vec!["is".to_string(), "so".to_string()],
        }
    }

    struct SessionFixture {
        queue: CaptionQueue,
        log: TranscriptLog,
        session: CaptureSession,
        _chunk_tx: mpsc::Sender<Vec<f32>>,
    }

    async fn run_session(results: Vec<RecognitionResult>) -> SessionFixture {
        let broker: Arc<dyn EventBroker> = Arc::new(LocalBroker::new());
        let queue = CaptionQueue::default();
        let log = TranscriptLog::default();
        let relay = Arc::new(
            RoomRelay::join(
                "team-sync",
                "u1",
                "Ada",
                broker.clone(),
                CaptionQueue::default(),
                SummaryNoticeHandle::default(),
            )
            .await
            .unwrap(),
        );

        let (chunk_tx, chunk_rx) = mpsc::channel(8);

        let session = CaptureSession::start(
            Box::new(ScriptedStream::new(results)),
            chunk_rx,
            relay,
            queue.clone(),
            log.clone(),
            options(),
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        SessionFixture {
            queue,
            log,
            session,
            _chunk_tx: chunk_tx,
        }
    }

    #[tokio::test]
    async fn test_accepted_transcript_is_relayed_logged_and_displayed() {
        let fixture = run_session(vec![final_result("hello world")]).await;

        assert_eq!(fixture.log.snapshot(), vec!["hello world"]);
        assert_eq!(fixture.queue.len(), 1);
        fixture.session.stop();
    }

    #[tokio::test]
    async fn test_duplicate_finals_are_suppressed() {
        let fixture = run_session(vec![
            final_result("same line"),
            final_result("same line"),
            final_result("next line"),
        ])
        .await;

        assert_eq!(fixture.log.snapshot(), vec!["same line", "next line"]);
        assert_eq!(fixture.queue.len(), 2);
        fixture.session.stop();
    }

    #[tokio::test]
    async fn test_interim_results_are_skipped() {
        let mut interim = final_result("half a tho");
        interim.is_final = false;

        let fixture = run_session(vec![interim, final_result("half a thought finished")]).await;

        assert_eq!(fixture.log.len(), 1);
        assert_eq!(fixture.queue.len(), 1);
        fixture.session.stop();
    }

    #[tokio::test]
    async fn test_empty_alternatives_are_dropped() {
        let fixture = run_session(vec![
            RecognitionResult {
                alternatives: Vec::new(),
                is_final: true,
            },
            final_result(""),
        ])
        .await;

        assert!(fixture.log.is_empty());
        assert!(fixture.queue.is_empty());
        fixture.session.stop();
    }

    #[tokio::test]
    async fn test_filler_is_relayed_but_not_displayed() {
        let fixture = run_session(vec![final_result("so")]).await;

        // Still logged and relayed, just never shown locally.
        assert_eq!(fixture.log.snapshot(), vec!["so"]);
        assert!(fixture.queue.is_empty());
        fixture.session.stop();
    }

    #[test]
    fn test_is_filler_checks_current_transcript_exactly() {
        let fillers = vec!["is".to_string(), "so".to_string()];
        assert!(is_filler("is", &fillers));
        assert!(is_filler(" So ", &fillers));
        assert!(!is_filler("so it begins", &fillers));
        assert!(!is_filler("", &fillers));
    }
}
