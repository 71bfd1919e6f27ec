//! Streaming speech recognition collaborator.
//!
//! One persistent bidirectional connection per capture session, keyed by
//! auth token and language selector. Audio goes out as fixed-interval
//! frames; structured recognition results come back with an interim/final
//! indicator.

mod socket_client;

pub use socket_client::AsrSocketClient;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;

/// One recognition alternative.
#[derive(Debug, Clone, Deserialize)]
pub struct Alternative {
    pub transcript: String,
}

/// A recognition result as delivered by the stream.
#[derive(Debug, Clone, Deserialize)]
pub struct RecognitionResult {
    #[serde(default)]
    pub alternatives: Vec<Alternative>,
    #[serde(default)]
    pub is_final: bool,
}

impl RecognitionResult {
    /// The top alternative's transcript. Empty and missing alternatives
    /// are dropped at this boundary.
    pub fn top_transcript(&self) -> Option<&str> {
        self.alternatives
            .first()
            .map(|alt| alt.transcript.as_str())
            .filter(|transcript| !transcript.is_empty())
    }
}

/// Audio half of a recognition stream, shareable with the chunk feeder.
pub trait SpeechSink: Send + Sync {
    /// Queue one chunk of mono f32 samples for the recognizer.
    fn push_chunk(&self, samples: Vec<f32>) -> Result<()>;
}

/// Recognition stream seam used by the capture session.
#[async_trait]
pub trait SpeechStream: Send {
    /// Handle for pushing audio from the chunk feeder task.
    fn sink(&self) -> std::sync::Arc<dyn SpeechSink>;

    /// Next recognition result; `None` once the stream has ended.
    async fn next_result(&mut self) -> Option<RecognitionResult>;
}
