//! Local audio capture for the caption pipeline.
//!
//! A chunk source delivers fixed-interval mono sample chunks for the
//! recognition stream. The cpal stream lives on its own thread because it
//! is not `Send`; only the chunk channel crosses into async land.

mod mic_source;

pub use mic_source::MicChunkSource;

use anyhow::Result;
use std::time::Duration;
use tokio::sync::mpsc;

/// Source of fixed-interval audio chunks (microphone, loopback, etc.).
///
/// An unsupported device or sample format is fatal to the capture session
/// and surfaces from `start` immediately.
pub trait ChunkSource: Send {
    /// Begin capturing; chunks arrive on the returned channel every
    /// `interval` until `stop`.
    fn start(&mut self, interval: Duration) -> Result<mpsc::Receiver<Vec<f32>>>;

    /// Stop capturing and release the device.
    fn stop(&mut self);

    fn is_active(&self) -> bool;

    fn sample_rate(&self) -> u32;
}
