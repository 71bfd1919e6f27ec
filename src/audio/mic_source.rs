//! Microphone chunk capture via cpal.

use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::ChunkSource;

pub struct MicChunkSource {
    sample_rate: u32,
    running: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl MicChunkSource {
    /// Create a mic source targeting the given sample rate (the
    /// recognizer's native rate, typically 16000).
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            running: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }
}

impl ChunkSource for MicChunkSource {
    fn start(&mut self, interval: Duration) -> Result<mpsc::Receiver<Vec<f32>>> {
        if self.running.load(Ordering::SeqCst) {
            anyhow::bail!("Mic source already capturing");
        }

        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .context("No input device available for caption capture")?;

        info!(
            "Caption capture using device: {}",
            device.name().unwrap_or_else(|_| "unknown".to_string())
        );

        let config = cpal::StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(self.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let (chunk_tx, chunk_rx) = mpsc::channel(8);
        // Stream construction happens on the capture thread (cpal streams
        // are not Send); the handshake channel surfaces unsupported-device
        // errors to the caller synchronously.
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<()>>();

        self.running.store(true, Ordering::SeqCst);
        let running = self.running.clone();

        let thread = std::thread::spawn(move || {
            let samples: Arc<Mutex<Vec<f32>>> = Arc::new(Mutex::new(Vec::new()));
            let callback_samples = samples.clone();
            let err_fn = |err| error!("Caption capture stream error: {}", err);

            let stream = match device.build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut samples) = callback_samples.lock() {
                        samples.extend_from_slice(data);
                    }
                },
                err_fn,
                None,
            ) {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = ready_tx.send(Err(anyhow::anyhow!(
                        "Unsupported audio device or format: {}",
                        e
                    )));
                    running.store(false, Ordering::SeqCst);
                    return;
                }
            };

            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(anyhow::anyhow!(
                    "Failed to start audio capture: {}",
                    e
                )));
                running.store(false, Ordering::SeqCst);
                return;
            }
            let _ = ready_tx.send(Ok(()));

            while running.load(Ordering::SeqCst) {
                std::thread::sleep(interval);
                let chunk = {
                    let mut samples = samples.lock().unwrap();
                    std::mem::take(&mut *samples)
                };
                if chunk.is_empty() {
                    continue;
                }
                if chunk_tx.blocking_send(chunk).is_err() {
                    debug!("Chunk receiver dropped, stopping capture thread");
                    break;
                }
            }

            drop(stream);
            running.store(false, Ordering::SeqCst);
            debug!("Caption capture thread exiting");
        });

        ready_rx
            .recv()
            .context("Capture thread died before reporting readiness")??;

        self.thread = Some(thread);
        info!("Caption capture started ({} Hz)", self.sample_rate);
        Ok(chunk_rx)
    }

    fn stop(&mut self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        info!("Caption capture stopped");
    }

    fn is_active(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl Drop for MicChunkSource {
    fn drop(&mut self) {
        if self.is_active() {
            debug!("Dropping active MicChunkSource, cleaning up");
            self.stop();
        }
    }
}
