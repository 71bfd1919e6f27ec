//! TCP client for the streaming recognition server.
//!
//! Speaks newline-delimited JSON: a start frame carrying the auth token and
//! language selector, then base64 audio frames outbound and recognition
//! results inbound. The connection lives in one actor task and reconnects
//! with bounded backoff; audio produced while disconnected is dropped, not
//! buffered — captions are live or not at all.

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::{RecognitionResult, SpeechSink, SpeechStream};
use crate::config::AsrConfig;
use crate::wire::{Backoff, ConnectionState};

#[derive(Debug, Serialize)]
struct StartFrame<'a> {
    token: Option<&'a str>,
    language: &'a str,
}

#[derive(Debug, Serialize)]
struct AudioFrame {
    audio: String,
}

#[derive(Debug, Deserialize)]
struct ResultFrame {
    channel: Option<ResultChannel>,
    #[serde(default)]
    is_final: bool,
}

#[derive(Debug, Deserialize)]
struct ResultChannel {
    #[serde(default)]
    alternatives: Vec<super::Alternative>,
}

pub struct AsrSocketClient {
    audio_tx: mpsc::Sender<Vec<f32>>,
    results_rx: mpsc::Receiver<RecognitionResult>,
}

impl AsrSocketClient {
    /// Open a recognition stream for one capture session.
    pub fn connect(config: &AsrConfig, language: &str) -> Self {
        let (audio_tx, audio_rx) = mpsc::channel(16);
        let (results_tx, results_rx) = mpsc::channel(64);

        let endpoint = config.endpoint.clone();
        let token = config.token.clone();
        let language = language.to_string();
        let connect_timeout = Duration::from_secs(config.connect_timeout_seconds);

        tokio::spawn(async move {
            actor_loop(
                endpoint,
                token,
                language,
                connect_timeout,
                audio_rx,
                results_tx,
            )
            .await;
        });

        Self {
            audio_tx,
            results_rx,
        }
    }

    fn encode_chunk(samples: &[f32]) -> String {
        // Mono 16-bit little-endian, the recognizer's native sample format.
        let mut bytes = Vec::with_capacity(samples.len() * 2);
        for &sample in samples {
            let clamped = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            bytes.extend_from_slice(&clamped.to_le_bytes());
        }
        BASE64.encode(&bytes)
    }
}

struct AsrSink {
    audio_tx: mpsc::Sender<Vec<f32>>,
}

impl SpeechSink for AsrSink {
    fn push_chunk(&self, samples: Vec<f32>) -> Result<()> {
        self.audio_tx
            .try_send(samples)
            .context("Recognition stream is not accepting audio")
    }
}

#[async_trait]
impl SpeechStream for AsrSocketClient {
    fn sink(&self) -> std::sync::Arc<dyn SpeechSink> {
        std::sync::Arc::new(AsrSink {
            audio_tx: self.audio_tx.clone(),
        })
    }

    async fn next_result(&mut self) -> Option<RecognitionResult> {
        self.results_rx.recv().await
    }
}

async fn actor_loop(
    endpoint: String,
    token: Option<String>,
    language: String,
    connect_timeout: Duration,
    mut audio_rx: mpsc::Receiver<Vec<f32>>,
    results_tx: mpsc::Sender<RecognitionResult>,
) {
    let initial_backoff = Duration::from_millis(500);
    let mut backoff = Backoff::new(initial_backoff, Duration::from_secs(15));
    let mut state = ConnectionState::Connecting;

    loop {
        debug!("Recognition stream state: {}", state.as_str());
        let stream = match tokio::time::timeout(connect_timeout, TcpStream::connect(&endpoint)).await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                state = ConnectionState::Errored;
                let delay = backoff.next_delay();
                warn!(
                    "Recognition connect to {} failed: {} (retrying in {:?})",
                    endpoint, e, delay
                );
                drain_audio(&mut audio_rx);
                tokio::time::sleep(delay).await;
                continue;
            }
            Err(_) => {
                state = ConnectionState::Errored;
                let delay = backoff.next_delay();
                warn!(
                    "Recognition connect to {} timed out (retrying in {:?})",
                    endpoint, delay
                );
                drain_audio(&mut audio_rx);
                tokio::time::sleep(delay).await;
                continue;
            }
        };

        if let Err(e) = stream.set_nodelay(true) {
            debug!("Could not set nodelay on recognition socket: {}", e);
        }

        let (read_half, mut write_half) = stream.into_split();

        let start = match serde_json::to_string(&StartFrame {
            token: token.as_deref(),
            language: &language,
        }) {
            Ok(frame) => frame,
            Err(e) => {
                error!("Failed to encode recognition start frame: {}", e);
                return;
            }
        };
        if let Err(e) = write_line(&mut write_half, &start).await {
            state = ConnectionState::Errored;
            warn!("Recognition handshake failed: {}", e);
            tokio::time::sleep(backoff.next_delay()).await;
            continue;
        }

        state = ConnectionState::Open;
        backoff.reset(initial_backoff);
        info!(
            "Recognition stream open to {} (language '{}')",
            endpoint, language
        );

        // Results are read in their own task: selecting directly on
        // read_line would lose partial frames when an audio chunk wins
        // the race.
        let mut reader_task = tokio::spawn(read_results(read_half, results_tx.clone()));

        loop {
            tokio::select! {
                chunk = audio_rx.recv() => {
                    match chunk {
                        Some(samples) => {
                            let frame = AudioFrame {
                                audio: AsrSocketClient::encode_chunk(&samples),
                            };
                            let encoded = match serde_json::to_string(&frame) {
                                Ok(encoded) => encoded,
                                Err(e) => {
                                    error!("Failed to encode audio frame: {}", e);
                                    continue;
                                }
                            };
                            if let Err(e) = write_line(&mut write_half, &encoded).await {
                                error!("Recognition stream write failed: {}", e);
                                state = ConnectionState::Errored;
                                break;
                            }
                        }
                        None => {
                            info!("Capture side closed, shutting down recognition stream");
                            reader_task.abort();
                            return;
                        }
                    }
                }
                _ = &mut reader_task => {
                    info!("Recognition stream closed by server");
                    state = ConnectionState::Closed;
                    break;
                }
            }
        }

        reader_task.abort();
    }
}

async fn read_results(
    read_half: tokio::net::tcp::OwnedReadHalf,
    results_tx: mpsc::Sender<RecognitionResult>,
) {
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break,
            Ok(_) => {
                if let Some(result) = parse_result(&line) {
                    if results_tx.send(result).await.is_err() {
                        debug!("Result receiver dropped, stopping recognition reads");
                        break;
                    }
                }
            }
            Err(e) => {
                error!("Error reading from recognition stream: {}", e);
                break;
            }
        }
    }
}

fn parse_result(line: &str) -> Option<RecognitionResult> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    match serde_json::from_str::<ResultFrame>(trimmed) {
        Ok(frame) => Some(RecognitionResult {
            alternatives: frame.channel.map(|c| c.alternatives).unwrap_or_default(),
            is_final: frame.is_final,
        }),
        Err(e) => {
            warn!("Failed to parse recognition frame: {} ({})", e, trimmed);
            None
        }
    }
}

fn drain_audio(audio_rx: &mut mpsc::Receiver<Vec<f32>>) {
    // Live audio is worthless once stale; drop whatever queued up while
    // the connection was down.
    while audio_rx.try_recv().is_ok() {}
}

async fn write_line(
    write_half: &mut tokio::net::tcp::OwnedWriteHalf,
    frame: &str,
) -> Result<()> {
    write_half.write_all(frame.as_bytes()).await?;
    write_half.write_all(b"\n").await?;
    write_half.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_result_extracts_alternatives() {
        let line = r#"{"channel":{"alternatives":[{"transcript":"hello"}]},"is_final":true}"#;
        let result = parse_result(line).unwrap();
        assert_eq!(result.top_transcript(), Some("hello"));
        assert!(result.is_final);
    }

    #[test]
    fn test_parse_result_tolerates_missing_channel() {
        let result = parse_result(r#"{"is_final":false}"#).unwrap();
        assert_eq!(result.top_transcript(), None);
        assert!(!result.is_final);
    }

    #[test]
    fn test_parse_result_skips_blank_and_garbage_lines() {
        assert!(parse_result("").is_none());
        assert!(parse_result("   ").is_none());
        assert!(parse_result("not json").is_none());
    }

    #[test]
    fn test_encode_chunk_is_16_bit_little_endian() {
        let encoded = AsrSocketClient::encode_chunk(&[0.0, 1.0, -1.0]);
        let bytes = BASE64.decode(encoded).unwrap();
        assert_eq!(bytes.len(), 6);
        assert_eq!(&bytes[0..2], &0i16.to_le_bytes());
        assert_eq!(&bytes[2..4], &i16::MAX.to_le_bytes());
    }
}
