//! Broadcast broker collaborators.
//!
//! `LocalBroker` keeps channels in-process (single-host deployments and
//! tests). `SocketBroker` speaks newline-delimited JSON frames to a broker
//! daemon over TCP and reconnects with bounded backoff, re-subscribing to
//! every active channel. Delivery is at-least-once, ordered per channel as
//! delivered by the broker — nothing stronger.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::BrokerConfig;
use crate::events::{RoomEvent, TRANSCRIBE_EVENT};
use crate::wire::{Backoff, ConnectionState};

/// A live room-channel subscription. Dropping it tears the subscription
/// down, so a left room never leaks one.
pub struct Subscription {
    receiver: mpsc::Receiver<RoomEvent>,
    teardown: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<RoomEvent> {
        self.receiver.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(teardown) = self.teardown.take() {
            teardown();
        }
    }
}

/// Pub/sub collaborator seam. One channel per room.
#[async_trait]
pub trait EventBroker: Send + Sync {
    async fn publish(&self, channel: &str, event: &RoomEvent) -> Result<()>;
    async fn subscribe(&self, channel: &str) -> Result<Subscription>;
}

type SubscriberMap = HashMap<String, Vec<(u64, mpsc::Sender<RoomEvent>)>>;

/// In-process broker backed by per-channel subscriber lists.
#[derive(Default, Clone)]
pub struct LocalBroker {
    channels: Arc<StdMutex<SubscriberMap>>,
    next_id: Arc<AtomicU64>,
}

impl LocalBroker {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventBroker for LocalBroker {
    async fn publish(&self, channel: &str, event: &RoomEvent) -> Result<()> {
        let senders: Vec<mpsc::Sender<RoomEvent>> = {
            let channels = self.channels.lock().unwrap();
            channels
                .get(channel)
                .map(|subs| subs.iter().map(|(_, tx)| tx.clone()).collect())
                .unwrap_or_default()
        };

        for sender in senders {
            // A dropped receiver just falls out of the map on teardown.
            let _ = sender.send(event.clone()).await;
        }
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription> {
        let (tx, rx) = mpsc::channel(256);
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);

        {
            let mut channels = self.channels.lock().unwrap();
            channels.entry(channel.to_string()).or_default().push((id, tx));
        }

        let channels = self.channels.clone();
        let channel_name = channel.to_string();
        Ok(Subscription {
            receiver: rx,
            teardown: Some(Box::new(move || {
                let mut channels = channels.lock().unwrap();
                if let Some(subs) = channels.get_mut(&channel_name) {
                    subs.retain(|(sub_id, _)| *sub_id != id);
                    if subs.is_empty() {
                        channels.remove(&channel_name);
                    }
                }
            })),
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum OutboundFrame<'a> {
    Subscribe {
        channel: &'a str,
    },
    Unsubscribe {
        channel: &'a str,
    },
    Publish {
        channel: &'a str,
        event: &'a str,
        data: &'a RoomEvent,
    },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum InboundFrame {
    Message {
        channel: String,
        event: String,
        data: serde_json::Value,
    },
}

enum Command {
    Write(String),
    Subscribe {
        channel: String,
        id: u64,
        sender: mpsc::Sender<RoomEvent>,
    },
    Unsubscribe {
        channel: String,
        id: u64,
    },
}

/// TCP broker client. All socket traffic runs in one actor task; the
/// handle side only enqueues commands.
pub struct SocketBroker {
    commands: mpsc::UnboundedSender<Command>,
    next_id: AtomicU64,
}

impl SocketBroker {
    pub fn new(config: &BrokerConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let endpoint = config.endpoint.clone();
        let connect_timeout = Duration::from_secs(config.connect_timeout_seconds);
        tokio::spawn(async move {
            actor_loop(endpoint, connect_timeout, rx).await;
        });

        Self {
            commands: tx,
            next_id: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl EventBroker for SocketBroker {
    async fn publish(&self, channel: &str, event: &RoomEvent) -> Result<()> {
        let frame = serde_json::to_string(&OutboundFrame::Publish {
            channel,
            event: TRANSCRIBE_EVENT,
            data: event,
        })
        .context("Failed to encode publish frame")?;

        self.commands
            .send(Command::Write(frame))
            .map_err(|_| anyhow::anyhow!("Broker connection task is gone"))
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription> {
        let (tx, rx) = mpsc::channel(256);
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);

        self.commands
            .send(Command::Subscribe {
                channel: channel.to_string(),
                id,
                sender: tx,
            })
            .map_err(|_| anyhow::anyhow!("Broker connection task is gone"))?;

        let commands = self.commands.clone();
        let channel_name = channel.to_string();
        Ok(Subscription {
            receiver: rx,
            teardown: Some(Box::new(move || {
                let _ = commands.send(Command::Unsubscribe {
                    channel: channel_name,
                    id,
                });
            })),
        })
    }
}

async fn actor_loop(
    endpoint: String,
    connect_timeout: Duration,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    let initial_backoff = Duration::from_millis(500);
    let mut backoff = Backoff::new(initial_backoff, Duration::from_secs(30));
    let mut subscribers: SubscriberMap = HashMap::new();
    let mut state = ConnectionState::Connecting;

    loop {
        debug!("Broker connection state: {}", state.as_str());
        let stream = match tokio::time::timeout(connect_timeout, TcpStream::connect(&endpoint)).await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                state = ConnectionState::Errored;
                let delay = backoff.next_delay();
                warn!(
                    "Broker connect to {} failed: {} (retrying in {:?})",
                    endpoint, e, delay
                );
                tokio::time::sleep(delay).await;
                continue;
            }
            Err(_) => {
                state = ConnectionState::Errored;
                let delay = backoff.next_delay();
                warn!("Broker connect to {} timed out (retrying in {:?})", endpoint, delay);
                tokio::time::sleep(delay).await;
                continue;
            }
        };

        if let Err(e) = stream.set_nodelay(true) {
            debug!("Could not set nodelay on broker socket: {}", e);
        }

        state = ConnectionState::Open;
        backoff.reset(initial_backoff);
        info!("Connected to broker at {}", endpoint);

        let (read_half, mut write_half) = stream.into_split();

        // Re-establish every active channel after a reconnect.
        let mut resubscribe_failed = false;
        for channel in subscribers.keys() {
            if write_frame(&mut write_half, &OutboundFrame::Subscribe { channel })
                .await
                .is_err()
            {
                resubscribe_failed = true;
                break;
            }
        }
        if resubscribe_failed {
            state = ConnectionState::Errored;
            tokio::time::sleep(backoff.next_delay()).await;
            continue;
        }

        // Socket reads live in their own task: selecting directly on
        // read_line would lose partial frames when a command wins the race.
        let (line_tx, mut line_rx) = mpsc::channel::<String>(64);
        let reader_task = tokio::spawn(read_lines(read_half, line_tx));

        loop {
            tokio::select! {
                command = commands.recv() => {
                    match command {
                        Some(Command::Write(frame)) => {
                            if let Err(e) = write_line(&mut write_half, &frame).await {
                                error!("Broker write failed: {}", e);
                                state = ConnectionState::Errored;
                                break;
                            }
                        }
                        Some(Command::Subscribe { channel, id, sender }) => {
                            let first = !subscribers.contains_key(&channel);
                            subscribers.entry(channel.clone()).or_default().push((id, sender));
                            if first {
                                if let Err(e) = write_frame(
                                    &mut write_half,
                                    &OutboundFrame::Subscribe { channel: &channel },
                                ).await {
                                    error!("Broker subscribe failed: {}", e);
                                    state = ConnectionState::Errored;
                                    break;
                                }
                            }
                        }
                        Some(Command::Unsubscribe { channel, id }) => {
                            let mut last = false;
                            if let Some(subs) = subscribers.get_mut(&channel) {
                                subs.retain(|(sub_id, _)| *sub_id != id);
                                if subs.is_empty() {
                                    subscribers.remove(&channel);
                                    last = true;
                                }
                            }
                            if last {
                                if let Err(e) = write_frame(
                                    &mut write_half,
                                    &OutboundFrame::Unsubscribe { channel: &channel },
                                ).await {
                                    error!("Broker unsubscribe failed: {}", e);
                                    state = ConnectionState::Errored;
                                    break;
                                }
                            }
                        }
                        None => {
                            info!("Broker handle dropped, closing connection");
                            reader_task.abort();
                            return;
                        }
                    }
                }
                line = line_rx.recv() => {
                    match line {
                        Some(line) => dispatch_line(&line, &mut subscribers).await,
                        None => {
                            info!("Broker connection closed");
                            state = ConnectionState::Closed;
                            break;
                        }
                    }
                }
            }
        }

        reader_task.abort();
    }
}

async fn read_lines(read_half: tokio::net::tcp::OwnedReadHalf, line_tx: mpsc::Sender<String>) {
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break,
            Ok(_) => {
                if line_tx.send(line.clone()).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                error!("Error reading from broker: {}", e);
                break;
            }
        }
    }
}

async fn dispatch_line(line: &str, subscribers: &mut SubscriberMap) {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return;
    }

    let frame: InboundFrame = match serde_json::from_str(trimmed) {
        Ok(frame) => frame,
        Err(e) => {
            warn!("Failed to parse broker frame: {} ({})", e, trimmed);
            return;
        }
    };

    let InboundFrame::Message {
        channel,
        event,
        data,
    } = frame;

    if event != TRANSCRIBE_EVENT {
        debug!("Ignoring broker event '{}'", event);
        return;
    }

    let room_event: RoomEvent = match serde_json::from_value(data) {
        Ok(event) => event,
        Err(e) => {
            warn!("Failed to decode room event payload: {}", e);
            return;
        }
    };

    if let Some(subs) = subscribers.get_mut(&channel) {
        let mut closed = Vec::new();
        for (id, sender) in subs.iter() {
            if sender.send(room_event.clone()).await.is_err() {
                closed.push(*id);
            }
        }
        subs.retain(|(id, _)| !closed.contains(id));
    }
}

async fn write_frame(
    write_half: &mut tokio::net::tcp::OwnedWriteHalf,
    frame: &OutboundFrame<'_>,
) -> Result<()> {
    let encoded = serde_json::to_string(frame).context("Failed to encode broker frame")?;
    write_line(write_half, &encoded).await
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
