//! Service wiring and the room command loop.
//!
//! Builds every collaborator from config, starts the control API, and
//! drives join/leave commands. The leave handler tears the room down,
//! runs the closure pipeline to its terminal state, and completes
//! regardless of how that run ended.

use crate::api::{ApiCommand, ApiServer};
use crate::asr::AsrSocketClient;
use crate::audio::{ChunkSource, MicChunkSource};
use crate::capture::{CaptureOptions, CaptureSession, TranscriptLog};
use crate::captions::{CaptionHandle, CaptionQueue};
use crate::closure::{
    ClosureOrchestrator, ClosureStatus, ClosureStatusHandle, Summarizer, SummarizerHandle,
};
use crate::config::Config;
use crate::directory::{FileDirectory, ParticipantDirectory};
use crate::email::{HttpMailer, SummaryMailer};
use crate::global;
use crate::relay::broker::{EventBroker, LocalBroker, SocketBroker};
use crate::relay::{RoomRelay, SummaryNoticeHandle};
use crate::storage::{ArtifactStore, ObjectStoreClient};
use crate::translation::{primary_subtag, HttpTranslator, Translator};
use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Recognition sample rate expected by the streaming recognizer.
const CAPTURE_SAMPLE_RATE: u32 = 16_000;

/// Read view of one joined room, shared with API handlers.
#[derive(Clone)]
pub struct RoomView {
    pub caption: CaptionHandle,
    pub notice: SummaryNoticeHandle,
}

/// Rooms currently joined, keyed by room name.
#[derive(Clone, Default)]
pub struct RoomRegistry {
    inner: Arc<Mutex<HashMap<String, RoomView>>>,
}

impl RoomRegistry {
    pub async fn insert(&self, room: &str, view: RoomView) {
        self.inner.lock().await.insert(room.to_string(), view);
    }

    pub async fn remove(&self, room: &str) {
        self.inner.lock().await.remove(room);
    }

    pub async fn get(&self, room: &str) -> Option<RoomView> {
        self.inner.lock().await.get(room).cloned()
    }

    pub async fn rooms(&self) -> Vec<String> {
        let mut rooms: Vec<String> = self.inner.lock().await.keys().cloned().collect();
        rooms.sort();
        rooms
    }
}

struct RoomSession {
    relay: Arc<RoomRelay>,
    capture: CaptureSession,
    mic: MicChunkSource,
    worker: JoinHandle<()>,
    log: TranscriptLog,
}

pub async fn run_service() -> Result<()> {
    info!("Starting VoxBridge service");

    let config = Config::load()?;

    let broker: Arc<dyn EventBroker> = if config.broker.endpoint.is_empty() {
        info!("No broker endpoint configured, using in-process broker");
        Arc::new(LocalBroker::new())
    } else {
        Arc::new(SocketBroker::new(&config.broker))
    };

    let translator: Arc<dyn Translator> = Arc::new(HttpTranslator::new(&config.translation)?);
    let summarizer: Arc<dyn Summarizer> =
        Arc::new(SummarizerHandle::new(config.summarizer.clone()));
    let store: Arc<dyn ArtifactStore> = Arc::new(ObjectStoreClient::new(&config.storage)?);
    let mailer: Arc<dyn SummaryMailer> = Arc::new(HttpMailer::new(&config.email)?);

    let roster_path = match &config.directory.participants_file {
        Some(path) => path.clone(),
        None => global::participants_file()?,
    };
    let directory: Arc<dyn ParticipantDirectory> = Arc::new(FileDirectory::new(roster_path));

    let closure_status = ClosureStatusHandle::default();
    let orchestrator = ClosureOrchestrator::new(
        summarizer,
        store,
        broker.clone(),
        mailer,
        directory,
        config.storage.link_ttl_seconds,
        closure_status.clone(),
    );

    let registry = RoomRegistry::default();
    let (tx, mut rx) = mpsc::channel::<ApiCommand>(10);

    let api_server = ApiServer::new(tx, registry.clone(), closure_status.clone(), &config);
    tokio::spawn(async move {
        if let Err(e) = api_server.start().await {
            error!("API server failed: {}", e);
        }
    });

    let mut service = RoomService {
        config,
        broker,
        translator,
        orchestrator,
        registry,
        sessions: HashMap::new(),
    };

    info!("VoxBridge is ready!");
    info!(
        "Join a room with: curl -X POST http://127.0.0.1:{}/join -H 'Content-Type: application/json' -d '{{\"room\":\"my-room\"}}'",
        service.config.api.port
    );

    while let Some(command) = rx.recv().await {
        match command {
            ApiCommand::Join { room, respond } => {
                let result = service.join(&room).await;
                if let Err(e) = &result {
                    error!("Failed to join room '{}': {}", room, e);
                }
                let _ = respond.send(result.map_err(|e| e.to_string()));
            }
            ApiCommand::Leave { room, respond } => {
                let result = service.leave(&room).await;
                if let Err(e) = &result {
                    warn!("Failed to leave room '{}': {}", room, e);
                }
                let _ = respond.send(result.map_err(|e| e.to_string()));
            }
        }
    }

    Ok(())
}

struct RoomService {
    config: Config,
    broker: Arc<dyn EventBroker>,
    translator: Arc<dyn Translator>,
    orchestrator: ClosureOrchestrator,
    registry: RoomRegistry,
    sessions: HashMap<String, RoomSession>,
}

impl RoomService {
    async fn join(&mut self, room: &str) -> Result<()> {
        if self.sessions.contains_key(room) {
            bail!("Already joined room '{}'", room);
        }

        let session_config = &self.config.session;
        let participant_id = if session_config.participant_id.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            session_config.participant_id.clone()
        };
        let display_name = if session_config.display_name.is_empty() {
            "Guest".to_string()
        } else {
            session_config.display_name.clone()
        };
        let display_lang = primary_subtag(&session_config.language).to_string();

        let queue = CaptionQueue::default();
        let caption = CaptionHandle::default();
        let notice = SummaryNoticeHandle::default();

        let worker = queue.spawn_worker(
            caption.clone(),
            self.translator.clone(),
            display_lang,
            Duration::from_secs(self.config.captions.display_seconds),
        );

        let relay = match RoomRelay::join(
            room,
            &participant_id,
            &display_name,
            self.broker.clone(),
            queue.clone(),
            notice.clone(),
        )
        .await
        {
            Ok(relay) => Arc::new(relay),
            Err(e) => {
                worker.abort();
                return Err(e).context("Failed to subscribe to room channel");
            }
        };

        // Unsupported devices surface here and abort the join; nothing is
        // left half-started.
        let mut mic = MicChunkSource::new(CAPTURE_SAMPLE_RATE);
        let chunks = match mic.start(Duration::from_millis(self.config.asr.chunk_millis)) {
            Ok(chunks) => chunks,
            Err(e) => {
                worker.abort();
                relay.leave();
                return Err(e).context("Failed to start audio capture");
            }
        };

        let stream = AsrSocketClient::connect(&self.config.asr, &session_config.language);
        let log = TranscriptLog::default();
        let capture = CaptureSession::start(
            Box::new(stream),
            chunks,
            relay.clone(),
            queue.clone(),
            log.clone(),
            CaptureOptions {
                room: room.to_string(),
                local_participant: participant_id,
                language: session_config.language.clone(),
                filler_words: self.config.captions.filler_words.clone(),
            },
        );

        self.registry
            .insert(room, RoomView { caption, notice })
            .await;
        self.sessions.insert(
            room.to_string(),
            RoomSession {
                relay,
                capture,
                mic,
                worker,
                log,
            },
        );

        info!("Joined room '{}'", room);
        Ok(())
    }

    /// Leave the room and run the closure pipeline. Closure failures are
    /// reported through the status handle, never from this function —
    /// teardown always completes.
    async fn leave(&mut self, room: &str) -> Result<()> {
        let Some(mut session) = self.sessions.remove(room) else {
            bail!("Not joined to room '{}'", room);
        };

        session.capture.stop();
        session.mic.stop();
        session.worker.abort();
        session.relay.leave();
        self.registry.remove(room).await;

        let transcript_log = session.log.snapshot();
        let report = self.orchestrator.run(room, transcript_log).await;
        match &report.outcome {
            ClosureStatus::Done => {
                info!(
                    "Left room '{}', summary available at {}",
                    room,
                    report.signed_url.as_deref().unwrap_or("<missing>")
                );
            }
            ClosureStatus::Failed { stage, reason } => {
                warn!(
                    "Left room '{}' without a summary ({} failed: {})",
                    room,
                    stage.as_str(),
                    reason
                );
            }
            other => warn!(
                "Left room '{}' with unexpected closure state {:?}",
                room, other
            ),
        }

        Ok(())
    }
}
