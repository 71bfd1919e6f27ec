//! Meeting-closure pipeline tests: the orchestrator drives summarize →
//! store → announce → notify against mock collaborators and always
//! reaches a terminal state without raising.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use voxbridge::closure::{
    ClosureOrchestrator, ClosureStage, ClosureStatus, ClosureStatusHandle, Summarizer,
};
use voxbridge::directory::{ParticipantDirectory, ParticipantEmailRecord};
use voxbridge::email::SummaryMailer;
use voxbridge::events::RoomEvent;
use voxbridge::relay::broker::{EventBroker, LocalBroker};
use voxbridge::storage::{ArtifactStore, StorageError};

const LINK_TTL_SECONDS: u64 = 604_800;

struct FixedSummarizer {
    fail: bool,
}

#[async_trait]
impl Summarizer for FixedSummarizer {
    async fn summarize(&self, text: &str) -> Result<String> {
        if self.fail {
            anyhow::bail!("summarization model unavailable");
        }
        Ok(format!("summary of {} chars", text.len()))
    }
}

#[derive(Default)]
struct RecordingStore {
    containers: Mutex<HashSet<String>>,
    objects: Mutex<Vec<(String, String, String)>>,
    head_calls: AtomicUsize,
    create_calls: AtomicUsize,
    issued_ttls: Mutex<Vec<u64>>,
    fail_put: bool,
    fail_create: bool,
}

#[async_trait]
impl ArtifactStore for RecordingStore {
    async fn head_container(&self, name: &str) -> Result<(), StorageError> {
        self.head_calls.fetch_add(1, Ordering::SeqCst);
        if self.containers.lock().unwrap().contains(name) {
            Ok(())
        } else {
            Err(StorageError::NotFound)
        }
    }

    async fn create_container(&self, name: &str) -> Result<(), StorageError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_create {
            return Err(StorageError::Api {
                status: 403,
                message: "access denied".to_string(),
            });
        }
        self.containers.lock().unwrap().insert(name.to_string());
        Ok(())
    }

    async fn put_object(
        &self,
        container: &str,
        key: &str,
        content: &str,
    ) -> Result<(), StorageError> {
        if self.fail_put {
            return Err(StorageError::Api {
                status: 500,
                message: "write failed".to_string(),
            });
        }
        self.objects.lock().unwrap().push((
            container.to_string(),
            key.to_string(),
            content.to_string(),
        ));
        Ok(())
    }

    async fn signed_url(
        &self,
        container: &str,
        key: &str,
        ttl_seconds: u64,
    ) -> Result<String, StorageError> {
        self.issued_ttls.lock().unwrap().push(ttl_seconds);
        Ok(format!(
            "https://objects.example/{}/{}?expires={}",
            container, key, ttl_seconds
        ))
    }
}

struct RosterDirectory {
    records: Vec<ParticipantEmailRecord>,
}

#[async_trait]
impl ParticipantDirectory for RosterDirectory {
    async fn emails_for_room(&self, room: &str) -> Result<Vec<ParticipantEmailRecord>> {
        Ok(self
            .records
            .iter()
            .filter(|record| record.room == room)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
struct SelectiveMailer {
    reject: Vec<String>,
    sent: Mutex<Vec<String>>,
}

#[async_trait]
impl SummaryMailer for SelectiveMailer {
    async fn send(&self, address: &str, _room: &str, _summary_url: &str) -> Result<()> {
        if self.reject.iter().any(|r| r == address) {
            anyhow::bail!("recipient rejected");
        }
        self.sent.lock().unwrap().push(address.to_string());
        Ok(())
    }
}

struct Fixture {
    orchestrator: ClosureOrchestrator,
    store: Arc<RecordingStore>,
    mailer: Arc<SelectiveMailer>,
    broker: Arc<LocalBroker>,
    status: ClosureStatusHandle,
}

fn records(room: &str, addresses: &[Option<&str>]) -> Vec<ParticipantEmailRecord> {
    addresses
        .iter()
        .map(|address| ParticipantEmailRecord {
            room: room.to_string(),
            address: address.map(str::to_string),
        })
        .collect()
}

fn fixture(
    summarizer_fails: bool,
    store: RecordingStore,
    mailer: SelectiveMailer,
    roster: Vec<ParticipantEmailRecord>,
) -> Fixture {
    let store = Arc::new(store);
    let mailer = Arc::new(mailer);
    let broker = Arc::new(LocalBroker::new());
    let status = ClosureStatusHandle::default();

    let orchestrator = ClosureOrchestrator::new(
        Arc::new(FixedSummarizer {
            fail: summarizer_fails,
        }),
        store.clone(),
        broker.clone(),
        mailer.clone(),
        Arc::new(RosterDirectory { records: roster }),
        LINK_TTL_SECONDS,
        status.clone(),
    );

    Fixture {
        orchestrator,
        store,
        mailer,
        broker,
        status,
    }
}

fn transcript() -> Vec<String> {
    vec![
        "we should ship on thursday".to_string(),
        "the migration is done".to_string(),
    ]
}

#[tokio::test]
async fn happy_path_reaches_done_with_summary_link_and_emails() {
    let f = fixture(
        false,
        RecordingStore::default(),
        SelectiveMailer::default(),
        records("team-sync", &[Some("a@example.com"), Some("b@example.com")]),
    );

    let mut announcements = f.broker.subscribe("team-sync").await.unwrap();
    let report = f.orchestrator.run("team-sync", transcript()).await;

    assert!(report.is_done());
    assert_eq!(report.container.as_deref(), Some("voxbridge-meeting-team-sync"));
    assert!(report.summary.is_some());
    assert!(report.signed_url.is_some());
    assert!(report.link_expires_at.is_some());

    // The artifact landed in the room's container under a summary key.
    let objects = f.store.objects.lock().unwrap().clone();
    assert_eq!(objects.len(), 1);
    assert_eq!(objects[0].0, "voxbridge-meeting-team-sync");
    assert!(objects[0].1.starts_with("summary-"));
    assert!(objects[0].1.ends_with(".txt"));

    // The announcement went out on the room channel as a typed event.
    match announcements.recv().await.unwrap() {
        RoomEvent::SummaryReady(notice) => {
            assert_eq!(notice.room, "team-sync");
            assert_eq!(notice.url, report.signed_url.clone().unwrap());
        }
        other => panic!("expected summary announcement, got {:?}", other),
    }

    // Both recipients were notified.
    let emails = report.emails.unwrap();
    assert_eq!(emails.succeeded.len(), 2);
    assert!(emails.failed.is_empty());

    assert_eq!(f.status.get().await.status, ClosureStatus::Done);
}

#[tokio::test]
async fn room_name_is_sanitized_into_the_container_name() {
    let f = fixture(
        false,
        RecordingStore::default(),
        SelectiveMailer::default(),
        Vec::new(),
    );

    let report = f.orchestrator.run("Team Sync!", transcript()).await;

    assert!(report.is_done());
    assert_eq!(
        report.container.as_deref(),
        Some("voxbridge-meeting-team-sync-")
    );
}

#[tokio::test]
async fn issued_links_carry_the_seven_day_ttl() {
    let f = fixture(
        false,
        RecordingStore::default(),
        SelectiveMailer::default(),
        Vec::new(),
    );

    let report = f.orchestrator.run("team-sync", transcript()).await;

    assert!(report.is_done());
    assert_eq!(*f.store.issued_ttls.lock().unwrap(), vec![604_800]);

    let expires_at = report.link_expires_at.unwrap();
    let delta = expires_at - chrono::Utc::now();
    assert!(delta.num_seconds() > 604_700 && delta.num_seconds() <= 604_800);
}

#[tokio::test]
async fn summarizer_failure_terminates_run_but_returns_control() {
    let f = fixture(
        true,
        RecordingStore::default(),
        SelectiveMailer::default(),
        records("team-sync", &[Some("a@example.com")]),
    );

    // The call returns normally — the surrounding leave flow is never
    // blocked by a failed run.
    let report = f.orchestrator.run("team-sync", transcript()).await;

    match report.outcome {
        ClosureStatus::Failed { stage, ref reason } => {
            assert_eq!(stage, ClosureStage::Summarizing);
            assert!(reason.contains("unavailable"));
        }
        ref other => panic!("expected failed outcome, got {:?}", other),
    }

    // Nothing downstream happened.
    assert!(f.store.objects.lock().unwrap().is_empty());
    assert!(f.mailer.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn empty_transcript_fails_at_summarizing() {
    let f = fixture(
        false,
        RecordingStore::default(),
        SelectiveMailer::default(),
        Vec::new(),
    );

    let report = f.orchestrator.run("team-sync", Vec::new()).await;

    match report.outcome {
        ClosureStatus::Failed { stage, .. } => assert_eq!(stage, ClosureStage::Summarizing),
        other => panic!("expected failed outcome, got {:?}", other),
    }
}

#[tokio::test]
async fn container_creation_denial_fails_the_upload_stage() {
    let f = fixture(
        false,
        RecordingStore {
            fail_create: true,
            ..RecordingStore::default()
        },
        SelectiveMailer::default(),
        records("team-sync", &[Some("a@example.com")]),
    );

    let report = f.orchestrator.run("team-sync", transcript()).await;

    match report.outcome {
        ClosureStatus::Failed { stage, ref reason } => {
            assert_eq!(stage, ClosureStage::Uploading);
            assert!(reason.contains("access denied"));
        }
        ref other => panic!("expected failed outcome, got {:?}", other),
    }
    assert!(f.mailer.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn object_write_failure_fails_the_upload_stage() {
    let f = fixture(
        false,
        RecordingStore {
            fail_put: true,
            ..RecordingStore::default()
        },
        SelectiveMailer::default(),
        Vec::new(),
    );

    let report = f.orchestrator.run("team-sync", transcript()).await;

    match report.outcome {
        ClosureStatus::Failed { stage, .. } => assert_eq!(stage, ClosureStage::Uploading),
        other => panic!("expected failed outcome, got {:?}", other),
    }
}

#[tokio::test]
async fn existing_container_is_not_recreated() {
    let store = RecordingStore::default();
    store
        .containers
        .lock()
        .unwrap()
        .insert("voxbridge-meeting-team-sync".to_string());

    let f = fixture(false, store, SelectiveMailer::default(), Vec::new());
    let report = f.orchestrator.run("team-sync", transcript()).await;

    assert!(report.is_done());
    assert_eq!(f.store.create_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn sequential_runs_reuse_the_container_and_never_collide_on_keys() {
    let f = fixture(
        false,
        RecordingStore::default(),
        SelectiveMailer::default(),
        Vec::new(),
    );

    let first = f.orchestrator.run("team-sync", transcript()).await;
    let second = f.orchestrator.run("team-sync", transcript()).await;

    assert!(first.is_done());
    assert!(second.is_done());
    // Provisioning is idempotent: the second run saw the container.
    assert_eq!(f.store.create_calls.load(Ordering::SeqCst), 1);

    let keys: Vec<String> = f
        .store
        .objects
        .lock()
        .unwrap()
        .iter()
        .map(|(_, key, _)| key.clone())
        .collect();
    assert_eq!(keys.len(), 2);
    assert_ne!(keys[0], keys[1]);
}

#[tokio::test]
async fn email_fanout_records_partial_failures_and_still_completes() {
    let f = fixture(
        false,
        RecordingStore::default(),
        SelectiveMailer {
            reject: vec!["bounce@example.com".to_string()],
            ..SelectiveMailer::default()
        },
        records(
            "team-sync",
            &[
                Some("a@example.com"),
                Some("bounce@example.com"),
                Some("b@example.com"),
                // A participant without a known address is skipped.
                None,
            ],
        ),
    );

    let report = f.orchestrator.run("team-sync", transcript()).await;

    assert!(report.is_done());
    let mut emails = report.emails.unwrap();
    emails.succeeded.sort();
    emails.failed.sort();
    assert_eq!(emails.succeeded, vec!["a@example.com", "b@example.com"]);
    assert_eq!(emails.failed, vec!["bounce@example.com"]);
}

#[tokio::test]
async fn status_handle_tracks_the_terminal_state() {
    let f = fixture(
        true,
        RecordingStore::default(),
        SelectiveMailer::default(),
        Vec::new(),
    );

    f.orchestrator.run("team-sync", transcript()).await;

    let state = f.status.get().await;
    assert!(state.status.is_terminal());
    assert_eq!(state.room.as_deref(), Some("team-sync"));
    assert_eq!(state.status.as_str(), "failed");
}
