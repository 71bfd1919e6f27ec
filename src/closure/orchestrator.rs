//! Meeting-closure pipeline.
//!
//! One run per meeting-end event:
//! summarize → store → announce → notify, with a terminal `Failed(stage)`
//! from any stage before the fan-out. Every stage converts its own failure
//! into the terminal state; nothing escapes to the caller, so the leave
//! flow always completes.
//!
//! All collaborators are injected via constructor — no concrete types
//! hardcoded.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::directory::ParticipantDirectory;
use crate::email::{self, EmailDispatchResult, SummaryMailer};
use crate::events::{RoomEvent, SummaryNotice};
use crate::relay::broker::EventBroker;
use crate::storage::{container_name, object_key, ArtifactStore};

use super::status::{ClosureStage, ClosureStatus, ClosureStatusHandle};
use super::summarizer::Summarizer;

/// Result of one closure run, returned to the leave handler.
#[derive(Debug)]
pub struct ClosureReport {
    pub room: String,
    pub outcome: ClosureStatus,
    pub summary: Option<String>,
    pub container: Option<String>,
    pub artifact_key: Option<String>,
    pub signed_url: Option<String>,
    pub link_expires_at: Option<DateTime<Utc>>,
    pub emails: Option<EmailDispatchResult>,
}

impl ClosureReport {
    fn new(room: &str) -> Self {
        Self {
            room: room.to_string(),
            outcome: ClosureStatus::Idle,
            summary: None,
            container: None,
            artifact_key: None,
            signed_url: None,
            link_expires_at: None,
            emails: None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.outcome == ClosureStatus::Done
    }
}

pub struct ClosureOrchestrator {
    summarizer: Arc<dyn Summarizer>,
    store: Arc<dyn ArtifactStore>,
    broker: Arc<dyn EventBroker>,
    mailer: Arc<dyn SummaryMailer>,
    directory: Arc<dyn ParticipantDirectory>,
    link_ttl_seconds: u64,
    status: ClosureStatusHandle,
}

impl ClosureOrchestrator {
    pub fn new(
        summarizer: Arc<dyn Summarizer>,
        store: Arc<dyn ArtifactStore>,
        broker: Arc<dyn EventBroker>,
        mailer: Arc<dyn SummaryMailer>,
        directory: Arc<dyn ParticipantDirectory>,
        link_ttl_seconds: u64,
        status: ClosureStatusHandle,
    ) -> Self {
        Self {
            summarizer,
            store,
            broker,
            mailer,
            directory,
            link_ttl_seconds,
            status,
        }
    }

    /// Drive the pipeline to a terminal state. Never returns an error —
    /// a failed run is reported, not raised, and teardown continues.
    pub async fn run(&self, room: &str, transcript_log: Vec<String>) -> ClosureReport {
        info!(
            "Closing meeting '{}' ({} transcript lines)",
            room,
            transcript_log.len()
        );
        self.status.begin(room).await;
        let mut report = ClosureReport::new(room);

        // Summarizing
        let blob = transcript_log.join("\n");
        if blob.trim().is_empty() {
            return self
                .fail(
                    report,
                    ClosureStage::Summarizing,
                    "no transcripts recorded for this session".to_string(),
                )
                .await;
        }

        let summary = match self.summarizer.summarize(&blob).await {
            Ok(summary) => summary,
            Err(e) => {
                return self
                    .fail(report, ClosureStage::Summarizing, e.to_string())
                    .await
            }
        };
        report.summary = Some(summary.clone());

        // Uploading
        self.status.enter_stage(ClosureStage::Uploading).await;
        let container = container_name(room);
        report.container = Some(container.clone());

        if let Err(e) = self.store.ensure_container(&container).await {
            return self
                .fail(report, ClosureStage::Uploading, e.to_string())
                .await;
        }

        let key = object_key();
        if let Err(e) = self.store.put_object(&container, &key, &summary).await {
            return self
                .fail(report, ClosureStage::Uploading, e.to_string())
                .await;
        }
        report.artifact_key = Some(key.clone());

        let url = match self
            .store
            .signed_url(&container, &key, self.link_ttl_seconds)
            .await
        {
            Ok(url) => url,
            Err(e) => {
                return self
                    .fail(report, ClosureStage::Uploading, e.to_string())
                    .await
            }
        };
        let expires_at = Utc::now() + chrono::Duration::seconds(self.link_ttl_seconds as i64);
        self.status.record_link(&url, expires_at).await;
        report.signed_url = Some(url.clone());
        report.link_expires_at = Some(expires_at);

        // Announcing
        self.status.enter_stage(ClosureStage::Announcing).await;
        let announcement = RoomEvent::SummaryReady(SummaryNotice {
            room: room.to_string(),
            url: url.clone(),
        });
        if let Err(e) = self.broker.publish(room, &announcement).await {
            return self
                .fail(report, ClosureStage::Announcing, e.to_string())
                .await;
        }

        // EmailFanout. Per-recipient failures are aggregated, never raised;
        // this stage always reaches Done.
        self.status.enter_stage(ClosureStage::EmailFanout).await;
        let recipients = match self.directory.emails_for_room(room).await {
            Ok(records) => records
                .into_iter()
                .filter_map(|record| record.address)
                .collect(),
            Err(e) => {
                warn!("Participant roster unavailable for '{}': {}", room, e);
                Vec::new()
            }
        };

        let emails = email::fan_out(self.mailer.clone(), room, &url, recipients).await;
        self.status.complete(emails.clone()).await;
        report.emails = Some(emails);
        report.outcome = ClosureStatus::Done;

        info!("Meeting '{}' closed, summary at {}", room, url);
        report
    }

    async fn fail(
        &self,
        mut report: ClosureReport,
        stage: ClosureStage,
        reason: String,
    ) -> ClosureReport {
        error!(
            "Closure run for '{}' failed while {}: {}",
            report.room,
            stage.as_str(),
            reason
        );
        self.status.fail(stage, reason.clone()).await;
        report.outcome = ClosureStatus::Failed { stage, reason };
        report
    }
}
