//! Closure run status types and shared state handle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::email::EmailDispatchResult;

/// Active stage of the meeting-closure pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClosureStage {
    Summarizing,
    Uploading,
    Announcing,
    EmailFanout,
}

impl ClosureStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Summarizing => "summarizing",
            Self::Uploading => "uploading",
            Self::Announcing => "announcing",
            Self::EmailFanout => "email_fanout",
        }
    }
}

/// Where a closure run currently stands. `Done` and `Failed` are terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClosureStatus {
    Idle,
    Running(ClosureStage),
    Done,
    Failed { stage: ClosureStage, reason: String },
}

impl ClosureStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running(stage) => stage.as_str(),
            Self::Done => "done",
            Self::Failed { .. } => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed { .. })
    }
}

/// Snapshot of the most recent closure run, readable by API handlers.
#[derive(Debug, Clone)]
pub struct ClosureState {
    pub status: ClosureStatus,
    pub room: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub summary_url: Option<String>,
    pub link_expires_at: Option<DateTime<Utc>>,
    pub emails: Option<EmailDispatchResult>,
}

impl Default for ClosureState {
    fn default() -> Self {
        Self {
            status: ClosureStatus::Idle,
            room: None,
            started_at: None,
            summary_url: None,
            link_expires_at: None,
            emails: None,
        }
    }
}

/// Thread-safe handle shared between the orchestrator and API handlers.
#[derive(Clone, Default)]
pub struct ClosureStatusHandle {
    inner: Arc<Mutex<ClosureState>>,
}

impl ClosureStatusHandle {
    pub async fn get(&self) -> ClosureState {
        self.inner.lock().await.clone()
    }

    pub async fn begin(&self, room: &str) {
        let mut state = self.inner.lock().await;
        *state = ClosureState {
            status: ClosureStatus::Running(ClosureStage::Summarizing),
            room: Some(room.to_string()),
            started_at: Some(Utc::now()),
            ..ClosureState::default()
        };
    }

    pub async fn enter_stage(&self, stage: ClosureStage) {
        let mut state = self.inner.lock().await;
        state.status = ClosureStatus::Running(stage);
    }

    pub async fn record_link(&self, url: &str, expires_at: DateTime<Utc>) {
        let mut state = self.inner.lock().await;
        state.summary_url = Some(url.to_string());
        state.link_expires_at = Some(expires_at);
    }

    pub async fn complete(&self, emails: EmailDispatchResult) {
        let mut state = self.inner.lock().await;
        state.status = ClosureStatus::Done;
        state.emails = Some(emails);
    }

    pub async fn fail(&self, stage: ClosureStage, reason: String) {
        let mut state = self.inner.lock().await;
        state.status = ClosureStatus::Failed { stage, reason };
    }
}
