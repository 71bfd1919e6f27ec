//! Participant email roster boundary.
//!
//! Membership itself lives in the room service's persistence layer; this
//! crate only reads addresses at closure time. Records without an address
//! are skipped by the email fan-out.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use tracing::debug;

/// One participant's contact record for a room. Read-only here.
#[derive(Debug, Clone, Deserialize)]
pub struct ParticipantEmailRecord {
    pub room: String,
    pub address: Option<String>,
}

/// Directory collaborator seam.
#[async_trait]
pub trait ParticipantDirectory: Send + Sync {
    async fn emails_for_room(&self, room: &str) -> Result<Vec<ParticipantEmailRecord>>;
}

#[derive(Debug, Deserialize)]
struct RosterFile {
    #[serde(default)]
    participant: Vec<ParticipantEmailRecord>,
}

/// Roster read from a TOML file of `[[participant]]` entries.
pub struct FileDirectory {
    path: PathBuf,
}

impl FileDirectory {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl ParticipantDirectory for FileDirectory {
    async fn emails_for_room(&self, room: &str) -> Result<Vec<ParticipantEmailRecord>> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read participant roster {:?}", self.path))?;

        let roster: RosterFile =
            toml::from_str(&content).context("Failed to parse participant roster")?;

        let records: Vec<ParticipantEmailRecord> = roster
            .participant
            .into_iter()
            .filter(|record| record.room == room)
            .collect();

        debug!("Roster has {} records for room '{}'", records.len(), room);
        Ok(records)
    }
}
