use crate::global;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub session: SessionConfig,
    pub captions: CaptionConfig,
    pub asr: AsrConfig,
    pub translation: TranslationConfig,
    pub summarizer: SummarizerConfig,
    pub storage: StorageConfig,
    pub email: EmailConfig,
    pub broker: BrokerConfig,
    pub api: ApiConfig,
    pub directory: DirectoryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Local participant identity, as known to the room service.
    pub participant_id: String,
    /// Label other participants see on relayed captions.
    pub display_name: String,
    /// BCP-47 language selector for recognition and caption display
    /// (e.g. "en-US"). The primary subtag is the translation target.
    pub language: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            participant_id: String::new(),
            display_name: String::new(),
            language: "en-US".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptionConfig {
    /// Seconds a caption stays on screen unless superseded.
    pub display_seconds: u64,
    /// Isolated utterances suppressed from local display (still relayed).
    pub filler_words: Vec<String>,
}

impl Default for CaptionConfig {
    fn default() -> Self {
        Self {
            display_seconds: 5,
            filler_words: vec!["is".to_string(), "so".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AsrConfig {
    /// host:port of the streaming recognition endpoint.
    pub endpoint: String,
    pub token: Option<String>,
    /// Interval between audio frames pushed to the recognizer.
    pub chunk_millis: u64,
    pub connect_timeout_seconds: u64,
}

impl Default for AsrConfig {
    fn default() -> Self {
        Self {
            endpoint: "127.0.0.1:43007".to_string(),
            token: None,
            chunk_millis: 1000,
            connect_timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslationConfig {
    pub endpoint: String,
    pub timeout_seconds: u64,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://translate.voxbridge.link/api/v1/translate".to_string(),
            timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarizerConfig {
    pub endpoint: String,
    pub timeout_seconds: u64,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://summarize.voxbridge.link/api/v1/summaries".to_string(),
            timeout_seconds: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    /// Lifetime of issued retrieval links, in seconds.
    pub link_ttl_seconds: u64,
    pub timeout_seconds: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://objects.voxbridge.link/api/v1".to_string(),
            api_key: None,
            link_ttl_seconds: 604_800,
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub from: String,
    pub timeout_seconds: u64,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.resend.com/emails".to_string(),
            api_key: None,
            from: "VoxBridge <onboarding@resend.dev>".to_string(),
            timeout_seconds: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// host:port of the broadcast broker. Empty selects the in-process
    /// broker (single-host deployments and tests).
    pub endpoint: String,
    pub connect_timeout_seconds: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            connect_timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { port: 3747 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    /// Participant email roster. Defaults to participants.toml in the
    /// config directory.
    pub participants_file: Option<PathBuf>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        if !config_path.exists() {
            info!(
                "Config file not found, creating default at {:?}",
                config_path
            );
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content =
            std::fs::read_to_string(&config_path).context("Failed to read config file")?;

        let config: Self = toml::from_str(&content).context("Failed to parse config file")?;

        info!("Loaded config from {:?}", config_path);
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&config_path, content).context("Failed to write config file")?;

        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        global::config_file()
    }
}
