//! Caption translation collaborator.
//!
//! One synchronous request/response per caption item. A failed translation
//! is isolated to that item — the caption queue logs and moves on.

mod http_api;

pub use http_api::HttpTranslator;

use anyhow::Result;
use async_trait::async_trait;

/// Text-in, translated-text-out collaborator seam.
#[async_trait]
pub trait Translator: Send + Sync {
    /// Translate `text` into `target_lang` (primary subtag, e.g. "de").
    async fn translate(&self, text: &str, target_lang: &str) -> Result<String>;
}

/// Primary language subtag of a BCP-47 selector ("en-US" → "en").
pub fn primary_subtag(language: &str) -> &str {
    language.split('-').next().unwrap_or(language)
}
