//! AI provider integration for best-effort enrichment steps.
//!
//! The AI surface is deliberately narrow: a single `analyze(prompt)` text
//! capability behind an async trait. The job manager and facade consult it
//! for filename cleaning, adaptive quality selection, subtitle
//! transcription, and processed-library search ranking; every one of those
//! steps catches and logs AI failures without failing the host operation.
//!
//! A configuration without `premium` or without an API key yields no
//! provider at all, and every pipeline still completes its non-AI steps.

use std::sync::Arc;

use async_trait::async_trait;
use log::debug;

use crate::Result;
use crate::config::AiConfig;

pub mod openai;
pub mod prompts;
pub mod retry;

pub use openai::OpenAiClient;
pub use retry::{RetryConfig, retry_transient};

/// Text-analysis capability offered by an AI backend.
#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Send a prompt and return the model's text response.
    async fn analyze(&self, prompt: &str) -> Result<String>;
}

/// Build a provider from configuration.
///
/// Returns `None` when premium is off or no API key is configured; callers
/// treat that as the capability being absent.
pub fn create_provider(config: &AiConfig) -> Result<Option<Arc<dyn AiProvider>>> {
    if !config.premium {
        debug!("AI capability disabled: premium is off");
        return Ok(None);
    }
    if config.api_key.is_none() {
        debug!("AI capability disabled: no API key configured");
        return Ok(None);
    }
    let client = OpenAiClient::from_config(config)?;
    Ok(Some(Arc::new(client)))
}

/// Parse a quality-level recommendation out of a model response.
///
/// Accepts the value only when it parses to an integer within the encoder's
/// valid domain; anything else yields `None` and the caller keeps its
/// default.
pub fn parse_quality_response(response: &str) -> Option<u8> {
    let cleaned = response.trim().trim_matches(|c: char| c == '"' || c == '`');
    let value: i64 = cleaned.parse().ok()?;
    if (10..=51).contains(&value) {
        Some(value as u8)
    } else {
        None
    }
}

/// Parse an ordered id list out of a model response.
///
/// Tolerates a JSON array of strings, or a newline/comma separated list.
pub fn parse_id_list(response: &str) -> Vec<String> {
    let trimmed = response.trim();
    if let Ok(ids) = serde_json::from_str::<Vec<String>>(trimmed) {
        return ids;
    }
    trimmed
        .split(|c| c == ',' || c == '\n')
        .map(|s| s.trim().trim_matches('"').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
