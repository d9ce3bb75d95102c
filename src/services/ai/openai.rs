//! OpenAI-compatible chat client.
//!
//! Speaks the `/chat/completions` shape against any compatible endpoint.
//! Requests carry the configured model and temperature and run under a hard
//! per-request timeout (10 seconds by default); transient transport errors
//! are retried with exponential backoff.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;

use crate::Result;
use crate::config::AiConfig;
use crate::error::OptimarrError;

use super::retry::{RetryConfig, retry_transient};
use super::AiProvider;

/// Client for an OpenAI-compatible chat endpoint.
#[derive(Debug)]
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    model: String,
    temperature: f32,
    retry: RetryConfig,
    base_url: String,
}

impl OpenAiClient {
    /// Create a client from the AI configuration.
    ///
    /// Validates the base URL and builds an HTTP client with the configured
    /// request timeout.
    pub fn from_config(config: &AiConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .as_ref()
            .ok_or_else(|| OptimarrError::config("Missing AI API key"))?;
        validate_base_url(&config.base_url)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| OptimarrError::config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            api_key: api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            retry: RetryConfig::from_ai_config(config),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn chat_completion(&self, messages: Vec<Value>) -> Result<String> {
        let request_body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
            "max_tokens": 1000,
        });

        let response = retry_transient(
            || async {
                let response = self
                    .client
                    .post(format!("{}/chat/completions", self.base_url))
                    .header("Authorization", format!("Bearer {}", self.api_key))
                    .header("Content-Type", "application/json")
                    .json(&request_body)
                    .send()
                    .await?;
                Ok(response)
            },
            &self.retry,
        )
        .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            return Err(OptimarrError::AiService(format!(
                "API error {}: {}",
                status, error_text
            )));
        }

        let response_json: Value = response.json().await?;
        let content = response_json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| OptimarrError::ai_service("Invalid API response format"))?;
        Ok(content.to_string())
    }
}

#[async_trait]
impl AiProvider for OpenAiClient {
    async fn analyze(&self, prompt: &str) -> Result<String> {
        let messages = vec![
            json!({"role": "system", "content": "You are a media library assistant. Answer with exactly the requested output and nothing else."}),
            json!({"role": "user", "content": prompt}),
        ];
        self.chat_completion(messages).await
    }
}

/// Validate base URL format.
fn validate_base_url(url: &str) -> Result<()> {
    use url::Url;
    let parsed = Url::parse(url)
        .map_err(|e| OptimarrError::config(format!("Invalid base URL: {}", e)))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(OptimarrError::config(
            "Base URL must use http or https protocol".to_string(),
        ));
    }
    if parsed.host().is_none() {
        return Err(OptimarrError::config(
            "Base URL must contain a valid hostname".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(base_url: &str) -> AiConfig {
        AiConfig {
            premium: true,
            api_key: Some("test-key".to_string()),
            base_url: base_url.to_string(),
            retry_attempts: 1,
            retry_delay_ms: 0,
            ..Default::default()
        }
    }

    #[test]
    fn test_from_config() {
        let client = OpenAiClient::from_config(&test_config("https://custom.example.com/v1")).unwrap();
        assert_eq!(client.api_key, "test-key");
        assert_eq!(client.base_url, "https://custom.example.com/v1");
    }

    #[test]
    fn test_from_config_invalid_base_url() {
        let err = OpenAiClient::from_config(&test_config("ftp://invalid.url")).unwrap_err();
        assert!(
            err.to_string()
                .contains("Base URL must use http or https protocol")
        );
    }

    #[test]
    fn test_from_config_requires_key() {
        let mut config = test_config("https://api.openai.com/v1");
        config.api_key = None;
        assert!(OpenAiClient::from_config(&config).is_err());
    }
}
