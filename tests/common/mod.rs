//! Shared helpers for the integration tests.
#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;

use async_trait::async_trait;
use tempfile::TempDir;

use optimarr::config::AppConfig;
use optimarr::services::ai::AiProvider;

/// A disposable service environment: media/output roots plus state files,
/// all under one temp directory.
pub struct TestEnv {
    pub temp: TempDir,
    pub config: AppConfig,
}

impl TestEnv {
    pub fn media_dir(&self) -> PathBuf {
        self.config.general.source_directory.clone()
    }

    pub fn output_dir(&self) -> PathBuf {
        self.config.general.output_directory.clone()
    }

    /// Create a media file of the given size (sparse, so large sizes are
    /// cheap).
    pub fn media_file(&self, name: &str, size: u64) -> PathBuf {
        let path = self.media_dir().join(name);
        let file = fs::File::create(&path).unwrap();
        file.set_len(size).unwrap();
        path
    }
}

/// Build a fresh environment with defaults pointed into a temp directory.
pub fn test_env() -> TestEnv {
    let temp = TempDir::new().unwrap();
    let media = temp.path().join("media");
    let output = temp.path().join("out");
    fs::create_dir_all(&media).unwrap();
    fs::create_dir_all(&output).unwrap();

    let mut config = AppConfig::default();
    config.general.source_directory = media;
    config.general.output_directory = output.clone();
    config.general.job_store_path = temp.path().join("state").join("jobs.json");
    config.scanner.processed_file_path = temp.path().join("state").join("processed.json");
    config.scanner.output_directory = output;
    TestEnv { temp, config }
}

/// AI provider returning a fixed response, for pipeline tests.
pub struct StaticProvider {
    pub response: String,
}

impl StaticProvider {
    pub fn new<S: Into<String>>(response: S) -> Self {
        Self {
            response: response.into(),
        }
    }
}

#[async_trait]
impl AiProvider for StaticProvider {
    async fn analyze(&self, _prompt: &str) -> optimarr::Result<String> {
        Ok(self.response.clone())
    }
}

/// AI provider that always fails, for degradation tests.
pub struct FailingProvider;

#[async_trait]
impl AiProvider for FailingProvider {
    async fn analyze(&self, _prompt: &str) -> optimarr::Result<String> {
        Err(optimarr::error::OptimarrError::ai_service("unavailable"))
    }
}
