//! Configuration management for the optimarr service.
//!
//! Configuration is loaded from a TOML file (default location under the
//! platform config directory) layered with `OPTIMARR_`-prefixed environment
//! variables. Every field carries a serde default so a missing or partial
//! file yields a usable configuration.
//!
//! The scanner section is the one piece of configuration that is mutable at
//! runtime: the facade replaces it wholesale through
//! `Scanner::update_config`, which restarts the scanner.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::Result;
use crate::services::transcoder::{AudioCodec, Container, EncoderPreset, GpuVendor};

mod validator;
pub use validator::validate_config;

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Worker pool and directory roots.
    pub general: GeneralConfig,
    /// Encoder defaults applied to optimize jobs.
    pub transcode: TranscodeConfig,
    /// External tool locations.
    pub tools: ToolsConfig,
    /// AI provider settings (optional capability).
    pub ai: AiConfig,
    /// Directory scanner settings.
    pub scanner: ScannerConfig,
}

/// General service settings: concurrency and filesystem roots.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Number of concurrent job workers.
    pub worker_count: usize,
    /// Root directory all job source paths must live under.
    pub source_directory: PathBuf,
    /// Root directory all job destination paths must live under.
    pub output_directory: PathBuf,
    /// Location of the persisted job store.
    pub job_store_path: PathBuf,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            worker_count: 2,
            source_directory: PathBuf::from("/media"),
            output_directory: PathBuf::from("/output"),
            job_store_path: PathBuf::from("/var/lib/optimarr/jobs.json"),
        }
    }
}

/// Encoder defaults for optimize jobs.
///
/// `quality_level` is the constant-quality integer handed to the encoder
/// (CRF / CQ / QP depending on the selected encoder). The valid domain is
/// [10, 51]; typical values sit in [18, 28].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscodeConfig {
    /// Hardware acceleration vendor.
    pub gpu_vendor: GpuVendor,
    /// Encoder speed/quality preset.
    pub preset: EncoderPreset,
    /// Constant-quality level, domain [10, 51].
    pub quality_level: u8,
    /// Audio track handling.
    pub audio_codec: AudioCodec,
    /// Output container format.
    pub container: Container,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            gpu_vendor: GpuVendor::Cpu,
            preset: EncoderPreset::Medium,
            quality_level: 24,
            audio_codec: AudioCodec::Copy,
            container: Container::Mkv,
        }
    }
}

/// Locations of the external tool binaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Transcoder binary.
    pub ffmpeg_path: PathBuf,
    /// Media probe binary.
    pub ffprobe_path: PathBuf,
    /// Disc extractor binary.
    pub makemkvcon_path: PathBuf,
    /// Minimum title length forwarded to the extractor, in seconds.
    pub min_title_length_seconds: u32,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            makemkvcon_path: PathBuf::from("makemkvcon"),
            min_title_length_seconds: 600,
        }
    }
}

/// AI provider settings.
///
/// The AI integration is a capability, not a dependency: with `premium`
/// disabled or no API key configured, every pipeline still completes all of
/// its non-AI steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    /// Gates all AI-assisted steps (filename cleaning, adaptive quality,
    /// subtitle generation, library search).
    pub premium: bool,
    /// Provider identifier; only OpenAI-compatible endpoints are supported.
    pub provider: String,
    /// API key; absent means the capability is unavailable.
    pub api_key: Option<String>,
    /// Model name passed to the chat endpoint.
    pub model: String,
    /// Base URL of the OpenAI-compatible API.
    pub base_url: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Number of retries for transient request failures.
    pub retry_attempts: u32,
    /// Base delay between retries, in milliseconds.
    pub retry_delay_ms: u64,
    /// Per-request timeout, in seconds.
    pub timeout_seconds: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            premium: false,
            provider: "openai".to_string(),
            api_key: None,
            model: "gpt-4.1-mini".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            temperature: 0.3,
            retry_attempts: 2,
            retry_delay_ms: 500,
            timeout_seconds: 10,
        }
    }
}

/// Scanner operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    /// No background activity; only explicit scans run.
    Manual,
    /// One full scan at startup, then idle.
    Startup,
    /// A background task scans every `interval_seconds`.
    Periodic,
    /// Real-time file-system events across all watch directories.
    Watch,
    /// Startup + Watch + Periodic, concurrently.
    Hybrid,
}

/// A directory monitored by the scanner.
///
/// Immutable after load; the scanner copies the whole set on config update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchDirectory {
    /// Directory to scan.
    pub path: PathBuf,
    /// Whether to descend into subdirectories.
    pub recursive: bool,
    /// Basename globs a file must match (empty accepts everything).
    pub include_globs: Vec<String>,
    /// Basename globs that reject a file; these win over includes.
    pub exclude_globs: Vec<String>,
    /// Files smaller than this are skipped.
    pub min_size_bytes: u64,
    /// Files modified more recently than this are skipped (deferred in
    /// watch mode).
    pub min_age_seconds: u64,
}

impl Default for WatchDirectory {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            recursive: true,
            include_globs: Vec::new(),
            exclude_globs: Vec::new(),
            min_size_bytes: 0,
            min_age_seconds: 0,
        }
    }
}

/// Directory scanner configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Master switch for background scanning.
    pub enabled: bool,
    /// Operating mode.
    pub mode: ScanMode,
    /// Interval between periodic scans, in seconds.
    pub interval_seconds: u64,
    /// Whether discovered files are turned into jobs automatically.
    pub auto_create_jobs: bool,
    /// Monitored directories.
    pub watch_dirs: Vec<WatchDirectory>,
    /// Extensions classified as disc images (extract jobs).
    pub extract_extensions: Vec<String>,
    /// Extensions classified as media files (optimize jobs).
    pub optimize_extensions: Vec<String>,
    /// Priority assigned to scanner-created jobs (advisory).
    pub default_priority: i32,
    /// Destination directory for scanner-created jobs; empty places output
    /// beside the input.
    pub output_directory: PathBuf,
    /// Location of the persisted processed-file store.
    pub processed_file_path: PathBuf,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: ScanMode::Manual,
            interval_seconds: 1800,
            auto_create_jobs: true,
            watch_dirs: Vec::new(),
            extract_extensions: vec!["iso".to_string(), "img".to_string()],
            optimize_extensions: vec![
                "mkv".to_string(),
                "mp4".to_string(),
                "avi".to_string(),
                "mov".to_string(),
                "m4v".to_string(),
                "ts".to_string(),
                "wmv".to_string(),
            ],
            default_priority: 0,
            output_directory: PathBuf::new(),
            processed_file_path: PathBuf::from("/var/lib/optimarr/processed.json"),
        }
    }
}

/// Default configuration file location under the platform config directory.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("optimarr")
        .join("config.toml")
}

/// Load configuration from the given TOML file (or the default location)
/// layered with `OPTIMARR_`-prefixed environment variables.
///
/// A missing file is not an error; defaults apply. The result is validated
/// before being returned.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    let settings = config::Config::builder()
        .add_source(config::File::from(path).required(false))
        .add_source(
            config::Environment::with_prefix("OPTIMARR")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;
    let app_config: AppConfig = settings.try_deserialize()?;
    validate_config(&app_config)?;
    Ok(app_config)
}
