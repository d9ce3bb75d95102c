//! The core's outward API, consumed by the HTTP layer and the CLI.
//!
//! A narrow surface over the job manager, scanner, and processed store.
//! Every path crossing this boundary goes through `PathGuard` before it
//! reaches the inner components; downstream code assumes confined inputs.

use std::sync::Arc;

use log::warn;

use crate::Result;
use crate::config::{AppConfig, ScannerConfig};
use crate::core::jobs::{Job, JobKind, JobManager};
use crate::core::paths::PathGuard;
use crate::core::scanner::{ProcessedFile, ProcessedStore, Scanner};
use crate::error::OptimarrError;
use crate::services::ai::{self, AiProvider, prompts};
use crate::services::transcoder::{MediaInfo, Resolution};

/// A job creation request as it arrives from the outside.
#[derive(Debug, Clone)]
pub struct EnqueueRequest {
    /// What to do with the file.
    pub kind: JobKind,
    /// Input path; must confine to the source root.
    pub source_path: String,
    /// Output path; must confine to the output root.
    pub destination_path: String,
    /// Advisory priority.
    pub priority: i32,
    /// Generate a subtitle sidecar after transcoding.
    pub create_subtitles: bool,
    /// Upscale video.
    pub upscale: bool,
    /// Target resolution when upscaling.
    pub resolution: Option<Resolution>,
}

/// Thin callable boundary exposed to the HTTP layer.
pub struct Facade {
    manager: Arc<JobManager>,
    scanner: Arc<Scanner>,
    processed: Arc<ProcessedStore>,
    ai: Option<Arc<dyn AiProvider>>,
    source_guard: PathGuard,
    output_guard: PathGuard,
    premium: bool,
}

impl Facade {
    /// Wire the full core from configuration: AI provider, job manager,
    /// processed store, scanner, and the completion hook between them.
    pub fn build(config: AppConfig) -> Result<Self> {
        let ai = ai::create_provider(&config.ai)?;
        let manager = Arc::new(JobManager::new(
            config.clone(),
            ai.clone(),
            &config.general.job_store_path,
        )?);
        let processed = Arc::new(ProcessedStore::new(&config.scanner.processed_file_path)?);
        let scanner = Arc::new(Scanner::new(
            config.scanner.clone(),
            Arc::clone(&manager),
            Arc::clone(&processed),
        ));
        let hook_target = Arc::downgrade(&scanner);
        manager.set_completion_hook(Box::new(move |job| {
            if let Some(scanner) = hook_target.upgrade() {
                scanner.on_job_complete(job);
            }
        }));
        Ok(Self {
            manager,
            scanner,
            processed,
            ai,
            source_guard: PathGuard::new([&config.general.source_directory]),
            output_guard: PathGuard::new([&config.general.output_directory]),
            premium: config.ai.premium,
        })
    }

    /// Start workers, requeue persisted pending jobs, start the scanner.
    pub fn start(&self) -> Result<()> {
        Arc::clone(&self.manager).start();
        self.manager.requeue_pending_jobs();
        Arc::clone(&self.scanner).start()?;
        Ok(())
    }

    /// Stop the scanner, then the manager; both persist on the way down.
    pub async fn shutdown(&self) {
        self.scanner.stop().await;
        self.manager.shutdown().await;
    }

    /// Confine the request paths and enqueue the job.
    pub async fn enqueue(&self, request: EnqueueRequest) -> Result<Job> {
        let source = self.source_guard.resolve(&request.source_path)?;
        let destination = self.output_guard.resolve(&request.destination_path)?;
        let mut job = Job::new(request.kind, source, destination);
        job.priority = request.priority;
        job.create_subtitles = request.create_subtitles;
        job.upscale = request.upscale;
        job.resolution = request.resolution;
        self.manager.add_job(job).await
    }

    /// Cancel a live job; `false` for unknown ids and jobs without an
    /// active cancellation scope.
    pub fn cancel(&self, id: &str) -> bool {
        self.manager.cancel_job(id)
    }

    /// Snapshot one job.
    pub fn get(&self, id: &str) -> Option<Job> {
        self.manager.get_job(id)
    }

    /// Snapshot all jobs.
    pub fn list(&self) -> Vec<Job> {
        self.manager.list_jobs()
    }

    /// Snapshot the scanner configuration.
    pub fn scanner_config(&self) -> ScannerConfig {
        self.scanner.config()
    }

    /// Validate roots and restart the scanner under the new configuration.
    pub async fn update_scanner_config(&self, config: ScannerConfig) -> Result<()> {
        for dir in &config.watch_dirs {
            self.source_guard.resolve(&dir.path)?;
        }
        if !config.output_directory.as_os_str().is_empty() {
            self.output_guard.resolve(&config.output_directory)?;
        }
        Arc::clone(&self.scanner).update_config(config).await
    }

    /// Run a full scan inline and return its summary (CLI path).
    pub async fn scan_now(&self) -> Result<crate::core::scanner::ScanSummary> {
        self.scanner.scan_all().await
    }

    /// Schedule a full scan asynchronously; fire-and-forget.
    pub fn trigger_scan(&self) {
        let scanner = Arc::clone(&self.scanner);
        tokio::spawn(async move {
            if let Err(e) = scanner.scan_all().await {
                warn!("triggered scan failed: {}", e);
            }
        });
    }

    /// Probe a media file through the transcoder's probe subroutine.
    pub async fn media_info(&self, path: &str) -> Result<MediaInfo> {
        let path = self.source_guard.resolve(path)?;
        self.manager.media_info(&path).await
    }

    /// Rank processed-library entries against a free-text query through
    /// the AI provider. Fails when premium is not active.
    pub async fn search_by_ai(&self, query: &str) -> Result<Vec<ProcessedFile>> {
        if !self.premium {
            return Err(OptimarrError::ai_service("premium is not active"));
        }
        let Some(ai) = self.ai.as_ref() else {
            return Err(OptimarrError::ai_service("no AI provider configured"));
        };
        let entries = self.processed.list();
        if entries.is_empty() {
            return Ok(Vec::new());
        }
        let listing: String = entries
            .iter()
            .map(|e| format!("{}\t{}", e.job_id, e.path.display()))
            .collect::<Vec<_>>()
            .join("\n");
        let response = ai
            .analyze(&prompts::rank_library_prompt(query, &listing))
            .await?;
        let ranked_ids = ai::parse_id_list(&response);
        let ordered = ranked_ids
            .iter()
            .filter_map(|id| entries.iter().find(|e| &e.job_id == id).cloned())
            .collect();
        Ok(ordered)
    }
}
