//! Mode-driven directory monitor and job ingestion.
//!
//! The scanner walks watch directories (startup/periodic) and reacts to
//! file-system create events (watch mode), filters candidates through
//! basename glob matching and size/age debouncing, deduplicates against the
//! processed store, and hands surviving files to the job manager as jobs.
//!
//! Matcher semantics: globs are tested against the basename only, exclude
//! patterns win over includes, and an empty include list accepts every
//! non-excluded file. Matching is case-sensitive.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, SystemTime};

use globset::{Glob, GlobSet, GlobSetBuilder};
use log::{debug, info, warn};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use crate::Result;
use crate::config::{ScanMode, ScannerConfig, WatchDirectory};
use crate::core::jobs::{Job, JobKind, JobManager, JobStatus};

pub mod processed;

pub use processed::{ProcessedFile, ProcessedStore, content_hash};

/// Outcome of one full scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Files that matched the watch-directory patterns.
    pub found: usize,
    /// Jobs actually enqueued.
    pub enqueued: usize,
}

/// Multi-mode directory monitor feeding the job manager.
pub struct Scanner {
    config: RwLock<ScannerConfig>,
    manager: Arc<JobManager>,
    processed: Arc<ProcessedStore>,
    shutdown: Mutex<CancellationToken>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    watcher: Mutex<Option<RecommendedWatcher>>,
}

impl Scanner {
    /// Create a scanner over the given configuration and collaborators.
    pub fn new(
        config: ScannerConfig,
        manager: Arc<JobManager>,
        processed: Arc<ProcessedStore>,
    ) -> Self {
        Self {
            config: RwLock::new(config),
            manager,
            processed,
            shutdown: Mutex::new(CancellationToken::new()),
            tasks: Mutex::new(Vec::new()),
            watcher: Mutex::new(None),
        }
    }

    /// Snapshot the current configuration.
    pub fn config(&self) -> ScannerConfig {
        self.config.read().unwrap().clone()
    }

    /// Dispatch background tasks according to the configured mode.
    pub fn start(self: Arc<Self>) -> Result<()> {
        let config = self.config();
        if !config.enabled {
            debug!("scanner disabled; not starting");
            return Ok(());
        }
        let token = CancellationToken::new();
        *self.shutdown.lock().unwrap() = token.clone();

        match config.mode {
            ScanMode::Manual => {}
            ScanMode::Startup => Self::spawn_startup_scan(&self),
            ScanMode::Periodic => Self::spawn_periodic_scan(&self, token, config.interval_seconds),
            ScanMode::Watch => Self::start_watcher(&self, &config, token)?,
            ScanMode::Hybrid => {
                Self::spawn_startup_scan(&self);
                Self::start_watcher(&self, &config, token.clone())?;
                Self::spawn_periodic_scan(&self, token, config.interval_seconds);
            }
        }
        info!("scanner started in {:?} mode", config.mode);
        Ok(())
    }

    /// Signal shutdown, close watchers, wait for all background tasks, and
    /// persist the processed store.
    pub async fn stop(&self) {
        self.shutdown.lock().unwrap().cancel();
        *self.watcher.lock().unwrap() = None;
        let tasks = { std::mem::take(&mut *self.tasks.lock().unwrap()) };
        futures::future::join_all(tasks).await;
        if let Err(e) = self.processed.save() {
            warn!("failed to persist processed store on stop: {}", e);
        }
        info!("scanner stopped");
    }

    /// Replace the configuration: stop, swap, and start again when enabled.
    /// Not transactional; a brief window with no scanner running is
    /// observable.
    pub async fn update_config(self: Arc<Self>, new_config: ScannerConfig) -> Result<()> {
        self.stop().await;
        *self.config.write().unwrap() = new_config;
        if self.config().enabled {
            Arc::clone(&self).start()?;
        }
        Ok(())
    }

    /// Walk every watch directory once, enqueueing jobs for files that
    /// survive pattern matching, debouncing, and deduplication.
    pub async fn scan_all(&self) -> Result<ScanSummary> {
        let config = self.config();
        let mut summary = ScanSummary::default();
        for dir in &config.watch_dirs {
            if !dir.path.is_dir() {
                warn!("watch directory {} is not a directory", dir.path.display());
                continue;
            }
            let walker = if dir.recursive {
                WalkDir::new(&dir.path)
            } else {
                WalkDir::new(&dir.path).max_depth(1)
            };
            for entry in walker {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        warn!("walk error under {}: {}", dir.path.display(), e);
                        continue;
                    }
                };
                if !entry.file_type().is_file() {
                    continue;
                }
                let path = entry.path();
                let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                if !matches_patterns(name, dir) {
                    continue;
                }
                summary.found += 1;
                if !self.should_process(path, dir) {
                    continue;
                }
                if !config.auto_create_jobs {
                    continue;
                }
                match self.create_job_for_file(path, &config).await {
                    Ok(Some(_)) => summary.enqueued += 1,
                    Ok(None) => {}
                    Err(e) => warn!("failed to enqueue {}: {}", path.display(), e),
                }
            }
        }
        info!(
            "scan complete: {} matched, {} enqueued",
            summary.found, summary.enqueued
        );
        Ok(summary)
    }

    /// Debounce checks: dedup against the processed store, stat the file,
    /// enforce minimum size and age.
    fn should_process(&self, path: &Path, dir: &WatchDirectory) -> bool {
        if self.processed.is_processed(path) {
            return false;
        }
        let Ok(metadata) = std::fs::metadata(path) else {
            return false;
        };
        if metadata.len() < dir.min_size_bytes {
            return false;
        }
        if dir.min_age_seconds > 0 {
            let young = metadata
                .modified()
                .ok()
                .and_then(|mtime| SystemTime::now().duration_since(mtime).ok())
                .map(|age| age.as_secs() < dir.min_age_seconds)
                // Unreadable or future mtime counts as too young.
                .unwrap_or(true);
            if young {
                return false;
            }
        }
        true
    }

    /// Classify a file by extension, derive its output path, enqueue the
    /// job, and record the file as processed. Unknown extensions yield
    /// `Ok(None)`.
    async fn create_job_for_file(&self, path: &Path, config: &ScannerConfig) -> Result<Option<Job>> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();
        let kind = if contains_extension(&config.extract_extensions, &extension) {
            JobKind::Extract
        } else if contains_extension(&config.optimize_extensions, &extension) {
            JobKind::Optimize
        } else {
            debug!("ignoring {} (unhandled extension)", path.display());
            return Ok(None);
        };

        let destination = derive_output_path(path, kind, &config.output_directory);
        let input_size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        let hash = content_hash(path).unwrap_or_default();

        let mut job = Job::new(kind, path, destination);
        job.priority = config.default_priority;
        let job = self.manager.add_job(job).await?;
        info!(
            "enqueued {:?} job {} for {}",
            kind,
            job.id,
            path.display()
        );
        self.processed.mark_processed(ProcessedFile::new(
            path,
            hash,
            job.id.clone(),
            kind,
            input_size,
        ));
        Ok(Some(job))
    }

    fn spawn_startup_scan(this: &Arc<Self>) {
        let scanner = Arc::clone(this);
        let task = tokio::spawn(async move {
            if let Err(e) = scanner.scan_all().await {
                warn!("startup scan failed: {}", e);
            }
        });
        this.tasks.lock().unwrap().push(task);
    }

    fn spawn_periodic_scan(this: &Arc<Self>, token: CancellationToken, interval_seconds: u64) {
        let scanner = Arc::clone(this);
        let period = Duration::from_secs(interval_seconds.max(1));
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(period) => {
                        if let Err(e) = scanner.scan_all().await {
                            warn!("periodic scan failed: {}", e);
                        }
                    }
                }
            }
        });
        this.tasks.lock().unwrap().push(task);
    }

    /// Install file-system watchers on every watch directory and spawn the
    /// event-reaction task.
    fn start_watcher(this: &Arc<Self>, config: &ScannerConfig, token: CancellationToken) -> Result<()> {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
            let _ = tx.send(result);
        })?;
        for dir in &config.watch_dirs {
            let mode = if dir.recursive {
                RecursiveMode::Recursive
            } else {
                RecursiveMode::NonRecursive
            };
            if let Err(e) = watcher.watch(&dir.path, mode) {
                warn!("cannot watch {}: {}", dir.path.display(), e);
            }
        }
        *this.watcher.lock().unwrap() = Some(watcher);

        let scanner = Arc::clone(this);
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    event = rx.recv() => match event {
                        Some(Ok(event)) => {
                            if matches!(event.kind, EventKind::Create(_)) {
                                for path in event.paths {
                                    Self::handle_created(&scanner, path).await;
                                }
                            }
                        }
                        Some(Err(e)) => warn!("watch error: {}", e),
                        None => break,
                    }
                }
            }
        });
        this.tasks.lock().unwrap().push(task);
        Ok(())
    }

    /// React to one created path: find its watch directory by containment
    /// and pattern membership, then process immediately or after the
    /// configured settling delay.
    async fn handle_created(this: &Arc<Self>, path: PathBuf) {
        let config = this.config();
        if !config.auto_create_jobs {
            return;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return;
        };
        let Some(dir) = config
            .watch_dirs
            .iter()
            .find(|d| path.starts_with(&d.path) && matches_patterns(name, d))
            .cloned()
        else {
            return;
        };

        if dir.min_age_seconds > 0 {
            // Defer until the file has settled; cancellable by shutdown.
            let scanner = Arc::clone(this);
            let token = this.shutdown.lock().unwrap().clone();
            let delay = Duration::from_secs(dir.min_age_seconds);
            let task = tokio::spawn(async move {
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
                let config = scanner.config();
                if scanner.should_process(&path, &dir) {
                    if let Err(e) = scanner.create_job_for_file(&path, &config).await {
                        warn!("failed to enqueue {}: {}", path.display(), e);
                    }
                }
            });
            this.tasks.lock().unwrap().push(task);
        } else if this.should_process(&path, &dir) {
            if let Err(e) = this.create_job_for_file(&path, &config).await {
                warn!("failed to enqueue {}: {}", path.display(), e);
            }
        }
    }

    /// Completion hook: enrich the processed record of a finished job with
    /// output size and enrichment flags, so dashboards aggregate without
    /// inspecting jobs.
    pub fn on_job_complete(&self, job: &Job) {
        if job.status != JobStatus::Completed {
            return;
        }
        let metadata_cleaned = self.manager.config.ai.premium;
        self.processed.update(&job.source_path, |entry| {
            entry.output_size = job.output_size;
            entry.subtitles_generated = job.create_subtitles;
            entry.upscale_applied = job.upscale;
            entry.metadata_cleaned = metadata_cleaned;
        });
    }
}

/// Basename glob matching: excludes win, an empty include list accepts.
pub fn matches_patterns(file_name: &str, dir: &WatchDirectory) -> bool {
    if let Some(exclude) = build_glob_set(&dir.exclude_globs) {
        if exclude.is_match(file_name) {
            return false;
        }
    }
    if dir.include_globs.is_empty() {
        return true;
    }
    match build_glob_set(&dir.include_globs) {
        Some(include) => include.is_match(file_name),
        None => false,
    }
}

fn build_glob_set(patterns: &[String]) -> Option<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        match Glob::new(pattern) {
            Ok(glob) => {
                builder.add(glob);
            }
            Err(e) => warn!("invalid glob pattern {:?}: {}", pattern, e),
        }
    }
    builder.build().ok()
}

fn contains_extension(extensions: &[String], extension: &str) -> bool {
    extensions.iter().any(|e| e.eq_ignore_ascii_case(extension))
}

/// Derive the output path for a scanner-created job.
///
/// Extract jobs get a subdirectory named by the input stem; optimize jobs
/// get `<stem>_optimized.mkv`. Both land in the configured output directory
/// or, when it is empty, beside the input.
pub fn derive_output_path(input: &Path, kind: JobKind, output_directory: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let base = if output_directory.as_os_str().is_empty() {
        input.parent().unwrap_or_else(|| Path::new(".")).to_path_buf()
    } else {
        output_directory.to_path_buf()
    };
    match kind {
        JobKind::Extract => base.join(stem),
        _ => base.join(format!("{}_optimized.mkv", stem)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dir_with(include: &[&str], exclude: &[&str]) -> WatchDirectory {
        WatchDirectory {
            path: PathBuf::from("/m"),
            include_globs: include.iter().map(|s| s.to_string()).collect(),
            exclude_globs: exclude.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_include_accepts_everything() {
        let dir = dir_with(&[], &[]);
        assert!(matches_patterns("a.mkv", &dir));
        assert!(matches_patterns("anything.txt", &dir));
    }

    #[test]
    fn test_include_filters() {
        let dir = dir_with(&["*.mkv"], &[]);
        assert!(matches_patterns("a.mkv", &dir));
        assert!(!matches_patterns("a.mp4", &dir));
    }

    #[test]
    fn test_exclude_wins_over_include() {
        let dir = dir_with(&["*.mkv"], &["*sample*"]);
        assert!(matches_patterns("movie.mkv", &dir));
        assert!(!matches_patterns("movie.sample.mkv", &dir));
    }

    #[test]
    fn test_matching_is_case_sensitive() {
        let dir = dir_with(&["*.mkv"], &[]);
        assert!(!matches_patterns("a.MKV", &dir));
    }

    #[test]
    fn test_derive_output_path_optimize() {
        let dest = derive_output_path(Path::new("/m/a.mkv"), JobKind::Optimize, Path::new("/out"));
        assert_eq!(dest, Path::new("/out/a_optimized.mkv"));
    }

    #[test]
    fn test_derive_output_path_beside_input_when_unconfigured() {
        let dest = derive_output_path(Path::new("/m/a.mkv"), JobKind::Optimize, Path::new(""));
        assert_eq!(dest, Path::new("/m/a_optimized.mkv"));
    }

    #[test]
    fn test_derive_output_path_extract_subdirectory() {
        let dest = derive_output_path(Path::new("/in/movie.iso"), JobKind::Extract, Path::new("/out"));
        assert_eq!(dest, Path::new("/out/movie"));
    }
}
