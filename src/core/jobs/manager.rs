//! Concurrent, persistent, bounded-concurrency job manager.
//!
//! The manager owns the job map and the job store. Pending jobs flow
//! through a bounded FIFO channel to `N` long-lived worker tasks; the
//! channel dequeue is the ownership transfer, so no two workers ever hold
//! the same job. Every status transition is persisted before the worker
//! acts on the next state; progress ticks stay in memory (their loss is
//! acceptable, a lost transition is not).
//!
//! Cancellation uses nested scopes: the manager's stop signal is the root,
//! each job gets a child token, and the drivers derive grandchildren for
//! their subprocess and parser tasks. Cancelling a job scope propagates all
//! the way down to the external process.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use chrono::Utc;
use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::Result;
use crate::config::AppConfig;
use crate::error::OptimarrError;
use crate::services::ai::AiProvider;
use crate::services::extractor::Extractor;
use crate::services::transcoder::{MediaInfo, Transcoder};

use super::store::JobStore;
use super::{Job, JobKind, JobStatus};

/// Capacity of the pending-job queue, well above any realistic burst.
pub const QUEUE_CAPACITY: usize = 1024;

/// Hook invoked with every job that reaches a terminal state.
pub type CompletionHook = Box<dyn Fn(&Job) + Send + Sync>;

/// FIFO queue plus bounded worker pool plus pipeline composition.
pub struct JobManager {
    jobs: Arc<RwLock<HashMap<String, Job>>>,
    queue_tx: mpsc::Sender<String>,
    queue_rx: Mutex<Option<mpsc::Receiver<String>>>,
    stop_signal: CancellationToken,
    worker_count: usize,
    store: JobStore,
    pub(crate) config: AppConfig,
    pub(crate) ai: Option<Arc<dyn AiProvider>>,
    pub(crate) transcoder: Transcoder,
    pub(crate) extractor: Extractor,
    on_complete: RwLock<Option<CompletionHook>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl JobManager {
    /// Create a manager: instantiate the tool drivers (noting, not failing,
    /// when a binary is absent), load persisted jobs, and demote any
    /// interrupted `Processing` job back to `Pending`.
    pub fn new<P: Into<PathBuf>>(
        config: AppConfig,
        ai: Option<Arc<dyn AiProvider>>,
        store_path: P,
    ) -> Result<Self> {
        let transcoder = Transcoder::new(&config.tools.ffmpeg_path, &config.tools.ffprobe_path);
        let extractor = Extractor::new(&config.tools.makemkvcon_path);
        let store = JobStore::new(store_path);

        let mut jobs = HashMap::new();
        for mut job in store.load()? {
            if job.status == JobStatus::Processing {
                info!("demoting interrupted job {} to pending", job.id);
                job.status = JobStatus::Pending;
            }
            jobs.insert(job.id.clone(), job);
        }

        let (queue_tx, queue_rx) = mpsc::channel(QUEUE_CAPACITY);
        Ok(Self {
            jobs: Arc::new(RwLock::new(jobs)),
            queue_tx,
            queue_rx: Mutex::new(Some(queue_rx)),
            stop_signal: CancellationToken::new(),
            worker_count: config.general.worker_count.max(1),
            store,
            config,
            ai,
            transcoder,
            extractor,
            on_complete: RwLock::new(None),
            workers: Mutex::new(Vec::new()),
        })
    }

    /// Launch the worker tasks. Each worker waits on the stop signal and
    /// the queue, whichever fires first; dequeueing transfers ownership of
    /// the job to that worker.
    pub fn start(self: Arc<Self>) {
        let receiver = self.queue_rx.lock().unwrap().take();
        let Some(receiver) = receiver else {
            warn!("job manager already started");
            return;
        };
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let mut workers = self.workers.lock().unwrap();
        for worker_id in 0..self.worker_count {
            let manager = Arc::clone(&self);
            let receiver = Arc::clone(&receiver);
            workers.push(tokio::spawn(async move {
                debug!("worker {} started", worker_id);
                loop {
                    let next = {
                        let mut receiver = receiver.lock().await;
                        tokio::select! {
                            _ = manager.stop_signal.cancelled() => None,
                            id = receiver.recv() => id,
                        }
                    };
                    match next {
                        Some(id) => manager.process_job(&id).await,
                        None => break,
                    }
                }
                debug!("worker {} stopped", worker_id);
            }));
        }
    }

    /// Enqueue every currently-pending job exactly once, in id (creation)
    /// order. Called once at startup, after `start`.
    pub fn requeue_pending_jobs(&self) -> usize {
        let mut ids: Vec<String> = {
            let jobs = self.jobs.read().unwrap();
            jobs.values()
                .filter(|j| j.status == JobStatus::Pending)
                .map(|j| j.id.clone())
                .collect()
        };
        ids.sort();
        let mut requeued = 0;
        for id in ids {
            match self.queue_tx.try_send(id) {
                Ok(()) => requeued += 1,
                Err(_) => {
                    warn!("queue full while requeuing pending jobs");
                    break;
                }
            }
        }
        info!("requeued {} pending jobs", requeued);
        requeued
    }

    /// Insert a job and push it onto the queue.
    ///
    /// The map write and queue push are not atomic together, but the
    /// persist happens between them: a visible queue entry implies durable
    /// job state. Re-adding a known id overwrites the record and never
    /// pushes a second queue entry, whatever state the prior record was
    /// in; re-activating an overwritten job goes through
    /// `requeue_pending_jobs`.
    pub async fn add_job(&self, job: Job) -> Result<Job> {
        let id = job.id.clone();
        let known_id = {
            let mut jobs = self.jobs.write().unwrap();
            jobs.insert(id.clone(), job.clone()).is_some()
        };
        self.persist();
        if !known_id {
            self.queue_tx
                .try_send(id)
                .map_err(|_| OptimarrError::QueueFull)?;
        }
        Ok(job)
    }

    /// Cancel a live job. Returns `true` when an active cancellation scope
    /// was cancelled; `false` for unknown ids and jobs without one (not yet
    /// started, or already terminal).
    pub fn cancel_job(&self, id: &str) -> bool {
        let cancelled = {
            let mut jobs = self.jobs.write().unwrap();
            match jobs.get_mut(id) {
                Some(job) => match job.cancel_token.clone() {
                    Some(token) => {
                        token.cancel();
                        job.status = JobStatus::Cancelled;
                        info!("job {} cancelled", id);
                        true
                    }
                    None => false,
                },
                None => false,
            }
        };
        if cancelled {
            self.persist();
        }
        cancelled
    }

    /// Snapshot one job.
    pub fn get_job(&self, id: &str) -> Option<Job> {
        self.jobs.read().unwrap().get(id).cloned()
    }

    /// Snapshot all jobs, newest first by id.
    pub fn list_jobs(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.jobs.read().unwrap().values().cloned().collect();
        jobs.sort_by(|a, b| b.id.cmp(&a.id));
        jobs
    }

    /// Register the hook invoked after every terminal transition.
    pub fn set_completion_hook(&self, hook: CompletionHook) {
        *self.on_complete.write().unwrap() = Some(hook);
    }

    /// Probe a media file through the transcoder's probe subroutine.
    pub async fn media_info(&self, path: &Path) -> Result<MediaInfo> {
        self.transcoder.media_info(path).await
    }

    /// Stop the workers: cancel every in-flight job scope via the root
    /// signal, close the queue, join the workers, and persist.
    pub async fn shutdown(&self) {
        self.stop_signal.cancel();
        let workers = { std::mem::take(&mut *self.workers.lock().unwrap()) };
        for handle in workers {
            let _ = handle.await;
        }
        self.persist();
        info!("job manager stopped");
    }

    /// Execute one job to its terminal state.
    async fn process_job(&self, id: &str) {
        let token = {
            let mut jobs = self.jobs.write().unwrap();
            let Some(job) = jobs.get_mut(id) else {
                warn!("dequeued unknown job {}", id);
                return;
            };
            if job.status != JobStatus::Pending {
                debug!("skipping job {} in state {:?}", id, job.status);
                return;
            }
            let token = self.stop_signal.child_token();
            job.cancel_token = Some(token.clone());
            job.status = JobStatus::Processing;
            job.started_at = Some(Utc::now());
            job.input_size = std::fs::metadata(&job.source_path)
                .map(|m| m.len())
                .unwrap_or(0);
            token
        };
        self.persist();

        if let Some(job) = self.get_job(id) {
            info!(
                "job {} started: {:?} {}",
                id,
                job.kind,
                job.source_path.display()
            );
            if job.kind == JobKind::Optimize {
                self.clean_destination_name(id).await;
            }
        }

        let result = match self.get_job(id) {
            Some(job) => match job.kind {
                JobKind::Extract => self.run_extraction(&job, &token).await,
                JobKind::Optimize if self.is_disc_image(&job.source_path) => {
                    self.run_disc_image_pipeline(&job, &token).await
                }
                JobKind::Optimize => self.run_optimization(&job, &token).await,
                JobKind::Test => self.run_test_job(id, &token).await,
            },
            None => return,
        };

        let finished = {
            let mut jobs = self.jobs.write().unwrap();
            let Some(job) = jobs.get_mut(id) else { return };
            match result {
                Ok(()) => {
                    if job.status != JobStatus::Cancelled {
                        job.status = JobStatus::Completed;
                        job.progress = 100;
                        job.error.clear();
                        job.eta = "00:00:00".to_string();
                        job.output_size = std::fs::metadata(&job.destination_path)
                            .map(|m| m.len())
                            .unwrap_or(0);
                    }
                }
                Err(e) => {
                    // A user cancellation already wrote Cancelled; keep it.
                    if job.status != JobStatus::Cancelled {
                        if e.is_cancelled() {
                            job.status = JobStatus::Cancelled;
                        } else {
                            job.status = JobStatus::Failed;
                            job.error = e.to_string();
                        }
                    }
                }
            }
            job.completed_at = Some(Utc::now());
            job.cancel_token = None;
            job.clone()
        };
        self.persist();
        info!("job {} finished: {:?}", id, finished.status);

        if let Some(hook) = self.on_complete.read().unwrap().as_ref() {
            hook(&finished);
        }
    }

    /// Best-effort AI cleaning of the destination filename for premium
    /// optimize jobs. Failure is non-fatal and silent.
    async fn clean_destination_name(&self, id: &str) {
        if !self.config.ai.premium {
            return;
        }
        let Some(ai) = self.ai.as_ref() else { return };
        let Some(job) = self.get_job(id) else { return };
        let Some(filename) = job.source_path.file_name().and_then(|n| n.to_str()) else {
            return;
        };
        let prompt = crate::services::ai::prompts::clean_filename_prompt(filename);
        match ai.analyze(&prompt).await {
            Ok(title) => {
                let title = title.trim();
                if title.is_empty() || title.contains('/') || title.contains('\\') {
                    return;
                }
                let new_name = match job.destination_path.extension().and_then(|e| e.to_str()) {
                    Some(ext) => format!("{}.{}", title, ext),
                    None => title.to_string(),
                };
                debug!("job {}: cleaned destination name {:?}", id, new_name);
                self.update_job(id, |j| {
                    j.destination_path = j.destination_path.with_file_name(&new_name);
                });
            }
            Err(e) => debug!("job {}: filename cleaning skipped: {}", id, e),
        }
    }

    /// Simulated job: ten seconds of progress, yielding to cancellation
    /// every 500 ms.
    async fn run_test_job(&self, id: &str, token: &CancellationToken) -> Result<()> {
        for step in 1..=20u8 {
            tokio::select! {
                _ = token.cancelled() => return Err(OptimarrError::Cancelled),
                _ = tokio::time::sleep(std::time::Duration::from_millis(500)) => {}
            }
            self.update_job(id, |job| job.progress = step * 5);
        }
        Ok(())
    }

    /// Whether this source routes through the disc-image pipeline.
    pub(crate) fn is_disc_image(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|ext| {
                let ext = ext.to_lowercase();
                self.config
                    .scanner
                    .extract_extensions
                    .iter()
                    .any(|e| e.eq_ignore_ascii_case(&ext))
            })
            .unwrap_or(false)
    }

    /// Apply a mutation to one job under the write lock.
    pub(crate) fn update_job<F: FnOnce(&mut Job)>(&self, id: &str, mutate: F) {
        if let Some(job) = self.jobs.write().unwrap().get_mut(id) {
            mutate(job);
        }
    }

    /// Progress callback forwarding full parser events into the job record.
    pub(crate) fn progress_event_updater(
        &self,
        id: &str,
    ) -> impl Fn(crate::core::progress::ProgressEvent) + Send + 'static {
        let jobs = Arc::clone(&self.jobs);
        let id = id.to_string();
        move |event| {
            if let Some(job) = jobs.write().unwrap().get_mut(&id) {
                job.progress = event.percentage;
                job.fps = event.fps;
                job.eta = event.eta;
            }
        }
    }

    /// Progress callback forwarding a bare percentage into the job record.
    pub(crate) fn progress_percent_updater(&self, id: &str) -> impl Fn(u8) + Send + 'static {
        let jobs = Arc::clone(&self.jobs);
        let id = id.to_string();
        move |percent| {
            if let Some(job) = jobs.write().unwrap().get_mut(&id) {
                job.progress = percent;
            }
        }
    }

    /// Serialize a snapshot of the job map and write it to the store.
    ///
    /// The map lock is held only across the clone, not the disk write. A
    /// write failure is logged, never fatal; the next successful write
    /// heals the record.
    pub(crate) fn persist(&self) {
        let snapshot: Vec<Job> = {
            let jobs = self.jobs.read().unwrap();
            jobs.values().cloned().collect()
        };
        if let Err(e) = self.store.save(&snapshot) {
            warn!("failed to persist job store: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manager_with_store(temp: &TempDir) -> Arc<JobManager> {
        let config = AppConfig::default();
        Arc::new(JobManager::new(config, None, temp.path().join("jobs.json")).unwrap())
    }

    #[tokio::test]
    async fn test_add_job_persists_before_queue_push() {
        let temp = TempDir::new().unwrap();
        let manager = manager_with_store(&temp);
        let job = Job::new(JobKind::Test, "/m/a.mkv", "/out/a.mkv");
        manager.add_job(job.clone()).await.unwrap();
        // Workers never started, so the only way the store knows the job is
        // the pre-push persist.
        let stored = JobStore::new(temp.path().join("jobs.json")).load().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, job.id);
        assert_eq!(stored[0].status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn test_duplicate_add_leaves_single_job() {
        let temp = TempDir::new().unwrap();
        let manager = manager_with_store(&temp);
        let job = Job::new(JobKind::Test, "/m/a.mkv", "/out/a.mkv");
        manager.add_job(job.clone()).await.unwrap();
        let mut dup = job.clone();
        dup.priority = 9;
        manager.add_job(dup).await.unwrap();
        let jobs = manager.list_jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].priority, 9, "second add overwrites the record");
    }

    #[tokio::test]
    async fn test_re_add_over_terminal_record_does_not_requeue() {
        let temp = TempDir::new().unwrap();
        let store_path = temp.path().join("jobs.json");
        let mut done = Job::new(JobKind::Test, "/m/a.mkv", "/out/a.mkv");
        done.status = JobStatus::Completed;
        done.progress = 100;
        JobStore::new(&store_path).save(&[done.clone()]).unwrap();

        let manager =
            Arc::new(JobManager::new(AppConfig::default(), None, &store_path).unwrap());
        Arc::clone(&manager).start();

        // Re-add the same id as a fresh pending job. The map record is
        // overwritten, but no queue entry may appear for the known id.
        let mut again = done.clone();
        again.status = JobStatus::Pending;
        again.progress = 0;
        manager.add_job(again).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(600)).await;
        let jobs = manager.list_jobs();
        assert_eq!(jobs.len(), 1, "single record for the id");
        assert_eq!(
            jobs[0].status,
            JobStatus::Pending,
            "a worker never dequeued the re-added id"
        );
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_processing_jobs_demoted_on_load() {
        let temp = TempDir::new().unwrap();
        let store_path = temp.path().join("jobs.json");
        let mut job = Job::new(JobKind::Optimize, "/m/a.mkv", "/out/a.mkv");
        job.status = JobStatus::Processing;
        JobStore::new(&store_path).save(&[job.clone()]).unwrap();

        let manager = JobManager::new(AppConfig::default(), None, &store_path).unwrap();
        let loaded = manager.get_job(&job.id).unwrap();
        assert_eq!(loaded.status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn test_requeue_counts_only_pending() {
        let temp = TempDir::new().unwrap();
        let store_path = temp.path().join("jobs.json");
        let pending = Job::new(JobKind::Test, "/m/a.mkv", "/out/a.mkv");
        let mut done = Job::new(JobKind::Test, "/m/b.mkv", "/out/b.mkv");
        done.status = JobStatus::Completed;
        done.progress = 100;
        JobStore::new(&store_path)
            .save(&[pending.clone(), done])
            .unwrap();

        let manager = JobManager::new(AppConfig::default(), None, &store_path).unwrap();
        assert_eq!(manager.requeue_pending_jobs(), 1);
    }

    #[tokio::test]
    async fn test_cancel_unknown_or_idle_returns_false() {
        let temp = TempDir::new().unwrap();
        let manager = manager_with_store(&temp);
        assert!(!manager.cancel_job("no-such-id"));
        let job = Job::new(JobKind::Test, "/m/a.mkv", "/out/a.mkv");
        manager.add_job(job.clone()).await.unwrap();
        // Pending job has no active scope yet.
        assert!(!manager.cancel_job(&job.id));
    }

    #[tokio::test]
    async fn test_disc_image_detection_is_case_insensitive() {
        let temp = TempDir::new().unwrap();
        let manager = manager_with_store(&temp);
        assert!(manager.is_disc_image(Path::new("/in/movie.ISO")));
        assert!(manager.is_disc_image(Path::new("/in/movie.iso")));
        assert!(!manager.is_disc_image(Path::new("/in/movie.mkv")));
        assert!(!manager.is_disc_image(Path::new("/in/noextension")));
    }
}
