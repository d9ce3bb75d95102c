//! Job scheduling: data model, durable store, manager and pipelines.
//!
//! A `Job` is the unit of work flowing through the service. Jobs are created
//! by the scanner or the facade, persisted by the `JobStore` on every status
//! transition, and executed by the `JobManager`'s bounded worker pool.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

pub mod manager;
mod pipeline;
pub mod store;

pub use manager::JobManager;
pub use store::JobStore;

use crate::services::transcoder::Resolution;

/// The kind of work a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    /// Rip the main feature of a disc or disc image to MKV.
    Extract,
    /// Transcode a media file (or a disc image, via the composed pipeline).
    Optimize,
    /// Simulated 10-second job used for scheduling verification.
    Test,
}

/// Lifecycle state of a job.
///
/// Transitions are monotone except for the Processing → Pending demotion
/// applied to interrupted jobs on restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Queued, not yet picked up by a worker.
    Pending,
    /// Owned by a worker; a cancellation scope is active.
    Processing,
    /// Finished successfully; progress is 100 and `error` is empty.
    Completed,
    /// Finished unsuccessfully; `error` is non-empty.
    Failed,
    /// Terminated by user request or shutdown.
    Cancelled,
}

impl JobStatus {
    /// Whether the job can no longer change state.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled)
    }
}

/// A unit of work known to the job manager.
///
/// Serialized with camelCase field names into the job store. The
/// cancellation token is runtime-only state and never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// Opaque, time-sortable identifier.
    pub id: String,
    /// What this job does.
    pub kind: JobKind,
    /// Absolute input path, previously confined to the source root.
    pub source_path: PathBuf,
    /// Absolute output path, previously confined to the output root.
    pub destination_path: PathBuf,
    /// Current lifecycle state.
    pub status: JobStatus,
    /// Completion percentage in [0, 100].
    pub progress: u8,
    /// Encoder frames per second while processing.
    pub fps: f32,
    /// Remaining time estimate, `HH:MM:SS`.
    pub eta: String,
    /// Terminal error message; set only when `status` is Failed.
    pub error: String,
    /// Advisory priority; the queue dispatches FIFO regardless.
    pub priority: i32,
    /// Whether to generate a subtitle sidecar after transcoding.
    pub create_subtitles: bool,
    /// Whether to upscale video to `resolution`.
    pub upscale: bool,
    /// Target resolution when upscaling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Set when a worker picks the job up.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// Set when the job reaches a terminal state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Input file size in bytes, captured at start.
    pub input_size: u64,
    /// Output file size in bytes, captured at completion.
    pub output_size: u64,
    /// Per-job cancellation scope; present only while processing.
    #[serde(skip)]
    pub cancel_token: Option<CancellationToken>,
}

impl Job {
    /// Create a new pending job.
    pub fn new<S: Into<PathBuf>, D: Into<PathBuf>>(kind: JobKind, source: S, destination: D) -> Self {
        Self {
            id: generate_job_id(),
            kind,
            source_path: source.into(),
            destination_path: destination.into(),
            status: JobStatus::Pending,
            progress: 0,
            fps: 0.0,
            eta: "00:00:00".to_string(),
            error: String::new(),
            priority: 0,
            create_subtitles: false,
            upscale: false,
            resolution: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            input_size: 0,
            output_size: 0,
            cancel_token: None,
        }
    }
}

/// Generate a job identifier: UUIDv7, time-ordered with a cryptographically
/// random suffix, so lexical order follows creation order.
pub fn generate_job_id() -> String {
    uuid::Uuid::now_v7().to_string()
}
