//! Durable snapshot of all jobs.
//!
//! The store is a single JSON document holding an array of job records,
//! rewritten on every state change. Writes go to a sibling temp file that is
//! renamed over the target, so a crash mid-write never corrupts the last
//! good snapshot. The manager owns the store exclusively; serialization
//! happens under the job-map lock, the disk write outside it.

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;

use crate::Result;
use crate::error::OptimarrError;

use super::Job;

/// JSON-file-backed job persistence.
#[derive(Debug, Clone)]
pub struct JobStore {
    path: PathBuf,
}

impl JobStore {
    /// Create a store backed by the given file path.
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    /// The backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load all persisted jobs. A missing file yields an empty set.
    pub fn load(&self) -> Result<Vec<Job>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let data = fs::read_to_string(&self.path)?;
        if data.trim().is_empty() {
            return Ok(Vec::new());
        }
        let jobs: Vec<Job> = serde_json::from_str(&data)?;
        debug!("loaded {} jobs from {}", jobs.len(), self.path.display());
        Ok(jobs)
    }

    /// Persist the full job set atomically (write temp sibling, rename).
    pub fn save(&self, jobs: &[Job]) -> Result<()> {
        let payload = serde_json::to_string_pretty(jobs)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, payload).map_err(|e| {
            OptimarrError::persistence(format!("writing {}: {}", tmp.display(), e))
        })?;
        fs::rename(&tmp, &self.path).map_err(|e| {
            OptimarrError::persistence(format!("renaming into {}: {}", self.path.display(), e))
        })?;
        Ok(())
    }
}
