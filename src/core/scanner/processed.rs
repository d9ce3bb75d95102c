//! Content-addressed record of finished files.
//!
//! The processed store maps absolute paths to records of the jobs that
//! consumed them, so rescans do not re-enqueue work. The content hash
//! covers only the first mebibyte of the file to bound I/O on large media;
//! it is a deduplication heuristic, not a security property.
//!
//! Concurrency is internal: a readers-writer lock protects the map, and
//! `save` snapshots under read and writes atomically (temp sibling, then
//! rename). The scanner owns the store exclusively.

use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::core::jobs::JobKind;
use crate::error::OptimarrError;

/// Number of leading bytes hashed per file.
const HASH_PREFIX_BYTES: usize = 1024 * 1024;

/// Record of one file already turned into a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedFile {
    /// Absolute path of the ingested file.
    pub path: PathBuf,
    /// blake3 hash of the file's first mebibyte.
    pub content_hash: String,
    /// Terminal job that processed this file.
    pub job_id: String,
    /// Kind of that job.
    pub kind: JobKind,
    /// Input size in bytes.
    pub input_size: u64,
    /// Output size in bytes, filled by the completion hook.
    pub output_size: u64,
    /// Whether a subtitle sidecar was generated.
    pub subtitles_generated: bool,
    /// Whether upscaling was applied.
    pub upscale_applied: bool,
    /// Whether the destination name was AI-cleaned.
    pub metadata_cleaned: bool,
    /// When the file was ingested.
    pub processed_at: DateTime<Utc>,
}

impl ProcessedFile {
    /// Build a fresh record at ingestion time; enrichment fields start
    /// false/zero and are filled by the completion hook.
    pub fn new<P: Into<PathBuf>>(path: P, content_hash: String, job_id: String, kind: JobKind, input_size: u64) -> Self {
        Self {
            path: path.into(),
            content_hash,
            job_id,
            kind,
            input_size,
            output_size: 0,
            subtitles_generated: false,
            upscale_applied: false,
            metadata_cleaned: false,
            processed_at: Utc::now(),
        }
    }
}

/// Persistent mapping from absolute path to `ProcessedFile`.
#[derive(Debug)]
pub struct ProcessedStore {
    path: PathBuf,
    entries: RwLock<HashMap<String, ProcessedFile>>,
}

impl ProcessedStore {
    /// Create a store backed by the given file, loading any existing
    /// content.
    pub fn new<P: Into<PathBuf>>(path: P) -> Result<Self> {
        let store = Self {
            path: path.into(),
            entries: RwLock::new(HashMap::new()),
        };
        store.load()?;
        Ok(store)
    }

    /// Whether the given absolute path has already been ingested.
    pub fn is_processed(&self, path: &Path) -> bool {
        self.entries
            .read()
            .unwrap()
            .contains_key(&path.to_string_lossy().into_owned())
    }

    /// Record an ingested file and persist immediately.
    pub fn mark_processed(&self, record: ProcessedFile) {
        let key = record.path.to_string_lossy().into_owned();
        self.entries.write().unwrap().insert(key, record);
        if let Err(e) = self.save() {
            warn!("failed to persist processed store: {}", e);
        }
    }

    /// Apply a mutation to an existing record (enrichment by the completion
    /// hook) and persist.
    pub fn update<F: FnOnce(&mut ProcessedFile)>(&self, path: &Path, mutate: F) {
        let key = path.to_string_lossy().into_owned();
        let updated = {
            let mut entries = self.entries.write().unwrap();
            match entries.get_mut(&key) {
                Some(entry) => {
                    mutate(entry);
                    true
                }
                None => false,
            }
        };
        if updated {
            if let Err(e) = self.save() {
                warn!("failed to persist processed store: {}", e);
            }
        }
    }

    /// Snapshot all records.
    pub fn list(&self) -> Vec<ProcessedFile> {
        self.entries.read().unwrap().values().cloned().collect()
    }

    /// Look up one record.
    pub fn get(&self, path: &Path) -> Option<ProcessedFile> {
        self.entries
            .read()
            .unwrap()
            .get(&path.to_string_lossy().into_owned())
            .cloned()
    }

    /// Load the backing file; missing file yields an empty map.
    pub fn load(&self) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }
        let data = fs::read_to_string(&self.path)?;
        if data.trim().is_empty() {
            return Ok(());
        }
        let entries: HashMap<String, ProcessedFile> = serde_json::from_str(&data)?;
        debug!(
            "loaded {} processed entries from {}",
            entries.len(),
            self.path.display()
        );
        *self.entries.write().unwrap() = entries;
        Ok(())
    }

    /// Persist atomically: snapshot under the read lock, write a temp
    /// sibling, rename over the target.
    pub fn save(&self) -> Result<()> {
        let payload = {
            let entries = self.entries.read().unwrap();
            serde_json::to_string_pretty(&*entries)?
        };
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, payload)
            .map_err(|e| OptimarrError::persistence(format!("writing {}: {}", tmp.display(), e)))?;
        fs::rename(&tmp, &self.path).map_err(|e| {
            OptimarrError::persistence(format!("renaming into {}: {}", self.path.display(), e))
        })?;
        Ok(())
    }
}

/// blake3 hash of a file's first mebibyte, hex-encoded.
pub fn content_hash(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path)?;
    let mut buffer = vec![0u8; HASH_PREFIX_BYTES];
    let mut read_total = 0;
    while read_total < buffer.len() {
        let n = file.read(&mut buffer[read_total..])?;
        if n == 0 {
            break;
        }
        read_total += n;
    }
    let mut hasher = blake3::Hasher::new();
    hasher.update(&buffer[..read_total]);
    Ok(hasher.finalize().to_hex().to_string())
}
