//! Queue file persistence.
//!
//! The queue file is a JSON document `{ "queue": [...], "_generation": "..." }`.
//! Loading never fails: a missing or corrupt file yields an empty queue so a
//! damaged file can not block startup. Saving is guarded by the queue lock,
//! refuses to overwrite a file that changed since the caller last observed it,
//! and replaces the file atomically via a temp file in the same directory.

use crate::generation::GenerationTracker;
use crate::job::Job;
use crate::lock::QueueLock;
use crate::relocate::relocate_job;
use encode_queue_config::{Config, RelocationConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Errors surfaced by [`QueueStore::save`].
///
/// Everything else that can go wrong while saving (missing resources, lock
/// timeouts, generation mismatches) is logged and degraded instead.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failed to create the directory holding the queue file.
    #[error("Failed to create queue directory {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },

    /// Failed to create or write the temporary queue file.
    #[error("Failed to write temporary queue file: {0}")]
    Io(#[from] io::Error),

    /// Failed to serialize the queue.
    #[error("Failed to serialize queue: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Failed to move the temporary file over the queue file.
    #[error("Failed to replace queue file: {0}")]
    Persist(io::Error),
}

/// Result of a save that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The queue was written under a new generation.
    Committed { generation: String },
    /// The file changed since `expected` was observed; nothing was written.
    Skipped { expected: String, found: String },
}

impl SaveOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, SaveOutcome::Committed { .. })
    }
}

#[derive(Serialize)]
struct QueueDocumentRef<'a> {
    queue: &'a [Job],
    #[serde(rename = "_generation")]
    generation: &'a str,
}

#[derive(Deserialize)]
struct QueueDocument {
    #[serde(default)]
    queue: Vec<Job>,
    #[serde(rename = "_generation", default)]
    generation: Option<String>,
}

/// Only the generation field; the queue is skipped without building any job.
#[derive(Deserialize)]
struct GenerationOnly {
    #[serde(rename = "_generation", default)]
    generation: Option<String>,
}

/// Loads and saves queue files.
#[derive(Debug, Default)]
pub struct QueueStore {
    lock: QueueLock,
    generations: GenerationTracker,
}

impl QueueStore {
    pub fn new(lock: QueueLock) -> Self {
        Self {
            lock,
            generations: GenerationTracker::new(),
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(QueueLock::from_config(&cfg.lock))
    }

    pub fn generations(&self) -> &GenerationTracker {
        &self.generations
    }

    /// Load the queue stored at `path`.
    ///
    /// A missing file is an empty queue. Any read or parse failure is logged
    /// and also yields an empty queue. On success the file's generation is
    /// recorded so a later save can detect concurrent writers.
    pub fn load(&self, path: &Path) -> Vec<Job> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                error!(path = %path.display(), "Could not open queue: {}", e);
                return Vec::new();
            }
        };

        let document: QueueDocument = match serde_json::from_str(&content) {
            Ok(document) => document,
            Err(e) => {
                error!(path = %path.display(), "Could not parse queue: {}", e);
                return Vec::new();
            }
        };

        if let Some(generation) = document.generation {
            self.generations.set(path, generation);
        }

        info!(path = %path.display(), jobs = document.queue.len(), "Loaded queue");
        document.queue
    }

    /// Read the generation currently stored at `path` without building jobs.
    ///
    /// Returns `None` if the file doesn't exist, can't be parsed, or carries
    /// no generation.
    pub fn read_generation(&self, path: &Path) -> Option<String> {
        let content = fs::read_to_string(path).ok()?;
        match serde_json::from_str::<GenerationOnly>(&content) {
            Ok(doc) => doc.generation,
            Err(e) => {
                debug!(path = %path.display(), "Could not read queue generation: {}", e);
                None
            }
        }
    }

    /// Save `jobs` to `path`.
    ///
    /// When `relocation` is given, external resources are copied into the
    /// managed work directory first. When `expected_generation` is given and
    /// the file currently carries a different generation, nothing is written
    /// and [`SaveOutcome::Skipped`] is returned.
    ///
    /// # Errors
    ///
    /// Serialization, temp file and rename failures are returned; the temp
    /// file is removed in every failure case.
    pub fn save(
        &self,
        jobs: &[Job],
        path: &Path,
        relocation: Option<&RelocationConfig>,
        expected_generation: Option<&str>,
    ) -> Result<SaveOutcome, StoreError> {
        let mut records = jobs.to_vec();
        if let Some(cfg) = relocation {
            for job in records.iter_mut() {
                relocate_job(job, cfg);
            }
        }

        let dir = parent_dir(path);
        fs::create_dir_all(&dir).map_err(|source| StoreError::CreateDir {
            path: dir.clone(),
            source,
        })?;

        let guard = self.lock.acquire(path);
        if !guard.acquired() {
            warn!(
                path = %path.display(),
                "Proceeding with queue save without lock - potential race condition"
            );
        }

        if let Some(expected) = expected_generation {
            if let Some(found) = self.read_generation(path) {
                if found != expected {
                    error!(
                        path = %path.display(),
                        expected = %expected,
                        found = %found,
                        "Queue file generation mismatch, skipping save to avoid overwriting newer data"
                    );
                    return Ok(SaveOutcome::Skipped {
                        expected: expected.to_string(),
                        found,
                    });
                }
            }
        }

        let generation = Uuid::new_v4().simple().to_string();
        if let Err(e) = write_atomically(&records, &generation, path, &dir) {
            error!(
                path = %path.display(),
                jobs = records.len(),
                "Could not save queue: {}",
                e
            );
            return Err(e);
        }

        self.generations.set(path, generation.clone());
        debug!(path = %path.display(), generation = %generation, jobs = records.len(), "Saved queue");
        drop(guard);

        Ok(SaveOutcome::Committed { generation })
    }
}

/// Serialize into a temp file next to `path`, then rename it over `path`.
///
/// Dropping the `NamedTempFile` on any early return deletes it.
fn write_atomically(
    jobs: &[Job],
    generation: &str,
    path: &Path,
    dir: &Path,
) -> Result<(), StoreError> {
    let temp = tempfile::Builder::new()
        .prefix("queue_")
        .suffix(".json.tmp")
        .tempfile_in(dir)?;

    let mut writer = BufWriter::new(temp);
    serde_json::to_writer_pretty(
        &mut writer,
        &QueueDocumentRef {
            queue: jobs,
            generation,
        },
    )?;
    writer.flush()?;
    let temp: NamedTempFile = writer.into_inner().map_err(|e| e.into_error())?;
    temp.as_file().sync_all()?;

    // The handed-back temp file is dropped (and deleted) with the error.
    temp.persist(path).map_err(|e| StoreError::Persist(e.error))?;
    Ok(())
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
