//! Process-local cache of the last generation token seen per queue file.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Maps a queue file path to the generation this process last loaded or saved.
///
/// The tracker is a cache, not a source of truth: the file on disk always
/// wins, and nothing here is persisted.
#[derive(Debug, Default)]
pub struct GenerationTracker {
    generations: RwLock<HashMap<PathBuf, String>>,
}

impl GenerationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last known generation for `path`, if any.
    pub fn get(&self, path: &Path) -> Option<String> {
        self.generations.read().get(path).cloned()
    }

    pub fn set(&self, path: &Path, generation: impl Into<String>) {
        self.generations
            .write()
            .insert(path.to_path_buf(), generation.into());
    }
}
