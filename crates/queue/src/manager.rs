//! Per-process entry point for queue persistence.
//!
//! A [`QueueManager`] is created once per process and handed to whoever needs
//! to load or save the queue. It owns the process-local lock, the generation
//! cache and the background save worker, which is started on first use and
//! stopped when the manager is shut down or dropped.

use crate::job::Job;
use crate::saver::SaveWorker;
use crate::store::{QueueStore, SaveOutcome, StoreError};
use encode_queue_config::{Config, RelocationConfig, SaverConfig};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

pub struct QueueManager {
    store: Arc<QueueStore>,
    saver_config: SaverConfig,
    relocation: Option<RelocationConfig>,
    worker: Mutex<Option<SaveWorker>>,
}

impl QueueManager {
    pub fn new(config: &Config) -> Self {
        Self {
            store: Arc::new(QueueStore::from_config(config)),
            saver_config: config.saver.clone(),
            relocation: config.relocation(),
            worker: Mutex::new(None),
        }
    }

    /// Relocation target from the configuration, if a work path is set.
    pub fn relocation(&self) -> Option<&RelocationConfig> {
        self.relocation.as_ref()
    }

    /// Load the queue at `path`; see [`QueueStore::load`].
    pub fn load(&self, path: &Path) -> Vec<Job> {
        self.store.load(path)
    }

    /// Save synchronously; see [`QueueStore::save`].
    pub fn save(
        &self,
        jobs: &[Job],
        path: &Path,
        relocation: Option<&RelocationConfig>,
        expected_generation: Option<&str>,
    ) -> Result<SaveOutcome, StoreError> {
        self.store.save(jobs, path, relocation, expected_generation)
    }

    /// Last generation this process observed for `path`.
    pub fn current_generation(&self, path: &Path) -> Option<String> {
        self.store.generations().get(path)
    }

    /// Generation currently stored in the file at `path`.
    pub fn file_generation(&self, path: &Path) -> Option<String> {
        self.store.read_generation(path)
    }

    /// Save in the background, starting the worker if needed.
    ///
    /// If the worker thread can't be started the save runs synchronously.
    pub fn save_async(&self, jobs: &[Job], path: &Path, relocation: Option<&RelocationConfig>) {
        let mut worker = self.worker.lock();
        if worker.is_none() {
            match SaveWorker::start(Arc::clone(&self.store), &self.saver_config) {
                Ok(started) => *worker = Some(started),
                Err(e) => {
                    warn!("Could not start queue save worker, saving synchronously: {}", e);
                    drop(worker);
                    let expected = self.current_generation(path);
                    if let Err(e) = self.save(jobs, path, relocation, expected.as_deref()) {
                        error!(path = %path.display(), "Queue save failed: {}", e);
                    }
                    return;
                }
            }
        }
        if let Some(worker) = worker.as_ref() {
            worker.save(jobs, path, relocation);
        }
    }

    /// Wait for everything queued so far to reach disk. Returns `true` when
    /// there was nothing pending or the checkpoint was reached in time.
    pub fn wait_for_pending(&self, timeout: Duration) -> bool {
        match self.worker.lock().as_ref() {
            Some(worker) => worker.wait_for_pending(timeout),
            None => true,
        }
    }

    /// [`wait_for_pending`](Self::wait_for_pending) with the configured flush timeout.
    pub fn flush(&self) -> bool {
        self.wait_for_pending(self.saver_config.flush_timeout())
    }

    /// Stop the background worker, waiting at most `timeout`. A later
    /// [`save_async`](Self::save_async) starts a new one.
    pub fn shutdown_async(&self, timeout: Duration) -> bool {
        match self.worker.lock().take() {
            Some(worker) => worker.shutdown(timeout),
            None => true,
        }
    }
}

impl Drop for QueueManager {
    fn drop(&mut self) {
        self.shutdown_async(self.saver_config.shutdown_timeout());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::{EncoderSettings, X264Settings};
    use crate::job::{Command, VideoSettings};
    use std::fs;
    use std::time::Instant;
    use tempfile::TempDir;

    fn test_config(work_path: Option<&Path>) -> Config {
        let mut config = Config::default();
        config.work_path = work_path.map(Path::to_path_buf);
        config.lock.timeout_secs = 2.0;
        config.lock.poll_interval_ms = 10;
        config.saver.poll_interval_ms = 20;
        config
    }

    fn make_job(name: &str, hdr10plus: Option<&str>) -> Job {
        let mut settings = VideoSettings::new(
            format!("/out/{}.mkv", name),
            EncoderSettings::X264(X264Settings::default()),
        );
        let mut args = vec!["ffmpeg".to_string(), "-i".to_string(), format!("/in/{}.mkv", name)];
        if let Some(meta) = hdr10plus {
            settings.video_encoder_settings =
                EncoderSettings::X265(crate::encoder::X265Settings {
                    hdr10plus_metadata: Some(meta.to_string()),
                    ..Default::default()
                });
            args.push("-x265-params".to_string());
            args.push(format!("dhdr10-info={}", meta));
        }
        settings
            .conversion_commands
            .push(Command::new("Encode", args));
        Job::new(format!("/in/{}.mkv", name), "/work", settings)
    }

    #[test]
    fn test_async_save_then_wait_reflects_update() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("queue.json");
        let manager = QueueManager::new(&test_config(None));

        let jobs: Vec<Job> = (0..50).map(|i| make_job(&i.to_string(), None)).collect();
        let start = Instant::now();
        manager.save_async(&jobs, &path, None);
        assert!(start.elapsed() < Duration::from_millis(100));

        assert!(manager.wait_for_pending(Duration::from_secs(10)));
        assert_eq!(manager.load(&path), jobs);
        assert_eq!(manager.current_generation(&path), manager.file_generation(&path));
    }

    #[test]
    fn test_relocation_scenario() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("queue.json");
        let work = temp_dir.path().join("work");
        let metadata = temp_dir.path().join("meta.json");
        fs::write(&metadata, "{}").unwrap();
        let metadata = metadata.to_string_lossy().into_owned();

        let manager = QueueManager::new(&test_config(Some(&work)));
        let relocation = manager.relocation().cloned().expect("work path configured");

        manager.save_async(&[make_job("hdr", Some(&metadata))], &path, Some(&relocation));
        assert!(manager.wait_for_pending(Duration::from_secs(10)));

        let loaded = manager.load(&path);
        let new_meta = loaded[0]
            .video_settings
            .video_encoder_settings
            .hdr10plus_metadata()
            .unwrap()
            .to_string();
        let new_meta = Path::new(&new_meta);
        assert_eq!(new_meta.parent().unwrap(), work.join("queue_extras"));
        assert!(new_meta
            .file_name()
            .unwrap()
            .to_string_lossy()
            .ends_with("_metadata.json"));
        assert!(!loaded[0].video_settings.commands_contain(&metadata));
    }

    #[test]
    fn test_load_tracks_generation_for_later_saves() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("queue.json");
        fs::write(&path, r#"{"queue": [], "_generation": "xyz"}"#).unwrap();

        let manager = QueueManager::new(&test_config(None));
        assert!(manager.load(&path).is_empty());
        assert_eq!(manager.current_generation(&path).as_deref(), Some("xyz"));

        let outcome = manager
            .save(&[make_job("a", None)], &path, None, Some("abc"))
            .unwrap();
        assert!(!outcome.is_committed());
        assert_eq!(manager.file_generation(&path).as_deref(), Some("xyz"));
    }

    #[test]
    fn test_shutdown_and_lazy_restart() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("queue.json");
        let manager = QueueManager::new(&test_config(None));

        // Nothing started yet
        assert!(manager.wait_for_pending(Duration::from_millis(10)));
        assert!(manager.shutdown_async(Duration::from_millis(10)));

        manager.save_async(&[make_job("a", None)], &path, None);
        assert!(manager.shutdown_async(Duration::from_secs(5)));
        assert_eq!(manager.load(&path).len(), 1);

        manager.save_async(&[make_job("a", None), make_job("b", None)], &path, None);
        assert!(manager.flush());
        assert_eq!(manager.load(&path).len(), 2);
    }

    #[test]
    fn test_drop_flushes_pending_saves() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("queue.json");
        {
            let manager = QueueManager::new(&test_config(None));
            manager.save_async(&[make_job("a", None)], &path, None);
        }

        let manager = QueueManager::new(&test_config(None));
        assert_eq!(manager.load(&path).len(), 1);
    }

    #[test]
    fn test_huge_configured_timeouts_do_not_panic() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("queue.json");
        let mut config = test_config(None);
        config.lock.timeout_secs = 1e300;
        config.saver.shutdown_timeout_secs = 1e300;
        config.saver.flush_timeout_secs = 1e300;

        let manager = QueueManager::new(&config);
        manager.save_async(&[make_job("a", None)], &path, None);
        assert!(manager.flush());
        assert_eq!(manager.load(&path).len(), 1);
    }
}
