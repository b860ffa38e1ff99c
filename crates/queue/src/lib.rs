//! Encode Queue
//!
//! Durable persistence for a video-encoding job queue shared by several
//! processes: locked, atomic, generation-checked saves, relocation of external
//! resources into the work directory, and a background save worker.

pub mod encoder;
pub mod generation;
pub mod job;
pub mod lock;
pub mod manager;
pub mod relocate;
pub mod saver;
pub mod store;

pub use encode_queue_config as config;
pub use encode_queue_config::{Config, RelocationConfig};
pub use encoder::EncoderSettings;
pub use generation::GenerationTracker;
pub use job::{
    AttachmentTrack, AudioTrack, Command, CommandLine, Crop, Job, JobState, Status,
    SubtitleTrack, VideoSettings,
};
pub use lock::{lock_path, LockGuard, QueueLock};
pub use manager::QueueManager;
pub use relocate::{relocate_job, RelocationReport};
pub use saver::{SaveRequest, SaveWorker};
pub use store::{QueueStore, SaveOutcome, StoreError};
