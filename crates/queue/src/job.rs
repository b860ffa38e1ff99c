//! Queue data model.
//!
//! A [`Job`] is one encode task as the queue file stores it: the source, a
//! per-job work directory, the settings block with its already-built
//! conversion commands, the track descriptors and the job status.

use crate::encoder::EncoderSettings;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Job is waiting to be encoded.
    Ready,
    /// Job is being encoded by the execution engine.
    Running,
    /// Job finished successfully.
    Complete,
    /// Job failed.
    Error,
    /// Job was cancelled by the user.
    Cancelled,
}

impl Default for JobState {
    fn default() -> Self {
        Self::Ready
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Ready => write!(f, "ready"),
            JobState::Running => write!(f, "running"),
            JobState::Complete => write!(f, "complete"),
            JobState::Error => write!(f, "error"),
            JobState::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Status block of a job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Status {
    pub state: JobState,
    /// Index into `conversion_commands` of the command currently running.
    pub current_command: usize,
}

impl Status {
    /// Check if the job is in a terminal state (complete, error or cancelled).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            JobState::Complete | JobState::Error | JobState::Cancelled
        )
    }
}

/// Crop rectangle in pixels removed from each edge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Crop {
    pub top: u32,
    pub bottom: u32,
    pub left: u32,
    pub right: u32,
}

/// Command arguments, either as an argument vector or as a legacy single line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandLine {
    Args(Vec<String>),
    Line(String),
}

impl CommandLine {
    /// Replace every occurrence of `old` with `new`, returning how many
    /// occurrences were replaced.
    pub fn replace_path(&mut self, old: &str, new: &str) -> usize {
        if old.is_empty() {
            return 0;
        }
        match self {
            CommandLine::Args(args) => args.iter_mut().map(|arg| replace_in(arg, old, new)).sum(),
            CommandLine::Line(line) => replace_in(line, old, new),
        }
    }

    /// Whether any part of the command contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        match self {
            CommandLine::Args(args) => args.iter().any(|arg| arg.contains(needle)),
            CommandLine::Line(line) => line.contains(needle),
        }
    }
}

impl Default for CommandLine {
    fn default() -> Self {
        Self::Args(Vec::new())
    }
}

fn replace_in(target: &mut String, old: &str, new: &str) -> usize {
    let count = target.matches(old).count();
    if count > 0 {
        *target = target.replace(old, new);
    }
    count
}

/// One already-built command of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub command: CommandLine,
    #[serde(default = "default_command_item")]
    pub item: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub exe: Option<String>,
    #[serde(default)]
    pub shell: bool,
    #[serde(default = "new_uuid")]
    pub uuid: String,
}

fn default_command_item() -> String {
    "command".to_string()
}

fn new_uuid() -> String {
    Uuid::new_v4().to_string()
}

impl Command {
    pub fn new(name: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: CommandLine::Args(args),
            item: default_command_item(),
            name: name.into(),
            exe: None,
            shell: false,
            uuid: new_uuid(),
        }
    }
}

/// Audio track descriptor, stored verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioTrack {
    pub index: u32,
    pub outdex: u32,
    pub codec: String,
    pub title: String,
    pub language: String,
    pub channels: u32,
    pub enabled: bool,
    pub conversion_codec: Option<String>,
    pub conversion_bitrate: Option<String>,
}

/// Subtitle track descriptor, stored verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubtitleTrack {
    pub index: u32,
    pub outdex: u32,
    pub codec: String,
    pub language: String,
    pub burn_in: bool,
    pub enabled: bool,
    pub disposition: Option<String>,
}

/// Attachment track, e.g. cover art.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentTrack {
    #[serde(default)]
    pub outdex: u32,
    #[serde(default = "default_attachment_type")]
    pub attachment_type: String,
    /// Absolute path of the attached file, if it lives outside the source.
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
}

fn default_attachment_type() -> String {
    "cover".to_string()
}

/// Settings block of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoSettings {
    #[serde(default)]
    pub crop: Option<Crop>,
    #[serde(default)]
    pub start_time: f64,
    #[serde(default)]
    pub end_time: f64,
    #[serde(default = "default_true")]
    pub fast_seek: bool,
    #[serde(default)]
    pub rotate: u32,
    #[serde(default)]
    pub vertical_flip: bool,
    #[serde(default)]
    pub horizontal_flip: bool,
    #[serde(default)]
    pub remove_hdr: bool,
    #[serde(default)]
    pub remove_metadata: bool,
    #[serde(default = "default_true")]
    pub copy_chapters: bool,
    #[serde(default)]
    pub video_title: String,
    pub output_path: PathBuf,
    pub video_encoder_settings: EncoderSettings,
    #[serde(default)]
    pub conversion_commands: Vec<Command>,
}

fn default_true() -> bool {
    true
}

impl VideoSettings {
    pub fn new(output_path: impl Into<PathBuf>, encoder: EncoderSettings) -> Self {
        Self {
            crop: None,
            start_time: 0.0,
            end_time: 0.0,
            fast_seek: true,
            rotate: 0,
            vertical_flip: false,
            horizontal_flip: false,
            remove_hdr: false,
            remove_metadata: false,
            copy_chapters: true,
            video_title: String::new(),
            output_path: output_path.into(),
            video_encoder_settings: encoder,
            conversion_commands: Vec::new(),
        }
    }

    /// Substitute `old` with `new` in every stored command.
    ///
    /// Returns the total number of replaced occurrences.
    pub fn replace_in_commands(&mut self, old: &str, new: &str) -> usize {
        self.conversion_commands
            .iter_mut()
            .map(|cmd| cmd.command.replace_path(old, new))
            .sum()
    }

    /// Whether any stored command mentions `needle`.
    pub fn commands_contain(&self, needle: &str) -> bool {
        self.conversion_commands
            .iter()
            .any(|cmd| cmd.command.contains(needle))
    }
}

/// One encode task in the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    #[serde(default = "new_uuid")]
    pub uuid: String,
    pub source: PathBuf,
    /// Per-job working/recovery directory.
    #[serde(default)]
    pub work_path: PathBuf,
    pub video_settings: VideoSettings,
    #[serde(default)]
    pub audio_tracks: Vec<AudioTrack>,
    #[serde(default)]
    pub subtitle_tracks: Vec<SubtitleTrack>,
    #[serde(default)]
    pub attachment_tracks: Vec<AttachmentTrack>,
    #[serde(default)]
    pub status: Status,
}

impl Job {
    /// Creates a ready job with a fresh identifier.
    pub fn new(
        source: impl Into<PathBuf>,
        work_path: impl Into<PathBuf>,
        video_settings: VideoSettings,
    ) -> Self {
        Self {
            uuid: new_uuid(),
            source: source.into(),
            work_path: work_path.into(),
            video_settings,
            audio_tracks: Vec::new(),
            subtitle_tracks: Vec::new(),
            attachment_tracks: Vec::new(),
            status: Status::default(),
        }
    }

    pub fn set_state(&mut self, state: JobState) {
        self.status.state = state;
    }

    /// Put the job back to ready so it runs again from the first command.
    pub fn requeue(&mut self) {
        self.status = Status::default();
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
