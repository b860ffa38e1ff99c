//! CLI entry point for Encode Queue
//!
//! Inspects and maintains queue files using the same locking and generation
//! rules as the applications that share them.

use clap::{Parser, Subcommand};
use encode_queue::{Config, Job, JobState, QueueManager, SaveOutcome};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Encode Queue - inspect and maintain persisted encode queues
#[derive(Parser, Debug)]
#[command(name = "encode-queue")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (config.toml). Defaults plus
    /// environment overrides are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: QueueCommand,
}

#[derive(Subcommand, Debug)]
enum QueueCommand {
    /// Print one line per job
    List { queue: PathBuf },
    /// Print the generation token stored in the queue file
    Generation { queue: PathBuf },
    /// Load and save the queue again
    Resave {
        queue: PathBuf,
        /// Copy external resources into the configured work path
        #[arg(long, default_value = "false")]
        relocate: bool,
    },
    /// Remove complete and cancelled jobs
    Prune { queue: PathBuf },
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => match Config::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load config {}: {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => {
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    };

    let manager = QueueManager::new(&config);

    match args.command {
        QueueCommand::List { queue } => {
            for (index, job) in manager.load(&queue).iter().enumerate() {
                println!("{}", describe_job(index, job));
            }
            ExitCode::SUCCESS
        }
        QueueCommand::Generation { queue } => {
            match manager.file_generation(&queue) {
                Some(generation) => println!("{}", generation),
                None => println!("none"),
            }
            ExitCode::SUCCESS
        }
        QueueCommand::Resave { queue, relocate } => {
            let relocation = if relocate {
                match manager.relocation() {
                    Some(relocation) => Some(relocation.clone()),
                    None => {
                        eprintln!("--relocate needs work_path in the config or ENCODE_QUEUE_WORKDIR");
                        return ExitCode::FAILURE;
                    }
                }
            } else {
                None
            };
            let jobs = manager.load(&queue);
            save(&manager, &jobs, &queue, relocation.as_ref())
        }
        QueueCommand::Prune { queue } => {
            let jobs = manager.load(&queue);
            let before = jobs.len();
            let kept = prune_finished(jobs);
            info!(removed = before - kept.len(), remaining = kept.len(), "Pruned queue");
            save(&manager, &kept, &queue, None)
        }
    }
}

fn save(
    manager: &QueueManager,
    jobs: &[Job],
    queue: &Path,
    relocation: Option<&encode_queue::RelocationConfig>,
) -> ExitCode {
    let expected = manager.current_generation(queue);
    match manager.save(jobs, queue, relocation, expected.as_deref()) {
        Ok(SaveOutcome::Committed { generation }) => {
            println!("Saved {} jobs, generation {}", jobs.len(), generation);
            ExitCode::SUCCESS
        }
        Ok(SaveOutcome::Skipped { expected, found }) => {
            warn!(
                expected = %expected,
                found = %found,
                "Queue was modified by another process, nothing written"
            );
            println!("Skipped: queue changed on disk since it was loaded");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(path = %queue.display(), "Queue save failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn describe_job(index: usize, job: &Job) -> String {
    format!(
        "{:>3}  {:<9}  {}  [{}]  {} commands",
        index,
        job.status.state.to_string(),
        job.source.display(),
        job.video_settings.video_encoder_settings.name(),
        job.video_settings.conversion_commands.len()
    )
}

fn prune_finished(jobs: Vec<Job>) -> Vec<Job> {
    jobs.into_iter()
        .filter(|job| !matches!(job.status.state, JobState::Complete | JobState::Cancelled))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use encode_queue::encoder::CopySettings;
    use encode_queue::{EncoderSettings, VideoSettings};

    fn job_in_state(state: JobState) -> Job {
        let settings = VideoSettings::new(
            "/out/a.mkv",
            EncoderSettings::Copy(CopySettings::default()),
        );
        let mut job = Job::new("/in/a.mkv", "/work", settings);
        job.set_state(state);
        job
    }

    #[test]
    fn test_prune_keeps_unfinished_and_failed_jobs() {
        let jobs = vec![
            job_in_state(JobState::Ready),
            job_in_state(JobState::Complete),
            job_in_state(JobState::Error),
            job_in_state(JobState::Cancelled),
            job_in_state(JobState::Running),
        ];

        let states: Vec<JobState> = prune_finished(jobs)
            .into_iter()
            .map(|job| job.status.state)
            .collect();
        assert_eq!(states, vec![JobState::Ready, JobState::Error, JobState::Running]);
    }

    #[test]
    fn test_describe_job_line() {
        let line = describe_job(4, &job_in_state(JobState::Complete));
        assert!(line.starts_with("  4  complete"));
        assert!(line.contains("/in/a.mkv"));
        assert!(line.contains("[Copy]"));
        assert!(line.ends_with("0 commands"));
    }

    #[test]
    fn test_args_parse_resave_with_relocate() {
        let args = Args::try_parse_from(["encode-queue", "resave", "q.json", "--relocate"]).unwrap();
        match args.command {
            QueueCommand::Resave { queue, relocate } => {
                assert_eq!(queue, PathBuf::from("q.json"));
                assert!(relocate);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
