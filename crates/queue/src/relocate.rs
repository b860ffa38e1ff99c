//! Resource relocation for saved queues.
//!
//! Jobs can reference files that live outside the queue's control: HDR10+
//! metadata sidecars and cover attachments. Before the queue is written, those
//! files are copied into the managed work directory and every textual
//! reference to the old path inside the job's commands is rewritten, so the
//! saved queue stays usable after the originals disappear.
//!
//! A resource that cannot be copied is dropped from the job; it never fails
//! the save as a whole.

use crate::job::Job;
use encode_queue_config::RelocationConfig;
use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Counts of what relocation did to one job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelocationReport {
    pub relocated: usize,
    pub dropped: usize,
}

/// Relocate the external resources referenced by `job`, mutating it in place.
///
/// The destination directories are created on demand. If they cannot be
/// created, every resource of the job is treated as a failed copy.
pub fn relocate_job(job: &mut Job, cfg: &RelocationConfig) -> RelocationReport {
    let mut report = RelocationReport::default();
    relocate_hdr10plus(job, cfg, &mut report);
    relocate_attachments(job, cfg, &mut report);
    report
}

fn relocate_hdr10plus(job: &mut Job, cfg: &RelocationConfig, report: &mut RelocationReport) {
    let Some(old) = job
        .video_settings
        .video_encoder_settings
        .hdr10plus_metadata()
        .map(str::to_owned)
    else {
        return;
    };

    let target = cfg
        .extras_dir()
        .join(format!("{}_metadata.json", Uuid::new_v4().simple()));

    match copy_resource(Path::new(&old), &target) {
        Ok(()) => {
            let new = target.to_string_lossy().into_owned();
            rewrite_commands(job, &old, &new);
            job.video_settings
                .video_encoder_settings
                .set_hdr10plus_metadata(Some(new));
            report.relocated += 1;
        }
        Err(e) => {
            error!(
                source = %job.source.display(),
                metadata = %old,
                "Could not save HDR10+ metadata file to queue recovery location, removing HDR10+: {}",
                e
            );
            job.video_settings
                .video_encoder_settings
                .set_hdr10plus_metadata(None);
            report.dropped += 1;
        }
    }
}

fn relocate_attachments(job: &mut Job, cfg: &RelocationConfig, report: &mut RelocationReport) {
    let covers_dir = cfg.covers_dir();
    let tracks = std::mem::take(&mut job.attachment_tracks);
    let mut kept = Vec::with_capacity(tracks.len());

    for mut track in tracks {
        let Some(old) = track.file_path.clone().filter(|p| !p.is_empty()) else {
            kept.push(track);
            continue;
        };

        let file_name = Path::new(&old)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "attachment".to_string());
        let target = covers_dir.join(format!("{}_{}", Uuid::new_v4().simple(), file_name));

        match copy_resource(Path::new(&old), &target) {
            Ok(()) => {
                let new = target.to_string_lossy().into_owned();
                rewrite_commands(job, &old, &new);
                track.file_path = Some(new);
                kept.push(track);
                report.relocated += 1;
            }
            Err(e) => {
                error!(
                    source = %job.source.display(),
                    attachment = %old,
                    "Could not save cover to queue recovery location, removing cover: {}",
                    e
                );
                report.dropped += 1;
            }
        }
    }

    job.attachment_tracks = kept;
}

fn copy_resource(source: &Path, target: &Path) -> io::Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(source, target)?;
    debug!(from = %source.display(), to = %target.display(), "Relocated queue resource");
    Ok(())
}

/// Replace `old` with `new` in every command of the job. Logs when the
/// reference was not found, which means the commands and the reference field
/// have drifted apart.
fn rewrite_commands(job: &mut Job, old: &str, new: &str) {
    let replaced = job.video_settings.replace_in_commands(old, new);
    if replaced == 0 && !job.video_settings.conversion_commands.is_empty() {
        error!(
            source = %job.source.display(),
            old = %old,
            new = %new,
            "Could not find relocated path in any conversion command"
        );
    } else if replaced == 0 {
        warn!(source = %job.source.display(), "Job has no conversion commands to rewrite");
    }
}
