//! Download orchestration: request validation, engine options, and the
//! background units that drive the engine.

use crate::engine::{EngineOptions, MediaEngine, PostProcessor, ProgressHook};
use crate::error::{EngineError, RequestError};
use crate::jobs::{JobRegistry, MediaKind};
use crate::quality::{self, Quality};
use crate::state::AppState;
use crate::validator::{extract_video_id, is_valid_video_url};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

pub const TARGET_CONTAINER: &str = "mp4";
pub const AUDIO_CODEC: &str = "mp3";
pub const AUDIO_QUALITY: &str = "192K";
pub const AUDIO_SELECTOR: &str = "bestaudio/best";

/// How many formats to log when inspecting a video before download.
const LOGGED_FORMATS: usize = 10;

pub fn validate_url(raw: &str) -> Result<&str, RequestError> {
    let url = raw.trim();
    if url.is_empty() {
        return Err(RequestError::MissingUrl);
    }
    if !is_valid_video_url(url) {
        return Err(RequestError::InvalidUrl);
    }
    Ok(url)
}

fn template_dir(dir: &Path) -> String {
    // `%` starts a field in output templates.
    dir.to_string_lossy().replace('%', "%%")
}

pub fn video_options(dir: &Path, quality_label: &str, hook: ProgressHook) -> EngineOptions {
    let suffix = Quality::from_label(quality_label)
        .map(Quality::label)
        .unwrap_or(quality::DEFAULT_LABEL);

    EngineOptions {
        format: quality::format_selector_for(quality_label).to_string(),
        output_template: format!("{}/%(title)s_{suffix}.%(ext)s", template_dir(dir)),
        merge_output_format: Some(TARGET_CONTAINER.to_string()),
        postprocessors: vec![PostProcessor::VideoConvertor {
            preferred_format: TARGET_CONTAINER.to_string(),
        }],
        progress_hooks: vec![hook],
    }
}

pub fn audio_options(dir: &Path, hook: ProgressHook) -> EngineOptions {
    EngineOptions {
        format: AUDIO_SELECTOR.to_string(),
        output_template: format!("{}/%(title)s.%(ext)s", template_dir(dir)),
        merge_output_format: None,
        postprocessors: vec![PostProcessor::ExtractAudio {
            codec: AUDIO_CODEC.to_string(),
            quality: AUDIO_QUALITY.to_string(),
        }],
        progress_hooks: vec![hook],
    }
}

/// Validates and schedules a video download. Returns as soon as the
/// background unit is spawned.
pub fn start_video(state: &AppState, raw_url: &str, quality_label: &str) -> Result<Uuid, RequestError> {
    let url = validate_url(raw_url)?.to_string();
    let (job_id, cancel) = state
        .jobs
        .create(MediaKind::Video, &url, Some(quality_label));
    let options = video_options(
        state.store.dir(),
        quality_label,
        state.progress.hook(job_id),
    );

    info!(
        "Queued video job {} for {} at {}",
        job_id,
        extract_video_id(&url).unwrap_or(&url),
        quality_label
    );

    let engine = state.engine.clone();
    let jobs = state.jobs.clone();
    let quality_label = quality_label.to_string();
    spawn_unit(state.jobs.clone(), job_id, cancel, async move {
        fetch_video(engine, jobs, job_id, url, quality_label, options).await
    });

    Ok(job_id)
}

/// Validates and schedules an audio extraction.
pub fn start_audio(state: &AppState, raw_url: &str) -> Result<Uuid, RequestError> {
    let url = validate_url(raw_url)?.to_string();
    let (job_id, cancel) = state.jobs.create(MediaKind::Audio, &url, None);
    let options = audio_options(state.store.dir(), state.progress.hook(job_id));

    info!(
        "Queued audio job {} for {}",
        job_id,
        extract_video_id(&url).unwrap_or(&url)
    );

    let engine = state.engine.clone();
    spawn_unit(state.jobs.clone(), job_id, cancel, async move {
        engine.download(&url, &options).await
    });

    Ok(job_id)
}

/// Runs one background unit to completion, failure or cancellation and
/// records the outcome. Nothing is reported back to the caller.
fn spawn_unit<F>(jobs: JobRegistry, job_id: Uuid, cancel: CancellationToken, work: F)
where
    F: Future<Output = Result<Vec<PathBuf>, EngineError>> + Send + 'static,
{
    tokio::spawn(async move {
        jobs.mark_running(job_id);

        let outcome = tokio::select! {
            result = work => result,
            _ = cancel.cancelled() => Err(EngineError::Cancelled),
        };

        match &outcome {
            Ok(files) => info!("Job {} finished with {} file(s)", job_id, files.len()),
            Err(EngineError::Cancelled) => info!("Job {} cancelled", job_id),
            Err(e) => error!("Download error in job {}: {}", job_id, e),
        }
        jobs.finish(job_id, &outcome);
    });
}

async fn fetch_video(
    engine: Arc<dyn MediaEngine>,
    jobs: JobRegistry,
    job_id: Uuid,
    url: String,
    quality_label: String,
    options: EngineOptions,
) -> Result<Vec<PathBuf>, EngineError> {
    let media = engine.extract_info(&url).await?;
    let title = media.title.as_deref().unwrap_or("Unknown");
    jobs.set_title(job_id, title);

    let max_height = media.max_height();
    info!("Video: {}", title);
    info!("Requested quality: {}", quality_label);
    info!("Max available height: {}p", max_height);
    info!("Format selector: {}", options.format);

    for format in media.formats.iter().take(LOGGED_FORMATS) {
        if let Some(height) = format.height {
            info!(
                "Available format: {} - {}p - {} - {}",
                format.format_id.as_deref().unwrap_or("?"),
                height,
                format.ext.as_deref().unwrap_or("?"),
                format.format_note.as_deref().unwrap_or("N/A")
            );
        }
    }

    let files = engine.download(&url, &options).await?;
    info!("Download completed successfully");

    if Quality::from_label(&quality_label) == Some(Quality::Uhd4k) {
        if max_height >= Quality::Uhd4k.height() {
            info!("4K download successful - true 4K quality achieved");
        } else {
            warn!(
                "4K requested but not available - downloaded best quality: {}p",
                max_height
            );
        }
    }

    Ok(files)
}
