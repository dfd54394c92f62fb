use crate::error::EngineError;
use futures::future::{BoxFuture, FutureExt};
use serde::Deserialize;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info};

const PROGRESS_MARKER: &str = "[tubegrab:progress]";
const FILE_MARKER: &str = "[tubegrab:file]";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Downloading,
    Finished,
    #[default]
    #[serde(other)]
    Other,
}

/// Status payload the engine reports while a download runs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProgressEvent {
    #[serde(default)]
    pub status: EventStatus,
    pub filename: Option<String>,
    pub downloaded_bytes: Option<f64>,
    pub total_bytes: Option<f64>,
    pub total_bytes_estimate: Option<f64>,
    pub speed: Option<f64>,
    pub eta: Option<f64>,
}

pub type ProgressHook = Arc<dyn Fn(&ProgressEvent) + Send + Sync>;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MediaFormat {
    pub format_id: Option<String>,
    pub ext: Option<String>,
    pub height: Option<u32>,
    pub format_note: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MediaInfo {
    pub title: Option<String>,
    #[serde(default)]
    pub formats: Vec<MediaFormat>,
}

impl MediaInfo {
    /// Tallest encoding on offer, 0 when no format reports a height.
    pub fn max_height(&self) -> u32 {
        self.formats
            .iter()
            .filter_map(|format| format.height)
            .max()
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostProcessor {
    /// Re-encode the merged output into the given container.
    VideoConvertor { preferred_format: String },
    /// Drop the video stream and transcode audio.
    ExtractAudio { codec: String, quality: String },
}

#[derive(Clone, Default)]
pub struct EngineOptions {
    pub format: String,
    pub output_template: String,
    pub merge_output_format: Option<String>,
    pub postprocessors: Vec<PostProcessor>,
    pub progress_hooks: Vec<ProgressHook>,
}

impl std::fmt::Debug for EngineOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineOptions")
            .field("format", &self.format)
            .field("output_template", &self.output_template)
            .field("merge_output_format", &self.merge_output_format)
            .field("postprocessors", &self.postprocessors)
            .field("progress_hooks", &self.progress_hooks.len())
            .finish()
    }
}

impl EngineOptions {
    fn emit(&self, event: &ProgressEvent) {
        for hook in &self.progress_hooks {
            hook(event);
        }
    }
}

/// The external media extraction engine.
pub trait MediaEngine: Send + Sync {
    /// Fetch metadata without downloading anything.
    fn extract_info<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<MediaInfo, EngineError>>;

    /// Download `url` and return the final paths written.
    fn download<'a>(
        &'a self,
        url: &'a str,
        options: &'a EngineOptions,
    ) -> BoxFuture<'a, Result<Vec<PathBuf>, EngineError>>;
}

/// Drives the `yt-dlp` binary as a child process.
#[derive(Debug, Clone)]
pub struct YtDlp {
    binary: String,
    ffmpeg_location: Option<String>,
    timeout: Option<Duration>,
}

impl YtDlp {
    pub fn new(binary: impl Into<String>, ffmpeg_location: Option<String>, timeout_secs: u64) -> Self {
        Self {
            binary: binary.into(),
            ffmpeg_location,
            timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
        }
    }

    fn info_args(url: &str) -> Vec<String> {
        vec![
            "-J".to_string(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            url.to_string(),
        ]
    }

    pub fn download_args(&self, url: &str, options: &EngineOptions) -> Vec<String> {
        let mut args = vec![
            "--no-playlist".to_string(),
            "--newline".to_string(),
            "--progress".to_string(),
            "--progress-template".to_string(),
            format!("download:{PROGRESS_MARKER}%(progress)j"),
            "--print".to_string(),
            format!("after_move:{FILE_MARKER}%(filepath)s"),
            "-f".to_string(),
            options.format.clone(),
            "-o".to_string(),
            options.output_template.clone(),
        ];

        if let Some(container) = &options.merge_output_format {
            args.push("--merge-output-format".to_string());
            args.push(container.clone());
        }

        for postprocessor in &options.postprocessors {
            match postprocessor {
                PostProcessor::VideoConvertor { preferred_format } => {
                    args.push("--recode-video".to_string());
                    args.push(preferred_format.clone());
                }
                PostProcessor::ExtractAudio { codec, quality } => {
                    args.push("-x".to_string());
                    args.push("--audio-format".to_string());
                    args.push(codec.clone());
                    args.push("--audio-quality".to_string());
                    args.push(quality.clone());
                }
            }
        }

        if let Some(location) = &self.ffmpeg_location {
            args.push("--ffmpeg-location".to_string());
            args.push(location.clone());
        }

        args.push(url.to_string());
        args
    }

    fn command(&self, args: &[String]) -> Command {
        let mut command = Command::new(&self.binary);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }

    fn spawn_error(&self, error: std::io::Error) -> EngineError {
        if error.kind() == ErrorKind::NotFound {
            EngineError::ToolMissing {
                tool: self.binary.clone(),
            }
        } else {
            EngineError::Spawn {
                tool: self.binary.clone(),
                source: error,
            }
        }
    }

    async fn limited<T>(
        &self,
        fut: impl Future<Output = Result<T, EngineError>>,
    ) -> Result<T, EngineError> {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| EngineError::Timeout(limit.as_secs()))?,
            None => fut.await,
        }
    }

    async fn run_info(&self, url: &str) -> Result<MediaInfo, EngineError> {
        let output = self
            .command(&Self::info_args(url))
            .output()
            .await
            .map_err(|error| self.spawn_error(error))?;

        if !output.status.success() {
            return Err(EngineError::Failed {
                tool: self.binary.clone(),
                code: output.status.code(),
                message: last_line(&String::from_utf8_lossy(&output.stderr)),
            });
        }

        Ok(serde_json::from_slice(&output.stdout)?)
    }

    async fn run_download(
        &self,
        url: &str,
        options: &EngineOptions,
    ) -> Result<Vec<PathBuf>, EngineError> {
        let args = self.download_args(url, options);
        debug!("Running {} {:?}", self.binary, args);

        let mut child = self
            .command(&args)
            .spawn()
            .map_err(|error| self.spawn_error(error))?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            forward_lines(stdout, Stream::Stdout, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            forward_lines(stderr, Stream::Stderr, tx.clone());
        }
        drop(tx);

        let mut files = Vec::new();
        let mut last_error = String::new();

        while let Some((stream, line)) = rx.recv().await {
            match classify_line(&line) {
                OutputLine::Progress(event) => options.emit(&event),
                OutputLine::File(path) => {
                    info!("Engine wrote {}", path);
                    files.push(PathBuf::from(path));
                }
                OutputLine::Text(text) => {
                    if stream == Stream::Stderr && !text.is_empty() {
                        last_error = text.to_string();
                    }
                    debug!("{}: {}", self.binary, text);
                }
            }
        }

        let status = child.wait().await?;
        if !status.success() {
            return Err(EngineError::Failed {
                tool: self.binary.clone(),
                code: status.code(),
                message: if last_error.is_empty() {
                    "engine exited without a message".to_string()
                } else {
                    last_error
                },
            });
        }

        Ok(files)
    }
}

impl MediaEngine for YtDlp {
    fn extract_info<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<MediaInfo, EngineError>> {
        self.limited(self.run_info(url)).boxed()
    }

    fn download<'a>(
        &'a self,
        url: &'a str,
        options: &'a EngineOptions,
    ) -> BoxFuture<'a, Result<Vec<PathBuf>, EngineError>> {
        self.limited(self.run_download(url, options)).boxed()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

#[derive(Debug)]
enum OutputLine<'a> {
    Progress(ProgressEvent),
    File(&'a str),
    Text(&'a str),
}

fn forward_lines<R>(reader: R, stream: Stream, tx: mpsc::UnboundedSender<(Stream, String)>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        // Titles and paths are not guaranteed UTF-8; keep reading to EOF so
        // the child never sees a closed pipe.
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf)
                        .trim_end_matches(['\r', '\n'])
                        .to_string();
                    if tx.send((stream, line)).is_err() {
                        break;
                    }
                }
                Err(error) => {
                    debug!("Stopped reading engine output: {error}");
                    break;
                }
            }
        }
    });
}

fn classify_line(line: &str) -> OutputLine<'_> {
    let trimmed = line.trim();
    if let Some(payload) = trimmed.strip_prefix(PROGRESS_MARKER) {
        match serde_json::from_str::<ProgressEvent>(payload) {
            Ok(event) => return OutputLine::Progress(event),
            Err(error) => {
                debug!("Unreadable progress line ({error}): {payload}");
                return OutputLine::Text(trimmed);
            }
        }
    }
    if let Some(path) = trimmed.strip_prefix(FILE_MARKER) {
        return OutputLine::File(path.trim());
    }
    OutputLine::Text(trimmed)
}

fn last_line(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .next_back()
        .unwrap_or("engine exited without a message")
        .to_string()
}

#[cfg(test)]
pub(crate) mod fake {
    //! In-process engine used by orchestrator and HTTP tests.

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    pub struct FakeEngine {
        pub info: MediaInfo,
        pub info_error: Option<String>,
        pub download_error: Option<String>,
        pub delay: Option<Duration>,
        pub downloads: AtomicUsize,
    }

    impl FakeEngine {
        pub fn with_heights(title: &str, heights: &[u32]) -> Self {
            Self {
                info: MediaInfo {
                    title: Some(title.to_string()),
                    formats: heights
                        .iter()
                        .enumerate()
                        .map(|(idx, height)| MediaFormat {
                            format_id: Some(idx.to_string()),
                            ext: Some("mp4".to_string()),
                            height: Some(*height),
                            format_note: Some(format!("{height}p")),
                        })
                        .collect(),
                },
                ..Default::default()
            }
        }

        pub fn download_count(&self) -> usize {
            self.downloads.load(Ordering::SeqCst)
        }
    }

    fn failure(message: &str) -> EngineError {
        EngineError::Failed {
            tool: "fake".to_string(),
            code: Some(1),
            message: message.to_string(),
        }
    }

    impl MediaEngine for FakeEngine {
        fn extract_info<'a>(
            &'a self,
            _url: &'a str,
        ) -> BoxFuture<'a, Result<MediaInfo, EngineError>> {
            async move {
                match &self.info_error {
                    Some(message) => Err(failure(message)),
                    None => Ok(self.info.clone()),
                }
            }
            .boxed()
        }

        fn download<'a>(
            &'a self,
            _url: &'a str,
            options: &'a EngineOptions,
        ) -> BoxFuture<'a, Result<Vec<PathBuf>, EngineError>> {
            async move {
                self.downloads.fetch_add(1, Ordering::SeqCst);
                if let Some(delay) = self.delay {
                    tokio::time::sleep(delay).await;
                }
                if let Some(message) = &self.download_error {
                    return Err(failure(message));
                }

                let ext = if options
                    .postprocessors
                    .iter()
                    .any(|pp| matches!(pp, PostProcessor::ExtractAudio { .. }))
                {
                    "mp3".to_string()
                } else {
                    options
                        .merge_output_format
                        .clone()
                        .unwrap_or_else(|| "webm".to_string())
                };
                let title = self.info.title.clone().unwrap_or_else(|| "untitled".to_string());
                let path = options
                    .output_template
                    .replace("%(title)s", &title)
                    .replace("%(ext)s", &ext);

                for downloaded in [0.0, 512.0, 1024.0] {
                    options.emit(&ProgressEvent {
                        status: EventStatus::Downloading,
                        filename: Some(path.clone()),
                        downloaded_bytes: Some(downloaded),
                        total_bytes: Some(1024.0),
                        ..Default::default()
                    });
                }
                tokio::fs::write(&path, b"media").await?;
                options.emit(&ProgressEvent {
                    status: EventStatus::Finished,
                    filename: Some(path.clone()),
                    ..Default::default()
                });

                Ok(vec![PathBuf::from(path)])
            }
            .boxed()
        }
    }
}
