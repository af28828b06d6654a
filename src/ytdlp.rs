//! yt-dlp invocation: one call for metadata, one for download + transcode.

use std::{
    fmt,
    io::ErrorKind,
    path::{Path, PathBuf},
    process::Stdio,
    str::FromStr,
    time::Duration,
};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::{process::Command, time::timeout};
use tracing::debug;

use crate::error::{DownloadError, DownloadResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Mp3,
    M4a,
    Opus,
    Flac,
    Wav,
}

impl AudioFormat {
    /// Name understood by `--audio-format`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::M4a => "m4a",
            Self::Opus => "opus",
            Self::Flac => "flac",
            Self::Wav => "wav",
        }
    }

    pub fn extension(self) -> &'static str {
        self.as_str()
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Self::Mp3 => "audio/mpeg",
            Self::M4a => "audio/mp4",
            Self::Opus => "audio/ogg",
            Self::Flac => "audio/flac",
            Self::Wav => "audio/wav",
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unsupported audio format {0:?} (expected mp3, m4a, opus, flac or wav)")]
pub struct UnknownAudioFormat(String);

impl FromStr for AudioFormat {
    type Err = UnknownAudioFormat;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mp3" => Ok(Self::Mp3),
            "m4a" => Ok(Self::M4a),
            "opus" => Ok(Self::Opus),
            "flac" => Ok(Self::Flac),
            "wav" => Ok(Self::Wav),
            _ => Err(UnknownAudioFormat(value.to_string())),
        }
    }
}

/// Process-wide, read-only settings for the yt-dlp binary.
#[derive(Debug, Clone)]
pub struct ToolConfig {
    pub binary: String,
    pub ffmpeg_location: Option<String>,
    pub audio_format: AudioFormat,
    pub audio_quality: String,
    pub sample_rate: Option<u32>,
    pub timeout: Duration,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            binary: "yt-dlp".to_string(),
            ffmpeg_location: None,
            audio_format: AudioFormat::Mp3,
            audio_quality: "0".to_string(),
            sample_rate: None,
            timeout: Duration::from_secs(600),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackMetadata {
    pub title: String,
    pub duration: Option<u64>,
}

/// The two external calls a download needs.
#[async_trait]
pub trait MediaTool: Send + Sync {
    async fn fetch_metadata(&self, url: &str) -> DownloadResult<TrackMetadata>;

    /// Writes `<output_dir>/<base_name>.<ext>` for exactly one item.
    async fn download_audio(
        &self,
        url: &str,
        output_dir: &Path,
        base_name: &str,
    ) -> DownloadResult<()>;

    fn audio_format(&self) -> AudioFormat;
}

/// Options for the download + transcode call, built per request.
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub format_selector: &'static str,
    pub audio_format: AudioFormat,
    pub audio_quality: String,
    pub sample_rate: Option<u32>,
    pub embed_thumbnail: bool,
    pub add_metadata: bool,
    pub ffmpeg_location: Option<String>,
    pub output_template: String,
}

impl DownloadOptions {
    pub fn new(config: &ToolConfig, output_dir: &Path, base_name: &str) -> Self {
        let output_template = output_dir
            .join(format!("{base_name}.%(ext)s"))
            .to_string_lossy()
            .into_owned();

        Self {
            format_selector: "bestaudio/best",
            audio_format: config.audio_format,
            audio_quality: config.audio_quality.clone(),
            sample_rate: config.sample_rate,
            embed_thumbnail: true,
            add_metadata: true,
            ffmpeg_location: config.ffmpeg_location.clone(),
            output_template,
        }
    }

    pub fn to_args(&self, url: &str) -> Vec<String> {
        let mut args = vec![
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "-f".to_string(),
            self.format_selector.to_string(),
            "-x".to_string(),
            "--audio-format".to_string(),
            self.audio_format.as_str().to_string(),
            "--audio-quality".to_string(),
            self.audio_quality.clone(),
        ];

        if let Some(rate) = self.sample_rate {
            args.push("--postprocessor-args".to_string());
            args.push(format!("ExtractAudio:-ar {rate}"));
        }
        if self.embed_thumbnail {
            args.push("--embed-thumbnail".to_string());
        }
        if self.add_metadata {
            args.push("--add-metadata".to_string());
        }
        if let Some(location) = &self.ffmpeg_location {
            args.push("--ffmpeg-location".to_string());
            args.push(location.clone());
        }

        args.push("-o".to_string());
        args.push(self.output_template.clone());
        args.push(url.to_string());
        args
    }
}

pub fn metadata_args(url: &str) -> Vec<String> {
    vec![
        "--dump-single-json".to_string(),
        "--skip-download".to_string(),
        "--no-playlist".to_string(),
        "--no-warnings".to_string(),
        "--no-check-certificates".to_string(),
        "--prefer-free-formats".to_string(),
        url.to_string(),
    ]
}

#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    title: Option<String>,
    duration: Option<f64>,
}

pub fn parse_metadata(stdout: &[u8]) -> DownloadResult<TrackMetadata> {
    let info: YtDlpInfo = serde_json::from_slice(stdout)
        .map_err(|error| DownloadError::Metadata(format!("unexpected yt-dlp output: {error}")))?;

    let title = info
        .title
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| DownloadError::Metadata("yt-dlp returned no title".to_string()))?;
    let duration = info
        .duration
        .filter(|seconds| seconds.is_finite() && *seconds >= 0.0)
        .map(|seconds| seconds.round() as u64);

    Ok(TrackMetadata { title, duration })
}

#[derive(Debug, Clone)]
pub struct YtDlp {
    config: ToolConfig,
}

impl YtDlp {
    pub fn new(config: ToolConfig) -> Self {
        Self { config }
    }

    async fn run(
        &self,
        args: Vec<String>,
        on_failure: fn(String) -> DownloadError,
    ) -> DownloadResult<std::process::Output> {
        debug!("Running {} {:?}", self.config.binary, args);

        let mut command = Command::new(&self.config.binary);
        command.args(args).stdin(Stdio::null()).kill_on_drop(true);

        let output = timeout(self.config.timeout, command.output())
            .await
            .map_err(|_| DownloadError::Timeout(self.config.timeout))?
            .map_err(|error| {
                if error.kind() == ErrorKind::NotFound {
                    DownloadError::ToolNotFound(self.config.binary.clone())
                } else {
                    on_failure(format!("could not start yt-dlp: {error}"))
                }
            })?;

        if !output.status.success() {
            return Err(on_failure(run_error_message(&output.stderr)));
        }

        Ok(output)
    }
}

#[async_trait]
impl MediaTool for YtDlp {
    async fn fetch_metadata(&self, url: &str) -> DownloadResult<TrackMetadata> {
        let output = self.run(metadata_args(url), DownloadError::Metadata).await?;
        parse_metadata(&output.stdout)
    }

    async fn download_audio(
        &self,
        url: &str,
        output_dir: &Path,
        base_name: &str,
    ) -> DownloadResult<()> {
        let options = DownloadOptions::new(&self.config, output_dir, base_name);
        self.run(options.to_args(url), DownloadError::Tool).await?;
        Ok(())
    }

    fn audio_format(&self) -> AudioFormat {
        self.config.audio_format
    }
}

/// Expected location of the transcoded file.
pub fn output_path(output_dir: &Path, base_name: &str, format: AudioFormat) -> PathBuf {
    output_dir.join(format!("{base_name}.{}", format.extension()))
}

fn run_error_message(stderr: &[u8]) -> String {
    String::from_utf8_lossy(stderr)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .next_back()
        .unwrap_or("yt-dlp exited without an error message")
        .to_string()
}
