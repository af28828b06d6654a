//! End-to-end download flow: validate, scratch, metadata, transcode, read, release.

use std::{io::ErrorKind, path::Path, sync::Arc};

use tracing::{debug, info};

use crate::{
    error::{DownloadError, DownloadFailure, DownloadResult},
    filename::sanitize,
    links::{has_playlist_marker, is_supported_url, to_single_item_url},
    scratch::ScratchSpace,
    ytdlp::{MediaTool, output_path},
};

/// Base name yt-dlp writes into the scratch directory.
const OUTPUT_BASE_NAME: &str = "audio";

#[derive(Debug, Clone)]
pub struct AudioDownload {
    pub title: String,
    pub filename: String,
    pub duration: u64,
    pub size: u64,
    pub content_type: &'static str,
    pub buffer: Vec<u8>,
}

#[derive(Clone)]
pub struct AudioDownloader {
    tool: Arc<dyn MediaTool>,
    scratch: ScratchSpace,
}

impl AudioDownloader {
    pub fn new(tool: Arc<dyn MediaTool>, scratch: ScratchSpace) -> Self {
        Self { tool, scratch }
    }

    pub async fn download(&self, url: &str) -> Result<AudioDownload, DownloadFailure> {
        self.try_download(url).await.map_err(DownloadFailure::from)
    }

    async fn try_download(&self, url: &str) -> DownloadResult<AudioDownload> {
        if !is_supported_url(url) {
            return Err(DownloadError::invalid_url(url, "not a YouTube link"));
        }

        let clean_url = if has_playlist_marker(url) {
            let single = to_single_item_url(url)?;
            debug!("Playlist link {:?} reduced to {:?}", url, single);
            single
        } else {
            url.to_string()
        };

        let scratch = self.scratch.acquire().await?;
        let outcome = self.fetch_into(&clean_url, scratch.path()).await;
        scratch.release().await;
        outcome
    }

    async fn fetch_into(&self, url: &str, dir: &Path) -> DownloadResult<AudioDownload> {
        let metadata = self.tool.fetch_metadata(url).await?;
        info!("Downloading {:?} ({:?})", metadata.title, url);

        self.tool.download_audio(url, dir, OUTPUT_BASE_NAME).await?;

        let format = self.tool.audio_format();
        let path = output_path(dir, OUTPUT_BASE_NAME, format);
        let buffer = match tokio::fs::read(&path).await {
            Ok(buffer) => buffer,
            Err(error) if error.kind() == ErrorKind::NotFound => {
                return Err(DownloadError::OutputMissing(path));
            }
            Err(error) => {
                return Err(DownloadError::filesystem(
                    "could not read downloaded audio",
                    error,
                ));
            }
        };

        Ok(AudioDownload {
            filename: format!("{}.{}", sanitize(&metadata.title), format.extension()),
            title: metadata.title,
            duration: metadata.duration.unwrap_or(0),
            size: buffer.len() as u64,
            content_type: format.content_type(),
            buffer,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeTool, ToolCall, wait_for_removal};
    use std::time::Duration;
    use tempfile::TempDir;

    const WATCH_URL: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";

    fn downloader(tool: Arc<FakeTool>, temp: &TempDir) -> AudioDownloader {
        AudioDownloader::new(tool, ScratchSpace::new(temp.path().join("scratch")))
    }

    fn scratch_entries(temp: &TempDir) -> usize {
        match std::fs::read_dir(temp.path().join("scratch")) {
            Ok(entries) => entries.count(),
            Err(_) => 0,
        }
    }

    #[tokio::test]
    async fn downloads_single_item() {
        let temp = TempDir::new().unwrap();
        let tool = Arc::new(FakeTool::new("Test Video", Some(180), 1_024_000));
        let service = downloader(tool.clone(), &temp);

        let result = service.download(WATCH_URL).await.unwrap();

        assert_eq!(result.title, "Test Video");
        assert_eq!(result.filename, "Test Video.mp3");
        assert_eq!(result.duration, 180);
        assert_eq!(result.size, 1_024_000);
        assert_eq!(result.buffer.len(), 1_024_000);
        assert_eq!(result.content_type, "audio/mpeg");
        assert_eq!(
            tool.calls(),
            vec![
                ToolCall::Metadata(WATCH_URL.to_string()),
                ToolCall::Download(WATCH_URL.to_string()),
            ]
        );
        assert_eq!(scratch_entries(&temp), 0);
    }

    #[tokio::test]
    async fn rejects_unsupported_url_before_any_work() {
        let temp = TempDir::new().unwrap();
        let tool = Arc::new(FakeTool::new("Test Video", Some(180), 10));
        let service = downloader(tool.clone(), &temp);

        let failure = service
            .download("https://www.vimeo.com/123456")
            .await
            .unwrap_err();

        assert!(matches!(failure.kind(), DownloadError::InvalidUrl { .. }));
        assert!(failure.to_string().contains("invalid URL"));
        assert!(tool.calls().is_empty());
        assert!(!temp.path().join("scratch").exists());
    }

    #[tokio::test]
    async fn playlist_links_reach_the_tool_stripped() {
        let temp = TempDir::new().unwrap();
        let tool = Arc::new(FakeTool::new("Test Video", Some(180), 10));
        let service = downloader(tool.clone(), &temp);

        service
            .download(&format!("{WATCH_URL}&list=PLxxx"))
            .await
            .unwrap();

        assert_eq!(
            tool.calls(),
            vec![
                ToolCall::Metadata(WATCH_URL.to_string()),
                ToolCall::Download(WATCH_URL.to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn playlist_without_video_id_is_invalid() {
        let temp = TempDir::new().unwrap();
        let tool = Arc::new(FakeTool::new("Test Video", Some(180), 10));
        let service = downloader(tool.clone(), &temp);

        let failure = service
            .download("https://www.youtube.com/playlist?list=PLxxx")
            .await
            .unwrap_err();

        assert!(matches!(failure.kind(), DownloadError::InvalidUrl { .. }));
        assert!(tool.calls().is_empty());
        assert!(!temp.path().join("scratch").exists());
    }

    #[tokio::test]
    async fn tool_failure_still_releases_scratch() {
        let temp = TempDir::new().unwrap();
        let tool = Arc::new(FakeTool::new("Test Video", Some(180), 10).failing_download());
        let service = downloader(tool.clone(), &temp);

        let failure = service.download(WATCH_URL).await.unwrap_err();

        assert!(matches!(failure.kind(), DownloadError::Tool(_)));
        let dirs = tool.output_dirs();
        assert_eq!(dirs.len(), 1);
        assert!(!dirs[0].exists());
        assert_eq!(scratch_entries(&temp), 0);
    }

    #[tokio::test]
    async fn metadata_failure_skips_download_and_releases_scratch() {
        let temp = TempDir::new().unwrap();
        let tool = Arc::new(FakeTool::new("Test Video", Some(180), 10).failing_metadata());
        let service = downloader(tool.clone(), &temp);

        let failure = service.download(WATCH_URL).await.unwrap_err();

        assert!(matches!(failure.kind(), DownloadError::Metadata(_)));
        assert_eq!(tool.calls(), vec![ToolCall::Metadata(WATCH_URL.to_string())]);
        assert!(temp.path().join("scratch").exists());
        assert_eq!(scratch_entries(&temp), 0);
    }

    #[tokio::test]
    async fn missing_output_is_reported() {
        let temp = TempDir::new().unwrap();
        let tool = Arc::new(FakeTool::new("Test Video", Some(180), 10).without_output());
        let service = downloader(tool.clone(), &temp);

        let failure = service.download(WATCH_URL).await.unwrap_err();

        assert!(matches!(failure.kind(), DownloadError::OutputMissing(_)));
        assert_eq!(scratch_entries(&temp), 0);
    }

    #[tokio::test]
    async fn abandoned_download_still_removes_scratch() {
        let temp = TempDir::new().unwrap();
        let tool = Arc::new(FakeTool::new("Test Video", Some(180), 10).hanging_download());
        let service = downloader(tool.clone(), &temp);

        let outcome =
            tokio::time::timeout(Duration::from_millis(100), service.download(WATCH_URL)).await;
        assert!(outcome.is_err());

        let dirs = tool.output_dirs();
        assert_eq!(dirs.len(), 1);
        assert!(wait_for_removal(&dirs[0]).await);
        assert_eq!(scratch_entries(&temp), 0);
    }

    #[tokio::test]
    async fn unknown_duration_becomes_zero() {
        let temp = TempDir::new().unwrap();
        let tool = Arc::new(FakeTool::new("Live Set", None, 10));
        let service = downloader(tool, &temp);

        let result = service.download(WATCH_URL).await.unwrap();
        assert_eq!(result.duration, 0);
    }

    #[tokio::test]
    async fn reserved_characters_never_reach_the_filename() {
        let temp = TempDir::new().unwrap();
        let tool = Arc::new(FakeTool::new("a<b>c:d\"e/f\\g|h?i*j", Some(1), 10));
        let service = downloader(tool, &temp);

        let result = service.download(WATCH_URL).await.unwrap();

        assert_eq!(result.filename, "a_b_c_d_e_f_g_h_i_j.mp3");
        assert_eq!(result.title, "a<b>c:d\"e/f\\g|h?i*j");
    }

    #[tokio::test]
    async fn concurrent_downloads_use_separate_directories() {
        let temp = TempDir::new().unwrap();
        let tool = Arc::new(FakeTool::new("Test Video", Some(5), 64));
        let service = downloader(tool.clone(), &temp);

        let (first, second) =
            tokio::join!(service.download(WATCH_URL), service.download(WATCH_URL));
        first.unwrap();
        second.unwrap();

        let dirs = tool.output_dirs();
        assert_eq!(dirs.len(), 2);
        assert_ne!(dirs[0], dirs[1]);
        assert_eq!(scratch_entries(&temp), 0);
    }
}
