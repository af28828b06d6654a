use std::{
    path::{Path, PathBuf},
    sync::Mutex,
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    error::{DownloadError, DownloadResult},
    ytdlp::{AudioFormat, MediaTool, TrackMetadata, output_path},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolCall {
    Metadata(String),
    Download(String),
}

/// Stand-in for yt-dlp that records calls and writes a fixed payload.
pub struct FakeTool {
    title: Option<String>,
    duration: Option<u64>,
    payload_len: usize,
    fail_download: bool,
    hang_download: bool,
    write_output: bool,
    calls: Mutex<Vec<ToolCall>>,
    output_dirs: Mutex<Vec<PathBuf>>,
}

impl FakeTool {
    pub fn new(title: &str, duration: Option<u64>, payload_len: usize) -> Self {
        Self {
            title: Some(title.to_string()),
            duration,
            payload_len,
            fail_download: false,
            hang_download: false,
            write_output: true,
            calls: Mutex::new(Vec::new()),
            output_dirs: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_metadata(mut self) -> Self {
        self.title = None;
        self
    }

    pub fn failing_download(mut self) -> Self {
        self.fail_download = true;
        self
    }

    /// Writes the output, then never returns from the download call.
    pub fn hanging_download(mut self) -> Self {
        self.hang_download = true;
        self
    }

    pub fn without_output(mut self) -> Self {
        self.write_output = false;
        self
    }

    pub fn calls(&self) -> Vec<ToolCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn output_dirs(&self) -> Vec<PathBuf> {
        self.output_dirs.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaTool for FakeTool {
    async fn fetch_metadata(&self, url: &str) -> DownloadResult<TrackMetadata> {
        self.calls
            .lock()
            .unwrap()
            .push(ToolCall::Metadata(url.to_string()));

        let title = self
            .title
            .clone()
            .ok_or_else(|| DownloadError::Metadata("ERROR: Video unavailable".to_string()))?;
        Ok(TrackMetadata {
            title,
            duration: self.duration,
        })
    }

    async fn download_audio(
        &self,
        url: &str,
        output_dir: &Path,
        base_name: &str,
    ) -> DownloadResult<()> {
        self.calls
            .lock()
            .unwrap()
            .push(ToolCall::Download(url.to_string()));
        self.output_dirs
            .lock()
            .unwrap()
            .push(output_dir.to_path_buf());

        if self.write_output {
            let path = output_path(output_dir, base_name, self.audio_format());
            tokio::fs::write(&path, vec![0u8; self.payload_len])
                .await
                .unwrap();
        }
        if self.hang_download {
            std::future::pending::<()>().await;
        }
        if self.fail_download {
            return Err(DownloadError::Tool("ERROR: ffmpeg exited with code 1".to_string()));
        }
        Ok(())
    }

    fn audio_format(&self) -> AudioFormat {
        AudioFormat::Mp3
    }
}

/// Polls until `path` is gone; `Drop` cleanup finishes on the blocking pool.
pub async fn wait_for_removal(path: &Path) -> bool {
    for _ in 0..200 {
        if !path.exists() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
