use std::{path::PathBuf, time::Duration};

use thiserror::Error;

pub type DownloadResult<T> = Result<T, DownloadError>;

/// Every way a single download attempt can fail.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("invalid URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: &'static str },

    #[error("could not read track metadata: {0}")]
    Metadata(String),

    #[error("yt-dlp failed: {0}")]
    Tool(String),

    #[error("yt-dlp did not finish within {0:?}")]
    Timeout(Duration),

    #[error("yt-dlp executable not found at {0:?}")]
    ToolNotFound(String),

    #[error("expected output file {0:?} was not produced")]
    OutputMissing(PathBuf),

    #[error("{context}: {source}")]
    Filesystem {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl DownloadError {
    pub fn invalid_url(url: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            reason,
        }
    }

    pub fn filesystem(context: &'static str, source: std::io::Error) -> Self {
        Self::Filesystem { context, source }
    }
}

/// The one error the orchestrator hands to the HTTP layer.
///
/// The underlying [`DownloadError`] stays reachable through [`DownloadFailure::kind`]
/// for logging and tests; callers outside the service only need the message.
#[derive(Debug, Error)]
#[error("failed to download audio: {source}")]
pub struct DownloadFailure {
    #[from]
    source: DownloadError,
}

impl DownloadFailure {
    pub fn kind(&self) -> &DownloadError {
        &self.source
    }
}
