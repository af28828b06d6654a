//! Process configuration, read once from the environment at startup.

use std::{path::PathBuf, time::Duration};

use thiserror::Error;

use crate::{
    scratch::SCRATCH_NAMESPACE,
    ytdlp::{AudioFormat, ToolConfig, UnknownAudioFormat},
};

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8787";
const DEFAULT_API_VERSION: &str = "v1";
const DEFAULT_TIMEOUT_SECONDS: u64 = 600;
const DEFAULT_STALE_SCRATCH_SECONDS: u64 = 2 * 60 * 60;
const DEV_ORIGINS: [&str; 2] = ["http://127.0.0.1:5173", "http://localhost:5173"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key} must be {expected}, got {value:?}")]
    Invalid {
        key: &'static str,
        expected: &'static str,
        value: String,
    },

    #[error("AUDIO_FORMAT: {0}")]
    AudioFormat(#[from] UnknownAudioFormat),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub api_version: String,
    /// Empty means the development defaults.
    pub allowed_origins: Vec<String>,
    pub tool: ToolConfig,
    /// Always `<SCRATCH_ROOT or system temp>/ytune-downloads`.
    pub scratch_root: PathBuf,
    pub stale_scratch_age: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key).and_then(|value| non_empty(&value).map(ToString::to_string))
        };

        let bind_addr = match (read("APP_ADDR"), read("PORT")) {
            (Some(addr), _) => addr,
            (None, Some(port)) => {
                format!("0.0.0.0:{}", parse::<u16>("PORT", &port, "a port number")?)
            }
            (None, None) => DEFAULT_BIND_ADDR.to_string(),
        };

        let api_version = read("API_VERSION")
            .or_else(|| read("VERSION"))
            .unwrap_or_else(|| DEFAULT_API_VERSION.to_string());

        let allowed_origins = read("ALLOWED_ORIGINS")
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty())
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let defaults = ToolConfig::default();
        let tool = ToolConfig {
            binary: read("YT_DLP_PATH").unwrap_or(defaults.binary),
            ffmpeg_location: read("FFMPEG_PATH"),
            audio_format: read("AUDIO_FORMAT")
                .map(|value| value.parse::<AudioFormat>())
                .transpose()?
                .unwrap_or(defaults.audio_format),
            audio_quality: read("AUDIO_QUALITY").unwrap_or(defaults.audio_quality),
            sample_rate: read("AUDIO_SAMPLE_RATE")
                .map(|value| parse::<u32>("AUDIO_SAMPLE_RATE", &value, "a sample rate in Hz"))
                .transpose()?,
            timeout: Duration::from_secs(
                read("YT_DLP_TIMEOUT_SECONDS")
                    .map(|value| {
                        parse::<u64>("YT_DLP_TIMEOUT_SECONDS", &value, "a number of seconds")
                    })
                    .transpose()?
                    .filter(|seconds| *seconds > 0)
                    .unwrap_or(DEFAULT_TIMEOUT_SECONDS),
            ),
        };

        let scratch_root = read("SCRATCH_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(std::env::temp_dir)
            .join(SCRATCH_NAMESPACE);

        let stale_scratch_age = Duration::from_secs(
            read("STALE_SCRATCH_SECONDS")
                .map(|value| parse::<u64>("STALE_SCRATCH_SECONDS", &value, "a number of seconds"))
                .transpose()?
                .unwrap_or(DEFAULT_STALE_SCRATCH_SECONDS),
        );

        Ok(Self {
            bind_addr,
            api_version,
            allowed_origins,
            tool,
            scratch_root,
            stale_scratch_age,
        })
    }

    pub fn cors_origins(&self) -> Vec<String> {
        if self.allowed_origins.is_empty() {
            DEV_ORIGINS.iter().map(ToString::to_string).collect()
        } else {
            self.allowed_origins.clone()
        }
    }
}

fn parse<T: std::str::FromStr>(
    key: &'static str,
    value: &str,
    expected: &'static str,
) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::Invalid {
        key,
        expected,
        value: value.to_string(),
    })
}

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}
