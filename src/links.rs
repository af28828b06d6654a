//! YouTube link classification and playlist stripping.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::error::{DownloadError, DownloadResult};

const WATCH_BASE: &str = "https://www.youtube.com/watch";

static SUPPORTED_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(https?://)?(www\.|m\.|music\.)?(youtube\.com|youtu\.be)/.+$")
        .expect("supported URL pattern compiles")
});

static PLAYLIST_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[?&]list=[^&]+").expect("playlist pattern compiles")
});

/// True when `input` looks like a YouTube watch or short link with a path.
pub fn is_supported_url(input: &str) -> bool {
    SUPPORTED_URL.is_match(input)
}

/// True when the query string names a playlist (`list=...`).
pub fn has_playlist_marker(input: &str) -> bool {
    PLAYLIST_MARKER.is_match(input)
}

/// Rebuilds a playlist-qualified link as a plain watch URL for one video.
///
/// The `v` query parameter wins; otherwise the first path segment of a
/// `youtu.be` short link is used as the video id.
pub fn to_single_item_url(input: &str) -> DownloadResult<String> {
    let parsed = parse_lenient(input)
        .ok_or_else(|| DownloadError::invalid_url(input, "not a parseable URL"))?;

    let video_id = parsed
        .query_pairs()
        .find(|(key, _)| key == "v")
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty());
    if let Some(video_id) = video_id {
        return Ok(watch_url(&video_id));
    }

    let is_short_link = parsed
        .host_str()
        .is_some_and(|host| host.eq_ignore_ascii_case("youtu.be"));
    if is_short_link
        && let Some(video_id) = parsed
            .path_segments()
            .and_then(|mut segments| segments.next())
            .filter(|segment| !segment.is_empty())
    {
        return Ok(watch_url(video_id));
    }

    Err(DownloadError::invalid_url(
        input,
        "could not extract a video id from the playlist link",
    ))
}

fn parse_lenient(input: &str) -> Option<Url> {
    if input.contains("://") {
        Url::parse(input).ok()
    } else {
        Url::parse(&format!("https://{input}")).ok()
    }
}

fn watch_url(video_id: &str) -> String {
    format!("{WATCH_BASE}?v={}", urlencoding::encode(video_id))
}
