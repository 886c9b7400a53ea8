use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

use crate::models::Platform;

lazy_static! {
    static ref YOUTUBE_URL: Regex =
        Regex::new(r"^(https?://)?((www\.|m\.|music\.)?youtube\.com|youtu\.be)/.+$").unwrap();
    static ref SPOTIFY_TRACK_URL: Regex =
        Regex::new(r"^(https?://)?open\.spotify\.com/track/([a-zA-Z0-9]+)(\?.*)?$").unwrap();
    static ref SOUNDCLOUD_TRACK_URL: Regex =
        Regex::new(r"^(https?://)?(www\.)?(m\.)?soundcloud\.com/[\w\-\.]+/+[\w\-\.]+/?$").unwrap();
}

/// Removes the `<...>` Discord users put around links to hide the preview.
pub fn strip_suppression(input: &str) -> &str {
    let trimmed = input.trim();

    trimmed
        .strip_prefix('<')
        .and_then(|inner| inner.strip_suffix('>'))
        .unwrap_or(trimmed)
}

/// Finds the platform whose URL shape matches `input`.
///
/// The patterns do not overlap, so the order only matters for readability.
pub fn classify(input: &str) -> Option<Platform> {
    let candidate = strip_suppression(input);

    let platform = if YOUTUBE_URL.is_match(candidate) {
        Some(Platform::YouTube)
    } else if SPOTIFY_TRACK_URL.is_match(candidate) {
        Some(Platform::Spotify)
    } else if SOUNDCLOUD_TRACK_URL.is_match(candidate) {
        Some(Platform::SoundCloud)
    } else {
        None
    };

    debug!("Classified {candidate:?} as {platform:?}");

    platform
}

/// Extracts the catalog id out of a Spotify track link.
pub fn spotify_track_id(url: &str) -> Option<&str> {
    SPOTIFY_TRACK_URL
        .captures(strip_suppression(url))
        .and_then(|captures| captures.get(2))
        .map(|id| id.as_str())
}
