use std::process::Command;

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{MusicError, MusicResult};
use crate::models::{Platform, RawTrack};
use crate::platforms::{Capabilities, PlatformClient};

const UNKNOWN_UPLOADER: &str = "Unknown uploader";

/// The fields we read out of `yt-dlp -j`.
#[derive(Deserialize)]
struct VideoInfo {
    pub title: String,
    pub uploader: Option<String>,
    pub channel: Option<String>,
    #[serde(rename = "webpage_url")]
    pub webpage_url: String,
    /// Direct media URL of the selected format.
    pub url: Option<String>,
}

/// Resolves YouTube searches and links by shelling out to yt-dlp.
pub struct YouTubeClient {
    executable: String,
}

impl YouTubeClient {
    pub fn new(executable: impl Into<String>) -> Self {
        Self { executable: executable.into() }
    }

    fn extract(&self, target: &str, description: &str) -> MusicResult<RawTrack> {
        info!("Asking yt-dlp for {description}");

        let output = Command::new(&self.executable)
            .arg("-j")
            .arg("--no-playlist")
            .arg("--no-warnings")
            .arg("-f")
            .arg("bestaudio/best")
            .arg(target)
            .output()?;

        let error = String::from_utf8_lossy(&output.stderr);
        let result = String::from_utf8(output.stdout)
            .map_err(|_| MusicError::Remote("yt-dlp wrote invalid UTF-8".to_string()))?;

        if !error.trim().is_empty() {
            debug!("yt-dlp stderr: {}", error.trim());
        }

        parse_video_info(&result).ok_or_else(|| MusicError::NotFound(format!("Could not find a track for {description}")))?
    }
}

impl PlatformClient for YouTubeClient {
    fn platform(&self) -> Platform {
        Platform::YouTube
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities { search: true, lookup: true, streams: true }
    }

    fn search(&self, query: &str) -> MusicResult<RawTrack> {
        self.extract(&format!("ytsearch1:{query}"), &format!("your query \"{query}\""))
    }

    fn lookup(&self, url: &str) -> MusicResult<RawTrack> {
        self.extract(url, url)
    }
}

/// Reads the first JSON line printed by yt-dlp. `None` when nothing was printed.
fn parse_video_info(stdout: &str) -> Option<MusicResult<RawTrack>> {
    let line = stdout.lines().find(|line| !line.trim().is_empty())?;

    let parsed = serde_json::from_str::<VideoInfo>(line).map_err(MusicError::from).map(|video| RawTrack {
        title: video.title,
        artist: video
            .uploader
            .or(video.channel)
            .unwrap_or_else(|| UNKNOWN_UPLOADER.to_string()),
        collab: None,
        public_url: video.webpage_url,
        stream_url: video.url,
    });

    Some(parsed)
}
