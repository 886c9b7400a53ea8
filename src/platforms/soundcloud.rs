use std::sync::OnceLock;

use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::info;

use crate::error::{MusicError, MusicResult};
use crate::models::{Platform, RawTrack};
use crate::platforms::{Capabilities, PlatformClient};

const RESOLVE_URL: &str = "https://api-v2.soundcloud.com/resolve";

#[derive(Deserialize)]
struct Resource {
    kind: String,
    title: Option<String>,
    user: Option<User>,
    permalink_url: Option<String>,
    media: Option<Media>,
}

#[derive(Deserialize)]
struct User {
    username: String,
}

#[derive(Deserialize)]
struct Media {
    transcodings: Vec<Transcoding>,
}

#[derive(Deserialize)]
struct Transcoding {
    url: String,
    format: TranscodingFormat,
}

#[derive(Deserialize)]
struct TranscodingFormat {
    protocol: String,
}

#[derive(Deserialize)]
struct StreamLocation {
    url: String,
}

/// SoundCloud API v2 client. Only resolves permalinks, there is no search.
pub struct SoundCloudClient {
    http: OnceLock<Client>,
    client_id: String,
}

impl SoundCloudClient {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            http: OnceLock::new(),
            client_id: client_id.into(),
        }
    }

    fn http(&self) -> &Client {
        self.http.get_or_init(Client::new)
    }

    fn stream_location(&self, transcoding: &Transcoding) -> MusicResult<String> {
        let location: StreamLocation = self
            .http()
            .get(&transcoding.url)
            .query(&[("client_id", self.client_id.as_str())])
            .send()?
            .error_for_status()?
            .json()?;

        Ok(location.url)
    }
}

impl PlatformClient for SoundCloudClient {
    fn platform(&self) -> Platform {
        Platform::SoundCloud
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities { search: false, lookup: true, streams: true }
    }

    fn search(&self, query: &str) -> MusicResult<RawTrack> {
        Err(MusicError::InvalidInput(format!(
            "SoundCloud tracks can only be played from a link, \"{query}\" is not one."
        )))
    }

    fn lookup(&self, url: &str) -> MusicResult<RawTrack> {
        info!("Resolving SoundCloud permalink {url}");

        let response = self
            .http()
            .get(RESOLVE_URL)
            .query(&[("url", url), ("client_id", self.client_id.as_str())])
            .send()?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(MusicError::NotFound(format!("Could not find any SoundCloud track at {url}")));
        }

        let resource: Resource = response.error_for_status()?.json()?;
        let (raw, transcoding) = into_raw_track(resource, url)?;
        let stream_url = self.stream_location(transcoding.as_ref().ok_or_else(|| {
            MusicError::NotFound(format!("{url} has no playable stream"))
        })?)?;

        Ok(RawTrack {
            stream_url: Some(stream_url),
            ..raw
        })
    }
}

/// Checks the resolved resource is a track and picks the transcoding to stream.
fn into_raw_track(resource: Resource, url: &str) -> MusicResult<(RawTrack, Option<Transcoding>)> {
    if resource.kind != "track" {
        return Err(MusicError::InvalidInput(format!(
            "{url} points to a {}, not a track.",
            resource.kind
        )));
    }

    let mut transcodings = resource.media.map(|media| media.transcodings).unwrap_or_default();
    let progressive = transcodings
        .iter()
        .position(|transcoding| transcoding.format.protocol == "progressive")
        .unwrap_or(0);
    let transcoding = (!transcodings.is_empty()).then(|| transcodings.swap_remove(progressive));

    let raw = RawTrack {
        title: resource.title.unwrap_or_default(),
        artist: resource.user.map(|user| user.username).unwrap_or_default(),
        collab: None,
        public_url: resource.permalink_url.unwrap_or_else(|| url.to_string()),
        stream_url: None,
    };

    Ok((raw, transcoding))
}
