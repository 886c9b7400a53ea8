use std::sync::{Mutex, OnceLock, PoisonError};
use std::time::{Duration, Instant};

use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, info};

use crate::classifier::spotify_track_id;
use crate::error::{MusicError, MusicResult};
use crate::models::{Platform, RawTrack};
use crate::platforms::{Capabilities, PlatformClient};

const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const API_URL: &str = "https://api.spotify.com/v1";

/// Tokens are refreshed this long before Spotify says they expire.
const TOKEN_MARGIN: Duration = Duration::from_secs(60);

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Deserialize)]
struct SearchResponse {
    tracks: TrackPage,
}

#[derive(Deserialize)]
struct TrackPage {
    items: Vec<SpotifyTrack>,
}

#[derive(Deserialize)]
struct SpotifyTrack {
    name: String,
    artists: Vec<SpotifyArtist>,
    external_urls: ExternalUrls,
}

#[derive(Deserialize)]
struct SpotifyArtist {
    name: String,
}

#[derive(Deserialize)]
struct ExternalUrls {
    spotify: Option<String>,
}

struct AccessToken {
    value: String,
    expires_at: Instant,
}

/// Spotify Web API client using the client credentials flow.
///
/// Spotify never hands out audio, results are metadata only.
pub struct SpotifyClient {
    http: OnceLock<Client>,
    client_id: String,
    client_secret: String,
    token: Mutex<Option<AccessToken>>,
}

impl SpotifyClient {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            http: OnceLock::new(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token: Mutex::new(None),
        }
    }

    /// Built on first use so it is created on a blocking thread.
    fn http(&self) -> &Client {
        self.http.get_or_init(Client::new)
    }

    fn access_token(&self) -> MusicResult<String> {
        let mut cached = self.token.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(token) = cached.as_ref().filter(|token| token.expires_at > Instant::now()) {
            return Ok(token.value.clone());
        }

        debug!("Requesting a new Spotify access token");

        let response: TokenResponse = self
            .http()
            .post(TOKEN_URL)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()?
            .error_for_status()?
            .json()?;

        let lifetime = Duration::from_secs(response.expires_in).saturating_sub(TOKEN_MARGIN);
        let value = response.access_token;

        *cached = Some(AccessToken {
            value: value.clone(),
            expires_at: Instant::now() + lifetime,
        });

        Ok(value)
    }
}

impl PlatformClient for SpotifyClient {
    fn platform(&self) -> Platform {
        Platform::Spotify
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities { search: true, lookup: true, streams: false }
    }

    fn search(&self, query: &str) -> MusicResult<RawTrack> {
        info!("Searching Spotify for {query}");

        let token = self.access_token()?;
        let response: SearchResponse = self
            .http()
            .get(format!("{API_URL}/search"))
            .bearer_auth(token)
            .query(&[("q", query), ("type", "track"), ("limit", "1")])
            .send()?
            .error_for_status()?
            .json()?;

        response
            .tracks
            .items
            .into_iter()
            .next()
            .map(into_raw_track)
            .ok_or_else(|| MusicError::NotFound(format!("No Spotify track could be found for \"{query}\"")))
    }

    fn lookup(&self, url: &str) -> MusicResult<RawTrack> {
        let id = spotify_track_id(url)
            .ok_or_else(|| MusicError::InvalidInput(format!("{url} is not a Spotify track link")))?;

        info!("Looking up Spotify track {id}");

        let token = self.access_token()?;
        let response = self
            .http()
            .get(format!("{API_URL}/tracks/{id}"))
            .bearer_auth(token)
            .send()?;

        // Malformed ids come back as 400, unknown ones as 404
        if matches!(response.status(), StatusCode::NOT_FOUND | StatusCode::BAD_REQUEST) {
            return Err(MusicError::NotFound(format!("No Spotify track could be found at {url}")));
        }

        let track: SpotifyTrack = response.error_for_status()?.json()?;

        Ok(into_raw_track(track))
    }
}

fn into_raw_track(track: SpotifyTrack) -> RawTrack {
    let mut artists = track.artists.into_iter().map(|artist| artist.name);
    let artist = artists.next().unwrap_or_default();
    let collab = artists.next();

    RawTrack {
        title: track.name,
        artist,
        collab,
        public_url: track.external_urls.spotify.unwrap_or_default(),
        stream_url: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_results_keep_the_first_two_artists() {
        let body = r#"{
            "tracks": {
                "items": [{
                    "name": "Under Pressure",
                    "artists": [{"name": "Queen"}, {"name": "David Bowie"}, {"name": "Someone Else"}],
                    "external_urls": {"spotify": "https://open.spotify.com/track/2fuCquhmrzHpu5xcA1ci9x"}
                }]
            }
        }"#;

        let response: SearchResponse = serde_json::from_str(body).unwrap();
        let track = into_raw_track(response.tracks.items.into_iter().next().unwrap());

        assert_eq!(track.title, "Under Pressure");
        assert_eq!(track.artist, "Queen");
        assert_eq!(track.collab.as_deref(), Some("David Bowie"));
        assert_eq!(track.public_url, "https://open.spotify.com/track/2fuCquhmrzHpu5xcA1ci9x");
        assert_eq!(track.stream_url, None);
    }

    #[test]
    fn solo_tracks_have_no_collab() {
        let body = r#"{"name": "Let Her Go", "artists": [{"name": "Passenger"}], "external_urls": {}}"#;
        let track = into_raw_track(serde_json::from_str(body).unwrap());

        assert_eq!(track.artist, "Passenger");
        assert_eq!(track.collab, None);
        assert_eq!(track.public_url, "");
    }

    #[test]
    fn lookup_rejects_links_without_a_track_id() {
        let client = SpotifyClient::new("id", "secret");
        let result = client.lookup("https://open.spotify.com/album/1KxwZYyzWNyZSRyErj2ojT");

        assert!(matches!(result, Err(MusicError::InvalidInput(_))));
    }
}
