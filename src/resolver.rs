use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::classifier::{classify, strip_suppression};
use crate::error::{MusicError, MusicResult};
use crate::models::{Platform, RawTrack, Track};
use crate::platforms::PlatformClient;

/// Turns user input into a playable [`Track`].
pub struct TrackResolver {
    clients: HashMap<Platform, Arc<dyn PlatformClient>>,
    /// Platform searched for audio when a catalog platform gives metadata only.
    stream_fallback: Platform,
}

impl TrackResolver {
    pub fn new(stream_fallback: Platform) -> Self {
        Self {
            clients: HashMap::new(),
            stream_fallback,
        }
    }

    pub fn with_client(mut self, client: Arc<dyn PlatformClient>) -> Self {
        self.clients.insert(client.platform(), client);
        self
    }

    pub fn supports(&self, platform: Platform) -> bool {
        self.clients.contains_key(&platform)
    }

    /// Runs [`Self::resolve_blocking`] on the blocking thread pool.
    pub async fn resolve(self: &Arc<Self>, input: &str, hint: Platform) -> MusicResult<Track> {
        let resolver = Arc::clone(self);
        let input = input.to_string();

        tokio::task::spawn_blocking(move || resolver.resolve_blocking(&input, hint))
            .await
            .map_err(|why| MusicError::InvariantViolation(format!("resolver worker failed: {why}")))?
    }

    /// A recognised URL always wins over `hint`.
    pub fn resolve_blocking(&self, input: &str, hint: Platform) -> MusicResult<Track> {
        let input = strip_suppression(input);

        if input.is_empty() {
            return Err(MusicError::InvalidInput("Tell me what to play first.".to_string()));
        }

        let detected = classify(input);
        let platform = detected.unwrap_or(hint);
        let client = self.client(platform)?;
        let capabilities = client.capabilities();

        debug!("Resolving {input:?} on {platform} (url: {})", detected.is_some());

        let raw = match detected {
            Some(_) if capabilities.lookup => client.lookup(input)?,
            None if capabilities.search => client.search(input)?,
            Some(_) => {
                return Err(MusicError::InvalidInput(format!("{platform} links are not supported.")));
            }
            None => {
                return Err(MusicError::InvalidInput(format!(
                    "{platform} tracks can only be played from a link."
                )));
            }
        };

        let stream_url = match non_blank(raw.stream_url.as_deref()) {
            Some(stream_url) => stream_url.to_string(),
            None if capabilities.streams => {
                return Err(MusicError::NotFound(format!("\"{}\" has no playable stream.", raw.title)));
            }
            None => self.find_stream(&raw)?,
        };

        let track = into_track(platform, raw, stream_url)?;
        info!("Resolved {input:?} to \"{}\" from {}", track.title, track.platform);

        Ok(track)
    }

    fn client(&self, platform: Platform) -> MusicResult<&Arc<dyn PlatformClient>> {
        self.clients
            .get(&platform)
            .ok_or_else(|| MusicError::InvalidInput(format!("{platform} is not available.")))
    }

    /// Second stage for catalog results: search the fallback platform with title and artists.
    fn find_stream(&self, raw: &RawTrack) -> MusicResult<String> {
        let no_stream = || MusicError::NotFound(format!("No playable stream found for \"{}\".", raw.title));

        let query = [Some(raw.title.as_str()), Some(raw.artist.as_str()), raw.collab.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        if query.is_empty() {
            return Err(no_stream());
        }

        let fallback = self.client(self.stream_fallback).map_err(|_| no_stream())?;
        let found = fallback.search(&query).map_err(|why| {
            warn!("Stream search for {query:?} failed: {why}");
            no_stream()
        })?;

        non_blank(found.stream_url.as_deref())
            .map(str::to_string)
            .ok_or_else(no_stream)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.trim().is_empty())
}

fn into_track(platform: Platform, raw: RawTrack, stream_url: String) -> MusicResult<Track> {
    if raw.title.trim().is_empty() {
        return Err(MusicError::NotFound("The service returned a track without a title.".to_string()));
    }

    Ok(Track {
        platform,
        title: raw.title,
        primary_artist: raw.artist,
        secondary_artist: raw.collab.filter(|collab| !collab.trim().is_empty()),
        public_url: raw.public_url,
        stream_url,
    })
}
