use std::fmt;

use serenity::model::id::{ChannelId, MessageId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Platform {
    YouTube,
    Spotify,
    SoundCloud,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::YouTube, Platform::Spotify, Platform::SoundCloud];
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Platform::YouTube => "YouTube",
            Platform::Spotify => "Spotify",
            Platform::SoundCloud => "SoundCloud",
        };

        f.write_str(name)
    }
}

/// Metadata as returned by a single platform client.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawTrack {
    pub title: String,
    pub artist: String,
    pub collab: Option<String>,
    pub public_url: String,
    /// `None` for catalog platforms that never expose audio.
    pub stream_url: Option<String>,
}

/// A resolved, playable track. Holds no live output handle: every playback
/// opens a new stream from `stream_url`.
#[derive(Clone, Debug, PartialEq)]
pub struct Track {
    pub platform: Platform,
    pub title: String,
    pub primary_artist: String,
    pub secondary_artist: Option<String>,
    pub public_url: String,
    pub stream_url: String,
}

impl Track {
    /// "artist, collab" as shown under the now playing message.
    pub fn credits(&self) -> String {
        match &self.secondary_artist {
            Some(collab) => format!("{}, {collab}", self.primary_artist),
            None => self.primary_artist.clone(),
        }
    }
}

/// Identifies a notification that was sent to a guild channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MessageHandle {
    pub channel_id: ChannelId,
    pub message_id: MessageId,
}

/// Append-only list of tracks with a cursor on the next one to play.
///
/// `pos` never leaves `0..=len`. `pos == len` means every queued track has been started.
#[derive(Debug, Default)]
pub struct Queue {
    tracks: Vec<Track>,
    pos: usize,
}

impl Queue {
    pub fn push(&mut self, track: Track) {
        self.tracks.push(track);
    }

    /// Returns the track under the cursor and moves past it.
    pub fn advance(&mut self) -> Option<Track> {
        let track = self.tracks.get(self.pos)?.clone();
        self.pos += 1;

        Some(track)
    }

    /// Steps back one track so the interrupted one is played again.
    pub fn rewind(&mut self) {
        self.pos = self.pos.saturating_sub(1);
    }

    pub fn skip_to_end(&mut self) {
        self.pos = self.tracks.len();
    }

    pub fn upcoming(&self) -> &[Track] {
        &self.tracks[self.pos..]
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }
}
