use crate::error::MusicResult;
use crate::models::{Platform, RawTrack};

pub mod soundcloud;
pub mod spotify;
pub mod youtube;

pub use soundcloud::SoundCloudClient;
pub use spotify::SpotifyClient;
pub use youtube::YouTubeClient;

/// What a platform client can be asked to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Capabilities {
    pub search: bool,
    pub lookup: bool,
    /// `false` when results never carry a stream URL and need a second stage.
    pub streams: bool,
}

/// A connection to one media platform.
///
/// Calls block on network or child process I/O, callers must keep them off the async workers.
pub trait PlatformClient: Send + Sync {
    fn platform(&self) -> Platform;

    fn capabilities(&self) -> Capabilities;

    fn search(&self, query: &str) -> MusicResult<RawTrack>;

    fn lookup(&self, url: &str) -> MusicResult<RawTrack>;
}
