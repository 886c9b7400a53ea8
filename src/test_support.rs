//! Fakes for the external collaborators of the player and the resolver.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serenity::async_trait;
use serenity::model::id::{ChannelId, GuildId, MessageId};
use tokio::sync::Notify;

use crate::error::{MusicError, MusicResult};
use crate::models::{MessageHandle, Platform, RawTrack, Track};
use crate::notifier::Notifier;
use crate::platforms::{Capabilities, PlatformClient};
use crate::resolver::TrackResolver;
use crate::voice::{DeviceFactory, OutputDevice};

pub fn track(title: &str) -> Track {
    Track {
        platform: Platform::YouTube,
        title: title.to_string(),
        primary_artist: format!("Artist of {title}"),
        secondary_artist: None,
        public_url: format!("https://youtube.test/{title}"),
        stream_url: format!("https://youtube.test/stream/{title}"),
    }
}

/// Polls `condition` for up to two seconds.
pub async fn wait_until<F, Fut>(mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..400 {
        if condition().await {
            return true;
        }

        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    false
}

/// A resolver wired to fake YouTube, Spotify and SoundCloud clients.
pub fn resolver() -> TrackResolver {
    TrackResolver::new(Platform::YouTube)
        .with_client(Arc::new(FakeClient::new(
            Platform::YouTube,
            Capabilities { search: true, lookup: true, streams: true },
        )))
        .with_client(Arc::new(FakeClient::new(
            Platform::Spotify,
            Capabilities { search: true, lookup: true, streams: false },
        )))
        .with_client(Arc::new(FakeClient::new(
            Platform::SoundCloud,
            Capabilities { search: false, lookup: true, streams: true },
        )))
}

#[derive(Default)]
struct FakeClientState {
    searches: Vec<String>,
    lookups: usize,
    empty: bool,
    stream: Option<String>,
    collab: Option<String>,
}

/// Answers every query with a track named after it.
pub struct FakeClient {
    platform: Platform,
    capabilities: Capabilities,
    state: Mutex<FakeClientState>,
}

impl FakeClient {
    pub fn new(platform: Platform, capabilities: Capabilities) -> Self {
        Self {
            platform,
            capabilities,
            state: Mutex::new(FakeClientState::default()),
        }
    }

    /// Every search and lookup finds nothing.
    pub fn set_empty(&self, empty: bool) {
        self.state.lock().unwrap().empty = empty;
    }

    pub fn set_stream(&self, stream: Option<&str>) {
        self.state.lock().unwrap().stream = stream.map(str::to_string);
    }

    pub fn set_collab(&self, collab: Option<&str>) {
        self.state.lock().unwrap().collab = collab.map(str::to_string);
    }

    pub fn searches(&self) -> Vec<String> {
        self.state.lock().unwrap().searches.clone()
    }

    pub fn lookups(&self) -> usize {
        self.state.lock().unwrap().lookups
    }

    pub fn calls(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.searches.len() + state.lookups
    }

    fn answer(&self, name: &str) -> MusicResult<RawTrack> {
        let state = self.state.lock().unwrap();

        if state.empty {
            return Err(MusicError::NotFound(format!("Nothing found for {name}")));
        }

        let host = self.platform.to_string().to_lowercase();
        let stream_url = self.capabilities.streams.then(|| {
            state
                .stream
                .clone()
                .unwrap_or_else(|| format!("https://{host}.test/stream/{name}"))
        });

        Ok(RawTrack {
            title: name.to_string(),
            artist: format!("Artist of {name}"),
            collab: state.collab.clone(),
            public_url: format!("https://{host}.test/{name}"),
            stream_url,
        })
    }
}

impl PlatformClient for FakeClient {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn search(&self, query: &str) -> MusicResult<RawTrack> {
        self.state.lock().unwrap().searches.push(query.to_string());
        self.answer(query)
    }

    fn lookup(&self, url: &str) -> MusicResult<RawTrack> {
        self.state.lock().unwrap().lookups += 1;
        self.answer(url)
    }
}

/// Observable state of a [`FakeDevice`].
#[derive(Clone, Debug, PartialEq)]
pub struct DeviceSnapshot {
    pub connected: bool,
    pub current: Option<Track>,
    pub paused: bool,
}

struct FakeDeviceState {
    connected: bool,
    current: Option<Track>,
    paused: bool,
    history: Vec<Track>,
    operations: usize,
    on_finished: Option<Arc<Notify>>,
}

/// Output device that "plays" a track until the test finishes it.
pub struct FakeDevice {
    state: Mutex<FakeDeviceState>,
}

impl FakeDevice {
    pub fn connected() -> Self {
        Self {
            state: Mutex::new(FakeDeviceState {
                connected: true,
                current: None,
                paused: false,
                history: Vec::new(),
                operations: 0,
                on_finished: None,
            }),
        }
    }

    /// Dropping the connection also drops the current track.
    pub fn set_connected(&self, connected: bool) {
        let mut state = self.state.lock().unwrap();
        state.connected = connected;

        if !connected {
            state.current = None;
            state.paused = false;
        }
    }

    /// Ends the current track and fires its end event.
    pub fn finish_current(&self) {
        let mut state = self.state.lock().unwrap();
        state.current = None;
        state.paused = false;

        if let Some(on_finished) = &state.on_finished {
            on_finished.notify_one();
        }
    }

    pub fn now_playing(&self) -> Option<Track> {
        self.state.lock().unwrap().current.clone()
    }

    pub fn history(&self) -> Vec<Track> {
        self.state.lock().unwrap().history.clone()
    }

    /// Number of play, pause, resume and stop calls.
    pub fn operations(&self) -> usize {
        self.state.lock().unwrap().operations
    }

    pub fn snapshot(&self) -> DeviceSnapshot {
        let state = self.state.lock().unwrap();

        DeviceSnapshot {
            connected: state.connected,
            current: state.current.clone(),
            paused: state.paused,
        }
    }
}

#[async_trait]
impl OutputDevice for FakeDevice {
    async fn play(&self, track: &Track, on_finished: Arc<Notify>) -> MusicResult<()> {
        let mut state = self.state.lock().unwrap();
        state.operations += 1;

        if !state.connected {
            return Err(MusicError::InvariantViolation("not connected".to_string()));
        }

        state.current = Some(track.clone());
        state.paused = false;
        state.history.push(track.clone());
        state.on_finished = Some(on_finished);

        Ok(())
    }

    async fn pause(&self) -> MusicResult<()> {
        let mut state = self.state.lock().unwrap();
        state.operations += 1;
        state.paused = state.current.is_some();

        Ok(())
    }

    async fn resume(&self) -> MusicResult<()> {
        let mut state = self.state.lock().unwrap();
        state.operations += 1;
        state.paused = false;

        Ok(())
    }

    async fn stop(&self) -> MusicResult<()> {
        let mut state = self.state.lock().unwrap();
        state.operations += 1;
        state.current = None;
        state.paused = false;

        Ok(())
    }

    async fn is_playing(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.current.is_some() && !state.paused
    }

    async fn is_paused(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.current.is_some() && state.paused
    }

    async fn current_binding(&self) -> Option<ChannelId> {
        self.state.lock().unwrap().connected.then(|| ChannelId(1))
    }
}

/// Creates connected [`FakeDevice`]s and remembers them per guild.
#[derive(Default)]
pub struct FakeDevices {
    devices: Mutex<Vec<(GuildId, Arc<FakeDevice>)>>,
}

impl FakeDevices {
    pub fn created(&self) -> Vec<GuildId> {
        self.devices.lock().unwrap().iter().map(|(guild_id, _)| *guild_id).collect()
    }

    pub fn device(&self, guild_id: GuildId) -> Option<Arc<FakeDevice>> {
        self.devices
            .lock()
            .unwrap()
            .iter()
            .find(|(id, _)| *id == guild_id)
            .map(|(_, device)| device.clone())
    }
}

impl DeviceFactory for FakeDevices {
    fn device_for(&self, guild_id: GuildId) -> Arc<dyn OutputDevice> {
        let device = Arc::new(FakeDevice::connected());
        self.devices.lock().unwrap().push((guild_id, device.clone()));

        device
    }
}

#[derive(Default)]
struct FakeNotifierState {
    next_id: u64,
    send_delay: Duration,
    sent: Vec<(ChannelId, String)>,
    live: Vec<(MessageHandle, String)>,
}

/// Records notifications instead of posting them.
#[derive(Default)]
pub struct FakeNotifier {
    state: Mutex<FakeNotifierState>,
}

impl FakeNotifier {
    /// Every notification ever sent, as (channel, track title).
    pub fn sent(&self) -> Vec<(ChannelId, String)> {
        self.state.lock().unwrap().sent.clone()
    }

    /// Notifications still visible in their channel.
    pub fn live(&self) -> Vec<(MessageHandle, String)> {
        self.state.lock().unwrap().live.clone()
    }

    /// Makes every send take `delay`, like a slow Discord API.
    pub fn set_send_delay(&self, delay: Duration) {
        self.state.lock().unwrap().send_delay = delay;
    }

    /// Simulates someone deleting every message by hand.
    pub fn forget_all(&self) {
        self.state.lock().unwrap().live.clear();
    }
}

#[async_trait]
impl Notifier for FakeNotifier {
    async fn send(&self, channel_id: ChannelId, track: &Track) -> MusicResult<MessageHandle> {
        let delay = self.state.lock().unwrap().send_delay;
        tokio::time::sleep(delay).await;

        let mut state = self.state.lock().unwrap();
        state.next_id += 1;

        let handle = MessageHandle {
            channel_id,
            message_id: MessageId(state.next_id),
        };
        state.sent.push((channel_id, track.title.clone()));
        state.live.push((handle, track.title.clone()));

        Ok(handle)
    }

    async fn delete(&self, message: &MessageHandle) -> MusicResult<()> {
        self.state.lock().unwrap().live.retain(|(handle, _)| handle != message);

        Ok(())
    }
}
