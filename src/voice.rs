use std::sync::Arc;

use serenity::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use songbird::input::{ffmpeg_optioned, Input};
use songbird::tracks::{PlayMode, TrackHandle};
use songbird::{Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent};
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info};

use crate::error::{MusicError, MusicResult};
use crate::models::Track;

/// Keeps dropped connections from cutting remote streams short.
const FFMPEG_INPUT_ARGS: [&str; 6] = ["-reconnect", "1", "-reconnect_streamed", "1", "-reconnect_delay_max", "5"];
const FFMPEG_OUTPUT_ARGS: [&str; 10] = ["-vn", "-f", "s16le", "-ac", "2", "-ar", "48000", "-acodec", "pcm_f32le", "-"];

/// The voice connection of one guild, as seen by its player.
#[async_trait]
pub trait OutputDevice: Send + Sync {
    /// Starts `track` from a fresh stream. `on_finished` is notified once it ends.
    async fn play(&self, track: &Track, on_finished: Arc<Notify>) -> MusicResult<()>;

    async fn pause(&self) -> MusicResult<()>;

    async fn resume(&self) -> MusicResult<()>;

    async fn stop(&self) -> MusicResult<()>;

    async fn is_playing(&self) -> bool;

    async fn is_paused(&self) -> bool;

    /// The voice channel the guild is connected to, if any.
    async fn current_binding(&self) -> Option<ChannelId>;
}

/// Hands out the output device of each guild.
pub trait DeviceFactory: Send + Sync {
    fn device_for(&self, guild_id: GuildId) -> Arc<dyn OutputDevice>;
}

pub struct SongbirdDevices {
    manager: Arc<Songbird>,
}

impl SongbirdDevices {
    pub fn new(manager: Arc<Songbird>) -> Self {
        Self { manager }
    }
}

impl DeviceFactory for SongbirdDevices {
    fn device_for(&self, guild_id: GuildId) -> Arc<dyn OutputDevice> {
        Arc::new(SongbirdDevice {
            manager: self.manager.clone(),
            guild_id,
            track_handle: Mutex::new(None),
        })
    }
}

/// Plays through the songbird call of a guild, one track at a time.
pub struct SongbirdDevice {
    manager: Arc<Songbird>,
    guild_id: GuildId,
    track_handle: Mutex<Option<TrackHandle>>,
}

impl SongbirdDevice {
    async fn play_mode(&self) -> Option<PlayMode> {
        let track_handle = self.track_handle.lock().await.clone()?;

        // Errors once the track is over and its handle is stale
        track_handle.get_info().await.ok().map(|state| state.playing)
    }

    async fn current_track(&self) -> Option<TrackHandle> {
        self.track_handle.lock().await.clone()
    }
}

/// Opens a new ffmpeg stream. Inputs are single use so this runs for every playback.
async fn open_stream(track: &Track) -> MusicResult<Input> {
    ffmpeg_optioned(&track.stream_url, &FFMPEG_INPUT_ARGS, &FFMPEG_OUTPUT_ARGS)
        .await
        .map_err(|why| MusicError::Device(format!("could not open stream for \"{}\": {why}", track.title)))
}

#[async_trait]
impl OutputDevice for SongbirdDevice {
    async fn play(&self, track: &Track, on_finished: Arc<Notify>) -> MusicResult<()> {
        let handler_lock = self
            .manager
            .get(self.guild_id)
            .ok_or_else(|| MusicError::InvariantViolation("not in a voice channel to play in".to_string()))?;

        let source = open_stream(track).await?;

        let mut handler = handler_lock.lock().await;
        handler.stop(); // Just in case something was playing before
        let track_handle = handler.play_source(source);

        track_handle
            .add_event(Event::Track(TrackEvent::End), TrackEndNotifier { on_finished })
            .map_err(|why| MusicError::Device(format!("could not watch track end: {why}")))?;

        info!("Playing {} - {}", track.title, track.stream_url);
        *self.track_handle.lock().await = Some(track_handle);

        Ok(())
    }

    async fn pause(&self) -> MusicResult<()> {
        if let Some(track_handle) = self.current_track().await {
            if let Err(why) = track_handle.pause() {
                debug!("Pause ignored: {why}");
            }
        }

        Ok(())
    }

    async fn resume(&self) -> MusicResult<()> {
        if let Some(track_handle) = self.current_track().await {
            if let Err(why) = track_handle.play() {
                debug!("Resume ignored: {why}");
            }
        }

        Ok(())
    }

    async fn stop(&self) -> MusicResult<()> {
        if let Some(track_handle) = self.track_handle.lock().await.take() {
            if let Err(why) = track_handle.stop() {
                debug!("Stop ignored: {why}");
            }
        }

        Ok(())
    }

    async fn is_playing(&self) -> bool {
        matches!(self.play_mode().await, Some(PlayMode::Play))
    }

    async fn is_paused(&self) -> bool {
        matches!(self.play_mode().await, Some(PlayMode::Pause))
    }

    async fn current_binding(&self) -> Option<ChannelId> {
        let handler_lock = self.manager.get(self.guild_id)?;
        let handler = handler_lock.lock().await;

        handler.current_channel().map(|channel| ChannelId(channel.0))
    }
}

/// The channel the bot has to stay in: `current`, when it is not the `requested` one and
/// a human is still listening there.
///
/// `occupants` lists every voice state of the guild as (channel, is a bot).
pub fn listened_elsewhere<I>(current: Option<ChannelId>, requested: ChannelId, occupants: I) -> Option<ChannelId>
where
    I: IntoIterator<Item = (Option<ChannelId>, bool)>,
{
    let current = current.filter(|channel| *channel != requested)?;

    occupants
        .into_iter()
        .any(|(channel, is_bot)| channel == Some(current) && !is_bot)
        .then_some(current)
}

struct TrackEndNotifier {
    on_finished: Arc<Notify>,
}

#[async_trait]
impl VoiceEventHandler for TrackEndNotifier {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<Event> {
        debug!("End notifier triggered");

        // Stores a permit when the loop is not waiting yet
        self.on_finished.notify_one();

        None
    }
}
