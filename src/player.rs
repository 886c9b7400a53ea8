use std::sync::Arc;
use std::time::Duration;

use serenity::model::id::{ChannelId, GuildId};
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn};
use tracing_futures::Instrument;

use crate::error::{MusicError, MusicResult};
use crate::models::{MessageHandle, Platform, Queue, Track};
use crate::notifier::Notifier;
use crate::resolver::TrackResolver;
use crate::voice::OutputDevice;

/// Services shared by every player.
#[derive(Clone)]
pub struct PlayerDeps {
    pub resolver: Arc<TrackResolver>,
    pub notifier: Arc<dyn Notifier>,
    /// Watchdog period of the scheduling loop when no track end is signalled.
    pub poll_interval: Duration,
}

/// What a single pass of the scheduling loop did.
#[derive(Debug, PartialEq)]
pub enum Tick {
    /// The device is busy with a track, or a start was cancelled by `stop` or `disconnect`.
    Busy,
    Started(Track),
    /// Every queued track has been started. The loop ends.
    Exhausted,
    /// The guild was disconnected. The loop ends.
    Halted,
}

struct PlayerState {
    queue: Queue,
    channel_id: ChannelId,
    now_playing: Option<MessageHandle>,
    /// Set by `disconnect`, cleared by `enqueue` and `reconnect`.
    disconnected: bool,
    /// Flipped under this lock so an enqueue racing with exhaustion never loses a wakeup.
    loop_active: bool,
    loop_task: Option<JoinHandle<()>>,
    /// Bumped by `stop` and `disconnect`. A track started under an older generation is stopped again.
    generation: u64,
}

/// Decision taken by a tick while holding the state lock.
enum Plan {
    Wait,
    Start(Start),
    Finish(Tick),
}

/// A track to start once the state lock is released.
struct Start {
    track: Track,
    channel_id: ChannelId,
    previous: Option<MessageHandle>,
    generation: u64,
    queued: usize,
}

/// Queue and playback state of one guild.
pub struct Player {
    guild_id: GuildId,
    resolver: Arc<TrackResolver>,
    notifier: Arc<dyn Notifier>,
    device: Arc<dyn OutputDevice>,
    poll_interval: Duration,
    state: Mutex<PlayerState>,
    track_finished: Arc<Notify>,
}

impl Player {
    pub fn new(guild_id: GuildId, channel_id: ChannelId, deps: &PlayerDeps, device: Arc<dyn OutputDevice>) -> Self {
        Self {
            guild_id,
            resolver: deps.resolver.clone(),
            notifier: deps.notifier.clone(),
            device,
            poll_interval: deps.poll_interval,
            state: Mutex::new(PlayerState {
                queue: Queue::default(),
                channel_id,
                now_playing: None,
                disconnected: false,
                loop_active: false,
                loop_task: None,
                generation: 0,
            }),
            track_finished: Arc::new(Notify::new()),
        }
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    fn span(&self) -> tracing::Span {
        info_span!("player", guild_id = self.guild_id.0)
    }

    /// Resolves `input` and queues the result. A failed resolution leaves the queue untouched.
    pub async fn request(self: &Arc<Self>, input: &str, hint: Platform) -> MusicResult<Track> {
        let track = self.resolver.resolve(input, hint).instrument(self.span()).await?;
        self.enqueue(track.clone()).await;

        Ok(track)
    }

    /// Appends to the queue and makes sure the scheduling loop runs.
    pub async fn enqueue(self: &Arc<Self>, track: Track) {
        let mut state = self.state.lock().await;

        info!(parent: &self.span(), "Queued \"{}\" at position {}", track.title, state.queue.len());
        state.queue.push(track);
        state.disconnected = false;

        self.launch_loop(&mut state);
    }

    /// Restarts playback after the guild joined a voice channel again.
    pub async fn reconnect(self: &Arc<Self>) {
        let mut state = self.state.lock().await;
        state.disconnected = false;

        self.launch_loop(&mut state);
    }

    /// Steps the cursor back so the interrupted track plays again after a reconnect.
    ///
    /// Must be called before the voice connection is released. Repeated calls before the
    /// next reconnect do nothing.
    pub async fn disconnect(&self) {
        let mut state = self.state.lock().await;

        if state.disconnected {
            return;
        }

        state.queue.rewind();
        state.disconnected = true;
        state.generation += 1;
        info!(parent: &self.span(), "Disconnected, resuming from position {}", state.queue.pos());

        let stale = self.wind_down(&mut state);
        drop(state);

        self.discard_notification(stale).await;
    }

    pub async fn set_notification_channel(&self, channel_id: ChannelId) {
        self.state.lock().await.channel_id = channel_id;
    }

    pub async fn pause(&self) -> MusicResult<()> {
        self.require_binding().await?;
        self.device.pause().await
    }

    pub async fn resume(&self) -> MusicResult<()> {
        self.require_binding().await?;
        self.device.resume().await
    }

    /// Stops the current track, the loop moves on to the next one.
    pub async fn skip(&self) -> MusicResult<()> {
        self.require_binding().await?;
        self.device.stop().await?;
        self.track_finished.notify_one();

        Ok(())
    }

    /// Drops every upcoming track and stops the current one.
    pub async fn stop(&self) -> MusicResult<()> {
        self.require_binding().await?;

        let mut state = self.state.lock().await;
        state.queue.skip_to_end();
        state.generation += 1;
        self.device.stop().await?;

        let stale = self.wind_down(&mut state);
        drop(state);

        self.discard_notification(stale).await;

        Ok(())
    }

    pub async fn upcoming(&self, limit: usize) -> Vec<Track> {
        let state = self.state.lock().await;
        state.queue.upcoming().iter().take(limit).cloned().collect()
    }

    pub async fn position(&self) -> (usize, usize) {
        let state = self.state.lock().await;
        (state.queue.pos(), state.queue.len())
    }

    /// Wakes a running loop so it notices the change, otherwise hands back the message to remove.
    fn wind_down(&self, state: &mut PlayerState) -> Option<MessageHandle> {
        if self.is_loop_running(state) {
            self.track_finished.notify_one();
            None
        } else {
            state.now_playing.take()
        }
    }

    fn is_loop_running(&self, state: &PlayerState) -> bool {
        state.loop_active && state.loop_task.as_ref().map_or(false, |task| !task.is_finished())
    }

    fn launch_loop(self: &Arc<Self>, state: &mut PlayerState) {
        if self.is_loop_running(state) {
            return;
        }

        debug!(parent: &self.span(), "Starting scheduling loop");
        state.loop_active = true;
        state.loop_task = Some(tokio::spawn(Arc::clone(self).run().instrument(self.span())));
    }

    async fn run(self: Arc<Self>) {
        loop {
            match self.tick().await {
                Ok(Tick::Exhausted) => {
                    info!("Queue finished");
                    break;
                }
                Ok(Tick::Halted) => {
                    info!("Scheduling loop halted");
                    break;
                }
                Ok(Tick::Busy) | Ok(Tick::Started(_)) => {}
                Err(why) => {
                    error!("Scheduling loop terminated: {why}");
                    break;
                }
            }

            tokio::select! {
                _ = self.track_finished.notified() => {}
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    /// One pass of the scheduling loop.
    ///
    /// The next track is chosen under the state lock, then the lock is released while the
    /// device and the notifier do their slow work. Any outcome that ends the loop marks it
    /// inactive in the same critical section that decided it.
    pub(crate) async fn tick(self: &Arc<Self>) -> MusicResult<Tick> {
        let mut state = self.state.lock().await;

        let finished = match self.plan(&mut state).await {
            Ok(Plan::Wait) => return Ok(Tick::Busy),
            Ok(Plan::Start(start)) => {
                drop(state);
                return self.start(start).await;
            }
            Ok(Plan::Finish(tick)) => Ok(tick),
            Err(why) => Err(why),
        };

        state.loop_active = false;
        let stale = state.now_playing.take();
        drop(state);

        self.discard_notification(stale).await;

        finished
    }

    /// A track the device is playing or holding paused always wins, nothing new is pushed.
    async fn plan(&self, state: &mut PlayerState) -> MusicResult<Plan> {
        if state.disconnected {
            return Ok(Plan::Finish(Tick::Halted));
        }

        self.require_binding().await?;

        if self.device.is_playing().await || self.device.is_paused().await {
            return Ok(Plan::Wait);
        }

        let track = match state.queue.advance() {
            Some(track) => track,
            None => return Ok(Plan::Finish(Tick::Exhausted)),
        };

        debug!("Starting track {} of {}", state.queue.pos(), state.queue.len());

        Ok(Plan::Start(Start {
            track,
            channel_id: state.channel_id,
            previous: state.now_playing.take(),
            generation: state.generation,
            queued: state.queue.len(),
        }))
    }

    async fn start(self: &Arc<Self>, start: Start) -> MusicResult<Tick> {
        let Start { track, channel_id, previous, generation, queued } = start;

        self.discard_notification(previous).await;

        if let Err(why) = self.device.play(&track, self.track_finished.clone()).await {
            let mut state = self.state.lock().await;
            state.loop_active = false;

            // Tracks queued meanwhile saw a running loop and did not launch one
            if state.queue.len() > queued && !state.disconnected {
                self.launch_loop(&mut state);
            }

            return Err(why);
        }

        let message = match self.notifier.send(channel_id, &track).await {
            Ok(message) => Some(message),
            Err(why) => {
                warn!("Error sending now playing message: {why}");
                None
            }
        };

        let mut state = self.state.lock().await;

        if state.generation != generation {
            drop(state);
            debug!("\"{}\" was stopped while starting", track.title);

            if let Err(why) = self.device.stop().await {
                warn!("Error stopping \"{}\": {why}", track.title);
            }
            self.discard_notification(message).await;

            return Ok(Tick::Busy);
        }

        state.now_playing = message;

        Ok(Tick::Started(track))
    }

    async fn require_binding(&self) -> MusicResult<ChannelId> {
        self.device.current_binding().await.ok_or_else(|| {
            MusicError::InvariantViolation(format!("guild {} has no voice connection", self.guild_id))
        })
    }

    async fn discard_notification(&self, message: Option<MessageHandle>) {
        if let Some(message) = message {
            if let Err(why) = self.notifier.delete(&message).await {
                warn!("Error deleting now playing message: {why}");
            }
        }
    }
}
