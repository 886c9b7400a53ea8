use std::path::Path;
use std::sync::Arc;

use dotenvy::dotenv;
use serenity::{
    async_trait,
    client::{Client, EventHandler},
    framework::{
        standard::{
            Args, CommandResult,
            macros::{command, group},
        },
        StandardFramework,
    },
    model::{channel::Message, gateway::Ready},
    prelude::GatewayIntents,
    Result as SerenityResult,
};
use serenity::client::Context;
use serenity::framework::standard::CommandError;
use serenity::model::channel::ReactionType::Unicode;
use serenity::model::guild::Guild;
use serenity::model::id::{ChannelId, UserId};
use serenity::model::mention::Mentionable;
use serenity::model::prelude::{GuildId, VoiceState};
use songbird::{SerenityInit, Songbird};
use tracing::{debug, error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Config;
use crate::error::{MusicError, MusicResult};
use crate::models::Platform;
use crate::notifier::DiscordNotifier;
use crate::platforms::{SoundCloudClient, SpotifyClient, YouTubeClient};
use crate::player::{Player, PlayerDeps};
use crate::registry::{Players, PlayersKey};
use crate::resolver::TrackResolver;
use crate::voice::{listened_elsewhere, SongbirdDevices};

mod classifier;
mod config;
mod error;
mod models;
mod notifier;
mod platforms;
mod player;
mod registry;
mod resolver;
mod voice;

#[cfg(test)]
mod test_support;

struct Handler;

pub struct BotDataMap;

pub struct BotData {
    pub id: u64,
}

impl serenity::prelude::TypeMapKey for BotDataMap {
    type Value = BotData;
}

const MAX_LISTED_TRACKS: usize = 20;

#[async_trait]
impl EventHandler for Handler {
    async fn message(&self, ctx: Context, msg: Message) {
        if msg.content == "!ping" {
            check_msg(msg.channel_id.say(&ctx.http, "Pong!").await);
        }
    }

    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("{} is connected!", ready.user.name);

        let bot_data = BotData { id: ready.user.id.0 };
        let data = &mut ctx.data.write().await;
        data.insert::<BotDataMap>(bot_data);
    }

    async fn voice_state_update(&self, ctx: Context, _: Option<VoiceState>, new: VoiceState) {
        if new.channel_id.is_some() {
            return;
        }

        let bot_id: Option<u64>;
        let players: Option<Arc<Players>>;

        {
            let data = ctx.data.read().await;
            bot_id = data.get::<BotDataMap>().map(|data| data.id);
            players = data.get::<PlayersKey>().cloned();
        }

        if let (Some(bot_id), Some(guild_id), Some(players)) = (bot_id, new.guild_id, players) {
            if bot_id == new.user_id.0 {
                info!("Bot left the voice channel of guild {}", guild_id.0);

                if let Some(player) = players.get(guild_id).await {
                    player.disconnect().await;
                }
            }
        }
    }
}

#[group]
#[commands(play, spotify, soundcloud, pause, resume, skip, stop, queue, join, leave, help)]
struct General;

#[tokio::main]
async fn main() {
    let env_file = dotenv();

    let config = Config::from_env().expect("Invalid configuration");
    let _log_guard = init_logging(config.log_dir.as_deref());

    if let Err(why) = env_file {
        debug!("No .env file loaded: {why}");
    }

    let framework = StandardFramework::new()
        .configure(|c| {
            c.prefix(&config.command_prefix)
        })
        .group(&GENERAL_GROUP);

    let intents = GatewayIntents::non_privileged()
        | GatewayIntents::MESSAGE_CONTENT;

    let voice = Songbird::serenity();

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(Handler)
        .framework(framework)
        .register_songbird_with(voice.clone())
        .await
        .expect("Err creating client");

    {
        let deps = PlayerDeps {
            resolver: Arc::new(build_resolver(&config)),
            notifier: Arc::new(DiscordNotifier::new(client.cache_and_http.http.clone())),
            poll_interval: config.poll_interval,
        };
        let players = Players::new(deps, Arc::new(SongbirdDevices::new(voice)));

        let mut w = client.data.write().await;
        w.insert::<PlayersKey>(Arc::new(players));
    }

    tokio::spawn(async move {
        let _ = client.start().await.map_err(|why| error!("Client ended: {why:?}"));
    });

    tokio::signal::ctrl_c().await.expect("Control-C interruption failed!");

    info!("Received Ctrl-C, shutting down.");
}

/// Console logging filtered by `RUST_LOG`, plus a plain log file when `log_dir` is set.
fn init_logging(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_writer = log_dir.and_then(|dir| match std::fs::create_dir_all(dir) {
        Ok(()) => Some(tracing_appender::non_blocking(tracing_appender::rolling::never(dir, "bot.log"))),
        Err(why) => {
            eprintln!("Cannot create log directory {}: {why}", dir.display());
            None
        }
    });

    match file_writer {
        Some((writer, guard)) => {
            tracing_subscriber::registry()
                .with(filter())
                .with(fmt::layer())
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();

            Some(guard)
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter()).init();

            None
        }
    }
}

fn build_resolver(config: &Config) -> TrackResolver {
    let mut resolver = TrackResolver::new(Platform::YouTube)
        .with_client(Arc::new(YouTubeClient::new(&config.ytdlp_path)));

    match &config.spotify {
        Some(credentials) => {
            resolver = resolver.with_client(Arc::new(SpotifyClient::new(
                &credentials.client_id,
                &credentials.client_secret,
            )));
        }
        None => warn!("SPOTIFY_CLIENT_ID is not set, Spotify is disabled"),
    }

    match &config.soundcloud_client_id {
        Some(client_id) => resolver = resolver.with_client(Arc::new(SoundCloudClient::new(client_id))),
        None => warn!("SOUNDCLOUD_CLIENT_ID is not set, SoundCloud is disabled"),
    }

    let enabled = Platform::ALL
        .iter()
        .filter(|platform| resolver.supports(**platform))
        .map(Platform::to_string)
        .collect::<Vec<String>>();

    info!("Enabled platforms: {}", enabled.join(", "));

    resolver
}

#[command]
#[only_in(guilds)]
#[aliases("p")]
async fn play(ctx: &Context, msg: &Message, args: Args) -> CommandResult {
    request_with_reaction(ctx, msg, args, Platform::YouTube).await
}

#[command]
#[only_in(guilds)]
#[aliases("sp")]
async fn spotify(ctx: &Context, msg: &Message, args: Args) -> CommandResult {
    request_with_reaction(ctx, msg, args, Platform::Spotify).await
}

#[command]
#[only_in(guilds)]
#[aliases("sc")]
async fn soundcloud(ctx: &Context, msg: &Message, args: Args) -> CommandResult {
    request_with_reaction(ctx, msg, args, Platform::SoundCloud).await
}

#[command]
#[only_in(guilds)]
async fn help(ctx: &Context, msg: &Message) -> CommandResult {
    let message = r#"
**Commands:**
    **play [URL|Title]** - Queues a track. Titles are searched on YouTube, links are recognised for YouTube, Spotify and SoundCloud.
    **spotify [URL|Title]** - Queues a track, searching titles on Spotify.
    **soundcloud [URL]** - Queues a SoundCloud track from its link.
    **pause** - Pauses the current track.
    **resume** - Resumes the paused track.
    **skip** - Plays the next track.
    **stop** - Stops the current track and drops the rest of the queue.
    **queue** - Shows the upcoming tracks.
    **join** - Joins your voice channel and picks up where the queue left off.
    **leave** - Leaves the voice channel. The interrupted track plays again on the next join.
    "#;

    check_msg(msg.channel_id.say(&ctx.http, message).await);

    Ok(())
}

async fn request_with_reaction(ctx: &Context, msg: &Message, args: Args, hint: Platform) -> CommandResult {
    let bot_id: Option<u64>;

    {
        let data = ctx.data.read().await;
        bot_id = data.get::<BotDataMap>().map(|data| data.id);
    }

    let loading_emoji = Unicode("⏳".to_string());

    msg.react(&ctx.http, loading_emoji.clone()).await?;

    let request_result = request_playback(ctx, msg, args, hint).await;

    if let Some(bot_id) = bot_id {
        msg.channel_id.delete_reaction(&ctx.http, msg.id, Some(UserId(bot_id)), loading_emoji).await?;
    }

    let answer_emoji = match request_result {
        Ok(_) => "👍",
        Err(_) => "💀",
    };

    msg.react(&ctx.http, Unicode(answer_emoji.to_string())).await?;

    Ok(())
}

async fn request_playback(ctx: &Context, msg: &Message, args: Args, hint: Platform) -> CommandResult {
    let user_input = args.message().trim();

    if user_input.is_empty() {
        check_msg(msg.reply(ctx, "Tell me what to play first.").await);

        return Err(CommandError::from("Empty request"));
    }

    info!("User input is {user_input} (hint {hint})");

    let guild_id = get_guild_id(ctx, msg)?;

    join_voice(ctx, msg).await?;
    deafen(ctx, msg).await?;

    let player = get_players(ctx).await?.get_or_create(guild_id, msg.channel_id).await;

    match player.request(user_input, hint).await {
        Ok(track) => {
            info!("Queued {} from {} in guild {}", track.title, track.platform, guild_id.0);

            Ok(())
        }
        Err(why) => {
            info!("Request {user_input} failed: {why}");
            check_msg(msg.channel_id.say(&ctx.http, why.user_message()).await);

            Err(CommandError::from(why))
        }
    }
}

#[command]
#[only_in(guilds)]
async fn pause(ctx: &Context, msg: &Message) -> CommandResult {
    if let Some(player) = connected_player(ctx, msg).await? {
        react_or_report(ctx, msg, player.pause().await, "⏸️").await?;
    }

    Ok(())
}

#[command]
#[only_in(guilds)]
#[aliases("unpause")]
async fn resume(ctx: &Context, msg: &Message) -> CommandResult {
    if let Some(player) = connected_player(ctx, msg).await? {
        react_or_report(ctx, msg, player.resume().await, "▶️").await?;
    }

    Ok(())
}

#[command]
#[only_in(guilds)]
#[aliases("next")]
async fn skip(ctx: &Context, msg: &Message) -> CommandResult {
    if let Some(player) = connected_player(ctx, msg).await? {
        info!("SKIP - invoked from guild {}", player.guild_id().0);
        react_or_report(ctx, msg, player.skip().await, "⏭️").await?;
    }

    Ok(())
}

#[command]
#[only_in(guilds)]
async fn stop(ctx: &Context, msg: &Message) -> CommandResult {
    if let Some(player) = connected_player(ctx, msg).await? {
        react_or_report(ctx, msg, player.stop().await, "⏹️").await?;
    }

    Ok(())
}

#[command]
#[only_in(guilds)]
async fn queue(ctx: &Context, msg: &Message) -> CommandResult {
    let guild_id = get_guild_id(ctx, msg)?;

    let tracks = match get_players(ctx).await?.get(guild_id).await {
        Some(player) => {
            let (position, _) = player.position().await;
            let upcoming = player.upcoming(MAX_LISTED_TRACKS).await;

            upcoming
                .iter()
                .enumerate()
                .map(|(index, track)| format!("{} - {} ({})", position + index + 1, track.title, track.platform))
                .collect::<Vec<String>>()
        }
        None => Vec::new(),
    };

    if tracks.is_empty() {
        check_msg(msg.channel_id.say(&ctx.http, "The queue is empty!").await);
    } else {
        let tracks_formatted = tracks.join("\n");

        check_msg(msg.channel_id.say(&ctx.http, format!("**Queue**:\n```{tracks_formatted}```")).await);
    }

    Ok(())
}

#[command]
#[only_in(guilds)]
async fn join(ctx: &Context, msg: &Message) -> CommandResult {
    let guild_id = get_guild_id(ctx, msg)?;

    join_voice(ctx, msg).await?;
    deafen(ctx, msg).await?;

    if let Some(player) = get_players(ctx).await?.get(guild_id).await {
        player.set_notification_channel(msg.channel_id).await;
        player.reconnect().await;
    }

    msg.react(&ctx.http, Unicode("👌".to_string())).await?;

    Ok(())
}

#[command]
#[only_in(guilds)]
async fn leave(ctx: &Context, msg: &Message) -> CommandResult {
    let guild_id = get_guild_id(ctx, msg)?;
    let manager = voice_manager(ctx).await?;

    if manager.get(guild_id).is_none() {
        check_msg(msg.reply(ctx, "Not in a voice channel").await);

        return Ok(());
    }

    // The cursor has to move back before the connection goes away
    if let Some(player) = get_players(ctx).await?.get(guild_id).await {
        player.disconnect().await;
    }

    if let Err(e) = manager.remove(guild_id).await {
        check_msg(msg.channel_id.say(&ctx.http, format!("Failed: {e:?}")).await);
    }

    check_msg(msg.channel_id.say(&ctx.http, "Left voice channel").await);

    Ok(())
}

/// The guild's player, when the bot is connected and something was queued before.
async fn connected_player(ctx: &Context, msg: &Message) -> CommandResult<Option<Arc<Player>>> {
    let guild_id = get_guild_id(ctx, msg)?;
    let manager = voice_manager(ctx).await?;
    let player = get_players(ctx).await?.get(guild_id).await;

    match player {
        Some(player) if manager.get(guild_id).is_some() => Ok(Some(player)),
        _ => {
            check_msg(msg.channel_id.say(&ctx.http, "o_O Nothing is playing").await);

            Ok(None)
        }
    }
}

async fn react_or_report(ctx: &Context, msg: &Message, result: MusicResult<()>, emoji: &str) -> CommandResult {
    match result {
        Ok(()) => {
            msg.react(&ctx.http, Unicode(emoji.to_string())).await?;

            Ok(())
        }
        Err(why) => {
            if let MusicError::InvariantViolation(_) = why {
                error!("{why}");
            } else {
                warn!("{why}");
            }

            check_msg(msg.channel_id.say(&ctx.http, why.user_message()).await);

            Err(CommandError::from(why))
        }
    }
}

async fn join_voice(ctx: &Context, msg: &Message) -> CommandResult {
    let guild = get_guild(ctx, msg)?;
    let guild_id = guild.id;

    let channel_id = guild
        .voice_states.get(&msg.author.id)
        .and_then(|voice_state| voice_state.channel_id);

    let connect_to = match channel_id {
        Some(channel) => channel,
        None => {
            check_msg(msg.reply(ctx, "Not in a voice channel").await);

            return Err(CommandError::from("Not in a voice channel"));
        }
    };

    let manager = voice_manager(ctx).await?;

    let current = match manager.get(guild_id) {
        Some(handler_lock) => handler_lock.lock().await.current_channel().map(|channel| ChannelId(channel.0)),
        None => None,
    };

    let bot_id: Option<u64>;

    {
        let data = ctx.data.read().await;
        bot_id = data.get::<BotDataMap>().map(|data| data.id);
    }

    let occupants = guild
        .voice_states
        .values()
        .map(|voice_state| (voice_state.channel_id, is_bot(&guild, voice_state, bot_id)));

    if let Some(busy) = listened_elsewhere(current, connect_to, occupants) {
        check_msg(msg.reply(ctx, format!("Someone else is listening to music in {}", busy.mention())).await);

        return Err(CommandError::from("Voice channel in use"));
    }

    let (_handler, joined) = manager.join(guild_id, connect_to).await;
    joined?;

    Ok(())
}

fn is_bot(guild: &Guild, voice_state: &VoiceState, bot_id: Option<u64>) -> bool {
    let member_is_bot = voice_state
        .member
        .as_ref()
        .or_else(|| guild.members.get(&voice_state.user_id))
        .map_or(false, |member| member.user.bot);

    member_is_bot || Some(voice_state.user_id.0) == bot_id
}

async fn deafen(ctx: &Context, msg: &Message) -> CommandResult {
    let guild_id = get_guild_id(ctx, msg)?;

    let manager = voice_manager(ctx).await?;

    let handler_lock = match manager.get(guild_id) {
        Some(handler) => handler,
        None => {
            check_msg(msg.reply(ctx, "Not in a voice channel").await);

            return Ok(());
        }
    };

    let mut handler = handler_lock.lock().await;

    if handler.is_deaf() {
        info!("Already deafen!")
    } else if let Err(e) = handler.deafen(true).await {
        info!("Deafen failed due to {e:?}")
    }

    Ok(())
}

async fn voice_manager(ctx: &Context) -> CommandResult<Arc<Songbird>> {
    songbird::get(ctx).await.ok_or_else(|| CommandError::from("Songbird voice client is not registered"))
}

async fn get_players(ctx: &Context) -> CommandResult<Arc<Players>> {
    let data = ctx.data.read().await;

    data.get::<PlayersKey>().cloned().ok_or_else(|| CommandError::from("Players are not initialised"))
}

/// Checks that a message successfully sent; if not, then logs why.
fn check_msg(result: SerenityResult<Message>) {
    if let Err(why) = result {
        warn!("Error sending message: {why:?}");
    }
}

fn get_guild(ctx: &Context, msg: &Message) -> CommandResult<Guild> {
    msg.guild(&ctx.cache).ok_or(CommandError::from("Guild not found"))
}

fn get_guild_id(ctx: &Context, msg: &Message) -> CommandResult<GuildId> {
    let guild_id = get_guild(ctx, msg)?.id;

    Ok(guild_id)
}
