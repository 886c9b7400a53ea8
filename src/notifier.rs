use std::sync::Arc;

use serenity::async_trait;
use serenity::http::{Http, HttpError};
use serenity::model::id::ChannelId;
use serenity::Error as SerenityError;
use tracing::debug;

use crate::error::{MusicError, MusicResult};
use crate::models::{MessageHandle, Track};

/// Discord's JSON error code for "Unknown Message".
const UNKNOWN_MESSAGE: isize = 10008;
const EMBED_COLOUR: u32 = 0x1DB954;

/// Where "now playing" notifications are posted.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, channel_id: ChannelId, track: &Track) -> MusicResult<MessageHandle>;

    /// Deleting a message that is already gone succeeds.
    async fn delete(&self, message: &MessageHandle) -> MusicResult<()>;
}

pub struct DiscordNotifier {
    http: Arc<Http>,
}

impl DiscordNotifier {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn send(&self, channel_id: ChannelId, track: &Track) -> MusicResult<MessageHandle> {
        let message = channel_id
            .send_message(&self.http, |m| {
                m.embed(|e| {
                    e.title(format!("Now playing from {}", track.platform))
                        .description(format!("[{}]({})", track.title, track.public_url))
                        .colour(EMBED_COLOUR)
                        .footer(|f| f.text(track.credits()))
                })
            })
            .await
            .map_err(|why| MusicError::Remote(format!("could not send now playing message: {why}")))?;

        Ok(MessageHandle {
            channel_id,
            message_id: message.id,
        })
    }

    async fn delete(&self, message: &MessageHandle) -> MusicResult<()> {
        match message.channel_id.delete_message(&self.http, message.message_id).await {
            Ok(()) => Ok(()),
            Err(why) if is_already_gone(&why) => {
                debug!("Now playing message {} was already deleted", message.message_id);
                Ok(())
            }
            Err(why) => Err(MusicError::Remote(format!("could not delete now playing message: {why}"))),
        }
    }
}

fn is_already_gone(error: &SerenityError) -> bool {
    match error {
        SerenityError::Http(http_error) => match &**http_error {
            HttpError::UnsuccessfulRequest(response) => {
                response.error.code == UNKNOWN_MESSAGE || response.status_code.as_u16() == 404
            }
            _ => false,
        },
        _ => false,
    }
}
