use std::collections::HashMap;
use std::sync::Arc;

use serenity::model::id::{ChannelId, GuildId};
use serenity::prelude::TypeMapKey;
use tokio::sync::Mutex;
use tracing::debug;

use crate::player::{Player, PlayerDeps};
use crate::voice::DeviceFactory;

/// Every guild's player, created on first use and kept for the life of the process.
pub struct Players {
    players: Mutex<HashMap<GuildId, Arc<Player>>>,
    deps: PlayerDeps,
    devices: Arc<dyn DeviceFactory>,
}

pub struct PlayersKey;

impl TypeMapKey for PlayersKey {
    type Value = Arc<Players>;
}

impl Players {
    pub fn new(deps: PlayerDeps, devices: Arc<dyn DeviceFactory>) -> Self {
        Self {
            players: Mutex::new(HashMap::new()),
            deps,
            devices,
        }
    }

    /// Returns the guild's player, now notifying in `channel_id`.
    ///
    /// Only the lookup runs under the registry lock, so one guild never waits on another.
    pub async fn get_or_create(&self, guild_id: GuildId, channel_id: ChannelId) -> Arc<Player> {
        let existing = {
            let mut players = self.players.lock().await;

            match players.get(&guild_id) {
                Some(player) => player.clone(),
                None => {
                    debug!("Creating player for guild {guild_id}");

                    let device = self.devices.device_for(guild_id);
                    let player = Arc::new(Player::new(guild_id, channel_id, &self.deps, device));
                    players.insert(guild_id, player.clone());

                    return player;
                }
            }
        };

        existing.set_notification_channel(channel_id).await;

        existing
    }

    pub async fn get(&self, guild_id: GuildId) -> Option<Arc<Player>> {
        self.players.lock().await.get(&guild_id).cloned()
    }
}
