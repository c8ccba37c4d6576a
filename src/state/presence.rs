//! Voice presence boundary and the in-process cache fed by the gateway listener.

use dashmap::DashMap;
use futures::future::{self, BoxFuture};
use indexmap::IndexMap;
use thiserror::Error;

use crate::dao::models::{ChannelId, GuildId, UserId};

/// One voice state observed in a guild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Occupant {
    /// User holding the voice state.
    pub user_id: UserId,
    /// Channel the user sits in; `None` once disconnected.
    pub channel_id: Option<ChannelId>,
}

impl Occupant {
    /// Occupant connected to `channel_id`.
    pub fn new(user_id: impl Into<UserId>, channel_id: impl Into<ChannelId>) -> Self {
        Self {
            user_id: user_id.into(),
            channel_id: Some(channel_id.into()),
        }
    }
}

/// Failures surfaced by a presence source.
#[derive(Debug, Error)]
pub enum PresenceError {
    #[error("guild `{0}` is not known to the presence cache")]
    GuildNotFound(GuildId),
    #[error("voice presence unavailable: {0}")]
    Unavailable(String),
}

/// Read-only view of voice-channel occupancy.
pub trait VoicePresence: Send + Sync {
    /// Voice occupants of `guild_id`, in arrival order.
    fn list_occupants(
        &self,
        guild_id: &GuildId,
    ) -> BoxFuture<'static, Result<Vec<Occupant>, PresenceError>>;
}

/// Voice states per guild, in arrival order.
#[derive(Debug, Default)]
pub struct PresenceCache {
    guilds: DashMap<GuildId, IndexMap<UserId, ChannelId>>,
}

impl PresenceCache {
    /// Empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a single voice-state update; a `None` channel removes the user.
    pub fn update_voice_state(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        channel_id: Option<ChannelId>,
    ) {
        let mut guild = self.guilds.entry(guild_id).or_default();
        match channel_id {
            Some(channel_id) => {
                guild.insert(user_id, channel_id);
            }
            None => {
                guild.shift_remove(&user_id);
            }
        }
    }

    /// Replace the full voice-state list of a guild.
    pub fn replace_guild(&self, guild_id: GuildId, occupants: Vec<Occupant>) {
        let states = occupants
            .into_iter()
            .filter_map(|occupant| Some((occupant.user_id, occupant.channel_id?)))
            .collect();
        self.guilds.insert(guild_id, states);
    }

    /// Forget a guild entirely (bot removed, guild unavailable).
    pub fn remove_guild(&self, guild_id: &GuildId) -> bool {
        self.guilds.remove(guild_id).is_some()
    }

    fn occupants(&self, guild_id: &GuildId) -> Result<Vec<Occupant>, PresenceError> {
        let guild = self
            .guilds
            .get(guild_id)
            .ok_or_else(|| PresenceError::GuildNotFound(guild_id.clone()))?;
        Ok(guild
            .iter()
            .map(|(user_id, channel_id)| Occupant {
                user_id: user_id.clone(),
                channel_id: Some(channel_id.clone()),
            })
            .collect())
    }
}

impl VoicePresence for PresenceCache {
    fn list_occupants(
        &self,
        guild_id: &GuildId,
    ) -> BoxFuture<'static, Result<Vec<Occupant>, PresenceError>> {
        Box::pin(future::ready(self.occupants(guild_id)))
    }
}
