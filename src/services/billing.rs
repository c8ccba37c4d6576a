use dashmap::DashSet;
use futures::future::{self, BoxFuture};

use crate::dao::models::GuildId;

/// Source of the premium flag attached to enforcement requests.
pub trait PremiumLookup: Send + Sync {
    /// Premium flag of `guild_id`; lookups that fail count as non-premium.
    fn is_premium(&self, guild_id: &GuildId) -> BoxFuture<'static, bool>;
}

/// Static premium list loaded from configuration.
#[derive(Debug, Default)]
pub struct PremiumRegistry {
    guilds: DashSet<GuildId>,
}

impl PremiumRegistry {
    /// Registry seeded with the configured premium guilds.
    pub fn new(guilds: impl IntoIterator<Item = GuildId>) -> Self {
        Self {
            guilds: guilds.into_iter().collect(),
        }
    }

    /// Mark `guild_id` as premium.
    pub fn grant(&self, guild_id: GuildId) {
        self.guilds.insert(guild_id);
    }

    /// Drop the premium flag of `guild_id`.
    pub fn revoke(&self, guild_id: &GuildId) {
        self.guilds.remove(guild_id);
    }

    /// Whether `guild_id` is premium.
    pub fn contains(&self, guild_id: &GuildId) -> bool {
        self.guilds.contains(guild_id)
    }
}

impl PremiumLookup for PremiumRegistry {
    fn is_premium(&self, guild_id: &GuildId) -> BoxFuture<'static, bool> {
        Box::pin(future::ready(self.contains(guild_id)))
    }
}
