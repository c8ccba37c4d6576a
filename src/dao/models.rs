use std::{collections::HashMap, fmt};

use serde::{Deserialize, Serialize};

macro_rules! snowflake_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Wrap a raw platform identifier.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Borrow the raw identifier.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

snowflake_id!(
    /// Discord guild (server) identifier.
    GuildId
);
snowflake_id!(
    /// Discord user identifier.
    UserId
);
snowflake_id!(
    /// Discord channel identifier.
    ChannelId
);

/// Per-user cache entry owned by a [`GameStateRecord`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerEntry {
    /// Platform user this entry belongs to.
    pub user_id: UserId,
    /// In-game name the user is linked to, if any.
    pub in_game_name: Option<String>,
    /// Last mute target applied to the user.
    pub should_be_mute: bool,
    /// Last deafen target applied to the user.
    pub should_be_deaf: bool,
}

impl PlayerEntry {
    /// Fresh, unlinked entry with no recorded target.
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            in_game_name: None,
            should_be_mute: false,
            should_be_deaf: false,
        }
    }

    /// Recorded `(mute, deaf)` target.
    pub fn target(&self) -> (bool, bool) {
        (self.should_be_mute, self.should_be_deaf)
    }

    /// Record a new target, returning whether it differs from the previous one.
    pub fn set_target(&mut self, mute: bool, deaf: bool) -> bool {
        let changed = self.target() != (mute, deaf);
        self.should_be_mute = mute;
        self.should_be_deaf = deaf;
        changed
    }
}

/// Lease-guarded aggregate describing one game in one guild.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameStateRecord {
    /// Guild the game is played in.
    pub guild_id: GuildId,
    /// Correlation key shared with the game-phase feed.
    pub connect_code: String,
    /// Voice channel whose occupants are tracked.
    pub tracking_channel_id: ChannelId,
    /// Whether enforcement is currently active.
    pub running: bool,
    /// Known players keyed by platform user identifier.
    pub player_table: HashMap<UserId, PlayerEntry>,
}

impl GameStateRecord {
    /// Build a running record with an empty player table.
    pub fn new(
        guild_id: GuildId,
        connect_code: impl Into<String>,
        tracking_channel_id: ChannelId,
    ) -> Self {
        Self {
            guild_id,
            connect_code: connect_code.into(),
            tracking_channel_id,
            running: true,
            player_table: HashMap::new(),
        }
    }

    /// Look up the entry for `user_id`.
    pub fn player(&self, user_id: &UserId) -> Option<&PlayerEntry> {
        self.player_table.get(user_id)
    }

    /// Entry for `user_id`, created unlinked on first sight.
    pub fn player_or_insert(&mut self, user_id: &UserId) -> &mut PlayerEntry {
        self.player_table
            .entry(user_id.clone())
            .or_insert_with(|| PlayerEntry::new(user_id.clone()))
    }

    /// Drop the entry for `user_id`, returning it if it existed.
    pub fn clear_player(&mut self, user_id: &UserId) -> Option<PlayerEntry> {
        self.player_table.remove(user_id)
    }

    /// Whether this record can be (re)bound to `connect_code`.
    ///
    /// An empty code can always be set; a non-empty one never changes.
    pub fn accepts_connect_code(&self, connect_code: &str) -> bool {
        self.connect_code.is_empty() || self.connect_code == connect_code
    }
}
