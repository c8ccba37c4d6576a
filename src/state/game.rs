use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::dao::{
    lease_store::state_key,
    models::{ChannelId, GuildId, UserId},
};

/// Reserved in-game name marking a linked observer rather than a player.
pub const SPECTATOR_PLAYER_NAME: &str = "Spectator";

/// Phase reported by the game-state ingester.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum GamePhase {
    /// Pre-game lobby.
    Lobby,
    /// Round in progress, players doing tasks.
    Tasks,
    /// Meeting / voting.
    Discussion,
    /// Game not started or client in the main menu.
    #[default]
    Menu,
}

/// Liveness of one in-game player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerData {
    /// Whether the player is still alive this round.
    pub is_alive: bool,
}

/// Snapshot of the external game feed for one connect code.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AmongUsData {
    /// Current phase.
    pub phase: GamePhase,
    /// Per in-game-name liveness.
    pub players: HashMap<String, PlayerData>,
}

impl AmongUsData {
    /// Look up a player by in-game name.
    pub fn by_name(&self, name: &str) -> Option<&PlayerData> {
        self.players.get(name)
    }
}

/// How a platform user relates to the game feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Linkage {
    /// Linked to an in-game player present in the feed.
    Player { is_alive: bool },
    /// Linked with the reserved spectator marker.
    Spectator,
    /// No usable linkage.
    Unlinked,
}

impl Linkage {
    /// Join an optional in-game name against the feed snapshot.
    pub fn resolve(in_game_name: Option<&str>, data: &AmongUsData) -> Self {
        match in_game_name {
            Some(SPECTATOR_PLAYER_NAME) => Linkage::Spectator,
            Some(name) => data
                .by_name(name)
                .map(|player| Linkage::Player {
                    is_alive: player.is_alive,
                })
                .unwrap_or(Linkage::Unlinked),
            None => Linkage::Unlinked,
        }
    }

    /// Whether the user is linked to a player in the feed and may receive enforcement changes.
    pub fn is_linked(self) -> bool {
        matches!(self, Linkage::Player { .. })
    }

    /// Whether the user counts as tracked when sitting in the tracking channel.
    ///
    /// Spectators widen tracking without becoming eligible for changes.
    pub fn is_tracked(self) -> bool {
        !matches!(self, Linkage::Unlinked)
    }

    /// Liveness fed to the voice policy; spectators and unlinked users count as not alive.
    pub fn is_alive(self) -> bool {
        matches!(self, Linkage::Player { is_alive: true })
    }
}

/// Identifies one logical game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameStateRequest {
    /// Guild owning the game.
    pub guild_id: GuildId,
    /// Tracking channel named by the caller, when known.
    pub tracking_channel_id: Option<ChannelId>,
}

impl GameStateRequest {
    /// Request scoped to `guild_id` only.
    pub fn new(guild_id: GuildId) -> Self {
        Self {
            guild_id,
            tracking_channel_id: None,
        }
    }

    /// Attach the tracking channel the caller refers to.
    pub fn with_tracking_channel(mut self, channel_id: ChannelId) -> Self {
        self.tracking_channel_id = Some(channel_id);
        self
    }

    /// Lease store key of the game state.
    pub fn key(&self) -> String {
        state_key(&self.guild_id)
    }
}

/// Ordering applied to the change list before dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum HandlePriority {
    /// Keep observation order.
    #[default]
    NoPriority,
    /// Alive users first.
    AlivePriority,
    /// Dead users first.
    DeadPriority,
}

impl HandlePriority {
    fn favours(self, is_alive: bool) -> bool {
        match self {
            HandlePriority::NoPriority => false,
            HandlePriority::AlivePriority => is_alive,
            HandlePriority::DeadPriority => !is_alive,
        }
    }
}

/// One pending enforcement action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRequest {
    /// Target user.
    #[serde(rename = "userID")]
    pub user_id: UserId,
    /// Desired server-mute state.
    pub mute: bool,
    /// Desired server-deafen state.
    pub deaf: bool,
}

/// Change list ordered by [`HandlePriority`], stable within each group.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    priority: HandlePriority,
    first: Vec<ChangeRequest>,
    rest: Vec<ChangeRequest>,
}

impl ChangeSet {
    /// Empty set ordered by `priority`.
    pub fn new(priority: HandlePriority) -> Self {
        Self {
            priority,
            first: Vec::new(),
            rest: Vec::new(),
        }
    }

    /// Append a change observed for a user with the given liveness.
    pub fn push(&mut self, change: ChangeRequest, is_alive: bool) {
        if self.priority.favours(is_alive) {
            self.first.push(change);
        } else {
            self.rest.push(change);
        }
    }

    /// Number of queued changes.
    pub fn len(&self) -> usize {
        self.first.len() + self.rest.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flatten into dispatch order.
    pub fn into_vec(self) -> Vec<ChangeRequest> {
        let mut ordered = self.first;
        ordered.extend(self.rest);
        ordered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(user: &str) -> ChangeRequest {
        ChangeRequest {
            user_id: user.into(),
            mute: true,
            deaf: false,
        }
    }

    fn ordered(priority: HandlePriority) -> Vec<String> {
        // a, c, e alive; b, d dead, observed alternately.
        let observed = [("a", true), ("b", false), ("c", true), ("d", false), ("e", true)];
        let mut set = ChangeSet::new(priority);
        for (user, alive) in observed {
            set.push(change(user), alive);
        }
        set.into_vec()
            .into_iter()
            .map(|change| change.user_id.0)
            .collect()
    }

    #[test]
    fn no_priority_keeps_observation_order() {
        assert_eq!(ordered(HandlePriority::NoPriority), ["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn alive_priority_puts_alive_first_and_stays_stable() {
        assert_eq!(ordered(HandlePriority::AlivePriority), ["a", "c", "e", "b", "d"]);
    }

    #[test]
    fn dead_priority_puts_dead_first_and_stays_stable() {
        assert_eq!(ordered(HandlePriority::DeadPriority), ["b", "d", "a", "c", "e"]);
    }

    #[test]
    fn linkage_resolution() {
        let mut data = AmongUsData::default();
        data.players
            .insert("Red".into(), PlayerData { is_alive: false });

        assert_eq!(
            Linkage::resolve(Some("Red"), &data),
            Linkage::Player { is_alive: false }
        );
        assert_eq!(Linkage::resolve(Some("Blue"), &data), Linkage::Unlinked);
        assert_eq!(Linkage::resolve(None, &data), Linkage::Unlinked);
        assert_eq!(
            Linkage::resolve(Some(SPECTATOR_PLAYER_NAME), &data),
            Linkage::Spectator
        );
        assert!(Linkage::Spectator.is_tracked());
        assert!(!Linkage::Spectator.is_linked());
        assert!(!Linkage::Spectator.is_alive());
        assert!(Linkage::Player { is_alive: false }.is_linked());
        assert!(!Linkage::Unlinked.is_tracked());
    }

    #[test]
    fn change_request_serializes_with_enforcer_field_names() {
        let json = serde_json::to_value(change("42")).unwrap();
        assert_eq!(json, serde_json::json!({"userID": "42", "mute": true, "deaf": false}));
    }
}
