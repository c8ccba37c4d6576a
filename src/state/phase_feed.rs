//! Game phase boundary and the in-process cache fed by the capture ingester.

use dashmap::DashMap;
use futures::future::{self, BoxFuture};

use crate::state::game::{AmongUsData, GamePhase, PlayerData};

/// Read-only view of the external game feed.
pub trait GamePhaseFeed: Send + Sync {
    /// Latest snapshot for `connect_code`, if the ingester has sent one.
    fn phase_data(&self, connect_code: &str) -> BoxFuture<'static, Option<AmongUsData>>;
}

/// Latest game data per connect code.
#[derive(Debug, Default)]
pub struct PhaseFeedCache {
    games: DashMap<String, AmongUsData>,
}

impl PhaseFeedCache {
    /// Empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole snapshot for `connect_code`.
    pub fn replace(&self, connect_code: impl Into<String>, data: AmongUsData) {
        self.games.insert(connect_code.into(), data);
    }

    /// Record a phase transition.
    pub fn set_phase(&self, connect_code: impl Into<String>, phase: GamePhase) {
        self.games.entry(connect_code.into()).or_default().phase = phase;
    }

    /// Record a player joining or changing liveness.
    pub fn set_player(&self, connect_code: impl Into<String>, name: impl Into<String>, is_alive: bool) {
        self.games
            .entry(connect_code.into())
            .or_default()
            .players
            .insert(name.into(), PlayerData { is_alive });
    }

    /// Record a player leaving the lobby.
    pub fn remove_player(&self, connect_code: &str, name: &str) {
        if let Some(mut game) = self.games.get_mut(connect_code) {
            game.players.remove(name);
        }
    }

    /// Drop everything known about `connect_code`.
    pub fn remove(&self, connect_code: &str) -> bool {
        self.games.remove(connect_code).is_some()
    }
}

impl GamePhaseFeed for PhaseFeedCache {
    fn phase_data(&self, connect_code: &str) -> BoxFuture<'static, Option<AmongUsData>> {
        let data = self.games.get(connect_code).map(|game| game.clone());
        Box::pin(future::ready(data))
    }
}
