use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::dao::models::{GameStateRecord, PlayerEntry};

/// Payload used to start (or restart) the game of a guild.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct StartGameRequest {
    /// Code correlating the guild with the capture client.
    #[validate(length(min = 1, max = 16))]
    pub connect_code: String,
    /// Voice channel whose occupants are enforced.
    #[validate(length(min = 1))]
    pub tracking_channel_id: String,
}

/// Link a platform user to an in-game name.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct LinkPlayerRequest {
    #[validate(length(min = 1, max = 32))]
    pub in_game_name: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
/// Public projection of a player entry.
pub struct PlayerSummary {
    pub user_id: String,
    pub in_game_name: Option<String>,
    pub should_be_mute: bool,
    pub should_be_deaf: bool,
}

impl From<PlayerEntry> for PlayerSummary {
    fn from(entry: PlayerEntry) -> Self {
        Self {
            user_id: entry.user_id.0,
            in_game_name: entry.in_game_name,
            should_be_mute: entry.should_be_mute,
            should_be_deaf: entry.should_be_deaf,
        }
    }
}

/// Summary of the game of a guild.
#[derive(Debug, Serialize, ToSchema)]
pub struct GameSummary {
    pub guild_id: String,
    pub connect_code: String,
    pub tracking_channel_id: String,
    pub running: bool,
    /// Players sorted by user identifier.
    pub players: Vec<PlayerSummary>,
}

impl From<GameStateRecord> for GameSummary {
    fn from(record: GameStateRecord) -> Self {
        let mut players = record
            .player_table
            .into_values()
            .map(PlayerSummary::from)
            .collect::<Vec<_>>();
        players.sort_by(|a, b| a.user_id.cmp(&b.user_id));

        Self {
            guild_id: record.guild_id.0,
            connect_code: record.connect_code,
            tracking_channel_id: record.tracking_channel_id.0,
            running: record.running,
            players,
        }
    }
}

/// Returned once a game has been ended.
#[derive(Debug, Serialize, ToSchema)]
pub struct EndGameResponse {
    /// Users unmuted and undeafened on the way out.
    pub released: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_sorts_players() {
        let mut record = GameStateRecord::new("g1".into(), "ABCDEF", "v1".into());
        record.player_or_insert(&"u2".into());
        record.player_or_insert(&"u1".into()).in_game_name = Some("Red".into());

        let summary = GameSummary::from(record);

        let ids = summary
            .players
            .iter()
            .map(|player| player.user_id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(ids, ["u1", "u2"]);
        assert_eq!(summary.players[0].in_game_name.as_deref(), Some("Red"));
        assert!(summary.running);
    }

    #[test]
    fn start_request_requires_code_and_channel() {
        let request = StartGameRequest {
            connect_code: String::new(),
            tracking_channel_id: "v1".into(),
        };
        assert!(request.validate().is_err());

        let request = StartGameRequest {
            connect_code: "ABCDEF".into(),
            tracking_channel_id: "v1".into(),
        };
        assert!(request.validate().is_ok());
    }
}
