//! Payloads pushed by the gateway listener and the capture ingester.

use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    dao::models::{ChannelId, UserId},
    state::{
        game::{AmongUsData, GamePhase, PlayerData},
        presence::Occupant,
    },
};

/// Voice state change of one user; a missing channel means the user disconnected.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct VoiceStateUpdate {
    #[validate(length(min = 1))]
    pub user_id: String,
    #[serde(default)]
    #[validate(length(min = 1))]
    pub channel_id: Option<String>,
}

impl From<VoiceStateUpdate> for Occupant {
    fn from(update: VoiceStateUpdate) -> Self {
        Occupant {
            user_id: UserId::from(update.user_id),
            channel_id: update.channel_id.map(ChannelId::from),
        }
    }
}

/// Full voice-state list of a guild, as sent on gateway (re)connect.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct VoiceStateSnapshot {
    #[validate(nested)]
    pub voice_states: Vec<VoiceStateUpdate>,
}

/// Liveness of one in-game player.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct PlayerUpdate {
    pub is_alive: bool,
}

/// Named player inside a [`GameSnapshot`].
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct PlayerSnapshot {
    #[validate(length(min = 1, max = 32))]
    pub name: String,
    pub is_alive: bool,
}

/// Complete game data reported for a connect code.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct GameSnapshot {
    pub phase: GamePhase,
    #[serde(default)]
    #[validate(nested)]
    pub players: Vec<PlayerSnapshot>,
}

impl From<GameSnapshot> for AmongUsData {
    fn from(snapshot: GameSnapshot) -> Self {
        AmongUsData {
            phase: snapshot.phase,
            players: snapshot
                .players
                .into_iter()
                .map(|player| {
                    (
                        player.name,
                        PlayerData {
                            is_alive: player.is_alive,
                        },
                    )
                })
                .collect(),
        }
    }
}

/// Phase transition reported by the capture client.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct PhaseUpdate {
    pub phase: GamePhase,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_converts_to_game_data() {
        let snapshot: GameSnapshot = serde_json::from_str(
            r#"{"phase": "discussion", "players": [{"name": "Red", "is_alive": false}]}"#,
        )
        .unwrap();
        assert!(snapshot.validate().is_ok());

        let data = AmongUsData::from(snapshot);
        assert_eq!(data.phase, GamePhase::Discussion);
        assert_eq!(data.by_name("Red"), Some(&PlayerData { is_alive: false }));
    }

    #[test]
    fn nested_voice_states_are_validated() {
        let snapshot: VoiceStateSnapshot =
            serde_json::from_str(r#"{"voice_states": [{"user_id": ""}]}"#).unwrap();
        assert!(snapshot.validate().is_err());
    }
}
