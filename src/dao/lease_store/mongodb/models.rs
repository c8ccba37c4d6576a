use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};

use crate::dao::{
    lease_store::Lease,
    models::{ChannelId, GameStateRecord, GuildId, PlayerEntry},
};

/// One document per leased key, holding the record and its current holder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoGameStateDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<MongoRecordBody>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease: Option<MongoLeaseBody>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoLeaseBody {
    pub token: String,
    pub expires_at: DateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MongoRecordBody {
    pub guild_id: String,
    pub connect_code: String,
    pub tracking_channel_id: String,
    pub running: bool,
    pub players: Vec<MongoPlayerBody>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MongoPlayerBody {
    pub user_id: String,
    #[serde(default)]
    pub in_game_name: Option<String>,
    pub should_be_mute: bool,
    pub should_be_deaf: bool,
}

impl MongoGameStateDocument {
    /// Document as written by the holder of `lease`; the lease fields are preserved verbatim so
    /// the replacement keeps ownership intact.
    pub fn leased(key: &str, record: GameStateRecord, lease: &Lease) -> Self {
        Self {
            id: key.to_owned(),
            record: Some(record.into()),
            lease: Some(MongoLeaseBody::from(lease)),
        }
    }
}

impl From<&Lease> for MongoLeaseBody {
    fn from(lease: &Lease) -> Self {
        Self {
            token: lease.token().to_string(),
            expires_at: DateTime::from_system_time(lease.expires_at()),
        }
    }
}

impl From<GameStateRecord> for MongoRecordBody {
    fn from(value: GameStateRecord) -> Self {
        let mut players: Vec<MongoPlayerBody> =
            value.player_table.into_values().map(Into::into).collect();
        players.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Self {
            guild_id: value.guild_id.0,
            connect_code: value.connect_code,
            tracking_channel_id: value.tracking_channel_id.0,
            running: value.running,
            players,
        }
    }
}

impl From<MongoRecordBody> for GameStateRecord {
    fn from(value: MongoRecordBody) -> Self {
        Self {
            guild_id: GuildId(value.guild_id),
            connect_code: value.connect_code,
            tracking_channel_id: ChannelId(value.tracking_channel_id),
            running: value.running,
            player_table: value
                .players
                .into_iter()
                .map(|player| {
                    let entry: PlayerEntry = player.into();
                    (entry.user_id.clone(), entry)
                })
                .collect(),
        }
    }
}

impl From<PlayerEntry> for MongoPlayerBody {
    fn from(value: PlayerEntry) -> Self {
        Self {
            user_id: value.user_id.0,
            in_game_name: value.in_game_name,
            should_be_mute: value.should_be_mute,
            should_be_deaf: value.should_be_deaf,
        }
    }
}

impl From<MongoPlayerBody> for PlayerEntry {
    fn from(value: MongoPlayerBody) -> Self {
        Self {
            user_id: value.user_id.into(),
            in_game_name: value.in_game_name,
            should_be_mute: value.should_be_mute,
            should_be_deaf: value.should_be_deaf,
        }
    }
}

/// Filter matching the document of `key`.
pub fn doc_id(key: &str) -> Document {
    doc! { "_id": key }
}

/// Filter matching `key` only while `lease` is still the live holder.
pub fn held_by(key: &str, lease: &Lease) -> Document {
    doc! {
        "_id": key,
        "lease.token": lease.token().to_string(),
        "lease.expires_at": { "$gt": DateTime::now() },
    }
}

/// Filter matching `key` when nobody holds it or the previous holder's TTL lapsed.
pub fn claimable(key: &str, now: DateTime) -> Document {
    doc! {
        "_id": key,
        "$or": [
            { "lease": null },
            { "lease.expires_at": { "$lte": now } },
        ],
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn record_survives_document_conversion() {
        let mut record = GameStateRecord::new("g1".into(), "ABCDEF", "v1".into());
        for (user, name) in [("u2", Some("Blue")), ("u1", None)] {
            let entry = record.player_or_insert(&user.into());
            entry.in_game_name = name.map(str::to_owned);
            entry.should_be_deaf = true;
        }

        let body: MongoRecordBody = record.clone().into();
        assert_eq!(body.players[0].user_id, "u1");

        let restored: GameStateRecord = body.into();
        assert_eq!(restored, record);
    }

    #[test]
    fn leased_document_carries_holder_token() {
        let lease = Lease::grant("game_state:g1", Duration::from_secs(5));
        let record = GameStateRecord::new("g1".into(), "ABCDEF", "v1".into());
        let document = MongoGameStateDocument::leased("game_state:g1", record, &lease);

        let body = document.lease.expect("lease body");
        assert_eq!(body.token, lease.token().to_string());
        assert!(document.record.is_some());
    }

    #[test]
    fn holder_filter_pins_id_token_and_expiry() {
        let lease = Lease::grant("game_state:g1", Duration::from_secs(5));

        let filter = held_by("game_state:g1", &lease);

        assert_eq!(filter.get_str("_id").unwrap(), "game_state:g1");
        assert_eq!(
            filter.get_str("lease.token").unwrap(),
            lease.token().to_string()
        );
        assert!(filter.get_document("lease.expires_at").unwrap().contains_key("$gt"));
    }
}
