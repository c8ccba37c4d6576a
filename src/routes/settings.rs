use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
};

use crate::{
    dao::models::GuildId,
    dto::settings::{PremiumStatus, VoiceRulesResponse},
    services::policy::VoiceRules,
    state::SharedState,
};

/// Per-guild settings: voice rule overrides and the premium flag.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route(
            "/guilds/{guild_id}/voice-rules",
            get(get_voice_rules).put(set_voice_rules).delete(reset_voice_rules),
        )
        .route(
            "/guilds/{guild_id}/premium",
            put(set_premium).get(get_premium),
        )
}

fn rules_response(state: &SharedState, guild_id: GuildId) -> VoiceRulesResponse {
    VoiceRulesResponse {
        overridden: state.policy().has_override(&guild_id),
        rules: state.policy().rules_for(&guild_id),
        guild_id: guild_id.0,
    }
}

/// Effective voice rules of a guild.
#[utoipa::path(
    get,
    path = "/guilds/{guild_id}/voice-rules",
    tag = "settings",
    params(("guild_id" = String, Path, description = "Guild to inspect")),
    responses((status = 200, description = "Effective rules", body = VoiceRulesResponse))
)]
pub async fn get_voice_rules(
    State(state): State<SharedState>,
    Path(guild_id): Path<GuildId>,
) -> Json<VoiceRulesResponse> {
    Json(rules_response(&state, guild_id))
}

/// Override the voice rules of a guild.
#[utoipa::path(
    put,
    path = "/guilds/{guild_id}/voice-rules",
    tag = "settings",
    params(("guild_id" = String, Path, description = "Guild to configure")),
    request_body = VoiceRules,
    responses((status = 200, description = "Rules stored", body = VoiceRulesResponse))
)]
pub async fn set_voice_rules(
    State(state): State<SharedState>,
    Path(guild_id): Path<GuildId>,
    Json(rules): Json<VoiceRules>,
) -> Json<VoiceRulesResponse> {
    state.policy().set_rules(guild_id.clone(), rules);
    Json(rules_response(&state, guild_id))
}

/// Revert a guild to the default voice rules.
#[utoipa::path(
    delete,
    path = "/guilds/{guild_id}/voice-rules",
    tag = "settings",
    params(("guild_id" = String, Path, description = "Guild to reset")),
    responses((status = 204, description = "Override removed"))
)]
pub async fn reset_voice_rules(
    State(state): State<SharedState>,
    Path(guild_id): Path<GuildId>,
) -> StatusCode {
    state.policy().clear_rules(&guild_id);
    StatusCode::NO_CONTENT
}

/// Premium flag of a guild.
#[utoipa::path(
    get,
    path = "/guilds/{guild_id}/premium",
    tag = "settings",
    params(("guild_id" = String, Path, description = "Guild to inspect")),
    responses((status = 200, description = "Premium flag", body = PremiumStatus))
)]
pub async fn get_premium(
    State(state): State<SharedState>,
    Path(guild_id): Path<GuildId>,
) -> Json<PremiumStatus> {
    Json(PremiumStatus {
        premium: state.premium().contains(&guild_id),
    })
}

/// Grant or revoke premium for a guild.
#[utoipa::path(
    put,
    path = "/guilds/{guild_id}/premium",
    tag = "settings",
    params(("guild_id" = String, Path, description = "Guild to configure")),
    request_body = PremiumStatus,
    responses((status = 200, description = "Premium flag stored", body = PremiumStatus))
)]
pub async fn set_premium(
    State(state): State<SharedState>,
    Path(guild_id): Path<GuildId>,
    Json(payload): Json<PremiumStatus>,
) -> Json<PremiumStatus> {
    if payload.premium {
        state.premium().grant(guild_id);
    } else {
        state.premium().revoke(&guild_id);
    }
    Json(payload)
}
