use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{post, put},
};
use axum_valid::Valid;
use tracing::debug;

use crate::{
    dao::models::{ChannelId, GuildId, UserId},
    dto::feed::{GameSnapshot, PhaseUpdate, PlayerUpdate, VoiceStateSnapshot, VoiceStateUpdate},
    error::AppError,
    state::SharedState,
};

/// Ingest routes filling the voice presence and game phase caches.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route(
            "/feed/guilds/{guild_id}/voice-states",
            post(update_voice_state)
                .put(replace_voice_states)
                .delete(forget_guild),
        )
        .route(
            "/feed/games/{connect_code}",
            put(replace_game).delete(forget_game),
        )
        .route("/feed/games/{connect_code}/phase", post(update_phase))
        .route(
            "/feed/games/{connect_code}/players/{name}",
            put(update_player).delete(remove_player),
        )
}

/// Apply a single voice-state change.
#[utoipa::path(
    post,
    path = "/feed/guilds/{guild_id}/voice-states",
    tag = "feed",
    params(("guild_id" = String, Path, description = "Guild the voice state belongs to")),
    request_body = VoiceStateUpdate,
    responses((status = 204, description = "Voice state recorded"))
)]
pub async fn update_voice_state(
    State(state): State<SharedState>,
    Path(guild_id): Path<GuildId>,
    Valid(Json(payload)): Valid<Json<VoiceStateUpdate>>,
) -> StatusCode {
    state.presence().update_voice_state(
        guild_id,
        UserId::from(payload.user_id),
        payload.channel_id.map(ChannelId::from),
    );
    StatusCode::NO_CONTENT
}

/// Replace the voice-state list of a guild.
#[utoipa::path(
    put,
    path = "/feed/guilds/{guild_id}/voice-states",
    tag = "feed",
    params(("guild_id" = String, Path, description = "Guild the voice states belong to")),
    request_body = VoiceStateSnapshot,
    responses((status = 204, description = "Voice states replaced"))
)]
pub async fn replace_voice_states(
    State(state): State<SharedState>,
    Path(guild_id): Path<GuildId>,
    Valid(Json(payload)): Valid<Json<VoiceStateSnapshot>>,
) -> StatusCode {
    debug!(guild_id = %guild_id, count = payload.voice_states.len(), "voice states replaced");
    state.presence().replace_guild(
        guild_id,
        payload.voice_states.into_iter().map(Into::into).collect(),
    );
    StatusCode::NO_CONTENT
}

/// Forget every voice state of a guild.
#[utoipa::path(
    delete,
    path = "/feed/guilds/{guild_id}/voice-states",
    tag = "feed",
    params(("guild_id" = String, Path, description = "Guild to forget")),
    responses(
        (status = 204, description = "Guild forgotten"),
        (status = 404, description = "Guild unknown")
    )
)]
pub async fn forget_guild(
    State(state): State<SharedState>,
    Path(guild_id): Path<GuildId>,
) -> Result<StatusCode, AppError> {
    if state.presence().remove_guild(&guild_id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("guild {guild_id} has no voice states")))
    }
}

/// Replace the game data reported for a connect code.
#[utoipa::path(
    put,
    path = "/feed/games/{connect_code}",
    tag = "feed",
    params(("connect_code" = String, Path, description = "Connect code of the capture client")),
    request_body = GameSnapshot,
    responses((status = 204, description = "Game data replaced"))
)]
pub async fn replace_game(
    State(state): State<SharedState>,
    Path(connect_code): Path<String>,
    Valid(Json(payload)): Valid<Json<GameSnapshot>>,
) -> StatusCode {
    state.phase_feed().replace(connect_code, payload.into());
    StatusCode::NO_CONTENT
}

/// Forget the game data of a connect code.
#[utoipa::path(
    delete,
    path = "/feed/games/{connect_code}",
    tag = "feed",
    params(("connect_code" = String, Path, description = "Connect code of the capture client")),
    responses(
        (status = 204, description = "Game data forgotten"),
        (status = 404, description = "Connect code unknown")
    )
)]
pub async fn forget_game(
    State(state): State<SharedState>,
    Path(connect_code): Path<String>,
) -> Result<StatusCode, AppError> {
    if state.phase_feed().remove(&connect_code) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("no game data for {connect_code}")))
    }
}

/// Record a phase transition.
#[utoipa::path(
    post,
    path = "/feed/games/{connect_code}/phase",
    tag = "feed",
    params(("connect_code" = String, Path, description = "Connect code of the capture client")),
    request_body = PhaseUpdate,
    responses((status = 204, description = "Phase recorded"))
)]
pub async fn update_phase(
    State(state): State<SharedState>,
    Path(connect_code): Path<String>,
    Json(payload): Json<PhaseUpdate>,
) -> StatusCode {
    state.phase_feed().set_phase(connect_code, payload.phase);
    StatusCode::NO_CONTENT
}

/// Record a player joining or changing liveness.
#[utoipa::path(
    put,
    path = "/feed/games/{connect_code}/players/{name}",
    tag = "feed",
    params(
        ("connect_code" = String, Path, description = "Connect code of the capture client"),
        ("name" = String, Path, description = "In-game name")
    ),
    request_body = PlayerUpdate,
    responses((status = 204, description = "Player recorded"))
)]
pub async fn update_player(
    State(state): State<SharedState>,
    Path((connect_code, name)): Path<(String, String)>,
    Json(payload): Json<PlayerUpdate>,
) -> StatusCode {
    state
        .phase_feed()
        .set_player(connect_code, name, payload.is_alive);
    StatusCode::NO_CONTENT
}

/// Record a player leaving the game.
#[utoipa::path(
    delete,
    path = "/feed/games/{connect_code}/players/{name}",
    tag = "feed",
    params(
        ("connect_code" = String, Path, description = "Connect code of the capture client"),
        ("name" = String, Path, description = "In-game name")
    ),
    responses((status = 204, description = "Player removed"))
)]
pub async fn remove_player(
    State(state): State<SharedState>,
    Path((connect_code, name)): Path<(String, String)>,
) -> StatusCode {
    state.phase_feed().remove_player(&connect_code, &name);
    StatusCode::NO_CONTENT
}
