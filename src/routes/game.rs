use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{post, put},
};
use axum_valid::Valid;

use crate::{
    dao::models::{ChannelId, GuildId, UserId},
    dto::game::{EndGameResponse, GameSummary, LinkPlayerRequest, PlayerSummary, StartGameRequest},
    error::AppError,
    services::game_service,
    state::{SharedState, game::GameStateRequest},
};

/// Routes managing the lifecycle of a guild's game.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route(
            "/guilds/{guild_id}/game",
            post(start_game).get(get_game).delete(end_game),
        )
        .route("/guilds/{guild_id}/game/pause", post(toggle_pause))
        .route(
            "/guilds/{guild_id}/game/players/{user_id}",
            put(link_player).delete(unlink_player),
        )
}

/// Start a game bound to a connect code and a tracking channel.
#[utoipa::path(
    post,
    path = "/guilds/{guild_id}/game",
    tag = "game",
    params(("guild_id" = String, Path, description = "Guild hosting the game")),
    request_body = StartGameRequest,
    responses(
        (status = 200, description = "Game started", body = GameSummary),
        (status = 409, description = "Game locked or bound to another connect code")
    )
)]
pub async fn start_game(
    State(state): State<SharedState>,
    Path(guild_id): Path<GuildId>,
    Valid(Json(payload)): Valid<Json<StartGameRequest>>,
) -> Result<Json<GameSummary>, AppError> {
    let request = GameStateRequest::new(guild_id)
        .with_tracking_channel(ChannelId::from(payload.tracking_channel_id));
    let record = game_service::start_game(&state, &request, payload.connect_code).await?;
    Ok(Json(record.into()))
}

/// Fetch the current game of a guild.
#[utoipa::path(
    get,
    path = "/guilds/{guild_id}/game",
    tag = "game",
    params(("guild_id" = String, Path, description = "Guild hosting the game")),
    responses(
        (status = 200, description = "Current game", body = GameSummary),
        (status = 404, description = "No game running")
    )
)]
pub async fn get_game(
    State(state): State<SharedState>,
    Path(guild_id): Path<GuildId>,
) -> Result<Json<GameSummary>, AppError> {
    let record = game_service::game_state(&state, &GameStateRequest::new(guild_id)).await?;
    Ok(Json(record.into()))
}

/// End the game and release every tracked user.
#[utoipa::path(
    delete,
    path = "/guilds/{guild_id}/game",
    tag = "game",
    params(("guild_id" = String, Path, description = "Guild hosting the game")),
    responses(
        (status = 200, description = "Game ended", body = EndGameResponse),
        (status = 404, description = "No game running")
    )
)]
pub async fn end_game(
    State(state): State<SharedState>,
    Path(guild_id): Path<GuildId>,
) -> Result<Json<EndGameResponse>, AppError> {
    let released = game_service::end_game(&state, &GameStateRequest::new(guild_id)).await?;
    Ok(Json(EndGameResponse { released }))
}

/// Pause or resume enforcement.
#[utoipa::path(
    post,
    path = "/guilds/{guild_id}/game/pause",
    tag = "game",
    params(("guild_id" = String, Path, description = "Guild hosting the game")),
    responses(
        (status = 200, description = "Running flag toggled", body = GameSummary),
        (status = 404, description = "No game running")
    )
)]
pub async fn toggle_pause(
    State(state): State<SharedState>,
    Path(guild_id): Path<GuildId>,
) -> Result<Json<GameSummary>, AppError> {
    let record = game_service::toggle_running(&state, &GameStateRequest::new(guild_id)).await?;
    Ok(Json(record.into()))
}

/// Link a user to an in-game name.
#[utoipa::path(
    put,
    path = "/guilds/{guild_id}/game/players/{user_id}",
    tag = "game",
    params(
        ("guild_id" = String, Path, description = "Guild hosting the game"),
        ("user_id" = String, Path, description = "Platform user to link")
    ),
    request_body = LinkPlayerRequest,
    responses(
        (status = 200, description = "Player linked", body = PlayerSummary),
        (status = 404, description = "No game running")
    )
)]
pub async fn link_player(
    State(state): State<SharedState>,
    Path((guild_id, user_id)): Path<(GuildId, UserId)>,
    Valid(Json(payload)): Valid<Json<LinkPlayerRequest>>,
) -> Result<Json<PlayerSummary>, AppError> {
    let entry = game_service::link_player(
        &state,
        &GameStateRequest::new(guild_id),
        user_id,
        payload.in_game_name,
    )
    .await?;
    Ok(Json(entry.into()))
}

/// Remove the linkage and bookkeeping of a user.
#[utoipa::path(
    delete,
    path = "/guilds/{guild_id}/game/players/{user_id}",
    tag = "game",
    params(
        ("guild_id" = String, Path, description = "Guild hosting the game"),
        ("user_id" = String, Path, description = "Platform user to unlink")
    ),
    responses(
        (status = 204, description = "Player unlinked"),
        (status = 404, description = "No game running or player not linked")
    )
)]
pub async fn unlink_player(
    State(state): State<SharedState>,
    Path((guild_id, user_id)): Path<(GuildId, UserId)>,
) -> Result<StatusCode, AppError> {
    game_service::unlink_player(&state, &GameStateRequest::new(guild_id), &user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
