use axum::{
    Json, Router,
    extract::{Path, State},
    routing::post,
};
use axum_valid::Valid;

use crate::{
    dao::models::GuildId,
    dto::reconcile::{OverrideRequest, ReconcileResponse, TriggerRequest},
    error::AppError,
    services::reconcile_service,
    state::SharedState,
};

/// Routes driving reconciliation of a guild's game.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/guilds/{guild_id}/reconcile", post(trigger))
        .route("/guilds/{guild_id}/overrides", post(apply_override))
}

/// Bring every tracked user to the voice state the guild rules prescribe.
#[utoipa::path(
    post,
    path = "/guilds/{guild_id}/reconcile",
    tag = "reconcile",
    params(("guild_id" = String, Path, description = "Guild owning the game")),
    request_body = TriggerRequest,
    responses(
        (status = 200, description = "Pass applied or skipped", body = ReconcileResponse),
        (status = 400, description = "Invalid trigger payload"),
        (status = 404, description = "No game or no voice presence for the guild"),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn trigger(
    State(state): State<SharedState>,
    Path(guild_id): Path<GuildId>,
    Valid(Json(payload)): Valid<Json<TriggerRequest>>,
) -> Result<Json<ReconcileResponse>, AppError> {
    let response = reconcile_service::trigger(&state, guild_id, payload).await?;
    Ok(Json(response))
}

/// Force a voice state regardless of the guild rules.
#[utoipa::path(
    post,
    path = "/guilds/{guild_id}/overrides",
    tag = "reconcile",
    params(("guild_id" = String, Path, description = "Guild owning the game")),
    request_body = OverrideRequest,
    responses(
        (status = 200, description = "Override applied or skipped", body = ReconcileResponse),
        (status = 404, description = "No game for the guild")
    )
)]
pub async fn apply_override(
    State(state): State<SharedState>,
    Path(guild_id): Path<GuildId>,
    Valid(Json(payload)): Valid<Json<OverrideRequest>>,
) -> Result<Json<ReconcileResponse>, AppError> {
    let response = reconcile_service::apply_override(&state, guild_id, payload).await?;
    Ok(Json(response))
}
