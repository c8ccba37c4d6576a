use std::time::Duration;

use tracing::debug;

use crate::{
    dao::models::{ChannelId, GuildId, UserId},
    dto::reconcile::{OverrideRequest, ReconcileResponse, TriggerRequest},
    error::ServiceError,
    state::{SharedState, game::GameStateRequest},
};

fn game_request(guild_id: GuildId, tracking_channel_id: Option<String>) -> GameStateRequest {
    let request = GameStateRequest::new(guild_id);
    match tracking_channel_id {
        Some(channel_id) => request.with_tracking_channel(ChannelId::from(channel_id)),
        None => request,
    }
}

/// Run one reconciliation pass for the game of `guild_id`.
pub async fn trigger(
    state: &SharedState,
    guild_id: GuildId,
    payload: TriggerRequest,
) -> Result<ReconcileResponse, ServiceError> {
    let request = game_request(guild_id, payload.tracking_channel_id);
    debug!(
        guild_id = %request.guild_id,
        priority = ?payload.priority,
        delay_seconds = payload.delay_seconds,
        "reconciliation triggered"
    );

    let outcome = state
        .reconciler()
        .reconcile(
            &request,
            payload.priority,
            Duration::from_secs(payload.delay_seconds),
        )
        .await;
    Ok(ReconcileResponse::from_outcome(outcome)?)
}

/// Force a voice state on one user, or on everyone tracked when no user is named.
pub async fn apply_override(
    state: &SharedState,
    guild_id: GuildId,
    payload: OverrideRequest,
) -> Result<ReconcileResponse, ServiceError> {
    let request = GameStateRequest::new(guild_id);
    let reconciler = state.reconciler();

    let outcome = match payload.user_id {
        Some(user_id) => {
            reconciler
                .apply_to_single(&request, UserId::from(user_id), payload.mute, payload.deaf)
                .await
        }
        None => {
            reconciler
                .apply_to_all(&request, payload.mute, payload.deaf)
                .await
        }
    };
    Ok(ReconcileResponse::from_outcome(outcome)?)
}
