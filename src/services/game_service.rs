//! Game lifecycle operations. Each mutation runs under the game state lease.

use tracing::{info, warn};

use crate::{
    dao::{
        lease_store::LeaseStore,
        models::{GameStateRecord, PlayerEntry, UserId},
    },
    error::ServiceError,
    services::reconciler::{ReconcileError, ReconcileOutcome, SkipReason},
    state::{SharedState, game::GameStateRequest},
};

/// Read the record, apply `mutate`, and write the result back while holding the lease.
async fn mutate_under_lease<T, F>(
    store: &dyn LeaseStore,
    request: &GameStateRequest,
    mutate: F,
) -> Result<T, ServiceError>
where
    F: FnOnce(Option<GameStateRecord>) -> Result<(GameStateRecord, T), ServiceError>,
{
    let key = request.key();
    let lease = store
        .acquire(&key)
        .await?
        .ok_or(ServiceError::LeaseUnavailable)?;

    let result = async {
        let current = store.read(&key).await?;
        let (record, value) = mutate(current)?;
        store.write(&key, record, &lease).await?;
        Ok::<T, ServiceError>(value)
    }
    .await;

    if let Err(err) = store.release(&lease).await {
        warn!(key = %key, error = %err, "failed to release game state lease");
    }
    result
}

fn existing(
    request: &GameStateRequest,
    record: Option<GameStateRecord>,
) -> Result<GameStateRecord, ServiceError> {
    record.ok_or_else(|| {
        ServiceError::NotFound(format!("no game running in guild {}", request.guild_id))
    })
}

/// Create or restart the game of a guild, bound to `connect_code`.
pub async fn start_game(
    state: &SharedState,
    request: &GameStateRequest,
    connect_code: String,
) -> Result<GameStateRecord, ServiceError> {
    let tracking_channel_id = request.tracking_channel_id.clone().ok_or_else(|| {
        ServiceError::InvalidInput("a tracking channel is required to start a game".into())
    })?;

    let record = mutate_under_lease(state.store().as_ref(), request, |current| {
        match current {
            Some(current) if !current.accepts_connect_code(&connect_code) => {
                return Err(ServiceError::ConnectCodeImmutable {
                    current: current.connect_code,
                    requested: connect_code,
                });
            }
            _ => {}
        }
        let record = GameStateRecord::new(
            request.guild_id.clone(),
            connect_code,
            tracking_channel_id,
        );
        Ok((record.clone(), record))
    })
    .await?;

    info!(
        guild_id = %record.guild_id,
        connect_code = %record.connect_code,
        tracking_channel_id = %record.tracking_channel_id,
        "game started"
    );
    Ok(record)
}

/// Link `user_id` to an in-game name. The recorded voice target is left untouched.
pub async fn link_player(
    state: &SharedState,
    request: &GameStateRequest,
    user_id: UserId,
    in_game_name: String,
) -> Result<PlayerEntry, ServiceError> {
    let entry = mutate_under_lease(state.store().as_ref(), request, |current| {
        let mut record = existing(request, current)?;
        let entry = record.player_or_insert(&user_id);
        entry.in_game_name = Some(in_game_name);
        let entry = entry.clone();
        Ok((record, entry))
    })
    .await?;

    info!(
        guild_id = %request.guild_id,
        user_id = %entry.user_id,
        in_game_name = entry.in_game_name.as_deref().unwrap_or_default(),
        "player linked"
    );
    Ok(entry)
}

/// Forget `user_id` entirely.
pub async fn unlink_player(
    state: &SharedState,
    request: &GameStateRequest,
    user_id: &UserId,
) -> Result<PlayerEntry, ServiceError> {
    let entry = mutate_under_lease(state.store().as_ref(), request, |current| {
        let mut record = existing(request, current)?;
        let entry = record
            .clear_player(user_id)
            .ok_or_else(|| ServiceError::NotFound(format!("player {user_id} is not linked")))?;
        Ok((record, entry))
    })
    .await?;

    info!(guild_id = %request.guild_id, user_id = %user_id, "player unlinked");
    Ok(entry)
}

/// Pause or resume enforcement. Pausing releases everyone in the tracking channel.
pub async fn toggle_running(
    state: &SharedState,
    request: &GameStateRequest,
) -> Result<GameStateRecord, ServiceError> {
    let record = mutate_under_lease(state.store().as_ref(), request, |current| {
        let mut record = existing(request, current)?;
        record.running = !record.running;
        Ok((record.clone(), record))
    })
    .await?;

    info!(guild_id = %record.guild_id, running = record.running, "game running state toggled");

    if !record.running {
        match state.reconciler().apply_to_all(request, false, false).await {
            ReconcileOutcome::Failed(err) => {
                warn!(guild_id = %record.guild_id, error = %err, "failed to release players after pause");
            }
            ReconcileOutcome::Skipped(SkipReason::LeaseUnavailable) => {
                warn!(guild_id = %record.guild_id, "game state locked; players not released after pause");
            }
            _ => {}
        }
    }
    Ok(record)
}

/// Delete the game and unmute everyone who was tracked. Returns the number of users released.
pub async fn end_game(
    state: &SharedState,
    request: &GameStateRequest,
) -> Result<usize, ServiceError> {
    match state.reconciler().end_game(request).await {
        ReconcileOutcome::Applied { changes } => {
            info!(guild_id = %request.guild_id, released = changes.len(), "game ended");
            Ok(changes.len())
        }
        ReconcileOutcome::Skipped(SkipReason::LeaseUnavailable) => Err(ServiceError::LeaseUnavailable),
        ReconcileOutcome::Skipped(_) => {
            info!(guild_id = %request.guild_id, released = 0, "game ended");
            Ok(0)
        }
        ReconcileOutcome::Failed(ReconcileError::EnforcementDispatchFailed(reason)) => {
            warn!(guild_id = %request.guild_id, reason = %reason, "game ended but players were not released");
            Ok(0)
        }
        ReconcileOutcome::Failed(err) => Err(err.into()),
    }
}

/// Current record of a guild, read without taking the lease.
pub async fn game_state(
    state: &SharedState,
    request: &GameStateRequest,
) -> Result<GameStateRecord, ServiceError> {
    let record = state.store().read(&request.key()).await?;
    existing(request, record)
}
