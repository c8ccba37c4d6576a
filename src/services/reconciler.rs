//! Lease-guarded reconciliation of mute/deafen targets for one game.
//!
//! Every pass follows the same shape: acquire the game's lease (or skip the cycle), read the
//! record, derive the change list, persist the record, release the lease, and only then wait
//! for the settle delay and hand the changes to the [`Dispatcher`].

use std::{collections::HashMap, sync::Arc, time::Duration};

use thiserror::Error;
use tracing::{debug, error, trace, warn};

use crate::{
    dao::{
        lease_store::{Lease, LeaseStore},
        models::{GameStateRecord, GuildId, UserId},
        storage::StorageError,
    },
    services::{
        enforcement::{DispatchOutcome, Dispatcher},
        policy::VoicePolicy,
    },
    state::{
        game::{AmongUsData, ChangeRequest, ChangeSet, GameStateRequest, HandlePriority, Linkage},
        phase_feed::GamePhaseFeed,
        presence::{Occupant, PresenceError, VoicePresence},
    },
};

/// Reasons a reconciliation pass could not complete.
#[derive(Debug, Error)]
///
/// A lease held by someone else is not an error: it ends the pass as
/// [`SkipReason::LeaseUnavailable`].
pub enum ReconcileError {
    /// The lease lapsed before the record was written; the write was discarded.
    #[error("lease on `{key}` expired before the game state was written")]
    LeaseExpired {
        /// Store key of the game state.
        key: String,
    },
    /// No record exists for the guild.
    #[error("no game state recorded for guild `{0}`")]
    GameNotFound(GuildId),
    /// The presence cache does not know the guild.
    #[error("guild `{0}` is not in the voice presence cache")]
    GuildNotFound(GuildId),
    /// The presence cache could not be read.
    #[error("voice presence unavailable: {0}")]
    PresenceUnavailable(String),
    /// Store failure other than an expired lease.
    #[error("game state storage failed")]
    Storage(#[source] StorageError),
    /// The enforcer rejected the batch; recorded targets were rolled back when possible.
    #[error("enforcement dispatch failed: {0}")]
    EnforcementDispatchFailed(String),
}

impl From<StorageError> for ReconcileError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::LeaseExpired { key } => ReconcileError::LeaseExpired { key },
            other => ReconcileError::Storage(other),
        }
    }
}

impl From<PresenceError> for ReconcileError {
    fn from(err: PresenceError) -> Self {
        match err {
            PresenceError::GuildNotFound(guild_id) => ReconcileError::GuildNotFound(guild_id),
            PresenceError::Unavailable(message) => ReconcileError::PresenceUnavailable(message),
        }
    }
}

/// Why a pass ended without dispatching anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another caller holds the lease; the next trigger retries.
    LeaseUnavailable,
    /// The game is paused.
    NotRunning,
    /// Every tracked user is already in the target state.
    NoChanges,
}

/// Closed set of results of one pass.
#[derive(Debug)]
pub enum ReconcileOutcome {
    /// Changes were accepted by the enforcer, in dispatch order.
    Applied { changes: Vec<ChangeRequest> },
    Skipped(SkipReason),
    Failed(ReconcileError),
}

impl ReconcileOutcome {
    /// Changes that were dispatched, empty unless [`ReconcileOutcome::Applied`].
    pub fn changes(&self) -> &[ChangeRequest] {
        match self {
            ReconcileOutcome::Applied { changes } => changes,
            _ => &[],
        }
    }
}

enum Pass {
    Reconcile(HandlePriority),
    ForceAll { mute: bool, deaf: bool },
    ForceSingle { user_id: UserId, mute: bool, deaf: bool },
    EndGame,
}

enum Cycle {
    Skip(SkipReason),
    Dispatch {
        guild_id: GuildId,
        connect_code: String,
        changes: Vec<ChangeRequest>,
        /// Targets recorded before this pass, aligned with `changes`. Empty once the record is gone.
        previous: Vec<(bool, bool)>,
    },
}

/// Reconciliation engine with its collaborators injected.
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn LeaseStore>,
    presence: Arc<dyn VoicePresence>,
    phase_feed: Arc<dyn GamePhaseFeed>,
    policy: Arc<dyn VoicePolicy>,
    dispatcher: Dispatcher,
}

impl Reconciler {
    /// Wire the engine to its store, read models, policy and dispatcher.
    pub fn new(
        store: Arc<dyn LeaseStore>,
        presence: Arc<dyn VoicePresence>,
        phase_feed: Arc<dyn GamePhaseFeed>,
        policy: Arc<dyn VoicePolicy>,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            store,
            presence,
            phase_feed,
            policy,
            dispatcher,
        }
    }

    /// Lease store backing the game state.
    pub fn store(&self) -> &Arc<dyn LeaseStore> {
        &self.store
    }

    /// Bring every tracked user to the target computed by the guild's voice policy.
    pub async fn reconcile(
        &self,
        request: &GameStateRequest,
        priority: HandlePriority,
        delay: Duration,
    ) -> ReconcileOutcome {
        self.run(request, Pass::Reconcile(priority), delay).await
    }

    /// Force `(mute, deaf)` on every tracked user, bypassing the voice policy.
    pub async fn apply_to_all(
        &self,
        request: &GameStateRequest,
        mute: bool,
        deaf: bool,
    ) -> ReconcileOutcome {
        self.run(request, Pass::ForceAll { mute, deaf }, Duration::ZERO)
            .await
    }

    /// Force `(mute, deaf)` on a single user, bypassing the voice policy.
    pub async fn apply_to_single(
        &self,
        request: &GameStateRequest,
        user_id: UserId,
        mute: bool,
        deaf: bool,
    ) -> ReconcileOutcome {
        let pass = Pass::ForceSingle {
            user_id,
            mute,
            deaf,
        };
        self.run(request, pass, Duration::ZERO).await
    }

    /// Delete the game state and release everyone who was tracked.
    pub async fn end_game(&self, request: &GameStateRequest) -> ReconcileOutcome {
        self.run(request, Pass::EndGame, Duration::ZERO).await
    }

    async fn run(&self, request: &GameStateRequest, pass: Pass, delay: Duration) -> ReconcileOutcome {
        let cycle = match self.locked_cycle(request, pass).await {
            Ok(cycle) => cycle,
            Err(err) => {
                log_failure(&request.guild_id, &err);
                return ReconcileOutcome::Failed(err);
            }
        };

        let (guild_id, connect_code, changes, previous) = match cycle {
            Cycle::Skip(reason) => {
                debug!(guild_id = %request.guild_id, ?reason, "reconciliation skipped");
                return ReconcileOutcome::Skipped(reason);
            }
            Cycle::Dispatch {
                guild_id,
                connect_code,
                changes,
                previous,
            } => (guild_id, connect_code, changes, previous),
        };

        // The lease is released at this point; the delay and the network call run unlocked.
        match self
            .dispatcher
            .dispatch(&guild_id, &connect_code, changes.clone(), delay)
            .await
        {
            DispatchOutcome::Applied { .. } => ReconcileOutcome::Applied { changes },
            DispatchOutcome::Skipped => ReconcileOutcome::Skipped(SkipReason::NoChanges),
            DispatchOutcome::Failed(reason) => {
                if !previous.is_empty() {
                    self.restore_targets(request, &changes, &previous).await;
                }
                ReconcileOutcome::Failed(ReconcileError::EnforcementDispatchFailed(reason))
            }
        }
    }

    /// Undo the bookkeeping of a batch the enforcer never applied, so the next pass sees the
    /// mismatch again and re-sends it.
    async fn restore_targets(
        &self,
        request: &GameStateRequest,
        dispatched: &[ChangeRequest],
        previous: &[(bool, bool)],
    ) {
        let key = request.key();
        let lease = match self.store.acquire(&key).await {
            Ok(Some(lease)) => lease,
            Ok(None) => {
                warn!(key = %key, "game state lease busy; unapplied targets stay recorded");
                return;
            }
            Err(err) => {
                warn!(key = %key, error = %err, "could not lock game state to restore targets");
                return;
            }
        };

        let result = self
            .rewind_under_lease(&key, &lease, dispatched, previous)
            .await;

        if let Err(err) = self.store.release(&lease).await {
            warn!(key = %key, error = %err, "failed to release game state lease; it will lapse on its own");
        }
        match result {
            Ok(restored) => debug!(key = %key, restored, "restored targets after failed dispatch"),
            Err(err) => warn!(key = %key, error = %err, "failed to restore targets after failed dispatch"),
        }
    }

    async fn rewind_under_lease(
        &self,
        key: &str,
        lease: &Lease,
        dispatched: &[ChangeRequest],
        previous: &[(bool, bool)],
    ) -> Result<usize, ReconcileError> {
        let Some(mut record) = self.store.read(key).await? else {
            return Ok(0);
        };
        let restored = rewind_targets(&mut record, dispatched, previous);
        if restored > 0 {
            self.store.write(key, record, lease).await?;
        }
        Ok(restored)
    }

    async fn locked_cycle(
        &self,
        request: &GameStateRequest,
        pass: Pass,
    ) -> Result<Cycle, ReconcileError> {
        let key = request.key();
        let Some(lease) = self.store.acquire(&key).await? else {
            return Ok(Cycle::Skip(SkipReason::LeaseUnavailable));
        };

        let result = self.mutate_under_lease(&key, &lease, request, pass).await;

        if let Err(err) = self.store.release(&lease).await {
            warn!(key = %key, error = %err, "failed to release game state lease; it will lapse on its own");
        }
        result
    }

    async fn mutate_under_lease(
        &self,
        key: &str,
        lease: &Lease,
        request: &GameStateRequest,
        pass: Pass,
    ) -> Result<Cycle, ReconcileError> {
        let mut record = self
            .store
            .read(key)
            .await?
            .ok_or_else(|| ReconcileError::GameNotFound(request.guild_id.clone()))?;

        let ends_game = matches!(pass, Pass::EndGame);
        let recorded: HashMap<UserId, (bool, bool)> = record
            .player_table
            .iter()
            .map(|(user_id, entry)| (user_id.clone(), entry.target()))
            .collect();

        let changes = match pass {
            Pass::Reconcile(priority) => {
                if !record.running {
                    return Ok(Cycle::Skip(SkipReason::NotRunning));
                }
                let (occupants, data) = self.observe(&record).await?;
                compute_changes(
                    &mut record,
                    &occupants,
                    &data,
                    self.policy.as_ref(),
                    priority,
                )
                .into_vec()
            }
            Pass::ForceAll { mute, deaf } => {
                let (occupants, data) = self.observe(&record).await?;
                force_tracked(&mut record, &occupants, &data, mute, deaf)
            }
            Pass::ForceSingle {
                user_id,
                mute,
                deaf,
            } => vec![force_single(&mut record, user_id, mute, deaf)],
            Pass::EndGame => match self.observe(&record).await {
                Ok((occupants, data)) => force_tracked(&mut record, &occupants, &data, false, false),
                Err(err) => {
                    warn!(guild_id = %record.guild_id, error = %err, "ending game without releasing tracked users");
                    Vec::new()
                }
            },
        };

        if ends_game {
            self.store.delete(key, lease).await?;
        } else {
            self.store.write(key, record.clone(), lease).await?;
        }

        if changes.is_empty() {
            return Ok(Cycle::Skip(SkipReason::NoChanges));
        }

        let previous = if ends_game {
            Vec::new()
        } else {
            changes
                .iter()
                .map(|change| recorded.get(&change.user_id).copied().unwrap_or_default())
                .collect()
        };

        Ok(Cycle::Dispatch {
            guild_id: record.guild_id,
            connect_code: record.connect_code,
            changes,
            previous,
        })
    }

    async fn observe(
        &self,
        record: &GameStateRecord,
    ) -> Result<(Vec<Occupant>, AmongUsData), ReconcileError> {
        let occupants = self.presence.list_occupants(&record.guild_id).await?;
        let data = self
            .phase_feed
            .phase_data(&record.connect_code)
            .await
            .unwrap_or_default();
        Ok((occupants, data))
    }
}

/// Diff policy targets against the recorded state of every occupant.
///
/// Unseen occupants get a fresh unlinked entry. Spectators count as tracked when the policy is
/// asked, but only users linked to a player present in the feed ever produce a change, so bots,
/// spectators and unlinked members are left alone.
pub fn compute_changes(
    record: &mut GameStateRecord,
    occupants: &[Occupant],
    data: &AmongUsData,
    policy: &dyn VoicePolicy,
    priority: HandlePriority,
) -> ChangeSet {
    let guild_id = record.guild_id.clone();
    let tracking_channel = record.tracking_channel_id.clone();
    let mut changes = ChangeSet::new(priority);

    for occupant in occupants {
        let in_tracking_channel = occupant.channel_id.as_ref() == Some(&tracking_channel);
        let entry = record.player_or_insert(&occupant.user_id);
        let linkage = Linkage::resolve(entry.in_game_name.as_deref(), data);
        let tracked = in_tracking_channel && linkage.is_tracked();
        let (mute, deaf) = policy.voice_state(&guild_id, linkage.is_alive(), tracked, data.phase);

        if !linkage.is_linked() {
            continue;
        }
        if !entry.set_target(mute, deaf) {
            trace!(user_id = %entry.user_id, mute, deaf, "user already in target voice state");
            continue;
        }

        changes.push(
            ChangeRequest {
                user_id: entry.user_id.clone(),
                mute,
                deaf,
            },
            linkage.is_alive(),
        );
    }

    changes
}

/// Set `(mute, deaf)` on every linked occupant of the tracking channel.
pub fn force_tracked(
    record: &mut GameStateRecord,
    occupants: &[Occupant],
    data: &AmongUsData,
    mute: bool,
    deaf: bool,
) -> Vec<ChangeRequest> {
    let tracking_channel = record.tracking_channel_id.clone();
    let mut changes = Vec::new();

    for occupant in occupants {
        if occupant.channel_id.as_ref() != Some(&tracking_channel) {
            continue;
        }
        let Some(entry) = record.player_table.get_mut(&occupant.user_id) else {
            continue;
        };
        if !Linkage::resolve(entry.in_game_name.as_deref(), data).is_linked() {
            continue;
        }
        entry.set_target(mute, deaf);
        debug!(user_id = %entry.user_id, mute, deaf, "forcibly applying voice state");
        changes.push(ChangeRequest {
            user_id: entry.user_id.clone(),
            mute,
            deaf,
        });
    }

    changes
}

/// Put `previous` back on every dispatched entry still holding the dispatched target.
///
/// Entries changed since the failed batch are left alone. Returns how many were restored.
fn rewind_targets(
    record: &mut GameStateRecord,
    dispatched: &[ChangeRequest],
    previous: &[(bool, bool)],
) -> usize {
    let mut restored = 0;
    for (change, &(mute, deaf)) in dispatched.iter().zip(previous) {
        let Some(entry) = record.player_table.get_mut(&change.user_id) else {
            continue;
        };
        if entry.target() == (change.mute, change.deaf) && entry.set_target(mute, deaf) {
            restored += 1;
        }
    }
    restored
}

fn force_single(
    record: &mut GameStateRecord,
    user_id: UserId,
    mute: bool,
    deaf: bool,
) -> ChangeRequest {
    record.player_or_insert(&user_id).set_target(mute, deaf);
    debug!(user_id = %user_id, mute, deaf, "forcibly applying voice state");
    ChangeRequest {
        user_id,
        mute,
        deaf,
    }
}

fn log_failure(guild_id: &GuildId, err: &ReconcileError) {
    match err {
        ReconcileError::LeaseExpired { .. }
        | ReconcileError::GameNotFound(_)
        | ReconcileError::GuildNotFound(_)
        | ReconcileError::PresenceUnavailable(_) => {
            warn!(guild_id = %guild_id, error = %err, "reconciliation aborted")
        }
        ReconcileError::Storage(source) => {
            error!(guild_id = %guild_id, error = %source, "reconciliation aborted by storage failure")
        }
        ReconcileError::EnforcementDispatchFailed(_) => {
            error!(guild_id = %guild_id, error = %err, "reconciliation dispatch failed")
        }
    }
}
