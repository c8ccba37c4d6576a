use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use automute_sync::{
    dao::{
        lease_store::{InMemoryLeaseStore, Lease, LeaseStore},
        models::{GameStateRecord, GuildId},
        storage::{StorageError, StorageResult},
    },
    services::{
        billing::PremiumRegistry,
        enforcement::{Dispatcher, EnforcementError, Enforcer, UserModifyRequest},
        policy::{GuildVoicePolicy, VoicePolicy},
        reconciler::{ReconcileError, ReconcileOutcome, Reconciler, SkipReason},
    },
    state::{
        game::{ChangeRequest, GamePhase, GameStateRequest, HandlePriority},
        phase_feed::PhaseFeedCache,
        presence::PresenceCache,
    },
};
use futures::future::{self, BoxFuture};

const GUILD: &str = "141";
const CODE: &str = "ABCDEF";
const CHANNEL: &str = "voice-1";

/// In-memory store counting operations, able to simulate a foreign lease holder or a lapsed lease.
struct CountingStore {
    inner: InMemoryLeaseStore,
    reads: AtomicUsize,
    writes: AtomicUsize,
    held_elsewhere: AtomicBool,
    expire_writes: AtomicBool,
}

impl CountingStore {
    fn new() -> Self {
        Self {
            inner: InMemoryLeaseStore::new(Duration::from_secs(5)),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            held_elsewhere: AtomicBool::new(false),
            expire_writes: AtomicBool::new(false),
        }
    }
}

impl LeaseStore for CountingStore {
    fn acquire(&self, key: &str) -> BoxFuture<'static, StorageResult<Option<Lease>>> {
        if self.held_elsewhere.load(Ordering::SeqCst) {
            return Box::pin(future::ready(Ok(None)));
        }
        self.inner.acquire(key)
    }

    fn read(&self, key: &str) -> BoxFuture<'static, StorageResult<Option<GameStateRecord>>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let read = self.inner.read(key);
        // Yield while the lease is held so concurrent passes actually overlap.
        Box::pin(async move {
            tokio::task::yield_now().await;
            read.await
        })
    }

    fn write(
        &self,
        key: &str,
        record: GameStateRecord,
        lease: &Lease,
    ) -> BoxFuture<'static, StorageResult<()>> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.expire_writes.load(Ordering::SeqCst) {
            return Box::pin(future::ready(Err(StorageError::lease_expired(key))));
        }
        self.inner.write(key, record, lease)
    }

    fn delete(&self, key: &str, lease: &Lease) -> BoxFuture<'static, StorageResult<()>> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(key, lease)
    }

    fn release(&self, lease: &Lease) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.release(lease)
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.health_check()
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.try_reconnect()
    }
}

/// Enforcer recording accepted batches; rejects the next `failures_left` batches.
#[derive(Default)]
struct RecordingEnforcer {
    calls: Mutex<Vec<UserModifyRequest>>,
    failures_left: AtomicUsize,
}

impl RecordingEnforcer {
    fn calls(&self) -> Vec<UserModifyRequest> {
        self.calls.lock().unwrap().clone()
    }
}

impl Enforcer for RecordingEnforcer {
    fn modify_users(
        &self,
        _guild_id: &GuildId,
        _connect_code: &str,
        request: UserModifyRequest,
    ) -> BoxFuture<'static, Result<(), EnforcementError>> {
        let fail = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if fail {
            return Box::pin(future::ready(Err(EnforcementError::Unavailable(
                "down".into(),
            ))));
        }
        self.calls.lock().unwrap().push(request);
        Box::pin(future::ready(Ok(())))
    }
}

/// Policy answering `(false, true)` for every tracked user.
struct DeafenTracked;

impl VoicePolicy for DeafenTracked {
    fn voice_state(
        &self,
        _guild_id: &GuildId,
        _is_alive: bool,
        tracked: bool,
        _phase: GamePhase,
    ) -> (bool, bool) {
        (false, tracked)
    }
}

struct Harness {
    store: Arc<CountingStore>,
    presence: Arc<PresenceCache>,
    phase_feed: Arc<PhaseFeedCache>,
    enforcer: Arc<RecordingEnforcer>,
    reconciler: Reconciler,
}

impl Harness {
    fn new(policy: Arc<dyn VoicePolicy>) -> Self {
        let store = Arc::new(CountingStore::new());
        let presence = Arc::new(PresenceCache::new());
        let phase_feed = Arc::new(PhaseFeedCache::new());
        let enforcer = Arc::new(RecordingEnforcer::default());
        let reconciler = Reconciler::new(
            store.clone(),
            presence.clone(),
            phase_feed.clone(),
            policy,
            Dispatcher::new(enforcer.clone(), Arc::new(PremiumRegistry::new([GUILD.into()]))),
        );
        Self {
            store,
            presence,
            phase_feed,
            enforcer,
            reconciler,
        }
    }

    fn with_default_rules() -> Self {
        Self::new(Arc::new(GuildVoicePolicy::default()))
    }

    fn request() -> GameStateRequest {
        GameStateRequest::new(GUILD.into())
    }

    /// Seed a running game where each `(user, name)` is linked and sits in the tracking channel.
    async fn seed(&self, players: &[(&str, &str, bool)]) {
        let key = Self::request().key();
        let mut record = GameStateRecord::new(GUILD.into(), CODE, CHANNEL.into());
        for (user, name, is_alive) in players {
            record.player_or_insert(&(*user).into()).in_game_name = Some((*name).into());
            self.phase_feed.set_player(CODE, *name, *is_alive);
            self.presence
                .update_voice_state(GUILD.into(), (*user).into(), Some(CHANNEL.into()));
        }

        let lease = self.store.inner.acquire(&key).await.unwrap().unwrap();
        self.store.inner.write(&key, record, &lease).await.unwrap();
        self.store.inner.release(&lease).await.unwrap();
    }

    async fn record(&self) -> Option<GameStateRecord> {
        self.store.inner.read(&Self::request().key()).await.unwrap()
    }

    async fn reconcile(&self, priority: HandlePriority) -> ReconcileOutcome {
        self.reconciler
            .reconcile(&Self::request(), priority, Duration::ZERO)
            .await
    }
}

fn change(user: &str, mute: bool, deaf: bool) -> ChangeRequest {
    ChangeRequest {
        user_id: user.into(),
        mute,
        deaf,
    }
}

#[tokio::test]
async fn discussion_pass_applies_policy_verbatim_and_tags_premium() {
    let harness = Harness::new(Arc::new(DeafenTracked));
    harness
        .seed(&[("u1", "Red", true), ("u2", "Blue", false), ("u3", "Green", true)])
        .await;
    harness.phase_feed.set_phase(CODE, GamePhase::Discussion);

    let outcome = harness.reconcile(HandlePriority::NoPriority).await;

    let expected = vec![
        change("u1", false, true),
        change("u2", false, true),
        change("u3", false, true),
    ];
    assert_eq!(outcome.changes(), expected.as_slice());

    let calls = harness.enforcer.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].premium);
    assert_eq!(calls[0].users, expected);

    let record = harness.record().await.unwrap();
    assert_eq!(record.player(&"u2".into()).unwrap().target(), (false, true));
}

#[tokio::test]
async fn repeated_pass_with_unchanged_inputs_sends_nothing() {
    let harness = Harness::with_default_rules();
    harness
        .seed(&[("u1", "Red", true), ("u2", "Blue", false)])
        .await;
    harness.phase_feed.set_phase(CODE, GamePhase::Tasks);

    let first = harness.reconcile(HandlePriority::NoPriority).await;
    let second = harness.reconcile(HandlePriority::NoPriority).await;

    assert_eq!(first.changes(), [change("u1", true, true)]);
    assert!(matches!(second, ReconcileOutcome::Skipped(SkipReason::NoChanges)));
    assert_eq!(harness.enforcer.calls().len(), 1);
}

#[tokio::test]
async fn held_lease_skips_without_side_effects() {
    let harness = Harness::with_default_rules();
    harness.seed(&[("u1", "Red", true)]).await;
    harness.phase_feed.set_phase(CODE, GamePhase::Tasks);
    harness.store.held_elsewhere.store(true, Ordering::SeqCst);

    let outcome = harness.reconcile(HandlePriority::NoPriority).await;

    assert!(matches!(
        outcome,
        ReconcileOutcome::Skipped(SkipReason::LeaseUnavailable)
    ));
    assert_eq!(harness.store.reads.load(Ordering::SeqCst), 0);
    assert_eq!(harness.store.writes.load(Ordering::SeqCst), 0);
    assert!(harness.enforcer.calls().is_empty());
}

#[tokio::test]
async fn lease_held_by_another_caller_blocks_the_pass() {
    let harness = Harness::with_default_rules();
    harness.seed(&[("u1", "Red", true)]).await;
    harness.phase_feed.set_phase(CODE, GamePhase::Tasks);
    let key = Harness::request().key();
    let foreign = harness.store.inner.acquire(&key).await.unwrap().unwrap();

    let blocked = harness.reconcile(HandlePriority::NoPriority).await;
    harness.store.inner.release(&foreign).await.unwrap();
    let unblocked = harness.reconcile(HandlePriority::NoPriority).await;

    assert!(matches!(
        blocked,
        ReconcileOutcome::Skipped(SkipReason::LeaseUnavailable)
    ));
    assert_eq!(unblocked.changes(), [change("u1", true, true)]);
}

#[tokio::test]
async fn unlinked_users_are_left_alone() {
    let harness = Harness::with_default_rules();
    harness.seed(&[("u1", "Red", true)]).await;
    harness.phase_feed.set_phase(CODE, GamePhase::Tasks);
    harness
        .presence
        .update_voice_state(GUILD.into(), "bot".into(), Some(CHANNEL.into()));

    let outcome = harness.reconcile(HandlePriority::NoPriority).await;

    assert_eq!(outcome.changes(), [change("u1", true, true)]);
    let record = harness.record().await.unwrap();
    let bot = record.player(&"bot".into()).unwrap();
    assert_eq!(bot.in_game_name, None);
    assert_eq!(bot.target(), (false, false));
}

#[tokio::test]
async fn paused_game_is_skipped_and_not_written() {
    let harness = Harness::with_default_rules();
    harness.seed(&[("u1", "Red", true)]).await;
    harness.phase_feed.set_phase(CODE, GamePhase::Tasks);

    let key = Harness::request().key();
    let lease = harness.store.inner.acquire(&key).await.unwrap().unwrap();
    let mut record = harness.record().await.unwrap();
    record.running = false;
    harness.store.inner.write(&key, record, &lease).await.unwrap();
    harness.store.inner.release(&lease).await.unwrap();

    let outcome = harness.reconcile(HandlePriority::NoPriority).await;

    assert!(matches!(outcome, ReconcileOutcome::Skipped(SkipReason::NotRunning)));
    assert_eq!(harness.store.writes.load(Ordering::SeqCst), 0);
    assert!(harness.enforcer.calls().is_empty());
}

#[tokio::test]
async fn expired_lease_fails_closed_without_dispatch() {
    let harness = Harness::with_default_rules();
    harness.seed(&[("u1", "Red", true)]).await;
    harness.phase_feed.set_phase(CODE, GamePhase::Tasks);
    harness.store.expire_writes.store(true, Ordering::SeqCst);

    let outcome = harness.reconcile(HandlePriority::NoPriority).await;

    assert!(matches!(
        outcome,
        ReconcileOutcome::Failed(ReconcileError::LeaseExpired { .. })
    ));
    assert!(harness.enforcer.calls().is_empty());
    // The stored record keeps its previous bookkeeping.
    let record = harness.record().await.unwrap();
    assert_eq!(record.player(&"u1".into()).unwrap().target(), (false, false));
}

#[tokio::test]
async fn missing_game_and_missing_guild_are_reported() {
    let harness = Harness::with_default_rules();

    let outcome = harness.reconcile(HandlePriority::NoPriority).await;
    assert!(matches!(
        outcome,
        ReconcileOutcome::Failed(ReconcileError::GameNotFound(_))
    ));

    harness.seed(&[]).await;
    let outcome = harness.reconcile(HandlePriority::NoPriority).await;
    assert!(matches!(
        outcome,
        ReconcileOutcome::Failed(ReconcileError::GuildNotFound(_))
    ));
}

#[tokio::test]
async fn dead_priority_dispatches_dead_users_first() {
    let harness = Harness::new(Arc::new(DeafenTracked));
    harness
        .seed(&[("u1", "Red", true), ("u2", "Blue", false), ("u3", "Green", true)])
        .await;

    let outcome = harness.reconcile(HandlePriority::DeadPriority).await;

    let order = outcome
        .changes()
        .iter()
        .map(|change| change.user_id.as_str())
        .collect::<Vec<_>>();
    assert_eq!(order, ["u2", "u1", "u3"]);
}

#[tokio::test]
async fn single_override_updates_bookkeeping() {
    let harness = Harness::with_default_rules();
    harness.seed(&[("u1", "Red", true)]).await;

    let outcome = harness
        .reconciler
        .apply_to_single(&Harness::request(), "u9".into(), true, false)
        .await;

    assert_eq!(outcome.changes(), [change("u9", true, false)]);
    let record = harness.record().await.unwrap();
    assert_eq!(record.player(&"u9".into()).unwrap().target(), (true, false));
    assert_eq!(harness.enforcer.calls().len(), 1);
}

#[tokio::test]
async fn apply_to_all_covers_tracked_linked_users_only() {
    let harness = Harness::with_default_rules();
    harness
        .seed(&[("u1", "Red", true), ("u2", "Blue", false)])
        .await;
    harness
        .presence
        .update_voice_state(GUILD.into(), "u2".into(), Some("afk".into()));

    let outcome = harness
        .reconciler
        .apply_to_all(&Harness::request(), true, true)
        .await;

    assert_eq!(outcome.changes(), [change("u1", true, true)]);
}

#[tokio::test]
async fn ending_a_game_deletes_it_and_releases_tracked_users() {
    let harness = Harness::with_default_rules();
    harness
        .seed(&[("u1", "Red", true), ("u2", "Blue", false)])
        .await;
    harness.phase_feed.set_phase(CODE, GamePhase::Tasks);
    harness.reconcile(HandlePriority::NoPriority).await;

    let outcome = harness.reconciler.end_game(&Harness::request()).await;

    assert_eq!(
        outcome.changes(),
        [change("u1", false, false), change("u2", false, false)]
    );
    assert!(harness.record().await.is_none());
}

#[tokio::test]
async fn failed_dispatch_is_resent_by_the_next_pass() {
    let harness = Harness::with_default_rules();
    harness.seed(&[("u1", "Red", true)]).await;
    harness.phase_feed.set_phase(CODE, GamePhase::Tasks);
    harness.enforcer.failures_left.store(1, Ordering::SeqCst);

    let failed = harness.reconcile(HandlePriority::NoPriority).await;
    assert!(matches!(
        failed,
        ReconcileOutcome::Failed(ReconcileError::EnforcementDispatchFailed(_))
    ));
    let record = harness.record().await.unwrap();
    assert_eq!(record.player(&"u1".into()).unwrap().target(), (false, false));

    let retried = harness.reconcile(HandlePriority::NoPriority).await;
    assert_eq!(retried.changes(), [change("u1", true, true)]);

    let settled = harness.reconcile(HandlePriority::NoPriority).await;
    assert!(matches!(settled, ReconcileOutcome::Skipped(SkipReason::NoChanges)));
    assert_eq!(harness.enforcer.calls().len(), 1);
}

#[tokio::test]
async fn failed_single_override_is_rolled_back() {
    let harness = Harness::with_default_rules();
    harness.seed(&[("u1", "Red", true)]).await;
    harness.enforcer.failures_left.store(1, Ordering::SeqCst);

    let outcome = harness
        .reconciler
        .apply_to_single(&Harness::request(), "u1".into(), true, false)
        .await;

    assert!(matches!(outcome, ReconcileOutcome::Failed(_)));
    let record = harness.record().await.unwrap();
    assert_eq!(record.player(&"u1".into()).unwrap().target(), (false, false));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_acquires_never_overlap() {
    const KEY: &str = "game_state:141";
    let store = Arc::new(InMemoryLeaseStore::new(Duration::from_secs(5)));
    let holders = Arc::new(AtomicUsize::new(0));
    let most_holders = Arc::new(AtomicUsize::new(0));

    let tasks = (0..32)
        .map(|_| {
            let store = store.clone();
            let holders = holders.clone();
            let most_holders = most_holders.clone();
            tokio::spawn(async move {
                let mut won = 0;
                for _ in 0..100 {
                    let Some(lease) = store.acquire(KEY).await.unwrap() else {
                        tokio::task::yield_now().await;
                        continue;
                    };
                    let now = holders.fetch_add(1, Ordering::SeqCst) + 1;
                    most_holders.fetch_max(now, Ordering::SeqCst);
                    tokio::task::yield_now().await;
                    holders.fetch_sub(1, Ordering::SeqCst);
                    store.release(&lease).await.unwrap();
                    won += 1;
                }
                won
            })
        })
        .collect::<Vec<_>>();

    let mut won = 0;
    for task in tasks {
        won += task.await.unwrap();
    }

    assert!(won > 0);
    assert_eq!(most_holders.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_passes_dispatch_once() {
    let harness = Harness::with_default_rules();
    harness
        .seed(&[("u1", "Red", true), ("u2", "Blue", false)])
        .await;
    harness.phase_feed.set_phase(CODE, GamePhase::Tasks);

    let passes = (0..16)
        .map(|_| {
            let reconciler = harness.reconciler.clone();
            tokio::spawn(async move {
                reconciler
                    .reconcile(&Harness::request(), HandlePriority::NoPriority, Duration::ZERO)
                    .await
            })
        })
        .collect::<Vec<_>>();

    let mut applied = 0;
    let mut locked_out = 0;
    for pass in passes {
        match pass.await.unwrap() {
            ReconcileOutcome::Applied { changes } => {
                assert_eq!(changes, [change("u1", true, true)]);
                applied += 1;
            }
            ReconcileOutcome::Skipped(SkipReason::LeaseUnavailable) => locked_out += 1,
            ReconcileOutcome::Skipped(SkipReason::NoChanges) => {}
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    assert_eq!(applied, 1);
    assert_eq!(harness.enforcer.calls().len(), 1);
    // Only passes that held the lease touched the store.
    let winners = 16 - locked_out;
    assert_eq!(harness.store.reads.load(Ordering::SeqCst), winners);
    assert_eq!(harness.store.writes.load(Ordering::SeqCst), winners);
}
