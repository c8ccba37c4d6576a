pub mod game;
pub mod phase_feed;
pub mod presence;

use std::sync::Arc;

use tokio::sync::watch;

use crate::{
    config::AppConfig,
    dao::lease_store::LeaseStore,
    services::{
        billing::PremiumRegistry,
        enforcement::{Dispatcher, Enforcer},
        policy::GuildVoicePolicy,
        reconciler::Reconciler,
    },
};

use self::{phase_feed::PhaseFeedCache, presence::PresenceCache};

/// Shared handle passed to handlers and background tasks.
pub type SharedState = Arc<AppState>;

/// Central application state: the lease store, the ingest caches and the reconciliation engine.
pub struct AppState {
    config: AppConfig,
    store: Arc<dyn LeaseStore>,
    presence: Arc<PresenceCache>,
    phase_feed: Arc<PhaseFeedCache>,
    policy: Arc<GuildVoicePolicy>,
    premium: Arc<PremiumRegistry>,
    reconciler: Reconciler,
    degraded: watch::Sender<bool>,
}

impl AppState {
    /// Wire the caches, policy and engine around `store` and `enforcer`.
    ///
    /// The application starts healthy; the storage supervisor flips the degraded flag.
    pub fn new(
        config: AppConfig,
        store: Arc<dyn LeaseStore>,
        enforcer: Arc<dyn Enforcer>,
    ) -> SharedState {
        let presence = Arc::new(PresenceCache::new());
        let phase_feed = Arc::new(PhaseFeedCache::new());
        let policy = Arc::new(GuildVoicePolicy::new(
            config.voice_rules,
            config.guild_voice_rules.clone(),
        ));
        let premium = Arc::new(PremiumRegistry::new(config.premium_guilds.iter().cloned()));
        let reconciler = Reconciler::new(
            store.clone(),
            presence.clone(),
            phase_feed.clone(),
            policy.clone(),
            Dispatcher::new(enforcer, premium.clone()),
        );
        let (degraded_tx, _rx) = watch::channel(false);

        Arc::new(Self {
            config,
            store,
            presence,
            phase_feed,
            policy,
            premium,
            reconciler,
            degraded: degraded_tx,
        })
    }

    /// Loaded configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Lease store holding every game state record.
    pub fn store(&self) -> &Arc<dyn LeaseStore> {
        &self.store
    }

    /// Voice presence cache fed by the gateway listener.
    pub fn presence(&self) -> &PresenceCache {
        &self.presence
    }

    /// Game phase cache fed by the capture ingester.
    pub fn phase_feed(&self) -> &PhaseFeedCache {
        &self.phase_feed
    }

    /// Voice rules with per-guild overrides.
    pub fn policy(&self) -> &GuildVoicePolicy {
        &self.policy
    }

    /// Premium guild registry.
    pub fn premium(&self) -> &PremiumRegistry {
        &self.premium
    }

    /// Reconciliation engine.
    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }
}
