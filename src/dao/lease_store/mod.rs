pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use std::time::{Duration, SystemTime};

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::{
    models::{GameStateRecord, GuildId},
    storage::StorageResult,
};

pub use memory::InMemoryLeaseStore;

/// Store key holding the game state of `guild_id`.
pub fn state_key(guild_id: &GuildId) -> String {
    format!("game_state:{guild_id}")
}

/// Time-bounded exclusive ownership of one store key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    key: String,
    token: Uuid,
    granted_at: SystemTime,
    ttl: Duration,
}

impl Lease {
    /// Mint a fresh lease over `key` starting now.
    pub fn grant(key: impl Into<String>, ttl: Duration) -> Self {
        Self {
            key: key.into(),
            token: Uuid::new_v4(),
            granted_at: SystemTime::now(),
            ttl,
        }
    }

    /// Leased key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Opaque token identifying this holder.
    pub fn token(&self) -> Uuid {
        self.token
    }

    /// Point in time after which the lease no longer protects writes.
    pub fn expires_at(&self) -> SystemTime {
        self.granted_at + self.ttl
    }

    /// Whether the TTL has lapsed.
    pub fn is_expired(&self) -> bool {
        SystemTime::now() >= self.expires_at()
    }
}

/// Key-value store with per-key, non-blocking mutual exclusion.
///
/// `acquire` never waits: `Ok(None)` means another holder is active and the caller should skip
/// the cycle. Writes and deletes are only accepted while the presented lease is still held and
/// fail with [`StorageError::LeaseExpired`](crate::dao::storage::StorageError::LeaseExpired)
/// otherwise.
pub trait LeaseStore: Send + Sync {
    /// Try to take the lease on `key`; `None` when another holder is active.
    fn acquire(&self, key: &str) -> BoxFuture<'static, StorageResult<Option<Lease>>>;
    /// Current record under `key`, without locking.
    fn read(&self, key: &str) -> BoxFuture<'static, StorageResult<Option<GameStateRecord>>>;
    /// Store `record` under `key` while `lease` is still held.
    fn write(
        &self,
        key: &str,
        record: GameStateRecord,
        lease: &Lease,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Remove the record under `key`; same lease rules as [`LeaseStore::write`].
    fn delete(&self, key: &str, lease: &Lease) -> BoxFuture<'static, StorageResult<()>>;
    /// Give the lease back. Idempotent, and a no-op once another holder took over.
    fn release(&self, lease: &Lease) -> BoxFuture<'static, StorageResult<()>>;
    /// Cheap liveness check of the backend.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Rebuild the backend connection after a failed health check.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
