//! Process-local lease store used for single-instance deployments and tests.

use std::{sync::Arc, time::Duration};

use dashmap::{DashMap, mapref::entry::Entry};
use futures::future::{self, BoxFuture};
use uuid::Uuid;

use crate::dao::{
    lease_store::{Lease, LeaseStore},
    models::GameStateRecord,
    storage::{StorageError, StorageResult},
};

#[derive(Clone)]
pub struct InMemoryLeaseStore {
    inner: Arc<Inner>,
}

struct Inner {
    ttl: Duration,
    leases: DashMap<String, Lease>,
    records: DashMap<String, GameStateRecord>,
}

impl InMemoryLeaseStore {
    /// Create an empty store handing out leases valid for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                ttl,
                leases: DashMap::new(),
                records: DashMap::new(),
            }),
        }
    }

    fn try_acquire(&self, key: &str) -> Option<Lease> {
        match self.inner.leases.entry(key.to_owned()) {
            Entry::Occupied(mut held) => {
                if !held.get().is_expired() {
                    return None;
                }
                let lease = Lease::grant(key, self.inner.ttl);
                held.insert(lease.clone());
                Some(lease)
            }
            Entry::Vacant(slot) => {
                let lease = Lease::grant(key, self.inner.ttl);
                slot.insert(lease.clone());
                Some(lease)
            }
        }
    }

    /// Run `mutate` while the lease table shard for `key` is pinned, so no concurrent acquire
    /// can slip in between the ownership check and the mutation.
    fn with_held_lease<T>(
        &self,
        key: &str,
        token: Uuid,
        mutate: impl FnOnce(&DashMap<String, GameStateRecord>) -> T,
    ) -> StorageResult<T> {
        let Some(held) = self.inner.leases.get(key) else {
            return Err(StorageError::lease_expired(key));
        };
        if held.token() != token || held.is_expired() {
            return Err(StorageError::lease_expired(key));
        }
        let value = mutate(&self.inner.records);
        drop(held);
        Ok(value)
    }
}

impl LeaseStore for InMemoryLeaseStore {
    fn acquire(&self, key: &str) -> BoxFuture<'static, StorageResult<Option<Lease>>> {
        Box::pin(future::ready(Ok(self.try_acquire(key))))
    }

    fn read(&self, key: &str) -> BoxFuture<'static, StorageResult<Option<GameStateRecord>>> {
        let record = self.inner.records.get(key).map(|entry| entry.clone());
        Box::pin(future::ready(Ok(record)))
    }

    fn write(
        &self,
        key: &str,
        record: GameStateRecord,
        lease: &Lease,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let result = if lease.key() != key {
            Err(StorageError::lease_expired(key))
        } else {
            self.with_held_lease(key, lease.token(), |records| {
                records.insert(key.to_owned(), record);
            })
        };
        Box::pin(future::ready(result))
    }

    fn delete(&self, key: &str, lease: &Lease) -> BoxFuture<'static, StorageResult<()>> {
        let result = if lease.key() != key {
            Err(StorageError::lease_expired(key))
        } else {
            self.with_held_lease(key, lease.token(), |records| {
                records.remove(key);
            })
        };
        Box::pin(future::ready(result))
    }

    fn release(&self, lease: &Lease) -> BoxFuture<'static, StorageResult<()>> {
        let token = lease.token();
        self.inner
            .leases
            .remove_if(lease.key(), |_, held| held.token() == token);
        Box::pin(future::ready(Ok(())))
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(future::ready(Ok(())))
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(future::ready(Ok(())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::models::{GameStateRecord, PlayerEntry};

    const KEY: &str = "game_state:g1";

    fn record() -> GameStateRecord {
        let mut record = GameStateRecord::new("g1".into(), "ABCDEF", "v1".into());
        let mut entry = PlayerEntry::new("u1".into());
        entry.in_game_name = Some("Red".into());
        entry.should_be_mute = true;
        record.player_table.insert(entry.user_id.clone(), entry);
        record
    }

    #[tokio::test]
    async fn second_acquire_is_refused_while_held() {
        let store = InMemoryLeaseStore::new(Duration::from_secs(5));

        let first = store.acquire(KEY).await.unwrap();
        let second = store.acquire(KEY).await.unwrap();

        assert!(first.is_some());
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn leases_on_different_keys_are_independent() {
        let store = InMemoryLeaseStore::new(Duration::from_secs(5));

        assert!(store.acquire("game_state:a").await.unwrap().is_some());
        assert!(store.acquire("game_state:b").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let store = InMemoryLeaseStore::new(Duration::from_secs(5));
        let lease = store.acquire(KEY).await.unwrap().unwrap();

        store.write(KEY, record(), &lease).await.unwrap();
        store.release(&lease).await.unwrap();

        assert_eq!(store.read(KEY).await.unwrap(), Some(record()));
    }

    #[tokio::test]
    async fn release_is_idempotent_and_frees_the_key() {
        let store = InMemoryLeaseStore::new(Duration::from_secs(5));
        let lease = store.acquire(KEY).await.unwrap().unwrap();

        store.release(&lease).await.unwrap();
        store.release(&lease).await.unwrap();

        assert!(store.acquire(KEY).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn expired_holder_cannot_write_over_new_holder() {
        let store = InMemoryLeaseStore::new(Duration::from_millis(20));
        let stale = store.acquire(KEY).await.unwrap().unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;
        let fresh = store.acquire(KEY).await.unwrap().expect("expired lease is reclaimable");

        let err = store.write(KEY, record(), &stale).await.unwrap_err();
        assert!(matches!(err, StorageError::LeaseExpired { .. }));

        // Releasing the stale lease must not free the new holder's key.
        store.release(&stale).await.unwrap();
        assert!(store.acquire(KEY).await.unwrap().is_none());
        store.write(KEY, record(), &fresh).await.unwrap();
    }

    #[tokio::test]
    async fn write_after_ttl_fails_closed_even_without_contender() {
        let store = InMemoryLeaseStore::new(Duration::from_millis(20));
        let lease = store.acquire(KEY).await.unwrap().unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;

        let err = store.write(KEY, record(), &lease).await.unwrap_err();
        assert!(matches!(err, StorageError::LeaseExpired { .. }));
        assert_eq!(store.read(KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn write_with_lease_for_other_key_is_rejected() {
        let store = InMemoryLeaseStore::new(Duration::from_secs(5));
        let lease = store.acquire("game_state:other").await.unwrap().unwrap();

        let err = store.write(KEY, record(), &lease).await.unwrap_err();
        assert!(matches!(err, StorageError::LeaseExpired { .. }));
    }

    #[tokio::test]
    async fn delete_removes_record_under_lease() {
        let store = InMemoryLeaseStore::new(Duration::from_secs(5));
        let lease = store.acquire(KEY).await.unwrap().unwrap();
        store.write(KEY, record(), &lease).await.unwrap();

        store.delete(KEY, &lease).await.unwrap();

        assert_eq!(store.read(KEY).await.unwrap(), None);
    }
}
