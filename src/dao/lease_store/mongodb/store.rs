use std::{sync::Arc, time::Duration};

use futures::future::BoxFuture;
use mongodb::{
    Client, Collection, Database,
    bson::{DateTime, doc},
    error::{Error as MongoError, ErrorKind, WriteFailure},
};
use tokio::sync::RwLock;
use tracing::debug;

use super::{
    config::MongoConfig,
    connection::{ConnectRetry, establish_connection, ping},
    error::{MongoDaoError, MongoResult},
    models::{MongoGameStateDocument, MongoLeaseBody, claimable, doc_id, held_by},
};
use crate::dao::{
    lease_store::{Lease, LeaseStore},
    models::GameStateRecord,
    storage::StorageResult,
};

const STATE_COLLECTION_NAME: &str = "game_states";
const DUPLICATE_KEY_CODE: i32 = 11000;

#[derive(Clone)]
pub struct MongoLeaseStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    #[allow(dead_code)]
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        ping(&database)
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })
    }

    async fn reconnect(&self) -> MongoResult<()> {
        // The storage supervisor owns the backoff between reconnects.
        let single_attempt = ConnectRetry {
            max_attempts: 1,
            ..self.config.connect_retry
        };
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name, single_attempt)
                .await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoLeaseStore {
    /// Establish a connection to MongoDB.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name, config.connect_retry)
                .await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        Ok(Self { inner })
    }

    fn ttl(&self) -> Duration {
        self.inner.config.lease_ttl
    }

    async fn collection(&self) -> Collection<MongoGameStateDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoGameStateDocument>(STATE_COLLECTION_NAME)
    }

    async fn acquire(&self, key: &str) -> MongoResult<Option<Lease>> {
        let lease = Lease::grant(key, self.ttl());
        let body = MongoLeaseBody::from(&lease);
        let collection = self.collection().await;

        // Upserting against a held key collides on `_id`, which is how a live holder shows up.
        let result = collection
            .update_one(
                claimable(key, DateTime::now()),
                doc! { "$set": { "lease": { "token": body.token, "expires_at": body.expires_at } } },
            )
            .upsert(true)
            .await;

        match result {
            Ok(_) => Ok(Some(lease)),
            Err(err) if is_duplicate_key(&err) => {
                debug!(key, "lease already held");
                Ok(None)
            }
            Err(source) => Err(MongoDaoError::AcquireLease {
                key: key.to_owned(),
                source,
            }),
        }
    }

    async fn read(&self, key: &str) -> MongoResult<Option<GameStateRecord>> {
        let collection = self.collection().await;
        let document = collection
            .find_one(doc_id(key))
            .await
            .map_err(|source| MongoDaoError::LoadState {
                key: key.to_owned(),
                source,
            })?;

        Ok(document.and_then(|doc| doc.record).map(Into::into))
    }

    async fn replace_held(
        &self,
        key: &str,
        record: GameStateRecord,
        lease: &Lease,
    ) -> MongoResult<()> {
        ensure_lease_key(key, lease)?;

        let document = MongoGameStateDocument::leased(key, record, lease);
        let collection = self.collection().await;
        let result = collection
            .replace_one(held_by(key, lease), &document)
            .await
            .map_err(|source| MongoDaoError::SaveState {
                key: key.to_owned(),
                source,
            })?;

        if result.matched_count == 0 {
            return Err(MongoDaoError::LeaseNotHeld {
                key: key.to_owned(),
            });
        }
        Ok(())
    }

    /// Drop the whole document, lease included, so ended games leave nothing behind.
    async fn delete_held(&self, key: &str, lease: &Lease) -> MongoResult<()> {
        ensure_lease_key(key, lease)?;

        let collection = self.collection().await;
        let result = collection
            .delete_one(held_by(key, lease))
            .await
            .map_err(|source| MongoDaoError::DeleteState {
                key: key.to_owned(),
                source,
            })?;

        if result.deleted_count == 0 {
            return Err(MongoDaoError::LeaseNotHeld {
                key: key.to_owned(),
            });
        }
        Ok(())
    }

    async fn release(&self, lease: &Lease) -> MongoResult<()> {
        let key = lease.key();
        let collection = self.collection().await;
        collection
            .update_one(
                doc! { "_id": key, "lease.token": lease.token().to_string() },
                doc! { "$unset": { "lease": "" } },
            )
            .await
            .map_err(|source| MongoDaoError::ReleaseLease {
                key: key.to_owned(),
                source,
            })?;
        Ok(())
    }
}

fn ensure_lease_key(key: &str, lease: &Lease) -> MongoResult<()> {
    if lease.key() == key {
        Ok(())
    } else {
        Err(MongoDaoError::LeaseNotHeld {
            key: key.to_owned(),
        })
    }
}

fn is_duplicate_key(err: &MongoError) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(failure)) => failure.code == DUPLICATE_KEY_CODE,
        ErrorKind::Command(failure) => failure.code == DUPLICATE_KEY_CODE,
        _ => false,
    }
}

impl LeaseStore for MongoLeaseStore {
    fn acquire(&self, key: &str) -> BoxFuture<'static, StorageResult<Option<Lease>>> {
        let store = self.clone();
        let key = key.to_owned();
        Box::pin(async move { store.acquire(&key).await.map_err(Into::into) })
    }

    fn read(&self, key: &str) -> BoxFuture<'static, StorageResult<Option<GameStateRecord>>> {
        let store = self.clone();
        let key = key.to_owned();
        Box::pin(async move { store.read(&key).await.map_err(Into::into) })
    }

    fn write(
        &self,
        key: &str,
        record: GameStateRecord,
        lease: &Lease,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        let key = key.to_owned();
        let lease = lease.clone();
        Box::pin(async move {
            store
                .replace_held(&key, record, &lease)
                .await
                .map_err(Into::into)
        })
    }

    fn delete(&self, key: &str, lease: &Lease) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        let key = key.to_owned();
        let lease = lease.clone();
        Box::pin(async move {
            store
                .delete_held(&key, &lease)
                .await
                .map_err(Into::into)
        })
    }

    fn release(&self, lease: &Lease) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        let lease = lease.clone();
        Box::pin(async move { store.release(&lease).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
