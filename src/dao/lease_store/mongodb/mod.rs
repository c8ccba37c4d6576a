mod config;
mod connection;
mod error;
mod models;
mod store;

pub use config::MongoConfig;
pub use connection::ConnectRetry;
pub use error::MongoDaoError;
pub use store::MongoLeaseStore;

use crate::dao::storage::StorageError;

impl From<MongoDaoError> for StorageError {
    fn from(err: MongoDaoError) -> Self {
        match err {
            MongoDaoError::LeaseNotHeld { key } => StorageError::LeaseExpired { key },
            other => StorageError::unavailable(other.to_string(), other),
        }
    }
}
