//! Error types shared by the MongoDB lease store implementation.

use mongodb::error::Error as MongoError;
use thiserror::Error;

/// Convenient result alias returning [`MongoDaoError`] failures.
pub type MongoResult<T> = Result<T, MongoDaoError>;

/// Failures that can occur while interacting with MongoDB.
#[derive(Debug, Error)]
pub enum MongoDaoError {
    #[error("missing MongoDB environment variable `{var}`")]
    MissingEnvVar { var: &'static str },
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        attempts: u32,
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping health check failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    #[error("failed to acquire lease on `{key}`")]
    AcquireLease {
        key: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to release lease on `{key}`")]
    ReleaseLease {
        key: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to load game state `{key}`")]
    LoadState {
        key: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to save game state `{key}`")]
    SaveState {
        key: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to delete game state `{key}`")]
    DeleteState {
        key: String,
        #[source]
        source: MongoError,
    },
    #[error("lease on `{key}` is no longer held")]
    LeaseNotHeld { key: String },
}
