/// Lease-guarded game state stores.
pub mod lease_store;
/// Domain records persisted by the stores.
pub mod models;
/// Storage abstraction layer for database operations.
pub mod storage;
