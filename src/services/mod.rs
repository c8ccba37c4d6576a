/// Premium lookup attached to enforcement requests.
pub mod billing;
/// OpenAPI documentation generation.
pub mod documentation;
/// Enforcement boundary and change-set dispatcher.
pub mod enforcement;
/// Game lifecycle operations under the lease.
pub mod game_service;
/// Health check service.
pub mod health_service;
/// Guild voice rules.
pub mod policy;
/// Trigger and override entry points.
pub mod reconcile_service;
/// Lease-guarded reconciliation engine.
pub mod reconciler;
/// Storage health supervisor toggling degraded mode.
pub mod storage_supervisor;
