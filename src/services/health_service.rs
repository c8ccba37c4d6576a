use tracing::warn;

use crate::{
    dto::health::{HealthResponse, LeaseStoreHealth},
    state::SharedState,
};

/// Ping the lease store and combine the answer with the supervisor's degraded flag.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    let lease_store = match state.store().health_check().await {
        Err(err) => {
            warn!(error = %err, "lease store health check failed");
            LeaseStoreHealth::Unreachable
        }
        Ok(()) if state.is_degraded() => LeaseStoreHealth::Recovering,
        Ok(()) => LeaseStoreHealth::Reachable,
    };
    HealthResponse::from(lease_store)
}
