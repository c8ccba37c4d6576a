use serde::Serialize;
use utoipa::ToSchema;

/// Overall status reported by `/healthcheck`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Ok,
    Degraded,
}

/// What the lease store looked like when the health check ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LeaseStoreHealth {
    Reachable,
    /// Answered the ping, but the storage supervisor has not cleared degraded mode yet.
    Recovering,
    Unreachable,
}

/// Health payload; any store state other than reachable degrades the service.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub lease_store: LeaseStoreHealth,
}

impl From<LeaseStoreHealth> for HealthResponse {
    fn from(lease_store: LeaseStoreHealth) -> Self {
        let status = match lease_store {
            LeaseStoreHealth::Reachable => HealthStatus::Ok,
            LeaseStoreHealth::Recovering | LeaseStoreHealth::Unreachable => HealthStatus::Degraded,
        };
        Self {
            status,
            lease_store,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_a_reachable_store_is_healthy() {
        let ok = serde_json::to_value(HealthResponse::from(LeaseStoreHealth::Reachable)).unwrap();
        assert_eq!(ok, serde_json::json!({"status": "ok", "lease_store": "reachable"}));

        for store in [LeaseStoreHealth::Recovering, LeaseStoreHealth::Unreachable] {
            assert_eq!(HealthResponse::from(store).status, HealthStatus::Degraded);
        }
    }
}
