use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

use crate::state::SharedState;

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Poll the lease store and keep the shared state in degraded mode while it is unreachable.
pub async fn run(state: SharedState) {
    let store = state.store().clone();
    let mut reconnect_delay = INITIAL_DELAY;

    loop {
        match store.health_check().await {
            Ok(()) => {
                if state.is_degraded() {
                    info!("storage healthy again; leaving degraded mode");
                    state.update_degraded(false);
                }
                reconnect_delay = INITIAL_DELAY;
                sleep(HEALTH_POLL_INTERVAL).await;
            }
            Err(err) => {
                if !state.is_degraded() {
                    warn!(error = %err, "storage health check failed; entering degraded mode");
                    state.update_degraded(true);
                }

                match store.try_reconnect().await {
                    Ok(()) => {
                        info!("storage reconnection succeeded after health check failure");
                        state.update_degraded(false);
                        reconnect_delay = INITIAL_DELAY;
                        sleep(HEALTH_POLL_INTERVAL).await;
                    }
                    Err(reconnect_err) => {
                        warn!(
                            delay_ms = reconnect_delay.as_millis() as u64,
                            error = %reconnect_err,
                            "storage reconnect attempt failed"
                        );
                        sleep(reconnect_delay).await;
                        reconnect_delay = (reconnect_delay * 2).min(MAX_DELAY);
                    }
                }
            }
        }
    }
}
