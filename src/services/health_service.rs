use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Check the storage backend and report degraded mode with the live counters.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.require_store().await {
        Ok(store) => {
            if let Err(err) = store.health_check().await {
                warn!(error = %err, "storage health check failed");
            }
        }
        Err(_) => warn!("storage unavailable (degraded mode)"),
    }

    HealthResponse::new(
        state.is_degraded(),
        state.controllers().len(),
        state.public_sse().subscriber_count(),
    )
}
