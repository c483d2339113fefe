use serde::Serialize;
use utoipa::ToSchema;

/// Body of the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// `ok` with a storage backend, `degraded` without one.
    pub status: String,
    /// Automation controllers running in this process.
    pub running_controllers: usize,
    /// Clients currently listening on the public SSE stream.
    pub sse_subscribers: usize,
}

impl HealthResponse {
    /// Build the response from the degraded flag and the live counters.
    pub fn new(degraded: bool, running_controllers: usize, sse_subscribers: usize) -> Self {
        let status = if degraded { "degraded" } else { "ok" };
        Self {
            status: status.to_owned(),
            running_controllers,
            sse_subscribers,
        }
    }
}
