use serde::Serialize;
use utoipa::ToSchema;

/// Health payload returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// `ok` or `degraded`.
    pub status: String,
    /// Whether the storage backend answered its last ping.
    pub storage_reachable: bool,
    /// Whether the background auto-finalizer is configured to run.
    pub auto_finalizer: bool,
}

impl HealthResponse {
    /// Build the payload from the probe results.
    pub fn new(degraded: bool, storage_reachable: bool, auto_finalizer: bool) -> Self {
        Self {
            status: if degraded { "degraded" } else { "ok" }.to_string(),
            storage_reachable,
            auto_finalizer,
        }
    }
}
