use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Probe the league store and report the service health.
///
/// A failed ping is logged but does not change the degraded flag; the storage
/// supervisor owns that transition.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    let storage_reachable = match state.store().await {
        Some(store) => match store.health_check().await {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "league store ping failed");
                false
            }
        },
        None => {
            warn!("no league store installed (degraded mode)");
            false
        }
    };

    HealthResponse::new(
        state.is_degraded().await,
        storage_reachable,
        state.config().finalizer_enabled,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::AppConfig, services::fixtures::memory_state, state::AppState};

    #[tokio::test]
    async fn reports_degraded_without_store() {
        let state = AppState::new(AppConfig::default());
        let health = health_status(&state).await;
        assert_eq!(health.status, "degraded");
        assert!(!health.storage_reachable);
    }

    #[tokio::test]
    async fn reports_ok_with_memory_store() {
        let (state, _) = memory_state().await;
        let health = health_status(&state).await;
        assert_eq!(health.status, "ok");
        assert!(health.storage_reachable);
    }
}
