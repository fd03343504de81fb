use axum::{Json, Router, extract::State, middleware, routing::post};

use crate::{
    dto::round::SweepResponse, error::AppError, routes::auth, services::auto_finalizer,
    state::SharedState,
};

/// Finalization sweep for an external scheduler.
pub fn router(state: SharedState) -> Router<SharedState> {
    Router::new()
        .route("/cron/finalize-rounds", post(finalize_rounds))
        .route_layer(middleware::from_fn_with_state(
            state,
            auth::require_scheduler,
        ))
}

/// Check every active round and finalize those past their end time.
#[utoipa::path(
    post,
    path = "/cron/finalize-rounds",
    tag = "rounds",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Sweep summary", body = SweepResponse),
        (status = 503, description = "League store unavailable")
    )
)]
pub async fn finalize_rounds(
    State(state): State<SharedState>,
) -> Result<Json<SweepResponse>, AppError> {
    Ok(Json(auto_finalizer::run_sweep(&state).await?))
}
