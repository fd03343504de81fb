use axum::{
    Extension, Json, Router,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    middleware,
    routing::{get, post},
};
use axum_valid::{Valid, ValidRejection};
use uuid::Uuid;

use crate::{
    config::Principal,
    dto::{
        audit::{AuditEntryView, AuditQuery},
        round::{
            ApplyAllocationsResponse, CancelAllocationsResponse, CreateRoundRequest,
            FinalizeStepsResponse, ListRoundsQuery, PendingAllocationsResponse,
            PreviewFinalizationResponse, RoundCheckResponse, RoundSummary,
        },
    },
    error::AppError,
    routes::{accept, auth},
    services::{audit_service, round_service},
    state::SharedState,
};

/// Committee round administration plus the lazy status check.
pub fn router(state: SharedState) -> Router<SharedState> {
    let committee = Router::new()
        .route("/admin/rounds", get(list_rounds).post(create_round))
        .route("/admin/rounds/{id}", get(get_round))
        .route("/admin/rounds/{id}/finalize", post(finalize_round))
        .route("/admin/rounds/{id}/finalize-preview", get(finalize_preview))
        .route(
            "/admin/rounds/{id}/preview-finalization",
            post(preview_finalization),
        )
        .route(
            "/admin/rounds/{id}/pending-allocations",
            get(pending_allocations).delete(cancel_pending_allocations),
        )
        .route(
            "/admin/rounds/{id}/apply-pending-allocations",
            post(apply_pending_allocations),
        )
        .route("/admin/audit", get(audit_log))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_committee,
        ));

    let authenticated = Router::new()
        .route("/rounds/{id}/status", get(round_status))
        .route_layer(middleware::from_fn_with_state(state, auth::require_principal));

    committee.merge(authenticated)
}

/// Rounds, optionally filtered by season.
#[utoipa::path(
    get,
    path = "/admin/rounds",
    tag = "rounds",
    params(ListRoundsQuery),
    security(("bearer" = [])),
    responses((status = 200, description = "Rounds", body = [RoundSummary]))
)]
pub async fn list_rounds(
    State(state): State<SharedState>,
    query: Result<Valid<Query<ListRoundsQuery>>, ValidRejection<QueryRejection>>,
) -> Result<Json<Vec<RoundSummary>>, AppError> {
    let Query(query) = accept(query)?;
    Ok(Json(round_service::list_rounds(&state, query.season_id).await?))
}

/// Open a new bidding round.
#[utoipa::path(
    post,
    path = "/admin/rounds",
    tag = "rounds",
    request_body = CreateRoundRequest,
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Round created", body = RoundSummary),
        (status = 400, description = "Invalid request")
    )
)]
pub async fn create_round(
    State(state): State<SharedState>,
    Extension(principal): Extension<Principal>,
    payload: Result<Valid<Json<CreateRoundRequest>>, ValidRejection<JsonRejection>>,
) -> Result<Json<RoundSummary>, AppError> {
    let Json(request) = accept(payload)?;
    Ok(Json(
        round_service::create_round(&state, request, &principal.name).await?,
    ))
}

#[utoipa::path(
    get,
    path = "/admin/rounds/{id}",
    tag = "rounds",
    params(("id" = Uuid, Path, description = "Round identifier")),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Round", body = RoundSummary),
        (status = 404, description = "Round not found")
    )
)]
pub async fn get_round(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RoundSummary>, AppError> {
    Ok(Json(round_service::get_round(&state, id).await?))
}

/// Finalize a round immediately, whatever its end time.
#[utoipa::path(
    post,
    path = "/admin/rounds/{id}/finalize",
    tag = "rounds",
    params(("id" = Uuid, Path, description = "Round identifier")),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Round finalized or waiting on a tiebreaker", body = RoundCheckResponse),
        (status = 400, description = "Round cannot be finalized in its current status")
    )
)]
pub async fn finalize_round(
    State(state): State<SharedState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> Result<Json<RoundCheckResponse>, AppError> {
    Ok(Json(
        round_service::finalize_now(&state, id, &principal.name).await?,
    ))
}

/// Dry run of the allocation with every decision step.
#[utoipa::path(
    get,
    path = "/admin/rounds/{id}/finalize-preview",
    tag = "rounds",
    params(("id" = Uuid, Path, description = "Round identifier")),
    security(("bearer" = [])),
    responses((status = 200, description = "Allocation trace", body = FinalizeStepsResponse))
)]
pub async fn finalize_preview(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<FinalizeStepsResponse>, AppError> {
    Ok(Json(round_service::finalize_steps(&state, id).await?))
}

/// Compute and store allocations of a manual round for review.
#[utoipa::path(
    post,
    path = "/admin/rounds/{id}/preview-finalization",
    tag = "rounds",
    params(("id" = Uuid, Path, description = "Round identifier")),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Pending allocations, or the tie that stopped the preview", body = PreviewFinalizationResponse),
        (status = 400, description = "Round cannot be previewed")
    )
)]
pub async fn preview_finalization(
    State(state): State<SharedState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> Result<Json<PreviewFinalizationResponse>, AppError> {
    Ok(Json(
        round_service::preview_finalization(&state, id, &principal.name).await?,
    ))
}

#[utoipa::path(
    get,
    path = "/admin/rounds/{id}/pending-allocations",
    tag = "rounds",
    params(("id" = Uuid, Path, description = "Round identifier")),
    security(("bearer" = [])),
    responses((status = 200, description = "Pending allocations, highest first", body = PendingAllocationsResponse))
)]
pub async fn pending_allocations(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PendingAllocationsResponse>, AppError> {
    Ok(Json(round_service::pending_allocations(&state, id).await?))
}

/// Discard pending allocations and return the round to review.
#[utoipa::path(
    delete,
    path = "/admin/rounds/{id}/pending-allocations",
    tag = "rounds",
    params(("id" = Uuid, Path, description = "Round identifier")),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Allocations discarded", body = CancelAllocationsResponse),
        (status = 400, description = "Nothing to cancel")
    )
)]
pub async fn cancel_pending_allocations(
    State(state): State<SharedState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> Result<Json<CancelAllocationsResponse>, AppError> {
    Ok(Json(
        round_service::cancel_pending_allocations(&state, id, &principal.name).await?,
    ))
}

/// Apply pending allocations after checking every team budget.
#[utoipa::path(
    post,
    path = "/admin/rounds/{id}/apply-pending-allocations",
    tag = "rounds",
    params(("id" = Uuid, Path, description = "Round identifier")),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Allocations applied", body = ApplyAllocationsResponse),
        (status = 400, description = "Round not pending or a budget is insufficient")
    )
)]
pub async fn apply_pending_allocations(
    State(state): State<SharedState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApplyAllocationsResponse>, AppError> {
    Ok(Json(
        round_service::apply_pending_allocations(&state, id, &principal.name).await?,
    ))
}

/// Most recent committee actions.
#[utoipa::path(
    get,
    path = "/admin/audit",
    tag = "rounds",
    params(AuditQuery),
    security(("bearer" = [])),
    responses((status = 200, description = "Audit entries, newest first", body = [AuditEntryView]))
)]
pub async fn audit_log(
    State(state): State<SharedState>,
    query: Result<Valid<Query<AuditQuery>>, ValidRejection<QueryRejection>>,
) -> Result<Json<Vec<AuditEntryView>>, AppError> {
    let Query(query) = accept(query)?;
    Ok(Json(audit_service::list_recent(&state, query.limit).await?))
}

/// Check a round and finalize it when its bidding window has closed.
#[utoipa::path(
    get,
    path = "/rounds/{id}/status",
    tag = "rounds",
    params(("id" = Uuid, Path, description = "Round identifier")),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "What the check did", body = RoundCheckResponse),
        (status = 404, description = "Round not found")
    )
)]
pub async fn round_status(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RoundCheckResponse>, AppError> {
    Ok(Json(
        round_service::check_and_finalize_expired_round(&state, id).await?,
    ))
}
