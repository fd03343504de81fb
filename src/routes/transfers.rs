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

use crate::{
    config::Principal,
    dto::{
        transfer::{
            HistoryQuery, SwapOutcome, SwapRequest, TransactionView, TransferLimitStatus,
            TransferOutcome, TransferRequest,
        },
        validation::validate_league_id,
    },
    error::AppError,
    routes::{accept, auth},
    services::transfer_service,
    state::SharedState,
};

/// Committee transfer and swap endpoints.
pub fn router(state: SharedState) -> Router<SharedState> {
    Router::new()
        .route("/admin/transfers", post(execute_transfer))
        .route("/admin/transfers/preview", post(preview_transfer))
        .route("/admin/transfers/swap", post(execute_swap))
        .route("/admin/transfers/swap/preview", post(preview_swap))
        .route("/admin/transfers/history", get(history))
        .route(
            "/admin/transfers/limits/{season_id}/{team_id}",
            get(limit_status),
        )
        .route_layer(middleware::from_fn_with_state(
            state,
            auth::require_committee,
        ))
}

/// Calculate a transfer without committing it.
#[utoipa::path(
    post,
    path = "/admin/transfers/preview",
    tag = "transfers",
    request_body = TransferRequest,
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Calculated transfer with limit and budget checks", body = TransferOutcome),
        (status = 400, description = "Transfer cannot be calculated")
    )
)]
pub async fn preview_transfer(
    State(state): State<SharedState>,
    payload: Result<Valid<Json<TransferRequest>>, ValidRejection<JsonRejection>>,
) -> Result<Json<TransferOutcome>, AppError> {
    let Json(request) = accept(payload)?;
    Ok(Json(
        transfer_service::preview_transfer(&state, &request).await?,
    ))
}

/// Move a contracted player to another team.
#[utoipa::path(
    post,
    path = "/admin/transfers",
    tag = "transfers",
    request_body = TransferRequest,
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Transfer committed", body = TransferOutcome),
        (status = 400, description = "Limit, budget or contract check failed")
    )
)]
pub async fn execute_transfer(
    State(state): State<SharedState>,
    Extension(principal): Extension<Principal>,
    payload: Result<Valid<Json<TransferRequest>>, ValidRejection<JsonRejection>>,
) -> Result<Json<TransferOutcome>, AppError> {
    let Json(request) = accept(payload)?;
    Ok(Json(
        transfer_service::execute_transfer(&state, request, &principal.name).await?,
    ))
}

/// Calculate a swap without committing it.
#[utoipa::path(
    post,
    path = "/admin/transfers/swap/preview",
    tag = "transfers",
    request_body = SwapRequest,
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Calculated swap with limit and budget checks", body = SwapOutcome),
        (status = 400, description = "Swap cannot be calculated")
    )
)]
pub async fn preview_swap(
    State(state): State<SharedState>,
    payload: Result<Valid<Json<SwapRequest>>, ValidRejection<JsonRejection>>,
) -> Result<Json<SwapOutcome>, AppError> {
    let Json(request) = accept(payload)?;
    Ok(Json(transfer_service::preview_swap(&state, &request).await?))
}

/// Exchange two contracted players.
#[utoipa::path(
    post,
    path = "/admin/transfers/swap",
    tag = "transfers",
    request_body = SwapRequest,
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Swap committed", body = SwapOutcome),
        (status = 400, description = "Limit, budget or contract check failed")
    )
)]
pub async fn execute_swap(
    State(state): State<SharedState>,
    Extension(principal): Extension<Principal>,
    payload: Result<Valid<Json<SwapRequest>>, ValidRejection<JsonRejection>>,
) -> Result<Json<SwapOutcome>, AppError> {
    let Json(request) = accept(payload)?;
    Ok(Json(
        transfer_service::execute_swap(&state, request, &principal.name).await?,
    ))
}

#[utoipa::path(
    get,
    path = "/admin/transfers/history",
    tag = "transfers",
    params(HistoryQuery),
    security(("bearer" = [])),
    responses((status = 200, description = "Market operations of the season, newest first", body = [TransactionView]))
)]
pub async fn history(
    State(state): State<SharedState>,
    query: Result<Valid<Query<HistoryQuery>>, ValidRejection<QueryRejection>>,
) -> Result<Json<Vec<TransactionView>>, AppError> {
    let Query(query) = accept(query)?;
    Ok(Json(
        transfer_service::transaction_history(&state, &query.season_id).await?,
    ))
}

/// Transfers used and remaining for a team in a season.
#[utoipa::path(
    get,
    path = "/admin/transfers/limits/{season_id}/{team_id}",
    tag = "transfers",
    params(
        ("season_id" = String, Path, description = "Season identifier"),
        ("team_id" = String, Path, description = "Team identifier")
    ),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Transfer usage", body = TransferLimitStatus),
        (status = 400, description = "Malformed identifier")
    )
)]
pub async fn limit_status(
    State(state): State<SharedState>,
    Path((season_id, team_id)): Path<(String, String)>,
) -> Result<Json<TransferLimitStatus>, AppError> {
    validate_league_id(&season_id)
        .and_then(|_| validate_league_id(&team_id))
        .map_err(|err| AppError::BadRequest(format!("invalid identifier: {err}")))?;
    Ok(Json(
        transfer_service::transfer_limit_status(&state, &team_id, &season_id).await?,
    ))
}
