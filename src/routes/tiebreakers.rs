use axum::{
    Extension, Json, Router,
    body::Bytes,
    extract::{Path, State, rejection::JsonRejection},
    middleware,
    routing::{get, post},
};
use axum_valid::{Valid, ValidRejection};
use uuid::Uuid;

use crate::{
    config::Principal,
    dto::tiebreaker::{
        ActiveTiebreakerResponse, ResolutionResponse, ResolveTiebreakerRequest,
        SubmissionResponse, SubmitTiebreakerRequest, TiebreakerView,
    },
    error::AppError,
    routes::{accept, auth},
    services::tiebreaker_service::{self, Resolution},
    state::SharedState,
};

/// Tiebreaker routes for the committee, team managers and any authenticated caller.
pub fn router(state: SharedState) -> Router<SharedState> {
    let committee = Router::new()
        .route("/admin/rounds/{id}/tiebreakers", get(list_round_tiebreakers))
        .route("/admin/tiebreakers/{id}/resolve", post(resolve_tiebreaker))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_committee,
        ));

    let team = Router::new()
        .route("/team/tiebreakers/active", get(active_tiebreaker))
        .route("/tiebreakers/{id}/submit", post(submit_tiebreaker))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_team,
        ));

    let authenticated = Router::new()
        .route("/tiebreakers/{id}", get(get_tiebreaker))
        .route_layer(middleware::from_fn_with_state(state, auth::require_principal));

    committee.merge(team).merge(authenticated)
}

fn resolution_response(resolution: Resolution) -> ResolutionResponse {
    ResolutionResponse {
        tiebreaker: TiebreakerView::revealed(resolution.tiebreaker),
        follow_up_tiebreaker_id: resolution.follow_up.map(|follow_up| follow_up.id),
        round_status: resolution.round_status,
    }
}

#[utoipa::path(
    get,
    path = "/admin/rounds/{id}/tiebreakers",
    tag = "tiebreakers",
    params(("id" = Uuid, Path, description = "Round identifier")),
    security(("bearer" = [])),
    responses((status = 200, description = "Tiebreakers of the round", body = [TiebreakerView]))
)]
pub async fn list_round_tiebreakers(
    State(state): State<SharedState>,
    Path(round_id): Path<Uuid>,
) -> Result<Json<Vec<TiebreakerView>>, AppError> {
    let tiebreakers = tiebreaker_service::list_for_round(&state, round_id).await?;
    Ok(Json(
        tiebreakers
            .into_iter()
            .map(TiebreakerView::revealed)
            .collect(),
    ))
}

/// Close a tiebreaker and resume its round.
#[utoipa::path(
    post,
    path = "/admin/tiebreakers/{id}/resolve",
    tag = "tiebreakers",
    params(("id" = Uuid, Path, description = "Tiebreaker identifier")),
    request_body = ResolveTiebreakerRequest,
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Tiebreaker resolved", body = ResolutionResponse),
        (status = 400, description = "Tiebreaker is not active"),
        (status = 404, description = "Tiebreaker not found")
    )
)]
pub async fn resolve_tiebreaker(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<ResolutionResponse>, AppError> {
    // An empty body means automatic resolution.
    let request: ResolveTiebreakerRequest = if body.is_empty() {
        ResolveTiebreakerRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|err| AppError::BadRequest(err.to_string()))?
    };
    let resolution = tiebreaker_service::resolve(&state, id, request.resolution).await?;
    Ok(Json(resolution_response(resolution)))
}

/// Tiebreaker details; team managers only see their own sealed amount.
#[utoipa::path(
    get,
    path = "/tiebreakers/{id}",
    tag = "tiebreakers",
    params(("id" = Uuid, Path, description = "Tiebreaker identifier")),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Tiebreaker", body = TiebreakerView),
        (status = 404, description = "Tiebreaker not found")
    )
)]
pub async fn get_tiebreaker(
    State(state): State<SharedState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> Result<Json<TiebreakerView>, AppError> {
    let tiebreaker = tiebreaker_service::get_tiebreaker(&state, id).await?;
    let view = match principal.team_id() {
        Some(team_id) if !principal.is_committee() => {
            TiebreakerView::sealed_for(tiebreaker, team_id)
        }
        _ => TiebreakerView::revealed(tiebreaker),
    };
    Ok(Json(view))
}

#[utoipa::path(
    get,
    path = "/team/tiebreakers/active",
    tag = "tiebreakers",
    security(("bearer" = [])),
    responses((status = 200, description = "Active tiebreaker of the calling team", body = ActiveTiebreakerResponse))
)]
pub async fn active_tiebreaker(
    State(state): State<SharedState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<ActiveTiebreakerResponse>, AppError> {
    let team_id = principal
        .team_id()
        .ok_or_else(|| AppError::Forbidden("team managers only".into()))?;
    let tiebreaker = tiebreaker_service::active_for_team(&state, team_id).await?;
    Ok(Json(ActiveTiebreakerResponse {
        tiebreaker: tiebreaker.map(|entity| TiebreakerView::sealed_for(entity, team_id)),
    }))
}

/// Submit the calling team's sealed re-bid.
#[utoipa::path(
    post,
    path = "/tiebreakers/{id}/submit",
    tag = "tiebreakers",
    params(("id" = Uuid, Path, description = "Tiebreaker identifier")),
    request_body = SubmitTiebreakerRequest,
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Re-bid recorded", body = SubmissionResponse),
        (status = 400, description = "Invalid amount, closed tiebreaker or team not involved"),
        (status = 404, description = "Tiebreaker not found")
    )
)]
pub async fn submit_tiebreaker(
    State(state): State<SharedState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    payload: Result<Valid<Json<SubmitTiebreakerRequest>>, ValidRejection<JsonRejection>>,
) -> Result<Json<SubmissionResponse>, AppError> {
    let team_id = principal
        .team_id()
        .ok_or_else(|| AppError::Forbidden("team managers only".into()))?;
    let Json(request) = accept(payload)?;

    let submission =
        tiebreaker_service::submit(&state, team_id, id, request.new_bid_amount).await?;
    let all_submitted = tiebreaker_service::all_teams_submitted(&submission.tiebreaker);
    let tiebreaker = match &submission.resolution {
        Some(resolution) => TiebreakerView::revealed(resolution.tiebreaker.clone()),
        None => TiebreakerView::sealed_for(submission.tiebreaker, team_id),
    };

    Ok(Json(SubmissionResponse {
        tiebreaker,
        all_submitted,
        resolution: submission.resolution.map(resolution_response),
    }))
}
