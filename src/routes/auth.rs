use axum::{
    body::Body,
    extract::State,
    http::{Request, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use tracing::debug;

use crate::{
    config::{Principal, Role},
    error::AppError,
    state::SharedState,
};

fn authenticate(state: &SharedState, req: &Request<Body>) -> Result<Principal, AppError> {
    let token = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AppError::Unauthorized("missing bearer token".into()))?;

    state
        .config()
        .principal_for(token)
        .cloned()
        .ok_or_else(|| AppError::Unauthorized("unknown API token".into()))
}

async fn admit(
    state: &SharedState,
    mut req: Request<Body>,
    next: Next,
    allowed: impl Fn(&Principal) -> bool,
) -> Result<Response, AppError> {
    let principal = authenticate(state, &req)?;
    if !allowed(&principal) {
        debug!(principal = %principal.name, path = %req.uri().path(), "role not allowed");
        return Err(AppError::Forbidden(
            "insufficient permissions for this endpoint".into(),
        ));
    }
    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}

/// Admins and committee admins.
pub async fn require_committee(
    State(state): State<SharedState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    admit(&state, req, next, Principal::is_committee).await
}

/// Team managers.
pub async fn require_team(
    State(state): State<SharedState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    admit(&state, req, next, |principal| principal.team_id().is_some()).await
}

/// Admins and the external scheduler.
pub async fn require_scheduler(
    State(state): State<SharedState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    admit(&state, req, next, |principal| {
        matches!(principal.role, Role::Admin | Role::Scheduler)
    })
    .await
}

/// Any known token.
pub async fn require_principal(
    State(state): State<SharedState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    admit(&state, req, next, |_| true).await
}
