use std::fmt::Display;

use axum::Router;
use axum_valid::{Valid, ValidRejection};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{error::AppError, services::documentation::ApiDoc, state::SharedState};

pub mod auth;
pub mod cron;
pub mod health;
pub mod rounds;
pub mod sse;
pub mod tiebreakers;
pub mod transfers;

/// Unwrap a validated extractor, turning both malformed input and failed
/// validation into a 400 with the usual error body.
pub(crate) fn accept<T, E: Display>(
    extracted: Result<Valid<T>, ValidRejection<E>>,
) -> Result<T, AppError> {
    match extracted {
        Ok(Valid(inner)) => Ok(inner),
        Err(ValidRejection::Valid(errors)) => Err(errors.into()),
        Err(ValidRejection::Inner(rejection)) => Err(AppError::BadRequest(rejection.to_string())),
    }
}

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(sse::router())
        .merge(rounds::router(state.clone()))
        .merge(tiebreakers::router(state.clone()))
        .merge(transfers::router(state.clone()))
        .merge(cron::router(state.clone()));

    let docs_router: Router<SharedState> = SwaggerUi::new("/docs")
        .url("/api-doc/openapi.json", ApiDoc::openapi())
        .into();

    api_router.merge(docs_router).with_state(state)
}
