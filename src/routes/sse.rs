use std::convert::Infallible;

use axum::{
    Router,
    extract::State,
    response::sse::{Event, Sse},
    routing::get,
};
use futures::Stream;
use tracing::info;

use crate::{services::sse_service, state::SharedState};

#[utoipa::path(
    get,
    path = "/sse/rounds",
    tag = "sse",
    responses((status = 200, description = "Round and tiebreaker events", content_type = "text/event-stream", body = String))
)]
/// Stream round and tiebreaker events. The first event is a handshake carrying the degraded flag.
pub async fn rounds_stream(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = sse_service::subscribe_rounds(&state);
    let greeting = sse_service::handshake(&state).await;
    info!(
        subscribers = state.events().receiver_count(),
        "new round SSE connection"
    );
    sse_service::to_sse_stream(receiver, greeting)
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/sse/rounds", get(rounds_stream))
}
