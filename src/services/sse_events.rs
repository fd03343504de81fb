use serde::Serialize;
use tracing::warn;

use crate::{
    dao::models::{RoundEntity, RoundStatus, TiebreakerEntity},
    dto::sse::{
        RoundFinalizedEvent, RoundUpdatedEvent, ServerEvent, TiebreakerCreatedEvent,
        TiebreakerResolvedEvent,
    },
    state::SharedState,
};

const EVENT_ROUND_UPDATED: &str = "round.updated";
const EVENT_ROUND_FINALIZED: &str = "round.finalized";
const EVENT_TIEBREAKER_CREATED: &str = "tiebreaker.created";
const EVENT_TIEBREAKER_RESOLVED: &str = "tiebreaker.resolved";

/// Broadcast a round status change.
pub fn broadcast_round_updated(state: &SharedState, round: &RoundEntity, status: RoundStatus) {
    let payload = RoundUpdatedEvent {
        round_id: round.id,
        season_id: round.season_id.clone(),
        status,
    };
    send_public_event(state, EVENT_ROUND_UPDATED, &payload);
}

/// Broadcast that a round's allocations were applied.
pub fn broadcast_round_finalized(
    state: &SharedState,
    round: &RoundEntity,
    allocations: usize,
    total_spent: i64,
) {
    let payload = RoundFinalizedEvent {
        round_id: round.id,
        season_id: round.season_id.clone(),
        allocations,
        total_spent,
    };
    send_public_event(state, EVENT_ROUND_FINALIZED, &payload);
}

/// Broadcast a freshly opened tiebreaker.
pub fn broadcast_tiebreaker_created(state: &SharedState, tiebreaker: &TiebreakerEntity) {
    let payload = TiebreakerCreatedEvent {
        tiebreaker_id: tiebreaker.id,
        round_id: tiebreaker.round_id,
        player_id: tiebreaker.player_id.clone(),
        original_amount: tiebreaker.original_amount,
        team_ids: tiebreaker
            .teams
            .iter()
            .map(|team| team.team_id.clone())
            .collect(),
    };
    send_public_event(state, EVENT_TIEBREAKER_CREATED, &payload);
}

/// Broadcast the closing of a tiebreaker.
pub fn broadcast_tiebreaker_resolved(state: &SharedState, tiebreaker: &TiebreakerEntity) {
    let payload = TiebreakerResolvedEvent {
        tiebreaker_id: tiebreaker.id,
        round_id: tiebreaker.round_id,
        status: tiebreaker.status,
        winning_team_id: tiebreaker.winning_team_id.clone(),
        winning_amount: tiebreaker.winning_amount,
    };
    send_public_event(state, EVENT_TIEBREAKER_RESOLVED, &payload);
}

fn send_public_event(state: &SharedState, event: &str, payload: &impl Serialize) {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(event) => state.events().broadcast(event),
        Err(err) => warn!(event, error = %err, "failed to serialize public SSE payload"),
    }
}
