use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dao::models::{RoundStatus, TiebreakerStatus};

#[derive(Clone, Debug)]
/// Dispatched payload carried across SSE channels.
pub struct ServerEvent {
    pub event: Option<String>,
    pub data: String,
}

impl ServerEvent {
    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }

    /// Plain-text event.
    pub fn new(event: Option<String>, data: String) -> Self {
        Self { event, data }
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Initial metadata sent to an SSE client when it connects.
pub struct Handshake {
    /// Identifier of the SSE stream.
    pub stream: String,
    /// Whether the backend is running without a storage backend connection.
    pub degraded: bool,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when a round changes status.
pub struct RoundUpdatedEvent {
    pub round_id: Uuid,
    pub season_id: String,
    pub status: RoundStatus,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast once a round's allocations have been applied.
pub struct RoundFinalizedEvent {
    pub round_id: Uuid,
    pub season_id: String,
    pub allocations: usize,
    pub total_spent: i64,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when finalization stops on a tie.
pub struct TiebreakerCreatedEvent {
    pub tiebreaker_id: Uuid,
    pub round_id: Uuid,
    pub player_id: String,
    pub original_amount: i64,
    pub team_ids: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when a tiebreaker leaves the active state.
pub struct TiebreakerResolvedEvent {
    pub tiebreaker_id: Uuid,
    pub round_id: Uuid,
    pub status: TiebreakerStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winning_team_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winning_amount: Option<i64>,
}
