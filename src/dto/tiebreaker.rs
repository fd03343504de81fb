use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::models::{RoundStatus, TeamTiebreakerEntity, TiebreakerEntity, TiebreakerStatus},
    dto::format_system_time,
};

/// How a committee member closes a tiebreaker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionMode {
    /// Pick the highest re-bid; tie again or exclude when undecided.
    #[default]
    Auto,
    /// Leave the player out of the round.
    Exclude,
}

/// Committee resolution request.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ResolveTiebreakerRequest {
    #[serde(default)]
    pub resolution: ResolutionMode,
}

/// Sealed re-bid from a team manager.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct SubmitTiebreakerRequest {
    #[validate(range(min = 1, message = "new bid amount must be positive"))]
    pub new_bid_amount: i64,
}

/// Participation of a team as seen by the caller.
#[derive(Debug, Serialize, ToSchema)]
pub struct TeamTiebreakerView {
    pub team_id: String,
    pub submitted: bool,
    /// Hidden from other teams while the tiebreaker is active.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_bid_amount: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<String>,
}

/// Tiebreaker as seen by the caller.
#[derive(Debug, Serialize, ToSchema)]
pub struct TiebreakerView {
    pub id: Uuid,
    pub round_id: Uuid,
    pub player_id: String,
    pub original_amount: i64,
    pub status: TiebreakerStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winning_team_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winning_amount: Option<i64>,
    pub teams: Vec<TeamTiebreakerView>,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<String>,
}

impl TiebreakerView {
    /// Full view for committee members.
    pub fn revealed(entity: TiebreakerEntity) -> Self {
        Self::build(entity, |_| true)
    }

    /// View for a team manager: other teams' amounts stay sealed while active.
    pub fn sealed_for(entity: TiebreakerEntity, team_id: &str) -> Self {
        let active = entity.status == TiebreakerStatus::Active;
        Self::build(entity, |team| !active || team.team_id == team_id)
    }

    fn build(entity: TiebreakerEntity, reveal: impl Fn(&TeamTiebreakerEntity) -> bool) -> Self {
        let teams = entity
            .teams
            .iter()
            .map(|team| TeamTiebreakerView {
                team_id: team.team_id.clone(),
                submitted: team.submitted,
                new_bid_amount: team.new_bid_amount.filter(|_| reveal(team)),
                submitted_at: team.submitted_at.map(format_system_time),
            })
            .collect();

        Self {
            id: entity.id,
            round_id: entity.round_id,
            player_id: entity.player_id,
            original_amount: entity.original_amount,
            status: entity.status,
            duration_minutes: entity.duration_minutes,
            winning_team_id: entity.winning_team_id,
            winning_amount: entity.winning_amount,
            teams,
            created_at: format_system_time(entity.created_at),
            resolved_at: entity.resolved_at.map(format_system_time),
        }
    }
}

/// Result of closing a tiebreaker.
#[derive(Debug, Serialize, ToSchema)]
pub struct ResolutionResponse {
    pub tiebreaker: TiebreakerView,
    /// Follow-up contest when the re-bids tied again.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub follow_up_tiebreaker_id: Option<Uuid>,
    /// Round status after the round was resumed, when it was.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub round_status: Option<RoundStatus>,
}

/// Result of a sealed re-bid.
#[derive(Debug, Serialize, ToSchema)]
pub struct SubmissionResponse {
    pub tiebreaker: TiebreakerView,
    pub all_submitted: bool,
    /// Present when this submission completed the tiebreaker.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<ResolutionResponse>,
}

/// Active tiebreaker of the calling team, if any.
#[derive(Debug, Serialize, ToSchema)]
pub struct ActiveTiebreakerResponse {
    pub tiebreaker: Option<TiebreakerView>,
}
