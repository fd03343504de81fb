use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::models::{
        AllocationPhase, FinalizationMode, PendingAllocationEntity, RoundEntity, RoundStatus,
    },
    dto::{format_system_time, validation::validate_league_id},
    services::allocation::{Allocation, AllocationStep, CandidateBid},
};

/// Open a new bidding round.
#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
pub struct CreateRoundRequest {
    #[validate(custom(function = "validate_league_id"))]
    pub season_id: String,
    #[validate(length(min = 1, max = 32, message = "position must be 1-32 characters"))]
    pub position: String,
    #[validate(range(min = 1, max = 50))]
    pub max_bids_per_team: u32,
    /// Bidding window starting now.
    #[validate(range(min = 1, max = 10080))]
    pub duration_minutes: u32,
    /// Defaults to `auto`.
    #[serde(default)]
    pub finalization_mode: Option<FinalizationMode>,
}

/// Filter of the round listing.
#[derive(Debug, Default, Deserialize, IntoParams, Validate)]
#[into_params(parameter_in = Query)]
pub struct ListRoundsQuery {
    #[validate(custom(function = "validate_league_id"))]
    pub season_id: Option<String>,
}

/// Round as exposed over HTTP.
#[derive(Debug, Serialize, ToSchema)]
pub struct RoundSummary {
    pub id: Uuid,
    pub season_id: String,
    pub position: String,
    pub max_bids_per_team: u32,
    pub status: RoundStatus,
    pub finalization_mode: FinalizationMode,
    pub start_time: String,
    pub end_time: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<RoundEntity> for RoundSummary {
    fn from(value: RoundEntity) -> Self {
        Self {
            finalization_mode: value.mode(),
            id: value.id,
            season_id: value.season_id,
            position: value.position,
            max_bids_per_team: value.max_bids_per_team,
            status: value.status,
            start_time: format_system_time(value.start_time),
            end_time: format_system_time(value.end_time),
            created_at: format_system_time(value.created_at),
            updated_at: format_system_time(value.updated_at),
        }
    }
}

/// Totals over a set of allocations.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct AllocationSummary {
    pub total_players: usize,
    pub total_spent: i64,
    /// Rounded mean of the amounts, zero when empty.
    pub average_bid: i64,
}

impl AllocationSummary {
    /// Summarize a list of charged amounts.
    pub fn from_amounts(amounts: impl IntoIterator<Item = i64>) -> Self {
        let (count, total) = amounts
            .into_iter()
            .fold((0usize, 0i64), |(count, total), amount| (count + 1, total + amount));
        let average_bid = if count == 0 {
            0
        } else {
            (total as f64 / count as f64).round() as i64
        };
        Self {
            total_players: count,
            total_spent: total,
            average_bid,
        }
    }
}

/// What the status check or a finalization attempt did to the round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RoundCheckOutcome {
    /// Allocations were applied by this call.
    Finalized,
    /// The round was already completed, or another finalizer claimed it.
    AlreadyFinalized,
    /// Waiting for the committee to preview or apply allocations.
    PendingManualFinalization,
    /// A tiebreaker must be settled first.
    TiebreakerPending,
    /// Bidding is still open.
    NotExpired,
    /// Another finalizer is currently working on the round.
    InProgress,
}

/// Result of the lazy status check and of an immediate finalization.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RoundCheckResponse {
    pub round_id: Uuid,
    pub outcome: RoundCheckOutcome,
    pub message: String,
    /// Number of players allocated when `outcome` is `finalized`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allocations: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tiebreaker_id: Option<Uuid>,
}

impl RoundCheckResponse {
    pub fn new(round_id: Uuid, outcome: RoundCheckOutcome, message: impl Into<String>) -> Self {
        Self {
            round_id,
            outcome,
            message: message.into(),
            allocations: None,
            tiebreaker_id: None,
        }
    }

    pub fn finalized(round_id: Uuid, allocations: usize) -> Self {
        Self {
            allocations: Some(allocations),
            ..Self::new(
                round_id,
                RoundCheckOutcome::Finalized,
                format!("Round finalized with {allocations} allocation(s)"),
            )
        }
    }

    pub fn tiebreaker_pending(round_id: Uuid, tiebreaker_id: Option<Uuid>) -> Self {
        Self {
            tiebreaker_id,
            ..Self::new(
                round_id,
                RoundCheckOutcome::TiebreakerPending,
                "Tiebreaker pending; the round resumes once it is resolved",
            )
        }
    }
}

/// Manual preview of a round's allocations.
#[derive(Debug, Serialize, ToSchema)]
pub struct PreviewFinalizationResponse {
    pub round_id: Uuid,
    /// `pending_finalization`, or `tiebreaker_pending` when a tie stopped the preview.
    pub status: RoundStatus,
    pub allocations: Vec<Allocation>,
    pub summary: AllocationSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tiebreaker_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tied_bids: Vec<CandidateBid>,
}

/// Stored allocation waiting to be applied.
#[derive(Debug, Serialize, ToSchema)]
pub struct PendingAllocationView {
    pub id: Uuid,
    pub team_id: String,
    pub team_name: String,
    pub player_id: String,
    pub player_name: String,
    pub amount: i64,
    pub bid_amount: i64,
    pub bid_id: Uuid,
    pub phase: AllocationPhase,
    pub created_at: String,
}

impl From<PendingAllocationEntity> for PendingAllocationView {
    fn from(value: PendingAllocationEntity) -> Self {
        Self {
            id: value.id,
            team_id: value.team_id,
            team_name: value.team_name,
            player_id: value.player_id,
            player_name: value.player_name,
            amount: value.amount,
            bid_amount: value.bid_amount,
            bid_id: value.bid_id,
            phase: value.phase,
            created_at: format_system_time(value.created_at),
        }
    }
}

/// Pending allocations of a round, highest amount first.
#[derive(Debug, Serialize, ToSchema)]
pub struct PendingAllocationsResponse {
    pub round_id: Uuid,
    pub allocations: Vec<PendingAllocationView>,
    pub summary: AllocationSummary,
}

/// Pending allocations were applied.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApplyAllocationsResponse {
    pub round_id: Uuid,
    pub status: RoundStatus,
    pub summary: AllocationSummary,
}

/// Pending allocations were discarded.
#[derive(Debug, Serialize, ToSchema)]
pub struct CancelAllocationsResponse {
    pub round_id: Uuid,
    pub status: RoundStatus,
    pub cancelled: u64,
}

/// Dry run of the allocation with its decision trace.
#[derive(Debug, Serialize, ToSchema)]
pub struct FinalizeStepsResponse {
    pub round_id: Uuid,
    pub status: RoundStatus,
    pub required_bids: u32,
    pub complete_teams: Vec<String>,
    pub incomplete_teams: Vec<String>,
    /// Whether the run stopped on a tie.
    pub tie_detected: bool,
    pub allocations: Vec<Allocation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_price: Option<i64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tied_bids: Vec<CandidateBid>,
    pub steps: Vec<AllocationStep>,
    /// Tiebreaker already open for the round.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_tiebreaker_id: Option<Uuid>,
}

/// Outcome of one auto-finalizer sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct SweepResponse {
    /// Expired active rounds found.
    pub checked: usize,
    pub finalized: usize,
    pub pending_manual: usize,
    pub tiebreakers: usize,
    /// Rounds another task was already handling.
    pub skipped: usize,
    pub failed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_rounds_average() {
        let summary = AllocationSummary::from_amounts([100, 101]);
        assert_eq!(summary.total_players, 2);
        assert_eq!(summary.total_spent, 201);
        assert_eq!(summary.average_bid, 101);
        assert_eq!(
            AllocationSummary::from_amounts(Vec::new()),
            AllocationSummary::default()
        );
    }

    #[test]
    fn create_round_is_validated() {
        let request: CreateRoundRequest = serde_json::from_str(
            r#"{"season_id":"S1","position":"GK","max_bids_per_team":0,"duration_minutes":30}"#,
        )
        .unwrap();
        assert!(request.validate().is_err());
        assert_eq!(request.finalization_mode, None);
    }

    #[test]
    fn outcome_uses_snake_case() {
        let response = RoundCheckResponse::tiebreaker_pending(Uuid::nil(), None);
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["outcome"], "tiebreaker_pending");
        assert!(json.get("tiebreaker_id").is_none());
    }
}
