//! Persistent records shared by every storage backend.
//!
//! Identifiers minted by this service are [`Uuid`]s stored as strings, and timestamps are
//! stored as epoch milliseconds so that both backends can filter on them.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, TimestampMilliSeconds, serde_as};
use std::time::SystemTime;
use utoipa::ToSchema;
use uuid::Uuid;

/// Lifecycle of an auction round.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RoundStatus {
    /// Accepting bids until `end_time`.
    Active,
    /// Claimed by a finalizer; allocation in progress.
    Finalizing,
    /// Expired in manual mode, waiting for a committee preview.
    ExpiredPendingFinalization,
    /// Finalization stopped on a tie; a tiebreaker is open.
    TiebreakerPending,
    /// Allocations previewed and waiting to be applied.
    PendingFinalization,
    /// Allocations applied. Terminal.
    Completed,
}

impl RoundStatus {
    /// Wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            RoundStatus::Active => "active",
            RoundStatus::Finalizing => "finalizing",
            RoundStatus::ExpiredPendingFinalization => "expired_pending_finalization",
            RoundStatus::TiebreakerPending => "tiebreaker_pending",
            RoundStatus::PendingFinalization => "pending_finalization",
            RoundStatus::Completed => "completed",
        }
    }
}

/// How a round gets finalized once it expires.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FinalizationMode {
    /// Finalized and applied without committee review.
    #[default]
    Auto,
    /// Previewed and applied by the committee.
    Manual,
}

/// Auction round for one position within a season.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoundEntity {
    /// Primary key.
    #[serde(rename = "_id")]
    #[serde_as(as = "DisplayFromStr")]
    pub id: Uuid,
    /// Season the round belongs to.
    pub season_id: String,
    /// Player position auctioned in this round (e.g. `GK`).
    pub position: String,
    /// Number of bids every team must place to be considered complete.
    pub max_bids_per_team: u32,
    /// Current lifecycle status.
    pub status: RoundStatus,
    /// Missing values are treated as [`FinalizationMode::Auto`].
    #[serde(default)]
    pub finalization_mode: Option<FinalizationMode>,
    /// Bidding opens.
    #[serde_as(as = "TimestampMilliSeconds<i64>")]
    pub start_time: SystemTime,
    /// Bidding closes.
    #[serde_as(as = "TimestampMilliSeconds<i64>")]
    pub end_time: SystemTime,
    /// Creation timestamp.
    #[serde_as(as = "TimestampMilliSeconds<i64>")]
    pub created_at: SystemTime,
    /// Last status change.
    #[serde_as(as = "TimestampMilliSeconds<i64>")]
    pub updated_at: SystemTime,
}

impl RoundEntity {
    /// Effective finalization mode.
    pub fn mode(&self) -> FinalizationMode {
        self.finalization_mode.unwrap_or_default()
    }

    /// Whether bidding time is over at `now`.
    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        self.end_time <= now
    }
}

/// Status of a sealed bid.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BidStatus {
    /// Still in contention.
    Active,
    /// Allocated.
    Won,
    /// Not allocated once the round completed.
    Lost,
}

/// Allocation phase that produced a winning bid.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AllocationPhase {
    /// Highest-bid-wins allocation among complete teams.
    Regular,
    /// Average-price allocation for teams that bid on too few players.
    Incomplete,
}

/// Sealed bid placed by a team on a player during a round.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BidEntity {
    /// Primary key.
    #[serde(rename = "_id")]
    #[serde_as(as = "DisplayFromStr")]
    pub id: Uuid,
    /// Owning round.
    #[serde_as(as = "DisplayFromStr")]
    pub round_id: Uuid,
    /// Bidding team.
    pub team_id: String,
    /// Player the bid is for.
    pub player_id: String,
    /// Bid amount in whole currency units.
    pub amount: i64,
    /// Current status.
    pub status: BidStatus,
    /// Set once the bid wins.
    #[serde(default)]
    pub phase: Option<AllocationPhase>,
    /// Amount the team actually bid when it was charged a different price.
    #[serde(default)]
    pub actual_bid_amount: Option<i64>,
    /// Creation timestamp.
    #[serde_as(as = "TimestampMilliSeconds<i64>")]
    pub created_at: SystemTime,
    /// Last update.
    #[serde_as(as = "TimestampMilliSeconds<i64>")]
    pub updated_at: SystemTime,
}

/// Player from the auction pool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerEntity {
    /// Primary key.
    #[serde(rename = "_id")]
    pub id: String,
    /// Display name.
    pub name: String,
    /// Playing position.
    pub position: String,
    /// Whether the player has been allocated.
    #[serde(default)]
    pub is_sold: bool,
    /// Owning team once sold.
    #[serde(default)]
    pub team_id: Option<String>,
    /// Price paid at allocation.
    #[serde(default)]
    pub acquisition_value: Option<i64>,
    /// Season of the allocation.
    #[serde(default)]
    pub season_id: Option<String>,
    /// Round of the allocation.
    #[serde(default)]
    pub round_id: Option<String>,
}

/// Currency model of a team season.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CurrencySystem {
    /// One budget for everything.
    #[default]
    Single,
    /// Separate football and real-player budgets.
    Dual,
}

/// Financial and roster summary of a team for one season.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TeamSeasonEntity {
    /// Team identifier.
    pub team_id: String,
    /// Season identifier.
    pub season_id: String,
    /// Team display name.
    pub team_name: String,
    /// Currency model.
    #[serde(default)]
    pub currency_system: CurrencySystem,
    /// Single-currency budget.
    #[serde(default)]
    pub budget: f64,
    /// Dual-currency football budget.
    #[serde(default)]
    pub football_budget: Option<f64>,
    /// Dual-currency real-player budget.
    #[serde(default)]
    pub real_player_budget: Option<f64>,
    /// Amount spent on football players.
    #[serde(default)]
    pub football_spent: f64,
    /// Amount spent on real players.
    #[serde(default)]
    pub real_player_spent: f64,
    /// Overall spending.
    #[serde(default)]
    pub total_spent: f64,
    /// Number of rostered players.
    #[serde(default)]
    pub players_count: u32,
    /// Rostered players per position.
    #[serde(default)]
    pub position_counts: IndexMap<String, u32>,
}

impl TeamSeasonEntity {
    /// Budget available for auction purchases, following the team's currency model.
    pub fn auction_budget(&self) -> f64 {
        match self.currency_system {
            CurrencySystem::Dual => self.football_budget.unwrap_or(0.0),
            CurrencySystem::Single => self.budget,
        }
    }

    /// Charge an auction purchase and count the new roster spot.
    pub fn charge_auction(&mut self, amount: i64, position: Option<&str>) {
        let amount = amount as f64;
        match self.currency_system {
            CurrencySystem::Dual => {
                self.football_budget = Some(self.football_budget.unwrap_or(0.0) - amount);
                self.football_spent += amount;
            }
            CurrencySystem::Single => self.budget -= amount,
        }
        self.total_spent += amount;
        self.players_count += 1;
        if let Some(position) = position {
            *self.position_counts.entry(position.to_owned()).or_insert(0) += 1;
        }
    }

    /// Budget line used for contracts of `player_type`, if the team has one.
    pub fn market_budget(&self, player_type: PlayerType) -> Option<f64> {
        match player_type {
            PlayerType::Real => self.real_player_budget,
            PlayerType::Football => self.football_budget,
        }
    }

    /// Apply a signed market budget movement.
    pub fn apply_budget_change(&mut self, change: &BudgetChange) {
        let (budget, spent) = match change.player_type {
            PlayerType::Real => (&mut self.real_player_budget, &mut self.real_player_spent),
            PlayerType::Football => (&mut self.football_budget, &mut self.football_spent),
        };
        *budget = Some(round2(budget.unwrap_or(0.0) + change.budget_delta));
        *spent = round2(*spent + change.spent_delta);
        self.total_spent = round2(self.total_spent + change.spent_delta);
    }
}

/// Round a currency value to cents.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Roster entry created when a player is allocated to a team.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RosterEntryEntity {
    /// Team identifier.
    pub team_id: String,
    /// Player identifier.
    pub player_id: String,
    /// Season identifier.
    pub season_id: String,
    /// Round the player was won in.
    #[serde_as(as = "DisplayFromStr")]
    pub round_id: Uuid,
    /// Price paid.
    pub purchase_price: i64,
    /// Acquisition timestamp.
    #[serde_as(as = "TimestampMilliSeconds<i64>")]
    pub acquired_at: SystemTime,
}

/// Status of a tiebreaker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TiebreakerStatus {
    /// Waiting for sealed re-bids.
    Active,
    /// A single highest re-bid won.
    Resolved,
    /// The player is left out of the round.
    Excluded,
    /// Re-bids tied again; a follow-up tiebreaker was created.
    TiedAgain,
}

/// Participation of one team in a tiebreaker.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TeamTiebreakerEntity {
    /// Primary key.
    #[serde_as(as = "DisplayFromStr")]
    pub id: Uuid,
    /// Participating team.
    pub team_id: String,
    /// Bid that caused the tie.
    #[serde_as(as = "DisplayFromStr")]
    pub original_bid_id: Uuid,
    /// Whether the team has already re-bid.
    pub submitted: bool,
    /// Sealed re-bid.
    #[serde(default)]
    pub new_bid_amount: Option<i64>,
    /// Submission time.
    #[serde_as(as = "Option<TimestampMilliSeconds<i64>>")]
    pub submitted_at: Option<SystemTime>,
}

/// Sealed re-bid contest between teams that tied on the same player.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TiebreakerEntity {
    /// Primary key.
    #[serde(rename = "_id")]
    #[serde_as(as = "DisplayFromStr")]
    pub id: Uuid,
    /// Round in which the tie happened.
    #[serde_as(as = "DisplayFromStr")]
    pub round_id: Uuid,
    /// Contested player.
    pub player_id: String,
    /// Amount the teams tied at.
    pub original_amount: i64,
    /// Current status.
    pub status: TiebreakerStatus,
    /// `None` means the tiebreaker never expires.
    #[serde(default)]
    pub duration_minutes: Option<u32>,
    /// Set when resolved.
    #[serde(default)]
    pub winning_team_id: Option<String>,
    /// Set when resolved.
    #[serde(default)]
    pub winning_amount: Option<i64>,
    /// Participating teams.
    pub teams: Vec<TeamTiebreakerEntity>,
    /// Creation timestamp.
    #[serde_as(as = "TimestampMilliSeconds<i64>")]
    pub created_at: SystemTime,
    /// Resolution timestamp.
    #[serde_as(as = "Option<TimestampMilliSeconds<i64>>")]
    pub resolved_at: Option<SystemTime>,
}

/// Allocation computed by a manual preview and waiting to be applied.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingAllocationEntity {
    /// Primary key.
    #[serde(rename = "_id")]
    #[serde_as(as = "DisplayFromStr")]
    pub id: Uuid,
    /// Round being finalized.
    #[serde_as(as = "DisplayFromStr")]
    pub round_id: Uuid,
    /// Receiving team.
    pub team_id: String,
    /// Team name at preview time.
    pub team_name: String,
    /// Allocated player.
    pub player_id: String,
    /// Player name at preview time.
    pub player_name: String,
    /// Price to charge.
    pub amount: i64,
    /// The team's own bid; differs from `amount` for incomplete allocations.
    pub bid_amount: i64,
    /// Winning bid.
    #[serde_as(as = "DisplayFromStr")]
    pub bid_id: Uuid,
    /// Allocation phase.
    pub phase: AllocationPhase,
    /// Creation timestamp.
    #[serde_as(as = "TimestampMilliSeconds<i64>")]
    pub created_at: SystemTime,
}

/// Kind of player contract in the transfer market.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PlayerType {
    /// Real-world player, paid from the real-player budget.
    Real,
    /// Football (auction) player, paid from the football budget.
    Football,
}

/// Contract binding a player to a team for a season.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerContractEntity {
    /// Player identifier.
    pub player_id: String,
    /// Season identifier.
    pub season_id: String,
    /// Display name.
    pub player_name: String,
    /// Owning team.
    pub team_id: String,
    /// Contract kind.
    pub player_type: PlayerType,
    /// Current value.
    pub auction_value: f64,
    /// Star rating between 3 and 10.
    pub star_rating: u8,
    /// Accumulated points.
    pub points: i64,
    /// Salary charged per match.
    pub salary_per_match: f64,
}

/// Kind of market operation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// One player moves from a selling team to a buying team.
    Transfer,
    /// Two teams exchange players.
    Swap,
}

/// Record of a completed transfer or swap.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerTransactionEntity {
    /// Primary key.
    #[serde(rename = "_id")]
    #[serde_as(as = "DisplayFromStr")]
    pub id: Uuid,
    /// Season the operation counts against.
    pub season_id: String,
    /// Operation kind.
    pub kind: TransactionKind,
    /// Teams involved; each one consumes a transfer slot.
    pub team_ids: Vec<String>,
    /// Players moved.
    pub player_ids: Vec<String>,
    /// Full calculation snapshot.
    pub details: serde_json::Value,
    /// Principal who executed the operation.
    pub performed_by: String,
    /// Creation timestamp.
    #[serde_as(as = "TimestampMilliSeconds<i64>")]
    pub created_at: SystemTime,
}

/// Committee action log entry.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditEntryEntity {
    /// Primary key.
    #[serde(rename = "_id")]
    #[serde_as(as = "DisplayFromStr")]
    pub id: Uuid,
    /// Action name (e.g. `apply_pending_allocations`).
    pub action: String,
    /// Principal that triggered the action.
    pub actor: String,
    /// Round concerned, if any.
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub round_id: Option<Uuid>,
    /// Season concerned, if any.
    #[serde(default)]
    pub season_id: Option<String>,
    /// Whether the action succeeded.
    pub success: bool,
    /// Free-form details.
    pub detail: serde_json::Value,
    /// Creation timestamp.
    #[serde_as(as = "TimestampMilliSeconds<i64>")]
    pub created_at: SystemTime,
}

/// Winning bid to persist when a round is committed.
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationRecord {
    /// Winning bid.
    pub bid_id: Uuid,
    /// Receiving team.
    pub team_id: String,
    /// Allocated player.
    pub player_id: String,
    /// Price charged.
    pub amount: i64,
    /// The team's own bid (differs from `amount` for incomplete allocations).
    pub bid_amount: i64,
    /// Allocation phase.
    pub phase: AllocationPhase,
}

/// Everything that changes when a round is completed, applied in one unit.
#[derive(Debug, Clone)]
pub struct RoundCommit {
    /// Round to complete.
    pub round_id: Uuid,
    /// Season the round belongs to.
    pub season_id: String,
    /// Winning bids.
    pub allocations: Vec<AllocationRecord>,
    /// Commit timestamp.
    pub committed_at: SystemTime,
}

/// Budget movement on one team's season record.
#[derive(Debug, Clone, PartialEq)]
pub struct BudgetChange {
    /// Team identifier.
    pub team_id: String,
    /// Budget line affected.
    pub player_type: PlayerType,
    /// Signed change applied to the type budget.
    pub budget_delta: f64,
    /// Signed change applied to the type spent counter.
    pub spent_delta: f64,
}

/// Contract moves, budget changes and the transaction record of one market operation.
#[derive(Debug, Clone)]
pub struct MarketCommit {
    /// Season of the operation.
    pub season_id: String,
    /// Contracts in their post-operation state.
    pub contracts: Vec<PlayerContractEntity>,
    /// Budget changes per team.
    pub budget_changes: Vec<BudgetChange>,
    /// Transaction record.
    pub transaction: PlayerTransactionEntity,
}
