pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use std::time::SystemTime;

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::models::{
    AuditEntryEntity, BidEntity, BidStatus, MarketCommit, PendingAllocationEntity,
    PlayerContractEntity, PlayerEntity, PlayerTransactionEntity, RoundCommit, RoundEntity,
    RoundStatus, TeamSeasonEntity, TiebreakerEntity,
};
use crate::dao::storage::StorageResult;

/// Abstraction over the persistence layer for auction rounds, tiebreakers and the transfer market.
///
/// Methods that touch several records (`commit_*`, `claim_round_status`,
/// `record_tiebreaker_submission`) must be atomic in every backend.
pub trait LeagueStore: Send + Sync {
    fn insert_round(&self, round: RoundEntity) -> BoxFuture<'static, StorageResult<()>>;
    fn find_round(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<RoundEntity>>>;
    fn list_rounds(
        &self,
        season_id: Option<String>,
    ) -> BoxFuture<'static, StorageResult<Vec<RoundEntity>>>;
    /// Active rounds whose `end_time` is at or before `now`.
    fn list_expired_active_rounds(
        &self,
        now: SystemTime,
    ) -> BoxFuture<'static, StorageResult<Vec<RoundEntity>>>;
    /// Unconditionally set the status of a round.
    fn set_round_status(
        &self,
        id: Uuid,
        status: RoundStatus,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Move a round to `to` only if its current status is one of `from`.
    /// Returns whether this caller won the transition.
    fn claim_round_status(
        &self,
        id: Uuid,
        from: Vec<RoundStatus>,
        to: RoundStatus,
    ) -> BoxFuture<'static, StorageResult<bool>>;

    fn list_bids(
        &self,
        round_id: Uuid,
        status: Option<BidStatus>,
    ) -> BoxFuture<'static, StorageResult<Vec<BidEntity>>>;
    fn find_players(
        &self,
        ids: Vec<String>,
    ) -> BoxFuture<'static, StorageResult<Vec<PlayerEntity>>>;
    fn find_team_seasons(
        &self,
        season_id: String,
        team_ids: Vec<String>,
    ) -> BoxFuture<'static, StorageResult<Vec<TeamSeasonEntity>>>;

    fn insert_tiebreaker(
        &self,
        tiebreaker: TiebreakerEntity,
    ) -> BoxFuture<'static, StorageResult<()>>;
    fn find_tiebreaker(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<TiebreakerEntity>>>;
    fn list_tiebreakers(
        &self,
        round_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<TiebreakerEntity>>>;
    /// Active tiebreakers in which `team_id` takes part, newest first.
    fn list_active_tiebreakers_for_team(
        &self,
        team_id: String,
    ) -> BoxFuture<'static, StorageResult<Vec<TiebreakerEntity>>>;
    /// Store a sealed re-bid if the tiebreaker is active and the team has not submitted yet.
    /// Returns the updated tiebreaker, or `None` when the guard failed.
    fn record_tiebreaker_submission(
        &self,
        id: Uuid,
        team_id: String,
        amount: i64,
        at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<Option<TiebreakerEntity>>>;
    /// Replace a tiebreaker if it is still active. Returns whether it was replaced.
    fn close_tiebreaker(
        &self,
        tiebreaker: TiebreakerEntity,
    ) -> BoxFuture<'static, StorageResult<bool>>;

    fn replace_pending_allocations(
        &self,
        round_id: Uuid,
        allocations: Vec<PendingAllocationEntity>,
    ) -> BoxFuture<'static, StorageResult<()>>;
    fn list_pending_allocations(
        &self,
        round_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<PendingAllocationEntity>>>;
    /// Returns the number of removed allocations.
    fn delete_pending_allocations(&self, round_id: Uuid)
    -> BoxFuture<'static, StorageResult<u64>>;
    /// Mark winners and losers, update rosters, players and budgets, drop pending
    /// allocations and complete the round.
    fn commit_round(&self, commit: RoundCommit) -> BoxFuture<'static, StorageResult<()>>;

    fn find_contract(
        &self,
        player_id: String,
        season_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<PlayerContractEntity>>>;
    fn count_team_transactions(
        &self,
        team_id: String,
        season_id: String,
    ) -> BoxFuture<'static, StorageResult<u64>>;
    fn list_transactions(
        &self,
        season_id: String,
    ) -> BoxFuture<'static, StorageResult<Vec<PlayerTransactionEntity>>>;
    fn commit_market(&self, commit: MarketCommit) -> BoxFuture<'static, StorageResult<()>>;

    fn insert_audit(&self, entry: AuditEntryEntity) -> BoxFuture<'static, StorageResult<()>>;
    fn list_audit(&self, limit: usize) -> BoxFuture<'static, StorageResult<Vec<AuditEntryEntity>>>;

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
