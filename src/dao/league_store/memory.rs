//! In-process [`LeagueStore`] used by tests and `STORAGE_BACKEND=memory` runs.
//!
//! Every operation takes the single data lock, which makes commits and
//! compare-and-set transitions trivially atomic.

use std::{collections::HashMap, sync::Arc, time::SystemTime};

use futures::future::BoxFuture;
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

use crate::dao::{
    league_store::LeagueStore,
    models::{
        AllocationPhase, AuditEntryEntity, BidEntity, BidStatus, MarketCommit,
        PendingAllocationEntity, PlayerContractEntity, PlayerEntity, PlayerTransactionEntity,
        RosterEntryEntity, RoundCommit, RoundEntity, RoundStatus, TeamSeasonEntity,
        TiebreakerEntity, TiebreakerStatus,
    },
    storage::{StorageError, StorageResult},
};

#[derive(Default)]
struct MemoryData {
    rounds: HashMap<Uuid, RoundEntity>,
    bids: Vec<BidEntity>,
    players: HashMap<String, PlayerEntity>,
    team_seasons: HashMap<(String, String), TeamSeasonEntity>,
    roster: Vec<RosterEntryEntity>,
    tiebreakers: Vec<TiebreakerEntity>,
    pending: Vec<PendingAllocationEntity>,
    contracts: HashMap<(String, String), PlayerContractEntity>,
    transactions: Vec<PlayerTransactionEntity>,
    audit: Vec<AuditEntryEntity>,
    #[cfg(test)]
    refused_statuses: Vec<RoundStatus>,
}

/// Shared in-memory store. Cloning yields another handle to the same data.
#[derive(Clone, Default)]
pub struct MemoryLeagueStore {
    data: Arc<Mutex<MemoryData>>,
}

impl MemoryLeagueStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later `set_round_status` to `status` fail.
    #[cfg(test)]
    pub async fn refuse_status(&self, status: RoundStatus) {
        self.data.lock().await.refused_statuses.push(status);
    }

    /// Insert or replace a bid.
    pub async fn put_bid(&self, bid: BidEntity) {
        let mut data = self.data.lock().await;
        data.bids.retain(|existing| existing.id != bid.id);
        data.bids.push(bid);
    }

    /// Insert or replace a pool player.
    pub async fn put_player(&self, player: PlayerEntity) {
        self.data
            .lock()
            .await
            .players
            .insert(player.id.clone(), player);
    }

    /// Insert or replace a team season record.
    pub async fn put_team_season(&self, season: TeamSeasonEntity) {
        self.data.lock().await.team_seasons.insert(
            (season.team_id.clone(), season.season_id.clone()),
            season,
        );
    }

    /// Insert or replace a player contract.
    pub async fn put_contract(&self, contract: PlayerContractEntity) {
        self.data.lock().await.contracts.insert(
            (contract.player_id.clone(), contract.season_id.clone()),
            contract,
        );
    }

    /// Insert a historical market transaction.
    pub async fn put_transaction(&self, transaction: PlayerTransactionEntity) {
        self.data.lock().await.transactions.push(transaction);
    }

    /// Read a team season record.
    pub async fn team_season(&self, team_id: &str, season_id: &str) -> Option<TeamSeasonEntity> {
        self.data
            .lock()
            .await
            .team_seasons
            .get(&(team_id.to_owned(), season_id.to_owned()))
            .cloned()
    }

    /// Read a pool player.
    pub async fn player(&self, id: &str) -> Option<PlayerEntity> {
        self.data.lock().await.players.get(id).cloned()
    }

    /// Roster entries of a team.
    pub async fn roster(&self, team_id: &str) -> Vec<RosterEntryEntity> {
        self.data
            .lock()
            .await
            .roster
            .iter()
            .filter(|entry| entry.team_id == team_id)
            .cloned()
            .collect()
    }

    /// All bids of a round regardless of status.
    pub async fn bids(&self, round_id: Uuid) -> Vec<BidEntity> {
        self.data
            .lock()
            .await
            .bids
            .iter()
            .filter(|bid| bid.round_id == round_id)
            .cloned()
            .collect()
    }
}

impl MemoryData {
    fn commit_round(&mut self, commit: RoundCommit) -> StorageResult<()> {
        if !self.rounds.contains_key(&commit.round_id) {
            return Err(StorageError::MissingRecord(format!(
                "round {}",
                commit.round_id
            )));
        }

        for allocation in &commit.allocations {
            let bid = self
                .bids
                .iter_mut()
                .find(|bid| bid.id == allocation.bid_id)
                .ok_or_else(|| StorageError::MissingRecord(format!("bid {}", allocation.bid_id)))?;
            bid.status = BidStatus::Won;
            bid.phase = Some(allocation.phase);
            bid.actual_bid_amount = match allocation.phase {
                AllocationPhase::Incomplete => Some(allocation.bid_amount),
                AllocationPhase::Regular => None,
            };
            bid.updated_at = commit.committed_at;

            self.roster.push(RosterEntryEntity {
                team_id: allocation.team_id.clone(),
                player_id: allocation.player_id.clone(),
                season_id: commit.season_id.clone(),
                round_id: commit.round_id,
                purchase_price: allocation.amount,
                acquired_at: commit.committed_at,
            });

            let position = match self.players.get_mut(&allocation.player_id) {
                Some(player) => {
                    player.is_sold = true;
                    player.team_id = Some(allocation.team_id.clone());
                    player.acquisition_value = Some(allocation.amount);
                    player.season_id = Some(commit.season_id.clone());
                    player.round_id = Some(commit.round_id.to_string());
                    Some(player.position.clone())
                }
                None => None,
            };

            match self
                .team_seasons
                .get_mut(&(allocation.team_id.clone(), commit.season_id.clone()))
            {
                Some(season) => season.charge_auction(allocation.amount, position.as_deref()),
                None => warn!(
                    team_id = %allocation.team_id,
                    season_id = %commit.season_id,
                    "team season record missing; budget not charged"
                ),
            }
        }

        for bid in self
            .bids
            .iter_mut()
            .filter(|bid| bid.round_id == commit.round_id && bid.status == BidStatus::Active)
        {
            bid.status = BidStatus::Lost;
            bid.updated_at = commit.committed_at;
        }

        self.pending
            .retain(|allocation| allocation.round_id != commit.round_id);

        if let Some(round) = self.rounds.get_mut(&commit.round_id) {
            round.status = RoundStatus::Completed;
            round.updated_at = commit.committed_at;
        }
        Ok(())
    }

    fn commit_market(&mut self, commit: MarketCommit) -> StorageResult<()> {
        for change in &commit.budget_changes {
            if !self
                .team_seasons
                .contains_key(&(change.team_id.clone(), commit.season_id.clone()))
            {
                return Err(StorageError::MissingRecord(format!(
                    "team season {}/{}",
                    change.team_id, commit.season_id
                )));
            }
        }

        for change in &commit.budget_changes {
            if let Some(season) = self
                .team_seasons
                .get_mut(&(change.team_id.clone(), commit.season_id.clone()))
            {
                season.apply_budget_change(change);
            }
        }
        for contract in commit.contracts {
            self.contracts.insert(
                (contract.player_id.clone(), contract.season_id.clone()),
                contract,
            );
        }
        self.transactions.push(commit.transaction);
        Ok(())
    }
}

impl LeagueStore for MemoryLeagueStore {
    fn insert_round(&self, round: RoundEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.data.lock().await.rounds.insert(round.id, round);
            Ok(())
        })
    }

    fn find_round(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<RoundEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.data.lock().await.rounds.get(&id).cloned()) })
    }

    fn list_rounds(
        &self,
        season_id: Option<String>,
    ) -> BoxFuture<'static, StorageResult<Vec<RoundEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let data = store.data.lock().await;
            let mut rounds: Vec<RoundEntity> = data
                .rounds
                .values()
                .filter(|round| season_id.as_ref().is_none_or(|id| &round.season_id == id))
                .cloned()
                .collect();
            rounds.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(rounds)
        })
    }

    fn list_expired_active_rounds(
        &self,
        now: SystemTime,
    ) -> BoxFuture<'static, StorageResult<Vec<RoundEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let data = store.data.lock().await;
            let mut rounds: Vec<RoundEntity> = data
                .rounds
                .values()
                .filter(|round| round.status == RoundStatus::Active && round.is_expired_at(now))
                .cloned()
                .collect();
            rounds.sort_by(|a, b| a.end_time.cmp(&b.end_time));
            Ok(rounds)
        })
    }

    fn set_round_status(
        &self,
        id: Uuid,
        status: RoundStatus,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let mut data = store.data.lock().await;
            #[cfg(test)]
            if data.refused_statuses.contains(&status) {
                return Err(StorageError::unavailable(
                    format!("set status of round {id}"),
                    std::io::Error::other("status refused"),
                ));
            }
            let round = data
                .rounds
                .get_mut(&id)
                .ok_or_else(|| StorageError::MissingRecord(format!("round {id}")))?;
            round.status = status;
            round.updated_at = SystemTime::now();
            Ok(())
        })
    }

    fn claim_round_status(
        &self,
        id: Uuid,
        from: Vec<RoundStatus>,
        to: RoundStatus,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            let mut data = store.data.lock().await;
            match data.rounds.get_mut(&id) {
                Some(round) if from.contains(&round.status) => {
                    round.status = to;
                    round.updated_at = SystemTime::now();
                    Ok(true)
                }
                _ => Ok(false),
            }
        })
    }

    fn list_bids(
        &self,
        round_id: Uuid,
        status: Option<BidStatus>,
    ) -> BoxFuture<'static, StorageResult<Vec<BidEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let data = store.data.lock().await;
            Ok(data
                .bids
                .iter()
                .filter(|bid| bid.round_id == round_id)
                .filter(|bid| status.is_none_or(|wanted| bid.status == wanted))
                .cloned()
                .collect())
        })
    }

    fn find_players(
        &self,
        ids: Vec<String>,
    ) -> BoxFuture<'static, StorageResult<Vec<PlayerEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let data = store.data.lock().await;
            Ok(ids
                .iter()
                .filter_map(|id| data.players.get(id).cloned())
                .collect())
        })
    }

    fn find_team_seasons(
        &self,
        season_id: String,
        team_ids: Vec<String>,
    ) -> BoxFuture<'static, StorageResult<Vec<TeamSeasonEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let data = store.data.lock().await;
            Ok(team_ids
                .into_iter()
                .filter_map(|team_id| data.team_seasons.get(&(team_id, season_id.clone())).cloned())
                .collect())
        })
    }

    fn insert_tiebreaker(
        &self,
        tiebreaker: TiebreakerEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.data.lock().await.tiebreakers.push(tiebreaker);
            Ok(())
        })
    }

    fn find_tiebreaker(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<TiebreakerEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let data = store.data.lock().await;
            Ok(data.tiebreakers.iter().find(|tb| tb.id == id).cloned())
        })
    }

    fn list_tiebreakers(
        &self,
        round_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<TiebreakerEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let data = store.data.lock().await;
            Ok(data
                .tiebreakers
                .iter()
                .filter(|tb| tb.round_id == round_id)
                .cloned()
                .collect())
        })
    }

    fn list_active_tiebreakers_for_team(
        &self,
        team_id: String,
    ) -> BoxFuture<'static, StorageResult<Vec<TiebreakerEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let data = store.data.lock().await;
            let mut found: Vec<TiebreakerEntity> = data
                .tiebreakers
                .iter()
                .filter(|tb| tb.status == TiebreakerStatus::Active)
                .filter(|tb| tb.teams.iter().any(|team| team.team_id == team_id))
                .cloned()
                .collect();
            found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(found)
        })
    }

    fn record_tiebreaker_submission(
        &self,
        id: Uuid,
        team_id: String,
        amount: i64,
        at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<Option<TiebreakerEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let mut data = store.data.lock().await;
            let Some(tiebreaker) = data
                .tiebreakers
                .iter_mut()
                .find(|tb| tb.id == id && tb.status == TiebreakerStatus::Active)
            else {
                return Ok(None);
            };
            let Some(entry) = tiebreaker
                .teams
                .iter_mut()
                .find(|team| team.team_id == team_id && !team.submitted)
            else {
                return Ok(None);
            };
            entry.submitted = true;
            entry.new_bid_amount = Some(amount);
            entry.submitted_at = Some(at);
            Ok(Some(tiebreaker.clone()))
        })
    }

    fn close_tiebreaker(
        &self,
        tiebreaker: TiebreakerEntity,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            let mut data = store.data.lock().await;
            match data
                .tiebreakers
                .iter_mut()
                .find(|tb| tb.id == tiebreaker.id && tb.status == TiebreakerStatus::Active)
            {
                Some(slot) => {
                    *slot = tiebreaker;
                    Ok(true)
                }
                None => Ok(false),
            }
        })
    }

    fn replace_pending_allocations(
        &self,
        round_id: Uuid,
        allocations: Vec<PendingAllocationEntity>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let mut data = store.data.lock().await;
            data.pending.retain(|allocation| allocation.round_id != round_id);
            data.pending.extend(allocations);
            Ok(())
        })
    }

    fn list_pending_allocations(
        &self,
        round_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<PendingAllocationEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let data = store.data.lock().await;
            let mut pending: Vec<PendingAllocationEntity> = data
                .pending
                .iter()
                .filter(|allocation| allocation.round_id == round_id)
                .cloned()
                .collect();
            pending.sort_by(|a, b| b.amount.cmp(&a.amount));
            Ok(pending)
        })
    }

    fn delete_pending_allocations(
        &self,
        round_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move {
            let mut data = store.data.lock().await;
            let before = data.pending.len();
            data.pending.retain(|allocation| allocation.round_id != round_id);
            Ok((before - data.pending.len()) as u64)
        })
    }

    fn commit_round(&self, commit: RoundCommit) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let mut data = store.data.lock().await;
            // Work on a copy so a failed commit leaves nothing behind.
            let mut staged = MemoryData {
                rounds: data.rounds.clone(),
                bids: data.bids.clone(),
                players: data.players.clone(),
                team_seasons: data.team_seasons.clone(),
                roster: data.roster.clone(),
                pending: data.pending.clone(),
                ..MemoryData::default()
            };
            staged.commit_round(commit)?;
            data.rounds = staged.rounds;
            data.bids = staged.bids;
            data.players = staged.players;
            data.team_seasons = staged.team_seasons;
            data.roster = staged.roster;
            data.pending = staged.pending;
            Ok(())
        })
    }

    fn find_contract(
        &self,
        player_id: String,
        season_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<PlayerContractEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let data = store.data.lock().await;
            Ok(data.contracts.get(&(player_id, season_id)).cloned())
        })
    }

    fn count_team_transactions(
        &self,
        team_id: String,
        season_id: String,
    ) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move {
            let data = store.data.lock().await;
            Ok(data
                .transactions
                .iter()
                .filter(|tx| tx.season_id == season_id && tx.team_ids.contains(&team_id))
                .count() as u64)
        })
    }

    fn list_transactions(
        &self,
        season_id: String,
    ) -> BoxFuture<'static, StorageResult<Vec<PlayerTransactionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let data = store.data.lock().await;
            let mut found: Vec<PlayerTransactionEntity> = data
                .transactions
                .iter()
                .filter(|tx| tx.season_id == season_id)
                .cloned()
                .collect();
            found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(found)
        })
    }

    fn commit_market(&self, commit: MarketCommit) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.data.lock().await.commit_market(commit) })
    }

    fn insert_audit(&self, entry: AuditEntryEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.data.lock().await.audit.push(entry);
            Ok(())
        })
    }

    fn list_audit(&self, limit: usize) -> BoxFuture<'static, StorageResult<Vec<AuditEntryEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let data = store.data.lock().await;
            Ok(data.audit.iter().rev().take(limit).cloned().collect())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}
