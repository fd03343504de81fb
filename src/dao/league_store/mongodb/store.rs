use std::{
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    ClientSession, Client, Collection, Database, IndexModel,
    bson::{Document, doc},
    error::Error as MongoError,
    options::IndexOptions,
};
use tokio::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
};
use crate::dao::{
    league_store::LeagueStore,
    models::{
        AllocationPhase, AuditEntryEntity, BidEntity, BidStatus, MarketCommit,
        PendingAllocationEntity, PlayerContractEntity, PlayerEntity, PlayerTransactionEntity,
        RosterEntryEntity, RoundCommit, RoundEntity, RoundStatus, TeamSeasonEntity,
        TiebreakerEntity,
    },
    storage::StorageResult,
};

const ROUNDS: &str = "rounds";
const BIDS: &str = "bids";
const PLAYERS: &str = "footballplayers";
const TEAM_SEASONS: &str = "team_seasons";
const TEAM_PLAYERS: &str = "team_players";
const TIEBREAKERS: &str = "tiebreakers";
const PENDING_ALLOCATIONS: &str = "pending_allocations";
const CONTRACTS: &str = "player_contracts";
const TRANSACTIONS: &str = "player_transactions";
const AUDIT: &str = "audit_log";

/// MongoDB-backed [`LeagueStore`]. Multi-document commits run inside a client
/// session transaction, which requires a replica set deployment.
#[derive(Clone)]
pub struct MongoLeagueStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

fn millis(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or_default()
}

fn id_filter(id: Uuid) -> Document {
    doc! { "_id": id.to_string() }
}

fn status_str(status: RoundStatus) -> &'static str {
    status.as_str()
}

fn bid_status_str(status: BidStatus) -> &'static str {
    match status {
        BidStatus::Active => "active",
        BidStatus::Won => "won",
        BidStatus::Lost => "lost",
    }
}

fn phase_str(phase: AllocationPhase) -> &'static str {
    match phase {
        AllocationPhase::Regular => "regular",
        AllocationPhase::Incomplete => "incomplete",
    }
}

fn op_err(
    operation: &'static str,
    collection: &'static str,
) -> impl FnOnce(MongoError) -> MongoDaoError {
    move |source| MongoDaoError::Operation {
        operation,
        collection,
        source,
    }
}

fn tx_err(operation: &'static str) -> impl FnOnce(MongoError) -> MongoDaoError {
    move |source| MongoDaoError::Transaction { operation, source }
}

impl MongoLeagueStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let database = self.database().await;
        let indexes: [(&'static str, &'static str, Document, bool); 6] = [
            (BIDS, "round_id,status", doc! {"round_id": 1, "status": 1}, false),
            (TIEBREAKERS, "round_id", doc! {"round_id": 1}, false),
            (
                TEAM_SEASONS,
                "team_id,season_id",
                doc! {"team_id": 1, "season_id": 1},
                true,
            ),
            (PENDING_ALLOCATIONS, "round_id", doc! {"round_id": 1}, false),
            (
                CONTRACTS,
                "player_id,season_id",
                doc! {"player_id": 1, "season_id": 1},
                true,
            ),
            (TRANSACTIONS, "season_id", doc! {"season_id": 1}, false),
        ];

        for (collection, index, keys, unique) in indexes {
            let model = IndexModel::builder()
                .keys(keys)
                .options(
                    IndexOptions::builder()
                        .name(Some(format!("{collection}_{}_idx", index.replace(',', "_"))))
                        .unique(Some(unique))
                        .build(),
                )
                .build();
            database
                .collection::<Document>(collection)
                .create_index(model)
                .await
                .map_err(|source| MongoDaoError::EnsureIndex {
                    collection,
                    index,
                    source,
                })?;
        }
        Ok(())
    }

    async fn database(&self) -> Database {
        let guard = self.inner.state.read().await;
        guard.database.clone()
    }

    async fn client(&self) -> Client {
        let guard = self.inner.state.read().await;
        guard.client.clone()
    }

    async fn collection<T: Send + Sync>(&self, name: &str) -> Collection<T> {
        self.database().await.collection::<T>(name)
    }

    async fn list<T>(&self, name: &'static str, filter: Document, sort: Document) -> MongoResult<Vec<T>>
    where
        T: Send + Sync + serde::de::DeserializeOwned + Unpin,
    {
        self.collection::<T>(name)
            .await
            .find(filter)
            .sort(sort)
            .await
            .map_err(op_err("find", name))?
            .try_collect()
            .await
            .map_err(op_err("find", name))
    }

    async fn find_round(&self, id: Uuid) -> MongoResult<Option<RoundEntity>> {
        self.collection::<RoundEntity>(ROUNDS)
            .await
            .find_one(id_filter(id))
            .await
            .map_err(op_err("find_one", ROUNDS))
    }

    async fn set_round_status(&self, id: Uuid, status: RoundStatus) -> MongoResult<()> {
        let result = self
            .collection::<RoundEntity>(ROUNDS)
            .await
            .update_one(
                id_filter(id),
                doc! {"$set": {"status": status_str(status), "updated_at": millis(SystemTime::now())}},
            )
            .await
            .map_err(op_err("update_one", ROUNDS))?;
        if result.matched_count == 0 {
            return Err(MongoDaoError::MissingRecord {
                what: format!("round {id}"),
            });
        }
        Ok(())
    }

    async fn claim_round_status(
        &self,
        id: Uuid,
        from: Vec<RoundStatus>,
        to: RoundStatus,
    ) -> MongoResult<bool> {
        let from: Vec<&str> = from.into_iter().map(status_str).collect();
        let result = self
            .collection::<RoundEntity>(ROUNDS)
            .await
            .update_one(
                doc! {"_id": id.to_string(), "status": {"$in": from}},
                doc! {"$set": {"status": status_str(to), "updated_at": millis(SystemTime::now())}},
            )
            .await
            .map_err(op_err("update_one", ROUNDS))?;
        Ok(result.modified_count == 1)
    }

    async fn record_tiebreaker_submission(
        &self,
        id: Uuid,
        team_id: String,
        amount: i64,
        at: SystemTime,
    ) -> MongoResult<Option<TiebreakerEntity>> {
        let collection = self.collection::<TiebreakerEntity>(TIEBREAKERS).await;
        let result = collection
            .update_one(
                doc! {
                    "_id": id.to_string(),
                    "status": "active",
                    "teams": {"$elemMatch": {"team_id": &team_id, "submitted": false}},
                },
                doc! {"$set": {
                    "teams.$.submitted": true,
                    "teams.$.new_bid_amount": amount,
                    "teams.$.submitted_at": millis(at),
                }},
            )
            .await
            .map_err(op_err("update_one", TIEBREAKERS))?;
        if result.modified_count == 0 {
            return Ok(None);
        }
        collection
            .find_one(id_filter(id))
            .await
            .map_err(op_err("find_one", TIEBREAKERS))
    }

    async fn close_tiebreaker(&self, tiebreaker: TiebreakerEntity) -> MongoResult<bool> {
        let result = self
            .collection::<TiebreakerEntity>(TIEBREAKERS)
            .await
            .replace_one(
                doc! {"_id": tiebreaker.id.to_string(), "status": "active"},
                &tiebreaker,
            )
            .await
            .map_err(op_err("replace_one", TIEBREAKERS))?;
        Ok(result.matched_count == 1)
    }

    async fn replace_pending_allocations(
        &self,
        round_id: Uuid,
        allocations: Vec<PendingAllocationEntity>,
    ) -> MongoResult<()> {
        self.in_transaction("replace_pending_allocations", |db, session| {
            Box::pin(async move {
                let collection = db.collection::<PendingAllocationEntity>(PENDING_ALLOCATIONS);
                collection
                    .delete_many(doc! {"round_id": round_id.to_string()})
                    .session(&mut *session)
                    .await
                    .map_err(op_err("delete_many", PENDING_ALLOCATIONS))?;
                if !allocations.is_empty() {
                    collection
                        .insert_many(&allocations)
                        .session(&mut *session)
                        .await
                        .map_err(op_err("insert_many", PENDING_ALLOCATIONS))?;
                }
                Ok(())
            })
        })
        .await
    }

    async fn delete_pending_allocations(&self, round_id: Uuid) -> MongoResult<u64> {
        let result = self
            .collection::<PendingAllocationEntity>(PENDING_ALLOCATIONS)
            .await
            .delete_many(doc! {"round_id": round_id.to_string()})
            .await
            .map_err(op_err("delete_many", PENDING_ALLOCATIONS))?;
        Ok(result.deleted_count)
    }

    /// Run `work` inside a transaction, committing on success and aborting on error.
    async fn in_transaction<F>(&self, operation: &'static str, work: F) -> MongoResult<()>
    where
        F: for<'a> FnOnce(
            Database,
            &'a mut ClientSession,
        ) -> BoxFuture<'a, MongoResult<()>>,
    {
        let client = self.client().await;
        let database = self.database().await;
        let mut session = client
            .start_session()
            .await
            .map_err(tx_err("start_session"))?;
        session
            .start_transaction()
            .await
            .map_err(tx_err("start_transaction"))?;

        match work(database, &mut session).await {
            Ok(()) => session
                .commit_transaction()
                .await
                .map_err(tx_err("commit_transaction")),
            Err(err) => {
                if let Err(abort_err) = session.abort_transaction().await {
                    warn!(operation, error = %abort_err, "failed to abort MongoDB transaction");
                }
                Err(err)
            }
        }
    }

    async fn commit_round(&self, commit: RoundCommit) -> MongoResult<()> {
        self.in_transaction("commit_round", |db, session| {
            Box::pin(async move {
                let bids = db.collection::<BidEntity>(BIDS);
                let players = db.collection::<PlayerEntity>(PLAYERS);
                let seasons = db.collection::<TeamSeasonEntity>(TEAM_SEASONS);
                let roster = db.collection::<RosterEntryEntity>(TEAM_PLAYERS);
                let now = millis(commit.committed_at);
                let round_id = commit.round_id.to_string();

                for allocation in &commit.allocations {
                    let actual = match allocation.phase {
                        AllocationPhase::Incomplete => Some(allocation.bid_amount),
                        AllocationPhase::Regular => None,
                    };
                    let updated = bids
                        .update_one(
                            id_filter(allocation.bid_id),
                            doc! {"$set": {
                                "status": bid_status_str(BidStatus::Won),
                                "phase": phase_str(allocation.phase),
                                "actual_bid_amount": actual,
                                "updated_at": now,
                            }},
                        )
                        .session(&mut *session)
                        .await
                        .map_err(op_err("update_one", BIDS))?;
                    if updated.matched_count == 0 {
                        return Err(MongoDaoError::MissingRecord {
                            what: format!("bid {}", allocation.bid_id),
                        });
                    }

                    roster
                        .insert_one(RosterEntryEntity {
                            team_id: allocation.team_id.clone(),
                            player_id: allocation.player_id.clone(),
                            season_id: commit.season_id.clone(),
                            round_id: commit.round_id,
                            purchase_price: allocation.amount,
                            acquired_at: commit.committed_at,
                        })
                        .session(&mut *session)
                        .await
                        .map_err(op_err("insert_one", TEAM_PLAYERS))?;

                    let player = players
                        .find_one_and_update(
                            doc! {"_id": &allocation.player_id},
                            doc! {"$set": {
                                "is_sold": true,
                                "team_id": &allocation.team_id,
                                "acquisition_value": allocation.amount,
                                "season_id": &commit.season_id,
                                "round_id": &round_id,
                            }},
                        )
                        .session(&mut *session)
                        .await
                        .map_err(op_err("find_one_and_update", PLAYERS))?;

                    let season_filter =
                        doc! {"team_id": &allocation.team_id, "season_id": &commit.season_id};
                    let season = seasons
                        .find_one(season_filter.clone())
                        .session(&mut *session)
                        .await
                        .map_err(op_err("find_one", TEAM_SEASONS))?;
                    match season {
                        Some(mut season) => {
                            season.charge_auction(
                                allocation.amount,
                                player.as_ref().map(|player| player.position.as_str()),
                            );
                            seasons
                                .replace_one(season_filter, &season)
                                .session(&mut *session)
                                .await
                                .map_err(op_err("replace_one", TEAM_SEASONS))?;
                        }
                        None => warn!(
                            team_id = %allocation.team_id,
                            season_id = %commit.season_id,
                            "team season record missing; budget not charged"
                        ),
                    }
                }

                bids.update_many(
                    doc! {"round_id": &round_id, "status": bid_status_str(BidStatus::Active)},
                    doc! {"$set": {"status": bid_status_str(BidStatus::Lost), "updated_at": now}},
                )
                .session(&mut *session)
                .await
                .map_err(op_err("update_many", BIDS))?;

                db.collection::<PendingAllocationEntity>(PENDING_ALLOCATIONS)
                    .delete_many(doc! {"round_id": &round_id})
                    .session(&mut *session)
                    .await
                    .map_err(op_err("delete_many", PENDING_ALLOCATIONS))?;

                let completed = db
                    .collection::<RoundEntity>(ROUNDS)
                    .update_one(
                        doc! {"_id": &round_id},
                        doc! {"$set": {"status": status_str(RoundStatus::Completed), "updated_at": now}},
                    )
                    .session(&mut *session)
                    .await
                    .map_err(op_err("update_one", ROUNDS))?;
                if completed.matched_count == 0 {
                    return Err(MongoDaoError::MissingRecord {
                        what: format!("round {round_id}"),
                    });
                }
                Ok(())
            })
        })
        .await
    }

    async fn commit_market(&self, commit: MarketCommit) -> MongoResult<()> {
        self.in_transaction("commit_market", |db, session| {
            Box::pin(async move {
                let seasons = db.collection::<TeamSeasonEntity>(TEAM_SEASONS);
                for change in &commit.budget_changes {
                    let filter = doc! {"team_id": &change.team_id, "season_id": &commit.season_id};
                    let mut season = seasons
                        .find_one(filter.clone())
                        .session(&mut *session)
                        .await
                        .map_err(op_err("find_one", TEAM_SEASONS))?
                        .ok_or_else(|| MongoDaoError::MissingRecord {
                            what: format!("team season {}/{}", change.team_id, commit.season_id),
                        })?;
                    season.apply_budget_change(change);
                    seasons
                        .replace_one(filter, &season)
                        .session(&mut *session)
                        .await
                        .map_err(op_err("replace_one", TEAM_SEASONS))?;
                }

                let contracts = db.collection::<PlayerContractEntity>(CONTRACTS);
                for contract in &commit.contracts {
                    contracts
                        .replace_one(
                            doc! {"player_id": &contract.player_id, "season_id": &contract.season_id},
                            contract,
                        )
                        .upsert(true)
                        .session(&mut *session)
                        .await
                        .map_err(op_err("replace_one", CONTRACTS))?;
                }

                db.collection::<PlayerTransactionEntity>(TRANSACTIONS)
                    .insert_one(&commit.transaction)
                    .session(&mut *session)
                    .await
                    .map_err(op_err("insert_one", TRANSACTIONS))?;
                Ok(())
            })
        })
        .await
    }

    async fn insert<T>(&self, name: &'static str, value: T) -> MongoResult<()>
    where
        T: Send + Sync + serde::Serialize,
    {
        self.collection::<T>(name)
            .await
            .insert_one(&value)
            .await
            .map_err(op_err("insert_one", name))?;
        Ok(())
    }
}

impl LeagueStore for MongoLeagueStore {
    fn insert_round(&self, round: RoundEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert(ROUNDS, round).await.map_err(Into::into) })
    }

    fn find_round(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<RoundEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_round(id).await.map_err(Into::into) })
    }

    fn list_rounds(
        &self,
        season_id: Option<String>,
    ) -> BoxFuture<'static, StorageResult<Vec<RoundEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let filter = match season_id {
                Some(season_id) => doc! {"season_id": season_id},
                None => doc! {},
            };
            store
                .list(ROUNDS, filter, doc! {"created_at": -1})
                .await
                .map_err(Into::into)
        })
    }

    fn list_expired_active_rounds(
        &self,
        now: SystemTime,
    ) -> BoxFuture<'static, StorageResult<Vec<RoundEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .list(
                    ROUNDS,
                    doc! {"status": status_str(RoundStatus::Active), "end_time": {"$lte": millis(now)}},
                    doc! {"end_time": 1},
                )
                .await
                .map_err(Into::into)
        })
    }

    fn set_round_status(
        &self,
        id: Uuid,
        status: RoundStatus,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.set_round_status(id, status).await.map_err(Into::into) })
    }

    fn claim_round_status(
        &self,
        id: Uuid,
        from: Vec<RoundStatus>,
        to: RoundStatus,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .claim_round_status(id, from, to)
                .await
                .map_err(Into::into)
        })
    }

    fn list_bids(
        &self,
        round_id: Uuid,
        status: Option<BidStatus>,
    ) -> BoxFuture<'static, StorageResult<Vec<BidEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let mut filter = doc! {"round_id": round_id.to_string()};
            if let Some(status) = status {
                filter.insert("status", bid_status_str(status));
            }
            store
                .list(BIDS, filter, doc! {"created_at": 1})
                .await
                .map_err(Into::into)
        })
    }

    fn find_players(
        &self,
        ids: Vec<String>,
    ) -> BoxFuture<'static, StorageResult<Vec<PlayerEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .list(PLAYERS, doc! {"_id": {"$in": ids}}, doc! {})
                .await
                .map_err(Into::into)
        })
    }

    fn find_team_seasons(
        &self,
        season_id: String,
        team_ids: Vec<String>,
    ) -> BoxFuture<'static, StorageResult<Vec<TeamSeasonEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .list(
                    TEAM_SEASONS,
                    doc! {"season_id": season_id, "team_id": {"$in": team_ids}},
                    doc! {},
                )
                .await
                .map_err(Into::into)
        })
    }

    fn insert_tiebreaker(
        &self,
        tiebreaker: TiebreakerEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .insert(TIEBREAKERS, tiebreaker)
                .await
                .map_err(Into::into)
        })
    }

    fn find_tiebreaker(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<TiebreakerEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .collection::<TiebreakerEntity>(TIEBREAKERS)
                .await
                .find_one(id_filter(id))
                .await
                .map_err(op_err("find_one", TIEBREAKERS))
                .map_err(Into::into)
        })
    }

    fn list_tiebreakers(
        &self,
        round_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<TiebreakerEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .list(
                    TIEBREAKERS,
                    doc! {"round_id": round_id.to_string()},
                    doc! {"created_at": 1},
                )
                .await
                .map_err(Into::into)
        })
    }

    fn list_active_tiebreakers_for_team(
        &self,
        team_id: String,
    ) -> BoxFuture<'static, StorageResult<Vec<TiebreakerEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .list(
                    TIEBREAKERS,
                    doc! {"status": "active", "teams.team_id": team_id},
                    doc! {"created_at": -1},
                )
                .await
                .map_err(Into::into)
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
            store
                .record_tiebreaker_submission(id, team_id, amount, at)
                .await
                .map_err(Into::into)
        })
    }

    fn close_tiebreaker(
        &self,
        tiebreaker: TiebreakerEntity,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.close_tiebreaker(tiebreaker).await.map_err(Into::into) })
    }

    fn replace_pending_allocations(
        &self,
        round_id: Uuid,
        allocations: Vec<PendingAllocationEntity>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .replace_pending_allocations(round_id, allocations)
                .await
                .map_err(Into::into)
        })
    }

    fn list_pending_allocations(
        &self,
        round_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<PendingAllocationEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .list(
                    PENDING_ALLOCATIONS,
                    doc! {"round_id": round_id.to_string()},
                    doc! {"amount": -1},
                )
                .await
                .map_err(Into::into)
        })
    }

    fn delete_pending_allocations(
        &self,
        round_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .delete_pending_allocations(round_id)
                .await
                .map_err(Into::into)
        })
    }

    fn commit_round(&self, commit: RoundCommit) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.commit_round(commit).await.map_err(Into::into) })
    }

    fn find_contract(
        &self,
        player_id: String,
        season_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<PlayerContractEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .collection::<PlayerContractEntity>(CONTRACTS)
                .await
                .find_one(doc! {"player_id": player_id, "season_id": season_id})
                .await
                .map_err(op_err("find_one", CONTRACTS))
                .map_err(Into::into)
        })
    }

    fn count_team_transactions(
        &self,
        team_id: String,
        season_id: String,
    ) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .collection::<PlayerTransactionEntity>(TRANSACTIONS)
                .await
                .count_documents(doc! {"season_id": season_id, "team_ids": team_id})
                .await
                .map_err(op_err("count_documents", TRANSACTIONS))
                .map_err(Into::into)
        })
    }

    fn list_transactions(
        &self,
        season_id: String,
    ) -> BoxFuture<'static, StorageResult<Vec<PlayerTransactionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .list(
                    TRANSACTIONS,
                    doc! {"season_id": season_id},
                    doc! {"created_at": -1},
                )
                .await
                .map_err(Into::into)
        })
    }

    fn commit_market(&self, commit: MarketCommit) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.commit_market(commit).await.map_err(Into::into) })
    }

    fn insert_audit(&self, entry: AuditEntryEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert(AUDIT, entry).await.map_err(Into::into) })
    }

    fn list_audit(&self, limit: usize) -> BoxFuture<'static, StorageResult<Vec<AuditEntryEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .collection::<AuditEntryEntity>(AUDIT)
                .await
                .find(doc! {})
                .sort(doc! {"created_at": -1})
                .limit(limit as i64)
                .await
                .map_err(op_err("find", AUDIT))?
                .try_collect()
                .await
                .map_err(op_err("find", AUDIT))
                .map_err(Into::into)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
