//! Round finalization: gather a round's bids, run the allocation, open a
//! tiebreaker when the allocation stops on a tie, and commit results.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::SystemTime,
};

use indexmap::IndexMap;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::{
    dao::{
        league_store::LeagueStore,
        models::{
            AllocationRecord, BidStatus, PendingAllocationEntity, RoundCommit, RoundEntity,
            RoundStatus, TeamSeasonEntity, TiebreakerEntity, TiebreakerStatus,
        },
    },
    error::ServiceError,
    services::{
        allocation::{
            self, Allocation, AllocationOutcome, CandidateBid, TeamBreakdown, classify_teams,
        },
        sse_events, tiebreaker_service,
    },
    state::SharedState,
};

/// Result of finalizing a round, before anything is applied.
#[derive(Debug, Clone)]
pub enum FinalizationResult {
    /// Every eligible team was processed.
    Allocated {
        /// Allocations in the order they were made.
        allocations: Vec<Allocation>,
        /// Price charged to incomplete teams, if any.
        average_price: Option<i64>,
    },
    /// Allocation stopped on a tie; a tiebreaker is open.
    TieDetected {
        /// Open tiebreaker, newly created or already existing.
        tiebreaker: TiebreakerEntity,
        /// Bids sharing the top amount.
        tied_bids: Vec<CandidateBid>,
    },
    /// The round received no active bids.
    NoBids,
}

/// Dry run of the allocation with its full decision trace.
#[derive(Debug, Clone)]
pub struct StepPreview {
    /// Round previewed.
    pub round: RoundEntity,
    /// Team classification.
    pub breakdown: TeamBreakdown,
    /// Allocation outcome with steps.
    pub outcome: AllocationOutcome,
    /// Tiebreaker already open for the round, if any.
    pub open_tiebreaker: Option<Uuid>,
}

struct RoundInputs {
    bids: Vec<CandidateBid>,
    tiebreakers: Vec<TiebreakerEntity>,
}

async fn load_inputs(
    store: &Arc<dyn LeagueStore>,
    round: &RoundEntity,
) -> Result<RoundInputs, ServiceError> {
    let mut bids = store.list_bids(round.id, Some(BidStatus::Active)).await?;
    bids.sort_by(|a, b| a.created_at.cmp(&b.created_at));

    let mut player_ids: Vec<String> = Vec::new();
    let mut team_ids: Vec<String> = Vec::new();
    let mut seen_players = HashSet::new();
    let mut seen_teams = HashSet::new();
    for bid in &bids {
        if seen_players.insert(bid.player_id.clone()) {
            player_ids.push(bid.player_id.clone());
        }
        if seen_teams.insert(bid.team_id.clone()) {
            team_ids.push(bid.team_id.clone());
        }
    }

    let player_names: HashMap<String, String> = store
        .find_players(player_ids)
        .await?
        .into_iter()
        .map(|player| (player.id, player.name))
        .collect();
    let team_names: HashMap<String, String> = store
        .find_team_seasons(round.season_id.clone(), team_ids)
        .await?
        .into_iter()
        .map(|season| (season.team_id, season.team_name))
        .collect();

    let bids = bids
        .into_iter()
        .map(|bid| CandidateBid {
            bid_id: bid.id,
            team_name: team_names
                .get(&bid.team_id)
                .cloned()
                .unwrap_or_else(|| bid.team_id.clone()),
            player_name: player_names
                .get(&bid.player_id)
                .cloned()
                .unwrap_or_else(|| bid.player_id.clone()),
            team_id: bid.team_id,
            player_id: bid.player_id,
            amount: bid.amount,
            original_amount: bid.amount,
        })
        .collect();

    let tiebreakers = store.list_tiebreakers(round.id).await?;
    Ok(RoundInputs { bids, tiebreakers })
}

/// Bids taking part in an already open tiebreaker.
fn bids_in_tiebreaker(bids: &[CandidateBid], tiebreaker: &TiebreakerEntity) -> Vec<CandidateBid> {
    bids.iter()
        .filter(|bid| bid.player_id == tiebreaker.player_id)
        .filter(|bid| {
            tiebreaker
                .teams
                .iter()
                .any(|team| team.original_bid_id == bid.bid_id || team.team_id == bid.team_id)
        })
        .cloned()
        .collect()
}

/// Compute the allocations of `round`, opening a tiebreaker when the allocation
/// stops on a tie. Nothing is applied.
pub async fn finalize_round(
    state: &SharedState,
    store: &Arc<dyn LeagueStore>,
    round: &RoundEntity,
) -> Result<FinalizationResult, ServiceError> {
    let inputs = load_inputs(store, round).await?;
    if inputs.bids.is_empty() {
        info!(round_id = %round.id, "round has no active bids");
        return Ok(FinalizationResult::NoBids);
    }

    if let Some(open) = inputs
        .tiebreakers
        .iter()
        .find(|tb| tb.status == TiebreakerStatus::Active)
    {
        return Ok(FinalizationResult::TieDetected {
            tied_bids: bids_in_tiebreaker(&inputs.bids, open),
            tiebreaker: open.clone(),
        });
    }

    match allocation::allocate(
        round.max_bids_per_team,
        &inputs.bids,
        &inputs.tiebreakers,
        state.config().incomplete_default_amount,
    ) {
        AllocationOutcome::Completed {
            allocations,
            average_price,
            ..
        } => {
            info!(
                round_id = %round.id,
                allocations = allocations.len(),
                average_price = ?average_price,
                "round allocation computed"
            );
            Ok(FinalizationResult::Allocated {
                allocations,
                average_price,
            })
        }
        AllocationOutcome::TieDetected {
            player_id,
            tied_bids,
            ..
        } => {
            info!(round_id = %round.id, player_id, tied = tied_bids.len(), "tie detected");
            let tiebreaker =
                tiebreaker_service::create_tiebreaker(state, store, round.id, &tied_bids).await?;
            Ok(FinalizationResult::TieDetected {
                tiebreaker,
                tied_bids,
            })
        }
    }
}

/// Dry run of the allocation for a round. Never opens a tiebreaker.
pub async fn preview_steps(
    state: &SharedState,
    round_id: Uuid,
) -> Result<StepPreview, ServiceError> {
    let store = state.require_store().await?;
    let round = store
        .find_round(round_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Round not found".into()))?;

    let inputs = load_inputs(&store, &round).await?;
    let open_tiebreaker = inputs
        .tiebreakers
        .iter()
        .find(|tb| tb.status == TiebreakerStatus::Active)
        .map(|tb| tb.id);
    let breakdown = classify_teams(round.max_bids_per_team, &inputs.bids);
    let outcome = allocation::allocate(
        round.max_bids_per_team,
        &inputs.bids,
        &inputs.tiebreakers,
        state.config().incomplete_default_amount,
    );

    Ok(StepPreview {
        round,
        breakdown,
        outcome,
        open_tiebreaker,
    })
}

impl From<&Allocation> for AllocationRecord {
    fn from(value: &Allocation) -> Self {
        Self {
            bid_id: value.bid_id,
            team_id: value.team_id.clone(),
            player_id: value.player_id.clone(),
            amount: value.amount,
            bid_amount: value.bid_amount,
            phase: value.phase,
        }
    }
}

impl From<&PendingAllocationEntity> for AllocationRecord {
    fn from(value: &PendingAllocationEntity) -> Self {
        Self {
            bid_id: value.bid_id,
            team_id: value.team_id.clone(),
            player_id: value.player_id.clone(),
            amount: value.amount,
            bid_amount: value.bid_amount,
            phase: value.phase,
        }
    }
}

/// Apply allocations to the store in one atomic commit and complete the round.
pub async fn apply_finalization_results(
    state: &SharedState,
    store: &Arc<dyn LeagueStore>,
    round: &RoundEntity,
    allocations: Vec<AllocationRecord>,
) -> Result<(), ServiceError> {
    let count = allocations.len();
    let total_spent: i64 = allocations.iter().map(|allocation| allocation.amount).sum();

    store
        .commit_round(RoundCommit {
            round_id: round.id,
            season_id: round.season_id.clone(),
            allocations,
            committed_at: SystemTime::now(),
        })
        .await?;

    info!(round_id = %round.id, allocations = count, total_spent, "round finalized");
    sse_events::broadcast_round_updated(state, round, RoundStatus::Completed);
    sse_events::broadcast_round_finalized(state, round, count, total_spent);
    Ok(())
}

/// Team charge to check before applying allocations.
#[derive(Debug, Clone)]
pub struct BudgetCharge {
    /// Team charged.
    pub team_id: String,
    /// Team display name.
    pub team_name: String,
    /// Amount charged.
    pub amount: i64,
}

/// Check every team can afford its charges; all shortfalls are reported together.
pub fn validate_budgets(
    seasons: &[TeamSeasonEntity],
    charges: &[BudgetCharge],
) -> Result<(), ServiceError> {
    let mut required: IndexMap<&str, (&str, i64)> = IndexMap::new();
    for charge in charges {
        let entry = required
            .entry(charge.team_id.as_str())
            .or_insert((charge.team_name.as_str(), 0));
        entry.1 += charge.amount;
    }

    let mut errors = Vec::new();
    for (team_id, (team_name, amount)) in required {
        match seasons.iter().find(|season| season.team_id == team_id) {
            None => errors.push(json!({
                "team_id": team_id,
                "team_name": team_name,
                "required": amount,
                "message": format!("{team_name} has no budget record for this season"),
            })),
            Some(season) => {
                let available = season.auction_budget();
                if (amount as f64) > available {
                    errors.push(json!({
                        "team_id": team_id,
                        "team_name": team_name,
                        "required": amount,
                        "available": available,
                        "message": format!(
                            "{team_name} needs {amount} but only has {available:.2}"
                        ),
                    }));
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ServiceError::Rejected {
            code: "BUDGET_VALIDATION_FAILED",
            message: format!("{} team(s) cannot afford their allocations", errors.len()),
            details: Some(json!({ "type": "budget", "errors": errors })),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dao::{
            league_store::memory::MemoryLeagueStore,
            models::{AllocationPhase, CurrencySystem, FinalizationMode},
        },
        services::fixtures::{bid, memory_state, round, seed_round, team_season},
    };

    fn charge(team: &str, amount: i64) -> BudgetCharge {
        BudgetCharge {
            team_id: team.into(),
            team_name: format!("Team {team}"),
            amount,
        }
    }

    #[test]
    fn budgets_are_checked_all_at_once() {
        let seasons = vec![team_season("A", 100.0), team_season("B", 1000.0)];
        let err = validate_budgets(
            &seasons,
            &[charge("A", 150), charge("B", 200), charge("C", 10)],
        )
        .unwrap_err();

        match err {
            ServiceError::Rejected { code, details, .. } => {
                assert_eq!(code, "BUDGET_VALIDATION_FAILED");
                let details = details.unwrap();
                assert_eq!(details["type"], "budget");
                let errors = details["errors"].as_array().unwrap();
                assert_eq!(errors.len(), 2);
                assert_eq!(errors[0]["team_id"], "A");
                assert_eq!(errors[1]["team_id"], "C");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn dual_currency_teams_use_football_budget() {
        let mut dual = team_season("A", 0.0);
        dual.currency_system = CurrencySystem::Dual;
        dual.football_budget = Some(500.0);
        assert!(validate_budgets(&[dual], &[charge("A", 400)]).is_ok());
    }

    async fn seeded() -> (SharedState, MemoryLeagueStore, RoundEntity) {
        let (state, memory) = memory_state().await;
        let round = round(RoundStatus::Finalizing, Some(FinalizationMode::Auto), true);
        seed_round(&memory, &round).await;
        (state, memory, round)
    }

    #[tokio::test]
    async fn finalize_and_apply_updates_everything() {
        let (state, memory, round) = seeded().await;
        memory.put_bid(bid(&round, "A", "p1", 300, 0)).await;
        memory.put_bid(bid(&round, "B", "p1", 200, 1)).await;
        let store = state.require_store().await.unwrap();

        let FinalizationResult::Allocated { allocations, .. } =
            finalize_round(&state, &store, &round).await.unwrap()
        else {
            panic!("expected allocations");
        };
        assert_eq!(allocations.len(), 1);
        assert_eq!(allocations[0].player_name, "Keeper One");
        assert_eq!(allocations[0].team_name, "Team A");

        let records = allocations.iter().map(AllocationRecord::from).collect();
        apply_finalization_results(&state, &store, &round, records)
            .await
            .unwrap();

        let a = memory.team_season("A", "S1").await.unwrap();
        assert_eq!(a.budget, 700.0);
        assert_eq!(a.players_count, 1);
        assert_eq!(a.position_counts.get("GK"), Some(&1));
        assert!(memory.player("p1").await.unwrap().is_sold);
        assert_eq!(memory.roster("A").await.len(), 1);

        let bids = memory.bids(round.id).await;
        let won = bids.iter().find(|b| b.team_id == "A").unwrap();
        let lost = bids.iter().find(|b| b.team_id == "B").unwrap();
        assert_eq!(won.status, BidStatus::Won);
        assert_eq!(won.phase, Some(AllocationPhase::Regular));
        assert_eq!(lost.status, BidStatus::Lost);

        let stored = store.find_round(round.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RoundStatus::Completed);
    }

    #[tokio::test]
    async fn tie_opens_a_single_tiebreaker() {
        let (state, memory, round) = seeded().await;
        memory.put_bid(bid(&round, "A", "p1", 250, 0)).await;
        memory.put_bid(bid(&round, "B", "p1", 250, 1)).await;
        let store = state.require_store().await.unwrap();

        let first = finalize_round(&state, &store, &round).await.unwrap();
        let FinalizationResult::TieDetected { tiebreaker, tied_bids } = first else {
            panic!("expected a tie");
        };
        assert_eq!(tied_bids.len(), 2);
        assert_eq!(tiebreaker.original_amount, 250);
        assert_eq!(tiebreaker.teams.len(), 2);

        let again = finalize_round(&state, &store, &round).await.unwrap();
        let FinalizationResult::TieDetected { tiebreaker: same, tied_bids } = again else {
            panic!("expected the open tie");
        };
        assert_eq!(same.id, tiebreaker.id);
        assert_eq!(tied_bids.len(), 2);
        assert_eq!(store.list_tiebreakers(round.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn no_bids_is_reported() {
        let (state, _memory, round) = seeded().await;
        let store = state.require_store().await.unwrap();
        assert!(matches!(
            finalize_round(&state, &store, &round).await.unwrap(),
            FinalizationResult::NoBids
        ));
    }

    #[tokio::test]
    async fn dry_run_never_creates_tiebreakers() {
        let (state, memory, round) = seeded().await;
        memory.put_bid(bid(&round, "A", "p1", 250, 0)).await;
        memory.put_bid(bid(&round, "B", "p1", 250, 1)).await;

        let preview = preview_steps(&state, round.id).await.unwrap();
        assert!(matches!(preview.outcome, AllocationOutcome::TieDetected { .. }));
        assert_eq!(preview.breakdown.complete, vec!["A".to_string(), "B".to_string()]);
        let store = state.require_store().await.unwrap();
        assert!(store.list_tiebreakers(round.id).await.unwrap().is_empty());
    }
}
