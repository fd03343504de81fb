//! Transfer market: single-player transfers and two-player swaps between teams.

use std::{sync::Arc, time::SystemTime};

use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::{
    dao::{
        league_store::LeagueStore,
        models::{
            BudgetChange, MarketCommit, PlayerContractEntity, PlayerTransactionEntity, PlayerType,
            TeamSeasonEntity, TransactionKind,
        },
    },
    dto::transfer::{
        BudgetCheck, ContractParty, SwapOutcome, SwapRequest, TransactionView, TransferLimitStatus,
        TransferOutcome, TransferRequest,
    },
    error::ServiceError,
    services::{
        audit_service::{self, AuditRecord},
        transfer_calc::{self, CalcError, CashDirection, ContractFigures},
    },
    state::SharedState,
};

fn calc_error(err: CalcError) -> ServiceError {
    let code = match err {
        CalcError::CashOverLimit { .. } => "INVALID_CASH_AMOUNT",
        _ => "CALCULATION_FAILED",
    };
    ServiceError::rejected(code, err.to_string())
}

fn figures(contract: &PlayerContractEntity) -> ContractFigures {
    ContractFigures {
        value: contract.auction_value,
        star_rating: contract.star_rating,
        points: contract.points,
        player_type: contract.player_type,
    }
}

async fn load_contract(
    store: &Arc<dyn LeagueStore>,
    player_id: &str,
    player_type: PlayerType,
    season_id: &str,
) -> Result<PlayerContractEntity, ServiceError> {
    store
        .find_contract(player_id.to_owned(), season_id.to_owned())
        .await?
        .filter(|contract| contract.player_type == player_type)
        .ok_or_else(|| {
            ServiceError::rejected(
                "PLAYER_NOT_FOUND",
                format!("Player {player_id} has no contract for season {season_id}"),
            )
        })
}

async fn limit_for(
    state: &SharedState,
    store: &Arc<dyn LeagueStore>,
    team_id: &str,
    season_id: &str,
) -> Result<TransferLimitStatus, ServiceError> {
    let used = store
        .count_team_transactions(team_id.to_owned(), season_id.to_owned())
        .await?;
    Ok(TransferLimitStatus::new(
        team_id.to_owned(),
        season_id.to_owned(),
        u32::try_from(used).unwrap_or(u32::MAX),
        state.config().max_transfers_per_season,
    ))
}

fn ensure_limit(status: &TransferLimitStatus) -> Result<(), ServiceError> {
    if status.can_transfer {
        return Ok(());
    }
    Err(ServiceError::Rejected {
        code: "TRANSFER_LIMIT_EXCEEDED",
        message: format!(
            "Team {} has used all {} transfers for season {}",
            status.team_id, status.limit, status.season_id
        ),
        details: Some(json!({
            "team_id": status.team_id,
            "used": status.used,
            "limit": status.limit,
        })),
    })
}

async fn load_season(
    store: &Arc<dyn LeagueStore>,
    team_id: &str,
    season_id: &str,
) -> Result<Option<TeamSeasonEntity>, ServiceError> {
    Ok(store
        .find_team_seasons(season_id.to_owned(), vec![team_id.to_owned()])
        .await?
        .into_iter()
        .next())
}

fn budget_check(
    team_id: &str,
    season: Option<&TeamSeasonEntity>,
    player_type: PlayerType,
    required: f64,
) -> BudgetCheck {
    let available = season.and_then(|season| season.market_budget(player_type));
    BudgetCheck {
        team_id: team_id.to_owned(),
        player_type,
        available,
        required,
        sufficient: available.is_some_and(|available| available >= required),
    }
}

fn ensure_budget(check: &BudgetCheck, season: Option<&TeamSeasonEntity>) -> Result<(), ServiceError> {
    if season.is_none() {
        return Err(ServiceError::rejected(
            "BUDGET_VALIDATION_FAILED",
            format!("Team {} has no record for this season", check.team_id),
        ));
    }
    let line = match check.player_type {
        PlayerType::Real => "real_player_budget",
        PlayerType::Football => "football_budget",
    };
    match check.available {
        None => Err(ServiceError::rejected(
            "BUDGET_FIELD_MISSING",
            format!("Team {} has no {line}", check.team_id),
        )),
        Some(available) if !check.sufficient => Err(ServiceError::Rejected {
            code: "BUDGET_VALIDATION_FAILED",
            message: format!(
                "Team {} has insufficient budget: needs {:.2}, has {:.2}",
                check.team_id, check.required, available
            ),
            details: Some(json!({
                "team_id": check.team_id,
                "budget_field": line,
                "required": check.required,
                "available": available,
            })),
        }),
        Some(_) => Ok(()),
    }
}

/// Transfers used and left for a team in a season.
pub async fn transfer_limit_status(
    state: &SharedState,
    team_id: &str,
    season_id: &str,
) -> Result<TransferLimitStatus, ServiceError> {
    let store = state.require_store().await?;
    limit_for(state, &store, team_id, season_id).await
}

/// Evaluate a transfer. With `enforce`, limits and budgets become errors.
async fn evaluate_transfer(
    state: &SharedState,
    store: &Arc<dyn LeagueStore>,
    request: &TransferRequest,
    enforce: bool,
) -> Result<(PlayerContractEntity, TransferOutcome), ServiceError> {
    let contract = load_contract(
        store,
        &request.player_id,
        request.player_type,
        &request.season_id,
    )
    .await?;
    if contract.team_id == request.new_team_id {
        return Err(ServiceError::rejected(
            "SAME_TEAM",
            format!("Player already belongs to team {}", request.new_team_id),
        ));
    }

    let selling_team_limit = limit_for(state, store, &contract.team_id, &request.season_id).await?;
    let buying_team_limit = limit_for(state, store, &request.new_team_id, &request.season_id).await?;
    if enforce {
        ensure_limit(&selling_team_limit)?;
        ensure_limit(&buying_team_limit)?;
    }

    let calculation = transfer_calc::transfer(figures(&contract)).map_err(calc_error)?;

    let buyer = load_season(store, &request.new_team_id, &request.season_id).await?;
    let buying_team_budget = budget_check(
        &request.new_team_id,
        buyer.as_ref(),
        contract.player_type,
        calculation.buying_team_pays,
    );
    if enforce {
        ensure_budget(&buying_team_budget, buyer.as_ref())?;
    }

    let outcome = TransferOutcome {
        transaction_id: None,
        player: ContractParty {
            player_id: contract.player_id.clone(),
            player_name: contract.player_name.clone(),
            player_type: contract.player_type,
            from_team_id: contract.team_id.clone(),
            to_team_id: request.new_team_id.clone(),
        },
        calculation,
        buying_team_budget,
        selling_team_limit,
        buying_team_limit,
    };
    Ok((contract, outcome))
}

/// Calculate a transfer without changing anything.
pub async fn preview_transfer(
    state: &SharedState,
    request: &TransferRequest,
) -> Result<TransferOutcome, ServiceError> {
    let store = state.require_store().await?;
    let (_, outcome) = evaluate_transfer(state, &store, request, false).await?;
    Ok(outcome)
}

fn revalued(
    contract: PlayerContractEntity,
    team_id: &str,
    player: &transfer_calc::PlayerRevaluation,
) -> PlayerContractEntity {
    PlayerContractEntity {
        team_id: team_id.to_owned(),
        auction_value: player.new_value,
        star_rating: player.new_star_rating,
        points: player.new_points,
        salary_per_match: player.new_salary,
        ..contract
    }
}

/// Move a player to another team, charging the buyer and paying the seller.
pub async fn execute_transfer(
    state: &SharedState,
    request: TransferRequest,
    actor: &str,
) -> Result<TransferOutcome, ServiceError> {
    let store = state.require_store().await?;
    let (contract, mut outcome) = evaluate_transfer(state, &store, &request, true).await?;
    let calculation = outcome.calculation;
    let player_type = contract.player_type;
    let selling_team = contract.team_id.clone();

    let transaction_id = Uuid::new_v4();
    outcome.transaction_id = Some(transaction_id);
    let transaction = PlayerTransactionEntity {
        id: transaction_id,
        season_id: request.season_id.clone(),
        kind: TransactionKind::Transfer,
        team_ids: vec![selling_team.clone(), request.new_team_id.clone()],
        player_ids: vec![contract.player_id.clone()],
        details: serde_json::to_value(&outcome).unwrap_or_default(),
        performed_by: actor.to_owned(),
        created_at: SystemTime::now(),
    };

    store
        .commit_market(MarketCommit {
            season_id: request.season_id.clone(),
            contracts: vec![revalued(contract, &request.new_team_id, &calculation.player)],
            budget_changes: vec![
                BudgetChange {
                    team_id: request.new_team_id.clone(),
                    player_type,
                    budget_delta: -calculation.buying_team_pays,
                    spent_delta: calculation.player.new_value,
                },
                BudgetChange {
                    team_id: selling_team.clone(),
                    player_type,
                    budget_delta: calculation.selling_team_receives,
                    spent_delta: -calculation.player.original_value,
                },
            ],
            transaction,
        })
        .await?;

    info!(
        %transaction_id,
        player_id = %request.player_id,
        from = %selling_team,
        to = %request.new_team_id,
        new_value = calculation.player.new_value,
        "transfer executed"
    );
    audit_service::record(
        state,
        AuditRecord {
            action: "execute_transfer",
            actor,
            round_id: None,
            season_id: Some(&request.season_id),
            success: true,
            detail: json!({
                "transaction_id": transaction_id,
                "player_id": request.player_id,
                "from_team_id": selling_team,
                "to_team_id": request.new_team_id,
            }),
        },
    )
    .await;

    Ok(outcome)
}

struct SwapPlan {
    contract_a: PlayerContractEntity,
    contract_b: PlayerContractEntity,
    outcome: SwapOutcome,
}

async fn evaluate_swap(
    state: &SharedState,
    store: &Arc<dyn LeagueStore>,
    request: &SwapRequest,
    enforce: bool,
) -> Result<SwapPlan, ServiceError> {
    if request.player_a_id == request.player_b_id {
        return Err(ServiceError::rejected(
            "SAME_PLAYER",
            "Cannot swap a player with themselves",
        ));
    }
    let contract_a = load_contract(
        store,
        &request.player_a_id,
        request.player_a_type,
        &request.season_id,
    )
    .await?;
    let contract_b = load_contract(
        store,
        &request.player_b_id,
        request.player_b_type,
        &request.season_id,
    )
    .await?;
    if contract_a.team_id == contract_b.team_id {
        return Err(ServiceError::rejected(
            "SAME_TEAM_SWAP",
            format!("Both players belong to team {}", contract_a.team_id),
        ));
    }

    let team_a_limit = limit_for(state, store, &contract_a.team_id, &request.season_id).await?;
    let team_b_limit = limit_for(state, store, &contract_b.team_id, &request.season_id).await?;
    if enforce {
        ensure_limit(&team_a_limit)?;
        ensure_limit(&team_b_limit)?;
    }

    let calculation = transfer_calc::swap(
        figures(&contract_a),
        figures(&contract_b),
        request.cash_amount,
        request.cash_direction,
    )
    .map_err(calc_error)?;

    // Each team is charged on the line of the player it receives.
    let season_a = load_season(store, &contract_a.team_id, &request.season_id).await?;
    let season_b = load_season(store, &contract_b.team_id, &request.season_id).await?;
    let team_a_budget = budget_check(
        &contract_a.team_id,
        season_a.as_ref(),
        contract_b.player_type,
        calculation.team_a_pays,
    );
    let team_b_budget = budget_check(
        &contract_b.team_id,
        season_b.as_ref(),
        contract_a.player_type,
        calculation.team_b_pays,
    );
    if enforce {
        ensure_budget(&team_a_budget, season_a.as_ref())?;
        ensure_budget(&team_b_budget, season_b.as_ref())?;
    }

    let outcome = SwapOutcome {
        transaction_id: None,
        player_a: ContractParty {
            player_id: contract_a.player_id.clone(),
            player_name: contract_a.player_name.clone(),
            player_type: contract_a.player_type,
            from_team_id: contract_a.team_id.clone(),
            to_team_id: contract_b.team_id.clone(),
        },
        player_b: ContractParty {
            player_id: contract_b.player_id.clone(),
            player_name: contract_b.player_name.clone(),
            player_type: contract_b.player_type,
            from_team_id: contract_b.team_id.clone(),
            to_team_id: contract_a.team_id.clone(),
        },
        calculation,
        team_a_budget,
        team_b_budget,
        team_a_limit,
        team_b_limit,
    };
    Ok(SwapPlan {
        contract_a,
        contract_b,
        outcome,
    })
}

/// Calculate a swap without changing anything.
pub async fn preview_swap(
    state: &SharedState,
    request: &SwapRequest,
) -> Result<SwapOutcome, ServiceError> {
    let store = state.require_store().await?;
    Ok(evaluate_swap(state, &store, request, false).await?.outcome)
}

/// Budget movements of one side of a swap.
fn swap_side(
    team_id: &str,
    released: &PlayerContractEntity,
    received_type: PlayerType,
    received_new_value: f64,
    pays: f64,
    cash_received: f64,
) -> Vec<BudgetChange> {
    let mut changes = vec![
        BudgetChange {
            team_id: team_id.to_owned(),
            player_type: released.player_type,
            budget_delta: released.auction_value,
            spent_delta: -released.auction_value,
        },
        BudgetChange {
            team_id: team_id.to_owned(),
            player_type: received_type,
            budget_delta: -pays,
            spent_delta: received_new_value,
        },
    ];
    if cash_received > 0.0 {
        changes.push(BudgetChange {
            team_id: team_id.to_owned(),
            player_type: released.player_type,
            budget_delta: cash_received,
            spent_delta: 0.0,
        });
    }
    changes
}

/// Exchange two players between their teams.
pub async fn execute_swap(
    state: &SharedState,
    request: SwapRequest,
    actor: &str,
) -> Result<SwapOutcome, ServiceError> {
    let store = state.require_store().await?;
    let SwapPlan {
        contract_a,
        contract_b,
        mut outcome,
    } = evaluate_swap(state, &store, &request, true).await?;
    let calculation = outcome.calculation;
    let team_a = contract_a.team_id.clone();
    let team_b = contract_b.team_id.clone();

    let (cash_to_a, cash_to_b) = match calculation.cash_direction {
        CashDirection::AToB => (0.0, calculation.cash_amount),
        CashDirection::BToA => (calculation.cash_amount, 0.0),
        CashDirection::None => (0.0, 0.0),
    };
    let mut budget_changes = swap_side(
        &team_a,
        &contract_a,
        contract_b.player_type,
        calculation.player_b.new_value,
        calculation.team_a_pays,
        cash_to_a,
    );
    budget_changes.extend(swap_side(
        &team_b,
        &contract_b,
        contract_a.player_type,
        calculation.player_a.new_value,
        calculation.team_b_pays,
        cash_to_b,
    ));

    let transaction_id = Uuid::new_v4();
    outcome.transaction_id = Some(transaction_id);
    let transaction = PlayerTransactionEntity {
        id: transaction_id,
        season_id: request.season_id.clone(),
        kind: TransactionKind::Swap,
        team_ids: vec![team_a.clone(), team_b.clone()],
        player_ids: vec![contract_a.player_id.clone(), contract_b.player_id.clone()],
        details: serde_json::to_value(&outcome).unwrap_or_default(),
        performed_by: actor.to_owned(),
        created_at: SystemTime::now(),
    };

    store
        .commit_market(MarketCommit {
            season_id: request.season_id.clone(),
            contracts: vec![
                revalued(contract_a, &team_b, &calculation.player_a),
                revalued(contract_b, &team_a, &calculation.player_b),
            ],
            budget_changes,
            transaction,
        })
        .await?;

    info!(
        %transaction_id,
        player_a = %request.player_a_id,
        player_b = %request.player_b_id,
        %team_a,
        %team_b,
        cash = calculation.cash_amount,
        "swap executed"
    );
    audit_service::record(
        state,
        AuditRecord {
            action: "execute_swap",
            actor,
            round_id: None,
            season_id: Some(&request.season_id),
            success: true,
            detail: json!({
                "transaction_id": transaction_id,
                "player_a_id": request.player_a_id,
                "player_b_id": request.player_b_id,
                "cash_amount": calculation.cash_amount,
                "cash_direction": calculation.cash_direction,
            }),
        },
    )
    .await;

    Ok(outcome)
}

/// Market operations of a season, newest first.
pub async fn transaction_history(
    state: &SharedState,
    season_id: &str,
) -> Result<Vec<TransactionView>, ServiceError> {
    let store = state.require_store().await?;
    let mut transactions = store.list_transactions(season_id.to_owned()).await?;
    transactions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(transactions.into_iter().map(Into::into).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dao::league_store::memory::MemoryLeagueStore,
        services::fixtures::{SEASON, contract, market_season, memory_state, team_season},
    };

    fn transfer_request(player: &str, to: &str) -> TransferRequest {
        TransferRequest {
            player_id: player.into(),
            player_type: PlayerType::Real,
            new_team_id: to.into(),
            season_id: SEASON.into(),
        }
    }

    fn swap_request(cash: f64, direction: CashDirection) -> SwapRequest {
        SwapRequest {
            player_a_id: "PA".into(),
            player_a_type: PlayerType::Real,
            player_b_id: "PB".into(),
            player_b_type: PlayerType::Real,
            cash_amount: cash,
            cash_direction: direction,
            season_id: SEASON.into(),
        }
    }

    async fn market() -> (SharedState, MemoryLeagueStore) {
        let (state, memory) = memory_state().await;
        for team in ["T1", "T2"] {
            let mut season = market_season(team, 1000.0, 1000.0);
            season.real_player_spent = 500.0;
            memory.put_team_season(season).await;
        }
        memory
            .put_contract(contract("PA", "T1", PlayerType::Real, 225.0, 5, 192))
            .await;
        memory
            .put_contract(contract("PB", "T2", PlayerType::Real, 300.0, 6, 180))
            .await;
        (state, memory)
    }

    async fn burn_transfers(memory: &MemoryLeagueStore, team: &str, count: usize) {
        for _ in 0..count {
            memory
                .put_transaction(PlayerTransactionEntity {
                    id: Uuid::new_v4(),
                    season_id: SEASON.into(),
                    kind: TransactionKind::Transfer,
                    team_ids: vec![team.into(), "OTHER".into()],
                    player_ids: vec!["X".into()],
                    details: json!({}),
                    performed_by: "committee".into(),
                    created_at: SystemTime::now(),
                })
                .await;
        }
    }

    #[tokio::test]
    async fn transfer_moves_contract_and_money() {
        let (state, memory) = market().await;
        let outcome = execute_transfer(&state, transfer_request("PA", "T2"), "committee")
            .await
            .unwrap();
        assert!(outcome.transaction_id.is_some());
        assert_eq!(outcome.calculation.buying_team_pays, 309.38);

        let buyer = memory.team_season("T2", SEASON).await.unwrap();
        assert_eq!(buyer.real_player_budget, Some(690.62));
        assert_eq!(buyer.real_player_spent, 781.25);
        let seller = memory.team_season("T1", SEASON).await.unwrap();
        assert_eq!(seller.real_player_budget, Some(1253.12));
        assert_eq!(seller.real_player_spent, 275.0);

        let store = state.require_store().await.unwrap();
        let moved = store
            .find_contract("PA".into(), SEASON.into())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(moved.team_id, "T2");
        assert_eq!(moved.auction_value, 281.25);
        assert_eq!(moved.star_rating, 6);
        assert_eq!(moved.points, 203);
        assert_eq!(moved.salary_per_match, 1.97);

        let history = transaction_history(&state, SEASON).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].team_ids, vec!["T1".to_string(), "T2".to_string()]);
        let limit = transfer_limit_status(&state, "T1", SEASON).await.unwrap();
        assert_eq!(limit.used, 1);
        assert_eq!(limit.remaining, 1);
    }

    #[tokio::test]
    async fn transfer_error_codes() {
        let (state, memory) = market().await;

        let mut wrong_type = transfer_request("PA", "T2");
        wrong_type.player_type = PlayerType::Football;
        let cases = [
            (transfer_request("NOPE", "T2"), "PLAYER_NOT_FOUND"),
            (wrong_type, "PLAYER_NOT_FOUND"),
            (transfer_request("PA", "T1"), "SAME_TEAM"),
            (transfer_request("PA", "T3"), "BUDGET_VALIDATION_FAILED"),
        ];
        for (request, code) in cases {
            let err = execute_transfer(&state, request, "committee")
                .await
                .unwrap_err();
            assert_eq!(err.code(), Some(code));
        }

        memory.put_team_season(team_season("T4", 5000.0)).await;
        let err = execute_transfer(&state, transfer_request("PA", "T4"), "committee")
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some("BUDGET_FIELD_MISSING"));

        memory.put_team_season(market_season("T5", 100.0, 0.0)).await;
        let err = execute_transfer(&state, transfer_request("PA", "T5"), "committee")
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some("BUDGET_VALIDATION_FAILED"));

        // Nothing was committed along the way.
        assert!(transaction_history(&state, SEASON).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn seller_limit_is_checked_first() {
        let (state, memory) = market().await;
        burn_transfers(&memory, "T1", 2).await;
        let err = execute_transfer(&state, transfer_request("PA", "T2"), "committee")
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some("TRANSFER_LIMIT_EXCEEDED"));

        let preview = preview_transfer(&state, &transfer_request("PA", "T2"))
            .await
            .unwrap();
        assert!(!preview.selling_team_limit.can_transfer);
        assert!(preview.buying_team_limit.can_transfer);
        assert!(preview.transaction_id.is_none());
    }

    #[tokio::test]
    async fn swap_exchanges_players_and_cash() {
        let (state, memory) = market().await;
        let outcome = execute_swap(
            &state,
            swap_request(50.0, CashDirection::AToB),
            "committee",
        )
        .await
        .unwrap();
        assert_eq!(outcome.calculation.team_a_pays, 110.0);
        assert_eq!(outcome.calculation.team_b_pays, 50.0);

        let t1 = memory.team_season("T1", SEASON).await.unwrap();
        assert_eq!(t1.real_player_budget, Some(1115.0));
        assert_eq!(t1.real_player_spent, 665.0);
        let t2 = memory.team_season("T2", SEASON).await.unwrap();
        assert_eq!(t2.real_player_budget, Some(1300.0));
        assert_eq!(t2.real_player_spent, 481.25);

        let store = state.require_store().await.unwrap();
        let pa = store
            .find_contract("PA".into(), SEASON.into())
            .await
            .unwrap()
            .unwrap();
        let pb = store
            .find_contract("PB".into(), SEASON.into())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pa.team_id, "T2");
        assert_eq!(pb.team_id, "T1");
        assert_eq!(pb.auction_value, 390.0);
        assert_eq!(
            transfer_limit_status(&state, "T2", SEASON).await.unwrap().used,
            1
        );
    }

    #[tokio::test]
    async fn swap_error_codes() {
        let (state, memory) = market().await;

        let mut same = swap_request(0.0, CashDirection::None);
        same.player_b_id = "PA".into();
        let err = execute_swap(&state, same, "committee").await.unwrap_err();
        assert_eq!(err.code(), Some("SAME_PLAYER"));

        let err = execute_swap(&state, swap_request(91.0, CashDirection::BToA), "committee")
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some("INVALID_CASH_AMOUNT"));

        memory
            .put_contract(contract("PC", "T1", PlayerType::Real, 100.0, 3, 100))
            .await;
        let mut same_team = swap_request(0.0, CashDirection::None);
        same_team.player_b_id = "PC".into();
        let err = execute_swap(&state, same_team, "committee")
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some("SAME_TEAM_SWAP"));

        burn_transfers(&memory, "T2", 2).await;
        let err = execute_swap(&state, swap_request(0.0, CashDirection::None), "committee")
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some("TRANSFER_LIMIT_EXCEEDED"));
    }
}
