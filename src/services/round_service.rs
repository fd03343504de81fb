//! Round lifecycle: creation, lazy finalization on status checks, immediate
//! finalization and the manual preview/apply workflow.

use std::{
    collections::HashSet,
    sync::Arc,
    time::{Duration, SystemTime},
};

use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        league_store::LeagueStore,
        models::{
            AllocationRecord, FinalizationMode, PendingAllocationEntity, RoundEntity, RoundStatus,
            TiebreakerStatus,
        },
    },
    dto::round::{
        AllocationSummary, ApplyAllocationsResponse, CancelAllocationsResponse,
        CreateRoundRequest, FinalizeStepsResponse, PendingAllocationsResponse,
        PreviewFinalizationResponse, RoundCheckOutcome, RoundCheckResponse, RoundSummary,
    },
    error::ServiceError,
    services::{
        allocation::AllocationOutcome,
        audit_service::{self, AuditRecord},
        finalization::{self, BudgetCharge, FinalizationResult},
        sse_events,
    },
    state::SharedState,
};

async fn load_round(store: &Arc<dyn LeagueStore>, id: Uuid) -> Result<RoundEntity, ServiceError> {
    store
        .find_round(id)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Round not found".into()))
}

/// Create a round accepting bids from now on.
pub async fn create_round(
    state: &SharedState,
    request: CreateRoundRequest,
    actor: &str,
) -> Result<RoundSummary, ServiceError> {
    let store = state.require_store().await?;
    let now = SystemTime::now();
    let round = RoundEntity {
        id: Uuid::new_v4(),
        season_id: request.season_id,
        position: request.position,
        max_bids_per_team: request.max_bids_per_team,
        status: RoundStatus::Active,
        finalization_mode: Some(request.finalization_mode.unwrap_or_default()),
        start_time: now,
        end_time: now + Duration::from_secs(u64::from(request.duration_minutes) * 60),
        created_at: now,
        updated_at: now,
    };
    store.insert_round(round.clone()).await?;

    info!(round_id = %round.id, season_id = %round.season_id, position = %round.position, "round created");
    sse_events::broadcast_round_updated(state, &round, RoundStatus::Active);
    audit_service::record(
        state,
        AuditRecord {
            action: "create_round",
            actor,
            round_id: Some(round.id),
            season_id: Some(&round.season_id),
            success: true,
            detail: json!({
                "position": round.position,
                "max_bids_per_team": round.max_bids_per_team,
                "finalization_mode": round.mode(),
            }),
        },
    )
    .await;

    Ok(round.into())
}

/// Rounds, optionally restricted to one season.
pub async fn list_rounds(
    state: &SharedState,
    season_id: Option<String>,
) -> Result<Vec<RoundSummary>, ServiceError> {
    let store = state.require_store().await?;
    let rounds = store.list_rounds(season_id).await?;
    Ok(rounds.into_iter().map(Into::into).collect())
}

/// Summary of a single round.
pub async fn get_round(state: &SharedState, id: Uuid) -> Result<RoundSummary, ServiceError> {
    let store = state.require_store().await?;
    Ok(load_round(&store, id).await?.into())
}

async fn open_tiebreaker_id(
    store: &Arc<dyn LeagueStore>,
    round_id: Uuid,
) -> Result<Option<Uuid>, ServiceError> {
    Ok(store
        .list_tiebreakers(round_id)
        .await?
        .into_iter()
        .find(|tb| tb.status == TiebreakerStatus::Active)
        .map(|tb| tb.id))
}

/// Lazy finalization hook run on status polls and by the auto-finalizer.
pub async fn check_and_finalize_expired_round(
    state: &SharedState,
    round_id: Uuid,
) -> Result<RoundCheckResponse, ServiceError> {
    let store = state.require_store().await?;
    let round = load_round(&store, round_id).await?;

    match round.status {
        RoundStatus::Completed => Ok(RoundCheckResponse::new(
            round_id,
            RoundCheckOutcome::AlreadyFinalized,
            "Round already finalized",
        )),
        RoundStatus::ExpiredPendingFinalization | RoundStatus::PendingFinalization => {
            Ok(RoundCheckResponse::new(
                round_id,
                RoundCheckOutcome::PendingManualFinalization,
                "Round is waiting for committee finalization",
            ))
        }
        RoundStatus::TiebreakerPending => Ok(RoundCheckResponse::tiebreaker_pending(
            round_id,
            open_tiebreaker_id(&store, round_id).await?,
        )),
        RoundStatus::Finalizing => Ok(RoundCheckResponse::new(
            round_id,
            RoundCheckOutcome::InProgress,
            "Round is being finalized",
        )),
        RoundStatus::Active if !round.is_expired_at(SystemTime::now()) => {
            Ok(RoundCheckResponse::new(
                round_id,
                RoundCheckOutcome::NotExpired,
                "Round is still accepting bids",
            ))
        }
        RoundStatus::Active => match round.mode() {
            FinalizationMode::Manual => {
                if store
                    .claim_round_status(
                        round_id,
                        vec![RoundStatus::Active],
                        RoundStatus::ExpiredPendingFinalization,
                    )
                    .await?
                {
                    info!(%round_id, "manual round expired; waiting for committee");
                    sse_events::broadcast_round_updated(
                        state,
                        &round,
                        RoundStatus::ExpiredPendingFinalization,
                    );
                }
                Ok(RoundCheckResponse::new(
                    round_id,
                    RoundCheckOutcome::PendingManualFinalization,
                    "Round expired and awaits committee finalization",
                ))
            }
            FinalizationMode::Auto => {
                if !store
                    .claim_round_status(round_id, vec![RoundStatus::Active], RoundStatus::Finalizing)
                    .await?
                {
                    info!(%round_id, "finalization claim lost to another finalizer");
                    return Ok(RoundCheckResponse::new(
                        round_id,
                        RoundCheckOutcome::AlreadyFinalized,
                        "Round is already being finalized",
                    ));
                }
                sse_events::broadcast_round_updated(state, &round, RoundStatus::Finalizing);
                run_claimed_finalization(state, &store, &round, RoundStatus::Active).await
            }
        },
    }
}

async fn release_claim(
    state: &SharedState,
    store: &Arc<dyn LeagueStore>,
    round: &RoundEntity,
    status: RoundStatus,
) {
    match store.set_round_status(round.id, status).await {
        Ok(()) => sse_events::broadcast_round_updated(state, round, status),
        Err(err) => error!(
            round_id = %round.id,
            status = status.as_str(),
            error = %err,
            "failed to release finalization claim"
        ),
    }
}

/// Finalize and apply a round already moved to `finalizing` by the caller.
/// On failure the round goes back to `release_to`.
async fn run_claimed_finalization(
    state: &SharedState,
    store: &Arc<dyn LeagueStore>,
    round: &RoundEntity,
    release_to: RoundStatus,
) -> Result<RoundCheckResponse, ServiceError> {
    let records: Vec<AllocationRecord> = match finalization::finalize_round(state, store, round)
        .await
    {
        Ok(FinalizationResult::Allocated { allocations, .. }) => {
            allocations.iter().map(AllocationRecord::from).collect()
        }
        Ok(FinalizationResult::NoBids) => Vec::new(),
        Ok(FinalizationResult::TieDetected { tiebreaker, .. }) => {
            if let Err(err) = store
                .set_round_status(round.id, RoundStatus::TiebreakerPending)
                .await
            {
                warn!(round_id = %round.id, error = %err, "moving round to tiebreaker failed");
                release_claim(state, store, round, release_to).await;
                return Err(err.into());
            }
            sse_events::broadcast_round_updated(state, round, RoundStatus::TiebreakerPending);
            return Ok(RoundCheckResponse::tiebreaker_pending(
                round.id,
                Some(tiebreaker.id),
            ));
        }
        Err(err) => {
            warn!(round_id = %round.id, error = %err, "round finalization failed");
            release_claim(state, store, round, release_to).await;
            return Err(err);
        }
    };

    let count = records.len();
    if let Err(err) =
        finalization::apply_finalization_results(state, store, round, records).await
    {
        warn!(round_id = %round.id, error = %err, "applying allocations failed");
        release_claim(state, store, round, release_to).await;
        return Err(err);
    }
    Ok(RoundCheckResponse::finalized(round.id, count))
}

/// Continue a round once its last tiebreaker is closed.
///
/// Manual rounds go back to `expired_pending_finalization`. Automatic rounds are
/// finalized and applied. Returns the resulting status, or `None` when another
/// task already moved the round.
pub async fn resume_after_tiebreaker(
    state: &SharedState,
    store: &Arc<dyn LeagueStore>,
    round: RoundEntity,
) -> Result<Option<RoundStatus>, ServiceError> {
    match round.mode() {
        FinalizationMode::Manual => {
            let target = RoundStatus::ExpiredPendingFinalization;
            if !store
                .claim_round_status(round.id, vec![RoundStatus::TiebreakerPending], target)
                .await?
            {
                return Ok(None);
            }
            info!(round_id = %round.id, "tiebreakers settled; round back to committee review");
            sse_events::broadcast_round_updated(state, &round, target);
            Ok(Some(target))
        }
        FinalizationMode::Auto => {
            if !store
                .claim_round_status(
                    round.id,
                    vec![RoundStatus::TiebreakerPending],
                    RoundStatus::Finalizing,
                )
                .await?
            {
                return Ok(None);
            }
            let response =
                run_claimed_finalization(state, store, &round, RoundStatus::TiebreakerPending)
                    .await?;
            Ok(Some(match response.outcome {
                RoundCheckOutcome::TiebreakerPending => RoundStatus::TiebreakerPending,
                _ => RoundStatus::Completed,
            }))
        }
    }
}

/// Committee "finalize immediately" action.
pub async fn finalize_now(
    state: &SharedState,
    round_id: Uuid,
    actor: &str,
) -> Result<RoundCheckResponse, ServiceError> {
    let store = state.require_store().await?;
    let round = load_round(&store, round_id).await?;
    match round.status {
        RoundStatus::Completed => {
            return Err(ServiceError::InvalidState("Round already finalized".into()));
        }
        RoundStatus::PendingFinalization => {
            return Err(ServiceError::InvalidState(
                "Round has pending allocations; apply or cancel them first".into(),
            ));
        }
        RoundStatus::Finalizing => {
            return Err(ServiceError::InvalidState(
                "Round is already being finalized".into(),
            ));
        }
        _ => {}
    }

    let previous = round.status;
    if !store
        .claim_round_status(round_id, vec![previous], RoundStatus::Finalizing)
        .await?
    {
        return Err(ServiceError::InvalidState(
            "Round status changed concurrently".into(),
        ));
    }
    sse_events::broadcast_round_updated(state, &round, RoundStatus::Finalizing);

    let result = run_claimed_finalization(state, &store, &round, previous).await;
    audit_service::record(
        state,
        AuditRecord {
            action: "finalize_round",
            actor,
            round_id: Some(round_id),
            season_id: Some(&round.season_id),
            success: result.is_ok(),
            detail: match &result {
                Ok(response) => json!({
                    "outcome": response.outcome,
                    "allocations": response.allocations,
                    "tiebreaker_id": response.tiebreaker_id,
                }),
                Err(err) => json!({ "error": err.to_string() }),
            },
        },
    )
    .await;
    result
}

/// Dry run of the allocation with its step trace.
pub async fn finalize_steps(
    state: &SharedState,
    round_id: Uuid,
) -> Result<FinalizeStepsResponse, ServiceError> {
    let preview = finalization::preview_steps(state, round_id).await?;
    let (tie_detected, allocations, average_price, tied_bids, steps) = match preview.outcome {
        AllocationOutcome::Completed {
            allocations,
            average_price,
            steps,
        } => (false, allocations, average_price, Vec::new(), steps),
        AllocationOutcome::TieDetected {
            tied_bids,
            allocations,
            steps,
            ..
        } => (true, allocations, None, tied_bids, steps),
    };

    Ok(FinalizeStepsResponse {
        round_id,
        status: preview.round.status,
        required_bids: preview.round.max_bids_per_team,
        complete_teams: preview.breakdown.complete,
        incomplete_teams: preview.breakdown.incomplete,
        tie_detected,
        allocations,
        average_price,
        tied_bids,
        steps,
        open_tiebreaker_id: preview.open_tiebreaker,
    })
}

/// Compute and store the allocations of a manual round for committee review.
pub async fn preview_finalization(
    state: &SharedState,
    round_id: Uuid,
    actor: &str,
) -> Result<PreviewFinalizationResponse, ServiceError> {
    let store = state.require_store().await?;
    let round = load_round(&store, round_id).await?;

    if round.mode() != FinalizationMode::Manual {
        return Err(ServiceError::InvalidState(
            "Preview is only available for rounds in manual finalization mode".into(),
        ));
    }
    match round.status {
        RoundStatus::Completed => {
            return Err(ServiceError::InvalidState("Round already finalized".into()));
        }
        RoundStatus::PendingFinalization => {
            return Err(ServiceError::InvalidState(
                "Round already has pending allocations; apply or cancel them first".into(),
            ));
        }
        RoundStatus::Finalizing => {
            return Err(ServiceError::InvalidState(
                "Round is already being finalized".into(),
            ));
        }
        RoundStatus::Active if !round.is_expired_at(SystemTime::now()) => {
            return Err(ServiceError::InvalidState("Round has not ended yet".into()));
        }
        _ => {}
    }

    let previous = round.status;
    if !store
        .claim_round_status(round_id, vec![previous], RoundStatus::Finalizing)
        .await?
    {
        return Err(ServiceError::InvalidState(
            "Round status changed concurrently".into(),
        ));
    }

    let result = match finalization::finalize_round(state, &store, &round).await {
        Ok(result) => result,
        Err(err) => {
            release_claim(state, &store, &round, previous).await;
            return Err(err);
        }
    };

    // Nothing left to allocate once tiebreakers excluded every contested player.
    let result = match result {
        FinalizationResult::Allocated { allocations, .. } if allocations.is_empty() => {
            FinalizationResult::NoBids
        }
        other => other,
    };

    let response = match result {
        FinalizationResult::TieDetected {
            tiebreaker,
            tied_bids,
        } => {
            if let Err(err) = store
                .set_round_status(round_id, RoundStatus::TiebreakerPending)
                .await
            {
                release_claim(state, &store, &round, previous).await;
                return Err(err.into());
            }
            sse_events::broadcast_round_updated(state, &round, RoundStatus::TiebreakerPending);
            PreviewFinalizationResponse {
                round_id,
                status: RoundStatus::TiebreakerPending,
                allocations: Vec::new(),
                summary: AllocationSummary::default(),
                tiebreaker_id: Some(tiebreaker.id),
                tied_bids,
            }
        }
        FinalizationResult::NoBids => {
            if let Err(err) =
                finalization::apply_finalization_results(state, &store, &round, Vec::new()).await
            {
                release_claim(state, &store, &round, previous).await;
                return Err(err);
            }
            PreviewFinalizationResponse {
                round_id,
                status: RoundStatus::Completed,
                allocations: Vec::new(),
                summary: AllocationSummary::default(),
                tiebreaker_id: None,
                tied_bids: Vec::new(),
            }
        }
        FinalizationResult::Allocated { allocations, .. } => {
            let now = SystemTime::now();
            let pending = allocations
                .iter()
                .map(|allocation| PendingAllocationEntity {
                    id: Uuid::new_v4(),
                    round_id,
                    team_id: allocation.team_id.clone(),
                    team_name: allocation.team_name.clone(),
                    player_id: allocation.player_id.clone(),
                    player_name: allocation.player_name.clone(),
                    amount: allocation.amount,
                    bid_amount: allocation.bid_amount,
                    bid_id: allocation.bid_id,
                    phase: allocation.phase,
                    created_at: now,
                })
                .collect();
            if let Err(err) = store.replace_pending_allocations(round_id, pending).await {
                release_claim(state, &store, &round, previous).await;
                return Err(err.into());
            }
            if let Err(err) = store
                .set_round_status(round_id, RoundStatus::PendingFinalization)
                .await
            {
                if let Err(cleanup) = store.delete_pending_allocations(round_id).await {
                    warn!(%round_id, error = %cleanup, "failed to discard pending allocations");
                }
                release_claim(state, &store, &round, previous).await;
                return Err(err.into());
            }
            sse_events::broadcast_round_updated(state, &round, RoundStatus::PendingFinalization);

            let summary = AllocationSummary::from_amounts(allocations.iter().map(|a| a.amount));
            PreviewFinalizationResponse {
                round_id,
                status: RoundStatus::PendingFinalization,
                allocations,
                summary,
                tiebreaker_id: None,
                tied_bids: Vec::new(),
            }
        }
    };

    info!(%round_id, status = response.status.as_str(), "finalization previewed");
    audit_service::record(
        state,
        AuditRecord {
            action: "preview_finalization",
            actor,
            round_id: Some(round_id),
            season_id: Some(&round.season_id),
            success: true,
            detail: json!({
                "status": response.status,
                "allocations": response.summary.total_players,
                "total_spent": response.summary.total_spent,
                "tiebreaker_id": response.tiebreaker_id,
            }),
        },
    )
    .await;
    Ok(response)
}

/// Stored allocations of a round, highest amount first.
pub async fn pending_allocations(
    state: &SharedState,
    round_id: Uuid,
) -> Result<PendingAllocationsResponse, ServiceError> {
    let store = state.require_store().await?;
    load_round(&store, round_id).await?;
    let mut pending = store.list_pending_allocations(round_id).await?;
    pending.sort_by(|a, b| b.amount.cmp(&a.amount));

    Ok(PendingAllocationsResponse {
        round_id,
        summary: AllocationSummary::from_amounts(pending.iter().map(|p| p.amount)),
        allocations: pending.into_iter().map(Into::into).collect(),
    })
}

/// Drop previewed allocations and send the round back to committee review.
pub async fn cancel_pending_allocations(
    state: &SharedState,
    round_id: Uuid,
    actor: &str,
) -> Result<CancelAllocationsResponse, ServiceError> {
    let store = state.require_store().await?;
    let round = load_round(&store, round_id).await?;
    if store.list_pending_allocations(round_id).await?.is_empty() {
        return Err(ServiceError::InvalidInput(
            "No pending allocations to cancel".into(),
        ));
    }

    let cancelled = store.delete_pending_allocations(round_id).await?;
    let status = RoundStatus::ExpiredPendingFinalization;
    store.set_round_status(round_id, status).await?;
    sse_events::broadcast_round_updated(state, &round, status);

    info!(%round_id, cancelled, "pending allocations cancelled");
    audit_service::record(
        state,
        AuditRecord {
            action: "cancel_pending_allocations",
            actor,
            round_id: Some(round_id),
            season_id: Some(&round.season_id),
            success: true,
            detail: json!({ "cancelled": cancelled }),
        },
    )
    .await;

    Ok(CancelAllocationsResponse {
        round_id,
        status,
        cancelled,
    })
}

/// Apply previewed allocations once every team is known to afford them.
pub async fn apply_pending_allocations(
    state: &SharedState,
    round_id: Uuid,
    actor: &str,
) -> Result<ApplyAllocationsResponse, ServiceError> {
    let store = state.require_store().await?;
    let round = load_round(&store, round_id).await?;
    match round.status {
        RoundStatus::PendingFinalization => {}
        RoundStatus::Completed => {
            return Err(ServiceError::InvalidState("Round already finalized".into()));
        }
        _ => {
            return Err(ServiceError::InvalidState(
                "Round has no previewed allocations to apply".into(),
            ));
        }
    }

    let pending = store.list_pending_allocations(round_id).await?;
    if pending.is_empty() {
        return Err(ServiceError::InvalidInput(
            "No pending allocations to apply".into(),
        ));
    }

    let mut seen = HashSet::new();
    let team_ids: Vec<String> = pending
        .iter()
        .filter(|p| seen.insert(p.team_id.as_str()))
        .map(|p| p.team_id.clone())
        .collect();
    let seasons = store
        .find_team_seasons(round.season_id.clone(), team_ids)
        .await?;
    let charges: Vec<BudgetCharge> = pending
        .iter()
        .map(|p| BudgetCharge {
            team_id: p.team_id.clone(),
            team_name: p.team_name.clone(),
            amount: p.amount,
        })
        .collect();
    if let Err(err) = finalization::validate_budgets(&seasons, &charges) {
        warn!(%round_id, error = %err, "pending allocations rejected by budget validation");
        audit_service::record(
            state,
            AuditRecord {
                action: "apply_pending_allocations",
                actor,
                round_id: Some(round_id),
                season_id: Some(&round.season_id),
                success: false,
                detail: json!({ "error": err.to_string(), "code": err.code() }),
            },
        )
        .await;
        return Err(err);
    }

    if !store
        .claim_round_status(
            round_id,
            vec![RoundStatus::PendingFinalization],
            RoundStatus::Finalizing,
        )
        .await?
    {
        return Err(ServiceError::InvalidState(
            "Allocations are already being applied".into(),
        ));
    }

    let summary = AllocationSummary::from_amounts(pending.iter().map(|p| p.amount));
    let records = pending.iter().map(AllocationRecord::from).collect();
    if let Err(err) = finalization::apply_finalization_results(state, &store, &round, records).await
    {
        release_claim(state, &store, &round, RoundStatus::PendingFinalization).await;
        return Err(err);
    }

    audit_service::record(
        state,
        AuditRecord {
            action: "apply_pending_allocations",
            actor,
            round_id: Some(round_id),
            season_id: Some(&round.season_id),
            success: true,
            detail: json!({
                "allocations": summary.total_players,
                "total_spent": summary.total_spent,
            }),
        },
    )
    .await;

    Ok(ApplyAllocationsResponse {
        round_id,
        status: RoundStatus::Completed,
        summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dao::models::BidStatus,
        dto::tiebreaker::ResolutionMode,
        services::{
            fixtures::{bid, memory_state, round, seed_round, team_season},
            tiebreaker_service,
        },
    };

    async fn status_of(state: &SharedState, id: Uuid) -> RoundStatus {
        let store = state.require_store().await.unwrap();
        store.find_round(id).await.unwrap().unwrap().status
    }

    #[tokio::test]
    async fn missing_round_is_not_found() {
        let (state, _) = memory_state().await;
        let err = check_and_finalize_expired_round(&state, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(message) if message == "Round not found"));
    }

    #[tokio::test]
    async fn status_only_outcomes() {
        let cases = [
            (RoundStatus::Completed, true, RoundCheckOutcome::AlreadyFinalized),
            (
                RoundStatus::ExpiredPendingFinalization,
                true,
                RoundCheckOutcome::PendingManualFinalization,
            ),
            (
                RoundStatus::PendingFinalization,
                true,
                RoundCheckOutcome::PendingManualFinalization,
            ),
            (RoundStatus::TiebreakerPending, true, RoundCheckOutcome::TiebreakerPending),
            (RoundStatus::Finalizing, true, RoundCheckOutcome::InProgress),
            (RoundStatus::Active, false, RoundCheckOutcome::NotExpired),
        ];
        let (state, memory) = memory_state().await;
        for (status, expired, expected) in cases {
            let round = round(status, None, expired);
            memory.insert_round(round.clone()).await.unwrap();
            let response = check_and_finalize_expired_round(&state, round.id)
                .await
                .unwrap();
            assert_eq!(response.outcome, expected, "status {status:?}");
            assert_eq!(status_of(&state, round.id).await, status);
        }
    }

    #[tokio::test]
    async fn expired_manual_round_waits_for_committee() {
        let (state, memory) = memory_state().await;
        let round = round(RoundStatus::Active, Some(FinalizationMode::Manual), true);
        seed_round(&memory, &round).await;
        memory.put_bid(bid(&round, "A", "p1", 300, 0)).await;

        let response = check_and_finalize_expired_round(&state, round.id)
            .await
            .unwrap();
        assert_eq!(response.outcome, RoundCheckOutcome::PendingManualFinalization);
        assert_eq!(
            status_of(&state, round.id).await,
            RoundStatus::ExpiredPendingFinalization
        );
        assert_eq!(memory.bids(round.id).await[0].status, BidStatus::Active);
    }

    #[tokio::test]
    async fn expired_auto_round_is_finalized() {
        let (state, memory) = memory_state().await;
        // Missing mode behaves as auto.
        let round = round(RoundStatus::Active, None, true);
        seed_round(&memory, &round).await;
        memory.put_bid(bid(&round, "A", "p1", 300, 0)).await;
        memory.put_bid(bid(&round, "B", "p2", 200, 1)).await;

        let response = check_and_finalize_expired_round(&state, round.id)
            .await
            .unwrap();
        assert_eq!(response.outcome, RoundCheckOutcome::Finalized);
        assert_eq!(response.allocations, Some(2));
        assert_eq!(status_of(&state, round.id).await, RoundStatus::Completed);

        let again = check_and_finalize_expired_round(&state, round.id)
            .await
            .unwrap();
        assert_eq!(again.outcome, RoundCheckOutcome::AlreadyFinalized);
    }

    #[tokio::test]
    async fn expired_auto_round_without_bids_completes() {
        let (state, memory) = memory_state().await;
        let round = round(RoundStatus::Active, Some(FinalizationMode::Auto), true);
        seed_round(&memory, &round).await;

        let response = check_and_finalize_expired_round(&state, round.id)
            .await
            .unwrap();
        assert_eq!(response.outcome, RoundCheckOutcome::Finalized);
        assert_eq!(response.allocations, Some(0));
        assert_eq!(status_of(&state, round.id).await, RoundStatus::Completed);
    }

    #[tokio::test]
    async fn concurrent_checks_finalize_once() {
        let (state, memory) = memory_state().await;
        let round = round(RoundStatus::Active, Some(FinalizationMode::Auto), true);
        seed_round(&memory, &round).await;
        memory.put_bid(bid(&round, "A", "p1", 300, 0)).await;

        let (first, second) = tokio::join!(
            check_and_finalize_expired_round(&state, round.id),
            check_and_finalize_expired_round(&state, round.id),
        );
        let outcomes = [first.unwrap().outcome, second.unwrap().outcome];
        let finalized = outcomes
            .iter()
            .filter(|o| **o == RoundCheckOutcome::Finalized)
            .count();
        assert_eq!(finalized, 1);
        assert!(outcomes.iter().all(|o| matches!(
            o,
            RoundCheckOutcome::Finalized
                | RoundCheckOutcome::AlreadyFinalized
                | RoundCheckOutcome::InProgress
        )));
        assert_eq!(memory.roster("A").await.len(), 1);
    }

    #[tokio::test]
    async fn tie_then_resolution_finishes_auto_round() {
        let (state, memory) = memory_state().await;
        let round = round(RoundStatus::Active, Some(FinalizationMode::Auto), true);
        seed_round(&memory, &round).await;
        memory.put_bid(bid(&round, "A", "p1", 250, 0)).await;
        memory.put_bid(bid(&round, "B", "p1", 250, 1)).await;

        let response = check_and_finalize_expired_round(&state, round.id)
            .await
            .unwrap();
        assert_eq!(response.outcome, RoundCheckOutcome::TiebreakerPending);
        assert_eq!(status_of(&state, round.id).await, RoundStatus::TiebreakerPending);
        let tiebreaker_id = response.tiebreaker_id.unwrap();

        tiebreaker_service::submit(&state, "A", tiebreaker_id, 300)
            .await
            .unwrap();
        let submission = tiebreaker_service::submit(&state, "B", tiebreaker_id, 280)
            .await
            .unwrap();
        let resolution = submission.resolution.unwrap();
        assert_eq!(resolution.round_status, Some(RoundStatus::Completed));

        let a = memory.team_season("A", "S1").await.unwrap();
        assert_eq!(a.budget, 700.0);
        assert_eq!(memory.roster("B").await.len(), 0);
        assert_eq!(status_of(&state, round.id).await, RoundStatus::Completed);
    }

    #[tokio::test]
    async fn failed_status_write_releases_the_claim() {
        let (state, memory) = memory_state().await;
        let round = round(RoundStatus::Active, Some(FinalizationMode::Auto), true);
        seed_round(&memory, &round).await;
        memory.put_bid(bid(&round, "A", "p1", 250, 0)).await;
        memory.put_bid(bid(&round, "B", "p1", 250, 1)).await;
        memory.refuse_status(RoundStatus::TiebreakerPending).await;

        let err = check_and_finalize_expired_round(&state, round.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Unavailable(_)));
        assert_eq!(status_of(&state, round.id).await, RoundStatus::Active);
    }

    #[tokio::test]
    async fn failed_preview_tie_write_restores_review_status() {
        let (state, memory) = memory_state().await;
        let round = round(
            RoundStatus::ExpiredPendingFinalization,
            Some(FinalizationMode::Manual),
            true,
        );
        seed_round(&memory, &round).await;
        memory.put_bid(bid(&round, "A", "p1", 250, 0)).await;
        memory.put_bid(bid(&round, "B", "p1", 250, 1)).await;
        memory.refuse_status(RoundStatus::TiebreakerPending).await;

        assert!(preview_finalization(&state, round.id, "committee").await.is_err());
        assert_eq!(
            status_of(&state, round.id).await,
            RoundStatus::ExpiredPendingFinalization
        );
    }

    #[tokio::test]
    async fn failed_preview_status_write_discards_pending_allocations() {
        let (state, memory) = memory_state().await;
        let round = round(
            RoundStatus::ExpiredPendingFinalization,
            Some(FinalizationMode::Manual),
            true,
        );
        seed_round(&memory, &round).await;
        memory.put_bid(bid(&round, "A", "p1", 300, 0)).await;
        memory.refuse_status(RoundStatus::PendingFinalization).await;

        assert!(preview_finalization(&state, round.id, "committee").await.is_err());
        assert_eq!(
            status_of(&state, round.id).await,
            RoundStatus::ExpiredPendingFinalization
        );
        assert!(pending_allocations(&state, round.id).await.unwrap().allocations.is_empty());
    }

    #[tokio::test]
    async fn excluded_tie_returns_manual_round_to_review() {
        let (state, memory) = memory_state().await;
        let round = round(
            RoundStatus::ExpiredPendingFinalization,
            Some(FinalizationMode::Manual),
            true,
        );
        seed_round(&memory, &round).await;
        memory.put_bid(bid(&round, "A", "p1", 250, 0)).await;
        memory.put_bid(bid(&round, "B", "p1", 250, 1)).await;

        let preview = preview_finalization(&state, round.id, "committee")
            .await
            .unwrap();
        assert_eq!(preview.status, RoundStatus::TiebreakerPending);
        assert_eq!(preview.tied_bids.len(), 2);

        let resolution =
            tiebreaker_service::resolve(&state, preview.tiebreaker_id.unwrap(), ResolutionMode::Exclude)
                .await
                .unwrap();
        assert_eq!(
            resolution.round_status,
            Some(RoundStatus::ExpiredPendingFinalization)
        );

        let preview = preview_finalization(&state, round.id, "committee")
            .await
            .unwrap();
        assert_eq!(preview.status, RoundStatus::Completed);
        assert!(preview.allocations.is_empty());
        assert!(memory.roster("A").await.is_empty());
    }

    #[tokio::test]
    async fn manual_preview_apply_workflow() {
        let (state, memory) = memory_state().await;
        let round = round(RoundStatus::Active, Some(FinalizationMode::Manual), true);
        seed_round(&memory, &round).await;
        memory.put_bid(bid(&round, "A", "p1", 300, 0)).await;
        memory.put_bid(bid(&round, "B", "p2", 201, 1)).await;

        let preview = preview_finalization(&state, round.id, "committee")
            .await
            .unwrap();
        assert_eq!(preview.status, RoundStatus::PendingFinalization);
        assert_eq!(preview.summary.total_players, 2);
        assert_eq!(preview.summary.total_spent, 501);
        assert_eq!(preview.summary.average_bid, 251);

        let err = preview_finalization(&state, round.id, "committee")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));

        let listed = pending_allocations(&state, round.id).await.unwrap();
        assert_eq!(listed.allocations.len(), 2);
        assert_eq!(listed.allocations[0].amount, 300);
        // Nothing is charged before apply.
        assert_eq!(memory.team_season("A", "S1").await.unwrap().budget, 1000.0);

        let applied = apply_pending_allocations(&state, round.id, "committee")
            .await
            .unwrap();
        assert_eq!(applied.status, RoundStatus::Completed);
        assert_eq!(memory.team_season("A", "S1").await.unwrap().budget, 700.0);
        assert_eq!(memory.team_season("B", "S1").await.unwrap().budget, 799.0);
        assert!(pending_allocations(&state, round.id).await.unwrap().allocations.is_empty());

        let err = apply_pending_allocations(&state, round.id, "committee")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(message) if message == "Round already finalized"));

        let store = state.require_store().await.unwrap();
        let actions: Vec<String> = store
            .list_audit(10)
            .await
            .unwrap()
            .into_iter()
            .map(|entry| entry.action)
            .collect();
        assert!(actions.contains(&"apply_pending_allocations".to_string()));
    }

    #[tokio::test]
    async fn budget_shortfall_applies_nothing() {
        let (state, memory) = memory_state().await;
        let round = round(RoundStatus::Active, Some(FinalizationMode::Manual), true);
        seed_round(&memory, &round).await;
        memory.put_team_season(team_season("B", 50.0)).await;
        memory.put_bid(bid(&round, "A", "p1", 300, 0)).await;
        memory.put_bid(bid(&round, "B", "p2", 200, 1)).await;

        preview_finalization(&state, round.id, "committee")
            .await
            .unwrap();
        let err = apply_pending_allocations(&state, round.id, "committee")
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some("BUDGET_VALIDATION_FAILED"));

        assert_eq!(memory.team_season("A", "S1").await.unwrap().budget, 1000.0);
        assert!(memory.roster("A").await.is_empty());
        assert_eq!(
            status_of(&state, round.id).await,
            RoundStatus::PendingFinalization
        );
        assert_eq!(
            pending_allocations(&state, round.id)
                .await
                .unwrap()
                .allocations
                .len(),
            2
        );
    }

    #[tokio::test]
    async fn cancel_requires_pending_allocations() {
        let (state, memory) = memory_state().await;
        let round = round(RoundStatus::Active, Some(FinalizationMode::Manual), true);
        seed_round(&memory, &round).await;
        memory.put_bid(bid(&round, "A", "p1", 300, 0)).await;

        let err = cancel_pending_allocations(&state, round.id, "committee")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));

        preview_finalization(&state, round.id, "committee")
            .await
            .unwrap();
        let cancelled = cancel_pending_allocations(&state, round.id, "committee")
            .await
            .unwrap();
        assert_eq!(cancelled.cancelled, 1);
        assert_eq!(
            status_of(&state, round.id).await,
            RoundStatus::ExpiredPendingFinalization
        );
    }

    #[tokio::test]
    async fn preview_rules() {
        let (state, memory) = memory_state().await;
        let auto = round(RoundStatus::Active, Some(FinalizationMode::Auto), true);
        let open = round(RoundStatus::Active, Some(FinalizationMode::Manual), false);
        memory.insert_round(auto.clone()).await.unwrap();
        memory.insert_round(open.clone()).await.unwrap();

        for id in [auto.id, open.id] {
            let err = preview_finalization(&state, id, "committee")
                .await
                .unwrap_err();
            assert!(matches!(err, ServiceError::InvalidState(_)));
        }
        assert_eq!(status_of(&state, open.id).await, RoundStatus::Active);
    }

    #[tokio::test]
    async fn finalize_now_skips_waiting_for_expiry() {
        let (state, memory) = memory_state().await;
        let round = round(RoundStatus::Active, Some(FinalizationMode::Manual), false);
        seed_round(&memory, &round).await;
        memory.put_bid(bid(&round, "A", "p1", 300, 0)).await;

        let response = finalize_now(&state, round.id, "committee").await.unwrap();
        assert_eq!(response.outcome, RoundCheckOutcome::Finalized);
        assert_eq!(status_of(&state, round.id).await, RoundStatus::Completed);

        let err = finalize_now(&state, round.id, "committee").await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
    }

    #[tokio::test]
    async fn created_rounds_are_listed() {
        let (state, _) = memory_state().await;
        let created = create_round(
            &state,
            CreateRoundRequest {
                season_id: "S1".into(),
                position: "DEF".into(),
                max_bids_per_team: 3,
                duration_minutes: 60,
                finalization_mode: None,
            },
            "committee",
        )
        .await
        .unwrap();
        assert_eq!(created.status, RoundStatus::Active);
        assert_eq!(created.finalization_mode, FinalizationMode::Auto);

        let listed = list_rounds(&state, Some("S1".into())).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(list_rounds(&state, Some("S2".into())).await.unwrap().is_empty());
        assert_eq!(get_round(&state, created.id).await.unwrap().position, "DEF");
    }
}
