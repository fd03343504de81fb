//! Background sweep finalizing rounds whose bidding window has closed.

use std::time::SystemTime;

use tokio::{
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};
use tracing::{debug, info, warn};

use crate::{
    dto::round::{RoundCheckOutcome, SweepResponse},
    error::ServiceError,
    services::round_service,
    state::SharedState,
};

/// Start the periodic sweep when enabled in the configuration.
pub fn spawn(state: SharedState) -> Option<JoinHandle<()>> {
    if !state.config().finalizer_enabled {
        info!("auto-finalizer disabled");
        return None;
    }
    Some(tokio::spawn(run(state)))
}

/// Sweep expired rounds forever at the configured interval.
pub async fn run(state: SharedState) {
    let period = state.config().finalizer_interval;
    info!(?period, "auto-finalizer started");
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        if state.is_degraded().await {
            debug!("skipping finalizer sweep while degraded");
            continue;
        }
        match run_sweep(&state).await {
            Ok(summary) if summary.checked > 0 => info!(
                checked = summary.checked,
                finalized = summary.finalized,
                pending_manual = summary.pending_manual,
                tiebreakers = summary.tiebreakers,
                skipped = summary.skipped,
                failed = summary.failed,
                "finalizer sweep done"
            ),
            Ok(_) => {}
            Err(err) => warn!(error = %err, "finalizer sweep failed"),
        }
    }
}

/// Run the lazy finalization hook on every expired active round once.
///
/// Rounds already being handled by another task of this process are skipped.
pub async fn run_sweep(state: &SharedState) -> Result<SweepResponse, ServiceError> {
    let store = state.require_store().await?;
    let rounds = store.list_expired_active_rounds(SystemTime::now()).await?;
    let mut summary = SweepResponse {
        checked: rounds.len(),
        ..SweepResponse::default()
    };

    for round in rounds {
        let Some(_guard) = state.begin_finalizing(round.id) else {
            summary.skipped += 1;
            continue;
        };
        let result = round_service::check_and_finalize_expired_round(state, round.id).await;

        match result {
            Ok(response) => match response.outcome {
                RoundCheckOutcome::Finalized => summary.finalized += 1,
                RoundCheckOutcome::PendingManualFinalization => summary.pending_manual += 1,
                RoundCheckOutcome::TiebreakerPending => summary.tiebreakers += 1,
                RoundCheckOutcome::AlreadyFinalized
                | RoundCheckOutcome::InProgress
                | RoundCheckOutcome::NotExpired => summary.skipped += 1,
            },
            Err(err) => {
                summary.failed += 1;
                warn!(round_id = %round.id, error = %err, "auto-finalization failed");
            }
        }
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dao::{
            league_store::LeagueStore,
            models::{FinalizationMode, RoundStatus},
        },
        services::fixtures::{bid, memory_state, round, seed_round},
    };

    #[tokio::test]
    async fn sweep_handles_each_expired_round() {
        let (state, memory) = memory_state().await;
        let auto = round(RoundStatus::Active, Some(FinalizationMode::Auto), true);
        let manual = round(RoundStatus::Active, Some(FinalizationMode::Manual), true);
        let open = round(RoundStatus::Active, Some(FinalizationMode::Auto), false);
        seed_round(&memory, &auto).await;
        memory.insert_round(manual.clone()).await.unwrap();
        memory.insert_round(open.clone()).await.unwrap();
        memory.put_bid(bid(&auto, "A", "p1", 300, 0)).await;

        let summary = run_sweep(&state).await.unwrap();
        assert_eq!(
            summary,
            SweepResponse {
                checked: 2,
                finalized: 1,
                pending_manual: 1,
                ..SweepResponse::default()
            }
        );

        let store = state.require_store().await.unwrap();
        let status = |id| {
            let store = store.clone();
            async move { store.find_round(id).await.unwrap().unwrap().status }
        };
        assert_eq!(status(auto.id).await, RoundStatus::Completed);
        assert_eq!(status(manual.id).await, RoundStatus::ExpiredPendingFinalization);
        assert_eq!(status(open.id).await, RoundStatus::Active);

        assert_eq!(run_sweep(&state).await.unwrap(), SweepResponse::default());
    }

    #[tokio::test]
    async fn rounds_in_flight_are_skipped() {
        let (state, memory) = memory_state().await;
        let auto = round(RoundStatus::Active, Some(FinalizationMode::Auto), true);
        seed_round(&memory, &auto).await;

        let held = state.begin_finalizing(auto.id);
        assert!(held.is_some());
        let summary = run_sweep(&state).await.unwrap();
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.finalized, 0);

        drop(held);
        assert_eq!(run_sweep(&state).await.unwrap().finalized, 1);
        assert!(!state.is_finalizing(auto.id));
    }
}
