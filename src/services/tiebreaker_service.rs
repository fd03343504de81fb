//! Sealed re-bid contests opened when the top bid of a round is shared.

use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        league_store::LeagueStore,
        models::{RoundStatus, TeamTiebreakerEntity, TiebreakerEntity, TiebreakerStatus},
    },
    dto::tiebreaker::ResolutionMode,
    error::ServiceError,
    services::{allocation::CandidateBid, round_service, sse_events},
    state::SharedState,
};

/// Outcome of closing a tiebreaker.
#[derive(Debug, Clone)]
pub struct Resolution {
    /// Tiebreaker in its final state.
    pub tiebreaker: TiebreakerEntity,
    /// Contest opened between the teams that tied again.
    pub follow_up: Option<TiebreakerEntity>,
    /// Round status after resuming the round, when it was resumed.
    pub round_status: Option<RoundStatus>,
}

/// Outcome of a sealed re-bid.
#[derive(Debug, Clone)]
pub struct Submission {
    /// Tiebreaker including the new submission.
    pub tiebreaker: TiebreakerEntity,
    /// Set when the submission completed the tiebreaker.
    pub resolution: Option<Resolution>,
}

/// What a resolution decides, before anything is persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Player left out of the round.
    Exclude,
    /// Single highest re-bid.
    Win {
        /// Winning team.
        team_id: String,
        /// Winning amount.
        amount: i64,
    },
    /// Several teams share the highest re-bid.
    TiedAgain {
        /// Shared amount.
        amount: i64,
        /// Teams and their original bids.
        teams: Vec<(String, Uuid)>,
    },
}

/// Whether the submission window of `tiebreaker` has closed at `now`.
/// Tiebreakers without a duration never expire.
pub fn is_expired(tiebreaker: &TiebreakerEntity, now: SystemTime) -> bool {
    match tiebreaker.duration_minutes {
        None => false,
        Some(minutes) => {
            let deadline =
                tiebreaker.created_at + Duration::from_secs(u64::from(minutes) * 60);
            now >= deadline
        }
    }
}

/// Whether every participating team has re-bid.
pub fn all_teams_submitted(tiebreaker: &TiebreakerEntity) -> bool {
    tiebreaker.teams.iter().all(|team| team.submitted)
}

/// Decide how a tiebreaker closes.
pub fn decide(tiebreaker: &TiebreakerEntity, mode: ResolutionMode) -> Decision {
    if mode == ResolutionMode::Exclude {
        return Decision::Exclude;
    }

    let submitted: Vec<(&TeamTiebreakerEntity, i64)> = tiebreaker
        .teams
        .iter()
        .filter(|team| team.submitted)
        .filter_map(|team| team.new_bid_amount.map(|amount| (team, amount)))
        .collect();

    let Some(top) = submitted.iter().map(|(_, amount)| *amount).max() else {
        return Decision::Exclude;
    };

    let leaders: Vec<&TeamTiebreakerEntity> = submitted
        .iter()
        .filter(|(_, amount)| *amount == top)
        .map(|(team, _)| *team)
        .collect();

    match leaders.as_slice() {
        [winner] => Decision::Win {
            team_id: winner.team_id.clone(),
            amount: top,
        },
        _ => Decision::TiedAgain {
            amount: top,
            teams: leaders
                .iter()
                .map(|team| (team.team_id.clone(), team.original_bid_id))
                .collect(),
        },
    }
}

async fn open(
    state: &SharedState,
    store: &Arc<dyn LeagueStore>,
    round_id: Uuid,
    player_id: &str,
    original_amount: i64,
    teams: Vec<(String, Uuid)>,
) -> Result<TiebreakerEntity, ServiceError> {
    if teams.len() < 2 {
        return Err(ServiceError::InvalidInput(
            "a tiebreaker needs at least two tied bids".into(),
        ));
    }

    let tiebreaker = TiebreakerEntity {
        id: Uuid::new_v4(),
        round_id,
        player_id: player_id.to_owned(),
        original_amount,
        status: TiebreakerStatus::Active,
        duration_minutes: None,
        winning_team_id: None,
        winning_amount: None,
        teams: teams
            .into_iter()
            .map(|(team_id, original_bid_id)| TeamTiebreakerEntity {
                id: Uuid::new_v4(),
                team_id,
                original_bid_id,
                submitted: false,
                new_bid_amount: None,
                submitted_at: None,
            })
            .collect(),
        created_at: SystemTime::now(),
        resolved_at: None,
    };

    store.insert_tiebreaker(tiebreaker.clone()).await?;
    info!(
        tiebreaker_id = %tiebreaker.id,
        %round_id,
        player_id,
        original_amount,
        teams = tiebreaker.teams.len(),
        "tiebreaker created"
    );
    sse_events::broadcast_tiebreaker_created(state, &tiebreaker);
    Ok(tiebreaker)
}

/// Open a tiebreaker between the bids that share the top amount on one player.
pub async fn create_tiebreaker(
    state: &SharedState,
    store: &Arc<dyn LeagueStore>,
    round_id: Uuid,
    tied_bids: &[CandidateBid],
) -> Result<TiebreakerEntity, ServiceError> {
    let Some(first) = tied_bids.first() else {
        return Err(ServiceError::InvalidInput(
            "a tiebreaker needs at least two tied bids".into(),
        ));
    };
    let teams = tied_bids
        .iter()
        .map(|bid| (bid.team_id.clone(), bid.bid_id))
        .collect();
    open(state, store, round_id, &first.player_id, first.amount, teams).await
}

/// Fetch a tiebreaker.
pub async fn get_tiebreaker(
    state: &SharedState,
    id: Uuid,
) -> Result<TiebreakerEntity, ServiceError> {
    let store = state.require_store().await?;
    store
        .find_tiebreaker(id)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Tiebreaker not found".into()))
}

/// Tiebreakers opened in a round.
pub async fn list_for_round(
    state: &SharedState,
    round_id: Uuid,
) -> Result<Vec<TiebreakerEntity>, ServiceError> {
    let store = state.require_store().await?;
    Ok(store.list_tiebreakers(round_id).await?)
}

/// Newest active tiebreaker the team takes part in.
pub async fn active_for_team(
    state: &SharedState,
    team_id: &str,
) -> Result<Option<TiebreakerEntity>, ServiceError> {
    let store = state.require_store().await?;
    let active = store
        .list_active_tiebreakers_for_team(team_id.to_owned())
        .await?;
    Ok(active.into_iter().next())
}

/// Record a sealed re-bid, resolving the tiebreaker once every team has submitted.
pub async fn submit(
    state: &SharedState,
    team_id: &str,
    tiebreaker_id: Uuid,
    amount: i64,
) -> Result<Submission, ServiceError> {
    if amount <= 0 {
        return Err(ServiceError::InvalidInput(
            "New bid amount must be positive".into(),
        ));
    }

    let store = state.require_store().await?;
    let tiebreaker = store
        .find_tiebreaker(tiebreaker_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Tiebreaker not found".into()))?;

    if tiebreaker.status != TiebreakerStatus::Active {
        return Err(ServiceError::InvalidState("Tiebreaker is not active".into()));
    }
    let now = SystemTime::now();
    if is_expired(&tiebreaker, now) {
        return Err(ServiceError::InvalidState("Tiebreaker has expired".into()));
    }
    let Some(entry) = tiebreaker.teams.iter().find(|team| team.team_id == team_id) else {
        return Err(ServiceError::Forbidden(
            "Team is not part of this tiebreaker".into(),
        ));
    };
    if entry.submitted {
        return Err(ServiceError::InvalidState(
            "Team has already submitted a bid for this tiebreaker".into(),
        ));
    }
    if amount < tiebreaker.original_amount {
        return Err(ServiceError::InvalidInput(format!(
            "New bid must be at least the original amount ({})",
            tiebreaker.original_amount
        )));
    }

    let round = store
        .find_round(tiebreaker.round_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Round not found".into()))?;
    let season = store
        .find_team_seasons(round.season_id.clone(), vec![team_id.to_owned()])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| ServiceError::InvalidInput("Team budget record not found".into()))?;
    let available = season.auction_budget();
    if amount as f64 > available {
        return Err(ServiceError::InvalidInput(format!(
            "Insufficient budget: bid {amount}, available {available:.2}"
        )));
    }

    let updated = store
        .record_tiebreaker_submission(tiebreaker_id, team_id.to_owned(), amount, now)
        .await?
        .ok_or_else(|| {
            ServiceError::InvalidState("Tiebreaker closed or bid already submitted".into())
        })?;
    info!(%tiebreaker_id, team_id, amount, "tiebreaker bid submitted");

    if !all_teams_submitted(&updated) {
        return Ok(Submission {
            tiebreaker: updated,
            resolution: None,
        });
    }

    match resolve(state, tiebreaker_id, ResolutionMode::Auto).await {
        Ok(resolution) => Ok(Submission {
            tiebreaker: resolution.tiebreaker.clone(),
            resolution: Some(resolution),
        }),
        Err(ServiceError::InvalidState(reason)) => {
            info!(%tiebreaker_id, reason, "tiebreaker already closed by another request");
            Ok(Submission {
                tiebreaker: updated,
                resolution: None,
            })
        }
        Err(err) => Err(err),
    }
}

/// Close an active tiebreaker and resume its round when nothing else blocks it.
pub async fn resolve(
    state: &SharedState,
    tiebreaker_id: Uuid,
    mode: ResolutionMode,
) -> Result<Resolution, ServiceError> {
    let store = state.require_store().await?;
    let tiebreaker = store
        .find_tiebreaker(tiebreaker_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Tiebreaker not found".into()))?;
    if tiebreaker.status != TiebreakerStatus::Active {
        return Err(ServiceError::InvalidState("Tiebreaker is not active".into()));
    }

    let decision = decide(&tiebreaker, mode);
    let mut closed = tiebreaker;
    closed.resolved_at = Some(SystemTime::now());
    match &decision {
        Decision::Exclude => closed.status = TiebreakerStatus::Excluded,
        Decision::Win { team_id, amount } => {
            closed.status = TiebreakerStatus::Resolved;
            closed.winning_team_id = Some(team_id.clone());
            closed.winning_amount = Some(*amount);
        }
        Decision::TiedAgain { .. } => closed.status = TiebreakerStatus::TiedAgain,
    }

    if !store.close_tiebreaker(closed.clone()).await? {
        return Err(ServiceError::InvalidState(
            "Tiebreaker was closed concurrently".into(),
        ));
    }
    info!(
        %tiebreaker_id,
        status = ?closed.status,
        winner = closed.winning_team_id.as_deref().unwrap_or("-"),
        "tiebreaker closed"
    );
    sse_events::broadcast_tiebreaker_resolved(state, &closed);

    let follow_up = match decision {
        Decision::TiedAgain { amount, teams } => Some(
            open(
                state,
                &store,
                closed.round_id,
                &closed.player_id,
                amount,
                teams,
            )
            .await?,
        ),
        _ => None,
    };

    let round_status = if follow_up.is_some() {
        None
    } else {
        match resume_round(state, &store, closed.round_id).await {
            Ok(status) => status,
            Err(err) => {
                error!(round_id = %closed.round_id, error = %err, "failed to resume round after tiebreaker");
                None
            }
        }
    };

    Ok(Resolution {
        tiebreaker: closed,
        follow_up,
        round_status,
    })
}

/// Continue a round held by tiebreakers once none is active anymore.
///
/// Manual rounds go back to committee review; automatic rounds are finalized
/// and applied right away.
async fn resume_round(
    state: &SharedState,
    store: &Arc<dyn LeagueStore>,
    round_id: Uuid,
) -> Result<Option<RoundStatus>, ServiceError> {
    let Some(round) = store.find_round(round_id).await? else {
        warn!(%round_id, "tiebreaker references a missing round");
        return Ok(None);
    };
    if round.status != RoundStatus::TiebreakerPending {
        return Ok(None);
    }
    let still_open = store
        .list_tiebreakers(round_id)
        .await?
        .iter()
        .any(|tb| tb.status == TiebreakerStatus::Active);
    if still_open {
        return Ok(None);
    }

    let outcome = round_service::resume_after_tiebreaker(state, store, round).await?;
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use axum::{http::StatusCode, response::IntoResponse};

    use super::*;
    use crate::{
        dao::models::FinalizationMode,
        error::AppError,
        services::fixtures::{memory_state, round, seed_round},
    };

    fn tiebreaker(submissions: &[(&str, Option<i64>)]) -> TiebreakerEntity {
        TiebreakerEntity {
            id: Uuid::new_v4(),
            round_id: Uuid::new_v4(),
            player_id: "p1".into(),
            original_amount: 100,
            status: TiebreakerStatus::Active,
            duration_minutes: None,
            winning_team_id: None,
            winning_amount: None,
            teams: submissions
                .iter()
                .map(|(team, amount)| TeamTiebreakerEntity {
                    id: Uuid::new_v4(),
                    team_id: (*team).into(),
                    original_bid_id: Uuid::new_v4(),
                    submitted: amount.is_some(),
                    new_bid_amount: *amount,
                    submitted_at: amount.map(|_| SystemTime::now()),
                })
                .collect(),
            created_at: SystemTime::now(),
            resolved_at: None,
        }
    }

    #[test]
    fn nobody_submitted_excludes_player() {
        let tb = tiebreaker(&[("A", None), ("B", None)]);
        assert_eq!(decide(&tb, ResolutionMode::Auto), Decision::Exclude);
    }

    #[test]
    fn single_highest_rebid_wins() {
        let tb = tiebreaker(&[("A", Some(150)), ("B", Some(120)), ("C", None)]);
        assert_eq!(
            decide(&tb, ResolutionMode::Auto),
            Decision::Win {
                team_id: "A".into(),
                amount: 150
            }
        );
    }

    #[test]
    fn shared_highest_rebid_ties_again() {
        let tb = tiebreaker(&[("A", Some(150)), ("B", Some(150)), ("C", Some(140))]);
        match decide(&tb, ResolutionMode::Auto) {
            Decision::TiedAgain { amount, teams } => {
                assert_eq!(amount, 150);
                let ids: Vec<&str> = teams.iter().map(|(team, _)| team.as_str()).collect();
                assert_eq!(ids, vec!["A", "B"]);
            }
            other => panic!("expected tied again, got {other:?}"),
        }
    }

    #[test]
    fn exclude_mode_ignores_submissions() {
        let tb = tiebreaker(&[("A", Some(150)), ("B", Some(120))]);
        assert_eq!(decide(&tb, ResolutionMode::Exclude), Decision::Exclude);
    }

    #[test]
    fn expiry_only_applies_with_duration() {
        let mut tb = tiebreaker(&[("A", None), ("B", None)]);
        let later = tb.created_at + Duration::from_secs(3600);
        assert!(!is_expired(&tb, later));

        tb.duration_minutes = Some(30);
        assert!(is_expired(&tb, later));
        assert!(!is_expired(&tb, tb.created_at + Duration::from_secs(60)));
        assert!(is_expired(&tb, tb.created_at + Duration::from_secs(30 * 60)));
        assert!(!is_expired(&tb, tb.created_at + Duration::from_secs(30 * 60 - 1)));
    }

    #[tokio::test]
    async fn submission_rejections() {
        let (state, memory) = memory_state().await;
        let round = round(RoundStatus::TiebreakerPending, Some(FinalizationMode::Auto), true);
        seed_round(&memory, &round).await;
        let store = state.require_store().await.unwrap();

        let in_round = |teams: &[(&str, Option<i64>)]| {
            let mut tb = tiebreaker(teams);
            tb.round_id = round.id;
            tb
        };
        let running = in_round(&[("A", None), ("B", Some(150)), ("D", None)]);
        let mut expired = in_round(&[("A", None), ("B", None)]);
        expired.duration_minutes = Some(1);
        expired.created_at = SystemTime::now() - Duration::from_secs(120);
        let mut closed = in_round(&[("A", None), ("B", None)]);
        closed.status = TiebreakerStatus::Excluded;
        for tb in [&running, &expired, &closed] {
            store.insert_tiebreaker(tb.clone()).await.unwrap();
        }

        let cases = [
            ("non-positive amount", "A", running.id, 0, StatusCode::BAD_REQUEST),
            ("unknown tiebreaker", "A", Uuid::new_v4(), 150, StatusCode::NOT_FOUND),
            ("closed tiebreaker", "A", closed.id, 150, StatusCode::BAD_REQUEST),
            ("expired tiebreaker", "A", expired.id, 150, StatusCode::BAD_REQUEST),
            ("team not involved", "C", running.id, 150, StatusCode::FORBIDDEN),
            ("already submitted", "B", running.id, 160, StatusCode::BAD_REQUEST),
            ("below original bid", "A", running.id, 99, StatusCode::BAD_REQUEST),
            ("no budget record", "D", running.id, 150, StatusCode::BAD_REQUEST),
            ("over budget", "A", running.id, 1001, StatusCode::BAD_REQUEST),
        ];

        for (case, team, id, amount, status) in cases {
            let err = submit(&state, team, id, amount)
                .await
                .expect_err(case);
            let expected_variant = match status {
                StatusCode::NOT_FOUND => matches!(err, ServiceError::NotFound(_)),
                StatusCode::FORBIDDEN => matches!(err, ServiceError::Forbidden(_)),
                _ => matches!(err, ServiceError::InvalidInput(_) | ServiceError::InvalidState(_)),
            };
            assert!(expected_variant, "{case}: unexpected {err:?}");
            assert_eq!(AppError::from(err).into_response().status(), status, "{case}");
        }

        // Nothing was recorded for the rejected teams.
        let stored = store.find_tiebreaker(running.id).await.unwrap().unwrap();
        let submitted: Vec<&str> = stored
            .teams
            .iter()
            .filter(|team| team.submitted)
            .map(|team| team.team_id.as_str())
            .collect();
        assert_eq!(submitted, vec!["B"]);

        // The exact budget is still accepted.
        let accepted = submit(&state, "A", running.id, 1000).await.unwrap();
        assert!(accepted.resolution.is_none());
    }

    #[test]
    fn all_submitted_requires_every_team() {
        assert!(!all_teams_submitted(&tiebreaker(&[("A", Some(1)), ("B", None)])));
        assert!(all_teams_submitted(&tiebreaker(&[("A", Some(1)), ("B", Some(2))])));
    }
}
