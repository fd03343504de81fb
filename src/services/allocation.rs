//! Pure player allocation for a finalized round.
//!
//! Phase one repeatedly awards the highest remaining bid among teams that placed
//! exactly the required number of bids, removing the player and the team from
//! contention. It stops as soon as the top bid is shared by several teams on the
//! same player. Phase two gives every team with too few bids its best remaining
//! player, charged at the rounded average of the phase one prices.

use std::collections::HashSet;

use indexmap::IndexMap;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dao::models::{AllocationPhase, TiebreakerEntity, TiebreakerStatus};

/// Bid taking part in an allocation run, enriched with display names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct CandidateBid {
    /// Bid identifier.
    pub bid_id: Uuid,
    /// Bidding team.
    pub team_id: String,
    /// Bidding team name.
    pub team_name: String,
    /// Player bid on.
    pub player_id: String,
    /// Player name.
    pub player_name: String,
    /// Amount used for ranking (a tiebreaker re-bid when one was won).
    pub amount: i64,
    /// Amount originally bid.
    pub original_amount: i64,
}

/// Player awarded to a team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Allocation {
    /// Winning bid.
    pub bid_id: Uuid,
    /// Receiving team.
    pub team_id: String,
    /// Receiving team name.
    pub team_name: String,
    /// Allocated player.
    pub player_id: String,
    /// Allocated player name.
    pub player_name: String,
    /// Price charged.
    pub amount: i64,
    /// Amount the team bid for this player.
    pub bid_amount: i64,
    /// Phase that produced the allocation.
    pub phase: AllocationPhase,
}

/// What happened at one step of the allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum StepAction {
    /// Highest bid awarded.
    Allocate,
    /// Top bid shared by several teams; allocation stopped.
    TieDetected,
    /// Incomplete team awarded at the average price.
    AllocateAtAverage,
}

/// Trace entry describing one decision of the allocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct AllocationStep {
    /// 1-based position of the step.
    pub step_number: u32,
    /// Phase the step belongs to.
    pub phase: AllocationPhase,
    /// Decision taken.
    pub action: StepAction,
    /// Human readable description.
    pub description: String,
    /// Bid the decision is about.
    pub bid: CandidateBid,
    /// Bids still in contention after the step.
    pub remaining_bids: usize,
    /// Teams allocated so far, in allocation order.
    pub allocated_teams: Vec<String>,
    /// Players allocated so far, in allocation order.
    pub allocated_players: Vec<String>,
}

/// Result of an allocation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllocationOutcome {
    /// Every eligible team was processed.
    Completed {
        /// Allocations in the order they were made.
        allocations: Vec<Allocation>,
        /// Price charged to incomplete teams, when any were processed.
        average_price: Option<i64>,
        /// Decision trace.
        steps: Vec<AllocationStep>,
    },
    /// The top bid is shared; a tiebreaker is required before continuing.
    TieDetected {
        /// Contested player.
        player_id: String,
        /// Bids sharing the top amount on that player.
        tied_bids: Vec<CandidateBid>,
        /// Allocations made before the tie was hit.
        allocations: Vec<Allocation>,
        /// Decision trace up to and including the tie.
        steps: Vec<AllocationStep>,
    },
}

/// Team classification by number of bids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeamBreakdown {
    /// Teams with exactly the required number of bids, in first-seen order.
    pub complete: Vec<String>,
    /// Teams with fewer bids than required, in first-seen order.
    pub incomplete: Vec<String>,
}

/// Split teams into complete and incomplete. Teams with more bids than required are in neither.
pub fn classify_teams(required: u32, bids: &[CandidateBid]) -> TeamBreakdown {
    let mut counts: IndexMap<&str, u32> = IndexMap::new();
    for bid in bids {
        *counts.entry(bid.team_id.as_str()).or_insert(0) += 1;
    }

    let mut breakdown = TeamBreakdown::default();
    for (team, count) in counts {
        if count == required {
            breakdown.complete.push(team.to_owned());
        } else if count < required {
            breakdown.incomplete.push(team.to_owned());
        }
    }
    breakdown
}

/// Apply tiebreaker outcomes to the bids of a round.
///
/// A resolved tiebreaker replaces the winner's amount with the winning re-bid and
/// removes the other teams' bids on that player. An excluded tiebreaker removes
/// every bid on its player. Other statuses have no effect.
pub fn apply_tiebreakers(
    bids: Vec<CandidateBid>,
    tiebreakers: &[TiebreakerEntity],
) -> Vec<CandidateBid> {
    let mut winners: IndexMap<&str, (&str, i64)> = IndexMap::new();
    let mut excluded: HashSet<&str> = HashSet::new();

    for tiebreaker in tiebreakers {
        match tiebreaker.status {
            TiebreakerStatus::Resolved => {
                if let (Some(team), Some(amount)) =
                    (&tiebreaker.winning_team_id, tiebreaker.winning_amount)
                {
                    excluded.remove(tiebreaker.player_id.as_str());
                    winners.insert(tiebreaker.player_id.as_str(), (team.as_str(), amount));
                }
            }
            TiebreakerStatus::Excluded => {
                winners.shift_remove(tiebreaker.player_id.as_str());
                excluded.insert(tiebreaker.player_id.as_str());
            }
            TiebreakerStatus::Active | TiebreakerStatus::TiedAgain => {}
        }
    }

    bids.into_iter()
        .filter(|bid| !excluded.contains(bid.player_id.as_str()))
        .filter_map(|mut bid| match winners.get(bid.player_id.as_str()) {
            Some((team, amount)) if *team == bid.team_id => {
                bid.amount = *amount;
                Some(bid)
            }
            Some(_) => None,
            None => Some(bid),
        })
        .collect()
}

/// Average price charged to incomplete teams.
pub fn average_price(regular: &[Allocation], fallback: i64) -> i64 {
    if regular.is_empty() {
        return fallback;
    }
    let total: i64 = regular.iter().map(|allocation| allocation.amount).sum();
    (total as f64 / regular.len() as f64).round() as i64
}

struct Tracker {
    allocations: Vec<Allocation>,
    steps: Vec<AllocationStep>,
    teams: Vec<String>,
    players: Vec<String>,
}

impl Tracker {
    fn record(
        &mut self,
        phase: AllocationPhase,
        action: StepAction,
        description: String,
        bid: &CandidateBid,
        remaining_bids: usize,
    ) {
        self.steps.push(AllocationStep {
            step_number: self.steps.len() as u32 + 1,
            phase,
            action,
            description,
            bid: bid.clone(),
            remaining_bids,
            allocated_teams: self.teams.clone(),
            allocated_players: self.players.clone(),
        });
    }

    fn award(&mut self, bid: &CandidateBid, amount: i64, phase: AllocationPhase) {
        self.teams.push(bid.team_id.clone());
        self.players.push(bid.player_id.clone());
        self.allocations.push(Allocation {
            bid_id: bid.bid_id,
            team_id: bid.team_id.clone(),
            team_name: bid.team_name.clone(),
            player_id: bid.player_id.clone(),
            player_name: bid.player_name.clone(),
            amount,
            bid_amount: bid.original_amount,
            phase,
        });
    }
}

/// Run the two-phase allocation over the active `bids` of a round.
///
/// Teams are classified on the bids as placed. Tiebreaker outcomes only change
/// which bids compete for players, so losing a tiebreaker never turns a
/// complete team into an incomplete one.
pub fn allocate(
    required: u32,
    bids: &[CandidateBid],
    tiebreakers: &[TiebreakerEntity],
    fallback_average: i64,
) -> AllocationOutcome {
    let breakdown = classify_teams(required, bids);
    let bids = apply_tiebreakers(bids.to_vec(), tiebreakers);
    let mut tracker = Tracker {
        allocations: Vec::new(),
        steps: Vec::new(),
        teams: Vec::new(),
        players: Vec::new(),
    };

    let mut pool: Vec<CandidateBid> = bids
        .iter()
        .filter(|bid| breakdown.complete.contains(&bid.team_id))
        .cloned()
        .collect();

    while !pool.is_empty() && tracker.teams.len() < breakdown.complete.len() {
        pool.sort_by(|a, b| b.amount.cmp(&a.amount));
        let top = pool[0].clone();
        let tied: Vec<CandidateBid> = pool
            .iter()
            .filter(|bid| bid.amount == top.amount && bid.player_id == top.player_id)
            .cloned()
            .collect();

        if tied.len() > 1 {
            tracker.record(
                AllocationPhase::Regular,
                StepAction::TieDetected,
                format!(
                    "{} teams tied at {} for {}",
                    tied.len(),
                    top.amount,
                    top.player_name
                ),
                &top,
                pool.len(),
            );
            return AllocationOutcome::TieDetected {
                player_id: top.player_id,
                tied_bids: tied,
                allocations: tracker.allocations,
                steps: tracker.steps,
            };
        }

        tracker.award(&top, top.amount, AllocationPhase::Regular);
        pool.retain(|bid| bid.player_id != top.player_id && bid.team_id != top.team_id);
        tracker.record(
            AllocationPhase::Regular,
            StepAction::Allocate,
            format!(
                "{} wins {} for {}",
                top.team_name, top.player_name, top.amount
            ),
            &top,
            pool.len(),
        );
    }

    let pending: Vec<&String> = breakdown
        .incomplete
        .iter()
        .filter(|team| !tracker.teams.contains(team))
        .collect();
    let average = if pending.is_empty() {
        None
    } else {
        Some(average_price(&tracker.allocations, fallback_average))
    };

    if let Some(average) = average {
        for team in pending {
            let best = bids
                .iter()
                .filter(|bid| &bid.team_id == team && !tracker.players.contains(&bid.player_id))
                .fold(None::<&CandidateBid>, |best, bid| match best {
                    Some(current) if current.amount >= bid.amount => Some(current),
                    _ => Some(bid),
                });

            if let Some(bid) = best {
                let bid = bid.clone();
                tracker.award(&bid, average, AllocationPhase::Incomplete);
                tracker.record(
                    AllocationPhase::Incomplete,
                    StepAction::AllocateAtAverage,
                    format!(
                        "{} receives {} at average {}",
                        bid.team_name, bid.player_name, average
                    ),
                    &bid,
                    0,
                );
            }
        }
    }

    AllocationOutcome::Completed {
        allocations: tracker.allocations,
        average_price: average,
        steps: tracker.steps,
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;

    fn bid(team: &str, player: &str, amount: i64) -> CandidateBid {
        CandidateBid {
            bid_id: Uuid::new_v4(),
            team_id: team.into(),
            team_name: format!("Team {team}"),
            player_id: player.into(),
            player_name: format!("Player {player}"),
            amount,
            original_amount: amount,
        }
    }

    fn tiebreaker(player: &str, status: TiebreakerStatus, winner: Option<(&str, i64)>) -> TiebreakerEntity {
        TiebreakerEntity {
            id: Uuid::new_v4(),
            round_id: Uuid::new_v4(),
            player_id: player.into(),
            original_amount: 100,
            status,
            duration_minutes: None,
            winning_team_id: winner.map(|(team, _)| team.to_owned()),
            winning_amount: winner.map(|(_, amount)| amount),
            teams: Vec::new(),
            created_at: SystemTime::now(),
            resolved_at: None,
        }
    }

    fn completed(outcome: AllocationOutcome) -> (Vec<Allocation>, Option<i64>, Vec<AllocationStep>) {
        match outcome {
            AllocationOutcome::Completed {
                allocations,
                average_price,
                steps,
            } => (allocations, average_price, steps),
            other => panic!("expected completed allocation, got {other:?}"),
        }
    }

    #[test]
    fn highest_bid_wins_and_removes_player_and_team() {
        let bids = vec![
            bid("A", "p1", 300),
            bid("A", "p2", 100),
            bid("B", "p1", 250),
            bid("B", "p2", 200),
        ];

        let (allocations, average, steps) = completed(allocate(2, &bids, &[], 1000));

        assert_eq!(allocations.len(), 2);
        assert_eq!(
            (allocations[0].team_id.as_str(), allocations[0].player_id.as_str(), allocations[0].amount),
            ("A", "p1", 300)
        );
        assert_eq!(
            (allocations[1].team_id.as_str(), allocations[1].player_id.as_str(), allocations[1].amount),
            ("B", "p2", 200)
        );
        assert!(allocations.iter().all(|a| a.phase == AllocationPhase::Regular));
        assert_eq!(average, None);
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].remaining_bids, 1);
        assert_eq!(steps[1].allocated_players, vec!["p1".to_string(), "p2".to_string()]);
    }

    #[test]
    fn tie_on_top_player_stops_allocation() {
        let bids = vec![
            bid("A", "p1", 300),
            bid("B", "p1", 300),
            bid("C", "p2", 500),
        ];

        match allocate(1, &bids, &[], 1000) {
            AllocationOutcome::TieDetected {
                player_id,
                tied_bids,
                allocations,
                steps,
            } => {
                assert_eq!(player_id, "p1");
                assert_eq!(tied_bids.len(), 2);
                assert_eq!(allocations.len(), 1);
                assert_eq!(allocations[0].team_id, "C");
                assert_eq!(steps.last().map(|s| s.action), Some(StepAction::TieDetected));
            }
            other => panic!("expected a tie, got {other:?}"),
        }
    }

    #[test]
    fn equal_amounts_on_different_players_are_not_a_tie() {
        let bids = vec![bid("A", "p1", 300), bid("B", "p2", 300)];
        let (allocations, _, _) = completed(allocate(1, &bids, &[], 1000));
        assert_eq!(allocations.len(), 2);
        assert_eq!(allocations[0].team_id, "A");
    }

    #[test]
    fn incomplete_team_gets_best_remaining_player_at_average() {
        let bids = vec![
            bid("A", "p1", 300),
            bid("A", "p2", 100),
            bid("B", "p2", 201),
            bid("B", "p3", 150),
            bid("C", "p1", 900),
            bid("D", "p3", 120),
        ];

        let (allocations, average, _) = completed(allocate(2, &bids, &[], 1000));

        // A wins p1 (300), B wins p2 (201): average 250.5 rounds to 251
        assert_eq!(average, Some(251));
        // C only bid on p1, which is taken
        assert_eq!(allocations.len(), 3);
        let incomplete = &allocations[2];
        assert_eq!(incomplete.team_id, "D");
        assert_eq!(incomplete.player_id, "p3");
        assert_eq!(incomplete.phase, AllocationPhase::Incomplete);
        assert_eq!(incomplete.amount, 251);
        assert_eq!(incomplete.bid_amount, 120);
    }

    #[test]
    fn incomplete_team_without_available_player_gets_nothing() {
        let bids = vec![
            bid("A", "p1", 300),
            bid("A", "p2", 100),
            bid("B", "p2", 200),
            bid("B", "p3", 150),
            bid("C", "p1", 900),
        ];
        let (allocations, _, _) = completed(allocate(2, &bids, &[], 1000));
        assert_eq!(allocations.len(), 2);
        assert!(allocations.iter().all(|a| a.team_id != "C"));
    }

    #[test]
    fn fallback_average_when_nothing_regular() {
        let bids = vec![bid("A", "p1", 50), bid("B", "p2", 70)];
        let (allocations, average, _) = completed(allocate(3, &bids, &[], 1000));
        assert_eq!(average, Some(1000));
        assert_eq!(allocations.len(), 2);
        assert!(allocations.iter().all(|a| a.amount == 1000));
    }

    #[test]
    fn teams_with_too_many_bids_are_ignored() {
        let bids = vec![bid("A", "p1", 300), bid("A", "p2", 200), bid("B", "p3", 100)];
        let (allocations, _, _) = completed(allocate(1, &bids, &[], 1000));
        assert_eq!(allocations.len(), 1);
        assert_eq!(allocations[0].team_id, "B");
    }

    #[test]
    fn resolved_tiebreaker_replaces_winner_amount_and_drops_losers() {
        let bids = vec![bid("A", "p1", 300), bid("B", "p1", 300), bid("C", "p2", 10)];
        let adjusted = apply_tiebreakers(
            bids,
            &[tiebreaker("p1", TiebreakerStatus::Resolved, Some(("B", 350)))],
        );

        assert_eq!(adjusted.len(), 2);
        let winner = adjusted.iter().find(|b| b.player_id == "p1").unwrap();
        assert_eq!(winner.team_id, "B");
        assert_eq!(winner.amount, 350);
        assert_eq!(winner.original_amount, 300);

        let tiebreakers = [tiebreaker("p1", TiebreakerStatus::Resolved, Some(("B", 350)))];
        let bids = vec![bid("A", "p1", 300), bid("B", "p1", 300), bid("C", "p2", 10)];
        let (allocations, _, _) = completed(allocate(1, &bids, &tiebreakers, 1000));
        assert_eq!(allocations[0].team_id, "B");
        assert_eq!(allocations[0].amount, 350);
        assert_eq!(allocations[0].bid_amount, 300);
    }

    #[test]
    fn tiebreaker_loser_keeps_its_complete_status() {
        let bids = vec![
            bid("A", "p1", 300),
            bid("A", "p2", 100),
            bid("B", "p1", 300),
            bid("B", "p3", 200),
        ];
        let tiebreakers = [tiebreaker("p1", TiebreakerStatus::Resolved, Some(("A", 350)))];

        let (allocations, average, _) = completed(allocate(2, &bids, &tiebreakers, 1000));

        assert_eq!(average, None);
        assert_eq!(allocations.len(), 2);
        let a = allocations.iter().find(|a| a.team_id == "A").unwrap();
        assert_eq!((a.player_id.as_str(), a.amount, a.phase), ("p1", 350, AllocationPhase::Regular));
        let b = allocations.iter().find(|a| a.team_id == "B").unwrap();
        assert_eq!((b.player_id.as_str(), b.amount, b.phase), ("p3", 200, AllocationPhase::Regular));
    }

    #[test]
    fn excluded_player_does_not_make_bidders_incomplete() {
        let bids = vec![
            bid("A", "p1", 300),
            bid("A", "p2", 100),
            bid("B", "p1", 300),
            bid("B", "p3", 200),
        ];
        let tiebreakers = [tiebreaker("p1", TiebreakerStatus::Excluded, None)];

        let (allocations, average, _) = completed(allocate(2, &bids, &tiebreakers, 1000));

        assert_eq!(average, None);
        assert!(allocations.iter().all(|a| a.phase == AllocationPhase::Regular));
        assert!(allocations.iter().all(|a| a.player_id != "p1"));
        let b = allocations.iter().find(|a| a.team_id == "B").unwrap();
        assert_eq!((b.player_id.as_str(), b.amount), ("p3", 200));
        let a = allocations.iter().find(|a| a.team_id == "A").unwrap();
        assert_eq!((a.player_id.as_str(), a.amount), ("p2", 100));
    }

    #[test]
    fn excluded_tiebreaker_removes_player() {
        let bids = vec![bid("A", "p1", 300), bid("B", "p1", 300), bid("B", "p2", 10)];
        let adjusted = apply_tiebreakers(
            bids,
            &[
                tiebreaker("p1", TiebreakerStatus::TiedAgain, None),
                tiebreaker("p1", TiebreakerStatus::Excluded, None),
            ],
        );
        assert_eq!(adjusted.len(), 1);
        assert_eq!(adjusted[0].player_id, "p2");
    }

    #[test]
    fn average_price_rounds_half_up() {
        let allocations: Vec<Allocation> = [100, 101]
            .iter()
            .map(|amount| Allocation {
                bid_id: Uuid::new_v4(),
                team_id: "A".into(),
                team_name: "A".into(),
                player_id: "p".into(),
                player_name: "p".into(),
                amount: *amount,
                bid_amount: *amount,
                phase: AllocationPhase::Regular,
            })
            .collect();
        assert_eq!(average_price(&allocations, 1000), 101);
        assert_eq!(average_price(&[], 1000), 1000);
    }
}
