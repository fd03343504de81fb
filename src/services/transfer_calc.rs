//! Transfer market arithmetic: value multipliers, committee fees, star upgrades
//! and salaries. Every money amount is rounded to cents.

use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::dao::models::{PlayerType, round2};

/// Lowest star rating a contract can carry.
pub const MIN_STAR: u8 = 3;
/// Highest star rating a contract can carry.
pub const MAX_STAR: u8 = 10;
/// Share of the new value charged as committee fee on a transfer.
pub const TRANSFER_FEE_RATE: f64 = 0.10;
/// Points earned per currency unit of value increase.
pub const POINTS_PER_VALUE_RATIO: f64 = 0.2;
/// Cash in a swap may not exceed this share of the larger player value.
pub const MAX_CASH_RATE: f64 = 0.30;

/// Value multiplier per star rating, starting at 3 stars.
const STAR_MULTIPLIERS: [f64; 8] = [1.15, 1.20, 1.25, 1.30, 1.35, 1.40, 1.45, 1.50];

/// Minimum points for each star rating; 10 stars has no upper bound.
const STAR_POINT_FLOORS: [(u8, i64); 8] = [
    (3, 100),
    (4, 120),
    (5, 145),
    (6, 175),
    (7, 210),
    (8, 250),
    (9, 300),
    (10, 400),
];

/// Rejected calculation input.
#[derive(Debug, Error, PartialEq)]
pub enum CalcError {
    /// Values must be finite and non-negative.
    #[error("{0} must be non-negative")]
    Negative(&'static str),
    /// Star ratings are bounded.
    #[error("star rating must be between 3 and 10 (got {0})")]
    StarOutOfRange(u8),
    /// Swap cash over the allowed share.
    #[error("cash amount ({amount}) exceeds 30% limit; maximum allowed: {max_allowed}")]
    CashOverLimit {
        /// Requested cash.
        amount: f64,
        /// Allowed maximum.
        max_allowed: f64,
    },
}

/// Direction of the optional cash component of a swap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, serde::Deserialize, ToSchema)]
pub enum CashDirection {
    /// Team A pays team B.
    #[serde(rename = "A_to_B")]
    AToB,
    /// Team B pays team A.
    #[serde(rename = "B_to_A")]
    BToA,
    /// No cash changes hands.
    #[default]
    #[serde(rename = "none")]
    None,
}

fn check_star(star: u8) -> Result<(), CalcError> {
    if (MIN_STAR..=MAX_STAR).contains(&star) {
        Ok(())
    } else {
        Err(CalcError::StarOutOfRange(star))
    }
}

fn check_non_negative(value: f64, what: &'static str) -> Result<(), CalcError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(CalcError::Negative(what))
    }
}

/// Value multiplier for a star rating: 1.15 at 3 stars, +0.05 per star.
pub fn star_multiplier(star: u8) -> Result<f64, CalcError> {
    check_star(star)?;
    Ok(STAR_MULTIPLIERS[usize::from(star - MIN_STAR)])
}

/// Value after a move.
pub fn new_value(current: f64, star: u8) -> Result<f64, CalcError> {
    check_non_negative(current, "current value")?;
    Ok(round2(current * star_multiplier(star)?))
}

/// Committee fee on a transfer.
pub fn committee_fee(new_value: f64) -> Result<f64, CalcError> {
    check_non_negative(new_value, "new value")?;
    Ok(round2(new_value * TRANSFER_FEE_RATE))
}

/// Fixed committee fee paid for receiving a player in a swap.
pub fn swap_fee(star: u8) -> Result<f64, CalcError> {
    check_star(star)?;
    Ok(f64::from(star) * 10.0)
}

/// Star rating reached with `points`. Totals under the 3-star floor stay at 3 stars.
pub fn star_for_points(points: i64) -> u8 {
    STAR_POINT_FLOORS
        .iter()
        .rev()
        .find(|(_, floor)| points >= *floor)
        .map(|(star, _)| *star)
        .unwrap_or(MIN_STAR)
}

/// Points and star rating after a value increase.
pub fn upgrade(current_points: i64, value_increase: f64) -> Result<(i64, u8), CalcError> {
    if current_points < 0 {
        return Err(CalcError::Negative("current points"));
    }
    check_non_negative(value_increase, "value increase")?;
    let points = current_points + (value_increase * POINTS_PER_VALUE_RATIO).round() as i64;
    Ok((points, star_for_points(points)))
}

/// Salary per match for a contract value.
pub fn salary(value: f64, player_type: PlayerType) -> Result<f64, CalcError> {
    check_non_negative(value, "value")?;
    let rate = match player_type {
        PlayerType::Real => 0.007,
        PlayerType::Football => 0.003,
    };
    Ok(round2(value * rate))
}

/// Contract facts a calculation starts from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContractFigures {
    /// Current value.
    pub value: f64,
    /// Current star rating.
    pub star_rating: u8,
    /// Current points.
    pub points: i64,
    /// Contract kind.
    pub player_type: PlayerType,
}

/// Effect of a move on one player.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
pub struct PlayerRevaluation {
    /// Value before the move.
    pub original_value: f64,
    /// Value after the move.
    pub new_value: f64,
    /// Multiplier used.
    pub star_multiplier: f64,
    /// Committee fee attached to this player.
    pub committee_fee: f64,
    /// Star rating after the move.
    pub new_star_rating: u8,
    /// Points after the move.
    pub new_points: i64,
    /// Points gained.
    pub points_added: i64,
    /// Salary after the move.
    pub new_salary: f64,
}

fn revalue(figures: ContractFigures, fee: Option<f64>) -> Result<PlayerRevaluation, CalcError> {
    let new_value = new_value(figures.value, figures.star_rating)?;
    let committee_fee = match fee {
        Some(fee) => fee,
        None => committee_fee(new_value)?,
    };
    let (new_points, new_star_rating) = upgrade(figures.points, new_value - figures.value)?;
    Ok(PlayerRevaluation {
        original_value: figures.value,
        new_value,
        star_multiplier: star_multiplier(figures.star_rating)?,
        committee_fee,
        new_star_rating,
        new_points,
        points_added: new_points - figures.points,
        new_salary: salary(new_value, figures.player_type)?,
    })
}

/// Full breakdown of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
pub struct TransferCalculation {
    /// Player revaluation.
    pub player: PlayerRevaluation,
    /// New value plus committee fee.
    pub buying_team_pays: f64,
    /// New value minus committee fee.
    pub selling_team_receives: f64,
}

/// Compute a transfer.
pub fn transfer(figures: ContractFigures) -> Result<TransferCalculation, CalcError> {
    let player = revalue(figures, None)?;
    Ok(TransferCalculation {
        player,
        buying_team_pays: round2(player.new_value + player.committee_fee),
        selling_team_receives: round2(player.new_value - player.committee_fee),
    })
}

/// Full breakdown of a swap.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
pub struct SwapCalculation {
    /// Player A (moves from team A to team B).
    pub player_a: PlayerRevaluation,
    /// Player B (moves from team B to team A).
    pub player_b: PlayerRevaluation,
    /// Cash component.
    pub cash_amount: f64,
    /// Cash direction.
    pub cash_direction: CashDirection,
    /// Fee for player B plus cash when team A pays.
    pub team_a_pays: f64,
    /// Fee for player A plus cash when team B pays.
    pub team_b_pays: f64,
    /// Sum of both fixed fees.
    pub total_committee_fees: f64,
}

/// Compute a swap. Each team pays the fixed fee of the player it receives.
pub fn swap(
    a: ContractFigures,
    b: ContractFigures,
    cash_amount: f64,
    cash_direction: CashDirection,
) -> Result<SwapCalculation, CalcError> {
    check_non_negative(cash_amount, "cash amount")?;
    let cash_amount = match cash_direction {
        CashDirection::None => 0.0,
        _ => cash_amount,
    };
    if cash_amount > 0.0 {
        let max_allowed = round2(a.value * MAX_CASH_RATE).max(round2(b.value * MAX_CASH_RATE));
        if cash_amount > max_allowed {
            return Err(CalcError::CashOverLimit {
                amount: cash_amount,
                max_allowed,
            });
        }
    }

    let player_a = revalue(a, Some(swap_fee(a.star_rating)?))?;
    let player_b = revalue(b, Some(swap_fee(b.star_rating)?))?;

    let (cash_a, cash_b) = match cash_direction {
        CashDirection::AToB => (cash_amount, 0.0),
        CashDirection::BToA => (0.0, cash_amount),
        CashDirection::None => (0.0, 0.0),
    };

    Ok(SwapCalculation {
        player_a,
        player_b,
        cash_amount,
        cash_direction,
        team_a_pays: round2(player_b.committee_fee + cash_a),
        team_b_pays: round2(player_a.committee_fee + cash_b),
        total_committee_fees: player_a.committee_fee + player_b.committee_fee,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn figures(value: f64, star_rating: u8, points: i64, player_type: PlayerType) -> ContractFigures {
        ContractFigures {
            value,
            star_rating,
            points,
            player_type,
        }
    }

    #[test]
    fn multipliers_step_by_five_percent() {
        assert_eq!(star_multiplier(3).unwrap(), 1.15);
        assert_eq!(star_multiplier(5).unwrap(), 1.25);
        assert_eq!(star_multiplier(10).unwrap(), 1.50);
        assert_eq!(star_multiplier(2), Err(CalcError::StarOutOfRange(2)));
        assert_eq!(star_multiplier(11), Err(CalcError::StarOutOfRange(11)));
    }

    #[test]
    fn reference_transfer() {
        let calc = transfer(figures(225.0, 5, 192, PlayerType::Real)).unwrap();
        assert_eq!(calc.player.new_value, 281.25);
        assert_eq!(calc.player.committee_fee, 28.13);
        assert_eq!(calc.buying_team_pays, 309.38);
        assert_eq!(calc.selling_team_receives, 253.12);
        assert_eq!(calc.player.new_salary, 1.97);
        assert_eq!(calc.player.points_added, 11);
        assert_eq!(calc.player.new_points, 203);
        assert_eq!(calc.player.new_star_rating, 6);
    }

    #[test]
    fn salaries_follow_player_type() {
        assert_eq!(salary(390.0, PlayerType::Real).unwrap(), 2.73);
        assert_eq!(salary(46.0, PlayerType::Football).unwrap(), 0.14);
    }

    #[test]
    fn star_thresholds() {
        assert_eq!(star_for_points(50), 3);
        assert_eq!(star_for_points(100), 3);
        assert_eq!(star_for_points(119), 3);
        assert_eq!(star_for_points(120), 4);
        assert_eq!(star_for_points(209), 6);
        assert_eq!(star_for_points(210), 7);
        assert_eq!(star_for_points(399), 9);
        assert_eq!(star_for_points(10_000), 10);
    }

    #[test]
    fn swap_fees_and_cash() {
        let calc = swap(
            figures(225.0, 5, 192, PlayerType::Real),
            figures(300.0, 6, 220, PlayerType::Football),
            50.0,
            CashDirection::AToB,
        )
        .unwrap();

        assert_eq!(calc.player_a.committee_fee, 50.0);
        assert_eq!(calc.player_b.committee_fee, 60.0);
        assert_eq!(calc.team_a_pays, 110.0);
        assert_eq!(calc.team_b_pays, 50.0);
        assert_eq!(calc.total_committee_fees, 110.0);
        assert_eq!(calc.player_b.new_value, 390.0);
        assert_eq!(calc.player_b.new_salary, 1.17);
    }

    #[test]
    fn swap_cash_is_capped_by_larger_value() {
        let err = swap(
            figures(100.0, 3, 100, PlayerType::Real),
            figures(200.0, 3, 100, PlayerType::Real),
            60.01,
            CashDirection::BToA,
        )
        .unwrap_err();
        assert_eq!(
            err,
            CalcError::CashOverLimit {
                amount: 60.01,
                max_allowed: 60.0
            }
        );
    }

    #[test]
    fn cash_without_direction_is_ignored() {
        let calc = swap(
            figures(100.0, 3, 100, PlayerType::Real),
            figures(100.0, 3, 100, PlayerType::Real),
            500.0,
            CashDirection::None,
        )
        .unwrap();
        assert_eq!(calc.cash_amount, 0.0);
        assert_eq!(calc.team_a_pays, 30.0);
        assert_eq!(calc.team_b_pays, 30.0);
    }

    #[test]
    fn negative_inputs_are_rejected() {
        assert_eq!(new_value(-1.0, 5), Err(CalcError::Negative("current value")));
        assert_eq!(upgrade(-1, 10.0), Err(CalcError::Negative("current points")));
        assert!(transfer(figures(100.0, 12, 0, PlayerType::Real)).is_err());
    }
}
