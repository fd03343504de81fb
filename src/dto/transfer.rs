use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::models::{PlayerTransactionEntity, PlayerType, TransactionKind},
    dto::{
        format_system_time,
        validation::{validate_league_id, validate_money},
    },
    services::transfer_calc::{CashDirection, SwapCalculation, TransferCalculation},
};

fn default_player_type() -> PlayerType {
    PlayerType::Real
}

/// Move one contracted player to another team.
#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
pub struct TransferRequest {
    #[validate(custom(function = "validate_league_id"))]
    pub player_id: String,
    /// Defaults to `real`.
    #[serde(default = "default_player_type")]
    pub player_type: PlayerType,
    #[validate(custom(function = "validate_league_id"))]
    pub new_team_id: String,
    #[validate(custom(function = "validate_league_id"))]
    pub season_id: String,
}

/// Exchange two contracted players between their teams.
#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
pub struct SwapRequest {
    #[validate(custom(function = "validate_league_id"))]
    pub player_a_id: String,
    /// Defaults to `real`.
    #[serde(default = "default_player_type")]
    pub player_a_type: PlayerType,
    #[validate(custom(function = "validate_league_id"))]
    pub player_b_id: String,
    /// Defaults to `real`.
    #[serde(default = "default_player_type")]
    pub player_b_type: PlayerType,
    /// Optional cash paid on top of the fees.
    #[serde(default)]
    #[validate(custom(function = "validate_money"))]
    pub cash_amount: f64,
    #[serde(default)]
    pub cash_direction: CashDirection,
    #[validate(custom(function = "validate_league_id"))]
    pub season_id: String,
}

/// Query of the transaction history endpoint.
#[derive(Debug, Deserialize, IntoParams, Validate)]
#[into_params(parameter_in = Query)]
pub struct HistoryQuery {
    #[validate(custom(function = "validate_league_id"))]
    pub season_id: String,
}

/// Transfer usage of a team within a season.
#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
pub struct TransferLimitStatus {
    pub team_id: String,
    pub season_id: String,
    pub used: u32,
    pub limit: u32,
    pub remaining: u32,
    pub can_transfer: bool,
}

impl TransferLimitStatus {
    /// Build the status from the number of operations already performed.
    pub fn new(team_id: String, season_id: String, used: u32, limit: u32) -> Self {
        let remaining = limit.saturating_sub(used);
        Self {
            team_id,
            season_id,
            used,
            limit,
            remaining,
            can_transfer: remaining > 0,
        }
    }
}

/// Player side of a market operation.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ContractParty {
    pub player_id: String,
    pub player_name: String,
    pub player_type: PlayerType,
    pub from_team_id: String,
    pub to_team_id: String,
}

/// Budget check of one team for a market operation.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BudgetCheck {
    pub team_id: String,
    /// Budget line charged.
    pub player_type: PlayerType,
    /// `None` when the team has no budget for that line.
    pub available: Option<f64>,
    pub required: f64,
    pub sufficient: bool,
}

/// Calculated transfer, with or without execution.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TransferOutcome {
    /// Set once the transfer was committed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<Uuid>,
    pub player: ContractParty,
    pub calculation: TransferCalculation,
    pub buying_team_budget: BudgetCheck,
    pub selling_team_limit: TransferLimitStatus,
    pub buying_team_limit: TransferLimitStatus,
}

/// Calculated swap, with or without execution.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SwapOutcome {
    /// Set once the swap was committed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<Uuid>,
    pub player_a: ContractParty,
    pub player_b: ContractParty,
    pub calculation: SwapCalculation,
    pub team_a_budget: BudgetCheck,
    pub team_b_budget: BudgetCheck,
    pub team_a_limit: TransferLimitStatus,
    pub team_b_limit: TransferLimitStatus,
}

/// Stored market operation.
#[derive(Debug, Serialize, ToSchema)]
pub struct TransactionView {
    pub id: Uuid,
    pub season_id: String,
    pub kind: TransactionKind,
    pub team_ids: Vec<String>,
    pub player_ids: Vec<String>,
    #[schema(value_type = Object)]
    pub details: Value,
    pub performed_by: String,
    pub created_at: String,
}

impl From<PlayerTransactionEntity> for TransactionView {
    fn from(value: PlayerTransactionEntity) -> Self {
        Self {
            id: value.id,
            season_id: value.season_id,
            kind: value.kind,
            team_ids: value.team_ids,
            player_ids: value.player_ids,
            details: value.details,
            performed_by: value.performed_by,
            created_at: format_system_time(value.created_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swap_request_defaults() {
        let request: SwapRequest = serde_json::from_str(
            r#"{"player_a_id":"P1","player_b_id":"P2","season_id":"S16"}"#,
        )
        .unwrap();
        assert_eq!(request.player_a_type, PlayerType::Real);
        assert_eq!(request.player_b_type, PlayerType::Real);
        assert_eq!(request.cash_amount, 0.0);
        assert_eq!(request.cash_direction, CashDirection::None);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn swap_request_rejects_bad_cash() {
        let request: SwapRequest = serde_json::from_str(
            r#"{"player_a_id":"P1","player_b_id":"P2","season_id":"S16","cash_amount":-5,"cash_direction":"A_to_B"}"#,
        )
        .unwrap();
        assert!(request.validate().is_err());
        assert!(
            serde_json::from_str::<SwapRequest>(
                r#"{"player_a_id":"P1","player_b_id":"P2","season_id":"S16","cash_direction":"sideways"}"#,
            )
            .is_err()
        );
    }

    #[test]
    fn limit_status_saturates() {
        let status = TransferLimitStatus::new("T1".into(), "S1".into(), 3, 2);
        assert_eq!(status.remaining, 0);
        assert!(!status.can_transfer);
    }
}
