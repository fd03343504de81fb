use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::{dao::models::AuditEntryEntity, dto::format_system_time};

fn default_limit() -> usize {
    100
}

/// Paging of the audit endpoint.
#[derive(Debug, Deserialize, IntoParams, Validate)]
#[into_params(parameter_in = Query)]
pub struct AuditQuery {
    /// Number of entries to return (1 to 500, default 100).
    #[serde(default = "default_limit")]
    #[validate(range(min = 1, max = 500))]
    pub limit: usize,
}

/// Committee action log entry.
#[derive(Debug, Serialize, ToSchema)]
pub struct AuditEntryView {
    pub id: Uuid,
    pub action: String,
    pub actor: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub round_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub season_id: Option<String>,
    pub success: bool,
    #[schema(value_type = Object)]
    pub detail: Value,
    pub created_at: String,
}

impl From<AuditEntryEntity> for AuditEntryView {
    fn from(value: AuditEntryEntity) -> Self {
        Self {
            id: value.id,
            action: value.action,
            actor: value.actor,
            round_id: value.round_id,
            season_id: value.season_id,
            success: value.success,
            detail: value.detail,
            created_at: format_system_time(value.created_at),
        }
    }
}
