use std::time::SystemTime;

use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::{
    dao::models::AuditEntryEntity, dto::audit::AuditEntryView, error::ServiceError,
    state::SharedState,
};

/// Largest page served by the audit endpoint.
pub const MAX_AUDIT_PAGE: usize = 500;

/// Committee action to record.
pub struct AuditRecord<'a> {
    pub action: &'a str,
    pub actor: &'a str,
    pub round_id: Option<Uuid>,
    pub season_id: Option<&'a str>,
    pub success: bool,
    pub detail: Value,
}

/// Persist an audit entry. Failures are logged and swallowed.
pub async fn record(state: &SharedState, record: AuditRecord<'_>) {
    let Some(store) = state.store().await else {
        warn!(action = record.action, "audit entry dropped; no storage backend");
        return;
    };

    let entry = AuditEntryEntity {
        id: Uuid::new_v4(),
        action: record.action.to_owned(),
        actor: record.actor.to_owned(),
        round_id: record.round_id,
        season_id: record.season_id.map(str::to_owned),
        success: record.success,
        detail: record.detail,
        created_at: SystemTime::now(),
    };

    if let Err(err) = store.insert_audit(entry).await {
        warn!(action = record.action, error = %err, "failed to write audit entry");
    }
}

/// Most recent audit entries, newest first.
pub async fn list_recent(
    state: &SharedState,
    limit: usize,
) -> Result<Vec<AuditEntryView>, ServiceError> {
    let store = state.require_store().await?;
    let entries = store.list_audit(limit.clamp(1, MAX_AUDIT_PAGE)).await?;
    Ok(entries.into_iter().map(Into::into).collect())
}
