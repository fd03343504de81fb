use utoipa::{
    Modify, OpenApi,
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
};

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the league auction service.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sse::rounds_stream,
        crate::routes::rounds::list_rounds,
        crate::routes::rounds::create_round,
        crate::routes::rounds::get_round,
        crate::routes::rounds::finalize_round,
        crate::routes::rounds::finalize_preview,
        crate::routes::rounds::preview_finalization,
        crate::routes::rounds::pending_allocations,
        crate::routes::rounds::cancel_pending_allocations,
        crate::routes::rounds::apply_pending_allocations,
        crate::routes::rounds::audit_log,
        crate::routes::rounds::round_status,
        crate::routes::tiebreakers::list_round_tiebreakers,
        crate::routes::tiebreakers::resolve_tiebreaker,
        crate::routes::tiebreakers::get_tiebreaker,
        crate::routes::tiebreakers::active_tiebreaker,
        crate::routes::tiebreakers::submit_tiebreaker,
        crate::routes::transfers::preview_transfer,
        crate::routes::transfers::execute_transfer,
        crate::routes::transfers::preview_swap,
        crate::routes::transfers::execute_swap,
        crate::routes::transfers::history,
        crate::routes::transfers::limit_status,
        crate::routes::cron::finalize_rounds,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::sse::Handshake,
            crate::dto::sse::RoundUpdatedEvent,
            crate::dto::sse::RoundFinalizedEvent,
            crate::dto::sse::TiebreakerCreatedEvent,
            crate::dto::sse::TiebreakerResolvedEvent,
            crate::dto::round::CreateRoundRequest,
            crate::dto::round::RoundSummary,
            crate::dto::round::AllocationSummary,
            crate::dto::round::RoundCheckOutcome,
            crate::dto::round::RoundCheckResponse,
            crate::dto::round::PreviewFinalizationResponse,
            crate::dto::round::PendingAllocationView,
            crate::dto::round::PendingAllocationsResponse,
            crate::dto::round::ApplyAllocationsResponse,
            crate::dto::round::CancelAllocationsResponse,
            crate::dto::round::FinalizeStepsResponse,
            crate::dto::round::SweepResponse,
            crate::dto::tiebreaker::ResolutionMode,
            crate::dto::tiebreaker::ResolveTiebreakerRequest,
            crate::dto::tiebreaker::SubmitTiebreakerRequest,
            crate::dto::tiebreaker::TeamTiebreakerView,
            crate::dto::tiebreaker::TiebreakerView,
            crate::dto::tiebreaker::ResolutionResponse,
            crate::dto::tiebreaker::SubmissionResponse,
            crate::dto::tiebreaker::ActiveTiebreakerResponse,
            crate::dto::transfer::TransferRequest,
            crate::dto::transfer::SwapRequest,
            crate::dto::transfer::TransferLimitStatus,
            crate::dto::transfer::ContractParty,
            crate::dto::transfer::BudgetCheck,
            crate::dto::transfer::TransferOutcome,
            crate::dto::transfer::SwapOutcome,
            crate::dto::transfer::TransactionView,
            crate::dto::audit::AuditEntryView,
            crate::services::allocation::CandidateBid,
            crate::services::allocation::Allocation,
            crate::services::allocation::StepAction,
            crate::services::allocation::AllocationStep,
            crate::services::transfer_calc::CashDirection,
            crate::services::transfer_calc::PlayerRevaluation,
            crate::services::transfer_calc::TransferCalculation,
            crate::services::transfer_calc::SwapCalculation,
            crate::dao::models::RoundStatus,
            crate::dao::models::FinalizationMode,
            crate::dao::models::BidStatus,
            crate::dao::models::AllocationPhase,
            crate::dao::models::CurrencySystem,
            crate::dao::models::TiebreakerStatus,
            crate::dao::models::PlayerType,
            crate::dao::models::TransactionKind,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sse", description = "Server-sent events streams"),
        (name = "rounds", description = "Auction rounds and their finalization"),
        (name = "tiebreakers", description = "Sealed re-bids between tied teams"),
        (name = "transfers", description = "Player transfers and swaps between teams"),
    )
)]
pub struct ApiDoc;

/// Registers the `bearer` scheme referenced by authenticated paths.
struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_authenticated_paths() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/admin/rounds"));
        assert!(doc.paths.paths.contains_key("/tiebreakers/{id}/submit"));
        assert!(
            doc.components
                .as_ref()
                .is_some_and(|components| components.security_schemes.contains_key("bearer"))
        );
    }
}
