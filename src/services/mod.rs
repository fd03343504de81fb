/// Round allocation algorithm.
pub mod allocation;
/// Committee audit trail.
pub mod audit_service;
/// Periodic sweep finalizing expired rounds.
pub mod auto_finalizer;
/// Round finalization on top of the allocation algorithm.
pub mod finalization;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Round administration and lifecycle transitions.
pub mod round_service;
/// Server-Sent Events message generation.
pub mod sse_events;
/// Server-Sent Events broadcasting service.
pub mod sse_service;
/// League store connection supervisor.
pub mod storage_supervisor;
/// Sealed re-bid tiebreakers.
pub mod tiebreaker_service;
/// Transfer and swap arithmetic.
pub mod transfer_calc;
/// Transfers and swaps between teams.
pub mod transfer_service;

#[cfg(test)]
pub(crate) mod fixtures;
