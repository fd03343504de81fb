//! Library crate for league-auction, exposing modules for binaries and integration tests.

/// Token, finalizer and league rule configuration.
pub mod config;
/// Storage abstraction, models and backends.
pub mod dao;
/// Request and response payloads.
pub mod dto;
/// Service and HTTP error types.
pub mod error;
/// HTTP route trees.
pub mod routes;
/// Business logic behind the routes.
pub mod services;
/// Shared application state.
pub mod state;
