/// League storage abstraction and its backends.
pub mod league_store;
/// Database model definitions.
pub mod models;
/// Storage error types shared by every backend.
pub mod storage;
