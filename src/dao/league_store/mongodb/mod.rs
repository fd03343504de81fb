mod config;
mod connection;
mod error;
pub mod store;

pub use config::MongoConfig;
pub use error::MongoDaoError;
pub use store::MongoLeagueStore;

use crate::dao::storage::StorageError;

impl From<MongoDaoError> for StorageError {
    fn from(err: MongoDaoError) -> Self {
        match err {
            MongoDaoError::MissingRecord { what } => StorageError::MissingRecord(what),
            other => StorageError::unavailable(other.to_string(), other),
        }
    }
}
