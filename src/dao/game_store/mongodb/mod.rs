mod config;
mod connection;
mod error;
mod models;
pub mod store;

pub use config::MongoConfig;
pub use error::MongoDaoError;
pub use store::MongoStore;

use crate::dao::storage::StorageError;

/// MongoDB server error code for unique index violations.
const DUPLICATE_KEY_CODE: i32 = 11000;

impl From<MongoDaoError> for StorageError {
    fn from(err: MongoDaoError) -> Self {
        if err.is_duplicate_key() {
            return StorageError::conflict(err.to_string());
        }
        StorageError::unavailable(err.to_string(), err)
    }
}
