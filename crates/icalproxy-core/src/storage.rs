//! The storage capability used by reconciliation and the configuration CRUD.
//!
//! Backends implement [`StorageAdapter`]. Every method returns a boxed future
//! so the trait stays object-safe and client/server databases can be driven
//! asynchronously.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use crate::config::CalendarConfig;
use crate::record::CalendarStore;

/// A boxed future for async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors raised by storage backends.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The database rejected a statement or the connection failed.
    #[error("database error: {0}")]
    Database(String),

    /// The backend does not implement this operation.
    #[error("{backend} storage does not support {operation}")]
    Unsupported {
        backend: &'static str,
        operation: &'static str,
    },

    /// The connection string or backend selection is invalid.
    #[error("storage configuration error: {0}")]
    Configuration(String),
}

impl StorageError {
    pub fn database(message: impl std::fmt::Display) -> Self {
        Self::Database(message.to_string())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Durable per-calendar record storage plus optional calendar configuration storage.
///
/// `save_calendar` replaces the stored set for a key atomically: either every
/// record is written or the previous set is left untouched.
pub trait StorageAdapter: Send + Sync {
    /// Short backend name (`json`, `sqlite`, ...).
    fn name(&self) -> &'static str;

    /// Loads the records of `key`; an unknown key yields an empty store.
    fn load_calendar<'a>(&'a self, key: &'a str) -> BoxFuture<'a, StorageResult<CalendarStore>>;

    /// Replaces every record of `key` with `store`.
    fn save_calendar<'a>(
        &'a self,
        key: &'a str,
        store: &'a CalendarStore,
    ) -> BoxFuture<'a, StorageResult<()>>;

    /// Whether this backend stores calendar configurations.
    fn supports_configs(&self) -> bool {
        false
    }

    /// All stored calendar configurations. Backends without config storage return an empty map.
    fn list_configs(&self) -> BoxFuture<'_, StorageResult<BTreeMap<String, CalendarConfig>>> {
        Box::pin(async { Ok(BTreeMap::new()) })
    }

    fn get_config<'a>(&'a self, _name: &'a str) -> BoxFuture<'a, StorageResult<Option<CalendarConfig>>> {
        Box::pin(async { Ok(None) })
    }

    fn upsert_config<'a>(
        &'a self,
        _name: &'a str,
        _config: &'a CalendarConfig,
    ) -> BoxFuture<'a, StorageResult<()>> {
        let backend = self.name();
        Box::pin(async move {
            Err(StorageError::Unsupported {
                backend,
                operation: "calendar configurations",
            })
        })
    }

    /// Deletes a stored configuration; returns whether it existed.
    fn delete_config<'a>(&'a self, _name: &'a str) -> BoxFuture<'a, StorageResult<bool>> {
        let backend = self.name();
        Box::pin(async move {
            Err(StorageError::Unsupported {
                backend,
                operation: "calendar configurations",
            })
        })
    }
}
