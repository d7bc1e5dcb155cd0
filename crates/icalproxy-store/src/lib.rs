//! Storage backends for the calendar proxy.
//!
//! Every backend implements [`icalproxy_core::StorageAdapter`]. Pick one from
//! a connection string with [`open_storage`]:
//!
//! ```no_run
//! # async fn demo() -> icalproxy_core::StorageResult<()> {
//! let storage = icalproxy_store::open_storage("sqlite:///var/lib/icalproxy/proxy.db").await?;
//! let records = storage.load_calendar("work").await?;
//! # Ok(()) }
//! ```
//!
//! SQLite is built by default; PostgreSQL and MySQL sit behind the `postgres`
//! and `mysql` features.

pub mod factory;
pub mod json;
#[cfg(feature = "mysql")]
pub mod mysql;
#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use factory::{StorageKind, open_kind, open_storage};
pub use json::JsonStorage;
#[cfg(feature = "mysql")]
pub use mysql::MysqlStorage;
#[cfg(feature = "postgres")]
pub use postgres::PostgresStorage;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStorage;
