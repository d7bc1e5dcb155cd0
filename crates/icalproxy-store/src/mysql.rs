//! MySQL backend on `mysql_async`.

use std::collections::BTreeMap;

use icalproxy_core::{
    BoxFuture, CalendarConfig, CalendarStore, EventRecord, StorageAdapter, StorageError,
    StorageResult,
};
use mysql_async::prelude::*;
use mysql_async::{Conn, Opts, Pool, TxOpts};
use tracing::{debug, warn};

const EVENTS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS events (
    calendar_key VARCHAR(255) NOT NULL,
    uid VARCHAR(255) NOT NULL,
    raw LONGTEXT,
    dtstart VARCHAR(64),
    dtend VARCHAR(64),
    first_seen VARCHAR(64),
    last_seen VARCHAR(64),
    PRIMARY KEY (calendar_key, uid)
) CHARACTER SET utf8mb4 COLLATE utf8mb4_unicode_ci";

const CONFIGS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS configs_calendars (
    name VARCHAR(255) PRIMARY KEY,
    json LONGTEXT
) CHARACTER SET utf8mb4 COLLATE utf8mb4_unicode_ci";

type EventRow = (
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
);

pub struct MysqlStorage {
    pool: Pool,
}

impl MysqlStorage {
    /// Connects to `url` and creates the schema if missing.
    pub async fn connect(url: &str) -> StorageResult<Self> {
        let opts = Opts::from_url(url)
            .map_err(|e| StorageError::configuration(format!("invalid mysql URL: {}", e)))?;
        let storage = Self {
            pool: Pool::new(opts),
        };
        let mut conn = storage.conn().await?;
        conn.query_drop(EVENTS_TABLE)
            .await
            .map_err(StorageError::database)?;
        conn.query_drop(CONFIGS_TABLE)
            .await
            .map_err(StorageError::database)?;
        debug!("connected to mysql storage");
        Ok(storage)
    }

    async fn conn(&self) -> StorageResult<Conn> {
        self.pool.get_conn().await.map_err(StorageError::database)
    }
}

fn parse_config(name: &str, json: Option<String>) -> Option<CalendarConfig> {
    match serde_json::from_str(json.as_deref().unwrap_or("{}")) {
        Ok(config) => Some(config),
        Err(e) => {
            warn!(calendar = %name, error = %e, "skipping unreadable stored configuration");
            None
        }
    }
}

impl StorageAdapter for MysqlStorage {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn load_calendar<'a>(&'a self, key: &'a str) -> BoxFuture<'a, StorageResult<CalendarStore>> {
        Box::pin(async move {
            let mut conn = self.conn().await?;
            let rows: Vec<EventRow> = conn
                .exec(
                    "SELECT uid, raw, dtstart, dtend, first_seen, last_seen FROM events WHERE calendar_key = ?",
                    (key,),
                )
                .await
                .map_err(StorageError::database)?;
            Ok(rows
                .into_iter()
                .map(|(uid, raw, dtstart, dtend, first_seen, last_seen)| {
                    let record = EventRecord::from_columns(
                        uid,
                        raw,
                        dtstart.as_deref(),
                        dtend.as_deref(),
                        first_seen.as_deref(),
                        last_seen.as_deref(),
                    );
                    (record.uid.clone(), record)
                })
                .collect())
        })
    }

    fn save_calendar<'a>(
        &'a self,
        key: &'a str,
        store: &'a CalendarStore,
    ) -> BoxFuture<'a, StorageResult<()>> {
        Box::pin(async move {
            let mut conn = self.conn().await?;
            // An uncommitted transaction is rolled back when dropped.
            let mut tx = conn
                .start_transaction(TxOpts::default())
                .await
                .map_err(StorageError::database)?;
            tx.exec_drop("DELETE FROM events WHERE calendar_key = ?", (key,))
                .await
                .map_err(StorageError::database)?;
            let rows: Vec<_> = store
                .iter()
                .map(|(uid, record)| {
                    let [dtstart, dtend, first_seen, last_seen] = record.time_columns();
                    mysql_async::Params::from((
                        key.to_string(),
                        uid.clone(),
                        record.raw.clone(),
                        dtstart,
                        dtend,
                        first_seen,
                        last_seen,
                    ))
                })
                .collect();
            tx.exec_batch(
                "INSERT INTO events (calendar_key, uid, raw, dtstart, dtend, first_seen, last_seen)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
                rows,
            )
            .await
            .map_err(StorageError::database)?;
            tx.commit().await.map_err(StorageError::database)?;
            debug!(calendar = %key, count = store.len(), "saved calendar");
            Ok(())
        })
    }

    fn supports_configs(&self) -> bool {
        true
    }

    fn list_configs(&self) -> BoxFuture<'_, StorageResult<BTreeMap<String, CalendarConfig>>> {
        Box::pin(async move {
            let mut conn = self.conn().await?;
            let rows: Vec<(String, Option<String>)> = conn
                .query("SELECT name, json FROM configs_calendars")
                .await
                .map_err(StorageError::database)?;
            Ok(rows
                .into_iter()
                .filter_map(|(name, json)| parse_config(&name, json).map(|config| (name, config)))
                .collect())
        })
    }

    fn get_config<'a>(&'a self, name: &'a str) -> BoxFuture<'a, StorageResult<Option<CalendarConfig>>> {
        Box::pin(async move {
            let mut conn = self.conn().await?;
            let json: Option<Option<String>> = conn
                .exec_first("SELECT json FROM configs_calendars WHERE name = ?", (name,))
                .await
                .map_err(StorageError::database)?;
            Ok(json.and_then(|json| parse_config(name, json)))
        })
    }

    fn upsert_config<'a>(
        &'a self,
        name: &'a str,
        config: &'a CalendarConfig,
    ) -> BoxFuture<'a, StorageResult<()>> {
        Box::pin(async move {
            let json = serde_json::to_string(config)?;
            let mut conn = self.conn().await?;
            conn.exec_drop(
                "INSERT INTO configs_calendars (name, json) VALUES (?, ?)
                 ON DUPLICATE KEY UPDATE json = VALUES(json)",
                (name, json),
            )
            .await
            .map_err(StorageError::database)
        })
    }

    fn delete_config<'a>(&'a self, name: &'a str) -> BoxFuture<'a, StorageResult<bool>> {
        Box::pin(async move {
            let mut conn = self.conn().await?;
            conn.exec_drop("DELETE FROM configs_calendars WHERE name = ?", (name,))
                .await
                .map_err(StorageError::database)?;
            Ok(conn.affected_rows() > 0)
        })
    }
}
