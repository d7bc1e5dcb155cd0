//! SQLite backend.
//!
//! Two tables: `events` (one row per calendar key and uid, timestamps as
//! ISO 8601 text) and `configs_calendars` (calendar configurations as JSON).
//! Blocking `rusqlite` calls run on tokio's blocking pool.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use icalproxy_core::{
    BoxFuture, CalendarConfig, CalendarStore, EventRecord, StorageAdapter, StorageError,
    StorageResult,
};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, warn};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS events (
    calendar_key TEXT NOT NULL,
    uid TEXT NOT NULL,
    raw TEXT,
    dtstart TEXT,
    dtend TEXT,
    first_seen TEXT,
    last_seen TEXT,
    PRIMARY KEY (calendar_key, uid)
);
CREATE TABLE IF NOT EXISTS configs_calendars (
    name TEXT PRIMARY KEY,
    json TEXT
);
";

pub struct SqliteStorage {
    path: PathBuf,
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStorage {
    /// Opens (creating if needed) the database at `path` and its schema.
    pub fn open(path: impl Into<PathBuf>) -> StorageResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&path).map_err(StorageError::database)?;
        conn.execute_batch(SCHEMA).map_err(StorageError::database)?;
        debug!(path = %path.display(), "opened sqlite storage");
        Ok(Self {
            path,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn with_conn<T, F>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&mut Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StorageError::database("sqlite connection lock poisoned"))?;
            f(&mut guard).map_err(StorageError::database)
        })
        .await
        .map_err(StorageError::database)?
    }
}

fn parse_config(name: &str, json: Option<String>) -> Option<CalendarConfig> {
    let json = json.unwrap_or_else(|| "{}".to_string());
    match serde_json::from_str(&json) {
        Ok(config) => Some(config),
        Err(e) => {
            warn!(calendar = %name, error = %e, "skipping unreadable stored configuration");
            None
        }
    }
}

impl StorageAdapter for SqliteStorage {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn load_calendar<'a>(&'a self, key: &'a str) -> BoxFuture<'a, StorageResult<CalendarStore>> {
        let key = key.to_string();
        Box::pin(self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT uid, raw, dtstart, dtend, first_seen, last_seen FROM events WHERE calendar_key = ?1",
            )?;
            let rows = stmt.query_map([&key], |row| {
                let times: [Option<String>; 4] =
                    [row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?];
                Ok(EventRecord::from_columns(
                    row.get(0)?,
                    row.get(1)?,
                    times[0].as_deref(),
                    times[1].as_deref(),
                    times[2].as_deref(),
                    times[3].as_deref(),
                ))
            })?;
            let mut store = CalendarStore::new();
            for record in rows {
                let record = record?;
                store.insert(record.uid.clone(), record);
            }
            Ok(store)
        }))
    }

    fn save_calendar<'a>(
        &'a self,
        key: &'a str,
        store: &'a CalendarStore,
    ) -> BoxFuture<'a, StorageResult<()>> {
        let key = key.to_string();
        let store = store.clone();
        Box::pin(self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM events WHERE calendar_key = ?1", [&key])?;
            {
                let mut insert = tx.prepare(
                    "INSERT INTO events (calendar_key, uid, raw, dtstart, dtend, first_seen, last_seen)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                )?;
                for (uid, record) in &store {
                    let [dtstart, dtend, first_seen, last_seen] = record.time_columns();
                    insert.execute(params![key, uid, record.raw, dtstart, dtend, first_seen, last_seen])?;
                }
            }
            tx.commit()?;
            debug!(calendar = %key, count = store.len(), "saved calendar");
            Ok(())
        }))
    }

    fn supports_configs(&self) -> bool {
        true
    }

    fn list_configs(&self) -> BoxFuture<'_, StorageResult<BTreeMap<String, CalendarConfig>>> {
        Box::pin(async move {
            let rows = self
                .with_conn(|conn| {
                    let mut stmt = conn.prepare("SELECT name, json FROM configs_calendars")?;
                    let rows = stmt
                        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?)))?
                        .collect::<rusqlite::Result<Vec<_>>>()?;
                    Ok(rows)
                })
                .await?;
            Ok(rows
                .into_iter()
                .filter_map(|(name, json)| parse_config(&name, json).map(|config| (name, config)))
                .collect())
        })
    }

    fn get_config<'a>(&'a self, name: &'a str) -> BoxFuture<'a, StorageResult<Option<CalendarConfig>>> {
        let owned = name.to_string();
        Box::pin(async move {
            let json = self
                .with_conn(move |conn| {
                    conn.query_row(
                        "SELECT json FROM configs_calendars WHERE name = ?1",
                        [&owned],
                        |row| row.get::<_, Option<String>>(0),
                    )
                    .optional()
                })
                .await?;
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
            let name = name.to_string();
            self.with_conn(move |conn| {
                conn.execute(
                    "INSERT INTO configs_calendars (name, json) VALUES (?1, ?2)
                     ON CONFLICT(name) DO UPDATE SET json = excluded.json",
                    params![name, json],
                )?;
                Ok(())
            })
            .await
        })
    }

    fn delete_config<'a>(&'a self, name: &'a str) -> BoxFuture<'a, StorageResult<bool>> {
        let name = name.to_string();
        Box::pin(self.with_conn(move |conn| {
            let changed = conn.execute("DELETE FROM configs_calendars WHERE name = ?1", [&name])?;
            Ok(changed > 0)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use icalproxy_core::RuleConfig;

    fn open(dir: &tempfile::TempDir) -> SqliteStorage {
        SqliteStorage::open(dir.path().join("db").join("proxy.db")).unwrap()
    }

    fn record(uid: &str) -> EventRecord {
        let t = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        EventRecord::new(uid, format!("BEGIN:VEVENT\r\nUID:{}\r\nEND:VEVENT\r\n", uid))
            .with_times(Some(t), Some(t))
            .with_seen(t, t)
    }

    #[tokio::test]
    async fn calendars_round_trip_and_replace() {
        let dir = tempfile::tempdir().unwrap();
        let storage = open(&dir);
        assert!(storage.load_calendar("work").await.unwrap().is_empty());

        let mut store = CalendarStore::new();
        store.insert("a".into(), record("a"));
        store.insert("b".into(), record("b"));
        storage.save_calendar("work", &store).await.unwrap();
        storage.save_calendar("home", &store).await.unwrap();
        assert_eq!(storage.load_calendar("work").await.unwrap(), store);

        store.remove("a");
        storage.save_calendar("work", &store).await.unwrap();
        assert_eq!(storage.load_calendar("work").await.unwrap(), store);
        assert_eq!(storage.load_calendar("home").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = CalendarStore::new();
        store.insert("a".into(), record("a"));
        open(&dir).save_calendar("work", &store).await.unwrap();

        let reopened = open(&dir);
        assert_eq!(reopened.load_calendar("work").await.unwrap(), store);
    }

    #[tokio::test]
    async fn config_crud() {
        let dir = tempfile::tempdir().unwrap();
        let storage = open(&dir);
        assert!(storage.supports_configs());

        let config = CalendarConfig::new("https://example.com/a.ics")
            .with_rule(RuleConfig::new("summary", "contains", "Sync"));
        storage.upsert_config("work", &config).await.unwrap();
        assert_eq!(storage.get_config("work").await.unwrap(), Some(config.clone()));

        let updated = CalendarConfig::new("https://example.com/b.ics");
        storage.upsert_config("work", &updated).await.unwrap();
        let all = storage.list_configs().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all["work"], updated);

        assert!(storage.delete_config("work").await.unwrap());
        assert!(!storage.delete_config("work").await.unwrap());
        assert_eq!(storage.get_config("work").await.unwrap(), None);
    }

    #[tokio::test]
    async fn unreadable_configs_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let storage = open(&dir);
        storage
            .with_conn(|conn| {
                conn.execute(
                    "INSERT INTO configs_calendars (name, json) VALUES ('bad', 'not json')",
                    [],
                )?;
                Ok(())
            })
            .await
            .unwrap();
        storage
            .upsert_config("good", &CalendarConfig::new("https://example.com/g.ics"))
            .await
            .unwrap();

        let all = storage.list_configs().await.unwrap();
        assert_eq!(all.keys().collect::<Vec<_>>(), ["good"]);
        assert_eq!(storage.get_config("bad").await.unwrap(), None);
    }
}
