//! PostgreSQL backend on `tokio-postgres`. Same schema as the SQLite backend.

use std::collections::BTreeMap;

use icalproxy_core::{
    BoxFuture, CalendarConfig, CalendarStore, EventRecord, StorageAdapter, StorageError,
    StorageResult,
};
use tokio::sync::Mutex;
use tokio_postgres::{Client, NoTls, Row};
use tracing::{debug, error, warn};

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

pub struct PostgresStorage {
    client: Mutex<Client>,
}

impl PostgresStorage {
    /// Connects to `url` and creates the schema if missing.
    pub async fn connect(url: &str) -> StorageResult<Self> {
        let (client, connection) = tokio_postgres::connect(url, NoTls)
            .await
            .map_err(StorageError::database)?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "postgres connection closed");
            }
        });
        client
            .batch_execute(SCHEMA)
            .await
            .map_err(StorageError::database)?;
        debug!("connected to postgres storage");
        Ok(Self {
            client: Mutex::new(client),
        })
    }
}

fn record_from_row(row: &Row) -> Result<EventRecord, tokio_postgres::Error> {
    let times: [Option<String>; 4] = [
        row.try_get(2)?,
        row.try_get(3)?,
        row.try_get(4)?,
        row.try_get(5)?,
    ];
    Ok(EventRecord::from_columns(
        row.try_get(0)?,
        row.try_get(1)?,
        times[0].as_deref(),
        times[1].as_deref(),
        times[2].as_deref(),
        times[3].as_deref(),
    ))
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

impl StorageAdapter for PostgresStorage {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn load_calendar<'a>(&'a self, key: &'a str) -> BoxFuture<'a, StorageResult<CalendarStore>> {
        Box::pin(async move {
            let client = self.client.lock().await;
            let rows = client
                .query(
                    "SELECT uid, raw, dtstart, dtend, first_seen, last_seen FROM events WHERE calendar_key = $1",
                    &[&key],
                )
                .await
                .map_err(StorageError::database)?;
            let mut store = CalendarStore::new();
            for row in &rows {
                let record = record_from_row(row).map_err(StorageError::database)?;
                store.insert(record.uid.clone(), record);
            }
            Ok(store)
        })
    }

    fn save_calendar<'a>(
        &'a self,
        key: &'a str,
        store: &'a CalendarStore,
    ) -> BoxFuture<'a, StorageResult<()>> {
        Box::pin(async move {
            let mut client = self.client.lock().await;
            // Dropping the transaction without commit rolls it back.
            let tx = client.transaction().await.map_err(StorageError::database)?;
            tx.execute("DELETE FROM events WHERE calendar_key = $1", &[&key])
                .await
                .map_err(StorageError::database)?;
            let insert = tx
                .prepare(
                    "INSERT INTO events (calendar_key, uid, raw, dtstart, dtend, first_seen, last_seen)
                     VALUES ($1, $2, $3, $4, $5, $6, $7)",
                )
                .await
                .map_err(StorageError::database)?;
            for (uid, record) in store {
                let [dtstart, dtend, first_seen, last_seen] = record.time_columns();
                tx.execute(
                    &insert,
                    &[&key, uid, &record.raw, &dtstart, &dtend, &first_seen, &last_seen],
                )
                .await
                .map_err(StorageError::database)?;
            }
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
            let client = self.client.lock().await;
            let rows = client
                .query("SELECT name, json FROM configs_calendars", &[])
                .await
                .map_err(StorageError::database)?;
            let mut configs = BTreeMap::new();
            for row in &rows {
                let name: String = row.try_get(0).map_err(StorageError::database)?;
                let json: Option<String> = row.try_get(1).map_err(StorageError::database)?;
                if let Some(config) = parse_config(&name, json) {
                    configs.insert(name, config);
                }
            }
            Ok(configs)
        })
    }

    fn get_config<'a>(&'a self, name: &'a str) -> BoxFuture<'a, StorageResult<Option<CalendarConfig>>> {
        Box::pin(async move {
            let client = self.client.lock().await;
            let row = client
                .query_opt("SELECT json FROM configs_calendars WHERE name = $1", &[&name])
                .await
                .map_err(StorageError::database)?;
            let Some(row) = row else {
                return Ok(None);
            };
            let json: Option<String> = row.try_get(0).map_err(StorageError::database)?;
            Ok(parse_config(name, json))
        })
    }

    fn upsert_config<'a>(
        &'a self,
        name: &'a str,
        config: &'a CalendarConfig,
    ) -> BoxFuture<'a, StorageResult<()>> {
        Box::pin(async move {
            let json = serde_json::to_string(config)?;
            let client = self.client.lock().await;
            client
                .execute(
                    "INSERT INTO configs_calendars (name, json) VALUES ($1, $2)
                     ON CONFLICT (name) DO UPDATE SET json = EXCLUDED.json",
                    &[&name, &json],
                )
                .await
                .map_err(StorageError::database)?;
            Ok(())
        })
    }

    fn delete_config<'a>(&'a self, name: &'a str) -> BoxFuture<'a, StorageResult<bool>> {
        Box::pin(async move {
            let client = self.client.lock().await;
            let deleted = client
                .execute("DELETE FROM configs_calendars WHERE name = $1", &[&name])
                .await
                .map_err(StorageError::database)?;
            Ok(deleted > 0)
        })
    }
}
