//! Single-document JSON storage.
//!
//! Everything lives in `<folder>/persist.json`:
//!
//! ```json
//! { "calendars": { "<key>": { "events": { "<uid>": { ...record... } } } } }
//! ```
//!
//! Saves rewrite the whole document through a temporary file and a rename,
//! so a crash leaves either the old or the new document on disk.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use icalproxy_core::{BoxFuture, CalendarStore, StorageAdapter, StorageResult};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

pub const FILE_NAME: &str = "persist.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct Document {
    #[serde(default)]
    calendars: BTreeMap<String, CalendarSection>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CalendarSection {
    #[serde(default)]
    events: CalendarStore,
}

/// JSON document backend. Does not store calendar configurations.
#[derive(Debug)]
pub struct JsonStorage {
    folder: PathBuf,
    /// Serialises read-modify-write cycles on the shared document.
    lock: Mutex<()>,
}

impl JsonStorage {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn file_path(&self) -> PathBuf {
        self.folder.join(FILE_NAME)
    }

    async fn read_document(&self) -> StorageResult<Document> {
        match tokio::fs::read(self.file_path()).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Document::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_document(&self, document: &Document) -> StorageResult<()> {
        tokio::fs::create_dir_all(&self.folder).await?;
        let path = self.file_path();
        let tmp = tmp_path(&path);
        let body = serde_json::to_vec_pretty(document)?;
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

impl StorageAdapter for JsonStorage {
    fn name(&self) -> &'static str {
        "json"
    }

    fn load_calendar<'a>(&'a self, key: &'a str) -> BoxFuture<'a, StorageResult<CalendarStore>> {
        Box::pin(async move {
            let _guard = self.lock.lock().await;
            let mut document = self.read_document().await?;
            Ok(document
                .calendars
                .remove(key)
                .map(|section| section.events)
                .unwrap_or_default())
        })
    }

    fn save_calendar<'a>(
        &'a self,
        key: &'a str,
        store: &'a CalendarStore,
    ) -> BoxFuture<'a, StorageResult<()>> {
        Box::pin(async move {
            let _guard = self.lock.lock().await;
            let mut document = self.read_document().await?;
            document.calendars.insert(
                key.to_string(),
                CalendarSection {
                    events: store.clone(),
                },
            );
            self.write_document(&document).await?;
            debug!(calendar = %key, count = store.len(), path = %self.file_path().display(), "saved calendar");
            Ok(())
        })
    }
}
