use async_trait::async_trait;
use rusqlite::ErrorCode;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, RwLock};
use tracing::{debug, warn};

use super::models::{BookRecord, ImportHistoryRecord};
use super::sqlite::Database;
use crate::error::CatalogError;

/// Persistence consumed by the import pipeline.
#[async_trait]
pub trait CatalogGateway: Send + Sync {
    async fn find_by_hash(&self, content_hash: &str) -> Result<Option<BookRecord>, CatalogError>;

    /// Insert a new book. A record with the same `content_hash` already present
    /// yields [`CatalogError::Conflict`].
    async fn insert_book(&self, record: &BookRecord) -> Result<(), CatalogError>;

    async fn insert_import_history(&self, entry: &ImportHistoryRecord) -> Result<(), CatalogError>;
}

/// Read access to boolean feature flags.
pub trait SettingsProvider: Send + Sync {
    fn get_bool(&self, key: &str, default: bool) -> bool;
}

pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// SQLite-backed catalog and settings store.
pub struct SqliteCatalog {
    db: Mutex<Database>,
}

impl SqliteCatalog {
    pub fn new(db: Database) -> Self {
        Self { db: Mutex::new(db) }
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        Ok(Self::new(Database::open(path)?))
    }

    pub fn open_in_memory() -> Result<Self, CatalogError> {
        Ok(Self::new(Database::open_in_memory()?))
    }

    /// Exclusive access to the underlying database.
    pub fn database(&self) -> Result<MutexGuard<'_, Database>, CatalogError> {
        self.db
            .lock()
            .map_err(|_| CatalogError::Unavailable("database lock poisoned".to_string()))
    }

    pub fn set_flag(&self, key: &str, value: bool) -> Result<(), CatalogError> {
        self.database()?
            .set_setting(key, if value { "true" } else { "false" })?;
        Ok(())
    }

    pub fn recent_history(&self, limit: i64) -> Result<Vec<ImportHistoryRecord>, CatalogError> {
        Ok(self.database()?.recent_import_history(limit)?)
    }

    fn insert_linked(&self, record: &BookRecord) -> Result<(), CatalogError> {
        let db = self.database()?;
        if db.find_book_by_hash(&record.content_hash)?.is_some() {
            return Err(CatalogError::Conflict {
                content_hash: record.content_hash.clone(),
            });
        }

        let mut record = record.clone();
        if record.parent_book_id.is_none() {
            record.parent_book_id =
                db.find_parent_candidate(&record.title, &record.author, &record.file_type)?;
            if let Some(parent) = &record.parent_book_id {
                debug!("Linking {} to existing edition {}", record.id, parent);
            }
        }

        db.insert_book(&record).map_err(|e| match e {
            rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation => {
                CatalogError::Conflict {
                    content_hash: record.content_hash.clone(),
                }
            }
            other => CatalogError::Database(other),
        })
    }
}

#[async_trait]
impl CatalogGateway for SqliteCatalog {
    async fn find_by_hash(&self, content_hash: &str) -> Result<Option<BookRecord>, CatalogError> {
        Ok(self.database()?.find_book_by_hash(content_hash)?)
    }

    async fn insert_book(&self, record: &BookRecord) -> Result<(), CatalogError> {
        self.insert_linked(record)
    }

    async fn insert_import_history(&self, entry: &ImportHistoryRecord) -> Result<(), CatalogError> {
        Ok(self.database()?.insert_import_history(entry)?)
    }
}

impl SettingsProvider for SqliteCatalog {
    fn get_bool(&self, key: &str, default: bool) -> bool {
        let value = match self.database().map(|db| db.get_setting(key)) {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => {
                warn!("Could not read setting {}: {}", key, e);
                None
            }
            Err(e) => {
                warn!("Could not read setting {}: {}", key, e);
                None
            }
        };
        match value.as_deref().map(parse_flag) {
            Some(Some(flag)) => flag,
            Some(None) => {
                warn!("Setting {} has a non-boolean value, using {}", key, default);
                default
            }
            None => default,
        }
    }
}

/// In-process settings, for hosts without a settings table.
#[derive(Debug, Default)]
pub struct MemorySettings {
    flags: RwLock<HashMap<String, bool>>,
}

impl MemorySettings {
    pub fn with(self, key: &str, value: bool) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&self, key: &str, value: bool) {
        if let Ok(mut flags) = self.flags.write() {
            flags.insert(key.to_string(), value);
        }
    }
}

impl SettingsProvider for MemorySettings {
    fn get_bool(&self, key: &str, default: bool) -> bool {
        self.flags
            .read()
            .ok()
            .and_then(|flags| flags.get(key).copied())
            .unwrap_or(default)
    }
}
