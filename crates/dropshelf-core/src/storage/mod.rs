pub mod catalog;
pub mod models;
pub mod queries;
pub mod sqlite;

pub use catalog::{parse_flag, CatalogGateway, MemorySettings, SettingsProvider, SqliteCatalog};
pub use models::{BookRecord, ImportHistoryRecord, ImportStatus, SettingRecord};
pub use sqlite::Database;
