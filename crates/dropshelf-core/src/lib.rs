pub mod config;
pub mod convert;
pub mod engine;
pub mod error;
pub mod format;
pub mod hasher;
pub mod import;
pub mod metadata;
pub mod platform;
pub mod progress;
pub mod storage;
pub mod watcher;

pub use config::AppConfig;
pub use engine::{import_existing, ImportEngine};
pub use error::{CatalogError, ConversionError, Error, ImportError, MetadataError};
pub use format::BookFormat;
pub use import::{ImportOrchestrator, ImportResult, ImportStage};
pub use progress::{ImportReporter, SilentReporter};
pub use storage::{CatalogGateway, SettingsProvider, SqliteCatalog};
pub use watcher::{DetectedFile, WatcherHandle, WatcherStatus};
