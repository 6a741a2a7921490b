use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::placement;
use super::{ImportResult, ImportStage};
use crate::config::AppConfig;
use crate::convert::FormatConverter;
use crate::error::{CatalogError, ImportError};
use crate::format::BookFormat;
use crate::hasher::hash_file_async;
use crate::metadata::{BookMetadata, MetadataExtractor};
use crate::progress::{ImportReporter, SilentReporter};
use crate::storage::{BookRecord, CatalogGateway, ImportHistoryRecord, ImportStatus, SettingsProvider};
use crate::watcher::DetectedFile;

enum Outcome {
    Imported(BookRecord),
    Duplicate(BookRecord),
}

/// Drives one detected file through conversion, dedup, placement and cataloguing.
///
/// Every call ends in exactly one terminal state and appends one import-history
/// row. The orchestrator holds no per-file state, so one instance serves any
/// number of concurrent imports.
pub struct ImportOrchestrator {
    catalog: Arc<dyn CatalogGateway>,
    converter: FormatConverter,
    extractor: MetadataExtractor,
    destination_root: PathBuf,
    reporter: Arc<dyn ImportReporter>,
}

impl ImportOrchestrator {
    pub fn new(
        config: &AppConfig,
        catalog: Arc<dyn CatalogGateway>,
        settings: Arc<dyn SettingsProvider>,
    ) -> Self {
        Self {
            catalog,
            converter: FormatConverter::new(config, settings),
            extractor: MetadataExtractor::new(config),
            destination_root: config.import.destination_root.clone(),
            reporter: Arc::new(SilentReporter),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ImportReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn destination_root(&self) -> &Path {
        &self.destination_root
    }

    pub async fn import(&self, file: &DetectedFile) -> ImportResult {
        let span = info_span!("import", file = %file.file_name);
        self.import_in_span(file).instrument(span).await
    }

    async fn import_in_span(&self, file: &DetectedFile) -> ImportResult {
        self.reporter.on_import_start(file);
        self.enter(file, ImportStage::Detected);

        let (result, status, message) = match self.run(file).await {
            Ok(Outcome::Imported(book)) => {
                self.enter(file, ImportStage::Done);
                info!("Imported \"{}\" by {} as {}", book.title, book.author, book.id);
                let message = format!("Imported \"{}\"", book.title);
                (ImportResult::imported(&book), ImportStatus::Success, message)
            }
            Ok(Outcome::Duplicate(existing)) => {
                self.enter(file, ImportStage::Duplicate);
                info!("Duplicate of existing book {} (\"{}\")", existing.id, existing.title);
                let message = format!("Duplicate of \"{}\"", existing.title);
                (ImportResult::duplicate(&existing), ImportStatus::Skipped, message)
            }
            Err(e) => {
                self.enter(file, ImportStage::Failed);
                error!("Import of {} failed: {}", file.path.display(), e);
                (ImportResult::failed(&e), ImportStatus::Error, e.to_string())
            }
        };

        self.record_history(file, &result, status, message).await;
        self.reporter.on_import_complete(file, &result);
        result
    }

    fn enter(&self, file: &DetectedFile, stage: ImportStage) {
        debug!(stage = %stage, "Entering stage");
        self.reporter.on_stage(file, stage);
    }

    async fn run(&self, file: &DetectedFile) -> Result<Outcome, ImportError> {
        let format = BookFormat::from_extension(&file.extension)
            .ok_or_else(|| ImportError::Unsupported(file.extension.clone()))?;

        let working = if format.requires_conversion() {
            self.enter(file, ImportStage::Converting);
            self.converter.convert(&file.path, format).await?
        } else {
            file.path.clone()
        };
        let intermediate = (working != file.path).then(|| working.clone());
        let stored_format = if intermediate.is_some() {
            BookFormat::Epub
        } else {
            format
        };

        let outcome = self.process(file, &working, stored_format).await;

        match &outcome {
            Ok(Outcome::Imported(_)) => {
                self.enter(file, ImportStage::Cleanup);
                self.remove_inputs(file, intermediate.as_deref()).await;
            }
            Ok(Outcome::Duplicate(_)) => {
                self.remove_inputs(file, intermediate.as_deref()).await;
            }
            // Left in place for inspection; the book directory is already written
            Err(ImportError::Persist(_)) => {}
            Err(_) => {
                if let Some(path) = &intermediate {
                    placement::remove_file_logged(path).await;
                }
            }
        }
        outcome
    }

    async fn process(
        &self,
        file: &DetectedFile,
        working: &Path,
        stored_format: BookFormat,
    ) -> Result<Outcome, ImportError> {
        self.enter(file, ImportStage::Hashing);
        let content_hash = hash_file_async(working.to_path_buf())
            .await
            .map_err(|source| ImportError::Hash {
                path: working.to_path_buf(),
                source,
            })?;
        debug!("Content hash {}", content_hash);

        self.enter(file, ImportStage::DedupCheck);
        if let Some(existing) = self
            .catalog
            .find_by_hash(&content_hash)
            .await
            .map_err(ImportError::Lookup)?
        {
            return Ok(Outcome::Duplicate(existing));
        }

        let preliminary = self
            .extractor
            .extract_or_fallback(working, &file.path)
            .await;

        self.enter(file, ImportStage::Placing);
        let book_id = Uuid::new_v4().to_string();
        let dir = placement::book_dir(&self.destination_root, &book_id);
        let placed = match placement::place_book(working, &dir, stored_format.extension()).await {
            Ok(placed) => placed,
            Err(source) => {
                placement::remove_dir_logged(&dir).await;
                return Err(ImportError::Placement { dir, source });
            }
        };

        self.enter(file, ImportStage::CoverExtraction);
        // Text fields stay from the first pass: the placed copy is named `book{ext}`
        let metadata = match self.extractor.extract_with_cover(&placed, &dir).await {
            Ok(with_cover) => BookMetadata {
                cover: with_cover.cover,
                ..preliminary
            },
            Err(e) => {
                warn!("Metadata unreadable on placed copy, keeping first pass: {}", e);
                preliminary.without_cover()
            }
        };

        self.enter(file, ImportStage::Persisting);
        let record = self
            .build_record(file, &book_id, &placed, stored_format, content_hash, metadata)
            .await;

        match self.catalog.insert_book(&record).await {
            Ok(()) => Ok(Outcome::Imported(record)),
            Err(CatalogError::Conflict { content_hash }) => {
                // Another import of identical content won the race
                placement::remove_dir_logged(&dir).await;
                match self.catalog.find_by_hash(&content_hash).await {
                    Ok(Some(winner)) => Ok(Outcome::Duplicate(winner)),
                    Ok(None) => Err(ImportError::Persist(CatalogError::Conflict { content_hash })),
                    Err(e) => Err(ImportError::Lookup(e)),
                }
            }
            Err(e) => {
                error!("Catalog write failed, placed copy kept at {}", placed.display());
                Err(ImportError::Persist(e))
            }
        }
    }

    async fn build_record(
        &self,
        file: &DetectedFile,
        book_id: &str,
        placed: &Path,
        stored_format: BookFormat,
        content_hash: String,
        metadata: BookMetadata,
    ) -> BookRecord {
        let cover_url = metadata
            .cover_file()
            .map(|cover| placement::relative_url(&self.destination_root, cover));
        let file_size_bytes = match tokio::fs::metadata(placed).await {
            Ok(meta) => meta.len(),
            Err(_) => file.file_size_bytes,
        };
        let stem = file
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| book_id.to_string());
        let now = Utc::now().to_rfc3339();

        BookRecord {
            id: book_id.to_string(),
            title: metadata.title,
            author: metadata.author,
            description: metadata.description,
            cover_url,
            file_path: placement::relative_url(&self.destination_root, placed),
            file_name: format!("{}{}", stem, stored_format.extension()),
            file_size_bytes: i64::try_from(file_size_bytes).unwrap_or(i64::MAX),
            file_type: stored_format.file_type().to_string(),
            content_hash,
            is_public: true,
            uploader_id: None,
            parent_book_id: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    async fn remove_inputs(&self, file: &DetectedFile, intermediate: Option<&Path>) {
        placement::remove_file_logged(&file.path).await;
        if let Some(path) = intermediate {
            placement::remove_file_logged(path).await;
        }
    }

    async fn record_history(
        &self,
        file: &DetectedFile,
        result: &ImportResult,
        status: ImportStatus,
        message: String,
    ) {
        let entry = ImportHistoryRecord {
            id: Uuid::new_v4().to_string(),
            user_id: None,
            file_name: file.file_name.clone(),
            file_path: Some(file.path.to_string_lossy().into_owned()),
            status,
            message,
            book_id: result.book_id.clone(),
            created_at: Utc::now().to_rfc3339(),
        };
        if let Err(e) = self.catalog.insert_import_history(&entry).await {
            warn!("Could not record import history for {}: {}", file.file_name, e);
        }
    }
}
