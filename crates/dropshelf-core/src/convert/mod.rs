pub mod chapters;
pub mod epub_writer;
pub(crate) mod process;

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{AppConfig, ConvertConfig};
use crate::error::ConversionError;
use crate::format::{BookFormat, AUTO_CONVERT_MOBI, AUTO_CONVERT_TXT};
use crate::metadata::text::{decode_text, metadata_from_text};
use crate::storage::SettingsProvider;

pub use chapters::{cap_chapters, split_chapters, Chapter};
pub use epub_writer::{write_epub, EpubBook};

pub const EBOOK_CONVERT: &str = "ebook-convert";

/// Turns non-EPUB/PDF inputs into EPUB files in the work directory.
pub struct FormatConverter {
    config: ConvertConfig,
    work_dir: PathBuf,
    default_author: String,
    settings: Arc<dyn SettingsProvider>,
}

impl FormatConverter {
    pub fn new(config: &AppConfig, settings: Arc<dyn SettingsProvider>) -> Self {
        Self {
            config: config.convert.clone(),
            work_dir: config.import.work_dir(),
            default_author: config.import.default_author.clone(),
            settings,
        }
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Whether conversion of `format` is switched on. Formats that never need
    /// conversion report `true`.
    pub fn is_enabled(&self, format: BookFormat) -> bool {
        match format.conversion_flag() {
            Some(flag) => self.settings.get_bool(flag, self.flag_default(flag)),
            None => true,
        }
    }

    fn flag_default(&self, flag: &str) -> bool {
        match flag {
            AUTO_CONVERT_TXT => self.config.auto_convert_txt,
            AUTO_CONVERT_MOBI => self.config.auto_convert_mobi,
            _ => false,
        }
    }

    /// Convert `source` when its format requires it.
    ///
    /// Returns the path to work with from here on: the source itself for EPUB and
    /// PDF, otherwise a fresh EPUB in the work directory. A failed conversion
    /// leaves nothing behind in the work directory.
    pub async fn convert(
        &self,
        source: &Path,
        format: BookFormat,
    ) -> Result<PathBuf, ConversionError> {
        if !format.requires_conversion() {
            return Ok(source.to_path_buf());
        }
        if !self.is_enabled(format) {
            return Err(ConversionError::Disabled(format));
        }

        tokio::fs::create_dir_all(&self.work_dir).await?;
        let dest = self.work_dir.join(format!("{}.epub", Uuid::new_v4()));

        let result = match format {
            BookFormat::Txt => self.convert_text(source, &dest).await,
            BookFormat::Mobi | BookFormat::Azw3 => self.convert_with_calibre(source, &dest).await,
            BookFormat::Epub | BookFormat::Pdf => return Ok(source.to_path_buf()),
        };

        if let Err(e) = result {
            if let Err(rm) = tokio::fs::remove_file(&dest).await {
                if rm.kind() != std::io::ErrorKind::NotFound {
                    warn!("Could not remove partial output {}: {}", dest.display(), rm);
                }
            }
            return Err(e);
        }

        info!("Converted {} to {}", source.display(), dest.display());
        Ok(dest)
    }

    async fn convert_text(&self, source: &Path, dest: &Path) -> Result<(), ConversionError> {
        let source = source.to_path_buf();
        let dest = dest.to_path_buf();
        let max_chapters = self.config.max_chapters;
        let default_author = self.default_author.clone();

        let chapter_count = tokio::task::spawn_blocking(move || {
            let bytes = std::fs::read(&source)?;
            let text = decode_text(&bytes);
            let metadata = metadata_from_text(&text, &source, &default_author);

            let found = split_chapters(&text);
            let found_count = found.len();
            let chapters = cap_chapters(found, max_chapters);
            if chapters.len() < found_count {
                debug!(
                    "Merged {} chapters into {} for {}",
                    found_count,
                    chapters.len(),
                    source.display()
                );
            }

            // Same text, same EPUB bytes, so repeated drops dedup by hash
            let identifier = source_identifier(&bytes);
            let book = EpubBook {
                identifier: &identifier,
                title: &metadata.title,
                author: &metadata.author,
                language: epub_writer::guess_language(&chapters),
                chapters: &chapters,
                modified: epub_writer::FIXED_MODIFIED,
            };
            write_epub(&dest, &book)?;
            Ok::<_, ConversionError>(chapters.len())
        })
        .await
        .map_err(|e| ConversionError::Io(std::io::Error::other(e)))??;

        debug!("Wrote {} chapters", chapter_count);
        Ok(())
    }

    async fn convert_with_calibre(&self, source: &Path, dest: &Path) -> Result<(), ConversionError> {
        let tool = crate::platform::resolve_tool(EBOOK_CONVERT, self.config.calibre_path.as_deref())
            .ok_or_else(|| ConversionError::ToolMissing {
                tool: EBOOK_CONVERT.to_string(),
            })?;

        let args = [source.as_os_str(), dest.as_os_str()];
        let output = process::run_tool(
            &tool,
            &args as &[&OsStr],
            self.config.timeout(),
            self.config.max_output_bytes,
        )
        .await?;

        if !output.status.success() {
            return Err(ConversionError::Failed {
                tool: EBOOK_CONVERT.to_string(),
                code: output.status.code(),
                stderr: output.stderr_lossy(),
            });
        }
        if !dest.is_file() {
            return Err(ConversionError::MissingOutput(dest.to_path_buf()));
        }
        Ok(())
    }
}

/// UUID-shaped identifier derived from the BLAKE3 digest of the source bytes.
fn source_identifier(bytes: &[u8]) -> String {
    let digest = blake3::hash(bytes);
    let mut seed = [0u8; 16];
    seed.copy_from_slice(&digest.as_bytes()[..16]);
    uuid::Builder::from_random_bytes(seed).into_uuid().to_string()
}
