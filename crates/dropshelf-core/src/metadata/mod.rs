pub mod epub;
pub mod pdf;
pub mod text;

use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::error::MetadataError;
use crate::format::BookFormat;

/// Where a cover can be found before it has been written to disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CoverMarker {
    /// Image entry inside an EPUB archive, with its dot-qualified extension.
    EpubEntry { entry: String, extension: String },
    /// Page 1 of a PDF, rendered on demand.
    PdfFirstPage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CoverSource {
    Marker(CoverMarker),
    File(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookMetadata {
    pub title: String,
    pub author: String,
    pub description: Option<String>,
    pub cover: Option<CoverSource>,
}

impl BookMetadata {
    /// Filename-derived title, placeholder author, no cover.
    pub fn fallback(path: &Path, default_author: &str) -> Self {
        Self {
            title: title_from_path(path),
            author: default_author.to_string(),
            description: None,
            cover: None,
        }
    }

    pub fn without_cover(mut self) -> Self {
        self.cover = None;
        self
    }

    pub fn cover_file(&self) -> Option<&Path> {
        match &self.cover {
            Some(CoverSource::File(path)) => Some(path),
            _ => None,
        }
    }
}

pub fn title_from_path(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let title = stem
        .trim()
        .trim_start_matches('《')
        .trim_end_matches('》')
        .trim();
    if title.is_empty() {
        "Untitled".to_string()
    } else {
        title.to_string()
    }
}

/// Reads title, author, description and cover from book files.
///
/// Phase 1 ([`extract`](Self::extract)) only reads; phase 2
/// ([`extract_with_cover`](Self::extract_with_cover)) also writes the cover image
/// next to the placed book.
#[derive(Debug, Clone)]
pub struct MetadataExtractor {
    default_author: String,
    pdftoppm_path: Option<PathBuf>,
}

impl MetadataExtractor {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            default_author: config.import.default_author.clone(),
            pdftoppm_path: config.convert.pdftoppm_path.clone(),
        }
    }

    pub fn default_author(&self) -> &str {
        &self.default_author
    }

    pub async fn extract(&self, path: &Path) -> Result<BookMetadata, MetadataError> {
        let format = BookFormat::from_path(path).ok_or_else(|| {
            MetadataError::Missing(format!("no metadata reader for {}", path.display()))
        })?;
        let path = path.to_path_buf();
        let default_author = self.default_author.clone();

        tokio::task::spawn_blocking(move || match format {
            BookFormat::Epub => epub::read_metadata(&path, &default_author),
            BookFormat::Pdf => pdf::read_metadata(&path, &default_author),
            BookFormat::Txt => text::read_metadata(&path, &default_author),
            BookFormat::Mobi | BookFormat::Azw3 => Err(MetadataError::Missing(format!(
                "{} files are read after conversion",
                format
            ))),
        })
        .await
        .map_err(|e| MetadataError::Io(std::io::Error::other(e)))?
    }

    /// Phase 1 plus cover materialization into `dest_dir`.
    ///
    /// A cover that cannot be written is dropped with a warning; only a failure
    /// to read the metadata itself is an error.
    pub async fn extract_with_cover(
        &self,
        path: &Path,
        dest_dir: &Path,
    ) -> Result<BookMetadata, MetadataError> {
        let mut metadata = self.extract(path).await?;

        metadata.cover = match metadata.cover.take() {
            Some(CoverSource::Marker(marker)) => match self.write_cover(path, dest_dir, &marker).await {
                Ok(file) => {
                    debug!("Cover written to {}", file.display());
                    Some(CoverSource::File(file))
                }
                Err(e) => {
                    warn!("No cover for {}: {}", path.display(), e);
                    None
                }
            },
            other => other,
        };
        Ok(metadata)
    }

    /// Phase 1, substituting defaults on failure. The fallback title comes from
    /// `name_source`, which differs from `path` for converted intermediates.
    pub async fn extract_or_fallback(&self, path: &Path, name_source: &Path) -> BookMetadata {
        match self.extract(path).await {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!("Metadata unreadable for {}: {}", path.display(), e);
                BookMetadata::fallback(name_source, &self.default_author)
            }
        }
    }

    async fn write_cover(
        &self,
        path: &Path,
        dest_dir: &Path,
        marker: &CoverMarker,
    ) -> Result<PathBuf, MetadataError> {
        match marker {
            CoverMarker::EpubEntry { entry, extension } => {
                let dest = dest_dir.join(format!("cover{}", extension));
                let (source, entry, target) = (path.to_path_buf(), entry.clone(), dest.clone());
                tokio::task::spawn_blocking(move || epub::extract_cover(&source, &entry, &target))
                    .await
                    .map_err(|e| MetadataError::Io(std::io::Error::other(e)))??;
                Ok(dest)
            }
            CoverMarker::PdfFirstPage => {
                pdf::render_first_page(path, dest_dir, self.pdftoppm_path.as_deref()).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_from_path() {
        assert_eq!(title_from_path(Path::new("/a/b/Moby Dick.epub")), "Moby Dick");
        assert_eq!(title_from_path(Path::new("/a/《红楼梦》.txt")), "红楼梦");
        assert_eq!(title_from_path(Path::new("/")), "Untitled");
    }

    #[test]
    fn test_fallback_has_no_cover() {
        let meta = BookMetadata::fallback(Path::new("x/Some Book.pdf"), "Unknown");
        assert_eq!(meta.title, "Some Book");
        assert_eq!(meta.author, "Unknown");
        assert!(meta.cover.is_none());
    }

    #[tokio::test]
    async fn test_unreadable_file_falls_back() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("broken.epub");
        std::fs::write(&path, b"not a zip").unwrap();

        let config = AppConfig::new(tmp.path().join("w"), tmp.path().join("d"));
        let extractor = MetadataExtractor::new(&config);
        assert!(extractor.extract(&path).await.is_err());
        let meta = extractor.extract_or_fallback(&path, &path).await;
        assert_eq!(meta, BookMetadata::fallback(&path, "Unknown"));
    }
}
