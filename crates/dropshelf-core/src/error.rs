use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::format::BookFormat;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Watcher error: {0}")]
    Watcher(String),

    #[error("{0}")]
    Other(String),
}

/// Failure of the conversion stage. Always terminal for the current attempt.
#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("{}", disabled_message(.0))]
    Disabled(BookFormat),

    #[error("conversion tool '{tool}' not found")]
    ToolMissing { tool: String },

    #[error("conversion tool '{tool}' timed out after {secs}s")]
    Timeout { tool: String, secs: u64 },

    #[error("conversion tool '{tool}' exited with {code:?}: {stderr}")]
    Failed {
        tool: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("conversion produced no output at {}", .0.display())]
    MissingOutput(PathBuf),

    #[error("conversion IO error: {0}")]
    Io(#[from] io::Error),

    #[error("EPUB build error: {0}")]
    Epub(String),
}

fn disabled_message(format: &BookFormat) -> &'static str {
    match format {
        BookFormat::Txt => "TXT文件未启用自动转换",
        BookFormat::Mobi | BookFormat::Azw3 => "MOBI文件未启用自动转换",
        BookFormat::Epub | BookFormat::Pdf => "format does not require conversion",
    }
}

/// Metadata parse failure. Never fatal: callers substitute defaults.
#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("{0}")]
    Missing(String),
}

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("a book with content hash {content_hash} already exists")]
    Conflict { content_hash: String },

    #[error("catalog unavailable: {0}")]
    Unavailable(String),
}

/// Terminal failure of one import attempt.
#[derive(Error, Debug)]
pub enum ImportError {
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error("failed to hash {}: {source}", path.display())]
    Hash { path: PathBuf, source: io::Error },

    #[error("failed to place book into {}: {source}", dir.display())]
    Placement { dir: PathBuf, source: io::Error },

    #[error("failed to look up content hash: {0}")]
    Lookup(#[source] CatalogError),

    #[error("failed to record book: {0}")]
    Persist(#[source] CatalogError),

    #[error("unsupported file type '{0}'")]
    Unsupported(String),
}
