pub mod orchestrator;
pub mod placement;

use serde::Serialize;
use std::fmt;

use crate::error::ImportError;
use crate::storage::BookRecord;

pub use orchestrator::ImportOrchestrator;

/// States of a single import attempt, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ImportStage {
    Detected,
    Converting,
    Hashing,
    DedupCheck,
    Placing,
    CoverExtraction,
    Persisting,
    Cleanup,
    Done,
    Duplicate,
    Failed,
}

impl ImportStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Duplicate | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Detected => "detected",
            Self::Converting => "converting",
            Self::Hashing => "hashing",
            Self::DedupCheck => "dedup-check",
            Self::Placing => "placing",
            Self::CoverExtraction => "cover-extraction",
            Self::Persisting => "persisting",
            Self::Cleanup => "cleanup",
            Self::Done => "done",
            Self::Duplicate => "duplicate",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ImportStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one import attempt. Duplicates count as success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportResult {
    pub success: bool,
    pub book_id: Option<String>,
    pub book_title: Option<String>,
    pub error: Option<String>,
    pub is_duplicate: bool,
}

impl ImportResult {
    pub fn imported(book: &BookRecord) -> Self {
        Self {
            success: true,
            book_id: Some(book.id.clone()),
            book_title: Some(book.title.clone()),
            error: None,
            is_duplicate: false,
        }
    }

    pub fn duplicate(existing: &BookRecord) -> Self {
        Self {
            success: true,
            book_id: Some(existing.id.clone()),
            book_title: Some(existing.title.clone()),
            error: None,
            is_duplicate: true,
        }
    }

    pub fn failed(err: &ImportError) -> Self {
        Self {
            success: false,
            book_id: None,
            book_title: None,
            error: Some(err.to_string()),
            is_duplicate: false,
        }
    }
}
