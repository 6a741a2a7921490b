use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// A catalogued book. `content_hash` is unique across the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookRecord {
    pub id: String,
    pub title: String,
    pub author: String,
    pub description: Option<String>,
    /// Relative to the destination root, e.g. `public/{id}/cover.jpg`.
    pub cover_url: Option<String>,
    pub file_path: String,
    pub file_name: String,
    pub file_size_bytes: i64,
    pub file_type: String,
    pub content_hash: String,
    pub is_public: bool,
    pub uploader_id: Option<String>,
    /// Set by the catalog when another format of the same title and author exists.
    pub parent_book_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportStatus {
    Success,
    Skipped,
    Error,
}

impl ImportStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Skipped => "skipped",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ImportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImportStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "skipped" => Ok(Self::Skipped),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown import status '{}'", other)),
        }
    }
}

/// One append-only row per terminal import outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportHistoryRecord {
    pub id: String,
    pub user_id: Option<String>,
    pub file_name: String,
    pub file_path: Option<String>,
    pub status: ImportStatus,
    pub message: String,
    pub book_id: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettingRecord {
    pub key: String,
    pub value: String,
    pub updated_at: String,
}
