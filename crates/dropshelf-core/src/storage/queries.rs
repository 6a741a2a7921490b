use super::models::*;
use super::sqlite::Database;
use rusqlite::{params, Result, Row};
use tracing::debug;

const BOOK_COLUMNS: &str = "id, title, author, description, cover_url, file_path, file_name, \
     file_size_bytes, file_type, content_hash, is_public, uploader_id, parent_book_id, \
     created_at, updated_at";

fn book_from_row(row: &Row<'_>) -> Result<BookRecord> {
    Ok(BookRecord {
        id: row.get(0)?,
        title: row.get(1)?,
        author: row.get(2)?,
        description: row.get(3)?,
        cover_url: row.get(4)?,
        file_path: row.get(5)?,
        file_name: row.get(6)?,
        file_size_bytes: row.get(7)?,
        file_type: row.get(8)?,
        content_hash: row.get(9)?,
        is_public: row.get(10)?,
        uploader_id: row.get(11)?,
        parent_book_id: row.get(12)?,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
    })
}

impl Database {
    // ── Books ────────────────────────────────────────────────────

    pub fn find_book_by_hash(&self, content_hash: &str) -> Result<Option<BookRecord>> {
        match self.connection().query_row(
            &format!("SELECT {} FROM book WHERE content_hash = ?1", BOOK_COLUMNS),
            params![content_hash],
            book_from_row,
        ) {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn get_book(&self, id: &str) -> Result<Option<BookRecord>> {
        match self.connection().query_row(
            &format!("SELECT {} FROM book WHERE id = ?1", BOOK_COLUMNS),
            params![id],
            book_from_row,
        ) {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Oldest root record with the same title and author stored in another format.
    pub fn find_parent_candidate(
        &self,
        title: &str,
        author: &str,
        file_type: &str,
    ) -> Result<Option<String>> {
        match self.connection().query_row(
            "SELECT id FROM book \
             WHERE title = ?1 AND author = ?2 AND file_type <> ?3 \
               AND parent_book_id IS NULL \
             ORDER BY created_at ASC LIMIT 1",
            params![title, author, file_type],
            |row| row.get(0),
        ) {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn insert_book(&self, book: &BookRecord) -> Result<()> {
        self.connection().execute(
            &format!(
                "INSERT INTO book ({}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                BOOK_COLUMNS
            ),
            params![
                book.id,
                book.title,
                book.author,
                book.description,
                book.cover_url,
                book.file_path,
                book.file_name,
                book.file_size_bytes,
                book.file_type,
                book.content_hash,
                book.is_public,
                book.uploader_id,
                book.parent_book_id,
                book.created_at,
                book.updated_at,
            ],
        )?;
        debug!("Inserted book {} ({})", book.id, book.title);
        Ok(())
    }

    pub fn count_books(&self) -> Result<i64> {
        self.connection()
            .query_row("SELECT COUNT(*) FROM book", [], |row| row.get(0))
    }

    pub fn list_books(&self, offset: i64, limit: i64) -> Result<Vec<BookRecord>> {
        let mut stmt = self.connection().prepare(&format!(
            "SELECT {} FROM book ORDER BY created_at DESC LIMIT ?1 OFFSET ?2",
            BOOK_COLUMNS
        ))?;
        let books = stmt
            .query_map(params![limit, offset], book_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(books)
    }

    // ── Import History ───────────────────────────────────────────

    pub fn insert_import_history(&self, entry: &ImportHistoryRecord) -> Result<()> {
        self.connection().execute(
            "INSERT INTO import_history \
             (id, user_id, file_name, file_path, status, message, book_id, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                entry.id,
                entry.user_id,
                entry.file_name,
                entry.file_path,
                entry.status.as_str(),
                entry.message,
                entry.book_id,
                entry.created_at,
            ],
        )?;
        Ok(())
    }

    /// Newest first.
    pub fn recent_import_history(&self, limit: i64) -> Result<Vec<ImportHistoryRecord>> {
        let mut stmt = self.connection().prepare(
            "SELECT id, user_id, file_name, file_path, status, message, book_id, created_at \
             FROM import_history ORDER BY created_at DESC, rowid DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit], |row| {
                let status: String = row.get(4)?;
                let status = status.parse::<ImportStatus>().map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        4,
                        rusqlite::types::Type::Text,
                        e.into(),
                    )
                })?;
                Ok(ImportHistoryRecord {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    file_name: row.get(2)?,
                    file_path: row.get(3)?,
                    status,
                    message: row.get(5)?,
                    book_id: row.get(6)?,
                    created_at: row.get(7)?,
                })
            })?
            .collect::<Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn count_import_history(&self, status: ImportStatus) -> Result<i64> {
        self.connection().query_row(
            "SELECT COUNT(*) FROM import_history WHERE status = ?1",
            params![status.as_str()],
            |row| row.get(0),
        )
    }

    // ── Settings ─────────────────────────────────────────────────

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        match self.connection().query_row(
            "SELECT value FROM setting WHERE key = ?1",
            params![key],
            |row| row.get(0),
        ) {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        self.connection().execute(
            "INSERT INTO setting (key, value, updated_at) VALUES (?1, ?2, ?3) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, now],
        )?;
        debug!("Setting {} = {}", key, value);
        Ok(())
    }

    pub fn list_settings(&self) -> Result<Vec<SettingRecord>> {
        let mut stmt = self
            .connection()
            .prepare("SELECT key, value, updated_at FROM setting ORDER BY key")?;
        let settings = stmt
            .query_map([], |row| {
                Ok(SettingRecord {
                    key: row.get(0)?,
                    value: row.get(1)?,
                    updated_at: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>>>()?;
        Ok(settings)
    }
}
