//! Image Vault - Image Store
//!
//! Durable mapping from file name to encrypted bytes, kept in SQLite.

use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};

use crate::error::{VaultError, VaultResult};

/// A persisted image: unique original name plus encrypted resized bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    /// Original uploaded file name
    pub name: String,
    /// `nonce || ciphertext || tag`
    pub ciphertext: Vec<u8>,
    /// When the record was written
    pub stored_at: DateTime<Utc>,
}

/// Name-keyed storage for encrypted images.
///
/// Implementations must reject a second `save` for an existing name with
/// [`VaultError::AlreadyExists`]; records are never overwritten.
pub trait ImageStore: Send + Sync {
    /// Check whether a record with this name exists
    fn exists(&self, name: &str) -> VaultResult<bool>;

    /// Look up a record by name
    fn find(&self, name: &str) -> VaultResult<Option<StoredImage>>;

    /// Insert a new record
    fn save(&self, name: &str, ciphertext: &[u8]) -> VaultResult<StoredImage>;

    /// All records in enumeration order
    fn find_all(&self) -> VaultResult<Vec<StoredImage>>;

    /// All stored names in enumeration order
    fn names(&self) -> VaultResult<Vec<String>> {
        Ok(self.find_all()?.into_iter().map(|img| img.name).collect())
    }
}

/// SQLite-backed image store
pub struct SqliteImageStore {
    conn: Mutex<Connection>,
}

impl SqliteImageStore {
    /// Open (or create) the database file at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> VaultResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Private in-memory database, gone when the store is dropped
    pub fn in_memory() -> VaultResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> VaultResult<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS images (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                file_name TEXT NOT NULL UNIQUE,
                encrypted_data BLOB NOT NULL,
                stored_at TEXT NOT NULL
            );
            "#,
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    #[cfg(test)]
    pub(crate) fn count(&self) -> VaultResult<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM images", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn parse_timestamp(raw: &str) -> VaultResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| VaultError::Database(format!("bad timestamp {:?}: {}", raw, e)))
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation
    )
}

impl ImageStore for SqliteImageStore {
    fn exists(&self, name: &str) -> VaultResult<bool> {
        let conn = self.conn.lock();
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM images WHERE file_name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn find(&self, name: &str) -> VaultResult<Option<StoredImage>> {
        let conn = self.conn.lock();
        let row: Option<(String, Vec<u8>, String)> = conn
            .query_row(
                "SELECT file_name, encrypted_data, stored_at FROM images WHERE file_name = ?1",
                params![name],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        row.map(|(name, ciphertext, stored_at)| -> VaultResult<StoredImage> {
            Ok(StoredImage {
                name,
                ciphertext,
                stored_at: parse_timestamp(&stored_at)?,
            })
        })
        .transpose()
    }

    fn save(&self, name: &str, ciphertext: &[u8]) -> VaultResult<StoredImage> {
        let stored_at = Utc::now();
        let conn = self.conn.lock();

        conn.execute(
            "INSERT INTO images (file_name, encrypted_data, stored_at) VALUES (?1, ?2, ?3)",
            params![name, ciphertext, stored_at.to_rfc3339()],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                VaultError::AlreadyExists(name.to_string())
            } else {
                e.into()
            }
        })?;

        Ok(StoredImage {
            name: name.to_string(),
            ciphertext: ciphertext.to_vec(),
            stored_at,
        })
    }

    fn find_all(&self) -> VaultResult<Vec<StoredImage>> {
        let conn = self.conn.lock();

        let mut stmt =
            conn.prepare("SELECT file_name, encrypted_data, stored_at FROM images ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Vec<u8>>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut images = Vec::new();
        for row in rows {
            let (name, ciphertext, stored_at) = row?;
            images.push(StoredImage {
                name,
                ciphertext,
                stored_at: parse_timestamp(&stored_at)?,
            });
        }

        Ok(images)
    }

    fn names(&self) -> VaultResult<Vec<String>> {
        let conn = self.conn.lock();

        let mut stmt = conn.prepare("SELECT file_name FROM images ORDER BY id")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;

        Ok(names)
    }
}
