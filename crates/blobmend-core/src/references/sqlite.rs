//! SQLite-backed reference store.

use super::traits::ReferenceStore;
use crate::config::PostsSchema;
use crate::error::{BlobmendError, Result};
use crate::models::{RecordId, ReferenceMatch};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

impl ToSql for RecordId {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            RecordId::Integer(id) => Ok(ToSqlOutput::from(*id)),
            RecordId::Text(id) => Ok(ToSqlOutput::from(id.as_str())),
        }
    }
}

impl FromSql for RecordId {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Integer(id) => Ok(RecordId::Integer(id)),
            ValueRef::Text(bytes) => std::str::from_utf8(bytes)
                .map(|s| RecordId::Text(s.to_string()))
                .map_err(|e| FromSqlError::Other(Box::new(e))),
            _ => Err(FromSqlError::InvalidType),
        }
    }
}

/// Reference store over the posts table of a SQLite database.
///
/// Thread-safe via internal mutex on the connection.
pub struct SqliteReferenceStore {
    conn: Arc<Mutex<Connection>>,
    find_sql: String,
    replace_sql: String,
    body_sql: String,
}

impl SqliteReferenceStore {
    /// Open the database at `db_path`. The posts table must already exist.
    pub fn open(db_path: impl AsRef<Path>, schema: PostsSchema) -> Result<Self> {
        let db_path = db_path.as_ref();
        if !db_path.is_file() {
            return Err(BlobmendError::Config {
                message: format!("database file does not exist: {}", db_path.display()),
            });
        }

        let conn = Connection::open(db_path).map_err(|e| BlobmendError::StoreUnavailable {
            message: format!("Failed to open database {}: {}", db_path.display(), e),
            source: Some(e),
        })?;
        Self::from_connection(conn, schema)
    }

    /// Wrap an already-open connection.
    pub fn from_connection(conn: Connection, schema: PostsSchema) -> Result<Self> {
        schema.validate()?;

        let table = PostsSchema::quoted(&schema.table);
        let id = PostsSchema::quoted(&schema.id_column);
        let title = PostsSchema::quoted(&schema.title_column);
        let body = PostsSchema::quoted(&schema.body_column);

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            find_sql: format!(
                "SELECT {id}, {title} FROM {table} \
                 WHERE instr(lower({body}), lower(?1)) > 0 \
                 ORDER BY {id} LIMIT 1"
            ),
            replace_sql: format!(
                "UPDATE {table} SET {body} = REPLACE({body}, ?1, ?2) \
                 WHERE {id} = ?3 AND instr({body}, ?1) > 0"
            ),
            body_sql: format!("SELECT {body} FROM {table} WHERE {id} = ?1"),
        };
        store.check_statements()?;
        Ok(store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| BlobmendError::StoreUnavailable {
            message: format!("Failed to lock database: {}", e),
            source: None,
        })
    }

    /// Prepare every statement once so a wrong table or column name fails at
    /// start-up instead of on the first candidate.
    fn check_statements(&self) -> Result<()> {
        let conn = self.lock()?;
        for sql in [&self.find_sql, &self.replace_sql, &self.body_sql] {
            conn.prepare_cached(sql).map_err(|e| BlobmendError::Config {
                message: format!("posts schema does not match the database: {}", e),
            })?;
        }
        Ok(())
    }

    /// Current body text of a record.
    pub fn body_of(&self, record_id: &RecordId) -> Result<Option<String>> {
        let conn = self.lock()?;
        let body = conn
            .prepare_cached(&self.body_sql)?
            .query_row(params![record_id], |row| row.get::<_, Option<String>>(0))
            .optional()?;
        Ok(body.flatten())
    }
}

impl ReferenceStore for SqliteReferenceStore {
    fn find_first_containing(&self, needle: &str) -> Result<Option<ReferenceMatch>> {
        let conn = self.lock()?;
        let found = conn
            .prepare_cached(&self.find_sql)?
            .query_row(params![needle], |row| {
                Ok(ReferenceMatch {
                    record_id: row.get(0)?,
                    title: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                })
            })
            .optional()?;

        debug!(needle, found = found.is_some(), "Reference lookup");
        Ok(found)
    }

    fn replace_in_body(&self, record_id: &RecordId, from: &str, to: &str) -> Result<usize> {
        let conn = self.lock()?;
        let rows = conn
            .prepare_cached(&self.replace_sql)?
            .execute(params![from, to, record_id])?;
        Ok(rows)
    }
}
