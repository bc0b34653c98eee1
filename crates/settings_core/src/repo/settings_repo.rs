//! Settings payload repository and SQLite implementation.
//!
//! # Invariants
//! - One payload per owner id.
//! - Writes reject payloads that are not JSON objects.

use crate::db::DbError;
use log::debug;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for settings payload storage.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    NotFound(String),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(owner_id) => write!(f, "settings not found for owner: {owner_id}"),
            Self::InvalidData(message) => write!(f, "invalid settings payload: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::NotFound(_) | Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Storage contract for serialized settings.
pub trait SettingsRepository {
    /// Inserts or replaces the payload of `owner_id`.
    fn upsert_payload(&self, owner_id: &str, payload: &str) -> RepoResult<()>;
    fn get_payload(&self, owner_id: &str) -> RepoResult<Option<String>>;
    /// Removes the payload of `owner_id`; `NotFound` when none is stored.
    fn delete_payload(&self, owner_id: &str) -> RepoResult<()>;
    /// Owner ids with a stored payload, sorted ascending.
    fn list_owner_ids(&self) -> RepoResult<Vec<String>>;
}

/// SQLite-backed settings repository over the `entity_settings` table.
pub struct SqliteSettingsRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteSettingsRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl SettingsRepository for SqliteSettingsRepository<'_> {
    fn upsert_payload(&self, owner_id: &str, payload: &str) -> RepoResult<()> {
        ensure_object_payload(owner_id, payload)?;

        self.conn.execute(
            "INSERT INTO entity_settings (owner_id, payload) VALUES (?1, ?2)
             ON CONFLICT(owner_id) DO UPDATE SET
                payload = excluded.payload,
                updated_at = (CAST(strftime('%s', 'now') AS INTEGER) * 1000);",
            params![owner_id, payload],
        )?;

        debug!(
            "event=settings_upsert module=repo status=ok owner_id={owner_id} bytes={}",
            payload.len()
        );
        Ok(())
    }

    fn get_payload(&self, owner_id: &str) -> RepoResult<Option<String>> {
        let payload = self
            .conn
            .query_row(
                "SELECT payload FROM entity_settings WHERE owner_id = ?1;",
                [owner_id],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(payload)
    }

    fn delete_payload(&self, owner_id: &str) -> RepoResult<()> {
        let changed = self.conn.execute(
            "DELETE FROM entity_settings WHERE owner_id = ?1;",
            [owner_id],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound(owner_id.to_string()));
        }
        Ok(())
    }

    fn list_owner_ids(&self) -> RepoResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT owner_id FROM entity_settings ORDER BY owner_id ASC;")?;
        let owner_ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(owner_ids)
    }
}

fn ensure_object_payload(owner_id: &str, payload: &str) -> RepoResult<()> {
    match serde_json::from_str::<Value>(payload) {
        Ok(Value::Object(_)) => Ok(()),
        Ok(other) => Err(RepoError::InvalidData(format!(
            "payload for `{owner_id}` must be a JSON object, got `{other}`"
        ))),
        Err(err) => Err(RepoError::InvalidData(format!(
            "payload for `{owner_id}` is not JSON: {err}"
        ))),
    }
}
