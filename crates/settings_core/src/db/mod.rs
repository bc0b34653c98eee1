//! SQLite store for persisted settings payloads.
//!
//! # Invariants
//! - Migration version is tracked via `PRAGMA user_version`.
//! - No payload is read or written before migrations succeed.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    /// Parent directory of a store file could not be created.
    CreateDir { path: PathBuf, source: std::io::Error },
    Sqlite(rusqlite::Error),
    /// A migration script failed; nothing from the batch was committed.
    Migration { version: u32, source: rusqlite::Error },
    /// The store was written by a newer build.
    StoreTooNew { store_version: u32, supported: u32 },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CreateDir { path, source } => {
                write!(f, "cannot create store directory `{}`: {source}", path.display())
            }
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::Migration { version, source } => {
                write!(f, "settings store migration {version} failed: {source}")
            }
            Self::StoreTooNew {
                store_version,
                supported,
            } => write!(
                f,
                "settings store version {store_version} is newer than supported {supported}"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::CreateDir { source, .. } => Some(source),
            Self::Sqlite(err) | Self::Migration { source: err, .. } => Some(err),
            Self::StoreTooNew { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
