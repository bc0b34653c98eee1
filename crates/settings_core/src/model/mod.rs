//! Typed settings records.
//!
//! # Responsibility
//! - Declare closed record schemas (`Schema`, `AttributeDecl`).
//! - Hold and convert record state (`Model`, `Collection`).
//! - Provide the root `Settings` record and its frozen `DefaultSettings` form.
//!
//! # Invariants
//! - Generic data in and out is a JSON object (`Map`).
//! - Unknown keys are ignored, never rejected.
//! - Encrypted attributes only ever serialize as ciphertext.
//!
//! # See also
//! - crate::encryption for the ciphertext format.

pub mod attribute;
pub mod collection;
pub mod record;
pub mod schema;
pub mod settings;
pub mod validation;

use crate::encryption::CryptoError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub use attribute::{AttributeDecl, AttributeKind, AttributeValue, ScalarType};
pub use collection::{Collection, ID_ATTRIBUTE};
pub use record::Model;
pub use schema::{Schema, SchemaBuilder, SchemaError};
pub use settings::{DefaultSettings, Settings};
pub use validation::{ErrorCode, Errors, Rule};

/// Generic key-value representation used for load and `to_hash`.
pub type Map = serde_json::Map<String, serde_json::Value>;

/// Result type for record operations.
pub type SettingsResult<T> = Result<T, SettingsError>;

/// Record operation errors.
#[derive(Debug)]
pub enum SettingsError {
    /// Write on a frozen record or on a read-only attribute.
    MutationOnImmutable { attribute: String },
    /// Operation never allowed on this record type.
    NotSupported(&'static str),
    /// Value shape does not fit the declared kind.
    KindMismatch {
        attribute: String,
        expected: &'static str,
    },
    /// Collection item id already taken.
    DuplicateId(String),
    Crypto(CryptoError),
    Json(serde_json::Error),
}

impl Display for SettingsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MutationOnImmutable { attribute } => {
                write!(f, "cannot modify immutable attribute `{attribute}`")
            }
            Self::NotSupported(message) => write!(f, "{message}"),
            Self::KindMismatch {
                attribute,
                expected,
            } => write!(f, "attribute `{attribute}` expects a {expected} value"),
            Self::DuplicateId(id) => write!(f, "collection already holds an item with id `{id}`"),
            Self::Crypto(err) => write!(f, "{err}"),
            Self::Json(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SettingsError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Crypto(err) => Some(err),
            Self::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<CryptoError> for SettingsError {
    fn from(value: CryptoError) -> Self {
        Self::Crypto(value)
    }
}

impl From<serde_json::Error> for SettingsError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}
