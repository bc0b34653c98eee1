//! Field-level encryption for settings values.
//!
//! # Responsibility
//! - Convert between plaintext and the versioned ciphertext text form.
//! - Box encrypted attribute values so they stay ciphertext at rest.
//!
//! # Invariants
//! - Stored output is never plaintext while encryption is enabled.
//! - Malformed ciphertext is reported, never guessed around.
//! - Text written with or without the `--ENCR--` marker stays readable.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod column;
pub mod value;

pub use column::{EncryptedColumn, ENCRYPTION_PREFIX};
pub use value::EncryptedValue;

pub type CryptoResult<T> = Result<T, CryptoError>;

/// Encryption and decryption failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    MissingKey,
    KeyTooShort { len: usize },
    InvalidBase64(String),
    CiphertextTooShort { len: usize },
    Decrypt,
    InvalidUtf8,
}

impl Display for CryptoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingKey => write!(f, "encryption key is not configured"),
            Self::KeyTooShort { len } => {
                write!(f, "encryption key must be at least 32 bytes, got {len}")
            }
            Self::InvalidBase64(message) => write!(f, "ciphertext is not valid base64: {message}"),
            Self::CiphertextTooShort { len } => {
                write!(f, "ciphertext is too short to carry an iv: {len} bytes")
            }
            Self::Decrypt => write!(f, "ciphertext could not be decrypted"),
            Self::InvalidUtf8 => write!(f, "decrypted value is not valid UTF-8"),
        }
    }
}

impl Error for CryptoError {}
