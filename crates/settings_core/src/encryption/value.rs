//! Encrypted attribute value.

use super::{CryptoResult, EncryptedColumn};

/// Attribute value that decrypts on read and encrypts on serialization.
///
/// The held text is kept verbatim, whether a caller assigned it or it was
/// loaded from storage, and is always read through `EncryptedColumn::load`.
/// Ciphertext handed back in is therefore decoded once and never encrypted
/// a second time.
#[derive(Debug, Clone, Default)]
pub struct EncryptedValue {
    raw: Option<String>,
}

impl EncryptedValue {
    /// Value with nothing stored.
    pub const fn empty() -> Self {
        Self { raw: None }
    }

    /// Wraps caller-provided text verbatim.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            raw: Some(value.into()),
        }
    }

    /// Replaces the held text with storage-encoded text.
    pub fn load(&mut self, raw: Option<&str>) {
        self.raw = raw.map(str::to_string);
    }

    /// Held text as given.
    pub fn raw(&self) -> Option<&str> {
        self.raw.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_none()
    }

    /// Plaintext via the default column.
    pub fn decrypt(&self) -> CryptoResult<Option<String>> {
        self.decrypt_with(&EncryptedColumn::new())
    }

    /// # Errors
    /// - With prefix mode off, held text that is not ciphertext fails to
    ///   decode, as it would when read from storage.
    pub fn decrypt_with(&self, column: &EncryptedColumn) -> CryptoResult<Option<String>> {
        column.load(self.raw())
    }

    /// Storage form via the default column.
    pub fn dump(&self) -> CryptoResult<Option<String>> {
        self.dump_with(&EncryptedColumn::new())
    }

    /// Re-encrypts the current plaintext with `column`.
    pub fn dump_with(&self, column: &EncryptedColumn) -> CryptoResult<Option<String>> {
        let plaintext = self.decrypt_with(column)?;
        column.dump(plaintext.as_deref())
    }
}

impl PartialEq for EncryptedValue {
    fn eq(&self, other: &Self) -> bool {
        match (self.decrypt(), other.decrypt()) {
            (Ok(left), Ok(right)) => left == right,
            _ => self.raw() == other.raw(),
        }
    }
}

impl From<&str> for EncryptedValue {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for EncryptedValue {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::EncryptedValue;
    use crate::config::{init_test_encryption, TEST_KEY};
    use crate::encryption::{CryptoError, EncryptedColumn, ENCRYPTION_PREFIX};

    #[test]
    fn empty_value_decrypts_and_dumps_to_none() {
        init_test_encryption();
        let value = EncryptedValue::empty();
        assert!(value.is_empty());
        assert_eq!(value.decrypt().unwrap(), None);
        assert_eq!(value.dump().unwrap(), None);
    }

    #[test]
    fn plaintext_value_is_encrypted_on_dump() {
        init_test_encryption();
        let value = EncryptedValue::new("foo");
        assert_eq!(value.decrypt().unwrap().as_deref(), Some("foo"));

        let dumped = value.dump().unwrap().unwrap();
        assert!(dumped.starts_with(ENCRYPTION_PREFIX));
        let column = EncryptedColumn::new().with_use_prefix(false);
        assert_eq!(column.load(Some(&dumped)).unwrap().as_deref(), Some("foo"));
    }

    #[test]
    fn loaded_ciphertext_is_kept_verbatim_and_decrypted_on_read() {
        init_test_encryption();
        let stored = EncryptedColumn::new().dump(Some("bar")).unwrap();

        let mut value = EncryptedValue::empty();
        value.load(stored.as_deref());
        assert_eq!(value.raw(), stored.as_deref());
        assert_eq!(value.decrypt().unwrap().as_deref(), Some("bar"));
    }

    #[test]
    fn unprefixed_ciphertext_needs_a_prefix_off_column() {
        let column = EncryptedColumn::new()
            .with_key(TEST_KEY)
            .with_use_prefix(false);
        let stored = column.dump(Some("foo")).unwrap();

        let mut value = EncryptedValue::empty();
        value.load(stored.as_deref());
        assert_eq!(value.decrypt_with(&column).unwrap().as_deref(), Some("foo"));
    }

    #[test]
    fn assigned_unmarked_ciphertext_is_encrypted_once() {
        let column = EncryptedColumn::new()
            .with_key(TEST_KEY)
            .with_use_prefix(false);
        let stored = column.dump(Some("foo")).unwrap().unwrap();

        let value = EncryptedValue::new(stored.clone());
        assert_eq!(value.decrypt_with(&column).unwrap().as_deref(), Some("foo"));

        let dumped = value.dump_with(&column).unwrap();
        assert_ne!(dumped.as_deref(), Some(stored.as_str()));
        assert_eq!(column.load(dumped.as_deref()).unwrap().as_deref(), Some("foo"));
    }

    #[test]
    fn assigned_plaintext_fails_to_decode_without_prefix_mode() {
        let column = EncryptedColumn::new()
            .with_key(TEST_KEY)
            .with_use_prefix(false);
        let value = EncryptedValue::new("not base64!");

        let err = value.decrypt_with(&column).unwrap_err();
        assert!(matches!(err, CryptoError::InvalidBase64(_)));
        assert!(value.dump_with(&column).is_err());
    }

    #[test]
    fn marked_ciphertext_assigned_in_prefix_mode_decrypts() {
        let column = EncryptedColumn::new()
            .with_key(TEST_KEY)
            .with_use_prefix(true);
        let stored = column.dump(Some("foo")).unwrap().unwrap();

        let value = EncryptedValue::new(stored);
        assert_eq!(value.decrypt_with(&column).unwrap().as_deref(), Some("foo"));
    }

    #[test]
    fn equality_compares_plaintext() {
        init_test_encryption();
        let mut loaded = EncryptedValue::empty();
        loaded.load(EncryptedColumn::new().dump(Some("same")).unwrap().as_deref());

        assert_eq!(loaded, EncryptedValue::new("same"));
        assert_ne!(loaded, EncryptedValue::new("other"));
        assert_eq!(EncryptedValue::empty(), EncryptedValue::default());
    }
}
