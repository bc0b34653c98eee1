//! AES-256-CBC text codec for encrypted columns.
//!
//! Wire format: `[--ENCR--]base64(ciphertext ++ iv)`. The marker is written
//! only in prefix mode; reads accept both forms.

use super::{CryptoError, CryptoResult};
use crate::config::{encryption_key, feature_active, FEATURE_DB_ENCRYPTION_PREFIX};
use aes::Aes256;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use log::warn;
use once_cell::unsync::OnceCell;
use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt::{Debug, Formatter};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Marker prepended to ciphertext written in prefix mode.
pub const ENCRYPTION_PREFIX: &str = "--ENCR--";

const KEY_SIZE: usize = 32;
const IV_SIZE: usize = 16;

/// Converts between plaintext and stored ciphertext text.
///
/// Key and prefix mode fall back to the process-wide configuration unless
/// set explicitly. The key is read on first use and cached per instance.
#[derive(Clone, Default)]
pub struct EncryptedColumn {
    disabled: bool,
    use_prefix: Option<bool>,
    key: OnceCell<String>,
}

impl EncryptedColumn {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the feature-flag derived prefix mode.
    pub fn with_use_prefix(mut self, use_prefix: bool) -> Self {
        self.use_prefix = Some(use_prefix);
        self
    }

    /// Uses an explicit key instead of the process-wide one.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = OnceCell::with_value(key.into());
        self
    }

    /// Turns `dump` into an identity passthrough. `load` still decrypts.
    pub fn disable(mut self) -> Self {
        self.disabled = true;
        self
    }

    pub fn is_enabled(&self) -> bool {
        !self.disabled
    }

    /// Whether `dump` writes the `--ENCR--` marker.
    pub fn use_prefix(&self) -> bool {
        self.use_prefix
            .unwrap_or_else(|| !feature_active(FEATURE_DB_ENCRYPTION_PREFIX))
    }

    /// Decodes stored text into plaintext.
    ///
    /// Text is decrypted only when prefix mode is off or the marker is
    /// present; anything else is legacy plaintext and returned unchanged.
    ///
    /// # Errors
    /// - Returns `CryptoError` for malformed ciphertext or an unusable key.
    pub fn load(&self, data: Option<&str>) -> CryptoResult<Option<String>> {
        let Some(text) = data else {
            return Ok(None);
        };
        if !self.should_decrypt(text) {
            return Ok(Some(text.to_string()));
        }

        self.decrypt(text).map(Some).map_err(|err| {
            warn!("event=decrypt module=encryption status=error error={err}");
            err
        })
    }

    /// Encodes plaintext for storage.
    ///
    /// Absent or blank input, and any input while disabled, is returned
    /// unchanged.
    ///
    /// # Errors
    /// - Returns `CryptoError` when the key is missing or too short.
    pub fn dump(&self, data: Option<&str>) -> CryptoResult<Option<String>> {
        match data {
            Some(text) if self.should_encrypt(text) => self.encrypt(text).map(Some),
            other => Ok(other.map(str::to_string)),
        }
    }

    fn should_decrypt(&self, text: &str) -> bool {
        is_present(text) && (!self.use_prefix() || text.starts_with(ENCRYPTION_PREFIX))
    }

    fn should_encrypt(&self, text: &str) -> bool {
        is_present(text) && self.is_enabled()
    }

    fn encrypt(&self, plaintext: &str) -> CryptoResult<String> {
        let key = self.cipher_key()?;
        let mut iv = [0u8; IV_SIZE];
        OsRng.fill_bytes(&mut iv);

        let mut payload = Aes256CbcEnc::new_from_slices(key, &iv)
            .map_err(|_| CryptoError::KeyTooShort { len: key.len() })?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());
        payload.extend_from_slice(&iv);

        let encoded = STANDARD.encode(payload);
        if self.use_prefix() {
            Ok(format!("{ENCRYPTION_PREFIX}{encoded}"))
        } else {
            Ok(encoded)
        }
    }

    fn decrypt(&self, text: &str) -> CryptoResult<String> {
        let encoded = text.strip_prefix(ENCRYPTION_PREFIX).unwrap_or(text);
        let data = STANDARD
            .decode(encoded)
            .map_err(|err| CryptoError::InvalidBase64(err.to_string()))?;
        if data.len() <= IV_SIZE {
            return Err(CryptoError::CiphertextTooShort { len: data.len() });
        }

        let (ciphertext, iv) = data.split_at(data.len() - IV_SIZE);
        let key = self.cipher_key()?;
        let plaintext = Aes256CbcDec::new_from_slices(key, iv)
            .map_err(|_| CryptoError::Decrypt)?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| CryptoError::Decrypt)?;

        String::from_utf8(plaintext).map_err(|_| CryptoError::InvalidUtf8)
    }

    fn cipher_key(&self) -> CryptoResult<&[u8]> {
        let key = self.key.get_or_try_init(|| {
            encryption_key()
                .map(str::to_string)
                .ok_or(CryptoError::MissingKey)
        })?;

        let bytes = key.as_bytes();
        if bytes.len() < KEY_SIZE {
            return Err(CryptoError::KeyTooShort { len: bytes.len() });
        }
        Ok(&bytes[..KEY_SIZE])
    }
}

impl Debug for EncryptedColumn {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedColumn")
            .field("disabled", &self.disabled)
            .field("use_prefix", &self.use_prefix)
            .field("key", &self.key.get().map(|_| "<redacted>"))
            .finish()
    }
}

fn is_present(text: &str) -> bool {
    !text.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::{EncryptedColumn, ENCRYPTION_PREFIX};
    use crate::config::{init_test_encryption, TEST_KEY};
    use crate::encryption::CryptoError;

    fn column(use_prefix: bool) -> EncryptedColumn {
        EncryptedColumn::new()
            .with_key(TEST_KEY)
            .with_use_prefix(use_prefix)
    }

    #[test]
    fn roundtrips_in_both_prefix_modes() {
        for use_prefix in [true, false] {
            let column = column(use_prefix);
            let dumped = column.dump(Some("foo")).unwrap().unwrap();
            assert_ne!(dumped, "foo");
            assert_eq!(dumped.starts_with(ENCRYPTION_PREFIX), use_prefix);
            assert_eq!(column.load(Some(&dumped)).unwrap().as_deref(), Some("foo"));
        }
    }

    #[test]
    fn roundtrips_multibyte_text() {
        let column = column(false);
        let dumped = column.dump(Some("zażółć gęślą jaźń")).unwrap();
        let loaded = column.load(dumped.as_deref()).unwrap();
        assert_eq!(loaded.as_deref(), Some("zażółć gęślą jaźń"));
    }

    #[test]
    fn prefixed_text_is_readable_without_prefix_mode() {
        let dumped = column(true).dump(Some("secret")).unwrap();
        let loaded = column(false).load(dumped.as_deref()).unwrap();
        assert_eq!(loaded.as_deref(), Some("secret"));
    }

    #[test]
    fn unprefixed_text_is_legacy_plaintext_in_prefix_mode() {
        let dumped = column(false).dump(Some("secret")).unwrap().unwrap();
        let loaded = column(true).load(Some(&dumped)).unwrap();
        assert_eq!(loaded.as_deref(), Some(dumped.as_str()));

        let legacy = column(true).load(Some("plain value")).unwrap();
        assert_eq!(legacy.as_deref(), Some("plain value"));
    }

    #[test]
    fn absent_and_blank_values_pass_through() {
        let column = column(true);
        assert_eq!(column.dump(None).unwrap(), None);
        assert_eq!(column.dump(Some("")).unwrap().as_deref(), Some(""));
        assert_eq!(column.dump(Some("  ")).unwrap().as_deref(), Some("  "));
        assert_eq!(column.load(None).unwrap(), None);
        assert_eq!(column.load(Some("")).unwrap().as_deref(), Some(""));
    }

    #[test]
    fn disabled_column_does_not_encrypt() {
        let column = column(true).disable();
        assert!(!column.is_enabled());
        assert_eq!(column.dump(Some("foo")).unwrap().as_deref(), Some("foo"));
    }

    #[test]
    fn every_dump_uses_a_fresh_iv() {
        let column = column(true);
        let first = column.dump(Some("same")).unwrap();
        let second = column.dump(Some("same")).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn malformed_ciphertext_is_an_error() {
        let column = column(true);
        let err = column
            .load(Some("--ENCR--not base64!"))
            .expect_err("bad base64 must fail");
        assert!(matches!(err, CryptoError::InvalidBase64(_)));

        let err = column
            .load(Some("--ENCR--YWJj"))
            .expect_err("short payload must fail");
        assert_eq!(err, CryptoError::CiphertextTooShort { len: 3 });
    }

    #[test]
    fn wrong_key_does_not_yield_the_plaintext() {
        let dumped = column(true).dump(Some("foo")).unwrap();
        let other = EncryptedColumn::new()
            .with_key("x".repeat(32))
            .with_use_prefix(true);
        match other.load(dumped.as_deref()) {
            Ok(value) => assert_ne!(value.as_deref(), Some("foo")),
            Err(err) => assert!(matches!(
                err,
                CryptoError::Decrypt | CryptoError::InvalidUtf8
            )),
        }
    }

    #[test]
    fn short_key_is_rejected() {
        let column = EncryptedColumn::new().with_key("short").with_use_prefix(true);
        let err = column.dump(Some("foo")).expect_err("short key must fail");
        assert_eq!(err, CryptoError::KeyTooShort { len: 5 });
    }

    #[test]
    fn default_column_uses_process_config() {
        init_test_encryption();
        let column = EncryptedColumn::new();
        assert!(column.use_prefix());

        let dumped = column.dump(Some("44")).unwrap().unwrap();
        assert!(dumped.starts_with(ENCRYPTION_PREFIX));
        assert_eq!(column.load(Some(&dumped)).unwrap().as_deref(), Some("44"));
    }

    #[test]
    fn debug_output_redacts_key() {
        let rendered = format!("{:?}", column(true));
        assert!(!rendered.contains(TEST_KEY));
        assert!(rendered.contains("redacted"));
    }
}
