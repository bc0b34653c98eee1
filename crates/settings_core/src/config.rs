//! Process-wide encryption configuration.
//!
//! # Responsibility
//! - Hold the encryption key and active feature flags for the process.
//! - Provide read-only lookups used by `EncryptedColumn`.
//!
//! # Invariants
//! - Configuration is installed at most once per process.
//! - Re-installing an identical configuration is idempotent.
//! - Installing a different configuration is rejected.

use log::info;
use once_cell::sync::OnceCell;
use std::collections::BTreeSet;

/// Feature flag that, while inactive, makes columns write `--ENCR--` prefixed ciphertext.
pub const FEATURE_DB_ENCRYPTION_PREFIX: &str = "db_encryption_prefix";

const ENV_ENCRYPTION_KEY: &str = "SETTINGS_ENCRYPTION_KEY";
const ENV_ACTIVE_FEATURES: &str = "SETTINGS_ACTIVE_FEATURES";

static ENCRYPTION_CONFIG: OnceCell<EncryptionConfig> = OnceCell::new();

/// Encryption key and feature flags shared by every column in the process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncryptionConfig {
    /// Raw key material. Only the first 32 bytes are used.
    pub key: Option<String>,
    /// Names of active feature flags.
    pub active_features: BTreeSet<String>,
}

impl EncryptionConfig {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            active_features: BTreeSet::new(),
        }
    }

    /// Marks one feature flag as active.
    pub fn with_feature(mut self, feature: impl Into<String>) -> Self {
        self.active_features.insert(feature.into());
        self
    }

    /// Reads `SETTINGS_ENCRYPTION_KEY` and comma-separated `SETTINGS_ACTIVE_FEATURES`.
    pub fn from_env() -> Self {
        let key = std::env::var(ENV_ENCRYPTION_KEY)
            .ok()
            .filter(|value| !value.trim().is_empty());
        let active_features = std::env::var(ENV_ACTIVE_FEATURES)
            .map(|raw| parse_feature_list(&raw))
            .unwrap_or_default();

        Self {
            key,
            active_features,
        }
    }

    pub fn feature_active(&self, feature: &str) -> bool {
        self.active_features.contains(feature)
    }
}

/// Installs the process-wide encryption configuration.
///
/// # Errors
/// - Returns an error when a different configuration is already installed.
pub fn init_encryption(config: EncryptionConfig) -> Result<(), String> {
    if let Some(active) = ENCRYPTION_CONFIG.get() {
        return if *active == config {
            Ok(())
        } else {
            Err("encryption already initialized; refusing to switch configuration".to_string())
        };
    }

    let features = config.active_features.len();
    let key_present = config.key.is_some();
    let installed = ENCRYPTION_CONFIG.get_or_init(|| config.clone());
    if *installed != config {
        return Err("encryption already initialized; refusing to switch configuration".to_string());
    }

    info!(
        "event=encryption_init module=config status=ok key_present={} active_features={}",
        key_present, features
    );
    Ok(())
}

/// Returns the installed configuration, if any.
pub fn encryption_config() -> Option<&'static EncryptionConfig> {
    ENCRYPTION_CONFIG.get()
}

/// Returns the configured key. `None` until `init_encryption` ran with a key.
pub fn encryption_key() -> Option<&'static str> {
    encryption_config().and_then(|config| config.key.as_deref())
}

/// Feature flag lookup. Unconfigured processes report every flag inactive.
pub fn feature_active(feature: &str) -> bool {
    encryption_config().is_some_and(|config| config.feature_active(feature))
}

fn parse_feature_list(raw: &str) -> BTreeSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
pub(crate) const TEST_KEY: &str =
    "secretsecretsecretsecretsecretsecretsecretsecretsecretsecret";

/// Installs the shared configuration used by unit tests.
#[cfg(test)]
pub(crate) fn init_test_encryption() {
    init_encryption(EncryptionConfig::new(TEST_KEY)).expect("test encryption config");
}
