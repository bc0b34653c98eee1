//! Typed settings records with field-level encryption.
//! Records are declared as closed schemas, loaded from generic JSON data and
//! serialized back with encrypted attributes rendered as ciphertext.

pub mod config;
pub mod db;
pub mod encryption;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{
    encryption_config, feature_active, init_encryption, EncryptionConfig,
    FEATURE_DB_ENCRYPTION_PREFIX,
};
pub use encryption::{CryptoError, CryptoResult, EncryptedColumn, EncryptedValue, ENCRYPTION_PREFIX};
pub use logging::{init_logging, logging_status, LogConfig};
pub use model::{
    AttributeDecl, AttributeKind, AttributeValue, Collection, DefaultSettings, ErrorCode, Errors,
    Map, Model, Rule, ScalarType, Schema, SchemaError, Settings, SettingsError, SettingsResult,
};
pub use repo::settings_repo::{RepoError, RepoResult, SettingsRepository, SqliteSettingsRepository};
pub use service::settings_service::{ServiceError, ServiceResult, SettingsService};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
