//! Settings use-case service.
//!
//! # Responsibility
//! - Load typed settings for an owner from stored payloads.
//! - Persist settings only after they pass validation.
//!
//! # Invariants
//! - Payloads are written from `to_json`, so encrypted attributes are
//!   stored as ciphertext.
//! - The owner key, when configured, reaches every nested record as an
//!   additional attribute.

use crate::model::{DefaultSettings, Map, Schema, Settings, SettingsError};
use crate::repo::settings_repo::{RepoError, SettingsRepository};
use log::info;
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug)]
pub enum ServiceError {
    Settings(SettingsError),
    Repo(RepoError),
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Settings(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Settings(err) => Some(err),
            Self::Repo(err) => Some(err),
        }
    }
}

impl From<SettingsError> for ServiceError {
    fn from(value: SettingsError) -> Self {
        Self::Settings(value)
    }
}

impl From<RepoError> for ServiceError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// Use-case service for settings of one schema.
pub struct SettingsService<R: SettingsRepository> {
    repo: R,
    schema: Arc<Schema>,
    owner_key: Option<String>,
}

impl<R: SettingsRepository> SettingsService<R> {
    pub fn new(repo: R, schema: &Arc<Schema>) -> Self {
        Self {
            repo,
            schema: Arc::clone(schema),
            owner_key: None,
        }
    }

    /// Injects the owner id under `key` as an additional attribute on load.
    pub fn with_owner_key(mut self, key: impl Into<String>) -> Self {
        self.owner_key = Some(key.into());
        self
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Loads the settings of `owner_id`; owners without a payload get defaults.
    pub fn load(&self, owner_id: &str) -> ServiceResult<Settings> {
        let payload = self.repo.get_payload(owner_id)?;
        let settings = Settings::from_json(
            &self.schema,
            payload.as_deref().unwrap_or("null"),
            &self.extra_for(owner_id),
        )?;
        Ok(settings)
    }

    /// Validates `settings`, runs its save callback and stores it.
    ///
    /// Returns `false` without writing when validation fails.
    pub fn save(&self, owner_id: &str, settings: &mut Settings) -> ServiceResult<bool> {
        if !settings.save()? {
            info!(
                "event=settings_persist module=service status=skipped owner_id={owner_id} reason=invalid"
            );
            return Ok(false);
        }

        let payload = settings.to_json()?;
        self.repo.upsert_payload(owner_id, &payload)?;
        info!("event=settings_persist module=service status=ok owner_id={owner_id}");
        Ok(true)
    }

    /// Shallow update of scalar values followed by an explicit `save`.
    pub fn merge_and_save(&self, owner_id: &str, data: &Map) -> ServiceResult<Settings> {
        let mut settings = self.load(owner_id)?;
        settings.merge(data)?;
        self.save(owner_id, &mut settings)?;
        Ok(settings)
    }

    /// Removes the stored payload of `owner_id`.
    pub fn delete(&self, owner_id: &str) -> ServiceResult<()> {
        self.repo.delete_payload(owner_id)?;
        Ok(())
    }

    pub fn owner_ids(&self) -> ServiceResult<Vec<String>> {
        Ok(self.repo.list_owner_ids()?)
    }

    /// Read-only defaults of the schema.
    pub fn defaults(&self) -> DefaultSettings {
        DefaultSettings::new(&self.schema)
    }

    fn extra_for(&self, owner_id: &str) -> Map {
        let mut extra = Map::new();
        if let Some(key) = &self.owner_key {
            extra.insert(key.clone(), Value::String(owner_id.to_string()));
        }
        extra
    }
}
