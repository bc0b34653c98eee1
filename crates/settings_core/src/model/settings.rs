//! Root settings records.
//!
//! # Responsibility
//! - Gate persistence on validation (`Settings::save`).
//! - Provide the read-only `DefaultSettings` variant.
//!
//! # Invariants
//! - `merge` never triggers `save`.
//! - `DefaultSettings` is frozen from construction on.

use super::record::Model;
use super::schema::Schema;
use super::{Map, SettingsError, SettingsResult};
use log::{debug, info};
use serde_json::Value;
use std::fmt::{Debug, Formatter};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

type SaveCallback = Box<dyn FnMut()>;

/// Root record with a save callback.
///
/// Derefs to `Model` for attribute access.
pub struct Settings {
    model: Model,
    on_save: Option<SaveCallback>,
}

impl Settings {
    pub fn new(schema: &Arc<Schema>) -> Self {
        Self::from_model(Model::new(schema))
    }

    pub fn with_attributes(schema: &Arc<Schema>, attributes: &Map) -> SettingsResult<Self> {
        Model::with_attributes(schema, attributes).map(Self::from_model)
    }

    /// Loads stored JSON; `null` yields defaults.
    pub fn from_json(schema: &Arc<Schema>, json: &str, extra: &Map) -> SettingsResult<Self> {
        Model::from_json(schema, json, extra).map(Self::from_model)
    }

    pub fn from_model(model: Model) -> Self {
        Self {
            model,
            on_save: None,
        }
    }

    /// Registers the save callback, replacing any earlier one.
    pub fn on_save(mut self, callback: impl FnMut() + 'static) -> Self {
        self.set_on_save(callback);
        self
    }

    pub fn set_on_save(&mut self, callback: impl FnMut() + 'static) {
        self.on_save = Some(Box::new(callback));
    }

    /// Validates and, when valid, runs the save callback.
    ///
    /// Returns whether the record was valid. Invalid records are left
    /// untouched with `errors` populated.
    pub fn save(&mut self) -> SettingsResult<bool> {
        if !self.model.valid()? {
            debug!(
                "event=settings_save module=model status=skipped schema={} errors={}",
                self.model.schema().name(),
                self.model.errors().len()
            );
            return Ok(false);
        }

        if let Some(callback) = self.on_save.as_mut() {
            callback();
        }
        info!(
            "event=settings_save module=model status=ok schema={}",
            self.model.schema().name()
        );
        Ok(true)
    }

    /// Display form of the settings; encrypted values appear as ciphertext.
    pub fn obfuscated(&self) -> SettingsResult<Map> {
        self.model.to_hash()
    }

    pub fn into_model(self) -> Model {
        self.model
    }
}

impl Deref for Settings {
    type Target = Model;

    fn deref(&self) -> &Self::Target {
        &self.model
    }
}

impl DerefMut for Settings {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.model
    }
}

impl Debug for Settings {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("model", &self.model)
            .field("on_save", &self.on_save.is_some())
            .finish()
    }
}

/// Read-only settings holding declared defaults.
///
/// Derefs to `Model` for reads only.
#[derive(Debug, Clone, PartialEq)]
pub struct DefaultSettings {
    model: Model,
}

impl DefaultSettings {
    pub fn new(schema: &Arc<Schema>) -> Self {
        Self::from_model(Model::new(schema))
    }

    pub fn with_attributes(schema: &Arc<Schema>, attributes: &Map) -> SettingsResult<Self> {
        Model::with_attributes(schema, attributes).map(Self::from_model)
    }

    pub fn from_model(mut model: Model) -> Self {
        model.freeze();
        Self { model }
    }

    pub fn merge(&mut self, _data: &Map) -> SettingsResult<()> {
        Err(SettingsError::NotSupported(
            "merge is not supported on default settings",
        ))
    }

    pub fn set(&mut self, _name: &str, _value: Value) -> SettingsResult<()> {
        Err(SettingsError::NotSupported(
            "setting values is not supported on default settings",
        ))
    }
}

impl Deref for DefaultSettings {
    type Target = Model;

    fn deref(&self) -> &Self::Target {
        &self.model
    }
}
