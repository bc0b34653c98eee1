//! Typed record instances.
//!
//! # Responsibility
//! - Hold one value slot per declared attribute of a schema.
//! - Route generic key-value data into scalar, nested, collection and
//!   encrypted slots (`load`, `merge`, `set`).
//! - Render the generic representation back out (`to_hash`).
//!
//! # Invariants
//! - Every stored value matches its declared kind.
//! - Unknown keys are ignored everywhere, never rejected.
//! - Frozen records reject every write.

use super::attribute::{fill_missing, raw_text, AttributeKind, AttributeValue};
use super::collection::Collection;
use super::schema::Schema;
use super::validation::Errors;
use super::{Map, SettingsError, SettingsResult};
use crate::encryption::EncryptedValue;
use log::debug;
use serde::ser::Error as _;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::sync::Arc;

static EMPTY_ENCRYPTED: AttributeValue = AttributeValue::Encrypted(EncryptedValue::empty());

/// Origin of a write; read-only attributes only accept the first two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteMode {
    Construct,
    Load,
    Assign,
}

/// One record of a schema.
#[derive(Debug, Clone)]
pub struct Model {
    schema: Arc<Schema>,
    values: Vec<Option<AttributeValue>>,
    additional_attributes: Map,
    errors: Errors,
    frozen: bool,
}

impl Model {
    /// Creates a record holding declared defaults.
    ///
    /// Collection attributes start as empty collections; nested models start absent.
    pub fn new(schema: &Arc<Schema>) -> Self {
        Self {
            schema: Arc::clone(schema),
            values: schema
                .attributes()
                .iter()
                .map(|decl| decl.initial_value())
                .collect(),
            additional_attributes: Map::new(),
            errors: Errors::new(),
            frozen: false,
        }
    }

    /// Creates a record and assigns `attributes` over the defaults.
    pub fn with_attributes(schema: &Arc<Schema>, attributes: &Map) -> SettingsResult<Self> {
        let mut model = Self::new(schema);
        model.assign_all(attributes, WriteMode::Construct)?;
        Ok(model)
    }

    /// Creates a record from a JSON object (or `null`) via `load`.
    pub fn from_json(schema: &Arc<Schema>, json: &str, extra: &Map) -> SettingsResult<Self> {
        let data: Option<Map> = serde_json::from_str(json)?;
        let mut model = Self::new(schema);
        model.load(&data.unwrap_or_default(), extra)?;
        Ok(model)
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.schema.position(name).is_some()
    }

    /// Declared kind of `name`, `None` when undeclared.
    pub fn primitive(&self, name: &str) -> Option<&AttributeKind> {
        self.schema.kind(name)
    }

    pub fn is_collection(&self, name: &str) -> Option<bool> {
        self.primitive(name)
            .map(|kind| matches!(kind, AttributeKind::Collection(_)))
    }

    pub fn is_model(&self, name: &str) -> Option<bool> {
        self.primitive(name)
            .map(|kind| matches!(kind, AttributeKind::Model(_)))
    }

    pub fn is_encrypted(&self, name: &str) -> Option<bool> {
        self.primitive(name)
            .map(|kind| matches!(kind, AttributeKind::Encrypted))
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Rejects every later write on this record.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    /// Current value of `name`.
    ///
    /// A never-set encrypted attribute reads as an empty `EncryptedValue`.
    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.schema.position(name).and_then(|index| self.read(index))
    }

    /// Mutable handle to the value of `name`.
    ///
    /// A never-set encrypted attribute is stored as an empty value first.
    ///
    /// # Errors
    /// - Returns `MutationOnImmutable` on a frozen record.
    pub fn get_mut(&mut self, name: &str) -> SettingsResult<Option<&mut AttributeValue>> {
        let Some(index) = self.schema.position(name) else {
            return Ok(None);
        };
        self.ensure_not_frozen(index)?;

        let encrypted = matches!(
            self.schema.attributes()[index].kind(),
            AttributeKind::Encrypted
        );
        let slot = &mut self.values[index];
        if slot.is_none() && encrypted {
            *slot = Some(AttributeValue::Encrypted(EncryptedValue::empty()));
        }
        Ok(slot.as_mut())
    }

    pub fn get_scalar(&self, name: &str) -> Option<&Value> {
        self.get(name).and_then(AttributeValue::as_scalar)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get_scalar(name).and_then(Value::as_str)
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get_scalar(name).and_then(Value::as_bool)
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get_scalar(name).and_then(Value::as_i64)
    }

    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get_scalar(name).and_then(Value::as_f64)
    }

    pub fn get_model(&self, name: &str) -> Option<&Model> {
        self.get(name).and_then(AttributeValue::as_model)
    }

    pub fn get_model_mut(&mut self, name: &str) -> SettingsResult<Option<&mut Model>> {
        Ok(self.get_mut(name)?.and_then(AttributeValue::as_model_mut))
    }

    pub fn get_collection(&self, name: &str) -> Option<&Collection> {
        self.get(name).and_then(AttributeValue::as_collection)
    }

    pub fn get_collection_mut(&mut self, name: &str) -> SettingsResult<Option<&mut Collection>> {
        Ok(self.get_mut(name)?.and_then(AttributeValue::as_collection_mut))
    }

    pub fn get_encrypted(&self, name: &str) -> Option<&EncryptedValue> {
        self.get(name).and_then(AttributeValue::as_encrypted)
    }

    /// Assigns a generic value to `name`. Undeclared names are ignored.
    ///
    /// Scalars are coerced, text becomes an `EncryptedValue` as-is, objects
    /// build nested models and arrays build collections.
    ///
    /// # Errors
    /// - Returns `MutationOnImmutable` on a frozen record or read-only attribute.
    /// - Returns `KindMismatch` when a nested model or collection gets the wrong shape.
    pub fn set(&mut self, name: &str, value: Value) -> SettingsResult<()> {
        self.ensure_unfrozen(name)?;
        match self.schema.position(name) {
            Some(index) => self.assign(index, value, WriteMode::Assign),
            None => {
                self.log_ignored(name);
                Ok(())
            }
        }
    }

    /// Stores an already built value. Undeclared names are ignored.
    pub fn set_value(&mut self, name: &str, value: AttributeValue) -> SettingsResult<()> {
        self.ensure_unfrozen(name)?;
        let Some(index) = self.schema.position(name) else {
            self.log_ignored(name);
            return Ok(());
        };
        self.guard(index, WriteMode::Assign)?;

        let kind = self.schema.attributes()[index].kind();
        if !value.matches(kind) {
            return Err(SettingsError::KindMismatch {
                attribute: name.to_string(),
                expected: kind.as_str(),
            });
        }
        self.values[index] = Some(value);
        Ok(())
    }

    /// Mass assignment into this record.
    pub fn update_attributes(&mut self, attributes: &Map) -> SettingsResult<()> {
        self.assign_all(attributes, WriteMode::Assign)
    }

    /// Values of attributes that are neither collection, encrypted nor nested model.
    pub fn simple_attributes(&self) -> Map {
        self.schema
            .attributes()
            .iter()
            .enumerate()
            .filter(|(_, decl)| decl.kind().is_simple())
            .map(|(index, decl)| {
                let value = self
                    .read(index)
                    .and_then(AttributeValue::as_scalar)
                    .cloned()
                    .unwrap_or(Value::Null);
                (decl.name().to_string(), value)
            })
            .collect()
    }

    pub fn additional_attributes(&self) -> &Map {
        &self.additional_attributes
    }

    /// Replaces the auxiliary values and cascades them to every child.
    pub fn set_additional_attributes(&mut self, extra: Map) -> SettingsResult<()> {
        self.ensure_unfrozen("additional_attributes")?;
        self.propagate_additional(extra);
        Ok(())
    }

    pub(crate) fn propagate_additional(&mut self, extra: Map) {
        for slot in self.values.iter_mut().flatten() {
            match slot {
                AttributeValue::Model(model) => model.propagate_additional(extra.clone()),
                AttributeValue::Collection(collection) => {
                    collection.propagate_additional(extra.clone())
                }
                AttributeValue::Scalar(_) | AttributeValue::Encrypted(_) => {}
            }
        }
        self.additional_attributes = extra;
    }

    /// Loads storage data, recursing into nested records.
    ///
    /// `extra` becomes `additional_attributes` and fills keys of `data` that
    /// are missing or null. Encrypted values are stored as given.
    pub fn load(&mut self, data: &Map, extra: &Map) -> SettingsResult<()> {
        self.set_additional_attributes(extra.clone())?;

        for (key, value) in &fill_missing(data, extra) {
            let Some(index) = self.schema.position(key) else {
                self.log_ignored(key);
                continue;
            };

            if self.schema.attributes()[index].kind().is_simple() {
                self.assign(index, value.clone(), WriteMode::Load)?;
            } else {
                self.load_child(index, value, extra)?;
            }
        }
        Ok(())
    }

    /// Shallow update of scalar and encrypted attributes.
    ///
    /// Model and collection keys are skipped, as are undeclared keys.
    pub fn merge(&mut self, data: &Map) -> SettingsResult<()> {
        for (key, value) in data {
            let Some(index) = self.schema.position(key) else {
                self.log_ignored(key);
                continue;
            };
            match self.schema.attributes()[index].kind() {
                AttributeKind::Model(_) | AttributeKind::Collection(_) => {
                    debug!(
                        "event=merge_skip module=model status=ok schema={} attribute={}",
                        self.schema.name(),
                        key
                    );
                }
                AttributeKind::Scalar(_) | AttributeKind::Encrypted => {
                    self.assign(index, value.clone(), WriteMode::Assign)?;
                }
            }
        }
        Ok(())
    }

    /// Replaces the child at `name` with a fresh nested model built from
    /// `attributes` (or an empty collection) and returns it.
    ///
    /// Returns `None` for undeclared names and scalar or encrypted kinds.
    pub fn create(
        &mut self,
        name: &str,
        attributes: &Map,
    ) -> SettingsResult<Option<&mut AttributeValue>> {
        let Some(index) = self.schema.position(name) else {
            return Ok(None);
        };
        self.guard(index, WriteMode::Assign)?;

        let extra = self.additional_attributes.clone();
        let child = match self.schema.attributes()[index].kind() {
            AttributeKind::Model(schema) => {
                let mut model = Model::with_attributes(schema, &fill_missing(attributes, &extra))?;
                model.propagate_additional(extra);
                AttributeValue::Model(model)
            }
            AttributeKind::Collection(schema) => {
                let mut collection = Collection::new(schema);
                collection.propagate_additional(extra);
                AttributeValue::Collection(collection)
            }
            AttributeKind::Scalar(_) | AttributeKind::Encrypted => return Ok(None),
        };

        self.values[index] = Some(child);
        Ok(self.values[index].as_mut())
    }

    /// Assigns `attributes` into the existing child at `name`, or creates it
    /// when absent.
    ///
    /// On a collection slot `attributes` describe one item: the item with the
    /// same id is updated, otherwise a new item is appended.
    pub fn update(
        &mut self,
        name: &str,
        attributes: &Map,
    ) -> SettingsResult<Option<&mut AttributeValue>> {
        let Some(index) = self.schema.position(name) else {
            return Ok(None);
        };
        self.guard(index, WriteMode::Assign)?;

        if self.values[index].is_none() {
            return self.create(name, attributes);
        }

        let extra = self.additional_attributes.clone();
        match self.values[index].as_mut() {
            Some(AttributeValue::Model(model)) => {
                model.update_attributes(&fill_missing(attributes, &extra))?;
            }
            Some(AttributeValue::Collection(collection)) => {
                let item = Value::Object(attributes.clone());
                collection.load(&Value::Array(vec![item]), &extra)?;
            }
            Some(AttributeValue::Scalar(_) | AttributeValue::Encrypted(_)) | None => {}
        }
        Ok(self.values[index].as_mut())
    }

    /// Clears the slot at `name` and returns what it held.
    pub fn delete(&mut self, name: &str) -> SettingsResult<Option<AttributeValue>> {
        let Some(index) = self.schema.position(name) else {
            return Ok(None);
        };
        self.guard(index, WriteMode::Assign)?;
        Ok(self.values[index].take())
    }

    /// Generic representation of every declared attribute.
    ///
    /// Absent values render as `null`; encrypted values as ciphertext.
    ///
    /// # Errors
    /// - Propagates encryption failures.
    pub fn to_hash(&self) -> SettingsResult<Map> {
        let mut hash = Map::new();
        for (index, decl) in self.schema.attributes().iter().enumerate() {
            let value = match self.read(index) {
                Some(value) => value.to_hash()?,
                None => Value::Null,
            };
            hash.insert(decl.name().to_string(), value);
        }
        Ok(hash)
    }

    /// JSON text of `to_hash`.
    pub fn to_json(&self) -> SettingsResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Runs the schema's rules and records failures in `errors`.
    ///
    /// # Errors
    /// - Propagates decryption failures of validated encrypted values.
    pub fn valid(&mut self) -> SettingsResult<bool> {
        let mut errors = Errors::new();
        for (attribute, rule) in self.schema.rules() {
            if let Some(code) = rule.check(self.get(attribute))? {
                errors.add(attribute.as_str(), code);
            }
        }

        let valid = errors.is_empty();
        self.errors = errors;
        Ok(valid)
    }

    /// Failures recorded by the last `valid` call.
    pub fn errors(&self) -> &Errors {
        &self.errors
    }

    /// Assignment that bypasses the read-only check, used for identity fields.
    pub(crate) fn initialize(&mut self, name: &str, value: Value) -> SettingsResult<()> {
        match self.schema.position(name) {
            Some(index) => self.assign(index, value, WriteMode::Construct),
            None => Ok(()),
        }
    }

    fn read(&self, index: usize) -> Option<&AttributeValue> {
        match (&self.values[index], self.schema.attributes()[index].kind()) {
            (Some(value), _) => Some(value),
            (None, AttributeKind::Encrypted) => Some(&EMPTY_ENCRYPTED),
            (None, _) => None,
        }
    }

    fn assign_all(&mut self, attributes: &Map, mode: WriteMode) -> SettingsResult<()> {
        for (key, value) in attributes {
            match self.schema.position(key) {
                Some(index) => self.assign(index, value.clone(), mode)?,
                None => self.log_ignored(key),
            }
        }
        Ok(())
    }

    fn assign(&mut self, index: usize, value: Value, mode: WriteMode) -> SettingsResult<()> {
        self.guard(index, mode)?;

        let decl = &self.schema.attributes()[index];
        let stored = match (decl.kind(), value) {
            (_, Value::Null) => None,
            (AttributeKind::Scalar(scalar), value) => {
                Some(AttributeValue::Scalar(scalar.coerce(value)))
            }
            (AttributeKind::Encrypted, value) => raw_text(&value)
                .map(|text| AttributeValue::Encrypted(EncryptedValue::new(text))),
            (AttributeKind::Model(schema), Value::Object(attributes)) => {
                let mut model = Model::with_attributes(schema, &attributes)?;
                model.propagate_additional(self.additional_attributes.clone());
                Some(AttributeValue::Model(model))
            }
            (AttributeKind::Collection(schema), list @ Value::Array(_)) => {
                let mut collection = Collection::new(schema);
                collection.load(&list, &self.additional_attributes)?;
                Some(AttributeValue::Collection(collection))
            }
            (kind, _) => {
                return Err(SettingsError::KindMismatch {
                    attribute: decl.name().to_string(),
                    expected: kind.as_str(),
                })
            }
        };

        self.values[index] = stored;
        Ok(())
    }

    fn load_child(&mut self, index: usize, value: &Value, extra: &Map) -> SettingsResult<()> {
        if self.values[index].is_none() {
            if value.is_null() {
                return Ok(());
            }
            self.guard(index, WriteMode::Load)?;
            self.values[index] = match self.schema.attributes()[index].kind() {
                AttributeKind::Model(schema) => Some(AttributeValue::Model(Model::new(schema))),
                AttributeKind::Collection(schema) => {
                    Some(AttributeValue::Collection(Collection::new(schema)))
                }
                AttributeKind::Encrypted => Some(AttributeValue::Encrypted(EncryptedValue::empty())),
                AttributeKind::Scalar(_) => None,
            };
        }

        match self.values[index].as_mut() {
            Some(AttributeValue::Model(model)) => {
                let empty = Map::new();
                model.load(value.as_object().unwrap_or(&empty), extra)
            }
            Some(AttributeValue::Collection(collection)) => collection.load(value, extra),
            Some(AttributeValue::Encrypted(encrypted)) => {
                encrypted.load(raw_text(value).as_deref());
                Ok(())
            }
            Some(AttributeValue::Scalar(_)) | None => Ok(()),
        }
    }

    fn guard(&self, index: usize, mode: WriteMode) -> SettingsResult<()> {
        self.ensure_not_frozen(index)?;
        let decl = &self.schema.attributes()[index];
        if mode == WriteMode::Assign && !decl.is_mutable() {
            return Err(SettingsError::MutationOnImmutable {
                attribute: decl.name().to_string(),
            });
        }
        Ok(())
    }

    fn ensure_not_frozen(&self, index: usize) -> SettingsResult<()> {
        self.ensure_unfrozen(self.schema.attributes()[index].name())
    }

    fn ensure_unfrozen(&self, attribute: &str) -> SettingsResult<()> {
        if self.frozen {
            return Err(SettingsError::MutationOnImmutable {
                attribute: attribute.to_string(),
            });
        }
        Ok(())
    }

    fn log_ignored(&self, key: &str) {
        debug!(
            "event=attribute_ignored module=model status=ok schema={} attribute={}",
            self.schema.name(),
            key
        );
    }
}

impl PartialEq for Model {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.schema, &other.schema)
            && self.values == other.values
            && self.additional_attributes == other.additional_attributes
    }
}

impl Serialize for Model {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_hash()
            .map_err(S::Error::custom)?
            .serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::Model;
    use crate::config::{init_test_encryption, TEST_KEY};
    use crate::encryption::{EncryptedColumn, EncryptedValue};
    use crate::model::attribute::{AttributeDecl, AttributeValue};
    use crate::model::schema::Schema;
    use crate::model::validation::{ErrorCode, Rule};
    use crate::model::{Map, SettingsError};
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn map(value: Value) -> Map {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    fn person_schema() -> Arc<Schema> {
        Schema::builder("Person")
            .attribute(AttributeDecl::any("name"))
            .attribute(AttributeDecl::boolean("loves_travis"))
            .attribute(AttributeDecl::integer("height"))
            .attribute(AttributeDecl::boolean("awesome").with_default(true))
            .attribute(AttributeDecl::encrypted("secret"))
            .build()
            .unwrap()
    }

    fn owner_schema() -> Arc<Schema> {
        let item = Schema::builder("Item")
            .attribute(AttributeDecl::string("name"))
            .attribute(AttributeDecl::integer("repository_id"))
            .build()
            .unwrap();
        Schema::builder("Owner")
            .attribute(AttributeDecl::model("item", &item))
            .attribute(AttributeDecl::string("plain"))
            .build()
            .unwrap()
    }

    #[test]
    fn returns_defaults_and_allows_overriding_them() {
        let schema = person_schema();
        assert_eq!(Model::new(&schema).get_bool("awesome"), Some(true));

        let model = Model::with_attributes(&schema, &map(json!({"awesome": false}))).unwrap();
        assert_eq!(model.get_bool("awesome"), Some(false));
    }

    #[test]
    fn does_not_coerce_null() {
        let model = Model::with_attributes(&person_schema(), &map(json!({"name": null}))).unwrap();
        assert!(model.get("name").is_none());
    }

    #[test]
    fn coerces_values_on_assignment() {
        let model = Model::with_attributes(
            &person_schema(),
            &map(json!({"height": "178", "loves_travis": "true"})),
        )
        .unwrap();
        assert_eq!(model.get_i64("height"), Some(178));
        assert_eq!(model.get_bool("loves_travis"), Some(true));
    }

    #[test]
    fn update_attributes_and_set_overwrite_values() {
        let mut model = Model::new(&person_schema());
        model
            .update_attributes(&map(json!({"name": "Piotr", "loves_travis": true, "height": 178})))
            .unwrap();
        assert_eq!(model.get_str("name"), Some("Piotr"));
        assert_eq!(model.get_bool("loves_travis"), Some(true));
        assert_eq!(model.get_i64("height"), Some(178));

        model.set("name", json!("Peter")).unwrap();
        assert_eq!(model.get_str("name"), Some("Peter"));
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let schema = Schema::builder("Only")
            .attribute(AttributeDecl::integer("a"))
            .build()
            .unwrap();
        let mut model = Model::new(&schema);
        model.load(&map(json!({"a": 1, "unknown": 2})), &Map::new()).unwrap();
        model.set("unknown", json!(3)).unwrap();

        assert!(model.get("unknown").is_none());
        assert_eq!(model.to_hash().unwrap(), map(json!({"a": 1})));
        assert!(!model.has_attribute("unknown"));
        assert_eq!(model.is_collection("unknown"), None);
    }

    #[test]
    fn never_set_encrypted_attribute_reads_as_empty_value() {
        init_test_encryption();
        let mut model = Model::new(&person_schema());

        let peek = model.get_encrypted("secret").expect("lazy encrypted value");
        assert!(peek.is_empty());

        let stored = model.get_mut("secret").unwrap().expect("materialized value");
        assert_eq!(stored, &AttributeValue::Encrypted(EncryptedValue::empty()));
        assert_eq!(model.to_hash().unwrap()["secret"], Value::Null);
    }

    #[test]
    fn encrypts_assigned_plaintext_on_output() {
        init_test_encryption();
        let model = Model::with_attributes(&person_schema(), &map(json!({"secret": "foo"}))).unwrap();
        let column = EncryptedColumn::new().with_use_prefix(false);

        assert_eq!(
            model.get_encrypted("secret").unwrap().decrypt().unwrap().as_deref(),
            Some("foo")
        );

        let hash = model.to_hash().unwrap();
        let stored = hash["secret"].as_str().expect("ciphertext");
        assert_ne!(stored, "foo");
        assert_eq!(column.load(Some(stored)).unwrap().as_deref(), Some("foo"));

        let json: Value = serde_json::from_str(&model.to_json().unwrap()).unwrap();
        assert_eq!(
            column.load(json["secret"].as_str()).unwrap().as_deref(),
            Some("foo")
        );
    }

    #[test]
    fn loads_ciphertext_from_json() {
        let column = EncryptedColumn::new()
            .with_key(TEST_KEY)
            .with_use_prefix(false);
        let encrypted = column.dump(Some("zażółć gęślą jaźń")).unwrap().unwrap();
        let json = json!({ "secret": encrypted }).to_string();

        let model = Model::from_json(&person_schema(), &json, &Map::new()).unwrap();
        let secret = model.get_encrypted("secret").unwrap();
        assert_eq!(secret.raw(), Some(encrypted.as_str()));
        assert_eq!(
            secret.decrypt_with(&column).unwrap().as_deref(),
            Some("zażółć gęślą jaźń")
        );
    }

    #[test]
    fn from_json_accepts_null_and_rejects_non_objects() {
        let model = Model::from_json(&person_schema(), "null", &Map::new()).unwrap();
        assert_eq!(model.get_bool("awesome"), Some(true));

        let err = Model::from_json(&person_schema(), "[1, 2]", &Map::new()).unwrap_err();
        assert!(matches!(err, SettingsError::Json(_)));
    }

    #[test]
    fn create_update_and_delete_nested_model() {
        let mut owner = Model::new(&owner_schema());
        assert!(owner.get("item").is_none());

        owner.update("item", &map(json!({"name": "foo"}))).unwrap();
        assert_eq!(owner.get_model("item").unwrap().get_str("name"), Some("foo"));

        owner.update("item", &map(json!({"name": "bar"}))).unwrap();
        assert_eq!(owner.get_model("item").unwrap().get_str("name"), Some("bar"));

        let snapshot = owner.get("item").cloned();
        let removed = owner.delete("item").unwrap();
        assert!(owner.get("item").is_none());
        assert_eq!(removed, snapshot);
    }

    #[test]
    fn update_on_a_collection_updates_by_id_or_appends() {
        let item = Schema::builder("Item")
            .attribute(AttributeDecl::string("id"))
            .attribute(AttributeDecl::string("name"))
            .attribute(AttributeDecl::integer("repository_id"))
            .build()
            .unwrap();
        let schema = Schema::builder("Owner")
            .attribute(AttributeDecl::collection("items", &item))
            .build()
            .unwrap();
        let mut owner = Model::new(&schema);
        owner
            .set_additional_attributes(map(json!({"repository_id": 44})))
            .unwrap();

        owner
            .update("items", &map(json!({"id": "a", "name": "first"})))
            .unwrap();
        owner
            .update("items", &map(json!({"id": "a", "name": "renamed"})))
            .unwrap();
        owner.update("items", &map(json!({"name": "second"}))).unwrap();

        let items = owner.get_collection("items").unwrap();
        assert_eq!(items.len(), 2);
        let first = items.find("a").unwrap();
        assert_eq!(first.get_str("name"), Some("renamed"));
        assert_eq!(first.get_i64("repository_id"), Some(44));
        assert_eq!(items.to_a()[1].get_str("name"), Some("second"));
    }

    #[test]
    fn create_returns_the_stored_child_with_additional_attributes() {
        let mut owner = Model::new(&owner_schema());
        owner
            .set_additional_attributes(map(json!({"repository_id": 44})))
            .unwrap();

        let created = owner
            .create("item", &map(json!({"name": "foo", "repository_id": null})))
            .unwrap()
            .and_then(|value| value.as_model().cloned())
            .expect("created model");

        let stored = owner.get_model("item").unwrap();
        assert_eq!(&created, stored);
        assert_eq!(stored.get_str("name"), Some("foo"));
        assert_eq!(stored.get_i64("repository_id"), Some(44));
        assert_eq!(stored.additional_attributes(), owner.additional_attributes());
    }

    #[test]
    fn create_ignores_scalar_and_undeclared_attributes() {
        let mut owner = Model::new(&owner_schema());
        assert!(owner.create("plain", &Map::new()).unwrap().is_none());
        assert!(owner.create("missing", &Map::new()).unwrap().is_none());
    }

    #[test]
    fn simple_attributes_exclude_structured_kinds() {
        init_test_encryption();
        let item = Schema::builder("Item")
            .attribute(AttributeDecl::string("name"))
            .build()
            .unwrap();
        let schema = Schema::builder("Mixed")
            .attribute(AttributeDecl::collection("items", &item))
            .attribute(AttributeDecl::model("item", &item))
            .attribute(AttributeDecl::encrypted("secret"))
            .attribute(AttributeDecl::string("plain"))
            .build()
            .unwrap();

        let mut model = Model::new(&schema);
        model
            .load(
                &map(json!({
                    "items": [{"name": "foo"}],
                    "item": {"name": "bar"},
                    "secret": "baz",
                    "plain": "yup"
                })),
                &Map::new(),
            )
            .unwrap();

        let first = model.get_collection("items").unwrap().first().unwrap();
        assert_eq!(first.get_str("name"), Some("foo"));
        assert_eq!(model.get_model("item").unwrap().get_str("name"), Some("bar"));
        assert_eq!(
            model.get_encrypted("secret").unwrap().decrypt().unwrap().as_deref(),
            Some("baz")
        );
        assert_eq!(model.simple_attributes(), map(json!({"plain": "yup"})));
    }

    #[test]
    fn load_fills_gaps_from_extra_and_propagates_it() {
        let mut owner = Model::new(&owner_schema());
        owner
            .load(
                &map(json!({"item": {"name": "foo"}, "plain": "kept"})),
                &map(json!({"repository_id": 7, "plain": "ignored"})),
            )
            .unwrap();

        let item = owner.get_model("item").unwrap();
        assert_eq!(item.get_i64("repository_id"), Some(7));
        assert_eq!(item.additional_attributes(), &map(json!({"repository_id": 7, "plain": "ignored"})));
        assert_eq!(owner.get_str("plain"), Some("kept"));
    }

    #[test]
    fn merge_skips_models_and_collections() {
        let mut owner = Model::new(&owner_schema());
        owner
            .merge(&map(json!({"plain": "baz", "item": {"name": "x"}, "unknown": 1})))
            .unwrap();

        assert_eq!(owner.get_str("plain"), Some("baz"));
        assert!(owner.get("item").is_none());
    }

    #[test]
    fn set_rejects_wrong_shape_for_nested_model() {
        let mut owner = Model::new(&owner_schema());
        let err = owner.set("item", json!("not an object")).unwrap_err();
        assert!(matches!(
            err,
            SettingsError::KindMismatch { expected: "model", .. }
        ));

        let err = owner
            .set_value("plain", AttributeValue::Encrypted(EncryptedValue::new("x")))
            .unwrap_err();
        assert!(matches!(
            err,
            SettingsError::KindMismatch { expected: "scalar", .. }
        ));
    }

    #[test]
    fn frozen_model_rejects_every_write_but_allows_reads() {
        init_test_encryption();
        let mut model = Model::with_attributes(&person_schema(), &map(json!({"name": "foo"}))).unwrap();
        model.freeze();

        for result in [
            model.set("name", json!("bar")),
            model.set("undeclared", json!("bar")),
            model.merge(&map(json!({"height": 1}))),
            model.load(&Map::new(), &Map::new()),
            model.delete("name").map(|_| ()),
            model.get_mut("secret").map(|_| ()),
        ] {
            assert!(matches!(
                result,
                Err(SettingsError::MutationOnImmutable { .. })
            ));
        }

        assert_eq!(model.get_str("name"), Some("foo"));
        assert!(model.get_encrypted("secret").unwrap().is_empty());
    }

    #[test]
    fn read_only_attributes_accept_load_but_not_assignment() {
        let schema = Schema::builder("Locked")
            .attribute(AttributeDecl::string("id").read_only())
            .build()
            .unwrap();

        let mut model = Model::new(&schema);
        model.load(&map(json!({"id": "abc"})), &Map::new()).unwrap();
        assert_eq!(model.get_str("id"), Some("abc"));

        let err = model.set("id", json!("xyz")).unwrap_err();
        assert!(matches!(err, SettingsError::MutationOnImmutable { .. }));
        assert_eq!(model.get_str("id"), Some("abc"));
    }

    #[test]
    fn validation_reports_symbolic_codes() {
        init_test_encryption();
        let schema = Schema::builder("Validated")
            .attribute(AttributeDecl::any("name"))
            .attribute(AttributeDecl::encrypted("secret"))
            .validates("name", Rule::Presence)
            .validates("secret", Rule::Presence)
            .build()
            .unwrap();

        let mut model = Model::new(&schema);
        assert!(!model.valid().unwrap());
        assert_eq!(model.errors().get("name"), &[ErrorCode::Blank]);
        assert_eq!(model.errors().get("secret"), &[ErrorCode::Blank]);

        model.set("name", json!("foo")).unwrap();
        model.set("secret", json!("bar")).unwrap();
        assert!(model.valid().unwrap());
        assert!(model.errors().is_empty());
    }
}
