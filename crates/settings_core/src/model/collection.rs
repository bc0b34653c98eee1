//! Ordered, id-keyed record groups.
//!
//! # Invariants
//! - Items share one schema and keep insertion order.
//! - Item ids are unique within a collection.
//! - Ids are assigned here, never by the item itself.

use super::attribute::{fill_missing, AttributeKind};
use super::record::Model;
use super::schema::Schema;
use super::{Map, SettingsError, SettingsResult};
use log::debug;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

/// Name of the identity attribute of collection items.
pub const ID_ATTRIBUTE: &str = "id";

/// Ordered records of one schema.
#[derive(Debug, Clone)]
pub struct Collection {
    schema: Arc<Schema>,
    items: Vec<Model>,
    additional_attributes: Map,
}

impl Collection {
    pub fn new(schema: &Arc<Schema>) -> Self {
        Self {
            schema: Arc::clone(schema),
            items: Vec::new(),
            additional_attributes: Map::new(),
        }
    }

    /// Schema of every item.
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Loads a list of stored items.
    ///
    /// Elements whose id matches an existing item are loaded into it; all
    /// others are appended as new items. Non-object elements and non-list
    /// input are ignored.
    pub fn load(&mut self, list: &Value, extra: &Map) -> SettingsResult<()> {
        self.propagate_additional(extra.clone());

        let Some(elements) = list.as_array() else {
            if !list.is_null() {
                debug!(
                    "event=collection_load module=model status=skipped schema={} reason=not_a_list",
                    self.schema.name()
                );
            }
            return Ok(());
        };

        for element in elements {
            let Some(data) = element.as_object() else {
                continue;
            };

            let existing = self.supplied_id(data).and_then(|id| self.position(&id));
            match existing {
                Some(index) => self.items[index].load(data, extra)?,
                None => {
                    let mut model = Model::new(&self.schema);
                    model.load(data, extra)?;
                    self.ensure_id(&mut model)?;
                    self.items.push(model);
                }
            }
        }
        Ok(())
    }

    /// Builds a new item from `attributes` merged with the additional
    /// attributes, assigns a fresh id when none was supplied, and appends it.
    ///
    /// # Errors
    /// - Returns `DuplicateId` when the supplied id is already taken.
    pub fn create(&mut self, attributes: &Map) -> SettingsResult<&mut Model> {
        let data = fill_missing(attributes, &self.additional_attributes);
        if let Some(id) = self.supplied_id(&data) {
            if self.position(&id).is_some() {
                return Err(SettingsError::DuplicateId(id));
            }
        }

        let mut model = Model::with_attributes(&self.schema, &data)?;
        model.propagate_additional(self.additional_attributes.clone());
        self.ensure_id(&mut model)?;
        self.items.push(model);

        let index = self.items.len() - 1;
        Ok(&mut self.items[index])
    }

    /// Item with the given id, `None` when absent.
    ///
    /// Non-string ids match by their JSON rendering, so `5` is found as `"5"`.
    pub fn find(&self, id: &str) -> Option<&Model> {
        self.position(id).map(|index| &self.items[index])
    }

    pub fn find_mut(&mut self, id: &str) -> Option<&mut Model> {
        self.position(id).map(move |index| &mut self.items[index])
    }

    /// Removes and returns the item with the given id; no-op when absent.
    pub fn destroy(&mut self, id: &str) -> Option<Model> {
        self.position(id).map(|index| self.items.remove(index))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn first(&self) -> Option<&Model> {
        self.items.first()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Model> {
        self.items.iter()
    }

    /// Items in insertion order.
    pub fn to_a(&self) -> &[Model] {
        &self.items
    }

    /// Generic representation of every item, in insertion order.
    pub fn to_hash(&self) -> SettingsResult<Vec<Value>> {
        self.items
            .iter()
            .map(|item| item.to_hash().map(Value::Object))
            .collect()
    }

    pub fn additional_attributes(&self) -> &Map {
        &self.additional_attributes
    }

    pub(crate) fn propagate_additional(&mut self, extra: Map) {
        for item in &mut self.items {
            item.propagate_additional(extra.clone());
        }
        self.additional_attributes = extra;
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.items.iter().position(|item| {
            item.get_scalar(ID_ATTRIBUTE).and_then(id_text).as_deref() == Some(id)
        })
    }

    /// Id carried by `data`, coerced the way the item will store it.
    fn supplied_id(&self, data: &Map) -> Option<String> {
        let value = data.get(ID_ATTRIBUTE)?.clone();
        let stored = match self.schema.kind(ID_ATTRIBUTE) {
            Some(AttributeKind::Scalar(scalar)) => scalar.coerce(value),
            _ => value,
        };
        id_text(&stored)
    }

    fn ensure_id(&self, model: &mut Model) -> SettingsResult<()> {
        if !model.has_attribute(ID_ATTRIBUTE) || model.get(ID_ATTRIBUTE).is_some() {
            return Ok(());
        }

        let id = loop {
            let candidate = Uuid::new_v4().to_string();
            if self.position(&candidate).is_none() {
                break candidate;
            }
        };
        model.initialize(ID_ATTRIBUTE, Value::String(id))
    }
}

impl PartialEq for Collection {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.schema, &other.schema)
            && self.items == other.items
            && self.additional_attributes == other.additional_attributes
    }
}

impl<'a> IntoIterator for &'a Collection {
    type Item = &'a Model;
    type IntoIter = std::slice::Iter<'a, Model>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

fn id_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(id) => Some(id.clone()),
        other => Some(other.to_string()),
    }
}
