//! Attribute declarations, kinds and coercion.
//!
//! # Invariants
//! - An attribute's kind is fixed when it is declared.
//! - `null` is never coerced.
//! - Values that cannot be coerced are stored unchanged.

use super::collection::Collection;
use super::record::Model;
use super::schema::Schema;
use super::{Map, SettingsResult};
use crate::encryption::EncryptedValue;
use serde_json::{Number, Value};
use std::sync::Arc;

/// Declared type of a scalar attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    /// No coercion.
    Any,
    String,
    Integer,
    Float,
    Boolean,
}

impl ScalarType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
        }
    }

    /// Coerces `value` into this type, keeping it unchanged when impossible.
    pub fn coerce(self, value: Value) -> Value {
        match (self, value) {
            (_, Value::Null) => Value::Null,
            (Self::Any, value) => value,
            (Self::String, Value::Number(number)) => Value::String(number.to_string()),
            (Self::String, Value::Bool(flag)) => Value::String(flag.to_string()),
            (Self::Integer, Value::String(text)) => match parse_integer(&text) {
                Some(number) => Value::from(number),
                None => Value::String(text),
            },
            (Self::Integer, Value::Number(number)) if !number.is_i64() && !number.is_u64() => {
                match number.as_f64().and_then(integral) {
                    Some(whole) => Value::from(whole),
                    None => Value::Number(number),
                }
            }
            (Self::Float, Value::String(text)) => match text
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
            {
                Some(number) => Value::Number(number),
                None => Value::String(text),
            },
            (Self::Float, Value::Number(number)) => {
                match number.as_f64().and_then(Number::from_f64) {
                    Some(float) => Value::Number(float),
                    None => Value::Number(number),
                }
            }
            (Self::Boolean, Value::String(text)) => match parse_boolean(&text) {
                Some(flag) => Value::Bool(flag),
                None => Value::String(text),
            },
            (Self::Boolean, Value::Number(number)) => match number.as_i64() {
                Some(1) => Value::Bool(true),
                Some(0) => Value::Bool(false),
                _ => Value::Number(number),
            },
            (_, value) => value,
        }
    }
}

/// Category of an attribute slot.
#[derive(Debug, Clone)]
pub enum AttributeKind {
    Scalar(ScalarType),
    /// Nested record of the given schema.
    Model(Arc<Schema>),
    /// Ordered, id-keyed records of the given schema.
    Collection(Arc<Schema>),
    Encrypted,
}

impl AttributeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scalar(_) => "scalar",
            Self::Model(_) => "model",
            Self::Collection(_) => "collection",
            Self::Encrypted => "encrypted",
        }
    }

    pub fn is_simple(&self) -> bool {
        matches!(self, Self::Scalar(_))
    }
}

impl PartialEq for AttributeKind {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Scalar(left), Self::Scalar(right)) => left == right,
            (Self::Model(left), Self::Model(right)) => Arc::ptr_eq(left, right),
            (Self::Collection(left), Self::Collection(right)) => Arc::ptr_eq(left, right),
            (Self::Encrypted, Self::Encrypted) => true,
            _ => false,
        }
    }
}

/// One declared field of a schema.
#[derive(Debug, Clone)]
pub struct AttributeDecl {
    name: String,
    kind: AttributeKind,
    default: Option<Value>,
    mutable: bool,
}

impl AttributeDecl {
    pub fn new(name: impl Into<String>, kind: AttributeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            default: None,
            mutable: true,
        }
    }

    pub fn scalar(name: impl Into<String>, scalar: ScalarType) -> Self {
        Self::new(name, AttributeKind::Scalar(scalar))
    }

    pub fn any(name: impl Into<String>) -> Self {
        Self::scalar(name, ScalarType::Any)
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::scalar(name, ScalarType::String)
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::scalar(name, ScalarType::Integer)
    }

    pub fn float(name: impl Into<String>) -> Self {
        Self::scalar(name, ScalarType::Float)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::scalar(name, ScalarType::Boolean)
    }

    pub fn encrypted(name: impl Into<String>) -> Self {
        Self::new(name, AttributeKind::Encrypted)
    }

    pub fn model(name: impl Into<String>, schema: &Arc<Schema>) -> Self {
        Self::new(name, AttributeKind::Model(Arc::clone(schema)))
    }

    pub fn collection(name: impl Into<String>, schema: &Arc<Schema>) -> Self {
        Self::new(name, AttributeKind::Collection(Arc::clone(schema)))
    }

    /// Value used when a record is constructed without one.
    ///
    /// Applies to scalar and encrypted attributes; encrypted defaults are
    /// plaintext.
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Accepts values from construction and `load` only.
    pub fn read_only(mut self) -> Self {
        self.mutable = false;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &AttributeKind {
        &self.kind
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    pub fn is_mutable(&self) -> bool {
        self.mutable
    }

    /// Slot content of a freshly constructed record.
    pub(crate) fn initial_value(&self) -> Option<AttributeValue> {
        match &self.kind {
            AttributeKind::Scalar(scalar) => self
                .default
                .clone()
                .map(|value| scalar.coerce(value))
                .filter(|value| !value.is_null())
                .map(AttributeValue::Scalar),
            AttributeKind::Encrypted => self
                .default
                .as_ref()
                .and_then(raw_text)
                .map(|text| AttributeValue::Encrypted(EncryptedValue::new(text))),
            AttributeKind::Model(_) => None,
            AttributeKind::Collection(schema) => {
                Some(AttributeValue::Collection(Collection::new(schema)))
            }
        }
    }
}

/// Current content of one attribute slot.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Scalar(Value),
    Model(Model),
    Collection(Collection),
    Encrypted(EncryptedValue),
}

impl AttributeValue {
    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            Self::Scalar(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_scalar().and_then(Value::as_str)
    }

    pub fn as_model(&self) -> Option<&Model> {
        match self {
            Self::Model(model) => Some(model),
            _ => None,
        }
    }

    pub fn as_model_mut(&mut self) -> Option<&mut Model> {
        match self {
            Self::Model(model) => Some(model),
            _ => None,
        }
    }

    pub fn as_collection(&self) -> Option<&Collection> {
        match self {
            Self::Collection(collection) => Some(collection),
            _ => None,
        }
    }

    pub fn as_collection_mut(&mut self) -> Option<&mut Collection> {
        match self {
            Self::Collection(collection) => Some(collection),
            _ => None,
        }
    }

    pub fn as_encrypted(&self) -> Option<&EncryptedValue> {
        match self {
            Self::Encrypted(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_encrypted_mut(&mut self) -> Option<&mut EncryptedValue> {
        match self {
            Self::Encrypted(value) => Some(value),
            _ => None,
        }
    }

    /// Whether this value may live in a slot of `kind`.
    pub fn matches(&self, kind: &AttributeKind) -> bool {
        match (self, kind) {
            (Self::Scalar(_), AttributeKind::Scalar(_)) => true,
            (Self::Encrypted(_), AttributeKind::Encrypted) => true,
            (Self::Model(model), AttributeKind::Model(schema)) => {
                Arc::ptr_eq(model.schema(), schema)
            }
            (Self::Collection(collection), AttributeKind::Collection(schema)) => {
                Arc::ptr_eq(collection.schema(), schema)
            }
            _ => false,
        }
    }

    /// Generic representation, with encrypted values rendered as ciphertext.
    pub fn to_hash(&self) -> SettingsResult<Value> {
        match self {
            Self::Scalar(value) => Ok(value.clone()),
            Self::Model(model) => model.to_hash().map(Value::Object),
            Self::Collection(collection) => collection.to_hash().map(Value::Array),
            Self::Encrypted(value) => Ok(value.dump()?.map_or(Value::Null, Value::String)),
        }
    }
}

/// Copy of `data` with `extra` filling keys that are missing or null.
pub(crate) fn fill_missing(data: &Map, extra: &Map) -> Map {
    let mut merged = data.clone();
    for (key, value) in extra {
        if merged.get(key).map_or(true, Value::is_null) {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

/// Text stored by encrypted slots; non-string scalars are stringified.
pub(crate) fn raw_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

fn parse_integer(text: &str) -> Option<i64> {
    let trimmed = text.trim();
    trimmed
        .parse::<i64>()
        .ok()
        .or_else(|| trimmed.parse::<f64>().ok().and_then(integral))
}

fn integral(value: f64) -> Option<i64> {
    if value.fract() == 0.0 && value >= i64::MIN as f64 && value <= i64::MAX as f64 {
        Some(value as i64)
    } else {
        None
    }
}

fn parse_boolean(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "1" | "on" | "t" | "true" | "y" | "yes" => Some(true),
        "0" | "off" | "f" | "false" | "n" | "no" => Some(false),
        _ => None,
    }
}
