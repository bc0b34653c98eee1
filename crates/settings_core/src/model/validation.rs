//! Declarative validation rules and symbolic error codes.
//!
//! Failed rules are recorded as data in `Errors`; callers render their own
//! messages from the codes.

use super::attribute::AttributeValue;
use super::SettingsResult;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Rule attached to one attribute of a schema.
///
/// Every rule except `Presence` skips absent values.
#[derive(Debug, Clone)]
pub enum Rule {
    /// Value must be present and non-blank. Encrypted values are checked by plaintext.
    Presence,
    /// Text must match the pattern.
    Format(Regex),
    /// Value must equal one of the listed values.
    Inclusion(Vec<Value>),
    /// Character count (or item count for collections) bounds.
    Length {
        min: Option<usize>,
        max: Option<usize>,
    },
}

/// Symbolic validation failure code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Blank,
    Invalid,
    Inclusion,
    TooShort,
    TooLong,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Blank => "blank",
            Self::Invalid => "invalid",
            Self::Inclusion => "inclusion",
            Self::TooShort => "too_short",
            Self::TooLong => "too_long",
        }
    }
}

/// Validation failures keyed by attribute name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Errors {
    entries: BTreeMap<String, Vec<ErrorCode>>,
}

impl Errors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, attribute: impl Into<String>, code: ErrorCode) {
        self.entries.entry(attribute.into()).or_default().push(code);
    }

    /// Codes recorded for `attribute`; empty when it passed.
    pub fn get(&self, attribute: &str) -> &[ErrorCode] {
        match self.entries.get(attribute) {
            Some(codes) => codes,
            None => &[],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of attributes with at least one failure.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[ErrorCode])> {
        self.entries
            .iter()
            .map(|(attribute, codes)| (attribute.as_str(), codes.as_slice()))
    }
}

impl Rule {
    /// Checks one attribute value.
    ///
    /// # Errors
    /// - Propagates decryption failures of encrypted values.
    pub(crate) fn check(&self, value: Option<&AttributeValue>) -> SettingsResult<Option<ErrorCode>> {
        let comparable = match value {
            Some(value) => comparable_value(value)?,
            None => Comparable::Absent,
        };

        let code = match (self, &comparable) {
            (Self::Presence, comparable) if comparable.is_blank() => Some(ErrorCode::Blank),
            (Self::Presence, _) | (_, Comparable::Absent) => None,
            (Self::Format(pattern), Comparable::Scalar(Value::String(text))) => {
                (!pattern.is_match(text)).then_some(ErrorCode::Invalid)
            }
            (Self::Format(_), Comparable::Scalar(_)) => Some(ErrorCode::Invalid),
            (Self::Format(_), Comparable::Items(_)) => Some(ErrorCode::Invalid),
            (Self::Inclusion(allowed), Comparable::Scalar(value)) => {
                (!allowed.contains(value)).then_some(ErrorCode::Inclusion)
            }
            (Self::Inclusion(_), Comparable::Items(_)) => Some(ErrorCode::Inclusion),
            (Self::Length { min, max }, comparable) => match comparable.length() {
                Some(len) if min.is_some_and(|min| len < min) => Some(ErrorCode::TooShort),
                Some(len) if max.is_some_and(|max| len > max) => Some(ErrorCode::TooLong),
                _ => None,
            },
        };

        Ok(code)
    }
}

enum Comparable {
    Absent,
    Scalar(Value),
    Items(usize),
}

impl Comparable {
    fn is_blank(&self) -> bool {
        match self {
            Self::Absent => true,
            Self::Scalar(value) => is_blank_value(value),
            Self::Items(count) => *count == 0,
        }
    }

    fn length(&self) -> Option<usize> {
        match self {
            Self::Scalar(Value::String(text)) => Some(text.chars().count()),
            Self::Items(count) => Some(*count),
            _ => None,
        }
    }
}

fn comparable_value(value: &AttributeValue) -> SettingsResult<Comparable> {
    let comparable = match value {
        AttributeValue::Scalar(Value::Null) => Comparable::Absent,
        AttributeValue::Scalar(value) => Comparable::Scalar(value.clone()),
        AttributeValue::Encrypted(encrypted) => match encrypted.decrypt()? {
            Some(plaintext) => Comparable::Scalar(Value::String(plaintext)),
            None => Comparable::Absent,
        },
        AttributeValue::Collection(collection) => Comparable::Items(collection.len()),
        // A nested record is present as a whole.
        AttributeValue::Model(_) => Comparable::Items(1),
    };
    Ok(comparable)
}

fn is_blank_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(flag) => !flag,
        Value::String(text) => text.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(entries) => entries.is_empty(),
        Value::Number(_) => false,
    }
}
