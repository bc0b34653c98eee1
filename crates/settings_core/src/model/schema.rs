//! Closed record schemas.
//!
//! # Responsibility
//! - Describe the fixed attribute table of one record type.
//! - Attach declarative validation rules to declared attributes.
//!
//! # Invariants
//! - Attribute names are unique and snake_case identifiers.
//! - Rules only reference declared attributes.
//! - A built schema is immutable and shared through `Arc`.

use super::attribute::{AttributeDecl, AttributeKind};
use super::validation::Rule;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

static ATTRIBUTE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z_][a-z0-9_]*$").expect("attribute name pattern is valid"));

/// Attribute table and validation rules of one record type.
#[derive(Debug)]
pub struct Schema {
    name: String,
    attributes: Vec<AttributeDecl>,
    positions: BTreeMap<String, usize>,
    rules: Vec<(String, Rule)>,
}

impl Schema {
    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            name: name.into(),
            attributes: Vec::new(),
            rules: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declarations in declaration order.
    pub fn attributes(&self) -> &[AttributeDecl] {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeDecl> {
        self.position(name).map(|index| &self.attributes[index])
    }

    pub fn kind(&self, name: &str) -> Option<&AttributeKind> {
        self.attribute(name).map(AttributeDecl::kind)
    }

    pub(crate) fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    /// Validation rules as `(attribute, rule)` pairs, in declaration order.
    pub fn rules(&self) -> &[(String, Rule)] {
        &self.rules
    }
}

/// Builder for `Schema`.
pub struct SchemaBuilder {
    name: String,
    attributes: Vec<AttributeDecl>,
    rules: Vec<(String, Rule)>,
}

impl SchemaBuilder {
    pub fn attribute(mut self, decl: AttributeDecl) -> Self {
        self.attributes.push(decl);
        self
    }

    /// Adds a validation rule for a declared attribute.
    pub fn validates(mut self, attribute: impl Into<String>, rule: Rule) -> Self {
        self.rules.push((attribute.into(), rule));
        self
    }

    /// Freezes the declaration table.
    ///
    /// # Errors
    /// - Returns an error for malformed or duplicate attribute names.
    /// - Returns an error when a rule names an undeclared attribute.
    pub fn build(self) -> Result<Arc<Schema>, SchemaError> {
        let mut positions = BTreeMap::new();
        for (index, decl) in self.attributes.iter().enumerate() {
            if !ATTRIBUTE_NAME.is_match(decl.name()) {
                return Err(SchemaError::InvalidName(decl.name().to_string()));
            }
            if positions.insert(decl.name().to_string(), index).is_some() {
                return Err(SchemaError::DuplicateAttribute(decl.name().to_string()));
            }
        }

        if let Some((attribute, _)) = self
            .rules
            .iter()
            .find(|(attribute, _)| !positions.contains_key(attribute))
        {
            return Err(SchemaError::UnknownAttribute(attribute.clone()));
        }

        Ok(Arc::new(Schema {
            name: self.name,
            attributes: self.attributes,
            positions,
            rules: self.rules,
        }))
    }
}

/// Schema declaration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    InvalidName(String),
    DuplicateAttribute(String),
    UnknownAttribute(String),
}

impl Display for SchemaError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidName(name) => write!(f, "attribute name is invalid: {name}"),
            Self::DuplicateAttribute(name) => write!(f, "attribute declared twice: {name}"),
            Self::UnknownAttribute(name) => {
                write!(f, "validation rule references undeclared attribute: {name}")
            }
        }
    }
}

impl Error for SchemaError {}
