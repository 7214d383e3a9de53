//! Entity descriptors.

use crate::entity::{Entity, Identifier};
use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Storage family of a managed type.
///
/// The kind selects the persister, the default identifier field and the
/// default table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    /// Class-defined structured record (`object_<type>` tables).
    Structured,
    /// Document tree element.
    DocumentLike,
    /// Binary asset element.
    AssetLike,
}

impl ElementKind {
    /// Returns the identifier field used when none is configured.
    #[must_use]
    pub const fn default_identifier(self) -> &'static str {
        match self {
            ElementKind::Structured => "o_id",
            ElementKind::DocumentLike | ElementKind::AssetLike => "id",
        }
    }

    /// Returns the table used when none is configured.
    #[must_use]
    pub fn default_storage_location(self, type_name: &str) -> String {
        match self {
            ElementKind::Structured => format!("object_{type_name}"),
            ElementKind::DocumentLike => "documents".to_string(),
            ElementKind::AssetLike => "assets".to_string(),
        }
    }
}

/// Which other types a type depends on for commit ordering.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relations {
    /// The type depends on nothing.
    None,
    /// Not known; treated as depending on every type in the commit.
    #[default]
    Unresolved,
    /// Depends exactly on the named types.
    Declared(BTreeSet<String>),
}

impl Relations {
    /// Builds a declared relation set.
    pub fn declared<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Relations::Declared(types.into_iter().map(Into::into).collect())
    }
}

/// Static description of a managed entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    type_name: String,
    kind: ElementKind,
    identifier_fields: Vec<String>,
    storage_location: String,
    #[serde(default)]
    relations: Relations,
    #[serde(default)]
    fields: Option<BTreeSet<String>>,
}

impl EntityDescriptor {
    /// Creates a descriptor with the kind's default identifier and table.
    pub fn new(type_name: impl Into<String>, kind: ElementKind) -> Self {
        let type_name = type_name.into();
        Self {
            identifier_fields: vec![kind.default_identifier().to_string()],
            storage_location: kind.default_storage_location(&type_name),
            type_name,
            kind,
            relations: Relations::default(),
            fields: None,
        }
    }

    /// Creates a structured-record descriptor.
    pub fn structured(type_name: impl Into<String>) -> Self {
        Self::new(type_name, ElementKind::Structured)
    }

    /// Creates a document descriptor.
    pub fn document(type_name: impl Into<String>) -> Self {
        Self::new(type_name, ElementKind::DocumentLike)
    }

    /// Creates an asset descriptor.
    pub fn asset(type_name: impl Into<String>) -> Self {
        Self::new(type_name, ElementKind::AssetLike)
    }

    /// Sets the identifier fields.
    #[must_use]
    pub fn with_identifier_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.identifier_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the table.
    #[must_use]
    pub fn with_storage_location(mut self, table: impl Into<String>) -> Self {
        self.storage_location = table.into();
        self
    }

    /// Sets the relations.
    #[must_use]
    pub fn with_relations(mut self, relations: Relations) -> Self {
        self.relations = relations;
        self
    }

    /// Sets the known field names.
    #[must_use]
    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Checks the descriptor's invariants.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidDescriptor`] if the type name or the
    /// identifier field list is empty.
    pub fn validate(&self) -> CoreResult<()> {
        if self.type_name.is_empty() {
            return Err(CoreError::invalid_descriptor("", "type name is empty"));
        }
        if self.identifier_fields.is_empty() {
            return Err(CoreError::invalid_descriptor(
                &self.type_name,
                "at least one identifier field is required",
            ));
        }
        if self.identifier_fields.iter().any(String::is_empty) {
            return Err(CoreError::invalid_descriptor(
                &self.type_name,
                "identifier field names must not be empty",
            ));
        }
        Ok(())
    }

    /// Returns the type name.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Returns the element kind.
    #[must_use]
    pub const fn kind(&self) -> ElementKind {
        self.kind
    }

    /// Returns the identifier field names.
    #[must_use]
    pub fn identifier_fields(&self) -> &[String] {
        &self.identifier_fields
    }

    /// Returns the primary identifier field.
    #[must_use]
    pub fn primary_identifier(&self) -> &str {
        self.identifier_fields
            .first()
            .map_or(self.kind.default_identifier(), String::as_str)
    }

    /// Returns the single field rows are keyed by in the backend.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidDescriptor`] when more than one
    /// identifier field is declared; backend rows carry one key.
    pub fn storage_key(&self) -> CoreResult<&str> {
        if self.identifier_fields.len() > 1 {
            return Err(CoreError::invalid_descriptor(
                &self.type_name,
                "composite identifiers cannot address backend rows",
            ));
        }
        Ok(self.primary_identifier())
    }

    /// Returns the table.
    #[must_use]
    pub fn storage_location(&self) -> &str {
        &self.storage_location
    }

    /// Returns the relations.
    #[must_use]
    pub fn relations(&self) -> &Relations {
        &self.relations
    }

    /// Returns the known field names, if declared.
    #[must_use]
    pub fn fields(&self) -> Option<&BTreeSet<String>> {
        self.fields.as_ref()
    }

    /// Extracts the entity's identifier values in field order.
    ///
    /// Returns an empty identifier when every identifier field is null,
    /// i.e. the entity has not been assigned an identity yet.
    #[must_use]
    pub fn identifier_values(&self, entity: &Entity) -> Identifier {
        let pairs: Vec<_> = self
            .identifier_fields
            .iter()
            .map(|field| (field.clone(), entity.get(field)))
            .collect();

        if pairs.iter().all(|(_, v)| v.is_null()) {
            Identifier::default()
        } else {
            Identifier::new(pairs)
        }
    }

    /// Checks that `field` may be used in criteria or ordering.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnrecognizedField`] when the descriptor declares
    /// its fields and `field` is neither one of them nor an identifier.
    pub fn ensure_field(&self, field: &str) -> CoreResult<()> {
        match &self.fields {
            Some(known) if !known.contains(field) && !self.identifier_fields.iter().any(|f| f == field) => {
                Err(CoreError::unrecognized_field(&self.type_name, field))
            }
            _ => Ok(()),
        }
    }
}
