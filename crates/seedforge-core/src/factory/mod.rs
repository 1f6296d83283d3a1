//! # Factories
//!
//! A [`Factory`] describes one storage entity: its name in storage, its
//! primary key, its relations, and the traits records are created from.
//! Factories are handed to a [`Registry`] once and never change afterwards.

pub mod registry;
pub mod relation;
pub mod traits;

pub use registry::Registry;
pub use relation::{belongs_to, has_many, has_many_through, Relation, RelationKind, Relations};
pub use traits::{Trait, Traits, Visibility};

use crate::error::DefinitionError;

/// Definition of one entity type, consumed by [`Registry::add`].
#[derive(Debug, Clone, Default)]
pub struct Factory {
    pub(crate) entity: Option<String>,
    pub(crate) primary_key: Option<String>,
    pub(crate) relations: Relations,
    pub(crate) traits: Traits,
}

impl Factory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage entity (table, collection, ...). Defaults to the factory name.
    pub fn entity(mut self, entity: &str) -> Self {
        self.entity = Some(entity.to_string());
        self
    }

    pub fn primary_key(mut self, field: &str) -> Self {
        self.primary_key = Some(field.to_string());
        self
    }

    pub fn relations(mut self, relations: Relations) -> Self {
        self.relations = relations;
        self
    }

    pub fn traits(mut self, traits: Traits) -> Self {
        self.traits = traits;
        self
    }
}

/// The registered, immutable part of a factory shared by its public traits.
#[derive(Debug)]
pub struct FactoryMeta {
    pub name: String,
    pub entity: String,
    pub primary_key: Option<String>,
    pub relations: Relations,
}

impl FactoryMeta {
    pub(crate) fn require_primary_key(&self, reason: String) -> Result<&str, DefinitionError> {
        self.primary_key
            .as_deref()
            .ok_or_else(|| DefinitionError::MissingPrimaryKey {
                factory: self.name.clone(),
                reason,
            })
    }
}
