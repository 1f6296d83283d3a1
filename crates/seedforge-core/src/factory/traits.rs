//! # Traits
//!
//! A trait is a named, composable set of field specs for one factory.
//! Traits pull in other traits of the same factory with `include`; the
//! flattened (resolved) form is computed once, when the factory is added
//! to a [`Registry`](crate::Registry).

use indexmap::IndexMap;

use crate::error::DefinitionError;
use crate::generate::field::{Field, Forks};

/// Field specs plus the names of the traits to include before them.
#[derive(Debug, Clone, Default)]
pub struct Trait {
    include: Vec<String>,
    fields: IndexMap<String, Field>,
}

impl Trait {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add includes from a whitespace-separated list of trait names.
    /// Later includes overwrite fields of earlier ones.
    pub fn include(mut self, names: &str) -> Self {
        for name in names.split_whitespace() {
            if !self.include.iter().any(|n| n == name) {
                self.include.push(name.to_string());
            }
        }
        self
    }

    pub fn field(mut self, name: &str, spec: impl Into<Field>) -> Self {
        self.set(name, spec);
        self
    }

    pub fn set(&mut self, name: &str, spec: impl Into<Field>) {
        self.fields.insert(name.to_string(), spec.into());
    }

    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Field> {
        self.fields.shift_remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn includes(&self) -> &[String] {
        &self.include
    }

    pub fn fields(&self) -> &IndexMap<String, Field> {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Same fields, each generator replaced by its fork.
    pub(crate) fn fork(&self, forks: &mut Forks) -> Trait {
        Trait {
            include: self.include.clone(),
            fields: self
                .fields
                .iter()
                .map(|(name, spec)| (name.clone(), forks.field(spec)))
                .collect(),
        }
    }

    /// Copy every field of `other` into `self`; `other` wins on conflicts.
    pub fn merge(&mut self, other: &Trait) {
        for (name, spec) in &other.fields {
            self.fields.insert(name.clone(), spec.clone());
        }
    }
}

/// Whether a trait can be invoked directly or only included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    /// Mixin: exists only to be included by other traits.
    Private,
}

#[derive(Debug, Clone)]
struct TraitEntry {
    visibility: Visibility,
    definition: Trait,
}

/// The traits of one factory.
#[derive(Debug, Clone, Default)]
pub struct Traits {
    entries: IndexMap<String, TraitEntry>,
    duplicates: Vec<String>,
}

impl Traits {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn public(self, name: &str, definition: Trait) -> Self {
        self.with(name, Visibility::Public, definition)
    }

    pub fn private(self, name: &str, definition: Trait) -> Self {
        self.with(name, Visibility::Private, definition)
    }

    pub fn with(mut self, name: &str, visibility: Visibility, definition: Trait) -> Self {
        if self.entries.contains_key(name) {
            self.duplicates.push(name.to_string());
        }
        self.entries.insert(
            name.to_string(),
            TraitEntry {
                visibility,
                definition,
            },
        );
        self
    }

    pub fn get(&self, name: &str) -> Option<&Trait> {
        self.entries.get(name).map(|e| &e.definition)
    }

    pub fn visibility(&self, name: &str) -> Option<Visibility> {
        self.entries.get(name).map(|e| e.visibility)
    }

    /// Names of the public traits, in declaration order.
    pub fn public_names(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, e)| e.visibility == Visibility::Public)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Every trait with its generators forked, for one registry.
    pub(crate) fn fork(&self, forks: &mut Forks) -> Traits {
        Traits {
            entries: self
                .entries
                .iter()
                .map(|(name, entry)| {
                    let entry = TraitEntry {
                        visibility: entry.visibility,
                        definition: entry.definition.fork(forks),
                    };
                    (name.clone(), entry)
                })
                .collect(),
            duplicates: self.duplicates.clone(),
        }
    }

    pub(crate) fn duplicates(&self) -> &[String] {
        &self.duplicates
    }

    /// Flatten `name` and everything it includes into one trait.
    pub fn resolve(&self, name: &str) -> Result<Trait, DefinitionError> {
        let mut path = Vec::new();
        let fields = self.resolve_fields(name, &mut path)?;
        Ok(Trait {
            include: Vec::new(),
            fields,
        })
    }

    fn resolve_fields(
        &self,
        name: &str,
        path: &mut Vec<String>,
    ) -> Result<IndexMap<String, Field>, DefinitionError> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| DefinitionError::UnknownTrait {
                name: name.to_string(),
                context: match path.last() {
                    Some(parent) => format!("included by '{}'", parent),
                    None => "not defined in this factory".to_string(),
                },
            })?;

        path.push(name.to_string());
        let mut acc: IndexMap<String, Field> = IndexMap::new();
        for include in &entry.definition.include {
            if path.iter().any(|p| p == include) {
                let mut chain = path.clone();
                chain.push(include.clone());
                return Err(DefinitionError::CircularInclude {
                    chain: chain.join(" -> "),
                });
            }
            let included = self.resolve_fields(include, path)?;
            for (field, spec) in included {
                acc.insert(field, spec);
            }
        }
        for (field, spec) in &entry.definition.fields {
            acc.insert(field.clone(), spec.clone());
        }
        path.pop();
        Ok(acc)
    }
}
