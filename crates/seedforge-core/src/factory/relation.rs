//! # Relation Table
//!
//! Per-factory map of relation name to [`Relation`]:
//!
//! - `belongs_to(factory)`: parent. This factory stores the parent's key in
//!   a local join field, which defaults to the relation name.
//! - `has_many(factory, field)`: child. `factory` stores this record's key
//!   in `field`.
//! - `has_many_through(join_trait, local, remote)`: many-to-many. Rows of
//!   `join_trait` hold this record's key in `local` and the related
//!   record's key in `remote`. The related factory defaults to the relation
//!   name.

use indexmap::IndexMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    Parent,
    Child,
    ManyToMany,
}

impl std::fmt::Display for RelationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelationKind::Parent => write!(f, "belongs_to"),
            RelationKind::Child => write!(f, "has_many"),
            RelationKind::ManyToMany => write!(f, "has_many_through"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    kind: RelationKind,
    factory: String,
    field: String,
    join_trait: String,
    remote_field: String,
}

/// Parent relation to `factory`.
pub fn belongs_to(factory: &str) -> Relation {
    Relation {
        kind: RelationKind::Parent,
        factory: factory.to_string(),
        field: String::new(),
        join_trait: String::new(),
        remote_field: String::new(),
    }
}

/// Child relation: `factory` holds this record's key in `foreign_field`.
pub fn has_many(factory: &str, foreign_field: &str) -> Relation {
    Relation {
        kind: RelationKind::Child,
        factory: factory.to_string(),
        field: foreign_field.to_string(),
        join_trait: String::new(),
        remote_field: String::new(),
    }
}

/// Many-to-many relation through the public trait `join_trait`.
pub fn has_many_through(join_trait: &str, local_field: &str, remote_field: &str) -> Relation {
    Relation {
        kind: RelationKind::ManyToMany,
        factory: String::new(),
        field: local_field.to_string(),
        join_trait: join_trait.to_string(),
        remote_field: remote_field.to_string(),
    }
}

impl Relation {
    /// Set the local join field of a parent relation.
    pub fn via(mut self, field: &str) -> Self {
        self.field = field.to_string();
        self
    }

    /// Set the related factory of a many-to-many relation.
    pub fn of(mut self, factory: &str) -> Self {
        self.factory = factory.to_string();
        self
    }

    pub fn kind(&self) -> RelationKind {
        self.kind
    }

    /// The related factory.
    pub fn factory(&self) -> &str {
        &self.factory
    }

    /// Parent: local join field. Child: foreign field on the related
    /// factory. Many-to-many: join-trait field holding this record's key.
    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn join_trait(&self) -> &str {
        &self.join_trait
    }

    /// Join-trait field holding the related record's key.
    pub fn remote_field(&self) -> &str {
        &self.remote_field
    }
}

/// Relations of one factory, keyed by relation name.
#[derive(Debug, Clone, Default)]
pub struct Relations {
    entries: IndexMap<String, Relation>,
}

impl Relations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, relation: Relation) -> Self {
        self.entries.insert(name.to_string(), relation);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Relation> {
        self.entries.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Relation)> {
        self.entries.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fill in defaults: a parent's join field and a many-to-many's related
    /// factory both default to the relation name.
    pub(crate) fn normalize(mut self) -> Self {
        for (name, relation) in self.entries.iter_mut() {
            match relation.kind {
                RelationKind::Parent if relation.field.is_empty() => {
                    relation.field = name.clone();
                }
                RelationKind::ManyToMany if relation.factory.is_empty() => {
                    relation.factory = name.clone();
                }
                _ => {}
            }
        }
        self
    }
}
