//! # SeedForge
//!
//! Composable, trait-based fixtures for any storage backend.
//!
//! A [`Registry`] holds [`Factory`] definitions. Each factory names an
//! entity, its primary key, its relations to other factories, and a set of
//! [`Trait`]s: named bundles of field specs that can include each other.
//! Creating records from a public trait generates the rows, materializes
//! parent records first, hands the rows to a [`Driver`], then creates child
//! and many-to-many records against the returned keys.

pub mod config;
pub mod driver;
pub mod error;
pub mod factory;
pub mod generate;
pub mod output;
pub mod result;

pub use driver::{Driver, MemoryDriver, NoopDriver, Payload};
pub use error::{DefinitionError, DriverError, Result, ScanError, SeedError};
pub use factory::{
    belongs_to, has_many, has_many_through, Factory, FactoryMeta, Registry, Relation,
    RelationKind, Relations, Trait, Traits, Visibility,
};
pub use generate::field::{depends_on, Field, Forks, Generator, Row};
pub use generate::providers;
pub use generate::value::{SqlDialect, Value};
pub use result::scan::{FieldMapper, FromValue, Scannable};
pub use result::{Batch, Record};
