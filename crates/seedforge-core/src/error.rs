//! # Error Types
//!
//! SeedForge separates two families of failure:
//!
//! - [`DefinitionError`]: a fault in the fixture definitions themselves
//!   (bad include, unknown relation, dependency cycle, ...). These are
//!   programming errors. The public `create*`/`build*`/`add` surface of
//!   [`Registry`](crate::Registry) escalates them to a panic; the `try_*`
//!   variants hand them back for tooling such as `seedforge check`.
//! - [`SeedError`]: operational failures (the driver rejected a batch, a
//!   relation lookup or scan did not match). These are returned as `Err`.
//!
//! Every variant carries the factory / trait / field names needed to find
//! the offending definition without digging through logs.

use thiserror::Error;

/// Faults in fixture definitions, detected at registration or generation time.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DefinitionError {
    #[error("Trait '{name}' does not exist ({context})")]
    UnknownTrait { name: String, context: String },

    #[error("Circular include: {chain}")]
    CircularInclude { chain: String },

    #[error("Trait '{name}' is defined more than once{}", context_suffix(.context))]
    DuplicateTrait { name: String, context: String },

    #[error("PrimaryKey for factory '{factory}' is not defined, but {reason}")]
    MissingPrimaryKey { factory: String, reason: String },

    #[error("Relation '{relation}' is not defined for factory '{factory}' (trait '{trait_name}')")]
    RelationNotDefined {
        factory: String,
        trait_name: String,
        relation: String,
    },

    #[error("Relation '{relation}' of factory '{factory}' targets factory '{expected}', but trait '{trait_name}' belongs to '{found}'")]
    RelationTargetMismatch {
        factory: String,
        relation: String,
        expected: String,
        trait_name: String,
        found: String,
    },

    #[error("Parent relation '{relation}' of trait '{trait_name}' requests {count} records; a parent relation materializes exactly one record per row")]
    InvalidParentCount {
        trait_name: String,
        relation: String,
        count: usize,
    },

    #[error("Dependent field '{field}' of trait '{trait_name}' depends on '{dependency}', which is {kind} and has no value before insertion")]
    UnsupportedFieldValueType {
        trait_name: String,
        field: String,
        dependency: String,
        kind: String,
    },

    #[error("Dependent field '{field}' of trait '{trait_name}' depends on unknown field '{dependency}'")]
    UnknownDependency {
        trait_name: String,
        field: String,
        dependency: String,
    },

    #[error("Circular field dependency: {cycle}")]
    CircularFieldDependency { cycle: String },

    #[error("Invalid definition: {message}")]
    InvalidDefinition { message: String },
}

fn context_suffix(context: &str) -> String {
    if context.is_empty() {
        String::new()
    } else {
        format!(" ({})", context)
    }
}

/// Error reported by a storage [`Driver`](crate::driver::Driver).
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("{message}")]
    Message { message: String },

    #[error(transparent)]
    Backend(Box<dyn std::error::Error + Send + Sync>),
}

impl DriverError {
    pub fn new(message: impl Into<String>) -> Self {
        DriverError::Message {
            message: message.into(),
        }
    }

    /// Wrap a backend-specific error (database client, I/O, ...).
    pub fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        DriverError::Backend(Box::new(err))
    }
}

/// Failures while copying record fields into a destination shape.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScanError {
    #[error("Cannot scan field '{field}': record has no field '{source_field}' (available: {available})")]
    FieldMismatch {
        field: String,
        source_field: String,
        available: String,
    },

    #[error("Cannot scan field '{field}': expected {expected}, found {found}")]
    Type {
        field: String,
        expected: &'static str,
        found: String,
    },

    #[error("Field mapper failed on field '{field}': {message}")]
    Mapping { field: String, message: String },

    #[error("Destination has no field '{field}'")]
    UnknownDestination { field: String },

    #[error("Expected exactly one record to scan, found {count}")]
    Cardinality { count: usize },
}

impl ScanError {
    /// Attach the destination field name to a conversion error.
    pub fn in_field(self, name: &str) -> Self {
        match self {
            ScanError::Type {
                expected, found, ..
            } => ScanError::Type {
                field: name.to_string(),
                expected,
                found,
            },
            other => other,
        }
    }
}

/// All recoverable errors that can occur in SeedForge operations.
#[derive(Error, Debug)]
pub enum SeedError {
    #[error(transparent)]
    Definition(#[from] DefinitionError),

    #[error("Driver failed to persist {rows} row(s) of '{entity}' (factory '{factory}', trait '{trait_name}'): {source}")]
    Driver {
        factory: String,
        trait_name: String,
        entity: String,
        rows: usize,
        #[source]
        source: DriverError,
    },

    #[error("Driver returned {returned} row(s) for '{entity}', but {requested} were requested")]
    DriverRowCount {
        entity: String,
        requested: usize,
        returned: usize,
    },

    #[error("'{factory}' factory has no relation '{relation}'")]
    UnknownRelation { factory: String, relation: String },

    #[error("Relation '{relation}' of '{factory}' is a parent relation; declare it in the trait or pass it in an override instead")]
    RelationNotSupported { factory: String, relation: String },

    #[error("Can't chop a batch of {len} record(s) into {parts} equal group(s)")]
    ChopMismatch { len: usize, parts: usize },

    #[error("Record index {index} is out of range for a batch of {len}")]
    RowOutOfRange { index: usize, len: usize },

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Output error: {message}: {source}")]
    Output {
        message: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, SeedError>;

/// Escalate a definition fault to an unrecoverable failure.
pub(crate) fn defect(err: DefinitionError) -> ! {
    panic!("{}", err)
}

/// Escalate definition faults carried inside a [`SeedError`], pass the rest through.
pub(crate) fn escalate<T>(result: Result<T>) -> Result<T> {
    match result {
        Err(SeedError::Definition(err)) => defect(err),
        other => other,
    }
}
