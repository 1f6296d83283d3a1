use thiserror::Error;

/// Failures of the SQL driver. Surfaced to the engine as
/// [`DriverError::Backend`](seedforge_core::DriverError::Backend).
#[derive(Error, Debug)]
pub enum SqlDriverError {
    #[error("{message} ({connection_hint}): {source}")]
    Connection {
        message: String,
        connection_hint: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Unsupported database scheme '{scheme}'. Expected postgres:// or sqlite:")]
    UnsupportedDatabase { scheme: String },

    #[error("Failed to start the driver runtime: {source}")]
    Runtime {
        #[source]
        source: std::io::Error,
    },

    #[error("{message} on '{entity}': {source}\n  SQL: {sql_preview}")]
    Statement {
        entity: String,
        message: String,
        sql_preview: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Cannot decode column '{column}' of type {type_name}: {source}")]
    Decode {
        column: String,
        type_name: String,
        #[source]
        source: sqlx::Error,
    },
}
