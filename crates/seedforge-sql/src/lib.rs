//! # SQL Driver
//!
//! Persists SeedForge payloads into PostgreSQL or SQLite through `sqlx`.
//!
//! Each payload becomes a single multi-row `INSERT ... RETURNING` statement
//! run inside its own transaction. Values are inlined as SQL literals
//! ([`Value::to_sql_literal`](seedforge_core::Value::to_sql_literal)), so
//! statements stay readable in logs and error messages. Returned columns
//! are decoded back into values by their column type.
//!
//! The driver owns a current-thread Tokio runtime and blocks on it, so the
//! synchronous [`Driver`] API can be used from plain code and tests. Do not
//! call it from inside another Tokio runtime.
//!
//! MySQL is not supported: it has no `RETURNING`, so generated keys can't
//! be read back for multi-row inserts.

mod decode;
mod error;
mod insert;

use std::str::FromStr;

use seedforge_core::{Driver, DriverError, Payload, Row, SqlDialect};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tokio::runtime::Runtime;

pub use error::SqlDriverError;

enum Backend {
    Postgres(PgPool),
    Sqlite(SqlitePool),
}

/// [`Driver`] over a PostgreSQL or SQLite connection pool.
pub struct SqlDriver {
    runtime: Runtime,
    backend: Backend,
    connection_hint: String,
}

impl std::fmt::Debug for SqlDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlDriver")
            .field("dialect", &self.dialect())
            .field("connection", &self.connection_hint)
            .finish()
    }
}

impl SqlDriver {
    /// Connect to `url` (`postgres://...`, `postgresql://...`, `sqlite:...`).
    ///
    /// SQLite databases are created if missing; `sqlite::memory:` keeps a
    /// single connection open for the lifetime of the driver.
    pub fn connect(url: &str) -> Result<Self, SqlDriverError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|source| SqlDriverError::Runtime { source })?;
        let connection_hint = sanitize_url(url);
        let connection_error = |source: sqlx::Error| SqlDriverError::Connection {
            message: "Failed to connect".to_string(),
            connection_hint: connection_hint.clone(),
            source,
        };

        let backend = match dialect_from_url(url)? {
            SqlDialect::PostgreSQL => {
                let pool = runtime
                    .block_on(PgPoolOptions::new().max_connections(5).connect(url))
                    .map_err(connection_error)?;
                Backend::Postgres(pool)
            }
            SqlDialect::SQLite => {
                let options = SqliteConnectOptions::from_str(url)
                    .map_err(connection_error)?
                    .create_if_missing(true);
                let pool = runtime
                    .block_on(
                        SqlitePoolOptions::new()
                            .max_connections(1)
                            .min_connections(1)
                            .idle_timeout(None)
                            .max_lifetime(None)
                            .connect_with(options),
                    )
                    .map_err(connection_error)?;
                Backend::Sqlite(pool)
            }
        };

        tracing::debug!(connection = %connection_hint, "connected");
        Ok(SqlDriver {
            runtime,
            backend,
            connection_hint,
        })
    }

    pub fn dialect(&self) -> SqlDialect {
        match self.backend {
            Backend::Postgres(_) => SqlDialect::PostgreSQL,
            Backend::Sqlite(_) => SqlDialect::SQLite,
        }
    }

    /// Run a statement that returns no rows (schema setup, cleanup).
    pub fn execute(&self, sql: &str) -> Result<(), SqlDriverError> {
        let fail = |source| statement_error("(session)", "Statement failed", sql, source);
        match &self.backend {
            Backend::Postgres(pool) => self
                .runtime
                .block_on(sqlx::raw_sql(sql).execute(pool))
                .map(|_| ())
                .map_err(fail),
            Backend::Sqlite(pool) => self
                .runtime
                .block_on(sqlx::raw_sql(sql).execute(pool))
                .map(|_| ())
                .map_err(fail),
        }
    }

    /// Run a query and decode every returned row.
    pub fn query(&self, sql: &str) -> Result<Vec<Row>, SqlDriverError> {
        let fail = |source| statement_error("(session)", "Query failed", sql, source);
        match &self.backend {
            Backend::Postgres(pool) => {
                let rows = self
                    .runtime
                    .block_on(sqlx::query(sql).fetch_all(pool))
                    .map_err(fail)?;
                rows.iter().map(decode::pg_row).collect()
            }
            Backend::Sqlite(pool) => {
                let rows = self
                    .runtime
                    .block_on(sqlx::query(sql).fetch_all(pool))
                    .map_err(fail)?;
                rows.iter().map(decode::sqlite_row).collect()
            }
        }
    }

    fn insert(&self, payload: &Payload) -> Result<Vec<Row>, SqlDriverError> {
        let statements = insert::build_insert(payload, self.dialect());
        let returning = insert::needs_returning(payload);
        tracing::debug!(
            entity = %payload.entity,
            rows = payload.rows.len(),
            statements = statements.len(),
            "inserting"
        );

        let mut rows = match &self.backend {
            Backend::Postgres(pool) => self.runtime.block_on(insert_pg(pool, payload, &statements))?,
            Backend::Sqlite(pool) => {
                self.runtime.block_on(insert_sqlite(pool, payload, &statements))?
            }
        };
        if !returning {
            return Ok(payload.rows.iter().map(|r| payload.project(r)).collect());
        }
        insert::order_by_generated_key(payload, &mut rows);
        Ok(rows)
    }
}

impl Driver for SqlDriver {
    fn create(&self, payload: &Payload) -> Result<Vec<Row>, DriverError> {
        if payload.rows.is_empty() {
            return Ok(Vec::new());
        }
        self.insert(payload).map_err(DriverError::backend)
    }
}

fn statement_error(entity: &str, message: &str, sql: &str, source: sqlx::Error) -> SqlDriverError {
    SqlDriverError::Statement {
        entity: entity.to_string(),
        message: message.to_string(),
        sql_preview: insert::truncate_sql(sql, 200),
        source,
    }
}

async fn insert_pg(
    pool: &PgPool,
    payload: &Payload,
    statements: &[String],
) -> Result<Vec<Row>, SqlDriverError> {
    let entity = payload.entity.as_str();
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| statement_error(entity, "Failed to begin transaction", "BEGIN", e))?;
    let mut out = Vec::with_capacity(payload.rows.len());
    for sql in statements {
        let rows = sqlx::query(sql)
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| statement_error(entity, "INSERT failed", sql, e))?;
        for row in &rows {
            out.push(decode::pg_row(row)?);
        }
    }
    tx.commit()
        .await
        .map_err(|e| statement_error(entity, "Failed to commit transaction", "COMMIT", e))?;
    Ok(out)
}

async fn insert_sqlite(
    pool: &SqlitePool,
    payload: &Payload,
    statements: &[String],
) -> Result<Vec<Row>, SqlDriverError> {
    let entity = payload.entity.as_str();
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| statement_error(entity, "Failed to begin transaction", "BEGIN", e))?;
    let mut out = Vec::with_capacity(payload.rows.len());
    for sql in statements {
        let rows = sqlx::query(sql)
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| statement_error(entity, "INSERT failed", sql, e))?;
        for row in &rows {
            out.push(decode::sqlite_row(row)?);
        }
    }
    tx.commit()
        .await
        .map_err(|e| statement_error(entity, "Failed to commit transaction", "COMMIT", e))?;
    Ok(out)
}

/// Determine the dialect from a connection URL.
pub fn dialect_from_url(url: &str) -> Result<SqlDialect, SqlDriverError> {
    let scheme = url.split(':').next().unwrap_or("");
    match scheme {
        "postgres" | "postgresql" => Ok(SqlDialect::PostgreSQL),
        "sqlite" => Ok(SqlDialect::SQLite),
        other => Err(SqlDriverError::UnsupportedDatabase {
            scheme: other.to_string(),
        }),
    }
}

/// Sanitize a database URL for error messages (hide password).
pub fn sanitize_url(db_url: &str) -> String {
    if let Ok(mut parsed) = url::Url::parse(db_url) {
        if parsed.password().is_some() {
            let _ = parsed.set_password(Some("****"));
        }
        return parsed.to_string();
    }
    db_url.to_string()
}
