//! # Drivers
//!
//! A driver persists one batch of rows for one entity and hands back the
//! requested fields of every stored row. The engine never knows what
//! storage sits behind it.
//!
//! - [`NoopDriver`]: stores nothing, used by `build*`.
//! - [`MemoryDriver`]: in-process store with sequential integer keys.
//! - `seedforge-sql`: PostgreSQL and SQLite through `sqlx`.

pub mod memory;

pub use memory::MemoryDriver;

use crate::error::DriverError;
use crate::generate::field::Row;
use crate::generate::value::Value;

/// One insertion request.
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    pub entity: String,
    /// `None` means no key round-trip is requested.
    pub primary_key: Option<String>,
    pub insert_fields: Vec<String>,
    /// Insert fields followed by auto fields.
    pub return_fields: Vec<String>,
    pub rows: Vec<Row>,
}

impl Payload {
    /// Fields the driver has to assign itself.
    pub fn auto_fields(&self) -> &[String] {
        &self.return_fields[self.insert_fields.len().min(self.return_fields.len())..]
    }

    /// Restrict `row` to the return fields, filling absent ones with `NULL`.
    pub fn project(&self, row: &Row) -> Row {
        self.return_fields
            .iter()
            .map(|f| (f.clone(), row.get(f).cloned().unwrap_or(Value::Null)))
            .collect()
    }
}

pub trait Driver: Send + Sync {
    /// Persist `payload.rows` and return exactly one row per input row,
    /// restricted to `payload.return_fields`. A driver may return no rows
    /// when `payload.primary_key` is `None`.
    fn create(&self, payload: &Payload) -> Result<Vec<Row>, DriverError>;
}

/// Passes rows straight back without storing them.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDriver;

impl Driver for NoopDriver {
    fn create(&self, payload: &Payload) -> Result<Vec<Row>, DriverError> {
        Ok(payload.rows.iter().map(|row| payload.project(row)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> Payload {
        let mut row = Row::new();
        row.insert("name".to_string(), Value::from("Jon"));
        row.insert("extra".to_string(), Value::Int(1));
        Payload {
            entity: "users".to_string(),
            primary_key: Some("id".to_string()),
            insert_fields: vec!["name".to_string()],
            return_fields: vec!["name".to_string(), "id".to_string()],
            rows: vec![row],
        }
    }

    #[test]
    fn test_noop_projects_return_fields() {
        let rows = NoopDriver.create(&payload()).unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.keys().collect::<Vec<_>>(), ["name", "id"]);
        assert_eq!(row["name"], Value::from("Jon"));
        assert_eq!(row["id"], Value::Null, "auto fields come back as NULL");
    }

    #[test]
    fn test_auto_fields_are_the_tail_of_return_fields() {
        assert_eq!(payload().auto_fields(), ["id".to_string()]);
    }
}
