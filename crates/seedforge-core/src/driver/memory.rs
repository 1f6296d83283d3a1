use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use indexmap::IndexMap;

use crate::driver::{Driver, Payload};
use crate::error::DriverError;
use crate::generate::field::Row;
use crate::generate::value::Value;

/// In-memory storage backend.
///
/// An auto primary key gets the next integer for its entity (`max + 1`,
/// starting at 1); other auto fields are stored as `NULL`. Every payload is
/// recorded so tests can inspect insertion order.
#[derive(Debug, Default)]
pub struct MemoryDriver {
    state: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    tables: IndexMap<String, Vec<Row>>,
    calls: Vec<Payload>,
    failing: HashSet<String>,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every insert into `entity`.
    pub fn failing_on(self, entity: &str) -> Self {
        self.lock().failing.insert(entity.to_string());
        self
    }

    /// Stored rows of `entity`, in insertion order.
    pub fn rows(&self, entity: &str) -> Vec<Row> {
        self.lock().tables.get(entity).cloned().unwrap_or_default()
    }

    /// Every payload received so far, in call order.
    pub fn calls(&self) -> Vec<Payload> {
        self.lock().calls.clone()
    }

    /// Entity names of the received payloads, in call order.
    pub fn call_order(&self) -> Vec<String> {
        self.lock().calls.iter().map(|p| p.entity.clone()).collect()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Driver for MemoryDriver {
    fn create(&self, payload: &Payload) -> Result<Vec<Row>, DriverError> {
        let mut state = self.lock();
        state.calls.push(payload.clone());
        if state.failing.contains(&payload.entity) {
            return Err(DriverError::new(format!(
                "inserts into '{}' are rejected",
                payload.entity
            )));
        }

        let table = state.tables.entry(payload.entity.clone()).or_default();
        let mut next_key = payload
            .primary_key
            .as_deref()
            .map(|pk| {
                table
                    .iter()
                    .filter_map(|row| row.get(pk).and_then(Value::as_int))
                    .max()
                    .unwrap_or(0)
                    + 1
            })
            .unwrap_or(1);

        let mut returned = Vec::with_capacity(payload.rows.len());
        for row in &payload.rows {
            let mut stored = Row::new();
            for field in &payload.insert_fields {
                stored.insert(field.clone(), row.get(field).cloned().unwrap_or(Value::Null));
            }
            for field in payload.auto_fields() {
                let value = if payload.primary_key.as_deref() == Some(field.as_str()) {
                    let key = Value::Int(next_key);
                    next_key += 1;
                    key
                } else {
                    Value::Null
                };
                stored.insert(field.clone(), value);
            }
            returned.push(payload.project(&stored));
            table.push(stored);
        }
        Ok(returned)
    }
}
