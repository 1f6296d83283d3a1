//! JSON rendering of a result tree.
//!
//! Every record becomes an object with its fields in declaration order.
//! Parent relations nest as a single object, child and many-to-many
//! relations as an array, each under the relation name.

use std::io::Write;

use base64::Engine;
use serde_json::{Map, Value as Json};

use crate::error::{Result, SeedError};
use crate::generate::value::Value;
use crate::result::{Batch, Record};

/// Render every record of `batch` with its related records.
pub fn batch_to_json(batch: &Batch) -> Json {
    Json::Array(batch.records().map(|r| record_to_json(batch, r)).collect())
}

fn record_to_json(batch: &Batch, record: Record<'_>) -> Json {
    let mut object: Map<String, Json> = record
        .row()
        .iter()
        .map(|(name, value)| (name.clone(), value_to_json(value)))
        .collect();

    for name in batch.relation_names() {
        if object.contains_key(&name) {
            tracing::warn!(
                relation = %name,
                "relation shadows a field of the same name, not rendered"
            );
            continue;
        }
        let rendered = if let Some(parent) = batch.parent(&name) {
            parent
                .record(record.index())
                .map(|p| record_to_json(parent, p))
                .unwrap_or(Json::Null)
        } else {
            batch
                .children(&name)
                .and_then(|groups| groups.get(record.index()))
                .map(batch_to_json)
                .unwrap_or_else(|| Json::Array(Vec::new()))
        };
        object.insert(name, rendered);
    }
    Json::Object(object)
}

/// Write [`batch_to_json`] to `writer`, pretty-printed, followed by a newline.
pub fn write_json<W: Write>(writer: &mut W, batch: &Batch) -> Result<()> {
    serde_json::to_writer_pretty(&mut *writer, &batch_to_json(batch)).map_err(|e| {
        SeedError::Output {
            message: "writing JSON".to_string(),
            source: e.into(),
        }
    })?;
    writer.write_all(b"\n").map_err(|e| SeedError::Output {
        message: "writing JSON".to_string(),
        source: e,
    })
}

/// Convert a Value to its JSON representation.
///
/// Timestamps use ISO 8601 format with milliseconds and trailing 'Z'.
/// Bytes use Base64 encoding (standard alphabet with padding).
pub fn value_to_json(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Int(i) => serde_json::json!(*i),
        Value::Float(f) => serde_json::json!(*f),
        Value::String(s) => Json::String(s.to_string()),
        Value::Timestamp(ts) => Json::String(format!("{}Z", ts.format("%Y-%m-%dT%H:%M:%S%.3f"))),
        Value::Date(d) => Json::String(d.format("%Y-%m-%d").to_string()),
        Value::Time(t) => Json::String(t.format("%H:%M:%S").to_string()),
        Value::Uuid(u) => Json::String(u.to_string()),
        Value::Json(j) => j.clone(),
        Value::Bytes(b) => Json::String(base64::engine::general_purpose::STANDARD.encode(b)),
    }
}
