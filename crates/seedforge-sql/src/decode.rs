//! Returned columns back into [`Value`]s, by column type name.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use seedforge_core::{Row, Value};
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row as _, TypeInfo};
use uuid::Uuid;

use crate::error::SqlDriverError;

fn decode_error(column: &str, type_name: &str, source: sqlx::Error) -> SqlDriverError {
    SqlDriverError::Decode {
        column: column.to_string(),
        type_name: type_name.to_string(),
        source,
    }
}

pub(crate) fn pg_row(row: &PgRow) -> Result<Row, SqlDriverError> {
    let mut out = Row::with_capacity(row.len());
    for (i, col) in row.columns().iter().enumerate() {
        let type_name = col.type_info().name();
        let value = pg_value(row, i, type_name).map_err(|e| decode_error(col.name(), type_name, e))?;
        out.insert(col.name().to_string(), value);
    }
    Ok(out)
}

fn pg_value(row: &PgRow, i: usize, type_name: &str) -> Result<Value, sqlx::Error> {
    let value = match type_name {
        "BOOL" => row.try_get::<Option<bool>, _>(i)?.map(Value::Bool),
        "INT2" => row.try_get::<Option<i16>, _>(i)?.map(|v| Value::Int(v.into())),
        "INT4" => row.try_get::<Option<i32>, _>(i)?.map(|v| Value::Int(v.into())),
        "INT8" => row.try_get::<Option<i64>, _>(i)?.map(Value::Int),
        "FLOAT4" => row.try_get::<Option<f32>, _>(i)?.map(|v| Value::Float(v.into())),
        "FLOAT8" => row.try_get::<Option<f64>, _>(i)?.map(Value::Float),
        "TIMESTAMP" => row.try_get::<Option<NaiveDateTime>, _>(i)?.map(Value::Timestamp),
        "TIMESTAMPTZ" => row
            .try_get::<Option<DateTime<Utc>>, _>(i)?
            .map(|v| Value::Timestamp(v.naive_utc())),
        "DATE" => row.try_get::<Option<NaiveDate>, _>(i)?.map(Value::Date),
        "TIME" => row.try_get::<Option<NaiveTime>, _>(i)?.map(Value::Time),
        "UUID" => row.try_get::<Option<Uuid>, _>(i)?.map(Value::Uuid),
        "JSON" | "JSONB" => row.try_get::<Option<serde_json::Value>, _>(i)?.map(Value::Json),
        "BYTEA" => row.try_get::<Option<Vec<u8>>, _>(i)?.map(Value::Bytes),
        _ => row.try_get::<Option<String>, _>(i)?.map(Value::from),
    };
    Ok(value.unwrap_or(Value::Null))
}

pub(crate) fn sqlite_row(row: &SqliteRow) -> Result<Row, SqlDriverError> {
    let mut out = Row::with_capacity(row.len());
    for (i, col) in row.columns().iter().enumerate() {
        let type_name = col.type_info().name();
        let value =
            sqlite_value(row, i, type_name).map_err(|e| decode_error(col.name(), type_name, e))?;
        out.insert(col.name().to_string(), value);
    }
    Ok(out)
}

fn sqlite_value(row: &SqliteRow, i: usize, type_name: &str) -> Result<Value, sqlx::Error> {
    let value = match type_name {
        "NULL" => None,
        "BOOLEAN" => row.try_get::<Option<bool>, _>(i)?.map(Value::Bool),
        "INTEGER" => row.try_get::<Option<i64>, _>(i)?.map(Value::Int),
        "REAL" => row.try_get::<Option<f64>, _>(i)?.map(Value::Float),
        "DATETIME" => row.try_get::<Option<NaiveDateTime>, _>(i)?.map(Value::Timestamp),
        "DATE" => row.try_get::<Option<NaiveDate>, _>(i)?.map(Value::Date),
        "TIME" => row.try_get::<Option<NaiveTime>, _>(i)?.map(Value::Time),
        "BLOB" => row.try_get::<Option<Vec<u8>>, _>(i)?.map(Value::Bytes),
        "TEXT" => row.try_get::<Option<String>, _>(i)?.map(Value::from),
        // NUMERIC affinity: whatever storage class the value ended up in.
        _ => {
            if let Ok(v) = row.try_get::<Option<i64>, _>(i) {
                v.map(Value::Int)
            } else if let Ok(v) = row.try_get::<Option<f64>, _>(i) {
                v.map(Value::Float)
            } else {
                row.try_get::<Option<String>, _>(i)?.map(Value::from)
            }
        }
    };
    Ok(value.unwrap_or(Value::Null))
}
