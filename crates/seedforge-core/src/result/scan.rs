//! # Scanning
//!
//! Copies record fields into plain structs. A destination type lists its
//! fields once as [`FieldDescriptor`]s (see [`scannable!`](crate::scannable));
//! a [`FieldMapper`] turns each descriptor into the record field it reads,
//! and the resulting [`ScanSchema`] is reused for every row of a batch.

use std::sync::{Arc, OnceLock};

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use regex::Regex;
use uuid::Uuid;

use crate::error::{defect, DefinitionError, ScanError};
use crate::generate::field::Row;
use crate::generate::value::Value;

/// Name and tag string of one destination field.
///
/// Tags follow the `key:"value" other:"value"` convention, e.g.
/// `db:"author_id"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub tags: &'static str,
}

/// A destination shape for [`Batch::scan_all`](crate::Batch::scan_all) and friends.
pub trait Scannable: Default {
    fn descriptors() -> &'static [FieldDescriptor];

    /// Store `value` into the field named `field`.
    fn assign(&mut self, field: &str, value: &Value) -> Result<(), ScanError>;
}

/// Conversion from a record value into a destination field type.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self, ScanError>;
}

fn mismatch(expected: &'static str, value: &Value) -> ScanError {
    ScanError::Type {
        field: String::new(),
        expected,
        found: format!("{} ({})", value.kind(), value),
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self, ScanError> {
        Ok(value.clone())
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self, ScanError> {
        match value {
            Value::Int(i) => Ok(*i),
            Value::Bool(b) => Ok(*b as i64),
            Value::String(s) => s.parse().map_err(|_| mismatch("integer", value)),
            _ => Err(mismatch("integer", value)),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> Result<Self, ScanError> {
        let wide = i64::from_value(value)?;
        i32::try_from(wide).map_err(|_| mismatch("32-bit integer", value))
    }
}

impl FromValue for u64 {
    fn from_value(value: &Value) -> Result<Self, ScanError> {
        let wide = i64::from_value(value)?;
        u64::try_from(wide).map_err(|_| mismatch("unsigned integer", value))
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self, ScanError> {
        match value {
            Value::Float(f) => Ok(*f),
            Value::Int(i) => Ok(*i as f64),
            Value::String(s) => s.parse().map_err(|_| mismatch("float", value)),
            _ => Err(mismatch("float", value)),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self, ScanError> {
        match value {
            Value::Bool(b) => Ok(*b),
            Value::Int(0) => Ok(false),
            Value::Int(1) => Ok(true),
            _ => Err(mismatch("bool", value)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self, ScanError> {
        match value {
            Value::Null => Err(mismatch("string", value)),
            Value::Bytes(b) => {
                String::from_utf8(b.clone()).map_err(|_| mismatch("utf-8 string", value))
            }
            other => Ok(other.to_string()),
        }
    }
}

impl FromValue for NaiveDateTime {
    fn from_value(value: &Value) -> Result<Self, ScanError> {
        match value {
            Value::Timestamp(ts) => Ok(*ts),
            Value::String(s) => NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
                .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
                .map_err(|_| mismatch("timestamp", value)),
            _ => Err(mismatch("timestamp", value)),
        }
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: &Value) -> Result<Self, ScanError> {
        NaiveDateTime::from_value(value).map(|ts| ts.and_utc())
    }
}

impl FromValue for NaiveDate {
    fn from_value(value: &Value) -> Result<Self, ScanError> {
        match value {
            Value::Date(d) => Ok(*d),
            Value::Timestamp(ts) => Ok(ts.date()),
            Value::String(s) => {
                NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| mismatch("date", value))
            }
            _ => Err(mismatch("date", value)),
        }
    }
}

impl FromValue for NaiveTime {
    fn from_value(value: &Value) -> Result<Self, ScanError> {
        match value {
            Value::Time(t) => Ok(*t),
            Value::String(s) => NaiveTime::parse_from_str(s, "%H:%M:%S%.f")
                .map_err(|_| mismatch("time", value)),
            _ => Err(mismatch("time", value)),
        }
    }
}

impl FromValue for Uuid {
    fn from_value(value: &Value) -> Result<Self, ScanError> {
        match value {
            Value::Uuid(u) => Ok(*u),
            Value::String(s) => Uuid::parse_str(s).map_err(|_| mismatch("uuid", value)),
            _ => Err(mismatch("uuid", value)),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> Result<Self, ScanError> {
        match value {
            Value::Bytes(b) => Ok(b.clone()),
            Value::String(s) => Ok(s.as_bytes().to_vec()),
            _ => Err(mismatch("bytes", value)),
        }
    }
}

impl FromValue for serde_json::Value {
    fn from_value(value: &Value) -> Result<Self, ScanError> {
        match value {
            Value::Json(j) => Ok(j.clone()),
            Value::String(s) => serde_json::from_str(s).map_err(|_| mismatch("json", value)),
            _ => Err(mismatch("json", value)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self, ScanError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

type MapFn = dyn Fn(&FieldDescriptor) -> Result<String, ScanError> + Send + Sync;

/// Maps a destination field to the record field it is read from.
#[derive(Clone)]
pub struct FieldMapper(Arc<MapFn>);

impl std::fmt::Debug for FieldMapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FieldMapper")
    }
}

impl Default for FieldMapper {
    fn default() -> Self {
        FieldMapper::identity()
    }
}

impl FieldMapper {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&FieldDescriptor) -> Result<String, ScanError> + Send + Sync + 'static,
    {
        FieldMapper(Arc::new(f))
    }

    /// Use the field name unchanged.
    pub fn identity() -> Self {
        FieldMapper::custom(|d| Ok(d.name.to_string()))
    }

    /// Convert the field name with [`to_snake`].
    pub fn snake_case() -> Self {
        FieldMapper::custom(|d| Ok(to_snake(d.name)))
    }

    /// Read the name from tag `key` (the part before the first comma), or
    /// defer to `fallback` when the tag is absent or empty.
    pub fn tag(key: &str, fallback: Option<FieldMapper>) -> Self {
        let key = key.to_string();
        FieldMapper::custom(move |d| {
            if let Some(value) = tag_value(d.tags, &key) {
                let name = value.split(',').next().unwrap_or_default();
                if !name.is_empty() {
                    return Ok(name.to_string());
                }
            }
            match &fallback {
                Some(fallback) => fallback.map(d),
                None => Err(ScanError::Mapping {
                    field: d.name.to_string(),
                    message: format!("no '{}' tag", key),
                }),
            }
        })
    }

    /// Apply `pattern` to the whole tag string and use its first capture
    /// group, or defer to `fallback` when it does not match.
    ///
    /// An invalid pattern is a definition fault.
    pub fn regex_tag(pattern: &str, fallback: Option<FieldMapper>) -> Self {
        let re = match Regex::new(pattern) {
            Ok(re) => re,
            Err(e) => defect(DefinitionError::InvalidDefinition {
                message: format!("invalid field mapper pattern '{}': {}", pattern, e),
            }),
        };
        let pattern = pattern.to_string();
        FieldMapper::custom(move |d| {
            if let Some(m) = re.captures(d.tags).and_then(|c| c.get(1)) {
                return Ok(m.as_str().to_string());
            }
            match &fallback {
                Some(fallback) => fallback.map(d),
                None => Err(ScanError::Mapping {
                    field: d.name.to_string(),
                    message: format!("tags do not match '{}'", pattern),
                }),
            }
        })
    }

    pub fn map(&self, descriptor: &FieldDescriptor) -> Result<String, ScanError> {
        (self.0)(descriptor)
    }
}

fn tag_value<'a>(tags: &'a str, key: &str) -> Option<&'a str> {
    static TAG: OnceLock<Regex> = OnceLock::new();
    let re = TAG.get_or_init(|| Regex::new(r#"(\w+):"([^"]*)""#).expect("valid regex"));
    re.captures_iter(tags)
        .find(|c| &c[1] == key)
        .and_then(|c| c.get(2))
        .map(|m| m.as_str())
}

/// Snake-case a field name. Acronyms are lower-cased and preceded by an
/// underscore; consecutive acronyms are treated as one (`ACDCTime` becomes
/// `acdc_time`).
pub fn to_snake(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if i > 0
            && c.is_uppercase()
            && (chars.get(i + 1).is_some_and(|n| n.is_lowercase()) || chars[i - 1].is_lowercase())
        {
            out.push('_');
        }
        out.extend(c.to_lowercase());
    }
    out
}

/// Destination field to record field pairs for one destination type.
#[derive(Debug, Clone)]
pub struct ScanSchema {
    pairs: Vec<(&'static str, String)>,
}

impl ScanSchema {
    pub fn of<T: Scannable>(mapper: &FieldMapper) -> Result<Self, ScanError> {
        let pairs = T::descriptors()
            .iter()
            .map(|d| Ok((d.name, mapper.map(d)?)))
            .collect::<Result<Vec<_>, ScanError>>()?;
        Ok(ScanSchema { pairs })
    }

    pub fn pairs(&self) -> &[(&'static str, String)] {
        &self.pairs
    }

    pub fn scan<T: Scannable>(&self, row: &Row) -> Result<T, ScanError> {
        let mut out = T::default();
        for (dest, source) in &self.pairs {
            let value = row.get(source).ok_or_else(|| ScanError::FieldMismatch {
                field: dest.to_string(),
                source_field: source.clone(),
                available: row.keys().map(String::as_str).collect::<Vec<_>>().join(", "),
            })?;
            out.assign(dest, value)?;
        }
        Ok(out)
    }
}

/// Implement [`Scannable`] for a struct whose fields all implement
/// [`FromValue`]. Each field may carry a tag string for tag-based mappers.
///
/// ```ignore
/// #[derive(Debug, Default)]
/// struct Article { id: i64, user_id: i64, title: String }
/// scannable!(Article { id, user_id = r#"db:"author_id""#, title });
/// ```
#[macro_export]
macro_rules! scannable {
    (@tags $tags:literal) => {
        $tags
    };
    (@tags) => {
        ""
    };
    ($ty:ident { $($field:ident $(= $tags:literal)?),* $(,)? }) => {
        impl $crate::result::scan::Scannable for $ty {
            fn descriptors() -> &'static [$crate::result::scan::FieldDescriptor] {
                const FIELDS: &[$crate::result::scan::FieldDescriptor] = &[
                    $(
                        $crate::result::scan::FieldDescriptor {
                            name: stringify!($field),
                            tags: $crate::scannable!(@tags $($tags)?),
                        },
                    )*
                ];
                FIELDS
            }

            fn assign(
                &mut self,
                field: &str,
                value: &$crate::Value,
            ) -> ::std::result::Result<(), $crate::ScanError> {
                match field {
                    $(
                        stringify!($field) => {
                            self.$field = $crate::result::scan::FromValue::from_value(value)
                                .map_err(|e: $crate::ScanError| e.in_field(field))?;
                            Ok(())
                        }
                    )*
                    _ => Err($crate::ScanError::UnknownDestination {
                        field: field.to_string(),
                    }),
                }
            }
        }
    };
}
