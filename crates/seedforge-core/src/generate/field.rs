//! # Field Specs
//!
//! A trait maps field names to [`Field`] specs. A spec is either a literal
//! [`Value`], a stateful [`Generator`], a relation marker, the Auto marker,
//! or a dependent field computed from sibling fields once they are known.
//!
//! Generators may return further generators; [`Field::produce`] keeps
//! invoking until it reaches a terminal category.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use indexmap::IndexMap;
use regex::Captures;
use uuid::Uuid;

use crate::factory::traits::Trait;
use crate::generate::providers::placeholder_regex;
use crate::generate::value::Value;

/// One generated (or persisted) record: field name to value, in field order.
pub type Row = IndexMap<String, Value>;

/// Produces one [`Field`] per invocation. Implementations may keep state
/// (counters, positions) that persists for the lifetime of the registry.
pub trait Generator: Send {
    fn next(&mut self) -> Field;

    /// An independent copy of this generator, in its current state.
    /// Nested field specs go through `forks` so that copies shared inside
    /// one registry stay shared.
    fn fork(&self, forks: &mut Forks) -> Box<dyn Generator>;
}

impl<F> Generator for F
where
    F: FnMut() -> Field + Clone + Send + 'static,
{
    fn next(&mut self) -> Field {
        self()
    }

    fn fork(&self, _forks: &mut Forks) -> Box<dyn Generator> {
        Box::new(self.clone())
    }
}

/// A generator shared between every copy of the trait that holds it.
///
/// Resolved traits clone their field specs; the counters behind them must
/// not be cloned along, so the generator lives behind an `Arc<Mutex<_>>`.
/// A registry forks every generator it is given (see [`Forks`]), so the
/// sharing never crosses registries.
#[derive(Clone)]
pub struct SharedGenerator(Arc<Mutex<Box<dyn Generator>>>);

impl SharedGenerator {
    pub fn new<G: Generator + 'static>(generator: G) -> Self {
        SharedGenerator(Arc::new(Mutex::new(Box::new(generator))))
    }

    pub fn next(&self) -> Field {
        let mut guard = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        guard.next()
    }

    fn same(&self, other: &SharedGenerator) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for SharedGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Generator")
    }
}

/// Generators already forked for one registry, keyed by the original.
///
/// Forking the same original twice returns the same copy, so a generator
/// reused by several traits of a registry keeps a single state there.
#[derive(Default)]
pub struct Forks {
    done: Vec<(SharedGenerator, SharedGenerator)>,
}

impl Forks {
    pub fn generator(&mut self, original: &SharedGenerator) -> SharedGenerator {
        if let Some((_, copy)) = self.done.iter().find(|(o, _)| o.same(original)) {
            return copy.clone();
        }
        let forked = {
            let guard = original.0.lock().unwrap_or_else(PoisonError::into_inner);
            guard.fork(self)
        };
        let copy = SharedGenerator(Arc::new(Mutex::new(forked)));
        self.done.push((original.clone(), copy.clone()));
        copy
    }

    /// `field` with every generator inside it (relation overrides
    /// included) replaced by its fork.
    pub fn field(&mut self, field: &Field) -> Field {
        match field {
            Field::Generator(g) => Field::Generator(self.generator(g)),
            Field::Relation(r) => Field::Relation(RelationRequest {
                trait_name: r.trait_name.clone(),
                count: r.count,
                overrides: r.overrides.as_ref().map(|o| o.fork(self)),
            }),
            other => other.clone(),
        }
    }
}

impl fmt::Debug for Forks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Forks")
            .field("generators", &self.done.len())
            .finish()
    }
}

/// Request to materialize related record(s) for the field it is attached to.
#[derive(Debug, Clone)]
pub struct RelationRequest {
    /// Public trait to create the related records from.
    pub trait_name: String,
    /// Records per owning row.
    pub count: usize,
    pub overrides: Option<Trait>,
}

/// A field whose value is computed from sibling fields of the same row.
#[derive(Clone)]
pub struct DependentField {
    fields: Vec<String>,
    compute: Arc<dyn Fn(&Row) -> Value + Send + Sync>,
}

impl DependentField {
    /// Sibling fields that must be known before this one is computed.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn compute(&self, row: &Row) -> Value {
        (self.compute)(row)
    }
}

impl fmt::Debug for DependentField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependentField")
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}

/// Builder returned by [`depends_on`].
#[derive(Debug, Clone)]
pub struct DependsOn {
    fields: Vec<String>,
}

/// Declare the sibling fields a computed field reads.
///
/// ```ignore
/// depends_on(["first_name", "last_name"]).template("{first_name} {last_name}")
/// ```
pub fn depends_on<I, S>(fields: I) -> DependsOn
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    DependsOn {
        fields: fields.into_iter().map(Into::into).collect(),
    }
}

impl DependsOn {
    /// Compute the value with `f`, given a read-only view of the row.
    pub fn generate<F, V>(self, f: F) -> Field
    where
        F: Fn(&Row) -> V + Send + Sync + 'static,
        V: Into<Value>,
    {
        Field::Dependent(DependentField {
            fields: self.fields,
            compute: Arc::new(move |row| f(row).into()),
        })
    }

    /// Render `template`, replacing `{field}` with the display form of each
    /// declared dependency. `NULL` dependencies render as empty text.
    /// Placeholders are substituted in one pass: rendered values are never
    /// scanned again, and undeclared placeholders are left as written.
    pub fn template(self, template: &str) -> Field {
        let template = template.to_string();
        let names = self.fields.clone();
        self.generate(move |row| {
            let rendered = placeholder_regex().replace_all(&template, |caps: &Captures<'_>| {
                let name = &caps[1];
                if !names.iter().any(|n| n == name) {
                    return caps[0].to_string();
                }
                match row.get(name) {
                    Some(Value::Null) | None => String::new(),
                    Some(v) => v.to_string(),
                }
            });
            Value::from(rendered.into_owned())
        })
    }
}

/// A field spec inside a [`Trait`].
#[derive(Clone)]
pub enum Field {
    Value(Value),
    Generator(SharedGenerator),
    Relation(RelationRequest),
    /// Assigned by the driver on insert and read back.
    Auto,
    Dependent(DependentField),
}

/// Terminal outcome of evaluating a [`Field`] once.
#[derive(Debug, Clone)]
pub(crate) enum Produced {
    Value(Value),
    Relation(RelationRequest),
    Auto,
    Dependent(DependentField),
}

impl Field {
    pub fn generator<G: Generator + 'static>(generator: G) -> Self {
        Field::Generator(SharedGenerator::new(generator))
    }

    pub(crate) fn produce(&self) -> Produced {
        let mut next = match self {
            Field::Value(v) => return Produced::Value(v.clone()),
            Field::Relation(r) => return Produced::Relation(r.clone()),
            Field::Auto => return Produced::Auto,
            Field::Dependent(d) => return Produced::Dependent(d.clone()),
            Field::Generator(g) => g.next(),
        };
        loop {
            next = match next {
                Field::Value(v) => return Produced::Value(v),
                Field::Relation(r) => return Produced::Relation(r),
                Field::Auto => return Produced::Auto,
                Field::Dependent(d) => return Produced::Dependent(d),
                Field::Generator(g) => g.next(),
            };
        }
    }

    pub fn is_auto(&self) -> bool {
        matches!(self, Field::Auto)
    }

    /// The literal value, if this spec is a plain literal.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Field::Value(v) => Some(v),
            _ => None,
        }
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Field::Value(_) => "a literal",
            Field::Generator(_) => "a generator",
            Field::Relation(_) => "a relation",
            Field::Auto => "an auto field",
            Field::Dependent(_) => "a dependent field",
        }
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Field::Generator(g) => fmt::Debug::fmt(g, f),
            Field::Relation(r) => f.debug_tuple("Relation").field(r).finish(),
            Field::Auto => f.write_str("Auto"),
            Field::Dependent(d) => fmt::Debug::fmt(d, f),
        }
    }
}

impl From<Value> for Field {
    fn from(v: Value) -> Self {
        Field::Value(v)
    }
}

impl From<RelationRequest> for Field {
    fn from(r: RelationRequest) -> Self {
        Field::Relation(r)
    }
}

impl From<DependentField> for Field {
    fn from(d: DependentField) -> Self {
        Field::Dependent(d)
    }
}

impl From<SharedGenerator> for Field {
    fn from(g: SharedGenerator) -> Self {
        Field::Generator(g)
    }
}

macro_rules! literal_field {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Field {
                fn from(v: $ty) -> Self {
                    Field::Value(Value::from(v))
                }
            }
        )*
    };
}

literal_field!(
    i64,
    i32,
    u32,
    f64,
    bool,
    &'static str,
    String,
    NaiveDateTime,
    DateTime<Utc>,
    NaiveDate,
    NaiveTime,
    Uuid,
    serde_json::Value,
    Vec<u8>,
);

impl<T: Into<Value>> From<Option<T>> for Field {
    fn from(v: Option<T>) -> Self {
        Field::Value(v.into())
    }
}
