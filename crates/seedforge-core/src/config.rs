//! # Configuration File Parser
//!
//! Reads `seedforge.toml`, a declarative description of factories for the
//! `seedforge` CLI and for projects that prefer data over code:
//!
//! - `[settings]`: `seed` makes `pick` and `fake` fields reproducible
//! - `[factories.<name>]`: entity, primary key
//! - `[factories.<name>.relations.<relation>]`: `belongs_to`, `has_many`
//!   or `has_many_through`
//! - `[factories.<name>.traits.<trait>]`: `public`, `include`, `fields`
//!
//! Example `seedforge.toml`:
//!
//! ```toml
//! [settings]
//! seed = 42
//!
//! [factories.users]
//! primary_key = "id"
//!
//! [factories.users.relations.articles]
//! kind = "has_many"
//! factory = "articles"
//! field = "author_id"
//!
//! [factories.users.traits.basic]
//! fields = { id = { auto = true }, name = { sequence = "Agent Smith {}" }, active = true }
//!
//! [factories.users.traits.User]
//! public = true
//! include = "basic"
//!
//! [factories.users.traits.Writer]
//! public = true
//! include = "basic"
//! fields = { articles = { related = "Article", count = 2 } }
//! ```
//!
//! Field specs: a scalar literal, or a table with one of `auto`, `null`,
//! `sequence` (+ `start`), `sequence_int`, `cycle`, `pick`, `lorem`,
//! `template`, `fake`, `related` (+ `count`, `override`).

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use fake::faker::address::en::CityName;
use fake::faker::company::en::CompanyName;
use fake::faker::internet::en::SafeEmail;
use fake::faker::name::en::{FirstName, LastName, Name};
use indexmap::IndexMap;
use serde::Deserialize;

use crate::error::{Result, SeedError};
use crate::factory::{
    belongs_to, has_many, has_many_through, Factory, Registry, Relation, Relations, Trait, Traits,
    Visibility,
};
use crate::generate::field::Field;
use crate::generate::providers::{
    self, auto, cycle, dummy_text, pick_random, pick_random_seeded, related_custom_batch,
    sequence_int, sequence_string, LOREM_IPSUM,
};
use crate::generate::value::Value;

/// Default config file name.
pub const CONFIG_FILE_NAME: &str = "seedforge.toml";

/// Top-level seedforge.toml structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FixtureConfig {
    pub settings: Settings,
    /// Factories in file order.
    pub factories: IndexMap<String, FactoryConfig>,

    /// Directory the file was read from. Set by `read_config()`.
    #[serde(skip)]
    pub config_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Base seed for `pick` and `fake` fields. Each field derives its own
    /// seed from it, in file order.
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FactoryConfig {
    /// Storage entity; the factory name when absent.
    pub entity: Option<String>,
    pub primary_key: Option<String>,
    pub relations: IndexMap<String, RelationConfig>,
    pub traits: IndexMap<String, TraitConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RelationConfig {
    /// `belongs_to`, `has_many` or `has_many_through`.
    pub kind: String,
    pub factory: Option<String>,
    pub field: Option<String>,
    /// Public trait of the join entity (`has_many_through` only).
    pub join_trait: Option<String>,
    /// Join-entity field referencing the related record (`has_many_through` only).
    pub remote_field: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TraitConfig {
    pub public: bool,
    /// Whitespace-separated trait names.
    pub include: Option<String>,
    pub fields: IndexMap<String, toml::Value>,
}

/// Read and parse a seedforge.toml file from the given directory.
///
/// Returns `None` if the file doesn't exist.
/// Returns an error if the file exists but can't be parsed or validated.
pub fn read_config(dir: &Path) -> Result<Option<FixtureConfig>> {
    let path = dir.join(CONFIG_FILE_NAME);
    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(&path).map_err(|e| SeedError::Config {
        message: format!("Failed to read {}: {}", path.display(), e),
    })?;

    let mut config: FixtureConfig = toml::from_str(&content).map_err(|e| SeedError::Config {
        message: format!("Failed to parse {}: {}", path.display(), e),
    })?;
    config.config_dir = Some(std::fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf()));

    config.validate()?;
    Ok(Some(config))
}

impl FixtureConfig {
    /// Validate what serde cannot: relation kinds and their required keys,
    /// and every field spec.
    pub fn validate(&self) -> Result<()> {
        if self.factories.is_empty() {
            tracing::warn!("seedforge.toml defines no factories");
        }
        for (name, factory) in &self.factories {
            for (rel_name, rel) in &factory.relations {
                relation(name, rel_name, rel)?;
            }
            let mut fields = FieldBuilder::new(None);
            for (trait_name, t) in &factory.traits {
                for (field, spec) in &t.fields {
                    fields.field(&Location::new(name, trait_name, field), spec)?;
                }
            }
        }
        Ok(())
    }

    /// Turn every factory section into a [`Factory`], in file order.
    pub fn factories(&self) -> Result<Vec<(String, Factory)>> {
        let mut fields = FieldBuilder::new(self.settings.seed);
        let mut out = Vec::with_capacity(self.factories.len());
        for (name, config) in &self.factories {
            let mut relations = Relations::new();
            for (rel_name, rel) in &config.relations {
                relations = relations.with(rel_name, relation(name, rel_name, rel)?);
            }

            let mut traits = Traits::new();
            for (trait_name, t) in &config.traits {
                let mut definition = Trait::new();
                if let Some(include) = &t.include {
                    definition = definition.include(include);
                }
                for (field, spec) in &t.fields {
                    let spec = fields.field(&Location::new(name, trait_name, field), spec)?;
                    definition.set(field, spec);
                }
                let visibility = if t.public {
                    Visibility::Public
                } else {
                    Visibility::Private
                };
                traits = traits.with(trait_name, visibility, definition);
            }

            let mut factory = Factory::new().relations(relations).traits(traits);
            if let Some(entity) = &config.entity {
                factory = factory.entity(entity);
            }
            if let Some(pk) = &config.primary_key {
                factory = factory.primary_key(pk);
            }
            out.push((name.clone(), factory));
        }
        Ok(out)
    }

    /// Register every factory in a new registry named `name`. Drivers are
    /// left at their defaults.
    pub fn into_registry(&self, name: &str) -> Result<Registry> {
        if name.is_empty() {
            return Err(SeedError::Config {
                message: "registry name can't be empty".to_string(),
            });
        }
        let mut registry = Registry::new(name);
        for (factory_name, factory) in self.factories()? {
            registry.try_add(&factory_name, factory)?;
        }
        Ok(registry)
    }
}

fn relation(factory: &str, name: &str, config: &RelationConfig) -> Result<Relation> {
    let require = |value: &Option<String>, key: &str| -> Result<String> {
        value.clone().ok_or_else(|| SeedError::Config {
            message: format!(
                "Relation '{}' of factory '{}' ({}) requires '{}'",
                name, factory, config.kind, key
            ),
        })
    };
    let mut relation = match config.kind.as_str() {
        "belongs_to" => belongs_to(&require(&config.factory, "factory")?),
        "has_many" => has_many(
            &require(&config.factory, "factory")?,
            &require(&config.field, "field")?,
        ),
        "has_many_through" => has_many_through(
            &require(&config.join_trait, "join_trait")?,
            &require(&config.field, "field")?,
            &require(&config.remote_field, "remote_field")?,
        ),
        other => {
            return Err(SeedError::Config {
                message: format!(
                    "Relation '{}' of factory '{}': unknown kind '{}'. \
                     Expected belongs_to, has_many or has_many_through.",
                    name, factory, other
                ),
            })
        }
    };
    match config.kind.as_str() {
        "belongs_to" => {
            if let Some(field) = &config.field {
                relation = relation.via(field);
            }
        }
        "has_many_through" => {
            if let Some(target) = &config.factory {
                relation = relation.of(target);
            }
        }
        _ => {}
    }
    Ok(relation)
}

/// Where a field spec sits, for error messages.
struct Location<'a> {
    factory: &'a str,
    trait_name: &'a str,
    field: &'a str,
}

impl<'a> Location<'a> {
    fn new(factory: &'a str, trait_name: &'a str, field: &'a str) -> Self {
        Location {
            factory,
            trait_name,
            field,
        }
    }

    fn error(&self, message: impl std::fmt::Display) -> SeedError {
        SeedError::Config {
            message: format!(
                "Field '{}' of trait '{}' (factory '{}'): {}",
                self.field, self.trait_name, self.factory, message
            ),
        }
    }
}

/// Converts TOML field specs, handing out per-field seeds in file order.
struct FieldBuilder {
    seed: Option<u64>,
    issued: u64,
}

impl FieldBuilder {
    fn new(seed: Option<u64>) -> Self {
        FieldBuilder { seed, issued: 0 }
    }

    fn next_seed(&mut self) -> Option<u64> {
        let seed = self.seed.map(|s| s.wrapping_add(self.issued));
        self.issued += 1;
        seed
    }

    fn field(&mut self, at: &Location<'_>, spec: &toml::Value) -> Result<Field> {
        let table = match spec {
            toml::Value::Table(t) => t,
            toml::Value::Array(_) => {
                return Err(at.error("arrays are not field values; use { cycle = [...] } or { pick = [...] }"))
            }
            scalar => return Ok(Field::Value(literal(at, scalar)?)),
        };

        let flag = |key: &str| table.get(key).and_then(toml::Value::as_bool) == Some(true);
        if flag("auto") {
            return Ok(auto());
        }
        if flag("null") {
            return Ok(Field::Value(Value::Null));
        }
        if let Some(tmpl) = table.get("sequence") {
            let tmpl = tmpl
                .as_str()
                .ok_or_else(|| at.error("'sequence' must be a string template"))?;
            let start = integer(at, table.get("start"), "start", 1)?;
            return Ok(sequence_string(tmpl, start));
        }
        if let Some(start) = table.get("sequence_int") {
            return Ok(sequence_int(integer(at, Some(start), "sequence_int", 1)?));
        }
        if let Some(values) = table.get("cycle") {
            return Ok(cycle(literals(at, values, "cycle")?));
        }
        if let Some(values) = table.get("pick") {
            let values = literals(at, values, "pick")?;
            return Ok(match self.next_seed() {
                Some(seed) => pick_random_seeded(values, seed),
                None => pick_random(values),
            });
        }
        if let Some(limit) = table.get("lorem") {
            let limit = integer(at, Some(limit), "lorem", 0)?;
            if limit < 0 || limit as usize > LOREM_IPSUM.len() {
                return Err(at.error(format!(
                    "'lorem' must be between 0 and {}",
                    LOREM_IPSUM.len()
                )));
            }
            return Ok(dummy_text(limit as usize));
        }
        if let Some(tmpl) = table.get("template") {
            let tmpl = tmpl
                .as_str()
                .ok_or_else(|| at.error("'template' must be a string"))?;
            return Ok(providers::template(tmpl));
        }
        if let Some(kind) = table.get("fake") {
            let kind = kind
                .as_str()
                .ok_or_else(|| at.error("'fake' must be a string"))?;
            return self.fake(at, kind);
        }
        if let Some(target) = table.get("related") {
            let target = target
                .as_str()
                .ok_or_else(|| at.error("'related' must be a trait name"))?;
            let count = integer(at, table.get("count"), "count", 1)?;
            if count < 1 {
                return Err(at.error("'count' must be at least 1"));
            }
            let mut overrides = Trait::new();
            if let Some(spec) = table.get("override") {
                let spec = spec
                    .as_table()
                    .ok_or_else(|| at.error("'override' must be a table of field specs"))?;
                for (name, value) in spec {
                    let nested = Location::new(at.factory, at.trait_name, name);
                    overrides.set(name, self.field(&nested, value)?);
                }
            }
            return Ok(related_custom_batch(target, count as usize, overrides));
        }

        let keys: Vec<&str> = table.keys().map(String::as_str).collect();
        Err(at.error(format!("unrecognized field spec with keys {:?}", keys)))
    }

    fn fake(&mut self, at: &Location<'_>, kind: &str) -> Result<Field> {
        let seed = self.next_seed();
        macro_rules! faker {
            ($f:expr) => {
                match seed {
                    Some(seed) => providers::fake_seeded($f, seed),
                    None => providers::fake($f),
                }
            };
        }
        Ok(match kind {
            "name" => faker!(Name()),
            "first_name" => faker!(FirstName()),
            "last_name" => faker!(LastName()),
            "email" => faker!(SafeEmail()),
            "company" => faker!(CompanyName()),
            "city" => faker!(CityName()),
            other => {
                return Err(at.error(format!(
                    "unknown fake kind '{}'. Expected name, first_name, last_name, email, company or city.",
                    other
                )))
            }
        })
    }
}

fn integer(at: &Location<'_>, value: Option<&toml::Value>, key: &str, default: i64) -> Result<i64> {
    match value {
        None => Ok(default),
        Some(v) => v
            .as_integer()
            .ok_or_else(|| at.error(format!("'{}' must be an integer", key))),
    }
}

fn literals(at: &Location<'_>, values: &toml::Value, key: &str) -> Result<Vec<Value>> {
    let values = values
        .as_array()
        .ok_or_else(|| at.error(format!("'{}' must be a list", key)))?;
    if values.is_empty() {
        return Err(at.error(format!("'{}' needs at least one value", key)));
    }
    values.iter().map(|v| literal(at, v)).collect()
}

fn literal(at: &Location<'_>, value: &toml::Value) -> Result<Value> {
    Ok(match value {
        toml::Value::String(s) => Value::from(s.clone()),
        toml::Value::Integer(i) => Value::Int(*i),
        toml::Value::Float(f) => Value::Float(*f),
        toml::Value::Boolean(b) => Value::Bool(*b),
        toml::Value::Datetime(dt) => datetime(&dt.to_string()),
        toml::Value::Array(_) | toml::Value::Table(_) => {
            return Err(at.error("expected a scalar value"))
        }
    })
}

fn datetime(text: &str) -> Value {
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Value::Timestamp(ts.naive_utc());
    }
    if let Ok(ts) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        return Value::Timestamp(ts);
    }
    if let Ok(d) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Value::Date(d);
    }
    if let Ok(t) = NaiveTime::parse_from_str(text, "%H:%M:%S%.f") {
        return Value::Time(t);
    }
    Value::from(text.to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::driver::MemoryDriver;

    const BLOG: &str = r#"
[settings]
seed = 7

[factories.users]
primary_key = "id"

[factories.users.relations.articles]
kind = "has_many"
factory = "articles"
field = "author_id"

[factories.users.traits.basic]
fields = { id = { auto = true }, name = { sequence = "Agent Smith {}" }, active = true }

[factories.users.traits.User]
public = true
include = "basic"

[factories.users.traits.Writer]
public = true
include = "basic"
fields = { articles = { related = "Article", count = 2, override = { title = "Draft" } } }

[factories.articles]
primary_key = "id"

[factories.articles.relations.author]
kind = "belongs_to"
factory = "users"
field = "author_id"

[factories.articles.traits.Article]
public = true
fields = { id = { auto = true }, author_id = { null = true }, title = { cycle = ["A", "B"] }, published = 2024-01-15 }
"#;

    #[test]
    fn test_parse_blog_config() {
        let config: FixtureConfig = toml::from_str(BLOG).unwrap();
        config.validate().unwrap();

        assert_eq!(config.settings.seed, Some(7));
        assert_eq!(
            config.factories.keys().collect::<Vec<_>>(),
            vec!["users", "articles"],
            "factories keep file order"
        );
        assert_eq!(config.factories["users"].relations["articles"].kind, "has_many");
        assert!(config.factories["users"].traits["User"].public);
        assert!(!config.factories["users"].traits["basic"].public);
    }

    #[test]
    fn test_parse_empty_config() {
        let config: FixtureConfig = toml::from_str("").unwrap();
        assert!(config.settings.seed.is_none());
        assert!(config.factories.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_into_registry_creates_records() {
        let config: FixtureConfig = toml::from_str(BLOG).unwrap();
        let driver = Arc::new(MemoryDriver::new());
        let registry = config
            .into_registry("blog")
            .unwrap()
            .with_create_driver(driver.clone());

        let writer = registry.create("Writer").unwrap();
        let record = writer.record(0).unwrap();
        assert_eq!(record.get("name"), Some(&Value::from("Agent Smith 1")));
        assert_eq!(record.get("active"), Some(&Value::Bool(true)));

        let articles = record.related("articles").unwrap();
        assert_eq!(articles.len(), 2);
        for article in articles.records() {
            assert_eq!(article.get("title"), Some(&Value::from("Draft")));
            assert_eq!(article.get("author_id"), record.key());
        }
        assert_eq!(driver.call_order(), vec!["users", "articles"]);
    }

    #[test]
    fn test_toml_dates_become_dates() {
        let config: FixtureConfig = toml::from_str(BLOG).unwrap();
        let registry = config.into_registry("blog").unwrap();
        let article = registry.build("Article").unwrap();
        assert_eq!(
            article.record(0).unwrap().get("published"),
            NaiveDate::from_ymd_opt(2024, 1, 15).map(Value::Date).as_ref()
        );
    }

    #[test]
    fn test_seeded_pick_is_reproducible() {
        let toml = r#"
[settings]
seed = 42

[factories.colors.traits.Color]
public = true
fields = { name = { pick = ["red", "green", "blue", "black", "white"] } }
"#;
        let draw = || {
            let config: FixtureConfig = toml::from_str(toml).unwrap();
            let registry = config.into_registry("colors").unwrap();
            registry.build_batch("Color", 8).unwrap().column("name")
        };
        assert_eq!(draw(), draw());
    }

    #[test]
    fn test_unknown_relation_kind() {
        let toml = r#"
[factories.users.relations.friends]
kind = "has_one"
factory = "users"
"#;
        let config: FixtureConfig = toml::from_str(toml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("unknown kind 'has_one'"), "{}", err);
    }

    #[test]
    fn test_has_many_requires_field() {
        let toml = r#"
[factories.users.relations.articles]
kind = "has_many"
factory = "articles"
"#;
        let config: FixtureConfig = toml::from_str(toml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("requires 'field'"), "{}", err);
    }

    #[test]
    fn test_empty_pick_rejected() {
        let toml = r#"
[factories.users.traits.User]
public = true
fields = { role = { pick = [] } }
"#;
        let config: FixtureConfig = toml::from_str(toml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("'pick' needs at least one value"), "{}", err);
        assert!(err.to_string().contains("Field 'role' of trait 'User'"), "{}", err);
    }

    #[test]
    fn test_zero_related_count_rejected() {
        let toml = r#"
[factories.users.traits.User]
public = true
fields = { articles = { related = "Article", count = 0 } }
"#;
        let config: FixtureConfig = toml::from_str(toml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("'count' must be at least 1"), "{}", err);
    }

    #[test]
    fn test_unrecognized_field_spec() {
        let toml = r#"
[factories.users.traits.User]
public = true
fields = { name = { generate = "uuid" } }
"#;
        let config: FixtureConfig = toml::from_str(toml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("unrecognized field spec"), "{}", err);
    }

    #[test]
    fn test_definition_errors_surface_from_into_registry() {
        let toml = r#"
[factories.users.traits.User]
public = true
include = "missing"
"#;
        let config: FixtureConfig = toml::from_str(toml).unwrap();
        let err = config.into_registry("broken").unwrap_err();
        assert!(matches!(err, SeedError::Definition(_)), "{:?}", err);
    }

    #[test]
    fn test_read_config_nonexistent() {
        let result = read_config(Path::new("/nonexistent/dir"));
        assert!(result.is_ok());
        assert!(result.unwrap().is_none());
    }

    #[test]
    fn test_read_config_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), BLOG).unwrap();

        let config = read_config(dir.path()).unwrap().expect("config present");
        assert_eq!(config.factories.len(), 2);
        assert!(config.config_dir.is_some());
    }

    #[test]
    fn test_read_config_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "[factories\nbroken").unwrap();

        let err = read_config(dir.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse"), "{}", err);
    }
}
