use indexmap::IndexMap;
use tracing::{debug, trace, warn};

use crate::driver::Payload;
use crate::error::{DefinitionError, Result, SeedError};
use crate::factory::registry::{PublicTrait, Registry};
use crate::factory::relation::{Relation, RelationKind};
use crate::factory::traits::Trait;
use crate::generate::dependent::{dependency_order, resolve_dependent_fields, FieldClass};
use crate::generate::field::{DependentField, Field, Produced, RelationRequest, Row};
use crate::generate::providers::{cycle, repeat_each};
use crate::generate::value::Value;
use crate::result::Batch;

/// Which of the registry's drivers a call goes through. Related records
/// are materialized in the same mode as their owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    Create,
    Build,
}

/// Name under which the join-trait rows of a many-to-many relation are
/// attached to the owning batch.
pub(crate) fn join_relation_name(relation: &str) -> String {
    format!("{}_join", relation)
}

/// A relation marker found during row generation, bound to its relation.
#[derive(Debug)]
struct PendingRelation {
    relation: Relation,
    request: RelationRequest,
    target: std::sync::Arc<PublicTrait>,
}

/// Rows generated for one call, before anything is persisted.
#[derive(Debug, Default)]
struct RawBatch {
    rows: Vec<Row>,
    relations: IndexMap<String, PendingRelation>,
    dependent: IndexMap<String, DependentField>,
    dependent_order: Vec<String>,
    insert_fields: Vec<String>,
    auto_fields: Vec<String>,
}

/// Field specs of `public` with `overrides` applied: base fields in
/// declaration order (an override replaces the base field spec), then
/// fields only the override defines.
fn effective_fields<'a>(
    public: &'a PublicTrait,
    overrides: Option<&'a Trait>,
) -> Vec<(&'a String, &'a Field)> {
    let base = &public.definition;
    let mut fields: Vec<(&String, &Field)> = base
        .fields()
        .iter()
        .map(|(name, spec)| (name, overrides.and_then(|o| o.get(name)).unwrap_or(spec)))
        .collect();
    if let Some(o) = overrides {
        fields.extend(o.fields().iter().filter(|(name, _)| !base.contains(name)));
    }
    fields
}

/// Without drawing from it: generators count as literal fields.
fn classify_only(spec: &Field) -> Produced {
    match spec {
        Field::Generator(_) => Produced::Value(Value::Null),
        other => other.produce(),
    }
}

/// Generate `n` rows and classify every field. All definition checks run
/// here, before any driver call. With `checking`, generators are left
/// untouched.
fn next(
    registry: &Registry,
    public: &PublicTrait,
    overrides: Option<&Trait>,
    n: usize,
    checking: bool,
) -> std::result::Result<RawBatch, DefinitionError> {
    let fields = effective_fields(public, overrides);
    let mut raw = RawBatch::default();
    let mut classes: IndexMap<String, FieldClass> = IndexMap::new();
    let mut markers: Vec<(String, RelationRequest)> = Vec::new();

    for i in 0..n {
        let mut row = Row::with_capacity(fields.len());
        for (name, spec) in &fields {
            let first = i == 0;
            let produced = if checking { classify_only(spec) } else { spec.produce() };
            match produced {
                Produced::Value(value) => {
                    row.insert((*name).clone(), value);
                    if first {
                        classes.insert((*name).clone(), FieldClass::Literal);
                        raw.insert_fields.push((*name).clone());
                    }
                }
                Produced::Auto => {
                    if first {
                        classes.insert((*name).clone(), FieldClass::Auto);
                        raw.auto_fields.push((*name).clone());
                    }
                }
                Produced::Dependent(dep) => {
                    row.insert((*name).clone(), Value::Null);
                    if first {
                        classes.insert((*name).clone(), FieldClass::Dependent);
                        raw.insert_fields.push((*name).clone());
                        raw.dependent.insert((*name).clone(), dep);
                    }
                }
                Produced::Relation(request) => {
                    if first {
                        classes.insert((*name).clone(), FieldClass::Relation);
                        markers.push(((*name).clone(), request));
                    }
                }
            }
        }
        raw.rows.push(row);
    }

    let factory = &public.factory;
    for (field, request) in markers {
        let relation = factory.relations.get(&field).cloned().ok_or_else(|| {
            DefinitionError::RelationNotDefined {
                factory: factory.name.clone(),
                trait_name: public.name.clone(),
                relation: field.clone(),
            }
        })?;
        let target = registry.public_trait(
            &request.trait_name,
            format!("trait '{}', field '{}'", public.name, field),
        )?;
        if target.factory.name != relation.factory() {
            return Err(DefinitionError::RelationTargetMismatch {
                factory: factory.name.clone(),
                relation: field.clone(),
                expected: relation.factory().to_string(),
                trait_name: request.trait_name.clone(),
                found: target.factory.name.clone(),
            });
        }

        match relation.kind() {
            RelationKind::Parent => {
                if request.count != 1 {
                    return Err(DefinitionError::InvalidParentCount {
                        trait_name: public.name.clone(),
                        relation: field.clone(),
                        count: request.count,
                    });
                }
                target.factory.require_primary_key(format!(
                    "it is the parent in relation '{}' of '{}'",
                    field, factory.name
                ))?;
                let local = relation.field();
                if local != field && classes.get(local) == Some(&FieldClass::Literal) {
                    warn!(
                        trait_name = %public.name,
                        relation = %field,
                        field = local,
                        "join field is set explicitly, parent relation skipped"
                    );
                    continue;
                }
                classes.insert(local.to_string(), FieldClass::Literal);
                if !raw.insert_fields.iter().any(|f| f == local) {
                    raw.insert_fields.push(local.to_string());
                }
            }
            RelationKind::Child | RelationKind::ManyToMany => {
                factory.require_primary_key(format!(
                    "trait '{}' materializes relation '{}'",
                    public.name, field
                ))?;
                if relation.kind() == RelationKind::ManyToMany {
                    target.factory.require_primary_key(format!(
                        "it is the related side of relation '{}' of '{}'",
                        field, factory.name
                    ))?;
                    registry.public_trait(
                        relation.join_trait(),
                        format!("join trait of relation '{}' of '{}'", field, factory.name),
                    )?;
                }
            }
        }
        raw.relations.insert(
            field,
            PendingRelation {
                relation,
                request,
                target,
            },
        );
    }

    if let Some(auto) = raw.auto_fields.first() {
        factory.require_primary_key(format!(
            "trait '{}' has auto field '{}'",
            public.name, auto
        ))?;
    }

    raw.dependent_order = dependency_order(&public.name, &raw.dependent, &classes)?;
    Ok(raw)
}

/// Run the definition checks of one public trait without generating rows
/// for persistence.
pub(crate) fn check_trait(
    registry: &Registry,
    public: &PublicTrait,
) -> std::result::Result<(), DefinitionError> {
    next(registry, public, None, 1, true).map(|_| ())
}

/// Create (or build) `n` records of `public` and everything they relate to.
pub(crate) fn instantiate(
    registry: &Registry,
    mode: Mode,
    public: &PublicTrait,
    overrides: Option<&Trait>,
    n: usize,
) -> Result<Batch> {
    let factory = &public.factory;
    if n == 0 {
        return Ok(Batch::new(
            &public.name,
            std::sync::Arc::clone(factory),
            registry.field_mapper().clone(),
            Vec::new(),
        )
        .with_mode(mode));
    }

    let mut raw = next(registry, public, overrides, n, false)?;
    let relations = std::mem::take(&mut raw.relations);

    let mut parents: IndexMap<String, Batch> = IndexMap::new();
    let mut deferred: Vec<(String, PendingRelation)> = Vec::new();
    for (field, pending) in relations {
        if pending.relation.kind() != RelationKind::Parent {
            deferred.push((field, pending));
            continue;
        }
        trace!(
            trait_name = %public.name,
            relation = %field,
            target = %pending.target.name,
            rows = n,
            "materializing parents"
        );
        let parent = instantiate(
            registry,
            mode,
            &pending.target,
            pending.request.overrides.as_ref(),
            n,
        )?;
        let keys = parent.keys();
        let local = pending.relation.field();
        for (row, key) in raw.rows.iter_mut().zip(keys) {
            row.insert(local.to_string(), key);
        }
        parents.insert(field, parent);
    }

    for row in raw.rows.iter_mut() {
        resolve_dependent_fields(row, &raw.dependent_order, &raw.dependent);
    }

    let mut return_fields = raw.insert_fields.clone();
    return_fields.extend(raw.auto_fields.iter().cloned());
    let payload = Payload {
        entity: factory.entity.clone(),
        primary_key: factory.primary_key.clone(),
        insert_fields: raw.insert_fields,
        return_fields,
        rows: raw.rows,
    };

    debug!(
        entity = %payload.entity,
        trait_name = %public.name,
        rows = n,
        mode = ?mode,
        "persisting batch"
    );
    let returned = registry
        .driver(mode)
        .create(&payload)
        .map_err(|source| SeedError::Driver {
            factory: factory.name.clone(),
            trait_name: public.name.clone(),
            entity: payload.entity.clone(),
            rows: n,
            source,
        })?;

    let rows = if returned.len() == n {
        returned
    } else if returned.is_empty() && payload.primary_key.is_none() {
        payload.rows
    } else {
        return Err(SeedError::DriverRowCount {
            entity: payload.entity,
            requested: n,
            returned: returned.len(),
        });
    };

    let mut batch = Batch::new(
        &public.name,
        std::sync::Arc::clone(factory),
        registry.field_mapper().clone(),
        rows,
    )
    .with_mode(mode);
    for (field, parent) in parents {
        batch.set_parent(&field, parent);
    }
    if deferred.is_empty() {
        return Ok(batch);
    }

    let keys = batch.keys();
    for (field, pending) in deferred {
        let k = pending.request.count;
        trace!(
            trait_name = %public.name,
            relation = %field,
            target = %pending.target.name,
            per_row = k,
            "materializing related records"
        );
        match pending.relation.kind() {
            RelationKind::Child => {
                let mut ovr = pending.request.overrides.clone().unwrap_or_default();
                ovr.set(pending.relation.field(), repeat_each(keys.clone(), k.max(1)));
                let children = instantiate(registry, mode, &pending.target, Some(&ovr), n * k)?;
                batch.set_children(&field, children.chop(n)?);
            }
            RelationKind::ManyToMany => {
                let related = instantiate(
                    registry,
                    mode,
                    &pending.target,
                    pending.request.overrides.as_ref(),
                    n * k,
                )?;
                let join_trait = registry.public_trait(
                    pending.relation.join_trait(),
                    format!("join trait of relation '{}' of '{}'", field, factory.name),
                )?;
                let mut join_ovr = Trait::new();
                join_ovr.set(pending.relation.field(), repeat_each(keys.clone(), k.max(1)));
                if !related.is_empty() {
                    join_ovr.set(pending.relation.remote_field(), cycle(related.keys()));
                }
                let joined = instantiate(registry, mode, &join_trait, Some(&join_ovr), n * k)?;
                batch.set_children(&field, related.chop(n)?);
                batch.set_children(&join_relation_name(&field), joined.chop(n)?);
            }
            RelationKind::Parent => {}
        }
    }
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::driver::MemoryDriver;
    use crate::factory::{belongs_to, has_many, Factory, Relations, Traits};
    use crate::generate::field::depends_on;
    use crate::generate::providers::{auto, related, related_batch, sequence_string};

    fn registry(driver: Arc<MemoryDriver>) -> Registry {
        let mut r = Registry::new("engine").with_create_driver(driver);
        r.add(
            "users",
            Factory::new()
                .primary_key("id")
                .relations(Relations::new().with("articles", has_many("articles", "author_id")))
                .traits(
                    Traits::new()
                        .public(
                            "User",
                            Trait::new()
                                .field("id", auto())
                                .field("name", sequence_string("Agent Smith {}", 1)),
                        )
                        .public(
                            "Writer",
                            Trait::new()
                                .field("id", auto())
                                .field("name", "Writer")
                                .field("articles", related_batch("Article", 2)),
                        ),
                ),
        );
        r.add(
            "articles",
            Factory::new()
                .primary_key("id")
                .relations(Relations::new().with("author", belongs_to("users").via("author_id")))
                .traits(
                    Traits::new()
                        .private(
                            "basic",
                            Trait::new()
                                .field("id", auto())
                                .field("author_id", Value::Null)
                                .field("title", sequence_string("Title {}", 1)),
                        )
                        .public("Article", Trait::new().include("basic"))
                        .public(
                            "AuthoredArticle",
                            Trait::new().include("basic").field("author", related("User")),
                        ),
                ),
        );
        r
    }

    fn public(r: &Registry, name: &str) -> Arc<PublicTrait> {
        r.public_trait(name, String::new()).unwrap()
    }

    #[test]
    fn test_auto_fields_only_returned() {
        let r = registry(Arc::new(MemoryDriver::new()));
        let raw = next(&r, &public(&r, "User"), None, 2, false).unwrap();
        assert_eq!(raw.insert_fields, vec!["name"]);
        assert_eq!(raw.auto_fields, vec!["id"]);
        assert!(!raw.rows[0].contains_key("id"));
        assert_eq!(raw.rows[1]["name"], Value::from("Agent Smith 2"));
    }

    #[test]
    fn test_parent_marker_owns_join_field() {
        let r = registry(Arc::new(MemoryDriver::new()));
        let raw = next(&r, &public(&r, "AuthoredArticle"), None, 1, false).unwrap();
        assert_eq!(
            raw.insert_fields.iter().filter(|f| *f == "author_id").count(),
            1
        );
        assert!(raw.relations.contains_key("author"));
        assert!(!raw.rows[0].contains_key("author"));
    }

    #[test]
    fn test_literal_join_field_drops_parent_marker() {
        let r = registry(Arc::new(MemoryDriver::new()));
        let ovr = Trait::new().field("author_id", 9);
        let raw = next(&r, &public(&r, "AuthoredArticle"), Some(&ovr), 1, false).unwrap();
        assert!(raw.relations.is_empty());
        assert_eq!(raw.rows[0]["author_id"], Value::Int(9));
    }

    #[test]
    fn test_override_only_fields_are_appended() {
        let r = registry(Arc::new(MemoryDriver::new()));
        let ovr = Trait::new().field("nickname", "neo").field("name", "Thomas");
        let raw = next(&r, &public(&r, "User"), Some(&ovr), 1, false).unwrap();
        assert_eq!(raw.insert_fields, vec!["name", "nickname"]);
        assert_eq!(raw.rows[0]["name"], Value::from("Thomas"));
    }

    #[test]
    fn test_undefined_relation() {
        let r = registry(Arc::new(MemoryDriver::new()));
        let ovr = Trait::new().field("comments", related("Article"));
        let err = next(&r, &public(&r, "User"), Some(&ovr), 1, false).unwrap_err();
        assert!(matches!(err, DefinitionError::RelationNotDefined { ref relation, .. } if relation == "comments"), "{:?}", err);
    }

    #[test]
    fn test_relation_target_mismatch() {
        let r = registry(Arc::new(MemoryDriver::new()));
        let ovr = Trait::new().field("articles", related("User"));
        let err = next(&r, &public(&r, "User"), Some(&ovr), 1, false).unwrap_err();
        assert!(matches!(err, DefinitionError::RelationTargetMismatch { .. }), "{:?}", err);
    }

    #[test]
    fn test_parent_count_must_be_one() {
        let r = registry(Arc::new(MemoryDriver::new()));
        let ovr = Trait::new().field("author", related_batch("User", 2));
        let err = next(&r, &public(&r, "AuthoredArticle"), Some(&ovr), 1, false).unwrap_err();
        assert!(matches!(err, DefinitionError::InvalidParentCount { count: 2, .. }), "{:?}", err);
    }

    #[test]
    fn test_dependent_on_parent_join_field() {
        let r = registry(Arc::new(MemoryDriver::new()));
        let ovr = Trait::new().field(
            "slug",
            depends_on(["author_id", "title"]).template("{author_id}-{title}"),
        );
        let batch = r
            .create_custom("AuthoredArticle", ovr)
            .expect("created");
        let record = batch.record(0).unwrap();
        let author = record.get("author_id").cloned().unwrap();
        let title = record.get("title").cloned().unwrap();
        assert_eq!(
            record.get("slug"),
            Some(&Value::from(format!("{}-{}", author, title)))
        );
    }

    #[test]
    fn test_check_leaves_sequences_alone() {
        let r = registry(Arc::new(MemoryDriver::new()));
        check_trait(&r, &public(&r, "User")).unwrap();
        let batch = r.build("User").unwrap();
        assert_eq!(
            batch.record(0).unwrap().get("name"),
            Some(&Value::from("Agent Smith 1"))
        );
    }

    #[test]
    fn test_zero_rows_skip_driver() {
        let driver = Arc::new(MemoryDriver::new());
        let r = registry(driver.clone());
        let batch = r.create_batch("Writer", 0).unwrap();
        assert!(batch.is_empty());
        assert!(driver.calls().is_empty());
    }

    #[test]
    fn test_children_inserted_after_owner() {
        let driver = Arc::new(MemoryDriver::new());
        let r = registry(driver.clone());
        let batch = r.create_batch("Writer", 2).unwrap();
        assert_eq!(driver.call_order(), vec!["users", "articles"]);
        let groups = batch.children("articles").unwrap();
        assert_eq!(groups.len(), 2);
        for (record, group) in batch.records().zip(groups) {
            assert_eq!(group.len(), 2);
            for article in group.records() {
                assert_eq!(article.get("author_id"), record.key());
            }
        }
    }

    #[test]
    fn test_driver_failure_names_factory_and_trait() {
        let driver = Arc::new(MemoryDriver::new().failing_on("articles"));
        let r = registry(driver);
        let err = r.create("Writer").unwrap_err();
        match err {
            SeedError::Driver {
                factory,
                trait_name,
                ..
            } => {
                assert_eq!(factory, "articles");
                assert_eq!(trait_name, "Article");
            }
            other => panic!("expected a driver error, got {:?}", other),
        }
    }
}
