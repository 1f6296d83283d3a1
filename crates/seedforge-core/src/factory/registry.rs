use std::sync::Arc;

use indexmap::IndexMap;

use crate::driver::{Driver, NoopDriver};
use crate::error::{defect, escalate, DefinitionError, Result, SeedError};
use crate::factory::relation::RelationKind;
use crate::factory::traits::Trait;
use crate::factory::{Factory, FactoryMeta};
use crate::generate::engine::{self, Mode};
use crate::generate::field::Forks;
use crate::generate::providers::cycle;
use crate::generate::value::Value;
use crate::result::scan::FieldMapper;
use crate::result::Batch;

/// A public trait after include resolution, bound to its factory.
#[derive(Debug)]
pub(crate) struct PublicTrait {
    pub(crate) name: String,
    pub(crate) factory: Arc<FactoryMeta>,
    pub(crate) definition: Trait,
}

/// A collection of factories and the drivers their records go through.
///
/// Registries are fully isolated: generator state, resolved traits and
/// drivers belong to one registry only.
///
/// ```ignore
/// let mut registry = Registry::new("blog").with_create_driver(Arc::new(MemoryDriver::new()));
/// registry.add("users", Factory::new().primary_key("id").traits(
///     Traits::new().public("User", Trait::new().field("id", auto()).field("name", "Jon")),
/// ));
/// let users = registry.create_batch("User", 2)?;
/// ```
pub struct Registry {
    name: String,
    create_driver: Arc<dyn Driver>,
    build_driver: Arc<dyn Driver>,
    field_mapper: FieldMapper,
    factories: IndexMap<String, Arc<FactoryMeta>>,
    public_traits: IndexMap<String, Arc<PublicTrait>>,
    forks: Forks,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("name", &self.name)
            .field("factories", &self.factories.keys().collect::<Vec<_>>())
            .field("public_traits", &self.public_traits.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Registry {
    /// An empty registry using [`NoopDriver`] for both create and build.
    pub fn new(name: &str) -> Self {
        if name.is_empty() {
            defect(DefinitionError::InvalidDefinition {
                message: "registry name can't be empty".to_string(),
            });
        }
        Registry {
            name: name.to_string(),
            create_driver: Arc::new(NoopDriver),
            build_driver: Arc::new(NoopDriver),
            field_mapper: FieldMapper::default(),
            factories: IndexMap::new(),
            public_traits: IndexMap::new(),
            forks: Forks::default(),
        }
    }

    pub fn with_create_driver(mut self, driver: Arc<dyn Driver>) -> Self {
        self.create_driver = driver;
        self
    }

    pub fn with_build_driver(mut self, driver: Arc<dyn Driver>) -> Self {
        self.build_driver = driver;
        self
    }

    pub fn with_field_mapper(mut self, mapper: FieldMapper) -> Self {
        self.field_mapper = mapper;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_mapper(&self) -> &FieldMapper {
        &self.field_mapper
    }

    /// Register `factory` under `name`. Definition errors panic; use
    /// [`try_add`](Self::try_add) to get them back instead.
    pub fn add(&mut self, name: &str, factory: Factory) -> &mut Self {
        if let Err(err) = self.try_add(name, factory) {
            defect(err);
        }
        self
    }

    /// Register `factory`, resolving its public traits. The registry runs
    /// its own copy of every generator in the definition, so adding the
    /// same (or a cloned) factory elsewhere shares no state. On error the
    /// registry is left unchanged.
    pub fn try_add(&mut self, name: &str, factory: Factory) -> std::result::Result<&mut Self, DefinitionError> {
        if self.factories.contains_key(name) {
            return Err(DefinitionError::InvalidDefinition {
                message: format!("factory '{}' is already registered", name),
            });
        }
        if let Some(dup) = factory.traits.duplicates().first() {
            return Err(DefinitionError::DuplicateTrait {
                name: dup.clone(),
                context: format!("factory '{}'", name),
            });
        }

        let traits = factory.traits.fork(&mut self.forks);
        let relations = factory.relations.normalize();
        let meta = Arc::new(FactoryMeta {
            name: name.to_string(),
            entity: factory.entity.unwrap_or_else(|| name.to_string()),
            primary_key: factory.primary_key.filter(|pk| !pk.is_empty()),
            relations,
        });

        let mut resolved: IndexMap<String, Arc<PublicTrait>> = IndexMap::new();
        for trait_name in traits.public_names() {
            if self.public_traits.contains_key(&trait_name) {
                let owner = &self.public_traits[&trait_name].factory.name;
                return Err(DefinitionError::DuplicateTrait {
                    name: trait_name,
                    context: format!("already registered by factory '{}'", owner),
                });
            }
            let mut definition = traits.resolve(&trait_name)?;
            strip_inferred_join_fields(&meta, &mut definition);
            resolved.insert(
                trait_name.clone(),
                Arc::new(PublicTrait {
                    name: trait_name,
                    factory: Arc::clone(&meta),
                    definition,
                }),
            );
        }

        tracing::debug!(
            registry = %self.name,
            factory = name,
            public_traits = resolved.len(),
            "registered factory"
        );
        self.factories.insert(name.to_string(), meta);
        self.public_traits.extend(resolved);
        Ok(self)
    }

    /// Registered factories, in registration order.
    pub fn factories(&self) -> impl Iterator<Item = &FactoryMeta> {
        self.factories.values().map(|m| m.as_ref())
    }

    /// Public trait names of `factory`, in declaration order.
    pub fn public_traits(&self, factory: &str) -> Vec<String> {
        self.public_traits
            .values()
            .filter(|t| t.factory.name == factory)
            .map(|t| t.name.clone())
            .collect()
    }

    pub fn has_trait(&self, name: &str) -> bool {
        self.public_traits.contains_key(name)
    }

    pub(crate) fn public_trait(&self, name: &str, context: String) -> std::result::Result<Arc<PublicTrait>, DefinitionError> {
        self.public_traits
            .get(name)
            .cloned()
            .ok_or_else(|| DefinitionError::UnknownTrait {
                name: name.to_string(),
                context,
            })
    }

    /// Statically check every public trait: relation markers, primary
    /// keys, dependent-field graphs. Nothing is generated or persisted.
    pub fn check(&self) -> Vec<DefinitionError> {
        self.public_traits
            .values()
            .filter_map(|t| engine::check_trait(self, t).err())
            .collect()
    }

    pub fn create(&self, trait_name: &str) -> Result<Batch> {
        self.create_custom_batch(trait_name, 1, Trait::new())
    }

    pub fn create_batch(&self, trait_name: &str, n: usize) -> Result<Batch> {
        self.create_custom_batch(trait_name, n, Trait::new())
    }

    pub fn create_custom(&self, trait_name: &str, overrides: Trait) -> Result<Batch> {
        self.create_custom_batch(trait_name, 1, overrides)
    }

    /// Create `n` records of `trait_name` with `overrides` applied, through
    /// the create driver. Definition errors panic.
    pub fn create_custom_batch(&self, trait_name: &str, n: usize, overrides: Trait) -> Result<Batch> {
        escalate(self.try_create(trait_name, n, Some(&overrides)))
    }

    pub fn build(&self, trait_name: &str) -> Result<Batch> {
        self.build_custom_batch(trait_name, 1, Trait::new())
    }

    pub fn build_batch(&self, trait_name: &str, n: usize) -> Result<Batch> {
        self.build_custom_batch(trait_name, n, Trait::new())
    }

    pub fn build_custom(&self, trait_name: &str, overrides: Trait) -> Result<Batch> {
        self.build_custom_batch(trait_name, 1, overrides)
    }

    /// Like [`create_custom_batch`](Self::create_custom_batch), through the
    /// build driver.
    pub fn build_custom_batch(&self, trait_name: &str, n: usize, overrides: Trait) -> Result<Batch> {
        escalate(self.try_build(trait_name, n, Some(&overrides)))
    }

    /// Create without escalating definition errors to a panic.
    pub fn try_create(&self, trait_name: &str, n: usize, overrides: Option<&Trait>) -> Result<Batch> {
        self.instantiate(Mode::Create, trait_name, n, overrides)
    }

    /// Build without escalating definition errors to a panic.
    pub fn try_build(&self, trait_name: &str, n: usize, overrides: Option<&Trait>) -> Result<Batch> {
        self.instantiate(Mode::Build, trait_name, n, overrides)
    }

    fn instantiate(&self, mode: Mode, trait_name: &str, n: usize, overrides: Option<&Trait>) -> Result<Batch> {
        let public = self.public_trait(trait_name, "no public trait with this name".to_string())?;
        let overrides = overrides.filter(|o| !o.is_empty());
        engine::instantiate(self, mode, &public, overrides, n)
    }

    pub(crate) fn driver(&self, mode: Mode) -> &dyn Driver {
        match mode {
            Mode::Create => self.create_driver.as_ref(),
            Mode::Build => self.build_driver.as_ref(),
        }
    }

    /// Create `n` records of `trait_name` related to row `index` of `batch`
    /// through `relation`, and attach them to that row's group. The records
    /// go through the driver `batch` came from: the build driver for a
    /// built batch, the create driver otherwise.
    ///
    /// Works for child and many-to-many relations; parent relations are
    /// set up in the trait or through an override instead.
    pub fn create_related(
        &self,
        batch: &mut Batch,
        index: usize,
        relation: &str,
        trait_name: &str,
        n: usize,
        overrides: Option<Trait>,
    ) -> Result<()> {
        escalate(self.try_create_related(batch, index, relation, trait_name, n, overrides))
    }

    fn try_create_related(
        &self,
        batch: &mut Batch,
        index: usize,
        relation_name: &str,
        trait_name: &str,
        n: usize,
        overrides: Option<Trait>,
    ) -> Result<()> {
        let factory = batch.factory();
        let relation = factory
            .relations
            .get(relation_name)
            .cloned()
            .ok_or_else(|| SeedError::UnknownRelation {
                factory: factory.name.clone(),
                relation: relation_name.to_string(),
            })?;
        if relation.kind() == RelationKind::Parent {
            return Err(SeedError::RelationNotSupported {
                factory: factory.name.clone(),
                relation: relation_name.to_string(),
            });
        }
        factory.require_primary_key(format!(
            "relation '{}' needs the key of each record",
            relation_name
        ))?;
        let key = batch.record(index)?.key().cloned().unwrap_or(Value::Null);

        let target = self.public_trait(
            trait_name,
            format!(
                "requested through relation '{}' of '{}'",
                relation_name, factory.name
            ),
        )?;
        if target.factory.name != relation.factory() {
            return Err(DefinitionError::RelationTargetMismatch {
                factory: factory.name.clone(),
                relation: relation_name.to_string(),
                expected: relation.factory().to_string(),
                trait_name: trait_name.to_string(),
                found: target.factory.name.clone(),
            }
            .into());
        }
        let overrides = overrides.filter(|o| !o.is_empty());
        let mode = batch.mode();

        if relation.kind() == RelationKind::Child {
            let mut ovr = overrides.unwrap_or_default();
            ovr.set(relation.field(), key);
            let created = engine::instantiate(self, mode, &target, Some(&ovr), n)?;
            batch.attach_child(index, relation_name, created);
            return Ok(());
        }

        let join = self.public_trait(
            relation.join_trait(),
            format!(
                "join trait of relation '{}' of '{}'",
                relation_name, factory.name
            ),
        )?;
        let created = engine::instantiate(self, mode, &target, overrides.as_ref(), n)?;
        let mut join_ovr = Trait::new().field(relation.field(), key);
        if !created.is_empty() {
            join_ovr.set(relation.remote_field(), cycle(created.keys()));
        }
        let joined = engine::instantiate(self, mode, &join, Some(&join_ovr), n)?;
        batch.attach_child(index, relation_name, created);
        batch.attach_child(index, &engine::join_relation_name(relation_name), joined);
        Ok(())
    }
}

/// A parent relation whose name is a field of the trait (`author:
/// related("User")`) owns its join field (`author_id`): the trait's own
/// entry for the join field is dropped, unless the relation is named after
/// the join field itself.
fn strip_inferred_join_fields(meta: &FactoryMeta, definition: &mut Trait) {
    for (name, relation) in meta.relations.iter() {
        if relation.kind() == RelationKind::Parent
            && definition.contains(name)
            && name != relation.field()
        {
            definition.remove(relation.field());
        }
    }
}
