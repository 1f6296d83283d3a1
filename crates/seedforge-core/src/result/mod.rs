//! # Result Model
//!
//! A [`Batch`] holds the rows a driver returned for one `create`/`build`
//! call, together with the related batches materialized alongside them:
//!
//! - `parents`: one batch per parent relation, aligned row for row. Rows
//!   appended without a parent get a placeholder parent row whose key is
//!   `NULL`.
//! - `children`: per child or many-to-many relation, one batch per row.
//!
//! [`Record`] is a view of a single row with relation navigation and
//! scanning.

pub mod scan;

use std::sync::Arc;

use indexmap::IndexMap;
use tracing::trace;

use crate::error::{Result, ScanError, SeedError};
use crate::factory::FactoryMeta;
use crate::generate::engine::Mode;
use crate::generate::field::Row;
use crate::generate::value::Value;

use self::scan::{FieldMapper, ScanSchema, Scannable};

#[derive(Debug, Clone)]
pub struct Batch {
    trait_name: String,
    factory: Arc<FactoryMeta>,
    mapper: FieldMapper,
    mode: Mode,
    rows: Vec<Row>,
    parents: IndexMap<String, Batch>,
    children: IndexMap<String, Vec<Batch>>,
}

impl Batch {
    pub(crate) fn new(
        trait_name: &str,
        factory: Arc<FactoryMeta>,
        mapper: FieldMapper,
        rows: Vec<Row>,
    ) -> Self {
        Batch {
            trait_name: trait_name.to_string(),
            factory,
            mapper,
            mode: Mode::Create,
            rows,
            parents: IndexMap::new(),
            children: IndexMap::new(),
        }
    }

    pub(crate) fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Whether the rows were created or built.
    pub(crate) fn mode(&self) -> Mode {
        self.mode
    }

    pub(crate) fn set_parent(&mut self, relation: &str, parent: Batch) {
        self.parents.insert(relation.to_string(), parent);
    }

    pub(crate) fn set_children(&mut self, relation: &str, groups: Vec<Batch>) {
        self.children.insert(relation.to_string(), groups);
    }

    /// Append `related` to the group of row `index` under `relation`,
    /// creating empty groups for every row if the relation has none yet.
    pub(crate) fn attach_child(&mut self, index: usize, relation: &str, related: Batch) {
        let len = self.rows.len();
        let groups = self
            .children
            .entry(relation.to_string())
            .or_default();
        while groups.len() < len {
            groups.push(related.empty_like());
        }
        groups[index].append(related);
    }

    /// Public trait the rows were created from.
    pub fn trait_name(&self) -> &str {
        &self.trait_name
    }

    pub fn factory(&self) -> &FactoryMeta {
        &self.factory
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn record(&self, index: usize) -> Result<Record<'_>> {
        if index >= self.rows.len() {
            return Err(SeedError::RowOutOfRange {
                index,
                len: self.rows.len(),
            });
        }
        Ok(Record { batch: self, index })
    }

    pub fn records(&self) -> impl Iterator<Item = Record<'_>> {
        (0..self.rows.len()).map(move |index| Record { batch: self, index })
    }

    /// Values of `field` across all rows (`NULL` where absent).
    pub fn column(&self, field: &str) -> Vec<Value> {
        self.rows
            .iter()
            .map(|row| row.get(field).cloned().unwrap_or(Value::Null))
            .collect()
    }

    /// Primary-key values of all rows. Empty when the factory has no key.
    pub fn keys(&self) -> Vec<Value> {
        match &self.factory.primary_key {
            Some(pk) => self.column(pk),
            None => Vec::new(),
        }
    }

    /// Parent batch of `relation`, aligned with the rows of this batch.
    pub fn parent(&self, relation: &str) -> Option<&Batch> {
        self.parents.get(relation)
    }

    /// Per-row groups of a child or many-to-many relation.
    pub fn children(&self, relation: &str) -> Option<&[Batch]> {
        self.children.get(relation).map(Vec::as_slice)
    }

    /// Names of the relations materialized with this batch.
    pub fn relation_names(&self) -> Vec<String> {
        self.parents
            .keys()
            .chain(self.children.keys())
            .cloned()
            .collect()
    }

    /// Rows `begin..end`, with every related batch cut to match.
    pub fn slice(&self, begin: usize, end: usize) -> Result<Batch> {
        if begin > end || end > self.rows.len() {
            return Err(SeedError::RowOutOfRange {
                index: end.max(begin),
                len: self.rows.len(),
            });
        }
        let mut parents = IndexMap::new();
        for (name, parent) in &self.parents {
            parents.insert(name.clone(), parent.slice(begin, end)?);
        }
        let children = self
            .children
            .iter()
            .map(|(name, groups)| {
                let cut = groups
                    .get(begin..end.min(groups.len()))
                    .map(<[Batch]>::to_vec)
                    .unwrap_or_default();
                (name.clone(), cut)
            })
            .collect();
        Ok(Batch {
            trait_name: self.trait_name.clone(),
            factory: Arc::clone(&self.factory),
            mapper: self.mapper.clone(),
            mode: self.mode,
            rows: self.rows[begin..end].to_vec(),
            parents,
            children,
        })
    }

    /// Split into `n` equal consecutive parts, in row order.
    pub fn chop(&self, n: usize) -> Result<Vec<Batch>> {
        if n == 0 || self.rows.len() % n != 0 {
            return Err(SeedError::ChopMismatch {
                len: self.rows.len(),
                parts: n,
            });
        }
        let chunk = self.rows.len() / n;
        (0..n)
            .map(|i| self.slice(i * chunk, i * chunk + chunk))
            .collect()
    }

    /// Same shape, no rows.
    pub fn empty_like(&self) -> Batch {
        Batch {
            trait_name: self.trait_name.clone(),
            factory: Arc::clone(&self.factory),
            mapper: self.mapper.clone(),
            mode: self.mode,
            rows: Vec::new(),
            parents: self
                .parents
                .iter()
                .map(|(name, p)| (name.clone(), p.empty_like()))
                .collect(),
            children: self
                .children
                .keys()
                .map(|name| (name.clone(), Vec::new()))
                .collect(),
        }
    }

    /// `n` rows holding only a `NULL` key, with every parent padded the
    /// same way and an empty group per row for each child relation.
    fn placeholder(&self, n: usize) -> Batch {
        let mut row = Row::new();
        if let Some(pk) = &self.factory.primary_key {
            row.insert(pk.clone(), Value::Null);
        }
        let mut out = self.empty_like();
        out.rows = vec![row; n];
        out.parents = self
            .parents
            .iter()
            .map(|(name, p)| (name.clone(), p.placeholder(n)))
            .collect();
        for (name, groups) in &self.children {
            if let Some(template) = groups.first() {
                out.children
                    .insert(name.clone(), vec![template.empty_like(); n]);
            }
        }
        out
    }

    /// Add the rows of `other` and their related batches to this batch.
    ///
    /// Parents stay aligned row for row: when only one side has a parent
    /// relation, the other side's rows get placeholder parents.
    pub fn append(&mut self, mut other: Batch) {
        let before = self.rows.len();
        let added = other.rows.len();

        for (name, parent) in &self.parents {
            if !other.parents.contains_key(name) {
                trace!(relation = %name, rows = added, "padding appended rows with placeholder parents");
                other.parents.insert(name.clone(), parent.placeholder(added));
            }
        }
        self.rows.extend(other.rows);

        for (name, parent) in other.parents {
            match self.parents.get_mut(&name) {
                Some(existing) => existing.append(parent),
                None => {
                    if before > 0 {
                        trace!(relation = %name, rows = before, "padding existing rows with placeholder parents");
                    }
                    let mut padded = parent.placeholder(before);
                    padded.append(parent);
                    self.parents.insert(name, padded);
                }
            }
        }

        for (name, groups) in other.children {
            let template = groups.first().map(Batch::empty_like);
            let existing = self.children.entry(name).or_default();
            if let Some(template) = &template {
                while existing.len() < before {
                    existing.push(template.empty_like());
                }
            }
            existing.extend(groups);
        }
        for groups in self.children.values_mut() {
            if let Some(template) = groups.first().map(Batch::empty_like) {
                while groups.len() < before + added {
                    groups.push(template.empty_like());
                }
            }
        }
    }

    /// Scan the only row. Fails unless the batch holds exactly one row.
    pub fn scan_one<T: Scannable>(&self) -> Result<T> {
        if self.rows.len() != 1 {
            return Err(ScanError::Cardinality {
                count: self.rows.len(),
            }
            .into());
        }
        let schema = ScanSchema::of::<T>(&self.mapper)?;
        Ok(schema.scan(&self.rows[0])?)
    }

    /// Scan every row, in order.
    pub fn scan_all<T: Scannable>(&self) -> Result<Vec<T>> {
        let schema = ScanSchema::of::<T>(&self.mapper)?;
        self.rows
            .iter()
            .map(|row| schema.scan(row).map_err(SeedError::from))
            .collect()
    }
}

/// One row of a [`Batch`].
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    batch: &'a Batch,
    index: usize,
}

impl<'a> Record<'a> {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn row(&self) -> &'a Row {
        &self.batch.rows[self.index]
    }

    pub fn get(&self, field: &str) -> Option<&'a Value> {
        self.row().get(field)
    }

    /// Primary-key value, if the factory has a key and the row holds it.
    pub fn key(&self) -> Option<&'a Value> {
        let pk = self.batch.factory.primary_key.as_deref()?;
        self.get(pk)
    }

    /// Records related through `relation`: the row's child group, else its
    /// parent.
    pub fn related(&self, relation: &str) -> Result<Batch> {
        if let Some(group) = self
            .batch
            .children
            .get(relation)
            .and_then(|groups| groups.get(self.index))
        {
            return Ok(group.clone());
        }
        if let Some(parent) = self.batch.parents.get(relation) {
            return parent.slice(self.index, self.index + 1);
        }
        Err(SeedError::UnknownRelation {
            factory: self.batch.factory.name.clone(),
            relation: relation.to_string(),
        })
    }

    pub fn scan<T: Scannable>(&self) -> Result<T> {
        let schema = ScanSchema::of::<T>(&self.batch.mapper)?;
        Ok(schema.scan(self.row())?)
    }

    pub fn scan_related<T: Scannable>(&self, relation: &str) -> Result<Vec<T>> {
        self.related(relation)?.scan_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::Relations;

    #[derive(Debug, Default, PartialEq)]
    struct Item {
        id: i64,
    }

    crate::scannable!(Item { id });

    fn meta(name: &str) -> Arc<FactoryMeta> {
        Arc::new(FactoryMeta {
            name: name.to_string(),
            entity: name.to_string(),
            primary_key: Some("id".to_string()),
            relations: Relations::new(),
        })
    }

    fn batch(name: &str, ids: std::ops::Range<i64>) -> Batch {
        let rows = ids
            .map(|id| {
                let mut row = Row::new();
                row.insert("id".to_string(), Value::Int(id));
                row
            })
            .collect();
        Batch::new(name, meta(name), FieldMapper::identity(), rows)
    }

    #[test]
    fn test_chop_into_equal_groups_in_order() {
        let b = batch("articles", 1..7);
        let parts = b.chop(3).expect("6 rows chop into 3");
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].keys(), vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(parts[2].keys(), vec![Value::Int(5), Value::Int(6)]);
    }

    #[test]
    fn test_chop_mismatch() {
        let b = batch("articles", 1..6);
        assert!(matches!(b.chop(2), Err(SeedError::ChopMismatch { len: 5, parts: 2 })));
        assert!(matches!(b.chop(0), Err(SeedError::ChopMismatch { .. })));
    }

    #[test]
    fn test_slice_cuts_parents_and_children() {
        let mut owner = batch("articles", 1..3);
        owner.set_parent("author", batch("users", 10..12));
        owner.set_children("comments", batch("comments", 20..24).chop(2).unwrap());

        let second = owner.slice(1, 2).unwrap();
        assert_eq!(second.keys(), vec![Value::Int(2)]);
        assert_eq!(second.parent("author").unwrap().keys(), vec![Value::Int(11)]);
        let comments = second.children("comments").unwrap();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].keys(), vec![Value::Int(22), Value::Int(23)]);
    }

    #[test]
    fn test_record_related_prefers_children_then_parents() {
        let mut owner = batch("articles", 1..3);
        owner.set_parent("author", batch("users", 10..12));
        owner.set_children("comments", batch("comments", 20..24).chop(2).unwrap());

        let record = owner.record(1).unwrap();
        assert_eq!(record.related("author").unwrap().keys(), vec![Value::Int(11)]);
        assert_eq!(
            record.related("comments").unwrap().keys(),
            vec![Value::Int(22), Value::Int(23)]
        );
        assert!(matches!(
            record.related("tags"),
            Err(SeedError::UnknownRelation { ref relation, .. }) if relation == "tags"
        ));
    }

    #[test]
    fn test_record_out_of_range() {
        let b = batch("users", 1..3);
        assert!(matches!(b.record(2), Err(SeedError::RowOutOfRange { index: 2, len: 2 })));
    }

    #[test]
    fn test_attach_child_fills_empty_groups() {
        let mut owner = batch("users", 1..3);
        owner.attach_child(1, "articles", batch("articles", 5..7));
        let groups = owner.children("articles").unwrap();
        assert_eq!(groups.len(), 2);
        assert!(groups[0].is_empty());
        assert_eq!(groups[1].len(), 2);

        owner.attach_child(1, "articles", batch("articles", 7..8));
        assert_eq!(owner.children("articles").unwrap()[1].len(), 3);
    }

    #[test]
    fn test_append_keeps_alignment() {
        let mut a = batch("users", 1..2);
        let mut b = batch("users", 2..3);
        b.set_children("articles", vec![batch("articles", 1..3)]);
        a.append(b);
        assert_eq!(a.len(), 2);
        let groups = a.children("articles").unwrap();
        assert_eq!(groups.len(), 2);
        assert!(groups[0].is_empty());
        assert_eq!(groups[1].len(), 2);
    }

    #[test]
    fn test_append_pads_missing_parents_both_ways() {
        let mut group = batch("articles", 1..2);
        group.set_parent("editor", batch("users", 10..11));
        group.append(batch("articles", 2..3));
        let editor = group.record(1).unwrap().related("editor").unwrap();
        assert_eq!(editor.keys(), vec![Value::Null]);
        let parts = group.chop(2).expect("parents stay aligned");
        assert_eq!(parts[0].parent("editor").unwrap().keys(), vec![Value::Int(10)]);

        let mut group = batch("articles", 1..2);
        let mut edited = batch("articles", 2..3);
        edited.set_parent("editor", batch("users", 11..12));
        group.append(edited);
        assert_eq!(
            group.parent("editor").expect("appended parent is kept").keys(),
            vec![Value::Null, Value::Int(11)]
        );
        assert_eq!(
            group.record(1).unwrap().related("editor").unwrap().keys(),
            vec![Value::Int(11)]
        );
    }

    #[test]
    fn test_slice_and_append_keep_mode() {
        let mut built = batch("users", 1..3).with_mode(Mode::Build);
        assert_eq!(built.slice(0, 1).unwrap().mode(), Mode::Build);
        assert_eq!(built.empty_like().mode(), Mode::Build);
        built.append(batch("users", 3..4));
        assert_eq!(built.mode(), Mode::Build);
    }

    #[test]
    fn test_scan_one_requires_single_row() {
        let b = batch("users", 1..3);
        assert!(matches!(
            b.scan_one::<Item>(),
            Err(SeedError::Scan(ScanError::Cardinality { count: 2 }))
        ));
        let items: Vec<Item> = b.scan_all().unwrap();
        assert_eq!(items, vec![Item { id: 1 }, Item { id: 2 }]);
        assert_eq!(b.slice(0, 1).unwrap().scan_one::<Item>().unwrap(), Item { id: 1 });
    }
}
