//! # Dependent Field Ordering
//!
//! Dependent fields are computed after every other field of a row is known.
//! Their evaluation order comes from a small dependency graph over field
//! names; edges point from a field to the fields it reads (like the
//! table graph in a schema, where a child points at its parent), so the
//! topological order is reversed before use.

use std::collections::HashSet;

use indexmap::IndexMap;
use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};

use crate::error::DefinitionError;
use crate::generate::field::{DependentField, Row};

/// How a field of a generated row obtains its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FieldClass {
    /// Known before insertion: literals, generator output, parent join fields.
    Literal,
    Auto,
    Relation,
    Dependent,
}

/// Validate the dependencies of every dependent field and compute the order
/// in which they must be evaluated.
pub(crate) fn dependency_order(
    trait_name: &str,
    dependents: &IndexMap<String, DependentField>,
    classes: &IndexMap<String, FieldClass>,
) -> Result<Vec<String>, DefinitionError> {
    let mut graph: DiGraph<String, ()> = DiGraph::new();
    let mut nodes: IndexMap<&str, NodeIndex> = IndexMap::new();
    for name in dependents.keys() {
        nodes.insert(name.as_str(), graph.add_node(name.clone()));
    }

    for (name, spec) in dependents {
        for dep in spec.fields() {
            match classes.get(dep.as_str()) {
                Some(FieldClass::Dependent) => {
                    let from = nodes[name.as_str()];
                    let to = match nodes.get(dep.as_str()) {
                        Some(idx) => *idx,
                        None => {
                            return Err(DefinitionError::UnknownDependency {
                                trait_name: trait_name.to_string(),
                                field: name.clone(),
                                dependency: dep.clone(),
                            })
                        }
                    };
                    graph.add_edge(from, to, ());
                }
                Some(FieldClass::Literal) => {}
                Some(FieldClass::Auto) => {
                    return Err(unsupported(trait_name, name, dep, "an auto field"))
                }
                Some(FieldClass::Relation) => {
                    return Err(unsupported(trait_name, name, dep, "a relation"))
                }
                None => {
                    return Err(DefinitionError::UnknownDependency {
                        trait_name: trait_name.to_string(),
                        field: name.clone(),
                        dependency: dep.clone(),
                    })
                }
            }
        }
    }

    match toposort(&graph, None) {
        Ok(sorted) => Ok(sorted
            .iter()
            .rev()
            .map(|&idx| graph[idx].clone())
            .collect()),
        Err(cycle) => Err(DefinitionError::CircularFieldDependency {
            cycle: describe_cycle(&graph, cycle.node_id()),
        }),
    }
}

fn unsupported(trait_name: &str, field: &str, dep: &str, kind: &str) -> DefinitionError {
    DefinitionError::UnsupportedFieldValueType {
        trait_name: trait_name.to_string(),
        field: field.to_string(),
        dependency: dep.to_string(),
        kind: kind.to_string(),
    }
}

/// Name the cycle through `start` as `a -> b -> a`.
fn describe_cycle(graph: &DiGraph<String, ()>, start: NodeIndex) -> String {
    let scc: HashSet<NodeIndex> = tarjan_scc(graph)
        .into_iter()
        .find(|scc| scc.contains(&start))
        .map(|scc| scc.into_iter().collect())
        .unwrap_or_default();

    let mut path = vec![start];
    let mut seen = HashSet::new();
    if find_path_back(graph, start, start, &scc, &mut seen, &mut path) {
        path.iter()
            .map(|&idx| graph[idx].as_str())
            .collect::<Vec<_>>()
            .join(" -> ")
    } else {
        graph[start].clone()
    }
}

fn find_path_back(
    graph: &DiGraph<String, ()>,
    current: NodeIndex,
    start: NodeIndex,
    scc: &HashSet<NodeIndex>,
    seen: &mut HashSet<NodeIndex>,
    path: &mut Vec<NodeIndex>,
) -> bool {
    for next in graph.neighbors(current) {
        if next == start {
            path.push(start);
            return true;
        }
        if !scc.contains(&next) || !seen.insert(next) {
            continue;
        }
        path.push(next);
        if find_path_back(graph, next, start, scc, seen, path) {
            return true;
        }
        path.pop();
    }
    false
}

/// Compute dependent fields of `row` in `order`. Each computation sees the
/// row as resolved so far.
pub(crate) fn resolve_dependent_fields(
    row: &mut Row,
    order: &[String],
    specs: &IndexMap<String, DependentField>,
) {
    for name in order {
        if let Some(spec) = specs.get(name) {
            let value = spec.compute(row);
            row.insert(name.clone(), value);
        }
    }
}
