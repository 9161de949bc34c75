//! # Defaults Inheritance
//!
//! Named templates in a defaults file may `inherit` from each other. This module turns
//! those edges into an immutable `petgraph` DAG, validates it (unknown parents, cycles),
//! fixes a parents-first order once, and resolves every template by merging its parents into
//! it with [`Merge::merge_into`].
//!
//! Tools from the tool list are not graph nodes themselves: they inherit from resolved
//! templates through [`apply_defaults`]. A template named `default` is applied to every
//! tool that declares no `inherit` of its own.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use colored::Colorize;
use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use thiserror::Error;

use crate::libs::errors::{Error, Result};
use crate::libs::merge::Merge;
use crate::log_debug;
use crate::schemas::tools::Tool;

/// Name of the template applied to tools that declare no parents.
pub const DEFAULT_TEMPLATE: &str = "default";

/// A cycle in the inheritance graph.
///
/// `path` starts and ends at the same node.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub struct CycleError {
    /// Nodes along the cycle, first node repeated at the end.
    pub path: Vec<String>,
}

impl fmt::Display for CycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "inheritance cycle detected: {}", self.path.join(" -> "))
    }
}

/// Validated inheritance DAG.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    parents: HashMap<String, Vec<String>>,
    order: Vec<String>,
}

impl Graph {
    /// Builds and validates the graph.
    ///
    /// Edges run from parent to child, so a topological sort yields parents first.
    ///
    /// # Arguments
    /// * `nodes`: Every node name. Order does not matter; nodes are sorted before they
    ///   are added so the result is deterministic.
    /// * `parents_fn`: Declared parents of a node, in precedence order.
    ///
    /// # Returns
    /// * `Ok(Graph)` with a parents-first order.
    /// * `Err(Error::UnknownParent)` when a parent is not a node.
    /// * `Err(Error::Cycle)` when the graph is not acyclic.
    pub fn build<I, S, F>(nodes: I, parents_fn: F) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&str) -> Vec<String>,
    {
        let mut names: Vec<String> = nodes.into_iter().map(Into::into).collect();
        names.sort();
        names.dedup();

        let mut graph: DiGraph<String, ()> = DiGraph::with_capacity(names.len(), names.len());
        let mut name_to_node: HashMap<&str, NodeIndex> = HashMap::with_capacity(names.len());
        for name in &names {
            name_to_node.insert(name.as_str(), graph.add_node(name.clone()));
        }

        let mut parents = HashMap::with_capacity(names.len());
        for name in &names {
            let declared = parents_fn(name);
            let child = name_to_node[name.as_str()];
            for parent in &declared {
                let Some(&from) = name_to_node.get(parent.as_str()) else {
                    return Err(Error::UnknownParent {
                        node: name.clone(),
                        parent: parent.clone(),
                    });
                };
                graph.add_edge(from, child, ());
            }
            parents.insert(name.clone(), declared);
        }

        let sorted = toposort(&graph, None)
            .map_err(|cycle| cycle_error(&graph, &parents, cycle.node_id()))?;
        let order: Vec<String> = sorted.into_iter().map(|ix| graph[ix].clone()).collect();

        log_debug!("[Inheritance] Resolved order: {}", order.join(", ").dimmed());
        Ok(Self { parents, order })
    }

    /// Nodes in topological order, parents first.
    #[must_use]
    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// Declared parents of a node.
    #[must_use]
    pub fn parents(&self, name: &str) -> &[String] {
        self.parents.get(name).map(Vec::as_slice).unwrap_or_default()
    }
}

// Rebuilds the cycle through `node` as `a -> b -> c -> a`, following `inherit` edges
// from the alphabetically first member of its strongly connected component.
fn cycle_error<'a>(
    graph: &'a DiGraph<String, ()>,
    parents: &'a HashMap<String, Vec<String>>,
    node: NodeIndex,
) -> Error {
    let members: Vec<&'a str> = tarjan_scc(graph)
        .into_iter()
        .find(|component| component.contains(&node))
        .map(|component| component.into_iter().map(|ix| graph[ix].as_str()).collect())
        .unwrap_or_default();
    let start = members.iter().min().copied().unwrap_or(graph[node].as_str());

    let mut path = vec![start];
    if !close_cycle(start, start, parents, &members, &mut path) {
        path.push(start);
    }
    CycleError {
        path: path.into_iter().map(str::to_string).collect(),
    }
    .into()
}

fn close_cycle<'a>(
    current: &str,
    start: &str,
    parents: &'a HashMap<String, Vec<String>>,
    members: &[&str],
    path: &mut Vec<&'a str>,
) -> bool {
    for parent in parents.get(current).map(Vec::as_slice).unwrap_or_default() {
        let parent = parent.as_str();
        if parent == start {
            path.push(parent);
            return true;
        }
        if members.contains(&parent) && !path.contains(&parent) {
            path.push(parent);
            if close_cycle(parent, start, parents, members, path) {
                return true;
            }
            path.pop();
        }
    }
    false
}

/// Resolves every template of a defaults map against its parents.
pub fn resolve_defaults(defaults: &BTreeMap<String, Tool>) -> Result<BTreeMap<String, Tool>> {
    let graph = Graph::build(defaults.keys().cloned(), |name| {
        defaults
            .get(name)
            .map(|tool| tool.inherit.clone())
            .unwrap_or_default()
    })?;

    let mut resolved: BTreeMap<String, Tool> = BTreeMap::new();
    for name in graph.order() {
        let Some(node) = defaults.get(name) else {
            continue;
        };
        let parents: Vec<&Tool> = graph
            .parents(name)
            .iter()
            .filter_map(|parent| resolved.get(parent))
            .collect();
        let merged = node.merge_into(&parents);
        resolved.insert(name.clone(), merged);
    }
    Ok(resolved)
}

/// Merges resolved templates into a tool from the tool list.
///
/// Tools without `inherit` pick up the `default` template when one exists.
pub fn apply_defaults(tool: &Tool, resolved: &BTreeMap<String, Tool>) -> Result<Tool> {
    let names: Vec<String> = if tool.inherit.is_empty() {
        resolved
            .contains_key(DEFAULT_TEMPLATE)
            .then(|| vec![DEFAULT_TEMPLATE.to_string()])
            .unwrap_or_default()
    } else {
        tool.inherit.clone()
    };

    let mut parents = Vec::with_capacity(names.len());
    for name in &names {
        let parent = resolved.get(name).ok_or_else(|| Error::UnknownParent {
            node: tool.name.clone(),
            parent: name.clone(),
        })?;
        parents.push(parent);
    }
    Ok(tool.merge_into(&parents))
}
