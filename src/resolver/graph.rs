// src/resolver/graph.rs

//! Dependency graph ordering
//!
//! Produces the order in which a set of packages must be processed so that
//! every package comes after the packages it depends on. Dependency cycles
//! are tolerated: the members of a cycle are emitted adjacently (sorted by
//! id) while ordering against everything outside the cycle still holds.
//!
//! The implementation condenses strongly connected components and then runs
//! Kahn's algorithm over the condensation, breaking ties by the smallest
//! member id, so the output is deterministic for a given input.

use std::collections::{BTreeMap, BTreeSet};

/// Directed dependency graph over package ids
#[derive(Debug, Default)]
pub struct DependencyGraph {
    nodes: BTreeSet<String>,
    /// dependent -> set of its dependencies
    edges: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, id: impl Into<String>) {
        self.nodes.insert(id.into());
    }

    /// Record that `dependent` depends on `dependency`
    ///
    /// Edges whose endpoints were never added as nodes are ignored during
    /// ordering, so callers may add every declared dependency and let the
    /// graph restrict itself to the node set.
    pub fn add_edge(&mut self, dependent: impl Into<String>, dependency: impl Into<String>) {
        self.edges
            .entry(dependent.into())
            .or_default()
            .insert(dependency.into());
    }

    /// Dependencies of `id` that are nodes of this graph
    fn dependencies_of<'a>(&'a self, id: &str) -> impl Iterator<Item = &'a String> + 'a {
        self.edges
            .get(id)
            .into_iter()
            .flatten()
            .filter(|dep| self.nodes.contains(*dep))
    }

    /// Order nodes so that dependencies come before their dependents
    pub fn dependency_order(&self) -> Vec<String> {
        let components = self.strongly_connected_components();

        // Index each node by its component
        let mut component_of: BTreeMap<&str, usize> = BTreeMap::new();
        for (index, members) in components.iter().enumerate() {
            for member in members {
                component_of.insert(member, index);
            }
        }

        // Condensation: which components does each component depend on
        let mut pending: Vec<usize> = vec![0; components.len()];
        let mut dependents: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); components.len()];
        for (index, members) in components.iter().enumerate() {
            let mut depends_on = BTreeSet::new();
            for member in members {
                for dep in self.dependencies_of(member) {
                    let dep_component = component_of[dep.as_str()];
                    if dep_component != index {
                        depends_on.insert(dep_component);
                    }
                }
            }
            pending[index] = depends_on.len();
            for dep_component in depends_on {
                dependents[dep_component].insert(index);
            }
        }

        // Kahn over the condensation; ready components ordered by their
        // smallest member id.
        let mut ready: BTreeSet<(&String, usize)> = components
            .iter()
            .enumerate()
            .filter(|(index, _)| pending[*index] == 0)
            .map(|(index, members)| (&members[0], index))
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(&(key, index)) = ready.iter().next() {
            ready.remove(&(key, index));
            order.extend(components[index].iter().cloned());
            for &dependent in &dependents[index] {
                pending[dependent] -= 1;
                if pending[dependent] == 0 {
                    ready.insert((&components[dependent][0], dependent));
                }
            }
        }

        order
    }

    /// Tarjan's algorithm; each returned component is sorted by id
    fn strongly_connected_components(&self) -> Vec<Vec<String>> {
        struct State<'a> {
            graph: &'a DependencyGraph,
            index: usize,
            indices: BTreeMap<&'a str, usize>,
            lowlinks: BTreeMap<&'a str, usize>,
            stack: Vec<&'a str>,
            on_stack: BTreeSet<&'a str>,
            components: Vec<Vec<String>>,
        }

        impl<'a> State<'a> {
            fn visit(&mut self, node: &'a str) {
                self.indices.insert(node, self.index);
                self.lowlinks.insert(node, self.index);
                self.index += 1;
                self.stack.push(node);
                self.on_stack.insert(node);

                let graph = self.graph;
                for dep in graph.dependencies_of(node) {
                    let dep = dep.as_str();
                    if !self.indices.contains_key(dep) {
                        self.visit(dep);
                        let low = self.lowlinks[dep].min(self.lowlinks[node]);
                        self.lowlinks.insert(node, low);
                    } else if self.on_stack.contains(dep) {
                        let low = self.indices[dep].min(self.lowlinks[node]);
                        self.lowlinks.insert(node, low);
                    }
                }

                if self.lowlinks[node] == self.indices[node] {
                    let mut members = Vec::new();
                    while let Some(top) = self.stack.pop() {
                        self.on_stack.remove(top);
                        members.push(top.to_string());
                        if top == node {
                            break;
                        }
                    }
                    members.sort();
                    self.components.push(members);
                }
            }
        }

        let mut state = State {
            graph: self,
            index: 0,
            indices: BTreeMap::new(),
            lowlinks: BTreeMap::new(),
            stack: Vec::new(),
            on_stack: BTreeSet::new(),
            components: Vec::new(),
        };

        for node in &self.nodes {
            if !state.indices.contains_key(node.as_str()) {
                state.visit(node);
            }
        }

        state.components
    }
}
