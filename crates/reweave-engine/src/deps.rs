//! Supertype graph for batch validation
//!
//! Built per batch from the declared supertype/interface edges of every
//! known unit, with the batch's new images overriding the stored ones.
//! A redefinition batch commits only if this graph stays acyclic.

use rustc_hash::{FxHashMap, FxHashSet};

/// Directed graph of declared type relationships
#[derive(Debug, Default)]
pub struct TypeGraph {
    /// Adjacency list: unit name -> names it declares as supertypes
    edges: FxHashMap<String, Vec<String>>,
}

impl TypeGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a unit with no declared supertypes
    pub fn add_unit(&mut self, unit: impl Into<String>) {
        self.edges.entry(unit.into()).or_default();
    }

    /// Record that `unit` declares `supertype` above it
    pub fn add_edge(&mut self, unit: impl Into<String>, supertype: impl Into<String>) {
        let supertype = supertype.into();
        self.edges.entry(unit.into()).or_default().push(supertype.clone());
        self.edges.entry(supertype).or_default();
    }

    /// Replace all edges of `unit` with the given supertypes
    pub fn set_edges<I, S>(&mut self, unit: impl Into<String>, supertypes: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let unit = unit.into();
        self.edges.insert(unit.clone(), Vec::new());
        for supertype in supertypes {
            self.add_edge(unit.clone(), supertype);
        }
    }

    /// Find a cycle, if any, as the path of unit names closing it
    /// (e.g. `["a", "b", "a"]`)
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let mut visited = FxHashSet::default();
        let mut on_stack = FxHashSet::default();
        let mut path = Vec::new();

        let mut roots: Vec<&String> = self.edges.keys().collect();
        roots.sort(); // deterministic traversal, so error paths are stable

        for unit in roots {
            if !visited.contains(unit.as_str()) {
                if let Some(cycle) = self.dfs(unit, &mut visited, &mut on_stack, &mut path) {
                    return Some(cycle);
                }
            }
        }
        None
    }

    fn dfs<'a>(
        &'a self,
        node: &'a str,
        visited: &mut FxHashSet<&'a str>,
        on_stack: &mut FxHashSet<&'a str>,
        path: &mut Vec<&'a str>,
    ) -> Option<Vec<String>> {
        visited.insert(node);
        on_stack.insert(node);
        path.push(node);

        if let Some(supertypes) = self.edges.get(node) {
            for supertype in supertypes {
                if !visited.contains(supertype.as_str()) {
                    if let Some(cycle) = self.dfs(supertype, visited, on_stack, path) {
                        return Some(cycle);
                    }
                } else if on_stack.contains(supertype.as_str()) {
                    let start = path
                        .iter()
                        .position(|&n| n == supertype)
                        .unwrap_or_default();
                    let mut cycle: Vec<String> =
                        path[start..].iter().map(|s| s.to_string()).collect();
                    cycle.push(supertype.clone());
                    return Some(cycle);
                }
            }
        }

        on_stack.remove(node);
        path.pop();
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acyclic_graph() {
        let mut graph = TypeGraph::new();
        graph.add_edge("app.Handler", "app.Base");
        graph.add_edge("app.Base", "lang.Object");
        assert!(graph.find_cycle().is_none());
    }

    #[test]
    fn test_two_unit_cycle() {
        let mut graph = TypeGraph::new();
        graph.add_edge("a", "b");
        graph.add_edge("b", "a");
        let cycle = graph.find_cycle().unwrap();
        assert!(cycle.len() >= 3);
        assert_eq!(cycle.first(), cycle.last());
    }

    #[test]
    fn test_self_edge() {
        let mut graph = TypeGraph::new();
        graph.add_edge("a", "a");
        assert!(graph.find_cycle().is_some());
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        let mut graph = TypeGraph::new();
        graph.add_edge("a", "b");
        graph.add_edge("a", "c");
        graph.add_edge("b", "d");
        graph.add_edge("c", "d");
        assert!(graph.find_cycle().is_none());
    }

    #[test]
    fn test_set_edges_replaces() {
        let mut graph = TypeGraph::new();
        graph.add_edge("a", "b");
        graph.add_edge("b", "a");
        assert!(graph.find_cycle().is_some());

        // Overriding b's edges breaks the cycle
        graph.set_edges("b", ["lang.Object"]);
        assert!(graph.find_cycle().is_none());
    }
}
