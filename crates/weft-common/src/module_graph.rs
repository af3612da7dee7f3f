//! Module graph for a single Weft library.
//!
//! The backend emits one Rust module per IR module and one `init`
//! function per module. The generated crate-level `init` must run module
//! inits after the inits of the modules they import from, so the
//! assembler records intra-library imports here and orders init calls by
//! [`topological_sort`].

use std::collections::VecDeque;
use std::fmt;

use rustc_hash::FxHashMap;

/// A unique identifier for an IR module within one library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleId(pub u32);

/// One IR module as seen by the assembler.
#[derive(Debug)]
pub struct ModuleInfo {
    /// Unique identifier for this module.
    pub id: ModuleId,
    /// Dotted source name, e.g. `"geo.shapes"`.
    pub name: String,
    /// Emitted Rust module path segments, e.g. `["geo", "shapes"]`.
    /// Empty for the library root module.
    pub mod_path: Vec<String>,
    /// Same-library modules this module imports from.
    pub dependencies: Vec<ModuleId>,
}

/// Error returned when intra-library imports form a cycle.
#[derive(Debug, Clone)]
pub struct CycleError {
    /// The module names forming the cycle, e.g. `["a", "b", "a"]`.
    pub cycle_path: Vec<String>,
}

impl fmt::Display for CycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.cycle_path.join(" -> "))
    }
}

impl std::error::Error for CycleError {}

/// A directed graph of one library's modules and their imports.
///
/// Modules are stored in insertion order and identified by [`ModuleId`].
/// Name-based lookup is provided via an internal hash map.
#[derive(Debug, Default)]
pub struct ModuleGraph {
    /// All modules in the graph, indexed by `ModuleId.0`.
    pub modules: Vec<ModuleInfo>,
    name_to_id: FxHashMap<String, ModuleId>,
}

impl ModuleGraph {
    /// Create an empty module graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a module and return its assigned [`ModuleId`].
    pub fn add_module(&mut self, name: String, mod_path: Vec<String>) -> ModuleId {
        let id = ModuleId(self.modules.len() as u32);
        self.name_to_id.insert(name.clone(), id);
        self.modules.push(ModuleInfo {
            id,
            name,
            mod_path,
            dependencies: Vec::new(),
        });
        id
    }

    /// Look up a module by its dotted source name.
    pub fn resolve(&self, name: &str) -> Option<ModuleId> {
        self.name_to_id.get(name).copied()
    }

    /// Record that module `from` imports from module `to`.
    /// Duplicate and self-edges are ignored.
    pub fn add_dependency(&mut self, from: ModuleId, to: ModuleId) {
        if from == to {
            return;
        }
        let deps = &mut self.modules[from.0 as usize].dependencies;
        if !deps.contains(&to) {
            deps.push(to);
        }
    }

    /// Get a reference to a module by its [`ModuleId`].
    pub fn get(&self, id: ModuleId) -> &ModuleInfo {
        &self.modules[id.0 as usize]
    }

    /// Return the number of modules in the graph.
    pub fn module_count(&self) -> usize {
        self.modules.len()
    }
}

/// Topological sort of the module graph using Kahn's algorithm.
///
/// Returns modules in import order: modules with no same-library imports
/// first. Ties break alphabetically by module name so generated init
/// sequences are stable across runs.
///
/// Returns `Err(CycleError)` if the imports contain a cycle.
pub fn topological_sort(graph: &ModuleGraph) -> Result<Vec<ModuleId>, CycleError> {
    let n = graph.modules.len();
    let mut in_degree: Vec<u32> = graph
        .modules
        .iter()
        .map(|m| m.dependencies.len() as u32)
        .collect();

    let mut ready: Vec<ModuleId> = (0..n)
        .filter(|&i| in_degree[i] == 0)
        .map(|i| ModuleId(i as u32))
        .collect();
    ready.sort_by(|a, b| graph.get(*a).name.cmp(&graph.get(*b).name));

    let mut queue = VecDeque::from(ready);
    let mut order = Vec::with_capacity(n);

    while let Some(id) = queue.pop_front() {
        order.push(id);
        let mut newly_ready = Vec::new();
        for (i, module) in graph.modules.iter().enumerate() {
            if in_degree[i] > 0 && module.dependencies.contains(&id) {
                in_degree[i] -= 1;
                if in_degree[i] == 0 {
                    newly_ready.push(ModuleId(i as u32));
                }
            }
        }
        newly_ready.sort_by(|a, b| graph.get(*a).name.cmp(&graph.get(*b).name));
        queue.extend(newly_ready);
    }

    if order.len() == n {
        Ok(order)
    } else {
        Err(CycleError {
            cycle_path: extract_cycle_path(graph, &in_degree),
        })
    }
}

/// Walk dependency edges among unprocessed modules until one repeats,
/// producing a readable cycle path ending with the repeated name.
fn extract_cycle_path(graph: &ModuleGraph, in_degree: &[u32]) -> Vec<String> {
    let start = match (0..graph.modules.len()).find(|&i| in_degree[i] > 0) {
        Some(i) => i,
        None => return Vec::new(),
    };

    let mut path = Vec::new();
    let mut visited = vec![false; graph.modules.len()];
    let mut current = start;

    loop {
        if visited[current] {
            let cycle_start_name = &graph.modules[current].name;
            let cycle_begin = path
                .iter()
                .position(|name: &String| name == cycle_start_name)
                .unwrap_or(0);
            let mut cycle: Vec<String> = path[cycle_begin..].to_vec();
            cycle.push(cycle_start_name.clone());
            return cycle;
        }

        visited[current] = true;
        path.push(graph.modules[current].name.clone());

        let next = graph.modules[current]
            .dependencies
            .iter()
            .find(|dep| in_degree[dep.0 as usize] > 0);

        match next {
            Some(dep) => current = dep.0 as usize,
            None => {
                path.push(graph.modules[current].name.clone());
                return path;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph_of(edges: &[(&str, &str)], names: &[&str]) -> ModuleGraph {
        let mut graph = ModuleGraph::new();
        for name in names {
            let path = name.split('.').map(str::to_string).collect();
            graph.add_module((*name).into(), path);
        }
        for (from, to) in edges {
            let from = graph.resolve(from).unwrap();
            let to = graph.resolve(to).unwrap();
            graph.add_dependency(from, to);
        }
        graph
    }

    #[test]
    fn add_and_resolve() {
        let graph = graph_of(&[], &["geo.shapes", "util"]);
        assert!(graph.resolve("geo.shapes").is_some());
        assert!(graph.resolve("util").is_some());
        assert_eq!(graph.resolve("nope"), None);
        assert_eq!(graph.module_count(), 2);
    }

    #[test]
    fn sort_puts_imports_first() {
        let graph = graph_of(&[("main", "util"), ("main", "geo")], &["main", "util", "geo"]);
        let order = topological_sort(&graph).unwrap();
        let names: Vec<_> = order.iter().map(|id| graph.get(*id).name.as_str()).collect();
        // Dependencies first, alphabetical among ties, entry last.
        assert_eq!(names, vec!["geo", "util", "main"]);
    }

    #[test]
    fn sort_detects_cycles() {
        let graph = graph_of(&[("a", "b"), ("b", "a")], &["a", "b"]);
        let err = topological_sort(&graph).unwrap_err();
        assert_eq!(err.cycle_path.first(), err.cycle_path.last());
        assert!(err.to_string().contains(" -> "));
    }

    #[test]
    fn self_and_duplicate_edges_ignored() {
        let mut graph = graph_of(&[("a", "b")], &["a", "b"]);
        let a = graph.resolve("a").unwrap();
        let b = graph.resolve("b").unwrap();
        graph.add_dependency(a, a);
        graph.add_dependency(a, b);
        assert_eq!(graph.get(a).dependencies, vec![b]);
    }
}
