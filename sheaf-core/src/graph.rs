//! Module graph
//!
//! Modules live in an arena and are referenced by `ModuleId`. A key index
//! (resolved path plus query) guarantees one module per resource. Edges may
//! form cycles, so every traversal here keeps an explicit visited set.

use crate::rules::ModuleType;
use crate::scanner::ImportKind;
use crate::transform::{Artifact, ArtifactKind};
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;

/// Stable handle of a module inside one build's graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModuleId(pub u32);

impl ModuleId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Outgoing edge of a module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    /// Specifier as written in the importer
    pub specifier: String,
    pub target: ModuleId,
    pub kind: ImportKind,
}

/// Where a module's content comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleKind {
    /// A file read through the filesystem collaborator
    Source,
    /// Virtual module holding a side artifact of `owner`'s transform chain
    Side { owner: ModuleId },
    /// Provided at runtime by a global; has no bundled body
    External { global: String },
    /// Replaced by an empty stub
    Ignored,
}

#[derive(Debug, Clone)]
pub struct Module {
    pub id: ModuleId,
    /// Context-relative path plus query; the module's identity in output
    pub key: String,
    pub path: PathBuf,
    pub query: Option<String>,
    pub kind: ModuleKind,
    pub module_type: ModuleType,
    /// Final artifact after the transform chain
    pub artifact: Artifact,
    /// SHA-256 of the final artifact
    pub content_hash: String,
    /// Post-transform size in bytes
    pub size: u64,
    pub is_entry: bool,
    pub dependencies: Vec<Dependency>,
}

impl Module {
    pub(crate) fn pending(
        id: ModuleId,
        key: String,
        path: PathBuf,
        query: Option<String>,
        kind: ModuleKind,
    ) -> Self {
        Self {
            id,
            key,
            path,
            query,
            kind,
            module_type: ModuleType::Javascript,
            artifact: Artifact::script(Vec::new()),
            content_hash: String::new(),
            size: 0,
            is_entry: false,
            dependencies: Vec::new(),
        }
    }

    /// Style modules are collected into a chunk's stylesheet
    pub fn is_style(&self) -> bool {
        self.artifact.kind == ArtifactKind::Style
    }

    pub fn is_external(&self) -> bool {
        matches!(self.kind, ModuleKind::External { .. })
    }

    pub fn static_dependencies(&self) -> impl Iterator<Item = ModuleId> + '_ {
        self.dependencies
            .iter()
            .filter(|dep| dep.kind == ImportKind::Static)
            .map(|dep| dep.target)
    }

    pub fn dynamic_dependencies(&self) -> impl Iterator<Item = ModuleId> + '_ {
        self.dependencies
            .iter()
            .filter(|dep| dep.kind == ImportKind::Dynamic)
            .map(|dep| dep.target)
    }
}

#[derive(Debug, Default)]
pub struct ModuleGraph {
    modules: Vec<Module>,
    index: HashMap<String, ModuleId>,
    entries: Vec<(String, ModuleId)>,
}

impl ModuleGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a module under `key` unless one exists; returns its id and
    /// whether it was newly created
    pub(crate) fn insert_with<F>(&mut self, key: &str, make: F) -> (ModuleId, bool)
    where
        F: FnOnce(ModuleId) -> Module,
    {
        if let Some(&id) = self.index.get(key) {
            return (id, false);
        }
        let id = ModuleId(self.modules.len() as u32);
        self.modules.push(make(id));
        self.index.insert(key.to_string(), id);
        (id, true)
    }

    pub(crate) fn get_mut(&mut self, id: ModuleId) -> &mut Module {
        &mut self.modules[id.index()]
    }

    pub(crate) fn add_entry(&mut self, name: &str, id: ModuleId) {
        self.modules[id.index()].is_entry = true;
        self.entries.push((name.to_string(), id));
    }

    /// Add an edge, skipping exact duplicates
    pub(crate) fn add_dependency(&mut self, from: ModuleId, dependency: Dependency) {
        let deps = &mut self.modules[from.index()].dependencies;
        if !deps.contains(&dependency) {
            deps.push(dependency);
        }
    }

    pub fn get(&self, id: ModuleId) -> &Module {
        &self.modules[id.index()]
    }

    pub fn lookup(&self, key: &str) -> Option<ModuleId> {
        self.index.get(key).copied()
    }

    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// `(entry name, module)` in configuration order
    pub fn entries(&self) -> &[(String, ModuleId)] {
        &self.entries
    }

    /// Modules reachable from `root` through static edges, `root` included
    pub fn static_closure(&self, root: ModuleId) -> BTreeSet<ModuleId> {
        let mut visited = BTreeSet::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            stack.extend(
                self.get(id)
                    .static_dependencies()
                    .filter(|dep| !visited.contains(dep)),
            );
        }
        visited
    }

    /// Targets of dynamic edges, in first-seen order
    pub fn dynamic_targets(&self) -> Vec<ModuleId> {
        let mut seen = BTreeSet::new();
        self.modules
            .iter()
            .flat_map(|module| module.dynamic_dependencies())
            .filter(|target| seen.insert(*target))
            .collect()
    }

    /// Import cycles, each listed in module id order
    pub fn import_cycles(&self) -> Vec<Vec<ModuleId>> {
        let mut graph: DiGraph<ModuleId, ()> = DiGraph::with_capacity(self.len(), 0);
        let nodes: Vec<NodeIndex> = self.modules.iter().map(|m| graph.add_node(m.id)).collect();
        for module in &self.modules {
            for dep in &module.dependencies {
                graph.add_edge(nodes[module.id.index()], nodes[dep.target.index()], ());
            }
        }

        let mut cycles: Vec<Vec<ModuleId>> = tarjan_scc(&graph)
            .into_iter()
            .filter(|scc| {
                scc.len() > 1 || {
                    let id = graph[scc[0]];
                    self.get(id).dependencies.iter().any(|dep| dep.target == id)
                }
            })
            .map(|scc| {
                let mut ids: Vec<ModuleId> = scc.into_iter().map(|node| graph[node]).collect();
                ids.sort();
                ids
            })
            .collect();
        cycles.sort();
        cycles
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph_with(edges: &[(u32, u32, ImportKind)], count: u32) -> ModuleGraph {
        let mut graph = ModuleGraph::new();
        for i in 0..count {
            let key = format!("./m{}.js", i);
            graph.insert_with(&key, |id| {
                Module::pending(id, key.clone(), PathBuf::from(&key), None, ModuleKind::Source)
            });
        }
        for &(from, to, kind) in edges {
            graph.add_dependency(
                ModuleId(from),
                Dependency {
                    specifier: format!("./m{}", to),
                    target: ModuleId(to),
                    kind,
                },
            );
        }
        graph
    }

    #[test]
    fn test_insert_deduplicates_by_key() {
        let mut graph = ModuleGraph::new();
        let make = |id| {
            Module::pending(id, "./a.js".to_string(), PathBuf::from("/p/a.js"), None, ModuleKind::Source)
        };
        let (first, created) = graph.insert_with("./a.js", make);
        assert!(created);
        let (second, created) = graph.insert_with("./a.js", make);
        assert!(!created);
        assert_eq!(first, second);
        assert_eq!(graph.len(), 1);
        assert_eq!(graph.lookup("./a.js"), Some(first));
    }

    #[test]
    fn test_static_closure_stops_at_dynamic_edges_and_cycles() {
        let graph = graph_with(
            &[
                (0, 1, ImportKind::Static),
                (1, 2, ImportKind::Static),
                (2, 1, ImportKind::Static),
                (1, 3, ImportKind::Dynamic),
            ],
            4,
        );
        let closure: Vec<u32> = graph.static_closure(ModuleId(0)).into_iter().map(|m| m.0).collect();
        assert_eq!(closure, vec![0, 1, 2]);
        assert_eq!(graph.dynamic_targets(), vec![ModuleId(3)]);
    }

    #[test]
    fn test_import_cycles() {
        let graph = graph_with(
            &[
                (0, 1, ImportKind::Static),
                (1, 2, ImportKind::Static),
                (2, 1, ImportKind::Dynamic),
                (3, 3, ImportKind::Static),
            ],
            4,
        );
        assert_eq!(
            graph.import_cycles(),
            vec![vec![ModuleId(1), ModuleId(2)], vec![ModuleId(3)]]
        );
    }

    #[test]
    fn test_duplicate_edges_are_ignored() {
        let graph = graph_with(&[(0, 1, ImportKind::Static), (0, 1, ImportKind::Static)], 2);
        assert_eq!(graph.get(ModuleId(0)).dependencies.len(), 1);
    }
}
