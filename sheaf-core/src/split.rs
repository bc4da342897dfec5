//! Chunk splitting optimizer
//!
//! 1. Every entry point and every dynamic import target is a boundary. A
//!    boundary's base chunk holds its static closure minus the modules that
//!    every path leading to it has already loaded.
//! 2. Cache-group policies run in one pass, sorted by descending priority
//!    (declaration order breaks ties), with the generic shared-module policy
//!    last. Each policy claims the unclaimed modules it matches that sit in
//!    at least `minChunks` selected base chunks, subject to `minSize`,
//!    `minRemainingSize` and the request budgets.
//! 3. A base chunk emptied by extraction is dropped and its boundary loads
//!    the extracted chunk instead.
//! 4. The chunk dependency graph is topologically sorted; a cycle fails the build.

use crate::chunk::{Chunk, ChunkGraph, ChunkGroup, ChunkId, ChunkKind, ChunkOrigin};
use crate::error::{BuildError, ConfigError};
use crate::graph::{Module, ModuleGraph, ModuleId};
use crate::resolver::path_to_string;
use crate::rules::ModuleType;
use crate::transform::ArtifactKind;
use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::DiGraph;
use regex::Regex;
use sheaf_config::{ChunkSelection, Mode, ResourceTypeConfig, SplitChunksConfig};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::{debug, info};

/// A compiled cache group
#[derive(Debug)]
pub struct CachePolicy {
    pub key: String,
    pub name: Option<String>,
    test: Option<Regex>,
    resource_type: Option<ResourceTypeConfig>,
    chunks: ChunkSelection,
    min_chunks: usize,
    min_size: u64,
    max_async_requests: usize,
    max_initial_requests: usize,
    pub priority: i32,
    enforce: bool,
    reuse_existing_chunk: bool,
}

impl CachePolicy {
    fn selects(&self, initial: bool) -> bool {
        match self.chunks {
            ChunkSelection::All => true,
            ChunkSelection::Initial => initial,
            ChunkSelection::Async => !initial,
        }
    }

    fn matches(&self, module: &Module) -> bool {
        if let Some(test) = &self.test {
            if !test.is_match(&path_to_string(&module.path)) {
                return false;
            }
        }
        match self.resource_type {
            None => true,
            Some(ResourceTypeConfig::Style) => module.is_style(),
            Some(ResourceTypeConfig::Javascript) => {
                module.artifact.kind == ArtifactKind::Script && !module.module_type.is_resource()
            }
            Some(ResourceTypeConfig::Raw) => module.module_type == ModuleType::Raw,
            Some(_) => matches!(module.module_type, ModuleType::Asset { .. }),
        }
    }

    fn request_limit(&self, initial: bool) -> usize {
        if initial {
            self.max_initial_requests
        } else {
            self.max_async_requests
        }
    }
}

#[derive(Debug)]
pub struct SplitChunksOptimizer {
    /// Evaluation order
    policies: Vec<CachePolicy>,
    min_remaining_size: u64,
    enforce_size_threshold: u64,
}

impl SplitChunksOptimizer {
    pub fn new(config: &SplitChunksConfig, mode: Mode) -> Result<Self, ConfigError> {
        let prefix = "optimization.splitChunks";
        let positive = |value: usize, option: String| {
            if value == 0 {
                Err(ConfigError::ZeroLimit { option })
            } else {
                Ok(value)
            }
        };
        positive(config.min_chunks, format!("{}.minChunks", prefix))?;
        positive(config.max_async_requests, format!("{}.maxAsyncRequests", prefix))?;
        positive(config.max_initial_requests, format!("{}.maxInitialRequests", prefix))?;

        let min_size = config.min_size_for(mode);
        let mut groups = config.cache_groups.clone();
        if config.default_vendors && !groups.iter().any(|g| g.key == "defaultVendors") {
            groups.push(SplitChunksConfig::default_vendors_group());
        }

        let mut seen = HashSet::new();
        let mut policies = Vec::with_capacity(groups.len() + 1);
        for group in &groups {
            if !seen.insert(group.key.clone()) {
                return Err(ConfigError::DuplicateCacheGroup {
                    key: group.key.clone(),
                });
            }
            let option = format!("{}.cacheGroups.{}", prefix, group.key);
            let test = group
                .test
                .as_deref()
                .map(Regex::new)
                .transpose()
                .map_err(|e| ConfigError::InvalidPattern {
                    option: format!("{}.test", option),
                    message: e.to_string(),
                })?;
            policies.push(CachePolicy {
                key: group.key.clone(),
                name: group.name.clone(),
                test,
                resource_type: group.resource_type,
                chunks: group.chunks.unwrap_or(config.chunks),
                min_chunks: positive(
                    group.min_chunks.unwrap_or(config.min_chunks),
                    format!("{}.minChunks", option),
                )?,
                min_size: group.min_size.unwrap_or(min_size),
                max_async_requests: positive(
                    group.max_async_requests.unwrap_or(config.max_async_requests),
                    format!("{}.maxAsyncRequests", option),
                )?,
                max_initial_requests: positive(
                    group.max_initial_requests.unwrap_or(config.max_initial_requests),
                    format!("{}.maxInitialRequests", option),
                )?,
                priority: group.priority,
                enforce: group.enforce,
                reuse_existing_chunk: group.reuse_existing_chunk,
            });
        }
        // Stable sort keeps declaration order among equal priorities.
        policies.sort_by_key(|policy| Reverse(policy.priority));

        if config.default_group {
            policies.push(CachePolicy {
                key: "default".to_string(),
                name: None,
                test: None,
                resource_type: None,
                chunks: config.chunks,
                min_chunks: config.min_chunks,
                min_size,
                max_async_requests: config.max_async_requests,
                max_initial_requests: config.max_initial_requests,
                priority: i32::MIN,
                enforce: false,
                reuse_existing_chunk: true,
            });
        }

        Ok(Self {
            policies,
            min_remaining_size: config.min_remaining_size_for(mode),
            enforce_size_threshold: config.enforce_size_threshold,
        })
    }

    /// Policy keys in evaluation order
    pub fn policy_order(&self) -> Vec<&str> {
        self.policies.iter().map(|p| p.key.as_str()).collect()
    }

    /// Partition `graph` into chunks
    pub fn optimize(&self, graph: &ModuleGraph) -> Result<ChunkGraph, BuildError> {
        let mut state = SplitState::new(graph);
        for policy in &self.policies {
            self.apply_policy(&mut state, policy);
        }
        let chunk_graph = state.finish()?;
        info!(
            target: "sheaf::split",
            chunks = chunk_graph.chunks.len(),
            entrypoints = chunk_graph.entrypoints.len(),
            async_groups = chunk_graph.async_groups.len(),
            "Chunks optimized"
        );
        Ok(chunk_graph)
    }

    fn apply_policy(&self, state: &mut SplitState<'_>, policy: &CachePolicy) {
        let mut candidates: Vec<(ModuleId, BTreeSet<usize>)> = Vec::new();
        for module in state.graph.modules() {
            // Entry modules stay in their entry chunk.
            if module.is_entry || state.claimed.contains(&module.id) || !policy.matches(module) {
                continue;
            }
            let users: BTreeSet<usize> = state
                .boundaries
                .iter()
                .enumerate()
                .filter(|(_, b)| policy.selects(b.initial))
                .filter(|(_, b)| {
                    b.base
                        .is_some_and(|base| state.chunks[base].modules.contains(&module.id))
                })
                .map(|(index, _)| index)
                .collect();
            if users.len() >= policy.min_chunks {
                candidates.push((module.id, users));
            }
        }
        if candidates.is_empty() {
            return;
        }

        let buckets: Vec<Vec<(ModuleId, BTreeSet<usize>)>> = if policy.name.is_some() {
            vec![candidates]
        } else {
            let mut by_users: BTreeMap<BTreeSet<usize>, Vec<(ModuleId, BTreeSet<usize>)>> =
                BTreeMap::new();
            for (module, users) in candidates {
                by_users
                    .entry(users.clone())
                    .or_default()
                    .push((module, users));
            }
            let mut buckets: Vec<_> = by_users.into_iter().collect();
            buckets.sort_by(|(users_a, mods_a), (users_b, mods_b)| {
                users_b
                    .len()
                    .cmp(&users_a.len())
                    .then_with(|| state.size_of(mods_b).cmp(&state.size_of(mods_a)))
                    .then_with(|| users_a.cmp(users_b))
            });
            buckets.into_iter().map(|(_, modules)| modules).collect()
        };

        for bucket in buckets {
            if let Some(extraction) = self.evaluate(state, policy, bucket) {
                state.apply(policy, extraction);
            }
        }
    }

    /// Check thresholds and budgets; returns the modules and users that
    /// can actually be extracted
    fn evaluate(
        &self,
        state: &SplitState<'_>,
        policy: &CachePolicy,
        mut bucket: Vec<(ModuleId, BTreeSet<usize>)>,
    ) -> Option<Vec<(ModuleId, BTreeSet<usize>)>> {
        let size = state.size_of(&bucket);
        if !policy.enforce && size < policy.min_size {
            debug!(target: "sheaf::split", group = %policy.key, size, min_size = policy.min_size, "Candidate below minSize");
            return None;
        }
        if policy.enforce || size >= self.enforce_size_threshold {
            return Some(bucket);
        }

        // Boundaries already at their request budget keep their copy.
        let users = union_users(&bucket);
        let allowed: BTreeSet<usize> = users
            .iter()
            .copied()
            .filter(|&b| {
                let boundary = &state.boundaries[b];
                state.requests(b) < policy.request_limit(boundary.initial)
            })
            .collect();
        if allowed != users {
            debug!(target: "sheaf::split", group = %policy.key, dropped = users.len() - allowed.len(), "Request budget reached");
            bucket = bucket
                .into_iter()
                .filter_map(|(module, users)| {
                    let users: BTreeSet<usize> = users.intersection(&allowed).copied().collect();
                    (users.len() >= policy.min_chunks).then_some((module, users))
                })
                .collect();
            if bucket.is_empty() || state.size_of(&bucket) < policy.min_size {
                return None;
            }
        }

        for b in union_users(&bucket) {
            let Some(base) = state.boundaries[b].base else {
                continue;
            };
            let removed: u64 = bucket
                .iter()
                .filter(|(_, users)| users.contains(&b))
                .map(|(module, _)| state.graph.get(*module).size)
                .sum();
            let residual = state.chunk_size(base).saturating_sub(removed);
            if residual > 0 && residual < self.min_remaining_size {
                debug!(
                    target: "sheaf::split",
                    group = %policy.key,
                    chunk = %state.chunks[base].name,
                    residual,
                    "Extraction would leave a residual below minRemainingSize"
                );
                return None;
            }
        }
        Some(bucket)
    }
}

fn union_users(bucket: &[(ModuleId, BTreeSet<usize>)]) -> BTreeSet<usize> {
    bucket.iter().flat_map(|(_, users)| users.iter().copied()).collect()
}

struct Boundary {
    name: String,
    root: ModuleId,
    initial: bool,
    base: Option<usize>,
    /// Extracted chunks this boundary loads before its base chunk
    loads: Vec<usize>,
}

struct WorkChunk {
    name: String,
    origin: ChunkOrigin,
    modules: BTreeSet<ModuleId>,
    deps: Vec<usize>,
    alive: bool,
}

struct SplitState<'g> {
    graph: &'g ModuleGraph,
    boundaries: Vec<Boundary>,
    chunks: Vec<WorkChunk>,
    claimed: BTreeSet<ModuleId>,
    names: BTreeSet<String>,
}

impl<'g> SplitState<'g> {
    fn new(graph: &'g ModuleGraph) -> Self {
        let mut state = Self {
            graph,
            boundaries: Vec::new(),
            chunks: Vec::new(),
            claimed: BTreeSet::new(),
            names: BTreeSet::new(),
        };

        for (name, root) in graph.entries() {
            let name = state.unique_name(name);
            state.boundaries.push(Boundary {
                name,
                root: *root,
                initial: true,
                base: None,
                loads: Vec::new(),
            });
        }
        for root in graph.dynamic_targets() {
            let stem = graph
                .get(root)
                .path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "async".to_string());
            let name = state.unique_name(&stem);
            state.boundaries.push(Boundary {
                name,
                root,
                initial: false,
                base: None,
                loads: Vec::new(),
            });
        }

        let members = state.members();
        for (index, modules) in members.into_iter().enumerate() {
            if modules.is_empty() {
                continue;
            }
            let boundary = &state.boundaries[index];
            let origin = if boundary.initial {
                ChunkOrigin::Entry {
                    name: boundary.name.clone(),
                }
            } else {
                ChunkOrigin::Async {
                    root: boundary.root,
                }
            };
            state.chunks.push(WorkChunk {
                name: boundary.name.clone(),
                origin,
                modules,
                deps: Vec::new(),
                alive: true,
            });
            state.boundaries[index].base = Some(state.chunks.len() - 1);
        }
        state
    }

    /// Static closure of each boundary minus the modules already available
    /// on every path that reaches it
    fn members(&self) -> Vec<BTreeSet<ModuleId>> {
        let closures: Vec<BTreeSet<ModuleId>> = self
            .boundaries
            .iter()
            .map(|b| self.graph.static_closure(b.root))
            .collect();

        let parents: Vec<Vec<usize>> = self
            .boundaries
            .iter()
            .map(|b| {
                if b.initial {
                    return Vec::new();
                }
                closures
                    .iter()
                    .enumerate()
                    .filter(|(_, closure)| {
                        closure.iter().any(|&m| {
                            self.graph.get(m).dynamic_dependencies().any(|t| t == b.root)
                        })
                    })
                    .map(|(index, _)| index)
                    .collect()
            })
            .collect();

        // `None` means "not yet known" (the universal set).
        let mut available: Vec<Option<BTreeSet<ModuleId>>> = self
            .boundaries
            .iter()
            .map(|b| b.initial.then(BTreeSet::new))
            .collect();
        loop {
            let mut changed = false;
            for index in 0..self.boundaries.len() {
                if self.boundaries[index].initial {
                    continue;
                }
                let mut acc: Option<BTreeSet<ModuleId>> = None;
                for &parent in &parents[index] {
                    let Some(parent_available) = &available[parent] else {
                        continue;
                    };
                    let loaded: BTreeSet<ModuleId> =
                        parent_available.union(&closures[parent]).copied().collect();
                    acc = Some(match acc {
                        None => loaded,
                        Some(acc) => acc.intersection(&loaded).copied().collect(),
                    });
                }
                if let Some(next) = acc {
                    if available[index].as_ref() != Some(&next) {
                        available[index] = Some(next);
                        changed = true;
                    }
                }
            }
            if !changed {
                break;
            }
        }

        closures
            .into_iter()
            .zip(available)
            .map(|(closure, available)| match available {
                Some(available) => closure.difference(&available).copied().collect(),
                None => closure,
            })
            .collect()
    }

    fn unique_name(&mut self, base: &str) -> String {
        let mut name = base.to_string();
        let mut suffix = 1;
        while self.names.contains(&name) {
            name = format!("{}-{}", base, suffix);
            suffix += 1;
        }
        self.names.insert(name.clone());
        name
    }

    fn size_of(&self, bucket: &[(ModuleId, BTreeSet<usize>)]) -> u64 {
        bucket.iter().map(|(m, _)| self.graph.get(*m).size).sum()
    }

    fn chunk_size(&self, chunk: usize) -> u64 {
        self.chunks[chunk]
            .modules
            .iter()
            .map(|&m| self.graph.get(m).size)
            .sum()
    }

    /// Number of chunks boundary `b` currently loads
    fn requests(&self, b: usize) -> usize {
        let boundary = &self.boundaries[b];
        boundary.loads.len() + usize::from(boundary.base.is_some())
    }

    fn apply(&mut self, policy: &CachePolicy, bucket: Vec<(ModuleId, BTreeSet<usize>)>) {
        let modules: BTreeSet<ModuleId> = bucket.iter().map(|(m, _)| *m).collect();
        let users = union_users(&bucket);

        let reusable = if policy.reuse_existing_chunk {
            users
                .iter()
                .filter_map(|&b| self.boundaries[b].base)
                .find(|&base| self.chunks[base].modules == modules)
        } else {
            None
        };

        let target = match reusable {
            Some(base) => base,
            None => {
                let existing = policy.name.as_ref().and_then(|name| {
                    self.chunks.iter().position(|chunk| {
                        chunk.alive
                            && chunk.name == *name
                            && matches!(chunk.origin, ChunkOrigin::Split { .. })
                    })
                });
                match existing {
                    Some(index) => index,
                    None => {
                        let base_name = match &policy.name {
                            Some(name) => name.clone(),
                            None => {
                                let joined: Vec<&str> = users
                                    .iter()
                                    .map(|&b| self.boundaries[b].name.as_str())
                                    .collect();
                                format!("{}~{}", policy.key, joined.join("~"))
                            }
                        };
                        let name = self.unique_name(&base_name);
                        self.chunks.push(WorkChunk {
                            name,
                            origin: ChunkOrigin::Split {
                                group: policy.key.clone(),
                            },
                            modules: BTreeSet::new(),
                            deps: Vec::new(),
                            alive: true,
                        });
                        self.chunks.len() - 1
                    }
                }
            }
        };

        self.chunks[target].modules.extend(modules.iter().copied());
        for (module, module_users) in &bucket {
            for &b in module_users {
                if let Some(base) = self.boundaries[b].base.filter(|&base| base != target) {
                    self.chunks[base].modules.remove(module);
                }
            }
        }

        // A reused base chunk becomes a shared chunk of its former boundary.
        for boundary in self.boundaries.iter_mut() {
            if boundary.base == Some(target) {
                boundary.base = None;
                self.chunks[target].deps = boundary.loads.clone();
                boundary.loads.push(target);
            }
        }

        for &b in &users {
            self.add_load(b, target);
        }

        for &b in &users {
            if let Some(base) = self.boundaries[b].base {
                if self.chunks[base].modules.is_empty() {
                    debug!(target: "sheaf::split", chunk = %self.chunks[base].name, "Base chunk absorbed");
                    self.chunks[base].alive = false;
                    self.boundaries[b].base = None;
                }
            }
        }

        debug!(
            target: "sheaf::split",
            group = %policy.key,
            chunk = %self.chunks[target].name,
            modules = modules.len(),
            users = users.len(),
            reused = reusable.is_some(),
            "Modules extracted"
        );
        self.claimed.extend(modules);
    }

    /// Add `chunk` (after its own dependencies) to boundary `b`'s loads
    fn add_load(&mut self, b: usize, chunk: usize) {
        if self.boundaries[b].loads.contains(&chunk) || self.boundaries[b].base == Some(chunk) {
            return;
        }
        for dep in self.chunks[chunk].deps.clone() {
            self.add_load(b, dep);
        }
        self.boundaries[b].loads.push(chunk);
    }

    fn finish(mut self) -> Result<ChunkGraph, BuildError> {
        for boundary in &self.boundaries {
            if let Some(base) = boundary.base {
                self.chunks[base].deps = boundary.loads.clone();
            }
        }

        let mut ids: BTreeMap<usize, ChunkId> = BTreeMap::new();
        for (index, chunk) in self.chunks.iter().enumerate() {
            if chunk.alive && !chunk.modules.is_empty() {
                ids.insert(index, ChunkId(ids.len() as u32));
            }
        }

        let group_of = |boundary: &Boundary| -> Vec<ChunkId> {
            boundary
                .loads
                .iter()
                .chain(boundary.base.iter())
                .filter_map(|index| ids.get(index).copied())
                .collect()
        };
        let mut initial_chunks = BTreeSet::new();
        let mut entrypoints = Vec::new();
        let mut async_groups = Vec::new();
        for boundary in &self.boundaries {
            let group = ChunkGroup {
                name: boundary.name.clone(),
                root: boundary.root,
                initial: boundary.initial,
                chunks: group_of(boundary),
            };
            if boundary.initial {
                initial_chunks.extend(group.chunks.iter().copied());
                entrypoints.push(group);
            } else {
                async_groups.push(group);
            }
        }

        let chunks: Vec<Chunk> = ids
            .iter()
            .map(|(&index, &id)| {
                let work = &self.chunks[index];
                Chunk {
                    id,
                    name: work.name.clone(),
                    kind: if initial_chunks.contains(&id) {
                        ChunkKind::Initial
                    } else {
                        ChunkKind::Async
                    },
                    origin: work.origin.clone(),
                    size: work.modules.iter().map(|&m| self.graph.get(m).size).sum(),
                    modules: work.modules.clone(),
                    dependencies: work
                        .deps
                        .iter()
                        .filter_map(|dep| ids.get(dep).copied())
                        .collect(),
                }
            })
            .collect();

        let load_order = load_order(&chunks)?;
        Ok(ChunkGraph {
            chunks,
            entrypoints,
            async_groups,
            load_order,
        })
    }
}

/// Topological order of the chunk dependency graph
pub(crate) fn load_order(chunks: &[Chunk]) -> Result<Vec<ChunkId>, BuildError> {
    let mut graph: DiGraph<ChunkId, ()> = DiGraph::with_capacity(chunks.len(), 0);
    let nodes: Vec<_> = chunks.iter().map(|chunk| graph.add_node(chunk.id)).collect();
    for chunk in chunks {
        for dep in &chunk.dependencies {
            graph.add_edge(nodes[dep.index()], nodes[chunk.id.index()], ());
        }
    }

    match toposort(&graph, None) {
        Ok(order) => Ok(order.into_iter().map(|node| graph[node]).collect()),
        Err(cycle) => {
            let member = cycle.node_id();
            let names = tarjan_scc(&graph)
                .into_iter()
                .find(|scc| scc.contains(&member))
                .unwrap_or_else(|| vec![member])
                .into_iter()
                .map(|node| chunks[graph[node].index()].name.clone())
                .collect();
            Err(BuildError::ChunkGraphCycle { cycle: names })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Dependency, ModuleKind};
    use crate::scanner::ImportKind;
    use crate::transform::Artifact;
    use sheaf_config::CacheGroupConfig;
    use std::path::PathBuf;

    struct Fixture {
        graph: ModuleGraph,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                graph: ModuleGraph::new(),
            }
        }

        fn module(&mut self, path: &str, size: usize) -> ModuleId {
            let key = format!(".{}", path);
            self.graph
                .insert_with(&key, |id| {
                    let mut module =
                        Module::pending(id, key.clone(), PathBuf::from(path), None, ModuleKind::Source);
                    module.artifact = Artifact::script(vec![b'x'; size]);
                    module.size = size as u64;
                    module
                })
                .0
        }

        fn style(&mut self, path: &str, size: usize) -> ModuleId {
            let id = self.module(path, size);
            let module = self.graph.get_mut(id);
            module.module_type = ModuleType::Style;
            module.artifact = Artifact::style(vec![b'x'; size]);
            id
        }

        fn import(&mut self, from: ModuleId, to: ModuleId, kind: ImportKind) {
            self.graph.add_dependency(
                from,
                Dependency {
                    specifier: format!("./{}", to.0),
                    target: to,
                    kind,
                },
            );
        }

        fn entry(&mut self, name: &str, id: ModuleId) {
            self.graph.add_entry(name, id);
        }
    }

    fn config() -> SplitChunksConfig {
        SplitChunksConfig {
            min_size: Some(0),
            min_remaining_size: Some(0),
            default_vendors: false,
            ..SplitChunksConfig::default()
        }
    }

    fn optimize(fixture: &Fixture, config: &SplitChunksConfig) -> ChunkGraph {
        SplitChunksOptimizer::new(config, Mode::Production)
            .unwrap()
            .optimize(&fixture.graph)
            .unwrap()
    }

    fn module_names(fixture: &Fixture, chunk: &Chunk) -> Vec<String> {
        chunk
            .modules
            .iter()
            .map(|&m| fixture.graph.get(m).key.clone())
            .collect()
    }

    #[test]
    fn test_async_boundary_gets_its_own_chunk() {
        let mut f = Fixture::new();
        let main = f.module("/main.js", 100);
        let lazy = f.module("/lazy.js", 100);
        let helper = f.module("/helper.js", 100);
        f.import(main, helper, ImportKind::Static);
        f.import(main, lazy, ImportKind::Dynamic);
        f.import(lazy, helper, ImportKind::Static);
        f.entry("main", main);

        let chunks = optimize(&f, &config());
        let main_chunk = chunks.by_name("main").unwrap();
        assert_eq!(module_names(&f, main_chunk), vec!["./main.js", "./helper.js"]);
        assert_eq!(main_chunk.kind, ChunkKind::Initial);

        // helper is already loaded by the parent, so the async chunk only holds lazy.
        let lazy_chunk = chunks.by_name("lazy").unwrap();
        assert_eq!(module_names(&f, lazy_chunk), vec!["./lazy.js"]);
        assert_eq!(lazy_chunk.kind, ChunkKind::Async);
        assert_eq!(chunks.async_group(lazy).unwrap().chunks, vec![lazy_chunk.id]);
    }

    #[test]
    fn test_shared_module_extracted_with_min_chunks() {
        let mut f = Fixture::new();
        let a = f.module("/a.js", 10);
        let b = f.module("/b.js", 10);
        let shared = f.module("/shared.js", 500);
        f.import(a, shared, ImportKind::Static);
        f.import(b, shared, ImportKind::Static);
        f.entry("a", a);
        f.entry("b", b);

        let chunks = optimize(&f, &config());
        let split = chunks.by_name("default~a~b").unwrap();
        assert_eq!(module_names(&f, split), vec!["./shared.js"]);
        assert_eq!(split.kind, ChunkKind::Initial);
        assert_eq!(chunks.chunks_of(shared), vec![split.id]);

        let a_group = chunks.entrypoint("a").unwrap();
        assert_eq!(a_group.chunks, vec![split.id, chunks.by_name("a").unwrap().id]);
        assert_eq!(chunks.by_name("a").unwrap().dependencies, vec![split.id]);
    }

    #[test]
    fn test_min_size_keeps_small_modules_duplicated() {
        let mut f = Fixture::new();
        let a = f.module("/a.js", 10);
        let b = f.module("/b.js", 10);
        let shared = f.module("/shared.js", 500);
        f.import(a, shared, ImportKind::Static);
        f.import(b, shared, ImportKind::Static);
        f.entry("a", a);
        f.entry("b", b);

        let config = SplitChunksConfig {
            min_size: Some(1000),
            ..config()
        };
        let chunks = optimize(&f, &config);
        assert_eq!(chunks.chunks.len(), 2);
        assert_eq!(chunks.chunks_of(shared).len(), 2);
    }

    #[test]
    fn test_min_remaining_size_blocks_tiny_residual() {
        let mut f = Fixture::new();
        let a = f.module("/a.js", 10);
        let b = f.module("/b.js", 5000);
        let shared = f.module("/shared.js", 5000);
        f.import(a, shared, ImportKind::Static);
        f.import(b, shared, ImportKind::Static);
        f.entry("a", a);
        f.entry("b", b);

        let config = SplitChunksConfig {
            min_remaining_size: Some(100),
            ..config()
        };
        let chunks = optimize(&f, &config);
        // Extracting would leave chunk `a` with 10 bytes.
        assert!(chunks.by_name("default~a~b").is_none());
        assert_eq!(chunks.chunks_of(shared).len(), 2);
    }

    #[test]
    fn test_request_budget_keeps_module_in_place() {
        let mut f = Fixture::new();
        let a = f.module("/a.js", 10);
        let b = f.module("/b.js", 10);
        let shared = f.module("/shared.js", 500);
        f.import(a, shared, ImportKind::Static);
        f.import(b, shared, ImportKind::Static);
        f.entry("a", a);
        f.entry("b", b);

        let config = SplitChunksConfig {
            max_initial_requests: 1,
            ..config()
        };
        let chunks = optimize(&f, &config);
        assert_eq!(chunks.chunks.len(), 2);
        assert!(chunks
            .entrypoints
            .iter()
            .all(|group| group.chunks.len() <= 1));
    }

    #[test]
    fn test_cache_group_priority_and_enforce() {
        let mut f = Fixture::new();
        let main = f.module("/src/main.js", 100);
        let vue = f.module("/node_modules/vue/vue.js", 300);
        let css = f.style("/src/app.css", 5);
        f.import(main, vue, ImportKind::Static);
        f.import(main, css, ImportKind::Static);
        f.entry("main", main);

        let mut config = config();
        config.min_size = Some(20_000);
        config.cache_groups = vec![
            CacheGroupConfig {
                key: "vendors".to_string(),
                name: Some("chunk-vendors".to_string()),
                test: Some(r"[\\/]node_modules[\\/]".to_string()),
                min_chunks: Some(1),
                priority: 2,
                enforce: true,
                ..CacheGroupConfig::default()
            },
            CacheGroupConfig {
                key: "styles".to_string(),
                name: Some("styles".to_string()),
                resource_type: Some(ResourceTypeConfig::Style),
                min_chunks: Some(1),
                priority: 10,
                enforce: true,
                ..CacheGroupConfig::default()
            },
        ];

        let optimizer = SplitChunksOptimizer::new(&config, Mode::Production).unwrap();
        assert_eq!(optimizer.policy_order(), vec!["styles", "vendors", "default"]);

        let chunks = optimizer.optimize(&f.graph).unwrap();
        assert_eq!(module_names(&f, chunks.by_name("chunk-vendors").unwrap()), vec!["./node_modules/vue/vue.js"]);
        assert_eq!(module_names(&f, chunks.by_name("styles").unwrap()), vec!["./src/app.css"]);
        assert_eq!(module_names(&f, chunks.by_name("main").unwrap()), vec!["./src/main.js"]);

        let group = chunks.entrypoint("main").unwrap();
        let names: Vec<&str> = group.chunks.iter().map(|&id| chunks.chunk(id).name.as_str()).collect();
        assert_eq!(names, vec!["styles", "chunk-vendors", "main"]);
    }

    #[test]
    fn test_same_priority_first_declared_wins() {
        let mut f = Fixture::new();
        let main = f.module("/src/main.js", 100);
        let lib = f.module("/node_modules/lib/index.js", 300);
        f.import(main, lib, ImportKind::Static);
        f.entry("main", main);

        let group = |key: &str| CacheGroupConfig {
            key: key.to_string(),
            name: Some(key.to_string()),
            test: Some("node_modules".to_string()),
            min_chunks: Some(1),
            enforce: true,
            ..CacheGroupConfig::default()
        };
        let mut config = config();
        config.cache_groups = vec![group("first"), group("second")];

        let chunks = optimize(&f, &config);
        assert!(chunks.by_name("first").is_some());
        assert!(chunks.by_name("second").is_none());
    }

    #[test]
    fn test_reuse_existing_async_chunk() {
        // main -> a, b; b -(dynamic)-> c; other -> c
        let mut f = Fixture::new();
        let main = f.module("/main.js", 50);
        let a = f.module("/a.js", 50);
        let b = f.module("/b.js", 50);
        let c = f.module("/c.js", 50);
        let other = f.module("/other.js", 50);
        f.import(main, a, ImportKind::Static);
        f.import(main, b, ImportKind::Static);
        f.import(b, c, ImportKind::Dynamic);
        f.import(other, c, ImportKind::Static);
        f.entry("main", main);
        f.entry("other", other);

        let chunks = optimize(&f, &config());
        let c_chunks = chunks.chunks_of(c);
        assert_eq!(c_chunks.len(), 1);
        let shared = chunks.chunk(c_chunks[0]);
        assert_eq!(module_names(&f, shared), vec!["./c.js"]);

        assert_eq!(chunks.async_group(c).unwrap().chunks, vec![shared.id]);
        assert!(chunks.entrypoint("other").unwrap().chunks.contains(&shared.id));
        assert!(!chunks.entrypoint("main").unwrap().chunks.contains(&shared.id));
    }

    #[test]
    fn test_chunks_selection_async_only() {
        let mut f = Fixture::new();
        let a = f.module("/a.js", 10);
        let b = f.module("/b.js", 10);
        let shared = f.module("/shared.js", 500);
        f.import(a, shared, ImportKind::Static);
        f.import(b, shared, ImportKind::Static);
        f.entry("a", a);
        f.entry("b", b);

        let config = SplitChunksConfig {
            chunks: ChunkSelection::Async,
            ..config()
        };
        let chunks = optimize(&f, &config);
        assert_eq!(chunks.chunks_of(shared).len(), 2);
    }

    #[test]
    fn test_validation_errors() {
        let zero = SplitChunksConfig {
            min_chunks: 0,
            ..config()
        };
        assert!(matches!(
            SplitChunksOptimizer::new(&zero, Mode::Production),
            Err(ConfigError::ZeroLimit { .. })
        ));

        let mut duplicate = config();
        duplicate.cache_groups = vec![
            CacheGroupConfig {
                key: "x".to_string(),
                ..CacheGroupConfig::default()
            },
            CacheGroupConfig {
                key: "x".to_string(),
                ..CacheGroupConfig::default()
            },
        ];
        assert_eq!(
            SplitChunksOptimizer::new(&duplicate, Mode::Production).unwrap_err(),
            ConfigError::DuplicateCacheGroup {
                key: "x".to_string()
            }
        );

        let mut bad_regex = config();
        bad_regex.cache_groups = vec![CacheGroupConfig {
            key: "x".to_string(),
            test: Some("[".to_string()),
            ..CacheGroupConfig::default()
        }];
        assert!(matches!(
            SplitChunksOptimizer::new(&bad_regex, Mode::Production),
            Err(ConfigError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_load_order_detects_cycles() {
        let chunk = |id: u32, name: &str, deps: Vec<u32>| Chunk {
            id: ChunkId(id),
            name: name.to_string(),
            kind: ChunkKind::Initial,
            origin: ChunkOrigin::Split {
                group: "test".to_string(),
            },
            modules: BTreeSet::new(),
            size: 0,
            dependencies: deps.into_iter().map(ChunkId).collect(),
        };

        let ordered = load_order(&[chunk(0, "a", vec![1]), chunk(1, "b", vec![])]).unwrap();
        assert_eq!(ordered, vec![ChunkId(1), ChunkId(0)]);

        let err = load_order(&[chunk(0, "a", vec![1]), chunk(1, "b", vec![0])]).unwrap_err();
        match err {
            BuildError::ChunkGraphCycle { mut cycle } => {
                cycle.sort();
                assert_eq!(cycle, vec!["a".to_string(), "b".to_string()]);
            }
            other => panic!("unexpected: {other}"),
        }
    }
}
