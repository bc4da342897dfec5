//! Module graph builder
//!
//! Traverses from the entry points in waves. Every module discovered in a
//! wave is read and transformed on the worker pool. The results are then
//! scanned and their imports resolved sequentially in discovery order, so
//! module ids do not depend on thread scheduling. A module's dependents are
//! only linked once its transform has completed.

use crate::error::{BuildError, Warning};
use crate::graph::{Dependency, Module, ModuleGraph, ModuleId, ModuleKind};
use crate::hash::content_hash;
use crate::pipeline::{RunOutcome, TransformRunner};
use crate::resolver::{module_key, path_to_string, Resolution, Resolver};
use crate::rules::{ModuleType, RuleMatcher};
use crate::scanner::{scan, ImportKind, ImportRef};
use crate::transform::Artifact;
use rayon::prelude::*;
use regex::Regex;
use sheaf_vfs::VirtualFileSystem;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// Everything the builder borrows from the bundler session
pub struct GraphBuilder<'a> {
    pub vfs: &'a dyn VirtualFileSystem,
    pub resolver: &'a Resolver,
    pub rules: &'a RuleMatcher,
    pub runner: &'a TransformRunner,
    pub no_parse: &'a [Regex],
    pub pool: &'a rayon::ThreadPool,
}

#[derive(Debug)]
pub struct BuiltGraph {
    pub graph: ModuleGraph,
    pub warnings: Vec<Warning>,
    pub cache_hits: usize,
}

/// Per-module result of the parallel phase
struct Processed {
    id: ModuleId,
    module_type: ModuleType,
    outcome: RunOutcome,
}

impl<'a> GraphBuilder<'a> {
    /// Build the graph reachable from `entries` (`name`, `path` pairs)
    pub fn build(&self, entries: &[(String, String)]) -> Result<BuiltGraph, BuildError> {
        let context = self.resolver.context().to_path_buf();
        let mut graph = ModuleGraph::new();
        let mut warnings = Vec::new();
        let mut cache_hits = 0;
        let mut wave = Vec::new();

        for (name, request) in entries {
            let request = entry_request(request);
            let importer = format!("entry '{}'", name);
            let id = match self.resolver.resolve(&request, &context) {
                Ok(Resolution::File { path, query }) => {
                    let (id, created) = self.insert_source(&mut graph, &context, path, query);
                    if created {
                        wave.push(id);
                    }
                    id
                }
                Ok(_) => {
                    return Err(BuildError::Resolution {
                        importer,
                        specifier: request,
                        tried: Vec::new(),
                    })
                }
                Err(err) => return Err(BuildError::from_resolve(&importer, &request, err)),
            };
            graph.add_entry(name, id);
        }

        let mut round = 0;
        while !wave.is_empty() {
            round += 1;
            debug!(target: "sheaf::graph", round, modules = wave.len(), "Processing wave");

            let tasks: Vec<(ModuleId, PathBuf)> = wave
                .iter()
                .map(|&id| (id, graph.get(id).path.clone()))
                .collect();
            let processed = self.process_wave(&tasks)?;

            let mut next = Vec::new();
            for item in processed {
                if item.outcome.cache_hit {
                    cache_hits += 1;
                }
                self.link(&mut graph, &context, item, &mut next, &mut warnings)?;
            }
            wave = next;
        }

        for cycle in graph.import_cycles() {
            let modules: Vec<String> = cycle.iter().map(|&id| graph.get(id).key.clone()).collect();
            warn!(target: "sheaf::graph", cycle = %modules.join(" -> "), "Import cycle detected");
            warnings.push(Warning::ImportCycle { modules });
        }

        info!(target: "sheaf::graph", modules = graph.len(), entries = graph.entries().len(), "Module graph built");
        Ok(BuiltGraph {
            graph,
            warnings,
            cache_hits,
        })
    }

    /// Read and transform every task on the pool; the first failure cancels
    /// the remaining work and is returned
    fn process_wave(&self, tasks: &[(ModuleId, PathBuf)]) -> Result<Vec<Processed>, BuildError> {
        let cancel = AtomicBool::new(false);
        let first_error: Mutex<Option<BuildError>> = Mutex::new(None);

        let results: Vec<Option<Processed>> = self.pool.install(|| {
            tasks
                .par_iter()
                .map(|(id, path)| {
                    if cancel.load(Ordering::Acquire) {
                        return None;
                    }
                    match self.process(*id, path, &cancel) {
                        Ok(processed) => Some(processed),
                        Err(BuildError::Cancelled) => None,
                        Err(err) => {
                            let mut slot = first_error.lock().unwrap_or_else(|e| e.into_inner());
                            if slot.is_none() {
                                *slot = Some(err);
                            }
                            cancel.store(true, Ordering::Release);
                            None
                        }
                    }
                })
                .collect()
        });

        let failed = first_error.into_inner().unwrap_or_else(|e| e.into_inner());
        if let Some(err) = failed {
            return Err(err);
        }
        results
            .into_iter()
            .map(|item| item.ok_or(BuildError::Cancelled))
            .collect()
    }

    fn process(
        &self,
        id: ModuleId,
        path: &Path,
        cancel: &AtomicBool,
    ) -> Result<Processed, BuildError> {
        let bytes = self.vfs.read_file(path)?;
        let matched = self.rules.match_path(path)?;
        let input = Artifact::new(matched.module_type.source_kind(), bytes);
        let outcome = self
            .runner
            .run_cancellable(&matched.chain, input, path, cancel)?;
        Ok(Processed {
            id,
            module_type: matched.module_type,
            outcome,
        })
    }

    /// Record a processed module, create its side modules and resolve its imports
    fn link(
        &self,
        graph: &mut ModuleGraph,
        context: &Path,
        item: Processed,
        next: &mut Vec<ModuleId>,
        warnings: &mut Vec<Warning>,
    ) -> Result<(), BuildError> {
        let chain_output = item.outcome.output;
        let (key, path, query) = {
            let module = graph.get_mut(item.id);
            module.module_type = item.module_type;
            set_artifact(module, chain_output.output.primary.clone());
            (module.key.clone(), module.path.clone(), module.query.clone())
        };

        for skipped in &chain_output.skipped {
            warnings.push(Warning::OptionalTransformFailed {
                module: key.clone(),
                stage: skipped.stage.clone(),
                message: skipped.message.clone(),
            });
        }

        let from_dir = path.parent().unwrap_or(context).to_path_buf();
        let parse = !graph.get(item.id).module_type.is_resource() && !self.is_no_parse(&path);

        for (index, side) in chain_output.output.side.iter().enumerate() {
            let side_query = match &query {
                Some(q) => format!("{}&side={}", q, index),
                None => format!("side={}", index),
            };
            let side_key = module_key(context, &path, Some(&side_query));
            let (side_id, _) = graph.insert_with(&side_key, |id| {
                let mut module = Module::pending(
                    id,
                    side_key.clone(),
                    path.clone(),
                    Some(side_query.clone()),
                    ModuleKind::Side { owner: item.id },
                );
                module.module_type = ModuleType::for_side_artifact(side.kind);
                set_artifact(&mut module, side.clone());
                module
            });
            graph.add_dependency(
                item.id,
                Dependency {
                    specifier: format!("?{}", side_query),
                    target: side_id,
                    kind: ImportKind::Static,
                },
            );
            if parse {
                let imports = scan(side);
                self.link_imports(graph, context, side_id, &from_dir, &imports, next)?;
            }
        }

        if parse {
            let imports = scan(&chain_output.output.primary);
            self.link_imports(graph, context, item.id, &from_dir, &imports, next)?;
        }
        Ok(())
    }

    fn link_imports(
        &self,
        graph: &mut ModuleGraph,
        context: &Path,
        from: ModuleId,
        from_dir: &Path,
        imports: &[ImportRef],
        next: &mut Vec<ModuleId>,
    ) -> Result<(), BuildError> {
        for import in imports {
            let resolution = self
                .resolver
                .resolve(&import.specifier, from_dir)
                .map_err(|err| {
                    BuildError::from_resolve(&graph.get(from).key, &import.specifier, err)
                })?;

            let target = match resolution {
                Resolution::File { path, query } => {
                    let (id, created) = self.insert_source(graph, context, path, query);
                    if created {
                        next.push(id);
                    }
                    id
                }
                Resolution::External { global } => {
                    let key = format!("external {:?}", import.specifier);
                    let specifier = import.specifier.clone();
                    graph
                        .insert_with(&key, |id| {
                            let mut module = Module::pending(
                                id,
                                key.clone(),
                                PathBuf::from(&specifier),
                                None,
                                ModuleKind::External { global },
                            );
                            module.content_hash = content_hash(key.as_bytes());
                            module
                        })
                        .0
                }
                Resolution::Ignored => {
                    let key = format!(
                        "ignored {}|{}",
                        path_to_string(from_dir),
                        import.specifier
                    );
                    graph
                        .insert_with(&key, |id| {
                            let mut module = Module::pending(
                                id,
                                key.clone(),
                                from_dir.join(&import.specifier),
                                None,
                                ModuleKind::Ignored,
                            );
                            module.content_hash = content_hash(key.as_bytes());
                            module
                        })
                        .0
                }
            };

            graph.add_dependency(
                from,
                Dependency {
                    specifier: import.specifier.clone(),
                    target,
                    kind: import.kind,
                },
            );
        }
        Ok(())
    }

    fn insert_source(
        &self,
        graph: &mut ModuleGraph,
        context: &Path,
        path: PathBuf,
        query: Option<String>,
    ) -> (ModuleId, bool) {
        let key = module_key(context, &path, query.as_deref());
        graph.insert_with(&key, |id| {
            Module::pending(id, key.clone(), path, query, ModuleKind::Source)
        })
    }

    fn is_no_parse(&self, path: &Path) -> bool {
        let subject = path_to_string(path);
        self.no_parse.iter().any(|pattern| pattern.is_match(&subject))
    }
}

fn set_artifact(module: &mut Module, artifact: Artifact) {
    module.content_hash = content_hash(&artifact.content);
    module.size = artifact.len() as u64;
    module.artifact = artifact;
}

/// Entry paths are relative to the context even without a `./` prefix
fn entry_request(request: &str) -> String {
    if request.starts_with('.') || Path::new(request).is_absolute() {
        request.to_string()
    } else {
        format!("./{}", request)
    }
}
