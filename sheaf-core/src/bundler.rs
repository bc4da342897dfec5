//! Bundler facade
//!
//! Owns the configuration, the filesystem collaborator, the transform
//! registry and the transform cache, and runs one build at a time:
//! validate, build the module graph, classify assets, split chunks, emit.

use crate::assets::AssetClassifier;
use crate::builder::GraphBuilder;
use crate::cache::TransformCache;
use crate::emitter::{write_output, Emitter};
use crate::error::{BuildError, ConfigError, Warning};
use crate::manifest::Manifest;
use crate::pipeline::TransformRunner;
use crate::registry::TransformRegistry;
use crate::resolver::{normalize, Resolver};
use crate::rules::RuleMatcher;
use crate::split::SplitChunksOptimizer;
use crate::template::require_placeholder;
use crate::transform::Transform;
use regex::Regex;
use sheaf_config::BundlerConfig;
use sheaf_vfs::VirtualFileSystem;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildStats {
    pub modules: usize,
    pub chunks: usize,
    pub files: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

/// Output of a successful build
#[derive(Debug, Clone)]
pub struct BuildResult {
    /// Output file name (relative to the output directory) -> bytes
    pub files: BTreeMap<String, Vec<u8>>,
    pub manifest: Manifest,
    pub warnings: Vec<Warning>,
    pub stats: BuildStats,
}

/// Validated per-build state
struct Session {
    entries: Vec<(String, String)>,
    resolver: Resolver,
    rules: RuleMatcher,
    split: SplitChunksOptimizer,
    no_parse: Vec<Regex>,
}

pub struct Bundler {
    config: BundlerConfig,
    vfs: Arc<dyn VirtualFileSystem>,
    transforms: TransformRegistry,
    cache: Option<Arc<TransformCache>>,
}

impl Bundler {
    /// Bundler with the built-in transforms and, unless disabled in the
    /// configuration, a fresh transform cache
    pub fn new(config: BundlerConfig, vfs: Arc<dyn VirtualFileSystem>) -> Self {
        let cache = config.cache.then(|| Arc::new(TransformCache::new()));
        Self {
            config,
            vfs,
            transforms: TransformRegistry::with_builtins(),
            cache,
        }
    }

    /// Share `cache` with other bundlers, e.g. across rebuilds
    pub fn with_cache(mut self, cache: Arc<TransformCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Register a transform; returns the one it replaced
    pub fn register_transform(&mut self, transform: Arc<dyn Transform>) -> Option<Arc<dyn Transform>> {
        self.transforms.register(transform)
    }

    pub fn transforms(&self) -> &TransformRegistry {
        &self.transforms
    }

    pub fn cache(&self) -> Option<&Arc<TransformCache>> {
        self.cache.as_ref()
    }

    pub fn config(&self) -> &BundlerConfig {
        &self.config
    }

    /// Absolute output directory
    pub fn output_dir(&self) -> PathBuf {
        normalize(&self.config.context.join(&self.config.output.path))
    }

    /// Check the configuration without touching any source file
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.prepare().map(|_| ())
    }

    fn prepare(&self) -> Result<Session, ConfigError> {
        let config = &self.config;
        let entries = config.entry.entries();
        if entries.is_empty() {
            return Err(ConfigError::EmptyEntry);
        }
        if let Some((name, _)) = entries
            .iter()
            .find(|(name, path)| name.is_empty() || path.trim().is_empty())
        {
            return Err(ConfigError::EmptyEntryPath { name: name.clone() });
        }

        self.check_output_dir(&entries)?;

        const CHUNK: &[&str] = &["name", "id", "contenthash"];
        const ASSET: &[&str] = &["name", "hash", "contenthash"];
        require_placeholder(
            "output.filename",
            config.filename_template(),
            CHUNK,
            "[name], [id] or [contenthash]",
        )?;
        require_placeholder(
            "output.cssFilename",
            &config.output.css_filename,
            CHUNK,
            "[name], [id] or [contenthash]",
        )?;
        require_placeholder(
            "output.assetFilename",
            &config.output.asset_filename,
            ASSET,
            "[name], [hash] or [contenthash]",
        )?;

        let no_parse = config
            .module
            .no_parse
            .iter()
            .enumerate()
            .map(|(index, pattern)| {
                Regex::new(pattern).map_err(|e| ConfigError::InvalidPattern {
                    option: format!("module.noParse[{}]", index),
                    message: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Session {
            entries,
            resolver: Resolver::new(config, self.vfs.clone())?,
            rules: RuleMatcher::new(&config.module, &self.transforms)?,
            split: SplitChunksOptimizer::new(&config.optimization.split_chunks, config.mode)?,
            no_parse,
        })
    }

    /// The output directory is replaced wholesale, so it must not hold the
    /// context or any entry
    fn check_output_dir(&self, entries: &[(String, String)]) -> Result<(), ConfigError> {
        let output = self.output_dir();
        let context = normalize(&self.config.context);
        let protected = std::iter::once(context.clone())
            .chain(entries.iter().map(|(_, path)| normalize(&context.join(path))));
        for path in protected {
            if path.starts_with(&output) {
                return Err(ConfigError::OutputOverlapsSources {
                    output,
                    protected: path,
                });
            }
        }
        Ok(())
    }

    /// Run a build in memory; nothing is written
    pub fn build(&self) -> Result<BuildResult, BuildError> {
        let started = Instant::now();
        let session = self.prepare()?;
        let config = &self.config;
        info!(
            target: "sheaf::graph",
            mode = config.mode.as_str(),
            entries = session.entries.len(),
            "Build started"
        );

        let mut warnings: Vec<Warning> = config
            .unknown_options()
            .into_iter()
            .map(|path| {
                warn!(target: "sheaf::resolve", option = %path, "Unrecognised configuration option ignored");
                Warning::UnknownOption { path }
            })
            .collect();

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.parallelism)
            .thread_name(|index| format!("sheaf-worker-{}", index))
            .build()
            .map_err(|e| BuildError::WorkerPool(e.to_string()))?;
        let runner = TransformRunner::new(self.cache.clone());
        let misses_before = self.cache.as_ref().map_or(0, |cache| cache.stats().misses);

        let built = GraphBuilder {
            vfs: self.vfs.as_ref(),
            resolver: &session.resolver,
            rules: &session.rules,
            runner: &runner,
            no_parse: &session.no_parse,
            pool: &pool,
        }
        .build(&session.entries)?;
        warnings.extend(built.warnings);
        let graph = built.graph;

        let assets = AssetClassifier::new(&config.asset, &config.output.asset_filename).classify(&graph);
        let chunks = session.split.optimize(&graph)?;
        let emitted = Emitter::new(&config.output, config.filename_template(), config.minimize())
            .emit(&graph, &chunks, &assets)?;

        let stats = BuildStats {
            modules: graph.len(),
            chunks: chunks.chunks.len(),
            files: emitted.files.len(),
            cache_hits: built.cache_hits as u64,
            cache_misses: self
                .cache
                .as_ref()
                .map_or(0, |cache| cache.stats().misses - misses_before),
        };
        info!(
            target: "sheaf::emit",
            modules = stats.modules,
            chunks = stats.chunks,
            files = stats.files,
            cache_hits = stats.cache_hits,
            warnings = warnings.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Build finished"
        );

        Ok(BuildResult {
            files: emitted.files,
            manifest: emitted.manifest,
            warnings,
            stats,
        })
    }

    /// Clean the output directory and write `result` into it
    pub fn write(&self, result: &BuildResult) -> Result<(), BuildError> {
        write_output(
            self.vfs.as_ref(),
            &self.output_dir(),
            self.config.output.clean,
            &result.files,
        )
    }

    /// Build, then write; a failed build leaves the output directory untouched
    pub fn run(&self) -> Result<BuildResult, BuildError> {
        let result = self.build()?;
        self.write(&result)?;
        Ok(result)
    }
}
