//! Sheaf Core
//!
//! Bundler engine: rule matching, the transform pipeline and its cache,
//! module resolution and graph building, asset classification, chunk
//! splitting and output emission.

pub mod component;
pub mod error;
pub mod hash;
pub mod registry;
pub mod transform;
pub mod transforms;

pub mod cache;
pub mod pipeline;
pub mod rules;

pub mod builder;
pub mod graph;
pub mod resolver;
pub mod scanner;

pub mod assets;
pub mod chunk;
pub mod split;

pub mod emitter;
pub mod manifest;
pub mod runtime;
pub mod template;

pub mod bundler;

pub use component::{Component, ComponentExt, ComponentMetadata};
pub use error::{BuildError, ConfigError, ResolveError, TransformError, Warning};
pub use registry::{Registry, TransformRegistry};
pub use transform::{Artifact, ArtifactKind, Transform, TransformOutput};
pub use transforms::{ExtractCssTransform, IdentityTransform, JsonTransform, RawTransform};

pub use cache::{CacheKey, CacheStats, TransformCache};
pub use pipeline::{ChainOutput, ChainStage, RunOutcome, SkippedStage, TransformChain, TransformRunner};
pub use rules::{AssetPolicy, ModuleType, RuleMatch, RuleMatcher};

pub use builder::{BuiltGraph, GraphBuilder};
pub use graph::{Dependency, Module, ModuleGraph, ModuleId, ModuleKind};
pub use resolver::{Resolution, Resolver};
pub use scanner::{ImportKind, ImportRef};

pub use assets::{AssetClassifier, AssetDecision};
pub use chunk::{Chunk, ChunkGraph, ChunkGroup, ChunkId, ChunkKind, ChunkOrigin};
pub use split::SplitChunksOptimizer;

pub use emitter::{write_output, Emitted, Emitter};
pub use manifest::{Manifest, ManifestAsset, ManifestChunk};

pub use bundler::{BuildResult, BuildStats, Bundler};

pub use sheaf_config::BundlerConfig;
pub use sheaf_vfs::{MemoryFileSystem, NativeFileSystem, VirtualFileSystem};
