//! Sheaf Config - Pure configuration data structures
//!
//! This crate contains only data structures and mode defaults, no engine logic.
//! It serves as the shared configuration vocabulary across all Sheaf crates.
//!
//! Every struct keeps the keys it does not recognise in an `unknown` map so the
//! engine can report them as warnings instead of failing the build.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Keys captured by `#[serde(flatten)]` that no field claimed
pub type UnknownOptions = BTreeMap<String, Value>;

/// Build invocation mode
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Minimal optimization, fast iteration
    Development,
    /// Full chunk optimization and size-minimizing emission
    #[default]
    Production,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Development => "development",
            Mode::Production => "production",
        }
    }

    /// Default chunk filename template for this mode
    pub fn default_filename(&self) -> &'static str {
        match self {
            Mode::Development => "[name].bundle.js",
            Mode::Production => "[name].[contenthash:8].js",
        }
    }

    pub fn default_minimize(&self) -> bool {
        matches!(self, Mode::Production)
    }

    pub fn default_min_size(&self) -> u64 {
        match self {
            Mode::Development => 10_000,
            Mode::Production => 20_000,
        }
    }
}

/// Pipeline phase, used for per-phase log filtering
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Resolve,
    Transform,
    Graph,
    Split,
    Emit,
}

impl Phase {
    pub const ALL: [Phase; 5] = [
        Phase::Resolve,
        Phase::Transform,
        Phase::Graph,
        Phase::Split,
        Phase::Emit,
    ];

    /// Get the string name of the phase
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Resolve => "resolve",
            Phase::Transform => "transform",
            Phase::Graph => "graph",
            Phase::Split => "split",
            Phase::Emit => "emit",
        }
    }

    /// Get the log target name for this phase
    pub fn target(&self) -> &'static str {
        match self {
            Phase::Resolve => "sheaf::resolve",
            Phase::Transform => "sheaf::transform",
            Phase::Graph => "sheaf::graph",
            Phase::Split => "sheaf::split",
            Phase::Emit => "sheaf::emit",
        }
    }
}

/// Top-level bundler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BundlerConfig {
    pub mode: Mode,
    /// Project root; relative entries and module ids are based on it
    pub context: PathBuf,
    pub entry: EntryConfig,
    pub output: OutputConfig,
    pub module: ModuleConfig,
    pub resolve: ResolveConfig,
    /// Specifier -> name of the global provided at runtime
    pub externals: BTreeMap<String, String>,
    pub optimization: OptimizationConfig,
    pub asset: AssetConfig,
    /// Worker pool size, 0 means one worker per CPU
    pub parallelism: usize,
    /// Enable the content-addressed transform cache
    pub cache: bool,
    #[serde(flatten, skip_serializing)]
    pub unknown: UnknownOptions,
}

impl Default for BundlerConfig {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            context: PathBuf::from("."),
            entry: EntryConfig::default(),
            output: OutputConfig::default(),
            module: ModuleConfig::default(),
            resolve: ResolveConfig::default(),
            externals: BTreeMap::new(),
            optimization: OptimizationConfig::default(),
            asset: AssetConfig::default(),
            parallelism: 0,
            cache: true,
            unknown: UnknownOptions::new(),
        }
    }
}

impl BundlerConfig {
    /// Whether emission should minimize output
    pub fn minimize(&self) -> bool {
        self.optimization.minimize.unwrap_or_else(|| self.mode.default_minimize())
    }

    /// Chunk filename template after applying mode defaults
    pub fn filename_template(&self) -> &str {
        self.output
            .filename
            .as_deref()
            .unwrap_or_else(|| self.mode.default_filename())
    }

    /// Dotted paths of every option that no field recognised
    pub fn unknown_options(&self) -> Vec<String> {
        let mut found = Vec::new();
        collect_unknown("", &self.unknown, &mut found);
        collect_unknown("output.", &self.output.unknown, &mut found);
        collect_unknown("module.", &self.module.unknown, &mut found);
        for (i, rule) in self.module.rules.iter().enumerate() {
            collect_unknown(&format!("module.rules[{}].", i), &rule.unknown, &mut found);
        }
        collect_unknown("resolve.", &self.resolve.unknown, &mut found);
        collect_unknown("optimization.", &self.optimization.unknown, &mut found);
        let split = &self.optimization.split_chunks;
        collect_unknown("optimization.splitChunks.", &split.unknown, &mut found);
        for group in &split.cache_groups {
            let prefix = format!("optimization.splitChunks.cacheGroups.{}.", group.key);
            collect_unknown(&prefix, &group.unknown, &mut found);
        }
        collect_unknown("asset.", &self.asset.unknown, &mut found);
        found
    }
}

fn collect_unknown(prefix: &str, unknown: &UnknownOptions, found: &mut Vec<String>) {
    found.extend(unknown.keys().map(|key| format!("{}{}", prefix, key)));
}

/// Entry points: a single path (named `main`) or a name -> path map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntryConfig {
    Single(String),
    Named(BTreeMap<String, String>),
}

impl Default for EntryConfig {
    fn default() -> Self {
        EntryConfig::Single("./src/index.js".to_string())
    }
}

impl EntryConfig {
    /// Entry (name, path) pairs in deterministic order
    pub fn entries(&self) -> Vec<(String, String)> {
        match self {
            EntryConfig::Single(path) => vec![("main".to_string(), path.clone())],
            EntryConfig::Named(map) => map
                .iter()
                .map(|(name, path)| (name.clone(), path.clone()))
                .collect(),
        }
    }
}

/// Output location and naming
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OutputConfig {
    pub path: PathBuf,
    /// Chunk filename template; `None` uses the mode default
    pub filename: Option<String>,
    pub css_filename: String,
    pub asset_filename: String,
    pub public_path: String,
    /// Remove previously emitted files before writing
    pub clean: bool,
    /// Manifest file name; `null` disables the manifest file
    pub manifest: Option<String>,
    #[serde(flatten, skip_serializing)]
    pub unknown: UnknownOptions,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("dist"),
            filename: None,
            css_filename: "[name].css".to_string(),
            asset_filename: "[name].[hash:8][ext]".to_string(),
            public_path: "/".to_string(),
            clean: true,
            manifest: Some("manifest.json".to_string()),
            unknown: UnknownOptions::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModuleConfig {
    pub rules: Vec<RuleConfig>,
    /// Modules matching these patterns are transformed but never scanned for imports
    pub no_parse: Vec<String>,
    /// Copy unknown file types as raw assets instead of failing the build
    pub fallback_raw_copy: bool,
    #[serde(flatten, skip_serializing)]
    pub unknown: UnknownOptions,
}

/// Declared resource type of a rule or cache group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceTypeConfig {
    #[serde(rename = "javascript")]
    Javascript,
    #[serde(rename = "style")]
    Style,
    /// Inline or emit depending on size
    #[serde(rename = "asset")]
    Asset,
    #[serde(rename = "asset/inline")]
    AssetInline,
    #[serde(rename = "asset/resource")]
    AssetResource,
    #[serde(rename = "raw")]
    Raw,
}

/// One entry of `module.rules`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuleConfig {
    /// Regex matched against the resolved path
    pub test: String,
    /// Transform ids in declared order; the last one runs first
    #[serde(alias = "use", deserialize_with = "one_or_many")]
    pub transforms: Vec<TransformRef>,
    #[serde(rename = "type")]
    pub resource_type: Option<ResourceTypeConfig>,
    /// Threshold bucket for assets, e.g. `image` or `font`
    pub asset_kind: Option<String>,
    /// First matching exclusive rule stops evaluation
    pub exclusive: bool,
    /// Per-rule inline threshold, overrides `asset.inlineThresholds`
    pub inline_threshold: Option<u64>,
    #[serde(flatten, skip_serializing)]
    pub unknown: UnknownOptions,
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            test: String::new(),
            transforms: Vec::new(),
            resource_type: None,
            asset_kind: None,
            exclusive: true,
            inline_threshold: None,
            unknown: UnknownOptions::new(),
        }
    }
}

/// Reference to a registered transform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TransformRef {
    Id(String),
    Detailed {
        #[serde(alias = "loader")]
        id: String,
        #[serde(default)]
        optional: bool,
    },
}

impl TransformRef {
    pub fn id(&self) -> &str {
        match self {
            TransformRef::Id(id) => id,
            TransformRef::Detailed { id, .. } => id,
        }
    }

    /// Failure of an optional stage downgrades to a warning
    pub fn optional(&self) -> bool {
        matches!(self, TransformRef::Detailed { optional: true, .. })
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(TransformRef),
    Many(Vec<TransformRef>),
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<TransformRef>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(single) => vec![single],
        OneOrMany::Many(list) => list,
    })
}

/// Module resolution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResolveConfig {
    /// `key` matches as a prefix, `key$` only matches exactly
    pub alias: BTreeMap<String, PathBuf>,
    /// Tried in order; `"..."` expands to the default list
    pub extensions: Vec<String>,
    /// Search directories, higher priority first
    #[serde(alias = "modules")]
    pub module_paths: Vec<PathBuf>,
    /// `package.json` fields consulted when resolving a directory
    pub main_fields: Vec<String>,
    pub ignore: Vec<IgnoreRule>,
    #[serde(flatten, skip_serializing)]
    pub unknown: UnknownOptions,
}

impl ResolveConfig {
    pub const DEFAULT_EXTENSIONS: [&'static str; 3] = [".js", ".json", ".wasm"];
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            alias: BTreeMap::new(),
            extensions: vec!["...".to_string()],
            module_paths: vec![PathBuf::from("node_modules")],
            main_fields: vec!["browser".to_string(), "module".to_string(), "main".to_string()],
            ignore: Vec::new(),
            unknown: UnknownOptions::new(),
        }
    }
}

/// Excludes a specifier from traversal, replacing it with an empty stub
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IgnoreRule {
    /// Regex matched against the raw specifier
    pub resource: String,
    /// Regex matched against the importer's directory
    #[serde(default)]
    pub context: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OptimizationConfig {
    /// `None` uses the mode default
    pub minimize: Option<bool>,
    pub split_chunks: SplitChunksConfig,
    #[serde(flatten, skip_serializing)]
    pub unknown: UnknownOptions,
}

/// Which chunk kinds a splitting policy looks at
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkSelection {
    Async,
    Initial,
    #[default]
    All,
}

/// Chunk-splitting policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SplitChunksConfig {
    pub chunks: ChunkSelection,
    /// `None` uses the mode default
    pub min_size: Option<u64>,
    /// `None` uses 0 in development and `min_size` in production
    pub min_remaining_size: Option<u64>,
    pub min_chunks: usize,
    pub max_async_requests: usize,
    pub max_initial_requests: usize,
    /// Candidates at least this large ignore request and remaining-size limits
    pub enforce_size_threshold: u64,
    /// Include the built-in `defaultVendors` group
    pub default_vendors: bool,
    /// Run the generic shared-module pass after all cache groups
    pub default_group: bool,
    pub cache_groups: Vec<CacheGroupConfig>,
    #[serde(flatten, skip_serializing)]
    pub unknown: UnknownOptions,
}

impl Default for SplitChunksConfig {
    fn default() -> Self {
        Self {
            chunks: ChunkSelection::All,
            min_size: None,
            min_remaining_size: None,
            min_chunks: 2,
            max_async_requests: 30,
            max_initial_requests: 30,
            enforce_size_threshold: 50_000,
            default_vendors: true,
            default_group: true,
            cache_groups: Vec::new(),
            unknown: UnknownOptions::new(),
        }
    }
}

impl SplitChunksConfig {
    pub fn min_size_for(&self, mode: Mode) -> u64 {
        self.min_size.unwrap_or_else(|| mode.default_min_size())
    }

    pub fn min_remaining_size_for(&self, mode: Mode) -> u64 {
        self.min_remaining_size.unwrap_or(match mode {
            Mode::Development => 0,
            Mode::Production => self.min_size_for(mode),
        })
    }

    /// The built-in group claiming everything under a `node_modules` directory
    pub fn default_vendors_group() -> CacheGroupConfig {
        CacheGroupConfig {
            key: "defaultVendors".to_string(),
            test: Some(r"[\\/]node_modules[\\/]".to_string()),
            min_chunks: Some(1),
            priority: -10,
            reuse_existing_chunk: true,
            ..CacheGroupConfig::default()
        }
    }
}

/// A named policy claiming matching modules into a dedicated chunk
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheGroupConfig {
    pub key: String,
    /// Fixed chunk name; unnamed groups derive names from the chunks they split
    pub name: Option<String>,
    /// Regex matched against the module path
    pub test: Option<String>,
    #[serde(rename = "type")]
    pub resource_type: Option<ResourceTypeConfig>,
    pub chunks: Option<ChunkSelection>,
    pub min_chunks: Option<usize>,
    pub min_size: Option<u64>,
    pub max_async_requests: Option<usize>,
    pub max_initial_requests: Option<usize>,
    pub priority: i32,
    /// Extract even below size thresholds and request budgets
    pub enforce: bool,
    pub reuse_existing_chunk: bool,
    #[serde(flatten, skip_serializing)]
    pub unknown: UnknownOptions,
}

/// Inline-vs-file thresholds for assets
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AssetConfig {
    /// Asset kind (`image`, `font`, ...) -> max inline size in bytes
    pub inline_thresholds: BTreeMap<String, u64>,
    pub default_inline_threshold: u64,
    /// Upper bound on inlined assets per importing module; `None` is unbounded
    pub max_inline_per_module: Option<usize>,
    #[serde(flatten, skip_serializing)]
    pub unknown: UnknownOptions,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            inline_thresholds: BTreeMap::new(),
            default_inline_threshold: 8 * 1024,
            max_inline_per_module: None,
            unknown: UnknownOptions::new(),
        }
    }
}

impl AssetConfig {
    pub fn threshold_for(&self, kind: &str) -> u64 {
        self.inline_thresholds
            .get(kind)
            .copied()
            .unwrap_or(self.default_inline_threshold)
    }
}
