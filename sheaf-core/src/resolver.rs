//! Module resolver
//!
//! Maps an import specifier to a file through the filesystem collaborator.
//! Order: externals, ignore rules, aliases, then path lookup. Relative and
//! absolute specifiers are looked up directly. Bare specifiers search each
//! module path in priority order: absolute module paths are searched
//! directly, relative ones hierarchically upward from the importer.

use crate::error::{ConfigError, ResolveError};
use regex::Regex;
use sheaf_config::{BundlerConfig, ResolveConfig};
use sheaf_vfs::VirtualFileSystem;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::trace;

/// Outcome of resolving a specifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    File { path: PathBuf, query: Option<String> },
    /// Provided at runtime by the named global
    External { global: String },
    /// Excluded from traversal, replaced by an empty stub
    Ignored,
}

#[derive(Debug)]
struct Alias {
    key: String,
    exact: bool,
    target: String,
}

#[derive(Debug)]
struct IgnoreMatcher {
    resource: Regex,
    context: Option<Regex>,
}

pub struct Resolver {
    vfs: Arc<dyn VirtualFileSystem>,
    context: PathBuf,
    aliases: Vec<Alias>,
    extensions: Vec<String>,
    module_paths: Vec<PathBuf>,
    main_fields: Vec<String>,
    ignore: Vec<IgnoreMatcher>,
    externals: BTreeMap<String, String>,
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("context", &self.context)
            .field("extensions", &self.extensions)
            .field("module_paths", &self.module_paths)
            .finish()
    }
}

impl Resolver {
    pub fn new(
        config: &BundlerConfig,
        vfs: Arc<dyn VirtualFileSystem>,
    ) -> Result<Self, ConfigError> {
        let context = normalize(&config.context);
        let resolve = &config.resolve;

        let mut aliases: Vec<Alias> = resolve
            .alias
            .iter()
            .map(|(key, target)| {
                let (key, exact) = match key.strip_suffix('$') {
                    Some(stripped) => (stripped.to_string(), true),
                    None => (key.clone(), false),
                };
                let target = path_to_string(target);
                let target = if target.starts_with('.') {
                    path_to_string(&normalize(&context.join(&target)))
                } else {
                    target
                };
                Alias { key, exact, target }
            })
            .collect();
        // Longest key first so `@/components` beats `@`.
        aliases.sort_by(|a, b| b.key.len().cmp(&a.key.len()).then(a.key.cmp(&b.key)));

        let ignore = resolve
            .ignore
            .iter()
            .enumerate()
            .map(|(index, rule)| {
                let compile = |pattern: &str, field: &str| {
                    Regex::new(pattern).map_err(|e| ConfigError::InvalidPattern {
                        option: format!("resolve.ignore[{}].{}", index, field),
                        message: e.to_string(),
                    })
                };
                Ok(IgnoreMatcher {
                    resource: compile(&rule.resource, "resource")?,
                    context: rule
                        .context
                        .as_deref()
                        .map(|pattern| compile(pattern, "context"))
                        .transpose()?,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        let module_paths = resolve
            .module_paths
            .iter()
            .map(|dir| {
                if dir.is_absolute() {
                    normalize(dir)
                } else if dir.starts_with(".") {
                    normalize(&context.join(dir))
                } else {
                    dir.clone()
                }
            })
            .collect();

        Ok(Self {
            vfs,
            context,
            aliases,
            extensions: expand_extensions(resolve),
            module_paths,
            main_fields: resolve.main_fields.clone(),
            ignore,
            externals: config.externals.clone(),
        })
    }

    pub fn context(&self) -> &Path {
        &self.context
    }

    /// Resolve `specifier` as imported from a module in `from_dir`
    pub fn resolve(&self, specifier: &str, from_dir: &Path) -> Result<Resolution, ResolveError> {
        if let Some(global) = self.externals.get(specifier) {
            trace!(target: "sheaf::resolve", specifier, global = %global, "External");
            return Ok(Resolution::External {
                global: global.clone(),
            });
        }

        let dir = path_to_string(from_dir);
        if self.ignore.iter().any(|rule| {
            rule.resource.is_match(specifier)
                && rule.context.as_ref().map_or(true, |ctx| ctx.is_match(&dir))
        }) {
            trace!(target: "sheaf::resolve", specifier, from = %dir, "Ignored");
            return Ok(Resolution::Ignored);
        }

        let (request, query) = match specifier.split_once('?') {
            Some((request, query)) => (request, Some(query.to_string())),
            None => (specifier, None),
        };
        let request = self.apply_alias(request);

        let mut tried = Vec::new();
        for candidate in self.candidates(&request, from_dir) {
            if let Some(path) = self.resolve_path(&candidate, &mut tried)? {
                trace!(target: "sheaf::resolve", specifier, path = %path.display(), "Resolved");
                return Ok(Resolution::File { path, query });
            }
        }

        Err(ResolveError::NotFound {
            specifier: specifier.to_string(),
            tried,
        })
    }

    fn apply_alias(&self, request: &str) -> String {
        for alias in &self.aliases {
            if request == alias.key {
                return alias.target.clone();
            }
            if alias.exact {
                continue;
            }
            if let Some(rest) = request
                .strip_prefix(alias.key.as_str())
                .filter(|rest| rest.starts_with('/'))
            {
                return format!("{}{}", alias.target, rest);
            }
        }
        request.to_string()
    }

    /// Base paths to try for a request, in priority order
    fn candidates(&self, request: &str, from_dir: &Path) -> Vec<PathBuf> {
        if is_relative(request) {
            return vec![normalize(&from_dir.join(request))];
        }
        if Path::new(request).is_absolute() {
            return vec![normalize(Path::new(request))];
        }

        let mut candidates = Vec::new();
        for module_path in &self.module_paths {
            if module_path.is_absolute() {
                candidates.push(normalize(&module_path.join(request)));
            } else {
                for dir in from_dir.ancestors() {
                    candidates.push(normalize(&dir.join(module_path).join(request)));
                }
            }
        }
        candidates.dedup();
        candidates
    }

    /// File, then extensions, then directory (package.json main fields, index)
    fn resolve_path(
        &self,
        base: &Path,
        tried: &mut Vec<PathBuf>,
    ) -> Result<Option<PathBuf>, ResolveError> {
        if let Some(found) = self.resolve_file(base, tried) {
            return Ok(Some(found));
        }
        if !self.vfs.is_dir(base) {
            return Ok(None);
        }

        let manifest = base.join("package.json");
        if self.vfs.is_file(&manifest) {
            for main in self.read_main_fields(&manifest)? {
                let target = normalize(&base.join(&main));
                if let Some(found) = self.resolve_file(&target, tried) {
                    return Ok(Some(found));
                }
                if let Some(found) = self.resolve_index(&target, tried) {
                    return Ok(Some(found));
                }
            }
        }

        Ok(self.resolve_index(base, tried))
    }

    fn resolve_file(&self, base: &Path, tried: &mut Vec<PathBuf>) -> Option<PathBuf> {
        if self.vfs.is_file(base) {
            return Some(base.to_path_buf());
        }
        tried.push(base.to_path_buf());

        for ext in &self.extensions {
            let mut with_ext = base.as_os_str().to_owned();
            with_ext.push(ext);
            let candidate = PathBuf::from(with_ext);
            if self.vfs.is_file(&candidate) {
                return Some(candidate);
            }
            tried.push(candidate);
        }
        None
    }

    fn resolve_index(&self, dir: &Path, tried: &mut Vec<PathBuf>) -> Option<PathBuf> {
        for ext in &self.extensions {
            let candidate = dir.join(format!("index{}", ext));
            if self.vfs.is_file(&candidate) {
                return Some(candidate);
            }
            tried.push(candidate);
        }
        None
    }

    /// String-valued main fields of a package.json, in configured priority
    fn read_main_fields(&self, manifest: &Path) -> Result<Vec<String>, ResolveError> {
        let invalid = |message: String| ResolveError::InvalidPackage {
            path: manifest.to_path_buf(),
            message,
        };
        let bytes = self
            .vfs
            .read_file(manifest)
            .map_err(|e| invalid(e.to_string()))?;
        let value: serde_json::Value =
            serde_json::from_slice(&bytes).map_err(|e| invalid(e.to_string()))?;

        Ok(self
            .main_fields
            .iter()
            .filter_map(|field| value.get(field).and_then(|v| v.as_str()))
            .map(str::to_string)
            .collect())
    }
}

/// Configured extensions with `"..."` expanded to the defaults
fn expand_extensions(resolve: &ResolveConfig) -> Vec<String> {
    let mut extensions = Vec::new();
    for ext in &resolve.extensions {
        if ext == "..." {
            extensions.extend(ResolveConfig::DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()));
        } else {
            extensions.push(ext.clone());
        }
    }
    let mut seen = std::collections::HashSet::new();
    extensions.retain(|ext| seen.insert(ext.clone()));
    extensions
}

fn is_relative(request: &str) -> bool {
    request == "." || request == ".." || request.starts_with("./") || request.starts_with("../")
}

/// Lexically normalize a path, removing `.` and resolving `..`
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Path as a string with forward slashes
pub fn path_to_string(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Stable module identifier: context-relative path plus optional query
pub fn module_key(context: &Path, path: &Path, query: Option<&str>) -> String {
    let base = match path.strip_prefix(context) {
        Ok(relative) => format!("./{}", path_to_string(relative)),
        Err(_) => path_to_string(path),
    };
    match query {
        Some(query) => format!("{}?{}", base, query),
        None => base,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sheaf_config::IgnoreRule;
    use sheaf_vfs::MemoryFileSystem;

    fn fs() -> Arc<dyn VirtualFileSystem> {
        Arc::new(MemoryFileSystem::with_files([
            ("/p/src/index.ts", "index"),
            ("/p/src/util.js", "util"),
            ("/p/src/components/Button.ts", "button"),
            ("/p/src/lib/index.js", "lib"),
            ("/p/node_modules/lodash/package.json", r#"{"main": "lodash.js"}"#),
            ("/p/node_modules/lodash/lodash.js", "lodash"),
            ("/p/node_modules/vue/package.json", r#"{"module": "dist/vue.esm.js", "main": "dist/vue.js"}"#),
            ("/p/node_modules/vue/dist/vue.esm.js", "vue esm"),
            ("/p/node_modules/vue/dist/vue.js", "vue cjs"),
            ("/p/node_modules/broken/package.json", "{ nope"),
            ("/p/node_modules/moment/locale/de.js", "de"),
            ("/p/node_modules/moment/moment.js", "moment"),
        ]))
    }

    fn config() -> BundlerConfig {
        let mut config = BundlerConfig::default();
        config.context = PathBuf::from("/p");
        config.resolve.extensions = vec![".ts".to_string(), "...".to_string()];
        config
    }

    fn file(path: &str) -> Resolution {
        Resolution::File {
            path: PathBuf::from(path),
            query: None,
        }
    }

    #[test]
    fn test_relative_with_extensions() {
        let resolver = Resolver::new(&config(), fs()).unwrap();
        let from = Path::new("/p/src");
        assert_eq!(resolver.resolve("./util", from).unwrap(), file("/p/src/util.js"));
        assert_eq!(resolver.resolve("./index", from).unwrap(), file("/p/src/index.ts"));
        assert_eq!(resolver.resolve("./lib", from).unwrap(), file("/p/src/lib/index.js"));
        assert_eq!(
            resolver.resolve("../src/./util.js", from).unwrap(),
            file("/p/src/util.js")
        );
    }

    #[test]
    fn test_extension_order_is_respected() {
        let files = MemoryFileSystem::with_files([("/p/a.ts", "ts"), ("/p/a.js", "js")]);
        let resolver = Resolver::new(&config(), Arc::new(files)).unwrap();
        assert_eq!(resolver.resolve("./a", Path::new("/p")).unwrap(), file("/p/a.ts"));
    }

    #[test]
    fn test_query_is_kept() {
        let resolver = Resolver::new(&config(), fs()).unwrap();
        assert_eq!(
            resolver.resolve("./util?raw", Path::new("/p/src")).unwrap(),
            Resolution::File {
                path: PathBuf::from("/p/src/util.js"),
                query: Some("raw".to_string()),
            }
        );
    }

    #[test]
    fn test_alias_prefix_and_exact() {
        let mut config = config();
        config.resolve.alias.insert("@".to_string(), PathBuf::from("./src"));
        config
            .resolve
            .alias
            .insert("comps".to_string(), PathBuf::from("/p/src/components"));
        config
            .resolve
            .alias
            .insert("vue$".to_string(), PathBuf::from("vue/dist/vue.js"));
        let resolver = Resolver::new(&config, fs()).unwrap();
        let from = Path::new("/p/src/components");

        assert_eq!(resolver.resolve("@/util", from).unwrap(), file("/p/src/util.js"));
        assert_eq!(
            resolver.resolve("comps/Button", from).unwrap(),
            file("/p/src/components/Button.ts")
        );
        assert_eq!(resolver.resolve("vue", from).unwrap(), file("/p/node_modules/vue/dist/vue.js"));
        // Exact alias does not apply to deeper requests.
        assert_eq!(
            resolver.resolve("vue/dist/vue.esm.js", from).unwrap(),
            file("/p/node_modules/vue/dist/vue.esm.js")
        );
        // `@x` is not the `@` alias.
        assert!(resolver.resolve("@x/util", from).is_err());
    }

    #[test]
    fn test_package_main_fields() {
        let resolver = Resolver::new(&config(), fs()).unwrap();
        let from = Path::new("/p/src/components");
        assert_eq!(
            resolver.resolve("lodash", from).unwrap(),
            file("/p/node_modules/lodash/lodash.js")
        );
        // `module` comes before `main` in the default field order.
        assert_eq!(
            resolver.resolve("vue", from).unwrap(),
            file("/p/node_modules/vue/dist/vue.esm.js")
        );
        assert!(matches!(
            resolver.resolve("broken", from),
            Err(ResolveError::InvalidPackage { .. })
        ));
    }

    #[test]
    fn test_module_paths_prefer_source_dirs() {
        let files = MemoryFileSystem::with_files([
            ("/p/src/shared.js", "src"),
            ("/p/node_modules/shared/index.js", "pkg"),
        ]);
        let mut config = config();
        config.resolve.module_paths = vec![PathBuf::from("/p/src"), PathBuf::from("node_modules")];
        let resolver = Resolver::new(&config, Arc::new(files)).unwrap();
        assert_eq!(
            resolver.resolve("shared", Path::new("/p/src/deep")).unwrap(),
            file("/p/src/shared.js")
        );
    }

    #[test]
    fn test_externals_and_ignore() {
        let mut config = config();
        config
            .externals
            .insert("jquery".to_string(), "jQuery".to_string());
        config.resolve.ignore.push(IgnoreRule {
            resource: r"^\./locale$".to_string(),
            context: Some("moment$".to_string()),
        });
        let resolver = Resolver::new(&config, fs()).unwrap();

        assert_eq!(
            resolver.resolve("jquery", Path::new("/p/src")).unwrap(),
            Resolution::External {
                global: "jQuery".to_string()
            }
        );
        assert_eq!(
            resolver
                .resolve("./locale", Path::new("/p/node_modules/moment"))
                .unwrap(),
            Resolution::Ignored
        );
        // Same specifier from another package is not ignored.
        assert!(matches!(
            resolver.resolve("./locale", Path::new("/p/src")),
            Err(ResolveError::NotFound { .. })
        ));
    }

    #[test]
    fn test_not_found_lists_tried_paths() {
        let resolver = Resolver::new(&config(), fs()).unwrap();
        match resolver.resolve("./missing", Path::new("/p/src")) {
            Err(ResolveError::NotFound { specifier, tried }) => {
                assert_eq!(specifier, "./missing");
                assert_eq!(tried[0], PathBuf::from("/p/src/missing"));
                assert!(tried.contains(&PathBuf::from("/p/src/missing.ts")));
                assert!(tried.contains(&PathBuf::from("/p/src/missing.wasm")));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_invalid_ignore_pattern() {
        let mut config = config();
        config.resolve.ignore.push(IgnoreRule {
            resource: "(".to_string(),
            context: None,
        });
        let err = Resolver::new(&config, fs()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern { .. }));
    }

    #[test]
    fn test_module_key() {
        let context = Path::new("/p");
        assert_eq!(module_key(context, Path::new("/p/src/a.js"), None), "./src/a.js");
        assert_eq!(
            module_key(context, Path::new("/p/src/a.css"), Some("side=0")),
            "./src/a.css?side=0"
        );
        assert_eq!(module_key(context, Path::new("/q/b.js"), None), "/q/b.js");
    }
}
