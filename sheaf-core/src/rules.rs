//! Rule matcher
//!
//! Maps a resolved path to the transform chain and module type that apply
//! to it. Rules are evaluated top to bottom against the path. The first
//! matching exclusive rule ends evaluation. Non-exclusive rules that match
//! before it contribute their transforms too, appended in declared order.

use crate::error::{BuildError, ConfigError};
use crate::pipeline::{ChainStage, TransformChain};
use crate::registry::TransformRegistry;
use crate::resolver::path_to_string;
use crate::transform::{ArtifactKind, Transform};
use regex::Regex;
use sheaf_config::{ModuleConfig, ResourceTypeConfig};
use std::path::Path;
use std::sync::Arc;

/// How an asset module is delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetPolicy {
    /// Inline below the threshold, emit at or above it
    Auto { threshold: Option<u64> },
    Inline,
    Resource,
}

/// Resource type of a module
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleType {
    Javascript,
    Style,
    Asset { policy: AssetPolicy, kind: String },
    /// Copied verbatim as an emitted file
    Raw,
}

impl ModuleType {
    /// Artifact kind of the module's bytes before any transform runs
    pub fn source_kind(&self) -> ArtifactKind {
        match self {
            ModuleType::Javascript => ArtifactKind::Script,
            ModuleType::Style => ArtifactKind::Style,
            ModuleType::Asset { .. } | ModuleType::Raw => ArtifactKind::Binary,
        }
    }

    /// Assets and raw copies are never scanned for imports
    pub fn is_resource(&self) -> bool {
        matches!(self, ModuleType::Asset { .. } | ModuleType::Raw)
    }

    /// Type of a virtual module created from a side artifact
    pub fn for_side_artifact(kind: ArtifactKind) -> Self {
        match kind {
            ArtifactKind::Script => ModuleType::Javascript,
            ArtifactKind::Style => ModuleType::Style,
            ArtifactKind::Binary => ModuleType::Raw,
        }
    }
}

/// Outcome of matching a path
#[derive(Debug, Clone)]
pub struct RuleMatch {
    pub chain: TransformChain,
    pub module_type: ModuleType,
    /// Indices of the rules that matched
    pub rules: Vec<usize>,
}

struct CompiledRule {
    test: Regex,
    stages: Vec<ChainStage>,
    resource_type: Option<ResourceTypeConfig>,
    asset_kind: Option<String>,
    exclusive: bool,
    inline_threshold: Option<u64>,
}

pub struct RuleMatcher {
    rules: Vec<CompiledRule>,
    json: Option<Arc<dyn Transform>>,
    fallback_raw_copy: bool,
}

impl std::fmt::Debug for RuleMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleMatcher")
            .field("rules", &self.rules.len())
            .field("fallback_raw_copy", &self.fallback_raw_copy)
            .finish()
    }
}

impl RuleMatcher {
    /// Compile rule patterns and resolve transform ids against `registry`
    pub fn new(config: &ModuleConfig, registry: &TransformRegistry) -> Result<Self, ConfigError> {
        let mut rules = Vec::with_capacity(config.rules.len());
        for (index, rule) in config.rules.iter().enumerate() {
            let option = format!("module.rules[{}]", index);
            let test = Regex::new(&rule.test).map_err(|e| ConfigError::InvalidPattern {
                option: format!("{}.test", option),
                message: e.to_string(),
            })?;
            let stages = rule
                .transforms
                .iter()
                .map(|reference| {
                    registry
                        .get(reference.id())
                        .map(|transform| ChainStage {
                            transform,
                            optional: reference.optional(),
                        })
                        .ok_or_else(|| ConfigError::UnknownTransform {
                            id: reference.id().to_string(),
                            option: option.clone(),
                        })
                })
                .collect::<Result<Vec<_>, _>>()?;
            rules.push(CompiledRule {
                test,
                stages,
                resource_type: rule.resource_type,
                asset_kind: rule.asset_kind.clone(),
                exclusive: rule.exclusive,
                inline_threshold: rule.inline_threshold,
            });
        }

        Ok(Self {
            rules,
            json: registry.get("json"),
            fallback_raw_copy: config.fallback_raw_copy,
        })
    }

    /// Transform chain and module type for `path`
    ///
    /// Fails with `UnresolvableModuleType` when no rule matches, the extension
    /// is not a known type, and raw-copy fallback is off.
    pub fn match_path(&self, path: &Path) -> Result<RuleMatch, BuildError> {
        let subject = path_to_string(path);
        let mut stages = Vec::new();
        let mut matched = Vec::new();
        let mut declared_type = None;

        for (index, rule) in self.rules.iter().enumerate() {
            if !rule.test.is_match(&subject) {
                continue;
            }
            matched.push(index);
            stages.extend(rule.stages.iter().cloned());
            if declared_type.is_none() {
                if let Some(resource_type) = rule.resource_type {
                    declared_type = Some(self.declared_module_type(resource_type, rule, path));
                }
            }
            if rule.exclusive {
                break;
            }
        }

        if let Some(module_type) = declared_type {
            return Ok(RuleMatch {
                chain: TransformChain::new(stages),
                module_type,
                rules: matched,
            });
        }

        if let Some((module_type, implicit)) = self.known_type(path) {
            // Implicit transforms only apply when no rule claimed the file.
            if matched.is_empty() {
                stages.extend(implicit);
            }
            return Ok(RuleMatch {
                chain: TransformChain::new(stages),
                module_type,
                rules: matched,
            });
        }

        if !matched.is_empty() && !stages.is_empty() {
            // A rule with transforms but no declared type produces code.
            return Ok(RuleMatch {
                chain: TransformChain::new(stages),
                module_type: ModuleType::Javascript,
                rules: matched,
            });
        }

        if self.fallback_raw_copy {
            return Ok(RuleMatch {
                chain: TransformChain::new(stages),
                module_type: ModuleType::Raw,
                rules: matched,
            });
        }

        Err(BuildError::UnresolvableModuleType {
            path: path.to_path_buf(),
        })
    }

    fn declared_module_type(
        &self,
        resource_type: ResourceTypeConfig,
        rule: &CompiledRule,
        path: &Path,
    ) -> ModuleType {
        let kind = || {
            rule.asset_kind
                .clone()
                .or_else(|| asset_kind_for(&extension(path)).map(str::to_string))
                .unwrap_or_else(|| "asset".to_string())
        };
        match resource_type {
            ResourceTypeConfig::Javascript => ModuleType::Javascript,
            ResourceTypeConfig::Style => ModuleType::Style,
            ResourceTypeConfig::Asset => ModuleType::Asset {
                policy: AssetPolicy::Auto {
                    threshold: rule.inline_threshold,
                },
                kind: kind(),
            },
            ResourceTypeConfig::AssetInline => ModuleType::Asset {
                policy: AssetPolicy::Inline,
                kind: kind(),
            },
            ResourceTypeConfig::AssetResource => ModuleType::Asset {
                policy: AssetPolicy::Resource,
                kind: kind(),
            },
            ResourceTypeConfig::Raw => ModuleType::Raw,
        }
    }

    /// Types recognised by extension alone, with any implicit transform
    fn known_type(&self, path: &Path) -> Option<(ModuleType, Vec<ChainStage>)> {
        let ext = extension(path);
        match ext.as_str() {
            "js" | "mjs" | "cjs" | "jsx" => Some((ModuleType::Javascript, Vec::new())),
            "css" => Some((ModuleType::Style, Vec::new())),
            "json" => Some(match &self.json {
                Some(json) => (
                    ModuleType::Javascript,
                    vec![ChainStage {
                        transform: Arc::clone(json),
                        optional: false,
                    }],
                ),
                None => (ModuleType::Raw, Vec::new()),
            }),
            other => asset_kind_for(other).map(|kind| {
                (
                    ModuleType::Asset {
                        policy: AssetPolicy::Auto { threshold: None },
                        kind: kind.to_string(),
                    },
                    Vec::new(),
                )
            }),
        }
    }
}

fn extension(path: &Path) -> String {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default()
}

/// Threshold bucket for well-known asset extensions
fn asset_kind_for(ext: &str) -> Option<&'static str> {
    match ext {
        "png" | "jpg" | "jpeg" | "gif" | "svg" | "webp" | "avif" | "ico" | "bmp" => Some("image"),
        "woff" | "woff2" | "ttf" | "otf" | "eot" => Some("font"),
        "mp4" | "webm" | "ogg" | "mp3" | "wav" | "flac" | "aac" => Some("media"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentExt;
    use sheaf_config::{RuleConfig, TransformRef};

    fn rule(test: &str, transforms: &[&str]) -> RuleConfig {
        RuleConfig {
            test: test.to_string(),
            transforms: transforms
                .iter()
                .map(|id| TransformRef::Id(id.to_string()))
                .collect(),
            ..RuleConfig::default()
        }
    }

    fn matcher(rules: Vec<RuleConfig>) -> RuleMatcher {
        let config = ModuleConfig {
            rules,
            ..ModuleConfig::default()
        };
        RuleMatcher::new(&config, &TransformRegistry::with_builtins()).unwrap()
    }

    fn names(m: &RuleMatch) -> Vec<&'static str> {
        m.chain.declared().iter().map(|s| s.transform.name()).collect()
    }

    #[test]
    fn test_first_exclusive_rule_wins() {
        let m = matcher(vec![
            rule(r"\.txt$", &["raw"]),
            rule(r"\.(txt|md)$", &["identity"]),
        ]);
        let result = m.match_path(Path::new("/p/readme.txt")).unwrap();
        assert_eq!(names(&result), vec!["raw"]);
        assert_eq!(result.rules, vec![0]);
        assert_eq!(result.module_type, ModuleType::Javascript);
    }

    #[test]
    fn test_non_exclusive_rules_append() {
        let mut lint = rule(r"\.css$", &["identity"]);
        lint.exclusive = false;
        let mut styles = rule(r"\.css$", &["extract-css"]);
        styles.resource_type = Some(ResourceTypeConfig::Style);

        let m = matcher(vec![lint, styles, rule(r"\.css$", &["raw"])]);
        let result = m.match_path(Path::new("/p/app.css")).unwrap();
        assert_eq!(names(&result), vec!["identity", "extract-css"]);
        assert_eq!(result.module_type, ModuleType::Style);
        assert_eq!(result.rules, vec![0, 1]);
    }

    #[test]
    fn test_declared_asset_type() {
        let mut images = rule(r"\.(png|jpe?g)$", &[]);
        images.resource_type = Some(ResourceTypeConfig::Asset);
        images.inline_threshold = Some(50 * 1024);

        let m = matcher(vec![images]);
        // Patterns are case sensitive, so this one falls back to the known image type.
        let result = m.match_path(Path::new("/p/img/logo.PNG")).unwrap();
        assert!(result.rules.is_empty());
        assert_eq!(
            result.module_type,
            ModuleType::Asset {
                policy: AssetPolicy::Auto { threshold: None },
                kind: "image".to_string(),
            }
        );

        let result = m.match_path(Path::new("/p/img/logo.png")).unwrap();
        assert_eq!(
            result.module_type,
            ModuleType::Asset {
                policy: AssetPolicy::Auto {
                    threshold: Some(50 * 1024)
                },
                kind: "image".to_string(),
            }
        );
    }

    #[test]
    fn test_known_types_without_rules() {
        let m = matcher(Vec::new());
        assert_eq!(
            m.match_path(Path::new("/p/a.mjs")).unwrap().module_type,
            ModuleType::Javascript
        );
        assert_eq!(
            m.match_path(Path::new("/p/a.css")).unwrap().module_type,
            ModuleType::Style
        );
        let json = m.match_path(Path::new("/p/data.json")).unwrap();
        assert_eq!(names(&json), vec!["json"]);
        let font = m.match_path(Path::new("/p/f.woff2")).unwrap();
        assert!(matches!(font.module_type, ModuleType::Asset { ref kind, .. } if kind == "font"));
    }

    #[test]
    fn test_unknown_type_fails_without_fallback() {
        let m = matcher(Vec::new());
        let err = m.match_path(Path::new("/p/shader.glsl")).unwrap_err();
        assert!(matches!(err, BuildError::UnresolvableModuleType { .. }));
    }

    #[test]
    fn test_unknown_type_with_raw_fallback() {
        let config = ModuleConfig {
            fallback_raw_copy: true,
            ..ModuleConfig::default()
        };
        let m = RuleMatcher::new(&config, &TransformRegistry::with_builtins()).unwrap();
        let result = m.match_path(Path::new("/p/shader.glsl")).unwrap();
        assert_eq!(result.module_type, ModuleType::Raw);
        assert!(result.chain.is_empty());
    }

    #[test]
    fn test_rule_with_transforms_implies_javascript() {
        let m = matcher(vec![rule(r"\.vue$", &["identity"])]);
        let result = m.match_path(Path::new("/p/App.vue")).unwrap();
        assert_eq!(result.module_type, ModuleType::Javascript);
    }

    #[test]
    fn test_unknown_transform_is_config_error() {
        let config = ModuleConfig {
            rules: vec![rule(r"\.ts$", &["ts"])],
            ..ModuleConfig::default()
        };
        let err = RuleMatcher::new(&config, &TransformRegistry::with_builtins()).unwrap_err();
        assert_eq!(
            err,
            ConfigError::UnknownTransform {
                id: "ts".to_string(),
                option: "module.rules[0]".to_string(),
            }
        );
    }

    #[test]
    fn test_invalid_pattern_is_config_error() {
        let config = ModuleConfig {
            rules: vec![rule(r"\.(ts$", &[])],
            ..ModuleConfig::default()
        };
        let err = RuleMatcher::new(&config, &TransformRegistry::with_builtins()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern { ref option, .. } if option == "module.rules[0].test"));
    }
}
