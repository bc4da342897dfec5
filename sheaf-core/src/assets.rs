//! Asset classifier
//!
//! Decides for every resource module whether it is inlined as a data URI or
//! emitted as its own content-addressed file. Decisions depend only on the
//! asset bytes, the thresholds and the graph shape, so identical inputs give
//! identical decisions across builds.

use crate::graph::{ModuleGraph, ModuleId};
use crate::rules::{AssetPolicy, ModuleType};
use crate::template::{render, TemplateData};
use base64::Engine;
use sheaf_config::AssetConfig;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetDecision {
    Inline { data_uri: String },
    Emit { filename: String },
}

impl AssetDecision {
    pub fn is_inline(&self) -> bool {
        matches!(self, AssetDecision::Inline { .. })
    }
}

pub struct AssetClassifier<'a> {
    config: &'a AssetConfig,
    filename_template: &'a str,
}

impl<'a> AssetClassifier<'a> {
    pub fn new(config: &'a AssetConfig, filename_template: &'a str) -> Self {
        Self {
            config,
            filename_template,
        }
    }

    /// Decision for every asset and raw module of the graph
    pub fn classify(&self, graph: &ModuleGraph) -> BTreeMap<ModuleId, AssetDecision> {
        let candidates: BTreeSet<ModuleId> = graph
            .modules()
            .iter()
            .filter(|module| match &module.module_type {
                ModuleType::Asset {
                    policy: AssetPolicy::Auto { threshold },
                    kind,
                } => {
                    let limit = threshold.unwrap_or_else(|| self.config.threshold_for(kind));
                    module.size < limit
                }
                _ => false,
            })
            .map(|module| module.id)
            .collect();
        let demoted = self.over_budget(graph, &candidates);

        let mut decisions = BTreeMap::new();
        for module in graph.modules() {
            let inline = match &module.module_type {
                ModuleType::Asset {
                    policy: AssetPolicy::Inline,
                    ..
                } => true,
                ModuleType::Asset { .. } => {
                    candidates.contains(&module.id) && !demoted.contains(&module.id)
                }
                ModuleType::Raw => false,
                _ => continue,
            };

            let decision = if inline {
                AssetDecision::Inline {
                    data_uri: data_uri(&module.path, &module.artifact.content),
                }
            } else {
                AssetDecision::Emit {
                    filename: self.filename(&module.path, &module.content_hash),
                }
            };
            debug!(
                target: "sheaf::graph",
                module = %module.key,
                size = module.size,
                inline,
                "Asset classified"
            );
            decisions.insert(module.id, decision);
        }
        decisions
    }

    /// Inline candidates that exceed some importer's inline budget
    ///
    /// Each importer keeps its smallest candidates (ties by module id) up to
    /// `maxInlinePerModule`; an asset demoted by any importer is emitted.
    fn over_budget(&self, graph: &ModuleGraph, candidates: &BTreeSet<ModuleId>) -> BTreeSet<ModuleId> {
        let mut demoted = BTreeSet::new();
        let Some(budget) = self.config.max_inline_per_module else {
            return demoted;
        };

        for module in graph.modules() {
            let mut inlined: Vec<ModuleId> = module
                .dependencies
                .iter()
                .map(|dep| dep.target)
                .filter(|target| candidates.contains(target))
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            inlined.sort_by_key(|&id| (graph.get(id).size, id));
            demoted.extend(inlined.into_iter().skip(budget));
        }
        demoted
    }

    fn filename(&self, path: &Path, content_hash: &str) -> String {
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "asset".to_string());
        let ext = path
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();
        render(
            self.filename_template,
            &TemplateData {
                name: &name,
                id: None,
                content_hash,
                hash: content_hash,
                ext: &ext,
            },
        )
    }
}

pub fn data_uri(path: &Path, bytes: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        mime_type(path),
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

fn mime_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "avif" => "image/avif",
        "ico" => "image/x-icon",
        "bmp" => "image/bmp",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        "eot" => "application/vnd.ms-fontobject",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Dependency, Module, ModuleKind};
    use crate::hash::content_hash;
    use crate::scanner::ImportKind;
    use crate::transform::Artifact;
    use std::path::PathBuf;

    fn add_asset(graph: &mut ModuleGraph, path: &str, size: usize, policy: AssetPolicy, kind: &str) -> ModuleId {
        let key = format!(".{}", path.trim_start_matches("/p"));
        graph
            .insert_with(&key, |id| {
                let mut module = Module::pending(id, key.clone(), PathBuf::from(path), None, ModuleKind::Source);
                module.module_type = ModuleType::Asset {
                    policy,
                    kind: kind.to_string(),
                };
                let bytes = vec![(size % 251) as u8; size];
                module.content_hash = content_hash(&bytes);
                module.size = size as u64;
                module.artifact = Artifact::binary(bytes);
                module
            })
            .0
    }

    fn importer(graph: &mut ModuleGraph, key: &str, targets: &[ModuleId]) {
        let (id, _) = graph.insert_with(key, |id| {
            Module::pending(id, key.to_string(), PathBuf::from(key), None, ModuleKind::Source)
        });
        for target in targets {
            graph.add_dependency(
                id,
                Dependency {
                    specifier: format!("./{}", target.0),
                    target: *target,
                    kind: ImportKind::Static,
                },
            );
        }
    }

    fn image_config() -> AssetConfig {
        let mut config = AssetConfig::default();
        config.inline_thresholds.insert("image".to_string(), 50 * 1024);
        config.inline_thresholds.insert("font".to_string(), 10 * 1024);
        config
    }

    #[test]
    fn test_threshold_per_kind() {
        let mut graph = ModuleGraph::new();
        let auto = AssetPolicy::Auto { threshold: None };
        let small = add_asset(&mut graph, "/p/img/small.png", 5 * 1024, auto, "image");
        let large = add_asset(&mut graph, "/p/img/large.png", 60 * 1024, auto, "image");
        let font = add_asset(&mut graph, "/p/fonts/a.woff2", 20 * 1024, auto, "font");
        let exact = add_asset(&mut graph, "/p/img/exact.png", 50 * 1024, auto, "image");

        let config = image_config();
        let decisions = AssetClassifier::new(&config, "[name].[hash:8][ext]").classify(&graph);

        assert!(decisions[&small].is_inline());
        assert!(!decisions[&large].is_inline());
        assert!(!decisions[&font].is_inline());
        assert!(!decisions[&exact].is_inline(), "at the threshold the asset is emitted");

        let hash = &graph.get(large).content_hash;
        assert_eq!(
            decisions[&large],
            AssetDecision::Emit {
                filename: format!("large.{}.png", &hash[..8])
            }
        );
        match &decisions[&small] {
            AssetDecision::Inline { data_uri } => assert!(data_uri.starts_with("data:image/png;base64,")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_explicit_policies_and_rule_threshold() {
        let mut graph = ModuleGraph::new();
        let forced_inline = add_asset(&mut graph, "/p/a.svg", 900 * 1024, AssetPolicy::Inline, "image");
        let forced_file = add_asset(&mut graph, "/p/b.svg", 10, AssetPolicy::Resource, "image");
        let rule_limit = add_asset(&mut graph, "/p/c.png", 2000, AssetPolicy::Auto { threshold: Some(1000) }, "image");

        let config = image_config();
        let decisions = AssetClassifier::new(&config, "[hash][ext]").classify(&graph);
        assert!(decisions[&forced_inline].is_inline());
        assert!(!decisions[&forced_file].is_inline());
        assert!(!decisions[&rule_limit].is_inline());
    }

    #[test]
    fn test_identical_bytes_share_filename() {
        let mut graph = ModuleGraph::new();
        let auto = AssetPolicy::Auto { threshold: None };
        let a = add_asset(&mut graph, "/p/a/logo.png", 70 * 1024, auto, "image");
        let b = add_asset(&mut graph, "/p/b/logo.png", 70 * 1024, auto, "image");

        let config = image_config();
        let decisions = AssetClassifier::new(&config, "[name].[hash:8][ext]").classify(&graph);
        assert_eq!(decisions[&a], decisions[&b]);
    }

    #[test]
    fn test_inline_budget_per_importer() {
        let mut graph = ModuleGraph::new();
        let auto = AssetPolicy::Auto { threshold: None };
        let tiny = add_asset(&mut graph, "/p/tiny.png", 100, auto, "image");
        let small = add_asset(&mut graph, "/p/small.png", 200, auto, "image");
        let medium = add_asset(&mut graph, "/p/medium.png", 300, auto, "image");
        importer(&mut graph, "./page.js", &[medium, small, tiny]);

        let mut config = image_config();
        config.max_inline_per_module = Some(2);
        let decisions = AssetClassifier::new(&config, "[name].[hash:8][ext]").classify(&graph);

        assert!(decisions[&tiny].is_inline());
        assert!(decisions[&small].is_inline());
        assert!(!decisions[&medium].is_inline());
    }
}
