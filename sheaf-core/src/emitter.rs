//! Output emitter
//!
//! Renders chunks, emitted assets and the manifest into a map of output
//! file name to bytes, and writes that map through the filesystem
//! collaborator.

use crate::assets::AssetDecision;
use crate::chunk::{Chunk, ChunkGraph, ChunkId};
use crate::error::BuildError;
use crate::graph::{Module, ModuleGraph, ModuleId, ModuleKind};
use crate::hash::{content_hash, short_hash};
use crate::manifest::{Manifest, ManifestAsset, ManifestChunk};
use crate::runtime::{render_bootstrap, render_module, PRELUDE};
use crate::scanner::{rewrite_dynamic_imports, rewrite_style_urls, strip_style_imports, ImportKind};
use crate::template::{render, TemplateData};
use sheaf_config::OutputConfig;
use sheaf_vfs::VirtualFileSystem;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, Default)]
pub struct Emitted {
    pub files: BTreeMap<String, Vec<u8>>,
    pub manifest: Manifest,
}

/// Output files keyed by name; a name may only be reused for identical bytes
#[derive(Default)]
struct OutputFiles {
    files: BTreeMap<String, Vec<u8>>,
}

impl OutputFiles {
    fn insert(&mut self, filename: String, content: Vec<u8>) -> Result<(), BuildError> {
        match self.files.get(&filename) {
            Some(existing) if *existing == content => Ok(()),
            Some(_) => Err(BuildError::OutputConflict { filename }),
            None => {
                debug!(target: "sheaf::emit", file = %filename, size = content.len(), "File rendered");
                self.files.insert(filename, content);
                Ok(())
            }
        }
    }
}

pub struct Emitter<'a> {
    output: &'a OutputConfig,
    filename: &'a str,
    minimize: bool,
}

impl<'a> Emitter<'a> {
    /// `filename` is the resolved chunk filename template
    pub fn new(output: &'a OutputConfig, filename: &'a str, minimize: bool) -> Self {
        Self {
            output,
            filename,
            minimize,
        }
    }

    pub fn emit(
        &self,
        graph: &ModuleGraph,
        chunks: &ChunkGraph,
        assets: &BTreeMap<ModuleId, AssetDecision>,
    ) -> Result<Emitted, BuildError> {
        let hash = compilation_hash(graph);
        let mut files = OutputFiles::default();
        let mut manifest = Manifest::default();

        let mut urls: HashMap<ModuleId, String> = HashMap::new();
        for (&id, decision) in assets {
            let module = graph.get(id);
            let file = match decision {
                AssetDecision::Inline { data_uri } => {
                    urls.insert(id, data_uri.clone());
                    None
                }
                AssetDecision::Emit { filename } => {
                    files.insert(filename.clone(), module.artifact.content.clone())?;
                    urls.insert(id, format!("{}{}", self.output.public_path, filename));
                    Some(filename.clone())
                }
            };
            manifest.assets.insert(
                module.key.clone(),
                ManifestAsset {
                    inline: file.is_none(),
                    file,
                    size: module.size,
                },
            );
        }

        // Entry chunks embed the async map, so every other chunk is named first.
        let mut chunk_files: Vec<Vec<String>> = vec![Vec::new(); chunks.chunks.len()];
        for chunk in chunks.chunks.iter().filter(|chunk| !chunk.is_entry()) {
            chunk_files[chunk.id.index()] =
                self.render_chunk(graph, chunk, &urls, &hash, None, &mut files)?;
        }

        let files_of = |chunk_files: &[Vec<String>], ids: &[ChunkId]| -> Vec<String> {
            ids.iter()
                .flat_map(|id| chunk_files[id.index()].iter().cloned())
                .collect()
        };
        let async_map: BTreeMap<String, Vec<String>> = chunks
            .async_groups
            .iter()
            .map(|group| {
                (
                    graph.get(group.root).key.clone(),
                    files_of(&chunk_files, &group.chunks),
                )
            })
            .collect();

        for group in &chunks.entrypoints {
            let Some(&base) = group.chunks.last() else {
                continue;
            };
            let chunk = chunks.chunk(base);
            if !chunk.is_entry() || !chunk_files[base.index()].is_empty() {
                continue;
            }
            let preloaded = files_of(&chunk_files, &group.chunks[..group.chunks.len() - 1]);
            let bootstrap = render_bootstrap(
                &self.output.public_path,
                &async_map,
                &preloaded,
                &graph.get(group.root).key,
            );
            chunk_files[base.index()] =
                self.render_chunk(graph, chunk, &urls, &hash, Some(bootstrap), &mut files)?;
        }

        for group in &chunks.entrypoints {
            manifest
                .entrypoints
                .insert(group.name.clone(), files_of(&chunk_files, &group.chunks));
        }
        manifest.async_chunks = async_map;
        for chunk in &chunks.chunks {
            manifest.chunks.insert(
                chunk.name.clone(),
                ManifestChunk {
                    id: chunk.id.0,
                    kind: chunk.kind,
                    files: chunk_files[chunk.id.index()].clone(),
                    modules: chunk
                        .modules
                        .iter()
                        .map(|&m| graph.get(m).key.clone())
                        .collect(),
                    dependencies: chunk
                        .dependencies
                        .iter()
                        .map(|&dep| chunks.chunk(dep).name.clone())
                        .collect(),
                    size: chunk.size,
                },
            );
            for &module in &chunk.modules {
                manifest
                    .modules
                    .entry(graph.get(module).key.clone())
                    .or_default()
                    .push(chunk.name.clone());
            }
        }

        if let Some(name) = &self.output.manifest {
            files.insert(name.clone(), manifest.to_json()?)?;
        }

        info!(
            target: "sheaf::emit",
            files = files.files.len(),
            chunks = chunks.chunks.len(),
            hash = %short_hash(&hash, 8),
            "Output rendered"
        );
        Ok(Emitted {
            files: files.files,
            manifest,
        })
    }

    /// Render one chunk's script file and, when it holds styles, its stylesheet
    fn render_chunk(
        &self,
        graph: &ModuleGraph,
        chunk: &Chunk,
        urls: &HashMap<ModuleId, String>,
        hash: &str,
        bootstrap: Option<String>,
        files: &mut OutputFiles,
    ) -> Result<Vec<String>, BuildError> {
        let mut script = String::from(PRELUDE);
        script.push('\n');
        for &id in &chunk.modules {
            let module = graph.get(id);
            let dependencies: BTreeMap<String, String> = module
                .dependencies
                .iter()
                .map(|dep| (dep.specifier.clone(), graph.get(dep.target).key.clone()))
                .collect();
            script.push_str(&render_module(
                &module.key,
                &dependencies,
                &module_body(module, urls),
                !self.minimize,
            ));

        }
        let styles: Vec<String> = style_order(graph, chunk)
            .into_iter()
            .map(|id| render_style(graph, graph.get(id), urls))
            .collect();
        if let Some(bootstrap) = bootstrap {
            script.push_str(&bootstrap);
        }

        let mut names = Vec::new();
        let script = self.finish(script);
        names.push(self.file_name(self.filename, chunk, hash, &script, ".js"));
        files.insert(names[0].clone(), script)?;

        if !styles.is_empty() {
            let css = self.finish(styles.join("\n"));
            let name = self.file_name(&self.output.css_filename, chunk, hash, &css, ".css");
            files.insert(name.clone(), css)?;
            names.push(name);
        }
        Ok(names)
    }

    fn finish(&self, text: String) -> Vec<u8> {
        if !self.minimize {
            return text.into_bytes();
        }
        let mut out = String::with_capacity(text.len());
        for line in text.lines().filter(|line| !line.trim().is_empty()) {
            out.push_str(line);
            out.push('\n');
        }
        out.into_bytes()
    }

    fn file_name(&self, template: &str, chunk: &Chunk, hash: &str, content: &[u8], ext: &str) -> String {
        render(
            template,
            &TemplateData {
                name: &chunk.name,
                id: Some(chunk.id.0),
                content_hash: &content_hash(content),
                hash,
                ext,
            },
        )
    }
}

fn module_body(module: &Module, urls: &HashMap<ModuleId, String>) -> String {
    match &module.kind {
        ModuleKind::External { global } => format!("module.exports = {};", global),
        ModuleKind::Ignored => String::new(),
        _ if module.is_style() => String::new(),
        _ => match urls.get(&module.id) {
            Some(url) => format!(
                "module.exports = {};",
                serde_json::to_string(url).unwrap_or_else(|_| "\"\"".to_string())
            ),
            None => rewrite_dynamic_imports(&String::from_utf8_lossy(&module.artifact.content)),
        },
    }
}

/// Style modules of `chunk` with every sheet after the sheets it imports
fn style_order(graph: &ModuleGraph, chunk: &Chunk) -> Vec<ModuleId> {
    fn visit(
        graph: &ModuleGraph,
        chunk: &Chunk,
        id: ModuleId,
        seen: &mut HashSet<ModuleId>,
        order: &mut Vec<ModuleId>,
    ) {
        if !seen.insert(id) {
            return;
        }
        let module = graph.get(id);
        for dep in &module.dependencies {
            if dep.kind == ImportKind::Static && chunk.modules.contains(&dep.target) {
                visit(graph, chunk, dep.target, seen, order);
            }
        }
        if module.is_style() {
            order.push(id);
        }
    }

    let mut seen = HashSet::new();
    let mut order = Vec::new();
    for &id in &chunk.modules {
        visit(graph, chunk, id, &mut seen, &mut order);
    }
    order
}

/// Stylesheet text with bundled `@import` rules removed and asset urls rewritten
fn render_style(graph: &ModuleGraph, module: &Module, urls: &HashMap<ModuleId, String>) -> String {
    let target = |request: &str| {
        module
            .dependencies
            .iter()
            .find(|dep| dep.specifier == request)
            .map(|dep| dep.target)
    };
    let css = String::from_utf8_lossy(&module.artifact.content);
    let css = strip_style_imports(&css, |request| {
        target(request).is_some_and(|id| graph.get(id).is_style())
    });
    rewrite_style_urls(&css, |request| target(request).and_then(|id| urls.get(&id)).cloned())
}

/// Hash over every module's identity and content
fn compilation_hash(graph: &ModuleGraph) -> String {
    let mut summary = String::new();
    for module in graph.modules() {
        summary.push_str(&module.key);
        summary.push('\0');
        summary.push_str(&module.content_hash);
        summary.push('\n');
    }
    content_hash(summary.as_bytes())
}

/// Replace the output directory's contents with `files`
///
/// Files are first written to a sibling staging directory. The output
/// directory is only touched once every write has succeeded.
pub fn write_output(
    vfs: &dyn VirtualFileSystem,
    dir: &Path,
    clean: bool,
    files: &BTreeMap<String, Vec<u8>>,
) -> Result<(), BuildError> {
    let staging = staging_dir(dir);
    vfs.remove_dir_all(&staging)?;
    let staged = files
        .iter()
        .try_for_each(|(name, content)| vfs.write_file(&staging.join(name), content));
    if let Err(e) = staged {
        vfs.remove_dir_all(&staging).ok();
        return Err(e.into());
    }

    if clean {
        debug!(target: "sheaf::emit", dir = %dir.display(), "Cleaning output directory");
        vfs.remove_dir_all(dir)?;
        if !files.is_empty() {
            vfs.rename(&staging, dir)?;
        }
    } else {
        for name in files.keys() {
            vfs.rename(&staging.join(name), &dir.join(name))?;
        }
        vfs.remove_dir_all(&staging)?;
    }
    info!(target: "sheaf::emit", dir = %dir.display(), files = files.len(), "Output written");
    Ok(())
}

/// `.<name>.staging` next to the output directory
fn staging_dir(dir: &Path) -> PathBuf {
    let mut name = OsString::from(".");
    name.push(dir.file_name().unwrap_or_else(|| OsStr::new("output")));
    name.push(".staging");
    dir.with_file_name(name)
}
