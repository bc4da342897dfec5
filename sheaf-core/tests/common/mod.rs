//! Shared fixtures for the integration tests
#![allow(dead_code)]

use serde_json::Value;
use sheaf_core::{BuildError, BuildResult, Bundler, BundlerConfig};
use sheaf_vfs::{MemoryFileSystem, VirtualFileSystem};
use std::path::Path;
use std::sync::Arc;

/// In-memory project rooted at `/p`
pub fn project(files: &[(&str, &str)]) -> MemoryFileSystem {
    MemoryFileSystem::with_files(files.iter().map(|(path, content)| (*path, *content)))
}

pub fn add_binary(fs: &MemoryFileSystem, path: &str, bytes: &[u8]) {
    fs.write_file(Path::new(path), bytes).expect("write fixture");
}

/// Configuration from JSON with the context defaulting to `/p`
pub fn config(mut value: Value) -> BundlerConfig {
    if let Some(object) = value.as_object_mut() {
        object.entry("context").or_insert_with(|| Value::from("/p"));
    }
    serde_json::from_value(value).expect("valid configuration")
}

pub fn bundler(fs: &MemoryFileSystem, config: BundlerConfig) -> Bundler {
    Bundler::new(config, Arc::new(fs.clone()))
}

pub fn build(fs: &MemoryFileSystem, config: BundlerConfig) -> Result<BuildResult, BuildError> {
    bundler(fs, config).build()
}

/// Script source padded with a trailing comment to exactly `size` bytes
pub fn padded(code: &str, size: usize) -> String {
    let mut out = format!("{}\n//", code);
    while out.len() < size {
        out.push('x');
    }
    out
}

pub fn text(result: &BuildResult, file: &str) -> String {
    let bytes = result
        .files
        .get(file)
        .unwrap_or_else(|| panic!("missing output file {file}; have {:?}", result.files.keys()));
    String::from_utf8(bytes.clone()).expect("utf-8 output")
}

/// Names of the chunks holding `module`
pub fn chunks_of<'a>(result: &'a BuildResult, module: &str) -> &'a [String] {
    result
        .manifest
        .modules
        .get(module)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Chunk names in an order where every chunk follows its dependencies,
/// or `None` if the dependency graph has a cycle
pub fn topological_chunks(result: &BuildResult) -> Option<Vec<String>> {
    let chunks = &result.manifest.chunks;
    let mut done: Vec<String> = Vec::new();
    while done.len() < chunks.len() {
        let ready = chunks.iter().find(|(name, chunk)| {
            !done.contains(name) && chunk.dependencies.iter().all(|dep| done.contains(dep))
        });
        match ready {
            Some((name, _)) => done.push(name.clone()),
            None => return None,
        }
    }
    Some(done)
}
