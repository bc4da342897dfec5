//! Chunk model
//!
//! A chunk is an output unit holding a set of modules. A chunk group is the
//! ordered list of chunks one boundary (an entry point or a dynamic import
//! target) has to load, dependencies first.

use crate::graph::ModuleId;
use serde::Serialize;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChunkId(pub u32);

impl ChunkId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Loaded at page start by some entry, or only on demand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    Initial,
    Async,
}

/// Why a chunk exists
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkOrigin {
    /// Base chunk of an entry point
    Entry { name: String },
    /// Base chunk of a dynamic import target
    Async { root: ModuleId },
    /// Extracted by the cache group `group`
    Split { group: String },
}

#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: ChunkId,
    pub name: String,
    pub kind: ChunkKind,
    pub origin: ChunkOrigin,
    pub modules: BTreeSet<ModuleId>,
    pub size: u64,
    /// Chunks that must be loaded before this one
    pub dependencies: Vec<ChunkId>,
}

impl Chunk {
    pub fn is_entry(&self) -> bool {
        matches!(self.origin, ChunkOrigin::Entry { .. })
    }
}

/// Chunks one boundary loads, in load order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkGroup {
    pub name: String,
    pub root: ModuleId,
    pub initial: bool,
    pub chunks: Vec<ChunkId>,
}

#[derive(Debug, Clone, Default)]
pub struct ChunkGraph {
    pub chunks: Vec<Chunk>,
    /// One group per entry, in configuration order
    pub entrypoints: Vec<ChunkGroup>,
    /// One group per dynamic import target, in discovery order
    pub async_groups: Vec<ChunkGroup>,
    /// Every chunk after the chunks it depends on
    pub load_order: Vec<ChunkId>,
}

impl ChunkGraph {
    pub fn chunk(&self, id: ChunkId) -> &Chunk {
        &self.chunks[id.index()]
    }

    pub fn by_name(&self, name: &str) -> Option<&Chunk> {
        self.chunks.iter().find(|chunk| chunk.name == name)
    }

    /// Chunks containing `module`
    pub fn chunks_of(&self, module: ModuleId) -> Vec<ChunkId> {
        self.chunks
            .iter()
            .filter(|chunk| chunk.modules.contains(&module))
            .map(|chunk| chunk.id)
            .collect()
    }

    pub fn entrypoint(&self, name: &str) -> Option<&ChunkGroup> {
        self.entrypoints.iter().find(|group| group.name == name)
    }

    pub fn async_group(&self, root: ModuleId) -> Option<&ChunkGroup> {
        self.async_groups.iter().find(|group| group.root == root)
    }
}
