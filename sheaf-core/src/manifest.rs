//! Build manifest
//!
//! Hand-off for whatever injects the output into HTML: which files each
//! entry point and dynamic import needs, and where every module ended up.

use crate::chunk::ChunkKind;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Entry name -> files in load order
    pub entrypoints: BTreeMap<String, Vec<String>>,
    pub chunks: BTreeMap<String, ManifestChunk>,
    /// Module key -> names of the chunks containing it
    pub modules: BTreeMap<String, Vec<String>>,
    /// Dynamic import target key -> files in load order
    pub async_chunks: BTreeMap<String, Vec<String>>,
    pub assets: BTreeMap<String, ManifestAsset>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestChunk {
    pub id: u32,
    pub kind: ChunkKind,
    pub files: Vec<String>,
    pub modules: Vec<String>,
    /// Names of chunks loaded before this one
    pub dependencies: Vec<String>,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestAsset {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    pub inline: bool,
    pub size: u64,
}

impl Manifest {
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut bytes = serde_json::to_vec_pretty(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    /// Every file an entry point's page has to load
    pub fn files_for_entry(&self, name: &str) -> &[String] {
        self.entrypoints.get(name).map(Vec::as_slice).unwrap_or(&[])
    }
}
