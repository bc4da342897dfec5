//! In-memory file system implementation

use crate::error::{VfsError, VfsResult};
use crate::VirtualFileSystem;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

type FileMap = BTreeMap<String, Vec<u8>>;

/// An in-memory file system implementation.
///
/// Files live in a `BTreeMap` keyed by normalized path. Directories are
/// implicit: a directory exists while any file lives below it.
/// Clones share the same storage.
///
/// # Example
/// ```
/// use sheaf_vfs::{MemoryFileSystem, VirtualFileSystem};
/// use std::path::Path;
///
/// let fs = MemoryFileSystem::with_files([("/src/index.js", "export default 1;")]);
/// assert_eq!(fs.read_file(Path::new("/src/index.js")).unwrap(), b"export default 1;");
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryFileSystem {
    files: Arc<RwLock<FileMap>>,
}

impl MemoryFileSystem {
    /// Create a new empty memory file system.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new memory file system pre-populated with files.
    pub fn with_files<I, S, C>(files: I) -> Self
    where
        I: IntoIterator<Item = (S, C)>,
        S: AsRef<str>,
        C: AsRef<[u8]>,
    {
        let map = files
            .into_iter()
            .map(|(path, content)| {
                (
                    normalize_path(Path::new(path.as_ref())),
                    content.as_ref().to_vec(),
                )
            })
            .collect();
        Self {
            files: Arc::new(RwLock::new(map)),
        }
    }

    /// All stored file paths, sorted
    pub fn paths(&self) -> Vec<PathBuf> {
        match self.files.read() {
            Ok(files) => files.keys().map(PathBuf::from).collect(),
            Err(_) => Vec::new(),
        }
    }

    fn read_guard(&self) -> VfsResult<RwLockReadGuard<'_, FileMap>> {
        self.files.read().map_err(|_| VfsError::Custom {
            message: String::from("Lock poisoned"),
        })
    }

    fn write_guard(&self) -> VfsResult<RwLockWriteGuard<'_, FileMap>> {
        self.files.write().map_err(|_| VfsError::Custom {
            message: String::from("Lock poisoned"),
        })
    }
}

/// Forward slashes, no trailing separator
fn normalize_path(path: &Path) -> String {
    let normalized = path.to_string_lossy().replace('\\', "/");
    match normalized.trim_end_matches('/') {
        "" if normalized.starts_with('/') => "/".to_string(),
        trimmed => trimmed.to_string(),
    }
}

fn dir_prefix(normalized: &str) -> String {
    if normalized.ends_with('/') {
        normalized.to_string()
    } else {
        format!("{}/", normalized)
    }
}

impl VirtualFileSystem for MemoryFileSystem {
    fn read_file(&self, path: &Path) -> VfsResult<Vec<u8>> {
        let normalized = normalize_path(path);
        self.read_guard()?
            .get(&normalized)
            .cloned()
            .ok_or(VfsError::NotFound { path: normalized })
    }

    fn write_file(&self, path: &Path, content: &[u8]) -> VfsResult<()> {
        let normalized = normalize_path(path);
        self.write_guard()?.insert(normalized, content.to_vec());
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.is_file(path) || self.is_dir(path)
    }

    fn is_file(&self, path: &Path) -> bool {
        let normalized = normalize_path(path);
        self.read_guard()
            .map(|files| files.contains_key(&normalized))
            .unwrap_or(false)
    }

    fn is_dir(&self, path: &Path) -> bool {
        let prefix = dir_prefix(&normalize_path(path));
        self.read_guard()
            .map(|files| {
                files
                    .range(prefix.clone()..)
                    .next()
                    .is_some_and(|(key, _)| key.starts_with(&prefix))
            })
            .unwrap_or(false)
    }

    fn list_dir(&self, path: &Path) -> VfsResult<Vec<PathBuf>> {
        let normalized = normalize_path(path);
        let prefix = dir_prefix(&normalized);
        let files = self.read_guard()?;
        let children: BTreeSet<String> = files
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .filter_map(|(key, _)| key[prefix.len()..].split('/').next())
            .map(|child| format!("{}{}", prefix, child))
            .collect();
        if children.is_empty() {
            return Err(if files.contains_key(&normalized) {
                VfsError::NotADirectory { path: normalized }
            } else {
                VfsError::NotFound { path: normalized }
            });
        }
        Ok(children.into_iter().map(PathBuf::from).collect())
    }

    fn remove_file(&self, path: &Path) -> VfsResult<()> {
        let normalized = normalize_path(path);
        match self.write_guard()?.remove(&normalized) {
            Some(_) => Ok(()),
            None => Err(VfsError::NotFound { path: normalized }),
        }
    }

    fn remove_dir_all(&self, path: &Path) -> VfsResult<()> {
        let prefix = dir_prefix(&normalize_path(path));
        self.write_guard()?.retain(|key, _| !key.starts_with(&prefix));
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> VfsResult<()> {
        let from = normalize_path(from);
        let to = normalize_path(to);
        let mut files = self.write_guard()?;
        if let Some(content) = files.remove(&from) {
            files.insert(to, content);
            return Ok(());
        }

        let prefix = dir_prefix(&from);
        let moved: Vec<String> = files
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .map(|(key, _)| key.clone())
            .collect();
        if moved.is_empty() {
            return Err(VfsError::NotFound { path: from });
        }
        let target = dir_prefix(&to);
        for key in moved {
            if let Some(content) = files.remove(&key) {
                files.insert(format!("{}{}", target, &key[prefix.len()..]), content);
            }
        }
        Ok(())
    }
}
