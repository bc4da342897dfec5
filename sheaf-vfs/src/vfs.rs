//! VirtualFileSystem trait definition

use crate::error::VfsResult;
use std::path::{Path, PathBuf};

/// Virtual File System trait
///
/// Provides a unified interface for file operations, decoupling the bundler
/// from the storage it reads sources from and writes bundles to.
///
/// # Implementations
/// - `MemoryFileSystem`: In-memory file system, used by tests and dry runs
/// - `NativeFileSystem`: Native OS file system
pub trait VirtualFileSystem: Send + Sync {
    /// Read file contents
    fn read_file(&self, path: &Path) -> VfsResult<Vec<u8>>;

    /// Write file contents
    ///
    /// Creates missing parent directories, truncates an existing file.
    fn write_file(&self, path: &Path, content: &[u8]) -> VfsResult<()>;

    /// Check if path exists
    fn exists(&self, path: &Path) -> bool;

    /// Check if path is a file
    fn is_file(&self, path: &Path) -> bool;

    /// Check if path is a directory
    fn is_dir(&self, path: &Path) -> bool;

    /// Direct children of a directory, sorted by path
    fn list_dir(&self, path: &Path) -> VfsResult<Vec<PathBuf>>;

    /// Remove a single file
    fn remove_file(&self, path: &Path) -> VfsResult<()>;

    /// Remove a directory and everything below it
    ///
    /// Removing a missing directory is not an error.
    fn remove_dir_all(&self, path: &Path) -> VfsResult<()>;

    /// Move a file or directory
    ///
    /// Creates missing parent directories of `to`. A directory may only be
    /// moved onto a path that does not exist.
    fn rename(&self, from: &Path, to: &Path) -> VfsResult<()>;
}
