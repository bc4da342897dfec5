//! Native file system implementation

use crate::error::{VfsError, VfsResult};
use crate::VirtualFileSystem;
use std::path::{Path, PathBuf};

/// A native OS file system implementation wrapping `std::fs`.
#[derive(Debug, Clone, Default)]
pub struct NativeFileSystem;

impl NativeFileSystem {
    /// Create a new native file system.
    pub fn new() -> Self {
        Self
    }
}

impl VirtualFileSystem for NativeFileSystem {
    fn read_file(&self, path: &Path) -> VfsResult<Vec<u8>> {
        std::fs::read(path).map_err(|e| VfsError::from_io(path, e))
    }

    fn write_file(&self, path: &Path, content: &[u8]) -> VfsResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| VfsError::from_io(parent, e))?;
        }
        std::fs::write(path, content).map_err(|e| VfsError::from_io(path, e))
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn list_dir(&self, path: &Path) -> VfsResult<Vec<PathBuf>> {
        if path.is_file() {
            return Err(VfsError::NotADirectory {
                path: path.to_string_lossy().to_string(),
            });
        }
        let mut children = std::fs::read_dir(path)
            .map_err(|e| VfsError::from_io(path, e))?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| VfsError::from_io(path, e))?;
        children.sort();
        Ok(children)
    }

    fn remove_file(&self, path: &Path) -> VfsResult<()> {
        std::fs::remove_file(path).map_err(|e| VfsError::from_io(path, e))
    }

    fn remove_dir_all(&self, path: &Path) -> VfsResult<()> {
        match std::fs::remove_dir_all(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(VfsError::from_io(path, e)),
        }
    }

    fn rename(&self, from: &Path, to: &Path) -> VfsResult<()> {
        if let Some(parent) = to.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| VfsError::from_io(parent, e))?;
        }
        std::fs::rename(from, to).map_err(|e| VfsError::from_io(from, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_write_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let fs = NativeFileSystem::new();
        let target = dir.path().join("dist/css/main.css");

        fs.write_file(&target, b"body{}").unwrap();
        assert!(fs.is_file(&target));
        assert!(fs.is_dir(&dir.path().join("dist/css")));
        assert_eq!(fs.read_file(&target).unwrap(), b"body{}");
    }

    #[test]
    fn test_native_list_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let fs = NativeFileSystem::new();
        fs.write_file(&dir.path().join("out/b.js"), b"b").unwrap();
        fs.write_file(&dir.path().join("out/a.js"), b"a").unwrap();

        let listed = fs.list_dir(&dir.path().join("out")).unwrap();
        assert_eq!(
            listed,
            vec![dir.path().join("out/a.js"), dir.path().join("out/b.js")]
        );

        fs.remove_file(&dir.path().join("out/a.js")).unwrap();
        fs.remove_dir_all(&dir.path().join("out")).unwrap();
        assert!(!fs.exists(&dir.path().join("out")));
        fs.remove_dir_all(&dir.path().join("out")).unwrap();
    }

    #[test]
    fn test_native_rename_directory() {
        let dir = tempfile::tempdir().unwrap();
        let fs = NativeFileSystem::new();
        fs.write_file(&dir.path().join(".out.staging/js/a.js"), b"a").unwrap();

        fs.rename(&dir.path().join(".out.staging"), &dir.path().join("out"))
            .unwrap();
        assert!(!fs.exists(&dir.path().join(".out.staging")));
        assert_eq!(fs.read_file(&dir.path().join("out/js/a.js")).unwrap(), b"a");
    }

    #[test]
    fn test_native_read_missing() {
        let dir = tempfile::tempdir().unwrap();
        let fs = NativeFileSystem::new();
        let err = fs.read_file(&dir.path().join("nope.js")).unwrap_err();
        assert!(matches!(err, VfsError::NotFound { .. }));
    }
}
