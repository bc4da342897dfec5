//! Sheaf Virtual File System
//!
//! Every read the bundler performs and every file it emits goes through
//! [`VirtualFileSystem`], so builds can run fully in memory.
//!
//! # Usage
//! ```rust
//! use sheaf_vfs::{MemoryFileSystem, VirtualFileSystem};
//! use std::path::Path;
//!
//! let fs = MemoryFileSystem::new();
//! fs.write_file(Path::new("/project/dist/main.js"), b"hello").unwrap();
//! assert!(fs.is_dir(Path::new("/project/dist")));
//! ```

mod error;
mod memory;
mod native;
mod vfs;

pub use error::{VfsError, VfsResult};
pub use memory::MemoryFileSystem;
pub use native::NativeFileSystem;
pub use vfs::VirtualFileSystem;
