//! Error types for the bundler engine

use crate::transform::ArtifactKind;
use sheaf_vfs::VfsError;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Invalid or conflicting configuration, reported before any graph work
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("no entry points configured")]
    EmptyEntry,

    #[error("entry '{name}' has an empty path")]
    EmptyEntryPath { name: String },

    #[error("{option} must be greater than zero")]
    ZeroLimit { option: String },

    #[error("invalid pattern in {option}: {message}")]
    InvalidPattern { option: String, message: String },

    #[error("unknown transform '{id}' in {option}")]
    UnknownTransform { id: String, option: String },

    #[error("duplicate cache group key '{key}'")]
    DuplicateCacheGroup { key: String },

    #[error(
        "output directory {} would be cleaned over project sources at {}",
        .output.display(),
        .protected.display()
    )]
    OutputOverlapsSources { output: PathBuf, protected: PathBuf },

    #[error("{option} template '{template}' must contain one of {expected}")]
    AmbiguousTemplate {
        option: String,
        template: String,
        expected: &'static str,
    },
}

/// Failure of a single transform stage
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    #[error("input is not valid UTF-8")]
    InvalidUtf8,

    #[error("expected {expected} input, got {actual}")]
    UnexpectedInput {
        expected: ArtifactKind,
        actual: ArtifactKind,
    },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("{0}")]
    Failed(String),
}

/// Specifier resolution failure
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResolveError {
    #[error("cannot resolve '{specifier}' ({} candidates tried)", .tried.len())]
    NotFound {
        specifier: String,
        tried: Vec<PathBuf>,
    },

    #[error("invalid package.json at {path}: {message}")]
    InvalidPackage { path: PathBuf, message: String },
}

/// Fatal build error
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("cannot resolve '{specifier}' imported from {importer}")]
    Resolution {
        importer: String,
        specifier: String,
        tried: Vec<PathBuf>,
    },

    #[error("invalid package.json at {path}: {message}")]
    Package { path: PathBuf, message: String },

    #[error("transform '{stage}' failed on {path}: {source}")]
    Transform {
        path: PathBuf,
        stage: String,
        #[source]
        source: TransformError,
    },

    #[error("unresolvable module type for {path}: no rule matches and the file type is unknown")]
    UnresolvableModuleType { path: PathBuf },

    #[error("chunk dependency graph contains a cycle: {}", .cycle.join(" -> "))]
    ChunkGraphCycle { cycle: Vec<String> },

    #[error("output file '{filename}' would be written twice with different content")]
    OutputConflict { filename: String },

    #[error("file system error: {0}")]
    Vfs(#[from] VfsError),

    #[error("cannot serialize manifest: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("build cancelled after an earlier failure")]
    Cancelled,

    #[error("worker pool error: {0}")]
    WorkerPool(String),
}

impl BuildError {
    pub(crate) fn from_resolve(importer: &str, specifier: &str, err: ResolveError) -> Self {
        match err {
            ResolveError::NotFound { tried, .. } => BuildError::Resolution {
                importer: importer.to_string(),
                specifier: specifier.to_string(),
                tried,
            },
            ResolveError::InvalidPackage { path, message } => {
                BuildError::Package { path, message }
            }
        }
    }
}

/// Non-fatal diagnostics collected during a build
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// Modules forming an import cycle, in graph order
    ImportCycle { modules: Vec<String> },
    /// Configuration key that no option recognised
    UnknownOption { path: String },
    /// An optional transform stage failed and was skipped
    OptionalTransformFailed {
        module: String,
        stage: String,
        message: String,
    },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::ImportCycle { modules } => {
                write!(f, "import cycle: {}", modules.join(" -> "))
            }
            Warning::UnknownOption { path } => {
                write!(f, "unrecognised configuration option '{}' ignored", path)
            }
            Warning::OptionalTransformFailed {
                module,
                stage,
                message,
            } => write!(
                f,
                "optional transform '{}' skipped for {}: {}",
                stage, module, message
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_error_names_importer_and_specifier() {
        let err = BuildError::from_resolve(
            "./src/index.js",
            "./missing",
            ResolveError::NotFound {
                specifier: "./missing".to_string(),
                tried: vec![PathBuf::from("/p/src/missing")],
            },
        );
        let message = err.to_string();
        assert!(message.contains("./src/index.js"));
        assert!(message.contains("./missing"));
    }

    #[test]
    fn test_transform_error_keeps_source() {
        let err = BuildError::Transform {
            path: PathBuf::from("/p/data.json"),
            stage: "json".to_string(),
            source: TransformError::Parse("expected value".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "transform 'json' failed on /p/data.json: parse error: expected value"
        );
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_cycle_error_lists_chunks() {
        let err = BuildError::ChunkGraphCycle {
            cycle: vec!["a".to_string(), "b".to_string()],
        };
        assert!(err.to_string().ends_with("a -> b"));
    }
}
