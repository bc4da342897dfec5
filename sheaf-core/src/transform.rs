//! Transform trait and the artifacts it exchanges

use crate::component::Component;
use crate::error::TransformError;
use std::fmt;
use std::path::Path;

/// What an artifact's bytes represent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ArtifactKind {
    /// Executable module code
    Script,
    /// Stylesheet text
    Style,
    /// Opaque bytes (images, fonts, copied files)
    Binary,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::Script => write!(f, "script"),
            ArtifactKind::Style => write!(f, "style"),
            ArtifactKind::Binary => write!(f, "binary"),
        }
    }
}

/// Typed content flowing between transform stages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub content: Vec<u8>,
}

impl Artifact {
    pub fn new(kind: ArtifactKind, content: impl Into<Vec<u8>>) -> Self {
        Self {
            kind,
            content: content.into(),
        }
    }

    pub fn script(content: impl Into<Vec<u8>>) -> Self {
        Self::new(ArtifactKind::Script, content)
    }

    pub fn style(content: impl Into<Vec<u8>>) -> Self {
        Self::new(ArtifactKind::Style, content)
    }

    pub fn binary(content: impl Into<Vec<u8>>) -> Self {
        Self::new(ArtifactKind::Binary, content)
    }

    /// Content as UTF-8 text
    pub fn text(&self) -> Result<&str, TransformError> {
        std::str::from_utf8(&self.content).map_err(|_| TransformError::InvalidUtf8)
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

/// Result of one transform stage: a primary artifact plus side artifacts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformOutput {
    pub primary: Artifact,
    /// Extra artifacts (e.g. an extracted stylesheet) that become their own modules
    pub side: Vec<Artifact>,
}

impl TransformOutput {
    pub fn primary(primary: Artifact) -> Self {
        Self {
            primary,
            side: Vec::new(),
        }
    }

    pub fn with_side(primary: Artifact, side: Vec<Artifact>) -> Self {
        Self { primary, side }
    }
}

/// A per-filetype transformation
///
/// Output must depend only on the input artifact, since the pipeline caches it
/// by content hash. `path` is passed for diagnostics.
pub trait Transform: Component {
    fn apply(&self, input: &Artifact, path: &Path) -> Result<TransformOutput, TransformError>;
}
