//! Component trait definitions
//!
//! Transforms are registered as components: each one carries metadata whose
//! `name@version` pair identifies it inside transform-cache keys.

use std::fmt;

/// Metadata about a component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentMetadata {
    /// The component name (unique identifier within its registry)
    pub name: &'static str,
    /// The component version; bump it when output for the same input changes
    pub version: &'static str,
    /// Optional description
    pub description: Option<&'static str>,
}

impl ComponentMetadata {
    /// Create new metadata
    pub fn new(name: &'static str, version: &'static str, description: Option<&'static str>) -> Self {
        Self {
            name,
            version,
            description,
        }
    }
}

impl fmt::Display for ComponentMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// The base trait for all registered components
pub trait Component: Send + Sync {
    /// Get the component metadata
    fn metadata(&self) -> ComponentMetadata;
}

/// Convenience accessors for any component
pub trait ComponentExt: Component {
    /// Get the component name
    fn name(&self) -> &'static str {
        self.metadata().name
    }

    /// `name@version`, the identity used in cache keys
    fn identity(&self) -> String {
        self.metadata().to_string()
    }
}

impl<T: Component + ?Sized> ComponentExt for T {}
