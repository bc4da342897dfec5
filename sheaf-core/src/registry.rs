//! Component registries

use crate::component::Component;
use crate::transform::Transform;
use crate::transforms::{ExtractCssTransform, IdentityTransform, JsonTransform, RawTransform};
use std::collections::HashMap;
use std::sync::Arc;

/// Generic registry for components, keyed by component name
///
/// Components are stored as `Arc` so resolved transform chains can hold them
/// across worker threads.
pub struct Registry<T: Component + ?Sized> {
    components: HashMap<String, Arc<T>>,
}

impl<T: Component + ?Sized> Default for Registry<T> {
    fn default() -> Self {
        Self {
            components: HashMap::new(),
        }
    }
}

impl<T: Component + ?Sized> Clone for Registry<T> {
    fn clone(&self) -> Self {
        Self {
            components: self.components.clone(),
        }
    }
}

impl<T: Component + ?Sized> std::fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("names", &self.names())
            .finish()
    }
}

impl<T: Component + ?Sized> Registry<T> {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component, returning the one it replaced
    pub fn register(&mut self, component: Arc<T>) -> Option<Arc<T>> {
        let name = component.metadata().name.to_string();
        self.components.insert(name, component)
    }

    /// Get a component by name
    pub fn get(&self, name: &str) -> Option<Arc<T>> {
        self.components.get(name).cloned()
    }

    /// Check if a component exists
    pub fn contains(&self, name: &str) -> bool {
        self.components.contains_key(name)
    }

    /// Remove a component
    pub fn remove(&mut self, name: &str) -> Option<Arc<T>> {
        self.components.remove(name)
    }

    /// All component names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.components.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

/// Registry for transform components
pub type TransformRegistry = Registry<dyn Transform>;

impl Registry<dyn Transform> {
    /// Registry pre-populated with the built-in transforms
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(IdentityTransform));
        registry.register(Arc::new(RawTransform));
        registry.register(Arc::new(JsonTransform));
        registry.register(Arc::new(ExtractCssTransform));
        registry
    }
}
