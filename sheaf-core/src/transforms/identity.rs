//! Identity transform - passes input through unchanged

use crate::component::{Component, ComponentMetadata};
use crate::error::TransformError;
use crate::transform::{Artifact, Transform, TransformOutput};
use std::path::Path;

/// Returns its input unchanged
pub struct IdentityTransform;

impl Component for IdentityTransform {
    fn metadata(&self) -> ComponentMetadata {
        ComponentMetadata::new("identity", "1.0.0", Some("Passes input through unchanged"))
    }
}

impl Transform for IdentityTransform {
    fn apply(&self, input: &Artifact, _path: &Path) -> Result<TransformOutput, TransformError> {
        Ok(TransformOutput::primary(input.clone()))
    }
}
