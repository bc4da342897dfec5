//! Extract-CSS transform - moves stylesheet text into a side artifact

use crate::component::{Component, ComponentMetadata};
use crate::error::TransformError;
use crate::transform::{Artifact, ArtifactKind, Transform, TransformOutput};
use std::path::Path;

/// Leaves an empty code stub as the primary artifact and emits the
/// stylesheet as a side artifact, so it lands in the chunk's CSS file.
pub struct ExtractCssTransform;

impl Component for ExtractCssTransform {
    fn metadata(&self) -> ComponentMetadata {
        ComponentMetadata::new(
            "extract-css",
            "1.0.0",
            Some("Extracts stylesheet text into its own module"),
        )
    }
}

impl Transform for ExtractCssTransform {
    fn apply(&self, input: &Artifact, _path: &Path) -> Result<TransformOutput, TransformError> {
        if input.kind != ArtifactKind::Style {
            return Err(TransformError::UnexpectedInput {
                expected: ArtifactKind::Style,
                actual: input.kind,
            });
        }
        Ok(TransformOutput::with_side(
            Artifact::script(Vec::new()),
            vec![input.clone()],
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_css_produces_side_artifact() {
        let input = Artifact::style("body { color: red; }");
        let output = ExtractCssTransform
            .apply(&input, Path::new("/p/app.css"))
            .unwrap();
        assert_eq!(output.primary.kind, ArtifactKind::Script);
        assert!(output.primary.is_empty());
        assert_eq!(output.side, vec![input]);
    }

    #[test]
    fn test_extract_css_rejects_script() {
        let input = Artifact::script("console.log(1)");
        let err = ExtractCssTransform
            .apply(&input, Path::new("/p/app.js"))
            .unwrap_err();
        assert!(matches!(err, TransformError::UnexpectedInput { .. }));
    }
}
