//! Raw transform - exposes file text as a string module

use crate::component::{Component, ComponentMetadata};
use crate::error::TransformError;
use crate::transform::{Artifact, Transform, TransformOutput};
use std::path::Path;

/// Turns text into `module.exports = "<text>";`
pub struct RawTransform;

impl Component for RawTransform {
    fn metadata(&self) -> ComponentMetadata {
        ComponentMetadata::new("raw", "1.0.0", Some("Exports file text as a string"))
    }
}

impl Transform for RawTransform {
    fn apply(&self, input: &Artifact, _path: &Path) -> Result<TransformOutput, TransformError> {
        let text = input.text()?;
        let literal =
            serde_json::to_string(text).map_err(|e| TransformError::Failed(e.to_string()))?;
        Ok(TransformOutput::primary(Artifact::script(format!(
            "module.exports = {};",
            literal
        ))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_escapes_text() {
        let input = Artifact::binary("line \"one\"\nline two");
        let output = RawTransform.apply(&input, Path::new("/p/readme.md")).unwrap();
        assert_eq!(
            output.primary,
            Artifact::script(r#"module.exports = "line \"one\"\nline two";"#)
        );
        assert!(output.side.is_empty());
    }

    #[test]
    fn test_raw_rejects_binary() {
        let input = Artifact::binary(vec![0xff, 0xfe, 0x00]);
        let err = RawTransform.apply(&input, Path::new("/p/x.txt")).unwrap_err();
        assert_eq!(err, TransformError::InvalidUtf8);
    }
}
