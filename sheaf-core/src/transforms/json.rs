//! JSON transform - validates JSON and exports it as a value

use crate::component::{Component, ComponentMetadata};
use crate::error::TransformError;
use crate::transform::{Artifact, Transform, TransformOutput};
use std::path::Path;

pub struct JsonTransform;

impl Component for JsonTransform {
    fn metadata(&self) -> ComponentMetadata {
        ComponentMetadata::new("json", "1.0.0", Some("Exports a JSON document as a value"))
    }
}

impl Transform for JsonTransform {
    fn apply(&self, input: &Artifact, _path: &Path) -> Result<TransformOutput, TransformError> {
        let value: serde_json::Value = serde_json::from_slice(&input.content)
            .map_err(|e| TransformError::Parse(e.to_string()))?;
        let compact =
            serde_json::to_string(&value).map_err(|e| TransformError::Failed(e.to_string()))?;
        Ok(TransformOutput::primary(Artifact::script(format!(
            "module.exports = {};",
            compact
        ))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_compacts_document() {
        let input = Artifact::binary("{ \"name\": \"sheaf\",\n  \"tags\": [1, 2] }");
        let output = JsonTransform.apply(&input, Path::new("/p/data.json")).unwrap();
        assert_eq!(
            output.primary.text().unwrap(),
            r#"module.exports = {"name":"sheaf","tags":[1,2]};"#
        );
    }

    #[test]
    fn test_json_parse_error() {
        let input = Artifact::binary("{ broken");
        let err = JsonTransform.apply(&input, Path::new("/p/data.json")).unwrap_err();
        assert!(matches!(err, TransformError::Parse(_)));
    }
}
