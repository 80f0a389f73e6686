//! Per-request source artifact: raw, normalized and transformed text.

use crate::error::TransformError;
use crate::normalize::{normalize, SYNTHETIC_COMPONENT};
use crate::transform::{transform, TransformOptions};

/// Immutable once produced; one per render request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceArtifact {
    raw: String,
    normalized: String,
    transformed: String,
    candidates: Vec<String>,
    ambiguous: bool,
}

impl SourceArtifact {
    /// Run the normalizer and the transformer over `raw`.
    pub fn prepare(raw: &str, options: &TransformOptions) -> Result<Self, TransformError> {
        let normalized = normalize(raw);
        if normalized.ambiguous {
            log::debug!(
                "Several function-like definitions found; resolving '{}' first",
                normalized
                    .default_export
                    .as_deref()
                    .or(normalized.component_name.as_deref())
                    .unwrap_or(SYNTHETIC_COMPONENT)
            );
        }

        let transformed = transform(&normalized.text, options)?;

        // Resolution order: designated default export, first function-like
        // identifier, then the synthetic wrapper name.
        let mut candidates: Vec<String> = Vec::with_capacity(3);
        for name in [
            normalized.default_export.as_deref(),
            normalized.component_name.as_deref(),
            Some(SYNTHETIC_COMPONENT),
        ]
        .into_iter()
        .flatten()
        {
            if !candidates.iter().any(|c| c == name) {
                candidates.push(name.to_string());
            }
        }

        Ok(Self {
            raw: raw.to_string(),
            normalized: normalized.text,
            transformed: transformed.code,
            candidates,
            ambiguous: normalized.ambiguous,
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    pub fn transformed(&self) -> &str {
        &self.transformed
    }

    /// Export names to try, in order, after evaluation.
    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    pub fn is_ambiguous(&self) -> bool {
        self.ambiguous
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_markup_resolves_to_synthetic_name() {
        let artifact = SourceArtifact::prepare("<div>Hello</div>", &TransformOptions::default()).unwrap();
        assert_eq!(artifact.raw(), "<div>Hello</div>");
        assert_eq!(artifact.candidates(), &[SYNTHETIC_COMPONENT.to_string()]);
        assert!(artifact.transformed().contains(r#"React.createElement("div", null, "Hello")"#));
    }

    #[test]
    fn default_export_is_tried_first() {
        let src = "function helper() { return 1; }\nfunction Page() { return <main/>; }\nexport default Page;";
        let artifact = SourceArtifact::prepare(src, &TransformOptions::default()).unwrap();
        assert_eq!(
            artifact.candidates(),
            &["Page".to_string(), "helper".to_string(), SYNTHETIC_COMPONENT.to_string()]
        );
        assert!(artifact.is_ambiguous());
    }

    #[test]
    fn transform_errors_propagate() {
        let err = SourceArtifact::prepare("const A = () => <div><p></div>;", &TransformOptions::default())
            .unwrap_err();
        assert!(err.message.contains("<p>"));
    }
}
