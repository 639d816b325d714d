//! Proofreading prompt assembly.
use crate::error::ProofreadError;

/// Placeholder replaced by the document text.
pub const TEXT_PLACEHOLDER: &str = "{text}";

/// Built-in template, loaded at compile time.
pub const DEFAULT_TEMPLATE: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/prompts/proofread.md"));

/// Substitute `text` into the template's single placeholder.
///
/// Only the first placeholder is replaced, so a document that itself contains
/// `{text}` is passed through untouched.
pub fn build_prompt(template: &str, text: &str) -> Result<String, ProofreadError> {
    if !template.contains(TEXT_PLACEHOLDER) {
        return Err(ProofreadError::TemplateMissingPlaceholder {
            placeholder: TEXT_PLACEHOLDER,
        });
    }
    Ok(template.replacen(TEXT_PLACEHOLDER, text, 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_template_has_placeholder_and_format_rules() {
        assert!(DEFAULT_TEMPLATE.contains(TEXT_PLACEHOLDER));
        assert!(DEFAULT_TEMPLATE.contains("\"old\""));
        assert!(DEFAULT_TEMPLATE.contains("[]"));
    }

    #[test]
    fn substitutes_text_once() {
        let prompt = build_prompt("fix: {text}", "a {text} b").unwrap();
        assert_eq!(prompt, "fix: a {text} b");
    }

    #[test]
    fn rejects_template_without_placeholder() {
        let err = build_prompt("no slot here", "body").unwrap_err();
        assert!(matches!(
            err,
            ProofreadError::TemplateMissingPlaceholder { .. }
        ));
    }
}
