//! Sanitize rendered UI trees before they reach a mount surface.
//!
//! Rejects elements and attributes that would let component output run
//! script or re-point the surrounding document once the tree is turned
//! into HTML.

use crate::ui::UiNode;
use anyhow::{anyhow, Result};
use regex::Regex;
use std::sync::OnceLock;

/// Maximum nesting depth of a rendered tree
const MAX_DEPTH: usize = 128;

/// Elements that can load or execute content outside the component
const FORBIDDEN_TAGS: &[&str] = &[
    "script", "iframe", "object", "embed", "frame", "frameset", "base", "link", "meta", "style",
];

fn tag_name() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    CELL.get_or_init(|| Regex::new(r"^[A-Za-z][A-Za-z0-9-]*$").expect("static pattern"))
}

fn attribute_name() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    CELL.get_or_init(|| Regex::new(r"^[A-Za-z_:][A-Za-z0-9_.:-]*$").expect("static pattern"))
}

/// Attributes whose value is interpreted as a URL
const URL_ATTRIBUTES: &[&str] = &["href", "src", "action", "formaction", "xlink:href"];

/// Recursively check a rendered forest, erroring on the first violation.
///
/// # Errors
/// Returns an error if:
/// - A tag or attribute name is not a plain HTML name
/// - A forbidden element (`script`, `iframe`, ...) is present
/// - An inline event-handler attribute (`on*`) is present
/// - A URL attribute uses the `javascript:` scheme
/// - Nesting depth exceeds MAX_DEPTH (128)
pub fn sanitize_tree(nodes: &[UiNode]) -> Result<()> {
    for node in nodes {
        sanitize_recursive(node, 0)?;
    }
    Ok(())
}

fn sanitize_recursive(node: &UiNode, depth: usize) -> Result<()> {
    if depth > MAX_DEPTH {
        return Err(anyhow!(
            "Rendered tree nesting too deep (max {} levels)",
            MAX_DEPTH
        ));
    }

    let UiNode::Element {
        tag,
        attrs,
        children,
    } = node
    else {
        return Ok(());
    };

    // Names are written to HTML verbatim
    if !tag_name().is_match(tag) {
        return Err(anyhow!("Invalid element name {:?} in rendered output", tag));
    }
    let tag_lower = tag.to_ascii_lowercase();
    if FORBIDDEN_TAGS.contains(&tag_lower.as_str()) {
        return Err(anyhow!("<{}> elements are not allowed in rendered output", tag));
    }

    for (name, value) in attrs {
        if !attribute_name().is_match(name) {
            return Err(anyhow!("Invalid attribute name {:?} on <{}>", name, tag));
        }
        let name_lower = name.to_ascii_lowercase();
        if name_lower.starts_with("on") {
            return Err(anyhow!(
                "Inline event handler '{}' on <{}> is not allowed",
                name,
                tag
            ));
        }
        if URL_ATTRIBUTES.contains(&name_lower.as_str()) && is_script_url(value) {
            return Err(anyhow!(
                "'{}' on <{}> uses a javascript: URL",
                name,
                tag
            ));
        }
    }

    for child in children {
        sanitize_recursive(child, depth + 1)?;
    }
    Ok(())
}

fn is_script_url(value: &str) -> bool {
    let compact: String = value
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect();
    compact.to_ascii_lowercase().starts_with("javascript:")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn el(tag: &str, attrs: &[(&str, &str)], children: Vec<UiNode>) -> UiNode {
        UiNode::element(tag, attrs, children)
    }

    #[test]
    fn test_safe_tree() {
        let tree = vec![el(
            "div",
            &[("class", "p-4"), ("href", "https://example.com")],
            vec![el("a", &[("href", "/docs")], vec![UiNode::text("docs")])],
        )];
        assert!(sanitize_tree(&tree).is_ok());
    }

    #[test]
    fn test_blocks_script() {
        let tree = vec![el("div", &[], vec![el("SCRIPT", &[], vec![])])];
        let result = sanitize_tree(&tree);
        assert!(result.unwrap_err().to_string().contains("SCRIPT"));
    }

    #[test]
    fn test_blocks_inline_handlers() {
        let tree = vec![el("img", &[("onerror", "alert(1)")], vec![])];
        let result = sanitize_tree(&tree);
        assert!(result.unwrap_err().to_string().contains("onerror"));
    }

    #[test]
    fn test_blocks_javascript_urls() {
        let tree = vec![el("a", &[("href", " Java\tScript:alert(1)")], vec![])];
        assert!(sanitize_tree(&tree).is_err());
    }

    #[test]
    fn test_rejects_names_that_smuggle_markup() {
        let tree = vec![el("img src=x onerror=alert(1)", &[], vec![])];
        let err = sanitize_tree(&tree).unwrap_err();
        assert!(err.to_string().contains("Invalid element name"));

        let tree = vec![el("script ", &[], vec![UiNode::text("alert(3)")])];
        assert!(sanitize_tree(&tree).is_err());

        let tree = vec![el("img", &[("src", "x"), ("x onerror", "alert(2)")], vec![])];
        let err = sanitize_tree(&tree).unwrap_err();
        assert!(err.to_string().contains("Invalid attribute name"));

        let tree = vec![el("p", &[("\"><script>", "")], vec![])];
        assert!(sanitize_tree(&tree).is_err());
    }

    #[test]
    fn test_blocks_style_elements() {
        let tree = vec![el("style", &[], vec![UiNode::text("body { display: none }")])];
        assert!(sanitize_tree(&tree).unwrap_err().to_string().contains("<style>"));
    }

    #[test]
    fn test_accepts_custom_and_namespaced_names() {
        let tree = vec![el(
            "my-widget",
            &[("data-id", "1"), ("aria-label", "x"), ("xlink:href", "#a"), ("_private", "")],
            vec![],
        )];
        assert!(sanitize_tree(&tree).is_ok());
    }

    #[test]
    fn test_depth_limit() {
        let mut node = el("span", &[], vec![]);
        for _ in 0..(MAX_DEPTH + 2) {
            node = el("div", &[], vec![node]);
        }
        let result = sanitize_tree(&[node]);
        assert!(result.unwrap_err().to_string().contains("too deep"));
    }
}
