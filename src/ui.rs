//! Plain-data UI tree produced by a mounted component, and its HTML form.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One node of a rendered tree, as snapshotted out of the JS runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum UiNode {
    Element {
        tag: String,
        #[serde(default)]
        attrs: BTreeMap<String, String>,
        #[serde(default)]
        children: Vec<UiNode>,
    },
    Text {
        text: String,
    },
}

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

impl UiNode {
    pub fn element(tag: &str, attrs: &[(&str, &str)], children: Vec<UiNode>) -> Self {
        UiNode::Element {
            tag: tag.to_string(),
            attrs: attrs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            children,
        }
    }

    pub fn text(text: &str) -> Self {
        UiNode::Text {
            text: text.to_string(),
        }
    }

    /// Concatenated text of this node and its descendants.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        match self {
            UiNode::Text { text } => out.push_str(text),
            UiNode::Element { children, .. } => {
                for child in children {
                    child.collect_text(out);
                }
            }
        }
    }

    fn write_html(&self, out: &mut String) {
        match self {
            UiNode::Text { text } => out.push_str(&escape_text(text)),
            UiNode::Element {
                tag,
                attrs,
                children,
            } => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in attrs {
                    out.push(' ');
                    out.push_str(name);
                    if !value.is_empty() {
                        out.push_str("=\"");
                        out.push_str(&escape_attr(value));
                        out.push('"');
                    }
                }
                out.push('>');
                if VOID_ELEMENTS.contains(&tag.as_str()) {
                    return;
                }
                for child in children {
                    child.write_html(out);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
        }
    }
}

/// Render a forest of nodes to an HTML fragment.
pub fn render_html(nodes: &[UiNode]) -> String {
    let mut out = String::new();
    for node in nodes {
        node.write_html(&mut out);
    }
    out
}

/// Every class token used anywhere in the forest, in first-seen order.
pub fn collect_classes(nodes: &[UiNode]) -> Vec<String> {
    fn walk(node: &UiNode, seen: &mut Vec<String>) {
        if let UiNode::Element {
            attrs, children, ..
        } = node
        {
            if let Some(class) = attrs.get("class") {
                for token in class.split_whitespace() {
                    if !seen.iter().any(|s| s == token) {
                        seen.push(token.to_string());
                    }
                }
            }
            for child in children {
                walk(child, seen);
            }
        }
    }

    let mut seen = Vec::new();
    for node in nodes {
        walk(node, &mut seen);
    }
    seen
}

pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}
