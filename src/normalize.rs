//! Source normalization: strips module syntax and guarantees the text
//! defines something callable.
//!
//! This is a textual heuristic, not a parser. When several function-like
//! definitions exist only the first one is reported, and nested or
//! multiple top-level components are not told apart.

use regex::Regex;
use std::sync::OnceLock;

/// Name of the wrapper invented for bare markup and anonymous default exports.
pub const SYNTHETIC_COMPONENT: &str = "GeneratedComponent";

/// Output of [`normalize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    /// Source with import/export declarations removed (and possibly wrapped).
    pub text: String,
    /// First function-like identifier seen in `text`.
    pub component_name: Option<String>,
    /// Identifier named by `export default`, when the source had one.
    pub default_export: Option<String>,
    /// The whole input was treated as markup and wrapped.
    pub wrapped: bool,
    /// More than one function-like definition was found.
    pub ambiguous: bool,
}

macro_rules! pattern {
    ($name:ident, $src:expr) => {
        fn $name() -> &'static Regex {
            static CELL: OnceLock<Regex> = OnceLock::new();
            CELL.get_or_init(|| Regex::new($src).expect("static pattern"))
        }
    };
}

pattern!(
    import_from,
    r#"(?m)^[ \t]*import\s+(?:type\s+)?[^;'"]*?\bfrom\s*['"][^'"\n]*['"][ \t]*;?[ \t]*\n?"#
);
pattern!(
    import_bare,
    r#"(?m)^[ \t]*import\s*['"][^'"\n]*['"][ \t]*;?[ \t]*\n?"#
);
pattern!(
    export_list,
    r#"(?m)^[ \t]*export\s*(?:\*(?:\s+as\s+[\w$]+)?|\{[^}]*\})\s*(?:from\s*['"][^'"\n]*['"])?[ \t]*;?[ \t]*\n?"#
);
pattern!(
    export_default_name,
    r"(?m)^[ \t]*export\s+default\s+([A-Za-z_$][\w$]*)[ \t]*;?[ \t]*$\n?"
);
pattern!(
    export_default_decl_name,
    r"(?m)^[ \t]*export\s+default\s+(?:async\s+)?(?:function\s*\*?|class)\s+([A-Za-z_$][\w$]*)"
);
pattern!(
    export_default_decl,
    r"(?m)^([ \t]*)export\s+default\s+((?:async\s+)?function\b|class\b)"
);
pattern!(export_default_expr, r"(?m)^([ \t]*)export\s+default\s+");
pattern!(
    export_decl,
    r"(?m)^([ \t]*)export\s+((?:const|let|var|function|class|async)\b)"
);
pattern!(
    function_like,
    r"\bfunction\s*\*?\s+([A-Za-z_$][\w$]*)|\b(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*=\s*(?:async\s+)?(?:function\b|\([^()]*\)\s*=>|[A-Za-z_$][\w$]*\s*=>)"
);
pattern!(function_keyword, r"\bfunction\b");

/// Normalize untrusted source text. Never fails.
pub fn normalize(raw: &str) -> Normalized {
    let mut default_export = export_default_decl_name()
        .captures(raw)
        .map(|caps| caps[1].to_string());

    let mut text = import_from().replace_all(raw, "").into_owned();
    text = import_bare().replace_all(&text, "").into_owned();
    text = export_list().replace_all(&text, "").into_owned();

    if let Some(caps) = export_default_name().captures(&text) {
        if default_export.is_none() {
            default_export = Some(caps[1].to_string());
        }
    }
    text = export_default_name().replace_all(&text, "").into_owned();
    text = export_default_decl().replace_all(&text, "$1$2").into_owned();

    let expression_export = export_default_expr().is_match(&text);
    if expression_export {
        let replacement = format!("${{1}}const {} = ", SYNTHETIC_COMPONENT);
        text = export_default_expr()
            .replace(&text, replacement.as_str())
            .into_owned();
        default_export.get_or_insert_with(|| SYNTHETIC_COMPONENT.to_string());
    }
    text = export_decl().replace_all(&text, "$1$2").into_owned();

    let cleaned = text.trim();
    // An exported expression already names its value; the engine decides
    // whether it is an element or a component.
    if !expression_export && !function_keyword().is_match(cleaned) && !cleaned.contains("=>") {
        return Normalized {
            text: wrap_markup(cleaned),
            component_name: Some(SYNTHETIC_COMPONENT.to_string()),
            default_export: None,
            wrapped: true,
            ambiguous: false,
        };
    }

    let mut names = function_like().captures_iter(cleaned).filter_map(|caps| {
        caps.get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str().to_string())
    });
    let component_name = names.next();
    let ambiguous = names.next().is_some();

    Normalized {
        text: cleaned.to_string(),
        component_name,
        default_export,
        wrapped: false,
        ambiguous,
    }
}

fn wrap_markup(fragment: &str) -> String {
    format!(
        "function {}() {{\n  return (\n    <div>\n{}\n    </div>\n  );\n}}",
        SYNTHETIC_COMPONENT, fragment
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_bare_markup() {
        let out = normalize("<div>Hello</div>");
        assert!(out.wrapped);
        assert_eq!(out.component_name.as_deref(), Some(SYNTHETIC_COMPONENT));
        assert!(out.text.starts_with("function GeneratedComponent()"));
        assert!(out.text.contains("<div>Hello</div>"));
    }

    #[test]
    fn strips_imports_and_exports() {
        let src = r#"import React, {
  useState,
} from "react";
import "./styles.css";

export default function Counter() {
  const [n, setN] = useState(0);
  return <button onClick={() => setN(n + 1)}>{n}</button>;
}
"#;
        let out = normalize(src);
        assert!(!out.wrapped);
        assert!(!out.text.contains("import"));
        assert!(!out.text.contains("export"));
        assert!(out.text.starts_with("function Counter()"));
        assert_eq!(out.component_name.as_deref(), Some("Counter"));
        assert_eq!(out.default_export.as_deref(), Some("Counter"));
    }

    #[test]
    fn records_default_export_name() {
        let src = "const helper = (x) => x * 2;\nconst Card = () => <div>{helper(2)}</div>;\nexport default Card;\n";
        let out = normalize(src);
        assert_eq!(out.component_name.as_deref(), Some("helper"));
        assert_eq!(out.default_export.as_deref(), Some("Card"));
        assert!(out.ambiguous);
        assert!(!out.text.contains("export"));
    }

    #[test]
    fn anonymous_default_export_gets_synthetic_name() {
        let out = normalize("export default () => <p>hi</p>;");
        assert_eq!(out.text, "const GeneratedComponent = () => <p>hi</p>;");
        assert_eq!(out.default_export.as_deref(), Some(SYNTHETIC_COMPONENT));
    }

    #[test]
    fn exported_markup_is_not_wrapped_again() {
        let out = normalize("export default <p>hi</p>;");
        assert!(!out.wrapped);
        assert_eq!(out.text, "const GeneratedComponent = <p>hi</p>;");
        assert_eq!(out.default_export.as_deref(), Some(SYNTHETIC_COMPONENT));

        let out = normalize("export default { title: \"card\" };");
        assert!(!out.wrapped);
        assert_eq!(out.text, "const GeneratedComponent = { title: \"card\" };");
    }

    #[test]
    fn strips_export_lists_and_named_exports() {
        let src = "export const Badge = ({ label }) => <span>{label}</span>;\nexport { Badge as Tag };\nexport * from './other';";
        let out = normalize(src);
        assert_eq!(
            out.text,
            "const Badge = ({ label }) => <span>{label}</span>;"
        );
        assert_eq!(out.component_name.as_deref(), Some("Badge"));
        assert!(!out.ambiguous);
    }

    #[test]
    fn arrow_without_function_keyword_is_not_wrapped() {
        let out = normalize("const App = () => <main/>");
        assert!(!out.wrapped);
        assert_eq!(out.component_name.as_deref(), Some("App"));
    }

    #[test]
    fn empty_input_still_produces_text() {
        let out = normalize("");
        assert!(out.wrapped);
        assert!(out.text.contains("<div>"));
    }
}
