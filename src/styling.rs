//! Utility-class styling engine injected into isolated sessions.
//!
//! Resolves the Tailwind-style utility classes found in a rendered tree to
//! CSS rules. Unknown classes are skipped. Covers display, flexbox and
//! grid, alignment, spacing, sizing, typography, palette colours, borders,
//! radius and shadows.

use crate::ui::{collect_classes, UiNode};

/// A single resolved CSS rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CssRule {
    pub selector: String,
    pub declarations: Vec<(String, String)>,
}

impl CssRule {
    fn new(class: &str, props: &[(&str, &str)]) -> Self {
        Self::dynamic(
            class,
            props
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    fn dynamic(class: &str, declarations: Vec<(String, String)>) -> Self {
        Self {
            selector: format!(".{}", escape_selector(class)),
            declarations,
        }
    }
}

/// CSS for every recognised utility class used in `nodes`.
pub fn generate_css_for_nodes(nodes: &[UiNode]) -> String {
    let classes = collect_classes(nodes);
    let refs: Vec<&str> = classes.iter().map(String::as_str).collect();
    generate_css_for_classes(&refs)
}

/// Resolve an explicit slice of class names, deduplicated, in order.
pub fn generate_css_for_classes(classes: &[&str]) -> String {
    let mut seen = std::collections::HashSet::new();
    let rules: Vec<CssRule> = classes
        .iter()
        .filter(|class| seen.insert(**class))
        .filter_map(|class| resolve_class(class))
        .collect();
    render_css(&rules)
}

fn render_css(rules: &[CssRule]) -> String {
    if rules.is_empty() {
        return String::new();
    }
    let mut css = String::from("*, *::before, *::after { box-sizing: border-box; }\n");
    for rule in rules {
        css.push_str(&rule.selector);
        css.push_str(" {");
        for (prop, val) in &rule.declarations {
            css.push(' ');
            css.push_str(prop);
            css.push_str(": ");
            css.push_str(val);
            css.push(';');
        }
        css.push_str(" }\n");
    }
    css
}

fn escape_selector(class: &str) -> String {
    let mut out = String::with_capacity(class.len() + 4);
    for ch in class.chars() {
        if matches!(ch, '.' | '/' | ':' | '[' | ']' | '%' | '#' | '(' | ')') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

pub fn resolve_class(class: &str) -> Option<CssRule> {
    resolve_keyword(class)
        .or_else(|| resolve_spacing(class))
        .or_else(|| resolve_gap(class))
        .or_else(|| resolve_space_between(class))
        .or_else(|| resolve_sizing(class))
        .or_else(|| resolve_grid_cols(class))
        .or_else(|| resolve_font_size(class))
        .or_else(|| resolve_colors(class))
        .or_else(|| resolve_border_width(class))
        .or_else(|| resolve_opacity(class))
}

// ─── Fixed keywords ─────────────────────────────────────────────────────────

fn resolve_keyword(class: &str) -> Option<CssRule> {
    let props: &[(&str, &str)] = match class {
        "block" => &[("display", "block")],
        "inline" => &[("display", "inline")],
        "inline-block" => &[("display", "inline-block")],
        "flex" => &[("display", "flex")],
        "inline-flex" => &[("display", "inline-flex")],
        "grid" => &[("display", "grid")],
        "hidden" => &[("display", "none")],
        "flex-row" => &[("flex-direction", "row")],
        "flex-col" => &[("flex-direction", "column")],
        "flex-wrap" => &[("flex-wrap", "wrap")],
        "flex-1" => &[("flex", "1 1 0%")],
        "flex-auto" => &[("flex", "1 1 auto")],
        "flex-none" => &[("flex", "none")],
        "grow" => &[("flex-grow", "1")],
        "shrink-0" => &[("flex-shrink", "0")],
        "items-start" => &[("align-items", "flex-start")],
        "items-center" => &[("align-items", "center")],
        "items-end" => &[("align-items", "flex-end")],
        "items-stretch" => &[("align-items", "stretch")],
        "justify-start" => &[("justify-content", "flex-start")],
        "justify-center" => &[("justify-content", "center")],
        "justify-end" => &[("justify-content", "flex-end")],
        "justify-between" => &[("justify-content", "space-between")],
        "justify-around" => &[("justify-content", "space-around")],
        "mx-auto" => &[("margin-left", "auto"), ("margin-right", "auto")],
        "w-full" => &[("width", "100%")],
        "w-screen" => &[("width", "100vw")],
        "w-auto" => &[("width", "auto")],
        "h-full" => &[("height", "100%")],
        "h-screen" => &[("height", "100vh")],
        "min-h-screen" => &[("min-height", "100vh")],
        "max-w-sm" => &[("max-width", "24rem")],
        "max-w-md" => &[("max-width", "28rem")],
        "max-w-lg" => &[("max-width", "32rem")],
        "max-w-xl" => &[("max-width", "36rem")],
        "max-w-2xl" => &[("max-width", "42rem")],
        "max-w-4xl" => &[("max-width", "56rem")],
        "font-light" => &[("font-weight", "300")],
        "font-normal" => &[("font-weight", "400")],
        "font-medium" => &[("font-weight", "500")],
        "font-semibold" => &[("font-weight", "600")],
        "font-bold" => &[("font-weight", "700")],
        "font-mono" => &[("font-family", "ui-monospace, SFMono-Regular, Menlo, monospace")],
        "italic" => &[("font-style", "italic")],
        "underline" => &[("text-decoration-line", "underline")],
        "line-through" => &[("text-decoration-line", "line-through")],
        "uppercase" => &[("text-transform", "uppercase")],
        "lowercase" => &[("text-transform", "lowercase")],
        "text-left" => &[("text-align", "left")],
        "text-center" => &[("text-align", "center")],
        "text-right" => &[("text-align", "right")],
        "truncate" => &[
            ("overflow", "hidden"),
            ("text-overflow", "ellipsis"),
            ("white-space", "nowrap"),
        ],
        "overflow-hidden" => &[("overflow", "hidden")],
        "overflow-auto" => &[("overflow", "auto")],
        "relative" => &[("position", "relative")],
        "absolute" => &[("position", "absolute")],
        "cursor-pointer" => &[("cursor", "pointer")],
        "rounded-none" => &[("border-radius", "0px")],
        "rounded-sm" => &[("border-radius", "0.125rem")],
        "rounded" => &[("border-radius", "0.25rem")],
        "rounded-md" => &[("border-radius", "0.375rem")],
        "rounded-lg" => &[("border-radius", "0.5rem")],
        "rounded-xl" => &[("border-radius", "0.75rem")],
        "rounded-2xl" => &[("border-radius", "1rem")],
        "rounded-full" => &[("border-radius", "9999px")],
        "shadow-sm" => &[("box-shadow", "0 1px 2px 0 rgb(0 0 0 / 0.05)")],
        "shadow" => &[(
            "box-shadow",
            "0 1px 3px 0 rgb(0 0 0 / 0.1), 0 1px 2px -1px rgb(0 0 0 / 0.1)",
        )],
        "shadow-md" => &[(
            "box-shadow",
            "0 4px 6px -1px rgb(0 0 0 / 0.1), 0 2px 4px -2px rgb(0 0 0 / 0.1)",
        )],
        "shadow-lg" => &[(
            "box-shadow",
            "0 10px 15px -3px rgb(0 0 0 / 0.1), 0 4px 6px -4px rgb(0 0 0 / 0.1)",
        )],
        "border" => &[("border-width", "1px"), ("border-style", "solid")],
        _ => return None,
    };
    Some(CssRule::new(class, props))
}

// ─── Spacing ────────────────────────────────────────────────────────────────

/// Tailwind spacing scale: `n` steps of 0.25rem, `px` is 1px.
fn spacing_value(token: &str) -> Option<String> {
    match token {
        "0" => Some(String::from("0px")),
        "px" => Some(String::from("1px")),
        _ => {
            let n: f64 = token.parse().ok()?;
            if !(0.0..=96.0).contains(&n) || (n * 2.0).fract() != 0.0 {
                return None;
            }
            Some(format!("{}rem", n * 0.25))
        }
    }
}

fn resolve_spacing(class: &str) -> Option<CssRule> {
    let (negative, rest) = match class.strip_prefix('-') {
        Some(r) => (true, r),
        None => (false, class),
    };
    let (prefix, token) = rest.split_once('-')?;
    let sides: &[&str] = match prefix {
        "p" => &["padding"],
        "px" => &["padding-left", "padding-right"],
        "py" => &["padding-top", "padding-bottom"],
        "pt" => &["padding-top"],
        "pr" => &["padding-right"],
        "pb" => &["padding-bottom"],
        "pl" => &["padding-left"],
        "m" => &["margin"],
        "mx" => &["margin-left", "margin-right"],
        "my" => &["margin-top", "margin-bottom"],
        "mt" => &["margin-top"],
        "mr" => &["margin-right"],
        "mb" => &["margin-bottom"],
        "ml" => &["margin-left"],
        _ => return None,
    };
    if negative && prefix.starts_with('p') {
        return None;
    }
    let mut value = spacing_value(token)?;
    if negative {
        value = format!("-{}", value);
    }
    Some(CssRule::dynamic(
        class,
        sides.iter().map(|s| (s.to_string(), value.clone())).collect(),
    ))
}

fn resolve_gap(class: &str) -> Option<CssRule> {
    let (prop, token) = if let Some(t) = class.strip_prefix("gap-x-") {
        ("column-gap", t)
    } else if let Some(t) = class.strip_prefix("gap-y-") {
        ("row-gap", t)
    } else {
        ("gap", class.strip_prefix("gap-")?)
    };
    let value = spacing_value(token)?;
    Some(CssRule::dynamic(class, vec![(prop.to_string(), value)]))
}

fn resolve_space_between(class: &str) -> Option<CssRule> {
    let (prop, token) = if let Some(t) = class.strip_prefix("space-x-") {
        ("margin-left", t)
    } else {
        ("margin-top", class.strip_prefix("space-y-")?)
    };
    let value = spacing_value(token)?;
    Some(CssRule {
        selector: format!(".{} > * + *", escape_selector(class)),
        declarations: vec![(prop.to_string(), value)],
    })
}

fn resolve_sizing(class: &str) -> Option<CssRule> {
    let (prop, token) = if let Some(t) = class.strip_prefix("w-") {
        ("width", t)
    } else if let Some(t) = class.strip_prefix("h-") {
        ("height", t)
    } else if let Some(t) = class.strip_prefix("min-w-") {
        ("min-width", t)
    } else {
        ("min-height", class.strip_prefix("min-h-")?)
    };
    let value = match token.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().ok()?;
            let den: f64 = den.parse().ok()?;
            if den == 0.0 {
                return None;
            }
            format!("{}%", (num / den * 100.0 * 1_000_000.0).round() / 1_000_000.0)
        }
        None => spacing_value(token)?,
    };
    Some(CssRule::dynamic(class, vec![(prop.to_string(), value)]))
}

fn resolve_grid_cols(class: &str) -> Option<CssRule> {
    let n: u32 = class.strip_prefix("grid-cols-")?.parse().ok()?;
    if !(1..=12).contains(&n) {
        return None;
    }
    Some(CssRule::dynamic(
        class,
        vec![(
            "grid-template-columns".to_string(),
            format!("repeat({}, minmax(0, 1fr))", n),
        )],
    ))
}

// ─── Typography ─────────────────────────────────────────────────────────────

fn resolve_font_size(class: &str) -> Option<CssRule> {
    let (size, line_height) = match class {
        "text-xs" => ("0.75rem", "1rem"),
        "text-sm" => ("0.875rem", "1.25rem"),
        "text-base" => ("1rem", "1.5rem"),
        "text-lg" => ("1.125rem", "1.75rem"),
        "text-xl" => ("1.25rem", "1.75rem"),
        "text-2xl" => ("1.5rem", "2rem"),
        "text-3xl" => ("1.875rem", "2.25rem"),
        "text-4xl" => ("2.25rem", "2.5rem"),
        _ => return None,
    };
    Some(CssRule::new(
        class,
        &[("font-size", size), ("line-height", line_height)],
    ))
}

// ─── Colours ────────────────────────────────────────────────────────────────

const SHADES: [&str; 10] = ["50", "100", "200", "300", "400", "500", "600", "700", "800", "900"];

const PALETTE: &[(&str, [&str; 10])] = &[
    ("slate", ["#f8fafc", "#f1f5f9", "#e2e8f0", "#cbd5e1", "#94a3b8", "#64748b", "#475569", "#334155", "#1e293b", "#0f172a"]),
    ("gray", ["#f9fafb", "#f3f4f6", "#e5e7eb", "#d1d5db", "#9ca3af", "#6b7280", "#4b5563", "#374151", "#1f2937", "#111827"]),
    ("red", ["#fef2f2", "#fee2e2", "#fecaca", "#fca5a5", "#f87171", "#ef4444", "#dc2626", "#b91c1c", "#991b1b", "#7f1d1d"]),
    ("orange", ["#fff7ed", "#ffedd5", "#fed7aa", "#fdba74", "#fb923c", "#f97316", "#ea580c", "#c2410c", "#9a3412", "#7c2d12"]),
    ("yellow", ["#fefce8", "#fef9c3", "#fef08a", "#fde047", "#facc15", "#eab308", "#ca8a04", "#a16207", "#854d0e", "#713f12"]),
    ("green", ["#f0fdf4", "#dcfce7", "#bbf7d0", "#86efac", "#4ade80", "#22c55e", "#16a34a", "#15803d", "#166534", "#14532d"]),
    ("blue", ["#eff6ff", "#dbeafe", "#bfdbfe", "#93c5fd", "#60a5fa", "#3b82f6", "#2563eb", "#1d4ed8", "#1e40af", "#1e3a8a"]),
    ("indigo", ["#eef2ff", "#e0e7ff", "#c7d2fe", "#a5b4fc", "#818cf8", "#6366f1", "#4f46e5", "#4338ca", "#3730a3", "#312e81"]),
    ("purple", ["#faf5ff", "#f3e8ff", "#e9d5ff", "#d8b4fe", "#c084fc", "#a855f7", "#9333ea", "#7e22ce", "#6b21a8", "#581c87"]),
    ("pink", ["#fdf2f8", "#fce7f3", "#fbcfe8", "#f9a8d4", "#f472b6", "#ec4899", "#db2777", "#be185d", "#9d174d", "#831843"]),
];

fn color_value(token: &str) -> Option<&'static str> {
    match token {
        "white" => return Some("#ffffff"),
        "black" => return Some("#000000"),
        "transparent" => return Some("transparent"),
        "current" => return Some("currentColor"),
        _ => {}
    }
    let (name, shade) = token.rsplit_once('-')?;
    let idx = SHADES.iter().position(|s| *s == shade)?;
    PALETTE
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, shades)| shades[idx])
}

fn resolve_colors(class: &str) -> Option<CssRule> {
    let (prop, token) = if let Some(t) = class.strip_prefix("bg-") {
        ("background-color", t)
    } else if let Some(t) = class.strip_prefix("text-") {
        ("color", t)
    } else {
        ("border-color", class.strip_prefix("border-")?)
    };
    let value = color_value(token)?;
    Some(CssRule::new(class, &[(prop, value)]))
}

fn resolve_border_width(class: &str) -> Option<CssRule> {
    let width = match class {
        "border-0" => "0px",
        "border-2" => "2px",
        "border-4" => "4px",
        "border-8" => "8px",
        _ => return None,
    };
    Some(CssRule::new(
        class,
        &[("border-width", width), ("border-style", "solid")],
    ))
}

fn resolve_opacity(class: &str) -> Option<CssRule> {
    let n: u32 = class.strip_prefix("opacity-")?.parse().ok()?;
    if n > 100 || n % 5 != 0 {
        return None;
    }
    Some(CssRule::dynamic(
        class,
        vec![("opacity".to_string(), format!("{}", n as f64 / 100.0))],
    ))
}
