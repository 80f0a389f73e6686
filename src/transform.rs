//! Markup-extension transformer.
//!
//! Rewrites JSX embedded in script text into nested calls of the configured
//! pragma (`React.createElement` by default). The script around the markup
//! is copied through untouched; only enough of it is scanned (strings,
//! templates, comments, regular expressions, braces) to find where markup
//! may start and where an embedded expression ends.

use crate::error::TransformError;
use serde::{Deserialize, Serialize};

/// Call targets emitted for elements and fragments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformOptions {
    pub pragma: String,
    pub pragma_frag: String,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            pragma: String::from("React.createElement"),
            pragma_frag: String::from("React.Fragment"),
        }
    }
}

/// Transformer output: plain script the host runtime can evaluate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transformed {
    pub code: String,
}

/// Identifiers after which a `<` or `/` begins an expression.
const EXPRESSION_KEYWORDS: &[&str] = &[
    "return",
    "typeof",
    "instanceof",
    "in",
    "of",
    "new",
    "delete",
    "void",
    "throw",
    "case",
    "do",
    "else",
    "yield",
    "await",
];

pub fn transform(source: &str, options: &TransformOptions) -> Result<Transformed, TransformError> {
    let mut compiler = Compiler {
        src: source.chars().collect(),
        pos: 0,
        options,
    };
    let code = compiler.script(false)?;
    Ok(Transformed { code })
}

enum Prop {
    Pair(String, String),
    Spread(String),
}

struct Compiler<'a> {
    src: Vec<char>,
    pos: usize,
    options: &'a TransformOptions,
}

impl<'a> Compiler<'a> {
    fn peek(&self) -> Option<char> {
        self.src.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.src.get(self.pos + offset).copied()
    }

    fn error_at(&self, pos: usize, message: impl Into<String>) -> TransformError {
        let upto = &self.src[..pos.min(self.src.len())];
        let line = 1 + upto.iter().filter(|&&c| c == '\n').count();
        let column = match upto.iter().rposition(|&c| c == '\n') {
            Some(nl) => pos - nl,
            None => pos + 1,
        };
        TransformError::new(message, line, column)
    }

    /// Copy script text, compiling any markup found in expression position.
    /// With `until_brace`, stops after the `}` that closes the current
    /// expression container (the brace itself is not emitted).
    fn script(&mut self, until_brace: bool) -> Result<String, TransformError> {
        let start = self.pos;
        let mut out = String::new();
        let mut expr_allowed = true;
        let mut depth = 0usize;

        loop {
            let Some(c) = self.peek() else {
                if until_brace {
                    return Err(self.error_at(start, "Unexpected end of input, expected '}'"));
                }
                return Ok(out);
            };

            match c {
                c if c.is_whitespace() => {
                    out.push(c);
                    self.pos += 1;
                }
                '/' if self.peek_at(1) == Some('/') => out.push_str(&self.line_comment()),
                '/' if self.peek_at(1) == Some('*') => out.push_str(&self.block_comment()?),
                '\'' | '"' => {
                    out.push_str(&self.string_literal()?);
                    expr_allowed = false;
                }
                '`' => {
                    out.push_str(&self.template_literal()?);
                    expr_allowed = false;
                }
                '/' if expr_allowed => {
                    out.push_str(&self.regex_literal()?);
                    expr_allowed = false;
                }
                '<' if expr_allowed && self.starts_markup() => {
                    out.push_str(&self.element()?);
                    expr_allowed = false;
                }
                '{' => {
                    depth += 1;
                    out.push(c);
                    self.pos += 1;
                    expr_allowed = true;
                }
                '}' => {
                    self.pos += 1;
                    if depth == 0 && until_brace {
                        return Ok(out);
                    }
                    depth = depth.saturating_sub(1);
                    out.push(c);
                    expr_allowed = true;
                }
                c if is_ident_start(c) => {
                    let word = self.take_while(is_ident_part);
                    expr_allowed = EXPRESSION_KEYWORDS.contains(&word.as_str());
                    out.push_str(&word);
                }
                c if c.is_ascii_digit() => {
                    out.push_str(&self.take_while(|c| c.is_alphanumeric() || c == '.' || c == '_'));
                    expr_allowed = false;
                }
                ')' | ']' => {
                    out.push(c);
                    self.pos += 1;
                    expr_allowed = false;
                }
                '+' | '-' if self.peek_at(1) == Some(c) => {
                    out.push(c);
                    out.push(c);
                    self.pos += 2;
                    expr_allowed = false;
                }
                _ => {
                    out.push(c);
                    self.pos += 1;
                    expr_allowed = true;
                }
            }
        }
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let start = self.pos;
        while self.peek().is_some_and(&pred) {
            self.pos += 1;
        }
        self.src[start..self.pos].iter().collect()
    }

    fn line_comment(&mut self) -> String {
        self.take_while(|c| c != '\n')
    }

    fn block_comment(&mut self) -> Result<String, TransformError> {
        let start = self.pos;
        self.pos += 2;
        loop {
            match self.peek() {
                None => return Err(self.error_at(start, "Unterminated comment")),
                Some('*') if self.peek_at(1) == Some('/') => {
                    self.pos += 2;
                    return Ok(self.src[start..self.pos].iter().collect());
                }
                Some(_) => self.pos += 1,
            }
        }
    }

    fn string_literal(&mut self) -> Result<String, TransformError> {
        let start = self.pos;
        let quote = self.src[start];
        self.pos += 1;
        loop {
            match self.peek() {
                None | Some('\n') => return Err(self.error_at(start, "Unterminated string constant")),
                Some('\\') => self.pos += 2,
                Some(c) if c == quote => {
                    self.pos += 1;
                    return Ok(self.src[start..self.pos.min(self.src.len())].iter().collect());
                }
                Some(_) => self.pos += 1,
            }
        }
    }

    fn template_literal(&mut self) -> Result<String, TransformError> {
        let start = self.pos;
        let mut out = String::from("`");
        self.pos += 1;
        loop {
            match self.peek() {
                None => return Err(self.error_at(start, "Unterminated template")),
                Some('\\') => {
                    out.push('\\');
                    if let Some(next) = self.peek_at(1) {
                        out.push(next);
                    }
                    self.pos += 2;
                }
                Some('`') => {
                    out.push('`');
                    self.pos += 1;
                    return Ok(out);
                }
                Some('$') if self.peek_at(1) == Some('{') => {
                    self.pos += 2;
                    out.push_str("${");
                    out.push_str(&self.script(true)?);
                    out.push('}');
                }
                Some(c) => {
                    out.push(c);
                    self.pos += 1;
                }
            }
        }
    }

    fn regex_literal(&mut self) -> Result<String, TransformError> {
        let start = self.pos;
        let mut in_class = false;
        self.pos += 1;
        loop {
            match self.peek() {
                None | Some('\n') => {
                    return Err(self.error_at(start, "Unterminated regular expression"))
                }
                Some('\\') => self.pos += 2,
                Some('[') => {
                    in_class = true;
                    self.pos += 1;
                }
                Some(']') => {
                    in_class = false;
                    self.pos += 1;
                }
                Some('/') if !in_class => {
                    self.pos += 1;
                    break;
                }
                Some(_) => self.pos += 1,
            }
        }
        let mut out: String = self.src[start..self.pos].iter().collect();
        out.push_str(&self.take_while(is_ident_part));
        Ok(out)
    }

    fn starts_markup(&self) -> bool {
        matches!(self.peek_at(1), Some(c) if c == '>' || is_ident_start(c))
    }

    fn skip_trivia(&mut self) -> Result<(), TransformError> {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => self.pos += 1,
                Some('/') if self.peek_at(1) == Some('/') => {
                    self.line_comment();
                }
                Some('/') if self.peek_at(1) == Some('*') => {
                    self.block_comment()?;
                }
                _ => return Ok(()),
            }
        }
    }

    fn tag_name(&mut self) -> Result<String, TransformError> {
        match self.peek() {
            Some(c) if is_ident_start(c) => {
                Ok(self.take_while(|c| is_ident_part(c) || c == '-' || c == ':' || c == '.'))
            }
            Some(c) => Err(self.error_at(self.pos, format!("Unexpected token '{}', expected a JSX tag name", c))),
            None => Err(self.error_at(self.pos, "Unexpected end of input, expected a JSX tag name")),
        }
    }

    /// Compile one element or fragment starting at `<`.
    fn element(&mut self) -> Result<String, TransformError> {
        let start = self.pos;
        self.pos += 1;
        self.skip_trivia()?;

        if self.peek() == Some('>') {
            self.pos += 1;
            let children = self.children(start, None)?;
            let frag = self.options.pragma_frag.clone();
            return Ok(self.call(&frag, "null", &children));
        }

        let name = self.tag_name()?;
        let (props, self_closing) = self.attributes(start, &name)?;
        let children = if self_closing {
            Vec::new()
        } else {
            self.children(start, Some(&name))?
        };

        let element_type = if is_intrinsic(&name) {
            js_string(&name)
        } else {
            name
        };
        Ok(self.call(&element_type, &render_props(&props), &children))
    }

    fn call(&self, element_type: &str, props: &str, children: &[String]) -> String {
        let mut out = format!("{}({}, {}", self.options.pragma, element_type, props);
        for child in children {
            out.push_str(", ");
            out.push_str(child);
        }
        out.push(')');
        out
    }

    fn attributes(&mut self, start: usize, name: &str) -> Result<(Vec<Prop>, bool), TransformError> {
        let mut props = Vec::new();
        loop {
            self.skip_trivia()?;
            match self.peek() {
                None => {
                    return Err(self.error_at(start, format!("Unterminated JSX opening tag <{}>", name)))
                }
                Some('/') => {
                    if self.peek_at(1) != Some('>') {
                        return Err(self.error_at(self.pos, format!("Expected '>' after '/' in <{}>", name)));
                    }
                    self.pos += 2;
                    return Ok((props, true));
                }
                Some('>') => {
                    self.pos += 1;
                    return Ok((props, false));
                }
                Some('{') => {
                    let brace = self.pos;
                    self.pos += 1;
                    self.skip_trivia()?;
                    if !(self.peek() == Some('.') && self.peek_at(1) == Some('.') && self.peek_at(2) == Some('.')) {
                        return Err(self.error_at(brace, "Expected '...' in JSX spread attribute"));
                    }
                    self.pos += 3;
                    let expr = self.script(true)?;
                    props.push(Prop::Spread(expr.trim().to_string()));
                }
                Some(c) if is_ident_start(c) => {
                    let attr = self.take_while(|c| is_ident_part(c) || c == '-' || c == ':');
                    self.skip_trivia()?;
                    let value = if self.peek() == Some('=') {
                        self.pos += 1;
                        self.skip_trivia()?;
                        self.attribute_value(&attr)?
                    } else {
                        String::from("true")
                    };
                    props.push(Prop::Pair(attr, value));
                }
                Some(c) => {
                    return Err(self.error_at(
                        self.pos,
                        format!("Unexpected character '{}' in <{}> tag", c, name),
                    ))
                }
            }
        }
    }

    fn attribute_value(&mut self, attr: &str) -> Result<String, TransformError> {
        match self.peek() {
            Some(quote @ ('"' | '\'')) => {
                let start = self.pos;
                self.pos += 1;
                let raw = self.take_while(|c| c != quote);
                if self.peek().is_none() {
                    return Err(self.error_at(start, "Unterminated string constant"));
                }
                self.pos += 1;
                Ok(js_string(&decode_entities(&raw)))
            }
            Some('{') => {
                let brace = self.pos;
                self.pos += 1;
                let expr = self.script(true)?;
                if is_blank_script(&expr) {
                    return Err(self.error_at(
                        brace,
                        "JSX attributes must only be assigned a non-empty expression",
                    ));
                }
                Ok(expr.trim().to_string())
            }
            Some('<') => self.element(),
            _ => Err(self.error_at(
                self.pos,
                format!("Expected a value for JSX attribute '{}'", attr),
            )),
        }
    }

    /// Children up to and including the matching closing tag.
    fn children(&mut self, start: usize, name: Option<&str>) -> Result<Vec<String>, TransformError> {
        let mut children = Vec::new();
        let mut text = String::new();

        loop {
            match self.peek() {
                None => return Err(self.error_at(start, "Unterminated JSX contents")),
                Some('<') => {
                    push_text(&mut children, &mut text);
                    let open = self.pos;
                    self.pos += 1;
                    self.skip_trivia()?;
                    if self.peek() != Some('/') {
                        self.pos = open;
                        children.push(self.element()?);
                        continue;
                    }
                    self.pos += 1;
                    self.skip_trivia()?;
                    let closing = if self.peek() == Some('>') {
                        None
                    } else {
                        Some(self.tag_name()?)
                    };
                    self.skip_trivia()?;
                    if self.peek() != Some('>') {
                        return Err(self.error_at(self.pos, "Expected '>' to end JSX closing tag"));
                    }
                    self.pos += 1;
                    if closing.as_deref() != name {
                        let message = match name {
                            Some(n) => format!("Expected corresponding JSX closing tag for <{}>", n),
                            None => String::from("Expected corresponding closing tag for JSX fragment"),
                        };
                        return Err(self.error_at(open, message));
                    }
                    return Ok(children);
                }
                Some('{') => {
                    push_text(&mut children, &mut text);
                    self.pos += 1;
                    let expr = self.script(true)?;
                    if !is_blank_script(&expr) {
                        children.push(expr.trim().to_string());
                    }
                }
                Some('>') => {
                    return Err(self.error_at(
                        self.pos,
                        "Unexpected token '>'. Did you mean `{'>'}` or `&gt;`?",
                    ))
                }
                Some('}') => {
                    return Err(self.error_at(
                        self.pos,
                        "Unexpected token '}'. Did you mean `{'}'}` or `&rbrace;`?",
                    ))
                }
                Some(c) => {
                    text.push(c);
                    self.pos += 1;
                }
            }
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_part(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

fn is_intrinsic(name: &str) -> bool {
    !name.contains('.')
        && (name.starts_with(|c: char| c.is_ascii_lowercase()) || name.contains('-'))
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(is_ident_start) && chars.all(is_ident_part)
}

fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

fn render_props(props: &[Prop]) -> String {
    if props.is_empty() {
        return String::from("null");
    }
    let parts: Vec<String> = props
        .iter()
        .map(|prop| match prop {
            Prop::Pair(key, value) if is_identifier(key) => format!("{}: {}", key, value),
            Prop::Pair(key, value) => format!("{}: {}", js_string(key), value),
            Prop::Spread(expr) => format!("...({})", expr),
        })
        .collect();
    format!("{{ {} }}", parts.join(", "))
}

/// True when an embedded expression holds only whitespace and comments.
fn is_blank_script(code: &str) -> bool {
    let mut rest = code.trim_start();
    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix("//") {
            rest = after.find('\n').map(|i| &after[i..]).unwrap_or("");
        } else if let Some(after) = rest.strip_prefix("/*") {
            match after.find("*/") {
                Some(i) => rest = &after[i + 2..],
                None => return false,
            }
        } else {
            return false;
        }
        rest = rest.trim_start();
    }
    true
}

/// Collapse JSX text the way React does and emit it as a string child.
fn push_text(children: &mut Vec<String>, text: &mut String) {
    if text.is_empty() {
        return;
    }
    let cleaned = clean_jsx_text(text);
    text.clear();
    if !cleaned.is_empty() {
        children.push(js_string(&decode_entities(&cleaned)));
    }
}

fn clean_jsx_text(text: &str) -> String {
    let lines: Vec<&str> = text.split('\n').map(|l| l.trim_end_matches('\r')).collect();
    let last_non_empty = lines
        .iter()
        .rposition(|line| line.chars().any(|c| c != ' ' && c != '\t'))
        .unwrap_or(0);
    let is_blank = |c: char| c == ' ' || c == '\t';

    let mut out = String::new();
    for (i, line) in lines.iter().enumerate() {
        let mut trimmed: &str = line;
        if i != 0 {
            trimmed = trimmed.trim_start_matches(is_blank);
        }
        if i != lines.len() - 1 {
            trimmed = trimmed.trim_end_matches(is_blank);
        }
        if trimmed.is_empty() {
            continue;
        }
        out.push_str(trimmed);
        if i != last_non_empty {
            out.push(' ');
        }
    }
    out
}

fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail
            .char_indices()
            .take(12)
            .find(|&(_, c)| c == ';')
            .and_then(|(end, _)| decode_entity(&tail[1..end]).map(|c| (c, end + 1)));
        match decoded {
            Some((c, consumed)) => {
                out.push(c);
                rest = &tail[consumed..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(entity: &str) -> Option<char> {
    if let Some(num) = entity.strip_prefix('#') {
        let code = match num.strip_prefix('x').or_else(|| num.strip_prefix('X')) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse::<u32>().ok()?,
        };
        return char::from_u32(code);
    }
    Some(match entity {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        "lbrace" => '{',
        "rbrace" => '}',
        "copy" => '\u{a9}',
        "hellip" => '\u{2026}',
        "mdash" => '\u{2014}',
        "ndash" => '\u{2013}',
        "times" => '\u{d7}',
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(src: &str) -> String {
        transform(src, &TransformOptions::default()).unwrap().code
    }

    fn reject(src: &str) -> TransformError {
        transform(src, &TransformOptions::default()).unwrap_err()
    }

    #[test]
    fn plain_script_is_untouched() {
        let src = "const a = b < c ? 1 : 2;\nif (i<n) { x = y / 2 / z; }";
        assert_eq!(compile(src), src);
    }

    #[test]
    fn compiles_intrinsic_element_with_text() {
        assert_eq!(
            compile("const x = <div>Hello</div>;"),
            r#"const x = React.createElement("div", null, "Hello");"#
        );
    }

    #[test]
    fn compiles_attributes_and_expressions() {
        let out = compile(r#"return <button className="btn" disabled onClick={() => go(1)} aria-label='Go'>{label}</button>"#);
        assert_eq!(
            out,
            r#"return React.createElement("button", { className: "btn", disabled: true, onClick: () => go(1), "aria-label": "Go" }, label)"#
        );
    }

    #[test]
    fn components_and_member_tags_stay_expressions() {
        assert_eq!(
            compile("<Card.Header title={t}><Icon /></Card.Header>"),
            r#"React.createElement(Card.Header, { title: t }, React.createElement(Icon, null))"#
        );
    }

    #[test]
    fn fragments_and_spread() {
        assert_eq!(
            compile("<><Item {...props} key={id} /></>"),
            r#"React.createElement(React.Fragment, null, React.createElement(Item, { ...(props), key: id }))"#
        );
    }

    #[test]
    fn nested_markup_inside_expressions() {
        let out = compile("<ul>{items.map(i => <li key={i}>{i}</li>)}</ul>");
        assert_eq!(
            out,
            r#"React.createElement("ul", null, items.map(i => React.createElement("li", { key: i }, i)))"#
        );
    }

    #[test]
    fn collapses_whitespace_like_react() {
        let out = compile("<p>\n    Hello\n    world  <b>!</b>\n</p>");
        assert_eq!(
            out,
            r#"React.createElement("p", null, "Hello world  ", React.createElement("b", null, "!"))"#
        );
    }

    #[test]
    fn keeps_single_space_between_expressions() {
        assert_eq!(
            compile("<p>{a} {b}</p>"),
            r#"React.createElement("p", null, a, " ", b)"#
        );
    }

    #[test]
    fn decodes_entities_and_drops_comment_containers() {
        let out = compile("<span>a &amp; b&nbsp;&#65;{/* note */}</span>");
        assert_eq!(out, "React.createElement(\"span\", null, \"a & b\u{a0}A\")");
    }

    #[test]
    fn strings_and_templates_hide_markup() {
        let src = "const s = '<div>'; const t = `<p>${ok ? <b/> : \"x\"}</p>`;";
        assert_eq!(
            compile(src),
            "const s = '<div>'; const t = `<p>${ok ? React.createElement(\"b\", null) : \"x\"}</p>`;"
        );
    }

    #[test]
    fn regex_literals_are_copied() {
        let src = "const re = /<div>[/]/g; const y = (a) / 2;";
        assert_eq!(compile(src), src);
    }

    #[test]
    fn custom_pragma() {
        let options = TransformOptions {
            pragma: "h".into(),
            pragma_frag: "Fragment".into(),
        };
        let out = transform("<><br/></>", &options).unwrap().code;
        assert_eq!(out, r#"h(Fragment, null, h("br", null))"#);
    }

    #[test]
    fn rejects_mismatched_closing_tag() {
        let err = reject("function App() {\n  return <div><span></div>;\n}");
        assert_eq!(err.message, "Expected corresponding JSX closing tag for <span>");
        assert_eq!((err.line, err.column), (2, 21));
    }

    #[test]
    fn rejects_unterminated_markup() {
        let err = reject("const x = <div>hello");
        assert_eq!(err.message, "Unterminated JSX contents");
        assert_eq!((err.line, err.column), (1, 11));

        let err = reject("const x = <div class=\"a\"");
        assert!(err.message.starts_with("Unterminated JSX opening tag <div>"));
    }

    #[test]
    fn rejects_bare_angle_in_text() {
        let err = reject("<p>a > b</p>");
        assert!(err.message.starts_with("Unexpected token '>'"));
    }

    #[test]
    fn rejects_empty_attribute_expression() {
        let err = reject("<a href={} />");
        assert!(err.message.contains("non-empty expression"));
    }

    #[test]
    fn transform_is_deterministic() {
        let src = "const App = () => <div className=\"p-4\">{[1,2].map(n => <i>{n}</i>)}</div>;";
        assert_eq!(compile(src), compile(src));
    }
}
