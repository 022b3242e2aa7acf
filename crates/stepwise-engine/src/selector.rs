//! Selector expressions.
//!
//! Aliases are persisted as strings; this module maps them to [`Query`] values
//! and back. Supported forms:
//!
//! - plain CSS (`#login-button`, `[data-test="checkout"]`), optionally `css=`-prefixed
//! - `<css>:has-text("Checkout")`
//! - `xpath=<expr>` (or a bare expression starting with `//` / `(//`)
//! - `text=Accept All` (substring) / `text="7"` (exact) / `text=/Accept All/i`
//! - `role=button[name="Login"]`, `label=Zip`, `placeholder=Search`

use crate::driver::{Query, TextMatch};

const HAS_TEXT: &str = ":has-text(";

/// Parse a selector expression. Returns `None` for blank input.
pub fn parse(expr: &str) -> Option<Query> {
    let expr = expr.trim();
    if expr.is_empty() {
        return None;
    }

    if let Some(rest) = expr.strip_prefix("xpath=") {
        return Some(Query::XPath(rest.trim().to_string()));
    }
    if expr.starts_with("//") || expr.starts_with("(//") {
        return Some(Query::XPath(expr.to_string()));
    }
    if let Some(rest) = expr.strip_prefix("text=") {
        return Some(Query::Text(parse_text_literal(rest)));
    }
    if let Some(rest) = expr.strip_prefix("label=") {
        return Some(Query::Label(parse_text_literal(rest)));
    }
    if let Some(rest) = expr.strip_prefix("placeholder=") {
        return Some(Query::Placeholder(parse_text_literal(rest)));
    }
    if let Some(rest) = expr.strip_prefix("role=") {
        return Some(parse_role(rest));
    }

    let css = expr.strip_prefix("css=").unwrap_or(expr).trim();
    if css.ends_with(')')
        && let Some(pos) = css.rfind(HAS_TEXT)
    {
        let inner = &css[pos + HAS_TEXT.len()..css.len() - 1];
        let base = css[..pos].trim();
        let base = if base.is_empty() { "*" } else { base };
        return Some(Query::CssWithText {
            css: base.to_string(),
            text: TextMatch::Contains(unquote(inner).to_string()),
        });
    }
    Some(Query::Css(css.to_string()))
}

/// Render a query back into an expression accepted by [`parse`].
pub fn render(query: &Query) -> String {
    match query {
        Query::Css(css) => css.clone(),
        Query::CssWithText { css, text } => format!("{}{}{})", css, HAS_TEXT, css_quote(text.text())),
        Query::XPath(expr) => format!("xpath={}", expr),
        Query::Text(m) => format!("text={}", render_text_literal(m)),
        Query::Label(m) => format!("label={}", render_text_literal(m)),
        Query::Placeholder(m) => format!("placeholder={}", render_text_literal(m)),
        Query::Role { role, name } => {
            let exact = if name.is_exact() { "" } else { " i" };
            format!("role={}[name={}{}]", role, css_quote(name.text()), exact)
        }
    }
}

fn parse_text_literal(raw: &str) -> TextMatch {
    let raw = raw.trim();
    if raw.len() >= 2 && raw.starts_with('/') {
        let body = raw.trim_end_matches('i');
        if body.len() >= 2 && body.ends_with('/') {
            return TextMatch::Contains(body[1..body.len() - 1].to_string());
        }
    }
    if is_quoted(raw) {
        return TextMatch::Exact(unquote(raw).to_string());
    }
    TextMatch::Contains(raw.to_string())
}

fn render_text_literal(m: &TextMatch) -> String {
    match m {
        TextMatch::Exact(t) => css_quote(t),
        TextMatch::Contains(t) => t.clone(),
    }
}

fn parse_role(rest: &str) -> Query {
    let rest = rest.trim();
    let (role, attrs) = match rest.find('[') {
        Some(pos) => (&rest[..pos], &rest[pos..]),
        None => (rest, ""),
    };
    let name = attrs
        .trim_start_matches('[')
        .trim_end_matches(']')
        .strip_prefix("name=")
        .map(|v| {
            let (v, insensitive) = match v.trim().strip_suffix(" i") {
                Some(stripped) => (stripped, true),
                None => (v.trim(), false),
            };
            if insensitive || !is_quoted(v) {
                TextMatch::Contains(unquote(v).to_string())
            } else {
                TextMatch::Exact(unquote(v).to_string())
            }
        })
        .unwrap_or_else(|| TextMatch::Contains(String::new()));
    Query::Role {
        role: role.trim().to_string(),
        name,
    }
}

fn is_quoted(s: &str) -> bool {
    s.len() >= 2
        && ((s.starts_with('"') && s.ends_with('"')) || (s.starts_with('\'') && s.ends_with('\'')))
}

fn unquote(s: &str) -> &str {
    let s = s.trim();
    if is_quoted(s) { &s[1..s.len() - 1] } else { s }
}

/// Double-quoted CSS string literal.
pub fn css_quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' | '\r' => out.push(' '),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

/// XPath string literal, using `concat()` when the value holds both quote kinds.
pub fn xpath_literal(value: &str) -> String {
    if !value.contains('\'') {
        format!("'{}'", value)
    } else if !value.contains('"') {
        format!("\"{}\"", value)
    } else {
        let parts: Vec<String> = value.split('\'').map(|p| format!("'{}'", p)).collect();
        format!("concat({})", parts.join(", \"'\", "))
    }
}

/// XPath predicate: the node's text, lowercased, contains `needle`.
pub fn xpath_text_contains(needle: &str) -> String {
    format!(
        "contains(translate(normalize-space(.), 'ABCDEFGHIJKLMNOPQRSTUVWXYZ', 'abcdefghijklmnopqrstuvwxyz'), {})",
        xpath_literal(&needle.to_lowercase())
    )
}
