//! HTML entity escaping.
//!
//! The escaping contract consumed by both renderers: `escape_html` for text
//! and interpolation output, `escape_attribute` for attribute values. Both
//! are entity-safe for the five HTML metacharacters.

/// Escape text content for safe inclusion in HTML.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Escape an attribute value for inclusion inside double quotes.
pub fn escape_attribute(input: &str) -> String {
    escape_html(input)
}
