/// A position in source text, tracking line and column for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub column: usize,
}

impl Span {
    pub fn new(start: usize, end: usize, line: usize, column: usize) -> Self {
        Self {
            start,
            end,
            line,
            column,
        }
    }
}

/// Token classification for FML source.
///
/// Data-carrying variants embed their value directly (no separate `value`
/// field on Token). Tag-name classification happens in the lexer: lowercase
/// names are element tags, PascalCase names are components, and the fixed
/// directive set wins over both.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// `<div` — element open
    TagOpen(String),
    /// `</div>` — element close
    TagClose(String),
    /// `<Card` — PascalCase component open
    ComponentOpen(String),
    /// `</Card>` — component close
    ComponentClose(String),
    /// `<If` — built-in directive open
    DirectiveOpen(String),
    /// `</If>` — directive close
    DirectiveClose(String),
    /// `>` terminating an open tag
    TagEnd,
    /// `/>` terminating a self-closing tag
    SelfClose,

    /// Raw text between tags
    Text(String),
    /// `{expr}` in text position — raw expression source, untrimmed of meaning
    Interpolation(String),

    /// `name="value"` — quoted static attribute
    StaticAttr { name: String, value: String },
    /// `name={expr}` — dynamic attribute carrying raw expression source
    DynamicAttr { name: String, expr: String },
    /// `onClick={expr}` — event-handler attribute (bound by the client renderer)
    EventAttr { name: String, expr: String },
    /// Bare `name` — boolean-true attribute
    BoolAttr(String),

    /// End of input
    Eof,
}

/// A token produced by the FML lexer.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// Built-in control-flow directive names. These take priority over component
/// classification, so user components can never shadow them.
pub const DIRECTIVE_NAMES: &[&str] = &[
    "If", "Else", "ElseIf", "For", "Switch", "Case", "Default", "Slot",
];

/// Check if a tag name is a built-in directive.
pub fn is_directive(name: &str) -> bool {
    DIRECTIVE_NAMES.contains(&name)
}

/// HTML5 void elements (self-closing, no children).
pub const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

/// Check if a tag name is an HTML5 void element.
pub fn is_void_element(tag: &str) -> bool {
    VOID_ELEMENTS.contains(&tag)
}

/// DOM event names recognized without the `on` prefix.
pub const EVENT_NAMES: &[&str] = &[
    "click",
    "dblclick",
    "input",
    "change",
    "submit",
    "focus",
    "blur",
    "keydown",
    "keyup",
    "keypress",
    "mousedown",
    "mouseup",
    "mouseenter",
    "mouseleave",
    "scroll",
];

/// Check if an attribute name denotes an event handler.
///
/// Matches `on` followed by an uppercase letter (`onClick`, `onKeyDown`),
/// or a bare name from the known event set.
pub fn is_event_attribute(name: &str) -> bool {
    let mut chars = name.chars();
    if chars.next() == Some('o') && chars.next() == Some('n') {
        if let Some(c) = chars.next() {
            if c.is_ascii_uppercase() {
                return true;
            }
        }
    }
    EVENT_NAMES.contains(&name)
}

/// Normalized DOM event name for an event attribute: `onClick` → `click`,
/// bare names pass through lowercased.
pub fn event_name(attr: &str) -> String {
    let bytes = attr.as_bytes();
    if bytes.len() > 2 && bytes[0] == b'o' && bytes[1] == b'n' && bytes[2].is_ascii_uppercase() {
        attr[2..].to_lowercase()
    } else {
        attr.to_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_name_normalization() {
        assert_eq!(event_name("onClick"), "click");
        assert_eq!(event_name("onKeyDown"), "keydown");
        assert_eq!(event_name("click"), "click");
    }

    #[test]
    fn test_directive_classification() {
        assert!(is_directive("If"));
        assert!(is_directive("Slot"));
        assert!(!is_directive("Card"));
        assert!(!is_directive("if"));
    }

    #[test]
    fn test_void_elements() {
        assert!(is_void_element("br"));
        assert!(is_void_element("img"));
        assert!(!is_void_element("div"));
    }

    #[test]
    fn test_event_attribute_detection() {
        assert!(is_event_attribute("onClick"));
        assert!(is_event_attribute("onKeyDown"));
        assert!(is_event_attribute("click"));
        assert!(!is_event_attribute("once")); // `on` + lowercase is not an event
        assert!(!is_event_attribute("href"));
    }
}
