use crate::token::{is_directive, is_event_attribute, Span, Token, TokenKind};
use crate::LexError;

/// FML source scanner.
///
/// Tokenizes template source into a stream of tokens. Alternates between
/// text mode (raw text, `{expr}` interpolation, comments, tag boundaries)
/// and tag mode (attribute scanning until `>` or `/>`).
///
/// Brace balancing for `{...}` uses an explicit depth counter plus a single
/// inside-string flag, so `{a === "}"}` lexes as one expression. The lexer
/// does not recover from malformed input; it raises and stops. Recovery over
/// the token stream is the parser's job.
pub struct Scanner {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
    tokens: Vec<Token>,
    inside_tag: bool,
}

impl Scanner {
    /// Create a new scanner for the given source.
    pub fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            tokens: Vec::new(),
            inside_tag: false,
        }
    }

    /// Tokenize the entire source into a vector of tokens.
    pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
        let mut scanner = Scanner::new(source);
        scanner.scan_tokens()?;
        Ok(scanner.tokens)
    }

    fn scan_tokens(&mut self) -> Result<(), LexError> {
        while !self.is_at_end() {
            if self.inside_tag {
                self.scan_inside_tag()?;
            } else {
                self.scan_text()?;
            }
        }

        if self.inside_tag {
            return Err(self.error("Unterminated tag".into()));
        }

        let span = Span::new(self.pos, self.pos, self.line, self.column);
        self.tokens.push(Token::new(TokenKind::Eof, span));
        Ok(())
    }

    // --- Text mode ---

    /// Scan raw text up to the next tag boundary or interpolation.
    fn scan_text(&mut self) -> Result<(), LexError> {
        let start_line = self.line;
        let start_col = self.column;
        let start_pos = self.pos;
        let mut text = String::new();

        while !self.is_at_end() {
            match self.peek() {
                '<' if self.peek_next().is_some_and(|c| {
                    c.is_ascii_alphabetic() || c == '/' || c == '!'
                }) =>
                {
                    break;
                }
                '{' => break,
                '\\' if matches!(self.peek_next(), Some('{') | Some('}')) => {
                    // `\{` and `\}` escape interpolation delimiters in text
                    self.advance();
                    text.push(self.advance());
                }
                _ => text.push(self.advance()),
            }
        }

        if !text.is_empty() {
            let span = Span::new(start_pos, self.pos, start_line, start_col);
            self.tokens.push(Token::new(TokenKind::Text(text), span));
        }

        if self.is_at_end() {
            return Ok(());
        }

        match self.peek() {
            '{' => self.scan_interpolation(),
            '<' => {
                if self.peek_next() == Some('!') {
                    self.scan_comment()
                } else if self.peek_next() == Some('/') {
                    self.scan_close_tag()
                } else {
                    self.scan_open_tag()
                }
            }
            _ => unreachable!("scan_text stopped on unexpected character"),
        }
    }

    /// Scan interpolation `{expr}` in text position.
    ///
    /// Tracks brace depth for nested object literals and suspends counting
    /// while inside a quoted string literal.
    fn scan_interpolation(&mut self) -> Result<(), LexError> {
        let start_line = self.line;
        let start_col = self.column;
        let start_pos = self.pos;
        self.advance(); // consume opening `{`

        let content = self.read_balanced_braces(start_line, start_col)?;

        let span = Span::new(start_pos, self.pos, start_line, start_col);
        self.tokens.push(Token::new(
            TokenKind::Interpolation(content.trim().to_string()),
            span,
        ));
        Ok(())
    }

    /// Read the content of a brace expression whose opening `{` has already
    /// been consumed. Consumes the matching closing `}`.
    fn read_balanced_braces(
        &mut self,
        start_line: usize,
        start_col: usize,
    ) -> Result<String, LexError> {
        let mut content = String::new();
        let mut depth = 1usize;
        let mut in_string: Option<char> = None;

        while !self.is_at_end() {
            let c = self.peek();
            match in_string {
                Some(quote) => {
                    if c == '\\' {
                        content.push(self.advance());
                        if !self.is_at_end() {
                            content.push(self.advance());
                        }
                        continue;
                    }
                    if c == quote {
                        in_string = None;
                    }
                    content.push(self.advance());
                }
                None => match c {
                    '\'' | '"' => {
                        in_string = Some(c);
                        content.push(self.advance());
                    }
                    '{' => {
                        depth += 1;
                        content.push(self.advance());
                    }
                    '}' => {
                        depth -= 1;
                        self.advance();
                        if depth == 0 {
                            return Ok(content);
                        }
                        content.push('}');
                    }
                    _ => {
                        content.push(self.advance());
                    }
                },
            }
        }

        Err(LexError {
            message: "Unterminated expression".into(),
            line: start_line,
            column: start_col,
        })
    }

    /// Skip an HTML comment `<!-- ... -->`. Comments are not tokenized.
    fn scan_comment(&mut self) -> Result<(), LexError> {
        let start_line = self.line;
        let start_col = self.column;

        if !self.match_str("<!--") {
            return Err(self.error("Expected '<!--'".into()));
        }
        for _ in 0..4 {
            self.advance();
        }

        while !self.is_at_end() && !self.match_str("-->") {
            self.advance();
        }

        if self.is_at_end() {
            return Err(LexError {
                message: "Unterminated comment".into(),
                line: start_line,
                column: start_col,
            });
        }

        for _ in 0..3 {
            self.advance();
        }
        Ok(())
    }

    /// Scan an opening tag `<name`, classify the name, and enter tag mode.
    fn scan_open_tag(&mut self) -> Result<(), LexError> {
        let start_line = self.line;
        let start_col = self.column;
        let start_pos = self.pos;
        self.advance(); // consume `<`

        let name = self.read_name()?;
        let kind = Self::classify_open(name);

        let span = Span::new(start_pos, self.pos, start_line, start_col);
        self.tokens.push(Token::new(kind, span));
        self.inside_tag = true;
        Ok(())
    }

    /// Scan a closing tag `</name>`.
    fn scan_close_tag(&mut self) -> Result<(), LexError> {
        let start_line = self.line;
        let start_col = self.column;
        let start_pos = self.pos;
        self.advance(); // consume `<`
        self.advance(); // consume `/`

        let name = self.read_name()?;
        self.skip_whitespace();

        if self.is_at_end() || self.peek() != '>' {
            return Err(self.error(format!("Expected '>' to close '</{name}'")));
        }
        self.advance(); // consume `>`

        let kind = Self::classify_close(name);
        let span = Span::new(start_pos, self.pos, start_line, start_col);
        self.tokens.push(Token::new(kind, span));
        Ok(())
    }

    /// Directive names win over component classification; PascalCase names
    /// are components; everything else is an element tag.
    fn classify_open(name: String) -> TokenKind {
        if is_directive(&name) {
            TokenKind::DirectiveOpen(name)
        } else if name.chars().next().is_some_and(|c| c.is_ascii_uppercase()) {
            TokenKind::ComponentOpen(name)
        } else {
            TokenKind::TagOpen(name)
        }
    }

    fn classify_close(name: String) -> TokenKind {
        if is_directive(&name) {
            TokenKind::DirectiveClose(name)
        } else if name.chars().next().is_some_and(|c| c.is_ascii_uppercase()) {
            TokenKind::ComponentClose(name)
        } else {
            TokenKind::TagClose(name)
        }
    }

    // --- Tag mode ---

    /// Scan attributes and the tag terminator inside an open tag.
    fn scan_inside_tag(&mut self) -> Result<(), LexError> {
        self.skip_whitespace();

        if self.is_at_end() {
            return Err(self.error("Unterminated tag".into()));
        }

        match self.peek() {
            '>' => {
                let span = self.single_char_span();
                self.advance();
                self.tokens.push(Token::new(TokenKind::TagEnd, span));
                self.inside_tag = false;
                Ok(())
            }
            '/' => {
                if self.peek_next() != Some('>') {
                    return Err(self.error("Expected '/>' in self-closing tag".into()));
                }
                let span = Span::new(self.pos, self.pos + 2, self.line, self.column);
                self.advance();
                self.advance();
                self.tokens.push(Token::new(TokenKind::SelfClose, span));
                self.inside_tag = false;
                Ok(())
            }
            c if c.is_ascii_alphabetic() || c == '_' => self.scan_attribute(),
            c => Err(self.error(format!("Unexpected character in tag: '{c}'"))),
        }
    }

    /// Scan one attribute: `name`, `name="value"`, `name={expr}`.
    fn scan_attribute(&mut self) -> Result<(), LexError> {
        let start_line = self.line;
        let start_col = self.column;
        let start_pos = self.pos;

        let name = self.read_name()?;
        self.skip_whitespace();

        if self.is_at_end() || self.peek() != '=' {
            // Bare attribute: boolean true
            let span = Span::new(start_pos, self.pos, start_line, start_col);
            self.tokens.push(Token::new(TokenKind::BoolAttr(name), span));
            return Ok(());
        }

        self.advance(); // consume `=`
        self.skip_whitespace();

        if self.is_at_end() {
            return Err(self.error(format!("Expected value for attribute '{name}'")));
        }

        let kind = match self.peek() {
            '"' | '\'' => {
                let value = self.read_quoted_value()?;
                if is_event_attribute(&name) {
                    TokenKind::EventAttr { name, expr: value }
                } else {
                    TokenKind::StaticAttr { name, value }
                }
            }
            '{' => {
                let brace_line = self.line;
                let brace_col = self.column;
                self.advance(); // consume `{`
                let expr = self
                    .read_balanced_braces(brace_line, brace_col)?
                    .trim()
                    .to_string();
                if is_event_attribute(&name) {
                    TokenKind::EventAttr { name, expr }
                } else {
                    TokenKind::DynamicAttr { name, expr }
                }
            }
            c => {
                return Err(self.error(format!(
                    "Expected quoted value or {{expr}} for attribute '{name}', got '{c}'"
                )));
            }
        };

        let span = Span::new(start_pos, self.pos, start_line, start_col);
        self.tokens.push(Token::new(kind, span));
        Ok(())
    }

    /// Read a quoted attribute value with backslash escapes.
    fn read_quoted_value(&mut self) -> Result<String, LexError> {
        let quote = self.peek();
        let start_line = self.line;
        let start_col = self.column;
        self.advance(); // consume opening quote

        let mut value = String::new();

        while !self.is_at_end() && self.peek() != quote {
            if self.peek() == '\\' {
                self.advance(); // consume backslash
                if self.is_at_end() {
                    return Err(self.error("Unterminated escape sequence".into()));
                }
                match self.peek() {
                    'n' => value.push('\n'),
                    't' => value.push('\t'),
                    'r' => value.push('\r'),
                    '\\' => value.push('\\'),
                    '"' => value.push('"'),
                    '\'' => value.push('\''),
                    c => {
                        value.push('\\');
                        value.push(c);
                    }
                }
                self.advance();
            } else {
                value.push(self.advance());
            }
        }

        if self.is_at_end() {
            return Err(LexError {
                message: "Unterminated string".into(),
                line: start_line,
                column: start_col,
            });
        }

        self.advance(); // consume closing quote
        Ok(value)
    }

    /// Read a tag or attribute name: letters, digits, `-`, `_`.
    fn read_name(&mut self) -> Result<String, LexError> {
        if self.is_at_end() || !(self.peek().is_ascii_alphabetic() || self.peek() == '_') {
            return Err(self.error("Expected a name".into()));
        }

        let mut name = String::new();
        while !self.is_at_end()
            && (self.peek().is_ascii_alphanumeric() || self.peek() == '-' || self.peek() == '_')
        {
            name.push(self.advance());
        }
        Ok(name)
    }

    // --- Helpers ---

    fn is_at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn peek(&self) -> char {
        self.chars[self.pos]
    }

    fn peek_next(&self) -> Option<char> {
        self.chars.get(self.pos + 1).copied()
    }

    fn advance(&mut self) -> char {
        let c = self.chars[self.pos];
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        c
    }

    fn match_str(&self, s: &str) -> bool {
        let remaining = &self.chars[self.pos.min(self.chars.len())..];
        if remaining.len() < s.chars().count() {
            return false;
        }
        s.chars().zip(remaining.iter()).all(|(a, b)| a == *b)
    }

    fn skip_whitespace(&mut self) {
        while !self.is_at_end() && self.peek().is_whitespace() {
            self.advance();
        }
    }

    fn single_char_span(&self) -> Span {
        Span::new(self.pos, self.pos + 1, self.line, self.column)
    }

    fn error(&self, message: String) -> LexError {
        LexError {
            message,
            line: self.line,
            column: self.column,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tokenize(source: &str) -> Vec<Token> {
        Scanner::tokenize(source).unwrap()
    }

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_empty_source() {
        let tokens = tokenize("");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, TokenKind::Eof);
    }

    #[test]
    fn test_plain_text() {
        let tokens = tokenize("Hello, world!");
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].kind, TokenKind::Text("Hello, world!".into()));
    }

    #[test]
    fn test_simple_element() {
        assert_eq!(
            kinds("<div></div>"),
            vec![
                TokenKind::TagOpen("div".into()),
                TokenKind::TagEnd,
                TokenKind::TagClose("div".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_self_closing_element() {
        assert_eq!(
            kinds("<br />"),
            vec![
                TokenKind::TagOpen("br".into()),
                TokenKind::SelfClose,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_component_classification() {
        assert_eq!(
            kinds("<Card></Card>"),
            vec![
                TokenKind::ComponentOpen("Card".into()),
                TokenKind::TagEnd,
                TokenKind::ComponentClose("Card".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_directive_wins_over_component() {
        assert_eq!(
            kinds("<If condition={x}></If>"),
            vec![
                TokenKind::DirectiveOpen("If".into()),
                TokenKind::DynamicAttr {
                    name: "condition".into(),
                    expr: "x".into()
                },
                TokenKind::TagEnd,
                TokenKind::DirectiveClose("If".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_static_attribute() {
        assert_eq!(
            kinds(r#"<a href="/about">"#),
            vec![
                TokenKind::TagOpen("a".into()),
                TokenKind::StaticAttr {
                    name: "href".into(),
                    value: "/about".into()
                },
                TokenKind::TagEnd,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_attribute_escapes() {
        let tokens = tokenize(r#"<p title="a\nb\tc\"d">"#);
        assert_eq!(
            tokens[1].kind,
            TokenKind::StaticAttr {
                name: "title".into(),
                value: "a\nb\tc\"d".into()
            }
        );
    }

    #[test]
    fn test_bare_boolean_attribute() {
        let tokens = tokenize("<input disabled />");
        assert_eq!(tokens[1].kind, TokenKind::BoolAttr("disabled".into()));
    }

    #[test]
    fn test_event_attribute() {
        let tokens = tokenize("<button onClick={save}>");
        assert_eq!(
            tokens[1].kind,
            TokenKind::EventAttr {
                name: "onClick".into(),
                expr: "save".into()
            }
        );
    }

    #[test]
    fn test_plain_dynamic_attribute_is_not_event() {
        let tokens = tokenize("<div class={cls}>");
        assert_eq!(
            tokens[1].kind,
            TokenKind::DynamicAttr {
                name: "class".into(),
                expr: "cls".into()
            }
        );
    }

    #[test]
    fn test_interpolation() {
        assert_eq!(
            kinds("Hello {user.name}!"),
            vec![
                TokenKind::Text("Hello ".into()),
                TokenKind::Interpolation("user.name".into()),
                TokenKind::Text("!".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_interpolation_nested_braces() {
        let tokens = tokenize("{ {a: 1} }");
        assert_eq!(tokens[0].kind, TokenKind::Interpolation("{a: 1}".into()));
    }

    #[test]
    fn test_brace_inside_string_suspends_counting() {
        let tokens = tokenize(r#"{a === "}"}"#);
        assert_eq!(
            tokens[0].kind,
            TokenKind::Interpolation(r#"a === "}""#.into())
        );
    }

    #[test]
    fn test_unterminated_interpolation() {
        let err = Scanner::tokenize("{user.name").unwrap_err();
        assert!(err.message.contains("Unterminated expression"));
    }

    #[test]
    fn test_comment_skipped() {
        assert_eq!(
            kinds("before<!-- note -->after"),
            vec![
                TokenKind::Text("before".into()),
                TokenKind::Text("after".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_unterminated_comment() {
        let err = Scanner::tokenize("<!-- never closed").unwrap_err();
        assert!(err.message.contains("Unterminated comment"));
    }

    #[test]
    fn test_unterminated_string() {
        let err = Scanner::tokenize(r#"<a href="broken>"#).unwrap_err();
        assert!(err.message.contains("Unterminated string"));
    }

    #[test]
    fn test_unterminated_tag() {
        let err = Scanner::tokenize("<div class=\"x\"").unwrap_err();
        assert!(err.message.contains("Unterminated tag"));
    }

    #[test]
    fn test_stray_angle_bracket_is_text() {
        let tokens = tokenize("1 < 2");
        assert_eq!(tokens[0].kind, TokenKind::Text("1 < 2".into()));
    }

    #[test]
    fn test_escaped_brace_in_text() {
        let tokens = tokenize(r"literal \{ brace");
        assert_eq!(tokens[0].kind, TokenKind::Text("literal { brace".into()));
    }

    #[test]
    fn test_position_tracking() {
        let tokens = tokenize("ab\n<div>");
        let open = &tokens[1];
        assert_eq!(open.span.line, 2);
        assert_eq!(open.span.column, 1);
    }

    #[test]
    fn test_multiline_tag() {
        let tokens = tokenize("<div\n  class=\"a\"\n  id=\"b\"\n>");
        assert_eq!(tokens.len(), 5); // open, class, id, end, eof
    }

    #[test]
    fn test_full_template() {
        let kinds = kinds(r#"<p>Hi {name}</p><Card title="x" /><If condition={ok}>y</If>"#);
        assert!(kinds.contains(&TokenKind::TagOpen("p".into())));
        assert!(kinds.contains(&TokenKind::Interpolation("name".into())));
        assert!(kinds.contains(&TokenKind::ComponentOpen("Card".into())));
        assert!(kinds.contains(&TokenKind::SelfClose));
        assert!(kinds.contains(&TokenKind::DirectiveOpen("If".into())));
    }
}
