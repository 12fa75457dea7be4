//! Document parser for FML.
//!
//! Parses a token stream from `fml-lexer` into a [`Document`] AST using
//! recursive descent. Directive assembly happens here: an `If` consumes its
//! `ElseIf`/`Else` continuations into a single ordered branch list at parse
//! time, `For`/`Switch`/`Slot` get their attribute contracts checked, and
//! misplaced `Case`/`Default`/`Else` nodes are rejected.
//!
//! Recovery model: in strict mode the first error aborts. Otherwise a
//! mismatched closing tag triggers a bounded lookahead (≤ 10 tokens) for the
//! correct close — skipping the stray close with a warning when the real one
//! is near, or recording an error and resynchronizing at the close boundary
//! so one pass can surface multiple diagnostics.

use crate::ast::{
    AttrValue, Attribute, CaseNode, Component, Document, Element, ForNode, IfBranch, IfNode,
    Interpolation, Node, SlotNode, SwitchNode,
};
use crate::expr;
use crate::{ParseError, Warning};
use fml_lexer::{is_void_element, Scanner, Span, Token, TokenKind};
use std::collections::{HashMap, HashSet};

/// How far ahead to look for the correct closing tag before giving up on
/// auto-correction.
const RECOVERY_LOOKAHEAD: usize = 10;

/// Parser configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParserOptions {
    /// Fail on the first error instead of recovering.
    pub strict: bool,
}

/// The result of a non-strict parse: the (possibly repaired) document plus
/// every diagnostic collected along the way.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseOutput {
    pub document: Document,
    pub errors: Vec<ParseError>,
    pub warnings: Vec<Warning>,
}

/// Which close-token family a subtree expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseKind {
    Tag,
    Component,
    Directive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagTerm {
    End,
    SelfClose,
}

/// FML document parser.
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    strict: bool,
    errors: Vec<ParseError>,
    warnings: Vec<Warning>,
    tag_stack: Vec<(String, Span)>,
    component_sources: HashMap<String, String>,
    verified_components: HashSet<String>,
}

impl Parser {
    /// Create a new parser for the given tokens.
    pub fn new(tokens: Vec<Token>) -> Self {
        Self::with_options(tokens, ParserOptions::default())
    }

    /// Create a parser with explicit options.
    pub fn with_options(tokens: Vec<Token>, options: ParserOptions) -> Self {
        Self {
            tokens,
            pos: 0,
            strict: options.strict,
            errors: Vec::new(),
            warnings: Vec::new(),
            tag_stack: Vec::new(),
            component_sources: HashMap::new(),
            verified_components: HashSet::new(),
        }
    }

    /// Provide template sources for named components so static circular
    /// references can be rejected at parse time.
    pub fn with_component_sources(mut self, sources: HashMap<String, String>) -> Self {
        self.component_sources = sources;
        self
    }

    /// Parse source directly: lex, then parse with default options.
    pub fn parse_source(source: &str) -> Result<ParseOutput, ParseError> {
        let tokens = Scanner::tokenize(source).map_err(|e| ParseError {
            message: e.message,
            line: e.line,
            column: e.column,
        })?;
        Parser::new(tokens).parse()
    }

    /// Parse the token stream into a document.
    ///
    /// `Err` is returned for fatal errors only: any error in strict mode, or
    /// a circular component reference in any mode. Recoverable problems are
    /// accumulated in the returned [`ParseOutput`].
    pub fn parse(mut self) -> Result<ParseOutput, ParseError> {
        let mut children = Vec::new();

        while !self.is_eof() {
            if let Some((_, name)) = close_parts(self.current_kind()) {
                let name = name.to_string();
                let span = self.current_span();
                self.report(format!("Unexpected closing tag </{name}>"), span)?;
                self.advance();
                continue;
            }
            if let Some(node) = self.parse_node()? {
                children.push(node);
            }
        }

        Ok(ParseOutput {
            document: Document { children },
            errors: self.errors,
            warnings: self.warnings,
        })
    }

    // =========================================================================
    // Node dispatch
    // =========================================================================

    /// Parse a single node. Returns `None` when a misplaced construct was
    /// consumed during recovery.
    fn parse_node(&mut self) -> Result<Option<Node>, ParseError> {
        match self.current_kind().clone() {
            TokenKind::Text(content) => {
                self.advance();
                Ok(Some(Node::Text(content)))
            }
            TokenKind::Interpolation(expression) => {
                let span = self.current_span();
                self.advance();
                Ok(Some(Node::Interpolation(Interpolation { expression, span })))
            }
            TokenKind::TagOpen(_) => self.parse_element(),
            TokenKind::ComponentOpen(_) => self.parse_component(),
            TokenKind::DirectiveOpen(name) => match name.as_str() {
                "If" => self.parse_if(),
                "For" => self.parse_for(),
                "Switch" => self.parse_switch(),
                "Slot" => self.parse_slot(),
                "ElseIf" | "Else" => {
                    let span = self.current_span();
                    self.report(format!("<{name}> without a preceding <If>"), span)?;
                    self.skip_directive_subtree(&name)?;
                    Ok(None)
                }
                "Case" | "Default" => {
                    let span = self.current_span();
                    self.report(format!("<{name}> is only allowed inside <Switch>"), span)?;
                    self.skip_directive_subtree(&name)?;
                    Ok(None)
                }
                _ => {
                    let span = self.current_span();
                    self.report(format!("Unknown directive <{name}>"), span)?;
                    self.skip_directive_subtree(&name)?;
                    Ok(None)
                }
            },
            TokenKind::Eof => Ok(None),
            other => {
                let span = self.current_span();
                self.report(format!("Unexpected token: {other:?}"), span)?;
                self.advance();
                Ok(None)
            }
        }
    }

    // =========================================================================
    // Elements and components
    // =========================================================================

    fn parse_element(&mut self) -> Result<Option<Node>, ParseError> {
        let span = self.current_span();
        let tag = match self.current_kind().clone() {
            TokenKind::TagOpen(tag) => tag,
            other => unreachable!("parse_element on {other:?}"),
        };
        self.advance();

        let (attributes, term) = self.collect_attrs(&tag)?;
        let mut children = Vec::new();

        if term == TagTerm::End {
            self.tag_stack.push((tag.clone(), span));
            children = self.parse_children_until_close(CloseKind::Tag, &tag, span)?;
            self.tag_stack.pop();

            if is_void_element(&tag) && !children.is_empty() {
                self.report(format!("Void element <{tag}> cannot have children"), span)?;
                children.clear();
            }
        }

        Ok(Some(Node::Element(Element {
            tag,
            attributes,
            children,
            span,
        })))
    }

    fn parse_component(&mut self) -> Result<Option<Node>, ParseError> {
        let span = self.current_span();
        let name = match self.current_kind().clone() {
            TokenKind::ComponentOpen(name) => name,
            other => unreachable!("parse_component on {other:?}"),
        };
        self.advance();

        let (props, term) = self.collect_attrs(&name)?;

        // Prop-object shorthand uses a constrained grammar; reject anything
        // that falls outside it instead of carrying it to render time.
        for prop in &props {
            if let AttrValue::Dynamic(source) = &prop.value {
                let trimmed = source.trim_start();
                if (trimmed.starts_with('{') || trimmed.starts_with('['))
                    && expr::compile(source).is_unsafe()
                {
                    self.report(
                        format!("Invalid object literal for prop '{}' of <{name}>", prop.name),
                        span,
                    )?;
                }
            }
        }

        self.check_component_cycles(&name, span)?;

        let mut children = Vec::new();
        if term == TagTerm::End {
            self.tag_stack.push((name.clone(), span));
            children = self.parse_children_until_close(CloseKind::Component, &name, span)?;
            self.tag_stack.pop();
        }

        Ok(Some(Node::Component(Component {
            name,
            props,
            children,
            span,
        })))
    }

    /// Collect attribute tokens until the tag terminator.
    fn collect_attrs(&mut self, owner: &str) -> Result<(Vec<Attribute>, TagTerm), ParseError> {
        let mut attrs: Vec<Attribute> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        loop {
            let span = self.current_span();
            let (name, value) = match self.current_kind().clone() {
                TokenKind::TagEnd => {
                    self.advance();
                    return Ok((attrs, TagTerm::End));
                }
                TokenKind::SelfClose => {
                    self.advance();
                    return Ok((attrs, TagTerm::SelfClose));
                }
                TokenKind::StaticAttr { name, value } => (name, AttrValue::Static(value)),
                TokenKind::DynamicAttr { name, expr } => (name, AttrValue::Dynamic(expr)),
                TokenKind::EventAttr { name, expr } => (name, AttrValue::Event(expr)),
                TokenKind::BoolAttr(name) => (name, AttrValue::Bool),
                other => {
                    self.report(
                        format!("Expected attribute or '>' in <{owner}>, got {other:?}"),
                        span,
                    )?;
                    return Ok((attrs, TagTerm::SelfClose));
                }
            };
            self.advance();

            if !seen.insert(name.clone()) {
                self.warn(format!("Duplicate attribute '{name}' on <{owner}>"), span);
                continue;
            }
            attrs.push(Attribute { name, value });
        }
    }

    // =========================================================================
    // Children with recovery
    // =========================================================================

    /// Parse children until the matching close token, which is consumed.
    fn parse_children_until_close(
        &mut self,
        kind: CloseKind,
        name: &str,
        open_span: Span,
    ) -> Result<Vec<Node>, ParseError> {
        let mut children = Vec::new();

        loop {
            if self.is_eof() {
                self.report(self.unclosed_message(name, open_span), open_span)?;
                break;
            }

            if let Some((ckind, cname)) = close_parts(self.current_kind()) {
                if ckind == kind && cname == name {
                    self.advance();
                    break;
                }

                let cname = cname.to_string();
                let span = self.current_span();
                let message = format!("Mismatched closing tag </{cname}>, expected </{name}>");
                if self.strict {
                    return Err(ParseError {
                        message,
                        line: span.line,
                        column: span.column,
                    });
                }
                if self.lookahead_close(kind, name) {
                    // The real close is near; the stray one can be skipped.
                    self.warn(
                        format!("Skipping stray closing tag </{cname}> inside <{name}>"),
                        span,
                    );
                    self.advance();
                    continue;
                }
                // Resynchronize at the close boundary and let an outer
                // scope claim it.
                self.errors.push(ParseError {
                    message,
                    line: span.line,
                    column: span.column,
                });
                break;
            }

            if let Some(node) = self.parse_node()? {
                children.push(node);
            }
        }

        Ok(children)
    }

    fn unclosed_message(&self, name: &str, open_span: Span) -> String {
        let mut message = format!(
            "Unclosed <{name}> (opened at line {}, column {})",
            open_span.line, open_span.column
        );
        if self.tag_stack.len() > 1 {
            let chain: Vec<&str> = self.tag_stack.iter().map(|(n, _)| n.as_str()).collect();
            message.push_str(&format!("; open tags: {}", chain.join(" > ")));
        }
        message
    }

    /// Look ahead a bounded number of tokens for the expected close.
    fn lookahead_close(&self, kind: CloseKind, name: &str) -> bool {
        self.tokens
            .iter()
            .skip(self.pos + 1)
            .take(RECOVERY_LOOKAHEAD)
            .any(|t| matches!(close_parts(&t.kind), Some((k, n)) if k == kind && n == name))
    }

    /// Consume a directive subtree during recovery, balancing same-name
    /// nesting.
    fn skip_directive_subtree(&mut self, name: &str) -> Result<(), ParseError> {
        self.advance(); // the DirectiveOpen token
        let (_, term) = self.collect_attrs(name)?;
        if term == TagTerm::SelfClose {
            return Ok(());
        }
        let mut depth = 1usize;
        while !self.is_eof() && depth > 0 {
            match self.current_kind() {
                TokenKind::DirectiveOpen(n) if n == name => depth += 1,
                TokenKind::DirectiveClose(n) if n == name => depth -= 1,
                _ => {}
            }
            self.advance();
        }
        Ok(())
    }

    // =========================================================================
    // If / ElseIf / Else chain assembly
    // =========================================================================

    /// Parse an `If` chain into one ordered branch list.
    ///
    /// Both authoring shapes are accepted: `ElseIf`/`Else` nested inside the
    /// `If` as trailing children, and sibling tags immediately following
    /// `</If>`. Either way the chain is assembled here, never deferred to the
    /// renderers.
    fn parse_if(&mut self) -> Result<Option<Node>, ParseError> {
        let span = self.current_span();
        self.advance(); // <If

        let (attrs, term) = self.collect_attrs("If")?;
        let condition = self.require_expr_attr(&attrs, "condition", "If", span)?;

        let mut branches = Vec::new();
        if term == TagTerm::SelfClose {
            branches.push(IfBranch {
                condition: Some(condition),
                children: Vec::new(),
            });
            return Ok(Some(Node::If(IfNode { branches, span })));
        }

        // Directive names whose close token we still owe.
        let mut opened: Vec<String> = vec!["If".to_string()];
        let mut pending_cond: Option<Option<String>> = Some(Some(condition));
        let mut last_was_else;

        'chain: loop {
            let children = self.parse_branch_children()?;
            let cond = pending_cond
                .take()
                .expect("a branch condition is always pending here");
            last_was_else = cond.is_none();
            branches.push(IfBranch {
                condition: cond,
                children,
            });

            // Boundary handling: chain continuations and close unwinding.
            loop {
                match self.current_kind().clone() {
                    TokenKind::DirectiveOpen(d)
                        if (d == "ElseIf" || d == "Else") && !last_was_else =>
                    {
                        let dspan = self.current_span();
                        self.advance();
                        let (dattrs, dterm) = self.collect_attrs(&d)?;
                        let cond = if d == "ElseIf" {
                            Some(self.require_expr_attr(&dattrs, "condition", "ElseIf", dspan)?)
                        } else {
                            None
                        };
                        if dterm == TagTerm::SelfClose {
                            last_was_else = cond.is_none();
                            branches.push(IfBranch {
                                condition: cond,
                                children: Vec::new(),
                            });
                            continue;
                        }
                        opened.push(d);
                        pending_cond = Some(cond);
                        continue 'chain;
                    }
                    TokenKind::DirectiveOpen(d) if d == "ElseIf" || d == "Else" => {
                        let dspan = self.current_span();
                        self.report(format!("<{d}> after <Else> in the same chain"), dspan)?;
                        self.skip_directive_subtree(&d)?;
                        continue;
                    }
                    TokenKind::DirectiveClose(d) if opened.contains(&d) => {
                        self.advance();
                        let idx = opened
                            .iter()
                            .rposition(|o| o == &d)
                            .expect("close is in the opened list");
                        opened.remove(idx);
                        if opened.is_empty() {
                            if !last_was_else && self.enter_sibling_chain() {
                                continue;
                            }
                            break 'chain;
                        }
                        continue;
                    }
                    TokenKind::DirectiveClose(d) => {
                        let dspan = self.current_span();
                        self.report(format!("Stray closing tag </{d}> in <If> chain"), dspan)?;
                        self.advance();
                        continue;
                    }
                    TokenKind::Eof => {
                        self.report(self.unclosed_message("If", span), span)?;
                        break 'chain;
                    }
                    _ => {
                        // Trailing content after an inner close but before the
                        // outer one attaches to the last branch.
                        let extra = self.parse_branch_children()?;
                        if let Some(last) = branches.last_mut() {
                            last.children.extend(extra);
                        }
                        continue;
                    }
                }
            }
        }

        Ok(Some(Node::If(IfNode { branches, span })))
    }

    /// Parse branch content, stopping (without consuming) at any chain
    /// boundary: `<ElseIf`, `<Else`, a chain close token, or EOF.
    fn parse_branch_children(&mut self) -> Result<Vec<Node>, ParseError> {
        let mut children = Vec::new();
        loop {
            match self.current_kind() {
                TokenKind::Eof => break,
                TokenKind::DirectiveOpen(d) if d == "ElseIf" || d == "Else" => break,
                TokenKind::DirectiveClose(d) if d == "If" || d == "ElseIf" || d == "Else" => break,
                kind if close_parts(kind).is_some() => {
                    // A foreign close inside a branch: record and skip.
                    let (_, cname) = close_parts(kind).expect("checked above");
                    let cname = cname.to_string();
                    let span = self.current_span();
                    self.report(format!("Mismatched closing tag </{cname}> in <If> branch"), span)?;
                    self.advance();
                }
                _ => {
                    if let Some(node) = self.parse_node()? {
                        children.push(node);
                    }
                }
            }
        }
        Ok(children)
    }

    /// After `</If>` (or a completed sibling branch), check whether an
    /// `ElseIf`/`Else` sibling follows, skipping whitespace-only text. On a
    /// hit the whitespace is consumed and the parser rests on the directive.
    fn enter_sibling_chain(&mut self) -> bool {
        let saved = self.pos;
        while let TokenKind::Text(t) = self.current_kind() {
            if !t.trim().is_empty() {
                self.pos = saved;
                return false;
            }
            self.advance();
        }
        match self.current_kind() {
            TokenKind::DirectiveOpen(d) if d == "ElseIf" || d == "Else" => true,
            _ => {
                self.pos = saved;
                false
            }
        }
    }

    // =========================================================================
    // For / Switch / Slot
    // =========================================================================

    fn parse_for(&mut self) -> Result<Option<Node>, ParseError> {
        let span = self.current_span();
        self.advance(); // <For

        let (attrs, term) = self.collect_attrs("For")?;

        let iterable = match find_expr(&attrs, "each").or_else(|| find_expr(&attrs, "items")) {
            Some(src) => src.to_string(),
            None => {
                self.report("<For> requires an 'each' attribute".to_string(), span)?;
                String::new()
            }
        };
        let item_name = find_static(&attrs, "as").unwrap_or("item").to_string();
        let index_name = find_static(&attrs, "index").unwrap_or("index").to_string();
        if item_name == index_name {
            self.report(
                format!("<For> item and index cannot share the name '{item_name}'"),
                span,
            )?;
        }

        let body = if term == TagTerm::End {
            self.parse_children_until_close(CloseKind::Directive, "For", span)?
        } else {
            Vec::new()
        };

        Ok(Some(Node::For(ForNode {
            iterable,
            item_name,
            index_name,
            body,
            span,
        })))
    }

    fn parse_switch(&mut self) -> Result<Option<Node>, ParseError> {
        let span = self.current_span();
        self.advance(); // <Switch

        let (attrs, term) = self.collect_attrs("Switch")?;
        let value = self.require_expr_attr(&attrs, "value", "Switch", span)?;

        let mut cases = Vec::new();
        let mut default: Option<Vec<Node>> = None;

        if term == TagTerm::End {
            loop {
                if self.is_eof() {
                    self.report(self.unclosed_message("Switch", span), span)?;
                    break;
                }
                match self.current_kind().clone() {
                    TokenKind::DirectiveClose(d) if d == "Switch" => {
                        self.advance();
                        break;
                    }
                    TokenKind::Text(t) if t.trim().is_empty() => {
                        self.advance();
                    }
                    TokenKind::DirectiveOpen(d) if d == "Case" => {
                        let cspan = self.current_span();
                        self.advance();
                        let (cattrs, cterm) = self.collect_attrs("Case")?;
                        let cvalue = self.require_expr_attr(&cattrs, "value", "Case", cspan)?;
                        let body = if cterm == TagTerm::End {
                            self.parse_children_until_close(CloseKind::Directive, "Case", cspan)?
                        } else {
                            Vec::new()
                        };
                        cases.push(CaseNode {
                            value: cvalue,
                            body,
                        });
                    }
                    TokenKind::DirectiveOpen(d) if d == "Default" => {
                        let dspan = self.current_span();
                        self.advance();
                        let (_, dterm) = self.collect_attrs("Default")?;
                        let body = if dterm == TagTerm::End {
                            self.parse_children_until_close(CloseKind::Directive, "Default", dspan)?
                        } else {
                            Vec::new()
                        };
                        if default.is_some() {
                            self.report(
                                "<Switch> allows at most one <Default>".to_string(),
                                dspan,
                            )?;
                        } else {
                            default = Some(body);
                        }
                    }
                    _ => {
                        let ospan = self.current_span();
                        self.report(
                            "Only <Case> and <Default> are allowed inside <Switch>".to_string(),
                            ospan,
                        )?;
                        // Consume the stray node so the scan can continue.
                        if close_parts(self.current_kind()).is_some() {
                            self.advance();
                        } else {
                            self.parse_node()?;
                        }
                    }
                }
            }
        }

        Ok(Some(Node::Switch(SwitchNode {
            value,
            cases,
            default,
            span,
        })))
    }

    fn parse_slot(&mut self) -> Result<Option<Node>, ParseError> {
        let span = self.current_span();
        self.advance(); // <Slot

        let (attrs, term) = self.collect_attrs("Slot")?;
        let name = find_static(&attrs, "name").unwrap_or("default").to_string();

        let fallback = if term == TagTerm::End {
            self.parse_children_until_close(CloseKind::Directive, "Slot", span)?
        } else {
            Vec::new()
        };

        Ok(Some(Node::Slot(SlotNode {
            name,
            fallback,
            span,
        })))
    }

    /// Fetch a required expression attribute, recording an error (and
    /// degrading to an empty — hence inert — expression) when absent.
    fn require_expr_attr(
        &mut self,
        attrs: &[Attribute],
        attr: &str,
        owner: &str,
        span: Span,
    ) -> Result<String, ParseError> {
        match find_expr(attrs, attr) {
            Some(src) => Ok(src.to_string()),
            None => {
                self.report(format!("<{owner}> requires a '{attr}' attribute"), span)?;
                Ok(String::new())
            }
        }
    }

    // =========================================================================
    // Static component cycle detection
    // =========================================================================

    /// Reject components that transitively reference themselves by name.
    /// Always fatal, even in non-strict mode.
    fn check_component_cycles(&mut self, name: &str, span: Span) -> Result<(), ParseError> {
        if !self.component_sources.contains_key(name) || self.verified_components.contains(name) {
            return Ok(());
        }
        let mut stack = Vec::new();
        self.verify_acyclic(name, &mut stack, span)
    }

    fn verify_acyclic(
        &mut self,
        name: &str,
        stack: &mut Vec<String>,
        span: Span,
    ) -> Result<(), ParseError> {
        if stack.iter().any(|n| n == name) {
            let chain = stack.join(" -> ");
            return Err(ParseError {
                message: format!("Circular component reference: {chain} -> {name}"),
                line: span.line,
                column: span.column,
            });
        }
        if self.verified_components.contains(name) {
            return Ok(());
        }
        let Some(source) = self.component_sources.get(name).cloned() else {
            return Ok(());
        };

        stack.push(name.to_string());
        match component_refs(&source) {
            Ok(refs) => {
                for reference in refs {
                    self.verify_acyclic(&reference, stack, span)?;
                }
            }
            Err(lex_err) => {
                self.report(
                    format!("Component '{name}' failed to tokenize: {lex_err}"),
                    span,
                )?;
            }
        }
        stack.pop();
        self.verified_components.insert(name.to_string());
        Ok(())
    }

    // =========================================================================
    // Diagnostics and token navigation
    // =========================================================================

    /// Record a recoverable error, or fail immediately in strict mode.
    fn report(&mut self, message: String, span: Span) -> Result<(), ParseError> {
        let error = ParseError {
            message,
            line: span.line,
            column: span.column,
        };
        if self.strict {
            return Err(error);
        }
        self.errors.push(error);
        Ok(())
    }

    fn warn(&mut self, message: String, span: Span) {
        self.warnings.push(Warning {
            message,
            line: span.line,
            column: span.column,
        });
    }

    fn current_token(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn current_kind(&self) -> &TokenKind {
        &self.current_token().kind
    }

    fn current_span(&self) -> Span {
        self.current_token().span
    }

    fn is_eof(&self) -> bool {
        matches!(self.current_kind(), TokenKind::Eof)
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
    }
}

/// Decompose a close token into its family and name.
fn close_parts(kind: &TokenKind) -> Option<(CloseKind, &str)> {
    match kind {
        TokenKind::TagClose(n) => Some((CloseKind::Tag, n)),
        TokenKind::ComponentClose(n) => Some((CloseKind::Component, n)),
        TokenKind::DirectiveClose(n) => Some((CloseKind::Directive, n)),
        _ => None,
    }
}

/// Find a static attribute value by name.
fn find_static<'a>(attrs: &'a [Attribute], name: &str) -> Option<&'a str> {
    attrs.iter().find(|a| a.name == name).and_then(|a| match &a.value {
        AttrValue::Static(v) => Some(v.as_str()),
        _ => None,
    })
}

/// Find an expression-valued attribute by name. A static value is accepted
/// and treated as expression source, so `condition="ok"` also works.
fn find_expr<'a>(attrs: &'a [Attribute], name: &str) -> Option<&'a str> {
    attrs.iter().find(|a| a.name == name).and_then(|a| match &a.value {
        AttrValue::Dynamic(v) | AttrValue::Static(v) => Some(v.as_str()),
        _ => None,
    })
}

/// Component names referenced by a template source.
fn component_refs(source: &str) -> Result<Vec<String>, fml_lexer::LexError> {
    let tokens = Scanner::tokenize(source)?;
    let mut names = Vec::new();
    for token in tokens {
        if let TokenKind::ComponentOpen(name) = token.kind {
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(source: &str) -> ParseOutput {
        Parser::parse_source(source).unwrap()
    }

    fn parse_strict(source: &str) -> Result<ParseOutput, ParseError> {
        let tokens = Scanner::tokenize(source).unwrap();
        Parser::with_options(tokens, ParserOptions { strict: true }).parse()
    }

    fn first_element(out: &ParseOutput) -> &Element {
        match &out.document.children[0] {
            Node::Element(el) => el,
            other => panic!("Expected Element, got {other:?}"),
        }
    }

    // =========================================================================
    // Basic structure
    // =========================================================================

    #[test]
    fn test_empty_document() {
        let out = parse("");
        assert!(out.document.children.is_empty());
        assert!(out.errors.is_empty());
    }

    #[test]
    fn test_text_and_interpolation() {
        let out = parse("Hello {user.name}!");
        assert_eq!(out.document.children.len(), 3);
        assert!(matches!(&out.document.children[0], Node::Text(t) if t == "Hello "));
        assert!(matches!(
            &out.document.children[1],
            Node::Interpolation(i) if i.expression == "user.name"
        ));
    }

    #[test]
    fn test_nested_elements() {
        let out = parse("<div><span>hi</span></div>");
        let el = first_element(&out);
        assert_eq!(el.tag, "div");
        assert_eq!(el.children.len(), 1);
        match &el.children[0] {
            Node::Element(span) => {
                assert_eq!(span.tag, "span");
                assert!(matches!(&span.children[0], Node::Text(t) if t == "hi"));
            }
            other => panic!("Expected span, got {other:?}"),
        }
    }

    #[test]
    fn test_attributes_classified() {
        let out = parse(r#"<a href="/x" target={tab} onClick={go} hidden></a>"#);
        let el = first_element(&out);
        assert_eq!(el.attributes.len(), 4);
        assert_eq!(el.attributes[0].value, AttrValue::Static("/x".into()));
        assert_eq!(el.attributes[1].value, AttrValue::Dynamic("tab".into()));
        assert_eq!(el.attributes[2].value, AttrValue::Event("go".into()));
        assert_eq!(el.attributes[3].value, AttrValue::Bool);
    }

    #[test]
    fn test_duplicate_attribute_warns() {
        let out = parse(r#"<div class="a" class="b"></div>"#);
        assert_eq!(out.warnings.len(), 1);
        assert_eq!(first_element(&out).attributes.len(), 1);
    }

    #[test]
    fn test_parse_twice_is_deterministic() {
        let source = r#"<ul><For each={items} as="it"><li>{it}</li></For></ul>"#;
        let a = parse(source);
        let b = parse(source);
        assert_eq!(a.document, b.document);
    }

    // =========================================================================
    // Recovery
    // =========================================================================

    #[test]
    fn test_mismatched_close_strict_fails() {
        let result = parse_strict("<div><span></div>");
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(err.message.contains("Mismatched closing tag"));
    }

    #[test]
    fn test_mismatched_close_recovers_with_error() {
        let out = parse("<div><span></div>");
        assert!(!out.errors.is_empty());
        // The div survives with the span auto-closed inside it.
        let el = first_element(&out);
        assert_eq!(el.tag, "div");
        assert_eq!(el.children.len(), 1);
    }

    #[test]
    fn test_stray_close_skipped_when_real_close_is_near() {
        let out = parse("<div></p>text</div>");
        assert_eq!(out.warnings.len(), 1);
        let el = first_element(&out);
        assert!(matches!(&el.children[0], Node::Text(t) if t == "text"));
    }

    #[test]
    fn test_multiple_diagnostics_in_one_pass() {
        let out = parse("<div><span></div><p><em></p>");
        assert!(out.errors.len() >= 2);
    }

    #[test]
    fn test_unclosed_tag_reports_position() {
        let out = parse("<div><p>hi");
        assert!(out
            .errors
            .iter()
            .any(|e| e.message.contains("Unclosed <p>")));
    }

    #[test]
    fn test_void_element_with_children_is_error() {
        let out = parse("<img>stray</img>");
        assert!(out
            .errors
            .iter()
            .any(|e| e.message.contains("cannot have children")));
    }

    #[test]
    fn test_void_element_self_close_ok() {
        let out = parse(r#"<img src="a.png" />"#);
        assert!(out.errors.is_empty());
    }

    // =========================================================================
    // If chains
    // =========================================================================

    #[test]
    fn test_if_without_else() {
        let out = parse("<If condition={ok}>yes</If>");
        match &out.document.children[0] {
            Node::If(node) => {
                assert_eq!(node.branches.len(), 1);
                assert_eq!(node.branches[0].condition.as_deref(), Some("ok"));
            }
            other => panic!("Expected If, got {other:?}"),
        }
    }

    #[test]
    fn test_if_else_nested_form() {
        let out = parse("<If condition={ok}>yes<Else>no</Else></If>");
        match &out.document.children[0] {
            Node::If(node) => {
                assert_eq!(node.branches.len(), 2);
                assert!(node.branches[1].condition.is_none());
                assert!(matches!(&node.branches[1].children[0], Node::Text(t) if t == "no"));
            }
            other => panic!("Expected If, got {other:?}"),
        }
    }

    #[test]
    fn test_if_elseif_else_sibling_form() {
        let out = parse(
            "<If condition={a}>A</If><ElseIf condition={b}>B</ElseIf><Else>C</Else>",
        );
        assert_eq!(out.document.children.len(), 1);
        match &out.document.children[0] {
            Node::If(node) => {
                assert_eq!(node.branches.len(), 3);
                assert_eq!(node.branches[0].condition.as_deref(), Some("a"));
                assert_eq!(node.branches[1].condition.as_deref(), Some("b"));
                assert!(node.branches[2].condition.is_none());
            }
            other => panic!("Expected If, got {other:?}"),
        }
    }

    #[test]
    fn test_if_chain_fully_nested_form() {
        let out = parse(
            "<If condition={a}>A<ElseIf condition={b}>B<Else>C</Else></ElseIf></If>",
        );
        match &out.document.children[0] {
            Node::If(node) => {
                assert_eq!(node.branches.len(), 3);
                assert!(matches!(&node.branches[2].children[0], Node::Text(t) if t == "C"));
            }
            other => panic!("Expected If, got {other:?}"),
        }
        assert!(out.errors.is_empty());
    }

    #[test]
    fn test_if_missing_condition_is_error() {
        let out = parse("<If>body</If>");
        assert!(out
            .errors
            .iter()
            .any(|e| e.message.contains("requires a 'condition'")));
    }

    #[test]
    fn test_else_without_if_is_error() {
        let out = parse("<Else>orphan</Else>");
        assert!(out
            .errors
            .iter()
            .any(|e| e.message.contains("without a preceding <If>")));
        assert!(out.document.children.is_empty());
    }

    // =========================================================================
    // For
    // =========================================================================

    #[test]
    fn test_for_defaults() {
        let out = parse("<For each={items}>{item}</For>");
        match &out.document.children[0] {
            Node::For(node) => {
                assert_eq!(node.iterable, "items");
                assert_eq!(node.item_name, "item");
                assert_eq!(node.index_name, "index");
            }
            other => panic!("Expected For, got {other:?}"),
        }
    }

    #[test]
    fn test_for_custom_names() {
        let out = parse(r#"<For each={rows} as="row" index="i">{row}</For>"#);
        match &out.document.children[0] {
            Node::For(node) => {
                assert_eq!(node.item_name, "row");
                assert_eq!(node.index_name, "i");
            }
            other => panic!("Expected For, got {other:?}"),
        }
    }

    #[test]
    fn test_for_items_alias() {
        let out = parse("<For items={rows}>x</For>");
        assert!(out.errors.is_empty());
    }

    #[test]
    fn test_for_missing_each_is_error() {
        let out = parse("<For>x</For>");
        assert!(out
            .errors
            .iter()
            .any(|e| e.message.contains("requires an 'each'")));
    }

    // =========================================================================
    // Switch
    // =========================================================================

    #[test]
    fn test_switch_cases_and_default() {
        let out = parse(
            r#"<Switch value={kind}>
                <Case value={"a"}>A</Case>
                <Case value={"b"}>B</Case>
                <Default>other</Default>
            </Switch>"#,
        );
        match &out.document.children[0] {
            Node::Switch(node) => {
                assert_eq!(node.value, "kind");
                assert_eq!(node.cases.len(), 2);
                assert!(node.default.is_some());
            }
            other => panic!("Expected Switch, got {other:?}"),
        }
        assert!(out.errors.is_empty());
    }

    #[test]
    fn test_switch_duplicate_default_is_error() {
        let out = parse(
            "<Switch value={k}><Default>a</Default><Default>b</Default></Switch>",
        );
        assert!(out
            .errors
            .iter()
            .any(|e| e.message.contains("at most one <Default>")));
    }

    #[test]
    fn test_case_outside_switch_is_error() {
        let out = parse("<Case value={x}>a</Case>");
        assert!(out
            .errors
            .iter()
            .any(|e| e.message.contains("inside <Switch>")));
    }

    #[test]
    fn test_switch_rejects_loose_content() {
        let out = parse("<Switch value={k}>loose<Case value={1}>a</Case></Switch>");
        assert!(out
            .errors
            .iter()
            .any(|e| e.message.contains("Only <Case> and <Default>")));
    }

    // =========================================================================
    // Slot
    // =========================================================================

    #[test]
    fn test_slot_with_fallback() {
        let out = parse(r#"<Slot name="header">default header</Slot>"#);
        match &out.document.children[0] {
            Node::Slot(node) => {
                assert_eq!(node.name, "header");
                assert_eq!(node.fallback.len(), 1);
            }
            other => panic!("Expected Slot, got {other:?}"),
        }
    }

    #[test]
    fn test_slot_default_name() {
        let out = parse("<Slot>fallback</Slot>");
        match &out.document.children[0] {
            Node::Slot(node) => assert_eq!(node.name, "default"),
            other => panic!("Expected Slot, got {other:?}"),
        }
    }

    // =========================================================================
    // Components
    // =========================================================================

    #[test]
    fn test_component_with_props() {
        let out = parse(r#"<Card title="Hi" count={n} />"#);
        match &out.document.children[0] {
            Node::Component(c) => {
                assert_eq!(c.name, "Card");
                assert_eq!(c.props.len(), 2);
                assert!(c.children.is_empty());
            }
            other => panic!("Expected Component, got {other:?}"),
        }
    }

    #[test]
    fn test_component_prop_object_literal() {
        let out = parse(r#"<Card data={ {title: "x", n: 3} } />"#);
        assert!(out.errors.is_empty());
    }

    #[test]
    fn test_component_invalid_prop_object_is_error() {
        let out = parse(r#"<Card data={ {n: 1 + 2} } />"#);
        assert!(out
            .errors
            .iter()
            .any(|e| e.message.contains("Invalid object literal")));
    }

    #[test]
    fn test_static_component_cycle_is_fatal() {
        let mut sources = HashMap::new();
        sources.insert("A".to_string(), "<div><B /></div>".to_string());
        sources.insert("B".to_string(), "<span><A /></span>".to_string());

        let tokens = Scanner::tokenize("<A />").unwrap();
        let result = Parser::new(tokens).with_component_sources(sources).parse();
        let err = result.unwrap_err();
        assert!(err.message.contains("Circular component reference"));
    }

    #[test]
    fn test_self_reference_is_fatal() {
        let mut sources = HashMap::new();
        sources.insert("Recur".to_string(), "<Recur />".to_string());

        let tokens = Scanner::tokenize("<Recur />").unwrap();
        let result = Parser::new(tokens).with_component_sources(sources).parse();
        assert!(result.is_err());
    }

    #[test]
    fn test_acyclic_components_pass() {
        let mut sources = HashMap::new();
        sources.insert("A".to_string(), "<div><B /></div>".to_string());
        sources.insert("B".to_string(), "<span>leaf</span>".to_string());

        let tokens = Scanner::tokenize("<A /><B />").unwrap();
        let result = Parser::new(tokens).with_component_sources(sources).parse();
        assert!(result.is_ok());
    }
}
