//! Abstract Syntax Tree for FML.
//!
//! Document-level nodes (elements, components, directives) keep the raw
//! expression source for dynamic parts; expression classification into
//! [`crate::expr::CompiledExpr`] happens in the compiler, except for
//! prop-object literals which the parser validates eagerly.

use fml_lexer::Span;

/// A complete FML document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub children: Vec<Node>,
}

/// A node in the document tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// An HTML element with attributes and children.
    Element(Element),

    /// A component invocation by PascalCase name.
    Component(Component),

    /// Raw text content.
    Text(String),

    /// A `{expr}` interpolation in text position.
    Interpolation(Interpolation),

    /// An `If`/`ElseIf`/`Else` chain, assembled into one ordered branch list
    /// at parse time.
    If(IfNode),

    /// A `For` loop over an iterable expression.
    For(ForNode),

    /// A `Switch` with `Case` arms and an optional `Default`.
    Switch(SwitchNode),

    /// A named `Slot` with fallback content.
    Slot(SlotNode),
}

/// An HTML element.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub tag: String,
    pub attributes: Vec<Attribute>,
    pub children: Vec<Node>,
    pub span: Span,
}

/// A component invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    pub name: String,
    pub props: Vec<Attribute>,
    pub children: Vec<Node>,
    pub span: Span,
}

/// A `{expr}` interpolation in text position.
#[derive(Debug, Clone, PartialEq)]
pub struct Interpolation {
    pub expression: String,
    pub span: Span,
}

/// An attribute or prop.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub value: AttrValue,
}

/// The value of an attribute or prop.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    /// `name="value"` — literal string.
    Static(String),
    /// `name={expr}` — raw expression source.
    Dynamic(String),
    /// `onEvent={expr}` — raw event-handler source.
    Event(String),
    /// Bare `name` — boolean true.
    Bool,
}

/// One branch of an `If` chain. A `None` condition is the trailing `Else`.
#[derive(Debug, Clone, PartialEq)]
pub struct IfBranch {
    pub condition: Option<String>,
    pub children: Vec<Node>,
}

/// An `If` chain: ordered branches, first true condition wins.
#[derive(Debug, Clone, PartialEq)]
pub struct IfNode {
    pub branches: Vec<IfBranch>,
    pub span: Span,
}

/// A `For` loop.
#[derive(Debug, Clone, PartialEq)]
pub struct ForNode {
    pub iterable: String,
    pub item_name: String,
    pub index_name: String,
    pub body: Vec<Node>,
    pub span: Span,
}

/// A `Switch` node.
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchNode {
    pub value: String,
    pub cases: Vec<CaseNode>,
    pub default: Option<Vec<Node>>,
    pub span: Span,
}

/// One `Case` arm of a `Switch`.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseNode {
    pub value: String,
    pub body: Vec<Node>,
}

/// A named `Slot` with fallback content.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotNode {
    pub name: String,
    pub fallback: Vec<Node>,
    pub span: Span,
}
