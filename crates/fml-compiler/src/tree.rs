//! The compiled render tree.
//!
//! Mirrors the AST shape, but every dynamic attribute, prop, condition, and
//! interpolation has been classified into a [`CompiledExpr`], and directive
//! nodes are pre-resolved to their render semantics. Both renderers consume
//! this form; it is immutable during rendering and safe to share between
//! concurrent render calls.

use fml_parser::expr::CompiledExpr;
use std::collections::HashMap;

/// The output of a compile pass: the lowered root plus every referenced
/// component body, keyed by component name.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledTemplate {
    pub root: Vec<RenderNode>,
    pub components: HashMap<String, Vec<RenderNode>>,
}

impl CompiledTemplate {
    /// Look up a compiled component body by name.
    pub fn component(&self, name: &str) -> Option<&[RenderNode]> {
        self.components.get(name).map(|nodes| nodes.as_slice())
    }
}

/// A node in the render tree.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderNode {
    Element(ElementNode),
    Component(ComponentNode),
    Text(String),
    Interpolation(InterpolationNode),
    If(IfRenderNode),
    For(ForRenderNode),
    Switch(SwitchRenderNode),
    Slot(SlotRenderNode),
}

/// An element with partitioned attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementNode {
    pub tag: String,
    pub attributes: Vec<RenderAttr>,
    pub children: Vec<RenderNode>,
    /// Cached void-element classification for the renderers.
    pub void: bool,
}

/// An attribute or prop in compiled form.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderAttr {
    pub name: String,
    pub binding: AttrBinding,
}

/// How an attribute or prop obtains its value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrBinding {
    /// Literal string, passed through untouched at compile time.
    Static(String),
    /// Resolved against the context on every render.
    Dynamic(CompiledExpr),
    /// Event handler: compiled for the client renderer, raw source kept for
    /// server-side hydration markers.
    Event { expr: CompiledExpr, raw: String },
    /// Bare attribute, boolean true.
    Bool,
}

/// A component reference. The body lives in [`CompiledTemplate::components`];
/// `children` is the caller-provided slot content.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentNode {
    pub name: String,
    pub props: Vec<RenderAttr>,
    pub children: Vec<RenderNode>,
}

/// A `{expr}` interpolation. The raw source is kept for debug diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct InterpolationNode {
    pub expr: CompiledExpr,
    pub raw: String,
}

/// An `If` chain: ordered branches, `None` condition for the trailing else.
#[derive(Debug, Clone, PartialEq)]
pub struct IfRenderNode {
    pub branches: Vec<(Option<CompiledExpr>, Vec<RenderNode>)>,
}

/// A `For` loop with compiled iterable and binding names.
#[derive(Debug, Clone, PartialEq)]
pub struct ForRenderNode {
    pub iterable: CompiledExpr,
    pub item_name: String,
    pub index_name: String,
    pub body: Vec<RenderNode>,
}

/// A `Switch` with compiled scrutinee and case values.
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchRenderNode {
    pub value: CompiledExpr,
    pub cases: Vec<(CompiledExpr, Vec<RenderNode>)>,
    pub default: Option<Vec<RenderNode>>,
}

/// A named slot with compiled fallback content.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotRenderNode {
    pub name: String,
    pub fallback: Vec<RenderNode>,
}
