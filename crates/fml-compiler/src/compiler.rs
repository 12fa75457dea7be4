//! AST → render tree lowering.
//!
//! Partitions attributes and props into static/dynamic bindings, runs every
//! dynamic source through the expression compiler, intercepts directive-named
//! components before any registry lookup, and resolves component references
//! through the injected [`ComponentRegistry`].

use crate::registry::ComponentRegistry;
use crate::tree::{
    AttrBinding, CompiledTemplate, ComponentNode, ElementNode, ForRenderNode, IfRenderNode,
    InterpolationNode, RenderAttr, RenderNode, SlotRenderNode, SwitchRenderNode,
};
use crate::{CompileError, Diagnostic, Severity};
use fml_lexer::token::{is_directive, is_void_element};
use fml_parser::ast::{AttrValue, Attribute, Component, Document, Node};
use fml_parser::expr::{self, CompiledExpr};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Compiler configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompileOptions {
    /// Unknown components become fatal instead of placeholders.
    pub strict: bool,
    /// Emit extra diagnostics.
    pub debug: bool,
}

/// Known HTML5 tag names; unknown tags produce an advisory warning, never a
/// fatal error.
const HTML5_TAGS: &[&str] = &[
    "a", "abbr", "address", "area", "article", "aside", "audio", "b", "base", "bdi", "bdo",
    "blockquote", "body", "br", "button", "canvas", "caption", "cite", "code", "col", "colgroup",
    "data", "datalist", "dd", "del", "details", "dfn", "dialog", "div", "dl", "dt", "em", "embed",
    "fieldset", "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6",
    "head", "header", "hgroup", "hr", "html", "i", "iframe", "img", "input", "ins", "kbd",
    "label", "legend", "li", "link", "main", "map", "mark", "menu", "meta", "meter", "nav",
    "noscript", "object", "ol", "optgroup", "option", "output", "p", "param", "picture", "pre",
    "progress", "q", "rp", "rt", "ruby", "s", "samp", "script", "section", "select", "slot",
    "small", "source", "span", "strong", "style", "sub", "summary", "sup", "table", "tbody",
    "td", "template", "textarea", "tfoot", "th", "thead", "time", "title", "tr", "track", "u",
    "ul", "var", "video", "wbr",
];

/// Compile a parsed document against a component registry.
///
/// Returns the immutable render tree plus accumulated diagnostics. The only
/// fatal condition is an unregistered component in strict mode.
pub fn compile(
    document: &Document,
    registry: &ComponentRegistry,
    options: &CompileOptions,
) -> Result<(CompiledTemplate, Vec<Diagnostic>), CompileError> {
    debug!(components = registry.names().count(), "compiling template");

    let mut compiler = Compiler {
        registry,
        options,
        diagnostics: Vec::new(),
        components: HashMap::new(),
        in_progress: HashSet::new(),
    };

    let root = compiler.lower_nodes(&document.children)?;

    Ok((
        CompiledTemplate {
            root,
            components: compiler.components,
        },
        compiler.diagnostics,
    ))
}

struct Compiler<'a> {
    registry: &'a ComponentRegistry,
    options: &'a CompileOptions,
    diagnostics: Vec<Diagnostic>,
    components: HashMap<String, Vec<RenderNode>>,
    /// Components currently being lowered; a re-entrant reference is left as
    /// a by-name node so render-time cycle detection can catch real cycles.
    in_progress: HashSet<String>,
}

impl Compiler<'_> {
    fn lower_nodes(&mut self, nodes: &[Node]) -> Result<Vec<RenderNode>, CompileError> {
        let mut lowered = Vec::with_capacity(nodes.len());
        for node in nodes {
            lowered.push(self.lower_node(node)?);
        }
        Ok(lowered)
    }

    fn lower_node(&mut self, node: &Node) -> Result<RenderNode, CompileError> {
        match node {
            Node::Text(content) => Ok(RenderNode::Text(content.clone())),
            Node::Interpolation(interp) => Ok(RenderNode::Interpolation(InterpolationNode {
                expr: self.compile_expr(&interp.expression),
                raw: interp.expression.clone(),
            })),
            Node::Element(el) => {
                if !HTML5_TAGS.contains(&el.tag.as_str()) {
                    self.warn(format!("Unknown HTML tag <{}>", el.tag));
                }
                Ok(RenderNode::Element(ElementNode {
                    tag: el.tag.clone(),
                    attributes: self.lower_attrs(&el.attributes),
                    children: self.lower_nodes(&el.children)?,
                    void: is_void_element(&el.tag),
                }))
            }
            Node::Component(component) => self.lower_component(component),
            Node::If(node) => {
                let mut branches = Vec::with_capacity(node.branches.len());
                for branch in &node.branches {
                    let condition = branch
                        .condition
                        .as_ref()
                        .map(|src| self.compile_expr(src));
                    branches.push((condition, self.lower_nodes(&branch.children)?));
                }
                Ok(RenderNode::If(IfRenderNode { branches }))
            }
            Node::For(node) => Ok(RenderNode::For(ForRenderNode {
                iterable: self.compile_expr(&node.iterable),
                item_name: node.item_name.clone(),
                index_name: node.index_name.clone(),
                body: self.lower_nodes(&node.body)?,
            })),
            Node::Switch(node) => {
                let mut cases = Vec::with_capacity(node.cases.len());
                for case in &node.cases {
                    cases.push((self.compile_expr(&case.value), self.lower_nodes(&case.body)?));
                }
                let default = match &node.default {
                    Some(body) => Some(self.lower_nodes(body)?),
                    None => None,
                };
                Ok(RenderNode::Switch(SwitchRenderNode {
                    value: self.compile_expr(&node.value),
                    cases,
                    default,
                }))
            }
            Node::Slot(node) => Ok(RenderNode::Slot(SlotRenderNode {
                name: node.name.clone(),
                fallback: self.lower_nodes(&node.fallback)?,
            })),
        }
    }

    /// Lower a component reference. Directive names are intercepted before
    /// the registry lookup, so user components can never shadow them.
    fn lower_component(&mut self, component: &Component) -> Result<RenderNode, CompileError> {
        if is_directive(&component.name) {
            return self.lower_directive_component(component);
        }

        if !self.registry.contains(&component.name) {
            if self.options.strict {
                return Err(CompileError {
                    message: format!("Unregistered component: {}", component.name),
                });
            }
            warn!(component = %component.name, "unknown component, emitting placeholder");
            self.warn(format!("Unknown component <{}>", component.name));
            return Ok(RenderNode::Text(format!(
                "[Missing Component: {}]",
                component.name
            )));
        }

        self.ensure_component_compiled(&component.name)?;

        Ok(RenderNode::Component(ComponentNode {
            name: component.name.clone(),
            props: self.lower_attrs(&component.props),
            children: self.lower_nodes(&component.children)?,
        }))
    }

    /// Lower the referenced component's body exactly once, memoized into the
    /// template's component map.
    fn ensure_component_compiled(&mut self, name: &str) -> Result<(), CompileError> {
        if self.components.contains_key(name) || self.in_progress.contains(name) {
            return Ok(());
        }
        let Some(document) = self.registry.get(name) else {
            return Ok(());
        };
        let document = document.clone();

        self.in_progress.insert(name.to_string());
        let body = self.lower_nodes(&document.children)?;
        self.in_progress.remove(name);
        self.components.insert(name.to_string(), body);
        Ok(())
    }

    /// A `Component` AST node carrying a directive name (built
    /// programmatically, since the lexer classifies source-level directives
    /// itself) lowers to the directive's render semantics.
    fn lower_directive_component(
        &mut self,
        component: &Component,
    ) -> Result<RenderNode, CompileError> {
        let children = self.lower_nodes(&component.children)?;
        match component.name.as_str() {
            "If" | "ElseIf" => {
                let condition = self.prop_expr(component, "condition");
                Ok(RenderNode::If(IfRenderNode {
                    branches: vec![(Some(condition), children)],
                }))
            }
            "Else" => Ok(RenderNode::If(IfRenderNode {
                branches: vec![(None, children)],
            })),
            "For" => {
                let iterable = self.prop_expr(component, "each");
                Ok(RenderNode::For(ForRenderNode {
                    iterable,
                    item_name: self.prop_static(component, "as", "item"),
                    index_name: self.prop_static(component, "index", "index"),
                    body: children,
                }))
            }
            "Switch" => Ok(RenderNode::Switch(SwitchRenderNode {
                value: self.prop_expr(component, "value"),
                cases: Vec::new(),
                default: Some(children),
            })),
            "Slot" => Ok(RenderNode::Slot(SlotRenderNode {
                name: self.prop_static(component, "name", "default"),
                fallback: children,
            })),
            other => {
                // Case/Default have no meaning outside a Switch body.
                self.warn(format!("Misplaced directive <{other}>"));
                Ok(RenderNode::Text(String::new()))
            }
        }
    }

    fn prop_expr(&mut self, component: &Component, name: &str) -> CompiledExpr {
        component
            .props
            .iter()
            .find(|p| p.name == name)
            .and_then(|p| match &p.value {
                AttrValue::Dynamic(src) | AttrValue::Static(src) => Some(self.compile_expr(src)),
                _ => None,
            })
            .unwrap_or(CompiledExpr::Unsafe(String::new()))
    }

    fn prop_static(&self, component: &Component, name: &str, default: &str) -> String {
        component
            .props
            .iter()
            .find(|p| p.name == name)
            .and_then(|p| match &p.value {
                AttrValue::Static(v) => Some(v.clone()),
                _ => None,
            })
            .unwrap_or_else(|| default.to_string())
    }

    fn lower_attrs(&mut self, attrs: &[Attribute]) -> Vec<RenderAttr> {
        attrs
            .iter()
            .map(|attr| RenderAttr {
                name: attr.name.clone(),
                binding: match &attr.value {
                    AttrValue::Static(value) => AttrBinding::Static(value.clone()),
                    AttrValue::Dynamic(src) => AttrBinding::Dynamic(self.compile_expr(src)),
                    AttrValue::Event(src) => AttrBinding::Event {
                        expr: self.compile_expr(src),
                        raw: src.clone(),
                    },
                    AttrValue::Bool => AttrBinding::Bool,
                },
            })
            .collect()
    }

    /// Classify an expression source, surfacing a diagnostic when it falls
    /// outside the whitelist. The classified node still flows through — an
    /// `Unsafe` expression resolves to nothing at render time, it is never
    /// executed.
    fn compile_expr(&mut self, source: &str) -> CompiledExpr {
        let compiled = expr::compile(source);
        if compiled.is_unsafe() && !source.trim().is_empty() {
            self.warn(format!(
                "Expression is outside the supported grammar and will not be evaluated: {source}"
            ));
        }
        compiled
    }

    fn warn(&mut self, message: String) {
        self.diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            message,
        });
    }
}
