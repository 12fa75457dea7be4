//! Server renderer: render tree + props → HTML string.
//!
//! A single-threaded, synchronous, depth-first walk. All text and
//! interpolation output passes through the escaping layer unconditionally.
//! Per-node failures drop the offending subtree (empty in production, an
//! inline escaped diagnostic comment in debug) and sibling rendering
//! continues; circular component references abort the whole render.
//!
//! An optional streaming mode flushes size-bounded chunks through an
//! `io::Write` as the same walk proceeds.

use crate::context::Context;
use crate::escape::{escape_attribute, escape_html};
use crate::eval::{resolve, strict_eq};
use crate::value::Value;
use crate::RenderError;
use fml_compiler::tree::{
    AttrBinding, CompiledTemplate, ComponentNode, ElementNode, RenderAttr, RenderNode,
};
use fml_lexer::token::event_name;
use std::collections::HashMap;
use std::io::Write;
use tracing::{debug, warn};

/// Server renderer configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServerOptions {
    /// Emit inline diagnostic comments for recovered errors.
    pub debug: bool,
    /// Serialize event handlers as `data-fml-on-<event>` markers so a client
    /// can hydrate the output.
    pub hydratable: bool,
    /// Show the raw source of unsafe expressions in debug diagnostics.
    /// The expression is still never evaluated.
    pub show_unsafe_source: bool,
}

/// Per-render-call mutable state. Each concurrent render call owns its own;
/// the compiled template itself is never written during a render.
struct RenderState {
    component_stack: Vec<String>,
    /// Pre-rendered slot HTML, one frame per component expansion.
    slots: Vec<HashMap<String, String>>,
}

/// Output accumulator. In streaming mode, completed chunks are flushed to the
/// writer between sibling nodes; an in-flight node never flushes, so error
/// recovery can always truncate back to the node's start.
struct Emitter<'w> {
    buf: String,
    chunk_size: usize,
    writer: Option<&'w mut dyn Write>,
}

impl<'w> Emitter<'w> {
    fn buffered() -> Self {
        Self {
            buf: String::new(),
            chunk_size: usize::MAX,
            writer: None,
        }
    }

    fn streaming(writer: &'w mut dyn Write, chunk_size: usize) -> Self {
        Self {
            buf: String::new(),
            chunk_size: chunk_size.max(1),
            writer: Some(writer),
        }
    }

    fn push_str(&mut self, s: &str) {
        self.buf.push_str(s);
    }

    fn mark(&self) -> usize {
        self.buf.len()
    }

    fn truncate(&mut self, mark: usize) {
        self.buf.truncate(mark);
    }

    fn maybe_flush(&mut self) -> Result<(), RenderError> {
        if let Some(writer) = self.writer.as_deref_mut() {
            if self.buf.len() >= self.chunk_size {
                writer.write_all(self.buf.as_bytes())?;
                self.buf.clear();
            }
        }
        Ok(())
    }

    fn finish(mut self) -> Result<String, RenderError> {
        if let Some(writer) = self.writer.as_deref_mut() {
            writer.write_all(self.buf.as_bytes())?;
            writer.flush()?;
            self.buf.clear();
        }
        Ok(self.buf)
    }
}

/// Depth-first, string-emitting renderer over a compiled template.
pub struct ServerRenderer<'t> {
    template: &'t CompiledTemplate,
    options: ServerOptions,
}

impl<'t> ServerRenderer<'t> {
    pub fn new(template: &'t CompiledTemplate) -> Self {
        Self {
            template,
            options: ServerOptions::default(),
        }
    }

    pub fn with_options(template: &'t CompiledTemplate, options: ServerOptions) -> Self {
        Self { template, options }
    }

    /// Render to a complete HTML string.
    pub fn render(&self, props: serde_json::Value) -> Result<String, RenderError> {
        debug!("server render start");
        let mut ctx = Context::new(Value::from_json(props))?;
        let mut state = RenderState {
            component_stack: Vec::new(),
            slots: Vec::new(),
        };
        let mut emitter = Emitter::buffered();
        self.render_nodes(&self.template.root, &mut ctx, &mut state, &mut emitter)?;
        emitter.finish()
    }

    /// Render through a writer, flushing size-bounded chunks as the walk
    /// proceeds. The walk itself stays synchronous and depth-first; only the
    /// flush cadence changes.
    pub fn render_to_writer(
        &self,
        props: serde_json::Value,
        chunk_size: usize,
        writer: &mut dyn Write,
    ) -> Result<(), RenderError> {
        debug!(chunk_size, "server streaming render start");
        let mut ctx = Context::new(Value::from_json(props))?;
        let mut state = RenderState {
            component_stack: Vec::new(),
            slots: Vec::new(),
        };
        let mut emitter = Emitter::streaming(writer, chunk_size);
        self.render_nodes(&self.template.root, &mut ctx, &mut state, &mut emitter)?;
        emitter.finish().map(|_| ())
    }

    fn render_nodes(
        &self,
        nodes: &[RenderNode],
        ctx: &mut Context,
        state: &mut RenderState,
        out: &mut Emitter<'_>,
    ) -> Result<(), RenderError> {
        for node in nodes {
            self.render_node(node, ctx, state, out)?;
            out.maybe_flush()?;
        }
        Ok(())
    }

    /// Render one node with per-node error recovery: the failing subtree is
    /// truncated away and replaced by nothing (or a marked diagnostic comment
    /// in debug); fatal errors propagate.
    fn render_node(
        &self,
        node: &RenderNode,
        ctx: &mut Context,
        state: &mut RenderState,
        out: &mut Emitter<'_>,
    ) -> Result<(), RenderError> {
        let mark = out.mark();
        match self.render_node_inner(node, ctx, state, out) {
            Ok(()) => Ok(()),
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => {
                warn!(error = %err, "dropping subtree after render error");
                out.truncate(mark);
                if self.options.debug {
                    out.push_str(&format!(
                        "<!-- fml:error {} -->",
                        escape_html(&err.to_string())
                    ));
                }
                Ok(())
            }
        }
    }

    fn render_node_inner(
        &self,
        node: &RenderNode,
        ctx: &mut Context,
        state: &mut RenderState,
        out: &mut Emitter<'_>,
    ) -> Result<(), RenderError> {
        match node {
            RenderNode::Text(text) => {
                out.push_str(&escape_html(text));
                Ok(())
            }
            RenderNode::Interpolation(interp) => {
                if interp.expr.is_unsafe() {
                    if self.options.debug {
                        if self.options.show_unsafe_source {
                            out.push_str(&format!(
                                "<!-- fml:unsafe-expression {} -->",
                                escape_html(&interp.raw)
                            ));
                        } else {
                            out.push_str("<!-- fml:unsafe-expression -->");
                        }
                    }
                    return Ok(());
                }
                let value = resolve(&interp.expr, ctx);
                match value.display() {
                    Some(text) => {
                        out.push_str(&escape_html(&text));
                        Ok(())
                    }
                    None => Err(RenderError::Type {
                        message: format!("Cannot interpolate a {}", value.type_name()),
                    }),
                }
            }
            RenderNode::Element(el) => self.render_element(el, ctx, state, out),
            RenderNode::Component(component) => {
                self.render_component(component, ctx, state, out)
            }
            RenderNode::If(node) => {
                for (condition, children) in &node.branches {
                    let matched = match condition {
                        Some(expr) => resolve(expr, ctx).is_truthy(),
                        None => true,
                    };
                    if matched {
                        ctx.push_layer(HashMap::new());
                        let result = self.render_nodes(children, ctx, state, out);
                        ctx.pop_layer();
                        return result;
                    }
                }
                Ok(())
            }
            RenderNode::For(node) => {
                let iterable = resolve(&node.iterable, ctx);
                let items = match iterable {
                    Value::Array(items) => items,
                    Value::Undefined | Value::Null => return Ok(()),
                    other => {
                        return Err(RenderError::Type {
                            message: format!(
                                "<For> expects an array, got {}",
                                other.type_name()
                            ),
                        });
                    }
                };
                for (index, item) in items.into_iter().enumerate() {
                    let mut layer = HashMap::new();
                    layer.insert(node.item_name.clone(), item);
                    layer.insert(node.index_name.clone(), Value::Number(index as f64));
                    ctx.push_layer(layer);
                    let result = self.render_nodes(&node.body, ctx, state, out);
                    ctx.pop_layer();
                    result?;
                }
                Ok(())
            }
            RenderNode::Switch(node) => {
                let value = resolve(&node.value, ctx);
                for (case_expr, body) in &node.cases {
                    if strict_eq(&resolve(case_expr, ctx), &value) {
                        ctx.push_layer(HashMap::new());
                        let result = self.render_nodes(body, ctx, state, out);
                        ctx.pop_layer();
                        return result;
                    }
                }
                if let Some(default) = &node.default {
                    ctx.push_layer(HashMap::new());
                    let result = self.render_nodes(default, ctx, state, out);
                    ctx.pop_layer();
                    return result;
                }
                Ok(())
            }
            RenderNode::Slot(slot) => {
                let filled = state
                    .slots
                    .last()
                    .and_then(|frame| frame.get(&slot.name))
                    .cloned();
                match filled {
                    // Slot content was pre-rendered in the caller's scope;
                    // it is already escaped.
                    Some(html) => {
                        out.push_str(&html);
                        Ok(())
                    }
                    None => self.render_nodes(&slot.fallback, ctx, state, out),
                }
            }
        }
    }

    fn render_element(
        &self,
        el: &ElementNode,
        ctx: &mut Context,
        state: &mut RenderState,
        out: &mut Emitter<'_>,
    ) -> Result<(), RenderError> {
        out.push_str("<");
        out.push_str(&el.tag);
        self.render_attrs(&el.attributes, ctx, out);

        if el.void {
            out.push_str(" />");
            return Ok(());
        }

        out.push_str(">");
        self.render_nodes(&el.children, ctx, state, out)?;
        out.push_str(&format!("</{}>", el.tag));
        Ok(())
    }

    fn render_attrs(&self, attrs: &[RenderAttr], ctx: &Context, out: &mut Emitter<'_>) {
        for attr in attrs {
            match &attr.binding {
                AttrBinding::Static(value) => {
                    out.push_str(&format!(" {}=\"{}\"", attr.name, escape_attribute(value)));
                }
                AttrBinding::Bool => {
                    out.push_str(&format!(" {}", attr.name));
                }
                AttrBinding::Dynamic(expr) => match resolve(expr, ctx) {
                    Value::Undefined | Value::Null | Value::Bool(false) => {}
                    Value::Bool(true) => out.push_str(&format!(" {}", attr.name)),
                    value => match value.display() {
                        Some(text) => out.push_str(&format!(
                            " {}=\"{}\"",
                            attr.name,
                            escape_attribute(&text)
                        )),
                        None => {
                            warn!(
                                attribute = %attr.name,
                                kind = value.type_name(),
                                "skipping attribute with non-displayable value"
                            );
                        }
                    },
                },
                AttrBinding::Event { raw, .. } => {
                    if self.options.hydratable {
                        out.push_str(&format!(
                            " data-fml-on-{}=\"{}\"",
                            event_name(&attr.name),
                            escape_attribute(raw)
                        ));
                    }
                }
            }
        }
    }

    fn render_component(
        &self,
        component: &ComponentNode,
        ctx: &mut Context,
        state: &mut RenderState,
        out: &mut Emitter<'_>,
    ) -> Result<(), RenderError> {
        if state.component_stack.iter().any(|n| n == &component.name) {
            let mut chain = state.component_stack.join(" -> ");
            chain.push_str(" -> ");
            chain.push_str(&component.name);
            return Err(RenderError::CircularComponent { chain });
        }

        let Some(body) = self.template.component(&component.name) else {
            return Err(RenderError::MalformedNode {
                message: format!("Component '{}' has no compiled body", component.name),
            });
        };

        // Props resolve in the caller's scope and become the component's
        // fresh root context.
        let mut bindings = HashMap::new();
        for prop in &component.props {
            let value = match &prop.binding {
                AttrBinding::Static(v) => Value::String(v.clone()),
                AttrBinding::Dynamic(expr) => resolve(expr, ctx),
                AttrBinding::Bool => Value::Bool(true),
                AttrBinding::Event { .. } => continue,
            };
            bindings.insert(prop.name.clone(), value);
        }

        // Slot content renders now, in the caller's scope.
        let slot_html = self.render_slot_content(&component.children, ctx, state)?;

        let mut component_ctx = Context::new(Value::Object(bindings))?;
        state.component_stack.push(component.name.clone());
        state.slots.push(slot_html);
        let result = self.render_nodes(body, &mut component_ctx, state, out);
        state.slots.pop();
        state.component_stack.pop();
        result
    }

    /// Partition a component's caller children by their `slot` attribute
    /// (default slot otherwise) and pre-render each group.
    fn render_slot_content(
        &self,
        children: &[RenderNode],
        ctx: &mut Context,
        state: &mut RenderState,
    ) -> Result<HashMap<String, String>, RenderError> {
        let mut groups: HashMap<String, String> = HashMap::new();
        if children.is_empty() {
            return Ok(groups);
        }
        for child in children {
            let slot_name = slot_target(child);
            let mut emitter = Emitter::buffered();
            self.render_node(child, ctx, state, &mut emitter)?;
            groups
                .entry(slot_name.to_string())
                .or_default()
                .push_str(&emitter.finish()?);
        }
        Ok(groups)
    }
}

/// The slot a caller-side child targets: its static `slot` attribute, or the
/// default slot.
fn slot_target(node: &RenderNode) -> &str {
    if let RenderNode::Element(el) = node {
        for attr in &el.attributes {
            if attr.name == "slot" {
                if let AttrBinding::Static(name) = &attr.binding {
                    return name;
                }
            }
        }
    }
    "default"
}
