//! Client renderer: render tree + props → in-memory DOM.
//!
//! Structurally mirrors the server walk but emits mutable DOM handles,
//! binds event listeners, and records bindings for the update path. The
//! binding ledger follows the same text/attribute/subtree partition the
//! compiler pipeline uses on the server side:
//!
//! - interpolations and dynamic attributes in plain markup are patched in
//!   place on `update`;
//! - `If`/`For`/`Switch` and component subtrees re-render fully on `update`
//!   (a stated limitation: there is no incremental list diffing).

use crate::dom::{self, DomHandle, DomNode};
use crate::events::{Event, Handler, Listener};
use fml_compiler::tree::{
    AttrBinding, CompiledTemplate, ComponentNode, ElementNode, RenderNode,
};
use fml_lexer::token::event_name;
use fml_parser::expr::{compile, CompiledExpr};
use fml_render::context::Context;
use fml_render::eval::{resolve, strict_eq};
use fml_render::value::Value;
use fml_render::RenderError;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use tracing::{debug, warn};

/// Client renderer configuration, including the named handler registry that
/// event expressions resolve against.
#[derive(Clone, Default)]
pub struct ClientOptions {
    pub debug: bool,
    handlers: HashMap<String, Handler>,
}

impl ClientOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a named event handler. Event expressions look handlers up by
    /// their raw source (`onClick={save}` finds the handler named `save`).
    pub fn on<F: FnMut(&Event) + 'static>(mut self, name: &str, f: F) -> Self {
        self.handlers.insert(name.to_string(), Rc::new(RefCell::new(f)));
        self
    }

    pub(crate) fn handler(&self, key: &str) -> Option<Handler> {
        self.handlers.get(key).cloned()
    }
}

/// Find the user handler an event expression refers to: by raw source first,
/// then by the dotted path of a property or zero-arg method call.
pub(crate) fn resolve_handler(options: &ClientOptions, raw: &str) -> Option<Handler> {
    let trimmed = raw.trim();
    if let Some(handler) = options.handler(trimmed) {
        return Some(handler);
    }
    match compile(trimmed) {
        CompiledExpr::Property(path) | CompiledExpr::MethodCall { path } => {
            options.handler(&path.join("."))
        }
        _ => None,
    }
}

/// A live binding between a DOM location and a compiled expression.
enum Binding<'t> {
    /// An interpolated text node, patched in place.
    Text {
        node: DomHandle,
        expr: &'t CompiledExpr,
    },
    /// A dynamic attribute, re-applied with the server's attribute rules.
    Attribute {
        element: DomHandle,
        name: String,
        expr: &'t CompiledExpr,
    },
    /// A directive or component subtree, anchored by an empty text node and
    /// rebuilt wholesale on update.
    Subtree {
        parent: DomHandle,
        anchor: DomHandle,
        current: Vec<DomHandle>,
        node: &'t RenderNode,
    },
}

/// A mounted template: the DOM fragment plus `update`/`destroy` handles.
pub struct Mounted<'t> {
    root: DomHandle,
    bindings: Vec<Binding<'t>>,
    template: &'t CompiledTemplate,
    options: ClientOptions,
}

impl std::fmt::Debug for Mounted<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mounted")
            .field("bindings", &self.bindings.len())
            .finish_non_exhaustive()
    }
}

/// Depth-first DOM-building renderer over a compiled template.
pub struct ClientRenderer<'t> {
    template: &'t CompiledTemplate,
    options: ClientOptions,
}

impl<'t> ClientRenderer<'t> {
    pub fn new(template: &'t CompiledTemplate) -> Self {
        Self {
            template,
            options: ClientOptions::default(),
        }
    }

    pub fn with_options(template: &'t CompiledTemplate, options: ClientOptions) -> Self {
        Self { template, options }
    }

    /// Render into a fresh DOM fragment.
    pub fn render(&self, props: serde_json::Value) -> Result<Mounted<'t>, RenderError> {
        debug!("client render start");
        let mut ctx = Context::new(Value::from_json(props))?;
        let root = dom::fragment();
        let mut walker = Walker {
            template: self.template,
            options: &self.options,
            bindings: Vec::new(),
            track: true,
            component_stack: Vec::new(),
            slots: Vec::new(),
        };
        walker.build_children(&self.template.root, &mut ctx, &root)?;
        Ok(Mounted {
            root,
            bindings: walker.bindings,
            template: self.template,
            options: self.options.clone(),
        })
    }
}

impl<'t> Mounted<'t> {
    pub fn root(&self) -> &DomHandle {
        &self.root
    }

    /// Serialize the mounted fragment; matches the server renderer's output
    /// for the same template and props.
    pub fn to_html(&self) -> String {
        dom::to_html(&self.root)
    }

    /// Dispatch an event through the mounted tree.
    pub fn dispatch(&self, event: &Event) -> usize {
        dom::dispatch(&self.root, event)
    }

    /// Re-resolve tracked expressions against new props, patching text and
    /// attribute nodes directly and re-rendering directive/component
    /// subtrees in full.
    pub fn update(&mut self, new_props: serde_json::Value) -> Result<(), RenderError> {
        let mut ctx = Context::new(Value::from_json(new_props))?;

        for binding in &mut self.bindings {
            match binding {
                Binding::Text { node, expr } => {
                    let content = resolve(expr, &ctx).display().unwrap_or_default();
                    if let DomNode::Text(text) = &mut *node.borrow_mut() {
                        *text = content;
                    }
                }
                Binding::Attribute {
                    element,
                    name,
                    expr,
                } => {
                    let value = resolve(expr, &ctx);
                    if let DomNode::Element(el) = &mut *element.borrow_mut() {
                        apply_dynamic_attr(el, name, value);
                    }
                }
                Binding::Subtree {
                    parent,
                    anchor,
                    current,
                    node,
                } => {
                    let mut walker = Walker {
                        template: self.template,
                        options: &self.options,
                        bindings: Vec::new(),
                        track: false,
                        component_stack: Vec::new(),
                        slots: Vec::new(),
                    };
                    let fresh = match walker.build_node(*node, &mut ctx) {
                        Ok(handles) => handles,
                        Err(err) if err.is_fatal() => return Err(err),
                        Err(err) => {
                            warn!(error = %err, "subtree re-render failed; leaving it empty");
                            Vec::new()
                        }
                    };

                    for old in current.iter() {
                        dom::clear_listeners_deep(old);
                    }
                    if let DomNode::Element(el) = &mut *parent.borrow_mut() {
                        el.children
                            .retain(|c| !current.iter().any(|o| Rc::ptr_eq(c, o)));
                        let at = el
                            .children
                            .iter()
                            .position(|c| Rc::ptr_eq(c, anchor))
                            .map(|i| i + 1)
                            .unwrap_or(el.children.len());
                        for (offset, handle) in fresh.iter().enumerate() {
                            el.children.insert(at + offset, handle.clone());
                        }
                    }
                    *current = fresh;
                }
            }
        }
        Ok(())
    }

    /// Detach every listener and drop the tree.
    pub fn destroy(&mut self) {
        dom::clear_listeners_deep(&self.root);
        if let DomNode::Element(el) = &mut *self.root.borrow_mut() {
            el.children.clear();
        }
        self.bindings.clear();
    }
}

/// Apply the shared dynamic-attribute rules to a DOM element: omit for
/// `undefined`/`null`/`false`, bare for `true`, quoted text otherwise.
fn apply_dynamic_attr(el: &mut crate::dom::DomElement, name: &str, value: Value) {
    match value {
        Value::Undefined | Value::Null | Value::Bool(false) => el.remove_attribute(name),
        Value::Bool(true) => el.set_attribute(name, None),
        other => match other.display() {
            Some(text) => el.set_attribute(name, Some(text)),
            None => {
                warn!(attribute = %name, "removing attribute with non-displayable value");
                el.remove_attribute(name);
            }
        },
    }
}

struct Walker<'t, 'o> {
    template: &'t CompiledTemplate,
    options: &'o ClientOptions,
    bindings: Vec<Binding<'t>>,
    /// Bindings are only recorded in plain markup reachable from the root;
    /// anything inside a directive or component subtree is covered by that
    /// subtree's own binding.
    track: bool,
    component_stack: Vec<String>,
    slots: Vec<HashMap<String, Vec<DomHandle>>>,
}

fn is_subtree_node(node: &RenderNode) -> bool {
    matches!(
        node,
        RenderNode::If(_) | RenderNode::For(_) | RenderNode::Switch(_) | RenderNode::Component(_)
    )
}

fn push_child(parent: &DomHandle, child: DomHandle) {
    if let DomNode::Element(el) = &mut *parent.borrow_mut() {
        el.children.push(child);
    }
}

impl<'t, 'o> Walker<'t, 'o> {
    /// Build nodes into a parent element, wrapping directive/component
    /// subtrees with anchors when binding tracking is on.
    fn build_children(
        &mut self,
        nodes: &'t [RenderNode],
        ctx: &mut Context,
        parent: &DomHandle,
    ) -> Result<(), RenderError> {
        for node in nodes {
            if self.track && is_subtree_node(node) {
                let anchor = dom::text("");
                push_child(parent, anchor.clone());

                self.track = false;
                let result = self.build_node(node, ctx);
                self.track = true;

                let handles = match result {
                    Ok(handles) => handles,
                    Err(err) if err.is_fatal() => return Err(err),
                    Err(err) => {
                        warn!(error = %err, "dropping subtree after render error");
                        Vec::new()
                    }
                };
                for handle in &handles {
                    push_child(parent, handle.clone());
                }
                self.bindings.push(Binding::Subtree {
                    parent: parent.clone(),
                    anchor,
                    current: handles,
                    node,
                });
            } else {
                match self.build_node(node, ctx) {
                    Ok(handles) => {
                        for handle in handles {
                            push_child(parent, handle);
                        }
                    }
                    Err(err) if err.is_fatal() => return Err(err),
                    Err(err) => {
                        warn!(error = %err, "dropping node after render error");
                    }
                }
            }
        }
        Ok(())
    }

    /// Build a flat list of handles with per-node recovery, for directive
    /// bodies and component expansion.
    fn build_list(
        &mut self,
        nodes: &'t [RenderNode],
        ctx: &mut Context,
    ) -> Result<Vec<DomHandle>, RenderError> {
        let mut out = Vec::new();
        for node in nodes {
            match self.build_node(node, ctx) {
                Ok(handles) => out.extend(handles),
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    warn!(error = %err, "dropping node after render error");
                }
            }
        }
        Ok(out)
    }

    fn build_node(
        &mut self,
        node: &'t RenderNode,
        ctx: &mut Context,
    ) -> Result<Vec<DomHandle>, RenderError> {
        match node {
            RenderNode::Text(content) => Ok(vec![dom::text(content.clone())]),
            RenderNode::Interpolation(interp) => {
                if interp.expr.is_unsafe() {
                    debug!(raw = %interp.raw, "skipping unsafe expression");
                    return Ok(Vec::new());
                }
                let value = resolve(&interp.expr, ctx);
                match value.display() {
                    Some(content) => {
                        let handle = dom::text(content);
                        if self.track {
                            self.bindings.push(Binding::Text {
                                node: handle.clone(),
                                expr: &interp.expr,
                            });
                        }
                        Ok(vec![handle])
                    }
                    None => Err(RenderError::Type {
                        message: format!("Cannot interpolate a {}", value.type_name()),
                    }),
                }
            }
            RenderNode::Element(el) => Ok(vec![self.build_element(el, ctx)?]),
            RenderNode::Component(component) => self.build_component(component, ctx),
            RenderNode::If(node) => {
                for (condition, children) in &node.branches {
                    let matched = match condition {
                        Some(expr) => resolve(expr, ctx).is_truthy(),
                        None => true,
                    };
                    if matched {
                        ctx.push_layer(HashMap::new());
                        let result = self.build_list(children, ctx);
                        ctx.pop_layer();
                        return result;
                    }
                }
                Ok(Vec::new())
            }
            RenderNode::For(node) => {
                let items = match resolve(&node.iterable, ctx) {
                    Value::Array(items) => items,
                    Value::Undefined | Value::Null => return Ok(Vec::new()),
                    other => {
                        return Err(RenderError::Type {
                            message: format!(
                                "<For> expects an array, got {}",
                                other.type_name()
                            ),
                        });
                    }
                };
                let mut out = Vec::new();
                for (index, item) in items.into_iter().enumerate() {
                    let mut layer = HashMap::new();
                    layer.insert(node.item_name.clone(), item);
                    layer.insert(node.index_name.clone(), Value::Number(index as f64));
                    ctx.push_layer(layer);
                    let result = self.build_list(&node.body, ctx);
                    ctx.pop_layer();
                    out.extend(result?);
                }
                Ok(out)
            }
            RenderNode::Switch(node) => {
                let value = resolve(&node.value, ctx);
                for (case_expr, body) in &node.cases {
                    if strict_eq(&resolve(case_expr, ctx), &value) {
                        ctx.push_layer(HashMap::new());
                        let result = self.build_list(body, ctx);
                        ctx.pop_layer();
                        return result;
                    }
                }
                if let Some(default) = &node.default {
                    ctx.push_layer(HashMap::new());
                    let result = self.build_list(default, ctx);
                    ctx.pop_layer();
                    return result;
                }
                Ok(Vec::new())
            }
            RenderNode::Slot(slot) => {
                let filled = self
                    .slots
                    .last()
                    .and_then(|frame| frame.get(&slot.name))
                    .cloned();
                match filled {
                    Some(handles) => Ok(handles),
                    None => self.build_list(&slot.fallback, ctx),
                }
            }
        }
    }

    fn build_element(
        &mut self,
        el: &'t ElementNode,
        ctx: &mut Context,
    ) -> Result<DomHandle, RenderError> {
        let handle = dom::element(el.tag.clone(), el.void);

        {
            let mut borrowed = handle.borrow_mut();
            let DomNode::Element(target) = &mut *borrowed else {
                unreachable!("element handle holds an element");
            };
            for attr in &el.attributes {
                match &attr.binding {
                    AttrBinding::Static(value) => {
                        target.set_attribute(&attr.name, Some(value.clone()));
                    }
                    AttrBinding::Bool => target.set_attribute(&attr.name, None),
                    AttrBinding::Dynamic(expr) => {
                        apply_dynamic_attr(target, &attr.name, resolve(expr, ctx));
                        if self.track {
                            self.bindings.push(Binding::Attribute {
                                element: handle.clone(),
                                name: attr.name.clone(),
                                expr,
                            });
                        }
                    }
                    AttrBinding::Event { raw, .. } => {
                        match resolve_handler(self.options, raw) {
                            Some(handler) => {
                                target.add_listener(Listener::new(
                                    event_name(&attr.name),
                                    handler,
                                ));
                            }
                            None => {
                                debug!(
                                    attribute = %attr.name,
                                    source = %raw,
                                    "no registered handler for event expression"
                                );
                            }
                        }
                    }
                }
            }
        }

        if !el.void {
            self.build_children(&el.children, ctx, &handle)?;
        }
        Ok(handle)
    }

    fn build_component(
        &mut self,
        component: &'t ComponentNode,
        ctx: &mut Context,
    ) -> Result<Vec<DomHandle>, RenderError> {
        if self.component_stack.iter().any(|n| n == &component.name) {
            let mut chain = self.component_stack.join(" -> ");
            chain.push_str(" -> ");
            chain.push_str(&component.name);
            return Err(RenderError::CircularComponent { chain });
        }

        let Some(body) = self.template.component(&component.name) else {
            return Err(RenderError::MalformedNode {
                message: format!("Component '{}' has no compiled body", component.name),
            });
        };

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

        // Slot content builds in the caller's scope.
        let mut slot_frame: HashMap<String, Vec<DomHandle>> = HashMap::new();
        for child in &component.children {
            let handles = match self.build_node(child, ctx) {
                Ok(handles) => handles,
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    warn!(error = %err, "dropping slot content after render error");
                    Vec::new()
                }
            };
            slot_frame
                .entry(slot_target(child).to_string())
                .or_default()
                .extend(handles);
        }

        let mut component_ctx = Context::new(Value::Object(bindings))?;
        self.component_stack.push(component.name.clone());
        self.slots.push(slot_frame);
        let result = self.build_list(body, &mut component_ctx);
        self.slots.pop();
        self.component_stack.pop();
        result
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

#[cfg(test)]
mod tests {
    use super::*;
    use fml_compiler::registry::ComponentRegistry;
    use fml_compiler::{compile as compile_tree, CompileOptions};
    use fml_parser::Parser;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn template(source: &str, registry: &ComponentRegistry) -> CompiledTemplate {
        let document = Parser::parse_source(source).unwrap().document;
        compile_tree(&document, registry, &CompileOptions::default())
            .unwrap()
            .0
    }

    #[test]
    fn test_render_builds_dom() {
        let registry = ComponentRegistry::new();
        let tree = template("<div class=\"app\"><p>Hello {name}!</p></div>", &registry);
        let mounted = ClientRenderer::new(&tree)
            .render(json!({"name": "Ann"}))
            .unwrap();
        assert_eq!(mounted.to_html(), "<div class=\"app\"><p>Hello Ann!</p></div>");
    }

    #[test]
    fn test_event_listener_binding_and_dispatch() {
        let registry = ComponentRegistry::new();
        let tree = template("<button onClick={save}>Go</button>", &registry);

        let count = Rc::new(RefCell::new(0));
        let seen = count.clone();
        let options = ClientOptions::new().on("save", move |_| *seen.borrow_mut() += 1);

        let mounted = ClientRenderer::with_options(&tree, options)
            .render(json!({}))
            .unwrap();
        let invoked = mounted.dispatch(&Event::new("click"));
        assert_eq!(invoked, 1);
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn test_panicking_handler_does_not_abort() {
        let registry = ComponentRegistry::new();
        let tree = template(
            "<button onClick={boom}>a</button><button onClick={tick}>b</button>",
            &registry,
        );

        let count = Rc::new(RefCell::new(0));
        let seen = count.clone();
        let options = ClientOptions::new()
            .on("boom", |_| panic!("handler exploded"))
            .on("tick", move |_| *seen.borrow_mut() += 1);

        let mounted = ClientRenderer::with_options(&tree, options)
            .render(json!({}))
            .unwrap();
        // Both listeners run; the panic in the first is contained.
        assert_eq!(mounted.dispatch(&Event::new("click")), 2);
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn test_update_patches_text_in_place() {
        let registry = ComponentRegistry::new();
        let tree = template("<p>{count}</p>", &registry);
        let mut mounted = ClientRenderer::new(&tree).render(json!({"count": 1})).unwrap();
        assert_eq!(mounted.to_html(), "<p>1</p>");

        mounted.update(json!({"count": 2})).unwrap();
        assert_eq!(mounted.to_html(), "<p>2</p>");
    }

    #[test]
    fn test_update_patches_attribute() {
        let registry = ComponentRegistry::new();
        let tree = template("<input value={v} disabled={d} />", &registry);
        let mut mounted = ClientRenderer::new(&tree)
            .render(json!({"v": "a", "d": false}))
            .unwrap();
        assert_eq!(mounted.to_html(), "<input value=\"a\" />");

        mounted.update(json!({"v": "b", "d": true})).unwrap();
        assert_eq!(mounted.to_html(), "<input value=\"b\" disabled />");
    }

    #[test]
    fn test_update_rerenders_for_subtree() {
        let registry = ComponentRegistry::new();
        let tree = template(
            r#"<ul><For each={items} as="it"><li>{it}</li></For></ul>"#,
            &registry,
        );
        let mut mounted = ClientRenderer::new(&tree)
            .render(json!({"items": ["a"]}))
            .unwrap();
        assert_eq!(mounted.to_html(), "<ul><li>a</li></ul>");

        mounted.update(json!({"items": ["x", "y"]})).unwrap();
        assert_eq!(mounted.to_html(), "<ul><li>x</li><li>y</li></ul>");

        mounted.update(json!({"items": []})).unwrap();
        assert_eq!(mounted.to_html(), "<ul></ul>");
    }

    #[test]
    fn test_update_rerenders_if_subtree() {
        let registry = ComponentRegistry::new();
        let tree = template("<If condition={on}>yes<Else>no</Else></If>", &registry);
        let mut mounted = ClientRenderer::new(&tree).render(json!({"on": true})).unwrap();
        assert_eq!(mounted.to_html(), "yes");

        mounted.update(json!({"on": false})).unwrap();
        assert_eq!(mounted.to_html(), "no");
    }

    #[test]
    fn test_destroy_clears_tree_and_listeners() {
        let registry = ComponentRegistry::new();
        let tree = template("<button onClick={go}>x</button>", &registry);
        let options = ClientOptions::new().on("go", |_| {});
        let mut mounted = ClientRenderer::with_options(&tree, options)
            .render(json!({}))
            .unwrap();

        mounted.destroy();
        assert_eq!(mounted.to_html(), "");
        assert_eq!(mounted.dispatch(&Event::new("click")), 0);
    }

    #[test]
    fn test_component_render_in_dom() {
        let mut registry = ComponentRegistry::new();
        registry.register("Badge", "<b>{label}</b>").unwrap();
        let tree = template("<Badge label={tag} />", &registry);
        let mounted = ClientRenderer::new(&tree)
            .render(json!({"tag": "new"}))
            .unwrap();
        assert_eq!(mounted.to_html(), "<b>new</b>");
    }

    #[test]
    fn test_circular_component_is_fatal() {
        let mut registry = ComponentRegistry::new();
        let doc_a = Parser::parse_source("<div><B /></div>").unwrap().document;
        let doc_b = Parser::parse_source("<span><A /></span>").unwrap().document;
        registry.register_document("A", doc_a);
        registry.register_document("B", doc_b);

        let tree = template("<A />", &registry);
        let err = ClientRenderer::new(&tree).render(json!({})).unwrap_err();
        assert!(matches!(err, RenderError::CircularComponent { .. }));
    }
}
