//! Scope context for expression resolution.
//!
//! An ordered stack of name→value layers. The root layer holds the
//! caller-supplied props; each `For` iteration and each matched `If`/`Switch`
//! branch pushes a layer, popped on exit. Inner layers shadow outer ones for
//! the same name.

use crate::value::Value;
use crate::RenderError;
use std::collections::HashMap;

pub struct Context {
    root: HashMap<String, Value>,
    layers: Vec<HashMap<String, Value>>,
}

impl Context {
    /// Create a context whose root layer is the given props object.
    pub fn new(props: Value) -> Result<Self, RenderError> {
        let root = match props {
            Value::Object(obj) => obj,
            other => {
                return Err(RenderError::InvalidProps {
                    found: other.type_name(),
                });
            }
        };
        Ok(Self {
            root,
            layers: Vec::new(),
        })
    }

    /// Push a scope layer. Shadowing an outer name is allowed; the inner
    /// binding wins until the layer is popped.
    pub fn push_layer(&mut self, bindings: HashMap<String, Value>) {
        self.layers.push(bindings);
    }

    pub fn pop_layer(&mut self) {
        self.layers.pop();
    }

    /// Resolve a name, innermost layer first, falling back to the root.
    pub fn lookup(&self, name: &str) -> Option<&Value> {
        for layer in self.layers.iter().rev() {
            if let Some(value) = layer.get(name) {
                return Some(value);
            }
        }
        self.root.get(name)
    }

    pub fn depth(&self) -> usize {
        self.layers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context_with(name: &str, value: Value) -> Context {
        let mut root = HashMap::new();
        root.insert(name.to_string(), value);
        Context::new(Value::Object(root)).unwrap()
    }

    #[test]
    fn test_root_lookup() {
        let ctx = context_with("name", Value::String("Ann".into()));
        assert_eq!(ctx.lookup("name"), Some(&Value::String("Ann".into())));
        assert_eq!(ctx.lookup("missing"), None);
    }

    #[test]
    fn test_layer_shadows_root() {
        let mut ctx = context_with("item", Value::Number(1.0));
        let mut layer = HashMap::new();
        layer.insert("item".to_string(), Value::Number(2.0));
        ctx.push_layer(layer);

        assert_eq!(ctx.lookup("item"), Some(&Value::Number(2.0)));
        ctx.pop_layer();
        assert_eq!(ctx.lookup("item"), Some(&Value::Number(1.0)));
    }

    #[test]
    fn test_inner_layer_shadows_outer_layer() {
        let mut ctx = context_with("x", Value::Number(0.0));
        let mut outer = HashMap::new();
        outer.insert("x".to_string(), Value::Number(1.0));
        ctx.push_layer(outer);
        let mut inner = HashMap::new();
        inner.insert("x".to_string(), Value::Number(2.0));
        ctx.push_layer(inner);

        assert_eq!(ctx.lookup("x"), Some(&Value::Number(2.0)));
        ctx.pop_layer();
        assert_eq!(ctx.lookup("x"), Some(&Value::Number(1.0)));
    }

    #[test]
    fn test_non_object_props_rejected() {
        let result = Context::new(Value::String("nope".into()));
        assert!(matches!(result, Err(RenderError::InvalidProps { .. })));
    }
}
