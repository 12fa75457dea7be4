//! A small in-memory DOM.
//!
//! Nodes are shared, mutable handles (`Rc<RefCell<…>>`) so the update path
//! can patch text and attributes in place. Serialization back to HTML uses
//! the same escaping and attribute rules as the server renderer, which keeps
//! the two render paths byte-comparable.

use crate::events::{Event, Listener};
use fml_render::escape::{escape_attribute, escape_html};
use std::cell::RefCell;
use std::rc::Rc;

/// A shared, mutable handle to a DOM node.
pub type DomHandle = Rc<RefCell<DomNode>>;

/// Tag name used for the invisible root fragment.
pub const FRAGMENT_TAG: &str = "#fragment";

#[derive(Debug)]
pub enum DomNode {
    Element(DomElement),
    Text(String),
}

#[derive(Debug)]
pub struct DomElement {
    pub tag: String,
    pub void: bool,
    /// Insertion-ordered; a `None` value is a bare boolean attribute.
    attributes: Vec<(String, Option<String>)>,
    pub children: Vec<DomHandle>,
    listeners: Vec<Listener>,
}

impl DomElement {
    pub fn set_attribute(&mut self, name: &str, value: Option<String>) {
        if let Some(entry) = self.attributes.iter_mut().find(|(n, _)| n == name) {
            entry.1 = value;
        } else {
            self.attributes.push((name.to_string(), value));
        }
    }

    pub fn remove_attribute(&mut self, name: &str) {
        self.attributes.retain(|(n, _)| n != name);
    }

    pub fn attribute(&self, name: &str) -> Option<&Option<String>> {
        self.attributes.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn attributes(&self) -> &[(String, Option<String>)] {
        &self.attributes
    }

    pub fn add_listener(&mut self, listener: Listener) {
        self.listeners.push(listener);
    }

    pub fn clear_listeners(&mut self) {
        self.listeners.clear();
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    fn invoke_listeners(&self, event: &Event) -> usize {
        let mut invoked = 0;
        for listener in &self.listeners {
            if listener.event == event.name {
                listener.invoke(event);
                invoked += 1;
            }
        }
        invoked
    }
}

/// Create an element node.
pub fn element(tag: impl Into<String>, void: bool) -> DomHandle {
    Rc::new(RefCell::new(DomNode::Element(DomElement {
        tag: tag.into(),
        void,
        attributes: Vec::new(),
        children: Vec::new(),
        listeners: Vec::new(),
    })))
}

/// Create a text node.
pub fn text(content: impl Into<String>) -> DomHandle {
    Rc::new(RefCell::new(DomNode::Text(content.into())))
}

/// Create the invisible root fragment used as a mount container.
pub fn fragment() -> DomHandle {
    element(FRAGMENT_TAG, false)
}

/// Serialize a node subtree to HTML, matching the server renderer's output
/// rules: text escaped, attributes escaped and quoted, bare attributes
/// emitted without a value, void elements as `<tag attrs />`.
pub fn to_html(handle: &DomHandle) -> String {
    let mut out = String::new();
    write_html(handle, &mut out);
    out
}

fn write_html(handle: &DomHandle, out: &mut String) {
    match &*handle.borrow() {
        DomNode::Text(content) => out.push_str(&escape_html(content)),
        DomNode::Element(el) => {
            if el.tag == FRAGMENT_TAG {
                for child in &el.children {
                    write_html(child, out);
                }
                return;
            }
            out.push('<');
            out.push_str(&el.tag);
            for (name, value) in &el.attributes {
                match value {
                    Some(v) => out.push_str(&format!(" {name}=\"{}\"", escape_attribute(v))),
                    None => out.push_str(&format!(" {name}")),
                }
            }
            if el.void {
                out.push_str(" />");
                return;
            }
            out.push('>');
            for child in &el.children {
                write_html(child, out);
            }
            out.push_str(&format!("</{}>", el.tag));
        }
    }
}

/// Dispatch an event through a subtree, invoking every matching listener.
/// Returns the number of handlers invoked.
pub fn dispatch(handle: &DomHandle, event: &Event) -> usize {
    let mut invoked = 0;
    let children: Vec<DomHandle> = match &*handle.borrow() {
        DomNode::Element(el) => {
            invoked += el.invoke_listeners(event);
            el.children.clone()
        }
        DomNode::Text(_) => Vec::new(),
    };
    for child in &children {
        invoked += dispatch(child, event);
    }
    invoked
}

/// Recursively drop all listeners in a subtree.
pub fn clear_listeners_deep(handle: &DomHandle) {
    let children: Vec<DomHandle> = match &mut *handle.borrow_mut() {
        DomNode::Element(el) => {
            el.clear_listeners();
            el.children.clone()
        }
        DomNode::Text(_) => Vec::new(),
    };
    for child in &children {
        clear_listeners_deep(child);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Handler;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn handler<F: FnMut(&Event) + 'static>(f: F) -> Handler {
        Rc::new(RefCell::new(f))
    }

    #[test]
    fn test_build_and_serialize() {
        let root = element("div", false);
        if let DomNode::Element(el) = &mut *root.borrow_mut() {
            el.set_attribute("class", Some("app".into()));
            el.children.push(text("hi & bye"));
        }
        assert_eq!(to_html(&root), "<div class=\"app\">hi &amp; bye</div>");
    }

    #[test]
    fn test_bare_attribute_serialization() {
        let root = element("input", true);
        if let DomNode::Element(el) = &mut *root.borrow_mut() {
            el.set_attribute("disabled", None);
        }
        assert_eq!(to_html(&root), "<input disabled />");
    }

    #[test]
    fn test_fragment_is_invisible() {
        let root = fragment();
        if let DomNode::Element(el) = &mut *root.borrow_mut() {
            el.children.push(text("a"));
            el.children.push(element("br", true));
        }
        assert_eq!(to_html(&root), "a<br />");
    }

    #[test]
    fn test_set_attribute_replaces() {
        let root = element("p", false);
        if let DomNode::Element(el) = &mut *root.borrow_mut() {
            el.set_attribute("id", Some("a".into()));
            el.set_attribute("id", Some("b".into()));
            assert_eq!(el.attributes().len(), 1);
        }
        assert_eq!(to_html(&root), "<p id=\"b\"></p>");
    }

    #[test]
    fn test_dispatch_walks_subtree() {
        let count = Rc::new(RefCell::new(0));

        let root = element("div", false);
        let button = element("button", false);
        if let DomNode::Element(el) = &mut *button.borrow_mut() {
            let seen = count.clone();
            el.add_listener(Listener::new(
                "click",
                handler(move |_| *seen.borrow_mut() += 1),
            ));
        }
        if let DomNode::Element(el) = &mut *root.borrow_mut() {
            el.children.push(button);
        }

        let invoked = dispatch(&root, &Event::new("click"));
        assert_eq!(invoked, 1);
        assert_eq!(*count.borrow(), 1);

        // Non-matching event names invoke nothing.
        assert_eq!(dispatch(&root, &Event::new("submit")), 0);
    }

    #[test]
    fn test_clear_listeners_deep() {
        let root = element("div", false);
        let button = element("button", false);
        if let DomNode::Element(el) = &mut *button.borrow_mut() {
            el.add_listener(Listener::new("click", handler(|_| {})));
        }
        if let DomNode::Element(el) = &mut *root.borrow_mut() {
            el.children.push(button.clone());
        }

        clear_listeners_deep(&root);
        if let DomNode::Element(el) = &*button.borrow() {
            assert_eq!(el.listener_count(), 0);
        };
    }
}
