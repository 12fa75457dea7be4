//! Hydration: attach listeners onto an already-rendered DOM tree.
//!
//! The server renderer serializes event handlers as
//! `data-fml-on-<event>="<expr>"` markers when its `hydratable` option is
//! set. Hydration walks the existing nodes, resolves each marker's handler
//! expression against the client handler registry, and attaches listeners in
//! place — nothing is rebuilt.

use crate::client::{resolve_handler, ClientOptions};
use crate::dom::{DomHandle, DomNode};
use crate::events::Listener;
use tracing::debug;

/// The attribute prefix produced by the server renderer's hydratable mode.
pub const MARKER_PREFIX: &str = "data-fml-on-";

/// Walk a pre-rendered tree and attach listeners for every event marker.
/// Returns the number of listeners attached.
pub fn hydrate(root: &DomHandle, options: &ClientOptions) -> usize {
    let mut attached = 0;
    hydrate_node(root, options, &mut attached);
    debug!(attached, "hydration complete");
    attached
}

fn hydrate_node(handle: &DomHandle, options: &ClientOptions, attached: &mut usize) {
    let children: Vec<DomHandle> = match &mut *handle.borrow_mut() {
        DomNode::Element(el) => {
            let markers: Vec<(String, String)> = el
                .attributes()
                .iter()
                .filter_map(|(name, value)| {
                    name.strip_prefix(MARKER_PREFIX).map(|event| {
                        (event.to_string(), value.clone().unwrap_or_default())
                    })
                })
                .collect();

            for (event, raw) in markers {
                match resolve_handler(options, &raw) {
                    Some(handler) => {
                        el.add_listener(Listener::new(event, handler));
                        *attached += 1;
                    }
                    None => {
                        debug!(event = %event, source = %raw, "no handler for marker");
                    }
                }
            }
            el.children.clone()
        }
        DomNode::Text(_) => Vec::new(),
    };

    for child in &children {
        hydrate_node(child, options, attached);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{self, DomNode};
    use crate::events::Event;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Build the DOM a server-rendered page with markers would parse into.
    fn marked_tree() -> DomHandle {
        let root = dom::element("div", false);
        let button = dom::element("button", false);
        if let DomNode::Element(el) = &mut *button.borrow_mut() {
            el.set_attribute("data-fml-on-click", Some("save".into()));
            el.children.push(dom::text("Go"));
        }
        if let DomNode::Element(el) = &mut *root.borrow_mut() {
            el.children.push(button);
        }
        root
    }

    #[test]
    fn test_hydrate_attaches_listeners() {
        let count = Rc::new(RefCell::new(0));
        let seen = count.clone();
        let options = ClientOptions::new().on("save", move |_| *seen.borrow_mut() += 1);

        let root = marked_tree();
        let attached = hydrate(&root, &options);
        assert_eq!(attached, 1);

        dom::dispatch(&root, &Event::new("click"));
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn test_hydrate_does_not_rebuild_nodes() {
        let options = ClientOptions::new().on("save", |_| {});
        let root = marked_tree();
        let before = dom::to_html(&root);
        hydrate(&root, &options);
        // The tree itself is untouched; only listeners were added.
        assert_eq!(dom::to_html(&root), before);
    }

    #[test]
    fn test_hydrate_without_handler_attaches_nothing() {
        let options = ClientOptions::new();
        let root = marked_tree();
        assert_eq!(hydrate(&root, &options), 0);
        assert_eq!(dom::dispatch(&root, &Event::new("click")), 0);
    }
}
