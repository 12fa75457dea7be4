//! Event plumbing for the in-memory DOM.
//!
//! Handlers are registered by name in [`crate::client::ClientOptions`] and
//! attached to elements as listeners. Every listener invocation is isolated:
//! a panicking handler is caught and logged, never aborting the surrounding
//! render loop or page.

use std::cell::RefCell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;
use tracing::error;

/// A dispatched DOM event.
#[derive(Debug, Clone)]
pub struct Event {
    pub name: String,
    pub payload: serde_json::Value,
}

impl Event {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            payload: serde_json::Value::Null,
        }
    }

    pub fn with_payload(name: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }
}

/// A user-supplied event handler.
pub type Handler = Rc<RefCell<dyn FnMut(&Event)>>;

/// A listener bound to an element for one event name.
pub struct Listener {
    pub event: String,
    callback: Handler,
}

impl Listener {
    pub fn new(event: impl Into<String>, callback: Handler) -> Self {
        Self {
            event: event.into(),
            callback,
        }
    }

    /// Invoke the handler with panic isolation.
    pub fn invoke(&self, event: &Event) {
        let result = catch_unwind(AssertUnwindSafe(|| {
            let mut callback = self.callback.borrow_mut();
            (*callback)(event);
        }));
        if result.is_err() {
            error!(event = %self.event, "event handler panicked; continuing");
        }
    }
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("event", &self.event)
            .finish_non_exhaustive()
    }
}
