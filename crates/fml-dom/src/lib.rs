//! FML Client Renderer
//!
//! The DOM half of the pipeline: a small in-memory DOM, a renderer that
//! mirrors the server walk but emits mutable nodes with bound event
//! listeners, hydration over server-emitted event markers, and
//! `update`/`destroy` handles on the mounted result.

pub mod client;
pub mod dom;
pub mod events;
pub mod hydrate;

pub use client::{ClientOptions, ClientRenderer, Mounted};
pub use dom::{DomHandle, DomNode};
pub use events::{Event, Handler, Listener};
pub use hydrate::hydrate;
