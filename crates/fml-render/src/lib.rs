//! FML Server Renderer
//!
//! The runtime half of the pipeline: value model, scope context, expression
//! resolution, HTML escaping, and the depth-first string-emitting renderer
//! with an optional size-bounded streaming mode.
//!
//! # Example
//!
//! ```
//! use fml_compiler::ComponentRegistry;
//! use serde_json::json;
//!
//! let registry = ComponentRegistry::new();
//! let html = fml_render::render(
//!     "<p>Hello {user.name}!</p>",
//!     &registry,
//!     json!({"user": {"name": "Ann"}}),
//! ).unwrap();
//! assert_eq!(html, "<p>Hello Ann!</p>");
//! ```

pub mod context;
pub mod escape;
pub mod eval;
pub mod server;
pub mod value;

pub use context::Context;
pub use escape::{escape_attribute, escape_html};
pub use eval::resolve;
pub use server::{ServerOptions, ServerRenderer};
pub use value::Value;

use fml_compiler::{compile, CompileOptions, ComponentRegistry};
use fml_parser::Parser;

/// Render error. Circular component references and invalid root props are
/// fatal; the remaining variants are caught per node, dropping only the
/// offending subtree.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Circular component reference: {chain}")]
    CircularComponent { chain: String },

    #[error("Type error: {message}")]
    Type { message: String },

    #[error("Malformed render node: {message}")]
    MalformedNode { message: String },

    #[error("Root props must be an object, got {found}")]
    InvalidProps { found: &'static str },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RenderError {
    /// Fatal errors abort the whole render instead of dropping one subtree.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RenderError::CircularComponent { .. }
                | RenderError::InvalidProps { .. }
                | RenderError::Io(_)
        )
    }
}

/// Any error from the full parse → compile → render pipeline.
#[derive(Debug, thiserror::Error)]
pub enum FmlError {
    #[error(transparent)]
    Parse(#[from] fml_parser::ParseError),
    #[error(transparent)]
    Compile(#[from] fml_compiler::CompileError),
    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Convenience: run the whole pipeline for one template string.
/// Parse diagnostics are tolerated (non-strict); the first fatal error of
/// any phase is returned.
pub fn render(
    source: &str,
    registry: &ComponentRegistry,
    props: serde_json::Value,
) -> Result<String, FmlError> {
    let output = Parser::parse_source(source)?;
    let (template, _) = compile(&output.document, registry, &CompileOptions::default())?;
    Ok(ServerRenderer::new(&template).render(props)?)
}
