//! FML Compiler
//!
//! Lowers the parsed AST into an immutable render tree with pre-classified
//! expressions, consumed identically by the server and client renderers.
//!
//! ```text
//! Document AST → compile() → (CompiledTemplate, [Diagnostic])
//! ```

pub mod compiler;
pub mod registry;
pub mod tree;

pub use compiler::{compile, CompileOptions};
pub use registry::ComponentRegistry;
pub use tree::{CompiledTemplate, RenderNode};

/// Compilation error. The only fatal condition is an unregistered component
/// in strict mode; everything else degrades into diagnostics.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Compile error: {message}")]
pub struct CompileError {
    pub message: String,
}

/// Diagnostic severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// A non-fatal compile diagnostic.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "{tag}: {}", self.message)
    }
}
