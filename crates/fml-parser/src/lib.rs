//! FML Parser
//!
//! Parses a token stream into an Abstract Syntax Tree.
//! Includes both the document parser (tags, components, directive assembly,
//! recovery) and the expression compiler that classifies `{expr}` sources
//! into a closed, non-executable whitelist.

pub mod ast;
pub mod expr;
pub mod parser;

pub use ast::{Document, Node};
pub use expr::{compile, CompiledExpr};
pub use parser::{ParseOutput, Parser, ParserOptions};

/// Parser error with position information.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Parse error at line {line}, column {column}: {message}")]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

/// A non-fatal diagnostic produced during parsing or compilation.
#[derive(Debug, Clone, PartialEq)]
pub struct Warning {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Warning at line {}, column {}: {}",
            self.line, self.column, self.message
        )
    }
}
