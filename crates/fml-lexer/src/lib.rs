//! FML Lexer
//!
//! Tokenizes FML template source into a stream of tokens.
//! Handles tag open/close detection, attribute classification
//! (static / dynamic / event / bare-boolean), `{expr}` interpolation with
//! string-aware brace balancing, and HTML comments.
//!
//! # Example
//!
//! ```
//! use fml_lexer::Scanner;
//!
//! let tokens = Scanner::tokenize("").unwrap();
//! assert_eq!(tokens.len(), 1); // Just EOF
//! ```

pub mod scanner;
pub mod token;

pub use scanner::Scanner;
pub use token::{
    event_name, is_directive, is_event_attribute, is_void_element, Span, Token, TokenKind,
    DIRECTIVE_NAMES, EVENT_NAMES, VOID_ELEMENTS,
};

/// Lexer error with position information.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Lexer error at line {line}, column {column}: {message}")]
pub struct LexError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}
