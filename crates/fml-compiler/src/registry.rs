//! Component registry.
//!
//! An explicit, injected mapping from component names to parsed template
//! ASTs — never a process-wide singleton, so independent renderer instances
//! can coexist. Registration parses eagerly: a template that fails to parse
//! is rejected at registration time, not at first render.

use fml_parser::ast::Document;
use fml_parser::{ParseError, Parser};
use std::collections::HashMap;

/// Read-only during compile and render passes.
#[derive(Debug, Clone, Default)]
pub struct ComponentRegistry {
    documents: HashMap<String, Document>,
    sources: HashMap<String, String>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and register a component template under the given name.
    /// The first parse diagnostic, if any, fails the registration.
    pub fn register(&mut self, name: &str, source: &str) -> Result<(), ParseError> {
        let output = Parser::parse_source(source)?;
        if let Some(error) = output.errors.into_iter().next() {
            return Err(error);
        }
        self.documents.insert(name.to_string(), output.document);
        self.sources.insert(name.to_string(), source.to_string());
        Ok(())
    }

    /// Register an already-parsed document (for programmatically built
    /// components; no source text is retained).
    pub fn register_document(&mut self, name: &str, document: Document) {
        self.documents.insert(name.to_string(), document);
    }

    pub fn get(&self, name: &str) -> Option<&Document> {
        self.documents.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.documents.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.documents.keys().map(|k| k.as_str())
    }

    /// Source map for the parser's static cycle detection.
    pub fn sources(&self) -> HashMap<String, String> {
        self.sources.clone()
    }
}
