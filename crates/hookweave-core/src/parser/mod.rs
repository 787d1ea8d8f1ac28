// Parser module - front ends producing the arena syntax tree
use std::path::Path;

use crate::ast::GoFile;
use crate::{Result, WeaveError};

pub mod go;

pub use go::GoParser;

/// Trait for source parsers
pub trait Parser: Send {
    /// Parse source text into a file tree
    fn parse(&mut self, path: &Path, source: &str) -> Result<GoFile>;

    /// Parse a file
    fn parse_file(&mut self, path: &Path) -> Result<GoFile> {
        let source = std::fs::read_to_string(path)?;
        self.parse(path, &source)
    }

    /// Check that a statement list parses inside a function body
    fn check_snippet(&mut self, snippet: &str) -> Result<()>;

    /// Get parser name for debugging
    fn name(&self) -> &'static str;
}

/// Parser types available
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserType {
    /// tree-sitter Go grammar
    Go,
}

impl ParserType {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "go" | "golang" => Some(ParserType::Go),
            _ => None,
        }
    }
}

/// Create a parser by name
pub fn create_parser(name: &str) -> Result<Box<dyn Parser>> {
    match ParserType::from_name(name) {
        Some(ParserType::Go) => Ok(Box::new(GoParser::new()?)),
        None => Err(WeaveError::parse(name, "unknown parser type")),
    }
}
