//! Pluggable per-language structure extraction.
//!
//! A [`SymbolParser`] turns source text into an ordered list of symbols,
//! the file's imports and raw (unresolved) references. The index selects a
//! parser by the [`Language`] tag on the file record; nothing else in the
//! crate branches on file type.

mod config_keys;
mod plain;
pub mod pool;
mod references;
mod rules;
pub mod tree;
mod treesitter;

pub use config_keys::ConfigKeyParser;
pub use plain::PlainTextParser;
pub use tree::{ErrorNode, TreeParser};
pub use treesitter::TreeSitterParser;

use crate::errors::ParseError;
use crate::index::model::{Span, SymbolKind};
use crate::lang::Language;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// One symbol as reported by a parser, before ids are assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedSymbol {
    pub kind: SymbolKind,
    pub name: String,
    pub qualified_name: String,
    pub span: Span,
    pub signature: String,
    pub doc_span: Option<Span>,
    pub doc_exclusive: bool,
    /// Index of the enclosing symbol in the same output
    pub parent: Option<usize>,
}

/// One imported module path, as written (`pkg.utils.validate`, `./util`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedImport {
    pub module: String,
    pub alias: Option<String>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Call,
    Inherit,
}

/// A by-name reference found in the source, resolved later by the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawReference {
    pub name: String,
    pub kind: ReferenceKind,
    /// Innermost symbol containing the reference
    pub enclosing: Option<usize>,
    pub span: Span,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseOutput {
    pub symbols: Vec<ParsedSymbol>,
    pub imports: Vec<ParsedImport>,
    pub references: Vec<RawReference>,
    /// True when the syntax tree contains ERROR or MISSING nodes
    pub has_errors: bool,
}

/// Structure extraction for one language. Must be deterministic for
/// identical content.
pub trait SymbolParser: Send + Sync {
    fn language(&self) -> Language;

    fn parse(&self, path: &Path, content: &str) -> Result<ParseOutput, ParseError>;
}

/// Maps language tags to parser implementations.
#[derive(Clone)]
pub struct ParserRegistry {
    parsers: HashMap<Language, Arc<dyn SymbolParser>>,
}

impl ParserRegistry {
    /// Registry without any parsers.
    pub fn empty() -> Self {
        Self {
            parsers: HashMap::new(),
        }
    }

    /// Tree-sitter parsers for every language with a grammar, key parsers
    /// for configuration and markup formats, plus plain text.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        for language in Language::ALL {
            if language.grammar().is_some() {
                registry.register(Arc::new(TreeSitterParser::new(language)));
            } else if language.is_data() {
                registry.register(Arc::new(ConfigKeyParser::new(language)));
            }
        }
        registry.register(Arc::new(PlainTextParser));
        registry
    }

    /// Install `parser` for its language, replacing any previous one.
    pub fn register(&mut self, parser: Arc<dyn SymbolParser>) {
        self.parsers.insert(parser.language(), parser);
    }

    pub fn get(&self, language: Language) -> Option<Arc<dyn SymbolParser>> {
        self.parsers.get(&language).cloned()
    }

    pub fn parse(
        &self,
        language: Language,
        path: &Path,
        content: &str,
    ) -> Result<ParseOutput, ParseError> {
        match self.parsers.get(&language) {
            Some(parser) => parser.parse(path, content),
            None => Err(ParseError::Grammar { language }),
        }
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for ParserRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut languages: Vec<_> = self.parsers.keys().map(|l| l.as_str()).collect();
        languages.sort_unstable();
        f.debug_struct("ParserRegistry")
            .field("languages", &languages)
            .finish()
    }
}
