use super::{ParseOutput, SymbolParser};
use crate::errors::ParseError;
use crate::lang::Language;
use std::path::Path;

/// Parser for files without a grammar. Yields no structure; the file is
/// still tracked so hash staleness and fuzzy anchors work on it.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextParser;

impl SymbolParser for PlainTextParser {
    fn language(&self) -> Language {
        Language::PlainText
    }

    fn parse(&self, _path: &Path, _content: &str) -> Result<ParseOutput, ParseError> {
        Ok(ParseOutput::default())
    }
}
