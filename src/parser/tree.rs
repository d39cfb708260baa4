use crate::errors::ParseError;
use crate::lang::Language;
use ast_grep_language::LanguageExt;
use tree_sitter::{Node, Parser, Tree};

/// tree-sitter parser bound to one language grammar.
pub struct TreeParser {
    parser: Parser,
    language: Language,
}

impl TreeParser {
    pub fn new(language: Language) -> Result<Self, ParseError> {
        let grammar = language.grammar().ok_or(ParseError::Grammar { language })?;
        let mut parser = Parser::new();
        parser
            .set_language(&grammar.get_ts_language())
            .map_err(|_| ParseError::Grammar { language })?;
        Ok(Self { parser, language })
    }

    pub fn language(&self) -> Language {
        self.language
    }

    /// Parse source into a tree. `None` only when tree-sitter gives up
    /// entirely; syntax errors still produce a tree with ERROR nodes.
    pub fn parse(&mut self, source: &str) -> Option<Tree> {
        self.parser.parse(source, None)
    }
}

/// Location of an ERROR or MISSING node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorNode {
    pub byte_start: usize,
    pub byte_end: usize,
    /// 1-based
    pub line: usize,
    pub column: usize,
}

pub fn error_nodes(tree: &Tree) -> Vec<ErrorNode> {
    let mut errors = Vec::new();
    collect_error_nodes(tree.root_node(), &mut errors);
    errors
}

fn collect_error_nodes(node: Node<'_>, errors: &mut Vec<ErrorNode>) {
    if node.is_error() || node.is_missing() {
        let start = node.start_position();
        errors.push(ErrorNode {
            byte_start: node.start_byte(),
            byte_end: node.end_byte(),
            line: start.row + 1,
            column: start.column + 1,
        });
    }

    if !node.has_error() {
        return;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_error_nodes(child, errors);
    }
}
