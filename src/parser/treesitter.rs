use super::pool;
use super::references;
use super::rules::{classify, text, Classified, Scope};
use super::tree::error_nodes;
use super::{ParseOutput, ParsedImport, ParsedSymbol, SymbolParser};
use crate::errors::ParseError;
use crate::index::lookup::normalize_signature;
use crate::index::model::{Span, SymbolKind};
use crate::lang::Language;
use std::path::Path;
use tree_sitter::Node;

/// Grammar-backed parser for one language.
#[derive(Debug, Clone, Copy)]
pub struct TreeSitterParser {
    language: Language,
}

impl TreeSitterParser {
    pub fn new(language: Language) -> Self {
        Self { language }
    }
}

impl SymbolParser for TreeSitterParser {
    fn language(&self) -> Language {
        self.language
    }

    fn parse(&self, path: &Path, content: &str) -> Result<ParseOutput, ParseError> {
        let language = self.language;
        let mut output = pool::with_parser(language, |parser| {
            let tree = parser.parse(content).ok_or_else(|| ParseError::Unparseable {
                path: path.to_path_buf(),
                reason: "parser produced no tree".to_string(),
            })?;

            let mut walker = Walker {
                language,
                source: content,
                output: ParseOutput::default(),
            };
            walker.walk(tree.root_node(), None, "", Scope::File);
            walker.output.has_errors = !error_nodes(&tree).is_empty();
            Ok::<_, ParseError>(walker.output)
        })??;

        attach_docs(language, content, &mut output.symbols);
        output.references = references::collect(language, content, &output.symbols);
        Ok(output)
    }
}

struct Walker<'s> {
    language: Language,
    source: &'s str,
    output: ParseOutput,
}

impl<'s> Walker<'s> {
    fn walk(&mut self, node: Node<'_>, parent: Option<usize>, prefix: &str, scope: Scope) {
        let mut cursor = node.walk();
        let children: Vec<Node<'_>> = node.named_children(&mut cursor).collect();

        for child in children {
            match classify(self.language, child, self.source, scope) {
                Some(classified) => self.emit(classified, parent, prefix),
                None => self.walk(child, parent, prefix, scope),
            }
        }
    }

    fn emit(&mut self, classified: Classified<'_>, parent: Option<usize>, prefix: &str) {
        let qualified_name = classified.qualified.clone().unwrap_or_else(|| {
            if prefix.is_empty() {
                classified.name.clone()
            } else {
                format!("{prefix}.{}", classified.name)
            }
        });

        let start = leading_attributes_start(self.language, classified.outer)
            .unwrap_or_else(|| classified.outer.start_byte());
        let span = Span::new(start, classified.outer.end_byte());

        for (module, alias) in &classified.imports {
            self.output.imports.push(ParsedImport {
                module: module.clone(),
                alias: alias.clone(),
                span,
            });
        }

        let index = self.output.symbols.len();
        self.output.symbols.push(ParsedSymbol {
            kind: classified.kind,
            name: classified.name.clone(),
            qualified_name: qualified_name.clone(),
            span,
            signature: signature(classified.def, self.source),
            doc_span: None,
            doc_exclusive: true,
            parent,
        });

        if classified.kind == SymbolKind::Import {
            return;
        }

        let child_prefix = match &classified.scope_name {
            Some(scope_name) if prefix.is_empty() => scope_name.clone(),
            Some(scope_name) => format!("{prefix}.{scope_name}"),
            None => qualified_name,
        };
        if let Some(body) = classified.def.child_by_field_name("body") {
            self.walk(body, Some(index), &child_prefix, classified.body_scope());
        }
    }
}

/// Start of the outermost contiguous attribute run before a Rust item.
fn leading_attributes_start(language: Language, node: Node<'_>) -> Option<usize> {
    if language != Language::Rust {
        return None;
    }
    let mut start = None;
    let mut current = node.prev_named_sibling();
    while let Some(sibling) = current {
        match sibling.kind() {
            "attribute_item" => start = Some(sibling.start_byte()),
            "line_comment" | "block_comment" => {}
            _ => break,
        }
        current = sibling.prev_named_sibling();
    }
    start
}

/// Declaration text up to its body, whitespace-collapsed.
fn signature(def: Node<'_>, source: &str) -> String {
    let full = text(def, source);
    let head = match def.child_by_field_name("body") {
        Some(body) if body.start_byte() >= def.start_byte() => source
            .get(def.start_byte()..body.start_byte())
            .unwrap_or(full),
        _ => full.lines().next().unwrap_or(""),
    };
    normalize_signature(head)
}

fn line_start(source: &str, offset: usize) -> usize {
    source[..offset].rfind('\n').map(|i| i + 1).unwrap_or(0)
}

/// Find the leading comment block of every symbol and decide whether it is
/// shared with the preceding sibling.
pub(super) fn attach_docs(language: Language, source: &str, symbols: &mut [ParsedSymbol]) {
    let prefixes = language.comment_prefixes();
    if prefixes.is_empty() {
        return;
    }

    for i in 0..symbols.len() {
        let Some(doc) = doc_block(source, symbols[i].span.start, prefixes) else {
            continue;
        };

        // Shared when the previous sibling ends on the line right above the block.
        let above_start = if doc.start == 0 {
            None
        } else {
            let doc_line = line_start(source, doc.start);
            (doc_line > 0).then(|| line_start(source, doc_line - 1))
        };
        let shared = above_start.is_some_and(|above| {
            let doc_line = line_start(source, doc.start);
            symbols[..i].iter().any(|s| {
                s.parent == symbols[i].parent && s.span.end >= above && s.span.end < doc_line
            })
        });

        symbols[i].doc_span = Some(doc);
        symbols[i].doc_exclusive = !shared;
    }
}

/// Contiguous comment lines directly above the line holding `start`.
fn doc_block(source: &str, start: usize, prefixes: &[&str]) -> Option<Span> {
    let mut line_begin = line_start(source, start);
    let mut first: Option<usize> = None;
    let mut last_end: Option<usize> = None;

    while line_begin > 0 {
        let prev_begin = line_start(source, line_begin - 1);
        let line = &source[prev_begin..line_begin - 1];
        let line = line.strip_suffix('\r').unwrap_or(line);
        let trimmed = line.trim_start();
        if trimmed.is_empty() || !prefixes.iter().any(|p| trimmed.starts_with(p)) {
            break;
        }
        let content_start = prev_begin + (line.len() - trimmed.len());
        first = Some(content_start);
        if last_end.is_none() {
            last_end = Some(prev_begin + line.len());
        }
        line_begin = prev_begin;
    }

    match (first, last_end) {
        (Some(start), Some(end)) => Some(Span::new(start, end)),
        _ => None,
    }
}
