//! By-name call and inheritance references, found by walking the ast-grep
//! tree for each grammar's call and heritage node kinds.

use super::{ParsedSymbol, RawReference, ReferenceKind};
use crate::index::model::{Span, SymbolKind};
use crate::lang::Language;
use ast_grep_core::tree_sitter::StrDoc;
use ast_grep_core::{AstGrep, Node};
use ast_grep_language::SupportLang;

type SgNode<'r> = Node<'r, StrDoc<SupportLang>>;

pub(crate) fn collect(
    language: Language,
    source: &str,
    symbols: &[ParsedSymbol],
) -> Vec<RawReference> {
    let Some(grammar) = language.grammar() else {
        return Vec::new();
    };
    let sg = AstGrep::new(source, grammar);
    let root = sg.root();
    let mut found: Vec<(String, ReferenceKind, Span)> = Vec::new();

    for node in root.dfs() {
        let kind = node.kind();
        match (language, &*kind) {
            (Language::Rust, "call_expression")
            | (Language::Go, "call_expression")
            | (Language::JavaScript | Language::TypeScript | Language::Tsx, "call_expression")
            | (Language::Python, "call") => {
                if let Some(name) = node.field("function").and_then(|f| callee_name(&f)) {
                    found.push((name, ReferenceKind::Call, span_of(&node)));
                }
            }
            (Language::JavaScript | Language::TypeScript | Language::Tsx, "new_expression") => {
                if let Some(name) = node.field("constructor").and_then(|f| callee_name(&f)) {
                    found.push((name, ReferenceKind::Call, span_of(&node)));
                }
            }
            (Language::Java, "method_invocation") => {
                if let Some(name) = node.field("name") {
                    found.push((name.text().to_string(), ReferenceKind::Call, span_of(&node)));
                }
            }
            (Language::Java, "object_creation_expression") => {
                if let Some(name) = node.field("type").and_then(|t| type_name(&t)) {
                    found.push((name, ReferenceKind::Call, span_of(&node)));
                }
            }
            (Language::Python, "class_definition") => {
                if let Some(bases) = node.field("superclasses") {
                    for base in bases.children() {
                        if let Some(name) = callee_name(&base) {
                            found.push((name, ReferenceKind::Inherit, span_of(&base)));
                        }
                    }
                }
            }
            (Language::JavaScript | Language::TypeScript | Language::Tsx, "class_heritage")
            | (Language::Java, "superclass")
            | (Language::Java, "super_interfaces") => {
                for inner in node.dfs() {
                    if matches!(&*inner.kind(), "identifier" | "type_identifier") {
                        found.push((
                            inner.text().to_string(),
                            ReferenceKind::Inherit,
                            span_of(&inner),
                        ));
                    }
                }
            }
            (Language::Rust, "impl_item") => {
                if let Some(name) = node.field("trait").and_then(|t| type_name(&t)) {
                    found.push((name, ReferenceKind::Inherit, span_of(&node)));
                }
            }
            _ => {}
        }
    }

    found
        .into_iter()
        .map(|(name, kind, span)| RawReference {
            enclosing: enclosing_symbol(symbols, span),
            name,
            kind,
            span,
        })
        .collect()
}

fn span_of(node: &SgNode<'_>) -> Span {
    let range = node.range();
    Span::new(range.start, range.end)
}

/// Final name segment of a callee expression (`a.b.c()` -> `c`).
fn callee_name(node: &SgNode<'_>) -> Option<String> {
    match &*node.kind() {
        "identifier" | "field_identifier" | "property_identifier" | "type_identifier" => {
            Some(node.text().to_string())
        }
        "field_expression" | "selector_expression" => {
            node.field("field").map(|n| n.text().to_string())
        }
        "scoped_identifier" => node.field("name").map(|n| n.text().to_string()),
        "attribute" => node.field("attribute").map(|n| n.text().to_string()),
        "member_expression" => node.field("property").map(|n| n.text().to_string()),
        "generic_function" => node.field("function").and_then(|f| callee_name(&f)),
        _ => None,
    }
}

/// Base name of a type reference, without path or generics.
fn type_name(node: &SgNode<'_>) -> Option<String> {
    match &*node.kind() {
        "type_identifier" | "identifier" => Some(node.text().to_string()),
        "scoped_type_identifier" | "scoped_identifier" => {
            node.field("name").map(|n| n.text().to_string())
        }
        "generic_type" => node.field("type").and_then(|t| type_name(&t)).or_else(|| {
            node.children()
                .find(|c| c.kind() == "type_identifier")
                .map(|c| c.text().to_string())
        }),
        _ => None,
    }
}

/// Innermost non-import symbol containing `span`.
fn enclosing_symbol(symbols: &[ParsedSymbol], span: Span) -> Option<usize> {
    symbols
        .iter()
        .enumerate()
        .filter(|(_, s)| s.kind != SymbolKind::Import && s.span.contains(&span))
        .min_by_key(|(_, s)| s.span.len())
        .map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use crate::lang::Language;
    use crate::parser::{ReferenceKind, SymbolParser, TreeSitterParser};
    use std::path::Path;

    fn refs(language: Language, src: &str) -> Vec<(String, ReferenceKind, Option<String>)> {
        let out = TreeSitterParser::new(language)
            .parse(Path::new("t"), src)
            .unwrap();
        out.references
            .iter()
            .map(|r| {
                (
                    r.name.clone(),
                    r.kind,
                    r.enclosing.map(|i| out.symbols[i].qualified_name.clone()),
                )
            })
            .collect()
    }

    #[test]
    fn python_calls_and_bases() {
        let found = refs(
            Language::Python,
            "class B(A):\n    def run(self):\n        self.helper()\n        util.go()\n",
        );
        assert!(found.contains(&("A".into(), ReferenceKind::Inherit, Some("B".into()))));
        assert!(found.contains(&("helper".into(), ReferenceKind::Call, Some("B.run".into()))));
        assert!(found.contains(&("go".into(), ReferenceKind::Call, Some("B.run".into()))));
    }

    #[test]
    fn rust_calls_and_trait_impls() {
        let found = refs(
            Language::Rust,
            "fn main() { helper(); a::b::scoped(); x.method(); }\nimpl Display for P {}\n",
        );
        let names: Vec<_> = found.iter().map(|(n, _, _)| n.as_str()).collect();
        assert!(names.contains(&"helper"));
        assert!(names.contains(&"scoped"));
        assert!(names.contains(&"method"));
        assert!(found.contains(&(
            "Display".into(),
            ReferenceKind::Inherit,
            Some("impl Display for P".into())
        )));
    }

    #[test]
    fn top_level_calls_have_no_enclosing_symbol() {
        let found = refs(Language::JavaScript, "setup();\nclass A extends B {}\n");
        assert!(found.contains(&("setup".into(), ReferenceKind::Call, None)));
        assert!(found.contains(&("B".into(), ReferenceKind::Inherit, Some("A".into()))));
    }
}
