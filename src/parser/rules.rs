//! Per-language node classification tables.
//!
//! Each grammar names its declarations differently; these rules map a
//! tree-sitter node onto a symbol kind, a name and the nodes that bound it.

use crate::index::model::SymbolKind;
use crate::lang::Language;
use tree_sitter::Node;

/// Where a declaration sits, which decides method-vs-function and whether
/// variables count as symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Scope {
    File,
    Type,
    Function,
}

pub(crate) struct Classified<'t> {
    pub kind: SymbolKind,
    pub name: String,
    /// Node carrying the body and signature
    pub def: Node<'t>,
    /// Node whose range is the symbol span (wrapper such as a decorator or export)
    pub outer: Node<'t>,
    /// Prefix used for children's qualified names, when it differs from `name`
    pub scope_name: Option<String>,
    /// Qualified name when the declaration names its own container (Go methods)
    pub qualified: Option<String>,
    /// Imported module paths with optional aliases
    pub imports: Vec<(String, Option<String>)>,
}

impl<'t> Classified<'t> {
    fn new(kind: SymbolKind, name: impl Into<String>, node: Node<'t>) -> Self {
        Self {
            kind,
            name: name.into(),
            def: node,
            outer: node,
            scope_name: None,
            qualified: None,
            imports: Vec::new(),
        }
    }

    /// Scope that the symbol's body opens.
    pub fn body_scope(&self) -> Scope {
        match self.kind {
            SymbolKind::Function | SymbolKind::Method => Scope::Function,
            _ => Scope::Type,
        }
    }
}

pub(crate) fn text<'s>(node: Node<'_>, source: &'s str) -> &'s str {
    source.get(node.byte_range()).unwrap_or("")
}

fn field_text<'s>(node: Node<'_>, field: &str, source: &'s str) -> Option<&'s str> {
    node.child_by_field_name(field).map(|n| text(n, source))
}

fn function_kind(scope: Scope) -> SymbolKind {
    if scope == Scope::Type {
        SymbolKind::Method
    } else {
        SymbolKind::Function
    }
}

fn variable_kind(name: &str) -> SymbolKind {
    let has_letter = name.chars().any(|c| c.is_ascii_alphabetic());
    let upper = name
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_');
    if has_letter && upper {
        SymbolKind::Constant
    } else {
        SymbolKind::Variable
    }
}

fn strip_quotes(s: &str) -> &str {
    s.trim_matches(|c| c == '"' || c == '\'' || c == '`')
}

/// Classify `node` as a declaration of `language`, if it is one.
pub(crate) fn classify<'t>(
    language: Language,
    node: Node<'t>,
    source: &str,
    scope: Scope,
) -> Option<Classified<'t>> {
    match language {
        Language::Rust => rust(node, source, scope),
        Language::Python => python(node, source, scope),
        Language::JavaScript | Language::TypeScript | Language::Tsx => {
            javascript(node, source, scope)
        }
        Language::Go => go(node, source, scope),
        Language::Java => java(node, source, scope),
        Language::Json
        | Language::Toml
        | Language::Yaml
        | Language::Markdown
        | Language::PlainText => None,
    }
}

fn rust<'t>(node: Node<'t>, source: &str, scope: Scope) -> Option<Classified<'t>> {
    let named = |kind: SymbolKind| -> Option<Classified<'t>> {
        let name = field_text(node, "name", source)?;
        Some(Classified::new(kind, name, node))
    };

    match node.kind() {
        "function_item" | "function_signature_item" => named(function_kind(scope)),
        "struct_item" | "union_item" => named(SymbolKind::Struct),
        "enum_item" => named(SymbolKind::Enum),
        "trait_item" => named(SymbolKind::Trait),
        "type_item" => named(SymbolKind::TypeAlias),
        "const_item" | "static_item" => named(SymbolKind::Constant),
        "macro_definition" => named(SymbolKind::Macro),
        "mod_item" => named(SymbolKind::Module),
        "impl_item" => {
            let ty = field_text(node, "type", source)?;
            let name = match field_text(node, "trait", source) {
                Some(tr) => format!("impl {tr} for {ty}"),
                None => format!("impl {ty}"),
            };
            let base = ty.split('<').next().unwrap_or(ty).trim().to_string();
            let mut classified = Classified::new(SymbolKind::Impl, name, node);
            classified.scope_name = Some(base);
            Some(classified)
        }
        "use_declaration" => {
            let argument = field_text(node, "argument", source)?;
            let compact: String = argument.split_whitespace().collect::<Vec<_>>().join(" ");
            let mut classified = Classified::new(SymbolKind::Import, compact, node);
            classified.imports = expand_use_tree("", argument)
                .into_iter()
                .map(|(path, alias)| (path.replace("::", "."), alias))
                .collect();
            Some(classified)
        }
        _ => None,
    }
}

/// Expand a Rust use tree (`a::{b, c::d as e}`) into full paths.
pub(crate) fn expand_use_tree(prefix: &str, tree: &str) -> Vec<(String, Option<String>)> {
    let tree = tree.trim();
    let mut out = Vec::new();

    if let (Some(open), Some(close)) = (tree.find('{'), tree.rfind('}')) {
        if open < close {
            let head = tree[..open].trim().trim_end_matches("::");
            let prefix = join_path(prefix, head);
            for part in split_top_level(&tree[open + 1..close]) {
                out.extend(expand_use_tree(&prefix, part));
            }
            return out;
        }
    }

    let (path, alias) = match tree.split_once(" as ") {
        Some((path, alias)) => (path.trim(), Some(alias.trim().to_string())),
        None => (tree, None),
    };
    let path = path.trim_end_matches("::*").trim_end_matches('*');
    let full = if path == "self" || path.is_empty() {
        prefix.to_string()
    } else {
        join_path(prefix, path)
    };
    if !full.is_empty() {
        out.push((full, alias));
    }
    out
}

fn join_path(prefix: &str, rest: &str) -> String {
    match (prefix.is_empty(), rest.is_empty()) {
        (true, _) => rest.to_string(),
        (_, true) => prefix.to_string(),
        _ => format!("{prefix}::{rest}"),
    }
}

fn split_top_level(list: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in list.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&list[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&list[start..]);
    parts.into_iter().filter(|p| !p.trim().is_empty()).collect()
}

fn python<'t>(node: Node<'t>, source: &str, scope: Scope) -> Option<Classified<'t>> {
    match node.kind() {
        "function_definition" => {
            let name = field_text(node, "name", source)?;
            Some(Classified::new(function_kind(scope), name, node))
        }
        "class_definition" => {
            let name = field_text(node, "name", source)?;
            Some(Classified::new(SymbolKind::Class, name, node))
        }
        "decorated_definition" => {
            let def = node.child_by_field_name("definition")?;
            let mut classified = python(def, source, scope)?;
            classified.outer = node;
            Some(classified)
        }
        "expression_statement" if scope != Scope::Function => {
            let assignment = node.named_child(0)?;
            if assignment.kind() != "assignment" {
                return None;
            }
            let left = assignment.child_by_field_name("left")?;
            if left.kind() != "identifier" {
                return None;
            }
            let name = text(left, source);
            Some(Classified::new(variable_kind(name), name, node))
        }
        "import_statement" => {
            let mut imports = Vec::new();
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                match child.kind() {
                    "dotted_name" => imports.push((text(child, source).to_string(), None)),
                    "aliased_import" => {
                        if let Some(name) = field_text(child, "name", source) {
                            let alias = field_text(child, "alias", source).map(str::to_string);
                            imports.push((name.to_string(), alias));
                        }
                    }
                    _ => {}
                }
            }
            let first = imports.first()?.0.clone();
            let mut classified = Classified::new(SymbolKind::Import, first, node);
            classified.imports = imports;
            Some(classified)
        }
        "import_from_statement" => {
            let base = field_text(node, "module_name", source)?.to_string();
            let join = |name: &str| {
                if base.ends_with('.') {
                    format!("{base}{name}")
                } else {
                    format!("{base}.{name}")
                }
            };
            let mut imports = Vec::new();
            let mut cursor = node.walk();
            for child in node.children_by_field_name("name", &mut cursor) {
                match child.kind() {
                    "dotted_name" => imports.push((join(text(child, source)), None)),
                    "aliased_import" => {
                        if let Some(name) = field_text(child, "name", source) {
                            let alias = field_text(child, "alias", source).map(str::to_string);
                            imports.push((join(name), alias));
                        }
                    }
                    _ => {}
                }
            }
            if imports.is_empty() {
                imports.push((base.clone(), None));
            }
            let mut classified = Classified::new(SymbolKind::Import, base, node);
            classified.imports = imports;
            Some(classified)
        }
        _ => None,
    }
}

fn javascript<'t>(node: Node<'t>, source: &str, scope: Scope) -> Option<Classified<'t>> {
    let named = |kind: SymbolKind| -> Option<Classified<'t>> {
        let name = field_text(node, "name", source)?;
        Some(Classified::new(kind, name, node))
    };

    match node.kind() {
        "function_declaration" | "generator_function_declaration" => {
            named(SymbolKind::Function)
        }
        "class_declaration" | "abstract_class_declaration" => named(SymbolKind::Class),
        "method_definition" | "method_signature" | "abstract_method_signature" => {
            named(SymbolKind::Method)
        }
        "interface_declaration" => named(SymbolKind::Interface),
        "type_alias_declaration" => named(SymbolKind::TypeAlias),
        "enum_declaration" => named(SymbolKind::Enum),
        "internal_module" | "module" => named(SymbolKind::Module),
        "lexical_declaration" | "variable_declaration" if scope != Scope::Function => {
            let mut cursor = node.walk();
            let declarator = node
                .named_children(&mut cursor)
                .find(|c| c.kind() == "variable_declarator")?;
            let name_node = declarator.child_by_field_name("name")?;
            if name_node.kind() != "identifier" {
                return None;
            }
            let name = text(name_node, source);
            let is_function = declarator
                .child_by_field_name("value")
                .map(|v| matches!(v.kind(), "arrow_function" | "function_expression" | "function"))
                .unwrap_or(false);
            let kind = if is_function {
                SymbolKind::Function
            } else {
                variable_kind(name)
            };
            let mut classified = Classified::new(kind, name, node);
            if is_function {
                if let Some(value) = declarator.child_by_field_name("value") {
                    classified.def = value;
                }
            }
            Some(classified)
        }
        "export_statement" => {
            let declaration = node.child_by_field_name("declaration")?;
            let mut classified = javascript(declaration, source, scope)?;
            classified.outer = node;
            Some(classified)
        }
        "import_statement" => {
            let module = strip_quotes(field_text(node, "source", source)?).to_string();
            let mut classified = Classified::new(SymbolKind::Import, module.clone(), node);
            classified.imports.push((module, None));
            Some(classified)
        }
        _ => None,
    }
}

fn go<'t>(node: Node<'t>, source: &str, scope: Scope) -> Option<Classified<'t>> {
    match node.kind() {
        "function_declaration" => {
            let name = field_text(node, "name", source)?;
            Some(Classified::new(SymbolKind::Function, name, node))
        }
        "method_declaration" => {
            let name = field_text(node, "name", source)?;
            let mut classified = Classified::new(SymbolKind::Method, name, node);
            if let Some(receiver) = node
                .child_by_field_name("receiver")
                .and_then(|r| first_descendant(r, "type_identifier"))
            {
                classified.qualified = Some(format!("{}.{}", text(receiver, source), name));
            }
            Some(classified)
        }
        "type_declaration" => {
            let spec = node.named_child(0)?;
            let name = field_text(spec, "name", source)?;
            let kind = match spec.child_by_field_name("type").map(|t| t.kind()) {
                Some("struct_type") => SymbolKind::Struct,
                Some("interface_type") => SymbolKind::Interface,
                _ => SymbolKind::TypeAlias,
            };
            Some(Classified::new(kind, name, node))
        }
        "const_declaration" | "var_declaration" if scope != Scope::Function => {
            let spec = node.named_child(0)?;
            let name = field_text(spec, "name", source)?;
            let kind = if node.kind() == "const_declaration" {
                SymbolKind::Constant
            } else {
                SymbolKind::Variable
            };
            Some(Classified::new(kind, name, node))
        }
        "import_declaration" => {
            let mut imports = Vec::new();
            collect_go_imports(node, source, &mut imports);
            let first = imports.first()?.0.clone();
            let mut classified = Classified::new(SymbolKind::Import, first, node);
            classified.imports = imports;
            Some(classified)
        }
        _ => None,
    }
}

fn collect_go_imports(node: Node<'_>, source: &str, out: &mut Vec<(String, Option<String>)>) {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        match child.kind() {
            "import_spec" => {
                if let Some(path) = field_text(child, "path", source) {
                    let alias = field_text(child, "name", source).map(str::to_string);
                    out.push((strip_quotes(path).to_string(), alias));
                }
            }
            "import_spec_list" => collect_go_imports(child, source, out),
            _ => {}
        }
    }
}

fn java<'t>(node: Node<'t>, source: &str, scope: Scope) -> Option<Classified<'t>> {
    let named = |kind: SymbolKind| -> Option<Classified<'t>> {
        let name = field_text(node, "name", source)?;
        Some(Classified::new(kind, name, node))
    };

    match node.kind() {
        "class_declaration" | "record_declaration" => named(SymbolKind::Class),
        "interface_declaration" | "annotation_type_declaration" => named(SymbolKind::Interface),
        "enum_declaration" => named(SymbolKind::Enum),
        "method_declaration" | "constructor_declaration" => named(SymbolKind::Method),
        "field_declaration" if scope == Scope::Type => {
            let declarator = node.child_by_field_name("declarator")?;
            let name = field_text(declarator, "name", source)?;
            Some(Classified::new(variable_kind(name), name, node))
        }
        "import_declaration" => {
            let mut cursor = node.walk();
            let path = node
                .named_children(&mut cursor)
                .find(|c| matches!(c.kind(), "scoped_identifier" | "identifier"))?;
            let module = text(path, source).to_string();
            let mut classified = Classified::new(SymbolKind::Import, module.clone(), node);
            classified.imports.push((module, None));
            Some(classified)
        }
        _ => None,
    }
}

fn first_descendant<'t>(node: Node<'t>, kind: &str) -> Option<Node<'t>> {
    if node.kind() == kind {
        return Some(node);
    }
    let mut cursor = node.walk();
    let children: Vec<Node<'t>> = node.named_children(&mut cursor).collect();
    children
        .into_iter()
        .find_map(|child| first_descendant(child, kind))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_nested_use_trees() {
        let paths = expand_use_tree("", "crate::index::{model::{Span, Symbol as Sym}, self}");
        let flat: Vec<_> = paths
            .iter()
            .map(|(p, a)| (p.as_str(), a.as_deref()))
            .collect();
        assert_eq!(
            flat,
            vec![
                ("crate::index::model::Span", None),
                ("crate::index::model::Symbol", Some("Sym")),
                ("crate::index", None),
            ]
        );
    }

    #[test]
    fn expands_globs_and_plain_paths() {
        assert_eq!(
            expand_use_tree("", "std::io::*"),
            vec![("std::io".to_string(), None)]
        );
        assert_eq!(
            expand_use_tree("", "serde::Serialize"),
            vec![("serde::Serialize".to_string(), None)]
        );
    }

    #[test]
    fn upper_case_names_are_constants() {
        assert_eq!(variable_kind("MAX_SIZE"), SymbolKind::Constant);
        assert_eq!(variable_kind("max_size"), SymbolKind::Variable);
        assert_eq!(variable_kind("_"), SymbolKind::Variable);
    }
}
