use super::model::{path_key, Symbol, SymbolId, SymbolKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// How a caller names a symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SymbolDescriptor {
    Id {
        id: SymbolId,
    },
    /// Simple (`validate_x`) or qualified (`Parser.parse`) name, optionally
    /// narrowed by file and enclosing scope.
    Name {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file: Option<PathBuf>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        container: Option<String>,
    },
    /// Declaration header as written (`def validate_x(v):`) in one file.
    /// Compared after [`normalize_signature`].
    Signature { signature: String, file: PathBuf },
}

impl SymbolDescriptor {
    pub fn name(name: impl Into<String>) -> Self {
        SymbolDescriptor::Name {
            name: name.into(),
            file: None,
            container: None,
        }
    }

    pub fn in_file(name: impl Into<String>, file: impl Into<PathBuf>) -> Self {
        SymbolDescriptor::Name {
            name: name.into(),
            file: Some(file.into()),
            container: None,
        }
    }

    pub fn signature(signature: impl Into<String>, file: impl Into<PathBuf>) -> Self {
        SymbolDescriptor::Signature {
            signature: signature.into(),
            file: file.into(),
        }
    }

    /// File named by the descriptor, if any.
    pub fn file(&self) -> Option<&PathBuf> {
        match self {
            SymbolDescriptor::Name { file, .. } => file.as_ref(),
            SymbolDescriptor::Signature { file, .. } => Some(file),
            SymbolDescriptor::Id { .. } => None,
        }
    }
}

impl fmt::Display for SymbolDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymbolDescriptor::Id { id } => write!(f, "#{id}"),
            SymbolDescriptor::Name {
                name,
                file,
                container,
            } => {
                write!(f, "{name}")?;
                if let Some(container) = container {
                    write!(f, " in {container}")?;
                }
                if let Some(file) = file {
                    write!(f, " ({})", file.display())?;
                }
                Ok(())
            }
            SymbolDescriptor::Signature { signature, file } => {
                write!(f, "`{}` ({})", normalize_signature(signature), file.display())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LookupError {
    NotFound,
    Ambiguous(Vec<Symbol>),
}

/// Declaration header with whitespace runs collapsed and a trailing block
/// opener (`{` or `:`) dropped.
pub fn normalize_signature(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .trim_end_matches(|c: char| c == '{' || c == ':' || c.is_whitespace())
        .to_string()
}

/// Pick the single symbol a descriptor names out of `symbols`.
///
/// Exact qualified-name matches win over suffix matches, and real
/// declarations win over import and impl blocks of the same name.
pub fn select<'a, I>(symbols: I, descriptor: &SymbolDescriptor) -> Result<Symbol, LookupError>
where
    I: IntoIterator<Item = &'a Symbol>,
{
    let (name, file, container) = match descriptor {
        SymbolDescriptor::Id { id } => {
            return symbols
                .into_iter()
                .find(|s| s.id == *id)
                .cloned()
                .ok_or(LookupError::NotFound);
        }
        SymbolDescriptor::Name {
            name,
            file,
            container,
        } => (name, file, container),
        SymbolDescriptor::Signature { signature, file } => {
            let wanted = normalize_signature(signature);
            let file_key = path_key(file);
            let pool = symbols
                .into_iter()
                .filter(|s| path_key(&s.path) == file_key)
                .filter(|s| normalize_signature(&s.signature) == wanted)
                .collect();
            return single(pool);
        }
    };

    let suffix = format!(".{name}");
    let file_key = file.as_deref().map(path_key);

    let candidates: Vec<&Symbol> = symbols
        .into_iter()
        .filter(|s| {
            s.qualified_name == *name || s.name == *name || s.qualified_name.ends_with(&suffix)
        })
        .filter(|s| {
            file_key
                .as_deref()
                .map_or(true, |key| path_key(&s.path) == key)
        })
        .filter(|s| {
            container.as_deref().map_or(true, |c| {
                s.container()
                    .is_some_and(|own| own == c || own.ends_with(&format!(".{c}")))
            })
        })
        .collect();

    let exact: Vec<&Symbol> = if name.contains('.') {
        candidates
            .iter()
            .copied()
            .filter(|s| s.qualified_name == *name)
            .collect()
    } else {
        Vec::new()
    };
    let mut pool = if exact.is_empty() { candidates } else { exact };

    if pool
        .iter()
        .any(|s| !matches!(s.kind, SymbolKind::Import | SymbolKind::Impl))
    {
        pool.retain(|s| !matches!(s.kind, SymbolKind::Import | SymbolKind::Impl));
    }

    single(pool)
}

fn single(pool: Vec<&Symbol>) -> Result<Symbol, LookupError> {
    match pool.len() {
        0 => Err(LookupError::NotFound),
        1 => Ok(pool[0].clone()),
        _ => {
            let mut all: Vec<Symbol> = pool.into_iter().cloned().collect();
            all.sort_by(|a, b| (&a.path, a.span.start).cmp(&(&b.path, b.span.start)));
            Err(LookupError::Ambiguous(all))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::model::{FileId, Span};
    use std::path::Path;

    fn sym(path: &str, kind: SymbolKind, qualified: &str) -> Symbol {
        let name = qualified.rsplit('.').next().unwrap_or(qualified).to_string();
        Symbol {
            id: SymbolId::derive(Path::new(path), kind, qualified, 0),
            kind,
            name,
            qualified_name: qualified.to_string(),
            file: FileId::for_path(Path::new(path)),
            path: PathBuf::from(path),
            span: Span::new(0, 1),
            signature: String::new(),
            doc_span: None,
            doc_exclusive: true,
            parent: None,
        }
    }

    fn table() -> Vec<Symbol> {
        vec![
            sym("a.py", SymbolKind::Function, "parse"),
            sym("a.py", SymbolKind::Class, "Parser"),
            sym("a.py", SymbolKind::Method, "Parser.parse"),
            sym("b.py", SymbolKind::Function, "validate"),
            sym("c.py", SymbolKind::Import, "validate"),
        ]
    }

    #[test]
    fn id_lookup() {
        let symbols = table();
        let id = symbols[3].id;
        let found = select(&symbols, &SymbolDescriptor::Id { id }).unwrap();
        assert_eq!(found.qualified_name, "validate");
    }

    #[test]
    fn imports_lose_to_declarations() {
        let symbols = table();
        let found = select(&symbols, &SymbolDescriptor::name("validate")).unwrap();
        assert_eq!(found.path, PathBuf::from("b.py"));
    }

    #[test]
    fn ambiguous_without_context() {
        let symbols = table();
        match select(&symbols, &SymbolDescriptor::name("parse")) {
            Err(LookupError::Ambiguous(candidates)) => assert_eq!(candidates.len(), 2),
            other => panic!("expected ambiguity, got {other:?}"),
        }
    }

    #[test]
    fn qualified_or_container_disambiguates() {
        let symbols = table();
        let found = select(&symbols, &SymbolDescriptor::name("Parser.parse")).unwrap();
        assert_eq!(found.kind, SymbolKind::Method);

        let found = select(
            &symbols,
            &SymbolDescriptor::Name {
                name: "parse".into(),
                file: None,
                container: Some("Parser".into()),
            },
        )
        .unwrap();
        assert_eq!(found.qualified_name, "Parser.parse");
    }

    #[test]
    fn signature_lookup_ignores_layout() {
        let mut symbols = table();
        symbols[3].signature = "def validate(v)".into();
        let found = select(
            &symbols,
            &SymbolDescriptor::signature("def   validate(v):\n", "b.py"),
        )
        .unwrap();
        assert_eq!(found.qualified_name, "validate");

        assert_eq!(
            select(&symbols, &SymbolDescriptor::signature("def validate(v):", "a.py")),
            Err(LookupError::NotFound)
        );
        assert_eq!(normalize_signature("fn run(&self) -> u8 {"), "fn run(&self) -> u8");
    }

    #[test]
    fn missing_symbol() {
        let symbols = table();
        assert_eq!(
            select(&symbols, &SymbolDescriptor::in_file("parse", "zzz.py")),
            Err(LookupError::NotFound)
        );
    }

    #[test]
    fn descriptor_json_forms() {
        let by_name: SymbolDescriptor =
            serde_json::from_str(r#"{"name": "validate_x", "file": "utils.py"}"#).unwrap();
        assert_eq!(by_name, SymbolDescriptor::in_file("validate_x", "utils.py"));

        let by_id: SymbolDescriptor =
            serde_json::from_str(r#"{"id": "00000000000000ff"}"#).unwrap();
        assert_eq!(by_id, SymbolDescriptor::Id { id: SymbolId(255) });

        let by_signature: SymbolDescriptor =
            serde_json::from_str(r#"{"signature": "def a():", "file": "utils.py"}"#).unwrap();
        assert_eq!(by_signature, SymbolDescriptor::signature("def a():", "utils.py"));
    }
}
