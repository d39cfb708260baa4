use crate::lang::Language;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use xxhash_rust::xxh3::xxh3_64;

/// xxh3 hash of file content, as recorded on file records.
pub fn content_hash(bytes: &[u8]) -> u64 {
    xxh3_64(bytes)
}

/// Render a hash the way reports and manifests store it.
pub fn hash_hex(hash: u64) -> String {
    format!("{hash:016x}")
}

/// Workspace-relative path rendered with forward slashes.
pub fn path_key(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

macro_rules! hex_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:016x}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                u64::from_str_radix(s.trim_start_matches("0x"), 16).map($name)
            }
        }

        impl TryFrom<String> for $name {
            type Error = std::num::ParseIntError;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                s.parse()
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.to_string()
            }
        }
    };
}

hex_id!(FileId);
hex_id!(SymbolId);

impl FileId {
    pub fn for_path(path: &Path) -> Self {
        FileId(xxh3_64(path_key(path).as_bytes()))
    }
}

impl SymbolId {
    /// Stable id: unchanged name, kind and nesting keep the same id across
    /// re-index. `ordinal` separates same-named siblings.
    pub fn derive(path: &Path, kind: SymbolKind, qualified_name: &str, ordinal: usize) -> Self {
        let key = format!(
            "{}\0{}\0{}\0{}",
            path_key(path),
            kind.as_str(),
            qualified_name,
            ordinal
        );
        SymbolId(xxh3_64(key.as_bytes()))
    }
}

/// Half-open byte range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// True when the spans share at least one byte. Zero-width spans never overlap.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// True when one span ends exactly where the other begins.
    pub fn touches(&self, other: &Span) -> bool {
        self.end == other.start || other.end == self.start
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Function,
    Method,
    Class,
    Struct,
    Enum,
    Trait,
    Interface,
    Impl,
    Module,
    Import,
    Variable,
    Constant,
    TypeAlias,
    Macro,
    /// Key of a configuration or data file
    Key,
    /// Markdown heading and the text under it
    Section,
}

impl SymbolKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SymbolKind::Function => "function",
            SymbolKind::Method => "method",
            SymbolKind::Class => "class",
            SymbolKind::Struct => "struct",
            SymbolKind::Enum => "enum",
            SymbolKind::Trait => "trait",
            SymbolKind::Interface => "interface",
            SymbolKind::Impl => "impl",
            SymbolKind::Module => "module",
            SymbolKind::Import => "import",
            SymbolKind::Variable => "variable",
            SymbolKind::Constant => "constant",
            SymbolKind::TypeAlias => "type_alias",
            SymbolKind::Macro => "macro",
            SymbolKind::Key => "key",
            SymbolKind::Section => "section",
        }
    }

    /// Kinds that can be the target of a call or inheritance reference.
    pub fn is_referenceable(self) -> bool {
        !matches!(
            self,
            SymbolKind::Import | SymbolKind::Impl | SymbolKind::Key | SymbolKind::Section
        )
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structural metadata for one indexed file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: FileId,
    /// Workspace-relative path
    pub path: PathBuf,
    pub language: Language,
    /// xxh3 of the content that was last indexed
    pub content_hash: u64,
    pub indexed_at: DateTime<Utc>,
    pub size_bytes: usize,
    pub line_count: usize,
    /// Set when the syntax tree held ERROR nodes at index time
    pub syntax_errors: bool,
    /// Set when a writer invalidated the record; next access re-indexes
    pub dirty: bool,
}

impl FileRecord {
    /// A record is stale when its recorded hash differs from the live hash.
    pub fn is_stale_against(&self, live_hash: u64) -> bool {
        self.dirty || self.content_hash != live_hash
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub id: SymbolId,
    pub kind: SymbolKind,
    pub name: String,
    /// Dotted path through enclosing symbols, e.g. `Parser.parse`
    pub qualified_name: String,
    pub file: FileId,
    pub path: PathBuf,
    pub span: Span,
    pub signature: String,
    /// Leading comment block immediately above the symbol
    pub doc_span: Option<Span>,
    /// False when the leading comment block also trails a preceding sibling
    pub doc_exclusive: bool,
    pub parent: Option<SymbolId>,
}

impl Symbol {
    /// Name of the enclosing scope, if nested.
    pub fn container(&self) -> Option<&str> {
        self.qualified_name
            .rsplit_once('.')
            .map(|(container, _)| container)
    }
}
