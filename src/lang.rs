//! Language tags for indexed files.
//!
//! The tag is decided once, from the file extension, when a file record is
//! created. Everything downstream dispatches on the tag; grammars come from
//! the built-in `SupportLang` set of ast-grep-language. Configuration and
//! markup formats have no grammar; their keys and headings are extracted by
//! a dedicated parser.

pub use ast_grep_language::SupportLang;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    Rust,
    Python,
    JavaScript,
    TypeScript,
    Tsx,
    Go,
    Java,
    Json,
    Toml,
    Yaml,
    Markdown,
    PlainText,
}

impl Language {
    /// Detect the language of a path from its extension.
    ///
    /// Unknown extensions are tracked as plain text so staleness and fuzzy
    /// anchors still work on them.
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("rs") => Language::Rust,
            Some("py") | Some("pyi") => Language::Python,
            Some("js") | Some("jsx") | Some("mjs") | Some("cjs") => Language::JavaScript,
            Some("ts") | Some("mts") | Some("cts") => Language::TypeScript,
            Some("tsx") => Language::Tsx,
            Some("go") => Language::Go,
            Some("java") => Language::Java,
            Some("json") => Language::Json,
            Some("toml") => Language::Toml,
            Some("yaml") | Some("yml") => Language::Yaml,
            Some("md") | Some("markdown") => Language::Markdown,
            _ => Language::PlainText,
        }
    }

    /// The tree-sitter grammar backing this language, if any.
    pub fn grammar(self) -> Option<SupportLang> {
        match self {
            Language::Rust => Some(SupportLang::Rust),
            Language::Python => Some(SupportLang::Python),
            Language::JavaScript => Some(SupportLang::JavaScript),
            Language::TypeScript => Some(SupportLang::TypeScript),
            Language::Tsx => Some(SupportLang::Tsx),
            Language::Go => Some(SupportLang::Go),
            Language::Java => Some(SupportLang::Java),
            Language::Json
            | Language::Toml
            | Language::Yaml
            | Language::Markdown
            | Language::PlainText => None,
        }
    }

    /// Configuration and markup formats indexed by key or heading.
    pub fn is_data(self) -> bool {
        matches!(
            self,
            Language::Json | Language::Toml | Language::Yaml | Language::Markdown
        )
    }

    /// Line prefixes that start a comment line in this language.
    pub fn comment_prefixes(self) -> &'static [&'static str] {
        match self {
            Language::Python | Language::Toml | Language::Yaml => &["#"],
            Language::Json | Language::Markdown | Language::PlainText => &[],
            _ => &["//", "/*", "*"],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Language::Rust => "rust",
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Tsx => "tsx",
            Language::Go => "go",
            Language::Java => "java",
            Language::Json => "json",
            Language::Toml => "toml",
            Language::Yaml => "yaml",
            Language::Markdown => "markdown",
            Language::PlainText => "text",
        }
    }

    pub const ALL: [Language; 12] = [
        Language::Rust,
        Language::Python,
        Language::JavaScript,
        Language::TypeScript,
        Language::Tsx,
        Language::Go,
        Language::Java,
        Language::Json,
        Language::Toml,
        Language::Yaml,
        Language::Markdown,
        Language::PlainText,
    ];
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
