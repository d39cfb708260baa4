use crate::errors::ParseError;
use crate::lang::Language;
use crate::parser::pool;
use crate::parser::ConfigKeyParser;
use crate::parser::tree::{error_nodes, ErrorNode};
use std::path::Path;

/// Compares tree-sitter error counts before and after a change.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyntaxGuard;

impl SyntaxGuard {
    /// Number of syntax errors `after` has beyond those already in `before`.
    ///
    /// JSON and TOML count one error when a valid document stops parsing.
    /// Other files without a grammar never regress.
    pub fn introduced_errors(
        path: &Path,
        language: Language,
        before: &str,
        after: &str,
    ) -> Result<usize, ParseError> {
        if language.grammar().is_none() {
            let broke = ConfigKeyParser::is_valid(language, before)
                && !ConfigKeyParser::is_valid(language, after);
            if broke {
                tracing::debug!(path = %path.display(), language = language.as_str(), "document no longer parses");
            }
            return Ok(usize::from(broke));
        }
        let (old, new) = pool::with_parser(language, |parser| {
            let old = parser.parse(before).map(|t| error_nodes(&t));
            let new = parser.parse(after).map(|t| error_nodes(&t));
            (old, new)
        })?;
        let unparseable = || ParseError::Unparseable {
            path: path.to_path_buf(),
            reason: "tree-sitter returned no tree".into(),
        };
        let old = old.ok_or_else(unparseable)?;
        let new = new.ok_or_else(unparseable)?;

        let introduced = regressions(&old, &new);
        if introduced > 0 {
            tracing::debug!(
                path = %path.display(),
                language = language.as_str(),
                before = old.len(),
                after = new.len(),
                "syntax regression"
            );
        }
        Ok(introduced)
    }
}

fn regressions(old: &[ErrorNode], new: &[ErrorNode]) -> usize {
    new.len().saturating_sub(old.len())
}
