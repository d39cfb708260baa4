//! Thread-local parser pooling.
//!
//! Each worker thread keeps one [`TreeParser`] per language, created on first
//! use and reused afterwards.

use super::tree::TreeParser;
use crate::errors::ParseError;
use crate::lang::Language;
use std::cell::RefCell;
use std::collections::hash_map::Entry;
use std::collections::HashMap;

thread_local! {
    static PARSERS: RefCell<HashMap<Language, TreeParser>> = RefCell::new(HashMap::new());
}

/// Run `f` with this thread's pooled parser for `language`.
pub fn with_parser<F, R>(language: Language, f: F) -> Result<R, ParseError>
where
    F: FnOnce(&mut TreeParser) -> R,
{
    PARSERS.with(|cell| {
        let mut parsers = cell.borrow_mut();
        let parser = match parsers.entry(language) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(TreeParser::new(language)?),
        };
        Ok(f(parser))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reuses_parser_per_language() {
        let kind = with_parser(Language::Go, |p| {
            p.parse("package main\n").map(|t| t.root_node().kind().to_string())
        })
        .unwrap();
        assert_eq!(kind.as_deref(), Some("source_file"));

        let again = with_parser(Language::Go, |p| p.language()).unwrap();
        assert_eq!(again, Language::Go);
    }

    #[test]
    fn plain_text_is_rejected() {
        let err = with_parser(Language::PlainText, |_| ()).unwrap_err();
        assert!(matches!(err, ParseError::Grammar { .. }));
    }
}
