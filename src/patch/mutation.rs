use crate::index::model::Span;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

/// What the bytes under a mutation must be before it applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditVerification {
    /// Exact text match required
    ExactMatch(String),
    /// xxh3 hash of the expected text, used for spans over 1 KiB
    Hash(u64),
}

impl EditVerification {
    pub fn from_text(text: &str) -> Self {
        if text.len() > 1024 {
            EditVerification::Hash(xxh3_64(text.as_bytes()))
        } else {
            EditVerification::ExactMatch(text.to_string())
        }
    }

    pub fn matches(&self, text: &str) -> bool {
        match self {
            EditVerification::ExactMatch(expected) => text == expected,
            EditVerification::Hash(expected) => xxh3_64(text.as_bytes()) == *expected,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MutationError {
    #[error("[{edit_id}] bytes at {span} in {file} no longer match the pre-image")]
    BeforeTextMismatch {
        edit_id: String,
        file: PathBuf,
        span: Span,
    },

    #[error("[{edit_id}] span {span} is invalid for {file} ({len} bytes)")]
    InvalidRange {
        edit_id: String,
        file: PathBuf,
        span: Span,
        len: usize,
    },

    #[error("mutations `{first}` and `{second}` overlap")]
    Overlap { first: String, second: String },
}

/// Byte-span replacement with verification. Every patch compiles down to
/// one of these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[must_use = "a mutation does nothing until applied"]
pub struct TextMutation {
    pub edit_id: String,
    pub file: PathBuf,
    pub span: Span,
    pub new_text: String,
    pub expected_before: EditVerification,
}

impl TextMutation {
    pub fn new(
        edit_id: impl Into<String>,
        file: impl Into<PathBuf>,
        span: Span,
        new_text: impl Into<String>,
        expected_before: &str,
    ) -> Self {
        Self {
            edit_id: edit_id.into(),
            file: file.into(),
            span,
            new_text: new_text.into(),
            expected_before: EditVerification::from_text(expected_before),
        }
    }

    pub fn is_insert(&self) -> bool {
        self.span.is_empty()
    }

    /// Check the span against `content`.
    pub fn verify(&self, content: &str) -> Result<(), MutationError> {
        let Span { start, end } = self.span;
        if start > end
            || end > content.len()
            || !content.is_char_boundary(start)
            || !content.is_char_boundary(end)
        {
            return Err(MutationError::InvalidRange {
                edit_id: self.edit_id.clone(),
                file: self.file.clone(),
                span: self.span,
                len: content.len(),
            });
        }
        if !self.expected_before.matches(&content[start..end]) {
            return Err(MutationError::BeforeTextMismatch {
                edit_id: self.edit_id.clone(),
                file: self.file.clone(),
                span: self.span,
            });
        }
        Ok(())
    }

    /// Size change this mutation causes.
    pub fn delta(&self) -> isize {
        self.new_text.len() as isize - self.span.len() as isize
    }
}

/// Apply non-overlapping mutations of one file's `content`, bottom to top.
///
/// Every mutation is verified against the original content first. Inserts
/// at the same offset keep their slice order, and an insert at the start of
/// a replaced span lands before the replacement.
pub fn apply_mutations(content: &str, mutations: &[TextMutation]) -> Result<String, MutationError> {
    for mutation in mutations {
        mutation.verify(content)?;
    }

    let mut order: Vec<usize> = (0..mutations.len()).collect();
    order.sort_by(|&a, &b| {
        let (ma, mb) = (&mutations[a], &mutations[b]);
        mb.span
            .start
            .cmp(&ma.span.start)
            .then(mb.span.end.cmp(&ma.span.end))
            .then(b.cmp(&a))
    });

    for pair in order.windows(2) {
        let (later, earlier) = (&mutations[pair[0]], &mutations[pair[1]]);
        if earlier.span.end > later.span.start {
            return Err(MutationError::Overlap {
                first: earlier.edit_id.clone(),
                second: later.edit_id.clone(),
            });
        }
    }

    let mut out = content.to_string();
    for index in order {
        let mutation = &mutations[index];
        out.replace_range(mutation.span.start..mutation.span.end, &mutation.new_text);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mutation(id: &str, content: &str, start: usize, end: usize, new_text: &str) -> TextMutation {
        TextMutation::new(id, "f.txt", Span::new(start, end), new_text, &content[start..end])
    }

    #[test]
    fn verification_switches_to_hash_above_one_kib() {
        assert!(matches!(
            EditVerification::from_text("small"),
            EditVerification::ExactMatch(_)
        ));
        let large = "x".repeat(2000);
        let verify = EditVerification::from_text(&large);
        assert!(matches!(verify, EditVerification::Hash(_)));
        assert!(verify.matches(&large));
        assert!(!verify.matches("x"));
    }

    #[test]
    fn applies_bottom_to_top() {
        let content = "one two three";
        let out = apply_mutations(
            content,
            &[
                mutation("a", content, 0, 3, "1"),
                mutation("b", content, 8, 13, "3"),
            ],
        )
        .unwrap();
        assert_eq!(out, "1 two 3");
    }

    #[test]
    fn same_point_inserts_keep_order() {
        let content = "ab";
        let out = apply_mutations(
            content,
            &[
                mutation("first", content, 1, 1, "X"),
                mutation("second", content, 1, 1, "Y"),
                mutation("replace", content, 1, 2, "B"),
            ],
        )
        .unwrap();
        assert_eq!(out, "aXYB");
    }

    #[test]
    fn overlap_is_refused() {
        let content = "abcdef";
        let err = apply_mutations(
            content,
            &[mutation("a", content, 0, 4, ""), mutation("b", content, 2, 6, "")],
        )
        .unwrap_err();
        assert!(matches!(err, MutationError::Overlap { .. }));
    }

    #[test]
    fn stale_pre_image_is_refused() {
        let m = TextMutation::new("a", "f.txt", Span::new(0, 3), "x", "abc");
        assert!(matches!(
            m.verify("xyz"),
            Err(MutationError::BeforeTextMismatch { .. })
        ));
        assert!(matches!(
            m.verify("ab"),
            Err(MutationError::InvalidRange { .. })
        ));
    }

    #[test]
    fn split_characters_are_refused() {
        let m = TextMutation::new("a", "f.txt", Span::new(0, 1), "", "h");
        assert!(m.verify("héllo").is_ok());
        let m = TextMutation::new("b", "f.txt", Span::new(1, 2), "", "\u{e9}");
        assert!(matches!(
            m.verify("héllo"),
            Err(MutationError::InvalidRange { .. })
        ));
    }
}
