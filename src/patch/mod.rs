//! Turns resolved patches into verified text mutations.
//!
//! Everything outside the mutation's span is left byte-for-byte intact.
//! Structural deletes widen the span to whole lines, the symbol's own doc
//! block and one trailing blank-line run; nothing else is inferred.

mod mutation;
pub mod syntax;

pub use mutation::{apply_mutations, EditVerification, MutationError, TextMutation};
pub use syntax::SyntaxGuard;

use crate::index::model::Span;
use crate::proposal::{EditOp, ResolvedPatch};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineEnding {
    Lf,
    CrLf,
}

impl LineEnding {
    /// Majority style of `content`'s line terminators; `\n` when tied or none.
    pub fn detect(content: &str) -> Self {
        let total = content.matches('\n').count();
        let crlf = content.matches("\r\n").count();
        if crlf * 2 > total {
            LineEnding::CrLf
        } else {
            LineEnding::Lf
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::CrLf => "\r\n",
        }
    }

    /// Rewrite every line terminator in `text` to this style.
    pub fn apply(self, text: &str) -> String {
        let unified = text.replace("\r\n", "\n");
        match self {
            LineEnding::Lf => unified,
            LineEnding::CrLf => unified.replace('\n', "\r\n"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PatchEngine;

impl PatchEngine {
    pub fn new() -> Self {
        Self
    }

    /// Build the mutation for `patch` against the file's current `content`.
    ///
    /// Fails when the pre-image no longer sits at the patch span.
    pub fn build(&self, patch: &ResolvedPatch, content: &str) -> Result<TextMutation, MutationError> {
        let check = TextMutation::new(
            &patch.edit_id,
            &patch.file,
            patch.span,
            String::new(),
            &patch.pre_image,
        );
        check.verify(content)?;

        let eol = LineEnding::detect(content);
        let payload = patch.payload.as_deref().map(|p| eol.apply(p)).unwrap_or_default();

        let (span, new_text) = match patch.op {
            EditOp::InsertBefore => {
                let boundary = match patch.attached_doc {
                    Some(doc) if patch.doc_exclusive => doc.start,
                    _ => patch.span.start,
                };
                let at = line_start(content, boundary);
                let text = format!("{}{}", trim_eol(&payload), eol.as_str());
                (Span::new(at, at), text)
            }
            EditOp::InsertAfter => {
                let at = patch.span.end;
                let text = format!("{}{}", eol.as_str(), trim_eol(&payload));
                (Span::new(at, at), text)
            }
            EditOp::Replace => {
                let span = match patch.attached_doc {
                    Some(doc) if patch.flags.include_doc => Span::new(doc.start, patch.span.end),
                    _ => patch.span,
                };
                let text = align_trailing_eol(&content[span.start..span.end], &payload, eol);
                (span, text)
            }
            EditOp::Delete if patch.structural => (structural_delete_span(patch, content), String::new()),
            EditOp::Delete => (patch.span, String::new()),
        };

        let mutation = TextMutation::new(
            &patch.edit_id,
            &patch.file,
            span,
            new_text,
            &content[span.start..span.end],
        );
        tracing::trace!(
            edit = %patch.edit_id,
            op = %patch.op,
            span = %mutation.span,
            delta = mutation.delta(),
            "built mutation"
        );
        Ok(mutation)
    }
}

/// Widen a symbol's span to everything a clean removal takes with it:
/// its exclusive doc block, leading indentation, the rest of its last line,
/// and one blank-line run (trailing, or leading when the symbol ends the file).
fn structural_delete_span(patch: &ResolvedPatch, content: &str) -> Span {
    let mut start = match patch.attached_doc {
        Some(doc) if patch.doc_exclusive => doc.start.min(patch.span.start),
        _ => patch.span.start,
    };
    let mut end = patch.span.end;

    let ls = line_start(content, start);
    let whole_first_line = content[ls..start].trim().is_empty();
    if whole_first_line {
        start = ls;
    }

    let le = line_end(content, end);
    if content[end..le].trim().is_empty() {
        end = le;
        let after_blank = skip_blank_lines(content, end);
        if after_blank > end {
            end = after_blank;
        } else if end == content.len() && whole_first_line {
            start = back_over_blank_lines(content, start);
        }
    }

    Span::new(start, end)
}

/// Offset of the first byte of the line containing `pos`.
fn line_start(content: &str, pos: usize) -> usize {
    content[..pos].rfind('\n').map_or(0, |i| i + 1)
}

/// Offset just past the line terminator of the line containing `pos`.
fn line_end(content: &str, pos: usize) -> usize {
    content[pos..]
        .find('\n')
        .map_or(content.len(), |i| pos + i + 1)
}

/// Skip whole whitespace-only lines starting at line start `pos`.
fn skip_blank_lines(content: &str, mut pos: usize) -> usize {
    while pos < content.len() {
        let next = line_end(content, pos);
        if !content[pos..next].trim().is_empty() || !content[pos..next].ends_with('\n') {
            break;
        }
        pos = next;
    }
    pos
}

/// Step back over whole whitespace-only lines ending at line start `pos`.
fn back_over_blank_lines(content: &str, mut pos: usize) -> usize {
    while pos > 0 {
        let prev = line_start(content, pos - 1);
        if !content[prev..pos].trim().is_empty() {
            break;
        }
        pos = prev;
    }
    pos
}

fn trim_eol(text: &str) -> &str {
    text.strip_suffix("\r\n")
        .or_else(|| text.strip_suffix('\n'))
        .unwrap_or(text)
}

/// Make the replacement end with a line terminator exactly when the text it
/// replaces did.
fn align_trailing_eol(replaced: &str, payload: &str, eol: LineEnding) -> String {
    let trimmed = trim_eol(payload);
    if replaced.ends_with('\n') && !trimmed.is_empty() {
        format!("{trimmed}{}", eol.as_str())
    } else {
        trimmed.to_string()
    }
}
