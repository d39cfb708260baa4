//! Reading proposed-edit batches: JSON documents and SEARCH/REPLACE blocks.
//!
//! ```text
//! src/utils.py
//! <<<<<<< SEARCH
//! def old():
//!     pass
//! =======
//! def new():
//!     pass
//! >>>>>>> REPLACE
//! ```
//!
//! Each block becomes a fuzzy-anchor `replace` on the named file, or a
//! `delete` when the replace side is empty. A SEARCH side holding
//! `<ELLIPSIS>` names a declaration by its header instead, and the edit
//! targets that symbol's whole block:
//!
//! ```text
//! src/utils.py
//! <<<<<<< SEARCH
//! def old():
//! <ELLIPSIS>
//! =======
//! >>>>>>> REPLACE
//! ```

use crate::index::SymbolDescriptor;
use crate::proposal::{EditOp, ProposedEdit, TargetDescriptor};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use thiserror::Error;

const SEARCH_MARKER: &str = "<<<<<<<";
const DIVIDER: &str = "=======";
const REPLACE_MARKER: &str = ">>>>>>>";
const ELLIPSIS: &str = "<ELLIPSIS>";

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("invalid edit batch JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed SEARCH/REPLACE block #{index}: {reason}")]
    MalformedBlock { index: usize, reason: &'static str },

    #[error("edit `{edit_id}` ({op}) requires a payload")]
    MissingPayload { edit_id: String, op: EditOp },

    #[error("edit `{edit_id}` is a delete and must not carry a payload")]
    UnexpectedPayload { edit_id: String },

    #[error("duplicate edit id `{edit_id}`")]
    DuplicateId { edit_id: String },

    #[error("edit `{edit_id}` has an empty anchor text")]
    EmptyAnchor { edit_id: String },

    #[error("edit `{edit_id}` names a symbol by an empty signature")]
    EmptySignature { edit_id: String },

    #[error("edit `{edit_id}` has an inverted span {start}..{end}")]
    InvertedSpan {
        edit_id: String,
        start: usize,
        end: usize,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EditBatch {
    pub edits: Vec<ProposedEdit>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BatchDocument {
    Wrapped(EditBatch),
    Bare(Vec<ProposedEdit>),
}

/// Blocks that parsed, plus the ones that did not.
#[derive(Debug, Default)]
pub struct BlockParse {
    pub batch: EditBatch,
    pub errors: Vec<BatchError>,
}

impl EditBatch {
    pub fn new(edits: Vec<ProposedEdit>) -> Self {
        let mut batch = Self { edits };
        batch.assign_ids();
        batch
    }

    /// Parse `{"edits": [...]}` or a bare array of edits.
    pub fn from_json(input: &str) -> Result<Self, BatchError> {
        let edits = match serde_json::from_str::<BatchDocument>(input)? {
            BatchDocument::Wrapped(batch) => batch.edits,
            BatchDocument::Bare(edits) => edits,
        };
        Ok(Self::new(edits))
    }

    /// Parse SEARCH/REPLACE blocks. A broken block is reported and skipped;
    /// the blocks after it still parse.
    pub fn from_blocks(input: &str) -> BlockParse {
        let mut parse = BlockParse::default();
        let mut edits = Vec::new();
        let mut path: Option<String> = None;
        let mut lines = input
            .lines()
            .filter(|line| !line.trim_start().starts_with("```"))
            .peekable();
        let mut index = 0;

        while let Some(line) = lines.next() {
            if !line.starts_with(SEARCH_MARKER) {
                if !line.trim().is_empty() {
                    path = Some(line.trim().to_string());
                }
                continue;
            }

            index += 1;
            let mut search = Vec::new();
            let mut replace = Vec::new();
            let mut in_replace = false;
            let mut closed = false;
            let mut interrupted = false;

            while let Some(next) = lines.peek() {
                if next.starts_with(SEARCH_MARKER) {
                    interrupted = true;
                    break;
                }
                let next = *next;
                lines.next();
                if next.starts_with(REPLACE_MARKER) {
                    closed = true;
                    break;
                }
                if next.trim_end() == DIVIDER && !in_replace {
                    in_replace = true;
                    continue;
                }
                if in_replace {
                    replace.push(next);
                } else {
                    search.push(next);
                }
            }

            let reason = if !in_replace {
                Some("missing ======= separator")
            } else if !closed {
                Some("missing >>>>>>> REPLACE terminator")
            } else if path.is_none() {
                Some("no file path before the block")
            } else if search.iter().all(|l| l.trim().is_empty()) {
                Some("empty SEARCH side")
            } else if search.iter().any(|l| l.contains(ELLIPSIS))
                && search.join("\n").replace(ELLIPSIS, "").trim().is_empty()
            {
                Some("<ELLIPSIS> without a signature")
            } else {
                None
            };
            if let Some(reason) = reason {
                tracing::warn!(index, reason, "skipping malformed block");
                parse.errors.push(BatchError::MalformedBlock { index, reason });
                // The path line of the block that interrupted this one was
                // swallowed as body text.
                let body = if in_replace { &replace } else { &search };
                path = if interrupted {
                    body.iter()
                        .rev()
                        .find(|l| !l.trim().is_empty())
                        .map(|l| l.trim().to_string())
                } else {
                    None
                };
                continue;
            }

            let Some(file) = path.take() else {
                continue;
            };
            let text = search.join("\n");
            let target = if text.contains(ELLIPSIS) {
                let signature = text.replace(ELLIPSIS, "").trim().to_string();
                tracing::debug!(index, %signature, "block deletes by signature");
                TargetDescriptor::Symbol(SymbolDescriptor::signature(signature, file))
            } else {
                TargetDescriptor::Anchor {
                    file: PathBuf::from(file),
                    text,
                    context_before: None,
                    context_after: None,
                }
            };
            let replacement = replace.join("\n");
            let edit = if replacement.trim().is_empty() {
                ProposedEdit::new(String::new(), EditOp::Delete, target)
            } else {
                ProposedEdit::new(String::new(), EditOp::Replace, target).with_payload(replacement)
            };
            edits.push(edit);
        }

        parse.batch = Self::new(edits);
        parse
    }

    /// Give every edit without an id a unique `edit-N`.
    pub fn assign_ids(&mut self) {
        let mut taken: HashSet<String> = self
            .edits
            .iter()
            .filter(|e| !e.id.is_empty())
            .map(|e| e.id.clone())
            .collect();
        let mut counter = 0;
        for edit in self.edits.iter_mut().filter(|e| e.id.is_empty()) {
            loop {
                counter += 1;
                let candidate = format!("edit-{counter}");
                if taken.insert(candidate.clone()) {
                    edit.id = candidate;
                    break;
                }
            }
        }
    }

    /// Every problem with the batch, in edit order.
    pub fn validate(&self) -> Vec<BatchError> {
        let mut issues = Vec::new();
        let mut seen = HashSet::new();

        for edit in &self.edits {
            if !seen.insert(edit.id.as_str()) {
                issues.push(BatchError::DuplicateId {
                    edit_id: edit.id.clone(),
                });
            }
            match (edit.op.takes_payload(), edit.payload.is_some()) {
                (true, false) => issues.push(BatchError::MissingPayload {
                    edit_id: edit.id.clone(),
                    op: edit.op,
                }),
                (false, true) => issues.push(BatchError::UnexpectedPayload {
                    edit_id: edit.id.clone(),
                }),
                _ => {}
            }
            match &edit.target {
                TargetDescriptor::Anchor { text, .. } if text.trim().is_empty() => {
                    issues.push(BatchError::EmptyAnchor {
                        edit_id: edit.id.clone(),
                    })
                }
                TargetDescriptor::Symbol(SymbolDescriptor::Signature { signature, .. })
                    if signature.trim().is_empty() =>
                {
                    issues.push(BatchError::EmptySignature {
                        edit_id: edit.id.clone(),
                    })
                }
                TargetDescriptor::Span { start, end, .. } if start > end => {
                    issues.push(BatchError::InvertedSpan {
                        edit_id: edit.id.clone(),
                        start: *start,
                        end: *end,
                    })
                }
                _ => {}
            }
        }
        issues
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }
}
