//! Proposed edits as they arrive from a planner, and the resolved patches
//! the anchor resolver turns them into.

use crate::index::model::{FileId, Span};
use crate::index::SymbolDescriptor;
use crate::lang::Language;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditOp {
    InsertBefore,
    InsertAfter,
    Replace,
    Delete,
}

impl EditOp {
    pub fn as_str(self) -> &'static str {
        match self {
            EditOp::InsertBefore => "insert_before",
            EditOp::InsertAfter => "insert_after",
            EditOp::Replace => "replace",
            EditOp::Delete => "delete",
        }
    }

    pub fn is_insert(self) -> bool {
        matches!(self, EditOp::InsertBefore | EditOp::InsertAfter)
    }

    pub fn takes_payload(self) -> bool {
        self != EditOp::Delete
    }
}

impl fmt::Display for EditOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an edit applies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetDescriptor {
    Symbol(SymbolDescriptor),
    /// Approximate text of the region, as the planner remembers it.
    Anchor {
        file: PathBuf,
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        context_before: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        context_after: Option<String>,
    },
    Span {
        file: PathBuf,
        start: usize,
        end: usize,
    },
}

impl TargetDescriptor {
    pub fn kind(&self) -> &'static str {
        match self {
            TargetDescriptor::Symbol(_) => "symbol",
            TargetDescriptor::Anchor { .. } => "anchor",
            TargetDescriptor::Span { .. } => "span",
        }
    }

    /// File named directly by the descriptor, if any.
    pub fn file(&self) -> Option<&PathBuf> {
        match self {
            TargetDescriptor::Symbol(descriptor) => descriptor.file(),
            TargetDescriptor::Anchor { file, .. } | TargetDescriptor::Span { file, .. } => {
                Some(file)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditFlags {
    /// Replace also covers the symbol's attached doc comment.
    pub include_doc: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedEdit {
    #[serde(default)]
    pub id: String,
    pub op: EditOp,
    pub target: TargetDescriptor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    #[serde(default)]
    pub flags: EditFlags,
    /// Opaque planner metadata, passed through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

impl ProposedEdit {
    pub fn new(id: impl Into<String>, op: EditOp, target: TargetDescriptor) -> Self {
        Self {
            id: id.into(),
            op,
            target,
            payload: None,
            flags: EditFlags::default(),
            meta: None,
        }
    }

    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    pub fn with_flags(mut self, flags: EditFlags) -> Self {
        self.flags = flags;
        self
    }
}

/// An edit pinned to exact bytes of one file version.
///
/// Valid only while the bytes at `span` still equal `pre_image`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedPatch {
    pub edit_id: String,
    /// Workspace-relative path
    pub file: PathBuf,
    pub file_id: FileId,
    pub language: Language,
    pub op: EditOp,
    pub span: Span,
    pub pre_image: String,
    pub payload: Option<String>,
    pub flags: EditFlags,
    /// Doc comment block directly above a symbol target
    pub attached_doc: Option<Span>,
    /// False when that block also trails a preceding sibling
    pub doc_exclusive: bool,
    /// Set when the span is a whole symbol from the index
    pub structural: bool,
    /// Hash of the whole file content the span was resolved against
    pub base_hash: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edit_json_forms() {
        let json = r#"[
            {"id": "e1", "op": "delete", "target": {"symbol": {"name": "validate_x", "file": "utils.py"}}},
            {"id": "e2", "op": "replace",
             "target": {"anchor": {"file": "utils.py", "text": "return a", "context_before": "def b():"}},
             "payload": "return b", "meta": {"confidence": 0.4}},
            {"id": "e3", "op": "insert_after", "target": {"span": {"file": "utils.py", "start": 0, "end": 4}},
             "payload": "x", "flags": {"include_doc": true}}
        ]"#;
        let edits: Vec<ProposedEdit> = serde_json::from_str(json).unwrap();

        assert_eq!(
            edits[0].target,
            TargetDescriptor::Symbol(SymbolDescriptor::in_file("validate_x", "utils.py"))
        );
        assert!(matches!(
            &edits[1].target,
            TargetDescriptor::Anchor { context_before: Some(c), context_after: None, .. } if c == "def b():"
        ));
        assert_eq!(edits[1].meta, Some(serde_json::json!({"confidence": 0.4})));
        assert_eq!(edits[2].target.kind(), "span");
        assert!(edits[2].flags.include_doc);
        assert_eq!(edits[2].target.file(), Some(&PathBuf::from("utils.py")));
    }

    #[test]
    fn op_payload_rules() {
        assert!(!EditOp::Delete.takes_payload());
        assert!(EditOp::InsertBefore.is_insert());
        assert!(!EditOp::Replace.is_insert());
    }
}
