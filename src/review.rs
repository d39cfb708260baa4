//! Review reports handed to whoever accepts or rejects a transaction.

use crate::anchor::RejectedEdit;
use crate::errors::{ApplyError, ConflictError, OverlapConflict};
use crate::index::model::{hash_hex, path_key};
use crate::transaction::{StagedFile, Transaction, TxState};
use serde::Serialize;
use similar::TextDiff;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileReview {
    pub path: PathBuf,
    pub before_hash: String,
    pub after_hash: String,
    pub edits: Vec<String>,
    /// Unified diff, empty when the content is unchanged
    pub diff: String,
}

impl FileReview {
    pub fn from_staged(file: &StagedFile) -> Self {
        Self {
            path: file.path.clone(),
            before_hash: hash_hex(file.before_hash),
            after_hash: hash_hex(file.after_hash),
            edits: file.edits.clone(),
            diff: unified_diff(&path_key(&file.path), &file.before, &file.after),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedReview {
    pub edit_id: String,
    pub code: String,
    pub message: String,
}

impl From<&RejectedEdit> for RejectedReview {
    fn from(rejected: &RejectedEdit) -> Self {
        Self {
            edit_id: rejected.edit_id.clone(),
            code: rejected.error.code().to_string(),
            message: rejected.error.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReview {
    pub code: String,
    pub message: String,
}

impl From<&ConflictError> for ErrorReview {
    fn from(error: &ConflictError) -> Self {
        Self {
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }
}

impl From<&ApplyError> for ErrorReview {
    fn from(error: &ApplyError) -> Self {
        Self {
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewReport {
    pub tx_id: String,
    pub state: TxState,
    pub files: Vec<FileReview>,
    pub rejected: Vec<RejectedReview>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub conflicts: Vec<OverlapConflict>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReview>,
}

impl ReviewReport {
    pub fn new(tx: &Transaction, rejected: &[RejectedEdit]) -> Self {
        Self {
            tx_id: tx.id().to_string(),
            state: tx.state(),
            files: tx.files().iter().map(FileReview::from_staged).collect(),
            rejected: rejected.iter().map(RejectedReview::from).collect(),
            conflicts: tx.conflicts().to_vec(),
            error: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<ErrorReview>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty() && self.conflicts.is_empty() && self.error.is_none()
    }
}

/// Unified diff with three lines of context and `a/`, `b/` headers.
pub fn unified_diff(path: &str, before: &str, after: &str) -> String {
    if before == after {
        return String::new();
    }
    TextDiff::from_lines(before, after)
        .unified_diff()
        .context_radius(3)
        .header(&format!("a/{path}"), &format!("b/{path}"))
        .to_string()
}
