//! Error taxonomy shared across the indexing, resolution and transaction layers.
//!
//! Parse and resolution errors are per-file / per-edit and never abort a batch.
//! Conflict and apply errors abort a whole transaction.

use crate::index::model::Span;
use crate::lang::Language;
use crate::patch::MutationError;
use crate::safety::SafetyError;
use std::path::PathBuf;
use thiserror::Error;

/// Failure to extract structure from one file.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("no grammar available for {language}")]
    Grammar { language: Language },

    #[error("unparseable source in {path}: {reason}")]
    Unparseable { path: PathBuf, reason: String },

    #[error("{path} is {size} bytes, above the {limit} byte limit")]
    TooLarge {
        path: PathBuf,
        size: usize,
        limit: usize,
    },

    #[error("{path} is not valid UTF-8")]
    NotUtf8 { path: PathBuf },
}

impl ParseError {
    pub fn code(&self) -> &'static str {
        match self {
            ParseError::Grammar { .. } => "grammar_unavailable",
            ParseError::Unparseable { .. } => "unparseable",
            ParseError::TooLarge { .. } => "too_large",
            ParseError::NotUtf8 { .. } => "not_utf8",
        }
    }
}

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Safety(#[from] SafetyError),

    #[error("indexing of {path} was cancelled before commit")]
    Cancelled { path: PathBuf },

    #[error("{path} is not indexed")]
    NotIndexed { path: PathBuf },

    #[error("failed to build indexing pool: {0}")]
    Pool(String),
}

impl IndexError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        IndexError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Per-edit failure to map a target descriptor onto live content.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResolutionError {
    #[error("[{edit_id}] symbol not found: {descriptor}")]
    SymbolNotFound { edit_id: String, descriptor: String },

    #[error("[{edit_id}] symbol `{name}` is ambiguous: {}", .candidates.join(", "))]
    SymbolAmbiguous {
        edit_id: String,
        name: String,
        candidates: Vec<String>,
    },

    #[error("[{edit_id}] span {span} is out of range for {file} ({len} bytes)")]
    SpanOutOfRange {
        edit_id: String,
        file: PathBuf,
        span: Span,
        len: usize,
    },

    #[error("[{edit_id}] anchor not found in {file} (best score {best_score:.3})")]
    AnchorNotFound {
        edit_id: String,
        file: PathBuf,
        best_score: f64,
    },

    #[error("[{edit_id}] anchor is ambiguous in {file}: {} candidates near score {score:.3}", .candidates.len())]
    AnchorAmbiguous {
        edit_id: String,
        file: PathBuf,
        score: f64,
        candidates: Vec<Span>,
    },

    #[error("[{edit_id}] file not available for resolution: {file}")]
    FileNotFound { edit_id: String, file: PathBuf },

    #[error("[{edit_id}] resolution was cancelled")]
    Cancelled { edit_id: String },
}

impl ResolutionError {
    pub fn code(&self) -> &'static str {
        match self {
            ResolutionError::SymbolNotFound { .. } => "symbol_not_found",
            ResolutionError::SymbolAmbiguous { .. } => "symbol_ambiguous",
            ResolutionError::SpanOutOfRange { .. } => "span_out_of_range",
            ResolutionError::AnchorNotFound { .. } => "anchor_not_found",
            ResolutionError::AnchorAmbiguous { .. } => "anchor_ambiguous",
            ResolutionError::FileNotFound { .. } => "file_not_found",
            ResolutionError::Cancelled { .. } => "cancelled",
        }
    }

    pub fn edit_id(&self) -> &str {
        match self {
            ResolutionError::SymbolNotFound { edit_id, .. }
            | ResolutionError::SymbolAmbiguous { edit_id, .. }
            | ResolutionError::SpanOutOfRange { edit_id, .. }
            | ResolutionError::AnchorNotFound { edit_id, .. }
            | ResolutionError::AnchorAmbiguous { edit_id, .. }
            | ResolutionError::FileNotFound { edit_id, .. }
            | ResolutionError::Cancelled { edit_id } => edit_id,
        }
    }
}

/// A pair of patches in one file whose spans collide.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct OverlapConflict {
    pub file: PathBuf,
    pub first_edit: String,
    pub second_edit: String,
}

/// Blocks staging of a whole transaction.
#[derive(Error, Debug)]
pub enum ConflictError {
    #[error("overlapping edits: {}", describe_overlaps(.conflicts))]
    Overlap { conflicts: Vec<OverlapConflict> },

    #[error("stale source: {file} changed since edit `{edit_id}` was resolved")]
    StaleSource { file: PathBuf, edit_id: String },

    #[error("edit `{edit_id}` introduces {count} new syntax error(s) in {file}")]
    SyntaxRegression {
        file: PathBuf,
        edit_id: String,
        count: usize,
    },

    #[error("edit `{edit_id}` could not be built: {source}")]
    Build {
        edit_id: String,
        #[source]
        source: MutationError,
    },

    #[error("cannot read {file} while staging: {source}")]
    Io {
        file: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Safety(#[from] SafetyError),

    #[error("transaction has no patches")]
    Empty,

    #[error("transaction {tx_id} is {state} and cannot be staged")]
    InvalidState { tx_id: String, state: String },
}

impl ConflictError {
    pub fn code(&self) -> &'static str {
        match self {
            ConflictError::Overlap { .. } => "overlap_conflict",
            ConflictError::StaleSource { .. } => "stale_source",
            ConflictError::SyntaxRegression { .. } => "syntax_regression",
            ConflictError::Build { .. } => "build_failed",
            ConflictError::Io { .. } => "io_error",
            ConflictError::Safety(_) => "unsafe_path",
            ConflictError::Empty => "empty_transaction",
            ConflictError::InvalidState { .. } => "invalid_state",
        }
    }
}

fn describe_overlaps(conflicts: &[OverlapConflict]) -> String {
    conflicts
        .iter()
        .map(|c| {
            format!(
                "`{}` and `{}` in {}",
                c.first_edit,
                c.second_edit,
                c.file.display()
            )
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// Failure while applying or rolling back a staged transaction.
#[derive(Error, Debug)]
pub enum ApplyError {
    #[error("transaction {tx_id} is {state}, expected {expected}")]
    InvalidState {
        tx_id: String,
        state: String,
        expected: &'static str,
    },

    #[error("project is locked by another transaction ({lock})")]
    Locked { lock: PathBuf },

    #[error("stale source: {file} changed after staging")]
    Stale { file: PathBuf },

    #[error("snapshot failed for {tx_id}: {source}")]
    Snapshot {
        tx_id: String,
        #[source]
        source: std::io::Error,
    },

    #[error("write to {file} failed ({restored} file(s) restored): {source}")]
    Write {
        file: PathBuf,
        restored: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("restore from snapshot failed for {file}: {source}")]
    RestoreFailed {
        file: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A write failed and at least one already written file could not be
    /// put back. The snapshot is kept so `rollback` can finish the job.
    #[error(
        "write to {file} failed and {} file(s) could not be restored; snapshot kept at {snapshot}: {source}",
        .unrestored.len()
    )]
    RestoreIncomplete {
        tx_id: String,
        file: PathBuf,
        #[source]
        source: std::io::Error,
        unrestored: Vec<PathBuf>,
        snapshot: PathBuf,
    },

    #[error("unknown transaction: {tx_id}")]
    UnknownTransaction { tx_id: String },

    #[error("corrupt manifest for {tx_id}: {message}")]
    Manifest { tx_id: String, message: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Safety(#[from] SafetyError),
}

impl ApplyError {
    pub fn code(&self) -> &'static str {
        match self {
            ApplyError::InvalidState { .. } => "invalid_state",
            ApplyError::Locked { .. } => "locked",
            ApplyError::Stale { .. } => "stale_source",
            ApplyError::Snapshot { .. } => "snapshot_failed",
            ApplyError::Write { .. } => "write_failed",
            ApplyError::RestoreFailed { .. } => "restore_failed",
            ApplyError::RestoreIncomplete { .. } => "restore_incomplete",
            ApplyError::UnknownTransaction { .. } => "unknown_transaction",
            ApplyError::Manifest { .. } => "corrupt_manifest",
            ApplyError::Io { .. } => "io_error",
            ApplyError::Safety(_) => "unsafe_path",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_codes_are_stable() {
        let err = ResolutionError::AnchorAmbiguous {
            edit_id: "e1".into(),
            file: PathBuf::from("a.py"),
            score: 0.9,
            candidates: vec![Span::new(0, 4), Span::new(10, 14)],
        };
        assert_eq!(err.code(), "anchor_ambiguous");
        assert_eq!(err.edit_id(), "e1");
        assert!(err.to_string().contains("2 candidates"));
    }

    #[test]
    fn overlap_message_names_both_edits() {
        let err = ConflictError::Overlap {
            conflicts: vec![OverlapConflict {
                file: PathBuf::from("utils.py"),
                first_edit: "one".into(),
                second_edit: "two".into(),
            }],
        };
        let msg = err.to_string();
        assert!(msg.contains("`one`"));
        assert!(msg.contains("`two`"));
        assert_eq!(err.code(), "overlap_conflict");
    }
}
