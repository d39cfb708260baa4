//! Maps proposed edits onto exact byte spans of one project snapshot.
//!
//! Symbol targets take the indexed span verbatim, explicit spans are
//! bounds-checked, and fuzzy anchors go through [`fuzzy::find`]. The
//! pre-image is always the live bytes, never the planner's text.

pub mod fuzzy;
pub mod snapshot;

pub use snapshot::{ProjectSnapshot, SnapshotFile};

use crate::cancel::CancellationToken;
use crate::config::AnchorConfig;
use crate::errors::ResolutionError;
use crate::index::model::{path_key, Span, Symbol};
use crate::index::{LookupError, SymbolDescriptor, SyntaxIndex};
use crate::proposal::{ProposedEdit, ResolvedPatch, TargetDescriptor};
use fuzzy::{AnchorQuery, FuzzyOutcome};
use rayon::prelude::*;
use std::path::{Path, PathBuf};

/// An edit that could not be resolved, with the reason.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedEdit {
    pub edit_id: String,
    pub error: ResolutionError,
}

/// Resolved patches and rejected edits, both in input order.
#[derive(Debug, Clone, Default)]
pub struct ResolutionReport {
    pub snapshot_version: u64,
    pub patches: Vec<ResolvedPatch>,
    pub rejected: Vec<RejectedEdit>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AnchorResolver {
    config: AnchorConfig,
}

impl AnchorResolver {
    pub fn new(config: AnchorConfig) -> Self {
        Self { config }
    }

    /// Files a snapshot must hold to resolve `edits`.
    pub fn files_for(index: &SyntaxIndex, edits: &[ProposedEdit]) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = edits
            .iter()
            .flat_map(|edit| match &edit.target {
                TargetDescriptor::Symbol(descriptor) => index.candidate_files(descriptor),
                TargetDescriptor::Anchor { file, .. } | TargetDescriptor::Span { file, .. } => {
                    vec![file.clone()]
                }
            })
            .collect();
        paths.sort();
        paths.dedup();
        paths
    }

    /// Resolve every edit against one snapshot. Edits are independent, so
    /// they resolve in parallel; output keeps input order. Edits still
    /// unresolved when `cancel` fires are rejected as cancelled.
    pub fn resolve_batch(
        &self,
        edits: &[ProposedEdit],
        snapshot: &ProjectSnapshot,
        cancel: &CancellationToken,
    ) -> ResolutionReport {
        let results: Vec<Result<ResolvedPatch, ResolutionError>> = edits
            .par_iter()
            .map(|edit| self.resolve(edit, snapshot, cancel))
            .collect();

        let mut report = ResolutionReport {
            snapshot_version: snapshot.version(),
            ..ResolutionReport::default()
        };
        for result in results {
            match result {
                Ok(patch) => report.patches.push(patch),
                Err(error) => {
                    tracing::warn!(edit = error.edit_id(), code = error.code(), %error, "edit rejected");
                    report.rejected.push(RejectedEdit {
                        edit_id: error.edit_id().to_string(),
                        error,
                    });
                }
            }
        }
        tracing::debug!(
            resolved = report.patches.len(),
            rejected = report.rejected.len(),
            "resolved batch"
        );
        report
    }

    pub fn resolve(
        &self,
        edit: &ProposedEdit,
        snapshot: &ProjectSnapshot,
        cancel: &CancellationToken,
    ) -> Result<ResolvedPatch, ResolutionError> {
        if cancel.is_cancelled() {
            return Err(ResolutionError::Cancelled {
                edit_id: edit.id.clone(),
            });
        }
        match &edit.target {
            TargetDescriptor::Symbol(descriptor) => self.resolve_symbol(edit, descriptor, snapshot),
            TargetDescriptor::Span { file, start, end } => {
                let source = file_in(snapshot, &edit.id, file)?;
                let span = Span::new(*start, *end);
                let content = &source.content;
                let valid = start <= end
                    && *end <= content.len()
                    && content.is_char_boundary(*start)
                    && content.is_char_boundary(*end);
                if !valid {
                    return Err(ResolutionError::SpanOutOfRange {
                        edit_id: edit.id.clone(),
                        file: file.clone(),
                        span,
                        len: content.len(),
                    });
                }
                Ok(patch(edit, source, span, None))
            }
            TargetDescriptor::Anchor {
                file,
                text,
                context_before,
                context_after,
            } => {
                let source = file_in(snapshot, &edit.id, file)?;
                let query = AnchorQuery {
                    text,
                    context_before: context_before.as_deref(),
                    context_after: context_after.as_deref(),
                };
                match fuzzy::find(&source.content, &query, &self.config, cancel) {
                    FuzzyOutcome::Found(candidate) => {
                        tracing::debug!(
                            edit = %edit.id,
                            file = %file.display(),
                            score = candidate.score,
                            span = %candidate.span,
                            "anchor matched"
                        );
                        Ok(patch(edit, source, candidate.span, None))
                    }
                    FuzzyOutcome::Ambiguous { score, candidates } => {
                        Err(ResolutionError::AnchorAmbiguous {
                            edit_id: edit.id.clone(),
                            file: file.clone(),
                            score,
                            candidates,
                        })
                    }
                    FuzzyOutcome::NotFound { best_score } => Err(ResolutionError::AnchorNotFound {
                        edit_id: edit.id.clone(),
                        file: file.clone(),
                        best_score,
                    }),
                    FuzzyOutcome::Cancelled => Err(ResolutionError::Cancelled {
                        edit_id: edit.id.clone(),
                    }),
                }
            }
        }
    }

    fn resolve_symbol(
        &self,
        edit: &ProposedEdit,
        descriptor: &SymbolDescriptor,
        snapshot: &ProjectSnapshot,
    ) -> Result<ResolvedPatch, ResolutionError> {
        let symbol = snapshot.lookup(descriptor).map_err(|error| match error {
            LookupError::NotFound => ResolutionError::SymbolNotFound {
                edit_id: edit.id.clone(),
                descriptor: descriptor.to_string(),
            },
            LookupError::Ambiguous(candidates) => ResolutionError::SymbolAmbiguous {
                edit_id: edit.id.clone(),
                name: descriptor.to_string(),
                candidates: candidates.iter().map(describe).collect(),
            },
        })?;

        let source = file_in(snapshot, &edit.id, &symbol.path)?;
        if symbol.span.end > source.content.len() {
            return Err(ResolutionError::SpanOutOfRange {
                edit_id: edit.id.clone(),
                file: symbol.path.clone(),
                span: symbol.span,
                len: source.content.len(),
            });
        }
        Ok(patch(edit, source, symbol.span, Some(&symbol)))
    }
}

fn describe(symbol: &Symbol) -> String {
    format!(
        "{}::{} ({}, {})",
        path_key(&symbol.path),
        symbol.qualified_name,
        symbol.kind,
        symbol.id
    )
}

fn file_in<'s>(
    snapshot: &'s ProjectSnapshot,
    edit_id: &str,
    file: &Path,
) -> Result<&'s SnapshotFile, ResolutionError> {
    snapshot
        .file(file)
        .ok_or_else(|| ResolutionError::FileNotFound {
            edit_id: edit_id.to_string(),
            file: file.to_path_buf(),
        })
}

fn patch(
    edit: &ProposedEdit,
    source: &SnapshotFile,
    span: Span,
    symbol: Option<&Symbol>,
) -> ResolvedPatch {
    ResolvedPatch {
        edit_id: edit.id.clone(),
        file: source.path.clone(),
        file_id: source.file_id,
        language: source.language,
        op: edit.op,
        span,
        pre_image: source.content[span.start..span.end].to_string(),
        payload: edit.payload.clone(),
        flags: edit.flags,
        attached_doc: symbol.and_then(|s| s.doc_span),
        doc_exclusive: symbol.map_or(true, |s| s.doc_exclusive),
        structural: symbol.is_some(),
        base_hash: source.hash,
        meta: edit.meta.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancellationToken;
    use crate::config::ProjectConfig;
    use crate::parser::ParserRegistry;
    use crate::proposal::EditOp;
    use std::fs;
    use tempfile::TempDir;

    const UTILS: &str = "\
import os


def a():
    return 1


# Checks x.
def validate_x(v):
    return v > a()


def b():
    return 2
";

    fn setup() -> (TempDir, SyntaxIndex) {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("utils.py"), UTILS).unwrap();
        fs::write(dir.path().join("other.py"), "def a():\n    return 3\n").unwrap();
        let index =
            SyntaxIndex::new(dir.path(), &ProjectConfig::default(), ParserRegistry::default())
                .unwrap();
        index.scan(&CancellationToken::new()).unwrap();
        (dir, index)
    }

    fn resolve_all(index: &SyntaxIndex, edits: &[ProposedEdit]) -> ResolutionReport {
        let files = AnchorResolver::files_for(index, edits);
        let snapshot = ProjectSnapshot::capture(index, files, &CancellationToken::new()).unwrap();
        AnchorResolver::default().resolve_batch(edits, &snapshot, &CancellationToken::new())
    }

    #[test]
    fn symbol_target_carries_doc_and_pre_image() {
        let (_dir, index) = setup();
        let edit = ProposedEdit::new(
            "del",
            EditOp::Delete,
            TargetDescriptor::Symbol(SymbolDescriptor::name("validate_x")),
        );
        let report = resolve_all(&index, &[edit]);
        assert!(report.rejected.is_empty(), "{:?}", report.rejected);

        let patch = &report.patches[0];
        assert!(patch.structural);
        assert_eq!(patch.pre_image, "def validate_x(v):\n    return v > a()");
        let doc = patch.attached_doc.unwrap();
        assert_eq!(&UTILS[doc.start..doc.end], "# Checks x.");
        assert!(patch.doc_exclusive);
    }

    #[test]
    fn errors_are_reported_per_edit_in_order() {
        let (_dir, index) = setup();
        let edits = vec![
            ProposedEdit::new(
                "missing",
                EditOp::Delete,
                TargetDescriptor::Symbol(SymbolDescriptor::name("nope")),
            ),
            ProposedEdit::new(
                "ambiguous",
                EditOp::Delete,
                TargetDescriptor::Symbol(SymbolDescriptor::name("a")),
            ),
            ProposedEdit::new(
                "narrowed",
                EditOp::Delete,
                TargetDescriptor::Symbol(SymbolDescriptor::in_file("a", "other.py")),
            ),
            ProposedEdit::new(
                "too-far",
                EditOp::Replace,
                TargetDescriptor::Span {
                    file: PathBuf::from("utils.py"),
                    start: 0,
                    end: 10_000,
                },
            )
            .with_payload("x"),
            ProposedEdit::new(
                "no-file",
                EditOp::Replace,
                TargetDescriptor::Anchor {
                    file: PathBuf::from("ghost.py"),
                    text: "x".into(),
                    context_before: None,
                    context_after: None,
                },
            )
            .with_payload("y"),
        ];
        let report = resolve_all(&index, &edits);

        let codes: Vec<(&str, &str)> = report
            .rejected
            .iter()
            .map(|r| (r.edit_id.as_str(), r.error.code()))
            .collect();
        assert_eq!(
            codes,
            vec![
                ("missing", "symbol_not_found"),
                ("ambiguous", "symbol_ambiguous"),
                ("too-far", "span_out_of_range"),
                ("no-file", "file_not_found"),
            ]
        );
        assert_eq!(report.patches.len(), 1);
        assert_eq!(report.patches[0].file, PathBuf::from("other.py"));
    }

    #[test]
    fn anchor_pre_image_is_live_text() {
        let (_dir, index) = setup();
        let edit = ProposedEdit::new(
            "fuzzy",
            EditOp::Replace,
            TargetDescriptor::Anchor {
                file: PathBuf::from("utils.py"),
                text: "def validate_x(v) :\n  return v>a()".into(),
                context_before: None,
                context_after: None,
            },
        )
        .with_payload("pass");
        let report = resolve_all(&index, &[edit]);
        let patch = &report.patches[0];
        assert!(!patch.structural);
        assert_eq!(patch.pre_image, "def validate_x(v):\n    return v > a()");
    }

    #[test]
    fn spans_must_land_on_char_boundaries() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("notes.txt"), "héllo\n").unwrap();
        let index =
            SyntaxIndex::new(dir.path(), &ProjectConfig::default(), ParserRegistry::default())
                .unwrap();
        let edit = ProposedEdit::new(
            "split",
            EditOp::Delete,
            TargetDescriptor::Span {
                file: PathBuf::from("notes.txt"),
                start: 0,
                end: 2,
            },
        );
        let report = resolve_all(&index, &[edit]);
        assert_eq!(report.rejected[0].error.code(), "span_out_of_range");
    }

    #[test]
    fn cancelled_batch_rejects_every_edit() {
        let (_dir, index) = setup();
        let edits = vec![
            ProposedEdit::new(
                "by-name",
                EditOp::Delete,
                TargetDescriptor::Symbol(SymbolDescriptor::in_file("a", "other.py")),
            ),
            ProposedEdit::new(
                "by-anchor",
                EditOp::Replace,
                TargetDescriptor::Anchor {
                    file: PathBuf::from("utils.py"),
                    text: "def b():\n    return 2".into(),
                    context_before: None,
                    context_after: None,
                },
            )
            .with_payload("pass"),
        ];
        let files = AnchorResolver::files_for(&index, &edits);
        let snapshot = ProjectSnapshot::capture(&index, files, &CancellationToken::new()).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = AnchorResolver::default().resolve_batch(&edits, &snapshot, &cancel);
        assert!(report.patches.is_empty());
        let codes: Vec<&str> = report.rejected.iter().map(|r| r.error.code()).collect();
        assert_eq!(codes, vec!["cancelled", "cancelled"]);
    }
}
