//! Patchwright: codebase indexing and transactional patch application.
//!
//! Proposed edits arrive from an untrusted planner as symbol references,
//! fuzzy text anchors or explicit byte spans. They are resolved against one
//! point-in-time snapshot of the project, compiled into verified byte-span
//! mutations, and applied all-or-nothing with a snapshot for rollback.
//!
//! # Architecture
//!
//! - [`index::SyntaxIndex`]: symbols, spans and hashes per file, built by
//!   pluggable per-language parsers (tree-sitter grammars from ast-grep, and
//!   key extraction for JSON, TOML, YAML and Markdown).
//! - [`graph::DependencyGraph`]: import, call, inheritance and containment
//!   edges derived while indexing.
//! - [`anchor::AnchorResolver`]: maps edit targets onto live byte spans.
//! - [`patch::PatchEngine`]: builds structure-preserving text mutations.
//! - [`transaction::TransactionManager`]: conflict checks, staging,
//!   snapshotting, atomic apply and rollback.
//!
//! # Safety
//!
//! - Every mutation re-verifies its pre-image before it is applied
//! - Stale sources are refused at stage time and again under the apply lock
//! - Atomic file writes (tempfile + fsync + rename)
//! - Workspace boundary enforcement
//!
//! # Example
//!
//! ```no_run
//! use patchwright::{EditBatch, Project};
//!
//! let project = Project::open(".")?;
//! let batch = EditBatch::from_json(r#"{"edits": [
//!     {"op": "delete", "target": {"symbol": {"name": "validate_x"}}}
//! ]}"#)?;
//! let mut proposal = project.propose(&batch)?;
//! if proposal.is_staged() {
//!     project.apply(&mut proposal.transaction)?;
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod anchor;
pub mod batch;
pub mod cancel;
pub mod config;
pub mod errors;
pub mod graph;
pub mod index;
pub mod lang;
pub mod parser;
pub mod patch;
pub mod project;
pub mod proposal;
pub mod review;
pub mod safety;
pub mod transaction;

pub use anchor::{AnchorResolver, ProjectSnapshot, RejectedEdit, ResolutionReport};
pub use batch::{BatchError, EditBatch};
pub use cancel::CancellationToken;
pub use config::{ConfigError, ProjectConfig};
pub use errors::{ApplyError, ConflictError, IndexError, ParseError, ResolutionError};
pub use graph::{DependencyGraph, Edge, EdgeKind, NodeRef};
pub use index::model::{FileId, FileRecord, Span, Symbol, SymbolId, SymbolKind};
pub use index::{SymbolDescriptor, SyntaxIndex};
pub use lang::Language;
pub use patch::{PatchEngine, TextMutation};
pub use project::{Project, ProjectError, Proposal};
pub use proposal::{EditOp, ProposedEdit, ResolvedPatch, TargetDescriptor};
pub use review::ReviewReport;
pub use safety::{SafetyError, WorkspaceGuard};
pub use transaction::{AppliedTransaction, Transaction, TransactionManager, TxState};
