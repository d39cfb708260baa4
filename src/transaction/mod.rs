//! All-or-nothing application of resolved patches.
//!
//! A transaction moves drafted → conflict_checked → staged → applied, and
//! from applied to rolled_back. A conflict-checked or staged transaction may
//! be rejected instead. Staging computes every file's new content in memory;
//! applying snapshots the originals, writes through a [`FileWriter`], and
//! restores everything already written when a write fails.

mod history;
mod lock;
mod snapshot;
mod writer;

pub use history::{History, HistoryRecord};
pub use lock::{LockGuard, ProjectLock};
pub use snapshot::{Manifest, ManifestFile, SnapshotStore};
pub use writer::{AtomicWriter, FileWriter};

use crate::config::TransactionConfig;
use crate::errors::{ApplyError, ConflictError, OverlapConflict};
use crate::index::model::{content_hash, path_key};
use crate::lang::Language;
use crate::patch::{apply_mutations, MutationError, PatchEngine, SyntaxGuard};
use crate::proposal::ResolvedPatch;
use crate::safety::WorkspaceGuard;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use xxhash_rust::xxh3::xxh3_64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxState {
    Drafted,
    ConflictChecked,
    Staged,
    Applied,
    RolledBack,
    Rejected,
}

impl TxState {
    pub fn as_str(self) -> &'static str {
        match self {
            TxState::Drafted => "drafted",
            TxState::ConflictChecked => "conflict_checked",
            TxState::Staged => "staged",
            TxState::Applied => "applied",
            TxState::RolledBack => "rolled_back",
            TxState::Rejected => "rejected",
        }
    }

    /// States from which `reject` is allowed.
    pub fn is_pending(self) -> bool {
        matches!(self, TxState::ConflictChecked | TxState::Staged)
    }
}

impl fmt::Display for TxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Before and after content of one file touched by a staged transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    /// Workspace-relative path
    pub path: PathBuf,
    pub before: String,
    pub after: String,
    pub before_hash: u64,
    pub after_hash: u64,
    /// Edits contributing to this file, in batch order
    pub edits: Vec<String>,
}

impl StagedFile {
    pub fn new(path: PathBuf, before: String, after: String, edits: Vec<String>) -> Self {
        Self {
            before_hash: content_hash(before.as_bytes()),
            after_hash: content_hash(after.as_bytes()),
            path,
            before,
            after,
            edits,
        }
    }

    pub fn is_unchanged(&self) -> bool {
        self.before_hash == self.after_hash
    }
}

#[derive(Debug, Clone)]
pub struct Transaction {
    id: String,
    state: TxState,
    created_at: DateTime<Utc>,
    applied_at: Option<DateTime<Utc>>,
    rolled_back_at: Option<DateTime<Utc>>,
    patches: Vec<ResolvedPatch>,
    files: Vec<StagedFile>,
    conflicts: Vec<OverlapConflict>,
}

impl Transaction {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> TxState {
        self.state
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn applied_at(&self) -> Option<DateTime<Utc>> {
        self.applied_at
    }

    pub fn rolled_back_at(&self) -> Option<DateTime<Utc>> {
        self.rolled_back_at
    }

    pub fn patches(&self) -> &[ResolvedPatch] {
        &self.patches
    }

    /// Staged files; empty before staging.
    pub fn files(&self) -> &[StagedFile] {
        &self.files
    }

    /// Overlaps found by the last failed conflict check.
    pub fn conflicts(&self) -> &[OverlapConflict] {
        &self.conflicts
    }

    /// Distinct files the patches target, in first-seen order.
    pub fn touched_files(&self) -> Vec<PathBuf> {
        let mut seen = Vec::new();
        for patch in &self.patches {
            if !seen.contains(&patch.file) {
                seen.push(patch.file.clone());
            }
        }
        seen
    }

    fn invalid(&self, expected: &'static str) -> ApplyError {
        ApplyError::InvalidState {
            tx_id: self.id.clone(),
            state: self.state.to_string(),
            expected,
        }
    }
}

/// Outcome of a successful apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedTransaction {
    pub tx_id: String,
    pub files: Vec<PathBuf>,
    pub snapshot: PathBuf,
    pub applied_at: DateTime<Utc>,
}

/// Every pair of patches in one file that may not share a transaction:
/// overlapping spans, or touching spans where neither is an insert. Inserts
/// never conflict with each other.
pub fn find_overlaps(patches: &[ResolvedPatch]) -> Vec<OverlapConflict> {
    let mut conflicts = Vec::new();
    for (i, first) in patches.iter().enumerate() {
        for second in &patches[i + 1..] {
            if first.file != second.file {
                continue;
            }
            let (a, b) = (first.op.is_insert(), second.op.is_insert());
            if a && b {
                continue;
            }
            let collide = first.span.overlaps(&second.span)
                || (!a && !b && first.span.touches(&second.span));
            if collide {
                conflicts.push(OverlapConflict {
                    file: first.file.clone(),
                    first_edit: first.edit_id.clone(),
                    second_edit: second.edit_id.clone(),
                });
            }
        }
    }
    conflicts
}

static TX_COUNTER: AtomicU64 = AtomicU64::new(0);

/// `tx-<UTC timestamp>-<8 hex>`, the hex drawn from the patch set.
/// True for ids shaped like `tx-20260101T000000-0123abcd`. Anything else
/// never names a snapshot directory.
pub fn is_valid_transaction_id(id: &str) -> bool {
    let Some(rest) = id.strip_prefix("tx-") else {
        return false;
    };
    let bytes = rest.as_bytes();
    bytes.len() == 24
        && bytes[..8].iter().all(u8::is_ascii_digit)
        && bytes[8] == b'T'
        && bytes[9..15].iter().all(u8::is_ascii_digit)
        && bytes[15] == b'-'
        && bytes[16..]
            .iter()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(b))
}

fn transaction_id(patches: &[ResolvedPatch], now: DateTime<Utc>) -> String {
    let mut key = format!(
        "{}:{}",
        std::process::id(),
        TX_COUNTER.fetch_add(1, Ordering::Relaxed)
    );
    for patch in patches {
        key.push_str(&format!(
            "\n{}\0{}\0{}\0{:x}",
            patch.edit_id,
            path_key(&patch.file),
            patch.span,
            patch.base_hash
        ));
    }
    format!(
        "tx-{}-{:08x}",
        now.format("%Y%m%dT%H%M%S"),
        xxh3_64(key.as_bytes()) as u32
    )
}

pub struct TransactionManager {
    guard: WorkspaceGuard,
    config: TransactionConfig,
    engine: PatchEngine,
    writer: Arc<dyn FileWriter>,
    lock: ProjectLock,
    snapshots: SnapshotStore,
    history: History,
}

impl fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionManager")
            .field("root", &self.guard.workspace_root())
            .field("lock", &self.lock.path())
            .finish_non_exhaustive()
    }
}

impl TransactionManager {
    pub fn new(guard: WorkspaceGuard, config: &TransactionConfig) -> Self {
        let state_dir = guard.workspace_root().join(&config.state_dir);
        Self {
            lock: ProjectLock::new(&state_dir),
            snapshots: SnapshotStore::new(&state_dir),
            history: History::new(&state_dir, config.keep_history),
            guard,
            config: config.clone(),
            engine: PatchEngine::new(),
            writer: Arc::new(AtomicWriter),
        }
    }

    /// Replace the writer used for project files.
    pub fn with_writer(mut self, writer: Arc<dyn FileWriter>) -> Self {
        self.writer = writer;
        self
    }

    pub fn snapshots(&self) -> &SnapshotStore {
        &self.snapshots
    }

    pub fn draft(&self, patches: Vec<ResolvedPatch>) -> Transaction {
        let now = Utc::now();
        let tx = Transaction {
            id: transaction_id(&patches, now),
            state: TxState::Drafted,
            created_at: now,
            applied_at: None,
            rolled_back_at: None,
            patches,
            files: Vec::new(),
            conflicts: Vec::new(),
        };
        tracing::debug!(tx = %tx.id, patches = tx.patches.len(), "drafted transaction");
        tx
    }

    /// Reject overlapping patches. On failure the transaction stays drafted
    /// and keeps the conflict list.
    pub fn check_conflicts(&self, tx: &mut Transaction) -> Result<(), ConflictError> {
        if !matches!(tx.state, TxState::Drafted | TxState::ConflictChecked) {
            return Err(ConflictError::InvalidState {
                tx_id: tx.id.clone(),
                state: tx.state.to_string(),
            });
        }
        if tx.patches.is_empty() {
            return Err(ConflictError::Empty);
        }

        tx.conflicts = find_overlaps(&tx.patches);
        if !tx.conflicts.is_empty() {
            tx.state = TxState::Drafted;
            tracing::warn!(tx = %tx.id, conflicts = tx.conflicts.len(), "overlapping edits");
            return Err(ConflictError::Overlap {
                conflicts: tx.conflicts.clone(),
            });
        }
        tx.state = TxState::ConflictChecked;
        Ok(())
    }

    /// Verify every patch against live content and compute each touched
    /// file's new text. Nothing is written.
    pub fn stage(&self, tx: &mut Transaction) -> Result<(), ConflictError> {
        if tx.state == TxState::Drafted {
            self.check_conflicts(tx)?;
        }
        if tx.state != TxState::ConflictChecked {
            return Err(ConflictError::InvalidState {
                tx_id: tx.id.clone(),
                state: tx.state.to_string(),
            });
        }

        let mut files = Vec::new();
        for (rel, patches) in group_by_file(&tx.patches) {
            files.push(self.stage_file(&rel, &patches)?);
        }

        tx.files = files;
        tx.state = TxState::Staged;
        tracing::info!(tx = %tx.id, files = tx.files.len(), patches = tx.patches.len(), "staged transaction");
        Ok(())
    }

    fn stage_file(&self, rel: &Path, patches: &[&ResolvedPatch]) -> Result<StagedFile, ConflictError> {
        let absolute = self.guard.validate_path(rel)?;
        let before = fs::read_to_string(&absolute).map_err(|source| ConflictError::Io {
            file: rel.to_path_buf(),
            source,
        })?;
        let hash = content_hash(before.as_bytes());
        if let Some(stale) = patches.iter().find(|p| p.base_hash != hash) {
            tracing::warn!(file = %rel.display(), edit = %stale.edit_id, "stale source");
            return Err(ConflictError::StaleSource {
                file: rel.to_path_buf(),
                edit_id: stale.edit_id.clone(),
            });
        }

        let mutations = patches
            .iter()
            .map(|patch| {
                self.engine
                    .build(patch, &before)
                    .map_err(|error| mutation_conflict(rel, error))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let after = apply_mutations(&before, &mutations).map_err(|error| mutation_conflict(rel, error))?;
        let edits: Vec<String> = patches.iter().map(|p| p.edit_id.clone()).collect();

        if self.config.validate_syntax {
            let language = Language::from_path(rel);
            match SyntaxGuard::introduced_errors(rel, language, &before, &after) {
                Ok(0) => {}
                Ok(count) => {
                    return Err(ConflictError::SyntaxRegression {
                        file: rel.to_path_buf(),
                        edit_id: edits.join(","),
                        count,
                    })
                }
                Err(error) => {
                    tracing::warn!(file = %rel.display(), %error, "syntax check skipped");
                }
            }
        }

        Ok(StagedFile::new(rel.to_path_buf(), before, after, edits))
    }

    /// Snapshot, then write every staged file. A failed write restores every
    /// file written so far, including the one that failed. When some of those
    /// cannot be restored the snapshot stays on disk, still recorded as
    /// applied, so `rollback` can finish the restore later.
    pub fn apply(&self, tx: &mut Transaction) -> Result<AppliedTransaction, ApplyError> {
        if tx.state != TxState::Staged {
            return Err(tx.invalid("staged"));
        }
        let _lock = self.lock.acquire(&tx.id)?;

        let mut targets = Vec::with_capacity(tx.files.len());
        for file in &tx.files {
            let absolute = self.guard.revalidate(&file.path)?;
            let live = fs::read(&absolute).map_err(|source| ApplyError::Io {
                path: absolute.clone(),
                source,
            })?;
            if content_hash(&live) != file.before_hash {
                tracing::warn!(tx = %tx.id, file = %file.path.display(), "changed after staging");
                return Err(ApplyError::Stale {
                    file: file.path.clone(),
                });
            }
            targets.push(absolute);
        }

        let applied_at = Utc::now();
        tx.state = TxState::Applied;
        tx.applied_at = Some(applied_at);
        let snapshot = match self.snapshots.save(tx) {
            Ok(dir) => dir,
            Err(error) => {
                self.snapshots.discard(&tx.id);
                tx.state = TxState::Staged;
                tx.applied_at = None;
                return Err(error);
            }
        };

        for (i, (file, absolute)) in tx.files.iter().zip(&targets).enumerate() {
            if let Err(source) = self.writer.write(absolute, file.after.as_bytes()) {
                tracing::error!(tx = %tx.id, file = %file.path.display(), %source, "write failed, restoring");
                let failures = self.restore(&tx.files[..=i], &targets[..=i]);
                tx.state = TxState::Staged;
                tx.applied_at = None;
                if !failures.is_empty() {
                    tracing::error!(
                        tx = %tx.id,
                        unrestored = failures.len(),
                        snapshot = %snapshot.display(),
                        "restore incomplete, snapshot kept"
                    );
                    return Err(ApplyError::RestoreIncomplete {
                        tx_id: tx.id.clone(),
                        file: file.path.clone(),
                        source,
                        unrestored: failures.into_iter().map(|(path, _)| path).collect(),
                        snapshot,
                    });
                }
                self.snapshots.discard(&tx.id);
                return Err(ApplyError::Write {
                    file: file.path.clone(),
                    restored: i + 1,
                    source,
                });
            }
            tracing::debug!(tx = %tx.id, file = %file.path.display(), "written");
        }

        if let Err(error) = self.history.record(tx) {
            tracing::warn!(tx = %tx.id, %error, "history not recorded");
        }
        tracing::info!(tx = %tx.id, files = tx.files.len(), "applied transaction");
        Ok(AppliedTransaction {
            tx_id: tx.id.clone(),
            files: tx.files.iter().map(|f| f.path.clone()).collect(),
            snapshot,
            applied_at,
        })
    }

    /// Write back the original content of every file, continuing past
    /// failures. Returns the files that could not be restored.
    fn restore(&self, files: &[StagedFile], targets: &[PathBuf]) -> Vec<(PathBuf, io::Error)> {
        let mut failures = Vec::new();
        for (file, absolute) in files.iter().zip(targets) {
            if let Err(error) = self.writer.write(absolute, file.before.as_bytes()) {
                tracing::error!(file = %file.path.display(), %error, "restore failed");
                failures.push((file.path.clone(), error));
            }
        }
        tracing::info!(
            files = files.len() - failures.len(),
            failed = failures.len(),
            "restored from snapshot"
        );
        failures
    }

    /// Restore the stored snapshot of an applied transaction. Returns
    /// `false` when it was already rolled back.
    pub fn rollback(&self, tx: &mut Transaction) -> Result<bool, ApplyError> {
        match tx.state {
            TxState::RolledBack => {
                tracing::debug!(tx = %tx.id, "already rolled back");
                return Ok(false);
            }
            TxState::Applied => {}
            _ => return Err(tx.invalid("applied")),
        }
        let _lock = self.lock.acquire(&tx.id)?;

        let manifest = self.snapshots.manifest(&tx.id)?;
        let files = self.snapshots.load_files(&manifest)?;
        let mut targets = Vec::with_capacity(files.len());
        for file in &files {
            let absolute = self.guard.revalidate(&file.path)?;
            if let Ok(live) = fs::read(&absolute) {
                if content_hash(&live) != file.after_hash {
                    tracing::warn!(tx = %tx.id, file = %file.path.display(), "modified since apply, restoring anyway");
                }
            }
            targets.push(absolute);
        }
        if let Some((file, source)) = self.restore(&files, &targets).into_iter().next() {
            return Err(ApplyError::RestoreFailed { file, source });
        }

        tx.state = TxState::RolledBack;
        tx.rolled_back_at = Some(Utc::now());
        self.snapshots.update_state(tx)?;
        if let Err(error) = self.history.record(tx) {
            tracing::warn!(tx = %tx.id, %error, "history not recorded");
        }
        tracing::info!(tx = %tx.id, files = files.len(), "rolled back transaction");
        Ok(true)
    }

    /// Discard a transaction that has not been applied. No file is touched.
    pub fn reject(&self, tx: &mut Transaction) -> Result<(), ApplyError> {
        if !tx.state.is_pending() {
            return Err(tx.invalid("conflict_checked or staged"));
        }
        tx.state = TxState::Rejected;
        if let Err(error) = self.history.record(tx) {
            tracing::warn!(tx = %tx.id, %error, "history not recorded");
        }
        tracing::info!(tx = %tx.id, "rejected transaction");
        Ok(())
    }

    /// Rebuild a saved transaction from its snapshot manifest.
    pub fn load(&self, tx_id: &str) -> Result<Transaction, ApplyError> {
        let manifest = self.snapshots.manifest(tx_id)?;
        let files = self.snapshots.load_files(&manifest)?;
        Ok(Transaction {
            id: manifest.tx_id,
            state: manifest.state,
            created_at: manifest.created_at,
            applied_at: manifest.applied_at,
            rolled_back_at: manifest.rolled_back_at,
            patches: manifest.patches,
            files,
            conflicts: Vec::new(),
        })
    }

    pub fn history(&self) -> Result<Vec<HistoryRecord>, ApplyError> {
        self.history.list()
    }
}

/// Patches grouped per file, files in first-seen order, patches in batch order.
fn group_by_file(patches: &[ResolvedPatch]) -> Vec<(PathBuf, Vec<&ResolvedPatch>)> {
    let mut groups: Vec<(PathBuf, Vec<&ResolvedPatch>)> = Vec::new();
    for patch in patches {
        match groups.iter_mut().find(|(file, _)| *file == patch.file) {
            Some((_, group)) => group.push(patch),
            None => groups.push((patch.file.clone(), vec![patch])),
        }
    }
    groups
}

fn mutation_conflict(file: &Path, error: MutationError) -> ConflictError {
    match error {
        MutationError::Overlap { first, second } => ConflictError::Overlap {
            conflicts: vec![OverlapConflict {
                file: file.to_path_buf(),
                first_edit: first,
                second_edit: second,
            }],
        },
        MutationError::BeforeTextMismatch { ref edit_id, .. } => ConflictError::StaleSource {
            file: file.to_path_buf(),
            edit_id: edit_id.clone(),
        },
        MutationError::InvalidRange { ref edit_id, .. } => ConflictError::Build {
            edit_id: edit_id.clone(),
            source: error.clone(),
        },
    }
}
