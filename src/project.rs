//! One open project: index, resolver and transaction manager sharing a root
//! and a config.

use crate::anchor::{AnchorResolver, ProjectSnapshot, ResolutionReport};
use crate::batch::{BatchError, EditBatch};
use crate::cancel::CancellationToken;
use crate::config::{self, ConfigError, ProjectConfig};
use crate::errors::{ApplyError, ConflictError, IndexError};
use crate::index::{ScanReport, SyntaxIndex};
use crate::parser::ParserRegistry;
use crate::review::ReviewReport;
use crate::transaction::{
    AppliedTransaction, FileWriter, HistoryRecord, Transaction, TransactionManager,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProjectError {
    #[error("cannot open project at {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("invalid edit batch: {}", describe_batch_errors(.0))]
    Batch(Vec<BatchError>),

    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error(transparent)]
    Apply(#[from] ApplyError),

    #[error("proposal was cancelled before staging")]
    Cancelled,
}

impl ProjectError {
    pub fn code(&self) -> &'static str {
        match self {
            ProjectError::Open { .. } => "open_failed",
            ProjectError::Config(_) => "invalid_config",
            ProjectError::Index(_) => "index_failed",
            ProjectError::Batch(_) => "invalid_batch",
            ProjectError::Conflict(error) => error.code(),
            ProjectError::Apply(error) => error.code(),
            ProjectError::Cancelled => "cancelled",
        }
    }
}

fn describe_batch_errors(errors: &[BatchError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result of resolving and staging one batch.
#[derive(Debug)]
pub struct Proposal {
    pub report: ResolutionReport,
    pub transaction: Transaction,
    /// Why the transaction could not be staged, if it could not
    pub conflict: Option<ConflictError>,
}

impl Proposal {
    pub fn is_staged(&self) -> bool {
        self.conflict.is_none()
    }

    pub fn review(&self) -> ReviewReport {
        let report = ReviewReport::new(&self.transaction, &self.report.rejected);
        match &self.conflict {
            Some(conflict) => report.with_error(conflict),
            None => report,
        }
    }
}

#[derive(Debug)]
pub struct Project {
    config: ProjectConfig,
    index: SyntaxIndex,
    resolver: AnchorResolver,
    transactions: TransactionManager,
}

impl Project {
    /// Open `root` with `patchwright.toml` (or defaults) and the built-in parsers.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, ProjectError> {
        let root = root.as_ref();
        let root = root.canonicalize().map_err(|source| ProjectError::Open {
            path: root.to_path_buf(),
            source,
        })?;
        let config = config::load_for_root(&root)?;
        Self::open_with(&root, config, ParserRegistry::with_defaults())
    }

    pub fn open_with(
        root: &Path,
        config: ProjectConfig,
        registry: ParserRegistry,
    ) -> Result<Self, ProjectError> {
        let index = SyntaxIndex::new(root, &config, registry)?;
        let transactions = TransactionManager::new(index.guard().clone(), &config.transaction);
        tracing::debug!(root = %index.root().display(), "opened project");
        Ok(Self {
            resolver: AnchorResolver::new(config.anchor),
            config,
            index,
            transactions,
        })
    }

    /// Route every project file write through `writer`.
    pub fn with_writer(mut self, writer: Arc<dyn FileWriter>) -> Self {
        self.transactions = self.transactions.with_writer(writer);
        self
    }

    pub fn root(&self) -> &Path {
        self.index.root()
    }

    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    pub fn index(&self) -> &SyntaxIndex {
        &self.index
    }

    pub fn transactions(&self) -> &TransactionManager {
        &self.transactions
    }

    pub fn scan(&self, cancel: &CancellationToken) -> Result<ScanReport, ProjectError> {
        Ok(self.index.scan(cancel)?)
    }

    /// Snapshot, resolve and stage `batch` in one pass.
    pub fn propose(&self, batch: &EditBatch) -> Result<Proposal, ProjectError> {
        self.propose_with(batch, &CancellationToken::new())
    }

    pub fn propose_with(
        &self,
        batch: &EditBatch,
        cancel: &CancellationToken,
    ) -> Result<Proposal, ProjectError> {
        let errors = batch.validate();
        if !errors.is_empty() {
            return Err(ProjectError::Batch(errors));
        }

        let files = AnchorResolver::files_for(&self.index, &batch.edits);
        let snapshot = ProjectSnapshot::capture(&self.index, files, cancel)?;
        let report = self.resolver.resolve_batch(&batch.edits, &snapshot, cancel);
        if cancel.is_cancelled() {
            tracing::info!(edits = batch.edits.len(), "proposal cancelled");
            return Err(ProjectError::Cancelled);
        }

        let mut transaction = self.transactions.draft(report.patches.clone());
        let conflict = self.transactions.stage(&mut transaction).err();
        if let Some(error) = &conflict {
            tracing::warn!(tx = transaction.id(), code = error.code(), %error, "transaction not staged");
        }
        Ok(Proposal {
            report,
            transaction,
            conflict,
        })
    }

    /// Apply a staged transaction and re-index every file it wrote.
    pub fn apply(&self, tx: &mut Transaction) -> Result<AppliedTransaction, ProjectError> {
        let applied = self.transactions.apply(tx)?;
        self.reindex(&applied.files);
        Ok(applied)
    }

    /// Roll back by id, loading the transaction from its snapshot.
    pub fn rollback(&self, tx_id: &str) -> Result<Transaction, ProjectError> {
        let mut tx = self.transactions.load(tx_id)?;
        self.rollback_transaction(&mut tx)?;
        Ok(tx)
    }

    pub fn rollback_transaction(&self, tx: &mut Transaction) -> Result<bool, ProjectError> {
        let restored = self.transactions.rollback(tx)?;
        if restored {
            self.reindex(&tx.touched_files());
        }
        Ok(restored)
    }

    pub fn reject(&self, tx: &mut Transaction) -> Result<(), ProjectError> {
        Ok(self.transactions.reject(tx)?)
    }

    pub fn history(&self) -> Result<Vec<HistoryRecord>, ProjectError> {
        Ok(self.transactions.history()?)
    }

    fn reindex(&self, files: &[PathBuf]) {
        for file in files {
            if let Err(error) = self.index.index_file(file) {
                tracing::warn!(file = %file.display(), %error, "re-index after write failed");
            }
        }
    }
}
