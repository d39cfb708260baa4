//! On-disk backups keyed by transaction id.
//!
//! ```text
//! <state_dir>/snapshots/<tx-id>/manifest.json
//! <state_dir>/snapshots/<tx-id>/files/<n>.before
//! <state_dir>/snapshots/<tx-id>/files/<n>.after
//! ```

use super::writer::atomic_write;
use super::{is_valid_transaction_id, StagedFile, Transaction, TxState};
use crate::errors::ApplyError;
use crate::index::model::{content_hash, hash_hex};
use crate::proposal::ResolvedPatch;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub tx_id: String,
    pub state: TxState,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rolled_back_at: Option<DateTime<Utc>>,
    pub files: Vec<ManifestFile>,
    #[serde(default)]
    pub patches: Vec<ResolvedPatch>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestFile {
    /// Workspace-relative path of the project file
    pub path: PathBuf,
    pub before_hash: String,
    pub after_hash: String,
    /// Snapshot-relative location of the original bytes
    pub before: PathBuf,
    pub after: PathBuf,
    pub edits: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            dir: state_dir.join("snapshots"),
        }
    }

    pub fn dir_for(&self, tx_id: &str) -> PathBuf {
        self.dir.join(tx_id)
    }

    /// Persist the before/after content of every staged file of `tx`.
    pub fn save(&self, tx: &Transaction) -> Result<PathBuf, ApplyError> {
        let dir = self.dir_for(tx.id());
        let snapshot_err = |source: io::Error| ApplyError::Snapshot {
            tx_id: tx.id().to_string(),
            source,
        };

        let files_dir = dir.join("files");
        fs::create_dir_all(&files_dir).map_err(snapshot_err)?;

        let mut files = Vec::with_capacity(tx.files().len());
        for (n, file) in tx.files().iter().enumerate() {
            let before = PathBuf::from("files").join(format!("{n}.before"));
            let after = PathBuf::from("files").join(format!("{n}.after"));
            atomic_write(&dir.join(&before), file.before.as_bytes()).map_err(snapshot_err)?;
            atomic_write(&dir.join(&after), file.after.as_bytes()).map_err(snapshot_err)?;
            files.push(ManifestFile {
                path: file.path.clone(),
                before_hash: hash_hex(file.before_hash),
                after_hash: hash_hex(file.after_hash),
                before,
                after,
                edits: file.edits.clone(),
            });
        }

        let manifest = Manifest {
            tx_id: tx.id().to_string(),
            state: tx.state(),
            created_at: tx.created_at(),
            applied_at: tx.applied_at(),
            rolled_back_at: tx.rolled_back_at(),
            files,
            patches: tx.patches().to_vec(),
        };
        self.write_manifest(&manifest)?;
        tracing::info!(
            tx = tx.id(),
            files = manifest.files.len(),
            dir = %dir.display(),
            "snapshot taken"
        );
        Ok(dir)
    }

    /// Record a lifecycle change of an already saved transaction.
    pub fn update_state(&self, tx: &Transaction) -> Result<(), ApplyError> {
        let mut manifest = self.manifest(tx.id())?;
        manifest.state = tx.state();
        manifest.applied_at = tx.applied_at();
        manifest.rolled_back_at = tx.rolled_back_at();
        self.write_manifest(&manifest)
    }

    pub fn manifest(&self, tx_id: &str) -> Result<Manifest, ApplyError> {
        if !is_valid_transaction_id(tx_id) {
            return Err(ApplyError::UnknownTransaction {
                tx_id: tx_id.to_string(),
            });
        }
        let path = self.dir_for(tx_id).join(MANIFEST_FILE);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                return Err(ApplyError::UnknownTransaction {
                    tx_id: tx_id.to_string(),
                })
            }
            Err(source) => return Err(ApplyError::Io { path, source }),
        };
        serde_json::from_str(&raw).map_err(|e| ApplyError::Manifest {
            tx_id: tx_id.to_string(),
            message: e.to_string(),
        })
    }

    /// Rebuild the staged files of a saved transaction, checking every
    /// stored blob against its recorded hash.
    pub fn load_files(&self, manifest: &Manifest) -> Result<Vec<StagedFile>, ApplyError> {
        let dir = self.dir_for(&manifest.tx_id);
        manifest
            .files
            .iter()
            .map(|entry| {
                let before = self.read_blob(&dir, &manifest.tx_id, &entry.before, &entry.before_hash)?;
                let after = self.read_blob(&dir, &manifest.tx_id, &entry.after, &entry.after_hash)?;
                Ok(StagedFile::new(entry.path.clone(), before, after, entry.edits.clone()))
            })
            .collect()
    }

    pub fn discard(&self, tx_id: &str) {
        let dir = self.dir_for(tx_id);
        if let Err(error) = fs::remove_dir_all(&dir) {
            tracing::warn!(tx = tx_id, dir = %dir.display(), %error, "could not discard snapshot");
        }
    }

    fn read_blob(
        &self,
        dir: &Path,
        tx_id: &str,
        rel: &Path,
        expected: &str,
    ) -> Result<String, ApplyError> {
        let path = dir.join(rel);
        let content = fs::read_to_string(&path).map_err(|source| ApplyError::Io {
            path: path.clone(),
            source,
        })?;
        if hash_hex(content_hash(content.as_bytes())) != expected {
            return Err(ApplyError::Manifest {
                tx_id: tx_id.to_string(),
                message: format!("{} does not match its recorded hash", rel.display()),
            });
        }
        Ok(content)
    }

    fn write_manifest(&self, manifest: &Manifest) -> Result<(), ApplyError> {
        let path = self.dir_for(&manifest.tx_id).join(MANIFEST_FILE);
        let json = serde_json::to_vec_pretty(manifest).map_err(|e| ApplyError::Manifest {
            tx_id: manifest.tx_id.clone(),
            message: e.to_string(),
        })?;
        atomic_write(&path, &json).map_err(|source| ApplyError::Snapshot {
            tx_id: manifest.tx_id.clone(),
            source,
        })
    }
}
