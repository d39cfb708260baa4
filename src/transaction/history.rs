use super::writer::atomic_write;
use super::{Transaction, TxState};
use crate::errors::ApplyError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// One finished lifecycle step of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub tx_id: String,
    pub state: TxState,
    pub at: DateTime<Utc>,
    pub files: Vec<PathBuf>,
    pub edits: Vec<String>,
}

/// Append-only record of applied, rolled back and rejected transactions.
#[derive(Debug, Clone)]
pub struct History {
    dir: PathBuf,
    enabled: bool,
}

impl History {
    pub fn new(state_dir: &Path, enabled: bool) -> Self {
        Self {
            dir: state_dir.join("history"),
            enabled,
        }
    }

    pub fn record(&self, tx: &Transaction) -> Result<(), ApplyError> {
        if !self.enabled {
            return Ok(());
        }
        let record = HistoryRecord {
            tx_id: tx.id().to_string(),
            state: tx.state(),
            at: Utc::now(),
            files: tx.touched_files(),
            edits: tx.patches().iter().map(|p| p.edit_id.clone()).collect(),
        };
        let path = self
            .dir
            .join(format!("{}-{}.json", record.tx_id, record.state.as_str()));
        let io_err = |source: io::Error| ApplyError::Io {
            path: path.clone(),
            source,
        };
        fs::create_dir_all(&self.dir).map_err(io_err)?;
        let json = serde_json::to_vec_pretty(&record).map_err(|e| ApplyError::Manifest {
            tx_id: record.tx_id.clone(),
            message: e.to_string(),
        })?;
        atomic_write(&path, &json).map_err(io_err)
    }

    /// Every record, oldest first. Unreadable records are skipped.
    pub fn list(&self) -> Result<Vec<HistoryRecord>, ApplyError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(ApplyError::Io {
                    path: self.dir.clone(),
                    source,
                })
            }
        };

        let mut records: Vec<HistoryRecord> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .filter_map(|path| {
                let parsed = fs::read_to_string(&path)
                    .map_err(|e| e.to_string())
                    .and_then(|raw| serde_json::from_str(&raw).map_err(|e| e.to_string()));
                match parsed {
                    Ok(record) => Some(record),
                    Err(error) => {
                        tracing::warn!(path = %path.display(), %error, "skipping history record");
                        None
                    }
                }
            })
            .collect();
        records.sort_by(|a, b| {
            a.at.cmp(&b.at)
                .then_with(|| a.tx_id.cmp(&b.tx_id))
                .then_with(|| a.state.cmp(&b.state))
        });
        Ok(records)
    }
}
