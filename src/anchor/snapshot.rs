use crate::cancel::CancellationToken;
use crate::errors::IndexError;
use crate::index::lookup::{self, LookupError, SymbolDescriptor};
use crate::index::model::{content_hash, FileId, FileRecord, Symbol};
use crate::index::SyntaxIndex;
use crate::lang::Language;
use crate::parser::ParseOutput;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// One file as it was when the snapshot was taken.
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    /// Workspace-relative path
    pub path: PathBuf,
    pub file_id: FileId,
    pub language: Language,
    pub content: Arc<str>,
    pub hash: u64,
    /// Symbols indexed from exactly this content
    pub symbols: Vec<Symbol>,
}

/// Immutable point-in-time view of the files a batch touches. Every
/// resolution feeding one transaction reads the same snapshot.
#[derive(Debug, Clone, Default)]
pub struct ProjectSnapshot {
    version: u64,
    files: BTreeMap<PathBuf, SnapshotFile>,
}

impl ProjectSnapshot {
    /// Read `paths` from disk, re-indexing any whose record is stale so the
    /// symbols match the captured bytes. Unreadable files are left out and
    /// surface later as unresolvable targets.
    ///
    /// Stale files are parsed in parallel but committed together after a
    /// last cancellation check, so a cancelled capture leaves the index as
    /// it was.
    pub fn capture<I>(
        index: &SyntaxIndex,
        paths: I,
        cancel: &CancellationToken,
    ) -> Result<Self, IndexError>
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let mut rels: Vec<PathBuf> = paths
            .into_iter()
            .filter_map(|p| index.relative(&p).ok())
            .map(|p| normalize(&p))
            .collect();
        rels.sort();
        rels.dedup();

        let captured: Vec<Captured> = rels
            .into_par_iter()
            .map(|rel| capture_one(index, rel, cancel))
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .flatten()
            .collect();

        if cancel.is_cancelled() {
            return Err(IndexError::Cancelled {
                path: index.root().to_path_buf(),
            });
        }

        let mut files: Vec<SnapshotFile> = Vec::with_capacity(captured.len());
        let mut reparsed = Vec::new();
        let mut reparsed_at = Vec::new();
        for Captured { file, parsed } in captured {
            if let Some(parsed) = parsed {
                reparsed_at.push(files.len());
                reparsed.push(parsed);
            }
            files.push(file);
        }
        let committed = index.commit_all(reparsed, cancel)?;
        for (at, indexed) in reparsed_at.into_iter().zip(committed) {
            files[at].symbols = indexed.symbols;
        }

        let files: BTreeMap<PathBuf, SnapshotFile> =
            files.into_iter().map(|f| (f.path.clone(), f)).collect();
        let snapshot = Self {
            version: index.version(),
            files,
        };
        tracing::debug!(
            files = snapshot.files.len(),
            version = snapshot.version,
            "captured project snapshot"
        );
        Ok(snapshot)
    }

    /// Index version the snapshot was taken at.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn file(&self, path: &Path) -> Option<&SnapshotFile> {
        self.files.get(&normalize(path))
    }

    pub fn paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.files.keys()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn lookup(&self, descriptor: &SymbolDescriptor) -> Result<Symbol, LookupError> {
        lookup::select(
            self.files.values().flat_map(|f| f.symbols.iter()),
            descriptor,
        )
    }
}

/// A captured file, plus its parse when the index record is stale.
struct Captured {
    file: SnapshotFile,
    parsed: Option<(FileRecord, ParseOutput)>,
}

fn capture_one(
    index: &SyntaxIndex,
    rel: PathBuf,
    cancel: &CancellationToken,
) -> Result<Option<Captured>, IndexError> {
    if cancel.is_cancelled() {
        return Err(IndexError::Cancelled { path: rel });
    }
    let absolute = match index.guard().validate_path(&rel) {
        Ok(path) => path,
        Err(error) => {
            tracing::debug!(path = %rel.display(), %error, "not capturing file");
            return Ok(None);
        }
    };
    let content = match index.read_source(&absolute, &rel) {
        Ok(content) => content,
        Err(error) => {
            tracing::warn!(path = %rel.display(), %error, "cannot capture file");
            return Ok(None);
        }
    };
    let hash = content_hash(content.as_bytes());

    let fresh = index
        .file(&rel)
        .is_some_and(|record| !record.is_stale_against(hash));
    let (symbols, parsed) = if fresh {
        (index.symbols_in(&rel), None)
    } else {
        match index.parse(&rel, &content) {
            Ok(parsed) => (Vec::new(), Some(parsed)),
            Err(error) => {
                tracing::warn!(path = %rel.display(), %error, "captured without symbols");
                (Vec::new(), None)
            }
        }
    };

    Ok(Some(Captured {
        file: SnapshotFile {
            file_id: FileId::for_path(&rel),
            language: Language::from_path(&rel),
            content: Arc::from(content),
            hash,
            symbols,
            path: rel,
        },
        parsed,
    }))
}

/// Drop `.` components so `./a.py` and `a.py` name the same file.
fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}
