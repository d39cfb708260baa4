use super::SyntaxIndex;
use crate::cancel::CancellationToken;
use crate::errors::{IndexError, ParseError};
use crate::index::model::{content_hash, FileRecord};
use crate::lang::Language;
use crate::parser::ParseOutput;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

#[derive(Debug, Default, Serialize)]
pub struct ScanReport {
    pub indexed: Vec<PathBuf>,
    pub skipped: usize,
    pub removed: Vec<PathBuf>,
    #[serde(serialize_with = "serialize_failures")]
    pub unparseable: Vec<(PathBuf, ParseError)>,
}

fn serialize_failures<S>(failures: &[(PathBuf, ParseError)], serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    use serde::ser::SerializeSeq;
    let mut seq = serializer.serialize_seq(Some(failures.len()))?;
    for (path, error) in failures {
        seq.serialize_element(&serde_json::json!({
            "path": path,
            "code": error.code(),
            "message": error.to_string(),
        }))?;
    }
    seq.end()
}

enum Outcome {
    Unchanged,
    Parsed(FileRecord, ParseOutput),
    Failed(ParseError),
    Binary,
    Unreadable(std::io::Error),
}

impl SyntaxIndex {
    /// Walk the project and bring the index in line with disk.
    ///
    /// Changed and new files are parsed in parallel; unchanged ones are
    /// skipped by hash. A parse failure is reported for that file only.
    /// Cancellation is honoured before anything is committed.
    pub fn scan(&self, cancel: &CancellationToken) -> Result<ScanReport, IndexError> {
        let paths = self.walk();
        let known: HashMap<PathBuf, (u64, bool)> = {
            let store = self.store.read();
            store
                .entries()
                .map(|e| (e.record.path.clone(), (e.record.content_hash, e.record.dirty)))
                .collect()
        };

        let work = || -> Vec<(PathBuf, Outcome)> {
            paths
                .par_iter()
                .map(|rel| (rel.clone(), self.examine(rel, known.get(rel).copied())))
                .collect()
        };
        let outcomes = match self.config.index.workers {
            0 => work(),
            n => rayon::ThreadPoolBuilder::new()
                .num_threads(n)
                .build()
                .map_err(|e| IndexError::Pool(e.to_string()))?
                .install(work),
        };

        if cancel.is_cancelled() {
            return Err(IndexError::Cancelled {
                path: self.root.clone(),
            });
        }

        let mut report = ScanReport::default();
        let seen: HashSet<&PathBuf> = paths.iter().collect();
        let mut store = self.store.write();
        if cancel.is_cancelled() {
            return Err(IndexError::Cancelled {
                path: self.root.clone(),
            });
        }

        let mut file_set_changed = false;
        for (rel, outcome) in outcomes {
            match outcome {
                Outcome::Unchanged => report.skipped += 1,
                Outcome::Binary => {
                    tracing::trace!(path = %rel.display(), "skipping binary file");
                    report.skipped += 1;
                }
                Outcome::Unreadable(error) => {
                    tracing::warn!(path = %rel.display(), %error, "cannot read file");
                    report.skipped += 1;
                }
                Outcome::Failed(error) => {
                    tracing::warn!(path = %rel.display(), code = error.code(), "unparseable file");
                    report.unparseable.push((rel, error));
                }
                Outcome::Parsed(record, output) => {
                    if store.entry(&rel).is_none() {
                        self.graph.register_file(&rel, record.id);
                        file_set_changed = true;
                    }
                    store.commit(record, output);
                    report.indexed.push(rel);
                }
            }
        }

        let missing: Vec<PathBuf> = known
            .keys()
            .filter(|path| !seen.contains(path))
            .cloned()
            .collect();
        for rel in missing {
            if let Some(record) = store.remove(&rel) {
                self.graph.unregister_file(&rel, record.id);
                file_set_changed = true;
                report.removed.push(rel);
            }
        }

        if file_set_changed {
            self.relink_all(&store);
        } else {
            for rel in &report.indexed {
                if let Some(entry) = store.entry(rel) {
                    self.graph.link_file(&store, entry);
                }
            }
        }

        report.indexed.sort();
        report.removed.sort();
        report.unparseable.sort_by(|a, b| a.0.cmp(&b.0));
        tracing::info!(
            indexed = report.indexed.len(),
            skipped = report.skipped,
            removed = report.removed.len(),
            unparseable = report.unparseable.len(),
            "scan complete"
        );
        Ok(report)
    }

    fn walk(&self) -> Vec<PathBuf> {
        let excluded = self.config.excluded_dir_names();
        let mut paths: Vec<PathBuf> = WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| !is_excluded(e, &excluded))
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| e.path().strip_prefix(&self.root).ok().map(Path::to_path_buf))
            .collect();
        paths.sort();
        paths
    }

    fn examine(&self, rel: &Path, known: Option<(u64, bool)>) -> Outcome {
        let bytes = match fs::read(self.root.join(rel)) {
            Ok(bytes) => bytes,
            Err(error) => return Outcome::Unreadable(error),
        };
        if let Some((hash, dirty)) = known {
            if !dirty && hash == content_hash(&bytes) {
                return Outcome::Unchanged;
            }
        }
        if bytes.len() > self.config.index.max_file_bytes {
            return Outcome::Failed(ParseError::TooLarge {
                path: rel.to_path_buf(),
                size: bytes.len(),
                limit: self.config.index.max_file_bytes,
            });
        }
        let content = match String::from_utf8(bytes) {
            Ok(content) => content,
            Err(_) if Language::from_path(rel) == Language::PlainText => return Outcome::Binary,
            Err(_) => {
                return Outcome::Failed(ParseError::NotUtf8 {
                    path: rel.to_path_buf(),
                })
            }
        };
        match self.parse(rel, &content) {
            Ok((record, output)) => Outcome::Parsed(record, output),
            Err(error) => Outcome::Failed(error),
        }
    }
}

fn is_excluded(entry: &DirEntry, excluded: &[String]) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| excluded.iter().any(|e| e == name))
}
