//! Structural index of a project: file records, symbols and the dependency
//! graph derived from them.
//!
//! [`SyntaxIndex`] is an explicit handle created when a project is opened.
//! Reads return cloned data. Writes replace a file's whole record in one
//! commit under the store lock, after parsing has finished outside it. The
//! store lock is always taken before the graph lock.

pub mod lookup;
pub mod model;
mod scan;
pub mod store;

pub use lookup::{LookupError, SymbolDescriptor};
pub use scan::ScanReport;

use crate::cancel::CancellationToken;
use crate::config::ProjectConfig;
use crate::errors::{IndexError, ParseError};
use crate::graph::{DependencyGraph, Edge, GraphStats, NodeRef};
use crate::lang::Language;
use crate::parser::{ParseOutput, ParserRegistry};
use crate::safety::WorkspaceGuard;
use chrono::Utc;
use model::{content_hash, FileId, FileRecord, Symbol, SymbolId};
use parking_lot::RwLock;
use std::fs;
use std::path::{Path, PathBuf};
use store::IndexStore;

/// Result of indexing one file.
#[derive(Debug, Clone)]
pub struct IndexedFile {
    pub record: FileRecord,
    pub symbols: Vec<Symbol>,
}

impl IndexedFile {
    pub fn hash(&self) -> u64 {
        self.record.content_hash
    }
}

pub struct SyntaxIndex {
    root: PathBuf,
    config: ProjectConfig,
    guard: WorkspaceGuard,
    registry: ParserRegistry,
    store: RwLock<IndexStore>,
    graph: DependencyGraph,
}

impl SyntaxIndex {
    pub fn new(
        root: impl AsRef<Path>,
        config: &ProjectConfig,
        registry: ParserRegistry,
    ) -> Result<Self, IndexError> {
        let guard = WorkspaceGuard::new(root, &config.transaction.state_dir)?;
        Ok(Self {
            root: guard.workspace_root().to_path_buf(),
            config: config.clone(),
            guard,
            registry,
            store: RwLock::new(IndexStore::default()),
            graph: DependencyGraph::new(),
        })
    }

    /// Canonical project root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn guard(&self) -> &WorkspaceGuard {
        &self.guard
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Store version; bumps on every commit, removal or invalidation.
    pub fn version(&self) -> u64 {
        self.store.read().version()
    }

    /// Read `path` from disk and index it.
    pub fn index_file(&self, path: impl AsRef<Path>) -> Result<IndexedFile, IndexError> {
        let rel = self.relative(path.as_ref())?;
        let absolute = self.guard.validate_path(&rel)?;
        let content = self.read_source(&absolute, &rel)?;
        self.commit_parsed(&rel, &content, None)
    }

    /// Index `content` as the current text of `path`.
    ///
    /// The prior record is replaced only after parsing succeeds and `cancel`
    /// is still unset. Any failure leaves it untouched.
    pub fn index_content(
        &self,
        path: impl AsRef<Path>,
        content: &str,
        cancel: &CancellationToken,
    ) -> Result<IndexedFile, IndexError> {
        let rel = self.relative(path.as_ref())?;
        if content.len() > self.config.index.max_file_bytes {
            return Err(ParseError::TooLarge {
                path: rel,
                size: content.len(),
                limit: self.config.index.max_file_bytes,
            }
            .into());
        }
        self.commit_parsed(&rel, content, Some(cancel))
    }

    fn commit_parsed(
        &self,
        rel: &Path,
        content: &str,
        cancel: Option<&CancellationToken>,
    ) -> Result<IndexedFile, IndexError> {
        let cancelled = || cancel.is_some_and(CancellationToken::is_cancelled);
        if cancelled() {
            return Err(IndexError::Cancelled {
                path: rel.to_path_buf(),
            });
        }

        let (record, output) = self.parse(rel, content)?;

        let mut store = self.store.write();
        if cancelled() {
            return Err(IndexError::Cancelled {
                path: rel.to_path_buf(),
            });
        }

        let is_new = store.entry(rel).is_none();
        let symbols = store.commit(record.clone(), output);
        if is_new {
            self.graph.register_file(rel, record.id);
            self.relink_all(&store);
        } else if let Some(entry) = store.entry(rel) {
            self.graph.link_file(&store, entry);
        }

        tracing::debug!(
            path = %rel.display(),
            language = %record.language,
            symbols = symbols.len(),
            "indexed file"
        );
        Ok(IndexedFile { record, symbols })
    }

    /// Commit files parsed with [`SyntaxIndex::parse`] under one store
    /// write. Nothing is committed when `cancel` is set once the lock is
    /// held. Output follows input order.
    pub(crate) fn commit_all(
        &self,
        parsed: Vec<(FileRecord, ParseOutput)>,
        cancel: &CancellationToken,
    ) -> Result<Vec<IndexedFile>, IndexError> {
        if parsed.is_empty() {
            return Ok(Vec::new());
        }
        let mut store = self.store.write();
        if cancel.is_cancelled() {
            return Err(IndexError::Cancelled {
                path: self.root.clone(),
            });
        }

        let mut file_set_changed = false;
        let mut committed = Vec::with_capacity(parsed.len());
        for (record, output) in parsed {
            if store.entry(&record.path).is_none() {
                self.graph.register_file(&record.path, record.id);
                file_set_changed = true;
            }
            let symbols = store.commit(record.clone(), output);
            committed.push(IndexedFile { record, symbols });
        }
        if file_set_changed {
            self.relink_all(&store);
        } else {
            for file in &committed {
                if let Some(entry) = store.entry(&file.record.path) {
                    self.graph.link_file(&store, entry);
                }
            }
        }
        tracing::debug!(files = committed.len(), "committed parsed files");
        Ok(committed)
    }

    /// Parse outside any lock and build the record the commit will store.
    pub(crate) fn parse(
        &self,
        rel: &Path,
        content: &str,
    ) -> Result<(FileRecord, ParseOutput), ParseError> {
        let language = Language::from_path(rel);
        let output = self.registry.parse(language, rel, content)?;
        let record = FileRecord {
            id: FileId::for_path(rel),
            path: rel.to_path_buf(),
            language,
            content_hash: content_hash(content.as_bytes()),
            indexed_at: Utc::now(),
            size_bytes: content.len(),
            line_count: content.lines().count(),
            syntax_errors: output.has_errors,
            dirty: false,
        };
        Ok((record, output))
    }

    pub(crate) fn read_source(&self, absolute: &Path, rel: &Path) -> Result<String, IndexError> {
        let bytes = fs::read(absolute).map_err(|e| IndexError::io(rel, e))?;
        if bytes.len() > self.config.index.max_file_bytes {
            return Err(ParseError::TooLarge {
                path: rel.to_path_buf(),
                size: bytes.len(),
                limit: self.config.index.max_file_bytes,
            }
            .into());
        }
        String::from_utf8(bytes).map_err(|_| {
            ParseError::NotUtf8 {
                path: rel.to_path_buf(),
            }
            .into()
        })
    }

    fn relink_all(&self, store: &IndexStore) {
        for entry in store.entries() {
            self.graph.link_file(store, entry);
        }
    }

    /// True when the file is not indexed, was invalidated, or its on-disk
    /// hash differs from the recorded one.
    pub fn is_stale(&self, path: impl AsRef<Path>) -> Result<bool, IndexError> {
        let rel = self.relative(path.as_ref())?;
        let bytes = fs::read(self.root.join(&rel)).map_err(|e| IndexError::io(&rel, e))?;
        let live = content_hash(&bytes);
        Ok(self
            .store
            .read()
            .entry(&rel)
            .map_or(true, |entry| entry.record.is_stale_against(live)))
    }

    /// Re-index `path` when stale and return its current record.
    pub fn ensure_fresh(&self, path: impl AsRef<Path>) -> Result<FileRecord, IndexError> {
        let rel = self.relative(path.as_ref())?;
        if self.is_stale(&rel)? {
            return Ok(self.index_file(&rel)?.record);
        }
        self.file(&rel)
            .ok_or(IndexError::NotIndexed { path: rel })
    }

    /// Mark a record dirty so the next freshness check re-indexes it.
    pub fn invalidate(&self, path: impl AsRef<Path>) -> bool {
        match self.relative(path.as_ref()) {
            Ok(rel) => self.store.write().mark_dirty(&rel),
            Err(_) => false,
        }
    }

    /// Forget a file and every edge it owns.
    pub fn remove(&self, path: impl AsRef<Path>) -> Option<FileRecord> {
        let rel = self.relative(path.as_ref()).ok()?;
        let mut store = self.store.write();
        let record = store.remove(&rel)?;
        self.graph.unregister_file(&rel, record.id);
        self.relink_all(&store);
        Some(record)
    }

    pub fn lookup(&self, descriptor: &SymbolDescriptor) -> Result<Symbol, LookupError> {
        let store = self.store.read();
        match descriptor {
            SymbolDescriptor::Id { id } => store.symbol(*id).cloned().ok_or(LookupError::NotFound),
            SymbolDescriptor::Name { name, .. } => {
                lookup::select(store.named(last_segment(name)), descriptor)
            }
            SymbolDescriptor::Signature { file, .. } => {
                let rel = self.relative(file).map_err(|_| LookupError::NotFound)?;
                lookup::select(&store.symbols_in(&rel), descriptor)
            }
        }
    }

    /// Files that may hold the symbol a descriptor names.
    pub fn candidate_files(&self, descriptor: &SymbolDescriptor) -> Vec<PathBuf> {
        let store = self.store.read();
        let mut paths: Vec<PathBuf> = match descriptor {
            SymbolDescriptor::Id { id } => store.symbol(*id).map(|s| s.path.clone()).into_iter().collect(),
            SymbolDescriptor::Name { name, file, .. } => match file {
                Some(file) => self.relative(file).ok().into_iter().collect(),
                None => store
                    .named(last_segment(name))
                    .into_iter()
                    .map(|s| s.path.clone())
                    .collect(),
            },
            SymbolDescriptor::Signature { file, .. } => self.relative(file).ok().into_iter().collect(),
        };
        paths.sort();
        paths.dedup();
        paths
    }

    pub fn symbol(&self, id: SymbolId) -> Option<Symbol> {
        self.store.read().symbol(id).cloned()
    }

    pub fn symbols_in(&self, path: impl AsRef<Path>) -> Vec<Symbol> {
        match self.relative(path.as_ref()) {
            Ok(rel) => self.store.read().symbols_in(&rel),
            Err(_) => Vec::new(),
        }
    }

    pub fn file(&self, path: impl AsRef<Path>) -> Option<FileRecord> {
        let rel = self.relative(path.as_ref()).ok()?;
        self.store.read().entry(&rel).map(|e| e.record.clone())
    }

    pub fn file_by_id(&self, id: FileId) -> Option<FileRecord> {
        self.store.read().entry_by_id(id).map(|e| e.record.clone())
    }

    /// Every indexed file, sorted by path.
    pub fn files(&self) -> Vec<FileRecord> {
        let mut files: Vec<FileRecord> = self
            .store
            .read()
            .entries()
            .map(|e| e.record.clone())
            .collect();
        files.sort_by(|a, b| a.path.cmp(&b.path));
        files
    }

    pub fn edges_from(&self, node: NodeRef) -> Vec<Edge> {
        self.graph.edges_from(node)
    }

    pub fn edges_to(&self, node: NodeRef) -> Vec<Edge> {
        self.graph.edges_to(node)
    }

    pub fn affected_by(&self, node: NodeRef, depth: usize) -> Vec<NodeRef> {
        self.graph.affected_by(node, depth)
    }

    /// Paths of the files `path` depends on.
    pub fn dependencies_of(&self, path: impl AsRef<Path>) -> Vec<PathBuf> {
        let Some(record) = self.file(path) else {
            return Vec::new();
        };
        let store = self.store.read();
        self.graph
            .dependencies_of(&store, record.id)
            .into_iter()
            .filter_map(|id| store.entry_by_id(id).map(|e| e.record.path.clone()))
            .collect()
    }

    /// Paths of the files that depend on `path`.
    pub fn dependents_of(&self, path: impl AsRef<Path>) -> Vec<PathBuf> {
        let Some(record) = self.file(path) else {
            return Vec::new();
        };
        let store = self.store.read();
        let mut paths: Vec<PathBuf> = self
            .graph
            .dependents_of(&store, record.id)
            .into_iter()
            .filter_map(|id| store.entry_by_id(id).map(|e| e.record.path.clone()))
            .collect();
        paths.sort();
        paths
    }

    pub fn unresolved_imports(&self, path: impl AsRef<Path>) -> Vec<String> {
        self.file(path)
            .map(|record| self.graph.unresolved_imports(record.id))
            .unwrap_or_default()
    }

    pub fn graph_stats(&self) -> GraphStats {
        self.graph.stats()
    }

    /// Display form of a graph node: a path, or `path::qualified.name`.
    pub fn describe(&self, node: NodeRef) -> String {
        let store = self.store.read();
        match node {
            NodeRef::File(id) => store
                .entry_by_id(id)
                .map(|e| model::path_key(&e.record.path))
                .unwrap_or_else(|| node.to_string()),
            NodeRef::Symbol(id) => store
                .symbol(id)
                .map(|s| format!("{}::{}", model::path_key(&s.path), s.qualified_name))
                .unwrap_or_else(|| node.to_string()),
        }
    }

    /// Workspace-relative form of a caller-supplied path.
    pub fn relative(&self, path: &Path) -> Result<PathBuf, IndexError> {
        Ok(self.guard.relativize(path)?)
    }
}

impl std::fmt::Debug for SyntaxIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyntaxIndex")
            .field("root", &self.root)
            .field("version", &self.version())
            .finish()
    }
}

fn last_segment(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::EdgeKind;
    use proptest::prelude::*;
    use std::collections::HashSet;
    use tempfile::TempDir;

    fn project(files: &[(&str, &str)]) -> (TempDir, SyntaxIndex) {
        let dir = TempDir::new().unwrap();
        for (path, content) in files {
            let full = dir.path().join(path);
            fs::create_dir_all(full.parent().unwrap()).unwrap();
            fs::write(full, content).unwrap();
        }
        let index =
            SyntaxIndex::new(dir.path(), &ProjectConfig::default(), ParserRegistry::default())
                .unwrap();
        (dir, index)
    }

    const UTILS: &str = "def a():\n    return 1\n\n\ndef validate_x(v):\n    return a() > v\n\n\ndef b():\n    return validate_x(2)\n";

    #[test]
    fn reindex_is_idempotent() {
        let (_dir, index) = project(&[("utils.py", UTILS)]);
        let first = index.index_file("utils.py").unwrap();
        let second = index.index_file("utils.py").unwrap();

        let ids = |f: &IndexedFile| f.symbols.iter().map(|s| s.id).collect::<Vec<_>>();
        assert_eq!(ids(&first), ids(&second));
        assert_eq!(first.hash(), second.hash());
    }

    #[test]
    fn staleness_follows_disk() {
        let (dir, index) = project(&[("utils.py", UTILS)]);
        assert!(index.is_stale("utils.py").unwrap());
        index.index_file("utils.py").unwrap();
        assert!(!index.is_stale("utils.py").unwrap());

        fs::write(dir.path().join("utils.py"), "def a():\n    pass\n").unwrap();
        assert!(index.is_stale("utils.py").unwrap());

        let record = index.ensure_fresh("utils.py").unwrap();
        assert!(!record.dirty);
        assert!(!index.is_stale("utils.py").unwrap());
        assert!(index.lookup(&SymbolDescriptor::name("validate_x")).is_err());
    }

    #[test]
    fn invalidate_forces_reindex() {
        let (_dir, index) = project(&[("utils.py", UTILS)]);
        index.index_file("utils.py").unwrap();
        assert!(index.invalidate("utils.py"));
        assert!(index.is_stale("utils.py").unwrap());
    }

    #[test]
    fn cancelled_index_leaves_prior_record() {
        let (_dir, index) = project(&[("utils.py", UTILS)]);
        let before = index.index_file("utils.py").unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = index
            .index_content("utils.py", "def other():\n    pass\n", &cancel)
            .unwrap_err();
        assert!(matches!(err, IndexError::Cancelled { .. }));

        let record = index.file("utils.py").unwrap();
        assert_eq!(record.content_hash, before.record.content_hash);
        assert!(index.lookup(&SymbolDescriptor::name("validate_x")).is_ok());
    }

    #[test]
    fn oversized_content_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut config = ProjectConfig::default();
        config.index.max_file_bytes = 8;
        let index = SyntaxIndex::new(dir.path(), &config, ParserRegistry::default()).unwrap();
        let err = index
            .index_content("big.py", "x = 1234567890\n", &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, IndexError::Parse(ParseError::TooLarge { .. })));
        assert!(index.file("big.py").is_none());
    }

    #[test]
    fn call_edges_link_symbols() {
        let (_dir, index) = project(&[("utils.py", UTILS)]);
        index.index_file("utils.py").unwrap();

        let validate = index.lookup(&SymbolDescriptor::name("validate_x")).unwrap();
        let b = index.lookup(&SymbolDescriptor::name("b")).unwrap();
        let incoming = index.edges_to(NodeRef::Symbol(validate.id));
        assert!(incoming
            .iter()
            .any(|e| e.kind == EdgeKind::Call && e.source == NodeRef::Symbol(b.id)));

        let affected = index.affected_by(NodeRef::Symbol(validate.id), 1);
        assert_eq!(affected, vec![NodeRef::Symbol(b.id)]);
    }

    #[test]
    fn imports_resolve_across_files() {
        let (_dir, index) = project(&[
            ("pkg/__init__.py", ""),
            ("pkg/utils.py", "def helper():\n    return 1\n"),
            ("app.py", "from pkg.utils import helper\n\n\ndef main():\n    return helper()\n"),
        ]);
        for path in ["pkg/__init__.py", "pkg/utils.py", "app.py"] {
            index.index_file(path).unwrap();
        }

        assert_eq!(
            index.dependencies_of("app.py"),
            vec![PathBuf::from("pkg/utils.py")]
        );
        assert_eq!(
            index.dependents_of("pkg/utils.py"),
            vec![PathBuf::from("app.py")]
        );
        assert!(index.unresolved_imports("app.py").is_empty());
    }

    #[test]
    fn import_order_does_not_matter() {
        let (_dir, index) = project(&[
            ("a.py", "import b\n"),
            ("b.py", "import a\n"),
        ]);
        index.index_file("a.py").unwrap();
        assert_eq!(index.unresolved_imports("a.py"), vec!["b".to_string()]);
        index.index_file("b.py").unwrap();
        assert!(index.unresolved_imports("a.py").is_empty());

        let a = index.file("a.py").unwrap();
        let b = index.file("b.py").unwrap();
        let affected = index.affected_by(NodeRef::File(a.id), 5);
        assert_eq!(affected, vec![NodeRef::File(b.id)]);
    }

    #[test]
    fn removal_drops_symbols_and_edges() {
        let (_dir, index) = project(&[("utils.py", UTILS)]);
        index.index_file("utils.py").unwrap();
        assert!(index.remove("utils.py").is_some());
        assert!(index.files().is_empty());
        assert_eq!(index.graph_stats().edges, 0);
    }

    fn python_module(calls: &[Option<usize>]) -> String {
        calls
            .iter()
            .enumerate()
            .map(|(i, call)| match call {
                Some(target) if *target < i => format!("def f{i}(x):\n    return f{target}(x)\n"),
                _ => format!("def f{i}(x):\n    return x + {i}\n"),
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    fn index_state(index: &SyntaxIndex) -> (Vec<Symbol>, Vec<HashSet<Edge>>, GraphStats) {
        let symbols = index.symbols_in("mod.py");
        let edges = symbols
            .iter()
            .map(|s| index.edges_from(NodeRef::Symbol(s.id)).into_iter().collect())
            .collect();
        (symbols, edges, index.graph_stats())
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]
        #[test]
        fn reindexing_same_bytes_is_idempotent(
            calls in prop::collection::vec(prop::option::of(0usize..8), 1..8),
            detour in prop::collection::vec(prop::option::of(0usize..8), 1..8),
        ) {
            let content = python_module(&calls);
            let (dir, index) = project(&[("mod.py", content.as_str())]);
            index.index_file("mod.py").unwrap();
            let first = index_state(&index);

            index.index_file("mod.py").unwrap();
            prop_assert_eq!(&index_state(&index), &first);

            // A different version in between must not leave traces.
            fs::write(dir.path().join("mod.py"), python_module(&detour)).unwrap();
            index.index_file("mod.py").unwrap();
            fs::write(dir.path().join("mod.py"), &content).unwrap();
            index.index_file("mod.py").unwrap();
            prop_assert_eq!(&index_state(&index), &first);
        }
    }

    #[test]
    fn paths_outside_root_are_refused() {
        let (_dir, index) = project(&[]);
        assert!(matches!(
            index.index_file("../escape.py"),
            Err(IndexError::Safety(_))
        ));
    }
}
