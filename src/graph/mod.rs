//! Directed multigraph of import, call, inheritance and containment edges.
//!
//! Edges are owned by the file they originate from and are recomputed
//! whenever that file is linked. Edges into symbols that have since been
//! deleted survive until their source file is linked again. No cycle
//! detection is performed.

pub mod modules;

use crate::index::model::{FileId, SymbolId};
use crate::index::store::{FileEntry, IndexStore};
use crate::parser::ReferenceKind;
use modules::ModuleMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum NodeRef {
    File(FileId),
    Symbol(SymbolId),
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRef::File(id) => write!(f, "file:{id}"),
            NodeRef::Symbol(id) => write!(f, "symbol:{id}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Import,
    Call,
    Inherit,
    Contains,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub source: NodeRef,
    pub target: NodeRef,
    pub kind: EdgeKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    pub files: usize,
    pub edges: usize,
    pub imports: usize,
    pub calls: usize,
    pub inherits: usize,
    pub contains: usize,
    pub unresolved_imports: usize,
}

#[derive(Debug, Default)]
struct GraphData {
    outgoing: HashMap<NodeRef, Vec<Edge>>,
    incoming: HashMap<NodeRef, Vec<Edge>>,
    owned: HashMap<FileId, Vec<Edge>>,
    unresolved: HashMap<FileId, Vec<String>>,
    modules: ModuleMap,
}

impl GraphData {
    fn add(&mut self, owner: FileId, edge: Edge) {
        self.outgoing.entry(edge.source).or_default().push(edge);
        self.incoming.entry(edge.target).or_default().push(edge);
        self.owned.entry(owner).or_default().push(edge);
    }

    fn clear_owned(&mut self, owner: FileId) {
        let Some(edges) = self.owned.remove(&owner) else {
            return;
        };
        for edge in edges {
            remove_one(&mut self.outgoing, edge.source, &edge);
            remove_one(&mut self.incoming, edge.target, &edge);
        }
        self.unresolved.remove(&owner);
    }
}

fn remove_one(map: &mut HashMap<NodeRef, Vec<Edge>>, key: NodeRef, edge: &Edge) {
    if let Some(edges) = map.get_mut(&key) {
        if let Some(pos) = edges.iter().position(|e| e == edge) {
            edges.swap_remove(pos);
        }
        if edges.is_empty() {
            map.remove(&key);
        }
    }
}

/// Dependency graph handle. Reads and writes go through an internal lock;
/// callers linking files must already hold a read view of the store.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    inner: RwLock<GraphData>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register_file(&self, path: &Path, id: FileId) {
        self.inner.write().modules.insert(path, id);
    }

    pub(crate) fn unregister_file(&self, path: &Path, id: FileId) {
        let mut data = self.inner.write();
        data.modules.remove(path, id);
        data.clear_owned(id);
    }

    /// Recompute every edge originating in `entry`'s file.
    pub(crate) fn link_file(&self, store: &IndexStore, entry: &FileEntry) {
        let file_id = entry.record.id;
        let file_node = NodeRef::File(file_id);
        let mut data = self.inner.write();
        data.clear_owned(file_id);

        for id in &entry.symbols {
            if let Some(symbol) = store.symbol(*id) {
                let source = symbol.parent.map(NodeRef::Symbol).unwrap_or(file_node);
                data.add(
                    file_id,
                    Edge {
                        source,
                        target: NodeRef::Symbol(symbol.id),
                        kind: EdgeKind::Contains,
                    },
                );
            }
        }

        let mut unresolved = Vec::new();
        let mut imported: HashSet<FileId> = HashSet::new();
        for import in &entry.imports {
            let targets = data.modules.resolve(&entry.record.path, &import.module);
            if targets.is_empty() {
                unresolved.push(import.module.clone());
            }
            for target in targets {
                if target == file_id || !imported.insert(target) {
                    continue;
                }
                data.add(
                    file_id,
                    Edge {
                        source: file_node,
                        target: NodeRef::File(target),
                        kind: EdgeKind::Import,
                    },
                );
            }
        }
        if !unresolved.is_empty() {
            data.unresolved.insert(file_id, unresolved);
        }

        let mut seen: HashSet<Edge> = HashSet::new();
        for (reference, enclosing) in &entry.references {
            let source = enclosing.map(NodeRef::Symbol).unwrap_or(file_node);
            let kind = match reference.kind {
                ReferenceKind::Call => EdgeKind::Call,
                ReferenceKind::Inherit => EdgeKind::Inherit,
            };

            let named: Vec<_> = store
                .named(&reference.name)
                .into_iter()
                .filter(|s| s.kind.is_referenceable())
                .collect();
            let local: Vec<_> = named.iter().filter(|s| s.file == file_id).collect();
            let targets: Vec<SymbolId> = if local.is_empty() {
                named.iter().map(|s| s.id).collect()
            } else {
                local.iter().map(|s| s.id).collect()
            };

            for target in targets {
                if Some(target) == *enclosing {
                    continue;
                }
                let edge = Edge {
                    source,
                    target: NodeRef::Symbol(target),
                    kind,
                };
                if seen.insert(edge) {
                    data.add(file_id, edge);
                }
            }
        }

        tracing::trace!(
            path = %entry.record.path.display(),
            edges = data.owned.get(&file_id).map_or(0, Vec::len),
            "linked file"
        );
    }

    pub fn edges_from(&self, node: NodeRef) -> Vec<Edge> {
        self.inner
            .read()
            .outgoing
            .get(&node)
            .cloned()
            .unwrap_or_default()
    }

    pub fn edges_to(&self, node: NodeRef) -> Vec<Edge> {
        self.inner
            .read()
            .incoming
            .get(&node)
            .cloned()
            .unwrap_or_default()
    }

    /// Nodes that transitively depend on `node`, up to `depth` hops of
    /// reverse import/call/inherit edges. A file also stands for every
    /// symbol it contains. The starting nodes are not part of the result.
    pub fn affected_by(&self, node: NodeRef, depth: usize) -> Vec<NodeRef> {
        let data = self.inner.read();
        let depth = depth.max(1);

        let mut seeds = vec![node];
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            for edge in data.outgoing.get(&current).into_iter().flatten() {
                if edge.kind == EdgeKind::Contains {
                    seeds.push(edge.target);
                    stack.push(edge.target);
                }
            }
        }

        let mut visited: HashSet<NodeRef> = seeds.iter().copied().collect();
        let mut queue: VecDeque<(NodeRef, usize)> = seeds.iter().map(|n| (*n, 0)).collect();
        let mut affected = Vec::new();

        while let Some((current, hops)) = queue.pop_front() {
            if hops >= depth {
                continue;
            }
            for edge in data.incoming.get(&current).into_iter().flatten() {
                if edge.kind == EdgeKind::Contains {
                    continue;
                }
                if visited.insert(edge.source) {
                    affected.push(edge.source);
                    queue.push_back((edge.source, hops + 1));
                }
            }
        }

        affected.sort();
        affected
    }

    /// Files that `file` imports or references symbols from.
    pub fn dependencies_of(&self, store: &IndexStore, file: FileId) -> Vec<FileId> {
        let data = self.inner.read();
        let mut out: Vec<FileId> = data
            .owned
            .get(&file)
            .into_iter()
            .flatten()
            .filter(|e| e.kind != EdgeKind::Contains)
            .filter_map(|e| owning_file(store, e.target))
            .filter(|target| *target != file)
            .collect();
        out.sort();
        out.dedup();
        out
    }

    /// Files with edges into `file` or into its symbols.
    pub fn dependents_of(&self, store: &IndexStore, file: FileId) -> Vec<FileId> {
        let data = self.inner.read();
        let mut out: Vec<FileId> = data
            .owned
            .iter()
            .filter(|(owner, _)| **owner != file)
            .filter(|(_, edges)| {
                edges.iter().any(|e| {
                    e.kind != EdgeKind::Contains && owning_file(store, e.target) == Some(file)
                })
            })
            .map(|(owner, _)| *owner)
            .collect();
        out.sort();
        out
    }

    pub fn unresolved_imports(&self, file: FileId) -> Vec<String> {
        self.inner
            .read()
            .unresolved
            .get(&file)
            .cloned()
            .unwrap_or_default()
    }

    pub fn stats(&self) -> GraphStats {
        let data = self.inner.read();
        let mut stats = GraphStats {
            files: data.owned.len(),
            unresolved_imports: data.unresolved.values().map(Vec::len).sum(),
            ..GraphStats::default()
        };
        for edge in data.owned.values().flatten() {
            stats.edges += 1;
            match edge.kind {
                EdgeKind::Import => stats.imports += 1,
                EdgeKind::Call => stats.calls += 1,
                EdgeKind::Inherit => stats.inherits += 1,
                EdgeKind::Contains => stats.contains += 1,
            }
        }
        stats
    }
}

fn owning_file(store: &IndexStore, node: NodeRef) -> Option<FileId> {
    match node {
        NodeRef::File(id) => Some(id),
        NodeRef::Symbol(id) => store.symbol(id).map(|s| s.file),
    }
}
