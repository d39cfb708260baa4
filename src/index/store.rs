use super::model::{FileId, FileRecord, Symbol, SymbolId};
use crate::parser::{ParseOutput, ParsedImport, RawReference};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Everything the index keeps for one file.
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub record: FileRecord,
    /// Symbols in source order
    pub symbols: Vec<SymbolId>,
    pub imports: Vec<ParsedImport>,
    /// References with `enclosing` already mapped to symbol ids
    pub references: Vec<(RawReference, Option<SymbolId>)>,
}

/// In-memory symbol store. Callers hold the index lock around it.
#[derive(Debug, Default)]
pub struct IndexStore {
    files: HashMap<PathBuf, FileEntry>,
    by_id: HashMap<FileId, PathBuf>,
    symbols: HashMap<SymbolId, Symbol>,
    by_name: HashMap<String, Vec<SymbolId>>,
    version: u64,
}

impl IndexStore {
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn entry(&self, path: &Path) -> Option<&FileEntry> {
        self.files.get(path)
    }

    pub fn entry_by_id(&self, id: FileId) -> Option<&FileEntry> {
        self.by_id.get(&id).and_then(|path| self.files.get(path))
    }

    pub fn entries(&self) -> impl Iterator<Item = &FileEntry> {
        self.files.values()
    }

    pub fn symbol(&self, id: SymbolId) -> Option<&Symbol> {
        self.symbols.get(&id)
    }

    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.values()
    }

    pub fn symbols_in(&self, path: &Path) -> Vec<Symbol> {
        self.files
            .get(path)
            .map(|entry| {
                entry
                    .symbols
                    .iter()
                    .filter_map(|id| self.symbols.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn named(&self, name: &str) -> Vec<&Symbol> {
        self.by_name
            .get(name)
            .map(|ids| ids.iter().filter_map(|id| self.symbols.get(id)).collect())
            .unwrap_or_default()
    }

    /// Replace everything recorded for `record.path` with a fresh parse.
    pub fn commit(&mut self, record: FileRecord, output: ParseOutput) -> Vec<Symbol> {
        let path = record.path.clone();
        self.drop_symbols(&path);

        let mut ordinals: HashMap<(super::model::SymbolKind, String), usize> = HashMap::new();
        let mut ids: Vec<SymbolId> = Vec::with_capacity(output.symbols.len());
        let mut symbols = Vec::with_capacity(output.symbols.len());

        for parsed in output.symbols {
            let key = (parsed.kind, parsed.qualified_name.clone());
            let ordinal = ordinals.entry(key).or_insert(0);
            let id = SymbolId::derive(&path, parsed.kind, &parsed.qualified_name, *ordinal);
            *ordinal += 1;

            let symbol = Symbol {
                id,
                kind: parsed.kind,
                name: parsed.name,
                qualified_name: parsed.qualified_name,
                file: record.id,
                path: path.clone(),
                span: parsed.span,
                signature: parsed.signature,
                doc_span: parsed.doc_span,
                doc_exclusive: parsed.doc_exclusive,
                parent: parsed.parent.and_then(|i| ids.get(i).copied()),
            };
            ids.push(id);
            symbols.push(symbol);
        }

        let references = output
            .references
            .into_iter()
            .map(|r| {
                let enclosing = r.enclosing.and_then(|i| ids.get(i).copied());
                (r, enclosing)
            })
            .collect();

        for symbol in &symbols {
            self.by_name
                .entry(symbol.name.clone())
                .or_default()
                .push(symbol.id);
            self.symbols.insert(symbol.id, symbol.clone());
        }

        self.by_id.insert(record.id, path.clone());
        self.files.insert(
            path,
            FileEntry {
                record,
                symbols: ids,
                imports: output.imports,
                references,
            },
        );
        self.version += 1;
        symbols
    }

    pub fn mark_dirty(&mut self, path: &Path) -> bool {
        match self.files.get_mut(path) {
            Some(entry) => {
                entry.record.dirty = true;
                self.version += 1;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, path: &Path) -> Option<FileRecord> {
        self.drop_symbols(path);
        let entry = self.files.remove(path)?;
        self.by_id.remove(&entry.record.id);
        self.version += 1;
        Some(entry.record)
    }

    fn drop_symbols(&mut self, path: &Path) {
        let Some(entry) = self.files.get(path) else {
            return;
        };
        for id in &entry.symbols {
            if let Some(symbol) = self.symbols.remove(id) {
                if let Some(ids) = self.by_name.get_mut(&symbol.name) {
                    ids.retain(|other| other != id);
                    if ids.is_empty() {
                        self.by_name.remove(&symbol.name);
                    }
                }
            }
        }
    }
}
