//! Dotted module names derived from file paths, and import resolution
//! against them by peeling trailing segments off the imported path.

use crate::index::model::FileId;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

const PACKAGE_FILES: &[&str] = &["__init__", "mod", "lib", "main", "index"];

#[derive(Debug, Default, Clone)]
pub struct ModuleMap {
    keys: HashMap<String, Vec<FileId>>,
}

impl ModuleMap {
    pub fn insert(&mut self, path: &Path, id: FileId) {
        for key in module_keys(path) {
            let ids = self.keys.entry(key).or_default();
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }

    pub fn remove(&mut self, path: &Path, id: FileId) {
        for key in module_keys(path) {
            if let Some(ids) = self.keys.get_mut(&key) {
                ids.retain(|other| *other != id);
                if ids.is_empty() {
                    self.keys.remove(&key);
                }
            }
        }
    }

    /// Resolve `module` as imported from `importer`. Tries the full dotted
    /// path, then drops one trailing segment at a time (`a.b.C`, `a.b`, `a`).
    pub fn resolve(&self, importer: &Path, module: &str) -> Vec<FileId> {
        let dotted = normalize_import(importer, module);
        let mut segments: Vec<&str> = dotted.split('.').filter(|s| !s.is_empty()).collect();

        while !segments.is_empty() {
            let candidate = segments.join(".");
            if let Some(ids) = self.keys.get(&candidate) {
                return ids.clone();
            }
            if segments.len() >= 2 {
                let suffix = format!(".{candidate}");
                let mut sets: Vec<Vec<FileId>> = self
                    .keys
                    .iter()
                    .filter(|(key, _)| key.ends_with(&suffix))
                    .map(|(_, ids)| {
                        let mut ids = ids.clone();
                        ids.sort();
                        ids
                    })
                    .collect();
                sets.sort();
                sets.dedup();
                if sets.len() == 1 {
                    return sets.remove(0);
                }
            }
            segments.pop();
        }
        Vec::new()
    }
}

/// Every dotted name a file answers to.
fn module_keys(path: &Path) -> Vec<String> {
    let mut parts: Vec<String> = path
        .with_extension("")
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => s.to_str().map(str::to_string),
            _ => None,
        })
        .collect();

    let mut keys = Vec::new();
    if parts.is_empty() {
        return keys;
    }

    let full = parts.join(".");
    if parts.len() > 1 && PACKAGE_FILES.contains(&parts[parts.len() - 1].as_str()) {
        parts.pop();
    }
    let package = parts.join(".");
    keys.push(package.clone());
    if full != package {
        keys.push(full);
    }

    if parts.first().map(String::as_str) == Some("src") {
        let inner = parts[1..].join(".");
        if inner.is_empty() {
            keys.push("crate".to_string());
        } else {
            keys.push(format!("crate.{inner}"));
            keys.push(inner);
        }
    }

    // Go and Java import packages by directory.
    if let Some(parent) = path.parent() {
        let dir: Vec<&str> = parent
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => s.to_str(),
                _ => None,
            })
            .collect();
        let ext = path.extension().and_then(|e| e.to_str());
        if !dir.is_empty() && matches!(ext, Some("go") | Some("java")) {
            keys.push(dir.join("."));
        }
    }

    keys.sort();
    keys.dedup();
    keys
}

/// Rewrite relative and path-style imports into a dotted project path.
fn normalize_import(importer: &Path, module: &str) -> String {
    let importer_dir = importer.parent().unwrap_or(Path::new(""));

    if module.starts_with("./") || module.starts_with("../") {
        let joined = lexical_join(importer_dir, Path::new(module));
        return path_to_dotted(&joined.with_extension(""));
    }

    if module.starts_with('.') {
        // Python relative import: one dot is the importer's package.
        let dots = module.chars().take_while(|c| *c == '.').count();
        let mut base = importer_dir.to_path_buf();
        for _ in 1..dots {
            base.pop();
        }
        let rest = &module[dots..];
        let base = path_to_dotted(&base);
        return match (base.is_empty(), rest.is_empty()) {
            (true, _) => rest.to_string(),
            (false, true) => base,
            (false, false) => format!("{base}.{rest}"),
        };
    }

    if let Some(rest) = module.strip_prefix("super.") {
        let mut base = importer_dir.to_path_buf();
        base.pop();
        let base = path_to_dotted(&base);
        return if base.is_empty() {
            rest.to_string()
        } else {
            format!("{base}.{rest}")
        };
    }
    if let Some(rest) = module.strip_prefix("self.") {
        let base = path_to_dotted(importer_dir);
        return if base.is_empty() {
            rest.to_string()
        } else {
            format!("{base}.{rest}")
        };
    }

    module.replace(['/', ':'], ".").replace("..", ".")
}

fn lexical_join(base: &Path, rel: &Path) -> PathBuf {
    let mut out = base.to_path_buf();
    for component in rel.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn path_to_dotted(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(s) => s.to_str(),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(paths: &[&str]) -> (ModuleMap, Vec<FileId>) {
        let mut modules = ModuleMap::default();
        let ids: Vec<FileId> = paths
            .iter()
            .map(|p| {
                let id = FileId::for_path(Path::new(p));
                modules.insert(Path::new(p), id);
                id
            })
            .collect();
        (modules, ids)
    }

    #[test]
    fn python_peel_back() {
        let (modules, ids) = map(&["pkg/__init__.py", "pkg/utils.py", "app.py"]);
        assert_eq!(
            modules.resolve(Path::new("app.py"), "pkg.utils.validate"),
            vec![ids[1]]
        );
        assert_eq!(modules.resolve(Path::new("app.py"), "pkg.missing"), vec![ids[0]]);
        assert!(modules.resolve(Path::new("app.py"), "os.path").is_empty());
    }

    #[test]
    fn python_relative_imports() {
        let (modules, ids) = map(&["pkg/utils.py", "pkg/app.py"]);
        assert_eq!(
            modules.resolve(Path::new("pkg/app.py"), ".utils.validate"),
            vec![ids[0]]
        );
    }

    #[test]
    fn javascript_relative_paths() {
        let (modules, ids) = map(&["src/util.ts", "src/app/main.ts"]);
        assert_eq!(
            modules.resolve(Path::new("src/app/main.ts"), "../util"),
            vec![ids[0]]
        );
    }

    #[test]
    fn rust_crate_paths() {
        let (modules, ids) = map(&["src/lib.rs", "src/index/mod.rs", "src/index/model.rs"]);
        assert_eq!(
            modules.resolve(Path::new("src/lib.rs"), "crate.index.model.Span"),
            vec![ids[2]]
        );
        assert_eq!(
            modules.resolve(Path::new("src/lib.rs"), "crate.index.SyntaxIndex"),
            vec![ids[1]]
        );
    }

    #[test]
    fn java_suffix_match() {
        let (modules, ids) = map(&["src/main/java/com/acme/Greeter.java"]);
        assert_eq!(
            modules.resolve(Path::new("x.java"), "com.acme.Greeter"),
            vec![ids[0]]
        );
    }

    #[test]
    fn removal_forgets_keys() {
        let (mut modules, ids) = map(&["pkg/utils.py"]);
        modules.remove(Path::new("pkg/utils.py"), ids[0]);
        assert!(modules.resolve(Path::new("a.py"), "pkg.utils").is_empty());
    }
}
