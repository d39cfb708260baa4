use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Boundary checks that keep every read-for-patch and every write inside the
/// project root and out of the engine's own state.
#[derive(Debug, Clone)]
pub struct WorkspaceGuard {
    /// Canonical project root
    workspace_root: PathBuf,
    /// Canonical (or root-joined, when absent) forbidden directories
    forbidden_paths: Vec<PathBuf>,
}

#[derive(Error, Debug)]
pub enum SafetyError {
    #[error("path is outside workspace: {path} (workspace: {workspace})")]
    OutsideWorkspace { path: PathBuf, workspace: PathBuf },

    #[error("path is in forbidden directory: {path} (forbidden: {forbidden})")]
    ForbiddenPath { path: PathBuf, forbidden: PathBuf },

    #[error("failed to canonicalize {path}: {source}")]
    Canonicalize {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl WorkspaceGuard {
    /// Build a guard for `workspace_root`. The state directory (relative to
    /// the root) and `.git` are always forbidden, as are the cargo registry
    /// and toolchain directories under the user's home.
    pub fn new(workspace_root: impl AsRef<Path>, state_dir: &Path) -> Result<Self, SafetyError> {
        let workspace_root = canonicalize(workspace_root.as_ref())?;

        let mut forbidden_paths = vec![
            workspace_root.join(state_dir),
            workspace_root.join(".git"),
        ];

        if let Some(home) = home::home_dir() {
            for dir in [".cargo/registry", ".cargo/git", ".rustup"] {
                if let Ok(path) = home.join(dir).canonicalize() {
                    forbidden_paths.push(path);
                }
            }
        }

        if let Ok(target_dir) = workspace_root.join("target").canonicalize() {
            forbidden_paths.push(target_dir);
        }

        Ok(Self {
            workspace_root,
            forbidden_paths,
        })
    }

    /// Check that an existing path is safe to patch.
    ///
    /// Returns the canonical absolute path.
    pub fn validate_path(&self, path: impl AsRef<Path>) -> Result<PathBuf, SafetyError> {
        let absolute = self.absolute(path.as_ref());
        let canonical = canonicalize(&absolute)?;
        self.check_canonical(&canonical)?;
        Ok(canonical)
    }

    /// Re-validate a path immediately before writing to it.
    pub fn revalidate(&self, path: &Path) -> Result<PathBuf, SafetyError> {
        self.validate_path(path)
    }

    /// Workspace-relative form of a path, normalized without touching the
    /// filesystem. Fails when the path escapes the root.
    pub fn relativize(&self, path: &Path) -> Result<PathBuf, SafetyError> {
        let absolute = normalize(&self.absolute(path));
        absolute
            .strip_prefix(&self.workspace_root)
            .map(Path::to_path_buf)
            .map_err(|_| SafetyError::OutsideWorkspace {
                path: absolute.clone(),
                workspace: self.workspace_root.clone(),
            })
    }

    fn absolute(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace_root.join(path)
        }
    }

    fn check_canonical(&self, canonical: &Path) -> Result<(), SafetyError> {
        if !canonical.starts_with(&self.workspace_root) {
            return Err(SafetyError::OutsideWorkspace {
                path: canonical.to_path_buf(),
                workspace: self.workspace_root.clone(),
            });
        }

        for forbidden in &self.forbidden_paths {
            if canonical.starts_with(forbidden) {
                return Err(SafetyError::ForbiddenPath {
                    path: canonical.to_path_buf(),
                    forbidden: forbidden.clone(),
                });
            }
        }

        Ok(())
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    #[cfg(test)]
    pub fn with_forbidden(
        workspace_root: impl AsRef<Path>,
        forbidden: Vec<PathBuf>,
    ) -> Result<Self, SafetyError> {
        let workspace_root = canonicalize(workspace_root.as_ref())?;
        Ok(Self {
            workspace_root,
            forbidden_paths: forbidden,
        })
    }
}

fn canonicalize(path: &Path) -> Result<PathBuf, SafetyError> {
    path.canonicalize()
        .map_err(|source| SafetyError::Canonicalize {
            path: path.to_path_buf(),
            source,
        })
}

/// Lexically resolve `.` and `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn accepts_path_inside_workspace() {
        let temp_dir = tempfile::tempdir().unwrap();
        let workspace = temp_dir.path();
        let guard = WorkspaceGuard::new(workspace, Path::new(".patchwright")).unwrap();

        let file = workspace.join("src/main.rs");
        fs::create_dir_all(file.parent().unwrap()).unwrap();
        fs::write(&file, b"").unwrap();

        assert!(guard.validate_path(&file).is_ok());
        assert!(guard.validate_path("src/main.rs").is_ok());
    }

    #[test]
    fn rejects_path_outside_workspace() {
        let temp_dir = tempfile::tempdir().unwrap();
        let workspace = temp_dir.path().join("workspace");
        fs::create_dir_all(&workspace).unwrap();
        let guard = WorkspaceGuard::new(&workspace, Path::new(".patchwright")).unwrap();

        let outside = temp_dir.path().join("outside.rs");
        fs::write(&outside, b"").unwrap();

        let result = guard.validate_path(&outside);
        assert!(matches!(result, Err(SafetyError::OutsideWorkspace { .. })));
    }

    #[test]
    fn rejects_state_dir_and_git() {
        let temp_dir = tempfile::tempdir().unwrap();
        let workspace = temp_dir.path();
        for dir in [".patchwright/snapshots", ".git"] {
            fs::create_dir_all(workspace.join(dir)).unwrap();
        }
        fs::write(workspace.join(".patchwright/snapshots/x"), b"").unwrap();
        fs::write(workspace.join(".git/config"), b"").unwrap();

        let guard = WorkspaceGuard::new(workspace, Path::new(".patchwright")).unwrap();
        assert!(matches!(
            guard.validate_path(".patchwright/snapshots/x"),
            Err(SafetyError::ForbiddenPath { .. })
        ));
        assert!(matches!(
            guard.validate_path(".git/config"),
            Err(SafetyError::ForbiddenPath { .. })
        ));
    }

    #[test]
    fn rejects_custom_forbidden_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let workspace = temp_dir.path();
        let forbidden = workspace.join("vendor");
        fs::create_dir_all(&forbidden).unwrap();
        let guard =
            WorkspaceGuard::with_forbidden(workspace, vec![forbidden.canonicalize().unwrap()])
                .unwrap();

        let file = forbidden.join("lib.py");
        fs::write(&file, b"").unwrap();
        assert!(matches!(
            guard.validate_path(&file),
            Err(SafetyError::ForbiddenPath { .. })
        ));
    }

    #[test]
    fn relativize_normalizes_and_rejects_escape() {
        let temp_dir = tempfile::tempdir().unwrap();
        let guard = WorkspaceGuard::new(temp_dir.path(), Path::new(".patchwright")).unwrap();

        assert_eq!(
            guard.relativize(Path::new("pkg/./sub/../mod.py")).unwrap(),
            PathBuf::from("pkg/mod.py")
        );
        let absolute = guard.workspace_root().join("a.py");
        assert_eq!(guard.relativize(&absolute).unwrap(), PathBuf::from("a.py"));
        assert!(guard.relativize(Path::new("../escape.py")).is_err());
    }

    #[test]
    #[cfg(unix)]
    fn rejects_symlink_escape() {
        use std::os::unix::fs::symlink;

        let temp_dir = tempfile::tempdir().unwrap();
        let workspace = temp_dir.path().join("workspace");
        fs::create_dir_all(&workspace).unwrap();

        let outside = temp_dir.path().join("outside.rs");
        fs::write(&outside, b"").unwrap();
        symlink(&outside, workspace.join("escape.rs")).unwrap();

        let guard = WorkspaceGuard::new(&workspace, Path::new(".patchwright")).unwrap();
        let result = guard.validate_path(workspace.join("escape.rs"));
        assert!(matches!(result, Err(SafetyError::OutsideWorkspace { .. })));
    }
}
