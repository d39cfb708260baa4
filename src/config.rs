//! Project configuration read from `patchwright.toml` at the project root.
//!
//! Every field has a default, so an absent or partial file is valid.
//!
//! ```toml
//! [index]
//! max_file_bytes = 1048576
//! exclude_dirs = [".git", "target", "node_modules"]
//! workers = 0
//!
//! [anchor]
//! similarity_threshold = 0.85
//! tie_margin = 0.02
//! window_tolerance = 0.2
//!
//! [transaction]
//! state_dir = ".patchwright"
//! validate_syntax = true
//! keep_history = true
//! ```

use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "patchwright.toml";

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct ProjectConfig {
    pub index: IndexConfig,
    pub anchor: AnchorConfig,
    pub transaction: TransactionConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IndexConfig {
    /// Files above this size are reported as too large and not indexed
    pub max_file_bytes: usize,
    /// Directory names skipped during a scan, at any depth
    pub exclude_dirs: Vec<String>,
    /// Indexing worker threads; 0 uses the rayon default
    pub workers: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: 1024 * 1024,
            exclude_dirs: [
                ".git",
                "target",
                "node_modules",
                "__pycache__",
                "venv",
                ".venv",
                "dist",
                "build",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            workers: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnchorConfig {
    pub similarity_threshold: f64,
    pub tie_margin: f64,
    pub window_tolerance: f64,
}

impl Default for AnchorConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.85,
            tie_margin: 0.02,
            window_tolerance: 0.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransactionConfig {
    /// Relative to the project root
    pub state_dir: PathBuf,
    pub validate_syntax: bool,
    pub keep_history: bool,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from(".patchwright"),
            validate_syntax: true,
            keep_history: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValidationIssue {
    OutOfRange {
        field: &'static str,
        value: f64,
        expected: &'static str,
    },
    Empty {
        field: &'static str,
    },
    AbsolutePath {
        field: &'static str,
        path: PathBuf,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::OutOfRange {
                field,
                value,
                expected,
            } => write!(f, "{field} = {value} is out of range, expected {expected}"),
            ValidationIssue::Empty { field } => write!(f, "{field} must not be empty"),
            ValidationIssue::AbsolutePath { field, path } => write!(
                f,
                "{field} must be relative to the project root, got {}",
                path.display()
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.issues.iter().map(|i| i.to_string()).collect();
        write!(f, "{}", parts.join("; "))
    }
}

impl std::error::Error for ValidationError {}

impl ProjectConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();
        let anchor = &self.anchor;

        if !(anchor.similarity_threshold > 0.0 && anchor.similarity_threshold <= 1.0) {
            issues.push(ValidationIssue::OutOfRange {
                field: "anchor.similarity_threshold",
                value: anchor.similarity_threshold,
                expected: "(0, 1]",
            });
        }
        if !(0.0..1.0).contains(&anchor.tie_margin) {
            issues.push(ValidationIssue::OutOfRange {
                field: "anchor.tie_margin",
                value: anchor.tie_margin,
                expected: "[0, 1)",
            });
        }
        if !(0.0..1.0).contains(&anchor.window_tolerance) {
            issues.push(ValidationIssue::OutOfRange {
                field: "anchor.window_tolerance",
                value: anchor.window_tolerance,
                expected: "[0, 1)",
            });
        }
        if self.index.max_file_bytes == 0 {
            issues.push(ValidationIssue::OutOfRange {
                field: "index.max_file_bytes",
                value: 0.0,
                expected: "> 0",
            });
        }

        let state_dir = &self.transaction.state_dir;
        if state_dir.as_os_str().is_empty() {
            issues.push(ValidationIssue::Empty {
                field: "transaction.state_dir",
            });
        } else if state_dir.is_absolute() {
            issues.push(ValidationIssue::AbsolutePath {
                field: "transaction.state_dir",
                path: state_dir.clone(),
            });
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }

    /// Directory names excluded from scans, including the state directory.
    pub fn excluded_dir_names(&self) -> Vec<String> {
        let mut names = self.index.exclude_dirs.clone();
        if let Some(first) = self
            .transaction
            .state_dir
            .components()
            .next()
            .and_then(|c| c.as_os_str().to_str())
        {
            if !names.iter().any(|n| n == first) {
                names.push(first.to_string());
            }
        }
        names
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Toml {
        path: Option<PathBuf>,
        source: toml_edit::de::Error,
    },
    Validation {
        path: Option<PathBuf>,
        source: ValidationError,
    },
}

impl ConfigError {
    fn with_path(self, path: &Path) -> Self {
        let path = path.to_path_buf();
        match self {
            ConfigError::Toml { path: None, source } => ConfigError::Toml {
                path: Some(path),
                source,
            },
            ConfigError::Validation { path: None, source } => ConfigError::Validation {
                path: Some(path),
                source,
            },
            other => other,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "failed to read config from {}: {}", path.display(), source)
            }
            ConfigError::Toml { path, source } => match path {
                Some(path) => write!(f, "failed to parse config ({}): {}", path.display(), source),
                None => write!(f, "failed to parse config: {}", source),
            },
            ConfigError::Validation { path, source } => match path {
                Some(path) => write!(f, "invalid config ({}): {}", path.display(), source),
                None => write!(f, "invalid config: {}", source),
            },
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Toml { source, .. } => Some(source),
            ConfigError::Validation { source, .. } => Some(source),
        }
    }
}

pub fn load_from_str(input: &str) -> Result<ProjectConfig, ConfigError> {
    let config: ProjectConfig = toml_edit::de::from_str(input)
        .map_err(|source| ConfigError::Toml { path: None, source })?;
    config
        .validate()
        .map_err(|source| ConfigError::Validation { path: None, source })?;
    Ok(config)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<ProjectConfig, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    load_from_str(&contents).map_err(|error| error.with_path(path))
}

/// Load `<root>/patchwright.toml`, falling back to defaults when it is absent.
pub fn load_for_root(root: &Path) -> Result<ProjectConfig, ConfigError> {
    let path = root.join(CONFIG_FILE_NAME);
    if path.is_file() {
        tracing::debug!(path = %path.display(), "loading project config");
        load_from_path(&path)
    } else {
        Ok(ProjectConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_yields_defaults() {
        let config = load_from_str("").unwrap();
        assert_eq!(config, ProjectConfig::default());
        assert_eq!(config.index.max_file_bytes, 1024 * 1024);
        assert_eq!(config.anchor.similarity_threshold, 0.85);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = load_from_str(
            r#"
[anchor]
similarity_threshold = 0.9

[transaction]
state_dir = ".state"
"#,
        )
        .unwrap();
        assert_eq!(config.anchor.similarity_threshold, 0.9);
        assert_eq!(config.anchor.tie_margin, 0.02);
        assert_eq!(config.transaction.state_dir, PathBuf::from(".state"));
        assert!(config.transaction.validate_syntax);
    }

    #[test]
    fn validation_collects_every_issue() {
        let err = load_from_str(
            r#"
[anchor]
similarity_threshold = 1.5
tie_margin = -0.1

[transaction]
state_dir = ""
"#,
        )
        .unwrap_err();
        match err {
            ConfigError::Validation { source, .. } => assert_eq!(source.issues.len(), 3),
            other => panic!("expected validation error, got {other}"),
        }
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = load_from_str("[index]\nmax_bytes = 3\n").unwrap_err();
        assert!(matches!(err, ConfigError::Toml { .. }));
    }

    #[test]
    fn state_dir_is_excluded_from_scans() {
        let config = ProjectConfig::default();
        assert!(config.excluded_dir_names().contains(&".patchwright".to_string()));
    }

    #[test]
    fn load_for_root_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "[anchor]\ntie_margin = 2.0\n").unwrap();
        let err = load_for_root(dir.path()).unwrap_err();
        assert!(err.to_string().contains(CONFIG_FILE_NAME));
    }
}
