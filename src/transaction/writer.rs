use std::io::{self, Write};
use std::path::Path;

/// Seam for every byte the transaction manager puts on disk in the project.
pub trait FileWriter: Send + Sync {
    fn write(&self, path: &Path, content: &[u8]) -> io::Result<()>;
}

/// Write-to-temp, fsync, rename. Readers never observe a half-written file.
#[derive(Debug, Clone, Copy, Default)]
pub struct AtomicWriter;

impl FileWriter for AtomicWriter {
    fn write(&self, path: &Path, content: &[u8]) -> io::Result<()> {
        atomic_write(path, content)?;
        // Build tools watching mtimes must see the change.
        filetime::set_file_mtime(path, filetime::FileTime::now())
    }
}

/// Atomically replace `path` with `content`, keeping the temp file on the
/// same filesystem so the rename cannot degrade into a copy.
pub(crate) fn atomic_write(path: &Path, content: &[u8]) -> io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        Some(_) => Path::new("."),
        None => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "path has no parent directory",
            ))
        }
    };

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn replaces_content_in_place() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, "old").unwrap();

        AtomicWriter.write(&path, b"new").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "new");
        let leftovers = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn missing_parent_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("a.txt");
        assert!(AtomicWriter.write(&path, b"x").is_err());
    }
}
