//! Thin filesystem primitives used by the lock manager and the model store.
//!
//! Reads are advisory: any failure is reported as "absent". Writes go through
//! a temp file in the same directory followed by a rename, so a concurrent
//! reader sees either the old contents or the new ones, never a torn file.

use fs_err as fs;
use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;

pub fn exists(path: &Path) -> bool {
    path.exists()
}

/// Reads a UTF-8 file, returning `None` if it is missing or unreadable.
pub fn read_optional(path: &Path) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(contents) => Some(contents),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => {
            tracing::debug!(error = %e, "Treating unreadable file as absent");
            None
        }
    }
}

/// Replaces `path` with `contents` via temp file + rename.
pub fn write_atomic(path: &Path, contents: &str) -> io::Result<()> {
    let parent = path.parent().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} has no parent directory", path.display()),
        )
    })?;
    let mut temp_file = NamedTempFile::new_in(parent)?;
    temp_file.write_all(contents.as_bytes())?;
    temp_file.flush()?;
    temp_file.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Deletes `path`. Returns `Ok(false)` when there was nothing to delete.
pub fn remove_if_exists(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Creates `dir` and any missing parents.
pub fn ensure_dir(dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_read_optional_missing_is_none() {
        let temp = tempdir().unwrap();
        assert_eq!(read_optional(&temp.path().join("nope")), None);
    }

    #[test]
    fn test_write_atomic_replaces_contents() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("doc.json");
        write_atomic(&file, "first").unwrap();
        write_atomic(&file, "second").unwrap();
        assert_eq!(read_optional(&file).as_deref(), Some("second"));
    }

    #[test]
    fn test_write_atomic_leaves_no_temp_files() {
        let temp = tempdir().unwrap();
        write_atomic(&temp.path().join("doc.json"), "x").unwrap();
        let names: Vec<_> = std::fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("doc.json")]);
    }

    #[test]
    fn test_remove_if_exists_is_idempotent() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("lock");
        std::fs::write(&file, "x").unwrap();
        assert!(remove_if_exists(&file).unwrap());
        assert!(!remove_if_exists(&file).unwrap());
        assert!(!exists(&file));
    }

    #[test]
    fn test_ensure_dir_creates_parents() {
        let temp = tempdir().unwrap();
        let nested = temp.path().join("a").join("b").join("c");
        ensure_dir(&nested).unwrap();
        ensure_dir(&nested).unwrap();
        assert!(nested.is_dir());
    }
}
