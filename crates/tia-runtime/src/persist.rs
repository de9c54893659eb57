//! Coverage map persistence.
//!
//! Reads are tolerant: a missing or undecodable file yields an empty map.
//! Writes are whole-file atomic: the data is written to a temp file in the
//! destination directory and renamed into place, so a concurrent reader sees
//! either the prior version or the new one.

use std::fs;
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::{info, warn};

use tia_core::coverage::SourceCoveringTestsList;
use tia_core::error::RuntimeError;
use tia_core::serializer;

/// Reads the persisted coverage map. Returns `None` when the file is
/// missing, empty, or undecodable.
pub fn load_coverage_file(path: &Path) -> Option<SourceCoveringTestsList> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) => {
            info!(path = %path.display(), error = %err, "no persisted coverage data");
            return None;
        }
    };

    match serializer::deserialize(&bytes) {
        Ok(list) if !list.is_empty() => Some(list),
        Ok(_) => None,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "discarding undecodable coverage data");
            None
        }
    }
}

/// Atomically replaces the persisted coverage map.
pub fn store_coverage_file(
    path: &Path,
    list: &SourceCoveringTestsList,
) -> Result<(), RuntimeError> {
    let bytes = serializer::serialize(list)?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(&bytes)?;
    tmp.persist(path).map_err(|err| RuntimeError::Io(err.error))?;
    Ok(())
}

/// Removes the persisted coverage map if present.
pub fn remove_coverage_file(path: &Path) -> Result<(), RuntimeError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_list() -> SourceCoveringTestsList {
        let mut list = SourceCoveringTestsList::new();
        list.insert("src/a.cpp", "T1");
        list
    }

    #[test]
    fn test_store_then_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("main").join("spartia.json");

        store_coverage_file(&path, &sample_list()).expect("store");
        let loaded = load_coverage_file(&path).expect("load");
        assert_eq!(loaded, sample_list());
    }

    #[test]
    fn test_load_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_coverage_file(&dir.path().join("absent.json")).is_none());
    }

    #[test]
    fn test_load_corrupt_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spartia.json");
        fs::write(&path, b"{ corrupt").unwrap();
        assert!(load_coverage_file(&path).is_none());
    }

    #[test]
    fn test_load_empty_map_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spartia.json");
        store_coverage_file(&path, &SourceCoveringTestsList::new()).expect("store");
        assert!(load_coverage_file(&path).is_none());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spartia.json");
        store_coverage_file(&path, &sample_list()).expect("store");

        remove_coverage_file(&path).expect("first remove");
        remove_coverage_file(&path).expect("second remove");
        assert!(!path.exists());
    }
}
