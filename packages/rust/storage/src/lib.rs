//! JSON-file persistence for the digest store and the table catalogue.
//!
//! - [`HashStore`]: document file name → last processed digest
//! - [`CatalogueStore`]: the sorted, deduplicated table-record collection
//!
//! **Write rules:** both stores are read once, mutated in memory, and written
//! back once per run. Every write goes to a sibling temp file that is then
//! renamed over the target, so a crash never leaves a half-written store.

mod catalogue;
mod hashes;

use std::path::{Path, PathBuf};

use schemacat_shared::{Result, SchemacatError};

pub use catalogue::{CatalogueStore, SaveReceipt};
pub use hashes::HashStore;

/// Serialize `data` as pretty JSON and atomically replace `path` with it.
pub fn write_json_atomic<T: serde::Serialize + ?Sized>(path: &Path, data: &T) -> Result<()> {
    let mut json = serde_json::to_string_pretty(data)
        .map_err(|e| SchemacatError::Serialization(e.to_string()))?;
    json.push('\n');

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| SchemacatError::io(parent, e))?;
    }

    let temp = temp_path(path);
    std::fs::write(&temp, json).map_err(|e| SchemacatError::io(&temp, e))?;

    if let Err(e) = std::fs::rename(&temp, path) {
        let _ = std::fs::remove_file(&temp);
        return Err(SchemacatError::io(path, e));
    }

    tracing::debug!(path = %path.display(), "wrote JSON file");
    Ok(())
}

/// Hidden sibling used as the staging file for an atomic write.
fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "store".to_string());
    path.with_file_name(format!(".{name}.tmp"))
}

#[cfg(test)]
pub(crate) fn temp_dir(prefix: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("{prefix}-{}", uuid::Uuid::now_v7()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn atomic_write_leaves_no_temp_file() {
        let dir = temp_dir("sc-storage");
        let path = dir.join("data.json");
        let data: BTreeMap<&str, &str> = [("b", "2"), ("a", "1")].into_iter().collect();

        write_json_atomic(&path, &data).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.find("\"a\"").unwrap() < content.find("\"b\"").unwrap());
        assert!(content.ends_with('\n'));
        for entry in std::fs::read_dir(&dir).unwrap() {
            let name = entry.unwrap().file_name().to_string_lossy().to_string();
            assert!(!name.starts_with('.'), "temp file left behind: {name}");
        }

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn atomic_write_creates_parent_dirs() {
        let dir = temp_dir("sc-storage");
        let path = dir.join("nested/deeper/data.json");
        write_json_atomic(&path, &vec![1, 2, 3]).unwrap();
        assert!(path.exists());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
