//! Persisted document digests, used to skip documents that did not change.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use schemacat_shared::Result;

use crate::write_json_atomic;

/// Mapping from document file name to the digest of its last processed bytes.
///
/// Entries for documents that disappeared are kept; they are harmless.
#[derive(Debug, Clone)]
pub struct HashStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
    force: bool,
    dirty: bool,
}

impl HashStore {
    /// Load the store at `path`.
    ///
    /// A missing file yields an empty store. An unreadable or malformed file
    /// is logged and also yields an empty store, so every document is
    /// reprocessed. With `force`, every document reports as changed.
    pub fn load(path: &Path, force: bool) -> Self {
        let entries = match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str::<BTreeMap<String, String>>(&content) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "hash store unreadable, reprocessing all documents");
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no hash store yet");
                BTreeMap::new()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "hash store unreadable, reprocessing all documents");
                BTreeMap::new()
            }
        };

        Self {
            path: path.to_path_buf(),
            entries,
            force,
            dirty: false,
        }
    }

    /// Whether `document_id` must be processed again.
    pub fn has_changed(&self, document_id: &str, digest: &str) -> bool {
        self.force || self.entries.get(document_id).is_none_or(|stored| stored != digest)
    }

    /// Record `digest` as the processed state of `document_id`.
    ///
    /// Call only after the document was processed successfully.
    pub fn commit(&mut self, document_id: &str, digest: &str) {
        if self.entries.get(document_id).map(String::as_str) != Some(digest) {
            self.entries.insert(document_id.to_string(), digest.to_string());
            self.dirty = true;
        }
    }

    /// Last committed digest of `document_id`.
    pub fn get(&self, document_id: &str) -> Option<&str> {
        self.entries.get(document_id).map(String::as_str)
    }

    /// Whether any entry changed since loading.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Atomically write the store back to disk, keys in sorted order.
    pub fn save(&mut self) -> Result<()> {
        write_json_atomic(&self.path, &self.entries)?;
        self.dirty = false;
        debug!(path = %self.path.display(), entries = self.entries.len(), "hash store saved");
        Ok(())
    }
}
