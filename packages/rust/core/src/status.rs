//! Read-only overview of the catalogue and pending work.

use tracing::instrument;

use schemacat_encoding::digest_file;
use schemacat_shared::Result;
use schemacat_storage::{CatalogueStore, HashStore};

use crate::pipeline::{UpdateConfig, scan_documents};

/// Snapshot of what an update would find.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusReport {
    /// Documents in the source directory.
    pub documents: usize,
    /// Records in the catalogue file.
    pub tables: usize,
    /// Entries in the hash store.
    pub hash_entries: usize,
    /// Documents the next update would reprocess.
    pub pending: usize,
}

/// Count documents, catalogue records, hash entries and pending documents.
///
/// Nothing is written. An unreadable document counts as pending.
#[instrument(skip_all, fields(source = %config.source_dir.display()))]
pub fn catalogue_status(config: &UpdateConfig) -> Result<StatusReport> {
    let tables = CatalogueStore::new(&config.catalogue_file, &config.backup_dir)
        .load()?
        .len();
    let hashes = HashStore::load(&config.hash_file, config.force);
    let documents = scan_documents(&config.source_dir, &config.document_extension)?;

    let pending = documents
        .iter()
        .filter(|doc| {
            digest_file(&doc.path).map_or(true, |digest| hashes.has_changed(&doc.id, &digest))
        })
        .count();

    Ok(StatusReport {
        documents: documents.len(),
        tables,
        hash_entries: hashes.len(),
        pending,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::tests::{config_in, table_doc, temp_dir, write_doc};
    use crate::pipeline::{SilentProgress, run_update};

    #[test]
    fn empty_workspace() {
        let dir = temp_dir("sc-status");
        let report = catalogue_status(&config_in(&dir)).unwrap();
        assert_eq!(report, StatusReport::default());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn pending_tracks_changes() {
        let dir = temp_dir("sc-status");
        write_doc(&dir, "users.html", table_doc("users", &["id"]));
        write_doc(&dir, "orders.html", table_doc("orders", &["id"]));
        let config = config_in(&dir);

        assert_eq!(catalogue_status(&config).unwrap().pending, 2);

        run_update(&config, &SilentProgress, None).await.unwrap();
        let report = catalogue_status(&config).unwrap();
        assert_eq!(
            report,
            StatusReport {
                documents: 2,
                tables: 2,
                hash_entries: 2,
                pending: 0,
            }
        );

        write_doc(&dir, "users.html", table_doc("users", &["id", "email"]));
        assert_eq!(catalogue_status(&config).unwrap().pending, 1);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
