//! The persisted catalogue: a JSON array of table records sorted by name.

use std::path::PathBuf;

use tracing::{debug, info, instrument, warn};

use schemacat_shared::{Result, SchemacatError, TableRecord};

use crate::write_json_atomic;

/// Load/save access to the catalogue file, with backup-before-overwrite.
#[derive(Debug, Clone)]
pub struct CatalogueStore {
    path: PathBuf,
    backup_dir: PathBuf,
}

/// What a [`CatalogueStore::save`] replaced, for [`CatalogueStore::rollback`].
#[derive(Debug, Clone)]
pub struct SaveReceipt {
    /// Copy of the previous catalogue, or `None` if there was none.
    pub backup: Option<PathBuf>,
    /// Number of records written.
    pub records: usize,
}

impl CatalogueStore {
    pub fn new(path: impl Into<PathBuf>, backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            backup_dir: backup_dir.into(),
        }
    }

    /// Where the previous catalogue is copied before an overwrite.
    pub fn backup_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "catalogue.json".to_string());
        self.backup_dir.join(format!("{name}.backup"))
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Read every record.
    ///
    /// A missing file is an empty catalogue. A file that exists but cannot be
    /// parsed is [`SchemacatError::Corrupt`]: the caller must not go on and
    /// overwrite it.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn load(&self) -> Result<Vec<TableRecord>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no catalogue yet");
                return Ok(Vec::new());
            }
            Err(e) => return Err(SchemacatError::io(&self.path, e)),
        };

        let records: Vec<TableRecord> = serde_json::from_str(&content)
            .map_err(|e| SchemacatError::corrupt(&self.path, e.to_string()))?;

        info!(tables = records.len(), "catalogue loaded");
        Ok(records)
    }

    /// Replace the catalogue with `records`, sorted ascending by table name.
    ///
    /// The current file is copied to [`Self::backup_path`] first. If the copy
    /// fails nothing is written. The write itself is all-or-nothing.
    #[instrument(skip_all, fields(path = %self.path.display(), tables = records.len()))]
    pub fn save(&self, mut records: Vec<TableRecord>) -> Result<SaveReceipt> {
        records.sort_by(|a, b| a.table_name.cmp(&b.table_name));

        let backup = if self.path.exists() {
            std::fs::create_dir_all(&self.backup_dir)
                .map_err(|e| SchemacatError::io(&self.backup_dir, e))?;
            let backup = self.backup_path();
            std::fs::copy(&self.path, &backup).map_err(|e| SchemacatError::io(&backup, e))?;
            debug!(backup = %backup.display(), "catalogue backed up");
            Some(backup)
        } else {
            None
        };

        write_json_atomic(&self.path, &records)?;
        info!("catalogue saved");

        Ok(SaveReceipt {
            backup,
            records: records.len(),
        })
    }

    /// Undo a [`Self::save`]: restore the backup, or remove a catalogue that
    /// did not exist before.
    pub fn rollback(&self, receipt: &SaveReceipt) -> Result<()> {
        match &receipt.backup {
            Some(backup) => {
                std::fs::copy(backup, &self.path).map_err(|e| SchemacatError::io(&self.path, e))?;
                warn!(backup = %backup.display(), "catalogue restored from backup");
            }
            None => {
                std::fs::remove_file(&self.path).map_err(|e| SchemacatError::io(&self.path, e))?;
                warn!("new catalogue removed");
            }
        }
        Ok(())
    }
}
