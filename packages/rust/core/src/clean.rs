//! Standalone catalogue maintenance: duplicate analysis, validation, rebuild.

use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::{info, instrument, warn};

use schemacat_shared::{AppConfig, MergeStrategy, Result, SchemacatError};
use schemacat_storage::CatalogueStore;

use crate::merge::{MergeStore, Violation, analyze_records};

/// Configuration for [`clean_catalogue`].
#[derive(Debug, Clone)]
pub struct CleanConfig {
    pub catalogue_file: PathBuf,
    pub backup_dir: PathBuf,
    pub strategy: MergeStrategy,
    /// Report duplicates without rewriting the catalogue.
    pub analyze_only: bool,
    /// Also report integrity problems.
    pub validate: bool,
}

impl From<&AppConfig> for CleanConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            catalogue_file: config.paths.catalogue_file.clone(),
            backup_dir: config.paths.backup_dir.clone(),
            strategy: config.pipeline.strategy,
            analyze_only: false,
            validate: false,
        }
    }
}

/// What [`clean_catalogue`] found and did.
#[derive(Debug, Clone, Default)]
pub struct CleanReport {
    /// Records in the catalogue file.
    pub original: usize,
    /// Records after cleaning (equal to `original` when nothing was rewritten).
    pub retained: usize,
    /// Table names occurring more than once, with counts.
    pub duplicates: BTreeMap<String, usize>,
    /// Records without a table name.
    pub ineligible: usize,
    /// `(table_name, source_file)` of each dropped duplicate.
    pub discarded: Vec<(String, String)>,
    /// Populated when validation was requested.
    pub violations: Vec<Violation>,
    /// Whether the catalogue was rewritten.
    pub saved: bool,
}

/// Analyze, optionally validate, and deduplicate the catalogue in place.
///
/// A missing catalogue is an error. The file is only rewritten (with a backup)
/// when duplicates or unnamed records were found and `analyze_only` is off.
#[instrument(skip_all, fields(catalogue = %config.catalogue_file.display(), strategy = %config.strategy))]
pub fn clean_catalogue(config: &CleanConfig) -> Result<CleanReport> {
    let store = CatalogueStore::new(&config.catalogue_file, &config.backup_dir);
    if !store.exists() {
        return Err(SchemacatError::io(
            &config.catalogue_file,
            std::io::Error::new(std::io::ErrorKind::NotFound, "catalogue not found"),
        ));
    }

    let records = store.load()?;
    let duplicates = analyze_records(&records);
    if duplicates.is_empty() {
        info!(tables = records.len(), "no duplicate table names");
    } else {
        warn!(names = duplicates.len(), "duplicate table names found");
    }

    let original = records.len();
    let (merged, dedup) = MergeStore::from_records(records, config.strategy);

    let mut report = CleanReport {
        original,
        retained: original,
        duplicates,
        ineligible: dedup.ineligible,
        ..CleanReport::default()
    };

    if config.validate {
        report.violations = merged.validate();
        for violation in &report.violations {
            warn!(%violation, "catalogue integrity problem");
        }
    }

    if config.analyze_only || !dedup.changed() {
        return Ok(report);
    }

    report.retained = dedup.retained;
    report.discarded = dedup.discarded;
    store.save(merged.into_records())?;
    report.saved = true;
    info!(
        original = report.original,
        retained = report.retained,
        removed = report.original - report.retained,
        "catalogue cleaned"
    );

    Ok(report)
}
