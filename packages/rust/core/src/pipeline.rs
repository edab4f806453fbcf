//! End-to-end `update` pipeline: documents → change check → normalize → parse
//! → merge → persist → publish.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local, Utc};
use tokio::sync::Semaphore;
use tokio::task::JoinError;
use tracing::{debug, error, info, instrument, warn};

use schemacat_encoding::{digest, digest_file, normalize};
use schemacat_parser::{ParseError, ParseOptions, TableDocumentParser};
use schemacat_shared::{AppConfig, MergeStrategy, Result, SchemacatError, TableRecord};
use schemacat_storage::{CatalogueStore, HashStore};

use crate::merge::{MergeStore, UpsertOutcome};
use crate::vcs::{VcsOutcome, VersionControlClient, default_commit_message};

// ---------------------------------------------------------------------------
// Config & result
// ---------------------------------------------------------------------------

/// Configuration for [`run_update`].
#[derive(Debug, Clone)]
pub struct UpdateConfig {
    /// Directory scanned (non-recursively) for documents.
    pub source_dir: PathBuf,
    pub catalogue_file: PathBuf,
    /// Receives catalogue backups and pre-conversion document copies.
    pub backup_dir: PathBuf,
    pub hash_file: PathBuf,
    /// Document file extension, without the dot.
    pub document_extension: String,
    pub strategy: MergeStrategy,
    /// Maximum documents processed at once.
    pub jobs: usize,
    /// Reprocess every document regardless of stored digests.
    pub force: bool,
    pub parse: ParseOptions,
    /// Commit message; `None` uses the dated default.
    pub commit_message: Option<String>,
    pub commit_message_prefix: String,
}

impl From<&AppConfig> for UpdateConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            source_dir: config.paths.source_dir.clone(),
            catalogue_file: config.paths.catalogue_file.clone(),
            backup_dir: config.paths.backup_dir.clone(),
            hash_file: config.paths.hash_file.clone(),
            document_extension: config.pipeline.document_extension.clone(),
            strategy: config.pipeline.strategy,
            jobs: config.pipeline.jobs,
            force: false,
            parse: ParseOptions::from(&config.parser),
            commit_message: None,
            commit_message_prefix: config.vcs.commit_message_prefix.clone(),
        }
    }
}

/// Counters for one [`run_update`].
#[derive(Debug, Clone, Default)]
pub struct UpdateSummary {
    /// Documents found in the source directory.
    pub documents: usize,
    /// Documents parsed and merged into the catalogue.
    pub updated: usize,
    /// Documents rewritten as UTF-8.
    pub converted: usize,
    pub unchanged: usize,
    pub parse_failed: usize,
    pub io_failed: usize,
    /// Stored records dropped by the load-time duplicate pass.
    pub dedup_removed: usize,
    /// Records in the resulting catalogue.
    pub tables: usize,
    /// Whether the catalogue and hash store were written.
    pub persisted: bool,
    pub vcs: Option<VcsOutcome>,
    pub elapsed: Duration,
}

impl UpdateSummary {
    fn tally(&mut self, outcome: &DocumentOutcome) {
        match outcome {
            DocumentOutcome::Unchanged => self.unchanged += 1,
            DocumentOutcome::Updated { converted, .. } => {
                self.updated += 1;
                self.converted += usize::from(*converted);
            }
            DocumentOutcome::ParseFailed { converted, .. } => {
                self.parse_failed += 1;
                self.converted += usize::from(*converted);
            }
            DocumentOutcome::IoFailed { .. } => self.io_failed += 1,
        }
    }

    /// Documents that were skipped because of an error.
    pub fn failed(&self) -> usize {
        self.parse_failed + self.io_failed
    }
}

/// What happened to one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentOutcome {
    /// Digest matched the stored one.
    Unchanged,
    /// Parsed and merged into the catalogue.
    Updated {
        table_name: String,
        upsert: UpsertOutcome,
        converted: bool,
    },
    /// No catalogue record could be extracted. The digest is not stored.
    ParseFailed { reason: String, converted: bool },
    /// Reading, converting or backing up failed. The digest is not stored.
    IoFailed { reason: String },
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Pipeline states, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Loading,
    Scanning,
    Processing,
    Merging,
    Persisting,
    Done,
    Failed,
}

impl Phase {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Loading => "Loading catalogue",
            Self::Scanning => "Scanning documents",
            Self::Processing => "Processing documents",
            Self::Merging => "Checking catalogue",
            Self::Persisting => "Saving catalogue",
            Self::Done => "Done",
            Self::Failed => "Failed",
        }
    }

    /// Whether the run has ended.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, phase: Phase);
    /// Called once the source directory has been scanned.
    fn documents_found(&self, total: usize);
    /// Called per document, in document name order.
    fn document_done(&self, document_id: &str, outcome: &DocumentOutcome, current: usize, total: usize);
    /// Called when the pipeline completes successfully.
    fn done(&self, summary: &UpdateSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _phase: Phase) {}
    fn documents_found(&self, _total: usize) {}
    fn document_done(&self, _id: &str, _outcome: &DocumentOutcome, _current: usize, _total: usize) {}
    fn done(&self, _summary: &UpdateSummary) {}
}

// ---------------------------------------------------------------------------
// Update pipeline
// ---------------------------------------------------------------------------

/// Run the update pipeline.
///
/// 1. Load the catalogue (fatal if corrupt) and the hash store; dedup
/// 2. Scan the source directory
/// 3. Per changed document: normalize, parse, merge, record digest
/// 4. Validate and report duplicates
/// 5. Save catalogue then hash store, unless nothing changed
/// 6. Publish through `vcs`, if given
#[instrument(skip_all, fields(source = %config.source_dir.display(), strategy = %config.strategy))]
pub async fn run_update(
    config: &UpdateConfig,
    progress: &dyn ProgressReporter,
    vcs: Option<&dyn VersionControlClient>,
) -> Result<UpdateSummary> {
    let start = Instant::now();

    match update(config, progress, vcs).await {
        Ok(mut summary) => {
            summary.elapsed = start.elapsed();
            info!(
                documents = summary.documents,
                updated = summary.updated,
                converted = summary.converted,
                unchanged = summary.unchanged,
                failed = summary.failed(),
                tables = summary.tables,
                persisted = summary.persisted,
                elapsed_ms = summary.elapsed.as_millis(),
                "update complete"
            );
            progress.phase(Phase::Done);
            progress.done(&summary);
            Ok(summary)
        }
        Err(e) => {
            error!(error = %e, "update failed");
            progress.phase(Phase::Failed);
            Err(e)
        }
    }
}

async fn update(
    config: &UpdateConfig,
    progress: &dyn ProgressReporter,
    vcs: Option<&dyn VersionControlClient>,
) -> Result<UpdateSummary> {
    if config.jobs == 0 {
        return Err(SchemacatError::config("jobs must be at least 1"));
    }
    let parser =
        TableDocumentParser::new(&config.parse).map_err(|e| SchemacatError::config(e.to_string()))?;

    // --- Loading ---
    progress.phase(Phase::Loading);
    let catalogue = CatalogueStore::new(&config.catalogue_file, &config.backup_dir);
    let existing = catalogue.load()?;
    let mut hashes = HashStore::load(&config.hash_file, config.force);
    let (mut store, dedup) = MergeStore::from_records(existing, config.strategy);

    let mut summary = UpdateSummary {
        dedup_removed: dedup.discarded.len() + dedup.ineligible,
        ..UpdateSummary::default()
    };
    if summary.dedup_removed > 0 {
        warn!(removed = summary.dedup_removed, "stored catalogue contained duplicates");
    }

    // --- Scanning ---
    progress.phase(Phase::Scanning);
    let documents = scan_documents(&config.source_dir, &config.document_extension)?;
    summary.documents = documents.len();
    progress.documents_found(documents.len());
    info!(documents = documents.len(), "documents found");

    // --- Processing ---
    progress.phase(Phase::Processing);
    let snapshot = Arc::new(hashes.clone());
    let backup_dir = config.backup_dir.clone();
    let results = run_bounded(documents.clone(), config.jobs, move |doc: Document| {
        process_document(&doc, &snapshot, &backup_dir, &parser)
    })
    .await;

    let total = documents.len();
    let mut clock = RunClock::default();
    for (i, (doc, result)) in documents.iter().zip(results).enumerate() {
        let processed = result.unwrap_or_else(|e| Processed::IoFailed(format!("worker task failed: {e}")));

        let outcome = match processed {
            Processed::Unchanged => DocumentOutcome::Unchanged,
            Processed::Parsed {
                mut record,
                digest,
                converted,
            } => {
                record.last_updated = Some(clock.tick());
                let table_name = record.table_name.clone();
                let upsert = store.upsert(record, config.strategy);
                hashes.commit(&doc.id, &digest);
                debug!(document = %doc.id, table = %table_name, ?upsert, "document merged");
                DocumentOutcome::Updated {
                    table_name,
                    upsert,
                    converted,
                }
            }
            Processed::ParseFailed { error, converted } => {
                warn!(document = %doc.id, error = %error, "no table record extracted, skipping");
                DocumentOutcome::ParseFailed {
                    reason: error.to_string(),
                    converted,
                }
            }
            Processed::IoFailed(reason) => {
                warn!(document = %doc.id, %reason, "document unreadable, skipping");
                DocumentOutcome::IoFailed { reason }
            }
        };

        summary.tally(&outcome);
        progress.document_done(&doc.id, &outcome, i + 1, total);
    }

    // --- Merging ---
    progress.phase(Phase::Merging);
    for violation in store.validate() {
        warn!(%violation, "catalogue integrity problem");
    }
    let duplicates = store.analyze();
    if !duplicates.is_empty() {
        info!(names = duplicates.len(), "table names declared by more than one document");
        for (name, count) in &duplicates {
            debug!(table = %name, count, "duplicate table name");
        }
    }
    summary.tables = store.len();

    // --- Persisting ---
    if summary.updated == 0 && !dedup.changed() && !hashes.is_dirty() {
        info!("nothing changed, catalogue left untouched");
        return Ok(summary);
    }

    progress.phase(Phase::Persisting);
    let receipt = catalogue.save(store.into_records())?;
    if let Err(e) = hashes.save() {
        error!(error = %e, "hash store not saved, restoring catalogue");
        if let Err(rollback) = catalogue.rollback(&receipt) {
            error!(error = %rollback, "catalogue rollback failed");
        }
        return Err(e);
    }
    summary.persisted = true;

    // --- Publishing ---
    if let Some(vcs) = vcs {
        let message = config.commit_message.clone().unwrap_or_else(|| {
            default_commit_message(&config.commit_message_prefix, Local::now())
        });
        summary.vcs = Some(vcs.commit_and_push(&message)?);
    }

    Ok(summary)
}

// ---------------------------------------------------------------------------
// Per-document stage
// ---------------------------------------------------------------------------

/// A source document: its file name (the identity) and location.
#[derive(Debug, Clone)]
pub(crate) struct Document {
    pub id: String,
    pub path: PathBuf,
}

enum Processed {
    Unchanged,
    Parsed {
        record: TableRecord,
        digest: String,
        converted: bool,
    },
    ParseFailed {
        error: ParseError,
        converted: bool,
    },
    IoFailed(String),
}

/// Digest, change check, normalization and extraction for one document.
///
/// The digest handed back is that of the bytes left on disk, so a document
/// converted now is seen as unchanged next time.
#[instrument(skip_all, fields(document = %doc.id))]
fn process_document(
    doc: &Document,
    hashes: &HashStore,
    backup_dir: &Path,
    parser: &TableDocumentParser,
) -> Processed {
    let original = match digest_file(&doc.path) {
        Ok(d) => d,
        Err(e) => return Processed::IoFailed(e.to_string()),
    };
    if !hashes.has_changed(&doc.id, &original) {
        return Processed::Unchanged;
    }

    let normalized = match normalize(&doc.path, backup_dir, false) {
        Ok(n) => n,
        Err(e) => return Processed::IoFailed(e.to_string()),
    };
    let converted = normalized.converted;
    let digest = if converted {
        digest(normalized.text.as_bytes())
    } else {
        original
    };

    match parser.parse(&doc.id, &normalized.text) {
        Ok(record) => Processed::Parsed {
            record,
            digest,
            converted,
        },
        Err(error) => Processed::ParseFailed { error, converted },
    }
}

/// Extraction timestamps for one run, handed out in merge order.
///
/// Strictly increasing, so under `latest` the document later in name order
/// wins a same-run collision whatever order the workers finished in.
#[derive(Debug, Default)]
struct RunClock {
    last: Option<DateTime<Utc>>,
}

impl RunClock {
    fn tick(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let stamp = match self.last {
            Some(prev) if now <= prev => prev + chrono::Duration::microseconds(1),
            _ => now,
        };
        self.last = Some(stamp);
        stamp
    }
}

/// Run `work` over `items` on the blocking pool, at most `jobs` at a time.
///
/// Results come back in input order.
async fn run_bounded<I, T, F>(items: Vec<I>, jobs: usize, work: F) -> Vec<std::result::Result<T, JoinError>>
where
    I: Send + 'static,
    T: Send + 'static,
    F: Fn(I) -> T + Send + Sync + 'static,
{
    let semaphore = Arc::new(Semaphore::new(jobs.max(1)));
    let work = Arc::new(work);

    let handles: Vec<_> = items
        .into_iter()
        .map(|item| {
            let sem = semaphore.clone();
            let work = work.clone();
            tokio::spawn(async move {
                let _permit = sem.acquire_owned().await.expect("semaphore closed");
                tokio::task::spawn_blocking(move || work(item)).await
            })
        })
        .collect();

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(handle.await.and_then(std::convert::identity));
    }
    results
}

/// Documents in `dir` with the given extension, sorted by file name.
pub(crate) fn scan_documents(dir: &Path, extension: &str) -> Result<Vec<Document>> {
    let wanted = extension.trim_start_matches('.');
    let entries = std::fs::read_dir(dir).map_err(|e| SchemacatError::io(dir, e))?;

    let mut documents = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| SchemacatError::io(dir, e))?.path();
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(wanted));
        if !matches || !path.is_file() {
            continue;
        }
        let Some(id) = path.file_name().and_then(|n| n.to_str()).map(str::to_owned) else {
            warn!(path = %path.display(), "document name is not UTF-8, skipping");
            continue;
        };
        documents.push(Document { id, path });
    }

    documents.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(documents)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
