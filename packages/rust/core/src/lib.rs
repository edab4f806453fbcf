//! Catalogue maintenance workflows for schemacat.
//!
//! This crate ties together encoding normalization, document parsing and the
//! JSON stores into end-to-end flows:
//! - [`run_update`]: incremental refresh of the catalogue from documents
//! - [`clean_catalogue`]: standalone duplicate removal and validation
//! - [`catalogue_status`]: read-only overview

pub mod clean;
pub mod merge;
pub mod pipeline;
pub mod status;
pub mod vcs;

pub use clean::{CleanConfig, CleanReport, clean_catalogue};
pub use merge::{DedupReport, MergeStore, Problem, UpsertOutcome, Violation, analyze_records};
pub use pipeline::{
    DocumentOutcome, Phase, ProgressReporter, SilentProgress, UpdateConfig, UpdateSummary,
    run_update,
};
pub use status::{StatusReport, catalogue_status};
pub use vcs::{GitClient, VcsOutcome, VersionControlClient, default_commit_message};
