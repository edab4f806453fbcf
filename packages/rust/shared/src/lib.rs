//! Shared types, error model, and configuration for schemacat.
//!
//! This crate is the foundation depended on by all other schemacat crates.
//! It provides:
//! - [`SchemacatError`]: the unified error type
//! - Record types ([`TableRecord`], [`FieldRecord`], [`MergeStrategy`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ParserConfig, PathsConfig, PipelineConfig, VcsConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from,
};
pub use error::{Result, SchemacatError};
pub use types::{FieldRecord, MergeStrategy, TableRecord};
