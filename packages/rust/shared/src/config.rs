//! Application configuration for schemacat.
//!
//! User config lives at `~/.schemacat/schemacat.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SchemacatError};
use crate::types::MergeStrategy;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "schemacat.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".schemacat";

// ---------------------------------------------------------------------------
// Config structs (matching schemacat.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Input and output locations.
    #[serde(default)]
    pub paths: PathsConfig,

    /// Batch behaviour.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Markup extraction settings.
    #[serde(default)]
    pub parser: ParserConfig,

    /// Version-control hand-off.
    #[serde(default)]
    pub vcs: VcsConfig,
}

/// `[paths]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory holding the source documents.
    #[serde(default = "default_source_dir")]
    pub source_dir: PathBuf,

    /// Catalogue JSON file.
    #[serde(default = "default_catalogue_file")]
    pub catalogue_file: PathBuf,

    /// Directory for catalogue backups and pre-conversion document copies.
    #[serde(default = "default_backup_dir")]
    pub backup_dir: PathBuf,

    /// Digest store JSON file.
    #[serde(default = "default_hash_file")]
    pub hash_file: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            source_dir: default_source_dir(),
            catalogue_file: default_catalogue_file(),
            backup_dir: default_backup_dir(),
            hash_file: default_hash_file(),
        }
    }
}

fn default_source_dir() -> PathBuf {
    PathBuf::from(".")
}
fn default_catalogue_file() -> PathBuf {
    PathBuf::from("all_tables.json")
}
fn default_backup_dir() -> PathBuf {
    PathBuf::from("backup")
}
fn default_hash_file() -> PathBuf {
    PathBuf::from("file_hashes.json")
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Conflict policy for records sharing a table name.
    #[serde(default)]
    pub strategy: MergeStrategy,

    /// Maximum documents read/normalized/parsed concurrently.
    #[serde(default = "default_jobs")]
    pub jobs: usize,

    /// File extension (without dot) of source documents.
    #[serde(default = "default_document_extension")]
    pub document_extension: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            strategy: MergeStrategy::default(),
            jobs: default_jobs(),
            document_extension: default_document_extension(),
        }
    }
}

fn default_jobs() -> usize {
    4
}
fn default_document_extension() -> String {
    "html".into()
}

/// `[parser]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParserConfig {
    /// CSS class of the sub-table holding field detail rows.
    #[serde(default = "default_detail_table_class")]
    pub detail_table_class: String,

    /// Substring in a cell's markup that marks a flag as set.
    #[serde(default = "default_checked_marker")]
    pub checked_marker: String,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            detail_table_class: default_detail_table_class(),
            checked_marker: default_checked_marker(),
        }
    }
}

fn default_detail_table_class() -> String {
    "detail-table-content-table".into()
}
fn default_checked_marker() -> String {
    "checked".into()
}

/// `[vcs]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VcsConfig {
    /// Commit and push after a successful run.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Repository working directory (defaults to the current directory).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_dir: Option<PathBuf>,

    /// Prefix of the generated commit message; a timestamp is appended.
    #[serde(default = "default_commit_message_prefix")]
    pub commit_message_prefix: String,
}

impl Default for VcsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            repo_dir: None,
            commit_message_prefix: default_commit_message_prefix(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_commit_message_prefix() -> String {
    "Update table catalogue".into()
}

impl AppConfig {
    /// Reject values that would make a run meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.jobs == 0 {
            return Err(SchemacatError::config("pipeline.jobs must be at least 1"));
        }
        if self.pipeline.document_extension.trim().is_empty() {
            return Err(SchemacatError::config(
                "pipeline.document_extension must not be empty",
            ));
        }
        if self.parser.checked_marker.is_empty() {
            return Err(SchemacatError::config("parser.checked_marker must not be empty"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.schemacat/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| SchemacatError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.schemacat/schemacat.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| SchemacatError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        SchemacatError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    config.validate()?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| SchemacatError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| SchemacatError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| SchemacatError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("catalogue_file"));
        assert!(toml_str.contains("detail-table-content-table"));
        assert!(toml_str.contains("strategy = \"latest\""));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.pipeline.jobs, 4);
        assert_eq!(parsed.paths.catalogue_file, PathBuf::from("all_tables.json"));
        assert!(parsed.vcs.enabled);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[paths]
source_dir = "/srv/docs"

[pipeline]
strategy = "merge"

[vcs]
enabled = false
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.paths.source_dir, PathBuf::from("/srv/docs"));
        assert_eq!(config.paths.hash_file, PathBuf::from("file_hashes.json"));
        assert_eq!(config.pipeline.strategy, MergeStrategy::Merge);
        assert_eq!(config.pipeline.document_extension, "html");
        assert!(!config.vcs.enabled);
        assert_eq!(config.vcs.commit_message_prefix, "Update table catalogue");
    }

    #[test]
    fn unknown_strategy_rejected() {
        let result: std::result::Result<AppConfig, _> =
            toml::from_str("[pipeline]\nstrategy = \"newest\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn zero_jobs_fails_validation() {
        let mut config = AppConfig::default();
        config.pipeline.jobs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("jobs"));
    }
}
