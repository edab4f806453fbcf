//! Publishing the updated catalogue through version control.

use std::path::PathBuf;
use std::process::{Command, Output};

use chrono::{DateTime, Local};
use tracing::{debug, info, instrument};

use schemacat_shared::{Result, SchemacatError};

/// What a publish request did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VcsOutcome {
    /// Nothing to commit.
    Clean,
    /// Changes were committed and pushed.
    Pushed,
}

/// Commits and pushes the working tree. Injected into the update pipeline.
pub trait VersionControlClient: Send + Sync {
    fn commit_and_push(&self, message: &str) -> Result<VcsOutcome>;
}

/// `<prefix> - YYYY-MM-DD HH:MM:SS` in local time.
pub fn default_commit_message(prefix: &str, now: DateTime<Local>) -> String {
    format!("{prefix} - {}", now.format("%Y-%m-%d %H:%M:%S"))
}

/// [`VersionControlClient`] backed by the `git` executable.
#[derive(Debug, Clone)]
pub struct GitClient {
    repo_dir: PathBuf,
    program: String,
}

impl GitClient {
    pub fn new(repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo_dir: repo_dir.into(),
            program: "git".into(),
        }
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        debug!(?args, "running git");
        let output = Command::new(&self.program)
            .args(args)
            .current_dir(&self.repo_dir)
            .output()
            .map_err(|e| SchemacatError::Vcs(format!("failed to run {}: {e}", self.program)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SchemacatError::Vcs(format!(
                "`git {}` failed ({}): {}",
                args.join(" "),
                output.status,
                stderr.trim()
            )));
        }
        Ok(output)
    }
}

impl VersionControlClient for GitClient {
    #[instrument(skip(self), fields(repo = %self.repo_dir.display()))]
    fn commit_and_push(&self, message: &str) -> Result<VcsOutcome> {
        let status = self.run(&["status", "--porcelain"])?;
        if status.stdout.iter().all(u8::is_ascii_whitespace) {
            info!("working tree clean, nothing to publish");
            return Ok(VcsOutcome::Clean);
        }

        self.run(&["add", "."])?;
        self.run(&["commit", "-m", message])?;
        self.run(&["push"])?;
        info!("changes committed and pushed");
        Ok(VcsOutcome::Pushed)
    }
}
