//! Git operations with bounded timeouts and safe fast-forward updates
//!
//! Every invocation is a scoped external process: `kill_on_drop` guarantees
//! the child is terminated when the timeout fires, and credentials live only
//! in the child's environment, never in URLs or argv.

use std::fmt;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command as AsyncCommand;
use tokio::time::timeout;
use tracing::debug;

use crate::config::Config;
use crate::sync::ErrorKind;

/// Environment variable the credential helper reads the token from
const TOKEN_ENV: &str = "FORGEMIRROR_GIT_TOKEN";

/// A failed git operation, classified for the run summary
#[derive(Debug, Clone)]
pub struct GitOpError {
    pub kind: ErrorKind,
    pub message: String,
}

impl GitOpError {
    fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for GitOpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for GitOpError {}

/// Git command runner
#[derive(Clone)]
pub struct GitClient {
    program: String,
    timeout: Duration,
    token: String,
}

impl GitClient {
    /// Create a new git client from the given configuration
    pub fn new(config: &Config) -> Self {
        Self {
            program: config.sync.git_program.clone(),
            timeout: config.git_timeout(),
            token: config.token.clone(),
        }
    }

    /// Clone a repository into `target`, creating parent directories on demand
    pub async fn clone_repository(
        &self,
        clone_url: &str,
        target: &Path,
    ) -> Result<String, GitOpError> {
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                GitOpError::new(
                    ErrorKind::Clone,
                    format!("failed to create parent directory {}: {}", parent.display(), e),
                )
            })?;
        }

        debug!("Cloning {} into {}", clone_url, target.display());

        let mut cmd = self.command();
        cmd.arg("clone").arg(clone_url).arg(target);

        self.run(cmd, ErrorKind::Clone).await
    }

    /// Fast-forward an existing working copy from its origin
    ///
    /// A non-fast-forward pull is reported as [`ErrorKind::Diverged`]; local
    /// history is never overwritten.
    pub async fn update_repository(&self, target: &Path) -> Result<String, GitOpError> {
        debug!("Updating working copy at {}", target.display());

        let mut cmd = self.command();
        cmd.arg("-C")
            .arg(target)
            .args(["pull", "--ff-only", "origin"]);

        match self.run(cmd, ErrorKind::Update).await {
            Err(err) if err.kind == ErrorKind::Update && is_diverged(&err.message) => {
                Err(GitOpError::new(ErrorKind::Diverged, err.message))
            }
            other => other,
        }
    }

    /// Base git command with non-interactive credential wiring.
    ///
    /// The token is handed to git through a one-shot credential helper that
    /// reads it from the child environment, so it shows up in neither the
    /// remote URL nor the process argument list.
    fn command(&self) -> AsyncCommand {
        let mut cmd = AsyncCommand::new(&self.program);
        cmd.kill_on_drop(true).env("GIT_TERMINAL_PROMPT", "0");

        if !self.token.is_empty() {
            cmd.env(TOKEN_ENV, &self.token)
                .arg("-c")
                .arg("credential.helper=")
                .arg("-c")
                .arg(format!(
                    "credential.helper=!f() {{ echo username=x-access-token; echo \"password=${{{}}}\"; }}; f",
                    TOKEN_ENV
                ));
        }

        cmd
    }

    async fn run(&self, mut cmd: AsyncCommand, kind: ErrorKind) -> Result<String, GitOpError> {
        cmd.stdin(Stdio::null());

        let output = match timeout(self.timeout, cmd.output()).await {
            Ok(result) => result.map_err(|e| {
                GitOpError::new(kind, format!("failed to run {}: {}", self.program, e))
            })?,
            Err(_) => {
                // Dropping the output future kills the child (kill_on_drop)
                return Err(GitOpError::new(
                    ErrorKind::Timeout,
                    format!("no result within {}s, process terminated", self.timeout.as_secs()),
                ));
            }
        };

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            Err(GitOpError::new(kind, stderr))
        }
    }
}

/// Classify a failed pull as diverged local history
fn is_diverged(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    lower.contains("fast-forward") || lower.contains("diverg")
}
