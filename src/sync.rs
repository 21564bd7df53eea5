//! Sync executor - runs planned actions under a bounded worker pool
//!
//! Each action executes to completion in isolation; a failure never aborts
//! its siblings. Outcomes arrive in completion order and carry the target
//! path and full name so they stay attributable under concurrency.

use futures::stream::{FuturesUnordered, StreamExt};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::git::GitClient;
use crate::plan::MirrorAction;

/// Failure classification for outcomes and summaries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Forge API failure; fatal to the pass, not to the scheduler
    ForgeApi,
    /// git clone failed
    Clone,
    /// git pull failed
    Update,
    /// Local history diverged from the remote; never force-overwritten
    Diverged,
    /// External process exceeded its bounded timeout
    Timeout,
    /// Target path exists but is not a repository
    PathCollision,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::ForgeApi => "forge-api",
            ErrorKind::Clone => "clone",
            ErrorKind::Update => "update",
            ErrorKind::Diverged => "diverged",
            ErrorKind::Timeout => "timeout",
            ErrorKind::PathCollision => "path-collision",
        };
        f.write_str(name)
    }
}

/// Result of executing one mirror action
///
/// Skips (path collisions and cancellations) are neither successes nor
/// failures: they carry `success = false` with either `PathCollision` or no
/// error kind. Real failures always carry one of the other kinds.
#[derive(Debug, Clone)]
pub struct ActionOutcome {
    pub full_name: String,
    pub target: PathBuf,
    pub success: bool,
    pub duration: Duration,
    pub error_kind: Option<ErrorKind>,
    pub message: String,
}

impl ActionOutcome {
    fn succeeded(action: &MirrorAction, duration: Duration, message: String) -> Self {
        Self {
            full_name: action.full_name().to_string(),
            target: action.target().to_path_buf(),
            success: true,
            duration,
            error_kind: None,
            message,
        }
    }

    fn failed(
        action: &MirrorAction,
        duration: Duration,
        kind: ErrorKind,
        message: String,
    ) -> Self {
        Self {
            full_name: action.full_name().to_string(),
            target: action.target().to_path_buf(),
            success: false,
            duration,
            error_kind: Some(kind),
            message,
        }
    }

    fn skipped(action: &MirrorAction, kind: Option<ErrorKind>, message: String) -> Self {
        Self {
            full_name: action.full_name().to_string(),
            target: action.target().to_path_buf(),
            success: false,
            duration: Duration::ZERO,
            error_kind: kind,
            message,
        }
    }

    /// Skipped work: path collisions and actions cancelled before starting
    pub fn is_skip(&self) -> bool {
        !self.success
            && matches!(self.error_kind, None | Some(ErrorKind::PathCollision))
    }

    pub fn is_failure(&self) -> bool {
        !self.success && !self.is_skip()
    }
}

/// Aggregate result of one mirror pass
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    /// (full_name, error kind) per failure, in completion order
    pub failures: Vec<(String, ErrorKind)>,
    pub duration: Duration,
}

impl RunSummary {
    pub fn from_outcomes(outcomes: &[ActionOutcome], duration: Duration) -> Self {
        let mut summary = RunSummary {
            total: outcomes.len(),
            duration,
            ..Default::default()
        };

        for outcome in outcomes {
            if outcome.success {
                summary.succeeded += 1;
            } else if outcome.is_skip() {
                summary.skipped += 1;
            } else {
                summary.failed += 1;
                // is_failure guarantees a kind is present
                if let Some(kind) = outcome.error_kind {
                    summary.failures.push((outcome.full_name.clone(), kind));
                }
            }
        }

        summary
    }

    /// Pass exit status: success iff nothing failed
    pub fn all_ok(&self) -> bool {
        self.failed == 0
    }
}

/// Executes mirror actions with bounded concurrency
#[derive(Clone)]
pub struct SyncExecutor {
    git: GitClient,
    concurrency: usize,
}

impl SyncExecutor {
    /// Create an executor from the given configuration
    pub fn new(config: &Config) -> Self {
        Self {
            git: GitClient::new(config),
            concurrency: config.sync.concurrency.max(1),
        }
    }

    /// Execute a single action to completion
    pub async fn execute(&self, action: MirrorAction) -> ActionOutcome {
        let started = Instant::now();

        match &action {
            MirrorAction::Clone { descriptor, target } => {
                match self.git.clone_repository(&descriptor.clone_url, target).await {
                    Ok(detail) => ActionOutcome::succeeded(&action, started.elapsed(), detail),
                    Err(err) => {
                        ActionOutcome::failed(&action, started.elapsed(), err.kind, err.message)
                    }
                }
            }
            MirrorAction::Update { target, .. } => {
                match self.git.update_repository(target).await {
                    Ok(detail) => ActionOutcome::succeeded(&action, started.elapsed(), detail),
                    Err(err) => {
                        ActionOutcome::failed(&action, started.elapsed(), err.kind, err.message)
                    }
                }
            }
            MirrorAction::Skip { reason, .. } => {
                warn!("Skipping {}: {}", action.full_name(), reason);
                ActionOutcome::skipped(&action, Some(ErrorKind::PathCollision), reason.clone())
            }
        }
    }

    /// Execute all actions, at most `concurrency` at a time.
    ///
    /// Returns one outcome per input action, in completion order. Once
    /// `cancel` is set, queued actions are skipped rather than started;
    /// in-flight actions run to completion.
    pub async fn execute_all(
        &self,
        actions: Vec<MirrorAction>,
        cancel: Arc<AtomicBool>,
    ) -> Vec<ActionOutcome> {
        let total = actions.len();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));

        info!(
            "Executing {} actions with concurrency {}",
            total, self.concurrency
        );

        let mut futures = FuturesUnordered::new();

        for (index, action) in actions.into_iter().enumerate() {
            let semaphore = semaphore.clone();
            let cancel = cancel.clone();

            futures.push(async move {
                let _permit = semaphore.acquire().await.expect("Semaphore closed");

                if cancel.load(Ordering::SeqCst) {
                    debug!("Cancelled before start: {}", action.full_name());
                    return ActionOutcome::skipped(
                        &action,
                        None,
                        "cancelled before start".to_string(),
                    );
                }

                info!("[{}/{}] {}", index + 1, total, action.describe());
                self.execute(action).await
            });
        }

        let mut outcomes = Vec::with_capacity(total);

        while let Some(outcome) = futures.next().await {
            if outcome.success {
                debug!(
                    "{} done in {:.1}s",
                    outcome.full_name,
                    outcome.duration.as_secs_f64()
                );
            } else if outcome.is_failure() {
                warn!(
                    "{} failed ({}): {}",
                    outcome.full_name,
                    outcome.error_kind.map(|k| k.to_string()).unwrap_or_default(),
                    outcome.message
                );
            }
            outcomes.push(outcome);
        }

        outcomes
    }
}
