//! Run orchestrator - drives mirror passes on a fixed interval
//!
//! One pass is enumerate, plan, execute, summarize. The long-lived driver
//! repeats passes until cancelled; an enumeration failure aborts only the
//! current pass, never the driver itself.

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::forge::{ForgeClient, RepoSource};
use crate::plan::{plan, MirrorAction};
use crate::sync::{RunSummary, SyncExecutor};

/// Owns the pass schedule and its cancellation state
pub struct Orchestrator {
    config: Arc<Config>,
    source: Arc<dyn RepoSource>,
    executor: SyncExecutor,
    cancel: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Orchestrator {
    /// Create an orchestrator backed by the HTTP forge client
    pub fn new(config: Config) -> Result<Self> {
        let source = Arc::new(ForgeClient::new(&config)?);
        Ok(Self::with_source(config, source))
    }

    /// Create an orchestrator with an explicit descriptor source
    pub fn with_source(config: Config, source: Arc<dyn RepoSource>) -> Self {
        let executor = SyncExecutor::new(&config);
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config: Arc::new(config),
            source,
            executor,
            cancel: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
        }
    }

    /// Request a clean shutdown: in-flight actions finish, nothing new starts
    pub fn request_shutdown(&self) {
        self.cancel.store(true, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(());
    }

    /// Enumerate and plan without executing anything (dry run)
    pub async fn plan_once(&self) -> Result<Vec<MirrorAction>> {
        let descriptors = self
            .source
            .list_repositories()
            .await
            .context("Repository enumeration failed")?;

        Ok(plan(&descriptors, &self.config.mirror_dir_path()))
    }

    /// Run one full mirror pass
    ///
    /// An Err means the pass failed before any action ran (enumeration or
    /// mirror directory setup); per-repository failures are recorded in the
    /// returned summary instead.
    pub async fn run_once(&self) -> Result<RunSummary> {
        let started = Instant::now();
        info!("Starting mirror pass");

        let descriptors = self
            .source
            .list_repositories()
            .await
            .context("Repository enumeration failed")?;

        let mirror_dir = self.config.mirror_dir_path();
        tokio::fs::create_dir_all(&mirror_dir)
            .await
            .with_context(|| format!("Failed to create mirror directory {}", mirror_dir.display()))?;

        let actions = plan(&descriptors, &mirror_dir);
        let outcomes = self.executor.execute_all(actions, self.cancel.clone()).await;

        let summary = RunSummary::from_outcomes(&outcomes, started.elapsed());
        log_summary(&summary);

        Ok(summary)
    }

    /// Long-lived driver: run a pass immediately, then on every interval
    /// tick, until a shutdown is requested.
    pub async fn run(&self) -> Result<()> {
        self.spawn_signal_handler();

        // tokio::time::interval panics on a zero period
        let pass_interval = self.config.pass_interval().max(std::time::Duration::from_secs(1));
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut timer = interval(pass_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Mirroring every {}s until stopped", pass_interval.as_secs());

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Shutdown requested, exiting scheduler");
                    break;
                }

                _ = timer.tick() => {
                    if self.cancel.load(Ordering::SeqCst) {
                        break;
                    }

                    // A fatal pass error is logged and the schedule continues
                    if let Err(e) = self.run_once().await {
                        error!("Mirror pass failed: {:#}", e);
                    }

                    if self.cancel.load(Ordering::SeqCst) {
                        break;
                    }
                    info!("Next pass in {}s", pass_interval.as_secs());
                }
            }
        }

        info!("Orchestrator stopped");
        Ok(())
    }

    /// Ctrl+C finishes in-flight actions, then stops the scheduler
    fn spawn_signal_handler(&self) {
        let cancel = self.cancel.clone();
        let shutdown_tx = self.shutdown_tx.clone();

        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown signal received, finishing in-flight actions");
                cancel.store(true, Ordering::SeqCst);
                let _ = shutdown_tx.send(());
            }
        });
    }
}

fn log_summary(summary: &RunSummary) {
    info!(
        "Pass completed in {:.1}s: {} total, {} succeeded, {} failed, {} skipped",
        summary.duration.as_secs_f64(),
        summary.total,
        summary.succeeded,
        summary.failed,
        summary.skipped
    );

    for (full_name, kind) in &summary.failures {
        warn!("  failed: {} ({})", full_name, kind);
    }
}
