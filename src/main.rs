use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use forgemirror::{Config, Orchestrator, RunSummary};

#[derive(Parser)]
#[command(name = "forgemirror")]
#[command(about = "Mirror every repository a forge token can access into a local tree")]
#[command(version)]
struct Cli {
    /// Configuration file path (defaults to XDG config location)
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Run a single mirror pass and exit
    #[arg(long)]
    once: bool,

    /// Print the planned actions without executing anything
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config)?;
    config.apply_env_overrides()?;

    init_logging(cli.verbose || config.verbose)?;
    info!("Starting forgemirror v{}", env!("CARGO_PKG_VERSION"));

    let orchestrator = Orchestrator::new(config)?;

    if cli.dry_run {
        let actions = orchestrator.plan_once().await?;
        for action in &actions {
            println!("  {}", action.describe());
        }
        println!("{} actions planned", actions.len());
        return Ok(());
    }

    if cli.once {
        let summary = orchestrator.run_once().await?;
        print_summary(&summary);

        if !summary.all_ok() {
            std::process::exit(1);
        }
        return Ok(());
    }

    orchestrator.run().await
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    Ok(())
}

/// Load configuration from specified path or default location
fn load_config(config_path: Option<std::path::PathBuf>) -> Result<Config> {
    match config_path {
        Some(path) => Config::load(&path),
        None => Config::load_or_default(),
    }
}

/// Print the per-pass summary to stdout
fn print_summary(summary: &RunSummary) {
    println!();
    println!("Mirror pass complete in {:.1}s", summary.duration.as_secs_f64());
    println!("   Total repositories: {}", summary.total);
    println!("   ✅ Succeeded: {}", summary.succeeded);
    println!("   ❌ Failed: {}", summary.failed);
    println!("   ⏭️  Skipped: {}", summary.skipped);

    if !summary.failures.is_empty() {
        println!();
        println!("Failures:");
        for (full_name, kind) in &summary.failures {
            println!("   ❌ {} ({})", full_name, kind);
        }
    }
}
