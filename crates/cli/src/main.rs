//! Autopress CLI entry point.
//!
//! This binary is the composition root for the entire pipeline. Responsibilities:
//!
//! 1. **Parse configuration**: flags and environment via [`config::Args`].
//! 2. **Wire observability**: `tracing-subscriber` with an env filter; all
//!    `tracing` events emitted by every crate in the workspace flow through it.
//! 3. **Construct infrastructure**: open the shared SQLite store, build the
//!    rate limiter and the HTTP generation client, and inject them into the
//!    orchestrator.
//! 4. **Run one job**: take the per-job lease, sweep one batch, check the
//!    backlog, optionally run cleanup, release the lease, exit.
//!
//! Exit status: 0 on a clean run (including "nothing to do" and "lease held
//! elsewhere"), non-zero on an unrecoverable setup error such as missing
//! credentials.

mod config;

use std::io::{BufRead, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::Args;
use jobs::{check_backlog, run_exclusive, JobRun, Orchestrator, OrchestratorConfig};
use llm::{HttpGenerationClient, PacingMode};
use pipeline::{
    BatchFilter, CategorySlug, Clock, ContentItemRepository, GenerationCost, JobName, LeaseStore,
    LimiterKey, ModelId, RateLimiter, SystemClock,
};
use store::SqliteStore;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Ask before processing, unless `--auto`. Declining is a clean no-op.
fn confirm(count: usize) -> anyhow::Result<bool> {
    print!("Process {count} item(s)? [y/N] ");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(matches!(line.trim(), "y" | "Y" | "yes"))
}

async fn run(args: Args) -> anyhow::Result<()> {
    let api_key = match args.api_key.as_deref() {
        Some(key) if !key.is_empty() => key.to_owned(),
        _ => bail!("missing generation service credentials (set AUTOPRESS_API_KEY)"),
    };
    let model = ModelId::new(args.model.clone()).context("model must not be empty")?;
    let job = JobName::new(args.job.clone()).context("job name must not be empty")?;

    let store = Arc::new(
        SqliteStore::open(&args.db)
            .with_context(|| format!("opening pipeline database {}", args.db.display()))?,
    );
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let limiter = RateLimiter::with_cooldown(
        store.clone(),
        clock.clone(),
        Duration::from_secs(args.cooldown_secs),
    );
    let pacing = if args.wait { PacingMode::Block } else { PacingMode::Defer };
    let provider = HttpGenerationClient::new(
        args.api_url.clone(),
        api_key,
        limiter,
        LimiterKey::new("generation-service").context("limiter key must not be empty")?,
    )
    .with_pacing(pacing)
    .with_extra_delay(Duration::from_secs(args.delay));

    let orchestrator = Orchestrator::new(
        store.clone(),
        Arc::new(provider),
        clock.clone(),
        OrchestratorConfig {
            max_retries: args.max_retries,
            model,
            cost_per_call: GenerationCost::zero(),
        },
    );

    let filter = BatchFilter {
        category: args.category.as_deref().and_then(CategorySlug::new),
        only_failed: args.only_failed_standard,
        include_generated: args.force,
        max_retries: args.max_retries,
    };

    info!(job = %job, limit = args.limit, priority = ?args.priority, "starting run");

    let eligible = orchestrator.select_batch(&filter, args.limit)?.len();
    if eligible == 0 {
        info!("nothing to do");
        return Ok(());
    }
    if !args.auto && !confirm(eligible)? {
        info!("declined by operator");
        return Ok(());
    }

    let leases: Arc<dyn LeaseStore> = store.clone();
    let ttl = Duration::from_secs(args.lease_minutes * 60);
    let run = run_exclusive(leases, clock, &job, ttl, || async {
        let summary = orchestrator.run_batch(&filter, args.limit).await?;
        let repo: Arc<dyn ContentItemRepository> = store.clone();
        check_backlog(repo, args.backlog_threshold)?;
        if let Some(days) = args.cleanup_days {
            orchestrator.cleanup(Duration::from_secs(days * 24 * 3600))?;
        }
        Ok::<_, anyhow::Error>(summary)
    })
    .await?;

    match run {
        JobRun::Completed(result) => {
            let summary = result?;
            info!(?summary, "run complete");
            Ok(())
        }
        JobRun::AlreadyRunning => {
            info!(job = %args.job, "another invocation holds the lease; exiting");
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() {
    init_tracing();
    let args = Args::parse();
    if let Err(err) = run(args).await {
        eprintln!("autopress: {err:#}");
        std::process::exit(1);
    }
}
