//! CLI arguments and environment variable handling using clap.

use std::path::PathBuf;

use clap::Parser;

/// Autopress: one scheduled content-pipeline run per invocation.
///
/// The scheduler invokes this binary on a timetable; overlapping firings of
/// the same job no-op behind the per-job lease.
#[derive(Parser, Debug, Clone)]
#[command(name = "autopress")]
#[command(about = "Automated content generation and correction sweep")]
pub struct Args {
    /// Job name; the per-job lease key
    #[arg(long, env = "AUTOPRESS_JOB", default_value = "correct-testimonials")]
    pub job: String,

    /// Batch size for this run
    #[arg(long, default_value_t = 1)]
    pub limit: usize,

    /// Suppress the interactive confirmation
    #[arg(long, default_value_t = false)]
    pub auto: bool,

    /// Also re-process items already in `generated` status
    #[arg(long, default_value_t = false)]
    pub force: bool,

    /// Restrict selection to one category slug
    #[arg(long)]
    pub category: Option<String>,

    /// Priority level, recorded with every event of this run
    #[arg(long)]
    pub priority: Option<String>,

    /// Extra inter-call pacing in seconds, additive to the rate limiter
    #[arg(long, default_value_t = 0)]
    pub delay: u64,

    /// Restrict to retryable failures from a prior tier
    #[arg(long = "only-failed-standard", default_value_t = false)]
    pub only_failed_standard: bool,

    /// Sleep through a closed rate-limit window instead of deferring items
    #[arg(long, default_value_t = false)]
    pub wait: bool,

    /// Path to the shared pipeline database
    #[arg(long, env = "AUTOPRESS_DB", default_value = "autopress.db")]
    pub db: PathBuf,

    /// Generation service base URL
    #[arg(long, env = "AUTOPRESS_API_URL", default_value = "https://api.generation.example")]
    pub api_url: String,

    /// Generation service API key (required)
    #[arg(long, env = "AUTOPRESS_API_KEY")]
    pub api_key: Option<String>,

    /// Model identifier requested from the service
    #[arg(long, env = "AUTOPRESS_MODEL", default_value = "gemini-1.5-pro")]
    pub model: String,

    /// Minimum seconds between service calls, shared across all jobs
    #[arg(long, default_value_t = 120)]
    pub cooldown_secs: u64,

    /// Per-job lease duration in minutes
    #[arg(long, default_value_t = 15)]
    pub lease_minutes: u64,

    /// Retry cap per item
    #[arg(long, default_value_t = pipeline::DEFAULT_MAX_RETRIES)]
    pub max_retries: u32,

    /// Warn when fewer than this many generated items await publication
    #[arg(long, default_value_t = 5)]
    pub backlog_threshold: u64,

    /// Also purge terminal items older than this many days
    #[arg(long)]
    pub cleanup_days: Option<u64>,
}
