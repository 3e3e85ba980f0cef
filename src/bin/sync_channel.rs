#![forbid(unsafe_code)]

//! Uploads local videos the channel lacks and rebuilds the playlists named in
//! a sync plan.
//!
//! Usage:
//!   sync_channel --plan plan.toml [--env-file .env] [--dry-run] [--verbose]
//!
//! Credentials come from `YOUTUBE_ACCESS_TOKEN` or `YOUTUBE_TOKEN_FILE`, read
//! from the environment or the env file.

use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};
use video_curation::{
    api::{HttpYouTubeApi, Session},
    channel::Channel,
    config::{RuntimeOverrides, resolve_runtime_settings},
    plan::SyncPlan,
    repo::VideoRepo,
    security::{check_token_file, ensure_not_root},
    sync::{self, SyncOptions, SyncReport},
};

#[derive(Parser, Debug)]
#[command(name = "sync_channel")]
#[command(about = "Reconcile a YouTube channel with local videos and a playlist plan")]
#[command(version)]
struct Args {
    /// TOML file describing roots, defaults and playlist groups
    #[arg(long)]
    plan: PathBuf,

    /// Env file with YOUTUBE_* settings (default: .env)
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// JSON file holding an OAuth access_token
    #[arg(long)]
    token_file: Option<PathBuf>,

    /// Report what would change without touching the channel
    #[arg(long)]
    dry_run: bool,

    /// Delete uploads the remote rejected before syncing
    #[arg(long)]
    delete_rejected: bool,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long, short)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    fmt().with_env_filter(filter).init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);
    ensure_not_root("sync_channel")?;

    let settings = resolve_runtime_settings(RuntimeOverrides {
        access_token: None,
        token_file: args.token_file.clone(),
        env_path: args.env_file.clone(),
    })?;
    if let Some(token_file) = &settings.token_file {
        check_token_file(token_file)?;
    }
    let plan = SyncPlan::load(&args.plan)?;
    let repo = VideoRepo::scan(&plan.roots, &plan.extensions)?;

    let session: Session = Rc::new(HttpYouTubeApi::new(settings.api_settings()));
    let mut channel = Channel::connect(session).context("Connecting to the channel")?;

    let options = SyncOptions {
        dry_run: args.dry_run,
        delete_rejected: args.delete_rejected,
        policy: settings.retry_policy(),
    };
    let report = sync::run(&mut channel, &repo, &plan, &options).context("Sync pass failed")?;
    print_report(&report);

    if !report.is_clean() {
        anyhow::bail!(
            "{} uploads and {} groups failed",
            report.failed.len(),
            report.failed_groups.len()
        );
    }
    Ok(())
}

fn print_report(report: &SyncReport) {
    let verb = if report.dry_run { "would upload" } else { "uploaded" };
    for title in &report.rejected {
        info!(title = %title, dry_run = report.dry_run, "rejected video");
    }
    for title in &report.uploaded {
        println!("{verb}: {title}");
    }
    for (title, err) in &report.failed {
        warn!(title = %title, error = %err, "upload failed");
        println!("failed upload: {title}: {err}");
    }
    for outcome in &report.reconciled {
        let state = if outcome.changed() { "changed" } else { "unchanged" };
        println!(
            "playlist {}: {state} (created: {}, duplicates removed: {}, rewritten: {}, moved: {})",
            outcome.playlist,
            outcome.created,
            outcome.duplicates_removed,
            outcome.rewritten,
            outcome.moved
        );
    }
    for (playlist, err) in &report.failed_groups {
        println!("failed playlist: {playlist}: {err}");
    }
}
