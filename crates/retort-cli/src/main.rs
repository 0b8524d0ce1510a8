//! CLI entry point for retort.
//!
//! Loads configuration, wires the X API adapter, the reply generator and
//! the processed-marker store into a poll cycle controller, then hands it to
//! the scheduler.  Ctrl-C or SIGTERM stops the loop between cycles.

mod cli;
mod config;
mod helpers;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use retort_adapters::TwitterAdapter;
use retort_agent::{LlmClient, LlmReplyGenerator};
use retort_kernel::{CycleOutcome, PollCycleController, Scheduler};
use retort_store::ProcessedStore;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::cli::Cli;
use crate::config::Settings;
use crate::helpers::{init_tracing, shutdown_signal};

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // A missing .env is fine; the environment may already be populated.
    let _ = dotenvy::dotenv();
    init_tracing("info");

    let file = config::load_file(&cli.config)?;
    let settings =
        Settings::from_env(cli.account.clone(), file.as_ref()).context("invalid configuration")?;

    let store = ProcessedStore::open(&settings.state_path)
        .await
        .with_context(|| {
            format!(
                "failed to open processed-marker store at {}",
                settings.state_path.display()
            )
        })?;

    let twitter = Arc::new(
        TwitterAdapter::new(
            settings.twitter.bearer_token.clone(),
            settings.twitter.oauth.clone(),
        )
        .context("failed to set up the X API client")?,
    );
    let llm = LlmClient::new(settings.llm.clone())
        .context("failed to set up the text-generation client")?;

    info!(
        account = %settings.account,
        provider = %llm.provider(),
        model = %llm.default_model(),
        post_limit = settings.post_limit,
        comment_limit = settings.comment_limit,
        interval_secs = settings.poll_interval.as_secs(),
        processed = store.len(),
        state_path = %settings.state_path.display(),
        "retort starting"
    );

    let controller = PollCycleController::new(
        settings.cycle_config(),
        twitter.clone(),
        Arc::new(LlmReplyGenerator::new(llm)),
        twitter,
        store,
    );
    let mut scheduler = Scheduler::new(controller, settings.scheduler_config());

    if cli.once {
        let outcome = scheduler.run_once().await;
        log_single_cycle(&outcome);
        return Ok(());
    }

    let stop = shutdown_signal().context("failed to install signal handlers")?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        let signal = stop.await;
        info!(signal, "shutdown requested, stopping after the current cycle");
        let _ = shutdown_tx.send(true);
    });

    scheduler.run(shutdown_rx).await;
    info!("goodbye");
    Ok(())
}

fn log_single_cycle(outcome: &CycleOutcome) {
    match outcome {
        CycleOutcome::Completed(report) => {
            info!(
                replied = report.replies_dispatched,
                failures = report.failures,
                "single cycle finished"
            );
        }
        CycleOutcome::RateLimited { retry_after, report } => warn!(
            replied = report.replies_dispatched,
            retry_after_secs = retry_after.map(|d| d.as_secs()),
            "single cycle stopped by rate limit"
        ),
        CycleOutcome::AccountLookupFailed { reason } => {
            warn!(%reason, "single cycle ended: account lookup failed");
        }
        CycleOutcome::PostsUnavailable { reason } => {
            warn!(%reason, "single cycle ended: posts unavailable");
        }
    }
}
