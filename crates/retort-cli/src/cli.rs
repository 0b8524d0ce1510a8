//! CLI argument definitions for retort.

use std::path::PathBuf;

use clap::Parser;

/// retort -- answers comments on your posts with sarcastic one-liners.
#[derive(Parser, Debug)]
#[command(
    name = "retort",
    version,
    about = "retort -- sarcastic auto-replies for X",
    long_about = "Polls the monitored account's recent posts, generates a reply for every \
                  comment it has not answered yet, and posts it. Secrets come from the \
                  environment (or a .env file)."
)]
pub struct Cli {
    /// Run a single poll cycle and exit.
    #[arg(long)]
    pub once: bool,

    /// Account handle to monitor (overrides RETORT_ACCOUNT).
    #[arg(long, short)]
    pub account: Option<String>,

    /// Optional TOML file with a `[bot]` section of non-secret settings.
    #[arg(long, default_value = "config/default.toml")]
    pub config: PathBuf,
}
