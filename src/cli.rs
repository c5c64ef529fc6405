//! Command-line interface definitions for Satire Wire.
//!
//! Secrets can be passed as flags but are normally read from the environment.
//! Tuning knobs live in the YAML file given with `--config`.

use clap::Parser;

/// Command-line arguments for the Satire Wire bot.
///
/// # Examples
///
/// ```sh
/// # Long-running bot against Postgres
/// DATABASE_URL=postgres://... GEMINI_API_KEY=... satire_wire -c pipeline.yaml
///
/// # Try the pipeline once without touching the database
/// GEMINI_API_KEY=... satire_wire --dry-run --once
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to the pipeline YAML file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Postgres connection URL
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,

    /// API key for the text-generation backend
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub gemini_api_key: String,

    /// Unsplash access key (falls back to the public search endpoint when absent)
    #[arg(long, env = "UNSPLASH_ACCESS_KEY", hide_env_values = true)]
    pub unsplash_access_key: Option<String>,

    /// Flickr API key (secondary image provider is disabled when absent)
    #[arg(long, env = "FLICKR_API_KEY", hide_env_values = true)]
    pub flickr_api_key: Option<String>,

    /// Keep generated articles in memory instead of writing to Postgres
    #[arg(long)]
    pub dry_run: bool,

    /// Run one topic refresh and one article, then exit
    #[arg(long)]
    pub once: bool,
}
