//! Termflix - terminal torrent catalog browser
//!
//! Aggregates catalogs from several torrent indexes, merges duplicate
//! releases and keeps loading pages in the background while you browse.
//!
//! # Usage
//!
//! ```bash
//! termflix catalog trending
//! termflix search "blade runner" --json
//! termflix browse shows
//! termflix cache clear
//! ```

use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use termflix::cli::{Cli, Command, Output};
use termflix::commands::{self, Context};
use termflix::config::Config;

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    let output = Output::new(&cli);
    let config = match &cli.config {
        Some(path) => Config::load_from(path).with_env_overrides(),
        None => Config::load(),
    };
    let ctx = Context::new(config, cli.no_cache);

    let code = match cli.command {
        Command::Catalog(cmd) => commands::catalog_cmd(cmd, &ctx, &output).await,
        Command::Search(cmd) => commands::search_cmd(cmd, &ctx, &output).await,
        Command::Browse(cmd) => commands::browse_cmd(cmd, &ctx, &output).await,
        Command::Play(cmd) => commands::play_cmd(cmd, &ctx, &output).await,
        Command::Merge(cmd) => commands::merge_cmd(cmd, &output).await,
        Command::Cache(cmd) => commands::cache_cmd(cmd, &ctx, &output).await,
    };
    code.into()
}

/// Logs go to stderr so stdout stays parseable; RUST_LOG overrides
fn init_logging(cli: &Cli) {
    let default = if cli.verbose {
        "termflix=debug"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
