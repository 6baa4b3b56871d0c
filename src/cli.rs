//! CLI - Command Line Interface for Termflix
//!
//! Every command prints human-readable text on a TTY and JSON otherwise,
//! so catalog output can be piped into scripts.
//!
//! # Examples
//!
//! ```bash
//! # Browse a catalog
//! termflix catalog trending
//! termflix catalog genre --genre horror --page 2
//!
//! # Search across all sources
//! termflix search "the matrix" --all
//!
//! # Interactive pager, then hand a magnet to the player
//! termflix browse latest
//! termflix play "magnet:?xt=urn:btih:..."
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::io::IsTerminal;
use std::path::PathBuf;

use crate::models::{CatalogKind, CatalogQuery};

// =============================================================================
// Exit Codes
// =============================================================================

/// Exit codes for CLI operations (semantic for scripting)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Success
    Success = 0,
    /// General error
    Error = 1,
    /// Invalid arguments
    InvalidArgs = 2,
    /// No results from any source
    NoResults = 5,
    /// Player handoff failed
    HandoffFailed = 6,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code as i32
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> std::process::ExitCode {
        std::process::ExitCode::from(code as u8)
    }
}

// =============================================================================
// Main CLI Structure
// =============================================================================

/// Termflix - terminal torrent catalog browser
#[derive(Parser, Debug)]
#[command(
    name = "termflix",
    version,
    about = "Browse torrent catalogs aggregated from several indexes",
    long_about = "Queries several torrent indexes concurrently, merges duplicate \
                  releases of the same title, caches the result and keeps \
                  loading further pages in the background while you browse.",
    after_help = "EXAMPLES:\n\
                  termflix catalog trending            Trending titles\n\
                  termflix search \"blade runner\"       Search all sources\n\
                  termflix browse shows                Interactive pager\n\
                  termflix cache status --json         Cache statistics"
)]
pub struct Cli {
    /// Output format as JSON (default for non-TTY)
    #[arg(long, short = 'j', global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Enable debug logging on stderr
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Path to config file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Neither read nor write the catalog cache
    #[arg(long, global = true)]
    pub no_cache: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Check if JSON output should be used
    pub fn should_json(&self) -> bool {
        self.json || !std::io::stdout().is_terminal()
    }
}

// =============================================================================
// Subcommands
// =============================================================================

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List a catalog (latest, trending, popular, shows, genre)
    #[command(visible_alias = "c")]
    Catalog(CatalogCmd),

    /// Search all sources for a title
    #[command(visible_alias = "s")]
    Search(SearchCmd),

    /// Page through a catalog interactively
    #[command(visible_alias = "b")]
    Browse(BrowseCmd),

    /// Hand a magnet link or info hash to the player
    #[command(visible_alias = "p")]
    Play(PlayCmd),

    /// Merge pipe-delimited records from a file or stdin
    Merge(MergeCmd),

    /// Inspect or clear the catalog cache
    Cache(CacheCmd),
}

/// Catalog kinds selectable on the command line
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CatalogChoice {
    /// Recently added
    #[default]
    Latest,
    /// Most downloaded right now
    Trending,
    /// Most liked overall
    Popular,
    /// TV shows
    Shows,
    /// One genre (requires --genre)
    Genre,
}

impl From<CatalogChoice> for CatalogKind {
    fn from(choice: CatalogChoice) -> Self {
        match choice {
            CatalogChoice::Latest => CatalogKind::Latest,
            CatalogChoice::Trending => CatalogKind::Trending,
            CatalogChoice::Popular => CatalogKind::Popular,
            CatalogChoice::Shows => CatalogKind::Shows,
            CatalogChoice::Genre => CatalogKind::Genre,
        }
    }
}

// =============================================================================
// Catalog Command
// =============================================================================

#[derive(Args, Debug)]
pub struct CatalogCmd {
    /// Catalog to list
    #[arg(value_enum, default_value = "latest")]
    pub kind: CatalogChoice,

    /// Genre name for the genre catalog
    #[arg(long, short = 'g')]
    pub genre: Option<String>,

    /// Page to show (1-based)
    #[arg(long, short = 'p', default_value = "1")]
    pub page: usize,

    /// Wait for background prefetching and print every page
    #[arg(long, short = 'a')]
    pub all: bool,

    /// Ignore a fresh cache entry
    #[arg(long, short = 'r')]
    pub refresh: bool,

    /// Records requested per source page
    #[arg(long, short = 'l')]
    pub limit: Option<u32>,
}

impl CatalogCmd {
    /// Build the query, validating that genre has a name
    pub fn query(&self, default_limit: u32) -> Result<CatalogQuery, &'static str> {
        let limit = self.limit.unwrap_or(default_limit);
        match (self.kind, self.genre.as_deref().map(str::trim)) {
            (CatalogChoice::Genre, Some(genre)) if !genre.is_empty() => {
                Ok(CatalogQuery::genre(genre, limit))
            }
            (CatalogChoice::Genre, _) => Err("The genre catalog requires --genre <NAME>"),
            (kind, _) => Ok(CatalogQuery::new(kind.into(), limit)),
        }
    }
}

// =============================================================================
// Search Command
// =============================================================================

#[derive(Args, Debug)]
pub struct SearchCmd {
    /// Search query (title, keywords)
    #[arg(required = true)]
    pub query: String,

    /// Page to show (1-based)
    #[arg(long, short = 'p', default_value = "1")]
    pub page: usize,

    /// Wait for background prefetching and print every page
    #[arg(long, short = 'a')]
    pub all: bool,

    /// Ignore a fresh cache entry
    #[arg(long, short = 'r')]
    pub refresh: bool,

    /// Records requested per source page
    #[arg(long, short = 'l')]
    pub limit: Option<u32>,
}

// =============================================================================
// Browse Command
// =============================================================================

#[derive(Args, Debug)]
pub struct BrowseCmd {
    /// Catalog to open
    #[arg(value_enum, default_value = "latest")]
    pub kind: CatalogChoice,

    /// Genre name for the genre catalog
    #[arg(long, short = 'g')]
    pub genre: Option<String>,

    /// Open a search instead of a catalog
    #[arg(long, short = 's')]
    pub search: Option<String>,
}

// =============================================================================
// Play Command
// =============================================================================

#[derive(Args, Debug)]
pub struct PlayCmd {
    /// Magnet URI or bare info hash
    #[arg(required = true)]
    pub magnet: String,

    /// Player command template, `{magnet}` is substituted
    #[arg(long)]
    pub player: Option<String>,

    /// Return immediately instead of waiting for the player to exit
    #[arg(long, short = 'd')]
    pub detach: bool,
}

// =============================================================================
// Merge Command
// =============================================================================

#[derive(Args, Debug)]
pub struct MergeCmd {
    /// Input file (stdin when omitted)
    pub file: Option<PathBuf>,
}

// =============================================================================
// Cache Command
// =============================================================================

#[derive(Args, Debug)]
pub struct CacheCmd {
    #[command(subcommand)]
    pub action: CacheAction,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheAction {
    /// Show entry count and size
    Status,
    /// Delete every cached catalog
    Clear,
}

// =============================================================================
// JSON Output Types
// =============================================================================

/// Generic JSON output wrapper with status
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonOutput<T: Serialize> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "is_zero")]
    pub exit_code: i32,
}

fn is_zero(n: &i32) -> bool {
    *n == 0
}

impl<T: Serialize> JsonOutput<T> {
    /// Create success output with data
    pub fn success(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
            exit_code: 0,
        }
    }

    /// Create error output (no data)
    pub fn error_msg(msg: impl Into<String>, code: ExitCode) -> JsonOutput<()> {
        JsonOutput::<()> {
            data: None,
            error: Some(msg.into()),
            exit_code: code.into(),
        }
    }
}

// =============================================================================
// Output Helpers
// =============================================================================

/// Output handler for consistent formatting
pub struct Output {
    pub json: bool,
    pub quiet: bool,
}

impl Output {
    pub fn new(cli: &Cli) -> Self {
        Self {
            json: cli.should_json(),
            quiet: cli.quiet,
        }
    }

    /// Print success data as JSON
    pub fn print<T: Serialize>(&self, data: T) -> anyhow::Result<()> {
        let output = JsonOutput::success(data);
        println!("{}", serde_json::to_string_pretty(&output)?);
        Ok(())
    }

    /// Print a plain line to stdout
    pub fn line(&self, msg: impl std::fmt::Display) {
        println!("{}", msg);
    }

    /// Print error and return exit code
    pub fn error(&self, msg: impl Into<String>, code: ExitCode) -> ExitCode {
        let msg = msg.into();
        if self.json {
            let output = JsonOutput::<()>::error_msg(&msg, code);
            if let Ok(json) = serde_json::to_string_pretty(&output) {
                eprintln!("{}", json);
            }
        } else if !self.quiet {
            eprintln!("Error: {}", msg);
        }
        code
    }

    /// Print info message (suppressed in quiet mode)
    pub fn info(&self, msg: impl std::fmt::Display) {
        if !self.quiet && !self.json {
            eprintln!("{}", msg);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
