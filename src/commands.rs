//! CLI Command Handlers
//!
//! Each handler takes its CLI args, the shared [`Context`] and the
//! [`Output`], and returns an ExitCode.

use std::sync::Arc;

use anyhow::{Context as _, Result};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tracing::warn;

use crate::catalog::{
    merge, CacheManager, CatalogError, PageCount, PrefetchController, PrefetchSettings,
    PrefetchState,
};
use crate::cli::{
    BrowseCmd, CacheAction, CacheCmd, CatalogChoice, CatalogCmd, ExitCode, MergeCmd, Output,
    PlayCmd, SearchCmd,
};
use crate::config::Config;
use crate::handoff::{self, HandoffError};
use crate::models::{CanonicalWork, CatalogQuery};
use crate::source::SourceRegistry;

/// Settings shared by every command
pub struct Context {
    pub config: Config,
    pub no_cache: bool,
}

impl Context {
    pub fn new(config: Config, no_cache: bool) -> Self {
        Self { config, no_cache }
    }

    pub fn cache(&self) -> Result<CacheManager> {
        CacheManager::from_config(&self.config).context("Failed to locate cache directory")
    }

    /// Controller wired to the configured sources and cache
    pub fn controller(&self) -> Result<PrefetchController> {
        let sources = SourceRegistry::from_config(&self.config);
        if sources.is_empty() {
            anyhow::bail!("No usable sources configured");
        }
        let cache = if self.no_cache { None } else { Some(self.cache()?) };
        let settings = PrefetchSettings::from(&self.config.catalog);
        Ok(PrefetchController::new(Arc::new(sources), cache, settings)?)
    }
}

/// One page of a listing, as printed in JSON mode
#[derive(Debug, Serialize)]
struct CatalogPage<'a> {
    query: String,
    /// 1-based; absent when every page is printed
    #[serde(skip_serializing_if = "Option::is_none")]
    page: Option<usize>,
    pages: usize,
    provisional: bool,
    from_cache: bool,
    works: &'a [CanonicalWork],
}

// =============================================================================
// Catalog & Search Commands
// =============================================================================

pub async fn catalog_cmd(cmd: CatalogCmd, ctx: &Context, output: &Output) -> ExitCode {
    let query = match cmd.query(ctx.config.catalog.fetch_limit) {
        Ok(query) => query,
        Err(msg) => return output.error(msg, ExitCode::InvalidArgs),
    };
    listing(query, cmd.page, cmd.all, cmd.refresh, ctx, output).await
}

pub async fn search_cmd(cmd: SearchCmd, ctx: &Context, output: &Output) -> ExitCode {
    if cmd.query.trim().is_empty() {
        return output.error("Search query is empty", ExitCode::InvalidArgs);
    }
    let limit = cmd.limit.unwrap_or(ctx.config.catalog.fetch_limit);
    let query = CatalogQuery::search(cmd.query.trim(), limit);
    listing(query, cmd.page, cmd.all, cmd.refresh, ctx, output).await
}

async fn listing(
    query: CatalogQuery,
    page: usize,
    all: bool,
    refresh: bool,
    ctx: &Context,
    output: &Output,
) -> ExitCode {
    if page == 0 {
        return output.error("Pages are numbered from 1", ExitCode::InvalidArgs);
    }

    let mut controller = match ctx.controller() {
        Ok(controller) => controller,
        Err(e) => return output.error(format!("{:#}", e), ExitCode::Error),
    };

    output.info(format!("Loading {}...", query));
    if let Err(e) = controller.open(query.clone(), refresh).await {
        return catalog_error(e, output);
    }

    let from_cache = controller.session().is_some_and(|s| s.from_cache);
    let (works, count, shown_page) = if all {
        let count = controller.drain().await;
        (controller.works().to_vec(), count, None)
    } else {
        let works = controller.turn_to(page - 1).to_vec();
        (works, controller.total_pages(), Some(page))
    };

    if output.json {
        let data = CatalogPage {
            query: query.to_string(),
            page: shown_page,
            pages: count.pages,
            provisional: count.provisional,
            from_cache,
            works: &works,
        };
        if let Err(e) = output.print(&data) {
            return output.error(format!("Failed to serialize: {}", e), ExitCode::Error);
        }
        return ExitCode::Success;
    }

    output.line(page_header(&query, shown_page, count));
    let offset = shown_page.map(|p| (p - 1) * controller.settings().page_size).unwrap_or(0);
    for (i, work) in works.iter().enumerate() {
        output.line(format!("{:>4}. {}", offset + i + 1, work));
    }
    ExitCode::Success
}

fn catalog_error(e: CatalogError, output: &Output) -> ExitCode {
    match e {
        CatalogError::NoResults(_) => output.error(e.to_string(), ExitCode::NoResults),
        CatalogError::NoRuntime => output.error(e.to_string(), ExitCode::Error),
    }
}

fn page_header(query: &CatalogQuery, page: Option<usize>, count: PageCount) -> String {
    let more = if count.provisional { " (more loading)" } else { "" };
    match page {
        Some(p) => format!("{} - page {}/{}{}", query, p, count.pages.max(1), more),
        None => format!("{} - {} pages{}", query, count.pages, more),
    }
}

// =============================================================================
// Browse Command
// =============================================================================

const BROWSE_HELP: &str = "n: next  p: prev  <num>: details  w <num>: watch  \
                           /<query>: search  c <catalog>: switch catalog  q: quit";

pub async fn browse_cmd(cmd: BrowseCmd, ctx: &Context, output: &Output) -> ExitCode {
    let limit = ctx.config.catalog.fetch_limit;
    let query = match &cmd.search {
        Some(term) if !term.trim().is_empty() => CatalogQuery::search(term.trim(), limit),
        _ => {
            let catalog = CatalogCmd {
                kind: cmd.kind,
                genre: cmd.genre.clone(),
                page: 1,
                all: false,
                refresh: false,
                limit: None,
            };
            match catalog.query(limit) {
                Ok(query) => query,
                Err(msg) => return output.error(msg, ExitCode::InvalidArgs),
            }
        }
    };

    let mut controller = match ctx.controller() {
        Ok(controller) => controller,
        Err(e) => return output.error(format!("{:#}", e), ExitCode::Error),
    };

    match browse_loop(&mut controller, query, ctx, output).await {
        Ok(code) => code,
        Err(e) => output.error(format!("{:#}", e), ExitCode::Error),
    }
}

async fn browse_loop(
    controller: &mut PrefetchController,
    query: CatalogQuery,
    ctx: &Context,
    output: &Output,
) -> Result<ExitCode> {
    if let Err(e) = controller.open(query.clone(), false).await {
        return Ok(catalog_error(e, output));
    }

    let mut current = query;
    let mut page = 0usize;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        render_page(controller, &current, page, output);
        eprintln!("{}", BROWSE_HELP);

        let Some(line) = lines.next_line().await.context("Failed to read input")? else {
            return Ok(ExitCode::Success);
        };
        let input = line.trim();

        match input {
            "q" | "quit" => return Ok(ExitCode::Success),
            "" | "n" => {
                let count = controller.total_pages();
                if page + 1 < count.pages {
                    page += 1;
                }
            }
            "p" => page = page.saturating_sub(1),
            _ if input.starts_with('/') => {
                let term = input[1..].trim();
                if term.is_empty() {
                    continue;
                }
                let next = CatalogQuery::search(term, current.limit);
                if switch_to(controller, &current, next.clone(), output).await {
                    current = next;
                    page = 0;
                }
            }
            _ if input.starts_with("c ") => {
                let name = input[2..].trim();
                let Some(next) = parse_catalog(name, current.limit) else {
                    output.info(format!("Unknown catalog: {}", name));
                    continue;
                };
                if switch_to(controller, &current, next.clone(), output).await {
                    current = next;
                    page = 0;
                }
            }
            _ if input.starts_with("w ") => {
                let Some(work) = pick(controller, page, &input[2..]) else {
                    output.info("No such item on this page");
                    continue;
                };
                let Some(magnet) = work.best_magnet() else {
                    output.info("Selected title has no magnet");
                    continue;
                };
                match handoff::resolve_player(ctx.config.player.as_deref()).await {
                    Ok(player) => {
                        if let Err(e) = player.launch_and_wait(magnet).await {
                            output.info(format!("Player failed: {}", e));
                        }
                    }
                    Err(e) => output.info(e),
                }
            }
            _ => match pick(controller, page, input) {
                Some(work) => print_details(&work, output),
                None => output.info("No such item on this page"),
            },
        }
    }
}

/// Switch to `next`; on failure reopen `current` so the pager keeps a listing
async fn switch_to(
    controller: &mut PrefetchController,
    current: &CatalogQuery,
    next: CatalogQuery,
    output: &Output,
) -> bool {
    match controller.switch(next).await {
        Ok(_) => true,
        Err(e) => {
            output.info(e);
            if let Err(e) = controller.open(current.clone(), false).await {
                warn!(error = %e, "Could not reopen previous catalog");
            }
            false
        }
    }
}

/// Select item `n` (1-based, page-relative); runs a poll
fn pick(controller: &mut PrefetchController, page: usize, n: &str) -> Option<CanonicalWork> {
    let n: usize = n.trim().parse().ok()?;
    controller.select(page, n.checked_sub(1)?)
}

fn parse_catalog(name: &str, limit: u32) -> Option<CatalogQuery> {
    let (kind, genre) = match name.split_once(' ') {
        Some((kind, genre)) => (kind, Some(genre.trim().to_string())),
        None => (name, None),
    };
    let kind = <CatalogChoice as clap::ValueEnum>::from_str(kind, true).ok()?;
    let cmd = CatalogCmd {
        kind,
        genre,
        page: 1,
        all: false,
        refresh: false,
        limit: Some(limit),
    };
    cmd.query(limit).ok()
}

fn render_page(controller: &mut PrefetchController, query: &CatalogQuery, page: usize, output: &Output) {
    let works = controller.turn_to(page).to_vec();
    let count = controller.total_pages();
    output.line("");
    output.line(page_header(query, Some(page + 1), count));
    for (i, work) in works.iter().enumerate() {
        output.line(format!("{:>4}. {}", i + 1, work));
    }
    if controller.state() == PrefetchState::Exhausted && works.is_empty() {
        output.line("  (no more results)");
    }
}

fn print_details(work: &CanonicalWork, output: &Output) {
    output.line(format!("\n{}", work.display_name()));
    if let Some(poster) = &work.poster {
        output.line(format!("  poster: {}", poster));
    }
    for i in 0..work.len() {
        output.line(format!(
            "  [{}] {:<8} {:<6} {:>8} {:>6} seeds",
            i + 1,
            work.sources[i],
            work.qualities[i],
            work.sizes[i],
            work.seeds[i]
        ));
        output.line(format!("      {}", work.magnets[i]));
    }
}

// =============================================================================
// Play Command
// =============================================================================

pub async fn play_cmd(cmd: PlayCmd, ctx: &Context, output: &Output) -> ExitCode {
    let template = cmd.player.as_deref().or(ctx.config.player.as_deref());

    let player = match handoff::resolve_player(template).await {
        Ok(player) => player,
        Err(e @ HandoffError::EmptyTemplate) => return output.error(e.to_string(), ExitCode::InvalidArgs),
        Err(e) => return output.error(e.to_string(), ExitCode::HandoffFailed),
    };

    output.info(format!("Starting {}...", player.program()));

    let result = if cmd.detach {
        player.launch(&cmd.magnet).await.map(|_| ())
    } else {
        player.launch_and_wait(&cmd.magnet).await.map(|_| ())
    };

    match result {
        Ok(()) => {
            if output.json {
                let _ = output.print(serde_json::json!({ "status": "ok", "player": player.program() }));
            }
            ExitCode::Success
        }
        Err(e @ HandoffError::InvalidMagnet(_)) => output.error(e.to_string(), ExitCode::InvalidArgs),
        Err(e) => output.error(e.to_string(), ExitCode::HandoffFailed),
    }
}

// =============================================================================
// Merge Command
// =============================================================================

pub async fn merge_cmd(cmd: MergeCmd, output: &Output) -> ExitCode {
    let text = match read_input(&cmd).await {
        Ok(text) => text,
        Err(e) => return output.error(format!("{:#}", e), ExitCode::InvalidArgs),
    };

    let works = merge::merge_lines(&text);
    if output.json {
        if let Err(e) = output.print(&works) {
            return output.error(format!("Failed to serialize: {}", e), ExitCode::Error);
        }
    } else {
        for work in &works {
            output.line(work.to_line());
        }
    }
    ExitCode::Success
}

async fn read_input(cmd: &MergeCmd) -> Result<String> {
    match &cmd.file {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display())),
        None => {
            let mut text = String::new();
            tokio::io::stdin()
                .read_to_string(&mut text)
                .await
                .context("Failed to read stdin")?;
            Ok(text)
        }
    }
}

// =============================================================================
// Cache Command
// =============================================================================

pub async fn cache_cmd(cmd: CacheCmd, ctx: &Context, output: &Output) -> ExitCode {
    let cache = match ctx.cache() {
        Ok(cache) => cache,
        Err(e) => return output.error(format!("{:#}", e), ExitCode::Error),
    };

    match cmd.action {
        CacheAction::Status => match cache.status() {
            Ok(stats) => {
                if output.json {
                    let _ = output.print(&stats);
                } else {
                    output.line(format!(
                        "{}: {} entries, {} bytes",
                        stats.dir.display(),
                        stats.entries,
                        stats.bytes
                    ));
                }
                ExitCode::Success
            }
            Err(e) => output.error(e.to_string(), ExitCode::Error),
        },
        CacheAction::Clear => match cache.clear() {
            Ok(removed) => {
                if output.json {
                    let _ = output.print(serde_json::json!({ "removed": removed }));
                } else {
                    output.line(format!("Removed {} cached catalogs", removed));
                }
                ExitCode::Success
            }
            Err(e) => output.error(e.to_string(), ExitCode::Error),
        },
    }
}
