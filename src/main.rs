//! Release Harvester main entry point
//!
//! This is the command-line interface for the release catalog crawler.

use anyhow::Context;
use clap::Parser;
use release_harvester::config::{load_config_with_hash, Config};
use release_harvester::output::{load_statistics, print_statistics, write_export};
use release_harvester::storage::{open_storage, Storage};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Release Harvester: a resilient catalog crawler
///
/// Release Harvester walks a paginated release catalog in a browser, visits
/// every release page one at a time and stores a structured record of each
/// release and its tracks. Interrupted crawls resume where they stopped.
#[derive(Parser, Debug)]
#[command(name = "release-harvester")]
#[command(version)]
#[command(about = "A resilient release catalog crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Resume an interrupted crawl (default behavior)
    #[arg(long, conflicts_with = "fresh")]
    resume: bool,

    /// Start a fresh crawl, discarding previous state
    #[arg(long, conflicts_with = "resume")]
    fresh: bool,

    /// Validate config and show what would be crawled without crawling
    #[arg(long, conflicts_with_all = ["stats", "export", "reset"])]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "export", "reset"])]
    stats: bool,

    /// Export stored collections as JSON and exit (defaults to the configured export path)
    #[arg(long, value_name = "PATH", num_args = 0..=1, conflicts_with_all = ["dry_run", "stats", "reset"])]
    export: Option<Option<PathBuf>>,

    /// Clear all stored crawl state and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats", "export"])]
    reset: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config)
    } else if cli.stats {
        handle_stats(&config)
    } else if let Some(path) = cli.export {
        let path = path.unwrap_or_else(|| PathBuf::from(&config.output.export_path));
        handle_export(&config, &path)
    } else if cli.reset {
        handle_reset(&config)
    } else {
        handle_crawl(config, config_hash, cli.fresh).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("release_harvester=info,warn"),
            1 => EnvFilter::new("release_harvester=debug,info"),
            2 => EnvFilter::new("release_harvester=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    println!("=== Release Harvester Dry Run ===\n");

    println!("Catalog:");
    println!("  Listing URL: {}", config.catalog.listing_url);

    let pacing = &config.crawler;
    println!("\nCrawler Configuration:");
    println!("  Watchdog timeout: {}ms", pacing.watchdog_timeout);
    println!("  Item settle: {}ms", pacing.item_settle);
    println!(
        "  Extraction attempts: {} ({}ms apart)",
        pacing.max_extract_attempts, pacing.extract_retry_delay
    );
    println!("  Close grace: {}ms", pacing.close_grace);
    println!("  Next item delay: {}ms", pacing.next_item_delay);

    println!("\nBrowser:");
    match &config.browser.debugger_url {
        Some(url) => println!("  Attach to: {}", url),
        None => println!("  Launch (headless: {})", config.browser.headless),
    }
    if let Some(dir) = &config.browser.user_data_dir {
        println!("  Profile: {}", dir);
    }

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);
    println!("  Covers: {}", config.output.covers_dir);
    println!("  Export: {}", config.output.export_path);

    let selectors = &config.selectors;
    println!("\nSelector Strategies:");
    println!("  List view tab: {}", selectors.list_view_tab.len());
    println!("  Cover art: {}", selectors.cover_art.len());
    println!("  Track name: {}", selectors.track_name.len());

    println!("\n✓ Configuration is valid");

    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let storage = open_storage(Path::new(&config.output.database_path))
        .context("Failed to open database")?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --export mode: writes stored collections as JSON
fn handle_export(config: &Config, path: &Path) -> anyhow::Result<()> {
    println!("=== Exporting Collections ===\n");
    println!("Database: {}", config.output.database_path);
    println!("Output: {}", path.display());
    println!();

    let storage = open_storage(Path::new(&config.output.database_path))
        .context("Failed to open database")?;
    let document = write_export(&storage, path)
        .with_context(|| format!("Failed to export to {}", path.display()))?;

    println!(
        "✓ Exported {} collections ({} tracks) to: {}",
        document.total_collections,
        document.total_tracks,
        path.display()
    );

    Ok(())
}

/// Handles the --reset mode: clears the stored crawl state
fn handle_reset(config: &Config) -> anyhow::Result<()> {
    let mut storage = open_storage(Path::new(&config.output.database_path))
        .context("Failed to open database")?;
    storage.clear().context("Failed to clear crawl state")?;

    println!("✓ Crawl state cleared: {}", config.output.database_path);

    Ok(())
}

/// Handles the main crawl operation
#[cfg(feature = "chrome")]
async fn handle_crawl(config: Config, config_hash: String, fresh: bool) -> anyhow::Result<()> {
    use release_harvester::crawler::{CoverDownloader, Orchestrator};
    use release_harvester::page::ChromeDriver;
    use release_harvester::storage::load_crawl_state;

    let storage = open_storage(Path::new(&config.output.database_path))
        .context("Failed to open database")?;

    let previous = load_crawl_state(&storage)?;
    let resumable = !fresh && !previous.links().is_empty() && !previous.is_complete();

    let driver = ChromeDriver::launch(&config.browser)
        .await
        .context("Failed to start browser")?;
    let covers = CoverDownloader::new(config.output.covers_dir.as_str())?;

    let mut orchestrator = Orchestrator::new(driver, storage, &config)?
        .with_cover_downloader(covers)
        .with_config_hash(config_hash);

    if resumable {
        tracing::info!("Resuming interrupted crawl");
        orchestrator.resume()?;
    } else {
        if fresh {
            tracing::info!("Starting fresh crawl (discarding previous state)");
        }
        let count = orchestrator
            .start(&config.catalog.listing_url)
            .await
            .context("Link discovery failed")?;
        if count == 0 {
            tracing::warn!("No item links found on the listing page");
        }
    }

    let summary = tokio::select! {
        result = orchestrator.run() => result.context("Crawl halted; rerun to resume")?,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted; progress is saved and the crawl can be resumed");
            orchestrator.summary(true)
        }
    };
    orchestrator.finish_downloads().await;

    tracing::info!(
        "Crawl {}: {} of {} items visited, {} collections ({} tracks) stored",
        if summary.complete { "complete" } else { "stopped" },
        summary.visited,
        summary.links,
        summary.stored,
        summary.tracks
    );
    let counters = summary.counters;
    tracing::info!(
        "Duplicates: {}, failed: {}, timed out: {}, could not open: {}",
        counters.duplicates,
        counters.failed,
        counters.timed_out,
        counters.open_failures
    );

    if summary.complete {
        write_export(orchestrator.storage(), Path::new(&config.output.export_path))?;
    }

    Ok(())
}

#[cfg(not(feature = "chrome"))]
async fn handle_crawl(_config: Config, _config_hash: String, _fresh: bool) -> anyhow::Result<()> {
    anyhow::bail!("This build has no browser backend; rebuild with the `chrome` feature")
}
