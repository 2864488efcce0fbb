//! Forum-Harvest main entry point
//!
//! This is the command-line interface for the forum harvester: the crawl
//! (producer) side, the persist (consumer) side, and a few inspection modes.

use anyhow::Context;
use clap::{Parser, Subcommand};
use forum_harvest::config::{load_config_with_hash, validate_forum, Config};
use forum_harvest::crawler::{crawl_into, discover_forums, resolve_pages, PageMarker, Session};
use forum_harvest::queue::{run_persister, MemoryPublisher};
use forum_harvest::storage::open_sink;
use forum_harvest::CrawlStats;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Forum-Harvest: an authenticated vBulletin forum harvester
///
/// The crawl side logs in, walks every forum, thread and page, and publishes
/// the posts to an AMQP queue. The persist side consumes that queue into a
/// SQLite database.
#[derive(Parser, Debug)]
#[command(name = "forum-harvest")]
#[command(version = "1.0.0")]
#[command(about = "An authenticated vBulletin forum harvester", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log in, crawl the whole forum and publish the posts
    Crawl {
        /// Keep envelopes in memory instead of publishing them
        #[arg(long)]
        dry_run: bool,
    },

    /// Log in and list the discovered forums with their page counts
    Discover,

    /// Consume the queue into the database until the broker link fails
    Persist,

    /// Validate the configuration and print it with secrets redacted
    Check,

    /// Show statistics from the post database
    Stats {
        /// Number of authors to list
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    match cli.command {
        Command::Crawl { dry_run } => handle_crawl(&config, dry_run).await,
        Command::Discover => handle_discover(&config).await,
        Command::Persist => handle_persist(&config).await,
        Command::Check => handle_check(&config),
        Command::Stats { top } => handle_stats(&config, top),
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("forum_harvest=info,warn"),
            1 => EnvFilter::new("forum_harvest=debug,info"),
            2 => EnvFilter::new("forum_harvest=trace,debug"),
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

/// Handles the crawl operation, publishing to the broker unless `dry_run`
async fn handle_crawl(config: &Config, dry_run: bool) -> anyhow::Result<()> {
    tracing::info!("Crawling {}", config.forum.base_url);

    let stats = if dry_run {
        let publisher = MemoryPublisher::new();
        let stats = crawl_into(config, &publisher).await.context("Crawl failed")?;
        tracing::info!(
            "Dry run kept {} envelopes in memory",
            publisher.publish_count()
        );
        stats
    } else {
        forum_harvest::crawler::run_crawl(config)
            .await
            .context("Crawl failed")?
    };

    print_crawl_stats(&stats);
    Ok(())
}

fn print_crawl_stats(stats: &CrawlStats) {
    println!("=== Crawl Summary ===\n");
    println!("  Forums:              {}", stats.forums);
    println!("  Listing pages:       {}", stats.listing_pages);
    println!("  Listings skipped:    {}", stats.listings_skipped);
    println!("  Threads:             {}", stats.threads);
    println!("  Thread pages:        {}", stats.thread_pages);
    println!("  Posts:               {}", stats.posts);
    println!("  Envelopes published: {}", stats.envelopes_published);
    println!("  Publish failures:    {}", stats.publish_failures);
}

/// Handles the discover mode: lists forums and their listing page counts
async fn handle_discover(config: &Config) -> anyhow::Result<()> {
    let marker = PageMarker::new(&config.forum.page_marker)
        .context("Invalid page marker")?
        .with_max_pages(config.forum.max_pages);
    let session = Session::authenticate(&config.forum)
        .await
        .context("Login failed")?;
    let root = session.base_url().clone();

    let forums = discover_forums(&session, &root).await;

    println!("=== Forums under {} ({}) ===\n", root, forums.len());
    for forum in &forums {
        let pages = resolve_pages(&session, forum, &marker).await;
        println!("  {} ({} pages)", forum, pages.len());
    }

    Ok(())
}

/// Handles the persist mode: runs the consumer until it terminates
async fn handle_persist(config: &Config) -> anyhow::Result<()> {
    let path = Path::new(&config.storage.database_path);
    let sink = open_sink(path).with_context(|| format!("Failed to open {}", path.display()))?;

    tracing::info!(
        "Persisting queue {} into {}",
        config.broker.queue,
        path.display()
    );

    match run_persister(&config.broker, sink).await {
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("forum-harvest: {}", e);
            std::process::exit(1);
        }
        Ok(never) => match never {},
    }
}

/// Handles the check mode: validates config and shows what would be used
fn handle_check(config: &Config) -> anyhow::Result<()> {
    println!("=== Forum-Harvest Configuration ===\n");
    println!("{:#?}", config.forum);
    println!("{:#?}", config.broker);
    println!("{:#?}", config.storage);

    println!("\n✓ Configuration is valid");
    match validate_forum(&config.forum) {
        Ok(()) => println!("✓ Forum settings are valid for crawl and discover"),
        Err(e) => println!("✗ Forum settings cannot be used to crawl: {}", e),
    }
    println!("✓ Dead letters go to {}", config.broker.dead_letter_queue());
    Ok(())
}

/// Handles the stats mode: shows statistics from the database
fn handle_stats(config: &Config, top: usize) -> anyhow::Result<()> {
    let path = Path::new(&config.storage.database_path);
    println!("Database: {}\n", path.display());

    let sink = open_sink(path).with_context(|| format!("Failed to open {}", path.display()))?;

    println!("Total posts: {}", sink.count_posts()?);
    println!("\nTop authors:");
    for (username, count) in sink.count_by_author(top)? {
        println!("  {:>6}  {}", count, username);
    }

    Ok(())
}
