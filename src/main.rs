//! Whateley-Fetch main entry point
//!
//! This is the command-line interface for crawling, inspecting, and searching
//! the local story cache.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use url::Url;
use whateley_fetch::config::{compute_file_hash, load_config_or_default, validate, Config, Overrides};
use whateley_fetch::crawler::{
    crawl, print_catalog, print_publication_order, print_word_counts, Catalog, PublicationOrder,
    SiteAccess, WordCount,
};
use whateley_fetch::output::{load_statistics, print_statistics, print_summary};
use whateley_fetch::page::{parse_selector, STORY_BODY_SELECTOR};
use whateley_fetch::rules::RuleError;
use whateley_fetch::storage::open_cache;
use whateley_fetch::{ConfigError, RuleEngine, RuleTable};

/// Whateley-Fetch: cached acquisition and cleanup of story pages
///
/// Crawls the numbered story pages of the site into a local SQLite cache,
/// strips them down to their story content, and prepares them for ebook
/// packaging with a per-story rule file.
#[derive(Parser, Debug)]
#[command(name = "whateley-fetch")]
#[command(version)]
#[command(about = "Cached acquisition and cleanup of story pages", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Never touch the network; serve everything from the cache
    #[arg(long, global = true)]
    offline: bool,

    /// Number of concurrent fetch workers
    #[arg(long, value_name = "N", global = true)]
    max_requests: Option<usize>,

    /// Path to the YAML rule file
    #[arg(long, value_name = "FILE", global = true)]
    rules: Option<String>,

    /// Path to the cache database
    #[arg(long, value_name = "FILE", global = true)]
    cache: Option<String>,

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
    /// Crawl every story id in the configured range
    Crawl {
        /// Report printed from the collected stories
        #[arg(long, value_enum, default_value_t = Report::Pubdate)]
        report: Report,
    },

    /// Fetch one story and write it before and after the ebook pass
    Story {
        /// Numeric story id
        id: u64,
    },

    /// Search cached stories for literal text
    Search {
        /// Text to find
        text: String,

        /// Characters of context after each match
        #[arg(short = 'A', value_name = "N", default_value_t = 15)]
        after: usize,

        /// Characters of context before each match
        #[arg(short = 'B', value_name = "N", default_value_t = 15)]
        before: usize,

        /// Characters of context on both sides; overrides -A and -B
        #[arg(short = 'C', value_name = "N")]
        context: Option<usize>,
    },

    /// Write the rule file as JSON
    ExportRules {
        #[arg(short, long, value_name = "FILE", default_value = "typos.json")]
        output: PathBuf,
    },

    /// Fetch an image or stylesheet from the site
    Asset {
        url: String,

        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
    },

    /// Show statistics from the cache and exit
    Stats,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Report {
    /// Canonical URLs by publish date
    Pubdate,
    /// Stories by word count, with a total
    Wordcount,
    /// Unique authors, categories, and tags
    Catalog,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    let config = match load_configuration(&cli) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{:#}", e);
            return ExitCode::from(1);
        }
    };

    match run(cli.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            if is_usage_error(&e) {
                ExitCode::from(1)
            } else {
                ExitCode::from(2)
            }
        }
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("whateley_fetch=info,warn"),
            1 => EnvFilter::new("whateley_fetch=debug,info"),
            2 => EnvFilter::new("whateley_fetch=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Loads the config file (or defaults) and applies command-line overrides
fn load_configuration(cli: &Cli) -> Result<Config> {
    if let Some(path) = &cli.config {
        tracing::info!("Loading configuration from: {}", path.display());
        let hash = compute_file_hash(path)
            .with_context(|| format!("could not read {}", path.display()))?;
        tracing::info!("Configuration loaded (hash: {})", hash);
    }
    let mut config = load_config_or_default(cli.config.as_deref())?;

    config.apply_overrides(&Overrides {
        offline: cli.offline,
        max_requests: cli.max_requests,
        rules_path: cli.rules.clone(),
        database_path: cli.cache.clone(),
    });
    validate(&config)?;

    if config.cache.offline {
        tracing::info!("Offline mode: only cached content is served");
    }
    Ok(config)
}

/// Errors the operator fixes by changing arguments or files
fn is_usage_error(e: &anyhow::Error) -> bool {
    e.downcast_ref::<ConfigError>().is_some()
        || matches!(e.downcast_ref::<RuleError>(), Some(RuleError::Io { .. }))
}

async fn run(command: Command, config: Config) -> Result<()> {
    match command {
        Command::Crawl { report } => handle_crawl(&config, report).await,
        Command::Story { id } => handle_story(&config, id).await,
        Command::Search {
            text,
            after,
            before,
            context,
        } => {
            let (before, after) = context.map_or((before, after), |c| (c, c));
            handle_search(&config, &text, before, after).await
        }
        Command::ExportRules { output } => handle_export_rules(&config, &output),
        Command::Asset { url, output } => handle_asset(&config, &url, &output).await,
        Command::Stats => handle_stats(&config),
    }
}

/// Handles the crawl command: runs the pipeline and prints the report
async fn handle_crawl(config: &Config, report: Report) -> Result<()> {
    tracing::info!(
        "Crawling ids {}..{} from {}",
        config.crawl.first_id,
        config.crawl.last_id,
        config.client.base_url
    );

    let summary = match report {
        Report::Pubdate => {
            let base = Url::parse(&config.client.base_url)?;
            let outcome = crawl(config, PublicationOrder::new(base))
                .await
                .context("crawl failed")?;
            print_publication_order(&outcome.records);
            outcome.summary
        }
        Report::Wordcount => {
            let outcome = crawl(config, WordCount).await.context("crawl failed")?;
            print_word_counts(&outcome.records);
            outcome.summary
        }
        Report::Catalog => {
            let outcome = crawl(config, Catalog).await.context("crawl failed")?;
            print_catalog(&Catalog::merge_states(outcome.worker_states));
            outcome.summary
        }
    };

    println!();
    print_summary(&summary);
    Ok(())
}

/// Handles the story command: writes the page before and after the ebook pass
async fn handle_story(config: &Config, id: u64) -> Result<()> {
    let engine = RuleEngine::from_config(&config.rules)
        .with_context(|| format!("could not load rules from {}", config.rules.path))?;
    let access = SiteAccess::new(config)?;

    let page = access.get_story_by_id(id).await?;
    let base = Url::parse(&config.client.base_url)?;
    println!("{}", page.identity().request_url(&base)?);
    println!("{}", page.publish_date()?.to_rfc3339());

    let fixed = engine.fix_for_ebook(&page)?;
    let body = parse_selector(STORY_BODY_SELECTOR)?;
    let after = fixed
        .select_first(&body)
        .map(|node| fixed.inner_html(node))
        .unwrap_or_default();

    write_file(&format!("{}-before.html", id), page.body_html().as_bytes())?;
    write_file(&format!("{}-after.html", id), after.as_bytes())?;
    write_file(&format!("{}-full.html", id), page.html().as_bytes())?;
    Ok(())
}

/// Handles the search command: prints each match with its context
async fn handle_search(config: &Config, text: &str, before: usize, after: usize) -> Result<()> {
    let access = SiteAccess::new(config)?;
    let hits = access.search_with_context(text, before, after).await?;

    for hit in &hits {
        println!("{:3}: {}", hit.id, hit.snippet.replace('\n', " "));
    }
    tracing::info!("{} matches", hits.len());
    Ok(())
}

/// Handles the export-rules command
fn handle_export_rules(config: &Config, output: &Path) -> Result<()> {
    let table = RuleTable::load(Path::new(&config.rules.path))?;
    write_file(output, table.to_json()?.as_bytes())?;
    println!("✓ Rules exported to: {}", output.display());
    Ok(())
}

/// Handles the asset command
async fn handle_asset(config: &Config, url: &str, output: &Path) -> Result<()> {
    let url = Url::parse(url).with_context(|| format!("bad asset URL {}", url))?;
    let access = SiteAccess::new(config)?;
    let asset = access.get_asset(&url).await?;

    write_file(output, &asset.body)?;
    println!(
        "{} ({} bytes, {})",
        output.display(),
        asset.body.len(),
        asset.content_type.as_deref().unwrap_or("unknown type")
    );
    Ok(())
}

/// Handles the stats command: shows statistics from the cache
fn handle_stats(config: &Config) -> Result<()> {
    println!("Cache: {}\n", config.cache.database_path);

    let cache = open_cache(&config.cache)?;
    let stats = load_statistics(&cache)?;
    print_statistics(&stats);
    Ok(())
}

fn write_file(path: impl AsRef<Path>, contents: &[u8]) -> Result<()> {
    let path = path.as_ref();
    std::fs::write(path, contents).with_context(|| format!("could not write {}", path.display()))
}
