mod catalog;
mod config;
mod db;
mod encode;
mod error;
mod fetch;
mod harvest;
mod invalidate;
mod model;
mod parse;
mod progress;
mod scheduler;
mod session;
mod sync;
#[cfg(test)]
mod testing;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::warn;

use crate::catalog::KnownIdCache;
use crate::config::{
    parse_limit, Downstream, HarvestConfig, HarvestOptions, Limit, Scope, DEFAULT_BASE_URL,
    DEFAULT_BATCH_SIZE, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_DELAY_MS, DEFAULT_MAX_CONNECTIONS,
    DEFAULT_MAX_CONNECTIONS_PER_HOST, DEFAULT_SESSION_REFRESH, DEFAULT_TIMEOUT_SECS,
};
use crate::progress::{format_duration, Progress};
use crate::session::HttpSessionFactory;

#[derive(Parser)]
#[command(name = "movie_harvester", about = "Letterboxd movie data harvester")]
struct Cli {
    /// SQLite database holding the URL queue and movie data
    #[arg(long, global = true, default_value = db::DEFAULT_DB_PATH)]
    db: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape queued movie pages
    Scrape(ScrapeArgs),
    /// Add `movie_id<TAB>url` lines from a file to the URL queue
    Enqueue {
        file: PathBuf,
    },
    /// Show queue and catalog statistics
    Stats,
}

#[derive(clap::Args)]
struct ScrapeArgs {
    /// Scrape the first N queued movies, or "all"
    #[arg(short = 'n', long, value_parser = parse_limit, default_value = "all")]
    num_movies: Limit,

    /// Scrape a single queued movie by URL
    #[arg(short = 'l', long)]
    movie_url: Option<String>,

    /// Write results to the database
    #[arg(short = 'u', long)]
    update_movie_data: bool,

    /// Print every scraped record
    #[arg(short = 'o', long)]
    show_objects: bool,

    /// Clear the backend movie data cache when done
    #[arg(short = 'c', long)]
    clear_movie_data_cache: bool,

    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Batches per HTTP session, all run concurrently
    #[arg(long, default_value_t = DEFAULT_SESSION_REFRESH)]
    session_refresh: usize,

    #[arg(long, default_value_t = DEFAULT_MAX_CONNECTIONS)]
    max_connections: usize,

    #[arg(long, default_value_t = DEFAULT_MAX_CONNECTIONS_PER_HOST)]
    max_connections_per_host: usize,

    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout_secs: u64,

    #[arg(long, default_value_t = DEFAULT_CONNECT_TIMEOUT_SECS)]
    connect_timeout_secs: u64,

    /// Pause before each request, in milliseconds
    #[arg(long, default_value_t = DEFAULT_DELAY_MS)]
    delay_ms: u64,

    #[arg(long, default_value = DEFAULT_BASE_URL)]
    base_url: String,

    #[arg(long, env = "BACKEND_URL", hide_env_values = true)]
    backend_url: Option<String>,

    #[arg(long, env = "ADMIN_SECRET_KEY", hide_env_values = true)]
    admin_secret_key: Option<String>,
}

impl ScrapeArgs {
    fn config(&self) -> HarvestConfig {
        HarvestConfig {
            base_url: self.base_url.clone(),
            batch_size: self.batch_size,
            session_refresh: self.session_refresh,
            max_connections: self.max_connections,
            max_connections_per_host: self.max_connections_per_host,
            request_timeout: Duration::from_secs(self.timeout_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            request_delay: Duration::from_millis(self.delay_ms),
        }
    }

    fn options(&self) -> HarvestOptions {
        let scope = match (&self.movie_url, self.num_movies) {
            (Some(url), _) => Scope::Single(url.clone()),
            (None, Limit::All) => Scope::All,
            (None, Limit::First(n)) => Scope::First(n),
        };

        let invalidate = if self.clear_movie_data_cache {
            match (&self.backend_url, &self.admin_secret_key) {
                (Some(backend_url), Some(admin_secret)) => Some(Downstream {
                    backend_url: backend_url.clone(),
                    admin_secret: admin_secret.clone(),
                }),
                _ => {
                    warn!("BACKEND_URL or ADMIN_SECRET_KEY not set, cache will not be cleared");
                    None
                }
            }
        } else {
            None
        };

        HarvestOptions {
            scope,
            persist: self.update_movie_data,
            show_objects: self.show_objects,
            invalidate,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Scrape(args) => scrape(&cli.db, &args).await,
        Commands::Enqueue { file } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let entries = parse_queue_lines(&text);
            let store = db::SqliteStore::open(&cli.db)?;
            let inserted = db::insert_movie_urls(store.conn(), &entries)?;
            println!(
                "Queued {} new movie URLs ({} lines read)",
                inserted,
                entries.len()
            );
            Ok(())
        }
        Commands::Stats => {
            let store = db::SqliteStore::open(&cli.db)?;
            let s = db::get_stats(store.conn())?;
            println!("Queued:     {}", s.queued);
            println!("Pending:    {}", s.pending);
            println!("Deprecated: {}", s.deprecated);
            println!("Catalog:    {}", s.catalog);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

async fn scrape(db_path: &Path, args: &ScrapeArgs) -> anyhow::Result<()> {
    let store = db::SqliteStore::open(db_path)?;
    let config = args.config();
    let options = args.options();
    let factory = HttpSessionFactory::new(config.clone());
    let cache = KnownIdCache::new();
    let progress = Progress::new();

    let report = harvest::run(&store, &cache, &factory, &config, &options, &progress).await?;

    if options.persist && report.attempted > 0 {
        match db::queue_size(store.conn()) {
            Ok(remaining) => println!("📋 URLs remaining in queue: {remaining}"),
            Err(e) => warn!("Could not count remaining URLs: {:#}", e),
        }
    }
    Ok(())
}

/// `movie_id<TAB>url` rows. Blank lines, `#` comments and lines without a tab are skipped.
fn parse_queue_lines(text: &str) -> Vec<(String, String)> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let (id, url) = line.split_once('\t')?;
            let (id, url) = (id.trim(), url.trim());
            (!id.is_empty() && !url.is_empty()).then(|| (id.to_string(), url.to_string()))
        })
        .collect()
}
