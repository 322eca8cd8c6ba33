use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;
use std::time::Duration;

use feed_collector::config::{load_feed_list, Config};
use feed_collector::eventlog::{EventLog, LogStore};
use feed_collector::pipeline::Collector;
use feed_collector::storage::Database;

#[derive(Parser, Debug)]
#[command(
    name = "feed-collector",
    about = "Periodically fetch RSS/Atom feeds and store new articles in SQLite"
)]
struct Args {
    /// Configuration file (TOML). Missing file = defaults.
    #[arg(long, value_name = "FILE", default_value = "config.toml")]
    config: PathBuf,

    /// Feed list (JSON array of URLs), overrides `feeds_file`
    #[arg(long, value_name = "FILE")]
    feeds: Option<PathBuf>,

    /// SQLite database, overrides `database_path`
    #[arg(long, value_name = "FILE")]
    database: Option<PathBuf>,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,

    /// Seconds between cycles, overrides `interval_secs`
    #[arg(long, value_name = "SECS")]
    interval_secs: Option<u64>,

    /// Print row counts of the feeds, articles and logs tables, then exit
    #[arg(long)]
    status: bool,
}

impl Args {
    fn apply(&self, config: &mut Config) {
        if let Some(feeds) = &self.feeds {
            config.feeds_file = feeds.clone();
        }
        if let Some(database) = &self.database {
            config.database_path = database.clone();
        }
        if let Some(secs) = self.interval_secs {
            config.interval_secs = secs;
        }
    }
}

/// Diagnostic output goes to stderr, or is appended to `log_file`.
fn init_tracing(log_file: Option<&Path>) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).with_context(|| {
                        format!("Failed to create log directory '{}'", parent.display())
                    })?;
                }
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file '{}'", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // The subscriber depends on `log_file`, so load diagnostics are held
    // until it is installed
    let loaded = Config::load_checked(&args.config)
        .with_context(|| format!("Failed to load config '{}'", args.config.display()))?;
    let mut config = loaded.config.clone();
    args.apply(&mut config);

    init_tracing(config.log_file.as_deref())?;
    loaded.log(&args.config);
    tracing::debug!(?config, "Effective configuration");

    let db_path = config.database_path.to_string_lossy().into_owned();
    let db = Database::open(&db_path)
        .await
        .with_context(|| format!("Failed to open database '{}'", db_path))?;
    let store = LogStore::open(&db_path)
        .await
        .with_context(|| format!("Failed to open log store '{}'", db_path))?;
    let events = EventLog::spawn(store);

    if args.status {
        let counts = db.table_counts().await;
        events.shutdown().await;
        let counts = counts?;
        println!("Database: {}", db_path);
        println!("  feeds:    {}", counts.feeds);
        println!("  articles: {}", counts.articles);
        println!("  logs:     {}", counts.logs);
        return Ok(ExitCode::SUCCESS);
    }

    let collector = match Collector::new(db, events.clone(), &config) {
        Ok(collector) => collector,
        Err(e) => {
            events.error(format!("Configuration error: {:#}", e));
            events.shutdown().await;
            return Err(e);
        }
    };

    let outcome = run(&collector, &events, &config, args.once).await;

    events.info("RSS collection service stopped.");
    events.shutdown().await;

    match outcome {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Cycle until Ctrl-C (or once). The feed list is re-read every cycle so
/// edits take effect without a restart.
async fn run(collector: &Collector, events: &EventLog, config: &Config, once: bool) -> Result<()> {
    let interval = Duration::from_secs(config.interval_secs);

    loop {
        let urls = match load_feed_list(&config.feeds_file) {
            Ok(urls) => urls,
            Err(e) => {
                events.error(format!("Configuration error: {}", e));
                return Err(e.into());
            }
        };

        tokio::select! {
            report = collector.run_cycle(&urls) => {
                tracing::info!(
                    feeds = report.feeds,
                    new_articles = report.new_articles,
                    duplicates = report.duplicates,
                    "Fetch cycle finished"
                );
            }
            _ = tokio::signal::ctrl_c() => {
                // Dropping the cycle rolls back its open transaction
                tracing::info!("Interrupted during fetch cycle");
                return Ok(());
            }
        }

        if once {
            return Ok(());
        }

        events.info("Waiting for the next fetch...");
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted while waiting");
                return Ok(());
            }
        }
    }
}
