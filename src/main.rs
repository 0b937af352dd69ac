//! Listing-Funnel main entry point
//!
//! This is the command-line interface for the Listing-Funnel product listing fetcher.

use anyhow::Context;
use clap::Parser;
use listing_funnel::cache::{open_cache, CacheStore, MemoryCache};
use listing_funnel::config::{load_config_with_hash, Config};
use listing_funnel::output::{print_cache_stats, print_report};
use listing_funnel::BatchCoordinator;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Listing-Funnel: a resilient product listing fetcher
///
/// Listing-Funnel fetches search result pages from e-commerce sites through
/// an ordered funnel of strategies (cache, API, desktop and mobile HTTP,
/// headless browser), validates what comes back, and reports the
/// deduplicated listings.
#[derive(Parser, Debug)]
#[command(name = "listing-funnel")]
#[command(version)]
#[command(about = "A resilient product listing fetcher", long_about = None)]
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

    /// Validate config and show the targets without fetching anything
    #[arg(long, conflicts_with_all = ["cache_stats", "purge_cache", "clear_cache"])]
    dry_run: bool,

    /// Show cache statistics and exit
    #[arg(long, conflicts_with_all = ["dry_run", "purge_cache", "clear_cache"])]
    cache_stats: bool,

    /// Delete expired cache entries and exit
    #[arg(long, conflicts_with_all = ["dry_run", "cache_stats", "clear_cache"])]
    purge_cache: bool,

    /// Delete every cache entry and exit
    #[arg(long, conflicts_with_all = ["dry_run", "cache_stats", "purge_cache"])]
    clear_cache: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let config = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            cfg
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e).context("invalid configuration");
        }
    };

    if cli.dry_run {
        handle_dry_run(&config);
        return Ok(());
    }

    let cache = open_configured_cache(&config)?;

    if cli.cache_stats {
        print_cache_stats(&cache_location(&config), &cache.stats()?);
    } else if cli.purge_cache {
        let removed = cache.purge_expired()?;
        println!("Removed {} expired cache entries", removed);
    } else if cli.clear_cache {
        let removed = cache.clear()?;
        println!("Removed {} cache entries", removed);
    } else {
        handle_batch(&config, cache).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("listing_funnel=info,warn"),
            1 => EnvFilter::new("listing_funnel=debug,info"),
            2 => EnvFilter::new("listing_funnel=trace,debug"),
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

/// Opens the SQLite cache, or an in-memory one when persistence is off
fn open_configured_cache(config: &Config) -> anyhow::Result<Arc<dyn CacheStore>> {
    if !config.cache.persist {
        tracing::info!("Cache persistence disabled, using in-memory cache");
        return Ok(Arc::new(MemoryCache::new()));
    }

    let path = config.cache.path();
    let cache = open_cache(&path)
        .with_context(|| format!("failed to open cache at {}", path.display()))?;
    tracing::info!("Cache opened at {}", path.display());
    Ok(Arc::new(cache))
}

fn cache_location(config: &Config) -> String {
    if config.cache.persist {
        config.cache.path.clone()
    } else {
        "(in memory)".to_string()
    }
}

/// Handles the --dry-run mode: validates config and shows what would be fetched
fn handle_dry_run(config: &Config) {
    println!("=== Listing-Funnel Dry Run ===\n");

    println!("Funnel:");
    println!(
        "  Max concurrent targets: {}",
        config.funnel.max_concurrent_targets
    );
    println!("  Challenge limit: {}", config.funnel.challenge_limit);
    println!(
        "  Stop after empty first page: {}",
        config.funnel.stop_after_empty_first_page
    );

    println!("\nRetry:");
    println!("  Max attempts: {}", config.retry.max_attempts);
    for (strategy, attempts) in &config.retry.per_strategy {
        println!("    {}: {}", strategy, attempts);
    }
    println!(
        "  Backoff: {}ms base, {}ms max, ±{}ms jitter",
        config.retry.base_delay_ms, config.retry.max_delay_ms, config.retry.jitter_ms
    );

    println!("\nCache:");
    println!("  Location: {}", cache_location(config));
    println!("  TTL: {}s", config.cache.ttl_secs);

    println!("\nBrowser:");
    if cfg!(feature = "browser") {
        println!("  Enabled: {}", config.browser.enabled);
    } else {
        println!("  Unavailable (built without the `browser` feature)");
    }

    if let Some(dir) = &config.debug.save_pages_dir {
        println!("\nDebug:");
        println!("  Unusable pages saved to: {}", dir.display());
    }

    let targets = config.targets();
    println!("\nTargets ({}):", targets.len());
    for target in &targets {
        println!("  - {}", target);
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the main batch run
async fn handle_batch(config: &Config, cache: Arc<dyn CacheStore>) -> anyhow::Result<()> {
    let targets = config.targets();
    tracing::info!(
        "Searches: {}, targets: {}",
        config.search.len(),
        targets.len()
    );

    let coordinator = BatchCoordinator::from_config(config, cache)
        .context("failed to set up the funnel")?;

    let token = coordinator.cancellation_token();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::warn!("Interrupt received, cancelling remaining targets");
                token.cancel();
            }
            Err(e) => tracing::error!("Unable to listen for interrupt signal: {}", e),
        }
    });

    let report = coordinator.run(targets).await;
    print_report(&report);

    Ok(())
}
