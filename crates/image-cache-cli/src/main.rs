//! Image cache CLI
//!
//! Resolves image URLs into the local cache and inspects or prunes it.

mod cli;
mod error;

use std::sync::Arc;

use clap::Parser;
use image_file_cache::{
    CacheConfig, CacheManager, ConsumerId, HttpFetcher, LockTable, UrlValidator,
};
use tracing::{error, info};
use tracing_subscriber::{prelude::*, EnvFilter};

use crate::cli::{Cli, Command};
use crate::error::{CliError, Result};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;

    let cli = Cli::parse();
    let config = CacheConfig::from_env();
    info!(
        cache_dir = ?config.namespace_path(),
        budget_mb = config.prune_trigger_limit / (1024 * 1024),
        "Loaded cache configuration"
    );

    match cli.command {
        Command::Filename { url } => {
            println!("{}", image_file_cache::derive_filename(&url));
            Ok(())
        }
        Command::Resolve { permanent, urls } => resolve(&config, permanent, &urls).await,
        Command::Prune => {
            let cache = open_cache(&config).await?;
            let report = cache.prune().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::Stats => {
            let cache = open_cache(&config).await?;
            let stats = cache.stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }
    }
}

fn init_logging() -> Result<()> {
    let env_filter =
        EnvFilter::from_default_env().add_directive("image_file_cache=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .try_init()
            .map_err(|e| CliError::Logging(e.to_string()))?;
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|e| CliError::Logging(e.to_string()))?;
    }

    Ok(())
}

async fn open_cache(config: &CacheConfig) -> Result<CacheManager> {
    let fetcher = HttpFetcher::new().map_err(image_file_cache::CacheError::from)?;
    let cache = CacheManager::new(config, Arc::new(LockTable::new()), Arc::new(fetcher))?;
    cache.init().await?;
    Ok(cache)
}

async fn resolve(config: &CacheConfig, permanent: bool, urls: &[String]) -> Result<()> {
    let validator = UrlValidator::from_config(config);
    let cache = open_cache(config).await?;
    let consumer = ConsumerId::generate();

    let mut failed = 0;
    for url in urls {
        let result = match validator.validate(url) {
            Ok(_) => cache.resolve(url, permanent, &consumer).await,
            Err(e) => Err(e),
        };
        cache.end_interest(url, &consumer);

        match result {
            Ok(path) => println!("{}\t{}", url, path.display()),
            Err(e) => {
                error!(url = %url, error = %e, "Failed to resolve image");
                failed += 1;
            }
        }
    }

    if failed > 0 {
        return Err(CliError::ResolveFailed {
            failed,
            total: urls.len(),
        });
    }
    Ok(())
}
