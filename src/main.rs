//! assetfeed - JSON endpoint for normalized asset datasets and transaction feeds
//!
//! Serves CSV datasets and monthly RSS transaction feeds from a data
//! directory, with a partitioned response cache and an ID-token access gate.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use assetfeed::auth::{AccessGate, GoogleTokenInfo};
use assetfeed::cache::PartitionedCache;
use assetfeed::cli::{CacheBackend, Cli, Command, StartupConfig};
use assetfeed::refresh::RefreshHandle;
use assetfeed::service::{Action, Service};
use assetfeed::source::{DataSource, FolderSource};

/// Timeout for the tokeninfo verification call
const VERIFY_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match StartupConfig::from_cli(&cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error: {}", err);
            std::process::exit(1);
        }
    };

    let store = config.cache_store()?;
    let cache = Arc::new(PartitionedCache::new(store));
    let source: Arc<dyn DataSource> = Arc::new(FolderSource::new(config.data_dir.clone()));

    let http = reqwest::Client::builder().timeout(VERIFY_TIMEOUT).build()?;
    let gate = AccessGate::new(
        config.client_id.clone(),
        config.allowed_emails.clone(),
        Arc::new(GoogleTokenInfo::new(http)),
    );
    let service = Service::new(source.clone(), cache.clone(), gate, config.debug);

    match config.command {
        Command::PreCache => pre_cache(&config, &service),
        Command::Serve => serve(&config, service, cache, source).await,
    }
}

/// Runs one rebuild and prints `{status, cachedKeys}`
fn pre_cache(config: &StartupConfig, service: &Service) -> Result<(), Box<dyn std::error::Error>> {
    if config.cache != CacheBackend::File {
        warn!("pre-cache without the file cache is discarded when the process exits");
    }

    let response = service.respond(&Action::PreCacheAll);
    println!("{}", serde_json::to_string_pretty(&response.body)?);

    if response.status != 200 {
        std::process::exit(1);
    }
    Ok(())
}

async fn serve(
    config: &StartupConfig,
    service: Service,
    cache: Arc<PartitionedCache>,
    source: Arc<dyn DataSource>,
) -> Result<(), Box<dyn std::error::Error>> {
    if config.debug {
        warn!("debug mode: access gate disabled");
    } else if config.client_id.is_none() || config.allowed_emails.is_empty() {
        warn!("client id or allowed emails not configured; gated requests will be refused");
    }

    let refresh = RefreshHandle::spawn(config.refresh.clone(), cache, source);

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    info!(
        bind_addr = %config.bind,
        data_dir = %config.data_dir.display(),
        cache = ?config.cache,
        refresh_interval = ?config.refresh_interval(),
        "assetfeed listening"
    );

    axum::serve(listener, assetfeed::http::router(service))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;

    refresh.shutdown().await;
    Ok(())
}
