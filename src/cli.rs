//! Command-line interface parsing for assetfeed
//!
//! Every option can also be set through an environment variable so the
//! server can be configured entirely from its deployment environment.

use clap::{Parser, Subcommand, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::auth::parse_allowed_emails;
use crate::cache::{CacheStore, FileCacheStore, MemoryCacheStore};
use crate::refresh::RefreshConfig;

/// Error types for CLI argument validation
#[derive(Debug, Error)]
pub enum CliError {
    /// The data directory does not exist or is not a directory
    #[error("Data directory not found: '{0}'")]
    InvalidDataDir(PathBuf),

    /// The file cache was selected but no cache directory could be determined
    #[error("No cache directory available; pass --cache-dir or set ASSETFEED_CACHE_DIR")]
    NoCacheDir,
}

/// Where cached responses are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CacheBackend {
    /// In-process; lost on restart
    Memory,
    /// JSON files in the cache directory; shared with `pre-cache`
    File,
    /// Every read is a miss
    None,
}

/// What to run
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Serve the endpoint (default)
    Serve,
    /// Rebuild the cache once, print the written keys and exit
    PreCache,
}

/// assetfeed - JSON endpoint for normalized asset datasets and transaction feeds
#[derive(Parser, Debug)]
#[command(name = "assetfeed")]
#[command(about = "Serves normalized CSV datasets and RSS transaction feeds as JSON")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Directory holding `*.csv` datasets and `transactions_YYYYMM.xml` feeds
    #[arg(long, env = "ASSETFEED_DATA_DIR", default_value = ".")]
    pub data_dir: PathBuf,

    /// Address to listen on
    #[arg(long, env = "ASSETFEED_BIND", default_value = "127.0.0.1:8080")]
    pub bind: SocketAddr,

    /// Cache backend
    #[arg(long, value_enum, env = "ASSETFEED_CACHE", default_value_t = CacheBackend::Memory)]
    pub cache: CacheBackend,

    /// Directory for the file cache (defaults to the XDG cache directory)
    #[arg(long, env = "ASSETFEED_CACHE_DIR", value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// OAuth client id that ID tokens must be issued for
    #[arg(long, env = "GOOGLE_CLIENT_ID")]
    pub client_id: Option<String>,

    /// Comma-separated list of emails allowed to read
    #[arg(long, env = "ALLOWED_EMAILS", value_name = "EMAILS")]
    pub allowed_emails: Option<String>,

    /// Disable the access gate
    #[arg(long, env = "ASSETFEED_DEBUG")]
    pub debug: bool,

    /// Rebuild the cache every N seconds while serving (0 disables)
    #[arg(long, env = "ASSETFEED_REFRESH_SECS", default_value_t = 0, value_name = "SECS")]
    pub refresh_interval: u64,
}

/// Configuration derived from CLI arguments for application startup
#[derive(Debug, Clone)]
pub struct StartupConfig {
    pub command: Command,
    pub data_dir: PathBuf,
    pub bind: SocketAddr,
    pub cache: CacheBackend,
    pub cache_dir: Option<PathBuf>,
    pub client_id: Option<String>,
    /// Trimmed, lower-cased allow-list
    pub allowed_emails: Vec<String>,
    pub debug: bool,
    pub refresh: RefreshConfig,
}

impl StartupConfig {
    /// Creates a StartupConfig from parsed CLI arguments.
    ///
    /// # Arguments
    /// * `cli` - The parsed CLI struct
    ///
    /// # Returns
    /// * `Ok(StartupConfig)` with appropriate settings
    /// * `Err(CliError)` if the data directory does not exist
    pub fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        if !cli.data_dir.is_dir() {
            return Err(CliError::InvalidDataDir(cli.data_dir.clone()));
        }

        Ok(StartupConfig {
            command: cli.command.clone().unwrap_or(Command::Serve),
            data_dir: cli.data_dir.clone(),
            bind: cli.bind,
            cache: cli.cache,
            cache_dir: cli.cache_dir.clone(),
            client_id: cli.client_id.clone().filter(|id| !id.trim().is_empty()),
            allowed_emails: cli
                .allowed_emails
                .as_deref()
                .map(parse_allowed_emails)
                .unwrap_or_default(),
            debug: cli.debug,
            refresh: RefreshConfig::from_secs(cli.refresh_interval),
        })
    }

    /// Opens the configured cache store
    ///
    /// # Returns
    /// * `Ok(Some(store))` for the memory and file backends
    /// * `Ok(None)` for `--cache none`
    /// * `Err(CliError::NoCacheDir)` if the file backend has no directory
    pub fn cache_store(&self) -> Result<Option<Arc<dyn CacheStore>>, CliError> {
        match self.cache {
            CacheBackend::None => Ok(None),
            CacheBackend::Memory => Ok(Some(Arc::new(MemoryCacheStore::new()))),
            CacheBackend::File => {
                let store = match &self.cache_dir {
                    Some(dir) => FileCacheStore::with_dir(dir.clone()),
                    None => FileCacheStore::new().ok_or(CliError::NoCacheDir)?,
                };
                Ok(Some(Arc::new(store)))
            }
        }
    }

    /// Interval between background rebuilds, if enabled
    pub fn refresh_interval(&self) -> Option<Duration> {
        self.refresh.enabled.then_some(self.refresh.interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn parse(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("assetfeed").chain(args.iter().copied()))
    }

    #[test]
    fn test_cli_parse_no_args() {
        let cli = parse(&[]);
        assert!(cli.command.is_none());
        assert_eq!(cli.cache, CacheBackend::Memory);
        assert_eq!(cli.bind, "127.0.0.1:8080".parse::<SocketAddr>().unwrap());
        assert_eq!(cli.refresh_interval, 0);
    }

    #[test]
    fn test_cli_parse_pre_cache_subcommand() {
        let cli = parse(&["--cache", "file", "pre-cache"]);
        assert_eq!(cli.command, Some(Command::PreCache));
        assert_eq!(cli.cache, CacheBackend::File);
    }

    #[test]
    fn test_cli_rejects_unknown_cache_backend() {
        let result = Cli::try_parse_from(["assetfeed", "--cache", "redis"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_startup_config_defaults_to_serve() {
        let dir = TempDir::new().unwrap();
        let cli = parse(&["--data-dir", dir.path().to_str().unwrap()]);

        let config = StartupConfig::from_cli(&cli).unwrap();

        assert_eq!(config.command, Command::Serve);
        assert!(config.allowed_emails.is_empty());
        assert!(config.client_id.is_none());
        assert!(config.refresh_interval().is_none());
    }

    #[test]
    fn test_startup_config_parses_allow_list_and_refresh() {
        let dir = TempDir::new().unwrap();
        let cli = parse(&[
            "--data-dir",
            dir.path().to_str().unwrap(),
            "--allowed-emails",
            " A@Example.com, b@example.com ",
            "--client-id",
            "client",
            "--refresh-interval",
            "600",
        ]);

        let config = StartupConfig::from_cli(&cli).unwrap();

        assert_eq!(config.allowed_emails, vec!["a@example.com", "b@example.com"]);
        assert_eq!(config.client_id.as_deref(), Some("client"));
        assert_eq!(config.refresh_interval(), Some(Duration::from_secs(600)));
    }

    #[test]
    fn test_startup_config_missing_data_dir() {
        let cli = parse(&["--data-dir", "/nonexistent/assetfeed/data"]);

        let err = StartupConfig::from_cli(&cli).unwrap_err();

        assert!(matches!(err, CliError::InvalidDataDir(_)));
        assert!(err.to_string().contains("/nonexistent/assetfeed/data"));
    }

    #[test]
    fn test_cache_store_per_backend() {
        let dir = TempDir::new().unwrap();
        let data = dir.path().to_str().unwrap();
        let cache_dir = dir.path().join("cache");

        let none = StartupConfig::from_cli(&parse(&["--data-dir", data, "--cache", "none"])).unwrap();
        assert!(none.cache_store().unwrap().is_none());

        let memory = StartupConfig::from_cli(&parse(&["--data-dir", data])).unwrap();
        assert!(memory.cache_store().unwrap().is_some());

        let file = StartupConfig::from_cli(&parse(&[
            "--data-dir",
            data,
            "--cache",
            "file",
            "--cache-dir",
            cache_dir.to_str().unwrap(),
        ]))
        .unwrap();
        let store = file.cache_store().unwrap().expect("file store");
        store.put("0", "{}", Duration::from_secs(60)).unwrap();
        assert!(cache_dir.join("0.json").exists());
    }
}
