//! Command-line entry points.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use snafu::{ResultExt, Snafu};
use tracing::info;

use crate::config::Config;
use crate::discover::{StreamCatalog, discover_streams};
use crate::error::{ConfigError, DiscoveryError, SyncError};
use crate::sink::JsonLinesSink;
use crate::state::JsonFileStateStore;
use crate::sync::sync_all;

#[derive(Parser, Debug)]
#[command(name = "ferry", version, about)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Infer a schema for every configured table and write the catalog.
    Discover {
        /// Path to configuration file
        #[arg(short, long)]
        config: PathBuf,

        /// Write the catalog here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Emit every record modified since the last run.
    Sync {
        /// Path to configuration file
        #[arg(short, long)]
        config: PathBuf,

        /// Path to state file; created if missing
        #[arg(short, long)]
        state: PathBuf,

        /// Catalog from a previous `discover`; discovery runs first if omitted
        #[arg(long)]
        catalog: Option<PathBuf>,
    },
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CliError {
    #[snafu(display("Failed to load config: {source}"))]
    LoadConfig { source: ConfigError },

    #[snafu(display("Discovery failed: {source}"))]
    Discover { source: DiscoveryError },

    #[snafu(display("Sync failed: {source}"))]
    Sync { source: SyncError },

    #[snafu(display("Failed to read catalog '{}': {source}", path.display()))]
    ReadCatalog {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Failed to parse catalog '{}': {source}", path.display()))]
    ParseCatalog {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[snafu(display("Failed to write catalog: {source}"))]
    WriteCatalog { source: std::io::Error },

    #[snafu(display("Failed to serialize catalog: {source}"))]
    SerializeCatalog { source: serde_json::Error },
}

impl CliArgs {
    pub async fn run(self) -> Result<(), CliError> {
        match self.command {
            Command::Discover { config, output } => discover(&config, output.as_deref()).await,
            Command::Sync {
                config,
                state,
                catalog,
            } => sync(&config, &state, catalog.as_deref()).await,
        }
    }
}

async fn discover(config_path: &Path, output: Option<&Path>) -> Result<(), CliError> {
    let config = Config::from_file(config_path).context(LoadConfigSnafu)?;
    info!(tables = config.tables.len(), "Starting discovery");

    let catalog = discover_streams(&config).await.context(DiscoverSnafu)?;
    let json = serde_json::to_string_pretty(&catalog).context(SerializeCatalogSnafu)?;

    match output {
        Some(path) => std::fs::write(path, json).context(WriteCatalogSnafu)?,
        None => println!("{json}"),
    }
    Ok(())
}

async fn sync(config_path: &Path, state_path: &Path, catalog_path: Option<&Path>) -> Result<(), CliError> {
    let config = Config::from_file(config_path).context(LoadConfigSnafu)?;

    let catalog = match catalog_path {
        Some(path) => {
            let contents = std::fs::read_to_string(path).context(ReadCatalogSnafu { path })?;
            StreamCatalog::from_json(&contents).context(ParseCatalogSnafu { path })?
        }
        None => discover_streams(&config).await.context(DiscoverSnafu)?,
    };

    let store = JsonFileStateStore::new(state_path);
    let mut sink = JsonLinesSink::stdout();
    let summary = sync_all(&config, &catalog, &store, &mut sink)
        .await
        .context(SyncSnafu)?;

    info!(records = summary.total_rows(), "Sync completed");
    Ok(())
}
