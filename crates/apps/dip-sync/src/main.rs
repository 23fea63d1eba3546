//! dip-sync - Mirror DIP API endpoints into a local SQLite database
//!
//! This is the command-line entry point. The sync logic lives in the
//! `ingest` crate.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use ingest::config::DEFAULT_BASE_URL;
use ingest::storage::{delete_failed_records, failed_records_path, load_failed_records};
use ingest::{
    ApiSettings, DipClient, DipEndpoint, DipResource, RateLimit, SqliteDocumentStore, SyncConfig,
    SyncEngine, SyncOutcome,
};
use log::{error, info};

mod delegate;
mod sync_all;

/// Process exit code for an interrupted run
const EXIT_INTERRUPTED: u8 = 130;

/// Carries `all --key` to child syncs without exposing it in their argv
const CHILD_KEY_ENV: &str = "DIP_SYNC_CHILD_KEY";

#[derive(Parser)]
#[command(name = "dip-sync")]
#[command(about = "Resumable, rate-limited sync of the Bundestag DIP API")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every command that touches sync state
#[derive(Args, Debug, Clone)]
pub struct StateArgs {
    /// SQLite database path
    #[arg(long, default_value = "dip.db")]
    pub db: PathBuf,

    /// Directory for checkpoint files
    #[arg(long, default_value = ".checkpoints")]
    pub checkpoint_dir: PathBuf,

    /// Directory for failed-record files
    #[arg(long, default_value = ".failed")]
    pub failed_dir: PathBuf,
}

/// Options for API access and pacing
#[derive(Args, Debug, Clone)]
pub struct ApiArgs {
    /// API base URL (overrides settings.json and DIP_BASE_URL)
    #[arg(long)]
    pub url: Option<String>,

    /// API key (overrides settings.json and DIP_API_KEY)
    #[arg(long)]
    pub key: Option<String>,

    /// Maximum number of records per sync (0 = all)
    #[arg(long, default_value_t = 0)]
    pub limit: usize,

    /// Resume from the last checkpoint
    #[arg(long)]
    pub resume: bool,

    /// Requests allowed per interval
    #[arg(long, default_value_t = 23)]
    pub rate: u32,

    /// Rate limit interval in seconds
    #[arg(long, default_value_t = 60)]
    pub interval_secs: u64,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync a single endpoint
    Sync {
        /// Endpoint to sync (e.g. vorgang, drucksache-text)
        endpoint: DipEndpoint,

        #[command(flatten)]
        api: ApiArgs,

        #[command(flatten)]
        state: StateArgs,
    },
    /// Sync every endpoint, one child process at a time
    All(sync_all::AllArgs),
    /// Show records that failed for transient reasons
    Failed {
        /// Endpoint whose failed records to show
        endpoint: DipEndpoint,

        /// Delete the failed-records file instead of listing it
        #[arg(long)]
        clear: bool,

        /// Directory for failed-record files
        #[arg(long, default_value = ".failed")]
        failed_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    // Bootstrap config directory
    if let Err(e) = config::init() {
        error!("Failed to initialize config directory: {}", e);
    }

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Sync {
            endpoint,
            api,
            state,
        } => run_sync(endpoint, &api, &state).await,
        Commands::All(args) => sync_all::run(&args).await,
        Commands::Failed {
            endpoint,
            clear,
            failed_dir,
        } => show_failed(endpoint, clear, &failed_dir).map(|()| ExitCode::SUCCESS),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Resolve API settings: explicit flags first, then settings.json, then env
fn resolve_settings(api: &ApiArgs) -> Result<ApiSettings> {
    let key = api
        .key
        .clone()
        .or_else(|| std::env::var(CHILD_KEY_ENV).ok());
    merge_settings(key, api.url.clone(), ApiSettings::load())
}

fn merge_settings(
    key: Option<String>,
    url: Option<String>,
    loaded: Result<ApiSettings>,
) -> Result<ApiSettings> {
    let mut settings = match (key, loaded) {
        (Some(api_key), Ok(loaded)) => ApiSettings {
            base_url: loaded.base_url,
            api_key,
        },
        (Some(api_key), Err(_)) => ApiSettings {
            base_url: std::env::var("DIP_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            api_key,
        },
        (None, loaded) => loaded.with_context(|| {
            let path = ApiSettings::default_settings_path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "settings.json".to_string());
            format!("API key required (use --key, {} or DIP_API_KEY)", path)
        })?,
    };

    if let Some(url) = url {
        settings.base_url = url;
    }
    Ok(settings)
}

async fn run_sync(endpoint: DipEndpoint, api: &ApiArgs, state: &StateArgs) -> Result<ExitCode> {
    let settings = resolve_settings(api)?;
    let store = SqliteDocumentStore::new(&state.db)?;
    let client = Arc::new(DipClient::new(&settings));
    let resource = DipResource::new(client, endpoint, Arc::new(store));

    let config = SyncConfig::new(endpoint.resource_name())
        .with_rate_limit(Some(RateLimit::new(
            api.rate,
            Duration::from_secs(api.interval_secs),
        )))
        .with_limit(api.limit)
        .with_resume(api.resume)
        .with_checkpoint_dir(&state.checkpoint_dir)
        .with_failed_dir(&state.failed_dir);

    info!("Syncing {} from {}", endpoint, settings.base_url);

    let engine = SyncEngine::new(resource, config)?;
    let report = engine.run().await?;

    Ok(match report.outcome {
        SyncOutcome::Interrupted => ExitCode::from(EXIT_INTERRUPTED),
        SyncOutcome::Completed | SyncOutcome::LimitReached => ExitCode::SUCCESS,
    })
}

fn show_failed(endpoint: DipEndpoint, clear: bool, failed_dir: &Path) -> Result<()> {
    let name = endpoint.resource_name();

    if clear {
        delete_failed_records(failed_dir, name)?;
        info!("Cleared failed records for {}", name);
        return Ok(());
    }

    let records = load_failed_records(failed_dir, name)?;
    if records.is_empty() {
        println!("No failed records for {}", name);
        return Ok(());
    }

    println!(
        "{} failed records in {}:",
        records.len(),
        failed_records_path(failed_dir, name).display()
    );
    for record in records {
        println!(
            "  {}  {}  {}",
            record.timestamp.format("%Y-%m-%d %H:%M:%S"),
            record.id,
            record.reason
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_file() -> Result<ApiSettings> {
        Ok(ApiSettings {
            base_url: "https://file.example/api/v1".to_string(),
            api_key: "file-key".to_string(),
        })
    }

    #[test]
    fn test_loaded_settings_used_without_flags() {
        let settings = merge_settings(None, None, from_file()).unwrap();
        assert_eq!(settings, from_file().unwrap());
    }

    #[test]
    fn test_key_flag_keeps_loaded_base_url() {
        let settings = merge_settings(Some("flag-key".to_string()), None, from_file()).unwrap();
        assert_eq!(settings.api_key, "flag-key");
        assert_eq!(settings.base_url, "https://file.example/api/v1");
    }

    #[test]
    fn test_url_flag_overrides_loaded_base_url() {
        let url = Some("https://flag.example".to_string());
        let settings = merge_settings(None, url, from_file()).unwrap();
        assert_eq!(settings.base_url, "https://flag.example");
        assert_eq!(settings.api_key, "file-key");
    }

    #[test]
    fn test_missing_key_is_an_error() {
        let result = merge_settings(None, None, Err(anyhow::anyhow!("no settings")));
        assert!(result.is_err());
    }
}
