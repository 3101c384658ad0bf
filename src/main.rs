use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use phonoteca_server::config::{AppConfig, CliConfig, FileConfig, StorageSettings};
use phonoteca_server::lifecycle::OrphanSweeper;
use phonoteca_server::object_store::{FilesystemStore, ObjectStore, S3Store};
use phonoteca_server::server::{run_server, RequestsLoggingLevel, ServerConfig};
use phonoteca_server::SqliteLibraryStore;

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Directory holding the SQLite library database.
    #[clap(value_parser = parse_path)]
    pub db_dir: PathBuf,

    /// Root directory for the filesystem object store. Ignored when an [s3]
    /// section is present in the config file.
    #[clap(long, value_parser = parse_path)]
    pub object_root: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 3001)]
    pub port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// Bearer token required on API routes. Generated and logged if omitted.
    #[clap(long)]
    pub api_token: Option<String>,

    /// Path to the frontend directory to be statically served.
    #[clap(long)]
    pub frontend_dir_path: Option<String>,

    /// Maximum upload size, e.g. "2 GiB".
    #[clap(long)]
    pub max_upload_size: Option<String>,

    /// Cap over total stored bytes, e.g. "50 GiB". Omit to disable the quota.
    #[clap(long)]
    pub quota_max_total: Option<String>,

    /// Seconds between lifecycle sweeps (orphaned files, stale temp objects).
    #[clap(long, default_value_t = 3600)]
    pub sweep_interval_secs: u64,

    /// Age in seconds after which a temp object counts as crash debris.
    #[clap(long, default_value_t = 86400)]
    pub temp_max_age_secs: u64,

    /// Path to a TOML config file; its values override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config_file: Option<PathBuf>,
}

impl CliArgs {
    fn to_cli_config(&self) -> CliConfig {
        CliConfig {
            db_dir: Some(self.db_dir.clone()),
            object_root: self.object_root.clone(),
            port: self.port,
            logging_level: self.logging_level.clone(),
            api_token: self.api_token.clone(),
            frontend_dir_path: self.frontend_dir_path.clone(),
            max_upload_size: self.max_upload_size.clone(),
            quota_max_total: self.quota_max_total.clone(),
            sweep_interval_secs: self.sweep_interval_secs,
            temp_max_age_secs: self.temp_max_age_secs,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    let file_config = match &cli_args.config_file {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };
    let config = AppConfig::resolve(&cli_args.to_cli_config(), file_config)?;

    info!(
        "Opening SQLite library database at {:?}...",
        config.library_db_path()
    );
    let library_store = Arc::new(SqliteLibraryStore::new(config.library_db_path())?);

    let object_store: Arc<dyn ObjectStore> = match &config.storage {
        StorageSettings::Filesystem { root } => {
            info!("Using filesystem object store at {:?}", root);
            Arc::new(FilesystemStore::new(root).await?)
        }
        StorageSettings::S3(settings) => {
            info!(
                "Using S3 object store, bucket {} at {}",
                settings.bucket,
                settings.endpoint_url.as_deref().unwrap_or("AWS")
            );
            Arc::new(S3Store::new(settings))
        }
    };

    if !object_store.bucket_exists().await? {
        info!("Bucket missing, creating it...");
        object_store.make_bucket().await?;
    }

    let api_token = match config.api_token.clone() {
        Some(token) => token,
        None => {
            let token = Uuid::new_v4().to_string();
            info!("No API token configured, generated one: {}", token);
            token
        }
    };

    let sweeper = OrphanSweeper::new(
        object_store.clone(),
        library_store.clone(),
        Duration::from_secs(config.temp_max_age_secs),
    );
    let sweep_interval = Duration::from_secs(config.sweep_interval_secs);
    info!(
        "Lifecycle sweeper enabled: every {}s, temp objects stale after {}s",
        config.sweep_interval_secs, config.temp_max_age_secs
    );
    tokio::spawn(sweeper.run(sweep_interval));

    let server_config = ServerConfig {
        requests_logging_level: config.logging_level.clone(),
        port: config.port,
        api_token,
        frontend_dir_path: config.frontend_dir_path.clone(),
        max_upload_bytes: config.max_upload_bytes as usize,
        quota_max_total_bytes: config.quota_max_total_bytes,
    };

    info!("Ready to serve at port {}!", config.port);
    run_server(server_config, object_store, library_store).await
}
