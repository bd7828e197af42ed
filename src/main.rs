use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use vitrina_seller_server::config::{AppConfig, CliConfig, FileConfig};
use vitrina_seller_server::notifications::{
    DefaultFormatter, DeliveryOrchestrator, NotificationStore, SqliteNotificationStore,
};
use vitrina_seller_server::push::{HttpPushProvider, PushService};
use vitrina_seller_server::retry_queue::{RetryPolicy, RetryQueue, RetryWorker};
use vitrina_seller_server::server::state::ServerState;
use vitrina_seller_server::server::websocket::ConnectionManager;
use vitrina_seller_server::server::{metrics, run_server, RequestsLoggingLevel, ServerConfig};

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
    /// Directory holding the notification and retry queue databases. May
    /// also come from the config file.
    #[clap(value_parser = parse_path)]
    pub db_dir: Option<PathBuf>,

    /// Path to a TOML config file. File values override CLI values.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 3001)]
    pub port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// URL of the push relay service. Push fallback is disabled when unset.
    #[clap(long)]
    pub push_provider_url: Option<String>,

    /// Timeout in seconds for push provider requests.
    #[clap(long, default_value_t = 10)]
    pub push_timeout_sec: u64,

    /// TTL in seconds handed to the push provider per message.
    #[clap(long, default_value_t = 3600)]
    pub push_ttl_secs: u64,
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

    let file_config = match &cli_args.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };
    let cli_config = CliConfig {
        db_dir: cli_args.db_dir,
        port: cli_args.port,
        logging_level: cli_args.logging_level,
        push_provider_url: cli_args.push_provider_url,
        push_timeout_sec: cli_args.push_timeout_sec,
        push_ttl_secs: cli_args.push_ttl_secs,
    };
    let config = AppConfig::resolve(&cli_config, file_config)?;

    info!("Initializing metrics...");
    metrics::init_metrics();

    info!(
        "Opening notifications database at {:?}...",
        config.notifications_db_path()
    );
    let notification_store = Arc::new(SqliteNotificationStore::new(
        config.notifications_db_path(),
    )?);

    let policy = RetryPolicy::new(&config.delivery);
    let retry_queue = RetryQueue::open(config.retry_queue_db_path(), policy.clone());

    let connection_manager = Arc::new(ConnectionManager::new());

    let push_service = match &config.push_provider_url {
        Some(url) => {
            info!("Push relay configured at {}", url);
            Arc::new(PushService::new(
                notification_store.clone(),
                Arc::new(HttpPushProvider::new(
                    url.clone(),
                    config.push_timeout_sec,
                    config.push_ttl_secs,
                )?),
            ))
        }
        None => {
            info!("No push relay configured, push fallback disabled");
            Arc::new(PushService::disabled(notification_store.clone()))
        }
    };

    let orchestrator = Arc::new(DeliveryOrchestrator::new(
        notification_store.clone(),
        connection_manager.clone(),
        push_service,
        retry_queue.clone(),
        Arc::new(DefaultFormatter),
        Duration::from_secs(config.delivery.ack_timeout_secs),
        config.delivery.max_retries,
    ));

    let cancellation_token = CancellationToken::new();

    let worker = Arc::new(RetryWorker::new(
        retry_queue.store(),
        orchestrator.clone(),
        policy,
        config.delivery.sweep_interval_secs,
        config.delivery.worker_concurrency,
        config.delivery.rate_limit_per_sec,
    ));
    tokio::spawn(worker.run(cancellation_token.clone()));

    // Retention: purge read notifications and terminal retry jobs
    {
        let purge_store = notification_store.clone();
        let purge_queue = retry_queue.store();
        let notification_retention_secs =
            config.delivery.notification_retention_days as i64 * 24 * 60 * 60;
        let job_retention_secs = config.delivery.job_retention_hours as i64 * 60 * 60;
        let interval = Duration::from_secs(config.delivery.purge_interval_hours * 60 * 60);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);

            // Skip the first immediate tick, wait for the first interval
            ticker.tick().await;

            loop {
                ticker.tick().await;

                match purge_store.purge_older_than(notification_retention_secs, true) {
                    Ok(count) if count > 0 => info!("Purged {} old notifications", count),
                    Ok(_) => {}
                    Err(e) => error!("Failed to purge old notifications: {}", e),
                }
                match purge_queue.purge_finished_older_than(job_retention_secs) {
                    Ok(count) if count > 0 => info!("Purged {} finished retry jobs", count),
                    Ok(_) => {}
                    Err(e) => error!("Failed to purge finished retry jobs: {}", e),
                }
            }
        });
    }

    let state = ServerState {
        config: ServerConfig {
            requests_logging_level: config.logging_level.clone(),
            port: config.port,
        },
        start_time: Instant::now(),
        notification_store,
        ws_connection_manager: connection_manager,
        orchestrator,
        retry_queue,
        hash: env!("GIT_HASH").to_string(),
    };

    let shutdown_token = cancellation_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            shutdown_token.cancel();
        }
    });

    info!("Ready to serve at port {}!", config.port);
    run_server(state, cancellation_token).await
}
