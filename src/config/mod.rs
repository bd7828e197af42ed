mod file_config;

pub use file_config::{DeliveryConfig, FileConfig};

use crate::server::RequestsLoggingLevel;
use anyhow::{bail, Result};
use clap::ValueEnum;
use std::path::PathBuf;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub push_provider_url: Option<String>,
    pub push_timeout_sec: u64,
    pub push_ttl_secs: u64,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub db_dir: PathBuf,
    pub port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub push_provider_url: Option<String>,
    pub push_timeout_sec: u64,
    pub push_ttl_secs: u64,

    // Feature configs (with defaults)
    pub delivery: DeliverySettings,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be given on the command line or in the config file")
            })?;

        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let port = file.port.unwrap_or(cli.port);

        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());

        let push_provider_url = file
            .push_provider_url
            .or_else(|| cli.push_provider_url.clone());
        let push_timeout_sec = file.push_timeout_sec.unwrap_or(cli.push_timeout_sec);
        let push_ttl_secs = file.push_ttl_secs.unwrap_or(cli.push_ttl_secs);

        // Delivery settings - merge file config with defaults
        let delivery_file = file.delivery.unwrap_or_default();
        let delivery = DeliverySettings {
            ack_timeout_secs: delivery_file.ack_timeout_secs.unwrap_or(5),
            max_retries: delivery_file.max_retries.unwrap_or(3),
            retry_base_backoff_secs: delivery_file.retry_base_backoff_secs.unwrap_or(5),
            retry_max_backoff_secs: delivery_file.retry_max_backoff_secs.unwrap_or(300),
            worker_concurrency: delivery_file.worker_concurrency.unwrap_or(10),
            rate_limit_per_sec: delivery_file.rate_limit_per_sec.unwrap_or(100),
            sweep_interval_secs: delivery_file.sweep_interval_secs.unwrap_or(10),
            job_retention_hours: delivery_file.job_retention_hours.unwrap_or(24),
            notification_retention_days: delivery_file.notification_retention_days.unwrap_or(90),
            purge_interval_hours: delivery_file.purge_interval_hours.unwrap_or(24),
        };

        if delivery.max_retries < 0 {
            bail!("max_retries must not be negative");
        }

        Ok(Self {
            db_dir,
            port,
            logging_level,
            push_provider_url,
            push_timeout_sec,
            push_ttl_secs,
            delivery,
        })
    }

    pub fn notifications_db_path(&self) -> PathBuf {
        self.db_dir.join("notifications.db")
    }

    pub fn retry_queue_db_path(&self) -> PathBuf {
        self.db_dir.join("retry_queue.db")
    }
}

#[derive(Debug, Clone)]
pub struct DeliverySettings {
    /// Seconds to wait for a client ack after a realtime send.
    pub ack_timeout_secs: u64,
    pub max_retries: i32,
    pub retry_base_backoff_secs: u64,
    pub retry_max_backoff_secs: u64,
    pub worker_concurrency: usize,
    pub rate_limit_per_sec: u32,
    pub sweep_interval_secs: u64,
    /// How long terminal retry jobs are kept before the cleanup pass.
    pub job_retention_hours: u64,
    /// Read notifications older than this are purged.
    pub notification_retention_days: u64,
    pub purge_interval_hours: u64,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            ack_timeout_secs: 5,
            max_retries: 3,
            retry_base_backoff_secs: 5,
            retry_max_backoff_secs: 300,
            worker_concurrency: 10,
            rate_limit_per_sec: 100,
            sweep_interval_secs: 10,
            job_retention_hours: 24,
            notification_retention_days: 90,
            purge_interval_hours: 24,
        }
    }
}

/// Parses a logging level string into RequestsLoggingLevel.
/// Uses clap's ValueEnum trait for parsing.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}
