use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_dir: Option<String>,
    pub port: Option<u16>,
    pub logging_level: Option<String>,
    pub push_provider_url: Option<String>,
    pub push_timeout_sec: Option<u64>,
    pub push_ttl_secs: Option<u64>,

    // Feature configs
    pub delivery: Option<DeliveryConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct DeliveryConfig {
    pub ack_timeout_secs: Option<u64>,
    pub max_retries: Option<i32>,
    pub retry_base_backoff_secs: Option<u64>,
    pub retry_max_backoff_secs: Option<u64>,
    pub worker_concurrency: Option<usize>,
    pub rate_limit_per_sec: Option<u32>,
    pub sweep_interval_secs: Option<u64>,
    pub job_retention_hours: Option<u64>,
    pub notification_retention_days: Option<u64>,
    pub purge_interval_hours: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
