use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub port: Option<u16>,
    pub timezone: Option<String>,

    // Feature configs
    pub store: Option<StoreConfig>,
    pub schedule: Option<ScheduleConfig>,
    pub pipeline: Option<PipelineConfig>,
    pub generation: Option<GenerationConfig>,
    pub insights: Option<InsightsConfig>,
    pub messaging: Option<MessagingConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct StoreConfig {
    /// "rest" or "sqlite"; inferred from the other fields when absent.
    pub backend: Option<String>,
    pub url: Option<String>,
    pub service_key: Option<String>,
    pub sqlite_path: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct ScheduleConfig {
    pub scheduled_refresh_interval_secs: Option<u64>,
    pub immediate_check_interval_ms: Option<u64>,
    pub message_interval_ms: Option<u64>,
    pub jitter_ms: Option<u64>,
    pub midnight_user_concurrency: Option<usize>,
    pub shutdown_grace_ms: Option<u64>,
    pub initial_send_delay_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct PipelineConfig {
    pub refresh_hours: Option<u64>,
    pub settle_wait_ms: Option<u64>,
    pub concurrency: Option<usize>,
    /// "per-item" or "per-category"
    pub granularity: Option<String>,
    pub exclusive_channels: Option<bool>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct GenerationConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub session_cookie: Option<String>,
    pub agent_id: Option<String>,
    pub timeout_secs: Option<u64>,
    pub watchlist_workspace: Option<String>,
    pub sector_workspace: Option<String>,
    pub narrative_workspace: Option<String>,
    pub watchlist_social_workspace: Option<String>,
    pub sector_social_workspace: Option<String>,
    pub narrative_social_workspace: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct InsightsConfig {
    pub enabled: Option<bool>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct MessagingConfig {
    pub enabled: Option<bool>,
    pub workspace_id: Option<String>,
    pub agent_id: Option<String>,
    pub cooldown_hours: Option<u64>,
    pub send_delay_ms: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
