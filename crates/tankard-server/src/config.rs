//! Server configuration: TOML file plus environment overrides.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use tankard_core::progression::ProgressionConfig;
use tankard_core::EngineConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub database: DatabaseSettings,
    #[serde(default)]
    pub engine: EngineConfig,
    pub loot: LootSettings,
    #[serde(default)]
    pub progression: ProgressionConfig,
    #[serde(default)]
    pub runtime: RuntimeSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_max_connections() -> u32 {
    20
}

fn default_min_connections() -> u32 {
    2
}

#[derive(Debug, Clone, Deserialize)]
pub struct LootSettings {
    pub config_path: PathBuf,
    #[serde(default)]
    pub aliases_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeSettings {
    #[serde(default = "default_dead_letter_path")]
    pub dead_letter_path: PathBuf,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_dead_letter_path() -> PathBuf {
    PathBuf::from("data/dead_letters.jsonl")
}

fn default_poll_interval_secs() -> u64 {
    2
}

fn default_shutdown_grace_secs() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            dead_letter_path: default_dead_letter_path(),
            poll_interval_secs: default_poll_interval_secs(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
            log_level: default_log_level(),
        }
    }
}

impl ServerConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config {}: {e}", path.display()))?;
        let mut config: ServerConfig = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("failed to parse config {}: {e}", path.display()))?;
        config.apply_env();
        config.engine.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("DATABASE_URL") {
            self.database.url = url;
        }
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.runtime.log_level = level;
        }
    }
}
