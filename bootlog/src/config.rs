use std::fs;
use std::str::FromStr;

use anyhow::{Context, Result};
use log::LevelFilter;
use serde::Deserialize;

use crate::layout::{CHUNK_SIZE, DATA_FILE_SIZE, DEFAULT_LOG_DIR, Layout};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Persist nothing when false.
    pub enabled: bool,
    /// Directory holding the file set, relative to each volume root.
    pub log_dir: String,
    pub data_file_size: u64,
    pub chunk_size: u64,
    /// Entries below this level are not captured.
    pub min_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            enabled: true,
            log_dir: DEFAULT_LOG_DIR.to_string(),
            data_file_size: DATA_FILE_SIZE,
            chunk_size: CHUNK_SIZE,
            min_level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn layout(&self) -> Result<Layout> {
        Layout::new(self.data_file_size, self.chunk_size).context("invalid file layout")
    }

    pub fn min_level(&self) -> Result<LevelFilter> {
        LevelFilter::from_str(&self.min_level)
            .map_err(|_| anyhow::anyhow!("invalid min_level `{}`", self.min_level))
    }
}

pub fn parse_config(content: &str) -> Result<Config> {
    if content.trim().is_empty() {
        return Ok(Config::default());
    }
    let cfg: Config = serde_yaml::from_str(content).context("Failed to parse YAML config")?;
    cfg.layout()?;
    cfg.min_level()?;
    Ok(cfg)
}

pub fn load_config(path: &str) -> Result<Config> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read config from {path}"))?;
    parse_config(&content)
}
