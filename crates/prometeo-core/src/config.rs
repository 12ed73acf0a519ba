//! Global configuration, loaded from `~/.config/prometeo/config.toml` with
//! the Manager's constructor defaults (§6) written out on first run.
//!
//! Grounded on `config::load_or_init`'s shape, with the prior tuning fields
//! replaced by the Manager's own options.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Mbps-to-bytes-per-second conversion used by `speed_limit_bps` (§6).
const BYTES_PER_SECOND_PER_MBPS: u64 = 125_000;

/// Manager configuration (§6's constructor options).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrometeoConfig {
    /// Number of Worker ranges a new download is split into.
    pub connections: usize,
    /// Root directory under which each download's work directory is created.
    pub tempdir: PathBuf,
    /// `User-Agent` header sent with every HTTP request.
    pub user_agent: String,
    /// Global speed ceiling in Mbps, shared across every tracked download.
    pub speed_limit_mbps: f64,
}

impl Default for PrometeoConfig {
    fn default() -> Self {
        Self {
            connections: 4,
            tempdir: default_tempdir(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit".to_string(),
            speed_limit_mbps: 10.0,
        }
    }
}

impl PrometeoConfig {
    /// Global speed ceiling in bytes/second (§6: `Mbps * 125_000`).
    pub fn speed_limit_bps(&self) -> u64 {
        (self.speed_limit_mbps * BYTES_PER_SECOND_PER_MBPS as f64).round() as u64
    }
}

fn default_tempdir() -> PathBuf {
    dirs_data_home().join("Prometeo")
}

fn dirs_data_home() -> PathBuf {
    xdg::BaseDirectories::new()
        .map(|d| d.get_data_home())
        .unwrap_or_else(|_| std::env::temp_dir())
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("prometeo")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Loads configuration from disk, writing a default file if none exists yet.
pub fn load_or_init() -> Result<PrometeoConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = PrometeoConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: PrometeoConfig = toml::from_str(&data)?;
    Ok(cfg)
}
