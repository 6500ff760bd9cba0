use crate::sync::FeedSource;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use time::UtcOffset;

pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";
pub const DEFAULT_SERVER_PORT: u16 = 8080;
pub const DEFAULT_SIMULATION_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub app: AppSection,
    pub logging: LoggingSection,
    #[serde(default)]
    pub server: Option<ServerSection>,
    #[serde(default)]
    pub simulation: Option<SimulationSection>,
    #[serde(default)]
    pub sync: Option<SyncSection>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppSection {
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSection {
    pub level: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSection {
    /// Port to listen on (default: 8080)
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SimulationSection {
    /// Run the periodic sensor simulation (default: true)
    pub enabled: Option<bool>,
    /// Seconds between simulation batches (default: 30)
    pub interval_secs: Option<u64>,
    /// Offset used to decide working and peak hours (default: UTC)
    pub utc_offset_hours: Option<i8>,
    /// Fixed seed for reproducible runs
    pub seed: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncSection {
    /// Open-data records endpoint
    pub feed_url: Option<String>,
    /// Local snapshot used instead of `feed_url` when set
    pub feed_path: Option<PathBuf>,
    /// Seconds between scheduled syncs (default: one day)
    pub interval_secs: Option<u64>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

pub fn load_default() -> Result<Config, ConfigError> {
    load_from_path(DEFAULT_CONFIG_PATH)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&contents)?;
    config.utc_offset()?;
    if config.simulation_interval().is_zero() {
        return Err(ConfigError::Invalid(
            "simulation.interval_secs must be positive".to_string(),
        ));
    }
    if config.sync_interval().is_zero() {
        return Err(ConfigError::Invalid(
            "sync.interval_secs must be positive".to_string(),
        ));
    }
    Ok(config)
}

impl Config {
    /// Returns the server port (default: 8080)
    pub fn server_port(&self) -> u16 {
        self.server
            .as_ref()
            .and_then(|s| s.port)
            .unwrap_or(DEFAULT_SERVER_PORT)
    }

    pub fn simulation_enabled(&self) -> bool {
        self.simulation
            .as_ref()
            .and_then(|s| s.enabled)
            .unwrap_or(true)
    }

    /// Returns the simulation interval as Duration (default: 30 seconds)
    pub fn simulation_interval(&self) -> Duration {
        let secs = self
            .simulation
            .as_ref()
            .and_then(|s| s.interval_secs)
            .unwrap_or(DEFAULT_SIMULATION_INTERVAL_SECS);
        Duration::from_secs(secs)
    }

    pub fn simulation_seed(&self) -> Option<u64> {
        self.simulation.as_ref().and_then(|s| s.seed)
    }

    pub fn utc_offset(&self) -> Result<UtcOffset, ConfigError> {
        let hours = self
            .simulation
            .as_ref()
            .and_then(|s| s.utc_offset_hours)
            .unwrap_or(0);
        UtcOffset::from_hms(hours, 0, 0)
            .map_err(|err| ConfigError::Invalid(format!("utc_offset_hours {hours}: {err}")))
    }

    /// Feed to import from. `feed_path` wins over `feed_url`; empty values
    /// count as unset.
    pub fn feed_source(&self) -> Option<FeedSource> {
        let sync = self.sync.as_ref()?;
        if let Some(path) = sync
            .feed_path
            .as_ref()
            .filter(|path| !path.as_os_str().is_empty())
        {
            return Some(FeedSource::File(path.clone()));
        }
        sync.feed_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(|url| FeedSource::Url(url.to_string()))
    }

    /// Returns the scheduled sync interval as Duration (default: one day)
    pub fn sync_interval(&self) -> Duration {
        let secs = self
            .sync
            .as_ref()
            .and_then(|s| s.interval_secs)
            .unwrap_or(DEFAULT_SYNC_INTERVAL_SECS);
        Duration::from_secs(secs)
    }

    /// Parsed `[logging].level`, falling back to INFO for unknown values.
    pub fn log_level(&self) -> tracing::Level {
        self.logging.level.parse().unwrap_or(tracing::Level::INFO)
    }
}
