//! Configuration loading for the node.
//!
//! Every key is optional; a missing file or section falls back to the
//! reference values (10 s poll interval, 8 samples 100 ms apart, max staleness 3).

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "SENSOR_NODE_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct NodeConfig {
    pub coordinator: CoordinatorConfig,
    pub poller: PollerConfig,
    pub sensors: SensorsConfig,
    pub simulation: SimulationConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CoordinatorConfig {
    pub host: String,
    pub port: u16,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            host: "10.0.1.1".to_string(),
            port: 1337,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct PollerConfig {
    pub interval_secs: u64,
    pub burst_samples: u8,
    pub sample_interval_ms: u64,
    /// Poll cycles a correlated remote value stays publishable after refresh.
    pub max_staleness: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 10,
            burst_samples: 8,
            sample_interval_ms: 100,
            max_staleness: 3,
        }
    }
}

impl PollerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SensorDriverKind {
    #[default]
    Iio,
    Simulated,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SensorsConfig {
    pub driver: SensorDriverKind,
    /// Root of the industrial-I/O sysfs tree.
    pub iio_root: PathBuf,
}

impl Default for SensorsConfig {
    fn default() -> Self {
        Self {
            driver: SensorDriverKind::Iio,
            iio_root: PathBuf::from("/sys/bus/iio/devices"),
        }
    }
}

/// Parameters of the in-process coordinator simulation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SimulationConfig {
    pub reply_latency_ms: u64,
    /// Probability that a query is lost and reported as a transport error.
    pub drop_probability: f64,
    pub outdoor_temperature: f32,
    pub outdoor_temperature_jitter: f32,
    /// Period of coordinator-initiated queries for the node's cached value (0 disables).
    pub node_query_secs: u64,
    /// Probability that a simulated sensor burst fails.
    pub sensor_failure_probability: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            reply_latency_ms: 250,
            drop_probability: 0.1,
            outdoor_temperature: 4.5,
            outdoor_temperature_jitter: 0.3,
            node_query_secs: 60,
            sensor_failure_probability: 0.05,
        }
    }
}

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn load(config_path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(config_path).map_err(|source| ConfigError::Read {
            path: config_path.to_path_buf(),
            source,
        })?;

        Self::parse(&content)
    }

    /// Load configuration, falling back to defaults when the file does not exist.
    pub fn load_or_default(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            log::info!("No config file at {}, using defaults", config_path.display());
            return Ok(Self::default());
        }
        Self::load(config_path)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: NodeConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Config path from the environment, or the default next to the working directory.
    pub fn path_from_env() -> PathBuf {
        std::env::var_os(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poller.interval_secs == 0 {
            return Err(ConfigError::Invalid("poller.interval-secs must be positive".into()));
        }
        if self.poller.burst_samples == 0 {
            return Err(ConfigError::Invalid("poller.burst-samples must be positive".into()));
        }
        if self.poller.max_staleness == 0 {
            return Err(ConfigError::Invalid("poller.max-staleness must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.simulation.drop_probability)
            || !(0.0..=1.0).contains(&self.simulation.sensor_failure_probability)
        {
            return Err(ConfigError::Invalid("simulation probabilities must be within 0..=1".into()));
        }
        Ok(())
    }
}
