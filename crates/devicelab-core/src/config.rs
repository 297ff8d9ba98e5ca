use crate::jobs::{JobPriority, Target};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration structure for devicelab
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub scheduler: SchedulerSettings,

    #[serde(default)]
    pub queue: QueueSettings,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default = "default_pool")]
    pub pool: Vec<AgentConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            scheduler: SchedulerSettings::default(),
            queue: QueueSettings::default(),
            logging: LoggingConfig::default(),
            pool: default_pool(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &str) -> Result<Self, crate::Error> {
        use crate::Error;

        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&contents)
            .map_err(|e| Error::config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, crate::Error> {
        // Try to load from DEVICELAB_CONFIG env var first
        if let Ok(config_path) = std::env::var("DEVICELAB_CONFIG") {
            return Self::load(&config_path);
        }

        // Try default locations
        let default_paths = [
            "./config/devicelab.toml",
            "/etc/devicelab/config.toml",
        ];

        for path in &default_paths {
            if Path::new(path).exists() {
                return Self::load(path);
            }
        }

        // Return default config if no file found
        Ok(Self::default())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        use crate::Error;

        if self.store.url.is_empty() {
            return Err(Error::config("Store URL must not be empty"));
        }

        if self.scheduler.tick_interval_secs == 0 {
            return Err(Error::config("Scheduler tick interval must be > 0"));
        }

        if self.queue.max_retries == 0 {
            return Err(Error::config("Max retries must be >= 1"));
        }

        if self.pool.is_empty() {
            return Err(Error::config("Pool must define at least one agent"));
        }

        let mut seen = std::collections::HashSet::new();
        for agent in &self.pool {
            if agent.devices.is_empty() {
                return Err(Error::config(format!(
                    "Agent {} must own at least one device",
                    agent.id
                )));
            }
            for device in &agent.devices {
                if !seen.insert(device.id.as_str()) {
                    return Err(Error::config(format!(
                        "Duplicate device id in pool: {}",
                        device.id
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Backing store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_url")]
    pub url: String,

    /// Attempts made before giving up on the initial connection
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,

    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: default_store_url(),
            connect_attempts: default_connect_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl StoreConfig {
    /// Delay between connection attempts
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSettings {
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval_secs(),
        }
    }
}

impl SchedulerSettings {
    /// Scheduler period
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }
}

/// Queue defaults applied to new submissions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSettings {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default)]
    pub default_priority: JobPriority,

    #[serde(default = "default_target")]
    pub default_target: Target,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            default_priority: JobPriority::default(),
            default_target: default_target(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// One agent of the resource pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub id: String,
    pub devices: Vec<DeviceConfig>,
}

/// One device slot owned by an agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub id: String,

    #[serde(rename = "type")]
    pub device_type: Target,
}

impl DeviceConfig {
    fn new(id: &str, device_type: Target) -> Self {
        Self {
            id: id.to_string(),
            device_type,
        }
    }
}

fn default_store_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_connect_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    500
}

fn default_tick_interval_secs() -> u64 {
    5
}

fn default_max_retries() -> u32 {
    3
}

fn default_target() -> Target {
    Target::Emulator
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Default pool: five agents, 15 devices. Insertion order matters for
/// assignment tie-breaks.
fn default_pool() -> Vec<AgentConfig> {
    vec![
        AgentConfig {
            id: "agent-1".to_string(),
            devices: vec![
                DeviceConfig::new("emulator-1", Target::Emulator),
                DeviceConfig::new("device-1", Target::Device),
            ],
        },
        AgentConfig {
            id: "agent-2".to_string(),
            devices: vec![
                DeviceConfig::new("emulator-2", Target::Emulator),
                DeviceConfig::new("device-2", Target::Device),
                DeviceConfig::new("browserstack-1", Target::Browserstack),
                DeviceConfig::new("browserstack-2", Target::Browserstack),
            ],
        },
        AgentConfig {
            id: "agent-3".to_string(),
            devices: vec![
                DeviceConfig::new("emulator-3", Target::Emulator),
                DeviceConfig::new("device-3", Target::Device),
                DeviceConfig::new("browserstack-3", Target::Browserstack),
            ],
        },
        AgentConfig {
            id: "agent-4".to_string(),
            devices: vec![
                DeviceConfig::new("emulator-4", Target::Emulator),
                DeviceConfig::new("device-4", Target::Device),
            ],
        },
        AgentConfig {
            id: "agent-5".to_string(),
            devices: vec![
                DeviceConfig::new("emulator-5", Target::Emulator),
                DeviceConfig::new("device-5", Target::Device),
                DeviceConfig::new("browserstack-4", Target::Browserstack),
                DeviceConfig::new("browserstack-5", Target::Browserstack),
            ],
        },
    ]
}
