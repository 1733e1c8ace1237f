//! Configuration management for solarmap
//!
//! This module handles loading, validation and saving of the application
//! configuration from YAML files.

mod defaults;

use crate::error::{Result, SolarmapError};
use crate::planner::PlannerConfig;
use crate::registers::InverterModel;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Locations searched by [`Config::load`], in order
pub const DEFAULT_CONFIG_PATHS: [&str; 3] = [
    "solarmap_config.yaml",
    "/data/solarmap_config.yaml",
    "/etc/solarmap/config.yaml",
];

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Modbus TCP connection configuration
    pub modbus: ModbusConfig,

    /// Inverter model and register map configuration
    pub inverter: InverterConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Polling interval in milliseconds
    pub poll_interval_ms: u64,
}

/// Modbus TCP connection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModbusConfig {
    /// IP address of the inverter or RS485 gateway
    pub ip: String,

    /// TCP port (typically 502)
    pub port: u16,

    /// Modbus unit (slave) ID
    pub unit_id: u8,

    /// Connection timeout in milliseconds
    pub connect_timeout_ms: u64,

    /// Timeout for a single read or write in milliseconds
    pub operation_timeout_ms: u64,
}

/// Inverter and read planning parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InverterConfig {
    /// Inverter model family
    pub model: InverterModel,

    /// Largest number of registers per read request
    pub max_block_size: u16,

    /// Largest run of unrequested registers a read may span
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_gap: Option<u16>,

    /// Allowed distance from the scale grid when encoding decimals
    pub rounding_tolerance: f64,

    /// Custom register map; the built-in FoxESS map when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub register_file: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Console level override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub console_level: Option<String>,

    /// File level override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_level: Option<String>,

    /// Path to log file or directory
    pub file: String,

    /// Number of backup files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

impl InverterConfig {
    /// Planner limits derived from this configuration
    pub fn planner(&self) -> Result<PlannerConfig> {
        Ok(PlannerConfig::new(self.max_block_size)?.with_max_gap(self.max_gap))
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the first default location that exists
    pub fn load() -> Result<Self> {
        for path in &DEFAULT_CONFIG_PATHS {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        // Fall back to default configuration
        Ok(Config::default())
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.modbus.ip.is_empty() {
            return Err(SolarmapError::validation(
                "modbus.ip",
                "IP address cannot be empty",
            ));
        }

        if self.modbus.port == 0 {
            return Err(SolarmapError::validation(
                "modbus.port",
                "Port must be greater than 0",
            ));
        }

        if self.modbus.connect_timeout_ms == 0 || self.modbus.operation_timeout_ms == 0 {
            return Err(SolarmapError::validation(
                "modbus.timeouts",
                "Timeouts must be greater than 0",
            ));
        }

        if !(2..=PlannerConfig::MODBUS_MAX_READ).contains(&self.inverter.max_block_size) {
            return Err(SolarmapError::validation(
                "inverter.max_block_size".to_string(),
                format!(
                    "Must be between 2 and {}",
                    PlannerConfig::MODBUS_MAX_READ
                ),
            ));
        }

        if !self.inverter.rounding_tolerance.is_finite()
            || self.inverter.rounding_tolerance < 0.0
            || self.inverter.rounding_tolerance >= 0.5
        {
            return Err(SolarmapError::validation(
                "inverter.rounding_tolerance",
                "Must be in [0, 0.5)",
            ));
        }

        if let Some(path) = &self.inverter.register_file
            && !path.exists()
        {
            return Err(SolarmapError::validation(
                "inverter.register_file".to_string(),
                format!("{} does not exist", path.display()),
            ));
        }

        crate::logging::parse_log_level(&self.logging.level).map_err(|_| {
            SolarmapError::validation(
                "logging.level".to_string(),
                format!("Unknown level {}", self.logging.level),
            )
        })?;

        // Validate polling interval
        if self.poll_interval_ms == 0 {
            return Err(SolarmapError::validation(
                "poll_interval_ms",
                "Must be greater than 0",
            ));
        }

        Ok(())
    }
}
