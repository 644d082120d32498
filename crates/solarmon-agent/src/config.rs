//! Configuration management.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable consulted when the cloud token is left empty.
pub const TOKEN_ENV: &str = "INFLUXDB_TOKEN";

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Backend and sampler selection
    #[serde(default)]
    pub method: MethodConfig,

    /// Run length and loop cadence
    #[serde(default)]
    pub time: TimeConfig,

    /// InfluxDB 2.x cloud credentials
    #[serde(default)]
    pub cloud: CloudConfig,

    /// InfluxDB 1.x local credentials
    #[serde(default)]
    pub local: LocalConfig,

    /// Fault log configuration
    #[serde(default)]
    pub log: LogConfig,

    /// Status indicator configuration
    #[serde(default)]
    pub indicator: IndicatorConfig,

    /// Sensor configuration
    #[serde(default)]
    pub sensors: SensorConfig,
}

/// Backend and sampler selection.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MethodConfig {
    /// Upload to InfluxDB cloud instead of a local instance
    #[serde(default)]
    pub cloud: bool,

    /// Use the synthetic sampler instead of hardware
    #[serde(default)]
    pub synthetic: bool,
}

/// Run length and loop cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeConfig {
    /// Total run time in seconds (ignored when endless)
    #[serde(default = "default_seconds")]
    pub seconds: u64,

    /// Run until stopped
    #[serde(default)]
    pub endless: bool,

    /// Target loop period in seconds
    #[serde(default = "default_period")]
    pub period_secs: f64,

    /// Iterations taking this long (or clock jumps this large) are fatal
    #[serde(default = "default_stall_limit")]
    pub stall_limit_secs: f64,
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            seconds: default_seconds(),
            endless: false,
            period_secs: default_period(),
            stall_limit_secs: default_stall_limit(),
        }
    }
}

impl TimeConfig {
    /// Number of iterations in bounded mode.
    pub fn iterations(&self) -> u64 {
        if self.period_secs <= 0.0 {
            return 0;
        }
        (self.seconds as f64 / self.period_secs).floor() as u64
    }
}

/// InfluxDB 2.x cloud credentials.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CloudConfig {
    #[serde(default)]
    pub bucket: String,
    #[serde(default)]
    pub org: String,
    /// API token; empty falls back to `INFLUXDB_TOKEN`
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub url: String,
}

impl CloudConfig {
    /// Returns the configured token or the one exported in the environment.
    pub fn resolved_token(&self) -> String {
        if self.token.is_empty() {
            std::env::var(TOKEN_ENV).unwrap_or_default()
        } else {
            self.token.clone()
        }
    }
}

/// InfluxDB 1.x local credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalConfig {
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub pass: String,
    #[serde(default = "default_db")]
    pub db: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            user: String::new(),
            pass: String::new(),
            db: default_db(),
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Fault log configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Path of the active fault log
    #[serde(default = "default_log_path")]
    pub path: String,

    /// Size above which the log is rotated at startup
    #[serde(default = "default_log_max_bytes")]
    pub max_bytes: u64,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            path: default_log_path(),
            max_bytes: default_log_max_bytes(),
        }
    }
}

/// Status indicator configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IndicatorConfig {
    /// BCM number of a GPIO line driving the light; takes precedence over `path`
    #[serde(default)]
    pub gpio_pin: Option<u8>,

    /// LED class brightness file; empty with no pin disables the indicator
    #[serde(default)]
    pub path: String,
}

/// One shunt sensor channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChannelConfig {
    /// Channel name used as the tag value
    pub name: String,
    /// I2C address of the INA219
    pub address: u16,
}

/// Sensor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorConfig {
    /// Network interface or "auto"
    #[serde(default = "default_interface")]
    pub interface: String,

    /// I2C bus number
    #[serde(default = "default_i2c_bus")]
    pub i2c_bus: u8,

    /// Shunt resistance in ohms
    #[serde(default = "default_shunt_ohms")]
    pub shunt_ohms: f64,

    /// k in power = k * bus_voltage²
    #[serde(default = "default_power_coefficient")]
    pub power_coefficient: f64,

    /// Reads averaged into one channel reading
    #[serde(default = "default_samples")]
    pub samples_per_reading: u32,

    /// Pause between averaging rounds in milliseconds
    #[serde(default = "default_sample_pause")]
    pub sample_pause_ms: u64,

    /// Channels; the first three are averaged into the bus average
    #[serde(default = "default_channels")]
    pub channels: Vec<ChannelConfig>,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            interface: default_interface(),
            i2c_bus: default_i2c_bus(),
            shunt_ohms: default_shunt_ohms(),
            power_coefficient: default_power_coefficient(),
            samples_per_reading: default_samples(),
            sample_pause_ms: default_sample_pause(),
            channels: default_channels(),
        }
    }
}

// Default value functions
fn default_seconds() -> u64 {
    300
}

fn default_period() -> f64 {
    3.0
}

fn default_stall_limit() -> f64 {
    10.0
}

fn default_db() -> String {
    "solar".to_string()
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    8086
}

fn default_log_path() -> String {
    "errorfile.txt".to_string()
}

fn default_log_max_bytes() -> u64 {
    100_000_000
}

fn default_interface() -> String {
    "auto".to_string()
}

fn default_i2c_bus() -> u8 {
    solarmon_hw::DEFAULT_I2C_BUS
}

fn default_shunt_ohms() -> f64 {
    0.1
}

fn default_power_coefficient() -> f64 {
    0.1
}

fn default_samples() -> u32 {
    10
}

fn default_sample_pause() -> u64 {
    50
}

fn default_channels() -> Vec<ChannelConfig> {
    [
        ("blue_house", 0x44),
        ("red_house", 0x40),
        ("green_house", 0x41),
        ("bus", 0x44),
    ]
    .into_iter()
    .map(|(name, address)| ChannelConfig {
        name: name.to_string(),
        address,
    })
    .collect()
}

impl Config {
    /// Loads configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content =
            std::fs::read_to_string(path.as_ref()).context("Failed to read configuration file")?;
        Self::parse(&content)
    }

    /// Parses configuration from TOML text.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse configuration")?;
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    /// Checks values serde cannot constrain.
    pub fn validate(&self) -> Result<()> {
        let time = &self.time;
        if !time.period_secs.is_finite() || time.period_secs <= 0.0 {
            bail!(
                "[time] period_secs must be a positive number, got {}",
                time.period_secs
            );
        }
        if !time.stall_limit_secs.is_finite() || time.stall_limit_secs <= time.period_secs {
            bail!(
                "[time] stall_limit_secs must be finite and above period_secs ({}), got {}",
                time.period_secs,
                time.stall_limit_secs
            );
        }
        if !self.sensors.power_coefficient.is_finite() {
            bail!("[sensors] power_coefficient must be finite");
        }
        Ok(())
    }
}
