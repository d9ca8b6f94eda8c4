use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    pub stream: StreamConfig,
    #[serde(default)]
    pub sampler: SamplerConfig,
    #[serde(default)]
    pub stability: StabilityConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Remote compliance-analysis endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    /// Bearer token sent as-is; obtaining it is someone else's job.
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Selects the alternate text-recognition language on the server.
    #[serde(default)]
    pub alt_language: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    pub url: String,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SamplerConfig {
    #[serde(default = "default_sample_interval_ms")]
    pub interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StabilityConfig {
    /// Number of signatures kept in the sliding window.
    #[serde(default = "default_window")]
    pub window: usize,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// Sample every n-th pixel when building a signature.
    #[serde(default = "default_pixel_stride")]
    pub pixel_stride: usize,
    /// Signature delta that maps to similarity 0. Tied to `pixel_stride`:
    /// change one and this needs recomputing.
    #[serde(default = "default_max_diff")]
    pub max_diff: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptureConfig {
    #[serde(default = "default_countdown_start")]
    pub countdown_start: u32,
    #[serde(default = "default_countdown_tick_ms")]
    pub countdown_tick_ms: u64,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    /// Start a fresh session after each submission instead of exiting.
    #[serde(default)]
    pub continuous: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
    #[serde(default = "default_device_id")]
    pub device_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_sample_interval_ms(),
        }
    }
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            window: default_window(),
            threshold: default_threshold(),
            pixel_stride: default_pixel_stride(),
            max_diff: default_max_diff(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            countdown_start: default_countdown_start(),
            countdown_tick_ms: default_countdown_tick_ms(),
            jpeg_quality: default_jpeg_quality(),
            continuous: false,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            device_id: default_device_id(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl SamplerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl StreamConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl CaptureConfig {
    pub fn countdown_tick(&self) -> Duration {
        Duration::from_millis(self.countdown_tick_ms)
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.stability.validate()?;
        if self.sampler.interval_ms == 0 {
            return Err(ConfigError::Invalid("sampler.interval_ms must be > 0".into()));
        }
        if self.capture.countdown_start == 0 {
            return Err(ConfigError::Invalid("capture.countdown_start must be > 0".into()));
        }
        if self.capture.countdown_tick_ms == 0 {
            return Err(ConfigError::Invalid("capture.countdown_tick_ms must be > 0".into()));
        }
        if !(1..=100).contains(&self.capture.jpeg_quality) {
            return Err(ConfigError::Invalid("capture.jpeg_quality must be 1-100".into()));
        }
        Ok(())
    }
}

impl StabilityConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window < 2 {
            return Err(ConfigError::Invalid("stability.window must be >= 2".into()));
        }
        if !(self.threshold > 0.0 && self.threshold <= 1.0) {
            return Err(ConfigError::Invalid("stability.threshold must be in (0, 1]".into()));
        }
        if self.pixel_stride == 0 {
            return Err(ConfigError::Invalid("stability.pixel_stride must be > 0".into()));
        }
        if !(self.max_diff > 0.0) {
            return Err(ConfigError::Invalid("stability.max_diff must be > 0".into()));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// Default value functions
fn default_timeout_secs() -> u64 {
    30
}
fn default_connect_timeout_secs() -> u64 {
    10
}
fn default_sample_interval_ms() -> u64 {
    200
}
fn default_window() -> usize {
    5
}
fn default_threshold() -> f64 {
    0.85
}
fn default_pixel_stride() -> usize {
    100
}
fn default_max_diff() -> f64 {
    255.0 * 100.0
}
fn default_countdown_start() -> u32 {
    3
}
fn default_countdown_tick_ms() -> u64 {
    1000
}
fn default_jpeg_quality() -> u8 {
    90
}
fn default_db_path() -> String {
    "data".into()
}
fn default_device_id() -> String {
    "mobile-001".into()
}
fn default_log_level() -> String {
    "info".into()
}
