//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use crate::domain::types::Resolution;
use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct StationConfig {
    /// Operator station identifier, attached to logs
    #[serde(default = "default_station_id")]
    pub id: String,
}

fn default_station_id() -> String {
    "scanner".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// Ledger validation endpoint
    pub validate_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScannerConfig {
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
    /// Bounded event queue size (decode events beyond this are dropped)
    #[serde(default = "default_event_queue_size")]
    pub event_queue_size: usize,
}

fn default_cooldown_ms() -> u64 {
    2000
}

fn default_event_queue_size() -> usize {
    64
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self { cooldown_ms: default_cooldown_ms(), event_queue_size: default_event_queue_size() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CameraConfig {
    /// Label tokens meaning "rear-facing" in the deployment's locale
    #[serde(default = "default_rear_keywords")]
    pub rear_keywords: Vec<String>,
    #[serde(default = "default_preferred_width")]
    pub preferred_width: u32,
    #[serde(default = "default_preferred_height")]
    pub preferred_height: u32,
    /// External decoder emitting one decoded text per stdout line
    #[serde(default = "default_decoder_command")]
    pub decoder_command: String,
    #[serde(default = "default_decoder_args")]
    pub decoder_args: Vec<String>,
    /// A decoder still running after this long counts as started
    #[serde(default = "default_start_probe_ms")]
    pub start_probe_ms: u64,
    #[serde(default = "default_sysfs_dir")]
    pub sysfs_dir: String,
    #[serde(default = "default_dev_dir")]
    pub dev_dir: String,
}

fn default_rear_keywords() -> Vec<String> {
    ["back", "rear", "environment", "trasera", "posterior"].iter().map(|s| s.to_string()).collect()
}

fn default_preferred_width() -> u32 {
    1280
}

fn default_preferred_height() -> u32 {
    720
}

fn default_decoder_command() -> String {
    "zbarcam".to_string()
}

fn default_decoder_args() -> Vec<String> {
    vec!["--raw".to_string(), "--nodisplay".to_string(), "-Sdisable".to_string(), "-Sqrcode.enable".to_string()]
}

fn default_start_probe_ms() -> u64 {
    1500
}

fn default_sysfs_dir() -> String {
    "/sys/class/video4linux".to_string()
}

fn default_dev_dir() -> String {
    "/dev".to_string()
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            rear_keywords: default_rear_keywords(),
            preferred_width: default_preferred_width(),
            preferred_height: default_preferred_height(),
            decoder_command: default_decoder_command(),
            decoder_args: default_decoder_args(),
            start_probe_ms: default_start_probe_ms(),
            sysfs_dir: default_sysfs_dir(),
            dev_dir: default_dev_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_dir")]
    pub dir: String,
    /// Cache name; bumping it replaces every previously installed cache
    #[serde(default = "default_cache_version")]
    pub version: String,
    #[serde(default = "default_shell_urls")]
    pub shell_urls: Vec<String>,
}

fn default_shell_urls() -> Vec<String> {
    vec![
        "http://localhost:5000/".to_string(),
        "http://localhost:5000/operador/escaner".to_string(),
        "http://localhost:5000/static/manifest.json".to_string(),
    ]
}

fn default_cache_dir() -> String {
    "cache".to_string()
}

fn default_cache_version() -> String {
    "mun-snack-manager-v1".to_string()
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            version: default_cache_version(),
            shell_urls: default_shell_urls(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
}

fn default_metrics_interval() -> u64 {
    60
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub station: StationConfig,
    pub backend: BackendConfig,
    #[serde(default)]
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    station_id: String,
    validate_url: String,
    cooldown_ms: u64,
    event_queue_size: usize,
    rear_keywords: Vec<String>,
    preferred_width: u32,
    preferred_height: u32,
    decoder_command: String,
    decoder_args: Vec<String>,
    start_probe_ms: u64,
    sysfs_dir: String,
    dev_dir: String,
    cache_dir: String,
    cache_version: String,
    cache_shell_urls: Vec<String>,
    metrics_interval_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        let camera = CameraConfig::default();
        let cache = CacheConfig::default();
        Self {
            station_id: default_station_id(),
            validate_url: "http://localhost:5000/operador/validar_qr".to_string(),
            cooldown_ms: default_cooldown_ms(),
            event_queue_size: default_event_queue_size(),
            rear_keywords: camera.rear_keywords,
            preferred_width: camera.preferred_width,
            preferred_height: camera.preferred_height,
            decoder_command: camera.decoder_command,
            decoder_args: camera.decoder_args,
            start_probe_ms: camera.start_probe_ms,
            sysfs_dir: camera.sysfs_dir,
            dev_dir: camera.dev_dir,
            cache_dir: cache.dir,
            cache_version: cache.version,
            cache_shell_urls: cache.shell_urls,
            metrics_interval_secs: default_metrics_interval(),
            config_file: "default".to_string(),
        }
    }
}

impl Config {
    /// Determine config file path from the CLI value or environment
    pub fn resolve_config_path(cli_path: Option<&str>) -> String {
        if let Some(path) = cli_path {
            return path.to_string();
        }

        // Check CONFIG_FILE environment variable
        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self {
            station_id: toml_config.station.id,
            validate_url: toml_config.backend.validate_url,
            cooldown_ms: toml_config.scanner.cooldown_ms,
            event_queue_size: toml_config.scanner.event_queue_size.max(1),
            rear_keywords: toml_config
                .camera
                .rear_keywords
                .into_iter()
                .map(|kw| kw.to_lowercase())
                .filter(|kw| !kw.is_empty())
                .collect(),
            preferred_width: toml_config.camera.preferred_width,
            preferred_height: toml_config.camera.preferred_height,
            decoder_command: toml_config.camera.decoder_command,
            decoder_args: toml_config.camera.decoder_args,
            start_probe_ms: toml_config.camera.start_probe_ms,
            sysfs_dir: toml_config.camera.sysfs_dir,
            dev_dir: toml_config.camera.dev_dir,
            cache_dir: toml_config.cache.dir,
            cache_version: toml_config.cache.version,
            cache_shell_urls: toml_config.cache.shell_urls,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            config_file: path.display().to_string(),
        })
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {:#}. Using defaults.", e);
                Self::default()
            }
        }
    }

    pub fn station_id(&self) -> &str {
        &self.station_id
    }

    pub fn validate_url(&self) -> &str {
        &self.validate_url
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn cooldown_ms(&self) -> u64 {
        self.cooldown_ms
    }

    pub fn event_queue_size(&self) -> usize {
        self.event_queue_size
    }

    pub fn rear_keywords(&self) -> &[String] {
        &self.rear_keywords
    }

    pub fn preferred_resolution(&self) -> Resolution {
        Resolution { width: self.preferred_width, height: self.preferred_height }
    }

    pub fn decoder_command(&self) -> &str {
        &self.decoder_command
    }

    pub fn decoder_args(&self) -> &[String] {
        &self.decoder_args
    }

    pub fn start_probe(&self) -> Duration {
        Duration::from_millis(self.start_probe_ms)
    }

    pub fn sysfs_dir(&self) -> &str {
        &self.sysfs_dir
    }

    pub fn dev_dir(&self) -> &str {
        &self.dev_dir
    }

    pub fn cache_dir(&self) -> &str {
        &self.cache_dir
    }

    pub fn cache_version(&self) -> &str {
        &self.cache_version
    }

    pub fn cache_shell_urls(&self) -> &[String] {
        &self.cache_shell_urls
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to set the cooldown
    pub fn with_cooldown_ms(mut self, ms: u64) -> Self {
        self.cooldown_ms = ms;
        self
    }

    /// Builder method for tests to point at a fake ledger
    pub fn with_validate_url(mut self, url: &str) -> Self {
        self.validate_url = url.to_string();
        self
    }
}
