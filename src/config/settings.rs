//! Application settings and configuration management

use crate::error::{AppError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub engine: EngineGateConfig,
    #[serde(default)]
    pub engines: EnginesConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Style catalog location and layout
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CatalogConfig {
    #[serde(default = "default_catalog_root")]
    pub root: PathBuf,
    #[serde(default = "default_image_extension")]
    pub image_extension: String,
    /// URL prefix the catalog directory is served under
    #[serde(default = "default_static_prefix")]
    pub static_prefix: String,
}

fn default_catalog_root() -> PathBuf {
    PathBuf::from("./resources/styles")
}

fn default_image_extension() -> String {
    "png".to_string()
}

fn default_static_prefix() -> String {
    "/static/styles".to_string()
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            root: default_catalog_root(),
            image_extension: default_image_extension(),
            static_prefix: default_static_prefix(),
        }
    }
}

/// How engine calls are serialized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConcurrencyPolicy {
    /// One permit per engine handle; standard and accelerated may overlap.
    /// Only safe when the two handles run on separate workers.
    PerEngine,
    /// A single permit shared by both handles
    #[default]
    Global,
}

/// Engine gate configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineGateConfig {
    #[serde(default)]
    pub concurrency: ConcurrencyPolicy,
    #[serde(default = "default_working_width")]
    pub working_width: u32,
    #[serde(default = "default_working_height")]
    pub working_height: u32,
    /// No server-side timeout when unset
    #[serde(default)]
    pub inference_timeout_secs: Option<u64>,
    #[serde(default = "default_probe_interval")]
    pub probe_interval_secs: u64,
    #[serde(default = "default_example_reference")]
    pub example_reference: PathBuf,
}

fn default_working_width() -> u32 {
    1024
}

fn default_working_height() -> u32 {
    768
}

fn default_probe_interval() -> u64 {
    30
}

fn default_example_reference() -> PathBuf {
    PathBuf::from("./resources/examples/city_default.png")
}

impl Default for EngineGateConfig {
    fn default() -> Self {
        Self {
            concurrency: ConcurrencyPolicy::default(),
            working_width: default_working_width(),
            working_height: default_working_height(),
            inference_timeout_secs: None,
            probe_interval_secs: default_probe_interval(),
            example_reference: default_example_reference(),
        }
    }
}

/// The two engine handles
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EnginesConfig {
    #[serde(default = "default_standard_engine")]
    pub standard: EngineConfig,
    #[serde(default = "default_accelerated_engine")]
    pub accelerated: EngineConfig,
}

impl Default for EnginesConfig {
    fn default() -> Self {
        Self {
            standard: default_standard_engine(),
            accelerated: default_accelerated_engine(),
        }
    }
}

/// Inference worker connection for one engine handle
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    pub endpoint: String,
    /// Model configuration the worker should serve for this handle
    pub model: String,
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
    #[serde(default = "default_health_check_path")]
    pub health_check_path: String,
}

fn default_standard_engine() -> EngineConfig {
    EngineConfig {
        endpoint: "http://127.0.0.1:7860".to_string(),
        model: "multi-cn".to_string(),
        timeout_ms: default_timeout(),
        health_check_path: default_health_check_path(),
    }
}

fn default_accelerated_engine() -> EngineConfig {
    EngineConfig {
        endpoint: "http://127.0.0.1:7860".to_string(),
        model: "multi-cn-hyper".to_string(),
        timeout_ms: default_timeout(),
        health_check_path: default_health_check_path(),
    }
}

fn default_timeout() -> u64 {
    300000
}

fn default_health_check_path() -> String {
    "/health".to_string()
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Directory for scoped reference images; the OS temp dir when unset
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
    #[serde(default = "default_export_dir")]
    pub export_dir: PathBuf,
}

fn default_export_dir() -> PathBuf {
    PathBuf::from("./exports")
}

impl StorageConfig {
    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            temp_dir: None,
            export_dir: default_export_dir(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Settings {
    /// Load settings from configuration files and environment variables
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/default.toml")
    }

    /// Load settings from a specific configuration file path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .set_default("server.host", default_host())?
            .set_default("server.port", i64::from(default_port()))?
            .add_source(File::from(path.as_ref()).required(false))
            // Override with environment variables (prefixed with SKETCH_GATEWAY_)
            .add_source(
                Environment::with_prefix("SKETCH_GATEWAY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(invalid("Server port cannot be 0".to_string()));
        }

        if self.engine.working_width == 0 || self.engine.working_height == 0 {
            return Err(invalid(format!(
                "Working resolution must be non-zero, got {}x{}",
                self.engine.working_width, self.engine.working_height
            )));
        }

        let prefix = &self.catalog.static_prefix;
        if !prefix.starts_with('/') || prefix.trim_end_matches('/').is_empty() {
            return Err(invalid(format!(
                "Catalog static prefix must be a non-root absolute path, got '{}'",
                prefix
            )));
        }

        for (label, engine) in [
            ("standard", &self.engines.standard),
            ("accelerated", &self.engines.accelerated),
        ] {
            if engine.endpoint.is_empty() {
                return Err(invalid(format!("Engine '{}' must have an endpoint", label)));
            }
            if !engine.endpoint.starts_with("http://") && !engine.endpoint.starts_with("https://") {
                return Err(invalid(format!(
                    "Engine '{}' has invalid endpoint '{}'. Must be an http(s) URL",
                    label, engine.endpoint
                )));
            }
        }

        Ok(())
    }
}

fn invalid(message: String) -> AppError {
    AppError::Config(config::ConfigError::Message(message))
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            catalog: CatalogConfig::default(),
            engine: EngineGateConfig::default(),
            engines: EnginesConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
