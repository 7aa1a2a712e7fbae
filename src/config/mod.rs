//! Configuration loading and management
//!
//! Configuration comes from a YAML file (every key optional), then
//! `JRMART_*` environment variables override individual values, then the
//! result is checked with `validator`.
//!
//! ```yaml
//! server:
//!   host: 0.0.0.0
//!   port: 5000
//! storage:
//!   backend: mongodb
//!   mongodb_uri: mongodb://localhost:27017
//!   mongodb_database: jrmart
//! uploads:
//!   directory: public/images
//!   max_bytes: 5242880
//! orders:
//!   id_prefix: JR
//!   cod_initial_status: confirmed
//!   total_policy: verify
//! ```

use crate::orders::model::OrderStatus;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use validator::Validate;

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "JRMART_CONFIG";

/// File read when [`CONFIG_PATH_ENV`] is unset
pub const DEFAULT_CONFIG_PATH: &str = "jrmart.yaml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid value '{value}' for {variable}: {message}")]
    InvalidEnv {
        variable: String,
        value: String,
        message: String,
    },

    #[error("invalid configuration: {0}")]
    Invalid(#[from] validator::ValidationErrors),
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ServerConfig {
    #[validate(length(min = 1))]
    pub host: String,

    #[validate(range(min = 1))]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    InMemory,
    Mongodb,
}

impl StorageBackend {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "in_memory" | "in-memory" | "memory" => Some(StorageBackend::InMemory),
            "mongodb" | "mongo" => Some(StorageBackend::Mongodb),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_storage"))]
pub struct StorageConfig {
    pub backend: StorageBackend,

    pub mongodb_uri: Option<String>,

    #[validate(length(min = 1))]
    pub mongodb_database: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::InMemory,
            mongodb_uri: None,
            mongodb_database: "jrmart".to_string(),
        }
    }
}

fn validate_storage(config: &StorageConfig) -> Result<(), validator::ValidationError> {
    let has_uri = config
        .mongodb_uri
        .as_deref()
        .is_some_and(|uri| !uri.trim().is_empty());
    if config.backend == StorageBackend::Mongodb && !has_uri {
        let mut err = validator::ValidationError::new("mongodb_uri_required");
        err.message = Some("storage.mongodb_uri is required for the mongodb backend".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct UploadConfig {
    /// Where payment screenshots are written
    pub directory: PathBuf,

    /// URL prefix under which stored files are served
    #[validate(custom(function = "validate_public_prefix"))]
    pub public_prefix: String,

    #[validate(range(min = 1))]
    pub max_bytes: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("public/images"),
            public_prefix: "/images".to_string(),
            max_bytes: 5 * 1024 * 1024,
        }
    }
}

fn validate_public_prefix(prefix: &str) -> Result<(), validator::ValidationError> {
    if prefix.starts_with('/') && prefix.len() > 1 && !prefix.ends_with('/') {
        Ok(())
    } else {
        Err(validator::ValidationError::new("public_prefix"))
    }
}

/// How a client-submitted `totalAmount` is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TotalPolicy {
    /// Store the submitted total as is
    Trust,
    /// Reject totals that differ from the line items
    Verify,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct OrderConfig {
    #[validate(custom(function = "validate_id_prefix"))]
    pub id_prefix: String,

    #[validate(custom(function = "validate_cod_status"))]
    pub cod_initial_status: OrderStatus,

    pub total_policy: TotalPolicy,

    #[validate(range(min = 0.0, max = 1.0))]
    pub total_tolerance: f64,

    #[validate(range(min = 1))]
    pub default_recent_limit: usize,

    #[validate(range(min = 1, max = 1000))]
    pub max_list_limit: usize,
}

impl Default for OrderConfig {
    fn default() -> Self {
        Self {
            id_prefix: crate::orders::human_id::DEFAULT_PREFIX.to_string(),
            cod_initial_status: OrderStatus::Confirmed,
            total_policy: TotalPolicy::Trust,
            total_tolerance: 0.005,
            default_recent_limit: 10,
            max_list_limit: 100,
        }
    }
}

fn validate_id_prefix(prefix: &str) -> Result<(), validator::ValidationError> {
    if (1..=8).contains(&prefix.len()) && prefix.chars().all(|c| c.is_ascii_uppercase()) {
        Ok(())
    } else {
        Err(validator::ValidationError::new("id_prefix"))
    }
}

fn validate_cod_status(status: &OrderStatus) -> Result<(), validator::ValidationError> {
    match status {
        OrderStatus::Pending | OrderStatus::Processing | OrderStatus::Confirmed => Ok(()),
        _ => {
            let mut err = validator::ValidationError::new("cod_initial_status");
            err.message = Some("must be pending, processing or confirmed".into());
            Err(err)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct EventsConfig {
    pub enabled: bool,

    #[validate(range(min = 1))]
    pub capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `tracing-subscriber` env-filter directive; `RUST_LOG` takes precedence
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "jrmart=info,tower_http=info".to_string(),
        }
    }
}

/// Complete service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct MartConfig {
    #[validate(nested)]
    pub server: ServerConfig,

    #[validate(nested)]
    pub storage: StorageConfig,

    #[validate(nested)]
    pub uploads: UploadConfig,

    #[validate(nested)]
    pub orders: OrderConfig,

    #[validate(nested)]
    pub events: EventsConfig,

    pub log: LogConfig,
}

impl MartConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    /// Load configuration from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// File (if present), then process environment, then validation
    ///
    /// The file path is `$JRMART_CONFIG`, falling back to `jrmart.yaml`. A
    /// missing file means defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = if Path::new(&path).exists() {
            Self::from_yaml_file(&path)?
        } else {
            Self::default()
        };
        config.apply_env_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Override values from `JRMART_*` variables read through `lookup`
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("JRMART_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("JRMART_PORT") {
            self.server.port = port.parse().map_err(|_| ConfigError::InvalidEnv {
                variable: "JRMART_PORT".to_string(),
                value: port.clone(),
                message: "expected a port number".to_string(),
            })?;
        }
        if let Some(backend) = lookup("JRMART_STORAGE") {
            self.storage.backend =
                StorageBackend::parse(&backend).ok_or_else(|| ConfigError::InvalidEnv {
                    variable: "JRMART_STORAGE".to_string(),
                    value: backend.clone(),
                    message: "expected in_memory or mongodb".to_string(),
                })?;
        }
        if let Some(uri) = lookup("JRMART_MONGODB_URI") {
            self.storage.mongodb_uri = Some(uri);
        }
        if let Some(database) = lookup("JRMART_MONGODB_DATABASE") {
            self.storage.mongodb_database = database;
        }
        if let Some(directory) = lookup("JRMART_UPLOAD_DIR") {
            self.uploads.directory = PathBuf::from(directory);
        }
        if let Some(filter) = lookup("JRMART_LOG") {
            self.log.filter = filter;
        }
        Ok(())
    }

    /// Run the structural checks
    pub fn validated(self) -> Result<Self, ConfigError> {
        self.validate()?;
        Ok(self)
    }
}
