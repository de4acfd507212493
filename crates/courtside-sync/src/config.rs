// Configuration loading and parsing (courtside.toml).

use std::path::{Path, PathBuf};
use std::time::Duration;

use courtside_core::projection::ProjectionOptions;
use serde::Deserialize;
use thiserror::Error;

/// File name under `config/` (and `defaults/`).
pub const CONFIG_FILE: &str = "courtside.toml";

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// courtside.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub realtime: RealtimeConfig,
    #[serde(default)]
    pub display: ProjectionOptions,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Base URL of the REST API, without the `/api` suffix.
    pub api_url: String,
    /// WebSocket endpoint.
    pub ws_url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    pub reconnection_delay_ms: u64,
    pub reconnection_attempts: u32,
    /// Capacity of the transport event channel.
    pub event_buffer: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        RealtimeConfig {
            reconnection_delay_ms: 1000,
            reconnection_attempts: 5,
            event_buffer: 256,
        }
    }
}

impl RealtimeConfig {
    pub fn reconnection_delay(&self) -> Duration {
        Duration::from_millis(self.reconnection_delay_ms)
    }
}

impl Config {
    /// A config pointing at the given endpoints with default tuning.
    pub fn for_server(api_url: impl Into<String>, ws_url: impl Into<String>) -> Self {
        Config {
            server: ServerConfig {
                api_url: api_url.into(),
                ws_url: ws_url.into(),
            },
            realtime: RealtimeConfig::default(),
            display: ProjectionOptions::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate `config/courtside.toml` relative to `base_dir`.
///
/// Does not copy defaults; `load_config()` does that first.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let path = base_dir.join("config").join(CONFIG_FILE);
    let text = read_file(&path)?;
    let config = parse_config(&text, &path)?;
    validate(&config)?;
    Ok(config)
}

/// Parse config text. `path` is only used for error reporting.
pub fn parse_config(text: &str, path: &Path) -> Result<Config, ConfigError> {
    toml::from_str(text).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Copy `defaults/courtside.toml` to `config/` unless a config file is
/// already there. Returns the path written, if any.
pub fn ensure_config_file(base_dir: &Path) -> Result<Option<PathBuf>, ConfigError> {
    let target = base_dir.join("config").join(CONFIG_FILE);
    if target.exists() {
        return Ok(None);
    }
    let source = base_dir.join("defaults").join(CONFIG_FILE);
    if !source.exists() {
        return Err(ConfigError::DefaultsCopyError {
            message: format!(
                "no {CONFIG_FILE} in config/ or defaults/ under {}",
                base_dir.display()
            ),
        });
    }

    let copy = || -> std::io::Result<()> {
        std::fs::create_dir_all(base_dir.join("config"))?;
        std::fs::copy(&source, &target)?;
        Ok(())
    };
    copy().map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to copy {}: {e}", source.display()),
    })?;
    Ok(Some(target))
}

/// Loads config relative to the current working directory, copying
/// defaults first.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    ensure_config_file(&cwd)?;
    load_config_from(&cwd)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

pub fn validate(config: &Config) -> Result<(), ConfigError> {
    check_url("server.api_url", &config.server.api_url, &["http://", "https://"])?;
    check_url("server.ws_url", &config.server.ws_url, &["ws://", "wss://"])?;

    if config.realtime.reconnection_attempts == 0 {
        return Err(ConfigError::ValidationError {
            field: "realtime.reconnection_attempts".into(),
            message: "must be > 0".into(),
        });
    }

    if config.realtime.event_buffer == 0 {
        return Err(ConfigError::ValidationError {
            field: "realtime.event_buffer".into(),
            message: "must be > 0".into(),
        });
    }

    Ok(())
}

fn check_url(field: &str, url: &str, schemes: &[&str]) -> Result<(), ConfigError> {
    if url.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            field: field.to_string(),
            message: "must not be empty".into(),
        });
    }
    if !schemes.iter().any(|s| url.starts_with(s)) {
        return Err(ConfigError::ValidationError {
            field: field.to_string(),
            message: format!("must start with {}, got `{url}`", schemes.join(" or ")),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
