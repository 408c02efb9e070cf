//! Configuration loading and resolution
//!
//! Every setting is resolved with the same priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! A missing config file is not an error: the client starts with defaults
//! and logs a warning. A config file that exists but does not parse is.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const ENV_API_URL: &str = "KEYTRACK_API_URL";
pub const ENV_TOKEN: &str = "KEYTRACK_TOKEN";
pub const ENV_SITE_URL: &str = "KEYTRACK_SITE_URL";
pub const ENV_LOG_LEVEL: &str = "KEYTRACK_LOG_LEVEL";

/// Config file contents
///
/// All fields are optional so a partial file only overrides what it names.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    /// Analysis API base URL (scheme + host, no trailing path)
    #[serde(default)]
    pub api_base_url: Option<String>,

    /// Bearer token attached to uploads
    #[serde(default)]
    pub token: Option<String>,

    /// Site the redirect path is joined to for display
    #[serde(default)]
    pub site_base_url: Option<String>,

    /// Abort the stream when no chunk arrives for this many seconds
    #[serde(default)]
    pub chunk_timeout_secs: Option<u64>,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Compiled defaults used when no other source provides a value
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub api_base_url: String,
    pub log_level: String,
}

impl Default for CompiledDefaults {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:8000".to_string(),
            log_level: default_log_level(),
        }
    }
}

/// Values given on the command line
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub api_base_url: Option<String>,
    pub token: Option<String>,
    pub site_base_url: Option<String>,
    pub chunk_timeout_secs: Option<u64>,
    pub log_level: Option<String>,
}

/// Fully resolved client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL without trailing slash
    pub api_base_url: String,
    /// Bearer token; `None` means the request is sent unauthenticated
    pub token: Option<String>,
    pub site_base_url: Option<String>,
    /// `None` means a stalled stream blocks indefinitely
    pub chunk_timeout: Option<Duration>,
    pub log_level: String,
}

impl ClientConfig {
    /// Resolve every setting from CLI → ENV → TOML → compiled default
    pub fn resolve(cli: &CliOverrides, toml_config: &TomlConfig) -> Result<Self> {
        let defaults = CompiledDefaults::default();

        let api_base_url = first_valid(
            "api_base_url",
            [
                ("command line", cli.api_base_url.clone()),
                ("environment", env_value(ENV_API_URL)),
                ("TOML", toml_config.api_base_url.clone()),
            ],
        )
        .unwrap_or(defaults.api_base_url);
        let api_base_url = normalize_base_url(&api_base_url)?;

        let token = resolve_token(cli, toml_config);

        let site_base_url = first_valid(
            "site_base_url",
            [
                ("command line", cli.site_base_url.clone()),
                ("environment", env_value(ENV_SITE_URL)),
                ("TOML", toml_config.site_base_url.clone()),
            ],
        )
        .map(|url| normalize_base_url(&url))
        .transpose()?;

        let chunk_timeout = match cli.chunk_timeout_secs.or(toml_config.chunk_timeout_secs) {
            Some(0) => {
                return Err(Error::Config(
                    "chunk_timeout_secs must be greater than zero".to_string(),
                ))
            }
            Some(secs) => Some(Duration::from_secs(secs)),
            None => None,
        };

        let log_level = first_valid(
            "log_level",
            [
                ("command line", cli.log_level.clone()),
                ("environment", env_value(ENV_LOG_LEVEL)),
                ("TOML", Some(toml_config.logging.level.clone())),
            ],
        )
        .unwrap_or(defaults.log_level);

        Ok(Self {
            api_base_url,
            token,
            site_base_url,
            chunk_timeout,
            log_level,
        })
    }

    /// Full URL of the analysis endpoint
    pub fn analyse_url(&self) -> String {
        format!("{}/api/v1/analyse", self.api_base_url)
    }
}

/// Resolve the bearer token, warning when more than one source sets it
fn resolve_token(cli: &CliOverrides, toml_config: &TomlConfig) -> Option<String> {
    let candidates = [
        ("command line", cli.token.clone()),
        ("environment", env_value(ENV_TOKEN)),
        ("TOML", toml_config.token.clone()),
    ];

    let sources: Vec<&str> = candidates
        .iter()
        .filter(|(_, value)| value.as_deref().is_some_and(is_valid_token))
        .map(|(source, _)| *source)
        .collect();

    if sources.len() > 1 {
        warn!(
            "Bearer token found in multiple sources: {}. Using {} (highest priority).",
            sources.join(", "),
            sources[0]
        );
    }

    let token = first_valid("token", candidates);
    if token.is_none() {
        info!("No bearer token configured; uploads will be sent unauthenticated");
    }
    token
}

/// Validate a token (non-empty, non-whitespace)
pub fn is_valid_token(token: &str) -> bool {
    !token.trim().is_empty()
}

fn first_valid<const N: usize>(
    setting: &str,
    candidates: [(&str, Option<String>); N],
) -> Option<String> {
    for (source, value) in candidates {
        if let Some(value) = value {
            if is_valid_token(&value) {
                debug!(setting, source, "Configuration value resolved");
                return Some(value.trim().to_string());
            }
        }
    }
    None
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Check scheme and strip trailing slashes
fn normalize_base_url(url: &str) -> Result<String> {
    let trimmed = url.trim().trim_end_matches('/');
    let host = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"));
    match host {
        Some(host) if !host.is_empty() => Ok(trimmed.to_string()),
        _ => Err(Error::Config(format!(
            "Base URL must be http:// or https:// followed by a host: {}",
            url
        ))),
    }
}

/// Default config file location: `<config dir>/keytrack/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("keytrack").join("config.toml"))
}

/// Load the TOML config file
///
/// An explicit path that does not exist is a configuration error. The
/// default location is optional and falls back to an empty config.
pub fn load_toml_config(explicit_path: Option<&Path>) -> Result<TomlConfig> {
    let (path, explicit) = match explicit_path {
        Some(path) => (path.to_path_buf(), true),
        None => match default_config_path() {
            Some(path) => (path, false),
            None => {
                warn!("Could not determine config directory, using defaults");
                return Ok(TomlConfig::default());
            }
        },
    };

    if !path.exists() {
        if explicit {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        warn!("Config file not found at {}, using defaults", path.display());
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(&path)?;
    let config = toml::from_str::<TomlConfig>(&content).map_err(|e| {
        Error::Config(format!("Parse TOML failed ({}): {}", path.display(), e))
    })?;
    info!("Loaded config from {}", path.display());
    Ok(config)
}
