//! Service configuration module.
//!
//! Handles loading, validating, and merging `pixgate.toml`. Stock defaults
//! form the base layer and the user file is merged on top, so a config file
//! only needs the keys it wants to change.
//!
//! ## Config File Location
//!
//! `pixgate.toml` in the working directory, or any file passed with
//! `--config`. With neither, the stock defaults apply.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [server]
//! listen = "127.0.0.1:3000"                          # Socket address to bind
//! api_route_url = "http://127.0.0.1:3000/api/image"  # Public URL of the image route
//! cache_control = "public, max-age=31536000, immutable"
//!
//! [cache]
//! dir = ".transform-cache"  # Relative paths resolve against the working directory
//!
//! [sources]
//! # allowed_hosts = ["images.example.com", "*.cdn.example.com"]
//!
//! [fetch]
//! timeout_secs = 30         # Whole upstream exchange, redirects included
//! max_bytes = 52428800      # Largest accepted source body
//! max_redirects = 10
//!
//! [processing]
//! max_processes = 4         # Max transform workers (omit for auto = CPU cores)
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::cache::DEFAULT_CACHE_DIR;
use crate::fetch::FetchLimits;
use crate::handler::DEFAULT_CACHE_CONTROL;
use crate::validate::{PatternError, SourceValidator};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Config file picked up from the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "pixgate.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

impl From<PatternError> for ConfigError {
    fn from(e: PatternError) -> Self {
        ConfigError::Validation(format!("sources.allowed_hosts: {e}"))
    }
}

/// Service configuration loaded from `pixgate.toml`.
///
/// All fields have defaults. Unknown keys are rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Listener, public route URL, and response headers.
    pub server: ServerConfig,
    /// Disk cache location.
    pub cache: CacheConfig,
    /// Which upstream hosts may be fetched.
    pub sources: SourcesConfig,
    /// Upstream fetch limits.
    pub fetch: FetchConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

impl Config {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.listen_addr()?;
        self.server.route_url()?;
        if self.server.cache_control.trim().is_empty() {
            return Err(ConfigError::Validation(
                "server.cache_control must not be empty".into(),
            ));
        }
        if self.fetch.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "fetch.timeout_secs must be positive".into(),
            ));
        }
        if self.fetch.max_bytes == 0 {
            return Err(ConfigError::Validation(
                "fetch.max_bytes must be positive".into(),
            ));
        }
        self.sources.validator()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub listen: String,
    /// Absolute URL the image route is reachable at. Its path is the route
    /// the server mounts, and it is the base for every canonical URL.
    pub api_route_url: String,
    pub cache_control: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:3000".to_string(),
            api_route_url: "http://127.0.0.1:3000/api/image".to_string(),
            cache_control: DEFAULT_CACHE_CONTROL.to_string(),
        }
    }
}

impl ServerConfig {
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen.parse().map_err(|e| {
            ConfigError::Validation(format!("server.listen '{}': {}", self.listen, e))
        })
    }

    pub fn route_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.api_route_url).map_err(|e| {
            ConfigError::Validation(format!(
                "server.api_route_url '{}': {}",
                self.api_route_url, e
            ))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Validation(
                "server.api_route_url must be an http(s) URL".into(),
            ));
        }
        Ok(url)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    pub dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_CACHE_DIR),
        }
    }
}

impl CacheConfig {
    /// Cache root with relative paths resolved against `cwd`.
    pub fn resolve_dir(&self, cwd: &Path) -> PathBuf {
        cwd.join(&self.dir)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourcesConfig {
    /// Host allowlist. Absent allows every host; an empty list allows none.
    pub allowed_hosts: Option<Vec<String>>,
}

impl SourcesConfig {
    pub fn validator(&self) -> Result<SourceValidator, PatternError> {
        SourceValidator::new(self.allowed_hosts.as_deref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FetchConfig {
    pub timeout_secs: u64,
    pub max_bytes: u64,
    pub max_redirects: usize,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        let limits = FetchLimits::default();
        Self {
            timeout_secs: limits.timeout.as_secs(),
            max_bytes: limits.max_bytes,
            max_redirects: limits.max_redirects,
            user_agent: limits.user_agent,
        }
    }
}

impl FetchConfig {
    pub fn limits(&self) -> FetchLimits {
        FetchLimits {
            timeout: Duration::from_secs(self.timeout_secs),
            max_bytes: self.max_bytes,
            max_redirects: self.max_redirects,
            user_agent: self.user_agent.clone(),
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel transform workers.
    /// When absent or null, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(Config::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<Config, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: Config = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from a file, falling back to stock defaults when it is absent.
///
/// Merges user values on top of stock defaults, rejects unknown keys,
/// and validates the result.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let base = stock_defaults_value()?;
    let overlay = load_raw_config(path)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `pixgate.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# pixgate Configuration
# =====================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# HTTP server
# ---------------------------------------------------------------------------
[server]
# Socket address the server binds to.
listen = "127.0.0.1:3000"

# Public absolute URL of the image route. Its path is where the route is
# mounted, and canonical URLs (and therefore cache keys) are built on it.
# Changing it invalidates every cached entry.
api_route_url = "http://127.0.0.1:3000/api/image"

# Cache-Control header sent with every transformed image.
cache_control = "public, max-age=31536000, immutable"

# ---------------------------------------------------------------------------
# Disk cache
# ---------------------------------------------------------------------------
[cache]
# Root directory for cached transforms. Relative to the working directory.
dir = ".transform-cache"

# ---------------------------------------------------------------------------
# Source allowlist
# ---------------------------------------------------------------------------
[sources]
# Hosts that may be fetched. Leave unset to allow any http(s) host; an empty
# list blocks everything. Entries are matched case-insensitively against the
# hostname and, for non-default ports, against "host:port":
#   "images.example.com"          exact host
#   "images.example.com:8443"     exact host and port
#   "*.cdn.example.com"           glob, * matches any run of characters
#   "re:^img[0-9]+\\.example\\.org$"  regular expression
# allowed_hosts = ["images.example.com"]

# ---------------------------------------------------------------------------
# Upstream fetching
# ---------------------------------------------------------------------------
[fetch]
# Deadline for the whole upstream exchange, redirects included.
timeout_secs = 30

# Largest source body accepted, in bytes (50 MiB).
max_bytes = 52428800

# Redirect hops followed. Each hop is re-checked against [sources].
max_redirects = 10

# User-Agent sent upstream. Defaults to "pixgate/<version>".
# user_agent = "pixgate"

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel transform workers. Omit to auto-detect (= CPU cores).
# Values above the core count are clamped down.
# max_processes = 4
"##
}
