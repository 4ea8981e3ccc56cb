//! Configuration management for NutriMap.
//!
//! This module provides the configuration system for the map subsystem and
//! the command line front end:
//! - Loading from YAML files
//! - Environment variable overrides (`NUTRIMAP__SECTION__FIELD`)
//! - Validation of all settings
//!
//! The access token lives here rather than in ambient global state; the map
//! controller receives it explicitly at construction.

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::Level;

/// Token value shipped in sample configuration files. Treated as "no token".
pub const PLACEHOLDER_TOKEN: &str = "REPLACE_WITH_TOKEN";

/// Returns the token if it is usable: non-blank and not the placeholder.
pub fn usable_token(token: Option<&str>) -> Option<&str> {
    token
        .map(str::trim)
        .filter(|t| !t.is_empty() && *t != PLACEHOLDER_TOKEN)
}

/// Main application configuration.
///
/// # Examples
///
/// ```
/// use nutrimap_core::config::AppConfig;
///
/// let config = AppConfig::from_yaml("map:\n  access_token: abc123\n").unwrap();
/// assert_eq!(config.map.access_token.as_deref(), Some("abc123"));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Surface and basemap settings
    #[serde(default)]
    pub map: MapConfig,

    /// Container readiness wait
    #[serde(default)]
    pub readiness: ReadinessConfig,

    /// Forced size re-validation schedule
    #[serde(default)]
    pub revalidation: RevalidationConfig,

    /// Boundary overlay and country summaries
    #[serde(default)]
    pub overlay: OverlayConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.display().to_string(),
            }
            .into());
        }

        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        Self::from_yaml(&contents)
    }

    /// Loads configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML cannot be parsed.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| {
            ConfigError::InvalidFormat {
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Loads configuration using the `config` crate, layering environment
    /// variables (`NUTRIMAP__MAP__ACCESS_TOKEN=...`) over an optional file.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded or merged.
    pub fn from_config_builder(path: Option<&Path>) -> Result<Self> {
        let display = path
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<environment>".to_string());

        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix("NUTRIMAP")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigError::LoadFailed {
                path: display,
                reason: e.to_string(),
            })?;

        config.try_deserialize().map_err(|e| {
            ConfigError::InvalidFormat {
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any section is invalid.
    pub fn validate(&self) -> Result<()> {
        self.map.validate()?;
        self.readiness.validate()?;
        self.overlay.validate()?;
        self.logging.parse_level()?;
        Ok(())
    }
}

/// Surface and basemap settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapConfig {
    /// Branded tile provider access token; absent, empty or the placeholder
    /// value selects the open fallback provider
    #[serde(default)]
    pub access_token: Option<String>,

    /// Initial view center `[lat, lng]`
    #[serde(default = "default_center")]
    pub initial_center: [f64; 2],

    /// Initial zoom level
    #[serde(default = "default_zoom")]
    pub initial_zoom: f64,

    /// Fill colour of the generic marker glyph
    #[serde(default = "default_marker_color")]
    pub marker_color: String,

    /// Add a metric scale control to the surface
    #[serde(default = "default_true")]
    pub scale_control: bool,
}

fn default_center() -> [f64; 2] {
    [20.0, 0.0]
}

fn default_zoom() -> f64 {
    2.0
}

fn default_marker_color() -> String {
    "#2a81cb".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            access_token: None,
            initial_center: default_center(),
            initial_zoom: default_zoom(),
            marker_color: default_marker_color(),
            scale_control: true,
        }
    }
}

impl MapConfig {
    /// The access token, if it is usable (non-empty and not the placeholder).
    pub fn effective_token(&self) -> Option<&str> {
        usable_token(self.access_token.as_deref())
    }

    pub fn validate(&self) -> Result<()> {
        let [lat, lng] = self.initial_center;
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
            return Err(ConfigError::invalid_value(
                "map.initial_center",
                format!("[{}, {}] is outside the valid lat/lng range", lat, lng),
            )
            .into());
        }
        if !(0.0..=24.0).contains(&self.initial_zoom) {
            return Err(ConfigError::invalid_value(
                "map.initial_zoom",
                format!("{} is outside 0..=24", self.initial_zoom),
            )
            .into());
        }
        Ok(())
    }
}

/// Container readiness wait settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessConfig {
    /// Delay between readiness checks in milliseconds
    #[serde(default = "default_poll_interval")]
    pub interval_ms: u64,

    /// Maximum number of readiness checks
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Create the surface anyway when the container never reports a size
    #[serde(default = "default_true")]
    pub proceed_when_unsized: bool,
}

fn default_poll_interval() -> u64 {
    100
}

fn default_max_attempts() -> u32 {
    20
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_poll_interval(),
            max_attempts: default_max_attempts(),
            proceed_when_unsized: true,
        }
    }
}

impl ReadinessConfig {
    /// Returns the poll interval as a Duration.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.interval_ms == 0 {
            return Err(ConfigError::invalid_value("readiness.interval_ms", "must be > 0").into());
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::invalid_value("readiness.max_attempts", "must be > 0").into());
        }
        Ok(())
    }
}

/// Forced size re-validation after surface creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevalidationConfig {
    /// Delays after creation, in milliseconds
    #[serde(default = "default_revalidation_delays")]
    pub delays_ms: Vec<u64>,

    /// Re-validate on every resize event
    #[serde(default = "default_true")]
    pub on_resize: bool,
}

fn default_revalidation_delays() -> Vec<u64> {
    vec![100, 500, 1000, 2000, 4000]
}

impl Default for RevalidationConfig {
    fn default() -> Self {
        Self {
            delays_ms: default_revalidation_delays(),
            on_resize: true,
        }
    }
}

impl RevalidationConfig {
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        self.delays_ms.iter().copied().map(Duration::from_millis)
    }
}

/// Boundary overlay settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlayConfig {
    /// Whether the boundary overlay is loaded at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// GeoJSON FeatureCollection of country boundaries
    #[serde(default = "default_boundaries_url")]
    pub url: String,

    /// Country names that receive highlighted styling
    #[serde(default = "default_highlight")]
    pub highlight: Vec<String>,

    /// Fetch timeout in milliseconds
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_ms: u64,

    /// Optional per-country summary dataset for secondary markers
    #[serde(default)]
    pub summaries: Option<PathBuf>,
}

fn default_boundaries_url() -> String {
    "https://raw.githubusercontent.com/johan/world.geo.json/master/countries.geo.json".to_string()
}

fn default_highlight() -> Vec<String> {
    [
        "usa",
        "united states",
        "united states of america",
        "india",
        "mexico",
        "uk",
        "united kingdom",
        "south africa",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_fetch_timeout() -> u64 {
    15_000
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: default_boundaries_url(),
            highlight: default_highlight(),
            fetch_timeout_ms: default_fetch_timeout(),
            summaries: None,
        }
    }
}

impl OverlayConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.enabled && self.url.trim().is_empty() {
            return Err(ConfigError::invalid_value("overlay.url", "must not be empty").into());
        }
        if self.fetch_timeout_ms == 0 {
            return Err(
                ConfigError::invalid_value("overlay.fetch_timeout_ms", "must be > 0").into(),
            );
        }
        Ok(())
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "text" or "json"
    #[serde(default = "default_log_format")]
    pub format: LogFormat,

    /// Per-module log levels
    #[serde(default)]
    pub module_levels: HashMap<String, String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Text
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Text,
            module_levels: HashMap::new(),
        }
    }
}

impl LoggingConfig {
    /// Parses the log level string to a tracing Level.
    pub fn parse_level(&self) -> Result<Level> {
        self.level.parse().map_err(|_| {
            ConfigError::invalid_value("logging.level", format!("Invalid log level: {}", self.level))
                .into()
        })
    }

    /// Builds an `EnvFilter`-compatible directive string.
    pub fn filter_directives(&self) -> String {
        let mut modules: Vec<_> = self.module_levels.iter().collect();
        modules.sort();

        std::iter::once(self.level.clone())
            .chain(modules.into_iter().map(|(m, l)| format!("{}={}", m, l)))
            .collect::<Vec<_>>()
            .join(",")
    }
}
