//! Configuration File Loading
//!
//! Finds, loads, validates and saves `tictacplot` configuration files in
//! TOML or JSON, falling back to defaults when nothing is found.

use super::Config;
use crate::error::{Error, Result};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Base file name searched for in every search path
const CONFIG_FILE_STEM: &str = "tictacplot";

/// Configuration file loader
pub struct ConfigLoader {
    /// Search paths for configuration files
    search_paths: Vec<PathBuf>,
    /// Supported configuration file formats
    supported_formats: Vec<ConfigFormat>,
    /// Current configuration file path (if loaded)
    current_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConfigFormat {
    /// TOML format
    Toml,
    /// JSON format
    Json,
}

impl ConfigFormat {
    fn name(self) -> &'static str {
        match self {
            ConfigFormat::Toml => "TOML",
            ConfigFormat::Json => "JSON",
        }
    }

    fn extension(self) -> &'static str {
        match self {
            ConfigFormat::Toml => "toml",
            ConfigFormat::Json => "json",
        }
    }

    /// Guess a format from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Some(ConfigFormat::Toml),
            Some("json") => Some(ConfigFormat::Json),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Whether to fall back to the default config if none exists
    pub create_default: bool,
    /// Whether to validate configuration after loading
    pub validate: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            create_default: true,
            validate: true,
        }
    }
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self {
            search_paths: Self::get_search_paths(),
            supported_formats: vec![ConfigFormat::Toml, ConfigFormat::Json],
            current_path: None,
        }
    }

    /// Load configuration with default options
    pub fn load() -> Result<Config> {
        Self::new().load_with_options(LoadOptions::default())
    }

    /// Load configuration from the search paths with custom options
    pub fn load_with_options(&mut self, options: LoadOptions) -> Result<Config> {
        if let Some((path, config)) = self.find_and_load_config()? {
            debug!("Loaded configuration from {}", path.display());
            self.current_path = Some(path);
            if options.validate {
                validate_config(&config)?;
            }
            return Ok(config);
        }

        if options.create_default {
            let config = Config::default();
            if options.validate {
                validate_config(&config)?;
            }
            Ok(config)
        } else {
            Err(Error::ConfigNotFound)
        }
    }

    /// Load and validate one explicit configuration file
    pub fn load_from_path(path: &Path) -> Result<Config> {
        if !path.exists() {
            return Err(Error::ConfigLoadFailed {
                path: path.to_path_buf(),
                reason: "file does not exist".to_string(),
            });
        }
        let format = ConfigFormat::from_path(path).unwrap_or(ConfigFormat::Toml);
        let config = load_config_file(path, format)?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Save configuration to the current path or default location
    pub fn save(&self, config: &Config) -> Result<PathBuf> {
        let path = self
            .current_path
            .clone()
            .unwrap_or_else(Self::get_default_config_path);
        self.save_to_path(config, &path)?;
        Ok(path)
    }

    /// Save configuration to a specific path; format follows the extension
    pub fn save_to_path(&self, config: &Config, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = match ConfigFormat::from_path(path).unwrap_or(ConfigFormat::Toml) {
            ConfigFormat::Json => serde_json::to_string_pretty(config).map_err(|e| {
                Error::ConfigSerializationFailed {
                    format: ConfigFormat::Json.name().to_string(),
                    reason: e.to_string(),
                }
            })?,
            ConfigFormat::Toml => {
                toml::to_string_pretty(config).map_err(|e| Error::ConfigSerializationFailed {
                    format: ConfigFormat::Toml.name().to_string(),
                    reason: e.to_string(),
                })?
            }
        };

        fs::write(path, content)?;
        Ok(())
    }

    /// Find and load configuration from search paths
    fn find_and_load_config(&self) -> Result<Option<(PathBuf, Config)>> {
        for dir in &self.search_paths {
            for format in &self.supported_formats {
                let config_path = dir.join(CONFIG_FILE_STEM).with_extension(format.extension());

                if config_path.exists() {
                    match load_config_file(&config_path, *format) {
                        Ok(config) => return Ok(Some((config_path, config))),
                        Err(e) => {
                            // Keep searching; a broken file should not hide a good one
                            warn!("Failed to load config from {}: {}", config_path.display(), e);
                            continue;
                        }
                    }
                }
            }
        }

        Ok(None)
    }

    /// Get default search paths for configuration files
    fn get_search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        // Current working directory first so a project-local file wins
        if let Ok(cwd) = env::current_dir() {
            paths.push(cwd);
        }

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("tictacplot"));
        }

        if let Ok(xdg_config) = env::var("XDG_CONFIG_HOME") {
            paths.push(PathBuf::from(xdg_config).join("tictacplot"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".tictacplot"));
        }

        paths
    }

    /// Get the default configuration path
    fn get_default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tictacplot")
            .join("tictacplot.toml")
    }

    /// Get the current configuration file path
    pub fn current_path(&self) -> Option<&Path> {
        self.current_path.as_deref()
    }

    /// List all search paths
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Add a custom search path
    pub fn add_search_path(&mut self, path: PathBuf) {
        self.search_paths.push(path);
    }

    /// Clear all search paths and add a single path
    pub fn set_search_path(&mut self, path: PathBuf) {
        self.search_paths = vec![path];
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Load a specific configuration file
fn load_config_file(path: &Path, format: ConfigFormat) -> Result<Config> {
    let content = fs::read_to_string(path).map_err(|e| Error::ConfigLoadFailed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    match format {
        ConfigFormat::Toml => toml::from_str(&content).map_err(|e| Error::ConfigParseFailed {
            format: format.name().to_string(),
            reason: e.to_string(),
        }),
        ConfigFormat::Json => serde_json::from_str(&content).map_err(|e| Error::ConfigParseFailed {
            format: format.name().to_string(),
            reason: e.to_string(),
        }),
    }
}

fn invalid(field: &str, reason: &str) -> Error {
    Error::ConfigValidationFailed {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    // Link validation
    if config.link.port.trim().is_empty() {
        return Err(invalid("link.port", "Port cannot be empty"));
    }

    if config.link.baud_rate == 0 {
        return Err(invalid("link.baud_rate", "Baud rate must be greater than 0"));
    }

    if config.link.read_timeout_ms == 0 {
        return Err(invalid(
            "link.read_timeout_ms",
            "Read timeout must be greater than 0",
        ));
    }

    // Dispatch validation
    if config.dispatch.retry_max == 0 {
        return Err(invalid(
            "dispatch.retry_max",
            "At least one send attempt is required",
        ));
    }

    if config.dispatch.response_window_ms == 0 {
        return Err(invalid(
            "dispatch.response_window_ms",
            "Response window must be greater than 0",
        ));
    }

    // Gate validation
    if config.gate.status_query.trim().is_empty() {
        return Err(invalid("gate.status_query", "Status query cannot be empty"));
    }

    if config.gate.poll_interval_ms == 0 {
        return Err(invalid(
            "gate.poll_interval_ms",
            "Poll interval must be greater than 0",
        ));
    }

    if config.gate.max_wait_ms < config.gate.poll_interval_ms {
        return Err(invalid(
            "gate.max_wait_ms",
            "Maximum wait must cover at least one poll interval",
        ));
    }

    // Pen validation
    if !(config.pen.up_z < 0.0) {
        return Err(invalid("pen.up_z", "Pen-up Z must be negative"));
    }

    if !(config.pen.down_z >= 0.0) {
        return Err(invalid("pen.down_z", "Pen-down Z cannot be negative"));
    }

    if !(config.pen.feed_rate > 0.0) {
        return Err(invalid("pen.feed_rate", "Feed rate must be positive"));
    }

    // Response token validation
    if config.responses.ack.is_empty() {
        return Err(invalid("responses.ack", "Acknowledgment token cannot be empty"));
    }

    if config.responses.idle.is_empty() {
        return Err(invalid("responses.idle", "Idle token cannot be empty"));
    }

    // Session validation
    if config.session.deadline_secs == Some(0) {
        return Err(invalid(
            "session.deadline_secs",
            "Deadline must be greater than 0 when set",
        ));
    }

    Ok(())
}
