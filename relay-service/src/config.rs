//! Configuration management for the capture relay.
//!
//! Loads configuration from TOML files and provides runtime defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::classify::DEFAULT_FILE_TYPES;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub dispatch: DispatchConfig,

    #[serde(default)]
    pub capture: CaptureConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            dispatch: DispatchConfig::default(),
            capture: CaptureConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Whether capture is enabled at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Dispatch method: auto, http, protocol, or process
    #[serde(default = "default_method")]
    pub method: String,

    /// HTTP endpoint override; the built-in default endpoint is always
    /// tried after it
    #[serde(default)]
    pub http_endpoint: Option<String>,

    /// Path to the external application binary for the process method
    #[serde(default)]
    pub process_path: String,

    /// Argument template for the process method; %URL% is substituted
    #[serde(default)]
    pub process_args: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            method: "auto".to_string(),
            http_endpoint: None,
            process_path: String::new(),
            process_args: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Capture top-level downloads at the network layer
    #[serde(default = "default_true")]
    pub auto_capture_links: bool,

    /// Space/comma separated file extensions eligible for capture
    #[serde(default = "default_file_types")]
    pub registered_file_types: String,

    /// Newline separated URL substrings the network observer skips
    #[serde(default)]
    pub ignored_url_patterns: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            auto_capture_links: true,
            registered_file_types: default_file_types(),
            ignored_url_patterns: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Path to the Unix socket the detector host connects to
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
        }
    }
}

// Default value functions for serde
fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_method() -> String {
    "auto".to_string()
}

fn default_file_types() -> String {
    DEFAULT_FILE_TYPES.to_string()
}

fn default_socket_path() -> PathBuf {
    PathBuf::from("/tmp/capture-relay.sock")
}

impl Config {
    /// Load configuration from a specific path
    pub fn load_from_path(path: PathBuf) -> Self {
        match std::fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    info!("Loaded configuration from {:?}", path);
                    config
                }
                Err(e) => {
                    warn!("Failed to parse config file: {}, using defaults", e);
                    Self::default()
                }
            },
            Err(_) => {
                info!("No config file found at {:?}, using defaults", path);
                Self::default()
            }
        }
    }

    /// Get the default configuration file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("capture-relay")
            .join("config.toml")
    }

    /// Save configuration to a specific path
    pub fn save_to_path(&self, path: PathBuf) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;

        std::fs::write(&path, contents)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// One-time migration from the flat `key=value` settings file older
    /// installations wrote. Runs only when no TOML config exists yet, so an
    /// already-migrated (or hand-written) config is never overwritten.
    pub fn import_legacy(legacy_path: &Path, config_path: PathBuf) -> Self {
        if config_path.exists() {
            return Self::load_from_path(config_path);
        }

        let mut config = Self::default();
        let contents = match std::fs::read_to_string(legacy_path) {
            Ok(contents) => contents,
            Err(_) => return config,
        };

        info!("Importing legacy settings from {:?}", legacy_path);
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let (key, value) = (key.trim(), value.trim());
            match key {
                "method" => config.dispatch.method = value.to_string(),
                "http_endpoint" => {
                    if !value.is_empty() {
                        config.dispatch.http_endpoint = Some(value.to_string());
                    }
                }
                "process_path" => config.dispatch.process_path = value.to_string(),
                "process_args" => config.dispatch.process_args = value.to_string(),
                "autoCaptureLinks" => {
                    config.capture.auto_capture_links = value.eq_ignore_ascii_case("true")
                }
                "registeredFileTypes" => {
                    if !value.is_empty() {
                        config.capture.registered_file_types = value.to_string();
                    }
                }
                "ignoredUrlPatterns" => {
                    // The legacy file stored newlines escaped
                    config.capture.ignored_url_patterns = value.replace("\\n", "\n");
                }
                other => warn!("Ignoring unknown legacy setting: {}", other),
            }
        }

        if let Err(e) = config.save_to_path(config_path) {
            warn!("Failed to persist imported configuration: {}", e);
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.general.enabled);
        assert_eq!(config.dispatch.method, "auto");
        assert!(config.capture.auto_capture_links);
        assert!(config.capture.registered_file_types.contains("zip"));
    }

    #[test]
    fn test_parse_toml() {
        let toml_str = r#"
[general]
enabled = true
log_level = "debug"

[dispatch]
method = "http"
http_endpoint = "http://127.0.0.1:9666/jsonrpc"

[capture]
registered_file_types = "zip iso"
"#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.dispatch.method, "http");
        assert_eq!(
            config.dispatch.http_endpoint.as_deref(),
            Some("http://127.0.0.1:9666/jsonrpc")
        );
        assert_eq!(config.capture.registered_file_types, "zip iso");
        // Untouched sections fall back to defaults
        assert!(config.capture.auto_capture_links);
        assert_eq!(config.server.socket_path, default_socket_path());
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.dispatch.method = "process".to_string();
        config.dispatch.process_path = "/usr/bin/downloader".to_string();
        config.dispatch.process_args = "--add %URL%".to_string();
        config.save_to_path(path.clone()).unwrap();

        let loaded = Config::load_from_path(path);
        assert_eq!(loaded.dispatch.method, "process");
        assert_eq!(loaded.dispatch.process_path, "/usr/bin/downloader");
        assert_eq!(loaded.dispatch.process_args, "--add %URL%");
    }

    #[test]
    fn test_legacy_import() {
        let dir = tempfile::tempdir().unwrap();
        let legacy = dir.path().join("settings.properties");
        let config_path = dir.path().join("config.toml");

        std::fs::write(
            &legacy,
            "method=http\nhttp_endpoint=http://localhost:7151/add\n\
             autoCaptureLinks=false\nregisteredFileTypes=zip exe\n\
             ignoredUrlPatterns=ads.example\\ncdn.tracker\nunknownKey=x\n",
        )
        .unwrap();

        let config = Config::import_legacy(&legacy, config_path.clone());
        assert_eq!(config.dispatch.method, "http");
        assert_eq!(
            config.dispatch.http_endpoint.as_deref(),
            Some("http://localhost:7151/add")
        );
        assert!(!config.capture.auto_capture_links);
        assert_eq!(config.capture.registered_file_types, "zip exe");
        assert_eq!(
            config.capture.ignored_url_patterns,
            "ads.example\ncdn.tracker"
        );
        // Migration persisted the TOML file
        assert!(config_path.exists());
    }

    #[test]
    fn test_legacy_import_never_overwrites_existing() {
        let dir = tempfile::tempdir().unwrap();
        let legacy = dir.path().join("settings.properties");
        let config_path = dir.path().join("config.toml");

        let mut existing = Config::default();
        existing.dispatch.method = "protocol".to_string();
        existing.save_to_path(config_path.clone()).unwrap();

        std::fs::write(&legacy, "method=http\n").unwrap();

        let config = Config::import_legacy(&legacy, config_path);
        assert_eq!(config.dispatch.method, "protocol");
    }

    #[test]
    fn test_legacy_import_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::import_legacy(
            &dir.path().join("nope.properties"),
            dir.path().join("config.toml"),
        );
        assert_eq!(config.dispatch.method, "auto");
    }
}
