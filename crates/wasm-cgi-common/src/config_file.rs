//! Configuration file structures for wasm-cgi.
//!
//! This module defines structures for TOML configuration files:
//! - [`ConfigFile`]: Top-level configuration file structure
//! - [`ServerConfigFile`]: HTTP server settings
//! - [`ModulesConfig`]: Where module artifacts are discovered

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::RuntimeConfig;

/// Top-level configuration file structure.
///
/// # Example
///
/// ```toml
/// [runtime.engine]
/// pooling_allocator = true
/// cache_dir = "/var/cache/wasm-cgi"
///
/// [runtime.execution]
/// timeout_ms = 50
///
/// [runtime.execution.module_timeouts]
/// report = 500
///
/// [server]
/// port = 8080
///
/// [modules]
/// root = "./modules"
/// artifact_name = "main.wasm"
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ConfigFile {
    /// Runtime configuration (engine + execution settings).
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfigFile,

    /// Module discovery configuration.
    #[serde(default)]
    pub modules: ModulesConfig,
}

impl ConfigFile {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigFileError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigFileError::Io {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string cannot be parsed as TOML.
    pub fn from_toml(content: &str) -> Result<Self, ConfigFileError> {
        toml::from_str(content).map_err(|e| ConfigFileError::Parse {
            message: e.to_string(),
        })
    }
}

/// HTTP server configuration from config file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfigFile {
    /// Interface to listen on.
    #[serde(default = "defaults::host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "defaults::port")]
    pub port: u16,

    /// Whole-request timeout in seconds (HTTP layer, independent of module deadlines).
    #[serde(default = "defaults::request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Enable graceful shutdown.
    #[serde(default = "defaults::graceful_shutdown")]
    pub graceful_shutdown: bool,
}

impl Default for ServerConfigFile {
    fn default() -> Self {
        Self {
            host: defaults::host(),
            port: defaults::port(),
            request_timeout_secs: defaults::request_timeout_secs(),
            graceful_shutdown: defaults::graceful_shutdown(),
        }
    }
}

impl ServerConfigFile {
    /// The `host:port` string to bind.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Module discovery settings.
///
/// Each module lives in its own directory: `<root>/**/<name>/<artifact_name>`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModulesConfig {
    /// Directory searched recursively for module artifacts.
    #[serde(default = "defaults::modules_root")]
    pub root: String,

    /// File name every module artifact must have.
    #[serde(default = "defaults::artifact_name")]
    pub artifact_name: String,
}

impl Default for ModulesConfig {
    fn default() -> Self {
        Self {
            root: defaults::modules_root(),
            artifact_name: defaults::artifact_name(),
        }
    }
}

/// Configuration file errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    /// Failed to read configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse configuration file.
    #[error("Failed to parse config file: {message}")]
    Parse { message: String },
}

/// Default value functions for serde.
mod defaults {
    pub fn host() -> String {
        "0.0.0.0".to_string()
    }

    pub const fn port() -> u16 {
        8080
    }

    pub const fn request_timeout_secs() -> u64 {
        30
    }

    pub const fn graceful_shutdown() -> bool {
        true
    }

    pub fn modules_root() -> String {
        "modules".to_string()
    }

    pub fn artifact_name() -> String {
        "main.wasm".to_string()
    }
}
