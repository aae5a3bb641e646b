//! Common types, errors, and configuration for wasm-cgi.
//!
//! This crate provides shared functionality used across the wasm-cgi workspace:
//! - Error types using `thiserror` for type-safe error handling
//! - Configuration structures for engine and execution settings
//! - The TOML configuration file format

pub mod config;
pub mod config_file;
pub mod error;

pub use config::{EngineConfig, ExecutionConfig, RuntimeConfig};
pub use config_file::{ConfigFile, ConfigFileError, ModulesConfig, ServerConfigFile};
pub use error::RuntimeError;
