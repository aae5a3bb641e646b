//! Configuration structures for wasm-cgi.
//!
//! This module defines configuration options for the two layers of the runtime:
//! - [`RuntimeConfig`]: Top-level configuration containing all settings
//! - [`EngineConfig`]: Wasmtime engine settings (pooling, compilation cache, epochs)
//! - [`ExecutionConfig`]: Per-request execution limits (timeouts, buffers)

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level runtime configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RuntimeConfig {
    /// Wasmtime engine configuration.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Per-request execution configuration.
    #[serde(default)]
    pub execution: ExecutionConfig,
}

/// Wasmtime engine configuration.
///
/// These settings are process-wide and shared by every instantiation.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Enable pooling allocator for fast instance creation.
    ///
    /// When enabled, memory slots are reserved up front for a pool of
    /// instances so per-request instantiation does not hit the system allocator.
    #[serde(default = "defaults::pooling_allocator")]
    pub pooling_allocator: bool,

    /// Maximum concurrent instances in the pool.
    ///
    /// Only effective when `pooling_allocator` is enabled.
    #[serde(default = "defaults::max_instances")]
    pub max_instances: u32,

    /// Memory per instance slot in megabytes.
    #[serde(default = "defaults::instance_memory_mb")]
    pub instance_memory_mb: u32,

    /// Enable the on-disk compilation cache.
    ///
    /// Compiled code is keyed by module content, so restarts and identical
    /// modules skip recompilation. A missing or unusable cache is tolerated.
    #[serde(default = "defaults::cache_compiled_modules")]
    pub cache_compiled_modules: bool,

    /// Directory for the compilation cache.
    ///
    /// Only effective when `cache_compiled_modules` is enabled.
    #[serde(default = "defaults::cache_dir")]
    pub cache_dir: Option<String>,

    /// Interval between epoch increments in milliseconds.
    ///
    /// Running guests yield back to the executor on every tick, which is
    /// what lets a deadline interrupt a module stuck in a CPU loop.
    #[serde(default = "defaults::epoch_tick_ms")]
    pub epoch_tick_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pooling_allocator: defaults::pooling_allocator(),
            max_instances: defaults::max_instances(),
            instance_memory_mb: defaults::instance_memory_mb(),
            cache_compiled_modules: defaults::cache_compiled_modules(),
            cache_dir: defaults::cache_dir(),
            epoch_tick_ms: defaults::epoch_tick_ms(),
        }
    }
}

impl EngineConfig {
    /// Get the epoch tick interval as a `Duration`.
    pub fn epoch_tick(&self) -> Duration {
        Duration::from_millis(self.epoch_tick_ms.max(1))
    }
}

/// Per-request execution configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExecutionConfig {
    /// Default execution timeout in milliseconds.
    ///
    /// Measured from the start of a dispatch. Modules are expected to be
    /// short, stateless computations, hence the small default.
    #[serde(default = "defaults::timeout_ms")]
    pub timeout_ms: u64,

    /// Per-module timeout overrides in milliseconds, keyed by module name.
    #[serde(default)]
    pub module_timeouts: HashMap<String, u64>,

    /// Maximum bytes of stderr kept as diagnostics for a failed execution.
    ///
    /// Writes to stderr beyond this capacity are rejected.
    #[serde(default = "defaults::max_diagnostics_bytes")]
    pub max_diagnostics_bytes: usize,

    /// Bytes a module may write to stdout before the write blocks on the sink.
    #[serde(default = "defaults::output_write_budget")]
    pub output_write_budget: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout_ms: defaults::timeout_ms(),
            module_timeouts: HashMap::new(),
            max_diagnostics_bytes: defaults::max_diagnostics_bytes(),
            output_write_budget: defaults::output_write_budget(),
        }
    }
}

impl ExecutionConfig {
    /// Get the default timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Get the timeout for a specific module, honouring overrides.
    pub fn timeout_for(&self, module: &str) -> Duration {
        self.module_timeouts
            .get(module)
            .map_or_else(|| self.timeout(), |ms| Duration::from_millis(*ms))
    }
}

/// Default value functions for serde.
mod defaults {
    pub const fn pooling_allocator() -> bool {
        true
    }

    pub const fn max_instances() -> u32 {
        1000
    }

    pub const fn instance_memory_mb() -> u32 {
        64
    }

    pub const fn cache_compiled_modules() -> bool {
        true
    }

    #[allow(clippy::unnecessary_wraps)]
    pub fn cache_dir() -> Option<String> {
        Some("./cache".into())
    }

    pub const fn epoch_tick_ms() -> u64 {
        1
    }

    pub const fn timeout_ms() -> u64 {
        50
    }

    pub const fn max_diagnostics_bytes() -> usize {
        64 * 1024
    }

    pub const fn output_write_budget() -> usize {
        64 * 1024
    }
}
