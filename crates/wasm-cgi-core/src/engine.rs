//! Wasmtime engine configuration and creation.
//!
//! The [`WasmEngine`] is the foundation of the runtime. It is:
//! - Thread-safe and shared across all requests
//! - Configured with pooling allocator for fast instantiation
//! - Backed by a content-keyed compilation cache (optionally on disk)
//! - Set up with epoch interruption so running guests can be preempted

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use serde::Serialize;
use tracing::{debug, info, warn};
use wasmtime::{Config, Engine, InstanceAllocationStrategy, PoolingAllocationConfig};

use wasm_cgi_common::{EngineConfig, RuntimeError};

/// File written into the cache directory and handed to Wasmtime.
const CACHE_CONFIG_FILE: &str = "wasmtime-cache.toml";

/// Thread-safe WebAssembly engine wrapper.
///
/// This struct wraps a Wasmtime [`Engine`] configured for short-lived,
/// per-request instantiation. The engine holds no per-request state; the
/// compilation cache it owns is internally synchronized.
///
/// # Configuration
///
/// - **Async Support**: Guest I/O on stdin/stdout suspends instead of blocking
/// - **Epoch Interruption**: Running guests yield on every epoch tick, so a
///   deadline can cancel even a module that never performs I/O
/// - **Pooling Allocator**: Pre-reserved instance slots
/// - **Compilation Cache**: Reuse of compiled code across restarts
#[derive(Clone)]
pub struct WasmEngine {
    engine: Arc<Engine>,
    config: EngineConfig,
    cache_dir: Option<PathBuf>,
}

impl WasmEngine {
    /// Create a new WebAssembly engine with the given configuration.
    ///
    /// A cache directory that cannot be prepared is logged and skipped:
    /// compilation then simply happens without the disk cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the Wasmtime configuration is invalid.
    pub fn new(config: &EngineConfig) -> Result<Self, RuntimeError> {
        let mut wasmtime_config = Config::new();

        wasmtime_config.async_support(true);
        wasmtime_config.epoch_interruption(true);
        wasmtime_config.cranelift_opt_level(wasmtime::OptLevel::Speed);

        if config.pooling_allocator {
            let pooling_config = Self::create_pooling_config(config);

            wasmtime_config
                .allocation_strategy(InstanceAllocationStrategy::Pooling(pooling_config));

            info!(
                max_instances = config.max_instances,
                instance_memory_mb = config.instance_memory_mb,
                "Pooling allocator enabled"
            );
        }

        let cache_dir = match (&config.cache_dir, config.cache_compiled_modules) {
            (Some(dir), true) => match Self::enable_cache(&mut wasmtime_config, Path::new(dir)) {
                Ok(dir) => {
                    info!(cache_dir = %dir.display(), "Compilation cache enabled");
                    Some(dir)
                }
                Err(e) => {
                    warn!(cache_dir = %dir, error = %e, "Compilation cache unavailable, continuing without it");
                    None
                }
            },
            _ => None,
        };

        let engine = Engine::new(&wasmtime_config).map_err(|e| {
            RuntimeError::invalid_config(format!("Failed to create Wasmtime engine: {e}"))
        })?;

        info!("Wasmtime engine initialized");

        Ok(Self {
            engine: Arc::new(engine),
            config: config.clone(),
            cache_dir,
        })
    }

    /// Create pooling allocation configuration.
    fn create_pooling_config(config: &EngineConfig) -> PoolingAllocationConfig {
        let mut pooling = PoolingAllocationConfig::default();

        pooling.total_core_instances(config.max_instances);
        pooling.total_memories(config.max_instances);
        pooling.total_tables(config.max_instances);

        let max_memory_bytes = (config.instance_memory_mb as usize) * 1024 * 1024;
        pooling.max_memory_size(max_memory_bytes);

        pooling
    }

    /// Point Wasmtime's compilation cache at `dir`.
    ///
    /// Wasmtime reads cache settings from a TOML file, so one is generated
    /// inside the cache directory itself.
    fn enable_cache(wasmtime_config: &mut Config, dir: &Path) -> Result<PathBuf, RuntimeError> {
        #[derive(Serialize)]
        struct CacheConfigFile<'a> {
            cache: CacheSection<'a>,
        }

        #[derive(Serialize)]
        struct CacheSection<'a> {
            enabled: bool,
            directory: &'a Path,
        }

        std::fs::create_dir_all(dir)?;
        let dir = std::fs::canonicalize(dir)?;

        let contents = toml::to_string(&CacheConfigFile {
            cache: CacheSection {
                enabled: true,
                directory: &dir,
            },
        })
        .map_err(|e| RuntimeError::invalid_config(format!("Invalid cache directory: {e}")))?;

        let config_path = dir.join(CACHE_CONFIG_FILE);
        std::fs::write(&config_path, contents)?;

        wasmtime_config
            .cache_config_load(&config_path)
            .map_err(|e| RuntimeError::invalid_config(format!("Failed to load cache config: {e}")))?;

        debug!(config_path = %config_path.display(), "Cache configuration written");

        Ok(dir)
    }

    /// Get a reference to the inner Wasmtime engine.
    pub fn inner(&self) -> &Engine {
        &self.engine
    }

    /// Directory backing the compilation cache, if one is active.
    pub fn cache_dir(&self) -> Option<&Path> {
        self.cache_dir.as_deref()
    }

    /// Start a background thread that increments the epoch every `epoch_tick_ms`.
    ///
    /// The ticker runs on its own OS thread rather than a Tokio task: a guest
    /// spinning inside a poll would otherwise starve the very task that is
    /// supposed to interrupt it. The thread stops when the returned
    /// [`EpochTicker`] is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    pub fn start_epoch_ticker(&self) -> Result<EpochTicker, RuntimeError> {
        let engine = Arc::clone(&self.engine);
        let tick = self.config.epoch_tick();
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);

        let handle = std::thread::Builder::new()
            .name("wasm-cgi-epoch".into())
            .spawn(move || {
                while !stop_flag.load(Ordering::Relaxed) {
                    std::thread::sleep(tick);
                    engine.increment_epoch();
                }
            })?;

        debug!(tick_ms = tick.as_millis(), "Epoch ticker started");

        Ok(EpochTicker {
            stop,
            handle: Some(handle),
        })
    }
}

impl std::fmt::Debug for WasmEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasmEngine")
            .field("pooling_allocator", &self.config.pooling_allocator)
            .field("max_instances", &self.config.max_instances)
            .field("cache_dir", &self.cache_dir)
            .finish_non_exhaustive()
    }
}

/// Guard for the epoch ticker thread. Dropping it stops the thread.
pub struct EpochTicker {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Drop for EpochTicker {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl std::fmt::Debug for EpochTicker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EpochTicker").finish_non_exhaustive()
    }
}
