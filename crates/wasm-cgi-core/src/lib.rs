//! Module registry and per-request execution for wasm-cgi.
//!
//! This crate runs CGI-style WASI command modules inside Wasmtime:
//! - [`loader`]: Discovers `<name>/main.wasm` artifacts on disk
//! - [`ModuleRegistry`]: Frozen name → [`CompiledModule`] table
//! - [`WasmEngine`]: Shared engine with pooling allocator and compilation cache
//! - [`Dispatcher`]: One fresh, deadline-bound instance per request
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                     WasmEngine                          │
//! │  (Shared across all requests, thread-safe)              │
//! │  - Pooling allocator, compilation cache, epoch ticker   │
//! └─────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │               ModuleRegistry (frozen)                   │
//! │  name -> CompiledModule, compiled once at startup       │
//! └─────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │            Store<WorkerContext> + Instance              │
//! │  (Per-request, isolated, dropped at the deadline)       │
//! │  - stdin <- request body, stdout -> response sink       │
//! │  - REQUEST_METHOD / SERVER_PROTOCOL environment         │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod dispatcher;
pub mod engine;
pub mod instance;
pub mod loader;
pub mod module;
pub mod registry;
pub mod store;

pub use dispatcher::{Dispatcher, ExecutionRequest};
pub use engine::{EpochTicker, WasmEngine};
pub use instance::{ExecutionResult, InstanceRunner};
pub use loader::{ModuleArtifact, discover};
pub use module::CompiledModule;
pub use registry::{ModuleRegistry, RegistryBuilder};
pub use store::{ExecutionEnv, LiveInstances, WorkerContext};
