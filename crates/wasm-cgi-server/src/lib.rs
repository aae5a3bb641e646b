//! HTTP front end for wasm-cgi.
//!
//! Exposes every registered module at `GET /{module}`:
//!
//! - The request body is the module's stdin
//! - `REQUEST_METHOD` and `SERVER_PROTOCOL` are its only environment
//! - Its stdout becomes the response body, unmodified
//! - Failures map to 404 (unknown module), 504 (deadline) or 500
//!
//! # Quick Start
//!
//! ```ignore
//! use wasm_cgi_server::{CgiServer, ServerConfig};
//!
//! let server = CgiServer::new(dispatcher, ServerConfig::default());
//! server.run().await?;
//! ```

pub mod handler;
pub mod request;
pub mod response;
pub mod router;
pub mod server;
pub mod state;

pub use server::{CgiServer, ServerConfig, TestHandle};
pub use state::AppState;
