//! Shared application state.
//!
//! This module provides [`AppState`], which holds shared resources
//! across all HTTP request handlers.

use std::sync::Arc;

use wasm_cgi_core::{Dispatcher, ModuleRegistry};

/// Shared state across all request handlers.
///
/// Cloned for each request; the dispatcher behind it is read-only apart
/// from its atomic instance counter, so no locking is needed.
#[derive(Clone)]
pub struct AppState {
    dispatcher: Arc<Dispatcher>,
}

impl AppState {
    /// Wrap a ready dispatcher.
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self::from_arc(Arc::new(dispatcher))
    }

    /// Share an existing dispatcher.
    pub fn from_arc(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Get the dispatcher.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Get the module registry.
    pub fn registry(&self) -> &ModuleRegistry {
        self.dispatcher.registry()
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("modules_count", &self.registry().len())
            .finish_non_exhaustive()
    }
}
