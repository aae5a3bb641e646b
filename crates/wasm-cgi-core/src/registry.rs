//! Name-to-module registry.
//!
//! The registry is built once at startup through [`RegistryBuilder`] and is
//! immutable afterwards. Lookups take `&self` and need no locking, so the
//! registry can be shared across request tasks behind a plain `Arc`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use wasm_cgi_common::RuntimeError;

use crate::loader::ModuleArtifact;
use crate::module::ENTRY_POINT;
use crate::{CompiledModule, WasmEngine};

/// Frozen mapping from module name to compiled module.
#[derive(Default)]
pub struct ModuleRegistry {
    modules: HashMap<String, Arc<CompiledModule>>,
}

impl ModuleRegistry {
    /// Start building a registry whose modules are compiled with `engine`.
    pub fn builder(engine: &WasmEngine) -> RegistryBuilder {
        RegistryBuilder {
            engine: engine.clone(),
            modules: HashMap::new(),
            sources: HashMap::new(),
        }
    }

    /// Compile every artifact and freeze the result.
    ///
    /// # Errors
    ///
    /// Fails on the first artifact that does not compile, or on a duplicate
    /// module name.
    pub fn from_artifacts(
        engine: &WasmEngine,
        artifacts: &[ModuleArtifact],
    ) -> Result<Self, RuntimeError> {
        let mut builder = Self::builder(engine);
        for artifact in artifacts {
            builder.add_artifact(artifact)?;
        }
        Ok(builder.build())
    }

    /// Look up a module by name.
    pub fn get(&self, name: &str) -> Option<Arc<CompiledModule>> {
        self.modules.get(name).cloned()
    }

    /// Whether a module with this name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    /// Registered module names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.modules.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered modules.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("modules", &self.names())
            .finish()
    }
}

/// Accumulates compiled modules until [`RegistryBuilder::build`] freezes them.
pub struct RegistryBuilder {
    engine: WasmEngine,
    modules: HashMap<String, Arc<CompiledModule>>,
    sources: HashMap<String, PathBuf>,
}

impl RegistryBuilder {
    /// Compile an artifact and register it under its name.
    ///
    /// # Errors
    ///
    /// - [`RuntimeError::DuplicateModule`] if the name is already taken
    /// - [`RuntimeError::CompilationFailed`] if the bytes do not compile
    pub fn add_artifact(&mut self, artifact: &ModuleArtifact) -> Result<&mut Self, RuntimeError> {
        self.check_unique(&artifact.name, &artifact.path)?;

        let compiled = CompiledModule::from_bytes(self.engine.inner(), &artifact.bytes).map_err(
            |e| {
                RuntimeError::compilation_failed(format!(
                    "module '{}' ({}): {e}",
                    artifact.name,
                    artifact.path.display()
                ))
            },
        )?;

        self.insert(&artifact.name, &artifact.path, compiled);
        Ok(self)
    }

    /// Compile WAT source and register it under `name`.
    ///
    /// # Errors
    ///
    /// Same as [`RegistryBuilder::add_artifact`].
    pub fn add_wat(&mut self, name: &str, wat: &str) -> Result<&mut Self, RuntimeError> {
        let source = PathBuf::from(format!("<wat:{name}>"));
        self.check_unique(name, &source)?;

        let compiled = CompiledModule::from_wat(self.engine.inner(), wat).map_err(|e| {
            RuntimeError::compilation_failed(format!("module '{name}': {e}"))
        })?;

        self.insert(name, &source, compiled);
        Ok(self)
    }

    /// Freeze the registry.
    pub fn build(self) -> ModuleRegistry {
        info!(modules = ?self.modules.keys().collect::<Vec<_>>(), "Module registry frozen");
        ModuleRegistry {
            modules: self.modules,
        }
    }

    fn check_unique(&self, name: &str, path: &Path) -> Result<(), RuntimeError> {
        match self.sources.get(name) {
            Some(first) => Err(RuntimeError::DuplicateModule {
                name: name.to_string(),
                first: first.clone(),
                second: path.to_path_buf(),
            }),
            None => Ok(()),
        }
    }

    fn insert(&mut self, name: &str, path: &Path, compiled: CompiledModule) {
        if !compiled.is_command() {
            warn!(
                module = %name,
                entry_point = ENTRY_POINT,
                "Module has no entry point; requests to it will fail"
            );
        }

        info!(
            module = %name,
            path = %path.display(),
            content_hash = %compiled.content_hash(),
            "Module registered"
        );

        self.sources.insert(name.to_string(), path.to_path_buf());
        self.modules.insert(name.to_string(), Arc::new(compiled));
    }
}

impl std::fmt::Debug for RegistryBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryBuilder")
            .field("modules_count", &self.modules.len())
            .finish_non_exhaustive()
    }
}
