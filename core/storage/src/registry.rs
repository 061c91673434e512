//! Backend registry for resolving store backends from configuration.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::backend::StoreBackend;
use crate::store::DurableStore;
use nubz_common::{Error, Result};

/// Factory function type for creating backends.
pub type BackendFactory = Box<dyn Fn(Value) -> Result<Arc<dyn StoreBackend>> + Send + Sync>;

/// Store configuration: which backend, and its options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Registered backend name.
    pub backend: String,
    /// Backend-specific options.
    #[serde(default)]
    pub options: Value,
}

impl StoreConfig {
    /// File backend storing its snapshot at `path`.
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            backend: "file".to_string(),
            options: serde_json::json!({ "path": path.into() }),
        }
    }

    /// In-memory backend.
    pub fn memory() -> Self {
        Self {
            backend: "memory".to_string(),
            options: Value::Null,
        }
    }
}

/// Registry for store backend factories.
pub struct BackendRegistry {
    factories: HashMap<String, BackendFactory>,
}

impl BackendRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a backend factory.
    ///
    /// # Errors
    /// - Returns error if name is already registered
    pub fn register(&mut self, name: impl Into<String>, factory: BackendFactory) -> Result<()> {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(Error::InvalidInput(format!(
                "Backend '{}' is already registered",
                name
            )));
        }
        self.factories.insert(name, factory);
        Ok(())
    }

    /// Resolve a backend by name and options.
    ///
    /// # Errors
    /// - Backend not registered
    /// - Options invalid for the backend
    pub fn resolve(&self, name: &str, options: Value) -> Result<Arc<dyn StoreBackend>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("Backend '{}' is not registered", name)))?;
        factory(options)
    }

    /// Resolve the configured backend and open a store over it.
    pub async fn open_store(&self, config: &StoreConfig) -> Result<DurableStore> {
        let backend = self.resolve(&config.backend, config.options.clone())?;
        DurableStore::open(backend).await
    }

    /// Get list of registered backend names.
    pub fn backends(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    /// Check if a backend is registered.
    pub fn has_backend(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Create a registry with the built-in backends.
pub fn create_default_registry() -> BackendRegistry {
    let mut registry = BackendRegistry::new();

    registry
        .register(
            "memory",
            Box::new(|_options| Ok(Arc::new(crate::memory::MemoryBackend::new()))),
        )
        .expect("Failed to register memory backend");

    registry
        .register(
            "file",
            Box::new(|options| {
                let path = options
                    .get("path")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| {
                        Error::InvalidInput("File backend requires a 'path' option".to_string())
                    })?;
                Ok(Arc::new(crate::local::FileBackend::new(path)?))
            }),
        )
        .expect("Failed to register file backend");

    registry
}
