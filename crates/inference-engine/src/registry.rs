//! Backend registry
//!
//! This module keeps the loaded backend per kind and the factories used to
//! load a kind's default implementation on demand.

use std::sync::Arc;
use dashmap::DashMap;
use tracing::{error, info};

use common::error::{Error, Result};
use common::types::BackendKind;

use crate::backend::Backend;
use crate::backends::identity::IdentityBackend;

/// Creates the default backend for a kind
pub type BackendFactory = Arc<dyn Fn(BackendKind) -> Result<Arc<dyn Backend>> + Send + Sync>;

/// Registry of loaded backends
#[derive(Default)]
pub struct BackendRegistry {
    /// Loaded backends (kind -> backend)
    loaded: DashMap<BackendKind, Arc<dyn Backend>>,

    /// Default implementations that can be loaded lazily
    defaults: DashMap<BackendKind, BackendFactory>,
}

impl BackendRegistry {
    /// Creates an empty registry with no defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry whose defaults load the identity backend for every kind
    pub fn with_identity_defaults() -> Self {
        let registry = Self::new();
        for kind in BackendKind::ALL {
            registry.set_default_factory(
                kind,
                Arc::new(|kind: BackendKind| -> Result<Arc<dyn Backend>> {
                    Ok(Arc::new(IdentityBackend::new(kind)))
                }),
            );
        }
        registry
    }

    /// Registers a loaded backend, replacing any previous one of the same kind
    pub fn register(&self, backend: Arc<dyn Backend>) {
        info!("Backend {} loaded for {}", backend.name(), backend.kind());
        self.loaded.insert(backend.kind(), backend);
    }

    /// Sets the factory used by [`load_default`](Self::load_default)
    pub fn set_default_factory(&self, kind: BackendKind, factory: BackendFactory) {
        self.defaults.insert(kind, factory);
    }

    /// Gets the loaded backend for a kind
    pub fn get(&self, kind: BackendKind) -> Result<Arc<dyn Backend>> {
        self.loaded
            .get(&kind)
            .map(|backend| backend.clone())
            .ok_or_else(|| Error::BackendNotLoaded(format!("Backend not loaded: {}", kind)))
    }

    /// Returns true if a backend is loaded for the kind
    pub fn is_loaded(&self, kind: BackendKind) -> bool {
        self.loaded.contains_key(&kind)
    }

    /// Loads the default implementation of a kind
    ///
    /// Concurrent callers observe a single loaded backend.
    pub fn load_default(&self, kind: BackendKind) -> Result<Arc<dyn Backend>> {
        if let Some(backend) = self.loaded.get(&kind) {
            return Ok(backend.clone());
        }

        let factory = self
            .defaults
            .get(&kind)
            .map(|factory| factory.clone())
            .ok_or_else(|| {
                error!("No default backend available for {}", kind);
                Error::Resource("Could not load backend".to_string())
            })?;

        let backend = factory(kind).map_err(|e| {
            error!("Could not load {} default backend: {}", kind, e);
            Error::Resource("Could not load backend".to_string())
        })?;

        let backend = self.loaded.entry(kind).or_insert(backend).clone();

        info!("Default backend {} loaded for {}", backend.name(), kind);

        Ok(backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_unloaded_kind() {
        let registry = BackendRegistry::new();
        let err = registry.get(BackendKind::Torch).err().unwrap();
        assert!(err.is_backend_not_loaded());
    }

    #[test]
    fn test_load_default_once() {
        let registry = BackendRegistry::with_identity_defaults();
        assert!(!registry.is_loaded(BackendKind::OnnxRuntime));

        let first = registry.load_default(BackendKind::OnnxRuntime).unwrap();
        let second = registry.load_default(BackendKind::OnnxRuntime).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(registry.get(BackendKind::OnnxRuntime).is_ok());
    }

    #[test]
    fn test_load_default_without_factory() {
        let registry = BackendRegistry::new();
        let err = registry.load_default(BackendKind::TensorFlow).err().unwrap();
        assert_eq!(err.oneline(), "ERR Could not load backend");
    }

    #[test]
    fn test_failing_factory() {
        let registry = BackendRegistry::new();
        registry.set_default_factory(
            BackendKind::Torch,
            Arc::new(|_: BackendKind| -> Result<Arc<dyn Backend>> {
                Err(Error::Resource("library missing".to_string()))
            }),
        );
        assert!(registry.load_default(BackendKind::Torch).is_err());
        assert!(!registry.is_loaded(BackendKind::Torch));
    }
}
