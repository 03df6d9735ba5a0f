//! Model registration
//!
//! This module validates a registration request, loads the model through its
//! backend (loading the kind's default backend on demand), makes sure the
//! device has a run queue, and writes the model into the key space.

use std::sync::Arc;
use bytes::Bytes;
use tracing::{debug, error, info, warn};

use common::error::{Error, Result};
use common::types::BackendKind;
use config::ConfigManager;
use inference_engine::BackendRegistry;
use storage_adapter::KeySpace;

use crate::model::{Model, ModelSpec};
use crate::options::{BatchingArgs, OptionsValidator};
use crate::stats::{RunStats, StatsRegistry};

/// Keywords that cannot be used as a device name
const RESERVED_DEVICE_NAMES: [&str; 7] = [
    "INPUTS",
    "OUTPUTS",
    "TAG",
    "BATCHSIZE",
    "MINBATCHSIZE",
    "MINBATCHTIMEOUT",
    "BLOB",
];

/// Maximum device name length
const MAX_DEVICE_LEN: usize = 10;

/// Creates run queues for devices
pub trait DeviceQueues: Send + Sync {
    /// Makes sure a run queue exists for `device`
    fn ensure_queue(&self, device: &str) -> Result<()>;
}

/// A model registration request
#[derive(Debug, Clone)]
pub struct ModelSetRequest {
    /// Key to store the model under
    pub key: String,

    /// Runtime kind
    pub backend: BackendKind,

    /// Execution target as given by the client
    pub device: String,

    /// Free-form tag
    pub tag: String,

    /// Batching parameters as given by the client
    pub batching: BatchingArgs,

    /// Input names
    pub inputs: Vec<String>,

    /// Output names
    pub outputs: Vec<String>,

    /// Serialized model
    pub blob: Bytes,
}

/// Normalizes a device name, rejecting keywords and overlong names
pub fn normalize_device(device: &str) -> Result<String> {
    let device = device.to_uppercase();

    if device.is_empty()
        || device.len() > MAX_DEVICE_LEN
        || RESERVED_DEVICE_NAMES.contains(&device.as_str())
    {
        return Err(Error::Validation("Invalid DEVICE".to_string()));
    }

    Ok(device)
}

/// Registers models into the key space
pub struct ModelRegistry {
    /// Key space models are written to
    keyspace: Arc<KeySpace>,

    /// Loaded backends
    backends: Arc<BackendRegistry>,

    /// Run queue directory
    queues: Arc<dyn DeviceQueues>,

    /// Stats entries
    stats: Arc<StatsRegistry>,

    /// Options validator
    validator: OptionsValidator,
}

impl ModelRegistry {
    /// Creates a new model registry
    pub fn new(
        keyspace: Arc<KeySpace>,
        backends: Arc<BackendRegistry>,
        queues: Arc<dyn DeviceQueues>,
        stats: Arc<StatsRegistry>,
        config_manager: &ConfigManager,
    ) -> Self {
        Self {
            keyspace,
            backends,
            queues,
            stats,
            validator: OptionsValidator::from_config(config_manager),
        }
    }

    /// Gets the stats registry
    pub fn stats(&self) -> &Arc<StatsRegistry> {
        &self.stats
    }

    /// Registers a model
    ///
    /// On failure nothing is written: the key keeps its previous value and no
    /// stats entry is created.
    pub fn register(&self, request: ModelSetRequest) -> Result<Arc<Model>> {
        let device = normalize_device(&request.device)?;
        let options = self.validator.validate(request.backend, &request.batching)?;

        // Check the kind's input/output requirement
        if !request.backend.capabilities().self_describing_io
            && (request.inputs.is_empty() || request.outputs.is_empty())
        {
            return Err(Error::Validation(
                "Insufficient arguments, INPUTS and OUTPUTS not specified".to_string(),
            ));
        }

        let spec = ModelSpec {
            device: device.clone(),
            tag: request.tag.clone(),
            options,
            inputs: request.inputs,
            outputs: request.outputs,
            blob: request.blob,
        };

        let model = self.create(request.backend, spec)?;

        if let Err(e) = self.queues.ensure_queue(&device) {
            error!("Could not create run queue for {}: {}", device, e);
            drop(model);
            return Err(Error::Resource(
                "Could not initialize queue on requested device".to_string(),
            ));
        }

        let model = Arc::new(model);
        let stats = Arc::new(RunStats::new(&request.key, request.backend, &device, &request.tag));
        model.link_stats(&stats);

        // The stats entry is swapped under the key's lock so it always
        // belongs to the stored model.
        let previous = self
            .keyspace
            .set_with(&request.key, model.clone(), || self.stats.insert(stats))?;

        if let Some(previous) = previous {
            debug!(
                "Model at {} replaced ({} holders remain)",
                request.key,
                Arc::strong_count(&previous) - 1
            );
        }

        info!(
            "Model {} registered with {} on {} (batchsize {})",
            request.key,
            request.backend,
            device,
            model.options().batchsize
        );

        Ok(model)
    }

    /// Loads a model, loading the kind's default backend once if needed
    fn create(&self, kind: BackendKind, spec: ModelSpec) -> Result<Model> {
        let attempt = |spec: ModelSpec| -> Result<Model> {
            let backend = self.backends.get(kind)?;
            Model::load(backend, kind, spec)
        };

        match attempt(spec.clone()) {
            Err(e) if e.is_backend_not_loaded() => {
                warn!("Backend {} not loaded, will try loading default backend", kind);

                self.backends.load_default(kind).map_err(|e| {
                    error!("Could not load {} default backend", kind);
                    e
                })?;

                attempt(spec)
            }
            result => result,
        }
    }

    /// Gets the model at a key
    pub fn get(&self, key: &str) -> Result<Arc<Model>> {
        self.keyspace.resolve::<Model>(key)
    }

    /// Deletes the model at a key
    ///
    /// Runs holding the model keep it alive until they finish.
    pub fn delete(&self, key: &str) -> Result<()> {
        let removed = self
            .keyspace
            .delete_typed_with::<Model, _>(key, || {
                self.stats.remove(key);
            })?;

        match removed {
            Some(model) => {
                info!(
                    "Model {} deleted ({} holders remain)",
                    key,
                    Arc::strong_count(&model) - 1
                );
                Ok(())
            }
            None => Err(Error::Resolution("no model at key".to_string())),
        }
    }
}
