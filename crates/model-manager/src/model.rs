//! Registered model record
//!
//! A `Model` owns the backend handle produced at load time. Callers share the
//! model through `Arc<Model>`; the handle is released when the last holder
//! drops, whether that is the key space or an in-flight run.

use std::fmt;
use std::sync::{Arc, Weak};
use bytes::Bytes;
use once_cell::sync::OnceCell;
use tracing::debug;

use common::error::{Error, Result};
use common::types::{BackendKind, ModelOptions, ValueType};
use inference_engine::{Backend, ModelDefinition, ModelHandle, Tensor};
use storage_adapter::Stored;

use crate::stats::RunStats;

/// Parameters of a model load
#[derive(Debug, Clone, Default)]
pub struct ModelSpec {
    /// Execution target, normalized to upper case
    pub device: String,

    /// Free-form tag
    pub tag: String,

    /// Normalized options
    pub options: ModelOptions,

    /// Input names given by the client
    pub inputs: Vec<String>,

    /// Output names given by the client
    pub outputs: Vec<String>,

    /// Serialized model
    pub blob: Bytes,
}

/// A loaded model
pub struct Model {
    /// Runtime kind
    kind: BackendKind,

    /// Execution target
    device: String,

    /// Free-form tag
    tag: String,

    /// Input names, in order
    inputs: Vec<String>,

    /// Output names, in order
    outputs: Vec<String>,

    /// Normalized options
    options: ModelOptions,

    /// Serialized model
    definition: Bytes,

    /// Backend that produced the handle
    backend: Arc<dyn Backend>,

    /// Runtime handle, taken on drop
    handle: Option<ModelHandle>,

    /// Stats entry of the key this model is registered under
    stats: OnceCell<Weak<RunStats>>,
}

impl Model {
    /// Loads a model through `backend`
    pub fn load(backend: Arc<dyn Backend>, kind: BackendKind, spec: ModelSpec) -> Result<Self> {
        let loaded = backend.load_model(&ModelDefinition {
            kind,
            device: &spec.device,
            options: &spec.options,
            inputs: &spec.inputs,
            outputs: &spec.outputs,
            blob: &spec.blob,
        })?;

        debug!(
            "Model loaded by {} on {} ({} inputs, {} outputs)",
            backend.name(),
            spec.device,
            loaded.inputs.len(),
            loaded.outputs.len()
        );

        Ok(Self {
            kind,
            device: spec.device,
            tag: spec.tag,
            inputs: loaded.inputs,
            outputs: loaded.outputs,
            options: spec.options,
            definition: spec.blob,
            backend,
            handle: Some(loaded.handle),
            stats: OnceCell::new(),
        })
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    /// Number of inputs
    pub fn ninputs(&self) -> usize {
        self.inputs.len()
    }

    /// Number of outputs
    pub fn noutputs(&self) -> usize {
        self.outputs.len()
    }

    pub fn options(&self) -> &ModelOptions {
        &self.options
    }

    /// Serialized model
    pub fn definition(&self) -> &Bytes {
        &self.definition
    }

    /// Executes a batch through the backend
    pub fn execute(&self, batch: &[Vec<Tensor>]) -> Result<Vec<Vec<Tensor>>> {
        let handle = self
            .handle
            .as_deref()
            .ok_or_else(|| Error::Internal("model handle already released".to_string()))?;

        self.backend.execute(handle, batch)
    }

    /// Links the stats entry; only the first link takes effect
    pub fn link_stats(&self, stats: &Arc<RunStats>) {
        let _ = self.stats.set(Arc::downgrade(stats));
    }

    /// Gets the stats entry, if it is still alive
    pub fn stats(&self) -> Option<Arc<RunStats>> {
        self.stats.get().and_then(Weak::upgrade)
    }
}

impl Drop for Model {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            debug!("Releasing {} model handle on {}", self.kind, self.device);
            self.backend.release(handle);
        }
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("kind", &self.kind)
            .field("device", &self.device)
            .field("tag", &self.tag)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("options", &self.options)
            .field("backend", &self.backend.name())
            .finish()
    }
}

impl Stored for Model {
    const VALUE_TYPE: ValueType = ValueType::Model;
}
