//! Backend runtime contract
//!
//! A backend turns a serialized model into an opaque handle, executes batches
//! against that handle, and releases it. Handles are owned by the model
//! record; the backend only borrows them.

use std::any::Any;

use common::error::Result;
use common::types::{BackendKind, ModelOptions};

use crate::tensor::Tensor;

/// Opaque runtime-specific model handle
pub type ModelHandle = Box<dyn Any + Send + Sync>;

/// Everything a backend needs to load a model
#[derive(Debug, Clone, Copy)]
pub struct ModelDefinition<'a> {
    /// Runtime kind requested by the client
    pub kind: BackendKind,

    /// Execution target
    pub device: &'a str,

    /// Normalized options
    pub options: &'a ModelOptions,

    /// Input names given at registration (may be empty for self-describing kinds)
    pub inputs: &'a [String],

    /// Output names given at registration (may be empty for self-describing kinds)
    pub outputs: &'a [String],

    /// Serialized model
    pub blob: &'a [u8],
}

/// Result of loading a model
pub struct LoadedModel {
    /// Runtime handle
    pub handle: ModelHandle,

    /// Input names, in order
    pub inputs: Vec<String>,

    /// Output names, in order
    pub outputs: Vec<String>,
}

/// Inference runtime
pub trait Backend: Send + Sync {
    /// Kind served by this backend
    fn kind(&self) -> BackendKind;

    /// Human-readable implementation name
    fn name(&self) -> &str;

    /// Loads a serialized model
    fn load_model(&self, definition: &ModelDefinition<'_>) -> Result<LoadedModel>;

    /// Executes one batch
    ///
    /// `batch[i]` holds the input tensors of the i-th request, in model input
    /// order. On success the result holds one output vector per request, in
    /// the same order.
    fn execute(&self, handle: &(dyn Any + Send + Sync), batch: &[Vec<Tensor>]) -> Result<Vec<Vec<Tensor>>>;

    /// Releases a handle produced by `load_model`
    fn release(&self, handle: ModelHandle) {
        drop(handle);
    }
}
