//! Shared test fixtures

use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use bytes::Bytes;
use parking_lot::Mutex;

use common::error::{Error, Result};
use common::types::{BackendKind, ModelOptions};
use inference_engine::backends::IdentityBackend;
use inference_engine::{Backend, LoadedModel, ModelDefinition, ModelHandle, Tensor};
use model_manager::{Model, ModelSpec};

/// Identity backend that records batch sizes and can be told to fail or stall
pub(crate) struct RecordingBackend {
    inner: IdentityBackend,
    pub batches: Mutex<Vec<usize>>,
    pub fail: AtomicBool,
    pub delay: Mutex<Duration>,
    pub released: AtomicUsize,
}

impl RecordingBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: IdentityBackend::new(BackendKind::TensorFlow),
            batches: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
            delay: Mutex::new(Duration::ZERO),
            released: AtomicUsize::new(0),
        })
    }
}

impl Backend for RecordingBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::TensorFlow
    }

    fn name(&self) -> &str {
        "recording"
    }

    fn load_model(&self, definition: &ModelDefinition<'_>) -> Result<LoadedModel> {
        self.inner.load_model(definition)
    }

    fn execute(&self, handle: &(dyn Any + Send + Sync), batch: &[Vec<Tensor>]) -> Result<Vec<Vec<Tensor>>> {
        self.batches.lock().push(batch.len());

        let delay = *self.delay.lock();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Execution("backend failure".to_string()));
        }
        self.inner.execute(handle, batch)
    }

    fn release(&self, handle: ModelHandle) {
        self.released.fetch_add(1, Ordering::SeqCst);
        drop(handle);
    }
}

fn options(batchsize: u64, minbatchsize: u64, minbatchtimeout: u64) -> ModelOptions {
    ModelOptions {
        batchsize,
        minbatchsize,
        minbatchtimeout,
        ..Default::default()
    }
}

/// Loads a one-input, one-output model through `backend`
pub(crate) fn model_on(
    backend: Arc<dyn Backend>,
    device: &str,
    batchsize: u64,
    minbatchsize: u64,
    minbatchtimeout: u64,
) -> Arc<Model> {
    let spec = ModelSpec {
        device: device.to_string(),
        tag: String::new(),
        options: options(batchsize, minbatchsize, minbatchtimeout),
        inputs: vec!["x".to_string()],
        outputs: vec!["y".to_string()],
        blob: Bytes::from_static(b"graph"),
    };
    Arc::new(Model::load(backend, BackendKind::TensorFlow, spec).unwrap())
}

/// Loads a one-input, one-output identity model
pub(crate) fn model(device: &str, batchsize: u64, minbatchsize: u64, minbatchtimeout: u64) -> Arc<Model> {
    model_on(
        Arc::new(IdentityBackend::new(BackendKind::TensorFlow)),
        device,
        batchsize,
        minbatchsize,
        minbatchtimeout,
    )
}

/// A 1x2 float tensor filled with `value`
pub(crate) fn tensor(value: u8) -> Tensor {
    Tensor::new("FLOAT", vec![1, 2], vec![value; 8])
}

/// A 1x3 float tensor, not batch compatible with [`tensor`]
pub(crate) fn wide_tensor(value: u8) -> Tensor {
    Tensor::new("FLOAT", vec![1, 3], vec![value; 12])
}
