//! Identity reference backend
//!
//! Serves every kind without a real runtime: output `i` of a request is
//! input `i % ninputs`. Self-describing kinds read their signature from a
//! JSON header in the blob, e.g. `{"inputs":["a"],"outputs":["b"]}`.

use std::any::Any;
use serde::Deserialize;
use tracing::debug;

use common::error::{Error, Result};
use common::types::BackendKind;

use crate::backend::{Backend, LoadedModel, ModelDefinition, ModelHandle};
use crate::tensor::Tensor;

#[derive(Debug, Deserialize)]
struct Signature {
    inputs: Vec<String>,
    outputs: Vec<String>,
}

/// Handle produced by the identity backend
#[derive(Debug)]
struct IdentityModel {
    ninputs: usize,
    noutputs: usize,
}

/// Backend that echoes inputs back as outputs
pub struct IdentityBackend {
    kind: BackendKind,
}

impl IdentityBackend {
    /// Creates an identity backend serving `kind`
    pub fn new(kind: BackendKind) -> Self {
        Self { kind }
    }

    fn signature(definition: &ModelDefinition<'_>) -> Result<Signature> {
        if !definition.inputs.is_empty() || !definition.outputs.is_empty() {
            return Ok(Signature {
                inputs: definition.inputs.to_vec(),
                outputs: definition.outputs.to_vec(),
            });
        }

        if !definition.kind.capabilities().self_describing_io {
            return Err(Error::Validation(
                "Insufficient arguments, INPUTS and OUTPUTS not specified".to_string(),
            ));
        }

        serde_json::from_slice(definition.blob)
            .map_err(|e| Error::Validation(format!("Invalid model definition: {}", e)))
    }
}

impl Backend for IdentityBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn name(&self) -> &str {
        "identity"
    }

    fn load_model(&self, definition: &ModelDefinition<'_>) -> Result<LoadedModel> {
        let signature = Self::signature(definition)?;

        debug!(
            "Identity backend loaded a {} model on {} with {} inputs and {} outputs",
            definition.kind,
            definition.device,
            signature.inputs.len(),
            signature.outputs.len()
        );

        Ok(LoadedModel {
            handle: Box::new(IdentityModel {
                ninputs: signature.inputs.len(),
                noutputs: signature.outputs.len(),
            }) as ModelHandle,
            inputs: signature.inputs,
            outputs: signature.outputs,
        })
    }

    fn execute(&self, handle: &(dyn Any + Send + Sync), batch: &[Vec<Tensor>]) -> Result<Vec<Vec<Tensor>>> {
        let model = handle
            .downcast_ref::<IdentityModel>()
            .ok_or_else(|| Error::Internal("handle was not created by the identity backend".to_string()))?;

        batch
            .iter()
            .map(|inputs| {
                if inputs.len() != model.ninputs || inputs.is_empty() {
                    return Err(Error::Execution(format!(
                        "expected {} inputs, got {}",
                        model.ninputs,
                        inputs.len()
                    )));
                }
                Ok((0..model.noutputs).map(|i| inputs[i % inputs.len()].clone()).collect())
            })
            .collect()
    }
}
