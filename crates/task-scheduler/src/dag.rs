//! DAG operation definition
//!
//! A `DagOp` is one resolved unit of inference work: a model bound to
//! concrete input and output keys, scheduled on the device the model had when
//! the op was built.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use once_cell::sync::OnceCell;

use common::error::{Error, Result};
use inference_engine::Tensor;
use model_manager::Model;

static NEXT_OP_ID: AtomicU64 = AtomicU64::new(1);

/// Command carried by an op
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DagCommand {
    /// Run a model
    ModelRun,
}

/// A unit of inference work
pub struct DagOp {
    /// Process-unique identifier
    id: u64,

    /// Command
    command: DagCommand,

    /// Bound model
    model: Arc<Model>,

    /// Input keys, in model input order
    inkeys: Vec<String>,

    /// Output keys, in model output order
    outkeys: Vec<String>,

    /// Device the op is scheduled on
    device: String,

    /// Bound on the total wait, measured from construction
    timeout: Option<Duration>,

    /// Construction time
    created_at: Instant,

    /// Input tensors (empty until materialized)
    inputs: Vec<Tensor>,

    /// First error reported for this op
    error: OnceCell<Error>,
}

impl DagOp {
    /// Creates a model run op
    ///
    /// Fails with an arity error if the key counts do not match the model.
    pub fn model_run(
        model: Arc<Model>,
        inkeys: Vec<String>,
        outkeys: Vec<String>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        // Check the key counts against the model signature
        if inkeys.len() != model.ninputs() {
            return Err(Error::Arity(
                "Number of keys given as INPUTS here does not match model definition".to_string(),
            ));
        }

        if outkeys.len() != model.noutputs() {
            return Err(Error::Arity(
                "Number of keys given as OUTPUTS here does not match model definition".to_string(),
            ));
        }

        let device = model.device().to_string();

        Ok(Self {
            id: NEXT_OP_ID.fetch_add(1, Ordering::Relaxed),
            command: DagCommand::ModelRun,
            model,
            inkeys,
            outkeys,
            device,
            timeout,
            created_at: Instant::now(),
            inputs: Vec::new(),
            error: OnceCell::new(),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn command(&self) -> DagCommand {
        self.command
    }

    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    pub fn inkeys(&self) -> &[String] {
        &self.inkeys
    }

    pub fn outkeys(&self) -> &[String] {
        &self.outkeys
    }

    /// Device the op is scheduled on
    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Instant after which the op is failed, if it has a timeout
    pub fn deadline(&self) -> Option<Instant> {
        self.timeout.map(|timeout| self.created_at + timeout)
    }

    /// Sets the input tensors
    pub fn set_inputs(&mut self, inputs: Vec<Tensor>) -> Result<()> {
        if inputs.len() != self.model.ninputs() {
            return Err(Error::Arity(
                "Number of keys given as INPUTS here does not match model definition".to_string(),
            ));
        }
        self.inputs = inputs;
        Ok(())
    }

    /// Input tensors
    pub fn inputs(&self) -> &[Tensor] {
        &self.inputs
    }

    /// Returns true once the inputs were set
    pub fn is_materialized(&self) -> bool {
        !self.inputs.is_empty() || self.model.ninputs() == 0
    }

    /// Records an error; only the first one is kept
    pub fn set_error(&self, error: Error) -> bool {
        self.error.set(error).is_ok()
    }

    /// First recorded error
    pub fn error(&self) -> Option<&Error> {
        self.error.get()
    }
}

impl fmt::Debug for DagOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DagOp")
            .field("id", &self.id)
            .field("command", &self.command)
            .field("device", &self.device)
            .field("inkeys", &self.inkeys)
            .field("outkeys", &self.outkeys)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::model;

    #[test]
    fn test_arity_checks_leave_holders_unchanged() {
        let model = model("CPU", 0, 0, 0);
        let holders = Arc::strong_count(&model);

        let err = DagOp::model_run(model.clone(), vec![], vec!["y".to_string()], None).unwrap_err();
        assert_eq!(
            err.oneline(),
            "ERR Number of keys given as INPUTS here does not match model definition"
        );

        let err = DagOp::model_run(model.clone(), vec!["x".to_string()], vec![], None).unwrap_err();
        assert_eq!(
            err.oneline(),
            "ERR Number of keys given as OUTPUTS here does not match model definition"
        );

        assert_eq!(Arc::strong_count(&model), holders);
    }

    #[test]
    fn test_op_binds_model_and_device() {
        let model = model("GPU:1", 0, 0, 0);
        let op = DagOp::model_run(
            model.clone(),
            vec!["x".to_string()],
            vec!["y".to_string()],
            Some(Duration::from_millis(100)),
        )
        .unwrap();

        assert_eq!(Arc::strong_count(&model), 2);
        assert_eq!(op.device(), "GPU:1");
        assert_eq!(op.command(), DagCommand::ModelRun);
        assert!(op.deadline().is_some());
        assert!(!op.is_materialized());

        drop(op);
        assert_eq!(Arc::strong_count(&model), 1);
    }

    #[test]
    fn test_error_slot_is_write_once() {
        let op = DagOp::model_run(model("CPU", 0, 0, 0), vec!["x".into()], vec!["y".into()], None).unwrap();

        assert!(op.set_error(Error::Execution("first".to_string())));
        assert!(!op.set_error(Error::Execution("second".to_string())));
        assert_eq!(op.error(), Some(&Error::Execution("first".to_string())));
    }
}
