//! Run scheduling for the inference service
//!
//! This crate provides the DAG op built for a run request, the per-device
//! run queues with their admission and batching policy, the workers that
//! execute batches, and the directory that owns the queues.

mod batch;
mod dag;
mod directory;
mod executor;
mod queue;

#[cfg(test)]
mod testing;

pub use batch::BatchPolicy;
pub use dag::{DagCommand, DagOp};
pub use directory::{DirectorySettings, RunQueueDirectory};
pub use executor::run_worker;
pub use queue::{RunQueue, RunReply};
