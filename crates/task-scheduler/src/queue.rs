//! Per-device run queue
//!
//! This module provides the bounded queue of pending ops for one device.
//! Producers submit ops and receive a reply channel; workers take ready
//! batches. The queue lock is only held while selecting a batch.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use parking_lot::Mutex;
use tokio::sync::{oneshot, Notify};
use tracing::{debug, warn};

use common::error::{Error, Result};
use inference_engine::Tensor;

use crate::batch::{self, BatchPolicy, Pending, Selection};
use crate::dag::DagOp;

/// Reply delivered to the submitter of an op
pub type RunReply = Result<Vec<Tensor>>;

/// An op waiting in a queue
pub(crate) struct QueuedOp {
    /// The op
    pub op: Arc<DagOp>,

    /// Reply channel
    pub reply: oneshot::Sender<RunReply>,

    /// Arrival time
    pub enqueued_at: Instant,
}

impl Pending for QueuedOp {
    fn op(&self) -> &Arc<DagOp> {
        &self.op
    }

    fn enqueued_at(&self) -> Instant {
        self.enqueued_at
    }
}

/// Mutable queue state
struct QueueState {
    /// Pending ops in arrival order
    pending: VecDeque<QueuedOp>,

    /// Set once the queue stops accepting work
    shutdown: bool,
}

/// Run queue of one device
pub struct RunQueue {
    /// Device name
    device: String,

    /// Pending ops
    state: Mutex<QueueState>,

    /// Wakes workers on arrivals and shutdown
    notify: Notify,

    /// Dispatch policy
    policy: BatchPolicy,

    /// Maximum number of pending ops (0 for unbounded)
    max_len: usize,
}

impl std::fmt::Debug for RunQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunQueue")
            .field("device", &self.device)
            .field("policy", &self.policy)
            .field("max_len", &self.max_len)
            .finish_non_exhaustive()
    }
}

impl RunQueue {
    /// Creates an empty queue
    pub fn new(device: &str, policy: BatchPolicy, max_len: usize) -> Self {
        Self {
            device: device.to_string(),
            state: Mutex::new(QueueState {
                pending: VecDeque::new(),
                shutdown: false,
            }),
            notify: Notify::new(),
            policy,
            max_len,
        }
    }

    /// Device name
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Number of pending ops
    pub fn len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Returns true if no op is pending
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Submits an op
    ///
    /// The receiver yields the op's output tensors or the error that failed
    /// it.
    pub fn submit(&self, op: Arc<DagOp>) -> Result<oneshot::Receiver<RunReply>> {
        if !op.is_materialized() {
            return Err(Error::Internal("op inputs were not materialized".to_string()));
        }

        let (reply, receiver) = oneshot::channel();

        {
            let mut state = self.state.lock();

            if state.shutdown {
                return Err(Error::Resource(format!("run queue on {} is shut down", self.device)));
            }

            // Check queue capacity
            if self.max_len > 0 && state.pending.len() >= self.max_len {
                warn!("Run queue on {} is full ({} ops)", self.device, self.max_len);
                return Err(Error::Resource(format!("run queue on {} is full", self.device)));
            }

            debug!("Op {} queued on {} ({} pending)", op.id(), self.device, state.pending.len() + 1);

            state.pending.push_back(QueuedOp {
                op,
                reply,
                enqueued_at: Instant::now(),
            });
        }

        self.notify.notify_one();

        Ok(receiver)
    }

    /// Removes a pending op
    ///
    /// Returns false if the op was already dispatched or never queued.
    pub fn cancel(&self, op_id: u64) -> bool {
        let mut state = self.state.lock();

        match state.pending.iter().position(|queued| queued.op.id() == op_id) {
            Some(position) => {
                state.pending.remove(position);
                debug!("Op {} removed from {}", op_id, self.device);
                true
            }
            None => false,
        }
    }

    /// Waits for the next ready batch
    ///
    /// Returns `None` once the queue is shut down.
    pub(crate) async fn next_batch(&self) -> Option<Vec<QueuedOp>> {
        loop {
            let notified = self.notify.notified();

            let wake_at = {
                let mut state = self.state.lock();

                if state.shutdown {
                    return None;
                }

                // Drop ops whose submitter stopped waiting
                state.pending.retain(|queued| !queued.reply.is_closed());

                let pending = state.pending.make_contiguous();
                match batch::select(pending, &self.policy, Instant::now()) {
                    Selection::Ready(positions) => {
                        let batch = take_positions(&mut state.pending, &positions);
                        if !state.pending.is_empty() {
                            self.notify.notify_one();
                        }
                        return Some(batch);
                    }
                    Selection::Wait(wake_at) => wake_at,
                }
            };

            match wake_at {
                Some(deadline) => {
                    tokio::select! {
                        _ = notified => {}
                        _ = tokio::time::sleep_until(deadline.into()) => {}
                    }
                }
                None => notified.await,
            }
        }
    }

    /// Stops the queue and fails every pending op
    pub fn shutdown(&self) {
        let pending = {
            let mut state = self.state.lock();
            state.shutdown = true;
            std::mem::take(&mut state.pending)
        };

        if !pending.is_empty() {
            warn!("Failing {} pending ops on {}", pending.len(), self.device);
        }

        for queued in pending {
            let error = Error::Resource(format!("run queue on {} is shut down", self.device));
            queued.op.set_error(error.clone());
            let _ = queued.reply.send(Err(error));
        }

        self.notify.notify_waiters();
    }

    /// Returns true once the queue was shut down
    pub fn is_shutdown(&self) -> bool {
        self.state.lock().shutdown
    }
}

/// Removes the ops at ascending `positions`, keeping arrival order
fn take_positions(pending: &mut VecDeque<QueuedOp>, positions: &[usize]) -> Vec<QueuedOp> {
    let mut batch = Vec::with_capacity(positions.len());
    for (removed, position) in positions.iter().enumerate() {
        if let Some(queued) = pending.remove(position - removed) {
            batch.push(queued);
        }
    }
    batch
}
