//! Admission control
//!
//! Pending ops are grouped by model. A group starts at the oldest op not yet
//! claimed and collects later ops bound to the same model whose inputs can be
//! stacked with the head's, up to the model's `batchsize`. Groups are checked
//! oldest first and the first ready group is dispatched.

use std::sync::Arc;
use std::time::{Duration, Instant};

use config::ConfigManager;

use crate::dag::DagOp;

/// Dispatch policy shared by every queue of a directory
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchPolicy {
    /// How long a group without a minimum size waits for more arrivals
    pub idle_linger: Duration,
}

impl BatchPolicy {
    /// Creates a policy from configuration
    pub fn from_config(config_manager: &ConfigManager) -> Self {
        let idle_linger = config_manager
            .get_duration("idle_batch_linger_ms")
            .unwrap_or(Duration::ZERO);

        Self { idle_linger }
    }
}

/// Outcome of checking the pending ops
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Selection {
    /// Dispatch the ops at these positions, in arrival order
    Ready(Vec<usize>),

    /// Nothing is ready; check again at the given instant or on the next arrival
    Wait(Option<Instant>),
}

/// Arrival information the policy needs about a pending op
pub(crate) trait Pending {
    fn op(&self) -> &Arc<DagOp>;
    fn enqueued_at(&self) -> Instant;
}

/// Returns true if `candidate` can run in the same batch as `head`
fn batch_compatible(head: &DagOp, candidate: &DagOp) -> bool {
    Arc::ptr_eq(head.model(), candidate.model())
        && head.inputs().len() == candidate.inputs().len()
        && head
            .inputs()
            .iter()
            .zip(candidate.inputs())
            .all(|(ours, theirs)| ours.is_batch_compatible(theirs))
}

/// Selects the next batch to dispatch
pub(crate) fn select<P: Pending>(pending: &[P], policy: &BatchPolicy, now: Instant) -> Selection {
    let mut claimed = vec![false; pending.len()];
    let mut wake_at: Option<Instant> = None;

    for head in 0..pending.len() {
        if claimed[head] {
            continue;
        }

        let head_op = pending[head].op();
        let options = *head_op.model().options();
        claimed[head] = true;

        if !options.batching_enabled() {
            return Selection::Ready(vec![head]);
        }

        let batchsize = options.batchsize as usize;
        let mut group = vec![head];

        for (position, candidate) in pending.iter().enumerate().skip(head + 1) {
            if group.len() == batchsize {
                break;
            }
            if !claimed[position] && batch_compatible(head_op, candidate.op()) {
                claimed[position] = true;
                group.push(position);
            }
        }

        if group.len() == batchsize {
            return Selection::Ready(group);
        }

        let oldest = pending[head].enqueued_at();
        let newest = pending[group[group.len() - 1]].enqueued_at();

        let deadline = if options.minbatchsize > 0 {
            if options.minbatchtimeout > 0 {
                Some(oldest + Duration::from_millis(options.minbatchtimeout))
            } else if group.len() as u64 >= options.minbatchsize {
                return Selection::Ready(group);
            } else {
                None
            }
        } else {
            Some(newest + policy.idle_linger)
        };

        match deadline {
            Some(deadline) if deadline <= now => return Selection::Ready(group),
            Some(deadline) => {
                wake_at = Some(wake_at.map_or(deadline, |current| current.min(deadline)));
            }
            None => {}
        }
    }

    Selection::Wait(wake_at)
}
