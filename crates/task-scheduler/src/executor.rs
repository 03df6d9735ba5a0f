//! Batch executor
//!
//! Workers drain a run queue: each ready batch is executed through the
//! model's backend on the blocking pool, without holding the queue lock, and
//! the outputs are handed back to the submitters in arrival order.

use std::sync::Arc;
use tracing::{debug, error, info};

use common::error::{Error, Result};
use common::utils::measure_execution_time;
use inference_engine::Tensor;

use crate::queue::{QueuedOp, RunQueue};

/// Drains `queue` until it is shut down
pub async fn run_worker(queue: Arc<RunQueue>, worker: usize) {
    debug!("Worker {} started on {}", worker, queue.device());

    while let Some(batch) = queue.next_batch().await {
        execute_batch(queue.device(), batch).await;
    }

    info!("Worker {} on {} stopped", worker, queue.device());
}

/// Executes one batch and replies to every op in it
pub(crate) async fn execute_batch(device: &str, batch: Vec<QueuedOp>) {
    if batch.is_empty() {
        return;
    }

    let model = batch[0].op.model().clone();
    let stats = model.stats();
    let inputs: Vec<Vec<Tensor>> = batch.iter().map(|queued| queued.op.inputs().to_vec()).collect();
    let size = batch.len();

    debug!("Dispatching batch of {} on {}", size, device);

    let joined = tokio::task::spawn_blocking(move || {
        let (result, elapsed) = measure_execution_time(|| model.execute(&inputs));
        let result = result.and_then(|outputs| check_outputs(&model, outputs, inputs.len()));
        (result, elapsed)
    })
    .await;

    let result = match joined {
        Ok((result, elapsed)) => {
            if let Some(stats) = &stats {
                match &result {
                    Ok(_) => stats.record_success(size, elapsed),
                    Err(_) => stats.record_error(),
                }
            }
            result
        }
        Err(e) => {
            if let Some(stats) = &stats {
                stats.record_error();
            }
            Err(Error::Execution(format!("backend execution aborted: {}", e)))
        }
    };

    match result {
        Ok(outputs) => {
            for (queued, outputs) in batch.into_iter().zip(outputs) {
                let _ = queued.reply.send(Ok(outputs));
            }
        }
        Err(e) => {
            error!("Batch of {} on {} failed: {}", size, device, e);
            for queued in batch {
                queued.op.set_error(e.clone());
                let _ = queued.reply.send(Err(e.clone()));
            }
        }
    }
}

/// Checks that the backend returned one output vector per op, each matching the model
fn check_outputs(
    model: &model_manager::Model,
    outputs: Vec<Vec<Tensor>>,
    expected: usize,
) -> Result<Vec<Vec<Tensor>>> {
    if outputs.len() != expected {
        return Err(Error::Execution(format!(
            "backend returned {} results for a batch of {}",
            outputs.len(),
            expected
        )));
    }

    if let Some(mismatch) = outputs.iter().find(|op_outputs| op_outputs.len() != model.noutputs()) {
        return Err(Error::Execution(format!(
            "backend returned {} outputs, model defines {}",
            mismatch.len(),
            model.noutputs()
        )));
    }

    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;
    use std::time::Instant;
    use tokio::sync::oneshot;
    use crate::dag::DagOp;
    use crate::testing::{model_on, tensor, RecordingBackend};
    use model_manager::{Model, StatsRegistry};
    use common::types::BackendKind;

    fn queued(model: &Arc<Model>, value: u8) -> (QueuedOp, oneshot::Receiver<crate::queue::RunReply>) {
        let mut op = DagOp::model_run(model.clone(), vec!["x".into()], vec!["y".into()], None).unwrap();
        op.set_inputs(vec![tensor(value)]).unwrap();
        let (reply, receiver) = oneshot::channel();
        (
            QueuedOp {
                op: Arc::new(op),
                reply,
                enqueued_at: Instant::now(),
            },
            receiver,
        )
    }

    #[tokio::test]
    async fn test_outputs_follow_arrival_order() {
        let backend = RecordingBackend::new();
        let model = model_on(backend.clone(), "CPU", 4, 0, 0);
        let stats = StatsRegistry::new().create("m", BackendKind::TensorFlow, "CPU", "");
        model.link_stats(&stats);

        let (ops, receivers): (Vec<_>, Vec<_>) = (1..=3).map(|value| queued(&model, value)).unzip();
        execute_batch("CPU", ops).await;

        for (value, receiver) in (1..=3).zip(receivers) {
            assert_eq!(receiver.await.unwrap().unwrap(), vec![tensor(value)]);
        }
        assert_eq!(*backend.batches.lock(), vec![3]);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.calls, 1);
        assert_eq!(snapshot.samples, 3);
    }

    #[tokio::test]
    async fn test_failure_fans_out() {
        let backend = RecordingBackend::new();
        backend.fail.store(true, Ordering::SeqCst);
        let model = model_on(backend.clone(), "CPU", 4, 0, 0);

        let (first, first_rx) = queued(&model, 1);
        let (second, second_rx) = queued(&model, 2);
        let first_op = first.op.clone();
        execute_batch("CPU", vec![first, second]).await;

        let expected = Error::Execution("backend failure".to_string());
        assert_eq!(first_rx.await.unwrap().unwrap_err(), expected);
        assert_eq!(second_rx.await.unwrap().unwrap_err(), expected);
        assert_eq!(first_op.error(), Some(&expected));
    }

    #[test]
    fn test_result_count_mismatch() {
        let model = crate::testing::model("CPU", 0, 0, 0);

        let err = check_outputs(&model, vec![vec![tensor(1)]], 2).unwrap_err();
        assert!(matches!(err, Error::Execution(_)));

        let err = check_outputs(&model, vec![vec![tensor(1), tensor(2)]], 1).unwrap_err();
        assert!(matches!(err, Error::Execution(_)));

        assert!(check_outputs(&model, vec![vec![tensor(1)]], 1).is_ok());
    }
}
