//! Device run-queue directory
//!
//! Maps device names to their run queues. Queues are created lazily, exactly
//! once per device, and live as long as the directory. Each queue is drained
//! by `threads_per_queue` workers spawned on the current tokio runtime.

use std::sync::Arc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{error, info};

use common::error::{Error, Result};
use common::utils::execute_until;
use config::ConfigManager;
use inference_engine::Tensor;
use model_manager::DeviceQueues;

use crate::batch::BatchPolicy;
use crate::dag::DagOp;
use crate::executor::run_worker;
use crate::queue::RunQueue;

/// Settings applied to every queue of a directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectorySettings {
    /// Workers per queue
    pub threads_per_queue: usize,

    /// Maximum pending ops per queue (0 for unbounded)
    pub max_queue_len: usize,

    /// Dispatch policy
    pub policy: BatchPolicy,
}

impl Default for DirectorySettings {
    fn default() -> Self {
        Self {
            threads_per_queue: 1,
            max_queue_len: 1024,
            policy: BatchPolicy::default(),
        }
    }
}

impl DirectorySettings {
    /// Reads the settings from configuration
    pub fn from_config(config_manager: &ConfigManager) -> Self {
        let defaults = Self::default();

        let threads_per_queue = config_manager
            .get_usize("threads_per_queue")
            .unwrap_or(defaults.threads_per_queue)
            .max(1);

        let max_queue_len = config_manager
            .get_usize("max_queue_len")
            .unwrap_or(defaults.max_queue_len);

        Self {
            threads_per_queue,
            max_queue_len,
            policy: BatchPolicy::from_config(config_manager),
        }
    }
}

/// Directory of per-device run queues
pub struct RunQueueDirectory {
    /// Queues (device -> queue)
    queues: DashMap<String, Arc<RunQueue>>,

    /// Worker tasks of every queue
    workers: Mutex<Vec<JoinHandle<()>>>,

    /// Queue settings
    settings: DirectorySettings,
}

impl RunQueueDirectory {
    /// Creates an empty directory
    pub fn new(settings: DirectorySettings) -> Self {
        Self {
            queues: DashMap::new(),
            workers: Mutex::new(Vec::new()),
            settings,
        }
    }

    /// Creates an empty directory configured from `config_manager`
    pub fn from_config(config_manager: &ConfigManager) -> Self {
        Self::new(DirectorySettings::from_config(config_manager))
    }

    /// Gets the queue of a device, creating it if needed
    ///
    /// Creation fails with a resource error when no tokio runtime is
    /// available to host the workers.
    pub fn ensure_queue(&self, device: &str) -> Result<Arc<RunQueue>> {
        let device = device.to_uppercase();

        if let Some(queue) = self.queues.get(&device) {
            return Ok(queue.clone());
        }

        let runtime = Handle::try_current().map_err(|e| {
            error!("Cannot start workers for {}: {}", device, e);
            Error::Resource("no async runtime available for queue workers".to_string())
        })?;

        let queue = match self.queues.entry(device.clone()) {
            Entry::Occupied(occupied) => return Ok(occupied.get().clone()),
            Entry::Vacant(vacant) => {
                let queue = Arc::new(RunQueue::new(
                    &device,
                    self.settings.policy,
                    self.settings.max_queue_len,
                ));

                let mut workers = self.workers.lock();
                for worker in 0..self.settings.threads_per_queue {
                    workers.push(runtime.spawn(run_worker(queue.clone(), worker)));
                }

                vacant.insert(queue.clone());
                queue
            }
        };

        info!(
            "Run queue created for {} with {} workers",
            device, self.settings.threads_per_queue
        );

        Ok(queue)
    }

    /// Gets the queue of a device
    pub fn get(&self, device: &str) -> Option<Arc<RunQueue>> {
        self.queues.get(&device.to_uppercase()).map(|queue| queue.clone())
    }

    /// Number of queues
    pub fn len(&self) -> usize {
        self.queues.len()
    }

    /// Returns true if no queue was created
    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    /// Devices with a queue
    pub fn devices(&self) -> Vec<String> {
        let mut devices: Vec<String> = self.queues.iter().map(|entry| entry.key().clone()).collect();
        devices.sort();
        devices
    }

    /// Runs an op on its device's queue and waits for its outputs
    ///
    /// An op with a timeout is removed from the queue when the deadline
    /// passes; the deadline counts from the op's construction.
    pub async fn run(&self, op: DagOp) -> Result<Vec<Tensor>> {
        let queue = self.ensure_queue(op.device())?;
        let op = Arc::new(op);
        let receiver = queue.submit(op.clone())?;

        let reply = async {
            receiver
                .await
                .map_err(|_| Error::Internal("run queue dropped the op".to_string()))?
        };

        match op.deadline() {
            Some(deadline) => {
                let result = execute_until(reply, deadline, "MODELRUN").await;
                if let Err(e) = &result {
                    if e.is_timeout() {
                        queue.cancel(op.id());
                        op.set_error(e.clone());
                    }
                }
                result
            }
            None => reply.await,
        }
    }

    /// Stops every queue and waits for the workers to exit
    pub async fn shutdown(&self) {
        for entry in self.queues.iter() {
            entry.value().shutdown();
        }

        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            if let Err(e) = worker.await {
                error!("Run queue worker failed: {}", e);
            }
        }

        info!("Run queue directory shut down ({} queues)", self.queues.len());
    }
}

impl DeviceQueues for RunQueueDirectory {
    fn ensure_queue(&self, device: &str) -> Result<()> {
        RunQueueDirectory::ensure_queue(self, device).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use futures::future::join_all;
    use model_manager::Model;
    use crate::testing::{model_on, tensor, RecordingBackend};

    fn settings(linger_ms: u64) -> DirectorySettings {
        DirectorySettings {
            threads_per_queue: 1,
            max_queue_len: 0,
            policy: BatchPolicy {
                idle_linger: Duration::from_millis(linger_ms),
            },
        }
    }

    fn op(model: &Arc<Model>, value: u8, timeout: Option<Duration>) -> DagOp {
        let mut op = DagOp::model_run(model.clone(), vec!["x".into()], vec!["y".into()], timeout).unwrap();
        op.set_inputs(vec![tensor(value)]).unwrap();
        op
    }

    #[test]
    fn test_queue_requires_runtime() {
        let directory = RunQueueDirectory::new(DirectorySettings::default());
        let err = directory.ensure_queue("CPU").unwrap_err();

        assert!(matches!(err, Error::Resource(_)));
        assert!(directory.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_ensure_creates_one_queue() {
        let directory = Arc::new(RunQueueDirectory::new(DirectorySettings::default()));

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let directory = directory.clone();
                let device = if i % 2 == 0 { "gpu:0" } else { "GPU:0" };
                tokio::spawn(async move { directory.ensure_queue(device).unwrap() })
            })
            .collect();

        let queues: Vec<Arc<RunQueue>> = join_all(handles)
            .await
            .into_iter()
            .map(|joined| joined.unwrap())
            .collect();

        assert_eq!(directory.len(), 1);
        assert!(queues.iter().all(|queue| Arc::ptr_eq(queue, &queues[0])));
        assert_eq!(directory.devices(), vec!["GPU:0".to_string()]);
        assert_eq!(directory.workers.lock().len(), 1);

        directory.shutdown().await;
    }

    #[tokio::test]
    async fn test_min_batch_timeout_dispatches_partial_batch() {
        let directory = RunQueueDirectory::new(settings(0));
        let backend = RecordingBackend::new();
        let model = model_on(backend.clone(), "CPU", 4, 2, 50);

        let started = std::time::Instant::now();
        let results = join_all(vec![
            directory.run(op(&model, 1, None)),
            directory.run(op(&model, 2, None)),
        ])
        .await;

        assert!(started.elapsed() >= Duration::from_millis(50));
        assert_eq!(results[0].as_ref().unwrap(), &vec![tensor(1)]);
        assert_eq!(results[1].as_ref().unwrap(), &vec![tensor(2)]);
        assert_eq!(*backend.batches.lock(), vec![2]);

        directory.shutdown().await;
    }

    #[tokio::test]
    async fn test_full_batch_dispatches_once() {
        let directory = RunQueueDirectory::new(settings(0));
        let backend = RecordingBackend::new();
        let model = model_on(backend.clone(), "CPU", 4, 2, 50);

        let results = join_all((1..=4).map(|value| directory.run(op(&model, value, None)))).await;

        for (value, result) in (1..=4).zip(results) {
            assert_eq!(result.unwrap(), vec![tensor(value)]);
        }
        assert_eq!(*backend.batches.lock(), vec![4]);

        directory.shutdown().await;
    }

    #[tokio::test]
    async fn test_no_minimum_dispatches_immediately() {
        let directory = RunQueueDirectory::new(settings(0));
        let backend = RecordingBackend::new();
        let model = model_on(backend.clone(), "CPU", 4, 0, 0);

        let result = tokio::time::timeout(Duration::from_secs(1), directory.run(op(&model, 7, None)))
            .await
            .unwrap();

        assert_eq!(result.unwrap(), vec![tensor(7)]);
        assert_eq!(*backend.batches.lock(), vec![1]);

        directory.shutdown().await;
    }

    #[tokio::test]
    async fn test_no_minimum_lingers_for_arrivals() {
        let directory = RunQueueDirectory::new(settings(200));
        let backend = RecordingBackend::new();
        let model = model_on(backend.clone(), "CPU", 4, 0, 0);

        let results = join_all(vec![
            directory.run(op(&model, 1, None)),
            directory.run(op(&model, 2, None)),
            directory.run(op(&model, 3, None)),
        ])
        .await;

        assert!(results.iter().all(|result| result.is_ok()));
        assert_eq!(*backend.batches.lock(), vec![3]);

        directory.shutdown().await;
    }

    #[tokio::test]
    async fn test_timeout_removes_op() {
        let directory = RunQueueDirectory::new(settings(0));
        let backend = RecordingBackend::new();
        let model = model_on(backend.clone(), "CPU", 4, 4, 0);

        let err = directory
            .run(op(&model, 1, Some(Duration::from_millis(30))))
            .await
            .unwrap_err();

        assert_eq!(err.oneline(), "ERR MODELRUN timed out");
        assert!(directory.get("cpu").unwrap().is_empty());
        assert!(backend.batches.lock().is_empty());

        directory.shutdown().await;
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_queue() {
        let directory = RunQueueDirectory::new(settings(0));
        let backend = RecordingBackend::new();
        let model = model_on(backend.clone(), "CPU", 0, 0, 0);

        backend.fail.store(true, Ordering::SeqCst);
        assert!(directory.run(op(&model, 1, None)).await.is_err());

        backend.fail.store(false, Ordering::SeqCst);
        assert_eq!(directory.run(op(&model, 2, None)).await.unwrap(), vec![tensor(2)]);

        directory.shutdown().await;
    }

    #[tokio::test]
    async fn test_model_outlives_overwrite_during_execution() {
        let directory = RunQueueDirectory::new(settings(0));
        let backend = RecordingBackend::new();
        *backend.delay.lock() = Duration::from_millis(100);
        let model = model_on(backend.clone(), "CPU", 0, 0, 0);

        let run = directory.run(op(&model, 1, None));
        let overwrite = async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            drop(model);
            backend.released.load(Ordering::SeqCst)
        };

        let (result, released_during_run) = tokio::join!(run, overwrite);
        assert_eq!(released_during_run, 0);
        assert_eq!(result.unwrap(), vec![tensor(1)]);
        assert_eq!(backend.released.load(Ordering::SeqCst), 1);

        directory.shutdown().await;
    }

    #[tokio::test]
    async fn test_devices_are_independent() {
        let directory = RunQueueDirectory::new(settings(0));
        let backend = RecordingBackend::new();
        let waiting = model_on(backend.clone(), "GPU", 4, 4, 0);
        let immediate = model_on(backend.clone(), "CPU", 0, 0, 0);

        let stuck = directory.run(op(&waiting, 1, Some(Duration::from_millis(200))));
        let fast = async {
            tokio::time::timeout(Duration::from_millis(100), directory.run(op(&immediate, 2, None)))
                .await
                .map(|result| result.is_ok())
        };

        let (stuck, fast) = tokio::join!(stuck, fast);
        assert!(stuck.unwrap_err().is_timeout());
        assert_eq!(fast, Ok(true));

        directory.shutdown().await;
    }
}
