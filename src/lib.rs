//! Main integration module for the inference service
//!
//! This module wires the key space, backend registry, run queue directory,
//! model registry and command router together and serves command lines.

use std::sync::Arc;
use anyhow::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

use api_gateway::{CommandRouter, Reply};
use config::ConfigManager;
use inference_engine::BackendRegistry;
use logging::{Logger, LoggingConfig};
use model_manager::{ModelRegistry, StatsRegistry};
use storage_adapter::KeySpace;
use task_scheduler::RunQueueDirectory;

/// Inference service context
pub struct InferenceServer {
    /// Configuration manager
    config_manager: Arc<ConfigManager>,

    /// Key space holding models and tensors
    keyspace: Arc<KeySpace>,

    /// Loaded backends
    backends: Arc<BackendRegistry>,

    /// Run queues by device
    directory: Arc<RunQueueDirectory>,

    /// Model registry
    registry: Arc<ModelRegistry>,

    /// Command router
    router: CommandRouter,
}

impl InferenceServer {
    /// Creates a server whose backends default to the identity runtime
    pub fn new(config_manager: Arc<ConfigManager>) -> Self {
        Self::with_backends(config_manager, Arc::new(BackendRegistry::with_identity_defaults()))
    }

    /// Creates a server with the given backend registry
    pub fn with_backends(config_manager: Arc<ConfigManager>, backends: Arc<BackendRegistry>) -> Self {
        info!("Initializing inference server");

        let keyspace = Arc::new(KeySpace::new());
        let directory = Arc::new(RunQueueDirectory::from_config(&config_manager));

        let registry = Arc::new(ModelRegistry::new(
            keyspace.clone(),
            backends.clone(),
            directory.clone(),
            Arc::new(StatsRegistry::new()),
            &config_manager,
        ));

        let router = CommandRouter::new(keyspace.clone(), registry.clone(), directory.clone());

        Self {
            config_manager,
            keyspace,
            backends,
            directory,
            registry,
            router,
        }
    }

    /// Installs the global log subscriber from configuration
    pub fn init_logging(config_manager: &ConfigManager) -> Result<()> {
        Logger::init(&LoggingConfig::from_config(config_manager))
    }

    /// Executes one command line
    pub async fn execute(&self, line: &str) -> Reply {
        self.router.execute_line(line).await
    }

    /// Serves commands, one per line, until the reader is exhausted
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            let reply = self.execute(&line).await;
            debug!("Replied {}", reply);

            writer.write_all(format!("{}\n", reply).as_bytes()).await?;
            writer.flush().await?;
        }

        Ok(())
    }

    /// Stops every run queue
    pub async fn shutdown(&self) {
        info!("Shutting down inference server");
        self.directory.shutdown().await;
    }

    /// Gets the configuration manager
    pub fn config_manager(&self) -> &Arc<ConfigManager> {
        &self.config_manager
    }

    /// Gets the key space
    pub fn keyspace(&self) -> &Arc<KeySpace> {
        &self.keyspace
    }

    /// Gets the backend registry
    pub fn backends(&self) -> &Arc<BackendRegistry> {
        &self.backends
    }

    /// Gets the model registry
    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    #[tokio::test]
    async fn test_serve_lines() {
        let config = Arc::new(ConfigManager::with_overrides(&[("threads_per_queue", "2")]).unwrap());
        let server = InferenceServer::new(config);

        let input = b"MODELSET m TF cpu INPUTS a OUTPUTS b BLOB graph\n\
                      \n\
                      TENSORSET t FLOAT 2 BLOB abcdefgh\n\
                      MODELRUN m INPUTS t OUTPUTS out\n\
                      MODELSET m TFLITE cpu BATCHSIZE 2 BLOB graph\n\
                      NOPE\n";
        let mut output = Vec::new();

        server.serve(BufReader::new(&input[..]), &mut output).await.unwrap();

        let replies = String::from_utf8(output).unwrap();
        let replies: Vec<&str> = replies.lines().collect();
        assert_eq!(
            replies,
            vec![
                "OK",
                "OK",
                "OK",
                "ERR Auto-batching not supported by the TFLITE backend",
                "ERR unknown command 'NOPE'",
            ]
        );
        assert!(server.keyspace().key_type("out").is_some());
        assert!(server.backends().is_loaded(common::types::BackendKind::TensorFlow));

        server.shutdown().await;
    }
}
