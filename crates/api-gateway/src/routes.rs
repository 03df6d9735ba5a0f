//! Command routing
//!
//! Maps command names (case-insensitive) to their handlers. Every failure is
//! turned into an error reply; the router itself never fails.

use std::sync::Arc;
use tracing::debug;

use common::error::Error;
use model_manager::ModelRegistry;
use storage_adapter::KeySpace;
use task_scheduler::RunQueueDirectory;

use crate::args::tokenize;
use crate::handlers::{info, model, run, tensor};
use crate::reply::Reply;

/// Dispatches commands to their handlers
pub struct CommandRouter {
    /// Key space
    keyspace: Arc<KeySpace>,

    /// Model registry
    registry: Arc<ModelRegistry>,

    /// Run queue directory
    directory: Arc<RunQueueDirectory>,
}

impl CommandRouter {
    /// Creates a new router
    pub fn new(
        keyspace: Arc<KeySpace>,
        registry: Arc<ModelRegistry>,
        directory: Arc<RunQueueDirectory>,
    ) -> Self {
        Self {
            keyspace,
            registry,
            directory,
        }
    }

    /// Executes a tokenized command
    pub async fn execute(&self, tokens: &[String]) -> Reply {
        let (command, args) = match tokens.split_first() {
            Some(split) => split,
            None => return Reply::Error("ERR empty command".to_string()),
        };

        let name = command.to_uppercase();
        debug!("Executing {} with {} arguments", name, args.len());

        let result = match name.as_str() {
            "MODELSET" => model::model_set(&self.registry, args),
            "MODELGET" => model::model_get(&self.registry, args),
            "MODELDEL" => model::model_del(&self.registry, args),
            "MODELRUN" => run::model_run(&self.keyspace, &self.directory, args).await,
            "TENSORSET" => tensor::tensor_set(&self.keyspace, args),
            "TENSORGET" => tensor::tensor_get(&self.keyspace, args),
            "INFO" => info::info(self.registry.stats(), args),
            _ => Err(Error::Validation(format!("unknown command '{}'", command))),
        };

        match result {
            Ok(reply) => reply,
            Err(e) => Reply::from_error(&name, &e),
        }
    }

    /// Executes a command line
    pub async fn execute_line(&self, line: &str) -> Reply {
        self.execute(&tokenize(line)).await
    }
}
